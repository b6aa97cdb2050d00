use super::{catalog, check_rate, SpeakRequest, SpeechBackend, Voice};
use crate::config_loader;
use crate::error::{Action, SpeechError};
use crate::invoker::{self, CallContext};
use async_trait::async_trait;
use tracing::{debug, info};

const VOICE_FLAG: &str = "-v";
const RATE_FLAG: &str = "-r";
const CATALOG_QUERY: &str = "?";

/// Drives the macOS `say` command.
pub struct SayBackend {
    command: String,
}

impl SayBackend {
    pub fn new() -> Self {
        let command = config_loader::SETTINGS
            .read()
            .map(|s| s.say_command.clone())
            .unwrap_or_else(|_| config_loader::DEFAULT_SAY_COMMAND.to_string());

        Self { command }
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Default for SayBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds `[-v <voice>] [-r <rate>] <text>`. Each value is its own argument
/// and the text always comes last as a single token.
pub fn build_args(request: &SpeakRequest) -> Result<Vec<String>, SpeechError> {
    let mut args = Vec::with_capacity(5);

    if let Some(voice) = request.voice.as_deref().filter(|v| !v.is_empty()) {
        args.push(VOICE_FLAG.to_string());
        args.push(voice.to_string());
    }

    if let Some(rate) = request.rate.filter(|r| *r > 0.0) {
        check_rate(rate)?;
        args.push(RATE_FLAG.to_string());
        args.push(format!("{:.0}", rate));
    }

    args.push(request.text.clone());
    Ok(args)
}

fn catalog_args() -> Vec<String> {
    vec![VOICE_FLAG.to_string(), CATALOG_QUERY.to_string()]
}

#[async_trait]
impl SpeechBackend for SayBackend {
    fn id(&self) -> &'static str {
        "say"
    }

    async fn synthesize(
        &self,
        ctx: &CallContext,
        request: &SpeakRequest,
    ) -> Result<(), SpeechError> {
        let args = build_args(request)?;
        debug!(text = %request.text, voice = ?request.voice, rate = ?request.rate, "Synthesizing");

        // Output of a successful run is not interesting.
        invoker::run(ctx, &self.command, &args, Action::Speak).await?;
        Ok(())
    }

    async fn list_voices(&self, ctx: &CallContext) -> Result<Vec<Voice>, SpeechError> {
        read_catalog(ctx, &self.command, &catalog_args()).await
    }
}

async fn read_catalog(
    ctx: &CallContext,
    program: &str,
    args: &[String],
) -> Result<Vec<Voice>, SpeechError> {
    let output = invoker::run(ctx, program, args, Action::ListVoices).await?;
    let voices = catalog::parse_voices(&String::from_utf8_lossy(&output));
    info!(count = voices.len(), "Parsed voice catalog");
    Ok(voices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(text: &str, voice: Option<&str>, rate: Option<f64>) -> SpeakRequest {
        SpeakRequest {
            text: text.to_string(),
            voice: voice.map(str::to_string),
            rate,
        }
    }

    #[test]
    fn test_rate_only() {
        let args = build_args(&request("Hello", None, Some(120.0))).unwrap();
        assert_eq!(args, vec!["-r", "120", "Hello"]);
    }

    #[test]
    fn test_voice_then_rate_then_text() {
        let args = build_args(&request("Good morning", Some("Samantha"), Some(200.0))).unwrap();
        assert_eq!(args, vec!["-v", "Samantha", "-r", "200", "Good morning"]);
    }

    #[test]
    fn test_text_only() {
        let args = build_args(&request("Hi", Some(""), None)).unwrap();
        assert_eq!(args, vec!["Hi"]);
    }

    #[test]
    fn test_fractional_rate_rounds() {
        let args = build_args(&request("Hi", None, Some(120.4))).unwrap();
        assert_eq!(args[1], "120");
        let args = build_args(&request("Hi", None, Some(120.6))).unwrap();
        assert_eq!(args[1], "121");
    }

    #[test]
    fn test_out_of_range_rate_produces_no_args() {
        assert!(build_args(&request("Hi", None, Some(900.0))).is_err());
        assert!(build_args(&request("Hi", None, Some(1.0))).is_err());
    }

    #[test]
    fn test_catalog_args() {
        assert_eq!(catalog_args(), vec!["-v", "?"]);
    }

    #[test]
    fn test_with_command() {
        let backend = SayBackend::with_command("/opt/say");
        assert_eq!(backend.command(), "/opt/say");
        assert_eq!(backend.id(), "say");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_synthesize_success_discards_output() {
        let backend = SayBackend::with_command("echo");
        let ctx = CallContext::background();
        let req = SpeakRequest::new("Hello", None, Some(120.0)).unwrap();
        assert!(backend.synthesize(&ctx, &req).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_synthesize_failure_uses_speak_wording() {
        let backend = SayBackend::with_command("false");
        let ctx = CallContext::background();
        let req = SpeakRequest::new("Hello", None, None).unwrap();
        let err = backend.synthesize(&ctx, &req).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to execute speech synthesis: exit status: 1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_voices_failure_uses_listing_wording() {
        let backend = SayBackend::with_command("false");
        let ctx = CallContext::background();
        let err = backend.list_voices(&ctx).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to retrieve voice list: exit status: 1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_voices_ignores_non_catalog_output() {
        // echo prints "-v ?", which is not a catalog line
        let backend = SayBackend::with_command("echo");
        let ctx = CallContext::background();
        let voices = backend.list_voices(&ctx).await.unwrap();
        assert!(voices.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_catalog_keeps_order_and_skips_noise() {
        let script = "printf 'Albert              en_US    # Hello! My name is Albert.\\nnot a voice\\nAnna                de_DE    # Hallo! Ich heiße Anna.\\n'";
        let args = vec!["-c".to_string(), script.to_string()];
        let ctx = CallContext::background();
        let voices = tokio_test::block_on(read_catalog(&ctx, "sh", &args)).unwrap();

        let names: Vec<&str> = voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Albert", "Anna"]);
        assert_eq!(voices[0].locale, "en_US");
        assert_eq!(voices[1].locale, "de_DE");
        assert_eq!(voices[1].description, "Hallo! Ich heiße Anna.");
    }

    proptest! {
        #[test]
        fn prop_in_range_rate_is_passed(rate in 90.0f64..=500.0) {
            let args = build_args(&request("Hi", None, Some(rate))).unwrap();
            prop_assert_eq!(args.len(), 3);
            prop_assert_eq!(&args[0], "-r");
            prop_assert_eq!(&args[1], &format!("{:.0}", rate));
            prop_assert_eq!(&args[2], "Hi");
        }

        #[test]
        fn prop_out_of_range_rate_is_rejected(
            rate in prop_oneof![0.001f64..90.0, 500.001f64..100_000.0]
        ) {
            let err = build_args(&request("Hi", None, Some(rate))).unwrap_err();
            prop_assert!(err.is_validation());
        }

        #[test]
        fn prop_voice_precedes_rate_and_text(
            voice in "[^\\x00]{1,24}",
            text in "\\PC{1,40}",
            rate in 90u32..=500,
        ) {
            let args = build_args(&request(&text, Some(&voice), Some(rate as f64))).unwrap();
            prop_assert_eq!(args.len(), 5);
            prop_assert_eq!(&args[0], "-v");
            prop_assert_eq!(&args[1], &voice);
            prop_assert_eq!(&args[2], "-r");
            prop_assert_eq!(&args[4], &text);
        }
    }
}
