//! The `speak` and `list_voices` tools.
//!
//! Handlers never fail at the protocol level: every domain error comes back
//! as a [`ToolResult`] with `is_error` set.

use crate::backends::{SpeakRequest, SpeechBackend, VoicesResult};
use crate::error::SpeechError;
use crate::invoker::CallContext;
use crate::mcp::types::McpTool;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::info;

pub const SPEAK: &str = "speak";
pub const LIST_VOICES: &str = "list_voices";

/// Text payload of a tool call, flagged when it describes a logical failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

impl From<Result<String, SpeechError>> for ToolResult {
    fn from(result: Result<String, SpeechError>) -> Self {
        match result {
            Ok(text) => ToolResult::text(text),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

pub fn definitions() -> Vec<McpTool> {
    vec![
        McpTool {
            name: SPEAK.to_string(),
            description: Some(
                "Converts text to audible speech using macOS text-to-speech".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "The text to be spoken aloud"
                    },
                    "voice": {
                        "type": "string",
                        "description": "Voice to use for speech synthesis (optional, uses system default if not specified)"
                    },
                    "rate": {
                        "type": "number",
                        "description": "Speech rate in words per minute (optional, uses system default if not specified)"
                    }
                },
                "required": ["text"]
            }),
        },
        McpTool {
            name: LIST_VOICES.to_string(),
            description: Some(
                "List all available text-to-speech voices on the system with their locales and descriptions"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

/// Raw `speak` arguments. `text` is kept untyped so a missing value and a
/// wrongly typed one can be told apart; the optional fields fall back to
/// `None` when they carry the wrong type.
#[derive(Debug, Default, Deserialize)]
pub struct SpeakArgs {
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub voice: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub rate: Option<f64>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

impl SpeakArgs {
    pub fn from_arguments(arguments: Option<&Value>) -> Self {
        arguments
            .filter(|v| v.is_object())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn into_request(self) -> Result<SpeakRequest, SpeechError> {
        let text = match self.text {
            Some(Value::String(text)) => text,
            Some(_) => return Err(invalid_text("argument \"text\" is not a string")),
            None => return Err(invalid_text("required argument \"text\" not found")),
        };
        SpeakRequest::new(&text, self.voice, self.rate)
    }
}

fn invalid_text(reason: &str) -> SpeechError {
    SpeechError::Validation(format!("Invalid parameter 'text': {}", reason))
}

pub async fn handle_speak(
    backend: &dyn SpeechBackend,
    ctx: &CallContext,
    arguments: Option<&Value>,
) -> ToolResult {
    speak(backend, ctx, arguments).await.into()
}

async fn speak(
    backend: &dyn SpeechBackend,
    ctx: &CallContext,
    arguments: Option<&Value>,
) -> Result<String, SpeechError> {
    let request = SpeakArgs::from_arguments(arguments).into_request()?;
    backend.synthesize(ctx, &request).await?;
    Ok(format!("Successfully spoke: {}", request.text))
}

pub async fn handle_list_voices(backend: &dyn SpeechBackend, ctx: &CallContext) -> ToolResult {
    list_voices(backend, ctx).await.into()
}

async fn list_voices(backend: &dyn SpeechBackend, ctx: &CallContext) -> Result<String, SpeechError> {
    let voices = backend.list_voices(ctx).await?;
    let json = serde_json::to_string_pretty(&VoicesResult { voices })?;
    Ok(json)
}

/// Routes a call by tool name, `None` when no such tool exists.
pub async fn dispatch(
    backend: &dyn SpeechBackend,
    ctx: &CallContext,
    name: &str,
    arguments: Option<&Value>,
) -> Option<ToolResult> {
    info!(tool = name, backend = backend.id(), "Tool call");
    let result = match name {
        SPEAK => handle_speak(backend, ctx, arguments).await,
        LIST_VOICES => handle_list_voices(backend, ctx).await,
        _ => return None,
    };
    if result.is_error {
        info!(tool = name, error = %result.text, "Tool reported an error");
    }
    Some(result)
}
