pub mod catalog;
pub mod say;

use crate::error::SpeechError;
use crate::invoker::CallContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Slowest rate, in words per minute, the speech command accepts.
pub const MIN_RATE: f64 = 90.0;
/// Fastest rate, in words per minute, the speech command accepts.
pub const MAX_RATE: f64 = 500.0;

/// Represents a text-to-speech voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub locale: String,
    /// Sample utterance
    pub description: String,
}

/// Wire shape of the `list_voices` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicesResult {
    pub voices: Vec<Voice>,
}

/// A validated request to speak. `text` is trimmed and never empty, and a
/// present `rate` lies within [`MIN_RATE`, `MAX_RATE`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakRequest {
    pub text: String,
    pub voice: Option<String>,
    pub rate: Option<f64>,
}

impl SpeakRequest {
    /// Empty voices and non-positive rates mean "system default" and are dropped.
    pub fn new(
        text: &str,
        voice: Option<String>,
        rate: Option<f64>,
    ) -> Result<Self, SpeechError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SpeechError::Validation(
                "Parameter 'text' cannot be empty".to_string(),
            ));
        }

        let voice = voice.filter(|v| !v.is_empty());
        let rate = rate.filter(|r| *r > 0.0);
        if let Some(rate) = rate {
            check_rate(rate)?;
        }

        Ok(Self {
            text: text.to_string(),
            voice,
            rate,
        })
    }
}

pub fn check_rate(rate: f64) -> Result<(), SpeechError> {
    if !(MIN_RATE..=MAX_RATE).contains(&rate) {
        return Err(SpeechError::Validation(format!(
            "Rate {:.0} is outside acceptable range (90-500 words per minute)",
            rate
        )));
    }
    Ok(())
}

/// The two things the tools need from a synthesis engine.
/// Handlers only see this trait, so they can be exercised against a fake.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Returns the unique ID of the backend (e.g., "say")
    fn id(&self) -> &'static str;

    /// Speaks `request` aloud on the default audio device.
    async fn synthesize(&self, ctx: &CallContext, request: &SpeakRequest)
        -> Result<(), SpeechError>;

    /// Returns the installed voices in the order the engine reports them.
    async fn list_voices(&self, ctx: &CallContext) -> Result<Vec<Voice>, SpeechError>;
}
