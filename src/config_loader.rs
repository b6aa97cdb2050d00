use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::path::Path;
use std::sync::RwLock;
use tracing::warn;

pub const DEFAULT_SAY_COMMAND: &str = "/usr/bin/say";
pub const DEFAULT_SERVER_NAME: &str = "kj-speech-mcp";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Path to the speech synthesis executable
    pub say_command: String,
    /// Deadline for a single tool call, 0 disables it
    pub request_timeout_secs: u64,
    pub server_name: String,
    pub server_version: String,
    /// Used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            say_command: DEFAULT_SAY_COMMAND.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            server_name: DEFAULT_SERVER_NAME.to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
        }
    }
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings::new().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load settings, falling back to defaults");
        Settings::default()
    }));
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Layers defaults, the optional `Speech` files, an explicit file and
    /// `SPEECH_*` environment variables, in that order.
    pub fn load(explicit: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();

        let mut builder = Config::builder()
            .set_default("say_command", defaults.say_command)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("server_name", defaults.server_name)?
            .set_default("server_version", defaults.server_version)?
            .set_default("log_level", defaults.log_level)?
            // Local config file (if exists)
            .add_source(File::with_name("Speech").required(false));

        if let Some(config_dir) = dirs::config_dir() {
            let user_file = config_dir.join("speech-mcp").join("Speech");
            builder = builder.add_source(
                File::with_name(&user_file.to_string_lossy()).required(false),
            );
        }

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        // e.g. SPEECH_SAY_COMMAND, SPEECH_REQUEST_TIMEOUT_SECS
        builder = builder.add_source(config::Environment::with_prefix("SPEECH"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.say_command.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "say_command must not be empty".to_string(),
            ));
        }
        if self.server_name.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "server_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_config_load() {
        let settings = Settings::new().expect("Failed to load settings");
        assert!(!settings.say_command.is_empty());
        assert!(!settings.server_name.is_empty());
    }

    #[test]
    #[serial]
    fn test_env_overrides_command() {
        std::env::set_var("SPEECH_SAY_COMMAND", "/opt/bin/say");
        std::env::set_var("SPEECH_REQUEST_TIMEOUT_SECS", "7");
        let settings = Settings::new();
        std::env::remove_var("SPEECH_SAY_COMMAND");
        std::env::remove_var("SPEECH_REQUEST_TIMEOUT_SECS");

        let settings = settings.expect("Failed to load settings");
        assert_eq!(settings.say_command, "/opt/bin/say");
        assert_eq!(settings.request_timeout_secs, 7);
    }

    #[test]
    #[serial]
    fn test_explicit_file_is_layered() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "say_command = \"/usr/local/bin/say\"").unwrap();
        writeln!(file, "request_timeout_secs = 0").unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.say_command, "/usr/local/bin/say");
        assert_eq!(settings.request_timeout_secs, 0);
        assert_eq!(settings.server_name, DEFAULT_SERVER_NAME);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let settings = Settings {
            say_command: "  ".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
