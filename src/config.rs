//! Bot configuration types
//!
//! Configuration is read once at startup from an optional TOML file and then
//! overlaid with environment variables. There is no runtime reconfiguration.

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the TOML config file
pub const CONFIG_PATH_ENV: &str = "CHAT_TTS_CONFIG";

/// Config file used when `CHAT_TTS_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "chat-tts.toml";

/// Default maximum number of characters spoken per message
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 200;

/// Default dispatcher polling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// First delay before re-dialing a dropped chat connection
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Top-level bot configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotConfig {
    /// How often the dispatcher checks the queue
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    /// Chat connection settings
    pub chat: ChatConfig,
    /// Volume service settings
    pub volume_api: VolumeApiConfig,
    /// Speech settings
    pub tts: TtsConfig,
}

/// Twitch chat connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub host: String,
    pub port: u16,
    /// Bot account login name
    pub username: String,
    /// `oauth:`-prefixed chat token
    pub oauth_token: String,
    /// Channel name without the leading `#`
    pub channel: String,
    /// Initial re-dial delay; doubles per failed attempt up to a fixed cap
    #[serde(with = "duration_serde")]
    pub reconnect_delay: Duration,
}

/// Volume service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VolumeApiConfig {
    pub base_url: String,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

/// Speech settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    /// Engine voice name; engine default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Speech rate multiplier (1.0 = engine's normal rate)
    pub speed: f32,
    /// Maximum characters spoken per message
    pub max_message_length: usize,
    /// Multiplier applied to the resolver volume before it is handed to the engine
    pub base_volume: f64,
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            chat: ChatConfig::default(),
            volume_api: VolumeApiConfig::default(),
            tts: TtsConfig::default(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: "irc.chat.twitch.tv".to_string(),
            port: 6667,
            username: String::new(),
            oauth_token: String::new(),
            channel: String::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl Default for VolumeApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice: None,
            speed: 1.0,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            base_volume: 1.0,
        }
    }
}

impl BotConfig {
    /// Load configuration from `$CHAT_TTS_CONFIG` (or `./chat-tts.toml`),
    /// overlay environment variables and validate the result.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            tracing::info!(path = %path, "No TOML config found; using defaults/env");
            Self::default()
        };
        let config = config.overlay_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| DispatchError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply environment overrides on top of the current values
    pub fn overlay_env(self) -> Self {
        self.overlay_with(|key| std::env::var(key).ok())
    }

    fn overlay_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = get("TWITCH_USERNAME") {
            self.chat.username = v;
        }
        if let Some(v) = get("TWITCH_OAUTH") {
            self.chat.oauth_token = v;
        }
        if let Some(v) = get("TWITCH_CHANNEL") {
            self.chat.channel = v;
        }
        if let Some(v) = get("VOLUME_API_URL") {
            self.volume_api.base_url = v;
        }
        if let Some(v) = get("TTS_VOICE") {
            self.tts.voice = Some(v);
        }
        self
    }

    /// Reject settings the dispatcher cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(DispatchError::Config(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        if self.chat.reconnect_delay.is_zero() {
            return Err(DispatchError::Config(
                "chat.reconnect_delay must be non-zero".to_string(),
            ));
        }
        if self.tts.max_message_length == 0 {
            return Err(DispatchError::Config(
                "tts.max_message_length must be at least 1".to_string(),
            ));
        }
        if !(self.tts.speed.is_finite() && self.tts.speed > 0.0) {
            return Err(DispatchError::Config(format!(
                "tts.speed must be positive, got {}",
                self.tts.speed
            )));
        }
        Ok(())
    }

    /// Set chat credentials (builder pattern)
    pub fn with_chat(mut self, chat: ChatConfig) -> Self {
        self.chat = chat;
        self
    }

    /// Set the volume service base URL (builder pattern)
    pub fn with_volume_api_url(mut self, base_url: impl Into<String>) -> Self {
        self.volume_api.base_url = base_url.into();
        self
    }

    /// Set the polling interval (builder pattern)
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the maximum message length (builder pattern)
    pub fn with_max_message_length(mut self, max_message_length: usize) -> Self {
        self.tts.max_message_length = max_message_length;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_bot_config_default() {
        let config = BotConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.tts.max_message_length, 200);
        assert_eq!(config.tts.speed, 1.0);
        assert!(config.tts.voice.is_none());
        assert_eq!(config.chat.host, "irc.chat.twitch.tv");
        assert_eq!(config.chat.port, 6667);
        assert_eq!(config.chat.reconnect_delay, DEFAULT_RECONNECT_DELAY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bot_config_builders() {
        let config = BotConfig::default()
            .with_volume_api_url("https://volume.example.com")
            .with_poll_interval(Duration::from_millis(250))
            .with_max_message_length(50);
        assert_eq!(config.volume_api.base_url, "https://volume.example.com");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.tts.max_message_length, 50);
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = BotConfig::default().with_poll_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_length() {
        let config = BotConfig::default().with_max_message_length(0);
        assert!(matches!(config.validate(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_reconnect_delay() {
        let mut config = BotConfig::default();
        config.chat.reconnect_delay = Duration::ZERO;
        assert!(matches!(config.validate(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_speed() {
        let mut config = BotConfig::default();
        config.tts.speed = 0.0;
        assert!(config.validate().is_err());
        config.tts.speed = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
poll_interval = 500

[chat]
username = "ttsbot"
channel = "somechannel"
reconnect_delay = 250

[tts]
voice = "Alex"
max_message_length = 120
"#
        )
        .unwrap();

        let config = BotConfig::from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.chat.username, "ttsbot");
        assert_eq!(config.chat.channel, "somechannel");
        assert_eq!(config.chat.port, 6667);
        assert_eq!(config.chat.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.tts.voice.as_deref(), Some("Alex"));
        assert_eq!(config.tts.max_message_length, 120);
        assert_eq!(config.tts.speed, 1.0);
        assert_eq!(config.volume_api.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval = \"soon\"").unwrap();
        let err = BotConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = BotConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, DispatchError::Io(_)));
    }

    #[test]
    fn test_overlay_env_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TWITCH_USERNAME", "envbot"),
            ("TWITCH_OAUTH", "oauth:abc"),
            ("TWITCH_CHANNEL", ""),
            ("VOLUME_API_URL", "http://api.local"),
            ("TTS_VOICE", "Samantha"),
        ]);
        let config = BotConfig::default().overlay_with(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.chat.username, "envbot");
        assert_eq!(config.chat.oauth_token, "oauth:abc");
        // empty values do not override
        assert_eq!(config.chat.channel, "");
        assert_eq!(config.volume_api.base_url, "http://api.local");
        assert_eq!(config.tts.voice.as_deref(), Some("Samantha"));
    }

    #[test]
    fn test_bot_config_toml_roundtrip() {
        let config = BotConfig::default().with_poll_interval(Duration::from_millis(750));
        let raw = toml::to_string(&config).unwrap();
        assert!(raw.contains("poll_interval = 750"));
        let parsed: BotConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed, config);
    }
}
