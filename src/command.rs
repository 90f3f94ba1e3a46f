//! Chat command parsing

/// Command tokens understood by the bot
pub mod tokens {
    pub const TTS: &str = "!tts";
    pub const VOLUME: &str = "!volume";
    pub const HELP: &str = "!ttshelp";
    pub const STATS: &str = "!ttsstats";
}

/// A classified chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// `!tts <payload>`; payload is the raw text after the command and one space
    Tts(String),
    /// `!volume`
    Volume,
    /// `!ttshelp`
    Help,
    /// `!ttsstats`
    Stats,
    /// Anything else, including the bot's own messages
    None,
}

impl ChatCommand {
    /// Classify a chat message.
    ///
    /// Messages sent by the bot itself are never commands. Matching is
    /// ASCII case-insensitive on the trimmed message.
    pub fn parse(message: &str, is_self: bool) -> Self {
        if is_self {
            return Self::None;
        }
        let msg = message.trim();

        if msg.eq_ignore_ascii_case(tokens::TTS) {
            return Self::Tts(String::new());
        }
        let prefix_len = tokens::TTS.len() + 1;
        if let Some(prefix) = msg.get(..prefix_len) {
            if prefix.eq_ignore_ascii_case("!tts ") {
                return Self::Tts(msg[prefix_len..].to_string());
            }
        }

        if msg.eq_ignore_ascii_case(tokens::VOLUME) {
            Self::Volume
        } else if msg.eq_ignore_ascii_case(tokens::HELP) {
            Self::Help
        } else if msg.eq_ignore_ascii_case(tokens::STATS) {
            Self::Stats
        } else {
            Self::None
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tts(_) => "tts",
            Self::Volume => "volume",
            Self::Help => "help",
            Self::Stats => "stats",
            Self::None => "none",
        }
    }
}
