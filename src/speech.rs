//! Speech synthesis backends
//!
//! The dispatcher only needs one thing from a backend: speak this text, and
//! tell me when you are done (or that you failed). [`SystemSpeech`] does that by
//! running a local CLI engine and waiting for it to exit:
//! - `say` (macOS)
//! - `espeak-ng`, falling back to `espeak`
//!
//! Env overrides:
//! - `TTS_ENGINE_BIN`: path to the engine binary; its file name picks the engine
//!
//! Volume is a hint. It is forwarded only to engines with a volume flag
//! (espeak's amplitude) and is never applied as a software gain.

use crate::error::{DispatchError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

/// Words per minute at speed 1.0
pub const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Voice settings shared by every job
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    /// Engine voice name; engine default when `None`
    pub voice: Option<String>,
    /// Rate multiplier
    pub speed: f32,
    /// Multiplier applied to each job's volume hint
    pub base_volume: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice: None,
            speed: 1.0,
            base_volume: 1.0,
        }
    }
}

impl From<&crate::config::TtsConfig> for VoiceConfig {
    fn from(tts: &crate::config::TtsConfig) -> Self {
        Self {
            voice: tts.voice.clone(),
            speed: tts.speed,
            base_volume: tts.base_volume,
        }
    }
}

impl VoiceConfig {
    fn words_per_minute(&self) -> u32 {
        (BASE_WORDS_PER_MINUTE * self.speed).round().max(1.0) as u32
    }
}

/// Something that can speak text on the audio device
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Speak `text` and return once playback has finished.
    ///
    /// `volume` is the job's volume in the resolver's unit, passed through as
    /// a hint.
    async fn speak(&self, text: &str, voice: &VoiceConfig, volume: f64) -> Result<()>;
}

/// Supported CLI engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Say,
    Espeak,
}

impl Engine {
    fn from_bin(bin: &Path) -> Self {
        match bin.file_name().and_then(|n| n.to_str()) {
            Some("say") => Self::Say,
            _ => Self::Espeak,
        }
    }

    /// Command-line arguments for speaking `text`
    pub fn args(&self, text: &str, voice: &VoiceConfig, volume: f64) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(name) = &voice.voice {
            args.push("-v".to_string());
            args.push(name.clone());
        }
        match self {
            Self::Say => {
                args.push("-r".to_string());
                args.push(voice.words_per_minute().to_string());
                // `say` has no `--`; a leading space keeps the text from
                // parsing as a flag
                if text.starts_with('-') {
                    args.push(format!(" {}", text));
                } else {
                    args.push(text.to_string());
                }
            }
            Self::Espeak => {
                args.push("-s".to_string());
                args.push(voice.words_per_minute().to_string());
                // espeak amplitude: 0..=200, 100 is normal
                let amplitude = (volume * voice.base_volume * 100.0).round().clamp(0.0, 200.0);
                args.push("-a".to_string());
                args.push((amplitude as u32).to_string());
                args.push("--".to_string());
                args.push(text.to_string());
            }
        }
        args
    }
}

/// Speech through a locally installed CLI engine
pub struct SystemSpeech {
    bin: PathBuf,
    engine: Engine,
}

impl SystemSpeech {
    /// Use a specific engine binary
    pub fn with_bin(bin: impl Into<PathBuf>) -> Self {
        let bin = bin.into();
        let engine = Engine::from_bin(&bin);
        Self { bin, engine }
    }

    /// Find an engine via `TTS_ENGINE_BIN` or `PATH`
    pub fn detect() -> Result<Self> {
        let bin = std::env::var("TTS_ENGINE_BIN")
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .or_else(|| {
                let candidates: &[&str] = if cfg!(target_os = "macos") {
                    &["say", "espeak-ng", "espeak"]
                } else {
                    &["espeak-ng", "espeak"]
                };
                candidates.iter().find_map(|bin| get_from_path(bin))
            })
            .ok_or_else(|| {
                DispatchError::Synthesis(
                    "no TTS engine found (install espeak-ng or set TTS_ENGINE_BIN)".to_string(),
                )
            })?;
        let speech = Self::with_bin(bin);
        info!(bin = ?speech.bin, engine = ?speech.engine, "Detected TTS engine");
        Ok(speech)
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }
}

fn get_from_path(bin: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.is_file())
}

#[async_trait]
impl SpeechBackend for SystemSpeech {
    async fn speak(&self, text: &str, voice: &VoiceConfig, volume: f64) -> Result<()> {
        let args = self.engine.args(text, voice, volume);
        debug!(bin = ?self.bin, ?args, "Running TTS engine");

        let output = tokio::process::Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DispatchError::Synthesis(format!("failed to run {:?}: {}", self.bin, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DispatchError::Synthesis(format!(
                "{:?} exited with {}: {}",
                self.bin,
                output.status,
                stderr.trim()
            )))
        }
    }
}
