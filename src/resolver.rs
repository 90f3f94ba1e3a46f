//! Volume lookup against the external volume service
//!
//! The service owns per-user volume progression. This module only asks it for
//! the current level; it never retries and it collapses every way a lookup can
//! go wrong (transport, status code, malformed body, `success: false`) into a
//! single [`DispatchError::Resolver`].

use crate::config::VolumeApiConfig;
use crate::error::{DispatchError, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Resolved playback volume for one user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Level in the service's native unit
    pub volume: f64,
    /// Level for display in chat
    pub volume_percent: i64,
    /// How many times the user has used TTS
    pub usage_count: u64,
}

/// Source of per-user volume and usage information
#[async_trait]
pub trait VolumeResolver: Send + Sync {
    /// Resolve the volume for a TTS request. Called exactly once per request.
    async fn resolve_volume(&self, user: &str) -> Result<VolumeInfo>;

    /// Human-readable volume summary for `!volume`
    async fn volume_summary(&self, user: &str) -> Result<String>;

    /// Human-readable service statistics for `!ttsstats`
    async fn stats(&self) -> Result<String>;
}

/// Wire format of `GET /api/tts/{user}/json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeResponse {
    success: bool,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    volume_percent: Option<f64>,
    #[serde(default)]
    tts_count: Option<f64>,
}

impl VolumeResponse {
    fn into_info(self) -> Result<VolumeInfo> {
        if !self.success {
            return Err(DispatchError::Resolver("API returned error".to_string()));
        }
        let volume = self
            .volume
            .ok_or_else(|| DispatchError::Resolver("response missing volume".to_string()))?;
        let volume_percent = self.volume_percent.ok_or_else(|| {
            DispatchError::Resolver("response missing volumePercent".to_string())
        })?;
        Ok(VolumeInfo {
            volume,
            volume_percent: volume_percent.round() as i64,
            usage_count: self.tts_count.unwrap_or(0.0).max(0.0) as u64,
        })
    }
}

/// HTTP client for the volume service
pub struct HttpVolumeResolver {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpVolumeResolver {
    /// Create a resolver for the configured service
    pub fn new(config: &VolumeApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DispatchError::Config(format!("invalid volume_api.base_url {:?}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DispatchError::Config(format!(
                "volume_api.base_url {:?} cannot be used as a base URL",
                config.base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("chat-tts/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DispatchError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    /// Build `{base}/seg1/seg2/...` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        debug!(url = %url, "Requesting volume service");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DispatchError::Resolver(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Resolver(format!(
                "API responded with {}",
                status.as_u16()
            )));
        }
        Ok(response)
    }

    async fn get_text(&self, url: Url) -> Result<String> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| DispatchError::Resolver(e.to_string()))
    }
}

#[async_trait]
impl VolumeResolver for HttpVolumeResolver {
    async fn resolve_volume(&self, user: &str) -> Result<VolumeInfo> {
        let url = self.endpoint(&["api", "tts", user, "json"]);
        let body: VolumeResponse = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(|e| DispatchError::Resolver(format!("malformed response: {}", e)))?;
        body.into_info()
    }

    async fn volume_summary(&self, user: &str) -> Result<String> {
        self.get_text(self.endpoint(&["api", "tts", user])).await
    }

    async fn stats(&self) -> Result<String> {
        self.get_text(self.endpoint(&["api", "stats"])).await
    }
}
