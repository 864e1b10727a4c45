use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, future::Future, time::Duration};
use tracing::debug;
use url::Url;

mod error;
mod mode;
mod preview;
mod qwen;

pub use error::{ErrorKind, Result, SynthesisError};
pub use mode::VoiceMode;
pub use preview::{await_completion, Frame, FrameSource, PreviewComplete, PreviewState};
pub use qwen::{QwenTtsClient, VoiceSummary};


/// Options passed by the host alongside each request. No option is currently
/// supported; the map is accepted and ignored.
pub type TtsOptions = HashMap<String, serde_json::Value>;

/// Connection and voice settings for one TTS server.
///
/// Everything except `session_id` is fixed once a client is built.
/// `session_id` may be filled in later when `establish_session` is enabled
/// and a session gets created from the reference audio.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SynthesisOption {
    pub base_url: String,
    pub voice_id: Option<String>,
    pub session_id: Option<String>,
    pub reference_audio_url: Option<String>,
    pub reference_transcription: Option<String>,
    /// Display label only.
    pub voice_name: Option<String>,
    pub establish_session: bool,
}

impl SynthesisOption {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Validate `base_url` and strip its trailing slash.
    pub fn normalize(mut self) -> Result<Self> {
        self.base_url = normalize_base_url(&self.base_url)?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub health: Duration,
    pub download: Duration,
    /// Preview synthesis can legitimately take a long time, so it is
    /// unbounded unless configured.
    pub preview: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            health: Duration::from_secs(10),
            download: Duration::from_secs(30),
            preview: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFormat {
    #[default]
    Wav,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TtsAudio {
    pub format: AudioFormat,
    pub data: Bytes,
}

impl TtsAudio {
    pub fn wav(data: Bytes) -> Self {
        Self {
            format: AudioFormat::Wav,
            data,
        }
    }
}

#[async_trait]
pub trait SynthesisClient: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str, options: &TtsOptions)
        -> Result<TtsAudio>;
}

/// Run `fut` under `limit`. A zero limit waits indefinitely.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if limit.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            debug!(limit_ms = limit.as_millis() as u64, "deadline elapsed {}", what);
            Err(SynthesisError::Timeout(what))
        }
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed)
        .map_err(|e| SynthesisError::Config(format!("invalid base URL {:?}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(SynthesisError::Config(format!(
                "Invalid base URL scheme: {}",
                other
            )))
        }
    }
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(SynthesisError::Config(format!(
            "base URL {:?} has no host",
            raw
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Map an `http(s)` base URL onto its websocket counterpart and append `path`.
pub(crate) fn ws_url_from_http(base_url: &str, path: &str) -> Result<String> {
    let mut parsed = Url::parse(base_url)
        .map_err(|e| SynthesisError::Config(format!("invalid base URL {:?}: {}", base_url, e)))?;
    let scheme = match parsed.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(SynthesisError::Config(format!(
                "Invalid base URL scheme: {}",
                other
            )))
        }
    };
    parsed
        .set_scheme(scheme)
        .map_err(|_| SynthesisError::Config(format!("cannot map {} to {}", base_url, scheme)))?;
    Ok(join_url(parsed.as_str(), path))
}
