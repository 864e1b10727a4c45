//! Validation of user-supplied connection settings, producing the record the
//! synthesis client is built from.

use crate::synthesis::{join_url, normalize_base_url, SynthesisOption, Timeouts};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid_url: {0}")]
    InvalidUrl(String),
    #[error("cannot_connect: {0}")]
    CannotConnect(String),
}

impl SetupError {
    /// Short code suitable for a form error.
    pub fn code(&self) -> &'static str {
        match self {
            SetupError::InvalidUrl(_) => "invalid_url",
            SetupError::CannotConnect(_) => "cannot_connect",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupInput {
    pub base_url: String,
    pub voice_id: Option<String>,
    pub session_id: Option<String>,
    pub reference_audio_url: Option<String>,
    pub reference_transcription: Option<String>,
    pub voice_name: Option<String>,
    #[serde(default)]
    pub establish_session: bool,
}

fn cleaned(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `GET {base_url}/health`; only a 200 with `{"status": "ok"}` counts.
pub async fn check_health(http: &reqwest::Client, base_url: &str, timeout: Duration) -> bool {
    let url = join_url(base_url, "health");
    let mut request = http.get(&url);
    if !timeout.is_zero() {
        request = request.timeout(timeout);
    }
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(url = %url, "health check failed: {}", e);
            return false;
        }
    };
    if response.status() != StatusCode::OK {
        debug!(url = %url, status = %response.status(), "health check rejected");
        return false;
    }
    match response.json::<Value>().await {
        Ok(body) => body.get("status").and_then(Value::as_str) == Some("ok"),
        Err(e) => {
            debug!(url = %url, "health response is not JSON: {}", e);
            false
        }
    }
}

pub async fn validate_setup(
    http: &reqwest::Client,
    input: SetupInput,
    timeouts: &Timeouts,
) -> Result<SynthesisOption, SetupError> {
    let base_url =
        normalize_base_url(&input.base_url).map_err(|e| SetupError::InvalidUrl(e.to_string()))?;

    if !check_health(http, &base_url, timeouts.health).await {
        warn!(%base_url, "TTS server is not healthy");
        return Err(SetupError::CannotConnect(base_url));
    }

    let option = SynthesisOption {
        base_url,
        voice_id: cleaned(input.voice_id),
        session_id: cleaned(input.session_id),
        reference_audio_url: cleaned(input.reference_audio_url),
        reference_transcription: cleaned(input.reference_transcription),
        voice_name: cleaned(input.voice_name),
        establish_session: input.establish_session,
    };
    info!(
        base_url = %option.base_url,
        mode = crate::synthesis::VoiceMode::resolve(&option).name(),
        "TTS server configured"
    );
    Ok(option)
}
