use super::{
    await_completion, bounded, join_url,
    preview::{WsFrameSource, HEARTBEAT_INTERVAL},
    ws_url_from_http, PreviewComplete, Result, SynthesisClient, SynthesisError, SynthesisOption,
    Timeouts, TtsAudio, TtsOptions, VoiceMode,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    header::CONTENT_TYPE,
    multipart::{Form, Part},
    Response, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    sync::{PoisonError, RwLock},
    time::Instant,
};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

const DEFAULT_REFERENCE_CONTENT_TYPE: &str = "audio/wav";
const REFERENCE_FILE_NAME: &str = "reference.wav";

/// One entry of the server's `/voices` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSummary {
    pub voice_id: Option<String>,
    pub name: Option<String>,
}

impl VoiceSummary {
    fn from_entry(entry: &Value) -> Self {
        let field = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            voice_id: field("voice_id"),
            name: field("name"),
        }
    }

    fn usable_id(&self) -> Option<&str> {
        self.voice_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    session_id: Option<String>,
}

/// Client for a Qwen voice-cloning TTS server.
///
/// The HTTP client is borrowed from the host and shared across calls. The
/// record is re-read on every call, so a session established by one call is
/// used by the next.
#[derive(Debug)]
pub struct QwenTtsClient {
    http: reqwest::Client,
    option: RwLock<SynthesisOption>,
    timeouts: Timeouts,
}

impl QwenTtsClient {
    pub fn new(option: SynthesisOption, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            http,
            option: RwLock::new(option.normalize()?),
            timeouts: Timeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Snapshot of the current record.
    pub fn option(&self) -> SynthesisOption {
        self.option
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.option().session_id
    }

    // Concurrent promotions race; the last writer wins.
    fn set_session_id(&self, session_id: &str) {
        self.option
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .session_id = Some(session_id.to_string());
    }

    pub async fn list_voices(&self) -> Result<Vec<VoiceSummary>> {
        let base_url = self.option().base_url;
        self.fetch_voices(&base_url).await
    }

    /// Upload the configured reference audio to `/upload` and keep the
    /// returned session id for subsequent calls.
    pub async fn establish_session(&self) -> Result<String> {
        let option = self.option();
        let url = option
            .reference_audio_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                SynthesisError::MissingPrerequisite(
                    "No session_id configured and no reference_audio_url available.".to_string(),
                )
            })?;
        self.establish_session_from(
            &option.base_url,
            url,
            option.reference_transcription.as_deref(),
        )
        .await
    }

    async fn fetch_voices(&self, base_url: &str) -> Result<Vec<VoiceSummary>> {
        let url = join_url(base_url, "voices");
        let body = bounded(self.timeouts.download, "fetching voice list", async {
            let response = self.http.get(&url).send().await?;
            read_ok(response, "Voice listing").await
        })
        .await?;

        let listing: Value = serde_json::from_slice(&body).map_err(|e| {
            warn!(url = %url, "voice listing is not valid JSON: {}", e);
            SynthesisError::NoUsableVoice
        })?;
        Ok(listing
            .get("voices")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(VoiceSummary::from_entry).collect())
            .unwrap_or_default())
    }

    async fn select_default_voice(&self, base_url: &str) -> Result<String> {
        let voices = self.fetch_voices(base_url).await?;
        let voice_id = voices
            .iter()
            .find_map(VoiceSummary::usable_id)
            .map(str::to_string)
            .ok_or(SynthesisError::NoUsableVoice)?;
        info!(%voice_id, available = voices.len(), "auto-selected voice");
        Ok(voice_id)
    }

    async fn preview_from_voice(&self, base_url: &str, voice_id: &str, text: &str) -> Result<Bytes> {
        let url = join_url(base_url, "preview-from-voice");
        let form = Form::new()
            .text("voice_id", voice_id.to_string())
            .text("response_text", text.to_string());

        bounded(self.timeouts.preview, "waiting for preview", async {
            let response = self.http.post(&url).multipart(form).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(SynthesisError::VoiceNotFound(voice_id.to_string()));
            }
            read_ok(response, "Preview").await
        })
        .await
    }

    async fn preview_from_session(
        &self,
        base_url: &str,
        session_id: &str,
        text: &str,
    ) -> Result<Bytes> {
        let ws_url = ws_url_from_http(base_url, "/ws")?;
        let payload = json!({
            "type": "generate_preview",
            "data": { "session_id": session_id, "text": text },
        });

        let complete: PreviewComplete = bounded(self.timeouts.preview, "waiting for TTS audio", async {
            debug!(url = %ws_url, "connecting preview websocket");
            let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
            let mut source = WsFrameSource::new(ws_stream, HEARTBEAT_INTERVAL);
            source.send_json(&payload).await?;
            let complete = await_completion(&mut source).await;
            source.close().await;
            complete
        })
        .await?;

        debug!(audio_url = %complete.audio_url, "preview complete");
        self.download_audio(base_url, &complete.audio_url).await
    }

    async fn download_audio(&self, base_url: &str, audio_url: &str) -> Result<Bytes> {
        let url = resolve_audio_url(base_url, audio_url);
        bounded(self.timeouts.download, "downloading audio", async {
            let response = self.http.get(&url).send().await?;
            read_ok(response, "Audio download").await
        })
        .await
    }

    async fn download_reference(&self, url: &str) -> Result<(Bytes, String)> {
        bounded(self.timeouts.download, "downloading reference audio", async {
            let response = self.http.get(url).send().await?;
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_REFERENCE_CONTENT_TYPE)
                .to_string();
            let data = read_ok(response, "Reference audio download").await?;
            debug!(url, %content_type, bytes = data.len(), "downloaded reference audio");
            Ok((data, content_type))
        })
        .await
    }

    async fn preview_from_reference(
        &self,
        base_url: &str,
        reference_url: &str,
        transcription: Option<&str>,
        text: &str,
    ) -> Result<Bytes> {
        let transcription = transcription.map(str::trim).unwrap_or_default();
        if transcription.is_empty() {
            warn!("reference_transcription is not configured, server may reject the preview");
        }

        let (audio, content_type) = self.download_reference(reference_url).await?;
        let part = reference_part(&audio, &content_type)?;
        let form = Form::new()
            .part("audio", part)
            .text("transcription", transcription.to_string())
            .text("response_text", text.to_string());

        let url = join_url(base_url, "preview");
        bounded(self.timeouts.preview, "waiting for preview", async {
            let response = self.http.post(&url).multipart(form).send().await?;
            read_ok(response, "Preview").await
        })
        .await
    }

    async fn establish_session_from(
        &self,
        base_url: &str,
        reference_url: &str,
        transcription: Option<&str>,
    ) -> Result<String> {
        let (audio, content_type) = self.download_reference(reference_url).await?;
        let part = reference_part(&audio, &content_type)?;
        let mut form = Form::new().part("audio", part);
        if let Some(transcription) = transcription.map(str::trim).filter(|t| !t.is_empty()) {
            form = form.text("transcription", transcription.to_string());
        }

        let url = join_url(base_url, "upload");
        let body = bounded(self.timeouts.preview, "uploading reference audio", async {
            let response = self.http.post(&url).multipart(form).send().await?;
            read_ok(response, "Reference upload").await
        })
        .await?;

        let upload: UploadResponse = serde_json::from_slice(&body)
            .map_err(|e| SynthesisError::Protocol(format!("invalid upload response: {}", e)))?;
        let session_id = upload
            .session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                SynthesisError::Protocol("upload response missing session_id".to_string())
            })?;

        self.set_session_id(&session_id);
        info!(%session_id, "established reference session");
        Ok(session_id)
    }
}

#[async_trait]
impl SynthesisClient for QwenTtsClient {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        options: &TtsOptions,
    ) -> Result<TtsAudio> {
        let option = self.option();
        let base_url = option.base_url.clone();
        let mode = VoiceMode::resolve(&option);
        if !options.is_empty() {
            debug!(keys = ?options.keys().collect::<Vec<_>>(), "ignoring synthesis options");
        }
        info!(
            mode = mode.name(),
            language,
            chars = text.chars().count(),
            "synthesizing"
        );

        let start = Instant::now();
        let data = match &mode {
            VoiceMode::SavedVoice(voice_id) => {
                self.preview_from_voice(&base_url, voice_id, text).await?
            }
            VoiceMode::AutoSelect => {
                let voice_id = self.select_default_voice(&base_url).await?;
                self.preview_from_voice(&base_url, &voice_id, text).await?
            }
            VoiceMode::EstablishedSession(session_id) => {
                self.preview_from_session(&base_url, session_id, text).await?
            }
            VoiceMode::AdHocReference { url, transcription } if option.establish_session => {
                let session_id = self
                    .establish_session_from(&base_url, url, transcription.as_deref())
                    .await?;
                self.preview_from_session(&base_url, &session_id, text).await?
            }
            VoiceMode::AdHocReference { url, transcription } => {
                self.preview_from_reference(&base_url, url, transcription.as_deref(), text)
                    .await?
            }
        };

        info!(
            mode = mode.name(),
            bytes = data.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "synthesis complete"
        );
        Ok(TtsAudio::wav(data))
    }
}

/// Absolute URLs are used as-is; anything else is relative to `base_url`.
pub(crate) fn resolve_audio_url(base_url: &str, audio_url: &str) -> String {
    if audio_url.starts_with("http://") || audio_url.starts_with("https://") {
        audio_url.to_string()
    } else {
        join_url(base_url, audio_url)
    }
}

/// Reference audio as a multipart file part. A `Content-Type` that is not a
/// valid MIME type is replaced by the default.
fn reference_part(audio: &Bytes, content_type: &str) -> Result<Part> {
    let part = || Part::bytes(audio.to_vec()).file_name(REFERENCE_FILE_NAME);
    match part().mime_str(content_type) {
        Ok(part) => Ok(part),
        Err(e) => {
            warn!(%content_type, "unusable reference content type: {}", e);
            Ok(part().mime_str(DEFAULT_REFERENCE_CONTENT_TYPE)?)
        }
    }
}

async fn read_ok(response: Response, context: &'static str) -> Result<Bytes> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        warn!(%status, "{} failed", context);
        return Err(SynthesisError::remote(context, status.as_u16(), &body));
    }
    Ok(response.bytes().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_poisoned_record_is_recovered() {
        let option = SynthesisOption {
            session_id: Some("sess-1".to_string()),
            ..SynthesisOption::new("http://127.0.0.1:8000")
        };
        let client = Arc::new(QwenTtsClient::new(option, reqwest::Client::new()).unwrap());

        let writer = client.clone();
        let poisoned = std::thread::spawn(move || {
            let _guard = writer.option.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(poisoned.is_err());
        assert!(client.option.is_poisoned());

        assert_eq!(client.session_id().as_deref(), Some("sess-1"));
        client.set_session_id("sess-2");
        assert_eq!(client.session_id().as_deref(), Some("sess-2"));
    }
}
