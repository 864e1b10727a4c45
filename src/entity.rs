use crate::synthesis::{
    QwenTtsClient, Result, SynthesisClient, SynthesisError, TtsAudio, TtsOptions,
};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const ENTITY_NAME: &str = "Qwen TTS";

const SUPPORTED_LANGUAGES: &[&str] = &[DEFAULT_LANGUAGE];
const SUPPORTED_OPTIONS: &[&str] = &[];

/// The speech entity the host platform talks to.
pub struct QwenTtsEntity {
    unique_id: String,
    client: Arc<dyn SynthesisClient>,
}

impl QwenTtsEntity {
    pub fn new(unique_id: impl Into<String>, client: Arc<dyn SynthesisClient>) -> Self {
        Self {
            unique_id: unique_id.into(),
            client,
        }
    }

    /// Entity keyed by the client's normalized server URL.
    pub fn from_qwen(client: QwenTtsClient) -> Self {
        let unique_id = client.option().base_url;
        Self::new(unique_id, Arc::new(client))
    }

    pub fn name(&self) -> &'static str {
        ENTITY_NAME
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn default_language(&self) -> &'static str {
        DEFAULT_LANGUAGE
    }

    pub fn supported_languages(&self) -> &'static [&'static str] {
        SUPPORTED_LANGUAGES
    }

    pub fn supported_options(&self) -> &'static [&'static str] {
        SUPPORTED_OPTIONS
    }

    pub async fn get_tts_audio(
        &self,
        message: &str,
        language: &str,
        options: &TtsOptions,
    ) -> Result<TtsAudio> {
        if !SUPPORTED_LANGUAGES.iter().any(|l| *l == language) {
            return Err(SynthesisError::UnsupportedLanguage(language.to_string()));
        }
        for key in options.keys() {
            if !SUPPORTED_OPTIONS.iter().any(|o| *o == key) {
                debug!(option = %key, "unsupported option ignored");
            }
        }
        self.client.synthesize(message, language, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::{AudioFormat, ErrorKind};
    use async_trait::async_trait;
    use bytes::Bytes;
    use mockall::mock;

    mock! {
        pub Client {}

        #[async_trait]
        impl SynthesisClient for Client {
            async fn synthesize(
                &self,
                text: &str,
                language: &str,
                options: &TtsOptions,
            ) -> Result<TtsAudio>;
        }
    }

    #[tokio::test]
    async fn test_entity_delegates_to_client() {
        let mut mock_client = MockClient::new();
        mock_client
            .expect_synthesize()
            .withf(|text, language, _| {
                text.to_string() == "Hello kitchen" && language.to_string() == "en"
            })
            .times(1)
            .returning(|_, _, _| Ok(TtsAudio::wav(Bytes::from_static(b"RIFF"))));

        let entity = QwenTtsEntity::new("http://tts.local:8000", Arc::new(mock_client));
        assert_eq!(entity.name(), "Qwen TTS");
        assert_eq!(entity.default_language(), "en");
        assert_eq!(entity.supported_languages(), &["en"]);
        assert!(entity.supported_options().is_empty());

        let mut options = TtsOptions::new();
        options.insert("voice".to_string(), serde_json::json!("ignored"));
        let audio = entity
            .get_tts_audio("Hello kitchen", "en", &options)
            .await
            .unwrap();
        assert_eq!(audio.format, AudioFormat::Wav);
        assert_eq!(audio.data.as_ref(), b"RIFF");
    }

    #[tokio::test]
    async fn test_unsupported_language_never_reaches_client() {
        let mut mock_client = MockClient::new();
        mock_client.expect_synthesize().never();

        let entity = QwenTtsEntity::new("entry-1", Arc::new(mock_client));
        let err = entity
            .get_tts_audio("Bonjour", "fr", &TtsOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
        assert_eq!(entity.unique_id(), "entry-1");
    }

    #[tokio::test]
    async fn test_client_errors_pass_through() {
        let mut mock_client = MockClient::new();
        mock_client
            .expect_synthesize()
            .returning(|_, _, _| Err(SynthesisError::NoUsableVoice));

        let entity = QwenTtsEntity::new("entry-1", Arc::new(mock_client));
        let err = entity
            .get_tts_audio("hi", "en", &TtsOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoUsableVoice);
    }

    #[test]
    fn test_unique_id_uses_normalized_base_url() {
        let option = crate::synthesis::SynthesisOption::new(" http://tts.local:8000/ ");
        let client = QwenTtsClient::new(option, reqwest::Client::new()).unwrap();
        let entity = QwenTtsEntity::from_qwen(client);
        assert_eq!(entity.unique_id(), "http://tts.local:8000");
        assert_eq!(entity.name(), ENTITY_NAME);
    }
}
