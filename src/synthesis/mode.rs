use super::SynthesisOption;

/// How a synthesis call identifies the voice to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceMode {
    SavedVoice(String),
    EstablishedSession(String),
    AdHocReference {
        url: String,
        transcription: Option<String>,
    },
    /// Let the server's voice listing pick.
    AutoSelect,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl VoiceMode {
    /// First match wins: voice id, session id, reference URL, auto-select.
    pub fn resolve(option: &SynthesisOption) -> VoiceMode {
        if let Some(voice_id) = non_empty(&option.voice_id) {
            return VoiceMode::SavedVoice(voice_id);
        }
        if let Some(session_id) = non_empty(&option.session_id) {
            return VoiceMode::EstablishedSession(session_id);
        }
        if let Some(url) = non_empty(&option.reference_audio_url) {
            return VoiceMode::AdHocReference {
                url,
                transcription: option.reference_transcription.clone(),
            };
        }
        VoiceMode::AutoSelect
    }

    pub fn name(&self) -> &'static str {
        match self {
            VoiceMode::SavedVoice(_) => "saved_voice",
            VoiceMode::EstablishedSession(_) => "established_session",
            VoiceMode::AdHocReference { .. } => "adhoc_reference",
            VoiceMode::AutoSelect => "auto_select",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option() -> SynthesisOption {
        SynthesisOption::new("http://localhost:8000")
    }

    #[test]
    fn test_voice_id_wins_over_everything() {
        let mut opt = option();
        opt.voice_id = Some("v-1".to_string());
        opt.session_id = Some("s-1".to_string());
        opt.reference_audio_url = Some("http://cdn/ref.wav".to_string());
        opt.reference_transcription = Some("hello".to_string());
        assert_eq!(
            VoiceMode::resolve(&opt),
            VoiceMode::SavedVoice("v-1".to_string())
        );
    }

    #[test]
    fn test_session_before_reference() {
        let mut opt = option();
        opt.voice_id = Some("   ".to_string());
        opt.session_id = Some(" s-1 ".to_string());
        opt.reference_audio_url = Some("http://cdn/ref.wav".to_string());
        assert_eq!(
            VoiceMode::resolve(&opt),
            VoiceMode::EstablishedSession("s-1".to_string())
        );
    }

    #[test]
    fn test_reference_keeps_transcription() {
        let mut opt = option();
        opt.session_id = Some(String::new());
        opt.reference_audio_url = Some("file:///tmp/ref.wav".to_string());
        opt.reference_transcription = Some("the quick brown fox".to_string());
        assert_eq!(
            VoiceMode::resolve(&opt),
            VoiceMode::AdHocReference {
                url: "file:///tmp/ref.wav".to_string(),
                transcription: Some("the quick brown fox".to_string()),
            }
        );
    }

    #[test]
    fn test_empty_record_is_auto_select() {
        assert_eq!(VoiceMode::resolve(&option()), VoiceMode::AutoSelect);

        let mut opt = option();
        opt.voice_id = Some(String::new());
        opt.session_id = Some(" ".to_string());
        opt.reference_audio_url = Some("\t".to_string());
        opt.voice_name = Some("Narrator".to_string());
        assert_eq!(VoiceMode::resolve(&opt), VoiceMode::AutoSelect);
    }

    #[test]
    fn test_resolution_follows_session_mutation() {
        let mut opt = option();
        opt.reference_audio_url = Some("http://cdn/ref.wav".to_string());
        assert_eq!(VoiceMode::resolve(&opt).name(), "adhoc_reference");
        opt.session_id = Some("promoted".to_string());
        assert_eq!(
            VoiceMode::resolve(&opt),
            VoiceMode::EstablishedSession("promoted".to_string())
        );
    }
}
