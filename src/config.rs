use crate::synthesis::{SynthesisOption, Timeouts};
use anyhow::{Context, Error};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings that may come from the command line or environment
/// instead of the config file.
#[derive(Parser, Debug, Clone, Default)]
pub struct Cli {
    /// Path to a TOML config file
    #[clap(long, env = "QWEN_TTS_CONF")]
    pub conf: Option<String>,

    /// TTS server origin, e.g. http://127.0.0.1:8000
    #[clap(long, env = "QWEN_TTS_BASE_URL")]
    pub base_url: Option<String>,

    #[clap(long, env = "QWEN_TTS_VOICE_ID")]
    pub voice_id: Option<String>,

    #[clap(long, env = "QWEN_TTS_SESSION_ID")]
    pub session_id: Option<String>,

    #[clap(long, env = "QWEN_TTS_REFERENCE_AUDIO_URL")]
    pub reference_audio_url: Option<String>,

    #[clap(long, env = "QWEN_TTS_REFERENCE_TRANSCRIPTION")]
    pub reference_transcription: Option<String>,

    /// Upload the reference audio once and reuse the resulting session
    #[clap(long)]
    pub establish_session: bool,

    /// Preview timeout in seconds, 0 waits indefinitely
    #[clap(long)]
    pub preview_timeout: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub health_secs: u64,
    pub download_secs: u64,
    pub preview_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            health_secs: 10,
            download_secs: 30,
            preview_secs: 0,
        }
    }
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Timeouts {
            health: Duration::from_secs(config.health_secs),
            download: Duration::from_secs(config.download_secs),
            preview: Duration::from_secs(config.preview_secs),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub tts: SynthesisOption,
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            tts: SynthesisOption::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let mut config: Config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )
        .with_context(|| format!("invalid config file {}", path))?;
        if !config.tts.base_url.trim().is_empty() {
            config.tts = config
                .tts
                .normalize()
                .with_context(|| format!("invalid [tts] section in {}", path))?;
        }
        Ok(config)
    }

    /// Command-line and environment values win over the file.
    pub fn apply_cli(&mut self, cli: &Cli) {
        let tts = &mut self.tts;
        if let Some(base_url) = &cli.base_url {
            tts.base_url = base_url.clone();
        }
        let overrides = [
            (&mut tts.voice_id, &cli.voice_id),
            (&mut tts.session_id, &cli.session_id),
            (&mut tts.reference_audio_url, &cli.reference_audio_url),
            (&mut tts.reference_transcription, &cli.reference_transcription),
        ];
        for (field, value) in overrides {
            if value.is_some() {
                *field = value.clone();
            }
        }
        if cli.establish_session {
            tts.establish_session = true;
        }
        if let Some(preview) = cli.preview_timeout {
            self.timeouts.preview_secs = preview;
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from(&self.timeouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config() {
        let file = write_config(
            r#"
log_level = "debug"

[tts]
base_url = "http://tts.local:8000/"
reference_audio_url = "http://cdn.local/ref.wav"
reference_transcription = "hello"
voice_name = "Narrator"

[timeouts]
preview_secs = 120
"#,
        );
        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.tts.base_url, "http://tts.local:8000");
        assert_eq!(config.tts.voice_id, None);
        assert_eq!(config.tts.voice_name.as_deref(), Some("Narrator"));
        assert!(!config.tts.establish_session);

        let timeouts = config.timeouts();
        assert_eq!(timeouts.health, Duration::from_secs(10));
        assert_eq!(timeouts.download, Duration::from_secs(30));
        assert_eq!(timeouts.preview, Duration::from_secs(120));
    }

    #[test]
    fn test_defaults_leave_preview_unbounded() {
        let config = Config::default();
        assert!(config.timeouts().preview.is_zero());
        assert_eq!(config.timeouts(), Timeouts::default());
    }

    #[test]
    fn test_load_rejects_bad_scheme_and_missing_file() {
        let file = write_config("[tts]\nbase_url = \"ftp://tts.local\"\n");
        let err = Config::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid base URL scheme"));

        assert!(Config::load("/nonexistent/qwentts.toml").is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = Config::default();
        config.tts.base_url = "http://file.local".to_string();
        config.tts.session_id = Some("from-file".to_string());
        config.tts.voice_id = Some("file-voice".to_string());

        let cli = Cli {
            base_url: Some("http://cli.local".to_string()),
            session_id: Some("from-cli".to_string()),
            establish_session: true,
            preview_timeout: Some(45),
            ..Default::default()
        };
        config.apply_cli(&cli);
        assert_eq!(config.tts.base_url, "http://cli.local");
        assert_eq!(config.tts.session_id.as_deref(), Some("from-cli"));
        assert_eq!(config.tts.voice_id.as_deref(), Some("file-voice"));
        assert!(config.tts.establish_session);
        assert_eq!(config.timeouts().preview, Duration::from_secs(45));
    }
}
