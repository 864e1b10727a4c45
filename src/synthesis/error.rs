use thiserror::Error;

/// Number of characters of a failed response body kept for diagnostics.
pub const ERROR_BODY_LIMIT: usize = 200;

pub type Result<T, E = SynthesisError> = std::result::Result<T, E>;

/// Coarse classification of a [`SynthesisError`], used by callers that only
/// care about which branch of the exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    MissingPrerequisite,
    NotFound,
    Remote,
    Protocol,
    Timeout,
    NoUsableVoice,
    UnsupportedLanguage,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("voice not found: {0}")]
    VoiceNotFound(String),

    #[error("{context} failed (HTTP {status}): {body}")]
    Remote {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out {0}")]
    Timeout(&'static str),

    #[error("no usable voice returned by server")]
    NoUsableVoice,

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl SynthesisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SynthesisError::Config(_) => ErrorKind::Config,
            SynthesisError::MissingPrerequisite(_) => ErrorKind::MissingPrerequisite,
            SynthesisError::VoiceNotFound(_) => ErrorKind::NotFound,
            SynthesisError::Remote { .. }
            | SynthesisError::Transport(_)
            | SynthesisError::WebSocket(_) => ErrorKind::Remote,
            SynthesisError::Protocol(_) => ErrorKind::Protocol,
            SynthesisError::Timeout(_) => ErrorKind::Timeout,
            SynthesisError::NoUsableVoice => ErrorKind::NoUsableVoice,
            SynthesisError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
        }
    }

    pub(crate) fn remote(context: &'static str, status: u16, body: &str) -> Self {
        SynthesisError::Remote {
            context,
            status,
            body: truncate_chars(body, ERROR_BODY_LIMIT),
        }
    }
}

/// Keep the first `limit` characters (not bytes) of `text`.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("abc", 200), "abc");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        let long = "x".repeat(500);
        assert_eq!(truncate_chars(&long, ERROR_BODY_LIMIT).len(), 200);
    }

    #[test]
    fn test_remote_error_truncates_body() {
        let err = SynthesisError::remote("Preview", 500, &"e".repeat(300));
        match &err {
            SynthesisError::Remote { status, body, .. } => {
                assert_eq!(*status, 500);
                assert_eq!(body.chars().count(), 200);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(err.to_string().starts_with("Preview failed (HTTP 500)"));
    }
}
