use thiserror::Error;

/// Top-level error type for discovery, caching and table operations.
#[derive(Debug, Error)]
pub enum AtlasError {
    /// Network or HTTP failure surfaced after the retry budget was spent.
    #[error("transport error{}: {message}", status_suffix(.status))]
    Transport {
        message: String,
        status: Option<u16>,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("a collection pass is already running")]
    Conflict,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("background job failed: {0}")]
    Job(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (status {code})"))
        .unwrap_or_default()
}

impl AtlasError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub fn transport_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "atlas.transport",
            Self::Parse(_) => "atlas.parse",
            Self::Conflict => "atlas.conflict",
            Self::Config(_) => "atlas.config",
            Self::Job(_) => "atlas.job",
            Self::Io(_) => "atlas.io",
            Self::Csv(_) => "atlas.csv",
            Self::Serialization(_) => "atlas.serialization",
        }
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_mentions_status_when_present() {
        let error = AtlasError::transport_status(503, "upstream unavailable");
        assert_eq!(
            error.to_string(),
            "transport error (status 503): upstream unavailable"
        );
        assert_eq!(error.code(), "atlas.transport");
    }

    #[test]
    fn transport_error_without_status_is_plain() {
        let error = AtlasError::transport("connection reset");
        assert_eq!(error.to_string(), "transport error: connection reset");
    }

    #[test]
    fn conflict_is_flagged() {
        assert!(AtlasError::Conflict.is_conflict());
        assert!(!AtlasError::parse("bad").is_conflict());
    }
}
