use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Atlas(#[from] atlas_core::AtlasError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Atlas(error) => match error {
                atlas_core::AtlasError::Config(_) => 2,
                atlas_core::AtlasError::Conflict => 5,
                atlas_core::AtlasError::Transport { .. } => 3,
                _ => 4,
            },
            Self::Command(_) => 2,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
