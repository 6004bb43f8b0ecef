//! Agent error types and exit code mapping.

use emberpost_core::ConfigError;
use emberpost_pipeline::PipelineError;

/// Top-level agent error.
///
/// Each variant carries enough context for a user-facing message.
/// The `exit_code()` method maps startup failures to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline construction or tailer startup failure.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Identity cannot be generated, persisted, or loaded.
    #[error("identity error: {0}")]
    Identity(String),

    /// Registration or activation with the collector failed.
    #[error("registration error: {0}")]
    Registration(String),

    /// Snapshot transmission failure (logged, never fatal).
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else (double start, missing processor, ...).
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                        |
    /// |------|--------------------------------|
    /// | 0    | Success                        |
    /// | 1    | General error                  |
    /// | 2    | Configuration error            |
    /// | 3    | Identity error                 |
    /// | 4    | Registration failed            |
    /// | 10   | IO error                       |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Identity(_) => 3,
            Self::Registration(_) => 4,
            Self::Io(_) => 10,
            Self::Pipeline(_) | Self::Snapshot(_) | Self::Other(_) => 1,
        }
    }
}
