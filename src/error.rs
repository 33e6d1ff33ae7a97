//! # Error Handling
//!
//! Central error type for the benchmark harness. Each variant maps to one
//! branch of the error policy:
//!
//! - **Usage**: bad CLI arguments or an unusable combination of options.
//!   Fatal; the process prints the message and exits non-zero.
//! - **MissingFile**: a reference or hypothesis transcript is absent.
//!   Not fatal to a benchmark run; metric computation is skipped and the
//!   run is recorded with sentinel values.
//! - **ExternalTool**: an external command failed. Fatal when the command
//!   is the transcription job itself; telemetry collaborators catch this
//!   and degrade to placeholder data instead.
//! - **InvalidInput**: degenerate metric input (empty reference). Fails
//!   loudly rather than producing NaN.
//! - **Config** / **Io** / **Csv**: carriers for configuration, filesystem
//!   and log-writing failures, converted automatically via `From` so `?`
//!   works at call sites.

use std::path::PathBuf;

use thiserror::Error;

/// All failure modes surfaced by the harness.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Bad command-line usage (wrong arguments, invalid combinations)
    #[error("usage error: {0}")]
    Usage(String),

    /// A transcript file needed for metric computation does not exist
    #[error("missing file: {path}")]
    MissingFile { path: PathBuf },

    /// An external command failed to spawn or exited non-zero
    #[error("external tool '{tool}' failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Metric computation received input it cannot score (empty reference)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading or validation failed
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Filesystem operation failed
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// CSV serialization or parsing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl BenchError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn missing_file(path: impl Into<PathBuf>) -> Self {
        Self::MissingFile { path: path.into() }
    }

    pub fn external_tool(tool: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Shorthand for `Result<T, BenchError>`, used throughout the crate.
pub type BenchResult<T> = Result<T, BenchError>;
