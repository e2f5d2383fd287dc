#![forbid(unsafe_code)]

//! Common error type for meshdiag crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    /// I/O related failures.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tool configuration parsing failures.
    #[error("Config parse error: {0}")]
    ConfigParse(toml::de::Error),

    /// Daemon configuration file is unreadable or lacks admin credentials.
    #[error("Admin config error: {0}")]
    AdminConfig(String),

    /// A path string does not decode to exactly eight bytes.
    #[error("malformed label `{0}`")]
    MalformedLabel(String),

    /// The admin connection failed a request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The daemon answered with a non-"none" error field.
    #[error("daemon reported error: {0}")]
    DaemonReported(String),

    /// A probe was answered with an explicit remote error.
    #[error("probe failed: {0}")]
    ProbeFailure(String),

    /// The operation was interrupted before it finished.
    #[error("interrupted")]
    Cancelled,

    /// Supplied address or path failed structural validation.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

/// Convenient alias for results throughout meshdiag crates.
pub type MeshResult<T> = Result<T, MeshError>;
