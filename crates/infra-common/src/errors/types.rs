use thiserror::Error;

/// Infrastructure error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or stream failure while reading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Logging subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Error annotated with the component/operation it came from
    #[error("{message} [{context}]")]
    WithContext {
        message: String,
        context: crate::errors::context::ErrorContext,
    },
}

/// Result alias for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;
