//! Error types shared by the server and the load tester.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid command-line configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Server loop failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors from the load tester
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
