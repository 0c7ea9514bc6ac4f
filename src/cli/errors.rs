use std::path::PathBuf;

use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Refusing to overwrite {path:?}; pass --force")]
    WouldOverwrite { path: PathBuf },

    #[error("Invalid log filter: {0}")]
    LogFilter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Library(#[from] covermap::Error),
}
