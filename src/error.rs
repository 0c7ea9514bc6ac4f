//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, JSON, CSV and TIFF errors, and provides semantic variants
//! for schema mismatches, empty inputs and export limits.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing feature band `{band}`. Available: {available}")]
    MissingFeature { band: String, available: String },

    #[error("Duplicate band `{band}` when stacking images")]
    DuplicateBand { band: String },

    #[error("Empty input: collection `{collection}` has no images after filtering")]
    EmptyCollection { collection: String },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Grid mismatch: {expected} vs {actual}")]
    GridMismatch { expected: String, actual: String },

    #[error("Class {class} has no entry in the remap lookup table")]
    UnmappedClass { class: i64 },

    #[error(
        "Export too large: `{description}` needs {pixels} pixels, ceiling is {max_pixels}"
    )]
    ExportTooLarge {
        description: String,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }
}
