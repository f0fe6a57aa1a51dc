//! Error types for covermap

use thiserror::Error;

/// Main error type for covermap operations.
///
/// The first group of variants is the per-year failure taxonomy the campaign
/// runner turns into year statuses; the rest are grid, geometry and I/O
/// failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No sensor covers year {year}")]
    UnsupportedYear { year: i32 },

    #[error("Empty image collection: {0}")]
    EmptyCollection(String),

    #[error("Class {class} has no training samples")]
    InsufficientTrainingData { class: u8 },

    #[error("Test subset is empty")]
    EmptyTestSet,

    #[error("Export '{name}' needs {pixels} pixels, limit is {max_pixels}")]
    ExportLimitExceeded {
        name: String,
        pixels: u64,
        max_pixels: u64,
    },

    #[error("Imagery archive unavailable: {0}")]
    ArchiveUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Band '{0}' not present")]
    MissingBand(String),

    #[error("Band '{0}' already present")]
    DuplicateBand(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transient failures worth retrying with backoff.
    ///
    /// I/O errors count only when the operating system reports a condition
    /// that can clear up on its own; a missing directory or a full disk does
    /// not.
    pub fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            Error::ArchiveUnavailable(_) => true,
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Result type alias for covermap operations
pub type Result<T> = std::result::Result<T, Error>;
