use std::path::PathBuf;

use symphonia::core::errors::Error as SymphoniaError;

#[derive(thiserror::Error, Debug)]
pub enum MeasurementError {
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("EBU R128 error: {0}")]
    EbuR128(#[from] ebur128::Error),
    #[error("No compatible audio track found")]
    NoTrack,
    #[error("Unsupported sample format")]
    UnsupportedFormat,
    #[error("Integrated loudness is not a number ({0})")]
    NonFinite(f64),
    #[error("Measurement panicked: {0}")]
    Panicked(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("Failed to read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse cache file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize loudness cache: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
}
