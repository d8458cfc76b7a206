use std::path::PathBuf;

use thiserror::Error;

/// Failure modes of the payroll pipeline, one per stage boundary.
///
/// Every stage fails fast: the first error aborts the run rather than letting
/// a partial dataset masquerade as a complete one.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source archive could not be fetched or unpacked.
    #[error("retrieval failed for {url}: {reason}")]
    Retrieval { url: String, reason: String },

    /// A source file was unreadable, missing a required column, or malformed.
    #[error("unreadable source file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    /// A source file's bytes violate the ISO-8859-1 encoding assumption.
    #[error("{} is not valid ISO-8859-1 text", path.display())]
    Decode { path: PathBuf },

    /// A year field that cannot be interpreted as a calendar year.
    #[error("row {row}: cannot interpret {value:?} as a year")]
    Parse { row: usize, value: String },

    /// The CPI series has no index value for the requested year.
    #[error("no CPI index published for year {year}")]
    InflationUnavailable { year: i32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
