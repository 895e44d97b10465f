use std::path::PathBuf;

/// Errors surfaced while loading networks or configuration.
///
/// Numerical difficulties inside the optimizer are not errors, they end up
/// as a [`TerminationReason`](crate::TerminationReason) in the report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed network resource {path}: {reason}")]
    MalformedResource { path: PathBuf, reason: String },
    #[error("invalid retrieval configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("no band set has {found} bands (expected one of {expected:?})")]
    InvalidBands {
        expected: &'static [usize],
        found: usize,
    },
    #[error("lower bound {lower} exceeds upper bound {upper} for parameter {index}")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },
    #[error("invalid setting {name} = {value}")]
    InvalidSetting { name: &'static str, value: f64 },
}

pub type Result<T> = core::result::Result<T, Error>;
