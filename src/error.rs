//! Error types for trajectory output

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("Invalid destination {path:?}: {reason}")]
    InvalidDestination { path: PathBuf, reason: String },

    #[error("Missing required run parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Extended export requested but no particle source descriptors were supplied")]
    MissingSources,

    #[error("Cannot change '{0}' in the middle of a run (rewind first)")]
    ConfigurationLocked(&'static str),

    #[error("A run is already open; rewind before starting another")]
    AlreadyRunning,

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Unsupported shape for field '{field}': {detail}")]
    UnsupportedFieldShape { field: String, detail: String },

    #[error("Field '{field}' has {found} values, expected {expected} for this timestep")]
    ParticleCountMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("No open run: call prepare_for_model_run before writing")]
    WriteTargetClosed,

    #[error("Uncertain snapshot supplied but the run has no uncertain destination")]
    NoUncertainDestination,

    #[error("Timestep {step} is outside the time axis (length {step_count})")]
    StepOutOfRange { step: u32, step_count: u32 },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid magic number in header")]
    InvalidMagic,

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Chunk checksum verification failed for timestep {0}")]
    ChecksumMismatch(u32),

    #[error("Corrupt trajectory file: {0}")]
    Corrupt(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrajectoryError>;

impl TrajectoryError {
    pub(crate) fn invalid_destination(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        TrajectoryError::InvalidDestination {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
