use thiserror::Error;

/// Errors raised by the association test engine.
///
/// Input-shape errors are scoped to a single variant; the orchestrator keeps
/// them in that variant's result slot unless the run is fail-fast.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssocError {
    #[error("variant {variant}: {found} dosages but {expected} phenotypes")]
    LengthMismatch {
        variant: String,
        expected: usize,
        found: usize,
    },
    #[error("variant {variant}: no non-missing dosages")]
    NoObservedDosages { variant: String },
    #[error("group {group}: sample index {index} out of range for {n_samples} samples")]
    GroupIndexOutOfRange {
        group: String,
        index: usize,
        n_samples: usize,
    },
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}
