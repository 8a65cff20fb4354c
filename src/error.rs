//! The failures of the measurement pipeline. All of them stem from either bad
//! input configuration or a broken external dependency: none is retried
//! automatically, since an invalid simulation request will never succeed and
//! a deterministic binary fails identically on a second run.
use derive_builder::UninitializedFieldError;
use thiserror::Error;

/// Fatal failures of the simulation and reconciliation pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// A precondition on the simulation parameters was violated before
    /// invoking the external simulator.
    #[error("invalid simulation parameter: {0}")]
    Validation(String),
    /// The external simulator produced output that does not conform to the
    /// expected tabular schema, or exited with a failure. Carries the full
    /// captured output so the invocation can be reproduced and diagnosed.
    #[error(
        "simulator output does not conform to standard: {reason}\n\
         --- captured output ---\n{output}"
    )]
    SimulatorOutput { reason: String, output: String },
    /// An unsupported mode was selected, or data required to resolve a
    /// derived parameter is missing.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// A request builder that misses a field is an invalid simulation request.
impl From<UninitializedFieldError> for Error {
    fn from(err: UninitializedFieldError) -> Self {
        Error::Validation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
