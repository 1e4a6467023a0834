//! Error types for workspace parsing.
//!
//! Every failure is fatal to the parse call that hit it: no partially built
//! gating set is ever returned.

use flow_gates::GateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The file could not be read or is not a well-formed document
    #[error("Malformed workspace document '{path}': {message}")]
    MalformedDocument { path: String, message: String },

    #[error("Unsupported workspace type: {0}")]
    UnsupportedWorkspaceType(String),

    #[error("Sample not found: {0}")]
    SampleNotFound(String),

    /// A requested name matches several samples and no sample id
    #[error("Sample name '{name}' is ambiguous, matching sample ids {candidates:?}")]
    AmbiguousSample {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Sample '{sample}': population '{population}' references '{reference}', which does not resolve")]
    DanglingGateReference {
        sample: String,
        population: String,
        reference: String,
    },

    #[error("Sample '{sample}': invalid gate on population '{population}': {message}")]
    InvalidGateGeometry {
        sample: String,
        population: String,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A channel or gate dimension names a transformation that was never declared
    #[error("Sample '{sample}': unknown transformation '{reference}'")]
    UnknownTransformation { sample: String, reference: String },

    #[error("Sample '{sample}': invalid compensation: {message}")]
    InvalidCompensation { sample: String, message: String },

    #[error("Sample guid '{0}' is not unique")]
    DuplicateSampleGuid(String),
}

impl WorkspaceError {
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_gate(
        sample: impl Into<String>,
        population: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidGateGeometry {
            sample: sample.into(),
            population: population.into(),
            message: message.into(),
        }
    }

    /// Attach sample and population context to a gate model error.
    pub fn from_gate_error(sample: &str, population: &str, error: GateError) -> Self {
        match error {
            GateError::DanglingReference {
                population: holder,
                reference,
            } => Self::DanglingGateReference {
                sample: sample.to_string(),
                population: holder,
                reference,
            },
            GateError::HierarchyError { message } => Self::MalformedDocument {
                path: format!("sample {}", sample),
                message,
            },
            err @ (GateError::InvalidTransformation { .. } | GateError::TransformationConflict { .. }) => {
                Self::MalformedDocument {
                    path: format!("sample {}", sample),
                    message: err.to_string(),
                }
            }
            GateError::InvalidCompensation { message, .. } => Self::InvalidCompensation {
                sample: sample.to_string(),
                message,
            },
            other => Self::InvalidGateGeometry {
                sample: sample.to_string(),
                population: population.to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
