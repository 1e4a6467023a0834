//! Error types for gate model operations.
//!
//! This module defines `GateError`, the error type for geometry validation,
//! population tree construction and reference resolution. It uses `thiserror`
//! and is mapped into the workspace-level error by callers that know which
//! sample a gate belongs to.

use thiserror::Error;

/// Custom error type for gate operations.
///
/// All fallible gate operations return `Result<T, GateError>`.
#[derive(Debug, Error)]
pub enum GateError {
    /// Geometry validation failures
    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    /// Missing required parameter/channel
    #[error("Missing parameter '{parameter}' in context: {context}")]
    MissingParameter { parameter: String, context: String },

    /// Invalid coordinate values
    #[error("Invalid coordinate '{coordinate}': value {value} is not finite")]
    InvalidCoordinate { coordinate: String, value: f64 },

    /// Population tree failures (unknown parent, duplicate path)
    #[error("Hierarchy error: {message}")]
    HierarchyError { message: String },

    /// A boolean or reference gate names a population that does not exist
    #[error("Population '{population}' references '{reference}', which does not resolve")]
    DanglingReference {
        population: String,
        reference: String,
    },

    /// Compensation matrix shape failures
    #[error("Invalid compensation '{name}': {message}")]
    InvalidCompensation { name: String, message: String },

    /// Transformation parameters outside their valid domain
    #[error("Invalid {kind} transformation: {message}")]
    InvalidTransformation { kind: String, message: String },

    /// Two different transformations declared under the same id
    #[error("Transformation id '{id}' is already bound to {existing}, cannot rebind to {incoming}")]
    TransformationConflict {
        id: String,
        existing: String,
        incoming: String,
    },
}

impl GateError {
    /// Create an InvalidGeometry error with a message
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: message.into(),
        }
    }

    /// Create a MissingParameter error
    pub fn missing_parameter(parameter: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingParameter {
            parameter: parameter.into(),
            context: context.into(),
        }
    }

    /// Create an InvalidCoordinate error
    pub fn invalid_coordinate(coordinate: impl Into<String>, value: f64) -> Self {
        Self::InvalidCoordinate {
            coordinate: coordinate.into(),
            value,
        }
    }

    /// Create a HierarchyError with a message
    pub fn hierarchy_error(message: impl Into<String>) -> Self {
        Self::HierarchyError {
            message: message.into(),
        }
    }

    /// Create a DanglingReference error
    pub fn dangling_reference(population: impl Into<String>, reference: impl Into<String>) -> Self {
        Self::DanglingReference {
            population: population.into(),
            reference: reference.into(),
        }
    }

    /// Create an InvalidCompensation error
    pub fn invalid_compensation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCompensation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidTransformation error
    pub fn invalid_transformation(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTransformation {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Whether this error describes a geometry problem, as opposed to a tree
    /// or reference problem.
    pub fn is_geometry_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidGeometry { .. }
                | Self::MissingParameter { .. }
                | Self::InvalidCoordinate { .. }
        )
    }
}

// Type alias for Result using GateError
pub type Result<T> = std::result::Result<T, GateError>;
