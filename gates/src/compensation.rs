use crate::error::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A spillover matrix declared on a sample.
///
/// `spillover[i][j]` is the fraction of the signal of detector `parameters[i]`
/// that spills into detector `parameters[j]`, stored row-major as in the
/// `$SPILLOVER` keyword of an FCS file. Compensated channels are named
/// `{prefix}{detector}{suffix}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compensation {
    pub name: Arc<str>,
    pub prefix: Arc<str>,
    pub suffix: Arc<str>,
    parameters: Vec<Arc<str>>,
    spillover: Vec<Vec<f64>>,
}

impl Compensation {
    pub const DEFAULT_PREFIX: &'static str = "Comp-";

    /// Build a compensation, checking the matrix is square, matches the
    /// detector list and holds only finite values.
    pub fn new(
        name: impl Into<Arc<str>>,
        parameters: Vec<Arc<str>>,
        spillover: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let name = name.into();
        let n = parameters.len();

        if spillover.len() != n {
            return Err(GateError::invalid_compensation(
                name.as_ref(),
                format!("{} detectors but {} matrix rows", n, spillover.len()),
            ));
        }
        if let Some((row, values)) = spillover.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(GateError::invalid_compensation(
                name.as_ref(),
                format!("row {} has {} values, expected {}", row, values.len(), n),
            ));
        }
        if spillover.iter().flatten().any(|v| !v.is_finite()) {
            return Err(GateError::invalid_compensation(
                name.as_ref(),
                "matrix holds non-finite values",
            ));
        }
        for (idx, parameter) in parameters.iter().enumerate() {
            if parameters[..idx].contains(parameter) {
                return Err(GateError::invalid_compensation(
                    name.as_ref(),
                    format!("detector '{}' listed twice", parameter),
                ));
            }
        }

        Ok(Self {
            name,
            prefix: Arc::from(Self::DEFAULT_PREFIX),
            suffix: Arc::from(""),
            parameters,
            spillover,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<Arc<str>>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<Arc<str>>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn parameters(&self) -> &[Arc<str>] {
        &self.parameters
    }

    pub fn spillover(&self) -> &[Vec<f64>] {
        &self.spillover
    }

    /// Spillover from detector `from` into detector `to`.
    pub fn coefficient(&self, from: &str, to: &str) -> Option<f64> {
        let row = self.parameters.iter().position(|p| p.as_ref() == from)?;
        let col = self.parameters.iter().position(|p| p.as_ref() == to)?;
        Some(self.spillover[row][col])
    }

    /// The compensated channel name of a detector, if the matrix covers it.
    pub fn compensated_name(&self, channel: &str) -> Option<String> {
        self.parameters
            .iter()
            .any(|p| p.as_ref() == channel)
            .then(|| format!("{}{}{}", self.prefix, channel, self.suffix))
    }
}
