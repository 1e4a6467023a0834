use super::error::{GateError, Result};
use super::traits::*;
use super::types::Dimension;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Split points along one dimension of a quadrant gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantDivider {
    pub id: Arc<str>,
    pub dimension: Dimension,
    /// Ascending split values
    pub values: Vec<f64>,
}

/// A point locating a quadrant relative to one divider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantPosition {
    pub divider_ref: Arc<str>,
    pub location: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantRegion {
    pub id: Arc<str>,
    pub positions: Vec<QuadrantPosition>,
}

/// A quadrant gate: dividers partition the space, regions pick cells of the partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadrantGateGeometry {
    pub dividers: Vec<QuadrantDivider>,
    pub quadrants: Vec<QuadrantRegion>,
}

impl QuadrantGateGeometry {
    pub fn divider(&self, id: &str) -> Option<&QuadrantDivider> {
        self.dividers.iter().find(|d| d.id.as_ref() == id)
    }

    pub fn quadrant(&self, id: &str) -> Option<&QuadrantRegion> {
        self.quadrants.iter().find(|q| q.id.as_ref() == id)
    }
}

impl GateValidation for QuadrantGateGeometry {
    fn validate(&self) -> Result<()> {
        if self.dividers.is_empty() {
            return Err(GateError::invalid_geometry(
                "Quadrant gate requires at least one divider",
            ));
        }

        if let Some(id) = self.dividers.iter().map(|d| &d.id).duplicates().next() {
            return Err(GateError::invalid_geometry(format!(
                "Divider id '{}' is declared twice",
                id
            )));
        }

        for divider in &self.dividers {
            if divider.values.is_empty() {
                return Err(GateError::invalid_geometry(format!(
                    "Divider '{}' has no split values",
                    divider.id
                )));
            }
            if let Some(value) = divider.values.iter().find(|v| !v.is_finite()) {
                return Err(GateError::invalid_coordinate(
                    format!("divider {}", divider.id),
                    *value,
                ));
            }
            if divider.values.iter().tuple_windows().any(|(a, b)| a >= b) {
                return Err(GateError::invalid_geometry(format!(
                    "Divider '{}' split values are not strictly ascending",
                    divider.id
                )));
            }
        }

        for quadrant in &self.quadrants {
            for position in &quadrant.positions {
                if self.divider(&position.divider_ref).is_none() {
                    return Err(GateError::invalid_geometry(format!(
                        "Quadrant '{}' refers to unknown divider '{}'",
                        quadrant.id, position.divider_ref
                    )));
                }
                if !position.location.is_finite() {
                    return Err(GateError::invalid_coordinate(
                        format!("quadrant {} position", quadrant.id),
                        position.location,
                    ));
                }
            }
        }

        Ok(())
    }
}

impl GateGeometryOps for QuadrantGateGeometry {
    fn gate_type_name(&self) -> &'static str {
        "Quadrant"
    }

    fn dimensions(&self) -> Vec<&Dimension> {
        self.dividers.iter().map(|d| &d.dimension).collect()
    }
}
