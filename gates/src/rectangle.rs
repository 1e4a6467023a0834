use super::error::{GateError, Result};
use super::traits::*;
use super::types::{Dimension, GateKind};
use serde::{Deserialize, Serialize};

/// Bounds along one dimension of a range or rectangle gate. A missing bound is
/// open towards infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeDimension {
    pub dimension: Dimension,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeDimension {
    pub fn new(dimension: Dimension, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            dimension,
            min,
            max,
        }
    }
}

/// A range (one dimension) or rectangle (two or more dimensions) gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeGateGeometry {
    pub dimensions: Vec<RangeDimension>,
}

impl RangeGateGeometry {
    pub fn kind(&self) -> GateKind {
        if self.dimensions.len() == 1 {
            GateKind::Range
        } else {
            GateKind::Rectangle
        }
    }

    /// Bounds for a channel, if the gate reads it.
    pub fn bounds(&self, parameter: &str) -> Option<(Option<f64>, Option<f64>)> {
        self.dimensions
            .iter()
            .find(|d| d.dimension.parameter.as_ref() == parameter)
            .map(|d| (d.min, d.max))
    }
}

impl GateValidation for RangeGateGeometry {
    fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(GateError::invalid_geometry(
                "Rectangle gate requires at least one dimension",
            ));
        }

        for dim in &self.dimensions {
            let parameter = dim.dimension.parameter.as_ref();
            if dim.min.is_none() && dim.max.is_none() {
                return Err(GateError::invalid_geometry(format!(
                    "Dimension '{}' has neither a minimum nor a maximum",
                    parameter
                )));
            }
            for value in [dim.min, dim.max].into_iter().flatten() {
                if !value.is_finite() {
                    return Err(GateError::invalid_coordinate(parameter, value));
                }
            }
            if let (Some(min), Some(max)) = (dim.min, dim.max) {
                if min > max {
                    return Err(GateError::invalid_geometry(format!(
                        "Dimension '{}' has min {} greater than max {}",
                        parameter, min, max
                    )));
                }
            }
        }

        Ok(())
    }
}

impl GateGeometryOps for RangeGateGeometry {
    fn gate_type_name(&self) -> &'static str {
        match self.kind() {
            GateKind::Range => "Range",
            _ => "Rectangle",
        }
    }

    fn dimensions(&self) -> Vec<&Dimension> {
        self.dimensions.iter().map(|d| &d.dimension).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(parameter: &str, min: Option<f64>, max: Option<f64>) -> RangeDimension {
        RangeDimension::new(Dimension::new(parameter), min, max)
    }

    #[test]
    fn test_kind_follows_dimension_count() {
        let range = RangeGateGeometry {
            dimensions: vec![dim("FSC-A", Some(10.0), None)],
        };
        assert_eq!(range.kind(), GateKind::Range);

        let rect = RangeGateGeometry {
            dimensions: vec![dim("FSC-A", Some(10.0), Some(20.0)), dim("SSC-A", None, Some(5.0))],
        };
        assert_eq!(rect.kind(), GateKind::Rectangle);
        assert_eq!(rect.bounds("SSC-A"), Some((None, Some(5.0))));
    }

    #[test]
    fn test_open_dimension_rejected() {
        let rect = RangeGateGeometry {
            dimensions: vec![dim("FSC-A", None, None)],
        };
        assert!(matches!(
            rect.validate(),
            Err(GateError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let rect = RangeGateGeometry {
            dimensions: vec![dim("FSC-A", Some(30.0), Some(10.0))],
        };
        assert!(rect.validate().is_err());
    }

    #[test]
    fn test_non_finite_bound_rejected() {
        let rect = RangeGateGeometry {
            dimensions: vec![dim("FSC-A", Some(f64::NAN), Some(10.0))],
        };
        assert!(matches!(
            rect.validate(),
            Err(GateError::InvalidCoordinate { .. })
        ));
    }
}
