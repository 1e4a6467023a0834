use super::error::{GateError, Result};
use super::traits::*;
use super::types::{Dimension, Vertex};
use serde::{Deserialize, Serialize};

/// An ellipse in two dimensions, described the way Gating-ML describes
/// ellipsoids: the points `p` with `(p - mean)ᵀ · covariance⁻¹ · (p - mean) <= distance_square`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EllipsoidGateGeometry {
    pub x: Dimension,
    pub y: Dimension,
    pub mean: Vertex,
    pub covariance: [[f64; 2]; 2],
    pub distance_square: f64,
}

impl EllipsoidGateGeometry {
    /// Build an ellipse from the end points of its two axes.
    ///
    /// `axis_points` holds the two end points of the first axis followed by the
    /// two end points of the second, in raw (x, y) coordinates.
    pub fn from_axis_points(x: Dimension, y: Dimension, axis_points: [(f64, f64); 4]) -> Self {
        let [(x0, y0), (x1, y1), (x2, y2), (x3, y3)] = axis_points;

        let center = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
        let semi_major = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt() / 2.0;
        let semi_minor = ((x3 - x2).powi(2) + (y3 - y2).powi(2)).sqrt() / 2.0;
        let angle = (y1 - y0).atan2(x1 - x0);

        let (sin_a, cos_a) = angle.sin_cos();
        let a2 = semi_major * semi_major;
        let b2 = semi_minor * semi_minor;

        // Rotate diag(a², b²) into data space
        let covariance = [
            [a2 * cos_a * cos_a + b2 * sin_a * sin_a, (a2 - b2) * sin_a * cos_a],
            [(a2 - b2) * sin_a * cos_a, a2 * sin_a * sin_a + b2 * cos_a * cos_a],
        ];

        let mean = Vertex::new()
            .with_coordinate(x.parameter.clone(), center.0)
            .with_coordinate(y.parameter.clone(), center.1);

        Self {
            x,
            y,
            mean,
            covariance,
            distance_square: 1.0,
        }
    }

    /// The center of the ellipse in (x, y) raw coordinates.
    pub fn center(&self) -> Result<(f64, f64)> {
        let cx = self
            .mean
            .get_coordinate(&self.x.parameter)
            .ok_or_else(|| GateError::missing_parameter(self.x.parameter.as_ref(), "ellipsoid mean"))?;
        let cy = self
            .mean
            .get_coordinate(&self.y.parameter)
            .ok_or_else(|| GateError::missing_parameter(self.y.parameter.as_ref(), "ellipsoid mean"))?;
        Ok((cx, cy))
    }

    fn determinant(&self) -> f64 {
        let [[a, b], [c, d]] = self.covariance;
        a * d - b * c
    }
}

impl GateValidation for EllipsoidGateGeometry {
    fn validate(&self) -> Result<()> {
        let (cx, cy) = self.center()?;
        for (axis, value) in [(&self.x.parameter, cx), (&self.y.parameter, cy)] {
            if !value.is_finite() {
                return Err(GateError::invalid_coordinate(
                    format!("ellipsoid mean {}", axis),
                    value,
                ));
            }
        }

        if self.covariance.iter().flatten().any(|v| !v.is_finite()) {
            return Err(GateError::invalid_geometry(
                "Covariance matrix has non-finite entries",
            ));
        }

        let [[_, b], [c, _]] = self.covariance;
        if (b - c).abs() > 1e-9 * b.abs().max(c.abs()).max(1.0) {
            return Err(GateError::invalid_geometry(
                "Covariance matrix is not symmetric",
            ));
        }

        if self.covariance[0][0] <= 0.0 || self.determinant() <= 0.0 {
            return Err(GateError::invalid_geometry(
                "Covariance matrix is not positive definite",
            ));
        }

        if !(self.distance_square.is_finite() && self.distance_square > 0.0) {
            return Err(GateError::invalid_geometry(format!(
                "Distance square must be positive, got {}",
                self.distance_square
            )));
        }

        Ok(())
    }
}

impl GateGeometryOps for EllipsoidGateGeometry {
    fn gate_type_name(&self) -> &'static str {
        "Ellipsoid"
    }

    fn dimensions(&self) -> Vec<&Dimension> {
        vec![&self.x, &self.y]
    }
}
