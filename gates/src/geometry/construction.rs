use crate::ellipse::EllipsoidGateGeometry;
use crate::error::{GateError, Result};
use crate::polygon::PolygonGateGeometry;
use crate::rectangle::{RangeDimension, RangeGateGeometry};
use crate::traits::GateValidation;
use crate::types::{Dimension, GateGeometry, Vertex};

/// Create a polygon geometry from raw coordinates
///
/// # Arguments
/// * `raw_coords` - Vector of (x, y) coordinate tuples in raw data space
/// * `x_param` - Channel name for the x-axis parameter
/// * `y_param` - Channel name for the y-axis parameter
///
/// # Errors
/// Returns `GateError::InvalidGeometry` if fewer than 3 coordinates are
/// provided, and `GateError::InvalidCoordinate` if any value is not finite.
pub fn create_polygon_geometry(
    raw_coords: Vec<(f64, f64)>,
    x_param: &str,
    y_param: &str,
) -> Result<GateGeometry> {
    let vertices = raw_coords
        .into_iter()
        .map(|(x, y)| {
            Vertex::new()
                .with_coordinate(x_param, x)
                .with_coordinate(y_param, y)
        })
        .collect();

    let polygon = PolygonGateGeometry {
        x: Dimension::new(x_param),
        y: Dimension::new(y_param),
        vertices,
    };
    polygon.validate()?;
    Ok(GateGeometry::Polygon(polygon))
}

/// Create a range (one bound pair) or rectangle (several) geometry.
///
/// Each entry is `(parameter, min, max)`; a `None` bound is open.
pub fn create_range_geometry(bounds: Vec<(&str, Option<f64>, Option<f64>)>) -> Result<GateGeometry> {
    let range = RangeGateGeometry {
        dimensions: bounds
            .into_iter()
            .map(|(parameter, min, max)| RangeDimension::new(Dimension::new(parameter), min, max))
            .collect(),
    };
    range.validate()?;
    Ok(GateGeometry::Range(range))
}

/// Create an ellipse from the four end points of its axes.
///
/// The first two points span one axis and the last two the other, as written
/// by FlowJo for Mac. Degenerate input (coincident points) is rejected.
pub fn create_ellipse_from_axis_points(
    points: &[(f64, f64)],
    x_param: &str,
    y_param: &str,
) -> Result<GateGeometry> {
    let axis_points: [(f64, f64); 4] = points.try_into().map_err(|_| {
        GateError::invalid_geometry(format!(
            "Ellipse requires exactly 4 axis points, got {}",
            points.len()
        ))
    })?;

    for (idx, (x, y)) in axis_points.iter().enumerate() {
        for value in [*x, *y] {
            if !value.is_finite() {
                return Err(GateError::invalid_coordinate(format!("ellipse point {}", idx), value));
            }
        }
    }

    let ellipse =
        EllipsoidGateGeometry::from_axis_points(Dimension::new(x_param), Dimension::new(y_param), axis_points);
    ellipse.validate()?;
    Ok(GateGeometry::Ellipsoid(ellipse))
}
