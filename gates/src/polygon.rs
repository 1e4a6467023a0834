use super::error::{GateError, Result};
use super::traits::*;
use super::types::{Dimension, Vertex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGateGeometry {
    pub x: Dimension,
    pub y: Dimension,
    pub vertices: Vec<Vertex>,
}

impl PolygonGateGeometry {
    /// Vertex coordinates as (x, y) pairs, skipping vertices missing either axis.
    pub fn coordinates(&self) -> Vec<(f64, f64)> {
        self.vertices
            .iter()
            .filter_map(|vertex| {
                Some((
                    vertex.get_coordinate(&self.x.parameter)?,
                    vertex.get_coordinate(&self.y.parameter)?,
                ))
            })
            .collect()
    }
}

impl GateValidation for PolygonGateGeometry {
    fn validate(&self) -> Result<()> {
        if self.x.parameter == self.y.parameter {
            return Err(GateError::invalid_geometry(format!(
                "Polygon uses '{}' for both axes",
                self.x.parameter
            )));
        }

        // Need at least 3 vertices for a valid polygon
        if self.vertices.len() < 3 {
            return Err(GateError::invalid_geometry(format!(
                "Polygon requires at least 3 vertices, got {}",
                self.vertices.len()
            )));
        }

        for (idx, vertex) in self.vertices.iter().enumerate() {
            for axis in [&self.x.parameter, &self.y.parameter] {
                let value = vertex.get_coordinate(axis).ok_or_else(|| {
                    GateError::missing_parameter(axis.as_ref(), format!("polygon vertex {}", idx))
                })?;
                if !value.is_finite() {
                    return Err(GateError::invalid_coordinate(
                        format!("polygon vertex {} {}", idx, axis),
                        value,
                    ));
                }
            }
        }

        Ok(())
    }
}

impl GateGeometryOps for PolygonGateGeometry {
    fn gate_type_name(&self) -> &'static str {
        "Polygon"
    }

    fn dimensions(&self) -> Vec<&Dimension> {
        vec![&self.x, &self.y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> PolygonGateGeometry {
        PolygonGateGeometry {
            x: Dimension::new("FSC-A"),
            y: Dimension::new("SSC-A"),
            vertices: vec![
                Vertex::new()
                    .with_coordinate("FSC-A", 10.0)
                    .with_coordinate("SSC-A", 10.0),
                Vertex::new()
                    .with_coordinate("FSC-A", 50.0)
                    .with_coordinate("SSC-A", 10.0),
                Vertex::new()
                    .with_coordinate("FSC-A", 30.0)
                    .with_coordinate("SSC-A", 40.0),
            ],
        }
    }

    #[test]
    fn test_valid_triangle() {
        let polygon = triangle();
        assert!(polygon.validate().is_ok());
        assert_eq!(polygon.coordinates().len(), 3);
        assert_eq!(polygon.coordinates()[2], (30.0, 40.0));
    }

    #[test]
    fn test_too_few_vertices() {
        let mut polygon = triangle();
        polygon.vertices.truncate(2);
        assert!(matches!(
            polygon.validate(),
            Err(GateError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_vertex_missing_axis() {
        let mut polygon = triangle();
        polygon.vertices[1] = Vertex::new().with_coordinate("FSC-A", 50.0);
        assert!(matches!(
            polygon.validate(),
            Err(GateError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_same_axis_twice() {
        let mut polygon = triangle();
        polygon.y = Dimension::new("FSC-A");
        assert!(polygon.validate().is_err());
    }
}
