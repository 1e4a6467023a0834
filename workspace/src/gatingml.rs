//! Gate classification and geometry parsing for one population element.
//!
//! FlowJo for Windows and FlowJo vX embed Gating-ML 2.0 (`gating:RectangleGate`,
//! `gating:PolygonGate`, ...) under a `Gate` element. FlowJo for Mac 2.0 uses
//! its own shapes with `xAxisName`/`yAxisName` attributes and bare vertices.

use crate::dispatch::GateDialect;
use crate::document::XmlElement;
use flow_gates::{
    BooleanOperation, Dimension, EllipsoidGateGeometry, Gate, GateError, GateGeometry, GateKind,
    GateReference, GateResult, GateValidation, PolygonGateGeometry, QuadrantDivider,
    QuadrantGateGeometry, QuadrantPosition, QuadrantRegion, RangeDimension, RangeGateGeometry,
    Vertex, create_ellipse_from_axis_points, create_polygon_geometry, create_range_geometry,
};
use std::sync::Arc;
use tracing::debug;

const GATING_ML_SHAPES: [&str; 4] = ["RectangleGate", "PolygonGate", "EllipsoidGate", "QuadrantGate"];
const MAC_SHAPES: [&str; 3] = ["PolygonGate", "RectangleGate", "EllipseGate"];

/// Boolean operator of a population element, if it is a boolean node.
pub fn boolean_operation(element: &XmlElement) -> Option<BooleanOperation> {
    match element.local_name() {
        "AndNode" => Some(BooleanOperation::And),
        "OrNode" => Some(BooleanOperation::Or),
        "NotNode" => Some(BooleanOperation::Not),
        _ => None,
    }
}

/// Build the gate of a population element.
///
/// With `parse_geometry` false only the gate kind (and boolean operator) is
/// determined; no geometry or references are read or validated, and a
/// population without a recognised gate gets [`GateKind::Unknown`].
pub fn parse_gate(population: &XmlElement, dialect: GateDialect, parse_geometry: bool) -> GateResult<Gate> {
    if let Some(operation) = boolean_operation(population) {
        return parse_boolean(population, operation, parse_geometry);
    }

    if let Some(reference) = reference_target(population, dialect) {
        return Ok(if parse_geometry {
            Gate::reference(reference)
        } else {
            Gate::skeleton(GateKind::Reference)
        });
    }

    let Some(shape) = find_shape(population, dialect) else {
        if parse_geometry {
            return Err(GateError::invalid_geometry("population declares no gate"));
        }
        debug!("Population '{}' has no recognised gate", population.attr("name").unwrap_or_default());
        return Ok(Gate::skeleton(GateKind::Unknown));
    };
    let negated = shape.attr("eventsInside") == Some("0");
    let id = population
        .child("Gate")
        .and_then(|g| g.attr("id"))
        .or_else(|| shape.attr("id"));

    let gate = if parse_geometry {
        let geometry = match dialect {
            GateDialect::GatingMl { dimension_element } => parse_gating_ml(shape, dimension_element)?,
            GateDialect::MacLegacy => parse_mac_shape(shape)?,
        };
        Gate::geometric(geometry)
    } else {
        Gate::skeleton(classify_shape(shape, dialect))
    };

    let gate = gate.negate(negated);
    Ok(match id {
        Some(id) => gate.with_id(id),
        None => gate,
    })
}

fn parse_boolean(element: &XmlElement, operation: BooleanOperation, parse_geometry: bool) -> GateResult<Gate> {
    if !parse_geometry {
        return Ok(Gate::skeleton(GateKind::Boolean).with_operation(operation));
    }

    let operands: Vec<GateReference> = element
        .child("Dependents")
        .map(|deps| {
            deps.children_named("Dependent")
                .filter_map(|d| d.attr("name"))
                .map(GateReference::new)
                .collect()
        })
        .unwrap_or_default();

    if !operation.accepts_operands(operands.len()) {
        return Err(GateError::invalid_geometry(format!(
            "{} gate cannot take {} operand(s)",
            operation,
            operands.len()
        )));
    }

    let gate = Gate::boolean(operation, operands);
    Ok(match element.child("Gate").and_then(|g| g.attr("id")) {
        Some(id) => gate.with_id(id),
        None => gate,
    })
}

/// `Gate@ref` marks a gate borrowed from another population.
fn reference_target(population: &XmlElement, dialect: GateDialect) -> Option<&str> {
    let gate = population.child("Gate")?;
    if find_shape(population, dialect).is_some() {
        return None;
    }
    gate.attr("ref").map(str::trim).filter(|r| !r.is_empty())
}

fn find_shape(population: &XmlElement, dialect: GateDialect) -> Option<&XmlElement> {
    match dialect {
        GateDialect::GatingMl { .. } => population
            .child("Gate")?
            .children
            .iter()
            .find(|c| GATING_ML_SHAPES.contains(&c.local_name())),
        GateDialect::MacLegacy => population
            .children
            .iter()
            .find(|c| MAC_SHAPES.contains(&c.local_name()))
            .or_else(|| {
                population
                    .child("Gate")?
                    .children
                    .iter()
                    .find(|c| MAC_SHAPES.contains(&c.local_name()))
            }),
    }
}

fn classify_shape(shape: &XmlElement, dialect: GateDialect) -> GateKind {
    match (shape.local_name(), dialect) {
        ("RectangleGate", GateDialect::GatingMl { .. }) => {
            if shape.children_named("dimension").count() == 1 {
                GateKind::Range
            } else {
                GateKind::Rectangle
            }
        }
        ("RectangleGate", GateDialect::MacLegacy) => {
            if shape.attr("yAxisName").is_some() {
                GateKind::Rectangle
            } else {
                GateKind::Range
            }
        }
        ("PolygonGate", _) => GateKind::Polygon,
        ("EllipsoidGate", _) | ("EllipseGate", _) => GateKind::Ellipsoid,
        _ => GateKind::Quadrant,
    }
}

fn number(element: &XmlElement, attr: &str) -> GateResult<Option<f64>> {
    element
        .attr(attr)
        .map(|raw| {
            raw.trim().parse::<f64>().map_err(|_| {
                GateError::invalid_geometry(format!(
                    "<{}> attribute {} '{}' is not a number",
                    element.name, attr, raw
                ))
            })
        })
        .transpose()
}

fn required_number(element: &XmlElement, attr: &str) -> GateResult<f64> {
    number(element, attr)?.ok_or_else(|| {
        GateError::missing_parameter(attr, format!("<{}>", element.name))
    })
}

// ---- Gating-ML ----

fn parse_dimension(dimension: &XmlElement, dimension_element: &str) -> GateResult<Dimension> {
    let fallback = if dimension_element == "parameter" { "fcs-dimension" } else { "parameter" };
    let parameter = dimension
        .child(dimension_element)
        .or_else(|| {
            let other = dimension.child(fallback);
            if other.is_some() {
                debug!("Dimension uses <{}> instead of <{}>", fallback, dimension_element);
            }
            other
        })
        .and_then(|p| p.attr("name"))
        .ok_or_else(|| GateError::missing_parameter(dimension_element, "gate dimension"))?;

    let mut result = Dimension::new(parameter);
    if let Some(reference) = dimension.attr("transformation-ref") {
        result = result.with_transformation_ref(reference);
    }
    if let Some(reference) = dimension.attr("compensation-ref") {
        result = result.with_compensation_ref(reference);
    }
    Ok(result)
}

fn parse_gating_ml(shape: &XmlElement, dimension_element: &str) -> GateResult<GateGeometry> {
    let geometry = match shape.local_name() {
        "RectangleGate" => {
            let dimensions = shape
                .children_named("dimension")
                .map(|d| {
                    Ok(RangeDimension::new(
                        parse_dimension(d, dimension_element)?,
                        number(d, "min")?,
                        number(d, "max")?,
                    ))
                })
                .collect::<GateResult<Vec<_>>>()?;
            GateGeometry::Range(RangeGateGeometry { dimensions })
        }
        "PolygonGate" => {
            let (x, y) = two_dimensions(shape, dimension_element)?;
            let vertices = shape
                .children_named("vertex")
                .map(|v| {
                    let values = coordinates(v)?;
                    Ok(axis_vertex(&x, &y, &values))
                })
                .collect::<GateResult<Vec<_>>>()?;
            GateGeometry::Polygon(PolygonGateGeometry { x, y, vertices })
        }
        "EllipsoidGate" => {
            let (x, y) = two_dimensions(shape, dimension_element)?;
            let mean_values = shape
                .child("mean")
                .map(coordinates)
                .transpose()?
                .ok_or_else(|| GateError::missing_parameter("mean", "ellipsoid gate"))?;
            let covariance = covariance_matrix(shape)?;
            let distance_square = shape
                .child("distanceSquare")
                .map(|d| required_number(d, "value"))
                .transpose()?
                .ok_or_else(|| GateError::missing_parameter("distanceSquare", "ellipsoid gate"))?;
            let mean = axis_vertex(&x, &y, &mean_values);
            GateGeometry::Ellipsoid(EllipsoidGateGeometry {
                x,
                y,
                mean,
                covariance,
                distance_square,
            })
        }
        _ => parse_quadrant(shape, dimension_element)?,
    };

    geometry.validate()?;
    Ok(geometry)
}

fn two_dimensions(shape: &XmlElement, dimension_element: &str) -> GateResult<(Dimension, Dimension)> {
    let dimensions = shape
        .children_named("dimension")
        .map(|d| parse_dimension(d, dimension_element))
        .collect::<GateResult<Vec<_>>>()?;
    match <[Dimension; 2]>::try_from(dimensions) {
        Ok([x, y]) => Ok((x, y)),
        Err(dimensions) => Err(GateError::invalid_geometry(format!(
            "<{}> needs exactly 2 dimensions, got {}",
            shape.name,
            dimensions.len()
        ))),
    }
}

fn coordinates(element: &XmlElement) -> GateResult<Vec<f64>> {
    element
        .children_named("coordinate")
        .map(|c| required_number(c, "value"))
        .collect()
}

/// Pair positional coordinates with the gate's axes. Missing values are left
/// out so validation reports them.
fn axis_vertex(x: &Dimension, y: &Dimension, values: &[f64]) -> Vertex {
    let mut vertex = Vertex::new();
    if let Some(&value) = values.first() {
        vertex.set_coordinate(x.parameter.clone(), value);
    }
    if let Some(&value) = values.get(1) {
        vertex.set_coordinate(y.parameter.clone(), value);
    }
    vertex
}

fn covariance_matrix(shape: &XmlElement) -> GateResult<[[f64; 2]; 2]> {
    let rows = shape
        .child("covarianceMatrix")
        .ok_or_else(|| GateError::missing_parameter("covarianceMatrix", "ellipsoid gate"))?
        .children_named("row")
        .map(|row| {
            row.children_named("entry")
                .map(|e| required_number(e, "value"))
                .collect::<GateResult<Vec<f64>>>()
        })
        .collect::<GateResult<Vec<_>>>()?;

    match rows.as_slice() {
        [a, b] if a.len() == 2 && b.len() == 2 => Ok([[a[0], a[1]], [b[0], b[1]]]),
        _ => Err(GateError::invalid_geometry("covariance matrix must be 2x2")),
    }
}

fn parse_quadrant(shape: &XmlElement, dimension_element: &str) -> GateResult<GateGeometry> {
    let dividers = shape
        .children_named("divider")
        .map(|divider| {
            let id = divider
                .attr("id")
                .ok_or_else(|| GateError::missing_parameter("id", "quadrant divider"))?;
            let values = divider
                .children_named("value")
                .map(|v| {
                    v.text().parse::<f64>().map_err(|_| {
                        GateError::invalid_geometry(format!(
                            "divider '{}' value '{}' is not a number",
                            id,
                            v.text()
                        ))
                    })
                })
                .collect::<GateResult<Vec<_>>>()?;
            Ok(QuadrantDivider {
                id: Arc::from(id),
                dimension: parse_dimension(divider, dimension_element)?,
                values,
            })
        })
        .collect::<GateResult<Vec<_>>>()?;

    let quadrants = shape
        .children_named("Quadrant")
        .map(|quadrant| {
            let id = quadrant
                .attr("id")
                .ok_or_else(|| GateError::missing_parameter("id", "quadrant"))?;
            let positions = quadrant
                .children_named("position")
                .map(|p| {
                    let divider_ref = p
                        .attr("divider_ref")
                        .ok_or_else(|| GateError::missing_parameter("divider_ref", "quadrant position"))?;
                    Ok(QuadrantPosition {
                        divider_ref: Arc::from(divider_ref),
                        location: required_number(p, "location")?,
                    })
                })
                .collect::<GateResult<Vec<_>>>()?;
            Ok(QuadrantRegion {
                id: Arc::from(id),
                positions,
            })
        })
        .collect::<GateResult<Vec<_>>>()?;

    Ok(GateGeometry::Quadrant(QuadrantGateGeometry { dividers, quadrants }))
}

// ---- FlowJo for Mac ----

fn axis_name<'a>(shape: &'a XmlElement, attr: &str) -> GateResult<&'a str> {
    shape
        .attr(attr)
        .ok_or_else(|| GateError::missing_parameter(attr, format!("<{}>", shape.name)))
}

fn mac_points(shape: &XmlElement) -> GateResult<Vec<(f64, f64)>> {
    shape
        .descendants_named("Vertex")
        .into_iter()
        .map(|v| Ok((required_number(v, "x")?, required_number(v, "y")?)))
        .collect()
}

fn parse_mac_shape(shape: &XmlElement) -> GateResult<GateGeometry> {
    let x = axis_name(shape, "xAxisName")?;
    match shape.local_name() {
        "PolygonGate" => create_polygon_geometry(mac_points(shape)?, x, axis_name(shape, "yAxisName")?),
        "EllipseGate" => create_ellipse_from_axis_points(&mac_points(shape)?, x, axis_name(shape, "yAxisName")?),
        _ => {
            let mut bounds = vec![(x, number(shape, "xMin")?, number(shape, "xMax")?)];
            if let Some(y) = shape.attr("yAxisName") {
                bounds.push((y, number(shape, "yMin")?, number(shape, "yMax")?));
            }
            create_range_geometry(bounds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{XmlDocument, XmlParserOptions};

    const VX: GateDialect = GateDialect::GatingMl {
        dimension_element: "fcs-dimension",
    };

    fn element(xml: &str) -> XmlElement {
        XmlDocument::parse_str(xml, XmlParserOptions::empty())
            .unwrap()
            .root()
            .clone()
    }

    #[test]
    fn test_polygon_gate() {
        let population = element(
            r#"<Population name="Lymph" count="100"><Gate gating:id="G1">
              <gating:PolygonGate eventsInside="1">
                <gating:dimension gating:transformation-ref="T1"><data-type:fcs-dimension data-type:name="FSC-A"/></gating:dimension>
                <gating:dimension><data-type:fcs-dimension data-type:name="SSC-A"/></gating:dimension>
                <gating:vertex><gating:coordinate data-type:value="1"/><gating:coordinate data-type:value="2"/></gating:vertex>
                <gating:vertex><gating:coordinate data-type:value="10"/><gating:coordinate data-type:value="2"/></gating:vertex>
                <gating:vertex><gating:coordinate data-type:value="5"/><gating:coordinate data-type:value="9"/></gating:vertex>
              </gating:PolygonGate></Gate></Population>"#,
        );

        let gate = parse_gate(&population, VX, true).unwrap();
        assert_eq!(gate.kind, GateKind::Polygon);
        assert_eq!(gate.id.as_deref(), Some("G1"));
        assert!(!gate.negated);

        let Some(GateGeometry::Polygon(polygon)) = &gate.geometry else {
            panic!("expected polygon geometry");
        };
        assert_eq!(polygon.coordinates(), vec![(1.0, 2.0), (10.0, 2.0), (5.0, 9.0)]);
        assert_eq!(polygon.x.transformation_ref.as_deref(), Some("T1"));
    }

    #[test]
    fn test_skeleton_keeps_kind_only() {
        let population = element(
            r#"<Population name="CD3"><Gate><gating:RectangleGate eventsInside="0">
              <gating:dimension gating:min="abc"><data-type:fcs-dimension data-type:name="CD3"/></gating:dimension>
            </gating:RectangleGate></Gate></Population>"#,
        );

        let gate = parse_gate(&population, VX, false).unwrap();
        assert_eq!(gate.kind, GateKind::Range);
        assert!(gate.geometry.is_none());
        assert!(gate.negated);

        // The malformed bound is only noticed when geometry is parsed
        let err = parse_gate(&population, VX, true).unwrap_err();
        assert!(err.is_geometry_error());
    }

    #[test]
    fn test_ellipsoid_gate() {
        let population = element(
            r#"<Population name="E"><Gate><gating:EllipsoidGate>
              <gating:dimension><data-type:parameter data-type:name="x"/></gating:dimension>
              <gating:dimension><data-type:parameter data-type:name="y"/></gating:dimension>
              <gating:mean><gating:coordinate data-type:value="50"/><gating:coordinate data-type:value="60"/></gating:mean>
              <gating:covarianceMatrix>
                <gating:row><gating:entry data-type:value="4"/><gating:entry data-type:value="1"/></gating:row>
                <gating:row><gating:entry data-type:value="1"/><gating:entry data-type:value="9"/></gating:row>
              </gating:covarianceMatrix>
              <gating:distanceSquare data-type:value="1"/>
            </gating:EllipsoidGate></Gate></Population>"#,
        );
        let windows = GateDialect::GatingMl {
            dimension_element: "parameter",
        };

        let gate = parse_gate(&population, windows, true).unwrap();
        let Some(GateGeometry::Ellipsoid(ellipse)) = &gate.geometry else {
            panic!("expected ellipsoid geometry");
        };
        assert_eq!(ellipse.center().unwrap(), (50.0, 60.0));
        assert_eq!(ellipse.covariance, [[4.0, 1.0], [1.0, 9.0]]);
    }

    #[test]
    fn test_quadrant_gate() {
        let population = element(
            r#"<Population name="Q"><Gate><gating:QuadrantGate>
              <gating:divider gating:id="D1"><data-type:fcs-dimension data-type:name="CD4"/><gating:value>100</gating:value></gating:divider>
              <gating:divider gating:id="D2"><data-type:fcs-dimension data-type:name="CD8"/><gating:value>200</gating:value></gating:divider>
              <gating:Quadrant gating:id="Q1">
                <gating:position gating:divider_ref="D1" gating:location="150"/>
                <gating:position gating:divider_ref="D2" gating:location="250"/>
              </gating:Quadrant>
            </gating:QuadrantGate></Gate></Population>"#,
        );

        let gate = parse_gate(&population, VX, true).unwrap();
        assert_eq!(gate.kind, GateKind::Quadrant);
        let Some(GateGeometry::Quadrant(quadrant)) = &gate.geometry else {
            panic!("expected quadrant geometry");
        };
        assert_eq!(quadrant.dividers[1].values, vec![200.0]);
        assert_eq!(quadrant.quadrants[0].positions.len(), 2);
    }

    #[test]
    fn test_boolean_nodes() {
        let or = element(
            r#"<OrNode name="either"><Dependents><Dependent name="CD4"/><Dependent name="CD8"/></Dependents></OrNode>"#,
        );
        let gate = parse_gate(&or, VX, true).unwrap();
        assert_eq!(gate.kind, GateKind::Boolean);
        assert_eq!(gate.operation, Some(BooleanOperation::Or));
        assert_eq!(gate.references.len(), 2);

        let skeleton = parse_gate(&or, VX, false).unwrap();
        assert_eq!(skeleton.operation, Some(BooleanOperation::Or));
        assert!(skeleton.references.is_empty());

        let bad_not = element(
            r#"<NotNode name="neither"><Dependents><Dependent name="A"/><Dependent name="B"/></Dependents></NotNode>"#,
        );
        assert!(parse_gate(&bad_not, VX, true).is_err());
    }

    #[test]
    fn test_reference_gate() {
        let population = element(r#"<Population name="copy"><Gate ref="/Lymph/CD4"/></Population>"#);
        let gate = parse_gate(&population, VX, true).unwrap();
        assert_eq!(gate.kind, GateKind::Reference);
        assert_eq!(gate.references[0].path.as_ref(), "/Lymph/CD4");
    }

    #[test]
    fn test_population_without_gate() {
        let population = element(r#"<Population name="empty"/>"#);
        let err = parse_gate(&population, VX, true).unwrap_err();
        assert!(err.is_geometry_error());

        // The skeleton keeps the population with an unknown gate
        let gate = parse_gate(&population, VX, false).unwrap();
        assert_eq!(gate.kind, GateKind::Unknown);
        assert!(gate.geometry.is_none() && gate.references.is_empty());
    }

    #[test]
    fn test_mac_shapes() {
        let polygon = element(
            r#"<Population name="P"><PolygonGate xAxisName="FSC-H" yAxisName="SSC-H"><Polygon>
              <Vertex x="0" y="0"/><Vertex x="100" y="0"/><Vertex x="50" y="80"/>
            </Polygon></PolygonGate></Population>"#,
        );
        let gate = parse_gate(&polygon, GateDialect::MacLegacy, true).unwrap();
        assert_eq!(gate.kind, GateKind::Polygon);

        let range = element(r#"<Population name="R"><RectangleGate xAxisName="FL1-H" xMin="10" xMax="1000"/></Population>"#);
        let gate = parse_gate(&range, GateDialect::MacLegacy, true).unwrap();
        assert_eq!(gate.kind, GateKind::Range);
        assert_eq!(
            parse_gate(&range, GateDialect::MacLegacy, false).unwrap().kind,
            GateKind::Range
        );

        let ellipse = element(
            r#"<Population name="E"><EllipseGate xAxisName="FSC-H" yAxisName="SSC-H">
              <Vertex x="0" y="50"/><Vertex x="100" y="50"/><Vertex x="50" y="30"/><Vertex x="50" y="70"/>
            </EllipseGate></Population>"#,
        );
        let gate = parse_gate(&ellipse, GateDialect::MacLegacy, true).unwrap();
        let Some(GateGeometry::Ellipsoid(e)) = &gate.geometry else {
            panic!("expected ellipse geometry");
        };
        assert_eq!(e.center().unwrap(), (50.0, 50.0));
    }
}
