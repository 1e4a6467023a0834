//! Channel transformations and compensation matrices.

use crate::dispatch::CompensationDialect;
use crate::document::XmlElement;
use flow_gates::{Compensation, GateError, GateResult, Transformation, TransformationKind};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// One transformation element: the definition, its declared id and the
/// channel it is bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredTransformation {
    pub id: Option<String>,
    pub channel: Option<String>,
    pub transformation: Transformation,
}

/// Parse every recognised transformation under a `Transformations` element.
/// Unknown kinds are skipped with a warning.
pub fn parse_transformations(container: &XmlElement) -> GateResult<Vec<DeclaredTransformation>> {
    let mut declared = Vec::new();
    for element in &container.children {
        let Ok(kind) = TransformationKind::from_str(element.local_name()) else {
            warn!("Skipping unsupported transformation <{}>", element.name);
            continue;
        };
        declared.push(DeclaredTransformation {
            id: element.attr("id").map(str::to_string),
            channel: element
                .children
                .iter()
                .find(|c| c.is("parameter") || c.is("fcs-dimension"))
                .and_then(|c| c.attr("name"))
                .map(str::to_string),
            transformation: parse_transformation(element, kind)?,
        });
    }
    debug!("Parsed {} transformation definitions", declared.len());
    Ok(declared)
}

/// Read a transformation's parameters, keeping FlowJo's defaults for any
/// attribute that is absent.
pub fn parse_transformation(element: &XmlElement, kind: TransformationKind) -> GateResult<Transformation> {
    let read = |attr: &str, target: &mut f64| -> GateResult<()> {
        if let Some(raw) = element.attr(attr) {
            *target = raw.trim().parse().map_err(|_| {
                GateError::invalid_transformation(
                    kind.to_string(),
                    format!("attribute {} '{}' is not a number", attr, raw),
                )
            })?;
        }
        Ok(())
    };

    let mut transformation = Transformation::default_for(kind);
    match &mut transformation {
        Transformation::Linear { min, max, gain } => {
            read("minRange", min)?;
            read("maxRange", max)?;
            read("gain", gain)?;
        }
        Transformation::Log { offset, decades } => {
            read("offset", offset)?;
            read("decades", decades)?;
        }
        Transformation::Logicle {
            top_of_scale,
            width,
            positive_decades,
            negative_decades,
        }
        | Transformation::Hyperlog {
            top_of_scale,
            width,
            positive_decades,
            negative_decades,
        } => {
            read("T", top_of_scale)?;
            read("W", width)?;
            read("M", positive_decades)?;
            read("A", negative_decades)?;
        }
        Transformation::Biex {
            length,
            max_range,
            negative,
            width,
            positive,
        } => {
            read("length", length)?;
            read("maxRange", max_range)?;
            read("neg", negative)?;
            read("width", width)?;
            read("pos", positive)?;
        }
        Transformation::Fasinh {
            top_of_scale,
            positive_decades,
            negative_decades,
        } => {
            read("T", top_of_scale)?;
            read("M", positive_decades)?;
            read("A", negative_decades)?;
        }
    }
    Ok(transformation)
}

/// The compensation declared on a sample element, if any.
pub fn parse_compensation(sample: &XmlElement, dialect: CompensationDialect) -> GateResult<Option<Compensation>> {
    match dialect {
        CompensationDialect::SpilloverMatrix => sample
            .child("spilloverMatrix")
            .map(parse_spillover_matrix)
            .transpose(),
        CompensationDialect::CompensationMatrix => sample
            .child("CompensationMatrix")
            .map(parse_compensation_matrix)
            .transpose(),
    }
}

fn value_of(element: &XmlElement, matrix: &str) -> GateResult<f64> {
    let raw = element
        .attr("value")
        .ok_or_else(|| GateError::invalid_compensation(matrix, format!("<{}> has no value", element.name)))?;
    raw.trim()
        .parse()
        .map_err(|_| GateError::invalid_compensation(matrix, format!("'{}' is not a number", raw)))
}

fn finish(compensation: Compensation, element: &XmlElement) -> Compensation {
    let compensation = match element.attr("prefix") {
        Some(prefix) => compensation.with_prefix(prefix),
        None => compensation,
    };
    match element.attr("suffix") {
        Some(suffix) => compensation.with_suffix(suffix),
        None => compensation,
    }
}

/// `transforms:spilloverMatrix` with a `parameters` list and one
/// `spillover` row per detector.
fn parse_spillover_matrix(matrix: &XmlElement) -> GateResult<Compensation> {
    let name = matrix.attr("name").or_else(|| matrix.attr("id")).unwrap_or("spillover");
    let parameters: Vec<Arc<str>> = matrix
        .child("parameters")
        .map(|p| {
            p.children_named("parameter")
                .filter_map(|e| e.attr("name"))
                .map(Arc::from)
                .collect()
        })
        .unwrap_or_default();

    let rows = parameters
        .iter()
        .map(|from| {
            let row = matrix
                .children_named("spillover")
                .find(|s| s.attr("parameter") == Some(from.as_ref()))
                .ok_or_else(|| GateError::invalid_compensation(name, format!("no spillover row for '{}'", from)))?;
            parameters
                .iter()
                .map(|to| {
                    let coefficient = row
                        .children_named("coefficient")
                        .find(|c| c.attr("parameter") == Some(to.as_ref()))
                        .ok_or_else(|| {
                            GateError::invalid_compensation(
                                name,
                                format!("no coefficient from '{}' into '{}'", from, to),
                            )
                        })?;
                    value_of(coefficient, name)
                })
                .collect::<GateResult<Vec<f64>>>()
        })
        .collect::<GateResult<Vec<_>>>()?;

    Ok(finish(Compensation::new(name, parameters, rows)?, matrix))
}

/// FlowJo for Mac `CompensationMatrix` with `Channel/ChannelValue` rows.
fn parse_compensation_matrix(matrix: &XmlElement) -> GateResult<Compensation> {
    let name = matrix.attr("name").unwrap_or("compensation");
    let channels: Vec<&XmlElement> = matrix.children_named("Channel").collect();
    let parameters = channels
        .iter()
        .map(|c| {
            c.attr("name")
                .map(Arc::from)
                .ok_or_else(|| GateError::invalid_compensation(name, "channel without a name"))
        })
        .collect::<GateResult<Vec<Arc<str>>>>()?;

    let rows = channels
        .iter()
        .zip(&parameters)
        .map(|(channel, from)| {
            parameters
                .iter()
                .map(|to| {
                    let value = channel
                        .children_named("ChannelValue")
                        .find(|v| v.attr("name") == Some(to.as_ref()))
                        .ok_or_else(|| {
                            GateError::invalid_compensation(
                                name,
                                format!("no value from '{}' into '{}'", from, to),
                            )
                        })?;
                    value_of(value, name)
                })
                .collect::<GateResult<Vec<f64>>>()
        })
        .collect::<GateResult<Vec<_>>>()?;

    Ok(finish(Compensation::new(name, parameters, rows)?, matrix))
}
