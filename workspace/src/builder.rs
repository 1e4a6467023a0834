//! Per-sample gating tree construction.

use crate::channels::{DeclaredTransformation, parse_compensation, parse_transformations};
use crate::dispatch::{TransformationScope, WorkspaceType};
use crate::document::XmlElement;
use crate::error::{Result, WorkspaceError};
use crate::gatingml::parse_gate;
use crate::samples::SampleEntry;
use flow_gates::{Compensation, GateError, NodeId, PopulationTree, TransformationSet};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Everything parsed from one sample block, before it joins a gating set.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSample {
    pub id: String,
    pub name: String,
    pub keywords: IndexMap<String, String>,
    pub compensation: Option<Compensation>,
    /// Channel name to transformation key in `transformations`
    pub channel_transformations: IndexMap<String, Arc<str>>,
    /// Declared transformation id to key in `transformations`
    pub transformation_ids: IndexMap<String, Arc<str>>,
    /// Definitions this sample uses, merged into the shared set on assembly
    pub transformations: TransformationSet,
    pub tree: PopulationTree,
}

/// Parse a recorded event count. Negative or non-numeric counts are dropped.
fn parse_count(raw: Option<&str>) -> Option<u64> {
    let raw = raw?.trim();
    match raw.parse::<i64>() {
        Ok(count) => u64::try_from(count).ok(),
        Err(_) => {
            debug!("Ignoring non-numeric count '{}'", raw);
            None
        }
    }
}

fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent_path, name)
    }
}

/// Build the gating tree and metadata of one sample.
///
/// `workspace_transformations` are the definitions declared at workspace
/// scope; dialects that declare transformations per sample read them from the
/// sample block instead.
pub fn build_sample(
    entry: &SampleEntry<'_>,
    workspace_type: WorkspaceType,
    workspace_transformations: &[DeclaredTransformation],
    parse_gates: bool,
) -> Result<BuiltSample> {
    let sample_id = entry.id.as_str();
    let sample = entry.element;
    let root_element = workspace_type.sample_node(sample).ok_or_else(|| {
        WorkspaceError::malformed(format!("sample {}", sample_id), "sample has no SampleNode")
    })?;

    let mut tree = PopulationTree::with_root_count(parse_count(root_element.attr("count")));
    let dialect = workspace_type.gate_dialect();

    let mut pending: Vec<(NodeId, &XmlElement)> = workspace_type
        .population_children(root_element)
        .into_iter()
        .rev()
        .map(|child| (NodeId::ROOT, child))
        .collect();

    while let Some((parent, element)) = pending.pop() {
        let parent_path = tree
            .get(parent)
            .map(|node| node.path.to_string())
            .unwrap_or_default();
        let name = element
            .attr("name")
            .ok_or_else(|| WorkspaceError::invalid_gate(sample_id, &parent_path, "population without a name"))?;
        let path = child_path(&parent_path, name);

        let gate = parse_gate(element, dialect, parse_gates)
            .map_err(|e| WorkspaceError::from_gate_error(sample_id, &path, e))?;
        let id = tree
            .add_child(parent, name, parse_count(element.attr("count")), gate)
            .map_err(|e| WorkspaceError::from_gate_error(sample_id, &path, e))?;
        trace!("Added population {}", path);

        pending.extend(
            workspace_type
                .population_children(element)
                .into_iter()
                .rev()
                .map(|child| (id, child)),
        );
    }

    if parse_gates {
        tree.resolve_references()
            .map_err(|e| WorkspaceError::from_gate_error(sample_id, "/", e))?;
    }

    let keywords: IndexMap<String, String> = sample
        .child("Keywords")
        .map(|k| {
            k.children_named("Keyword")
                .filter_map(|kw| Some((kw.attr("name")?.to_string(), kw.attr("value").unwrap_or("").to_string())))
                .collect()
        })
        .unwrap_or_default();

    let compensation = parse_compensation(sample, workspace_type.compensation_dialect())
        .map_err(|e| WorkspaceError::from_gate_error(sample_id, "/", e))?;

    let scope = workspace_type.transformation_scope();
    let sample_scoped;
    let declared = match scope {
        TransformationScope::Workspace => workspace_transformations,
        TransformationScope::Sample => {
            sample_scoped = sample
                .child("Transformations")
                .map(parse_transformations)
                .transpose()
                .map_err(|e| WorkspaceError::from_gate_error(sample_id, "/", e))?
                .unwrap_or_default();
            sample_scoped.as_slice()
        }
    };

    let mut transformations = TransformationSet::new();
    let mut transformation_ids: IndexMap<String, Arc<str>> = IndexMap::new();
    let mut channel_transformations = IndexMap::new();
    for definition in declared {
        // Ids declared inside a sample block only name definitions of that
        // sample, so the shared set keys them canonically.
        let shared_id = match scope {
            TransformationScope::Workspace => definition.id.as_deref(),
            TransformationScope::Sample => None,
        };
        let key = transformations
            .intern(shared_id, definition.transformation.clone())
            .map_err(|e| WorkspaceError::from_gate_error(sample_id, "/", e))?;

        if let Some(id) = &definition.id {
            match transformation_ids.get(id) {
                Some(bound) if *bound != key => {
                    let conflict = GateError::TransformationConflict {
                        id: id.clone(),
                        existing: bound.to_string(),
                        incoming: key.to_string(),
                    };
                    return Err(WorkspaceError::from_gate_error(sample_id, "/", conflict));
                }
                Some(_) => {}
                None => {
                    transformation_ids.insert(id.clone(), key.clone());
                }
            }
        }
        if let Some(channel) = &definition.channel {
            channel_transformations.insert(channel.clone(), key);
        }
    }

    debug!(
        "Sample {} ('{}'): {} populations, {} transformations",
        sample_id,
        entry.name,
        tree.node_count(),
        transformations.len()
    );

    Ok(BuiltSample {
        id: entry.id.clone(),
        name: entry.name.clone(),
        keywords,
        compensation,
        channel_transformations,
        transformation_ids,
        transformations,
        tree,
    })
}
