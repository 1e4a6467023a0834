//! Sample declaration lookup and request resolution.

use crate::dispatch::{SampleNameLocation, WorkspaceType};
use crate::document::{XmlDocument, XmlElement};
use crate::error::{Result, WorkspaceError};
use indexmap::IndexMap;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

/// A sample block declared in the document.
#[derive(Debug, Clone)]
pub struct SampleEntry<'d> {
    pub id: String,
    pub name: String,
    pub element: &'d XmlElement,
}

/// Every `SampleList/Sample` of the document, in document order.
///
/// Fails with `MalformedDocument` when a sample has no id or two samples share one.
pub fn declared_samples<'d>(
    doc: &'d XmlDocument,
    workspace_type: WorkspaceType,
    name_location: SampleNameLocation,
) -> Result<Vec<SampleEntry<'d>>> {
    let Some(list) = doc.root().child("SampleList") else {
        warn!("Workspace {} declares no SampleList", doc.source_name());
        return Ok(Vec::new());
    };

    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut entries = Vec::new();

    for (idx, element) in list.children_named("Sample").enumerate() {
        let id = workspace_type.sample_id(element).ok_or_else(|| {
            WorkspaceError::malformed(doc.source_name(), format!("sample #{} has no sample id", idx + 1))
        })?;
        if !seen.insert(id) {
            return Err(WorkspaceError::malformed(
                doc.source_name(),
                format!("sample id '{}' is declared more than once", id),
            ));
        }

        let name = name_location.sample_name(element).unwrap_or_else(|| {
            warn!("Sample '{}' has no name, using its id", id);
            id.to_string()
        });

        entries.push(SampleEntry {
            id: id.to_string(),
            name,
            element,
        });
    }

    debug!("Found {} declared samples", entries.len());
    Ok(entries)
}

/// Groups declared under `Groups/GroupNode`, as group name to member sample ids.
pub fn declared_groups(doc: &XmlDocument) -> IndexMap<String, Vec<String>> {
    let Some(groups) = doc.root().child("Groups") else {
        return IndexMap::new();
    };

    groups
        .children_named("GroupNode")
        .filter_map(|node| {
            let name = node.attr("name")?.to_string();
            let members = node
                .find("Group/SampleRefs")
                .map(|refs| {
                    refs.children_named("SampleRef")
                        .filter_map(|r| r.attr("sampleID"))
                        .map(str::to_string)
                        .unique()
                        .collect()
                })
                .unwrap_or_default();
            Some((name, members))
        })
        .collect()
}

/// Select the samples to parse.
///
/// With no ids and no names every declared sample is returned. Otherwise ids
/// are matched first and names second, each in request order; a name that is
/// also a sample id selects that sample. Requesting a sample twice yields it once.
pub fn resolve_samples<'d>(
    declared: &[SampleEntry<'d>],
    sample_ids: &[String],
    sample_names: &[String],
    skip_missing: bool,
) -> Result<Vec<SampleEntry<'d>>> {
    if sample_ids.is_empty() && sample_names.is_empty() {
        return Ok(declared.to_vec());
    }

    let by_id: FxHashMap<&str, usize> = declared
        .iter()
        .enumerate()
        .map(|(idx, s)| (s.id.as_str(), idx))
        .collect();

    let mut chosen: Vec<usize> = Vec::new();
    let mut chosen_set: FxHashSet<usize> = FxHashSet::default();
    let mut choose = |idx: usize| {
        if chosen_set.insert(idx) {
            chosen.push(idx);
        }
    };

    let missing = |what: &str, value: &str| -> Result<()> {
        if skip_missing {
            warn!("Skipping missing sample {} '{}'", what, value);
            Ok(())
        } else {
            Err(WorkspaceError::SampleNotFound(format!("{} '{}'", what, value)))
        }
    };

    for id in sample_ids {
        match by_id.get(id.as_str()) {
            Some(&idx) => choose(idx),
            None => missing("id", id)?,
        }
    }

    for name in sample_names {
        if let Some(&idx) = by_id.get(name.as_str()) {
            choose(idx);
            continue;
        }
        let matches: Vec<usize> = declared
            .iter()
            .positions(|s| s.name == *name)
            .collect();
        match matches.as_slice() {
            [idx] => choose(*idx),
            [] => missing("name", name)?,
            _ => {
                return Err(WorkspaceError::AmbiguousSample {
                    name: name.clone(),
                    candidates: matches.iter().map(|&i| declared[i].id.clone()).collect(),
                });
            }
        }
    }

    Ok(chosen.into_iter().map(|idx| declared[idx].clone()).collect())
}

/// A unique key per resolved sample, given as `(id, name)` pairs: the name,
/// or `{name}_{id}` when the name is shared with another resolved sample.
pub fn assign_guids(samples: &[(&str, &str)]) -> Result<Vec<String>> {
    let name_counts = samples.iter().counts_by(|(_, name)| *name);

    let guids: Vec<String> = samples
        .iter()
        .map(|&(id, name)| {
            if name_counts.get(name).copied().unwrap_or(0) > 1 {
                format!("{}_{}", name, id)
            } else {
                name.to_string()
            }
        })
        .collect();

    if let Some(duplicate) = guids.iter().duplicates().next() {
        return Err(WorkspaceError::DuplicateSampleGuid(duplicate.clone()));
    }
    Ok(guids)
}
