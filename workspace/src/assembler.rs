//! The gating set: every parsed sample plus the data they share.

use crate::builder::BuiltSample;
use crate::dispatch::WorkspaceType;
use crate::error::{Result, WorkspaceError};
use crate::samples::assign_guids;
use flow_gates::{Compensation, PopulationTree, Transformation, TransformationSet};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One parsed sample: its metadata and population tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleGatingHierarchy {
    pub id: String,
    pub name: String,
    /// Name if unique within the gating set, otherwise `{name}_{id}`
    pub guid: String,
    pub keywords: IndexMap<String, String>,
    pub compensation: Option<Compensation>,
    /// Channel name to a key of [`GatingSet::transformations`]
    pub channel_transformations: IndexMap<String, Arc<str>>,
    /// Transformation ids visible to this sample's gates, each mapped to a
    /// key of [`GatingSet::transformations`]
    pub transformation_ids: IndexMap<String, Arc<str>>,
    pub tree: PopulationTree,
}

/// The parsed gating hierarchies of a workspace.
///
/// Samples are kept in resolution order and keyed by sample id.
/// Transformations are shared: a definition used by several samples is
/// stored once and referenced by key. Ids declared inside a sample block are
/// only visible to that sample's gates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatingSet {
    workspace_type: WorkspaceType,
    version: Option<String>,
    samples: IndexMap<String, SampleGatingHierarchy>,
    transformations: TransformationSet,
    groups: IndexMap<String, Vec<String>>,
}

impl GatingSet {
    /// Combine built samples, checking the cross-sample invariants.
    ///
    /// With `check_gate_refs` set every gate dimension's transformation
    /// reference must name an id bound on its own sample, and every boolean
    /// or reference gate must be linked.
    pub fn assemble(
        workspace_type: WorkspaceType,
        version: Option<String>,
        built: Vec<BuiltSample>,
        groups: IndexMap<String, Vec<String>>,
        check_gate_refs: bool,
    ) -> Result<Self> {
        let pairs: Vec<(&str, &str)> = built.iter().map(|b| (b.id.as_str(), b.name.as_str())).collect();
        let guids = assign_guids(&pairs)?;

        let mut transformations = TransformationSet::new();
        let mut samples = IndexMap::with_capacity(built.len());

        for (sample, guid) in built.into_iter().zip(guids) {
            transformations
                .merge(sample.transformations)
                .map_err(|e| WorkspaceError::from_gate_error(&sample.id, "/", e))?;

            if let Some(key) = sample
                .channel_transformations
                .values()
                .find(|key| !transformations.contains(key))
            {
                return Err(WorkspaceError::UnknownTransformation {
                    sample: sample.id.clone(),
                    reference: key.to_string(),
                });
            }

            if check_gate_refs {
                check_sample_refs(&sample.id, &sample.tree, &sample.transformation_ids)?;
            }

            if samples.contains_key(&sample.id) {
                return Err(WorkspaceError::malformed(
                    format!("sample {}", sample.id),
                    "sample parsed twice",
                ));
            }

            samples.insert(
                sample.id.clone(),
                SampleGatingHierarchy {
                    id: sample.id,
                    name: sample.name,
                    guid,
                    keywords: sample.keywords,
                    compensation: sample.compensation,
                    channel_transformations: sample.channel_transformations,
                    transformation_ids: sample.transformation_ids,
                    tree: sample.tree,
                },
            );
        }

        debug!(
            "Assembled gating set: {} samples, {} shared transformations",
            samples.len(),
            transformations.len()
        );

        Ok(Self {
            workspace_type,
            version,
            samples,
            transformations,
            groups,
        })
    }

    pub fn workspace_type(&self) -> WorkspaceType {
        self.workspace_type
    }

    /// The `Workspace@version` tag, if declared.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Sample by id.
    pub fn get(&self, sample_id: &str) -> Option<&SampleGatingHierarchy> {
        self.samples.get(sample_id)
    }

    pub fn get_by_guid(&self, guid: &str) -> Option<&SampleGatingHierarchy> {
        self.samples.values().find(|s| s.guid == guid)
    }

    /// Every sample with the given display name.
    pub fn get_by_name(&self, name: &str) -> Vec<&SampleGatingHierarchy> {
        self.samples.values().filter(|s| s.name == name).collect()
    }

    pub fn sample_ids(&self) -> impl Iterator<Item = &str> {
        self.samples.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleGatingHierarchy> {
        self.samples.values()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn transformations(&self) -> &TransformationSet {
        &self.transformations
    }

    /// Declared groups and their member sample ids.
    pub fn groups(&self) -> &IndexMap<String, Vec<String>> {
        &self.groups
    }

    /// The transformation bound to `channel` on a sample.
    pub fn transformation_for(&self, sample_id: &str, channel: &str) -> Option<&Transformation> {
        let key = self.get(sample_id)?.channel_transformations.get(channel)?;
        self.transformations.get(key)
    }

    /// The transformation a sample's gates reach through the declared `id`.
    pub fn transformation_by_id(&self, sample_id: &str, id: &str) -> Option<&Transformation> {
        let key = self.get(sample_id)?.transformation_ids.get(id)?;
        self.transformations.get(key)
    }
}

fn check_sample_refs(
    sample_id: &str,
    tree: &PopulationTree,
    transformation_ids: &IndexMap<String, Arc<str>>,
) -> Result<()> {
    for (_, node) in tree {
        let Some(geometry) = node.gate.as_ref().and_then(|g| g.geometry.as_ref()) else {
            continue;
        };
        if let Some(reference) = geometry
            .dimensions()
            .into_iter()
            .filter_map(|d| d.transformation_ref.as_ref())
            .find(|r| !transformation_ids.contains_key(r.as_ref()))
        {
            return Err(WorkspaceError::UnknownTransformation {
                sample: sample_id.to_string(),
                reference: reference.to_string(),
            });
        }
    }

    if let Some((holder, reference)) = tree.unresolved_references().into_iter().next() {
        let population = tree
            .get(holder)
            .map(|n| n.path.to_string())
            .unwrap_or_else(|| holder.to_string());
        return Err(WorkspaceError::DanglingGateReference {
            sample: sample_id.to_string(),
            population,
            reference: reference.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_gates::{
        Dimension, Gate, GateGeometry, GateKind, NodeId, RangeDimension, RangeGateGeometry,
        TransformationKind,
    };

    fn sample(id: &str, name: &str) -> BuiltSample {
        BuiltSample {
            id: id.to_string(),
            name: name.to_string(),
            keywords: IndexMap::new(),
            compensation: None,
            channel_transformations: IndexMap::new(),
            transformation_ids: IndexMap::new(),
            transformations: TransformationSet::new(),
            tree: PopulationTree::new(),
        }
    }

    fn with_transform(mut built: BuiltSample, channel: &str, kind: TransformationKind) -> BuiltSample {
        let key = built
            .transformations
            .intern(None, Transformation::default_for(kind))
            .unwrap();
        built.channel_transformations.insert(channel.to_string(), key);
        built
    }

    fn assemble(built: Vec<BuiltSample>) -> Result<GatingSet> {
        GatingSet::assemble(WorkspaceType::FlowJoX, Some("20.0".into()), built, IndexMap::new(), true)
    }

    #[test]
    fn test_shared_transformations_interned_once() {
        let set = assemble(vec![
            with_transform(sample("1", "a.fcs"), "CD3", TransformationKind::Logicle),
            with_transform(sample("2", "b.fcs"), "CD3", TransformationKind::Logicle),
            with_transform(sample("3", "c.fcs"), "FSC-A", TransformationKind::Linear),
        ])
        .unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.transformations().len(), 2);
        assert_eq!(
            set.transformation_for("2", "CD3").map(Transformation::kind),
            Some(TransformationKind::Logicle)
        );
        assert_eq!(set.transformation_for("2", "FSC-A"), None);
    }

    #[test]
    fn test_order_and_lookup() {
        let set = assemble(vec![sample("9", "x.fcs"), sample("2", "x.fcs"), sample("5", "y.fcs")]).unwrap();
        assert_eq!(set.sample_ids().collect::<Vec<_>>(), vec!["9", "2", "5"]);
        assert_eq!(set.get_by_guid("x.fcs_2").map(|s| s.id.as_str()), Some("2"));
        assert_eq!(set.get_by_guid("y.fcs").map(|s| s.id.as_str()), Some("5"));
        assert_eq!(set.get_by_name("x.fcs").len(), 2);
        assert_eq!(set.version(), Some("20.0"));
    }

    #[test]
    fn test_unknown_gate_transformation() {
        let mut built = sample("1", "a.fcs");
        let geometry = GateGeometry::Range(RangeGateGeometry {
            dimensions: vec![RangeDimension::new(
                Dimension::new("CD3").with_transformation_ref("T-missing"),
                Some(1.0),
                None,
            )],
        });
        built
            .tree
            .add_child(NodeId::ROOT, "CD3+", None, Gate::geometric(geometry))
            .unwrap();

        let err = assemble(vec![built.clone()]).unwrap_err();
        assert!(matches!(err, WorkspaceError::UnknownTransformation { ref reference, .. } if reference == "T-missing"));

        // Skeleton sets skip gate checks
        assert!(GatingSet::assemble(WorkspaceType::FlowJoX, None, vec![built], IndexMap::new(), false).is_ok());
    }

    #[test]
    fn test_gate_transformation_ids_are_per_sample() {
        let gated = |id: &str| {
            let mut built = sample(id, &format!("{id}.fcs"));
            let geometry = GateGeometry::Range(RangeGateGeometry {
                dimensions: vec![RangeDimension::new(
                    Dimension::new("CD3").with_transformation_ref("Tb"),
                    Some(1.0),
                    None,
                )],
            });
            built
                .tree
                .add_child(NodeId::ROOT, "CD3+", None, Gate::geometric(geometry))
                .unwrap();
            built
        };

        let mut declaring = gated("2");
        let key = declaring
            .transformations
            .intern(None, Transformation::default_for(TransformationKind::Logicle))
            .unwrap();
        declaring.transformation_ids.insert("Tb".to_string(), key);

        // Another sample binding "Tb" does not make it visible to sample 1
        let err = assemble(vec![gated("1"), declaring.clone()]).unwrap_err();
        assert!(matches!(err, WorkspaceError::UnknownTransformation { ref sample, .. } if sample == "1"));

        let set = assemble(vec![declaring]).unwrap();
        assert_eq!(
            set.transformation_by_id("2", "Tb").map(Transformation::kind),
            Some(TransformationKind::Logicle)
        );
    }

    #[test]
    fn test_unresolved_reference_rejected() {
        let mut built = sample("1", "a.fcs");
        built
            .tree
            .add_child(NodeId::ROOT, "copy", None, Gate::reference("/elsewhere"))
            .unwrap();
        let err = assemble(vec![built]).unwrap_err();
        assert!(matches!(err, WorkspaceError::DanglingGateReference { .. }));
    }

    #[test]
    fn test_conflicting_transformation_ids() {
        let mut a = sample("1", "a.fcs");
        a.transformations
            .intern(Some("T1"), Transformation::default_for(TransformationKind::Logicle))
            .unwrap();
        let mut b = sample("2", "b.fcs");
        b.transformations
            .intern(Some("T1"), Transformation::default_for(TransformationKind::Linear))
            .unwrap();

        assert!(assemble(vec![a, b]).is_err());
    }

    #[test]
    fn test_serializes_samples_in_order() {
        let mut built = sample("1", "a.fcs");
        built
            .tree
            .add_child(NodeId::ROOT, "Lymph", Some(10), Gate::skeleton(GateKind::Polygon))
            .unwrap();
        let set = assemble(vec![built]).unwrap();

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["workspace_type"], "FlowJoX");
        assert_eq!(json["samples"]["1"]["guid"], "a.fcs");
        assert_eq!(json["samples"]["1"]["tree"]["nodes"][1]["name"], "Lymph");
    }
}
