use crate::error::{GateError, Result};
use crate::linking::GateLinks;
use crate::types::Gate;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Index of a population within its [`PopulationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The root population of every tree.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A population: a named node of the gating tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationNode {
    pub name: Arc<str>,
    /// Slash-joined names from the root, e.g. `/Lymph/CD4`. The root is `/`.
    pub path: Arc<str>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Event count recorded by the acquisition software, if any
    pub count: Option<u64>,
    /// Absent only for the root
    pub gate: Option<Gate>,
}

impl PopulationNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// The gating tree of one sample.
///
/// Populations are stored in an arena and addressed by [`NodeId`]. Children
/// keep their declaration order. Each tree has exactly one root, named `root`
/// with path `/`, and nodes are only ever appended below an existing node, so
/// the structure cannot contain cycles.
///
/// Boolean and reference gates name other populations by path. Those names
/// are resolved to [`NodeId`]s by [`PopulationTree::resolve_references`] once
/// every population has been added.
///
/// # Example
///
/// ```rust
/// use flow_gates::{Gate, GateKind, NodeId, PopulationTree};
///
/// let mut tree = PopulationTree::new();
/// let lymph = tree.add_child(NodeId::ROOT, "Lymph", Some(5000), Gate::skeleton(GateKind::Polygon))?;
/// let cd4 = tree.add_child(lymph, "CD4", Some(1200), Gate::skeleton(GateKind::Rectangle))?;
///
/// assert_eq!(tree.find_by_path("/Lymph/CD4"), Some(cd4));
/// assert_eq!(tree.get_depth(cd4), 2);
/// assert_eq!(tree.get_chain_to_root(cd4), vec![NodeId::ROOT, lymph, cd4]);
/// # Ok::<(), flow_gates::GateError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopulationTree {
    nodes: Vec<PopulationNode>,
    #[serde(skip)]
    by_path: FxHashMap<Arc<str>, NodeId>,
    #[serde(skip)]
    links: GateLinks,
}

impl Default for PopulationTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PopulationTree {
    pub const ROOT_NAME: &'static str = "root";

    /// Create a tree holding only the root population.
    pub fn new() -> Self {
        Self::with_root_count(None)
    }

    /// Create a tree whose root carries the sample's total event count.
    pub fn with_root_count(count: Option<u64>) -> Self {
        let path: Arc<str> = Arc::from("/");
        let mut by_path = FxHashMap::default();
        by_path.insert(path.clone(), NodeId::ROOT);
        Self {
            nodes: vec![PopulationNode {
                name: Arc::from(Self::ROOT_NAME),
                path,
                parent: None,
                children: Vec::new(),
                count,
                gate: None,
            }],
            by_path,
            links: GateLinks::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Number of populations, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&PopulationNode> {
        self.nodes.get(id.0)
    }

    /// Append a population below `parent`.
    ///
    /// Fails when `parent` is not in the tree or when `parent` already has a
    /// child with the same name.
    ///
    /// Names may contain `/`, so two populations can end up with the same
    /// path (`/A/B` below root next to `B` below `A`). Path lookups then
    /// return the one declared first.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<Arc<str>>,
        count: Option<u64>,
        gate: Gate,
    ) -> Result<NodeId> {
        let name = name.into();
        let parent_path = self
            .get(parent)
            .map(|node| node.path.clone())
            .ok_or_else(|| GateError::hierarchy_error(format!("Unknown parent node {}", parent)))?;

        let path: Arc<str> = if parent == NodeId::ROOT {
            Arc::from(format!("/{}", name))
        } else {
            Arc::from(format!("{}/{}", parent_path, name))
        };
        if self
            .get_children(parent)
            .iter()
            .any(|child| self.nodes[child.0].name == name)
        {
            return Err(GateError::hierarchy_error(format!(
                "Population '{}' is declared twice under '{}'",
                name, parent_path
            )));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(PopulationNode {
            name,
            path: path.clone(),
            parent: Some(parent),
            children: Vec::new(),
            count,
            gate: Some(gate),
        });
        self.nodes[parent.0].children.push(id);
        self.by_path.entry(path).or_insert(id);
        Ok(id)
    }

    pub fn get_parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.parent)
    }

    pub fn get_children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    /// All ancestors, closest first.
    pub fn get_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = id;
        while let Some(parent) = self.get_parent(current) {
            ancestors.push(parent);
            current = parent;
        }
        ancestors
    }

    /// All descendants in breadth-first order.
    pub fn get_descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut descendants = Vec::new();
        let mut queue: VecDeque<NodeId> = self.get_children(id).iter().copied().collect();

        while let Some(node) = queue.pop_front() {
            descendants.push(node);
            queue.extend(self.get_children(node).iter().copied());
        }

        descendants
    }

    /// The chain from the root down to `id`, both included.
    pub fn get_chain_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = self.get_ancestors(id);
        chain.reverse();
        chain.push(id);
        chain
    }

    /// Depth below the root (root = 0)
    pub fn get_depth(&self, id: NodeId) -> usize {
        self.get_ancestors(id).len()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == NodeId::ROOT
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.get_children(id).is_empty()
    }

    /// Populations without children, in pre-order.
    pub fn get_leaves(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// A population tree always has a single root.
    pub fn get_roots(&self) -> Vec<NodeId> {
        vec![NodeId::ROOT]
    }

    /// Depth-first pre-order traversal, children in declaration order.
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            tree: self,
            stack: vec![NodeId::ROOT],
        }
    }

    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    /// All populations with the given name, in pre-order.
    pub fn find_by_name(&self, name: &str) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.name.as_ref() == name)
            .map(|(id, _)| id)
            .collect()
    }

    /// Links recorded by [`resolve_references`](Self::resolve_references).
    pub fn links(&self) -> &GateLinks {
        &self.links
    }

    /// Populations whose boolean or reference gate names `id`, in pre-order.
    pub fn get_linkers(&self, id: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| {
                node.gate
                    .as_ref()
                    .is_some_and(|gate| gate.references.iter().any(|r| r.target == Some(id)))
            })
            .map(|(linker, _)| linker)
            .collect()
    }

    /// References that do not point at a population yet, as (node, reference path).
    pub fn unresolved_references(&self) -> Vec<(NodeId, Arc<str>)> {
        self.iter()
            .filter_map(|(id, node)| node.gate.as_ref().map(|gate| (id, gate)))
            .flat_map(|(id, gate)| {
                gate.references
                    .iter()
                    .filter(|r| !r.is_resolved())
                    .map(move |r| (id, r.path.clone()))
            })
            .collect()
    }

    /// Bind every boolean/reference operand to the population it names.
    ///
    /// A path starting with `/` is absolute. Any other path is relative to the
    /// parent of the population holding the reference, where `..` moves up one
    /// level and `.` stays. A reference that does not resolve as a path may
    /// still name exactly one population anywhere in the tree.
    ///
    /// Fails with [`GateError::DanglingReference`] when a reference names no
    /// population, names the holder itself or one of its descendants, or when
    /// a population ends up depending on itself. A population depends on its
    /// parent and on every population its gate names.
    pub fn resolve_references(&mut self) -> Result<()> {
        let mut resolved: Vec<(NodeId, usize, NodeId)> = Vec::new();

        for (id, node) in self.iter() {
            let Some(gate) = &node.gate else { continue };
            for (idx, reference) in gate.references.iter().enumerate() {
                let target = self
                    .lookup_reference(id, &reference.path)
                    .ok_or_else(|| GateError::dangling_reference(node.path.as_ref(), reference.path.as_ref()))?;
                if target == id || self.get_ancestors(target).contains(&id) {
                    return Err(GateError::dangling_reference(
                        node.path.as_ref(),
                        format!("{} (refers to itself)", reference.path),
                    ));
                }
                resolved.push((id, idx, target));
            }
        }

        for (id, idx, target) in resolved {
            let target_path = self.nodes[target.0].path.clone();
            let linker_path = self.nodes[id.0].path.clone();
            if let Some(gate) = self.nodes[id.0].gate.as_mut() {
                gate.references[idx].target = Some(target);
            }
            self.links.add_link(target_path, linker_path);
        }

        self.check_link_cycles()
    }

    fn lookup_reference(&self, holder: NodeId, reference: &str) -> Option<NodeId> {
        let by_path = if let Some(absolute) = reference.strip_prefix('/') {
            self.walk(NodeId::ROOT, absolute)
        } else {
            self.get_parent(holder)
                .and_then(|base| self.walk(base, reference))
        };

        by_path.or_else(|| match self.find_by_name(reference).as_slice() {
            [single] => Some(*single),
            _ => None,
        })
    }

    fn walk(&self, from: NodeId, relative: &str) -> Option<NodeId> {
        let mut current = from;
        for segment in relative.split('/') {
            current = match segment {
                "" | "." => current,
                ".." => self.get_parent(current)?,
                name => *self
                    .get_children(current)
                    .iter()
                    .find(|child| self.nodes[child.0].name.as_ref() == name)?,
            };
        }
        Some(current)
    }

    fn check_link_cycles(&self) -> Result<()> {
        // Iterative DFS over parent and reference edges; on_path = gray
        let mut done: FxHashSet<NodeId> = FxHashSet::default();
        for (start, _) in self.iter() {
            if done.contains(&start) {
                continue;
            }
            let mut on_path: FxHashSet<NodeId> = FxHashSet::default();
            let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
            on_path.insert(start);

            while let Some((node, next)) = stack.pop() {
                let targets = self.dependencies(node);
                if let Some(&target) = targets.get(next) {
                    stack.push((node, next + 1));
                    if on_path.contains(&target) {
                        return Err(GateError::dangling_reference(
                            self.nodes[node.0].path.as_ref(),
                            format!("{} (reference cycle)", self.nodes[target.0].path),
                        ));
                    }
                    if !done.contains(&target) {
                        on_path.insert(target);
                        stack.push((target, 0));
                    }
                } else {
                    on_path.remove(&node);
                    done.insert(node);
                }
            }
        }
        Ok(())
    }

    fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        let Some(node) = self.get(id) else {
            return Vec::new();
        };
        node.parent
            .into_iter()
            .chain(node.gate.iter().flat_map(|gate| gate.references.iter().filter_map(|r| r.target)))
            .collect()
    }
}

/// Pre-order iterator over a [`PopulationTree`].
pub struct PreOrder<'a> {
    tree: &'a PopulationTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = (NodeId, &'a PopulationNode);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.tree.get(id)?;
        self.stack.extend(node.children.iter().rev().copied());
        Some((id, node))
    }
}

impl<'a> IntoIterator for &'a PopulationTree {
    type Item = (NodeId, &'a PopulationNode);
    type IntoIter = PreOrder<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
