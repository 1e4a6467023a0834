//! Reference links between populations.
//!
//! `GateLinks` records which populations point at which others through boolean
//! or reference gates. Links are separate from the parent-child structure of a
//! [`PopulationTree`](crate::PopulationTree): a child is gated on the events of
//! its parent, while a link only names another population whose gate is reused
//! or combined.
//!
//! # Example
//!
//! ```rust
//! use flow_gates::GateLinks;
//!
//! let mut links = GateLinks::new();
//! links.add_link("/Lymph/CD4", "/Lymph/CD4 or CD8");
//! links.add_link("/Lymph/CD4", "/Lymph/not CD4");
//!
//! assert_eq!(links.get_link_count("/Lymph/CD4"), 2);
//! ```

use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Maps a target population path to the paths of the populations linking to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateLinks {
    links: FxHashMap<Arc<str>, Vec<Arc<str>>>,
}

impl GateLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `linking_path` refers to `target_path`.
    ///
    /// A population naming the same target twice (e.g. `A and A`) is recorded once.
    pub fn add_link(&mut self, target_path: impl Into<Arc<str>>, linking_path: impl Into<Arc<str>>) {
        let linking_path = linking_path.into();
        let linkers = self.links.entry(target_path.into()).or_default();
        if !linkers.contains(&linking_path) {
            linkers.push(linking_path);
        }
    }

    /// Paths of the populations that link to `target_path`, in the order the links were added.
    pub fn get_links(&self, target_path: &str) -> Vec<&Arc<str>> {
        self.links
            .get(target_path)
            .map(|v| v.iter().collect())
            .unwrap_or_default()
    }

    pub fn is_linked(&self, target_path: &str) -> bool {
        self.links
            .get(target_path)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn get_link_count(&self, target_path: &str) -> usize {
        self.links.get(target_path).map(|v| v.len()).unwrap_or(0)
    }

    /// Total number of links across all targets.
    pub fn len(&self) -> usize {
        self.links.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
