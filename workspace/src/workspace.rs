//! Entry points: open a workspace and turn it into a [`GatingSet`].

use crate::assembler::GatingSet;
use crate::builder::{BuiltSample, build_sample};
use crate::channels::{DeclaredTransformation, parse_transformations};
use crate::dispatch::{SampleNameLocation, TransformationScope, WorkspaceType, resolve_requested_type};
use crate::document::{XmlDocument, XmlParserOptions};
use crate::error::{Result, WorkspaceError};
use crate::options::ParseOptions;
use crate::samples::{SampleEntry, declared_groups, declared_samples, resolve_samples};
use indexmap::IndexMap;
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// A loaded workspace document with its dialect resolved.
#[derive(Debug, Clone)]
pub struct Workspace {
    document: XmlDocument,
    workspace_type: WorkspaceType,
}

impl Workspace {
    /// Read and parse a workspace file. `workspace_type` forces a dialect;
    /// `None` detects it from the version tag.
    pub fn open(
        path: impl AsRef<Path>,
        xml_options: XmlParserOptions,
        workspace_type: Option<WorkspaceType>,
    ) -> Result<Self> {
        Self::from_document(XmlDocument::open(path, xml_options)?, workspace_type)
    }

    pub fn parse_str(
        xml: &str,
        xml_options: XmlParserOptions,
        workspace_type: Option<WorkspaceType>,
    ) -> Result<Self> {
        Self::from_document(XmlDocument::parse_str(xml, xml_options)?, workspace_type)
    }

    pub fn from_document(document: XmlDocument, workspace_type: Option<WorkspaceType>) -> Result<Self> {
        let workspace_type = resolve_requested_type(&document, workspace_type)?;
        Ok(Self {
            document,
            workspace_type,
        })
    }

    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    pub fn workspace_type(&self) -> WorkspaceType {
        self.workspace_type
    }

    pub fn version(&self) -> Option<&str> {
        self.document.version()
    }

    /// Declared samples in document order. `name_location` defaults to the
    /// dialect's name location.
    pub fn samples(&self, name_location: Option<SampleNameLocation>) -> Result<Vec<SampleEntry<'_>>> {
        let location = name_location.unwrap_or_else(|| self.workspace_type.default_name_location());
        declared_samples(&self.document, self.workspace_type, location)
    }

    pub fn groups(&self) -> IndexMap<String, Vec<String>> {
        declared_groups(&self.document)
    }

    /// Build the gating set for the samples selected by `options`.
    ///
    /// The document options and dialect were fixed when the workspace was
    /// opened, so `options.xml_options` and `options.workspace_type` are not
    /// consulted here. A mismatch is logged at debug level.
    pub fn gating_set(&self, options: &ParseOptions) -> Result<GatingSet> {
        if options.xml_options != self.document.options() {
            debug!(
                "Ignoring XML options {:?}; {} was read with {:?}",
                options.xml_options,
                self.document.source_name(),
                self.document.options()
            );
        }
        if let Some(requested) = options.workspace_type.filter(|t| *t != self.workspace_type) {
            debug!(
                "Ignoring workspace type '{}'; {} was opened as '{}'",
                requested,
                self.document.source_name(),
                self.workspace_type
            );
        }

        let groups = self.groups();
        let declared = self.samples(options.name_location)?;

        let mut sample_ids = options.sample_ids.clone();
        if let Some(group) = &options.group {
            let members = groups
                .get(group)
                .ok_or_else(|| WorkspaceError::InvalidArgument(format!("unknown group '{}'", group)))?;
            debug!("Group '{}' adds {} samples", group, members.len());
            sample_ids.extend(members.iter().cloned());
        }

        let resolved = if options.group.is_some() && sample_ids.is_empty() && options.sample_names.is_empty() {
            // An empty group selects nothing rather than everything
            Vec::new()
        } else {
            resolve_samples(&declared, &sample_ids, &options.sample_names, options.skip_missing_samples)?
        };

        info!(
            "Parsing {} of {} samples from {} as '{}'",
            resolved.len(),
            declared.len(),
            self.document.source_name(),
            self.workspace_type
        );

        let shared = self.workspace_transformations()?;
        let build = |entry: &SampleEntry<'_>| build_sample(entry, self.workspace_type, &shared, options.parse_gates);

        let built: Vec<BuiltSample> = if options.parallel {
            resolved.par_iter().map(build).collect::<Result<_>>()?
        } else {
            resolved.iter().map(build).collect::<Result<_>>()?
        };

        GatingSet::assemble(
            self.workspace_type,
            self.version().map(str::to_string),
            built,
            groups,
            options.parse_gates,
        )
    }

    fn workspace_transformations(&self) -> Result<Vec<DeclaredTransformation>> {
        if self.workspace_type.transformation_scope() != TransformationScope::Workspace {
            return Ok(Vec::new());
        }
        let Some(container) = self.document.root().child("Transformations") else {
            return Ok(Vec::new());
        };
        parse_transformations(container)
            .map_err(|e| WorkspaceError::malformed(self.document.source_name(), e.to_string()))
    }
}

/// Parse a workspace file into a gating set.
///
/// `samp_nloc`: 0 uses the dialect's default, 1 the `$FIL` keyword, 2 the
/// sample node name. `xml_parser_option` is a [`XmlParserOptions`] bitset.
/// `ws_type`: 0 detects the dialect, 1 Windows, 2 Mac, 3 FlowJo vX.
///
/// # Example
///
/// ```rust,no_run
/// use flow_workspace::parse_workspace;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let gating_set = parse_workspace("experiment.wsp", &["1".to_string()], &[], true, 0, 0, 0)?;
/// for sample in gating_set.iter() {
///     println!("{}: {} populations", sample.guid, sample.tree.node_count());
/// }
/// # Ok(())
/// # }
/// ```
pub fn parse_workspace(
    file_name: impl AsRef<Path>,
    sample_ids: &[String],
    sample_names: &[String],
    is_parse_gate: bool,
    samp_nloc: u16,
    xml_parser_option: i32,
    ws_type: u16,
) -> Result<GatingSet> {
    let options = ParseOptions::from_codes(
        sample_ids.to_vec(),
        sample_names.to_vec(),
        is_parse_gate,
        samp_nloc,
        xml_parser_option,
        ws_type,
    )?;
    parse_workspace_with(file_name, &options)
}

/// Parse a workspace file with typed options.
pub fn parse_workspace_with(path: impl AsRef<Path>, options: &ParseOptions) -> Result<GatingSet> {
    let workspace = Workspace::open(path, options.xml_options, options.workspace_type)?;
    workspace.gating_set(options)
}
