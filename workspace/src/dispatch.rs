//! Workspace format variants.
//!
//! FlowJo for Windows, FlowJo for Mac and FlowJo vX serialize the same
//! concepts with different XML shapes. Each [`WorkspaceType`] answers the
//! same structural questions (where a sample id lives, which element holds
//! child populations, which gate dialect is used) so the builder never checks
//! format versions itself.

use crate::document::{XmlDocument, XmlElement};
use crate::error::{Result, WorkspaceError};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{debug, warn};

/// The supported workspace dialects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum WorkspaceType {
    /// FlowJo for Windows, version tags `1.6*`
    #[strum(to_string = "win", serialize = "windows")]
    Windows,
    /// FlowJo for Mac before vX, version tag `2.0`
    #[strum(to_string = "mac", serialize = "macintosh")]
    MacLegacy,
    /// FlowJo vX, version tags `1.8*`, `3.0` and `20.0` onwards
    #[strum(to_string = "vx", serialize = "flowjox")]
    FlowJoX,
}

/// Element names that define a population in every dialect.
pub const POPULATION_ELEMENTS: [&str; 4] = ["Population", "AndNode", "OrNode", "NotNode"];

/// Where gate geometry is described.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDialect {
    /// `Gate/gating:*Gate` elements; `dimension_element` names the child of
    /// `gating:dimension` that carries the channel name.
    GatingMl { dimension_element: &'static str },
    /// `PolygonGate`/`RectangleGate`/`EllipseGate` with axis-name attributes
    MacLegacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationScope {
    /// `Workspace/Transformations`, shared by every sample
    Workspace,
    /// `Sample/Transformations`
    Sample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompensationDialect {
    /// `transforms:spilloverMatrix`
    SpilloverMatrix,
    /// `CompensationMatrix/Channel/ChannelValue`
    CompensationMatrix,
}

impl WorkspaceType {
    pub fn code(self) -> u16 {
        match self {
            WorkspaceType::Windows => 1,
            WorkspaceType::MacLegacy => 2,
            WorkspaceType::FlowJoX => 3,
        }
    }

    /// Map a caller-supplied code. `0` asks for detection and yields `None`.
    pub fn from_code(code: u16) -> Result<Option<Self>> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(WorkspaceType::Windows)),
            2 => Ok(Some(WorkspaceType::MacLegacy)),
            3 => Ok(Some(WorkspaceType::FlowJoX)),
            other => Err(WorkspaceError::UnsupportedWorkspaceType(format!(
                "unknown workspace type code {}",
                other
            ))),
        }
    }

    /// Detect the dialect from a `Workspace@version` tag.
    pub fn detect(version: &str) -> Option<Self> {
        let version = version.trim();
        if version.starts_with("1.6") {
            return Some(WorkspaceType::Windows);
        }
        if version.starts_with("1.8") {
            return Some(WorkspaceType::FlowJoX);
        }
        if version == "2.0" {
            return Some(WorkspaceType::MacLegacy);
        }
        let major = version.split('.').next()?.parse::<u32>().ok()?;
        (major >= 3).then_some(WorkspaceType::FlowJoX)
    }

    /// Sample id: a dialect-specific attribute, falling back to `SampleNode@sampleID`.
    pub fn sample_id<'a>(self, sample: &'a XmlElement) -> Option<&'a str> {
        let primary = match self {
            WorkspaceType::Windows | WorkspaceType::FlowJoX => {
                sample.child("DataSet").and_then(|d| d.attr("sampleID"))
            }
            WorkspaceType::MacLegacy => sample.attr("sampleID"),
        };
        primary
            .or_else(|| sample.child("SampleNode").and_then(|n| n.attr("sampleID")))
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// The root population element of a sample.
    pub fn sample_node(self, sample: &XmlElement) -> Option<&XmlElement> {
        sample.child("SampleNode")
    }

    /// Child populations of a population element, in declaration order.
    pub fn population_children(self, node: &XmlElement) -> Vec<&XmlElement> {
        let container = match self {
            WorkspaceType::Windows | WorkspaceType::FlowJoX => node.child("Subpopulations"),
            WorkspaceType::MacLegacy => Some(node),
        };
        container
            .map(|c| {
                c.children
                    .iter()
                    .filter(|child| POPULATION_ELEMENTS.contains(&child.local_name()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn default_name_location(self) -> SampleNameLocation {
        SampleNameLocation::Keyword
    }

    pub fn gate_dialect(self) -> GateDialect {
        match self {
            WorkspaceType::Windows => GateDialect::GatingMl {
                dimension_element: "parameter",
            },
            WorkspaceType::FlowJoX => GateDialect::GatingMl {
                dimension_element: "fcs-dimension",
            },
            WorkspaceType::MacLegacy => GateDialect::MacLegacy,
        }
    }

    pub fn transformation_scope(self) -> TransformationScope {
        match self {
            WorkspaceType::FlowJoX => TransformationScope::Sample,
            WorkspaceType::Windows | WorkspaceType::MacLegacy => TransformationScope::Workspace,
        }
    }

    pub fn compensation_dialect(self) -> CompensationDialect {
        match self {
            WorkspaceType::MacLegacy => CompensationDialect::CompensationMatrix,
            WorkspaceType::Windows | WorkspaceType::FlowJoX => CompensationDialect::SpilloverMatrix,
        }
    }
}

/// Pick the dialect for a document: an explicit code wins, `0` detects.
pub fn resolve_workspace_type(doc: &XmlDocument, ws_type_code: u16) -> Result<WorkspaceType> {
    let requested = WorkspaceType::from_code(ws_type_code)?;
    resolve_requested_type(doc, requested)
}

pub(crate) fn resolve_requested_type(
    doc: &XmlDocument,
    requested: Option<WorkspaceType>,
) -> Result<WorkspaceType> {
    let version = doc.version();
    let detected = version.and_then(WorkspaceType::detect);

    match (requested, detected) {
        (Some(requested), Some(detected)) if requested != detected => {
            warn!(
                "Workspace version {:?} looks like '{}', parsing as requested '{}'",
                version, detected, requested
            );
            Ok(requested)
        }
        (Some(requested), _) => Ok(requested),
        (None, Some(detected)) => {
            debug!("Detected workspace type '{}' from version {:?}", detected, version);
            Ok(detected)
        }
        (None, None) => Err(WorkspaceError::UnsupportedWorkspaceType(match version {
            Some(version) => format!("unrecognized workspace version '{}'", version),
            None => "workspace declares no version".to_string(),
        })),
    }
}

/// Where a sample's display name is read from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SampleNameLocation {
    /// The `$FIL` keyword
    Keyword,
    /// `SampleNode@name`
    SampleNode,
}

impl SampleNameLocation {
    /// Map a `sampNloc` code. `0` keeps the dialect default and yields `None`.
    pub fn from_code(code: u16) -> Result<Option<Self>> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(SampleNameLocation::Keyword)),
            2 => Ok(Some(SampleNameLocation::SampleNode)),
            other => Err(WorkspaceError::InvalidArgument(format!(
                "sample name location must be 0, 1 or 2, got {}",
                other
            ))),
        }
    }

    /// Read the display name of `sample`.
    pub fn sample_name(self, sample: &XmlElement) -> Option<String> {
        let node_name = || {
            sample
                .child("SampleNode")
                .and_then(|n| n.attr("name"))
                .map(str::to_string)
        };
        match self {
            SampleNameLocation::SampleNode => node_name(),
            SampleNameLocation::Keyword => sample
                .find("Keywords")
                .and_then(|k| {
                    k.children_named("Keyword")
                        .find(|kw| kw.attr("name") == Some("$FIL"))
                        .and_then(|kw| kw.attr("value"))
                })
                .map(|v| v.trim().to_string())
                .or_else(|| {
                    let fallback = node_name();
                    if let Some(name) = &fallback {
                        warn!("Sample has no $FIL keyword, using node name '{}'", name);
                    }
                    fallback
                }),
        }
    }
}
