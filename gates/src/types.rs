use crate::ellipse::EllipsoidGateGeometry;
use crate::error::Result;
use crate::hierarchy::NodeId;
use crate::polygon::PolygonGateGeometry;
use crate::quadrant::QuadrantGateGeometry;
use crate::rectangle::RangeGateGeometry;
use crate::traits::{GateGeometryOps, GateValidation};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// A control point of a gate, with coordinates in raw data space.
///
/// Vertices store coordinates for multiple channels, allowing gates to be defined
/// in multi-dimensional space. Coordinates keep the order they were declared in.
///
/// # Example
///
/// ```rust
/// use flow_gates::Vertex;
///
/// let vertex = Vertex::new()
///     .with_coordinate("FSC-A", 1000.0)
///     .with_coordinate("SSC-A", 2000.0);
///
/// assert_eq!(vertex.get_coordinate("FSC-A"), Some(1000.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Coordinates in raw data space, keyed by channel name.
    pub coordinates: IndexMap<Arc<str>, f64>,
}

impl Vertex {
    /// Create a vertex with no coordinates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a coordinate value using the builder pattern.
    pub fn with_coordinate(mut self, channel: impl Into<Arc<str>>, value: f64) -> Self {
        self.coordinates.insert(channel.into(), value);
        self
    }

    /// Get a coordinate value for the specified channel.
    pub fn get_coordinate(&self, channel: &str) -> Option<f64> {
        self.coordinates.get(channel).copied()
    }

    pub fn set_coordinate(&mut self, channel: impl Into<Arc<str>>, value: f64) {
        self.coordinates.insert(channel.into(), value);
    }
}

/// One axis of a gate: the channel it reads and, optionally, the transformation
/// and compensation the gate coordinates were drawn in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub parameter: Arc<str>,
    pub transformation_ref: Option<Arc<str>>,
    pub compensation_ref: Option<Arc<str>>,
}

impl Dimension {
    pub fn new(parameter: impl Into<Arc<str>>) -> Self {
        Self {
            parameter: parameter.into(),
            transformation_ref: None,
            compensation_ref: None,
        }
    }

    pub fn with_transformation_ref(mut self, reference: impl Into<Arc<str>>) -> Self {
        self.transformation_ref = Some(reference.into());
        self
    }

    pub fn with_compensation_ref(mut self, reference: impl Into<Arc<str>>) -> Self {
        self.compensation_ref = Some(reference.into());
        self
    }
}

/// Classification of a gate, independent of whether its geometry was parsed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum GateKind {
    /// One-dimensional interval
    Range,
    /// Axis-aligned box over two or more dimensions
    Rectangle,
    Polygon,
    Ellipsoid,
    Quadrant,
    /// Boolean combination of other populations
    Boolean,
    /// Reuses the gate of another population
    Reference,
    /// No recognised gate element. Only produced when geometry is skipped.
    Unknown,
}

impl GateKind {
    /// Whether gates of this kind carry geometric parameters.
    pub fn is_geometric(self) -> bool {
        !matches!(self, GateKind::Boolean | GateKind::Reference | GateKind::Unknown)
    }
}

/// Boolean operator of a boolean gate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum BooleanOperation {
    And,
    Or,
    Not,
}

impl BooleanOperation {
    /// Check the operand count this operator accepts.
    pub fn accepts_operands(self, count: usize) -> bool {
        match self {
            BooleanOperation::Not => count == 1,
            BooleanOperation::And | BooleanOperation::Or => count >= 2,
        }
    }
}

/// The geometry of a gate.
///
/// All geometries are expressed in raw data coordinates and name the channels
/// they operate on through their [`Dimension`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GateGeometry {
    Range(RangeGateGeometry),
    Polygon(PolygonGateGeometry),
    Ellipsoid(EllipsoidGateGeometry),
    Quadrant(QuadrantGateGeometry),
}

impl GateGeometry {
    /// The gate kind this geometry represents.
    pub fn kind(&self) -> GateKind {
        match self {
            GateGeometry::Range(range) => range.kind(),
            GateGeometry::Polygon(_) => GateKind::Polygon,
            GateGeometry::Ellipsoid(_) => GateKind::Ellipsoid,
            GateGeometry::Quadrant(_) => GateKind::Quadrant,
        }
    }

    fn ops(&self) -> &dyn GateGeometryOps {
        match self {
            GateGeometry::Range(g) => g,
            GateGeometry::Polygon(g) => g,
            GateGeometry::Ellipsoid(g) => g,
            GateGeometry::Quadrant(g) => g,
        }
    }

    /// Channels this geometry reads, in declaration order.
    pub fn dimensions(&self) -> Vec<&Dimension> {
        self.ops().dimensions()
    }

    /// Get a descriptive name for this gate type
    pub fn gate_type_name(&self) -> &'static str {
        self.ops().gate_type_name()
    }
}

impl GateValidation for GateGeometry {
    fn validate(&self) -> Result<()> {
        self.ops().validate()
    }
}

/// A symbolic link from a boolean or reference gate to another population.
///
/// The link is a named lookup, not ownership: `target` is filled in once the
/// whole population tree is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateReference {
    /// The population path as written in the workspace
    pub path: Arc<str>,
    pub target: Option<NodeId>,
}

impl GateReference {
    pub fn new(path: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            target: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }
}

/// The gate defining a population.
///
/// Geometric gates carry a [`GateGeometry`] when geometry parsing was requested.
/// Boolean and reference gates carry [`GateReference`]s instead.
///
/// # Example
///
/// ```rust
/// use flow_gates::{Gate, GateKind, geometry::create_polygon_geometry};
///
/// let geometry = create_polygon_geometry(
///     vec![(100.0, 200.0), (300.0, 200.0), (300.0, 400.0)],
///     "FSC-A",
///     "SSC-A",
/// )?;
/// let gate = Gate::geometric(geometry).with_id("ID1");
/// assert_eq!(gate.kind, GateKind::Polygon);
/// # Ok::<(), flow_gates::GateError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub id: Option<Arc<str>>,
    pub kind: GateKind,
    /// Events outside the geometry belong to the population
    pub negated: bool,
    pub geometry: Option<GateGeometry>,
    pub operation: Option<BooleanOperation>,
    pub references: Vec<GateReference>,
}

impl Gate {
    /// A gate with parsed geometry.
    pub fn geometric(geometry: GateGeometry) -> Self {
        Self {
            id: None,
            kind: geometry.kind(),
            negated: false,
            geometry: Some(geometry),
            operation: None,
            references: Vec::new(),
        }
    }

    /// A gate whose kind is known but whose parameters were not parsed.
    pub fn skeleton(kind: GateKind) -> Self {
        Self {
            id: None,
            kind,
            negated: false,
            geometry: None,
            operation: None,
            references: Vec::new(),
        }
    }

    /// A boolean combination of other populations.
    pub fn boolean(operation: BooleanOperation, operands: Vec<GateReference>) -> Self {
        Self {
            operation: Some(operation),
            references: operands,
            ..Self::skeleton(GateKind::Boolean)
        }
    }

    /// A gate reusing the gate of the population at `path`.
    pub fn reference(path: impl Into<Arc<str>>) -> Self {
        Self {
            references: vec![GateReference::new(path)],
            ..Self::skeleton(GateKind::Reference)
        }
    }

    pub fn with_id(mut self, id: impl Into<Arc<str>>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_operation(mut self, operation: BooleanOperation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn negate(mut self, negated: bool) -> Self {
        self.negated = negated;
        self
    }

    /// Whether this gate links to other populations.
    pub fn has_references(&self) -> bool {
        !self.references.is_empty()
    }
}
