use crate::error::Result;
use crate::types::Dimension;

/// Trait for gate types that can be validated
pub trait GateValidation {
    /// Check that the geometry is well formed, describing the first problem found
    fn validate(&self) -> Result<()>;
}

/// Common trait combining all gate geometry behaviors
pub trait GateGeometryOps: GateValidation {
    /// Get a descriptive name for this gate type
    fn gate_type_name(&self) -> &'static str;

    /// Channels the geometry reads, in declaration order
    fn dimensions(&self) -> Vec<&Dimension>;
}
