//! Helpers for building validated gate geometries from plain coordinates.
//!
//! Used where a workspace dialect describes shapes with bare points and axis
//! names instead of Gating-ML dimensions.

pub mod construction;

pub use construction::{
    create_ellipse_from_axis_points, create_polygon_geometry, create_range_geometry,
};
