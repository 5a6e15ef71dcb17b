//! Spatial partitioning: a uniform 3D grid hash over bounding spheres.
//!
//! # Invariants
//! - Every indexed entity belongs to exactly one cell; empty cells do not exist.
//! - A cached `query_visible` result is never served after a mutation that
//!   touched its scanned region.
//! - Query results match a brute-force scan with the same acceptance test.

mod cache;
mod error;
mod frustum;
mod grid;

pub use error::SpatialError;
pub use frustum::Frustum;
pub use grid::{
    CellCoord, Collision, EntityRecord, Neighbor, PartitionInfo, SpatialConfig, SpatialIndex,
};

pub fn crate_info() -> &'static str {
    "galaxy-spatial v0.1.0"
}
