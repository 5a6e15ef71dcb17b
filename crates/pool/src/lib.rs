//! Shared rendering resources: geometry, materials and textures.
//!
//! Requests are normalized into canonical keys, so equal requests resolve to
//! the same immutable backing while each handle keeps its own instance state.
//!
//! # Invariants
//! - A key maps to at most one live backing resource.
//! - Entries with live handles are never evicted by a non-forced cleanup.
//! - The two pinned fallbacks are always present.

mod error;
mod geometry;
mod handle;
mod key;
mod material;
mod pool;
mod texture;

pub use error::PoolError;
pub use geometry::{Geometry, MAX_DETAIL, Vertex};
pub use handle::{InstanceState, ResourceHandle, SharedResource};
pub use key::{
    GeometryParams, OptionValue, ResourceFamily, ResourceId, ResourceKey, ResourceKind,
    ResourceParams, ResourceRequest,
};
pub use material::{Fidelity, MATERIAL_UNIFORM_BYTES, Material};
pub use pool::{
    CleanupReport, PoolConfig, PoolStats, PreloadMode, ResourcePool, default_preload_set,
};
pub use texture::{
    TEXTURE_CHANNELS, Texture, TextureDescriptor, TextureLoader, TexturePattern, TextureState,
};

pub fn crate_info() -> &'static str {
    "galaxy-pool v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("pool"));
    }
}
