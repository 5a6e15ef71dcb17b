//! The seam between the selector and whatever actually draws.

use galaxy_common::EntityId;
use galaxy_pool::{Fidelity, ResourceHandle};
use serde::Serialize;
use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::tier::DetailTier;

/// Per-drawable render switches derived from the applied tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderFlags {
    pub casts_shadow: bool,
    pub receives_shadow: bool,
    pub fidelity: Fidelity,
    /// Drawn as a camera-facing sprite.
    pub billboard: bool,
}

impl RenderFlags {
    pub fn for_tier(tier: DetailTier, shadow_max_tier: DetailTier, fidelity: Fidelity) -> Self {
        Self {
            casts_shadow: tier <= shadow_max_tier,
            receives_shadow: tier <= DetailTier::Medium,
            fidelity,
            billboard: tier == DetailTier::Minimal,
        }
    }
}

impl Default for RenderFlags {
    fn default() -> Self {
        Self {
            casts_shadow: false,
            receives_shadow: false,
            fidelity: Fidelity::Full,
            billboard: false,
        }
    }
}

/// Something the host renders. The selector swaps its geometry and material
/// and sets its flags; it never owns the drawable.
pub trait Drawable {
    fn geometry(&self) -> Option<&ResourceHandle>;

    fn material(&self) -> Option<&ResourceHandle>;

    /// Install a geometry, returning the one it replaces.
    fn set_geometry(&mut self, handle: ResourceHandle) -> Option<ResourceHandle>;

    /// Install a material, returning the one it replaces.
    fn set_material(&mut self, handle: ResourceHandle) -> Option<ResourceHandle>;

    fn take_geometry(&mut self) -> Option<ResourceHandle>;

    fn take_material(&mut self) -> Option<ResourceHandle>;

    fn render_flags(&self) -> RenderFlags;

    fn set_render_flags(&mut self, flags: RenderFlags);
}

/// Lookup from entity id to the caller's drawable.
pub trait DrawableSet {
    fn drawable_mut(&mut self, id: &EntityId) -> Option<&mut dyn Drawable>;
}

impl<D: Drawable, S: BuildHasher> DrawableSet for HashMap<EntityId, D, S> {
    fn drawable_mut(&mut self, id: &EntityId) -> Option<&mut dyn Drawable> {
        self.get_mut(id).map(|d| d as &mut dyn Drawable)
    }
}

/// Plain in-memory drawable. Counts swaps so callers can see churn.
#[derive(Debug, Clone, Default)]
pub struct SceneDrawable {
    geometry: Option<ResourceHandle>,
    material: Option<ResourceHandle>,
    flags: RenderFlags,
    swaps: u64,
}

impl SceneDrawable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Geometry and material installs so far.
    pub fn swaps(&self) -> u64 {
        self.swaps
    }
}

impl Drawable for SceneDrawable {
    fn geometry(&self) -> Option<&ResourceHandle> {
        self.geometry.as_ref()
    }

    fn material(&self) -> Option<&ResourceHandle> {
        self.material.as_ref()
    }

    fn set_geometry(&mut self, handle: ResourceHandle) -> Option<ResourceHandle> {
        self.swaps += 1;
        self.geometry.replace(handle)
    }

    fn set_material(&mut self, handle: ResourceHandle) -> Option<ResourceHandle> {
        self.swaps += 1;
        self.material.replace(handle)
    }

    fn take_geometry(&mut self) -> Option<ResourceHandle> {
        self.geometry.take()
    }

    fn take_material(&mut self) -> Option<ResourceHandle> {
        self.material.take()
    }

    fn render_flags(&self) -> RenderFlags {
        self.flags
    }

    fn set_render_flags(&mut self, flags: RenderFlags) {
        self.flags = flags;
    }
}
