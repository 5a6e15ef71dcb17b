//! Handles: a shared immutable backing resource plus per-instance state.

use galaxy_common::Color;
use std::sync::Arc;

use crate::geometry::Geometry;
use crate::key::{ResourceFamily, ResourceId, ResourceKey};
use crate::material::Material;

/// The cached, immutable half of a resource.
#[derive(Debug, Clone)]
pub enum SharedResource {
    Geometry(Arc<Geometry>),
    Material(Arc<Material>),
}

impl SharedResource {
    pub fn family(&self) -> ResourceFamily {
        match self {
            SharedResource::Geometry(_) => ResourceFamily::Geometry,
            SharedResource::Material(_) => ResourceFamily::Material,
        }
    }

    pub fn ptr_eq(&self, other: &SharedResource) -> bool {
        match (self, other) {
            (SharedResource::Geometry(a), SharedResource::Geometry(b)) => Arc::ptr_eq(a, b),
            (SharedResource::Material(a), SharedResource::Material(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Number of `Arc` owners, the cache's own reference included.
    pub(crate) fn strong_count(&self) -> usize {
        match self {
            SharedResource::Geometry(g) => Arc::strong_count(g),
            SharedResource::Material(m) => Arc::strong_count(m),
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            SharedResource::Geometry(g) => g.byte_size(),
            SharedResource::Material(m) => m.byte_size(),
        }
    }
}

/// Per-instance overrides that never touch the shared backing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InstanceState {
    pub tint: Option<Color>,
    pub opacity: Option<f32>,
}

/// What the pool hands out. Cloning a handle shares the backing and copies
/// the instance state; mutating one handle never affects another.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    key: ResourceKey,
    id: ResourceId,
    shared: SharedResource,
    instance: InstanceState,
}

impl ResourceHandle {
    pub(crate) fn new(key: ResourceKey, id: ResourceId, shared: SharedResource) -> Self {
        Self {
            key,
            id,
            shared,
            instance: InstanceState::default(),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn family(&self) -> ResourceFamily {
        self.shared.family()
    }

    pub fn shared(&self) -> &SharedResource {
        &self.shared
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match &self.shared {
            SharedResource::Geometry(g) => Some(g),
            SharedResource::Material(_) => None,
        }
    }

    pub fn material(&self) -> Option<&Material> {
        match &self.shared {
            SharedResource::Material(m) => Some(m),
            SharedResource::Geometry(_) => None,
        }
    }

    /// True when both handles are views of the same cached resource.
    pub fn shares_backing_with(&self, other: &ResourceHandle) -> bool {
        self.shared.ptr_eq(&other.shared)
    }

    pub fn instance(&self) -> &InstanceState {
        &self.instance
    }

    pub fn tint(&self) -> Option<Color> {
        self.instance.tint
    }

    pub fn set_tint(&mut self, tint: Color) {
        self.instance.tint = Some(tint);
    }

    pub fn clear_tint(&mut self) {
        self.instance.tint = None;
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.instance.opacity = Some(opacity.clamp(0.0, 1.0));
    }

    /// Material colour with this instance's tint and opacity applied.
    /// `None` for geometry handles.
    pub fn effective_color(&self) -> Option<Color> {
        let material = self.material()?;
        let mut color = material.color.with_alpha(material.opacity);
        if let Some(tint) = self.instance.tint {
            color = color.modulate(tint);
        }
        if let Some(opacity) = self.instance.opacity {
            color.a = opacity;
        }
        Some(color)
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.shares_backing_with(other)
            && self.instance == other.instance
    }
}
