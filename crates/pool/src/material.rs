use galaxy_common::Color;
use serde::{Deserialize, Serialize};

use crate::error::PoolError;
use crate::key::{ResourceKey, ResourceKind, ResourceParams, ResourceRequest};

/// Rough uniform-block footprint charged per material.
pub const MATERIAL_UNIFORM_BYTES: usize = 256;

/// Shading cost class of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Fidelity {
    /// Physically based, lit, shadowed.
    Full,
    /// Diffuse-only lighting.
    Reduced,
    /// Flat colour, no lighting.
    Unlit,
}

impl Fidelity {
    pub fn for_kind(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::StandardMaterial => Fidelity::Full,
            ResourceKind::LambertMaterial => Fidelity::Reduced,
            _ => Fidelity::Unlit,
        }
    }
}

/// Surface description shared by every drawable using the same key.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub kind: ResourceKind,
    pub color: Color,
    pub emissive: f32,
    pub opacity: f32,
    pub transparent: bool,
    pub fidelity: Fidelity,
    /// Key of the texture in the pool's texture cache, if any.
    pub texture: Option<ResourceKey>,
}

impl Material {
    /// Build from a material request. Recognized options: `opacity`,
    /// `emissive`, `transparent`.
    pub fn build(request: &ResourceRequest, texture: Option<ResourceKey>) -> Result<Self, PoolError> {
        let color = match request.params {
            ResourceParams::Color(c) => c,
            ResourceParams::None => Color::WHITE,
            ResourceParams::Geometry(_) => {
                return Err(PoolError::ParamMismatch {
                    kind: request.kind,
                    params: request.params.label(),
                });
            }
        };
        let opacity = request
            .option_f64("opacity")
            .map(|o| o.clamp(0.0, 1.0) as f32)
            .unwrap_or(color.a);
        let transparent = request.option_bool("transparent").unwrap_or(opacity < 1.0);
        Ok(Self {
            kind: request.kind,
            color,
            emissive: request.option_f64("emissive").unwrap_or(0.0).max(0.0) as f32,
            opacity,
            transparent,
            fidelity: Fidelity::for_kind(request.kind),
            texture,
        })
    }

    /// Built-in safe material: flat grey, unlit. Cannot fail.
    pub fn fallback() -> Self {
        Self {
            kind: ResourceKind::BasicMaterial,
            color: Color::rgba(0.6, 0.6, 0.6, 1.0),
            emissive: 0.0,
            opacity: 1.0,
            transparent: false,
            fidelity: Fidelity::Unlit,
            texture: None,
        }
    }

    pub fn byte_size(&self) -> usize {
        MATERIAL_UNIFORM_BYTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::GeometryParams;

    #[test]
    fn options_shape_the_material() {
        let req = ResourceRequest::new(ResourceKind::StandardMaterial)
            .color(Color::rgb8(255, 0, 0))
            .option("opacity", 0.5_f64)
            .option("emissive", 2.0_f64);
        let m = Material::build(&req, None).unwrap();
        assert_eq!(m.opacity, 0.5);
        assert!(m.transparent);
        assert_eq!(m.emissive, 2.0);
        assert_eq!(m.fidelity, Fidelity::Full);
    }

    #[test]
    fn opaque_by_default() {
        let req = ResourceRequest::new(ResourceKind::LambertMaterial);
        let m = Material::build(&req, None).unwrap();
        assert_eq!(m.color, Color::WHITE);
        assert!(!m.transparent);
        assert_eq!(m.fidelity, Fidelity::Reduced);
    }

    #[test]
    fn geometry_params_are_a_mismatch() {
        let req = ResourceRequest::new(ResourceKind::BasicMaterial).geometry(GeometryParams::default());
        assert!(matches!(
            Material::build(&req, None),
            Err(PoolError::ParamMismatch { .. })
        ));
    }
}
