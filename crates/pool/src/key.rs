//! Canonical resource keys.
//!
//! A key is built from the resource kind, the normalized colour or geometry
//! parameters, an optional texture key and the sorted option map, so two
//! requests that describe the same resource always collide regardless of the
//! order their options were supplied in.

use galaxy_common::Color;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::PoolError;
use crate::texture::TextureDescriptor;

/// Whether a kind produces vertex data or a surface description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceFamily {
    Geometry,
    Material,
}

/// Every kind of resource the pool knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Sphere,
    Box,
    Ring,
    Billboard,
    StandardMaterial,
    LambertMaterial,
    BasicMaterial,
    SpriteMaterial,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Sphere,
        ResourceKind::Box,
        ResourceKind::Ring,
        ResourceKind::Billboard,
        ResourceKind::StandardMaterial,
        ResourceKind::LambertMaterial,
        ResourceKind::BasicMaterial,
        ResourceKind::SpriteMaterial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Sphere => "sphere",
            ResourceKind::Box => "box",
            ResourceKind::Ring => "ring",
            ResourceKind::Billboard => "billboard",
            ResourceKind::StandardMaterial => "standard_material",
            ResourceKind::LambertMaterial => "lambert_material",
            ResourceKind::BasicMaterial => "basic_material",
            ResourceKind::SpriteMaterial => "sprite_material",
        }
    }

    pub fn family(&self) -> ResourceFamily {
        match self {
            ResourceKind::Sphere
            | ResourceKind::Box
            | ResourceKind::Ring
            | ResourceKind::Billboard => ResourceFamily::Geometry,
            _ => ResourceFamily::Material,
        }
    }

    pub fn parse(name: &str) -> Result<Self, PoolError> {
        let lower = name.trim().to_ascii_lowercase();
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| PoolError::UnknownKind(name.to_string()))
    }

    /// Lenient lookup: unknown names fall back to [`ResourceKind::default`].
    pub fn from_name(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|err| {
            tracing::warn!(%err, fallback = Self::default().as_str(), "unrecognized resource kind");
            Self::default()
        })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape parameters shared by every geometry kind.
///
/// `size` is the radius for spheres and rings, the edge length for boxes and
/// the quad width for billboards. `detail` is the segment count (boxes use it
/// as the per-face subdivision count).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryParams {
    pub size: f32,
    pub detail: u32,
}

impl Default for GeometryParams {
    fn default() -> Self {
        Self {
            size: 1.0,
            detail: 16,
        }
    }
}

impl GeometryParams {
    pub fn new(size: f32, detail: u32) -> Self {
        Self { size, detail }
    }
}

/// The "colour or parameters" half of a request.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ResourceParams {
    #[default]
    None,
    Color(Color),
    Geometry(GeometryParams),
}

impl ResourceParams {
    fn normalized(&self) -> String {
        match self {
            ResourceParams::None => "-".to_string(),
            ResourceParams::Color(c) => c.to_hex(),
            ResourceParams::Geometry(p) => format!("s={:.3};d={}", p.size, p.detail),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            ResourceParams::None => "empty",
            ResourceParams::Color(_) => "colour",
            ResourceParams::Geometry(_) => "geometry",
        }
    }
}

/// A single request option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl OptionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Number(n) => write!(f, "{}", (n * 10_000.0).round() / 10_000.0),
            OptionValue::Text(t) => f.write_str(t),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Number(value)
    }
}

impl From<f32> for OptionValue {
    fn from(value: f32) -> Self {
        OptionValue::Number(value as f64)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

/// Everything needed to build (or find) one shared resource.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceRequest {
    pub kind: ResourceKind,
    pub params: ResourceParams,
    pub texture: Option<TextureDescriptor>,
    pub options: BTreeMap<String, OptionValue>,
}

impl ResourceRequest {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.params = ResourceParams::Color(color);
        self
    }

    pub fn geometry(mut self, params: GeometryParams) -> Self {
        self.params = ResourceParams::Geometry(params);
        self
    }

    pub fn texture(mut self, descriptor: TextureDescriptor) -> Self {
        self.texture = Some(descriptor);
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn option_f64(&self, name: &str) -> Option<f64> {
        self.options.get(name).and_then(OptionValue::as_f64)
    }

    pub fn option_bool(&self, name: &str) -> Option<bool> {
        self.options.get(name).and_then(OptionValue::as_bool)
    }

    /// Build the canonical key: `kind|params|texture|k=v,k=v`.
    pub fn canonical_key(&self) -> ResourceKey {
        let options = self
            .options
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        let texture = self
            .texture
            .as_ref()
            .map(|t| t.key().to_string())
            .unwrap_or_else(|| "-".to_string());
        ResourceKey::new(format!(
            "{}|{}|{}|{}",
            self.kind,
            self.params.normalized(),
            texture,
            options
        ))
    }
}

/// Canonical cache key. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Content-addressed id derived from the key text.
    pub fn id(&self) -> ResourceId {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&result[..8]);
        ResourceId(u64::from_le_bytes(bytes))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compact id for logs and debug overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
