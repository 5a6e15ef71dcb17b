use glam::Vec4;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable external identifier for a scene entity.
///
/// Ids come from the layout generator (for example `"planet-1"` or a page
/// path) and never change for the lifetime of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random id for callers with no natural identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What a scene node represents. Selects tier tables and base colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Site root or top-level section.
    Star,
    /// A page.
    Planet,
    /// A sub-page orbiting its parent page.
    Moon,
    /// A loose asset or leaf document.
    Asteroid,
    /// A recently changed page.
    Comet,
    /// A grouping cloud spanning many pages.
    Nebula,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Star,
        EntityKind::Planet,
        EntityKind::Moon,
        EntityKind::Asteroid,
        EntityKind::Comet,
        EntityKind::Nebula,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Star => "star",
            EntityKind::Planet => "planet",
            EntityKind::Moon => "moon",
            EntityKind::Asteroid => "asteroid",
            EntityKind::Comet => "comet",
            EntityKind::Nebula => "nebula",
        }
    }

    /// Baseline colour used for materials and preloading.
    pub fn base_color(&self) -> Color {
        match self {
            EntityKind::Star => Color::rgb8(0xff, 0xd2, 0x7f),
            EntityKind::Planet => Color::rgb8(0x4f, 0x8c, 0xff),
            EntityKind::Moon => Color::rgb8(0xb8, 0xb8, 0xc8),
            EntityKind::Asteroid => Color::rgb8(0x8a, 0x6f, 0x55),
            EntityKind::Comet => Color::rgb8(0x9f, 0xff, 0xf5),
            EntityKind::Nebula => Color::rgb8(0xc0, 0x6c, 0xff),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity kind: {0:?}")]
pub struct UnknownKindError(pub String);

impl FromStr for EntityKind {
    type Err = UnknownKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| UnknownKindError(s.to_string()))
    }
}

/// Opaque tag attached to every spatial entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub kind: EntityKind,
    pub label: Option<String>,
}

impl EntityMeta {
    pub fn new(kind: EntityKind) -> Self {
        Self { kind, label: None }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Linear RGBA colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorParseError {
    #[error("colour {0:?} must have 3, 6 or 8 hex digits")]
    Length(String),
    #[error("colour {0:?} contains a non-hex digit")]
    Digit(String),
}

impl Color {
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const MAGENTA: Color = Color::rgba(1.0, 0.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(input: &str) -> Result<Self, ColorParseError> {
        let digits = input.trim().trim_start_matches('#');
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => digits.to_string(),
            _ => return Err(ColorParseError::Length(input.to_string())),
        };
        if !expanded.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError::Digit(input.to_string()));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map_err(|_| ColorParseError::Digit(input.to_string()))
        };
        let (r, g, b) = (byte(0)?, byte(2)?, byte(4)?);
        let a = if expanded.len() == 8 { byte(6)? } else { 0xff };
        Ok(Self::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        ))
    }

    /// Quantized 8-bit channels. Two colours that round to the same bytes
    /// are treated as identical everywhere a colour participates in a key.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    /// Lowercase `#rrggbb`, with an alpha pair appended only when not opaque.
    pub fn to_hex(&self) -> String {
        let [r, g, b, a] = self.to_rgba8();
        if a == 0xff {
            format!("#{r:02x}{g:02x}{b:02x}")
        } else {
            format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Component-wise multiply, used for per-instance tints.
    pub fn modulate(self, other: Color) -> Self {
        Self::rgba(
            self.r * other.r,
            self.g * other.g,
            self.b * other.b,
            self.a * other.a,
        )
    }

    pub fn to_vec4(&self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}
