//! Textures: descriptors, procedural generation and external loading.

use std::sync::Arc;

use crate::error::PoolError;
use crate::key::ResourceKey;

/// Number of channels every texture is stored with (RGBA8).
pub const TEXTURE_CHANNELS: u8 = 4;

/// Built-in procedural patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexturePattern {
    /// Value noise, for rocky bodies.
    Noise,
    /// Horizontal bands, for gas giants.
    Bands,
    /// Radial falloff, for stars and sprites.
    Glow,
}

impl TexturePattern {
    fn as_str(&self) -> &'static str {
        match self {
            TexturePattern::Noise => "noise",
            TexturePattern::Bands => "bands",
            TexturePattern::Glow => "glow",
        }
    }
}

/// Where a texture comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextureDescriptor {
    /// Generated synchronously from a pattern.
    Procedural {
        pattern: TexturePattern,
        size: u32,
        seed: u64,
    },
    /// Named external image, resolved later through a [`TextureLoader`].
    External { uri: String },
}

impl TextureDescriptor {
    pub fn procedural(pattern: TexturePattern, size: u32, seed: u64) -> Self {
        TextureDescriptor::Procedural {
            pattern,
            size,
            seed,
        }
    }

    pub fn external(uri: impl Into<String>) -> Self {
        TextureDescriptor::External { uri: uri.into() }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, TextureDescriptor::External { .. })
    }

    pub fn key(&self) -> ResourceKey {
        match self {
            TextureDescriptor::Procedural {
                pattern,
                size,
                seed,
            } => ResourceKey::new(format!("texture|{}|{size}|{seed}", pattern.as_str())),
            TextureDescriptor::External { uri } => ResourceKey::new(format!("texture|ext|{uri}")),
        }
    }
}

/// Decoded RGBA8 pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl Texture {
    /// Estimated GPU footprint: width × height × channels.
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Check dimensions and that the pixel buffer matches them.
    pub fn validate(&self, key: &ResourceKey, max_dimension: u32) -> Result<(), PoolError> {
        let invalid = |reason: String| PoolError::Texture {
            key: key.to_string(),
            reason,
        };
        if self.width == 0 || self.height == 0 {
            return Err(invalid("zero-sized texture".into()));
        }
        if self.width > max_dimension || self.height > max_dimension {
            return Err(invalid(format!(
                "{}x{} exceeds the {max_dimension} limit",
                self.width, self.height
            )));
        }
        if self.pixels.len() != self.byte_size() {
            return Err(invalid(format!(
                "expected {} bytes of pixels, got {}",
                self.byte_size(),
                self.pixels.len()
            )));
        }
        Ok(())
    }

    /// Generate a square procedural texture.
    pub fn generate(pattern: TexturePattern, size: u32, seed: u64) -> Self {
        let channels = TEXTURE_CHANNELS as usize;
        let mut pixels = Vec::with_capacity(size as usize * size as usize * channels);
        let extent = size.max(1) as f32;
        for y in 0..size {
            for x in 0..size {
                let value = match pattern {
                    TexturePattern::Noise => {
                        let h = splitmix64(seed ^ (((y as u64) << 32) | x as u64));
                        (h & 0xff) as u8
                    }
                    TexturePattern::Bands => {
                        let band = splitmix64(seed ^ (y as u64 / 4)) & 0x7f;
                        (0x60 + band) as u8
                    }
                    TexturePattern::Glow => {
                        let dx = (x as f32 + 0.5) / extent * 2.0 - 1.0;
                        let dy = (y as f32 + 0.5) / extent * 2.0 - 1.0;
                        let falloff = (1.0 - (dx * dx + dy * dy).sqrt()).clamp(0.0, 1.0);
                        (falloff * 255.0).round() as u8
                    }
                };
                let alpha = if pattern == TexturePattern::Glow {
                    value
                } else {
                    0xff
                };
                pixels.extend_from_slice(&[value, value, value, alpha]);
            }
        }
        Self {
            width: size,
            height: size,
            channels: TEXTURE_CHANNELS,
            pixels,
        }
    }
}

/// Host-supplied loader for external textures.
///
/// The pool never performs IO itself; it queues external descriptors and asks
/// the loader to resolve them from [`crate::ResourcePool::poll_textures`].
pub trait TextureLoader {
    fn load(&mut self, uri: &str) -> Result<Texture, PoolError>;
}

/// Resolution state of a cached texture.
#[derive(Debug, Clone)]
pub enum TextureState {
    Pending,
    Ready(Arc<Texture>),
    Failed(String),
}

impl TextureState {
    pub fn is_ready(&self) -> bool {
        matches!(self, TextureState::Ready(_))
    }

    pub fn byte_size(&self) -> usize {
        match self {
            TextureState::Ready(t) => t.byte_size(),
            _ => 0,
        }
    }
}

/// Splitmix64 step, used as a cheap deterministic per-pixel hash.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
