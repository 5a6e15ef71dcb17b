//! Level of detail: distance-driven tiers with hysteresis.
//!
//! # Invariants
//! - A tier changes at most once per dwell window of the tier being left.
//! - Drawables only ever hold handles issued by the selector's pool;
//!   replaced handles are released back to it.
//! - Turning the debug overlay off restores the exact material it displaced.

mod drawable;
mod error;
mod selector;
mod tier;

pub use drawable::{Drawable, DrawableSet, RenderFlags, SceneDrawable};
pub use error::LodError;
pub use selector::{
    LodConfig, LodRecord, LodSelector, LodStats, LodUpdateReport, MIN_IMPORTANCE, tier_requests,
};
pub use tier::{DetailTier, Quality, TierRule, TierTable};

pub fn crate_info() -> &'static str {
    "galaxy-lod v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("lod"));
    }
}
