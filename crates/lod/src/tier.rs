//! Detail tiers, distance tables and quality scaling.

use galaxy_common::{Color, EntityKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::LodError;

/// Discrete detail level, ordered from most to least detailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailTier {
    Ultra,
    High,
    Medium,
    Low,
    /// Camera-facing sprite.
    Minimal,
}

impl DetailTier {
    pub const ALL: [DetailTier; 5] = [
        DetailTier::Ultra,
        DetailTier::High,
        DetailTier::Medium,
        DetailTier::Low,
        DetailTier::Minimal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetailTier::Ultra => "ultra",
            DetailTier::High => "high",
            DetailTier::Medium => "medium",
            DetailTier::Low => "low",
            DetailTier::Minimal => "minimal",
        }
    }

    /// Divisor applied to the base segment count.
    pub fn segment_divisor(&self) -> u32 {
        match self {
            DetailTier::Ultra => 1,
            DetailTier::High => 2,
            DetailTier::Medium => 4,
            DetailTier::Low => 8,
            DetailTier::Minimal => 16,
        }
    }

    /// Overlay colour for the debug view.
    pub fn debug_color(&self) -> Color {
        match self {
            DetailTier::Ultra => Color::rgb8(0x33, 0xff, 0x33),
            DetailTier::High => Color::rgb8(0x33, 0xcc, 0xff),
            DetailTier::Medium => Color::rgb8(0xff, 0xee, 0x33),
            DetailTier::Low => Color::rgb8(0xff, 0x88, 0x22),
            DetailTier::Minimal => Color::rgb8(0xff, 0x33, 0x33),
        }
    }
}

impl fmt::Display for DetailTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global quality preset.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    /// Multiplier on every tier threshold.
    pub fn distance_scale(&self) -> f32 {
        match self {
            Quality::Low => 0.6,
            Quality::Medium => 1.0,
            Quality::High => 1.5,
        }
    }

    /// Multiplier on geometry segment counts.
    pub fn geometry_scale(&self) -> f32 {
        match self {
            Quality::Low => 0.5,
            Quality::Medium => 1.0,
            Quality::High => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = LodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            _ => Err(LodError::UnknownQuality(s.to_string())),
        }
    }
}

/// Upper distance bound and minimum dwell time for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    pub tier: DetailTier,
    /// Inclusive upper bound on effective distance.
    pub max_distance: f32,
    /// Minimum time spent in this tier before leaving it.
    #[serde(with = "galaxy_common::millis")]
    pub dwell: Duration,
}

impl TierRule {
    pub fn new(tier: DetailTier, max_distance: f32, dwell: Duration) -> Self {
        Self {
            tier,
            max_distance,
            dwell,
        }
    }
}

/// Ordered tier rules, most detailed first. Distances and tiers both
/// strictly increase; the table may skip tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TierRule>", into = "Vec<TierRule>")]
pub struct TierTable {
    rules: Vec<TierRule>,
}

impl TierTable {
    pub fn new(rules: Vec<TierRule>) -> Result<Self, LodError> {
        if rules.is_empty() {
            return Err(LodError::EmptyTable);
        }
        for (i, rule) in rules.iter().enumerate() {
            if rule.max_distance.is_nan() || rule.max_distance <= 0.0 {
                return Err(LodError::InvalidDistance {
                    tier: rule.tier,
                    distance: rule.max_distance,
                });
            }
            if let Some(prev) = i.checked_sub(1).map(|p| &rules[p]) {
                if rule.tier <= prev.tier {
                    return Err(LodError::NonIncreasingTier { tier: rule.tier });
                }
                if rule.max_distance <= prev.max_distance {
                    return Err(LodError::NonIncreasingDistance { tier: rule.tier });
                }
            }
        }
        Ok(Self { rules })
    }

    /// Distances are effective distances at `Quality::Medium`. The last
    /// rule is unbounded.
    pub fn with_distances(distances: &[(DetailTier, f32)], dwell: Duration) -> Result<Self, LodError> {
        Self::new(
            distances
                .iter()
                .map(|&(tier, d)| TierRule::new(tier, d, dwell))
                .collect(),
        )
    }

    /// ultra 100, high 300, medium 600, low 1200, minimal beyond.
    pub fn default_table(dwell: Duration) -> Self {
        Self::scaled_default(1.0, dwell)
    }

    fn scaled_default(scale: f32, dwell: Duration) -> Self {
        let rule = |tier, d: f32| TierRule::new(tier, d * scale, dwell);
        Self {
            rules: vec![
                rule(DetailTier::Ultra, 100.0),
                rule(DetailTier::High, 300.0),
                rule(DetailTier::Medium, 600.0),
                rule(DetailTier::Low, 1200.0),
                TierRule::new(DetailTier::Minimal, f32::MAX, dwell),
            ],
        }
    }

    /// Built-in per-kind tables: stars and nebulae hold detail twice as far,
    /// asteroids drop it twice as early.
    pub fn for_kind(kind: EntityKind, dwell: Duration) -> Self {
        match kind {
            EntityKind::Star | EntityKind::Nebula => Self::scaled_default(2.0, dwell),
            EntityKind::Asteroid => Self::scaled_default(0.5, dwell),
            EntityKind::Planet | EntityKind::Moon | EntityKind::Comet => Self::default_table(dwell),
        }
    }

    pub fn rules(&self) -> &[TierRule] {
        &self.rules
    }

    pub fn rule(&self, tier: DetailTier) -> Option<&TierRule> {
        self.rules.iter().find(|r| r.tier == tier)
    }

    pub fn least_detailed(&self) -> &TierRule {
        // `new` guarantees at least one rule.
        &self.rules[self.rules.len() - 1]
    }

    /// First rule whose scaled bound covers `effective` (inclusive), else the
    /// least detailed rule.
    pub fn select(&self, effective: f32, scale: f32) -> &TierRule {
        self.rules
            .iter()
            .find(|r| r.max_distance * scale >= effective)
            .unwrap_or_else(|| self.least_detailed())
    }

    /// Dwell for leaving `tier`. Tiers outside the table use the longest
    /// dwell present.
    pub fn dwell(&self, tier: DetailTier) -> Duration {
        self.rule(tier).map(|r| r.dwell).unwrap_or_else(|| {
            self.rules
                .iter()
                .map(|r| r.dwell)
                .max()
                .unwrap_or_default()
        })
    }
}

impl TryFrom<Vec<TierRule>> for TierTable {
    type Error = LodError;

    fn try_from(rules: Vec<TierRule>) -> Result<Self, Self::Error> {
        Self::new(rules)
    }
}

impl From<TierTable> for Vec<TierRule> {
    fn from(table: TierTable) -> Self {
        table.rules
    }
}
