use crate::tier::DetailTier;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LodError {
    #[error("tier table has no rules")]
    EmptyTable,
    #[error("tier {tier} has an invalid max distance {distance}")]
    InvalidDistance { tier: DetailTier, distance: f32 },
    #[error("tier {tier} max distance does not increase over the previous rule")]
    NonIncreasingDistance { tier: DetailTier },
    #[error("tier {tier} is not less detailed than the previous rule")]
    NonIncreasingTier { tier: DetailTier },
    #[error("unknown quality level: {0:?}")]
    UnknownQuality(String),
}
