use galaxy_lod::LodError;
use galaxy_spatial::SpatialError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("invalid config `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error(transparent)]
    Spatial(#[from] SpatialError),
    #[error(transparent)]
    Lod(#[from] LodError),
}
