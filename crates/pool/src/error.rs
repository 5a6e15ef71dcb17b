use crate::key::ResourceKind;

/// Errors from resource construction and texture resolution.
///
/// None of these reach the render loop: [`crate::ResourcePool::get`] turns
/// them into the pinned fallback resources.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("cannot build {kind} geometry: {reason}")]
    Geometry { kind: ResourceKind, reason: String },
    #[error("{kind} does not accept {params} parameters")]
    ParamMismatch {
        kind: ResourceKind,
        params: &'static str,
    },
    #[error("unknown resource kind: {0:?}")]
    UnknownKind(String),
    #[error("texture {key} is invalid: {reason}")]
    Texture { key: String, reason: String },
    #[error("failed to load texture from {uri}: {reason}")]
    TextureLoad { uri: String, reason: String },
}
