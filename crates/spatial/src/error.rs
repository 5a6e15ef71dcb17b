use galaxy_common::EntityId;

/// Rejected index mutations. The index is left unchanged when one of these
/// is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpatialError {
    #[error("entity id must not be empty")]
    EmptyId,
    #[error("entity {id} has a non-finite position")]
    NonFinitePosition { id: EntityId },
    #[error("entity {id} has a non-finite radius")]
    NonFiniteRadius { id: EntityId },
}
