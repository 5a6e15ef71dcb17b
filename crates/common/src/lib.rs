//! Shared types for the galaxy scene subsystem.
//!
//! Every other crate in the workspace speaks in these ids, kinds and colours.

pub mod millis;
mod types;

pub use types::{Color, ColorParseError, EntityId, EntityKind, EntityMeta, UnknownKindError};

pub fn crate_info() -> &'static str {
    "galaxy-common v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("common"));
    }
}
