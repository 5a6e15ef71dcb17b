//! Developer tooling: read-only scene diagnostics.
//!
//! # Invariants
//! - Tools never mutate scene state.

mod inspector;

pub use inspector::{DiagnosticsReport, EntityInfo, SceneInspector};

pub fn crate_info() -> &'static str {
    "galaxy-tools v0.1.0"
}
