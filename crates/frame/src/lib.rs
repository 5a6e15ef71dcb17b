//! Frame orchestration: one entry point the render loop calls per frame.
//!
//! # Invariants
//! - Registration reaches the spatial index and the LOD selector together or
//!   not at all.
//! - All time flows in through `now`; only the soft LOD budget and the frame
//!   timer read the wall clock.

mod config;
mod error;
mod orchestrator;
mod timer;

pub use config::{FrameConfig, ScheduleConfig};
pub use error::FrameError;
pub use orchestrator::{FrameOrchestrator, FrameReport, FrameView};
pub use timer::{FrameTimer, FrameTimings};

pub fn crate_info() -> &'static str {
    "galaxy-frame v0.1.0"
}
