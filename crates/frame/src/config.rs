use galaxy_lod::LodConfig;
use galaxy_pool::PoolConfig;
use galaxy_spatial::SpatialConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FrameError;

/// Everything the orchestrator and its collaborators can be tuned with.
/// Every field is optional in serialized form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub spatial: SpatialConfig,
    pub lod: LodConfig,
    pub pool: PoolConfig,
    pub schedule: ScheduleConfig,
}

/// Cadence of the maintenance work done inside `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Minimum time between stale-resource sweeps.
    #[serde(with = "galaxy_common::millis")]
    pub cleanup_interval: Duration,
    /// Pending external textures resolved per frame.
    pub texture_poll_budget: usize,
    /// Frames kept in the timing window.
    pub timer_window: usize,
    /// Target frame time; longer frames are counted as over budget.
    #[serde(with = "galaxy_common::millis")]
    pub target_frame_time: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(5),
            texture_poll_budget: 2,
            timer_window: 120,
            target_frame_time: Duration::from_millis(16),
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> FrameError {
    FrameError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), FrameError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive and finite, got {value}")))
    }
}

impl FrameConfig {
    pub fn validate(&self) -> Result<(), FrameError> {
        let s = &self.spatial;
        positive("spatial.cell_size", s.cell_size)?;
        positive("spatial.min_radius", s.min_radius)?;
        positive("spatial.base_view_distance", s.base_view_distance)?;
        positive("spatial.min_search_radius", s.min_search_radius)?;
        positive("spatial.max_search_radius", s.max_search_radius)?;
        positive("spatial.position_quantum", s.position_quantum)?;
        positive("spatial.zoom_quantum", s.zoom_quantum)?;
        if s.min_search_radius > s.max_search_radius {
            return Err(invalid(
                "spatial.min_search_radius",
                "must not exceed max_search_radius",
            ));
        }
        if s.max_cell_reach < 1 {
            return Err(invalid("spatial.max_cell_reach", "must be at least 1"));
        }

        let l = &self.lod;
        positive("lod.zoom_epsilon", l.zoom_epsilon)?;
        if l.max_updates_per_frame == 0 {
            return Err(invalid("lod.max_updates_per_frame", "must be at least 1"));
        }
        if l.base_segments == 0 {
            return Err(invalid("lod.base_segments", "must be at least 1"));
        }

        if self.pool.max_texture_dimension == 0 {
            return Err(invalid("pool.max_texture_dimension", "must be at least 1"));
        }
        if self.schedule.timer_window == 0 {
            return Err(invalid("schedule.timer_window", "must be at least 1"));
        }
        Ok(())
    }
}
