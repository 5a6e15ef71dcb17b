use galaxy_common::{EntityId, EntityKind, EntityMeta};
use galaxy_lod::{DrawableSet, LodSelector, LodUpdateReport, Quality};
use galaxy_pool::{CleanupReport, ResourcePool, TextureLoader};
use galaxy_spatial::{Frustum, SpatialIndex};
use glam::Vec3;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::{FrameConfig, ScheduleConfig};
use crate::error::FrameError;
use crate::timer::FrameTimer;

/// Per-frame camera input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub viewpoint: Vec3,
    pub zoom: f32,
    pub frustum: Option<Frustum>,
}

impl FrameView {
    pub fn new(viewpoint: Vec3, zoom: f32) -> Self {
        Self {
            viewpoint,
            zoom,
            frustum: None,
        }
    }

    pub fn with_frustum(mut self, frustum: Frustum) -> Self {
        self.frustum = Some(frustum);
        self
    }
}

/// What one `update` call did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    pub visible: usize,
    pub lod: LodUpdateReport,
    pub reclaimed: CleanupReport,
    /// Present on frames where the stale-resource sweep ran.
    pub cleanup: Option<CleanupReport>,
    pub textures_polled: usize,
    pub preload_remaining: usize,
    pub elapsed: Duration,
}

/// Drives the spatial index, the LOD selector and the resource pool once
/// per frame.
///
/// Registration fans out to the index and the selector; `update` queries the
/// index for candidates, hands them to the selector nearest first, then runs
/// the pool's deferred reclamation, texture polling, preload step and (on
/// its own cadence) the stale sweep.
pub struct FrameOrchestrator {
    schedule: ScheduleConfig,
    spatial: SpatialIndex,
    lod: LodSelector,
    timer: FrameTimer,
    loader: Option<Box<dyn TextureLoader>>,
    last_cleanup: Option<Instant>,
    frame: u64,
}

impl FrameOrchestrator {
    pub fn new(config: FrameConfig) -> Result<Self, FrameError> {
        config.validate()?;
        let FrameConfig {
            spatial,
            lod,
            pool,
            schedule,
        } = config;
        let timer = FrameTimer::new(schedule.timer_window, schedule.target_frame_time);
        Ok(Self {
            spatial: SpatialIndex::new(spatial),
            lod: LodSelector::with_pool_config(lod, pool),
            timer,
            schedule,
            loader: None,
            last_cleanup: None,
            frame: 0,
        })
    }

    /// Install the loader used for external textures.
    pub fn set_texture_loader(&mut self, loader: Box<dyn TextureLoader>) {
        self.loader = Some(loader);
    }

    pub fn register(
        &mut self,
        id: EntityId,
        position: Vec3,
        radius: f32,
        kind: EntityKind,
        importance: f32,
    ) -> Result<(), FrameError> {
        self.register_with_meta(id, position, radius, EntityMeta::new(kind), importance)
    }

    /// Register with a full metadata tag. Nothing is registered with the
    /// selector if the index rejects the entity.
    pub fn register_with_meta(
        &mut self,
        id: EntityId,
        position: Vec3,
        radius: f32,
        meta: EntityMeta,
        importance: f32,
    ) -> Result<(), FrameError> {
        let kind = meta.kind;
        self.spatial.add_entity(id.clone(), position, radius, meta)?;
        self.lod.register(id, kind, importance);
        Ok(())
    }

    pub fn move_entity(&mut self, id: &EntityId, position: Vec3, radius: Option<f32>) -> bool {
        self.spatial.update_entity(id, position, radius)
    }

    /// Remove from both collaborators, releasing the drawable's resources.
    pub fn remove(&mut self, id: &EntityId, drawables: &mut dyn DrawableSet) -> bool {
        let in_index = self.spatial.remove_entity(id).is_some();
        let in_lod = self.lod.unregister(id, drawables).is_some();
        in_index || in_lod
    }

    pub fn update(&mut self, view: &FrameView, drawables: &mut dyn DrawableSet, now: Instant) -> FrameReport {
        let started = Instant::now();
        self.frame += 1;
        let _span = tracing::info_span!("frame", frame = self.frame).entered();
        self.lod.pool_mut().advance_clock(now);

        let visible = self
            .spatial
            .query_visible(view.viewpoint, view.zoom, view.frustum.as_ref(), now);
        let candidates: Vec<(EntityId, Vec3)> = visible
            .iter()
            .filter_map(|id| self.spatial.get(id).map(|r| (id.clone(), r.position)))
            .collect();
        let lod = self
            .lod
            .update_for_entities(&candidates, view.viewpoint, view.zoom, drawables, now);

        let pool = self.lod.pool_mut();
        let reclaimed = pool.process_reclamation();
        let textures_polled = match self.loader.as_deref_mut() {
            Some(loader) => pool.poll_textures(loader, self.schedule.texture_poll_budget),
            None => 0,
        };
        let preload_remaining = pool.preload_step();

        let cleanup_due = self
            .last_cleanup
            .is_none_or(|t| now.saturating_duration_since(t) >= self.schedule.cleanup_interval);
        let cleanup = if cleanup_due {
            self.last_cleanup = Some(now);
            Some(pool.cleanup_unused(false))
        } else {
            None
        };

        let elapsed = started.elapsed();
        self.timer.record(elapsed);
        tracing::debug!(
            visible = visible.len(),
            evaluated = lod.evaluated,
            deferred = lod.deferred,
            reclaimed = reclaimed.disposed,
            ?elapsed,
            "frame updated"
        );
        FrameReport {
            frame: self.frame,
            visible: visible.len(),
            lod,
            reclaimed,
            cleanup,
            textures_polled,
            preload_remaining,
            elapsed,
        }
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.lod.set_quality(quality);
    }

    pub fn set_debug_colors(&mut self, enabled: bool, drawables: &mut dyn DrawableSet) {
        self.lod.set_debug_colors(enabled, drawables);
    }

    /// Release everything: entities are unregistered, the index is cleared
    /// and the pool is disposed.
    pub fn shutdown(&mut self, drawables: &mut dyn DrawableSet) -> CleanupReport {
        let ids: Vec<EntityId> = self.spatial.iter().map(|r| r.id.clone()).collect();
        for id in &ids {
            self.lod.unregister(id, drawables);
        }
        self.spatial.clear();
        let report = self.lod.pool_mut().dispose();
        tracing::info!(entities = ids.len(), disposed = report.disposed, "orchestrator shut down");
        report
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    pub fn lod(&self) -> &LodSelector {
        &self.lod
    }

    pub fn lod_mut(&mut self) -> &mut LodSelector {
        &mut self.lod
    }

    pub fn pool(&self) -> &ResourcePool {
        self.lod.pool()
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }
}
