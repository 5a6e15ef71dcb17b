use galaxy_common::{EntityId, EntityKind};
use galaxy_frame::{FrameOrchestrator, FrameTimings};
use galaxy_lod::{DetailTier, LodStats};
use galaxy_pool::PoolStats;
use galaxy_spatial::{CellCoord, PartitionInfo};
use serde::Serialize;
use std::fmt;

/// Scene inspector for developer tooling.
///
/// Read-only: combines the diagnostics of every collaborator for a debug
/// overlay or a log line.
pub struct SceneInspector;

impl SceneInspector {
    pub fn report(orch: &FrameOrchestrator) -> DiagnosticsReport {
        DiagnosticsReport {
            frame: orch.frame(),
            partition: orch.spatial().partition_info(),
            lod: orch.lod().lod_stats(),
            pool: orch.pool().stats(),
            timings: orch.timer().timings(),
        }
    }

    pub fn inspect_entity(orch: &FrameOrchestrator, id: &EntityId) -> Option<EntityInfo> {
        let record = orch.spatial().get(id)?;
        let lod = orch.lod().record(id);
        Some(EntityInfo {
            id: record.id.clone(),
            kind: record.meta.kind,
            label: record.meta.label.clone(),
            position: record.position.to_array(),
            radius: record.radius,
            cell: record.cell,
            tier: lod.and_then(|r| r.current_tier),
            importance: lod.map(|r| r.importance),
        })
    }

    /// Entity ids in ascending order.
    pub fn list_entities(orch: &FrameOrchestrator) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = orch.spatial().iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub frame: u64,
    pub partition: PartitionInfo,
    pub lod: LodStats,
    pub pool: PoolStats,
    pub timings: FrameTimings,
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.partition;
        writeln!(
            f,
            "Frame {}: avg={:?} max={:?} over_budget={}",
            self.frame, self.timings.average, self.timings.max, self.timings.over_budget
        )?;
        writeln!(
            f,
            "Spatial: entities={} cells={} mean_pop={:.2} max_pop={} overfull={} cache(hits={} misses={} invalidated={})",
            p.entity_count,
            p.cell_count,
            p.mean_cell_population,
            p.max_cell_population,
            p.overfull_cells,
            p.cache_hits,
            p.cache_misses,
            p.cache_invalidations
        )?;
        let l = &self.lod;
        write!(f, "LOD: registered={} quality={}", l.registered, l.quality)?;
        for tier in DetailTier::ALL {
            if let Some(count) = l.tier_distribution.get(&tier) {
                write!(f, " {tier}={count}")?;
            }
        }
        writeln!(
            f,
            " unset={} changes={} held={} deferred={} fallbacks={}",
            l.unset, l.tier_changes, l.held_by_hysteresis, l.deferred_total, l.fallbacks
        )?;
        let s = &self.pool;
        write!(
            f,
            "Pool: entries={} pinned={} textures={} pending={} bytes={} hit_rate={:.1}% disposed={} queued={}",
            s.entry_count,
            s.pinned_count,
            s.texture_count,
            s.pending_textures,
            s.estimated_bytes,
            s.hit_rate * 100.0,
            s.disposed_total,
            s.reclaim_queued
        )
    }
}

/// Detailed info about a single entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub kind: EntityKind,
    pub label: Option<String>,
    pub position: [f32; 3],
    pub radius: f32,
    pub cell: CellCoord,
    pub tier: Option<DetailTier>,
    pub importance: Option<f32>,
}

impl fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entity [{}] {} pos=({:.2}, {:.2}, {:.2}) r={:.2} cell=({}, {}, {})",
            self.id,
            self.kind,
            self.position[0],
            self.position[1],
            self.position[2],
            self.radius,
            self.cell.x,
            self.cell.y,
            self.cell.z,
        )?;
        match self.tier {
            Some(tier) => write!(f, " tier={tier}")?,
            None => write!(f, " tier=unset")?,
        }
        if let Some(label) = &self.label {
            write!(f, " \"{label}\"")?;
        }
        Ok(())
    }
}
