//! Short-lived cache of `query_visible` results.

use galaxy_common::EntityId;
use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::{Duration, Instant};

use crate::grid::CellCoord;

/// Quantized viewpoint, zoom and optional frustum signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct QueryKey {
    viewpoint: [i64; 3],
    zoom: i64,
    frustum: Option<u64>,
}

impl QueryKey {
    pub(crate) fn new(
        viewpoint: Vec3,
        zoom: f32,
        frustum: Option<u64>,
        position_quantum: f32,
        zoom_quantum: f32,
    ) -> Self {
        let q = |v: f32, step: f32| (v / step).floor() as i64;
        Self {
            viewpoint: [
                q(viewpoint.x, position_quantum),
                q(viewpoint.y, position_quantum),
                q(viewpoint.z, position_quantum),
            ],
            zoom: q(zoom, zoom_quantum),
            frustum,
        }
    }
}

struct CachedQuery {
    result: FxHashSet<EntityId>,
    created: Instant,
    /// Inclusive cell range scanned to produce `result`.
    min: CellCoord,
    max: CellCoord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

pub(crate) struct QueryCache {
    validity: Duration,
    capacity: usize,
    entries: FxHashMap<QueryKey, CachedQuery>,
    counters: CacheCounters,
}

impl QueryCache {
    pub(crate) fn new(validity: Duration, capacity: usize) -> Self {
        Self {
            validity,
            capacity,
            entries: FxHashMap::default(),
            counters: CacheCounters::default(),
        }
    }

    /// A fresh cached result for `key`, if one exists. Expired entries are
    /// dropped on lookup.
    pub(crate) fn lookup(&mut self, key: &QueryKey, now: Instant) -> Option<FxHashSet<EntityId>> {
        let fresh = self
            .entries
            .get(key)
            .map(|c| now.saturating_duration_since(c.created) < self.validity);
        match fresh {
            Some(true) => {
                self.counters.hits += 1;
                self.entries.get(key).map(|c| c.result.clone())
            }
            Some(false) => {
                self.entries.remove(key);
                self.counters.misses += 1;
                None
            }
            None => {
                self.counters.misses += 1;
                None
            }
        }
    }

    pub(crate) fn store(
        &mut self,
        key: QueryKey,
        result: FxHashSet<EntityId>,
        range: (CellCoord, CellCoord),
        now: Instant,
    ) {
        if self.capacity == 0 || self.validity.is_zero() {
            return;
        }
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.entries
                .retain(|_, c| now.saturating_duration_since(c.created) < self.validity);
            if self.entries.len() >= self.capacity {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|(_, c)| c.created)
                    .map(|(k, _)| *k);
                if let Some(oldest) = oldest {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(
            key,
            CachedQuery {
                result,
                created: now,
                min: range.0,
                max: range.1,
            },
        );
    }

    /// Drop every entry whose scanned range includes `cell` or one of its
    /// six face neighbours.
    pub(crate) fn invalidate_around(&mut self, cell: CellCoord) {
        let touched: [CellCoord; 7] = [
            cell,
            cell.offset(1, 0, 0),
            cell.offset(-1, 0, 0),
            cell.offset(0, 1, 0),
            cell.offset(0, -1, 0),
            cell.offset(0, 0, 1),
            cell.offset(0, 0, -1),
        ];
        let before = self.entries.len();
        self.entries
            .retain(|_, c| !touched.iter().any(|t| t.within(c.min, c.max)));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            self.counters.invalidations += dropped as u64;
            tracing::trace!(?cell, dropped, "query cache invalidated");
        }
    }

    pub(crate) fn clear(&mut self) {
        self.counters.invalidations += self.entries.len() as u64;
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn counters(&self) -> CacheCounters {
        self.counters
    }
}
