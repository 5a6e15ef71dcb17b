use galaxy_common::{EntityId, EntityKind, EntityMeta};
use glam::Vec3;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::cache::{QueryCache, QueryKey};
use crate::error::SpatialError;
use crate::frustum::Frustum;

/// Zoom values below this are treated as this when sizing the search radius.
const MIN_ZOOM: f32 = 1.0e-3;

/// An integer cell coordinate in the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            z: self.z.saturating_add(dz),
        }
    }

    /// Inside the inclusive box `min..=max`.
    pub(crate) fn within(self, min: CellCoord, max: CellCoord) -> bool {
        (min.x..=max.x).contains(&self.x)
            && (min.y..=max.y).contains(&self.y)
            && (min.z..=max.z).contains(&self.z)
    }
}

/// Index tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Edge length of a grid cell in world units.
    pub cell_size: f32,
    /// Radii below this are clamped up to it.
    pub min_radius: f32,
    /// Search radius at zoom 1.0; divided by the zoom level.
    pub base_view_distance: f32,
    pub min_search_radius: f32,
    pub max_search_radius: f32,
    #[serde(with = "galaxy_common::millis")]
    pub cache_validity: Duration,
    pub cache_capacity: usize,
    /// Viewpoint quantization step for cache keys.
    pub position_quantum: f32,
    /// Zoom quantization step for cache keys.
    pub zoom_quantum: f32,
    /// A cell growing past this population logs a warning.
    pub cell_capacity_warning: usize,
    /// Largest cube walk, in cells from the centre. Wider scans walk the
    /// occupied cells instead.
    pub max_cell_reach: i32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            cell_size: 100.0,
            min_radius: 0.01,
            base_view_distance: 1500.0,
            min_search_radius: 50.0,
            max_search_radius: 20_000.0,
            cache_validity: Duration::from_millis(50),
            cache_capacity: 64,
            position_quantum: 10.0,
            zoom_quantum: 0.05,
            cell_capacity_warning: 256,
            max_cell_reach: 64,
        }
    }
}

/// One registered object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub position: Vec3,
    pub radius: f32,
    /// Derived from `position`; only the index moves it.
    pub cell: CellCoord,
    pub meta: EntityMeta,
}

/// A `query_radius` hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub id: EntityId,
    pub distance: f32,
}

/// An overlap reported by `check_collisions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collision {
    pub other: EntityId,
    pub distance: f32,
    pub penetration: f32,
}

/// Partition diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartitionInfo {
    pub entity_count: usize,
    pub cell_count: usize,
    pub cell_size: f32,
    pub mean_cell_population: f32,
    pub max_cell_population: usize,
    pub overfull_cells: usize,
    pub cached_queries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_invalidations: u64,
    pub max_entity_radius: f32,
}

/// Uniform 3D grid hash over bounding spheres.
///
/// Every entity lives in exactly one cell, derived from its position; cells
/// with no members are removed. Queries scan an inclusive cube of cells
/// around the query point, widened by the largest radius ever indexed so
/// that spheres overlapping the search region from a neighbouring cell are
/// still found.
pub struct SpatialIndex {
    config: SpatialConfig,
    records: FxHashMap<EntityId, EntityRecord>,
    cells: FxHashMap<CellCoord, FxHashSet<EntityId>>,
    /// Cells currently above `cell_capacity_warning`.
    overfull: FxHashSet<CellCoord>,
    /// Largest radius seen since the last `clear`. Never shrinks.
    max_radius: f32,
    cache: QueryCache,
}

impl SpatialIndex {
    pub fn new(config: SpatialConfig) -> Self {
        let cache = QueryCache::new(config.cache_validity, config.cache_capacity);
        Self {
            config,
            records: FxHashMap::default(),
            cells: FxHashMap::default(),
            overfull: FxHashSet::default(),
            max_radius: 0.0,
            cache,
        }
    }

    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// Convert a world position to a cell coordinate.
    pub fn position_to_cell(&self, pos: Vec3) -> CellCoord {
        let s = self.config.cell_size;
        CellCoord {
            x: (pos.x / s).floor() as i32,
            y: (pos.y / s).floor() as i32,
            z: (pos.z / s).floor() as i32,
        }
    }

    /// Insert an entity. Re-adding a known id replaces its record.
    pub fn add_entity(
        &mut self,
        id: EntityId,
        position: Vec3,
        radius: f32,
        meta: EntityMeta,
    ) -> Result<&EntityRecord, SpatialError> {
        if id.is_empty() {
            tracing::warn!("add_entity rejected: empty id");
            return Err(SpatialError::EmptyId);
        }
        if !position.is_finite() {
            tracing::warn!(%id, ?position, "add_entity rejected: non-finite position");
            return Err(SpatialError::NonFinitePosition { id });
        }
        if !radius.is_finite() {
            tracing::warn!(%id, radius, "add_entity rejected: non-finite radius");
            return Err(SpatialError::NonFiniteRadius { id });
        }

        if let Some(old) = self.records.remove(&id) {
            tracing::debug!(%id, "entity re-added, treating as update");
            self.detach(&id, old.cell);
        }

        let radius = radius.max(self.config.min_radius);
        let cell = self.position_to_cell(position);
        self.note_radius(radius);
        self.attach(&id, cell);
        tracing::trace!(%id, ?cell, radius, "entity added");

        let record = EntityRecord {
            id: id.clone(),
            position,
            radius,
            cell,
            meta,
        };
        Ok(self.records.entry(id).insert_entry(record).into_mut())
    }

    /// Move an entity and optionally change its radius. Returns `false` for
    /// unknown ids and non-finite input, leaving the index unchanged.
    pub fn update_entity(&mut self, id: &EntityId, position: Vec3, radius: Option<f32>) -> bool {
        if !position.is_finite() || radius.is_some_and(|r| !r.is_finite()) {
            tracing::warn!(%id, ?position, ?radius, "update_entity rejected: non-finite input");
            return false;
        }
        let Some(old_cell) = self.records.get(id).map(|r| r.cell) else {
            tracing::warn!(%id, "update_entity on unknown id");
            return false;
        };

        let new_cell = self.position_to_cell(position);
        let radius = radius.map(|r| r.max(self.config.min_radius));
        if let Some(r) = radius {
            self.note_radius(r);
        }
        if new_cell != old_cell {
            self.detach(id, old_cell);
            self.attach(id, new_cell);
            tracing::trace!(%id, from = ?old_cell, to = ?new_cell, "entity changed cell");
        } else {
            self.cache.invalidate_around(old_cell);
        }

        if let Some(record) = self.records.get_mut(id) {
            record.position = position;
            record.cell = new_cell;
            if let Some(r) = radius {
                record.radius = r;
            }
        }
        true
    }

    pub fn remove_entity(&mut self, id: &EntityId) -> Option<EntityRecord> {
        let Some(record) = self.records.remove(id) else {
            tracing::warn!(%id, "remove_entity on unknown id");
            return None;
        };
        self.detach(id, record.cell);
        tracing::trace!(%id, cell = ?record.cell, "entity removed");
        Some(record)
    }

    /// Search radius for a zoom level: inversely proportional, clamped.
    pub fn search_radius(&self, zoom: f32) -> f32 {
        (self.config.base_view_distance / zoom.max(MIN_ZOOM))
            .clamp(self.config.min_search_radius, self.config.max_search_radius)
    }

    /// Entities whose bounding sphere reaches within the zoom-derived search
    /// radius of `viewpoint` and, if given, intersects `frustum`.
    pub fn query_visible(
        &mut self,
        viewpoint: Vec3,
        zoom: f32,
        frustum: Option<&Frustum>,
        now: Instant,
    ) -> FxHashSet<EntityId> {
        if !viewpoint.is_finite() {
            tracing::warn!(?viewpoint, "query_visible with non-finite viewpoint");
            return FxHashSet::default();
        }
        let key = QueryKey::new(
            viewpoint,
            zoom,
            frustum.map(Frustum::signature),
            self.config.position_quantum,
            self.config.zoom_quantum,
        );
        if let Some(hit) = self.cache.lookup(&key, now) {
            tracing::trace!(count = hit.len(), "query_visible cache hit");
            return hit;
        }

        let search = self.search_radius(zoom);
        let range = self.scan_range(viewpoint, search);
        let mut visible = FxHashSet::default();
        self.for_each_in_range(range, |record| {
            let distance = viewpoint.distance(record.position);
            if distance <= search + record.radius
                && frustum.is_none_or(|f| f.intersects_sphere(record.position, record.radius))
            {
                visible.insert(record.id.clone());
            }
        });
        tracing::trace!(search, count = visible.len(), "query_visible computed");
        self.cache.store(key, visible.clone(), range, now);
        visible
    }

    /// Entities whose bounding sphere reaches within `radius` of `center`,
    /// nearest first. Uncached.
    pub fn query_radius(
        &self,
        center: Vec3,
        radius: f32,
        kind: Option<&EntityKind>,
    ) -> Vec<Neighbor> {
        if !center.is_finite() || !radius.is_finite() {
            tracing::warn!(?center, radius, "query_radius with non-finite input");
            return Vec::new();
        }
        let radius = radius.max(0.0);
        let mut found = Vec::new();
        self.for_each_in_range(self.scan_range(center, radius), |record| {
            if kind.is_some_and(|k| record.meta.kind != *k) {
                return;
            }
            let distance = center.distance(record.position);
            if distance <= radius + record.radius {
                found.push(Neighbor {
                    id: record.id.clone(),
                    distance,
                });
            }
        });
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        found
    }

    /// Other entities overlapping `id`'s sphere scaled by `radius_multiplier`,
    /// nearest first.
    pub fn check_collisions(&self, id: &EntityId, radius_multiplier: f32) -> Vec<Collision> {
        let Some(record) = self.records.get(id) else {
            tracing::warn!(%id, "check_collisions on unknown id");
            return Vec::new();
        };
        let reach = record.radius * radius_multiplier.max(0.0);
        self.query_radius(record.position, reach + self.max_radius, None)
            .into_iter()
            .filter(|n| n.id != *id)
            .filter_map(|n| {
                let other = self.records.get(&n.id)?;
                let penetration = reach + other.radius - n.distance;
                (penetration > 0.0).then(|| Collision {
                    other: n.id,
                    distance: n.distance,
                    penetration,
                })
            })
            .collect()
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.records.contains_key(id)
    }

    pub fn cell_of(&self, id: &EntityId) -> Option<CellCoord> {
        self.records.get(id).map(|r| r.cell)
    }

    pub fn entities_in_cell(&self, coord: CellCoord) -> Vec<&EntityId> {
        self.cells
            .get(&coord)
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn max_entity_radius(&self) -> f32 {
        self.max_radius
    }

    pub fn partition_info(&self) -> PartitionInfo {
        let counters = self.cache.counters();
        let populations = self.cells.values().map(|s| s.len());
        PartitionInfo {
            entity_count: self.records.len(),
            cell_count: self.cells.len(),
            cell_size: self.config.cell_size,
            mean_cell_population: if self.cells.is_empty() {
                0.0
            } else {
                self.records.len() as f32 / self.cells.len() as f32
            },
            max_cell_population: populations.max().unwrap_or(0),
            overfull_cells: self.overfull.len(),
            cached_queries: self.cache.len(),
            cache_hits: counters.hits,
            cache_misses: counters.misses,
            cache_invalidations: counters.invalidations,
            max_entity_radius: self.max_radius,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.cells.clear();
        self.overfull.clear();
        self.cache.clear();
        self.max_radius = 0.0;
        tracing::debug!("spatial index cleared");
    }

    fn attach(&mut self, id: &EntityId, cell: CellCoord) {
        let members = self.cells.entry(cell).or_default();
        members.insert(id.clone());
        let population = members.len();
        if population > self.config.cell_capacity_warning && self.overfull.insert(cell) {
            tracing::warn!(
                ?cell,
                population,
                limit = self.config.cell_capacity_warning,
                "grid cell over capacity"
            );
        }
        self.cache.invalidate_around(cell);
    }

    fn detach(&mut self, id: &EntityId, cell: CellCoord) {
        if let Some(members) = self.cells.get_mut(&cell) {
            members.remove(id);
            if members.len() <= self.config.cell_capacity_warning {
                self.overfull.remove(&cell);
            }
            if members.is_empty() {
                self.cells.remove(&cell);
            }
        }
        self.cache.invalidate_around(cell);
    }

    fn note_radius(&mut self, radius: f32) {
        if radius > self.max_radius {
            self.max_radius = radius;
            // Cached scans were sized for the old maximum.
            self.cache.clear();
        }
    }

    /// Inclusive cell range covering every sphere that could reach within
    /// `distance` of `center`.
    fn scan_range(&self, center: Vec3, distance: f32) -> (CellCoord, CellCoord) {
        let reach = ((distance + self.max_radius) / self.config.cell_size).ceil() as i32;
        let c = self.position_to_cell(center);
        (c.offset(-reach, -reach, -reach), c.offset(reach, reach, reach))
    }

    /// Visit every record in `range`, walking the cube when it is small and
    /// the occupied cells otherwise.
    fn for_each_in_range(&self, range: (CellCoord, CellCoord), mut visit: impl FnMut(&EntityRecord)) {
        let (min, max) = range;
        let span = |a: i32, b: i32| (i64::from(b) - i64::from(a) + 1) as u128;
        let reach = (i64::from(max.x) - i64::from(min.x)) / 2;
        let volume = span(min.x, max.x) * span(min.y, max.y) * span(min.z, max.z);
        let mut visit_cell = |members: &FxHashSet<EntityId>| {
            for id in members {
                if let Some(record) = self.records.get(id) {
                    visit(record);
                }
            }
        };

        if reach > i64::from(self.config.max_cell_reach) || volume > self.cells.len() as u128 {
            for (coord, members) in &self.cells {
                if coord.within(min, max) {
                    visit_cell(members);
                }
            }
            return;
        }
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                for z in min.z..=max.z {
                    if let Some(members) = self.cells.get(&CellCoord::new(x, y, z)) {
                        visit_cell(members);
                    }
                }
            }
        }
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(SpatialConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = self.0;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^ (z >> 31)
        }

        fn unit(&mut self) -> f32 {
            (self.next() >> 40) as f32 / (1u64 << 24) as f32
        }

        fn range(&mut self, lo: f32, hi: f32) -> f32 {
            lo + (hi - lo) * self.unit()
        }

        fn point(&mut self, half: f32) -> Vec3 {
            Vec3::new(
                self.range(-half, half),
                self.range(-half, half),
                self.range(-half, half),
            )
        }
    }

    fn planet() -> EntityMeta {
        EntityMeta::new(EntityKind::Planet)
    }

    fn assert_partition_invariants(index: &SpatialIndex) {
        let mut placed = 0;
        for (coord, members) in &index.cells {
            assert!(!members.is_empty(), "empty cell {coord:?} kept");
            for id in members {
                let record = index.get(id).expect("cell member without record");
                assert_eq!(record.cell, *coord);
                assert_eq!(record.cell, index.position_to_cell(record.position));
            }
            placed += members.len();
        }
        assert_eq!(placed, index.len());
        for record in index.iter() {
            assert!(index.cells[&record.cell].contains(&record.id));
        }
    }

    #[test]
    fn position_to_cell_floors_on_every_axis() {
        let index = SpatialIndex::default();
        assert_eq!(
            index.position_to_cell(Vec3::new(10.0, 150.0, -5.0)),
            CellCoord::new(0, 1, -1)
        );
        assert_eq!(
            index.position_to_cell(Vec3::new(-100.0, 99.9, 200.0)),
            CellCoord::new(-1, 0, 2)
        );
    }

    #[test]
    fn add_rejects_bad_input_and_leaves_index_unchanged() {
        let mut index = SpatialIndex::default();
        assert_eq!(
            index.add_entity(EntityId::new(""), Vec3::ZERO, 1.0, planet()),
            Err(SpatialError::EmptyId)
        );
        assert!(matches!(
            index.add_entity("a".into(), Vec3::new(f32::NAN, 0.0, 0.0), 1.0, planet()),
            Err(SpatialError::NonFinitePosition { .. })
        ));
        assert!(matches!(
            index.add_entity("a".into(), Vec3::ZERO, f32::INFINITY, planet()),
            Err(SpatialError::NonFiniteRadius { .. })
        ));
        assert!(index.is_empty());
        assert_eq!(index.cell_count(), 0);
    }

    #[test]
    fn radius_is_clamped() {
        let mut index = SpatialIndex::default();
        let record = index.add_entity("a".into(), Vec3::ZERO, -3.0, planet()).unwrap();
        assert_eq!(record.radius, 0.01);
    }

    #[test]
    fn re_add_replaces_record() {
        let mut index = SpatialIndex::default();
        index.add_entity("a".into(), Vec3::ZERO, 1.0, planet()).unwrap();
        index
            .add_entity("a".into(), Vec3::splat(550.0), 2.0, EntityMeta::new(EntityKind::Star))
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.cell_count(), 1);
        assert_eq!(index.cell_of(&"a".into()), Some(CellCoord::new(5, 5, 5)));
        assert_partition_invariants(&index);
    }

    #[test]
    fn update_moves_between_cells_and_drops_empty_ones() {
        let mut index = SpatialIndex::default();
        let id = EntityId::new("a");
        index.add_entity(id.clone(), Vec3::ZERO, 1.0, planet()).unwrap();
        assert!(index.update_entity(&id, Vec3::new(250.0, 0.0, 0.0), Some(4.0)));
        assert_eq!(index.cell_of(&id), Some(CellCoord::new(2, 0, 0)));
        assert!(index.entities_in_cell(CellCoord::new(0, 0, 0)).is_empty());
        assert_eq!(index.get(&id).unwrap().radius, 4.0);
        assert_eq!(index.cell_count(), 1);
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut index = SpatialIndex::default();
        assert!(!index.update_entity(&"ghost".into(), Vec3::ZERO, None));
        assert!(index.remove_entity(&"ghost".into()).is_none());
        assert!(index.check_collisions(&"ghost".into(), 1.0).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn random_churn_keeps_partition_invariants() {
        let mut rng = Rng(42);
        let mut index = SpatialIndex::new(SpatialConfig {
            cell_size: 50.0,
            ..SpatialConfig::default()
        });
        let ids: Vec<EntityId> = (0..200).map(|i| EntityId::new(format!("e{i}"))).collect();
        for id in &ids {
            index
                .add_entity(id.clone(), rng.point(500.0), rng.range(0.0, 20.0), planet())
                .unwrap();
        }
        for step in 0..2000 {
            let id = &ids[(rng.next() % ids.len() as u64) as usize];
            match step % 5 {
                0 => {
                    index.remove_entity(id);
                }
                1 => {
                    if !index.contains(id) {
                        index.add_entity(id.clone(), rng.point(500.0), 1.0, planet()).unwrap();
                    }
                }
                _ => {
                    index.update_entity(id, rng.point(500.0), None);
                }
            }
        }
        assert_partition_invariants(&index);
    }

    fn brute_force(index: &SpatialIndex, viewpoint: Vec3, search: f32) -> BTreeSet<EntityId> {
        index
            .iter()
            .filter(|r| viewpoint.distance(r.position) <= search + r.radius)
            .map(|r| r.id.clone())
            .collect()
    }

    #[test]
    fn query_visible_matches_brute_force() {
        let mut rng = Rng(7);
        let mut index = SpatialIndex::default();
        for i in 0..500 {
            index
                .add_entity(
                    EntityId::new(format!("e{i}")),
                    rng.point(2000.0),
                    rng.range(0.0, 30.0),
                    planet(),
                )
                .unwrap();
        }
        let t0 = Instant::now();
        // Zoom 1 walks the occupied cells, zoom 10 walks the cube.
        for (step, zoom) in [1.0_f32, 10.0, 4.0, 0.5].into_iter().enumerate() {
            for probe in 0..10 {
                let viewpoint = rng.point(2000.0);
                let now = t0 + Duration::from_secs((step * 10 + probe) as u64);
                let got: BTreeSet<EntityId> =
                    index.query_visible(viewpoint, zoom, None, now).into_iter().collect();
                assert_eq!(got, brute_force(&index, viewpoint, index.search_radius(zoom)));
            }
        }
    }

    #[test]
    fn search_radius_is_clamped() {
        let index = SpatialIndex::default();
        assert_eq!(index.search_radius(1.0), 1500.0);
        assert_eq!(index.search_radius(1000.0), 50.0);
        assert_eq!(index.search_radius(0.0), 20_000.0);
    }

    #[test]
    fn query_visible_applies_frustum() {
        use glam::Mat4;
        let mut index = SpatialIndex::default();
        index.add_entity("front".into(), Vec3::new(0.0, 0.0, -100.0), 5.0, planet()).unwrap();
        index.add_entity("behind".into(), Vec3::new(0.0, 0.0, 100.0), 5.0, planet()).unwrap();
        let proj = Mat4::perspective_rh(1.2, 1.0, 0.5, 5000.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let frustum = Frustum::from_view_projection(&(proj * view));

        let now = Instant::now();
        let all = index.query_visible(Vec3::ZERO, 1.0, None, now);
        let seen = index.query_visible(Vec3::ZERO, 1.0, Some(&frustum), now);
        assert_eq!(all.len(), 2);
        assert_eq!(seen.len(), 1);
        assert!(seen.contains(&EntityId::new("front")));
    }

    #[test]
    fn cache_serves_repeats_and_never_serves_stale_results() {
        let mut index = SpatialIndex::default();
        index.add_entity("a".into(), Vec3::new(100.0, 0.0, 0.0), 1.0, planet()).unwrap();
        let now = Instant::now();

        let first = index.query_visible(Vec3::ZERO, 1.0, None, now);
        let again = index.query_visible(Vec3::new(1.0, 1.0, 1.0), 1.0, None, now);
        assert_eq!(first, again);
        assert_eq!(index.partition_info().cache_hits, 1);

        index.add_entity("b".into(), Vec3::new(200.0, 0.0, 0.0), 1.0, planet()).unwrap();
        let after_add = index.query_visible(Vec3::ZERO, 1.0, None, now);
        assert!(after_add.contains(&EntityId::new("b")));

        index.update_entity(&"b".into(), Vec3::new(90_000.0, 0.0, 0.0), None);
        let after_move = index.query_visible(Vec3::ZERO, 1.0, None, now);
        assert!(!after_move.contains(&EntityId::new("b")));

        index.remove_entity(&"a".into());
        assert!(index.query_visible(Vec3::ZERO, 1.0, None, now).is_empty());
    }

    #[test]
    fn query_radius_sorts_and_filters() {
        let mut index = SpatialIndex::default();
        index.add_entity("far".into(), Vec3::new(300.0, 0.0, 0.0), 1.0, planet()).unwrap();
        index.add_entity("near".into(), Vec3::new(10.0, 0.0, 0.0), 1.0, planet()).unwrap();
        index
            .add_entity("star".into(), Vec3::new(50.0, 0.0, 0.0), 1.0, EntityMeta::new(EntityKind::Star))
            .unwrap();
        index.add_entity("out".into(), Vec3::new(1000.0, 0.0, 0.0), 1.0, planet()).unwrap();

        let hits = index.query_radius(Vec3::ZERO, 300.0, None);
        let ids: Vec<&str> = hits.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["near", "star", "far"]);

        let stars = index.query_radius(Vec3::ZERO, 300.0, Some(&EntityKind::Star));
        assert_eq!(stars.len(), 1);
        assert_eq!(stars[0].distance, 50.0);
    }

    #[test]
    fn query_radius_matches_brute_force() {
        const KINDS: [EntityKind; 3] = [EntityKind::Planet, EntityKind::Star, EntityKind::Moon];
        let mut rng = Rng(11);
        let mut index = SpatialIndex::default();
        for i in 0..2000 {
            let kind = KINDS[(rng.next() % 3) as usize];
            index
                .add_entity(
                    EntityId::new(format!("e{i}")),
                    rng.point(1000.0),
                    rng.range(0.0, 30.0),
                    EntityMeta::new(kind),
                )
                .unwrap();
        }

        // 60 and 150 walk the cube; 900 and 2500 walk the occupied cells.
        for radius in [60.0_f32, 150.0, 900.0, 2500.0] {
            for _ in 0..8 {
                let center = rng.point(1000.0);
                for kind in [None, Some(EntityKind::Star)] {
                    let hits = index.query_radius(center, radius, kind.as_ref());
                    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

                    let got: BTreeSet<EntityId> = hits.iter().map(|n| n.id.clone()).collect();
                    assert_eq!(got.len(), hits.len());
                    let expected: BTreeSet<EntityId> = index
                        .iter()
                        .filter(|r| kind.is_none_or(|k| r.meta.kind == k))
                        .filter(|r| center.distance(r.position) <= radius + r.radius)
                        .map(|r| r.id.clone())
                        .collect();
                    assert_eq!(got, expected, "radius {radius} kind {kind:?}");
                    for n in &hits {
                        let record = index.get(&n.id).unwrap();
                        assert_eq!(n.distance, center.distance(record.position));
                    }
                }
            }
        }
    }

    #[test]
    fn large_radius_is_found_from_a_distant_cell() {
        let mut index = SpatialIndex::default();
        index.add_entity("giant".into(), Vec3::new(1000.0, 0.0, 0.0), 900.0, planet()).unwrap();
        let hits = index.query_radius(Vec3::ZERO, 150.0, None);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn collisions_report_penetration() {
        let mut index = SpatialIndex::default();
        index.add_entity("a".into(), Vec3::ZERO, 10.0, planet()).unwrap();
        index.add_entity("b".into(), Vec3::new(15.0, 0.0, 0.0), 10.0, planet()).unwrap();
        index.add_entity("c".into(), Vec3::new(30.0, 0.0, 0.0), 5.0, planet()).unwrap();

        let hits = index.check_collisions(&"a".into(), 1.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].other, EntityId::new("b"));
        assert_eq!(hits[0].penetration, 5.0);

        let wide = index.check_collisions(&"a".into(), 3.0);
        assert_eq!(wide.len(), 2);
        assert_eq!(wide[1].other, EntityId::new("c"));
    }

    #[test]
    fn overfull_cells_are_counted() {
        let mut index = SpatialIndex::new(SpatialConfig {
            cell_capacity_warning: 3,
            ..SpatialConfig::default()
        });
        for i in 0..5 {
            index
                .add_entity(EntityId::new(format!("e{i}")), Vec3::splat(i as f32), 1.0, planet())
                .unwrap();
        }
        assert_eq!(index.partition_info().overfull_cells, 1);
        index.remove_entity(&"e0".into());
        index.remove_entity(&"e1".into());
        let info = index.partition_info();
        assert_eq!(info.overfull_cells, 0);
        assert_eq!(info.max_cell_population, 3);
    }

    #[test]
    fn clear_resets_everything() {
        let mut index = SpatialIndex::default();
        index.add_entity("a".into(), Vec3::ZERO, 50.0, planet()).unwrap();
        index.clear();
        let info = index.partition_info();
        assert_eq!((info.entity_count, info.cell_count), (0, 0));
        assert_eq!(info.max_entity_radius, 0.0);
    }
}
