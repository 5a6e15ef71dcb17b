use galaxy_common::{EntityId, EntityKind};
use galaxy_pool::{
    Fidelity, GeometryParams, PoolConfig, ResourceHandle, ResourceKind, ResourcePool,
    ResourceRequest,
};
use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::drawable::{Drawable, DrawableSet, RenderFlags};
use crate::tier::{DetailTier, Quality, TierTable};

/// Importance values are clamped into `[MIN_IMPORTANCE, 1.0]`.
pub const MIN_IMPORTANCE: f32 = 0.01;

/// Selector tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Per-kind tables. Kinds without an entry use `default_table`.
    pub tables: BTreeMap<EntityKind, TierTable>,
    pub default_table: TierTable,
    pub quality: Quality,
    /// Zoom levels below this are treated as this.
    pub zoom_epsilon: f32,
    /// Soft wall-clock budget for one batch update. Zero disables the check.
    #[serde(with = "galaxy_common::millis")]
    pub frame_budget: Duration,
    pub max_updates_per_frame: usize,
    /// Least detailed tier that still casts shadows.
    pub shadow_max_tier: DetailTier,
    /// Sphere segment count at `Ultra` and `Quality::Medium`.
    pub base_segments: u32,
}

impl LodConfig {
    pub const DEFAULT_DWELL: Duration = Duration::from_millis(500);

    pub fn table_for(&self, kind: EntityKind) -> &TierTable {
        self.tables.get(&kind).unwrap_or(&self.default_table)
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        let dwell = Self::DEFAULT_DWELL;
        Self {
            tables: [EntityKind::Star, EntityKind::Nebula, EntityKind::Asteroid]
                .into_iter()
                .map(|kind| (kind, TierTable::for_kind(kind, dwell)))
                .collect(),
            default_table: TierTable::default_table(dwell),
            quality: Quality::Medium,
            zoom_epsilon: 0.01,
            frame_budget: Duration::from_millis(4),
            max_updates_per_frame: 500,
            shadow_max_tier: DetailTier::High,
            base_segments: 64,
        }
    }
}

/// Per-entity selector state.
#[derive(Debug, Clone)]
pub struct LodRecord {
    pub kind: EntityKind,
    pub current_tier: Option<DetailTier>,
    pub last_tier_change: Option<Instant>,
    pub importance: f32,
    /// What was last written to the drawable.
    pub applied: Option<(DetailTier, Quality)>,
    /// The real material while the debug overlay occupies the drawable.
    pub debug_original: Option<ResourceHandle>,
    /// Batch pass that last evaluated this entity; zero before the first.
    pub last_pass: u64,
}

impl LodRecord {
    fn new(kind: EntityKind, importance: f32) -> Self {
        Self {
            kind,
            current_tier: None,
            last_tier_change: None,
            importance,
            applied: None,
            debug_original: None,
            last_pass: 0,
        }
    }
}

/// Outcome of one `update_for_entities` pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LodUpdateReport {
    pub candidates: usize,
    pub evaluated: usize,
    /// Entities whose drawable received new resources.
    pub applied: usize,
    pub tier_changes: usize,
    /// Candidates left for a later frame by the update cap or time budget.
    pub deferred: usize,
    pub unregistered: usize,
    pub missing_drawables: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LodStats {
    pub registered: usize,
    pub tier_distribution: BTreeMap<DetailTier, usize>,
    pub unset: usize,
    pub tier_changes: u64,
    pub evaluations: u64,
    pub held_by_hysteresis: u64,
    pub deferred_last_update: usize,
    pub deferred_total: u64,
    pub fallbacks: u64,
    pub quality: Quality,
    pub debug_colors: bool,
}

#[derive(Default)]
struct Counters {
    tier_changes: u64,
    evaluations: u64,
    held: u64,
    deferred_last: usize,
    deferred_total: u64,
    fallbacks: u64,
}

/// Chooses a detail tier per entity and keeps each drawable's resources in
/// step with it.
///
/// Tier selection scales distance by importance and zoom, picks the first
/// rule whose threshold covers it, then holds the current tier until its
/// dwell time has passed. Resources come from the owned [`ResourcePool`];
/// replaced handles go back through [`ResourcePool::release`].
pub struct LodSelector {
    config: LodConfig,
    pool: ResourcePool,
    records: FxHashMap<EntityId, LodRecord>,
    debug_colors: bool,
    pass: u64,
    counters: Counters,
}

impl LodSelector {
    pub fn new(config: LodConfig, pool: ResourcePool) -> Self {
        Self {
            config,
            pool,
            records: FxHashMap::default(),
            debug_colors: false,
            pass: 0,
            counters: Counters::default(),
        }
    }

    /// Build the selector together with a pool that preloads the resources
    /// of every `(kind, tier)` at the configured quality.
    pub fn with_pool_config(config: LodConfig, pool_config: PoolConfig) -> Self {
        let preload = preload_requests(&config);
        let pool = ResourcePool::with_preload(pool_config, preload);
        Self::new(config, pool)
    }

    pub fn config(&self) -> &LodConfig {
        &self.config
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ResourcePool {
        &mut self.pool
    }

    /// Track an entity. Re-registering keeps its tier state and updates
    /// kind and importance.
    pub fn register(&mut self, id: EntityId, kind: EntityKind, importance: f32) {
        let importance = clamp_importance(importance);
        match self.records.get_mut(&id) {
            Some(record) => {
                tracing::debug!(%id, "entity re-registered");
                record.kind = kind;
                record.importance = importance;
                record.applied = None;
            }
            None => {
                self.records.insert(id, LodRecord::new(kind, importance));
            }
        }
    }

    /// Stop tracking an entity, restoring any debug override and handing the
    /// drawable's resources back to the pool.
    pub fn unregister(&mut self, id: &EntityId, drawables: &mut dyn DrawableSet) -> Option<LodRecord> {
        let Some(mut record) = self.records.remove(id) else {
            tracing::warn!(%id, "unregister on unknown id");
            return None;
        };
        let original = record.debug_original.take();
        match drawables.drawable_mut(id) {
            Some(drawable) => {
                if let Some(original) = original {
                    if let Some(overlay) = drawable.set_material(original) {
                        self.pool.release(overlay);
                    }
                }
                if let Some(geometry) = drawable.take_geometry() {
                    self.pool.release(geometry);
                }
                if let Some(material) = drawable.take_material() {
                    self.pool.release(material);
                }
            }
            None => {
                if let Some(original) = original {
                    self.pool.release(original);
                }
            }
        }
        record.applied = None;
        Some(record)
    }

    pub fn is_registered(&self, id: &EntityId) -> bool {
        self.records.contains_key(id)
    }

    pub fn record(&self, id: &EntityId) -> Option<&LodRecord> {
        self.records.get(id)
    }

    pub fn current_tier(&self, id: &EntityId) -> Option<DetailTier> {
        self.records.get(id).and_then(|r| r.current_tier)
    }

    pub fn set_importance(&mut self, id: &EntityId, importance: f32) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.importance = clamp_importance(importance);
                true
            }
            None => {
                tracing::warn!(%id, "set_importance on unknown id");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn quality(&self) -> Quality {
        self.config.quality
    }

    /// Change the quality preset. Drawables pick up resources for the new
    /// quality the next time they are applied.
    pub fn set_quality(&mut self, quality: Quality) {
        if quality != self.config.quality {
            tracing::debug!(from = %self.config.quality, to = %quality, "quality changed");
            self.config.quality = quality;
        }
    }

    /// Run the tier state machine for one entity and return its tier.
    pub fn select_tier(
        &mut self,
        id: &EntityId,
        distance: f32,
        zoom: f32,
        now: Instant,
    ) -> Option<DetailTier> {
        let Some(record) = self.records.get_mut(id) else {
            tracing::warn!(%id, "select_tier on unknown id");
            return None;
        };
        self.counters.evaluations += 1;

        let table = self.config.table_for(record.kind);
        let effective = distance / (record.importance * zoom.max(self.config.zoom_epsilon));
        let target = table.select(effective, self.config.quality.distance_scale()).tier;

        let Some(current) = record.current_tier else {
            record.current_tier = Some(target);
            record.last_tier_change = Some(now);
            self.counters.tier_changes += 1;
            tracing::trace!(%id, tier = %target, effective, "initial tier");
            return Some(target);
        };
        if current == target {
            return Some(current);
        }

        let dwell = table.dwell(current);
        let settled = record
            .last_tier_change
            .is_none_or(|t| now.saturating_duration_since(t) >= dwell);
        if !settled {
            self.counters.held += 1;
            return Some(current);
        }

        record.current_tier = Some(target);
        record.last_tier_change = Some(now);
        self.counters.tier_changes += 1;
        tracing::debug!(%id, from = %current, to = %target, effective, "tier changed");
        Some(target)
    }

    /// Install the resources for `tier` on `drawable`. Returns `true` when
    /// anything was swapped.
    pub fn apply_tier(
        &mut self,
        id: &EntityId,
        drawable: &mut dyn Drawable,
        tier: DetailTier,
        distance: f32,
    ) -> bool {
        let quality = self.config.quality;
        let Some(record) = self.records.get_mut(id) else {
            tracing::warn!(%id, "apply_tier on unknown id");
            return false;
        };
        if record.applied == Some((tier, quality)) {
            return false;
        }

        let (geometry_req, material_req) =
            tier_requests(record.kind, tier, quality, self.config.base_segments);
        let mut swapped = false;

        let geometry_key = geometry_req.canonical_key();
        if drawable.geometry().map(ResourceHandle::key) != Some(&geometry_key) {
            let handle = self.pool.get(&geometry_req);
            if ResourcePool::is_fallback(&handle) {
                self.counters.fallbacks += 1;
            }
            if let Some(previous) = drawable.set_geometry(handle) {
                self.pool.release(previous);
            }
            swapped = true;
        }

        let material = self.pool.get(&material_req);
        if ResourcePool::is_fallback(&material) {
            self.counters.fallbacks += 1;
        }
        let fidelity = material
            .material()
            .map(|m| m.fidelity)
            .unwrap_or(Fidelity::Unlit);
        if self.debug_colors {
            // The overlay stays on the drawable; the real material waits in
            // the record.
            if let Some(previous) = record.debug_original.replace(material) {
                self.pool.release(previous);
            }
            let overlay = self.pool.get(&debug_request(tier));
            if let Some(previous) = drawable.set_material(overlay) {
                self.pool.release(previous);
            }
            swapped = true;
        } else {
            // Left behind when the overlay was removed without a drawable.
            if let Some(stale) = record.debug_original.take() {
                self.pool.release(stale);
            }
            if drawable.material().map(ResourceHandle::key) != Some(material.key()) {
                if let Some(previous) = drawable.set_material(material) {
                    self.pool.release(previous);
                }
                swapped = true;
            }
        }

        drawable.set_render_flags(RenderFlags::for_tier(
            tier,
            self.config.shadow_max_tier,
            fidelity,
        ));
        record.applied = Some((tier, quality));
        tracing::trace!(%id, %tier, distance, swapped, "tier applied");
        swapped
    }

    /// Select and apply tiers for `candidates` until the update cap or the
    /// frame budget runs out. Entities not reached keep their previous tier.
    ///
    /// Candidates evaluated least recently go first, nearest first among
    /// equals, so whatever one pass defers leads the next one. Every visible
    /// entity is reached within `ceil(visible / max_updates_per_frame)`
    /// passes.
    pub fn update_for_entities(
        &mut self,
        candidates: &[(EntityId, Vec3)],
        viewpoint: Vec3,
        zoom: f32,
        drawables: &mut dyn DrawableSet,
        now: Instant,
    ) -> LodUpdateReport {
        let _span = tracing::info_span!("lod_update", candidates = candidates.len()).entered();
        let started = Instant::now();
        let mut report = LodUpdateReport {
            candidates: candidates.len(),
            ..LodUpdateReport::default()
        };

        self.pass += 1;
        let pass = self.pass;
        let records = &self.records;
        let mut ordered: Vec<(&EntityId, f32, u64)> = candidates
            .iter()
            .filter_map(|(id, position)| match records.get(id) {
                Some(record) => Some((id, viewpoint.distance(*position), record.last_pass)),
                None => {
                    report.unregistered += 1;
                    None
                }
            })
            .collect();
        ordered.sort_by(|a, b| {
            a.2.cmp(&b.2)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.0.cmp(b.0))
        });

        let budget = self.config.frame_budget;
        for (index, (id, distance, _)) in ordered.iter().enumerate() {
            let over_budget = !budget.is_zero() && index > 0 && started.elapsed() >= budget;
            if report.evaluated >= self.config.max_updates_per_frame || over_budget {
                report.deferred = ordered.len() - index;
                break;
            }
            report.evaluated += 1;
            if let Some(record) = self.records.get_mut(*id) {
                record.last_pass = pass;
            }

            let before = self.current_tier(id);
            let Some(tier) = self.select_tier(id, *distance, zoom, now) else {
                continue;
            };
            if before.is_some() && before != Some(tier) {
                report.tier_changes += 1;
            }
            let Some(drawable) = drawables.drawable_mut(id) else {
                report.missing_drawables += 1;
                continue;
            };
            if self.apply_tier(id, drawable, tier, *distance) {
                report.applied += 1;
            }
        }

        self.counters.deferred_last = report.deferred;
        self.counters.deferred_total += report.deferred as u64;
        report.elapsed = started.elapsed();
        if report.deferred > 0 {
            tracing::debug!(deferred = report.deferred, evaluated = report.evaluated, "lod update deferred work");
        }
        report
    }

    pub fn debug_colors(&self) -> bool {
        self.debug_colors
    }

    /// Overlay (or remove) per-tier debug materials on every registered
    /// drawable. Disabling restores exactly the handle that was displaced.
    pub fn set_debug_colors(&mut self, enabled: bool, drawables: &mut dyn DrawableSet) {
        if enabled == self.debug_colors {
            return;
        }
        self.debug_colors = enabled;
        let Self { records, pool, .. } = self;
        let mut touched = 0usize;
        for (id, record) in records.iter_mut() {
            let Some(drawable) = drawables.drawable_mut(id) else {
                // Nothing to restore onto; the held original goes back.
                if !enabled {
                    if let Some(original) = record.debug_original.take() {
                        pool.release(original);
                    }
                }
                continue;
            };
            if enabled {
                let Some(tier) = record.applied.map(|(tier, _)| tier) else {
                    continue;
                };
                if record.debug_original.is_some() {
                    continue;
                }
                let overlay = pool.get(&debug_request(tier));
                record.debug_original = drawable.set_material(overlay);
                touched += 1;
            } else if let Some(original) = record.debug_original.take() {
                if let Some(overlay) = drawable.set_material(original) {
                    pool.release(overlay);
                }
                touched += 1;
            }
        }
        tracing::debug!(enabled, touched, "debug colours toggled");
    }

    pub fn lod_stats(&self) -> LodStats {
        let mut tier_distribution = BTreeMap::new();
        let mut unset = 0;
        for record in self.records.values() {
            match record.current_tier {
                Some(tier) => *tier_distribution.entry(tier).or_insert(0) += 1,
                None => unset += 1,
            }
        }
        LodStats {
            registered: self.records.len(),
            tier_distribution,
            unset,
            tier_changes: self.counters.tier_changes,
            evaluations: self.counters.evaluations,
            held_by_hysteresis: self.counters.held,
            deferred_last_update: self.counters.deferred_last,
            deferred_total: self.counters.deferred_total,
            fallbacks: self.counters.fallbacks,
            quality: self.config.quality,
            debug_colors: self.debug_colors,
        }
    }
}

fn clamp_importance(importance: f32) -> f32 {
    if importance.is_nan() {
        return 1.0;
    }
    importance.clamp(MIN_IMPORTANCE, 1.0)
}

/// Geometry and material requests for an entity kind at a tier and quality.
pub fn tier_requests(
    kind: EntityKind,
    tier: DetailTier,
    quality: Quality,
    base_segments: u32,
) -> (ResourceRequest, ResourceRequest) {
    let segments = ((base_segments / tier.segment_divisor()) as f32 * quality.geometry_scale())
        .round() as u32;
    let geometry_kind = match (tier, kind) {
        (DetailTier::Minimal, _) | (_, EntityKind::Nebula) => ResourceKind::Billboard,
        (_, EntityKind::Asteroid) => ResourceKind::Box,
        _ => ResourceKind::Sphere,
    };
    let detail = match geometry_kind {
        ResourceKind::Box => (segments / 8).max(1),
        ResourceKind::Billboard => 1,
        _ => segments.max(3),
    };
    let geometry = ResourceRequest::new(geometry_kind)
        .geometry(GeometryParams::new(1.0, detail))
        .option("tier", tier.as_str())
        .option("quality", quality.as_str());

    let material_kind = match tier {
        DetailTier::Ultra | DetailTier::High => ResourceKind::StandardMaterial,
        DetailTier::Medium | DetailTier::Low => ResourceKind::LambertMaterial,
        DetailTier::Minimal => ResourceKind::SpriteMaterial,
    };
    let mut material = ResourceRequest::new(material_kind)
        .color(kind.base_color())
        .option("tier", tier.as_str())
        .option("quality", quality.as_str());
    if matches!(kind, EntityKind::Star | EntityKind::Comet) {
        material = material.option("emissive", 1.0_f64);
    }
    (geometry, material)
}

fn debug_request(tier: DetailTier) -> ResourceRequest {
    ResourceRequest::new(ResourceKind::BasicMaterial)
        .color(tier.debug_color())
        .option("debug", true)
}

fn preload_requests(config: &LodConfig) -> Vec<ResourceRequest> {
    let mut requests = Vec::new();
    for kind in EntityKind::ALL {
        for rule in config.table_for(kind).rules() {
            let (geometry, material) =
                tier_requests(kind, rule.tier, config.quality, config.base_segments);
            requests.push(geometry);
            requests.push(material);
        }
    }
    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawable::SceneDrawable;
    use crate::tier::TierRule;
    use galaxy_pool::PreloadMode;
    use std::collections::HashMap;

    const DWELL: Duration = Duration::from_millis(500);

    fn pool() -> ResourcePool {
        ResourcePool::new(PoolConfig {
            preload: PreloadMode::Disabled,
            ..PoolConfig::default()
        })
    }

    fn planet_config() -> LodConfig {
        let table = TierTable::new(vec![
            TierRule::new(DetailTier::Ultra, 100.0, DWELL),
            TierRule::new(DetailTier::High, 300.0, DWELL),
            TierRule::new(DetailTier::Medium, 600.0, DWELL),
        ])
        .unwrap();
        LodConfig {
            tables: BTreeMap::from([(EntityKind::Planet, table)]),
            frame_budget: Duration::ZERO,
            ..LodConfig::default()
        }
    }

    fn scene(ids: &[&str]) -> HashMap<EntityId, SceneDrawable> {
        ids.iter()
            .map(|id| (EntityId::new(*id), SceneDrawable::new()))
            .collect()
    }

    #[test]
    fn planet_scenario() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let id = EntityId::new("planet-1");
        lod.register(id.clone(), EntityKind::Planet, 0.8);
        let t0 = Instant::now();

        assert_eq!(lod.select_tier(&id, 50.0, 1.0, t0), Some(DetailTier::Ultra));
        // Effective 450 inside the dwell window holds ultra.
        assert_eq!(
            lod.select_tier(&id, 360.0, 1.0, t0 + Duration::from_millis(100)),
            Some(DetailTier::Ultra)
        );
        assert_eq!(
            lod.select_tier(&id, 360.0, 1.0, t0 + DWELL),
            Some(DetailTier::Medium)
        );
        assert_eq!(lod.lod_stats().held_by_hysteresis, 1);
    }

    #[test]
    fn inclusive_boundary_through_selector() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let id = EntityId::new("p");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        assert_eq!(lod.select_tier(&id, 300.0, 1.0, Instant::now()), Some(DetailTier::High));
    }

    #[test]
    fn zoom_shrinks_effective_distance() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let id = EntityId::new("p");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        assert_eq!(lod.select_tier(&id, 400.0, 4.0, Instant::now()), Some(DetailTier::Ultra));
    }

    #[test]
    fn hysteresis_limits_changes_per_dwell_window() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let id = EntityId::new("flicker");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        let t0 = Instant::now();

        let mut changes = 0;
        let mut last = None;
        for step in 0..200u64 {
            let distance = if step % 2 == 0 { 50.0 } else { 500.0 };
            let tier = lod.select_tier(&id, distance, 1.0, t0 + Duration::from_millis(step * 10));
            if last.is_some() && tier != last {
                changes += 1;
            }
            last = tier;
        }
        // 2 seconds of input at a 500ms dwell.
        assert!(changes <= 4, "{changes} changes");
        assert!(changes >= 1);
    }

    #[test]
    fn hysteresis_holds_a_receding_entity_for_each_dwell() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let id = EntityId::new("receding");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        let t0 = Instant::now();

        let mut change_times = Vec::new();
        let mut last = None;
        for step in 0..200u64 {
            let at = Duration::from_millis(step * 10);
            let tier = lod.select_tier(&id, step as f32 * 5.0, 1.0, t0 + at);
            if last.is_some() && tier != last {
                change_times.push(at);
            }
            last = tier;
        }
        // Ultra -> High at 500ms, High -> Medium at 1000ms.
        assert_eq!(change_times, vec![DWELL, DWELL * 2]);
        assert!(change_times.windows(2).all(|w| w[1] - w[0] >= DWELL));
    }

    #[test]
    fn unknown_entity_yields_none() {
        let mut lod = LodSelector::new(LodConfig::default(), pool());
        assert_eq!(lod.select_tier(&"ghost".into(), 1.0, 1.0, Instant::now()), None);
    }

    #[test]
    fn importance_is_clamped() {
        let mut lod = LodSelector::new(LodConfig::default(), pool());
        lod.register("a".into(), EntityKind::Moon, 5.0);
        lod.register("b".into(), EntityKind::Moon, -1.0);
        assert_eq!(lod.record(&"a".into()).unwrap().importance, 1.0);
        assert_eq!(lod.record(&"b".into()).unwrap().importance, MIN_IMPORTANCE);
    }

    #[test]
    fn apply_shares_resources_and_sets_flags() {
        let mut lod = LodSelector::new(LodConfig::default(), pool());
        let mut drawables = scene(&["a", "b"]);
        let now = Instant::now();
        for id in ["a", "b"] {
            lod.register(id.into(), EntityKind::Planet, 1.0);
        }
        let candidates = vec![
            (EntityId::new("a"), Vec3::new(10.0, 0.0, 0.0)),
            (EntityId::new("b"), Vec3::new(0.0, 20.0, 0.0)),
        ];
        let report = lod.update_for_entities(&candidates, Vec3::ZERO, 1.0, &mut drawables, now);
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.applied, 2);

        let a = &drawables[&EntityId::new("a")];
        let b = &drawables[&EntityId::new("b")];
        assert!(a.geometry().unwrap().shares_backing_with(b.geometry().unwrap()));
        assert!(a.material().unwrap().shares_backing_with(b.material().unwrap()));
        assert!(a.render_flags().casts_shadow);
        assert_eq!(a.render_flags().fidelity, Fidelity::Full);

        // A second pass with nothing changed swaps nothing.
        let again = lod.update_for_entities(&candidates, Vec3::ZERO, 1.0, &mut drawables, now);
        assert_eq!(again.applied, 0);
    }

    #[test]
    fn tier_change_releases_previous_resources() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let mut drawables = scene(&["p"]);
        let id = EntityId::new("p");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        let t0 = Instant::now();

        lod.update_for_entities(&[(id.clone(), Vec3::new(10.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, t0);
        let first = drawables[&id].geometry().unwrap().clone();
        lod.pool_mut().advance_clock(t0 + DWELL);
        lod.update_for_entities(&[(id.clone(), Vec3::new(500.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, t0 + DWELL);

        assert_eq!(lod.current_tier(&id), Some(DetailTier::Medium));
        assert!(!drawables[&id].geometry().unwrap().shares_backing_with(&first));
        assert_eq!(lod.pool().stats().reclaim_queued, 2);
        assert!(!drawables[&id].render_flags().casts_shadow);
    }

    #[test]
    fn batch_budget_defers_farthest() {
        let config = LodConfig {
            max_updates_per_frame: 4,
            frame_budget: Duration::ZERO,
            ..LodConfig::default()
        };
        let mut lod = LodSelector::new(config, pool());
        let ids: Vec<String> = (0..10).map(|i| format!("e{i}")).collect();
        let names: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut drawables = scene(&names);
        let candidates: Vec<(EntityId, Vec3)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (EntityId::new(id.as_str()), Vec3::new(1000.0 - i as f32 * 100.0, 0.0, 0.0)))
            .collect();
        for (id, _) in &candidates {
            lod.register(id.clone(), EntityKind::Planet, 1.0);
        }

        let report = lod.update_for_entities(&candidates, Vec3::ZERO, 1.0, &mut drawables, Instant::now());
        assert_eq!(report.evaluated, 4);
        assert_eq!(report.deferred, 6);
        // e9..e6 are nearest.
        for i in 6..10 {
            assert!(lod.current_tier(&EntityId::new(format!("e{i}"))).is_some());
        }
        for i in 0..6 {
            assert!(lod.current_tier(&EntityId::new(format!("e{i}"))).is_none());
            assert!(drawables[&EntityId::new(format!("e{i}"))].geometry().is_none());
        }
        assert_eq!(lod.lod_stats().deferred_last_update, 6);
    }

    #[test]
    fn deferred_entities_lead_the_next_pass() {
        let config = LodConfig {
            max_updates_per_frame: 4,
            frame_budget: Duration::ZERO,
            ..LodConfig::default()
        };
        let mut lod = LodSelector::new(config, pool());
        let ids: Vec<String> = (0..10).map(|i| format!("e{i}")).collect();
        let names: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut drawables = scene(&names);
        let candidates: Vec<(EntityId, Vec3)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (EntityId::new(id.as_str()), Vec3::new(1000.0 - i as f32 * 100.0, 0.0, 0.0)))
            .collect();
        for (id, _) in &candidates {
            lod.register(id.clone(), EntityKind::Planet, 1.0);
        }
        let now = Instant::now();

        lod.update_for_entities(&candidates, Vec3::ZERO, 1.0, &mut drawables, now);
        let second = lod.update_for_entities(&candidates, Vec3::ZERO, 1.0, &mut drawables, now);
        assert_eq!(second.evaluated, 4);
        // e5..e2 were skipped by the first pass and come before e9..e6.
        for i in 2..6 {
            assert!(lod.current_tier(&EntityId::new(format!("e{i}"))).is_some());
        }
        assert!(lod.current_tier(&EntityId::new("e1")).is_none());

        lod.update_for_entities(&candidates, Vec3::ZERO, 1.0, &mut drawables, now);
        assert!(drawables.values().all(|d| d.geometry().is_some() && d.material().is_some()));
        assert_eq!(lod.lod_stats().unset, 0);
    }

    #[test]
    fn disabling_debug_without_drawable_releases_original() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let mut drawables = scene(&["p"]);
        let id = EntityId::new("p");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        let t0 = Instant::now();
        lod.pool_mut().advance_clock(t0);
        lod.update_for_entities(&[(id.clone(), Vec3::new(10.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, t0);

        lod.set_debug_colors(true, &mut drawables);
        let ultra = lod.record(&id).unwrap().debug_original.as_ref().unwrap().key().clone();
        let mut absent: HashMap<EntityId, SceneDrawable> = HashMap::new();
        lod.set_debug_colors(false, &mut absent);
        assert!(lod.record(&id).unwrap().debug_original.is_none());
        assert_eq!(lod.pool().live_handles(&ultra), Some(0));

        // The overlay still on the drawable is replaced by the next real tier.
        lod.pool_mut().advance_clock(t0 + DWELL);
        lod.update_for_entities(&[(id.clone(), Vec3::new(500.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, t0 + DWELL);
        let shown = drawables[&id].material().unwrap().material().unwrap().kind;
        assert_eq!(shown, ResourceKind::LambertMaterial);

        lod.pool_mut().advance_clock(t0 + Duration::from_secs(120));
        lod.pool_mut().process_reclamation();
        lod.pool_mut().cleanup_unused(false);
        assert!(!lod.pool().contains(&ultra));
    }

    #[test]
    fn stale_debug_slot_is_released_on_next_apply() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let mut drawables = scene(&["p"]);
        let id = EntityId::new("p");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        let t0 = Instant::now();
        lod.update_for_entities(&[(id.clone(), Vec3::new(10.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, t0);
        lod.set_debug_colors(true, &mut drawables);
        let ultra = lod.record(&id).unwrap().debug_original.as_ref().unwrap().key().clone();

        // Overlay switched off by hand, leaving the slot filled.
        lod.debug_colors = false;
        lod.update_for_entities(&[(id.clone(), Vec3::new(500.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, t0 + DWELL);
        assert!(lod.record(&id).unwrap().debug_original.is_none());
        assert_eq!(lod.pool().live_handles(&ultra), Some(0));
    }

    #[test]
    fn debug_overlay_is_reversible() {
        let mut lod = LodSelector::new(LodConfig::default(), pool());
        let mut drawables = scene(&["a"]);
        let id = EntityId::new("a");
        lod.register(id.clone(), EntityKind::Comet, 1.0);
        lod.update_for_entities(&[(id.clone(), Vec3::new(50.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, Instant::now());

        let original = drawables[&id].material().unwrap().clone();
        lod.set_debug_colors(true, &mut drawables);
        let overlay = drawables[&id].material().unwrap().clone();
        assert!(!overlay.shares_backing_with(&original));
        assert_eq!(
            overlay.material().unwrap().color,
            DetailTier::Ultra.debug_color()
        );
        assert!(lod.record(&id).unwrap().debug_original.is_some());

        lod.set_debug_colors(false, &mut drawables);
        assert_eq!(drawables[&id].material(), Some(&original));
        assert!(lod.record(&id).unwrap().debug_original.is_none());
    }

    #[test]
    fn debug_overlay_survives_tier_changes() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let mut drawables = scene(&["p"]);
        let id = EntityId::new("p");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        let t0 = Instant::now();
        lod.update_for_entities(&[(id.clone(), Vec3::new(10.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, t0);
        lod.set_debug_colors(true, &mut drawables);

        lod.update_for_entities(&[(id.clone(), Vec3::new(500.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, t0 + DWELL);
        let shown = drawables[&id].material().unwrap().material().unwrap().color;
        assert_eq!(shown, DetailTier::Medium.debug_color());

        lod.set_debug_colors(false, &mut drawables);
        let restored = drawables[&id].material().unwrap();
        assert_eq!(restored.material().unwrap().kind, ResourceKind::LambertMaterial);
    }

    #[test]
    fn construction_failure_falls_back() {
        let config = LodConfig {
            base_segments: 4096,
            ..LodConfig::default()
        };
        let mut lod = LodSelector::new(config, pool());
        let mut drawables = scene(&["a"]);
        let id = EntityId::new("a");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        lod.update_for_entities(&[(id.clone(), Vec3::new(10.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, Instant::now());

        let geometry = drawables[&id].geometry().unwrap();
        assert!(ResourcePool::is_fallback(geometry));
        assert_eq!(lod.lod_stats().fallbacks, 1);
    }

    #[test]
    fn quality_change_refetches_resources() {
        let mut lod = LodSelector::new(LodConfig::default(), pool());
        let mut drawables = scene(&["a"]);
        let id = EntityId::new("a");
        lod.register(id.clone(), EntityKind::Moon, 1.0);
        let candidates = [(id.clone(), Vec3::new(10.0, 0.0, 0.0))];
        let now = Instant::now();
        lod.update_for_entities(&candidates, Vec3::ZERO, 1.0, &mut drawables, now);
        let medium = drawables[&id].geometry().unwrap().clone();

        lod.set_quality(Quality::High);
        let report = lod.update_for_entities(&candidates, Vec3::ZERO, 1.0, &mut drawables, now);
        assert_eq!(report.applied, 1);
        let high = drawables[&id].geometry().unwrap();
        assert!(high.geometry().unwrap().triangle_count() > medium.geometry().unwrap().triangle_count());
    }

    #[test]
    fn unregister_strips_drawable() {
        let mut lod = LodSelector::new(LodConfig::default(), pool());
        let mut drawables = scene(&["a"]);
        let id = EntityId::new("a");
        lod.register(id.clone(), EntityKind::Star, 1.0);
        lod.update_for_entities(&[(id.clone(), Vec3::ZERO)], Vec3::ZERO, 1.0, &mut drawables, Instant::now());
        lod.set_debug_colors(true, &mut drawables);

        assert!(lod.unregister(&id, &mut drawables).is_some());
        assert!(drawables[&id].geometry().is_none());
        assert!(drawables[&id].material().is_none());
        assert!(lod.unregister(&id, &mut drawables).is_none());
        assert!(lod.pool().stats().reclaim_queued >= 3);
    }

    #[test]
    fn preloaded_pool_serves_hits() {
        let mut lod = LodSelector::with_pool_config(LodConfig::default(), PoolConfig::default());
        let mut drawables = scene(&["a"]);
        let id = EntityId::new("a");
        lod.register(id.clone(), EntityKind::Planet, 1.0);
        lod.update_for_entities(&[(id.clone(), Vec3::new(10.0, 0.0, 0.0))], Vec3::ZERO, 1.0, &mut drawables, Instant::now());
        let stats = lod.pool().stats();
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hits, 2);
    }

    #[test]
    fn stats_report_distribution() {
        let mut lod = LodSelector::new(planet_config(), pool());
        let now = Instant::now();
        lod.register("near".into(), EntityKind::Planet, 1.0);
        lod.register("far".into(), EntityKind::Planet, 1.0);
        lod.register("idle".into(), EntityKind::Planet, 1.0);
        lod.select_tier(&"near".into(), 10.0, 1.0, now);
        lod.select_tier(&"far".into(), 5000.0, 1.0, now);

        let stats = lod.lod_stats();
        assert_eq!(stats.registered, 3);
        assert_eq!(stats.unset, 1);
        assert_eq!(stats.tier_distribution.get(&DetailTier::Ultra), Some(&1));
        assert_eq!(stats.tier_distribution.get(&DetailTier::Medium), Some(&1));
    }

    #[test]
    fn config_deserializes_from_partial_json() {
        let config: LodConfig =
            serde_json::from_str(r#"{"quality":"high","max_updates_per_frame":10}"#).unwrap();
        assert_eq!(config.quality, Quality::High);
        assert_eq!(config.max_updates_per_frame, 10);
        assert_eq!(config.default_table, TierTable::default_table(LodConfig::DEFAULT_DWELL));
    }
}
