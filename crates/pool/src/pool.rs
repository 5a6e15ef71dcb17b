use galaxy_common::EntityKind;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use crate::error::PoolError;
use crate::geometry::Geometry;
use crate::handle::{ResourceHandle, SharedResource};
use crate::key::{
    GeometryParams, OptionValue, ResourceFamily, ResourceId, ResourceKey, ResourceKind,
    ResourceParams, ResourceRequest,
};
use crate::material::Material;
use crate::texture::{Texture, TextureDescriptor, TextureLoader, TextureState};
use std::sync::Arc;

const FALLBACK_GEOMETRY_KEY: &str = "fallback|geometry";
const FALLBACK_MATERIAL_KEY: &str = "fallback|material";

/// How the construction-time preload set is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadMode {
    /// Build everything inside the constructor.
    Eager,
    /// Build `preload_batch` requests per [`ResourcePool::preload_step`] call.
    Incremental,
    Disabled,
}

/// Pool tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Entries with no live handle and unused for this long are evicted by
    /// [`ResourcePool::cleanup_unused`].
    #[serde(with = "galaxy_common::millis")]
    pub stale_after: Duration,
    /// Delay between [`ResourcePool::release`] and the usage re-check.
    #[serde(with = "galaxy_common::millis")]
    pub reclaim_delay: Duration,
    pub preload: PreloadMode,
    pub preload_batch: usize,
    pub max_texture_dimension: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            reclaim_delay: Duration::from_millis(100),
            preload: PreloadMode::Eager,
            preload_batch: 4,
            max_texture_dimension: 2048,
        }
    }
}

/// Outcome of a reclamation or cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub disposed: usize,
    pub textures_disposed: usize,
    pub bytes_reclaimed: usize,
    /// Queued reclamations that were still in use when re-checked.
    pub skipped: usize,
}

impl CleanupReport {
    fn merge(&mut self, other: CleanupReport) {
        self.disposed += other.disposed;
        self.textures_disposed += other.textures_disposed;
        self.bytes_reclaimed += other.bytes_reclaimed;
        self.skipped += other.skipped;
    }
}

/// Read-only counters for diagnostics overlays.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// Cached entries, pinned fallbacks excluded.
    pub entry_count: usize,
    pub pinned_count: usize,
    pub texture_count: usize,
    pub pending_textures: usize,
    pub estimated_bytes: usize,
    pub disposed_total: u64,
    pub bytes_reclaimed_total: u64,
    pub reclaim_queued: usize,
    pub construction_failures: u64,
    pub preload_remaining: usize,
}

struct CacheEntry {
    id: ResourceId,
    resource: SharedResource,
    bytes: usize,
    last_used: Instant,
    pinned: bool,
}

impl CacheEntry {
    fn new(key: &ResourceKey, resource: SharedResource, now: Instant, pinned: bool) -> Self {
        Self {
            id: key.id(),
            bytes: resource.byte_size(),
            resource,
            last_used: now,
            pinned,
        }
    }

    fn handle(&self, key: &ResourceKey) -> ResourceHandle {
        ResourceHandle::new(key.clone(), self.id, self.resource.clone())
    }

    fn live_handles(&self) -> usize {
        self.resource.strong_count().saturating_sub(1)
    }
}

struct TextureEntry {
    state: TextureState,
    last_used: Instant,
}

struct ReclaimTicket {
    key: ResourceKey,
    queued_at: Instant,
    due: Instant,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    failures: u64,
    disposed: u64,
    bytes_reclaimed: u64,
}

/// Cache of shared geometry, materials and textures.
///
/// Equal canonical keys always resolve to the same backing `Arc`; per-instance
/// state lives on each [`ResourceHandle`]. Evicted entries are removed from
/// the cache, so a later request builds a fresh resource instead of receiving
/// a disposed one. Two pinned fallbacks (one geometry, one material) are
/// always present and never evicted.
pub struct ResourcePool {
    config: PoolConfig,
    entries: FxHashMap<ResourceKey, CacheEntry>,
    textures: FxHashMap<ResourceKey, TextureEntry>,
    pending_textures: VecDeque<(ResourceKey, String)>,
    reclaim_queue: VecDeque<ReclaimTicket>,
    preload_queue: VecDeque<ResourceRequest>,
    now: Instant,
    counters: Counters,
}

impl ResourcePool {
    /// Create a pool that preloads [`default_preload_set`].
    pub fn new(config: PoolConfig) -> Self {
        Self::with_preload(config, default_preload_set())
    }

    /// Create a pool with a caller-chosen preload set.
    pub fn with_preload(config: PoolConfig, preload: Vec<ResourceRequest>) -> Self {
        let mut pool = Self {
            config,
            entries: FxHashMap::default(),
            textures: FxHashMap::default(),
            pending_textures: VecDeque::new(),
            reclaim_queue: VecDeque::new(),
            preload_queue: VecDeque::new(),
            now: Instant::now(),
            counters: Counters::default(),
        };
        pool.install_fallbacks();
        match pool.config.preload {
            PreloadMode::Disabled => {}
            PreloadMode::Incremental => pool.preload_queue.extend(preload),
            PreloadMode::Eager => {
                pool.preload_queue.extend(preload);
                while pool.preload_step() > 0 {}
            }
        }
        tracing::debug!(
            entries = pool.entries.len(),
            queued = pool.preload_queue.len(),
            "resource pool created"
        );
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The pool's current time. Never moves backwards.
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn advance_clock(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Resolve a request, falling back to the pinned resource of the same
    /// family if construction fails.
    pub fn get(&mut self, request: &ResourceRequest) -> ResourceHandle {
        match self.try_get(request) {
            Ok(handle) => handle,
            Err(err) => {
                self.counters.failures += 1;
                tracing::warn!(%err, kind = %request.kind, "resource construction failed, using fallback");
                self.fallback(request.kind.family())
            }
        }
    }

    /// Resolve a request, reporting construction failures to the caller.
    pub fn try_get(&mut self, request: &ResourceRequest) -> Result<ResourceHandle, PoolError> {
        let key = request.canonical_key();
        if let Some(entry) = self.entries.get_mut(&key) {
            self.counters.hits += 1;
            entry.last_used = self.now;
            tracing::trace!(%key, "pool hit");
            return Ok(entry.handle(&key));
        }

        self.counters.misses += 1;
        let resource = self.construct(request)?;
        let entry = CacheEntry::new(&key, resource, self.now, false);
        tracing::debug!(%key, id = %entry.id, bytes = entry.bytes, "pool miss, resource built");
        let handle = entry.handle(&key);
        self.entries.insert(key, entry);
        Ok(handle)
    }

    /// Resolve a textured material. Procedural textures are generated now;
    /// external ones stay pending until [`ResourcePool::poll_textures`].
    pub fn get_or_create_textured(
        &mut self,
        kind: ResourceKind,
        texture: &TextureDescriptor,
        options: BTreeMap<String, OptionValue>,
    ) -> ResourceHandle {
        let request = ResourceRequest {
            kind,
            params: ResourceParams::None,
            texture: Some(texture.clone()),
            options,
        };
        self.get(&request)
    }

    /// The pinned built-in resource for `family`.
    pub fn fallback(&mut self, family: ResourceFamily) -> ResourceHandle {
        let (key, build): (_, fn() -> SharedResource) = match family {
            ResourceFamily::Geometry => (FALLBACK_GEOMETRY_KEY, || {
                SharedResource::Geometry(Arc::new(Geometry::fallback()))
            }),
            ResourceFamily::Material => (FALLBACK_MATERIAL_KEY, || {
                SharedResource::Material(Arc::new(Material::fallback()))
            }),
        };
        let key = ResourceKey::new(key);
        let now = self.now;
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(&key, build(), now, true));
        entry.last_used = now;
        entry.handle(&key)
    }

    pub fn is_fallback(handle: &ResourceHandle) -> bool {
        matches!(
            handle.key().as_str(),
            FALLBACK_GEOMETRY_KEY | FALLBACK_MATERIAL_KEY
        )
    }

    /// Mark an entry as used now without producing a handle.
    pub fn touch(&mut self, key: &ResourceKey) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = self.now;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Live handles for `key`, excluding the cache's own reference.
    pub fn live_handles(&self, key: &ResourceKey) -> Option<usize> {
        self.entries.get(key).map(CacheEntry::live_handles)
    }

    /// Unpinned entry count.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.pinned).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn texture_state(&self, key: &ResourceKey) -> Option<&TextureState> {
        self.textures.get(key).map(|t| &t.state)
    }

    /// Give a handle back. The entry is re-checked after `reclaim_delay` and
    /// disposed only if nothing picked it up again in between.
    pub fn release(&mut self, handle: ResourceHandle) {
        let key = handle.key().clone();
        drop(handle);
        if !self.entries.contains_key(&key) {
            return;
        }
        self.reclaim_queue.push_back(ReclaimTicket {
            key,
            queued_at: self.now,
            due: self.now + self.config.reclaim_delay,
        });
    }

    /// Drain reclamation tickets that have come due.
    pub fn process_reclamation(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        while self.reclaim_queue.front().is_some_and(|t| t.due <= self.now) {
            let Some(ticket) = self.reclaim_queue.pop_front() else {
                break;
            };
            let reclaimable = self.entries.get(&ticket.key).is_some_and(|e| {
                !e.pinned && e.live_handles() == 0 && e.last_used <= ticket.queued_at
            });
            if reclaimable {
                self.dispose_entry(&ticket.key, &mut report);
            } else {
                report.skipped += 1;
            }
        }
        if report.disposed > 0 {
            tracing::debug!(
                disposed = report.disposed,
                bytes = report.bytes_reclaimed,
                "deferred reclamation"
            );
        }
        report
    }

    /// Evict entries with no live handle that have gone unused for
    /// `stale_after`, or every unpinned entry when `force` is set.
    pub fn cleanup_unused(&mut self, force: bool) -> CleanupReport {
        let now = self.now;
        let stale_after = self.config.stale_after;
        let doomed: Vec<ResourceKey> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                !e.pinned
                    && (force
                        || (e.live_handles() == 0
                            && now.saturating_duration_since(e.last_used) >= stale_after))
            })
            .map(|(k, _)| k.clone())
            .collect();

        let mut report = CleanupReport::default();
        for key in &doomed {
            self.dispose_entry(key, &mut report);
        }
        report.merge(self.sweep_textures(force));
        if force {
            self.reclaim_queue.clear();
        }
        tracing::debug!(
            force,
            disposed = report.disposed,
            textures = report.textures_disposed,
            bytes = report.bytes_reclaimed,
            "pool cleanup"
        );
        report
    }

    /// Build up to `preload_batch` queued preload requests. Returns how many
    /// remain; the caller yields back to its frame loop between calls.
    pub fn preload_step(&mut self) -> usize {
        let batch = self.config.preload_batch.max(1);
        for _ in 0..batch {
            let Some(request) = self.preload_queue.pop_front() else {
                break;
            };
            let key = request.canonical_key();
            if self.entries.contains_key(&key) {
                continue;
            }
            match self.construct(&request) {
                Ok(resource) => {
                    let entry = CacheEntry::new(&key, resource, self.now, false);
                    self.entries.insert(key, entry);
                }
                Err(err) => {
                    self.counters.failures += 1;
                    tracing::warn!(%err, %key, "preload failed");
                }
            }
        }
        self.preload_queue.len()
    }

    pub fn preload_remaining(&self) -> usize {
        self.preload_queue.len()
    }

    /// Resolve up to `budget` pending external textures through `loader`.
    /// Returns how many were attempted.
    pub fn poll_textures(&mut self, loader: &mut dyn TextureLoader, budget: usize) -> usize {
        let mut attempted = 0;
        while attempted < budget {
            let Some((key, uri)) = self.pending_textures.pop_front() else {
                break;
            };
            let max_dimension = self.config.max_texture_dimension;
            let Some(entry) = self.textures.get_mut(&key) else {
                continue;
            };
            attempted += 1;
            let loaded = loader
                .load(&uri)
                .and_then(|tex| tex.validate(&key, max_dimension).map(|_| tex));
            entry.state = match loaded {
                Ok(tex) => {
                    tracing::debug!(%key, bytes = tex.byte_size(), "texture loaded");
                    TextureState::Ready(Arc::new(tex))
                }
                Err(err) => {
                    tracing::warn!(%err, %key, "texture load failed");
                    TextureState::Failed(err.to_string())
                }
            };
        }
        attempted
    }

    /// Drop everything, pinned fallbacks included, then reinstall the
    /// fallbacks so the pool stays usable.
    pub fn dispose(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        let keys: Vec<ResourceKey> = self.entries.keys().cloned().collect();
        for key in &keys {
            self.dispose_entry(key, &mut report);
        }
        for (_, tex) in self.textures.drain() {
            report.textures_disposed += 1;
            report.bytes_reclaimed += tex.state.byte_size();
        }
        self.pending_textures.clear();
        self.reclaim_queue.clear();
        self.preload_queue.clear();
        self.install_fallbacks();
        tracing::debug!(disposed = report.disposed, "resource pool disposed");
        report
    }

    pub fn stats(&self) -> PoolStats {
        let lookups = self.counters.hits + self.counters.misses;
        let pinned_count = self.entries.values().filter(|e| e.pinned).count();
        PoolStats {
            hits: self.counters.hits,
            misses: self.counters.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.counters.hits as f64 / lookups as f64
            },
            entry_count: self.entries.len() - pinned_count,
            pinned_count,
            texture_count: self.textures.len(),
            pending_textures: self
                .textures
                .values()
                .filter(|t| matches!(t.state, TextureState::Pending))
                .count(),
            estimated_bytes: self.entries.values().map(|e| e.bytes).sum::<usize>()
                + self
                    .textures
                    .values()
                    .map(|t| t.state.byte_size())
                    .sum::<usize>(),
            disposed_total: self.counters.disposed,
            bytes_reclaimed_total: self.counters.bytes_reclaimed,
            reclaim_queued: self.reclaim_queue.len(),
            construction_failures: self.counters.failures,
            preload_remaining: self.preload_queue.len(),
        }
    }

    fn install_fallbacks(&mut self) {
        self.fallback(ResourceFamily::Geometry);
        self.fallback(ResourceFamily::Material);
    }

    fn construct(&mut self, request: &ResourceRequest) -> Result<SharedResource, PoolError> {
        match request.kind.family() {
            ResourceFamily::Geometry => {
                if request.texture.is_some() {
                    return Err(PoolError::ParamMismatch {
                        kind: request.kind,
                        params: "texture",
                    });
                }
                let params = match request.params {
                    ResourceParams::Geometry(p) => p,
                    ResourceParams::None => GeometryParams::default(),
                    ResourceParams::Color(_) => {
                        return Err(PoolError::ParamMismatch {
                            kind: request.kind,
                            params: request.params.label(),
                        });
                    }
                };
                Geometry::build(request.kind, params).map(|g| SharedResource::Geometry(Arc::new(g)))
            }
            ResourceFamily::Material => {
                let texture = match &request.texture {
                    Some(descriptor) => Some(self.ensure_texture(descriptor)?),
                    None => None,
                };
                Material::build(request, texture).map(|m| SharedResource::Material(Arc::new(m)))
            }
        }
    }

    fn ensure_texture(&mut self, descriptor: &TextureDescriptor) -> Result<ResourceKey, PoolError> {
        let key = descriptor.key();
        if let Some(entry) = self.textures.get_mut(&key) {
            entry.last_used = self.now;
            return Ok(key);
        }
        let state = match descriptor {
            TextureDescriptor::Procedural {
                pattern,
                size,
                seed,
            } => {
                if *size == 0 || *size > self.config.max_texture_dimension {
                    return Err(PoolError::Texture {
                        key: key.to_string(),
                        reason: format!(
                            "size {size} outside 1..={}",
                            self.config.max_texture_dimension
                        ),
                    });
                }
                TextureState::Ready(Arc::new(Texture::generate(*pattern, *size, *seed)))
            }
            TextureDescriptor::External { uri } => {
                tracing::debug!(%key, uri, "external texture queued");
                self.pending_textures.push_back((key.clone(), uri.clone()));
                TextureState::Pending
            }
        };
        self.textures.insert(
            key.clone(),
            TextureEntry {
                state,
                last_used: self.now,
            },
        );
        Ok(key)
    }

    fn dispose_entry(&mut self, key: &ResourceKey, report: &mut CleanupReport) {
        if let Some(entry) = self.entries.remove(key) {
            report.disposed += 1;
            report.bytes_reclaimed += entry.bytes;
            self.counters.disposed += 1;
            self.counters.bytes_reclaimed += entry.bytes as u64;
            tracing::trace!(%key, bytes = entry.bytes, "resource disposed");
        }
    }

    /// Drop textures no cached material refers to, once stale (or always when
    /// forced).
    fn sweep_textures(&mut self, force: bool) -> CleanupReport {
        let referenced: Vec<&ResourceKey> = self
            .entries
            .values()
            .filter_map(|e| match &e.resource {
                SharedResource::Material(m) => m.texture.as_ref(),
                SharedResource::Geometry(_) => None,
            })
            .collect();
        let now = self.now;
        let stale_after = self.config.stale_after;
        let doomed: Vec<ResourceKey> = self
            .textures
            .iter()
            .filter(|(key, tex)| {
                !referenced.contains(key)
                    && (force || now.saturating_duration_since(tex.last_used) >= stale_after)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let mut report = CleanupReport::default();
        for key in doomed {
            if let Some(tex) = self.textures.remove(&key) {
                report.textures_disposed += 1;
                report.bytes_reclaimed += tex.state.byte_size();
                self.counters.bytes_reclaimed += tex.state.byte_size() as u64;
            }
            self.pending_textures.retain(|(k, _)| *k != key);
        }
        report
    }
}

/// Common `(kind, baseline colour)` combinations: a lit and an unlit material
/// per entity kind, plus the default sphere and billboard.
pub fn default_preload_set() -> Vec<ResourceRequest> {
    let mut set: Vec<ResourceRequest> = EntityKind::ALL
        .into_iter()
        .flat_map(|kind| {
            [ResourceKind::StandardMaterial, ResourceKind::BasicMaterial]
                .map(|material| ResourceRequest::new(material).color(kind.base_color()))
        })
        .collect();
    set.push(ResourceRequest::new(ResourceKind::Sphere).geometry(GeometryParams::default()));
    set.push(ResourceRequest::new(ResourceKind::Billboard).geometry(GeometryParams::default()));
    set
}
