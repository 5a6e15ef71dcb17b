use galaxy_common::{EntityId, EntityKind, EntityMeta};
use galaxy_frame::{FrameError, FrameOrchestrator};
use galaxy_lod::SceneDrawable;
use glam::{Mat4, Vec3};
use std::collections::HashMap;
use std::f32::consts::TAU;

/// splitmix64; the same seed always yields the same scene.
pub struct SceneRng(u64);

impl SceneRng {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    pub fn unit(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.unit()
    }
}

/// One generated scene node.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec3,
    pub radius: f32,
    pub importance: f32,
}

fn pick_kind(rng: &mut SceneRng) -> EntityKind {
    match rng.next_u64() % 100 {
        0..=4 => EntityKind::Star,
        5..=39 => EntityKind::Planet,
        40..=64 => EntityKind::Moon,
        65..=89 => EntityKind::Asteroid,
        90..=96 => EntityKind::Comet,
        _ => EntityKind::Nebula,
    }
}

fn radius_for(kind: EntityKind, rng: &mut SceneRng) -> f32 {
    let base = match kind {
        EntityKind::Star => 20.0,
        EntityKind::Planet => 5.0,
        EntityKind::Moon => 2.0,
        EntityKind::Asteroid => 1.0,
        EntityKind::Comet => 1.5,
        EntityKind::Nebula => 60.0,
    };
    base * rng.range(0.75, 1.25)
}

/// Scatter `count` entities through a cube of half-width `extent`.
pub fn generate(count: usize, extent: f32, seed: u64) -> Vec<SceneEntity> {
    let mut rng = SceneRng::new(seed);
    (0..count)
        .map(|i| {
            let kind = pick_kind(&mut rng);
            let position = Vec3::new(
                rng.range(-extent, extent),
                rng.range(-extent * 0.25, extent * 0.25),
                rng.range(-extent, extent),
            );
            SceneEntity {
                id: EntityId::new(format!("{kind}-{i:05}")),
                kind,
                position,
                radius: radius_for(kind, &mut rng),
                importance: rng.range(0.2, 1.0),
            }
        })
        .collect()
}

/// Register every entity and give each one a drawable.
pub fn populate(
    orch: &mut FrameOrchestrator,
    entities: &[SceneEntity],
) -> Result<HashMap<EntityId, SceneDrawable>, FrameError> {
    let mut drawables = HashMap::with_capacity(entities.len());
    for e in entities {
        let meta = EntityMeta::new(e.kind).with_label(e.id.as_str());
        orch.register_with_meta(e.id.clone(), e.position, e.radius, meta, e.importance)?;
        drawables.insert(e.id.clone(), SceneDrawable::new());
    }
    Ok(drawables)
}

/// Camera circling the origin: one revolution over `frames` frames.
pub fn orbit_camera(frame: u64, frames: u64, distance: f32) -> (Vec3, Mat4) {
    let angle = TAU * frame as f32 / frames.max(1) as f32;
    let eye = Vec3::new(angle.cos() * distance, distance * 0.2, angle.sin() * distance);
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, distance * 4.0);
    (eye, proj * view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use galaxy_frame::FrameConfig;

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(generate(64, 500.0, 7), generate(64, 500.0, 7));
        assert_ne!(generate(64, 500.0, 7), generate(64, 500.0, 8));
    }

    #[test]
    fn entities_stay_inside_the_extent() {
        for e in generate(256, 300.0, 1) {
            assert!(e.position.x.abs() <= 300.0 && e.position.z.abs() <= 300.0);
            assert!(e.radius > 0.0);
            assert!((0.2..=1.0).contains(&e.importance));
        }
    }

    #[test]
    fn populate_registers_everything() {
        let entities = generate(100, 400.0, 3);
        let mut orch = FrameOrchestrator::new(FrameConfig::default()).unwrap();
        let drawables = populate(&mut orch, &entities).unwrap();
        assert_eq!(drawables.len(), 100);
        assert_eq!(orch.spatial().len(), 100);
        assert_eq!(orch.lod().len(), 100);
    }

    #[test]
    fn orbit_camera_looks_at_origin() {
        let (eye, vp) = orbit_camera(0, 100, 1000.0);
        assert!((eye.length() - 1000.0 * (1.0f32 + 0.04).sqrt()).abs() < 1e-2);
        let frustum = galaxy_spatial::Frustum::from_view_projection(&vp);
        assert!(frustum.contains_point(Vec3::ZERO));
    }
}
