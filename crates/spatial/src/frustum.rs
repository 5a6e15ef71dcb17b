//! View frustum as six inward-facing planes.

use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Plane coefficients are rounded to this step before hashing into a
/// signature, so float noise between frames does not defeat the query cache.
const SIGNATURE_STEP: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// `(a, b, c, d)` with `(a, b, c)` the unit inward normal.
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix (Gribb-Hartmann) for a
    /// projection with 0..1 clip depth, as produced by `Mat4::perspective_rh`.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];
        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];
        Self::from_planes(planes)
    }

    /// Build from arbitrary planes; each is normalized so `(a, b, c)` has
    /// unit length. Degenerate planes are kept as-is.
    pub fn from_planes(mut planes: [Vec4; 6]) -> Self {
        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }
        Self { planes }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// True if the sphere is at least partly inside. Conservative near the
    /// frustum corners.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|p| p.truncate().dot(center) + p.w >= -radius)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.intersects_sphere(point, 0.0)
    }

    /// Stable hash of the quantized planes, used in query cache keys.
    pub fn signature(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for plane in &self.planes {
            for v in plane.to_array() {
                ((v / SIGNATURE_STEP).round() as i64).hash(&mut hasher);
            }
        }
        hasher.finish()
    }
}
