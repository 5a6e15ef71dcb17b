//! Vertex data generators for the geometry kinds.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::PoolError;
use crate::key::{GeometryParams, ResourceKind};

/// Highest segment count accepted for any generator.
pub const MAX_DETAIL: u32 = 512;

/// Interleaved vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }
}

/// Indexed triangle list.
#[derive(Clone, PartialEq)]
pub struct Geometry {
    pub kind: ResourceKind,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl std::fmt::Debug for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geometry")
            .field("kind", &self.kind)
            .field("vertices", &self.vertices.len())
            .field("indices", &self.indices.len())
            .finish()
    }
}

impl Geometry {
    /// Build geometry of `kind` from shape parameters.
    pub fn build(kind: ResourceKind, params: GeometryParams) -> Result<Self, PoolError> {
        let fail = |reason: String| PoolError::Geometry { kind, reason };
        if !params.size.is_finite() || params.size <= 0.0 {
            return Err(fail(format!("size must be positive, got {}", params.size)));
        }
        if params.detail > MAX_DETAIL {
            return Err(fail(format!(
                "detail {} exceeds the limit of {MAX_DETAIL}",
                params.detail
            )));
        }
        match kind {
            ResourceKind::Sphere => {
                if params.detail < 3 {
                    return Err(fail(format!("sphere needs >= 3 segments, got {}", params.detail)));
                }
                Ok(Self::sphere(params.size, params.detail, (params.detail / 2).max(2)))
            }
            ResourceKind::Box => {
                if params.detail == 0 {
                    return Err(fail("box needs at least one subdivision".into()));
                }
                Ok(Self::cube(params.size, params.detail))
            }
            ResourceKind::Ring => {
                if params.detail < 3 {
                    return Err(fail(format!("ring needs >= 3 segments, got {}", params.detail)));
                }
                Ok(Self::ring(params.size * 0.6, params.size, params.detail))
            }
            ResourceKind::Billboard => Ok(Self::billboard(params.size)),
            other => Err(PoolError::ParamMismatch {
                kind: other,
                params: "geometry",
            }),
        }
    }

    /// Built-in safe shape: an octahedron of unit radius. Cannot fail.
    pub fn fallback() -> Self {
        let dirs = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        let vertices = dirs
            .iter()
            .map(|d| Vertex::new(*d, *d, [0.5, 0.5]))
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 4,  4, 2, 1,  1, 2, 5,  5, 2, 0,
            4, 3, 0,  1, 3, 4,  5, 3, 1,  0, 3, 5,
        ];
        Self {
            kind: ResourceKind::Sphere,
            vertices,
            indices,
        }
    }

    /// UV sphere with `width` longitudinal and `height` latitudinal segments.
    pub fn sphere(radius: f32, width: u32, height: u32) -> Self {
        let mut vertices = Vec::with_capacity(((width + 1) * (height + 1)) as usize);
        for iy in 0..=height {
            let v = iy as f32 / height as f32;
            let theta = v * std::f32::consts::PI;
            for ix in 0..=width {
                let u = ix as f32 / width as f32;
                let phi = u * std::f32::consts::TAU;
                let normal = Vec3::new(
                    -phi.cos() * theta.sin(),
                    theta.cos(),
                    phi.sin() * theta.sin(),
                );
                vertices.push(Vertex::new(normal * radius, normal, [u, 1.0 - v]));
            }
        }

        let row = width + 1;
        let mut indices = Vec::new();
        for iy in 0..height {
            for ix in 0..width {
                let a = iy * row + ix + 1;
                let b = iy * row + ix;
                let c = (iy + 1) * row + ix;
                let d = (iy + 1) * row + ix + 1;
                // Pole rows collapse to a single point; skip the degenerate half.
                if iy != 0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if iy != height - 1 {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }
        Self {
            kind: ResourceKind::Sphere,
            vertices,
            indices,
        }
    }

    /// Axis-aligned cube centred on the origin, each face split `n × n`.
    pub fn cube(edge: f32, n: u32) -> Self {
        // (normal, u axis, v axis) with u × v == normal so faces wind outward.
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let half = edge * 0.5;
        let per_face = (n + 1) * (n + 1);
        let mut vertices = Vec::with_capacity((per_face * 6) as usize);
        let mut indices = Vec::with_capacity((n * n * 36) as usize);

        for (face, (normal, u_axis, v_axis)) in faces.into_iter().enumerate() {
            let base = face as u32 * per_face;
            for j in 0..=n {
                for i in 0..=n {
                    let u = i as f32 / n as f32;
                    let v = j as f32 / n as f32;
                    let p = normal * half + u_axis * (u * edge - half) + v_axis * (v * edge - half);
                    vertices.push(Vertex::new(p, normal, [u, v]));
                }
            }
            for j in 0..n {
                for i in 0..n {
                    let a = base + j * (n + 1) + i;
                    let b = a + 1;
                    let c = a + n + 2;
                    let d = a + n + 1;
                    indices.extend_from_slice(&[a, b, c, a, c, d]);
                }
            }
        }
        Self {
            kind: ResourceKind::Box,
            vertices,
            indices,
        }
    }

    /// Flat annulus in the XZ plane facing +Y.
    pub fn ring(inner: f32, outer: f32, segments: u32) -> Self {
        let mut vertices = Vec::with_capacity(((segments + 1) * 2) as usize);
        for s in 0..=segments {
            let t = s as f32 / segments as f32;
            let angle = t * std::f32::consts::TAU;
            let dir = Vec3::new(angle.cos(), 0.0, angle.sin());
            vertices.push(Vertex::new(dir * inner, Vec3::Y, [t, 0.0]));
            vertices.push(Vertex::new(dir * outer, Vec3::Y, [t, 1.0]));
        }
        let mut indices = Vec::with_capacity((segments * 6) as usize);
        for s in 0..segments {
            let i0 = s * 2;
            let o0 = i0 + 1;
            let i1 = i0 + 2;
            let o1 = i0 + 3;
            indices.extend_from_slice(&[i0, i1, o0, o0, i1, o1]);
        }
        Self {
            kind: ResourceKind::Ring,
            vertices,
            indices,
        }
    }

    /// Camera-facing quad in the XY plane.
    pub fn billboard(width: f32) -> Self {
        let h = width * 0.5;
        let vertices = vec![
            Vertex::new(Vec3::new(-h, -h, 0.0), Vec3::Z, [0.0, 0.0]),
            Vertex::new(Vec3::new(h, -h, 0.0), Vec3::Z, [1.0, 0.0]),
            Vertex::new(Vec3::new(h, h, 0.0), Vec3::Z, [1.0, 1.0]),
            Vertex::new(Vec3::new(-h, h, 0.0), Vec3::Z, [0.0, 1.0]),
        ];
        Self {
            kind: ResourceKind::Billboard,
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Estimated buffer footprint: vertex bytes plus index bytes.
    pub fn byte_size(&self) -> usize {
        bytemuck::cast_slice::<Vertex, u8>(&self.vertices).len()
            + bytemuck::cast_slice::<u32, u8>(&self.indices).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_range(g: &Geometry) {
        let n = g.vertices.len() as u32;
        assert!(g.indices.iter().all(|&i| i < n), "index out of range");
        assert_eq!(g.indices.len() % 3, 0);
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let g = Geometry::sphere(2.0, 16, 8);
        assert_eq!(g.vertices.len(), 17 * 9);
        for v in &g.vertices {
            let len = Vec3::from_array(v.position).length();
            assert!((len - 2.0).abs() < 1e-4);
        }
        assert_indices_in_range(&g);
        // Two pole rows contribute one triangle per segment, the rest two.
        assert_eq!(g.triangle_count(), 16 * (2 * 8 - 2) as usize);
    }

    #[test]
    fn cube_faces_wind_outward() {
        let g = Geometry::cube(2.0, 2);
        assert_indices_in_range(&g);
        assert_eq!(g.triangle_count(), 6 * 2 * 2 * 2);
        for tri in g.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from_array(g.vertices[i as usize].position));
            let face_normal = (b - a).cross(c - a).normalize();
            let stored = Vec3::from_array(g.vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(stored) > 0.99);
        }
    }

    #[test]
    fn ring_and_billboard_are_well_formed() {
        let ring = Geometry::ring(0.6, 1.0, 12);
        assert_indices_in_range(&ring);
        assert_eq!(ring.triangle_count(), 24);

        let quad = Geometry::billboard(1.0);
        assert_indices_in_range(&quad);
        assert_eq!(quad.triangle_count(), 2);
    }

    #[test]
    fn byte_size_counts_vertices_and_indices() {
        let quad = Geometry::billboard(1.0);
        assert_eq!(quad.byte_size(), 4 * std::mem::size_of::<Vertex>() + 6 * 4);
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(matches!(
            Geometry::build(ResourceKind::Sphere, GeometryParams::new(1.0, 2)),
            Err(PoolError::Geometry { .. })
        ));
        assert!(matches!(
            Geometry::build(ResourceKind::Box, GeometryParams::new(-1.0, 1)),
            Err(PoolError::Geometry { .. })
        ));
        assert!(matches!(
            Geometry::build(ResourceKind::Ring, GeometryParams::new(1.0, MAX_DETAIL + 1)),
            Err(PoolError::Geometry { .. })
        ));
        assert!(matches!(
            Geometry::build(ResourceKind::BasicMaterial, GeometryParams::default()),
            Err(PoolError::ParamMismatch { .. })
        ));
    }

    #[test]
    fn fallback_is_closed_octahedron() {
        let g = Geometry::fallback();
        assert_indices_in_range(&g);
        assert_eq!(g.triangle_count(), 8);
    }
}
