/*! Mesh value types and the primitive generators shared by the torso/limb
 * generators and the customization layer.
 *
 * Meshes are plain index/vertex buffers; uploading them to a renderer is
 * external to this crate. Generators never fail for in-range numeric
 * input; tessellation counts are clamped here, not trusted from callers.
 */

use nalgebra::{Point3, Vector3};
use std::f32::consts::{PI, TAU};

/// Lowest accepted radial/segment tessellation.
pub const MIN_TESSELLATION: u32 = 3;
/// Highest accepted radial/segment tessellation (render-cost bound).
pub const MAX_TESSELLATION: u32 = 32;

/// Clamps a requested tessellation or segment count into the supported
/// render-cost range.
pub fn clamp_tessellation(requested: u32) -> u32 {
    requested.clamp(MIN_TESSELLATION, MAX_TESSELLATION)
}

/// Triangle mesh data: positions, per-vertex normals, triangle indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Incremental mesh construction helper.
#[derive(Debug, Default)]
pub struct MeshBuilder {
    positions: Vec<Point3<f32>>,
    normals: Vec<Vector3<f32>>,
    indices: Vec<u32>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        MeshBuilder::default()
    }

    pub fn vertex(&mut self, position: Point3<f32>, normal: Vector3<f32>) -> u32 {
        let index = self.positions.len() as u32;
        self.positions.push(position);
        self.normals.push(normal);
        index
    }

    pub fn triangle(&mut self, a: u32, b: u32, c: u32) {
        self.indices.extend_from_slice(&[a, b, c]);
    }

    pub fn quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.triangle(a, b, c);
        self.triangle(a, c, d);
    }

    /// Stitches two vertex rings of equal length with quads.
    pub fn stitch_rings(&mut self, lower: &[u32], upper: &[u32]) {
        debug_assert_eq!(lower.len(), upper.len());
        let n = lower.len();
        for i in 0..n {
            let j = (i + 1) % n;
            self.quad(lower[i], lower[j], upper[j], upper[i]);
        }
    }

    /// Triangle fan from a center vertex over a ring. `flip` reverses the
    /// winding for bottom caps.
    pub fn fan(&mut self, center: u32, ring: &[u32], flip: bool) {
        let n = ring.len();
        for i in 0..n {
            let j = (i + 1) % n;
            if flip {
                self.triangle(center, ring[j], ring[i]);
            } else {
                self.triangle(center, ring[i], ring[j]);
            }
        }
    }

    pub fn build(self) -> MeshData {
        MeshData {
            positions: self.positions,
            normals: self.normals,
            indices: self.indices,
        }
    }
}

/// UV sphere centered at the origin.
pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> MeshData {
    let segments = clamp_tessellation(segments);
    let rings = rings.clamp(2, MAX_TESSELLATION);

    let mut builder = MeshBuilder::new();
    let mut previous_ring: Vec<u32> = vec![];

    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let phi = PI * v;
        let y = phi.cos();
        let ring_radius = phi.sin();

        let current: Vec<u32> = (0..segments)
            .map(|segment| {
                let theta = TAU * segment as f32 / segments as f32;
                let normal = Vector3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                builder.vertex(Point3::from(normal * radius), normal)
            })
            .collect();

        if ring > 0 {
            builder.stitch_rings(&current, &previous_ring);
        }
        previous_ring = current;
    }
    builder.build()
}

/// Axis-aligned box centered at the origin. Each face has its own
/// vertices for correct normals.
pub fn box_mesh(width: f32, height: f32, depth: f32) -> MeshData {
    let (hw, hh, hd) = (width * 0.5, height * 0.5, depth * 0.5);
    let mut builder = MeshBuilder::new();

    let faces: [(Vector3<f32>, [Point3<f32>; 4]); 6] = [
        (
            Vector3::z(),
            [
                Point3::new(-hw, -hh, hd),
                Point3::new(hw, -hh, hd),
                Point3::new(hw, hh, hd),
                Point3::new(-hw, hh, hd),
            ],
        ),
        (
            -Vector3::z(),
            [
                Point3::new(hw, -hh, -hd),
                Point3::new(-hw, -hh, -hd),
                Point3::new(-hw, hh, -hd),
                Point3::new(hw, hh, -hd),
            ],
        ),
        (
            Vector3::x(),
            [
                Point3::new(hw, -hh, hd),
                Point3::new(hw, -hh, -hd),
                Point3::new(hw, hh, -hd),
                Point3::new(hw, hh, hd),
            ],
        ),
        (
            -Vector3::x(),
            [
                Point3::new(-hw, -hh, -hd),
                Point3::new(-hw, -hh, hd),
                Point3::new(-hw, hh, hd),
                Point3::new(-hw, hh, -hd),
            ],
        ),
        (
            Vector3::y(),
            [
                Point3::new(-hw, hh, hd),
                Point3::new(hw, hh, hd),
                Point3::new(hw, hh, -hd),
                Point3::new(-hw, hh, -hd),
            ],
        ),
        (
            -Vector3::y(),
            [
                Point3::new(-hw, -hh, -hd),
                Point3::new(hw, -hh, -hd),
                Point3::new(hw, -hh, hd),
                Point3::new(-hw, -hh, hd),
            ],
        ),
    ];

    for (normal, corners) in faces {
        let ids: Vec<u32> = corners.iter().map(|&p| builder.vertex(p, normal)).collect();
        builder.quad(ids[0], ids[1], ids[2], ids[3]);
    }
    builder.build()
}

/// Capped cylinder along Y, centered at the origin, with independent top
/// and bottom radii. A zero top radius yields a cone.
pub fn cylinder(height: f32, radius_top: f32, radius_bottom: f32, tessellation: u32) -> MeshData {
    let tessellation = clamp_tessellation(tessellation);
    let hh = height * 0.5;
    let mut builder = MeshBuilder::new();

    let ring_at = |builder: &mut MeshBuilder, y: f32, radius: f32| -> Vec<u32> {
        (0..tessellation)
            .map(|segment| {
                let theta = TAU * segment as f32 / tessellation as f32;
                let normal = Vector3::new(theta.cos(), 0.0, theta.sin());
                builder.vertex(Point3::new(radius * theta.cos(), y, radius * theta.sin()), normal)
            })
            .collect()
    };

    let bottom = ring_at(&mut builder, -hh, radius_bottom);
    let top = ring_at(&mut builder, hh, radius_top);
    builder.stitch_rings(&bottom, &top);

    let bottom_center = builder.vertex(Point3::new(0.0, -hh, 0.0), -Vector3::y());
    builder.fan(bottom_center, &bottom, false);
    if radius_top > f32::EPSILON {
        let top_center = builder.vertex(Point3::new(0.0, hh, 0.0), Vector3::y());
        builder.fan(top_center, &top, true);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test_log::test]
    fn sphere_vertices_sit_on_radius() {
        let mesh = uv_sphere(0.5, 8, 6);
        for position in &mesh.positions {
            assert_relative_eq!(position.coords.norm(), 0.5, epsilon = 1e-5);
        }
        assert!(mesh.triangle_count() > 0);
    }

    #[test_log::test]
    fn tessellation_is_clamped_into_range() {
        assert_eq!(clamp_tessellation(0), MIN_TESSELLATION);
        assert_eq!(clamp_tessellation(1000), MAX_TESSELLATION);
        // A degenerate request still yields a valid mesh.
        let mesh = cylinder(1.0, 0.1, 0.1, 0);
        assert!(mesh.triangle_count() > 0);
    }

    #[test_log::test]
    fn box_mesh_has_six_faces() {
        let mesh = box_mesh(1.0, 2.0, 3.0);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        let max_y = mesh.positions.iter().map(|p| p.y).fold(f32::MIN, f32::max);
        assert_relative_eq!(max_y, 1.0);
    }

    #[test_log::test]
    fn cone_skips_top_cap() {
        let cone = cylinder(1.0, 0.0, 0.5, 8);
        let cyl = cylinder(1.0, 0.5, 0.5, 8);
        assert!(cone.triangle_count() < cyl.triangle_count());
    }
}
