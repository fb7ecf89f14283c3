/*! Parametric limb generator.
 *
 * A limb segment is a tapered tube swept along a slightly bent vertical
 * path; a full limb composes joint sphere, upper tube, elbow/knee sphere
 * (parented to an explicit mid transform offset by the upper length),
 * lower tube and terminal geometry. Attachment of the pieces to skeleton
 * joints happens in [crate::character]; this module only produces mesh
 * data and the offsets.
 */

use crate::mesh::{self, clamp_tessellation, MeshBuilder, MeshData};
use nalgebra::{Point3, Vector3};
use std::f32::consts::PI;

/// Samples along each limb segment path.
const PATH_POINTS: usize = 6;
/// Sinusoidal bend amplitude for the upper (outward X) and lower
/// (forward Z) segments.
const BEND_AMPLITUDE: f32 = 0.018;

/// Parameters for one limb (arm or leg). Deterministic value type.
#[derive(Debug, Clone, PartialEq)]
pub struct LimbParams {
    pub upper_length: f32,
    pub lower_length: f32,
    /// Tube radius at the shoulder/hip end.
    pub joint_radius: f32,
    /// Tube radius at the hand/foot end.
    pub end_radius: f32,
    pub tessellation: u32,
    pub scale: f32,
    /// Mirrors the outward bend for the left/right side.
    pub mirror: bool,
}

impl Default for LimbParams {
    fn default() -> Self {
        LimbParams {
            upper_length: 0.5,
            lower_length: 0.5,
            joint_radius: 0.07,
            end_radius: 0.05,
            tessellation: 8,
            scale: 1.0,
            mirror: false,
        }
    }
}

/// Which way a segment path bends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bend {
    /// Upper segments bow outward on X.
    OutwardX,
    /// Lower segments bow forward on Z.
    ForwardZ,
}

/// Tube radius at path parameter `t`, linearly interpolated from the
/// joint radius to the end radius.
pub fn radius_at(t: f32, joint_radius: f32, end_radius: f32) -> f32 {
    joint_radius + (end_radius - joint_radius) * t
}

/// Builds the vertical sample path of one segment, starting at the origin
/// and descending by `length`, with a small sinusoidal bow.
pub fn segment_path(length: f32, bend: Bend, mirror: bool) -> Vec<Point3<f32>> {
    let sign = if mirror { -1.0 } else { 1.0 };
    (0..PATH_POINTS)
        .map(|i| {
            let t = i as f32 / (PATH_POINTS - 1) as f32;
            let bow = (t * PI).sin() * BEND_AMPLITUDE;
            match bend {
                Bend::OutwardX => Point3::new(sign * bow, -t * length, 0.0),
                Bend::ForwardZ => Point3::new(0.0, -t * length, bow),
            }
        })
        .collect()
}

/// Sweeps a circular cross-section along `path`, lerping the radius from
/// `start_radius` to `end_radius`. Rings lie in the XZ plane; limb paths
/// are near-vertical so this stays free of ring self-intersection.
pub fn tube(path: &[Point3<f32>], start_radius: f32, end_radius: f32, tessellation: u32) -> MeshData {
    let tessellation = clamp_tessellation(tessellation);
    let mut builder = MeshBuilder::new();
    let mut previous_ring: Vec<u32> = vec![];
    let last = (path.len() - 1).max(1) as f32;

    for (i, center) in path.iter().enumerate() {
        let t = i as f32 / last;
        let radius = radius_at(t, start_radius, end_radius);
        let ring: Vec<u32> = (0..tessellation)
            .map(|segment| {
                let theta = std::f32::consts::TAU * segment as f32 / tessellation as f32;
                let normal = Vector3::new(theta.cos(), 0.0, theta.sin());
                builder.vertex(center + normal * radius, normal)
            })
            .collect();
        if i > 0 {
            builder.stitch_rings(&ring, &previous_ring);
        }
        previous_ring = ring;
    }
    builder.build()
}

/// All mesh pieces of one limb plus the local offsets they attach at.
#[derive(Debug, Clone)]
pub struct LimbGeometry {
    /// Shoulder/hip sphere, at the limb joint itself.
    pub joint_sphere: MeshData,
    /// Tapered upper tube, at the limb joint.
    pub upper: MeshData,
    /// Elbow/knee sphere, parented to the mid transform.
    pub mid_sphere: MeshData,
    /// Tapered lower tube, parented to the mid transform.
    pub lower: MeshData,
    /// Terminal (hand/foot) sphere, parented to the mid transform.
    pub end_sphere: MeshData,
    /// Local offset of the explicit elbow/knee transform: straight down by
    /// the upper length.
    pub mid_offset: Vector3<f32>,
    /// Local offset of the terminal geometry below the mid transform.
    pub end_offset: Vector3<f32>,
}

/// Generates a complete limb. Pure function of the parameters; all
/// dimensions are multiplied by `params.scale`.
pub fn generate(params: &LimbParams) -> LimbGeometry {
    let s = params.scale;
    let upper_length = params.upper_length * s;
    let lower_length = params.lower_length * s;
    let joint_radius = params.joint_radius * s;
    let end_radius = params.end_radius * s;
    let mid_radius = radius_at(0.5, joint_radius, end_radius);

    let upper_path = segment_path(upper_length, Bend::OutwardX, params.mirror);
    let lower_path = segment_path(lower_length, Bend::ForwardZ, params.mirror);

    LimbGeometry {
        joint_sphere: mesh::uv_sphere(joint_radius * 1.2, params.tessellation, params.tessellation),
        upper: tube(&upper_path, joint_radius, mid_radius, params.tessellation),
        mid_sphere: mesh::uv_sphere(mid_radius * 1.2, params.tessellation, params.tessellation),
        lower: tube(&lower_path, mid_radius, end_radius, params.tessellation),
        end_sphere: mesh::uv_sphere(end_radius * 1.4, params.tessellation, params.tessellation),
        mid_offset: Vector3::new(0.0, -upper_length, 0.0),
        end_offset: Vector3::new(0.0, -lower_length, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test_log::test]
    fn tube_radius_lerps_joint_to_end() {
        // Contract fixed by the character assembler: 0.06 at t=0, 0.04 at
        // t=1, linear in between.
        assert_relative_eq!(radius_at(0.0, 0.06, 0.04), 0.06);
        assert_relative_eq!(radius_at(1.0, 0.06, 0.04), 0.04);
        assert_relative_eq!(radius_at(0.5, 0.06, 0.04), 0.05);

        let path = segment_path(0.3, Bend::OutwardX, false);
        let mesh = tube(&path, 0.06, 0.04, 8);

        // First ring vertices sit 0.06 from the path start, last ring 0.04
        // from the path end.
        let first_ring = &mesh.positions[..8];
        for vertex in first_ring {
            assert_relative_eq!((vertex - path[0]).norm(), 0.06, epsilon = 1e-5);
        }
        let last_ring = &mesh.positions[mesh.positions.len() - 8..];
        for vertex in last_ring {
            assert_relative_eq!((vertex - path[path.len() - 1]).norm(), 0.04, epsilon = 1e-5);
        }
    }

    #[test_log::test]
    fn paths_bow_in_their_own_axis() {
        let upper = segment_path(0.5, Bend::OutwardX, false);
        assert_relative_eq!(upper[0].coords, Vector3::zeros());
        assert_relative_eq!(upper.last().unwrap().y, -0.5, epsilon = 1e-6);
        let max_x = upper.iter().map(|p| p.x).fold(f32::MIN, f32::max);
        assert_relative_eq!(max_x, BEND_AMPLITUDE, epsilon = 1e-3);
        assert!(upper.iter().all(|p| p.z == 0.0));

        let lower = segment_path(0.5, Bend::ForwardZ, false);
        assert!(lower.iter().all(|p| p.x == 0.0));
        assert!(lower.iter().any(|p| p.z > 0.0));

        let mirrored = segment_path(0.5, Bend::OutwardX, true);
        assert!(mirrored.iter().skip(1).take(4).all(|p| p.x < 0.0));
    }

    #[test_log::test]
    fn generate_scales_every_piece() {
        let params = LimbParams {
            upper_length: 0.3,
            lower_length: 0.25,
            scale: 2.0,
            ..LimbParams::default()
        };
        let limb = generate(&params);
        assert_relative_eq!(limb.mid_offset, Vector3::new(0.0, -0.6, 0.0), epsilon = 1e-6);
        assert_relative_eq!(limb.end_offset, Vector3::new(0.0, -0.5, 0.0), epsilon = 1e-6);
        assert!(limb.upper.triangle_count() > 0);
        assert!(limb.lower.triangle_count() > 0);
    }
}
