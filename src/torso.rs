/*! Parametric torso generator.
 *
 * The torso is a closed rounded-rectangle cross-section extruded along a
 * vertical path, with a slight forward bow for posture and a three-segment
 * width profile (hips, waist-to-chest, neck taper). A beveled-box variant
 * is provided for low poly-count budgets.
 */

use crate::mesh::{clamp_tessellation, box_mesh, MeshBuilder, MeshData};
use nalgebra::{Point3, Vector3};
use std::f32::consts::{FRAC_PI_2, PI};

/// Forward bow amplitude applied along the extrusion (`sin(t * PI) * BIAS`).
const FORWARD_BIAS: f32 = 0.02;
/// Arc samples per rounded corner of the cross-section.
const CORNER_STEPS: usize = 4;

/// Parameters for [generate] and [generate_box]. Deterministic value type;
/// the generators are pure functions of it.
#[derive(Debug, Clone, PartialEq)]
pub struct TorsoParams {
    pub hip_width: f32,
    pub shoulder_width: f32,
    pub height: f32,
    pub depth: f32,
    pub corner_radius: f32,
    pub segments: u32,
    pub scale: f32,
}

impl Default for TorsoParams {
    fn default() -> Self {
        TorsoParams {
            hip_width: 0.5,
            shoulder_width: 0.7,
            height: 0.8,
            depth: 0.35,
            corner_radius: 0.08,
            segments: 8,
            scale: 1.0,
        }
    }
}

/// Cross-section width at normalized height `t`: hips narrow toward half
/// the shoulder width, the chest expands back to it, and the last 20%
/// tapers for the neck.
pub fn width_profile(t: f32, hip_width: f32, shoulder_width: f32) -> f32 {
    let waist = shoulder_width * 0.5;
    if t < 0.3 {
        let s = t / 0.3;
        hip_width + (waist - hip_width) * s
    } else if t < 0.7 {
        let s = (t - 0.3) / 0.4;
        waist + (shoulder_width - waist) * s
    } else if t < 0.8 {
        shoulder_width
    } else {
        let s = (t - 0.8) / 0.2;
        shoulder_width * (1.0 - 0.4 * s)
    }
}

/// Closed rounded-rectangle outline in the XZ plane, counter-clockwise.
/// The corner radius is bounded to avoid self-intersection on narrow rings.
fn rounded_rect_outline(width: f32, depth: f32, corner_radius: f32) -> Vec<(f32, f32)> {
    let radius = corner_radius.min(width * 0.3).min(depth * 0.3).max(0.0);
    let hx = (width * 0.5 - radius).max(0.0);
    let hz = (depth * 0.5 - radius).max(0.0);

    // Corner arc centers and their start angles, walked counter-clockwise.
    let corners = [
        (hx, hz, 0.0),
        (-hx, hz, FRAC_PI_2),
        (-hx, -hz, PI),
        (hx, -hz, PI + FRAC_PI_2),
    ];
    let mut outline = Vec::with_capacity(corners.len() * CORNER_STEPS);
    for (cx, cz, start) in corners {
        for step in 0..CORNER_STEPS {
            let angle = start + FRAC_PI_2 * step as f32 / (CORNER_STEPS - 1) as f32;
            outline.push((cx + radius * angle.cos(), cz + radius * angle.sin()));
        }
    }
    outline
}

/// Extrudes the profiled cross-section into a closed torso shell, centered
/// vertically at the origin.
pub fn generate(params: &TorsoParams) -> MeshData {
    let segments = clamp_tessellation(params.segments);
    let mut builder = MeshBuilder::new();
    let mut previous_ring: Vec<u32> = vec![];
    let mut bottom_ring: Vec<u32> = vec![];

    for segment in 0..=segments {
        let t = segment as f32 / segments as f32;
        let width = width_profile(t, params.hip_width, params.shoulder_width);
        let y = (t - 0.5) * params.height;
        let forward = (t * PI).sin() * FORWARD_BIAS;

        let ring: Vec<u32> = rounded_rect_outline(width, params.depth, params.corner_radius)
            .into_iter()
            .map(|(x, z)| {
                let normal = Vector3::new(x, 0.0, z)
                    .try_normalize(f32::EPSILON)
                    .unwrap_or_else(Vector3::z);
                builder.vertex(
                    Point3::new(x * params.scale, y * params.scale, (z + forward) * params.scale),
                    normal,
                )
            })
            .collect();

        if segment == 0 {
            bottom_ring = ring.clone();
        } else {
            builder.stitch_rings(&previous_ring, &ring);
        }
        previous_ring = ring;
    }

    let half = params.height * 0.5 * params.scale;
    let bottom_center = builder.vertex(Point3::new(0.0, -half, 0.0), -Vector3::y());
    builder.fan(bottom_center, &bottom_ring, true);
    let top_forward = 0.0; // sin(PI) == 0, the bow returns to the spine
    let top_center = builder.vertex(Point3::new(0.0, half, top_forward), Vector3::y());
    builder.fan(top_center, &previous_ring, false);

    builder.build()
}

/// Simplified torso for lower poly-count budgets: a box at shoulder width
/// whose bottom-ring vertices are pulled in by `hip_width / shoulder_width`.
pub fn generate_box(params: &TorsoParams) -> MeshData {
    let mut mesh = box_mesh(
        params.shoulder_width * params.scale,
        params.height * params.scale,
        params.depth * params.scale,
    );
    let hip_ratio = params.hip_width / params.shoulder_width;
    let bottom = -params.height * 0.5 * params.scale;
    for position in &mut mesh.positions {
        if (position.y - bottom).abs() < 1e-6 {
            position.x *= hip_ratio;
            position.z *= hip_ratio;
        }
    }
    mesh
}
