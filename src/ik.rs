/*! Analytic two-bone inverse kinematics.
 *
 * A [TwoBoneChain] spans three named joints (start, mid, end). Solving
 * mutates the local rotations of the start and mid joints only; the end
 * joint is the effector and is never rotated. The bend angles come from
 * the law of cosines, so the solve is exact and non-iterative.
 *
 * Known limitation: there is no pole-vector input. The bend plane is the
 * plane spanned by the rest "down" axis and the target direction; targets
 * that would require a different elbow/knee orientation get a best-effort
 * plane instead.
 */

use crate::errors::MissingJoint;
use crate::skeleton::Skeleton;
use nalgebra::{Unit, UnitQuaternion, Vector3};
use std::f32::consts::PI;
use tracing::trace;

/// Targets closer to the start joint than this are ignored; the aim
/// direction would be undefined.
const MIN_TARGET_DISTANCE: f32 = 0.001;
/// Fraction of the chain length a target is clamped to. Keeps the
/// law-of-cosines arguments strictly inside `acos` range.
const REACH_LIMIT: f32 = 0.999;

/// Rest direction a limb hangs in; both chain segments descend -Y.
const DEFAULT_DOWN: Vector3<f32> = Vector3::new(0.0, -1.0, 0.0);

/// A prepared solver for one start/mid/end joint chain. Segment lengths
/// are measured once from the rest offsets at creation time.
#[derive(Debug, Clone)]
pub struct TwoBoneChain {
    start: String,
    mid: String,
    end: String,
    upper_length: f32,
    lower_length: f32,
    chain_length: f32,
}

/// Measures the chain over three named joints. The mid and end joints must
/// be children of their predecessors for the rest offsets to be segment
/// lengths. A missing joint is reported, not raised.
pub fn create_ik_chain(
    skeleton: &Skeleton,
    start: &str,
    mid: &str,
    end: &str,
) -> Result<TwoBoneChain, MissingJoint> {
    let missing = |name: &str| MissingJoint {
        joint: name.to_string(),
        context: "ik chain",
    };
    skeleton.bone(start).ok_or_else(|| missing(start))?;
    let upper_length = skeleton.bone(mid).ok_or_else(|| missing(mid))?.rest_position.norm();
    let lower_length = skeleton.bone(end).ok_or_else(|| missing(end))?.rest_position.norm();
    Ok(TwoBoneChain {
        start: start.to_string(),
        mid: mid.to_string(),
        end: end.to_string(),
        upper_length,
        lower_length,
        chain_length: upper_length + lower_length,
    })
}

impl TwoBoneChain {
    pub fn chain_length(&self) -> f32 {
        self.chain_length
    }

    /// Solves the chain toward `target` (world space) and writes the
    /// resulting local rotations to the start and mid joints. Out-of-reach
    /// targets are clamped to `chain_length * 0.999`; a target at the
    /// start joint is a no-op.
    pub fn solve(&self, skeleton: &mut Skeleton, target: Vector3<f32>) {
        // The chain was validated at creation, but the skeleton may have
        // been disposed since; a stale solve is a no-op.
        let Some(start_index) = skeleton.joint(&self.start) else {
            return;
        };
        let start_world = skeleton.world_position_of(&self.start);
        let to_target = target - start_world;
        let raw_distance = to_target.norm();
        if raw_distance < MIN_TARGET_DISTANCE {
            trace!(chain = %self.start, "ik target at start joint, skipping");
            return;
        }
        let distance = raw_distance.min(self.chain_length * REACH_LIMIT);
        let target_dir = to_target / raw_distance;
        // Out-of-reach targets collapse onto the reach sphere.
        let clamped_target = start_world + target_dir * distance;

        let a = self.upper_length;
        let b = self.lower_length;
        let c = distance;
        let mid_angle = ((a * a + b * b - c * c) / (2.0 * a * b)).clamp(-1.0, 1.0).acos();
        let start_angle = ((a * a + c * c - b * b) / (2.0 * a * c)).clamp(-1.0, 1.0).acos();

        // Bend plane normal. Degenerate when the target lies on the rest
        // axis; fall back to X so a straight-down target still bends sanely.
        let bend_axis = Unit::try_new(DEFAULT_DOWN.cross(&target_dir), 1e-6)
            .unwrap_or_else(Vector3::x_axis);
        let aim_angle = DEFAULT_DOWN.angle(&target_dir);

        // The upper segment overshoots the aim direction by the start
        // angle; the mid bend then folds the lower segment back onto the
        // target.
        let upper_dir = UnitQuaternion::from_axis_angle(&bend_axis, aim_angle + start_angle) * DEFAULT_DOWN;

        // Rest offsets of the chain need not descend the default axis
        // (the shoulder of the aim chain sits out to the side), so map the
        // actual rest directions onto the solved ones.
        let mid_rest = skeleton.bone(&self.mid).map(|bone| bone.rest_position).unwrap_or(DEFAULT_DOWN);
        let end_rest = skeleton.bone(&self.end).map(|bone| bone.rest_position).unwrap_or(DEFAULT_DOWN);
        let start_world_rotation = UnitQuaternion::rotation_between(&mid_rest, &upper_dir)
            .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&bend_axis, PI));

        let mid_world = start_world + start_world_rotation * mid_rest;
        let lower_dir = start_world_rotation.inverse() * (clamped_target - mid_world);
        let mid_local = UnitQuaternion::rotation_between(&end_rest, &lower_dir)
            .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&bend_axis, PI));

        let parent_rotation = skeleton
            .arena()
            .get(start_index)
            .and_then(|node| node.parent())
            .map(|parent| skeleton.arena().world_transform(parent).rotation)
            .unwrap_or_else(UnitQuaternion::identity);
        let start_local = parent_rotation.inverse() * start_world_rotation;

        skeleton.set_joint_rotation(&self.start, start_local);
        skeleton.set_joint_rotation(&self.mid, mid_local);
        trace!(
            chain = %self.start,
            distance,
            mid_bend = PI - mid_angle,
            "ik solved"
        );
    }
}
