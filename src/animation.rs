/*! Keyframed clips and the idle/walk/fire animation state machine.
 *
 * The controller is frame-stepped: `update` advances playback, runs the
 * transition rules and returns the sampled [Pose] for the skeleton to
 * apply. Firing preempts everything and auto-reverts after the clip's
 * fixed duration via a countdown carried in the controller itself; there
 * is no OS timer to race against, and a stale countdown expiring outside
 * the fire state is a no-op.
 */

use crate::skeleton::Pose;
use nalgebra::{UnitQuaternion, Vector3};
use tracing::{debug, trace};

/// Seconds over which a freshly entered clip is blended in.
const BLEND_IN_SECONDS: f32 = 0.15;

/// The three clips every character carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipId {
    Idle,
    Walk,
    Fire,
}

impl ClipId {
    pub fn as_str(self) -> &'static str {
        match self {
            ClipId::Idle => "idle",
            ClipId::Walk => "walk",
            ClipId::Fire => "fire",
        }
    }
}

/// One authored key: frame number and an XYZ euler rotation. Converted to
/// a unit quaternion before any blending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub frame: f32,
    pub rotation: Vector3<f32>,
}

impl Keyframe {
    pub fn new(frame: f32, x: f32, y: f32, z: f32) -> Self {
        Keyframe {
            frame,
            rotation: Vector3::new(x, y, z),
        }
    }

    fn quaternion(&self) -> UnitQuaternion<f32> {
        UnitQuaternion::from_euler_angles(self.rotation.x, self.rotation.y, self.rotation.z)
    }
}

/// Keyframes of one joint within a clip.
#[derive(Debug, Clone)]
pub struct JointTrack {
    pub joint: String,
    pub keys: Vec<Keyframe>,
}

/// A named, looping-or-not sequence of per-joint keyframes.
#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub id: ClipId,
    pub fps: f32,
    /// Duration in frames.
    pub duration: f32,
    pub looping: bool,
    pub tracks: Vec<JointTrack>,
}

/// Symmetric ease-in/ease-out (smoothstep) applied between keys.
fn ease_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

impl AnimationClip {
    pub fn duration_seconds(&self) -> f32 {
        self.duration / self.fps
    }

    /// Samples all tracks at `frame` into a partial pose.
    pub fn sample(&self, frame: f32) -> Pose {
        let mut pose = Pose::new();
        for track in &self.tracks {
            if let Some(rotation) = sample_track(&track.keys, frame) {
                pose.set(&track.joint, rotation);
            }
        }
        pose
    }
}

fn sample_track(keys: &[Keyframe], frame: f32) -> Option<UnitQuaternion<f32>> {
    let first = keys.first()?;
    let last = keys.last()?;
    if frame <= first.frame {
        return Some(first.quaternion());
    }
    if frame >= last.frame {
        return Some(last.quaternion());
    }
    let next_index = keys.iter().position(|key| key.frame > frame)?;
    let before = &keys[next_index - 1];
    let after = &keys[next_index];
    let span = (after.frame - before.frame).max(f32::EPSILON);
    let t = ease_in_out((frame - before.frame) / span);
    Some(before.quaternion().slerp(&after.quaternion(), t))
}

/// Authored clip tables for the humanoid mech rig.
pub mod clips {
    use super::*;

    fn track(joint: &str, keys: Vec<Keyframe>) -> JointTrack {
        JointTrack {
            joint: joint.to_string(),
            keys,
        }
    }

    /// Gentle breathing sway, looping.
    pub fn idle() -> AnimationClip {
        let key = Keyframe::new;
        AnimationClip {
            id: ClipId::Idle,
            fps: 30.0,
            duration: 60.0,
            looping: true,
            tracks: vec![
                track("torso", vec![key(0.0, 0.0, 0.0, 0.0), key(30.0, 0.02, 0.0, 0.015), key(60.0, 0.0, 0.0, 0.0)]),
                track("armL", vec![key(0.0, 0.0, 0.0, 0.05), key(30.0, 0.04, 0.0, 0.07), key(60.0, 0.0, 0.0, 0.05)]),
                track("armR", vec![key(0.0, 0.0, 0.0, -0.05), key(30.0, 0.04, 0.0, -0.07), key(60.0, 0.0, 0.0, -0.05)]),
                track("head", vec![key(0.0, 0.0, 0.0, 0.0), key(30.0, 0.03, 0.0, 0.0), key(60.0, 0.0, 0.0, 0.0)]),
            ],
        }
    }

    /// Alternating leg/arm swing, looping; playback rate is scaled by the
    /// character's walk-speed multiplier.
    pub fn walk() -> AnimationClip {
        let key = Keyframe::new;
        AnimationClip {
            id: ClipId::Walk,
            fps: 30.0,
            duration: 30.0,
            looping: true,
            tracks: vec![
                track("legL", vec![key(0.0, 0.5, 0.0, 0.0), key(15.0, -0.5, 0.0, 0.0), key(30.0, 0.5, 0.0, 0.0)]),
                track("legR", vec![key(0.0, -0.5, 0.0, 0.0), key(15.0, 0.5, 0.0, 0.0), key(30.0, -0.5, 0.0, 0.0)]),
                track("armL", vec![key(0.0, -0.35, 0.0, 0.05), key(15.0, 0.35, 0.0, 0.05), key(30.0, -0.35, 0.0, 0.05)]),
                track("armR", vec![key(0.0, 0.35, 0.0, -0.05), key(15.0, -0.35, 0.0, -0.05), key(30.0, 0.35, 0.0, -0.05)]),
                track("torso", vec![key(0.0, 0.05, 0.0, 0.03), key(15.0, 0.05, 0.0, -0.03), key(30.0, 0.05, 0.0, 0.03)]),
            ],
        }
    }

    /// One-shot firing recoil on the weapon arm.
    pub fn fire() -> AnimationClip {
        let key = Keyframe::new;
        AnimationClip {
            id: ClipId::Fire,
            fps: 30.0,
            duration: 12.0,
            looping: false,
            tracks: vec![
                track("armR", vec![
                    key(0.0, -1.4, 0.0, 0.0),
                    key(2.0, -1.7, 0.0, 0.1),
                    key(6.0, -1.45, 0.0, 0.0),
                    key(12.0, -1.4, 0.0, 0.0),
                ]),
                track("torso", vec![key(0.0, 0.0, 0.0, 0.0), key(2.0, -0.06, 0.0, 0.0), key(12.0, 0.0, 0.0, 0.0)]),
            ],
        }
    }
}

/// Playback bookkeeping, mutated only by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationState {
    pub current: ClipId,
    pub previous: Option<ClipId>,
    /// Frames into the current clip.
    pub progress: f32,
    /// 0..=1 blend-in factor after a transition.
    pub blend_weight: f32,
}

#[derive(Debug, Clone, Copy)]
struct PendingReturn {
    remaining: f32,
    target: ClipId,
}

/// Finite-state animation driver for one character.
#[derive(Debug)]
pub struct AnimationController {
    idle: AnimationClip,
    walk: AnimationClip,
    fire: AnimationClip,
    state: AnimationState,
    pending_return: Option<PendingReturn>,
    walk_speed: f32,
    playing: bool,
    disposed: bool,
}

impl AnimationController {
    pub fn new(walk_speed: f32) -> Self {
        AnimationController {
            idle: clips::idle(),
            walk: clips::walk(),
            fire: clips::fire(),
            state: AnimationState {
                current: ClipId::Idle,
                previous: None,
                progress: 0.0,
                blend_weight: 1.0,
            },
            pending_return: None,
            walk_speed,
            playing: true,
            disposed: false,
        }
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn current(&self) -> ClipId {
        self.state.current
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.disposed
    }

    /// Seconds left on the fire auto-return, if one is scheduled.
    pub fn pending_return_in(&self) -> Option<f32> {
        self.pending_return.map(|pending| pending.remaining)
    }

    fn clip(&self, id: ClipId) -> &AnimationClip {
        match id {
            ClipId::Idle => &self.idle,
            ClipId::Walk => &self.walk,
            ClipId::Fire => &self.fire,
        }
    }

    /// Switches to `clip`. Idempotent for repeated idle/walk requests;
    /// a fire request always restarts playback and reschedules the
    /// auto-return countdown, without touching the recorded prior state.
    pub fn play(&mut self, clip: ClipId) {
        if self.disposed {
            return;
        }
        self.playing = true;
        if clip == self.state.current {
            if clip != ClipId::Fire {
                return;
            }
            // Re-trigger: restart playback and schedule a fresh return.
            // The countdown may have been cancelled by stop(); fire must
            // never be active without a way out.
            self.state.progress = 0.0;
            let target = if self.state.previous == Some(ClipId::Walk) {
                ClipId::Walk
            } else {
                ClipId::Idle
            };
            self.pending_return = Some(PendingReturn {
                remaining: self.fire.duration_seconds(),
                target,
            });
            trace!("fire re-triggered");
            return;
        }

        self.state.previous = Some(self.state.current);
        self.state.current = clip;
        self.state.progress = 0.0;
        self.state.blend_weight = 0.0;
        self.pending_return = match clip {
            ClipId::Fire => {
                let target = if self.state.previous == Some(ClipId::Walk) {
                    ClipId::Walk
                } else {
                    ClipId::Idle
                };
                Some(PendingReturn {
                    remaining: self.fire.duration_seconds(),
                    target,
                })
            }
            _ => None,
        };
        debug!(clip = clip.as_str(), "animation transition");
    }

    /// Advances playback by `dt` seconds under the per-frame driving
    /// signals and returns the pose to apply this frame.
    pub fn update(&mut self, dt: f32, is_moving: bool, is_firing: bool) -> Pose {
        if self.disposed {
            return Pose::new();
        }
        if is_firing {
            // Preempts everything; re-triggering is handled inside play.
            self.play(ClipId::Fire);
        } else if self.state.current != ClipId::Fire {
            if is_moving {
                self.play(ClipId::Walk);
            } else {
                self.play(ClipId::Idle);
            }
        }
        self.playing = true;

        let rate = match self.state.current {
            ClipId::Walk => self.walk_speed,
            _ => 1.0,
        };
        let (fps, duration, looping) = {
            let clip = self.clip(self.state.current);
            (clip.fps, clip.duration, clip.looping)
        };
        self.state.progress += dt * fps * rate;
        if looping {
            self.state.progress %= duration;
        } else {
            self.state.progress = self.state.progress.min(duration);
        }
        self.state.blend_weight = (self.state.blend_weight + dt / BLEND_IN_SECONDS).min(1.0);

        if let Some(pending) = &mut self.pending_return {
            pending.remaining -= dt;
            if pending.remaining <= 0.0 {
                let target = pending.target;
                self.pending_return = None;
                // Guard against a stale countdown: only honor it while the
                // fire clip is still the active one.
                if self.state.current == ClipId::Fire {
                    self.state.previous = Some(ClipId::Fire);
                    self.state.current = target;
                    self.state.progress = 0.0;
                    self.state.blend_weight = 0.0;
                    debug!(clip = target.as_str(), "fire auto-return");
                }
            }
        }

        self.sample()
    }

    fn sample(&self) -> Pose {
        let sampled = self.clip(self.state.current).sample(self.state.progress);
        if self.state.blend_weight >= 1.0 {
            return sampled;
        }
        // Blend in from the rest pose after a transition.
        let mut blended = Pose::new();
        for (joint, rotation) in sampled.iter() {
            blended.set(joint, UnitQuaternion::identity().slerp(rotation, self.state.blend_weight));
        }
        blended
    }

    /// Halts all three clips, cancels any pending auto-return and drops
    /// back to the idle state. Leaving fire here matters: the cancelled
    /// countdown is what would otherwise exit it.
    pub fn stop(&mut self) {
        self.playing = false;
        self.pending_return = None;
        self.state.progress = 0.0;
        if self.state.current != ClipId::Idle {
            self.state.previous = Some(self.state.current);
            self.state.current = ClipId::Idle;
            self.state.blend_weight = 0.0;
        }
    }

    /// Stops and releases clip resources. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop();
        self.idle.tracks.clear();
        self.walk.tracks.clear();
        self.fire.tracks.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f32 = 1.0 / 60.0;

    #[test_log::test]
    fn idle_to_walk_transitions_exactly_once() {
        let mut controller = AnimationController::new(1.0);
        assert_eq!(controller.current(), ClipId::Idle);

        controller.update(DT, true, false);
        assert_eq!(controller.current(), ClipId::Walk);
        assert_eq!(controller.state().previous, Some(ClipId::Idle));

        let progress_after_one = controller.state().progress;
        controller.update(DT, true, false);
        // Still walking; progress advances instead of restarting.
        assert_eq!(controller.current(), ClipId::Walk);
        assert!(controller.state().progress > progress_after_one);
    }

    #[test_log::test]
    fn fire_preempts_and_schedules_one_return() {
        let mut controller = AnimationController::new(1.0);
        controller.update(DT, true, false);
        assert_eq!(controller.current(), ClipId::Walk);

        controller.update(DT, false, true);
        assert_eq!(controller.current(), ClipId::Fire);
        assert!(controller.pending_return_in().is_some());

        // Movement flags are ignored while firing.
        controller.update(DT, true, false);
        assert_eq!(controller.current(), ClipId::Fire);

        // Ride the countdown out; we must return to walk (the prior state).
        let mut guard = 0;
        while controller.current() == ClipId::Fire {
            controller.update(DT, false, false);
            guard += 1;
            assert!(guard < 1000, "auto-return never fired");
        }
        assert_eq!(controller.current(), ClipId::Walk);
        assert!(controller.pending_return_in().is_none());
    }

    #[test_log::test]
    fn fire_from_idle_returns_to_idle() {
        let mut controller = AnimationController::new(1.0);
        controller.update(DT, false, true);
        assert_eq!(controller.current(), ClipId::Fire);
        let duration = clips::fire().duration_seconds();
        controller.update(duration + 0.01, false, false);
        assert_eq!(controller.current(), ClipId::Idle);
    }

    #[test_log::test]
    fn retrigger_resets_timer_without_changing_state() {
        let mut controller = AnimationController::new(1.0);
        controller.update(DT, false, true);
        let full = controller.pending_return_in().unwrap();

        // Let the countdown run down a little.
        controller.update(0.2, false, false);
        let partial = controller.pending_return_in().unwrap();
        assert!(partial < full - 0.1);

        let previous_before = controller.state().previous;
        controller.update(DT, false, true);
        assert_eq!(controller.current(), ClipId::Fire);
        assert_eq!(controller.state().previous, previous_before);
        // Timer is back near the full duration (one dt was consumed).
        assert!(controller.pending_return_in().unwrap() > partial);
    }

    #[test_log::test]
    fn keys_interpolate_with_easing() {
        let keys = vec![
            Keyframe::new(0.0, 0.0, 0.0, 0.0),
            Keyframe::new(10.0, 1.0, 0.0, 0.0),
        ];
        let start = sample_track(&keys, 0.0).unwrap();
        let mid = sample_track(&keys, 5.0).unwrap();
        let end = sample_track(&keys, 10.0).unwrap();
        assert_relative_eq!(start.angle(), 0.0, epsilon = 1e-6);
        // Smoothstep is 0.5 at the midpoint.
        assert_relative_eq!(mid.angle(), 0.5, epsilon = 1e-4);
        assert_relative_eq!(end.angle(), 1.0, epsilon = 1e-5);

        // Easing: a quarter of the way in lags the linear ramp.
        let quarter = sample_track(&keys, 2.5).unwrap();
        assert!(quarter.angle() < 0.25);
        assert!(quarter.angle() > 0.0);
    }

    #[test_log::test]
    fn clip_beyond_last_key_clamps() {
        let fire = clips::fire();
        let pose = fire.sample(fire.duration + 100.0);
        assert!(!pose.is_empty());
    }

    #[test_log::test]
    fn stop_during_fire_does_not_strand_the_state_machine() {
        let mut controller = AnimationController::new(1.0);
        controller.update(DT, true, false);
        controller.update(DT, false, true);
        assert_eq!(controller.current(), ClipId::Fire);

        controller.stop();
        assert_eq!(controller.current(), ClipId::Idle);
        // Resumed driving transitions normally instead of wedging in fire.
        controller.update(DT, true, false);
        assert_eq!(controller.current(), ClipId::Walk);
        controller.update(DT, false, false);
        assert_eq!(controller.current(), ClipId::Idle);
    }

    #[test_log::test]
    fn fire_after_stop_schedules_a_fresh_return() {
        let mut controller = AnimationController::new(1.0);
        controller.update(DT, false, true);
        controller.stop();
        assert!(controller.pending_return_in().is_none());

        // A new trigger must always carry its own way out of fire.
        controller.update(DT, false, true);
        assert_eq!(controller.current(), ClipId::Fire);
        assert!(controller.pending_return_in().is_some());

        let mut guard = 0;
        while controller.current() == ClipId::Fire {
            controller.update(DT, false, false);
            guard += 1;
            assert!(guard < 1000, "auto-return never fired");
        }
        assert_eq!(controller.current(), ClipId::Idle);
    }

    #[test_log::test]
    fn stop_cancels_pending_return() {
        let mut controller = AnimationController::new(1.0);
        controller.update(DT, false, true);
        assert!(controller.pending_return_in().is_some());
        controller.stop();
        assert!(!controller.is_playing());
        assert!(controller.pending_return_in().is_none());
        assert_relative_eq!(controller.state().progress, 0.0);
    }

    #[test_log::test]
    fn dispose_is_idempotent_and_quiesces_updates() {
        let mut controller = AnimationController::new(1.0);
        controller.dispose();
        controller.dispose();
        assert!(controller.is_disposed());
        let pose = controller.update(DT, true, true);
        assert!(pose.is_empty());
        assert_eq!(controller.current(), ClipId::Idle);
    }

    #[test_log::test]
    fn walk_speed_scales_playback() {
        let mut slow = AnimationController::new(0.5);
        let mut fast = AnimationController::new(2.0);
        slow.update(DT, true, false);
        fast.update(DT, true, false);
        slow.update(0.1, true, false);
        fast.update(0.1, true, false);
        assert!(fast.state().progress > slow.state().progress);
    }
}
