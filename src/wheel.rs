//! Wheel spin selection.
//!
//! The dock picks the winner once and broadcasts it; every surface renders
//! its own animation from the same `(segments, winner_index, stop_angle)`
//! triple. Visual agreement across surfaces therefore depends on the stop
//! angle being a deterministic function of the inputs. The random draw
//! happens exactly once, here.

use crate::protocol::WheelSegment;

/// Full rotations before the wheel settles.
pub const SPINS: u32 = 5;
/// Renderer animation length. Senders assume this; there is no
/// animation-complete acknowledgement from renderers.
pub const SPIN_ANIMATION_MS: u64 = 4000;
/// Lead time between broadcasting a spin and the animation starting, so a
/// target surface can mount the wheel first.
pub const SPIN_START_DELAY_MS: u64 = 500;
/// How long the settled wheel lingers on the winner before `SPIN_END`.
pub const SPIN_WINNER_HOLD_MS: u64 = 1500;

#[derive(Clone, Debug, PartialEq)]
pub struct SpinPlan {
    pub segments: Vec<WheelSegment>,
    pub winner_index: usize,
    pub stop_angle: f64,
}

/// Rotation (degrees) at which the wheel stops centered on the winning
/// segment, after [`SPINS`] full turns.
pub fn stop_angle(segment_count: usize, winner_index: usize) -> f64 {
    let seg = 360.0 / segment_count as f64;
    f64::from(SPINS) * 360.0 + (360.0 - (winner_index as f64 + 0.5) * seg)
}

/// Pick a winner uniformly at random. Rejects an empty candidate list.
pub fn plan_spin(segments: Vec<WheelSegment>) -> Option<SpinPlan> {
    if segments.is_empty() {
        return None;
    }
    let winner_index = fastrand::usize(..segments.len());
    Some(plan_with_winner(segments, winner_index))
}

/// Deterministic plan for a known winner (renderers, tests).
pub fn plan_with_winner(segments: Vec<WheelSegment>, winner_index: usize) -> SpinPlan {
    let stop_angle = stop_angle(segments.len(), winner_index);
    SpinPlan {
        segments,
        winner_index,
        stop_angle,
    }
}
