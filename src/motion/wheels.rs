// Wheel-mode drive table for the two continuous-rotation feet
//
// In wheel mode the feet are the drive wheels. They are mounted mirrored, so
// driving straight needs opposite speeds and spinning on the spot needs equal
// ones.

use std::time::Duration;

use crate::messages::{TurnDirection, WalkDirection};

/// Foot speed used to roll forward or backward
pub const DRIVE_SPEED: i32 = 50;

/// Foot speed used to spin on the spot
pub const TURN_SPEED: i32 = 30;

/// Continuous-rotation speed limit in either direction
pub const MAX_FOOT_SPEED: i32 = 100;

/// Speed commands for the left and right foot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FootSpeeds {
    pub left: i32,
    pub right: i32,
}

impl FootSpeeds {
    /// Build a pair, clamped to the servo's speed range
    pub fn new(left: i32, right: i32) -> Self {
        Self {
            left: left.clamp(-MAX_FOOT_SPEED, MAX_FOOT_SPEED),
            right: right.clamp(-MAX_FOOT_SPEED, MAX_FOOT_SPEED),
        }
    }
}

/// Speeds for rolling straight
pub fn drive_speeds(direction: WalkDirection) -> FootSpeeds {
    match direction {
        WalkDirection::Forward => FootSpeeds::new(DRIVE_SPEED, -DRIVE_SPEED),
        WalkDirection::Backward => FootSpeeds::new(-DRIVE_SPEED, DRIVE_SPEED),
    }
}

/// Speeds for spinning on the spot
pub fn turn_speeds(direction: TurnDirection) -> FootSpeeds {
    match direction {
        TurnDirection::Left => FootSpeeds::new(-TURN_SPEED, -TURN_SPEED),
        TurnDirection::Right => FootSpeeds::new(TURN_SPEED, TURN_SPEED),
    }
}

/// How long to roll for `steps` gait-equivalent steps
pub fn drive_duration(steps: f32, period_ms: u32) -> Duration {
    scaled_millis(steps, period_ms)
}

/// Spins take half a period per step
pub fn turn_duration(steps: f32, period_ms: u32) -> Duration {
    scaled_millis(steps, period_ms / 2)
}

fn scaled_millis(steps: f32, period_ms: u32) -> Duration {
    let millis = (steps.max(0.0) * period_ms as f32) as u64;
    Duration::from_millis(millis)
}
