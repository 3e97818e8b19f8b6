// Eight-phase walking gait for the Otto leg/foot servos
//
// Each phase is a set of direct position targets (no interpolation). Legs tilt
// the body around the neutral 90 deg stance; feet are continuous-rotation
// servos, so a foot "position" above or below 90 spins it one way or the other
// and 90 stops it.

use std::time::Duration;

use super::channel::ChannelId;
use crate::messages::{TurnDirection, WalkDirection};

/// Phases in one gait cycle
pub const GAIT_PHASES: usize = 8;

/// Settle time after each phase
pub const GAIT_PHASE_DELAY: Duration = Duration::from_millis(300);

/// Neutral stance for legs, stop position for feet (deg)
pub const INITIAL_ANGLE: f32 = 90.0;

/// Leg lift relative to neutral for the swinging side (deg)
pub const LEG_LIFT_ANGLE: f32 = 60.0;

/// Leg tilt relative to neutral for the supporting side (deg)
pub const LEG_SUPPORT_ANGLE: f32 = 30.0;

/// Leg angle held while the foot pushes (deg)
pub const LEG_PUSH_ANGLE: f32 = 50.0;

/// Foot drive values: 120 spins forward, 60 backward, 90 is stopped
pub const FOOT_FORWARD_ANGLE: f32 = 120.0;
pub const FOOT_BACKWARD_ANGLE: f32 = 60.0;
pub const FOOT_NEUTRAL_ANGLE: f32 = 90.0;

/// Gentle foot drive used while turning on the spot
pub const FOOT_TURN_LEFT_ANGLE: f32 = 100.0;
pub const FOOT_TURN_RIGHT_ANGLE: f32 = 80.0;

/// Direction the gait steps in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    Forward,
    Backward,
    Left,
    Right,
}

impl From<WalkDirection> for Heading {
    fn from(direction: WalkDirection) -> Self {
        match direction {
            WalkDirection::Forward => Heading::Forward,
            WalkDirection::Backward => Heading::Backward,
        }
    }
}

impl From<TurnDirection> for Heading {
    fn from(direction: TurnDirection) -> Self {
        match direction {
            TurnDirection::Left => Heading::Left,
            TurnDirection::Right => Heading::Right,
        }
    }
}

/// Left foot drive during phase 1
fn left_foot_push(heading: Heading) -> f32 {
    match heading {
        Heading::Forward => FOOT_FORWARD_ANGLE,
        Heading::Backward => FOOT_BACKWARD_ANGLE,
        Heading::Left => FOOT_TURN_LEFT_ANGLE,
        Heading::Right => FOOT_TURN_RIGHT_ANGLE,
    }
}

/// Right foot drive during phase 5, mirrored from the left foot
fn right_foot_push(heading: Heading) -> f32 {
    match heading {
        Heading::Forward => FOOT_BACKWARD_ANGLE,
        Heading::Backward => FOOT_FORWARD_ANGLE,
        Heading::Left => FOOT_TURN_LEFT_ANGLE,
        Heading::Right => FOOT_TURN_RIGHT_ANGLE,
    }
}

/// Position writes for one gait phase, in the order they are issued
///
/// Phases outside 0..8 produce no writes.
pub fn phase_targets(phase: usize, heading: Heading) -> Vec<(ChannelId, f32)> {
    use ChannelId::*;

    match phase {
        // Right leg lifts, left leg supports
        0 => vec![
            (RightLeg, INITIAL_ANGLE + LEG_LIFT_ANGLE),
            (LeftLeg, INITIAL_ANGLE + LEG_SUPPORT_ANGLE),
        ],
        // Left foot pushes
        1 => vec![
            (RightLeg, INITIAL_ANGLE + LEG_PUSH_ANGLE),
            (LeftFoot, left_foot_push(heading)),
        ],
        2 => vec![(LeftFoot, FOOT_NEUTRAL_ANGLE)],
        3 => vec![(LeftLeg, INITIAL_ANGLE), (RightLeg, INITIAL_ANGLE)],
        // Left leg lifts, right leg supports
        4 => vec![
            (LeftLeg, INITIAL_ANGLE - LEG_LIFT_ANGLE),
            (RightLeg, INITIAL_ANGLE - LEG_SUPPORT_ANGLE),
        ],
        // Right foot pushes
        5 => vec![
            (LeftLeg, INITIAL_ANGLE - LEG_PUSH_ANGLE),
            (RightFoot, right_foot_push(heading)),
        ],
        6 => vec![(RightFoot, FOOT_NEUTRAL_ANGLE)],
        7 => vec![(LeftLeg, INITIAL_ANGLE), (RightLeg, INITIAL_ANGLE)],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_foot_drive() {
        assert_eq!(
            phase_targets(1, Heading::Forward)[1],
            (ChannelId::LeftFoot, 120.0)
        );
        assert_eq!(
            phase_targets(5, Heading::Forward)[1],
            (ChannelId::RightFoot, 60.0)
        );
    }

    #[test]
    fn test_backward_mirrors_forward() {
        assert_eq!(phase_targets(1, Heading::Backward)[1].1, 60.0);
        assert_eq!(phase_targets(5, Heading::Backward)[1].1, 120.0);
    }

    #[test]
    fn test_turn_headings_use_gentle_drive() {
        for phase in [1, 5] {
            assert_eq!(phase_targets(phase, Heading::Left)[1].1, 100.0);
            assert_eq!(phase_targets(phase, Heading::Right)[1].1, 80.0);
        }
    }

    #[test]
    fn test_leg_angles_stay_in_servo_range() {
        for heading in [
            Heading::Forward,
            Heading::Backward,
            Heading::Left,
            Heading::Right,
        ] {
            for phase in 0..GAIT_PHASES {
                for (_, angle) in phase_targets(phase, heading) {
                    assert!((0.0..=180.0).contains(&angle));
                }
            }
        }
    }

    #[test]
    fn test_cycle_ends_in_neutral_stance() {
        let last = phase_targets(GAIT_PHASES - 1, Heading::Forward);
        assert_eq!(
            last,
            vec![(ChannelId::LeftLeg, 90.0), (ChannelId::RightLeg, 90.0)]
        );
    }

    #[test]
    fn test_unknown_phase_is_empty() {
        assert!(phase_targets(8, Heading::Forward).is_empty());
    }

    #[test]
    fn test_heading_conversions() {
        assert_eq!(Heading::from(WalkDirection::Backward), Heading::Backward);
        assert_eq!(Heading::from(TurnDirection::Left), Heading::Left);
    }
}
