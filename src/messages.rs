// Message types exchanged with the command surface

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

use crate::motion::{CHANNEL_COUNT, ChannelId};

/// Numeric action codes on the wire
pub const ACTION_WALK: i32 = 1;
pub const ACTION_TURN: i32 = 2;
pub const ACTION_WHEEL_MODE: i32 = 3;
pub const ACTION_FOOT_MODE: i32 = 4;
pub const ACTION_HOME: i32 = 5;
pub const ACTION_ATTACK: i32 = 6;

/// Numeric direction codes on the wire
pub const DIR_FORWARD: i32 = 1;
pub const DIR_BACKWARD: i32 = 2;
pub const DIR_LEFT: i32 = 3;
pub const DIR_RIGHT: i32 = 4;
pub const DIR_BOTH: i32 = 5;

/// Accepted ranges, checked here and never inside the engine
pub const STEPS_RANGE: RangeInclusive<i32> = 1..=100;
pub const PERIOD_RANGE: RangeInclusive<i32> = 500..=1500;
pub const CYCLES_RANGE: RangeInclusive<i32> = 1..=10;
pub const ARM_SWING_RANGE: RangeInclusive<i32> = 0..=170;
pub const SPIN_FOOT_RANGE: RangeInclusive<i32> = 0..=1;
pub const TRIM_RANGE: RangeInclusive<i32> = -50..=50;

// Raw action request from teleop/tools -> controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParams {
    pub action_type: i32,
    #[serde(default)]
    pub steps: i32,
    #[serde(default)]
    pub speed: i32,
    #[serde(default)]
    pub direction: i32,
    #[serde(default)]
    pub amount: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkDirection {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDirection {
    Left,
    Right,
}

/// Which hand(s) an attack swings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackSide {
    Left,
    Right,
    Both,
}

impl AttackSide {
    /// Hand channels the swing needs
    pub fn hands(self) -> &'static [ChannelId] {
        match self {
            AttackSide::Left => &[ChannelId::LeftHand],
            AttackSide::Right => &[ChannelId::RightHand],
            AttackSide::Both => &[ChannelId::LeftHand, ChannelId::RightHand],
        }
    }
}

/// A validated action, ready for the worker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionCommand {
    Walk {
        steps: f32,
        period_ms: u32,
        direction: WalkDirection,
        spin_foot: bool,
    },
    Turn {
        steps: f32,
        period_ms: u32,
        direction: TurnDirection,
        arm_swing: u32,
    },
    Home {
        hands_down: bool,
    },
    EnterWheelMode,
    EnterFootMode,
    Attack {
        side: AttackSide,
        cycles: u32,
        period_ms: u32,
    },
}

impl ActionCommand {
    /// Locomotion commands return to the home pose when they finish
    pub fn homes_afterwards(&self) -> bool {
        matches!(self, ActionCommand::Walk { .. } | ActionCommand::Turn { .. })
    }
}

/// Rejections at the command boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown action type {0}")]
    UnknownAction(i32),

    #[error("Invalid direction {direction} for {action}")]
    InvalidDirection { action: &'static str, direction: i32 },

    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },
}

fn check_range(
    field: &'static str,
    value: i32,
    range: RangeInclusive<i32>,
) -> Result<u32, CommandError> {
    if range.contains(&value) {
        // Every accepted range used for u32 fields starts at zero or above
        Ok(value.max(0) as u32)
    } else {
        Err(CommandError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

impl TryFrom<ActionParams> for ActionCommand {
    type Error = CommandError;

    fn try_from(params: ActionParams) -> Result<Self, Self::Error> {
        match params.action_type {
            ACTION_WALK => {
                let steps = check_range("steps", params.steps, STEPS_RANGE)?;
                let period_ms = check_range("speed", params.speed, PERIOD_RANGE)?;
                let spin_foot = check_range("spin_foot", params.amount, SPIN_FOOT_RANGE)?;
                let direction = match params.direction {
                    DIR_FORWARD => WalkDirection::Forward,
                    DIR_BACKWARD => WalkDirection::Backward,
                    direction => {
                        return Err(CommandError::InvalidDirection {
                            action: "walk",
                            direction,
                        });
                    }
                };
                Ok(ActionCommand::Walk {
                    steps: steps as f32,
                    period_ms,
                    direction,
                    spin_foot: spin_foot == 1,
                })
            }
            ACTION_TURN => {
                let steps = check_range("steps", params.steps, STEPS_RANGE)?;
                let period_ms = check_range("speed", params.speed, PERIOD_RANGE)?;
                let arm_swing = check_range("arm_swing", params.amount, ARM_SWING_RANGE)?;
                let direction = match params.direction {
                    DIR_LEFT => TurnDirection::Left,
                    DIR_RIGHT => TurnDirection::Right,
                    direction => {
                        return Err(CommandError::InvalidDirection {
                            action: "turn",
                            direction,
                        });
                    }
                };
                Ok(ActionCommand::Turn {
                    steps: steps as f32,
                    period_ms,
                    direction,
                    arm_swing,
                })
            }
            ACTION_WHEEL_MODE => Ok(ActionCommand::EnterWheelMode),
            ACTION_FOOT_MODE => Ok(ActionCommand::EnterFootMode),
            ACTION_HOME => Ok(ActionCommand::Home {
                hands_down: params.direction == DIR_FORWARD,
            }),
            ACTION_ATTACK => {
                let cycles = check_range("cycles", params.steps, CYCLES_RANGE)?;
                let period_ms = check_range("speed", params.speed, PERIOD_RANGE)?;
                let side = match params.direction {
                    DIR_LEFT => AttackSide::Left,
                    DIR_RIGHT => AttackSide::Right,
                    DIR_BOTH => AttackSide::Both,
                    direction => {
                        return Err(CommandError::InvalidDirection {
                            action: "attack",
                            direction,
                        });
                    }
                };
                Ok(ActionCommand::Attack {
                    side,
                    cycles,
                    period_ms,
                })
            }
            other => Err(CommandError::UnknownAction(other)),
        }
    }
}

/// Status reported to the command surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Moving,
    Idle,
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobotStatus::Moving => f.write_str("moving"),
            RobotStatus::Idle => f.write_str("idle"),
        }
    }
}

/// Per-channel trim offsets in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trims {
    pub left_leg: i32,
    pub right_leg: i32,
    pub left_foot: i32,
    pub right_foot: i32,
    pub left_hand: i32,
    pub right_hand: i32,
}

impl Trims {
    pub fn get(&self, id: ChannelId) -> i32 {
        self.as_array()[id.index()]
    }

    pub fn set(&mut self, id: ChannelId, value: i32) {
        let slot = match id {
            ChannelId::LeftLeg => &mut self.left_leg,
            ChannelId::RightLeg => &mut self.right_leg,
            ChannelId::LeftFoot => &mut self.left_foot,
            ChannelId::RightFoot => &mut self.right_foot,
            ChannelId::LeftHand => &mut self.left_hand,
            ChannelId::RightHand => &mut self.right_hand,
        };
        *slot = value;
    }

    /// Values in [`ChannelId`] order
    pub fn as_array(&self) -> [i32; CHANNEL_COUNT] {
        [
            self.left_leg,
            self.right_leg,
            self.left_foot,
            self.right_foot,
            self.left_hand,
            self.right_hand,
        ]
    }
}

/// Calibration request for a single servo
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrimRequest {
    pub servo_type: String,
    pub trim_value: i32,
}
