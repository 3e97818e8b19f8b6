// Actuator channel abstraction for the Otto wheel robot
//
// The engine never talks to servo hardware directly. Each of the six outputs is
// reached through an `ActuatorChannel`; a slot without a pin holds no channel and
// is skipped by every operation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of actuator slots on the robot
pub const CHANNEL_COUNT: usize = 6;

/// Fixed channel identifiers, usable as array indices
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    LeftLeg = 0,
    RightLeg = 1,
    LeftFoot = 2,
    RightFoot = 3,
    LeftHand = 4,
    RightHand = 5,
}

impl ChannelId {
    pub const ALL: [ChannelId; CHANNEL_COUNT] = [
        ChannelId::LeftLeg,
        ChannelId::RightLeg,
        ChannelId::LeftFoot,
        ChannelId::RightFoot,
        ChannelId::LeftHand,
        ChannelId::RightHand,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used for persistence keys and calibration requests
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::LeftLeg => "left_leg",
            ChannelId::RightLeg => "right_leg",
            ChannelId::LeftFoot => "left_foot",
            ChannelId::RightFoot => "right_foot",
            ChannelId::LeftHand => "left_hand",
            ChannelId::RightHand => "right_hand",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }

    pub fn is_hand(self) -> bool {
        matches!(self, ChannelId::LeftHand | ChannelId::RightHand)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One servo-like output
///
/// Positions are in degrees (0-180) and exclude the trim; the channel adds its
/// trim when driving the hardware. Speeds are continuous-rotation magnitudes in
/// -100..=100 and only meaningful for feet in wheel mode.
pub trait ActuatorChannel: Send {
    /// Last commanded position in degrees
    fn position(&self) -> f32;

    fn set_position(&mut self, degrees: f32);

    fn trim(&self) -> i32;

    fn set_trim(&mut self, trim: i32);

    /// Spin as a continuous-rotation servo
    fn set_speed(&mut self, speed: i32);

    fn stop_rotation(&mut self);

    /// Limit slew rate to `degrees_per_sec`
    fn set_limiter(&mut self, degrees_per_sec: u32);

    fn disable_limiter(&mut self);
}

pub type BoxedChannel = Box<dyn ActuatorChannel>;

/// Channel table owned by the motion engine, indexed by [`ChannelId`]
#[derive(Default)]
pub struct Channels {
    slots: [Option<BoxedChannel>; CHANNEL_COUNT],
}

impl Channels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, id: ChannelId, channel: BoxedChannel) -> Self {
        self.insert(id, channel);
        self
    }

    pub fn insert(&mut self, id: ChannelId, channel: BoxedChannel) {
        self.slots[id.index()] = Some(channel);
    }

    pub fn is_present(&self, id: ChannelId) -> bool {
        self.slots[id.index()].is_some()
    }

    pub fn get(&self, id: ChannelId) -> Option<&BoxedChannel> {
        self.slots[id.index()].as_ref()
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut BoxedChannel> {
        self.slots[id.index()].as_mut()
    }

    /// Identifiers of every channel with hardware behind it
    pub fn present(&self) -> impl Iterator<Item = ChannelId> + '_ {
        ChannelId::ALL
            .into_iter()
            .filter(move |&id| self.is_present(id))
    }
}
