// Simulated servo channel
//
// Stands in for hardware when no servo board is attached, and records every
// write so motion sequences can be checked without a robot.

use std::sync::{Arc, Mutex};
use tracing::debug;

use super::channel::{ActuatorChannel, ChannelId, Channels};

/// Position a servo reports before it has been commanded
pub const SIM_INITIAL_POSITION: f32 = 90.0;

/// One write observed on a simulated channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServoWrite {
    Position(ChannelId, f32),
    Speed(ChannelId, i32),
    Stop(ChannelId),
    Trim(ChannelId, i32),
    Limiter(ChannelId, Option<u32>),
}

impl ServoWrite {
    pub fn channel(&self) -> ChannelId {
        match *self {
            ServoWrite::Position(id, _)
            | ServoWrite::Speed(id, _)
            | ServoWrite::Stop(id)
            | ServoWrite::Trim(id, _)
            | ServoWrite::Limiter(id, _) => id,
        }
    }
}

/// Shared, ordered log of writes across all simulated channels
#[derive(Debug, Clone, Default)]
pub struct ServoLog {
    writes: Arc<Mutex<Vec<ServoWrite>>>,
}

impl ServoLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, write: ServoWrite) {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(write);
    }

    /// Copy of every write so far, oldest first
    pub fn snapshot(&self) -> Vec<ServoWrite> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory servo: clamps like the real thing, never moves on its own
#[derive(Debug)]
pub struct SimServo {
    id: ChannelId,
    position: f32,
    trim: i32,
    speed: i32,
    limiter: Option<u32>,
    log: Option<ServoLog>,
}

impl SimServo {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            position: SIM_INITIAL_POSITION,
            trim: 0,
            speed: 0,
            limiter: None,
            log: None,
        }
    }

    /// Create a servo that reports its writes into `log`
    pub fn logged(id: ChannelId, log: &ServoLog) -> Self {
        Self {
            log: Some(log.clone()),
            ..Self::new(id)
        }
    }

    /// Angle the horn would actually sit at, trim included
    pub fn output_degrees(&self) -> f32 {
        (self.position + self.trim as f32).clamp(0.0, 180.0)
    }

    pub fn speed(&self) -> i32 {
        self.speed
    }

    pub fn limiter(&self) -> Option<u32> {
        self.limiter
    }

    fn record(&self, write: ServoWrite) {
        if let Some(log) = &self.log {
            log.push(write);
        }
    }
}

impl ActuatorChannel for SimServo {
    fn position(&self) -> f32 {
        self.position
    }

    fn set_position(&mut self, degrees: f32) {
        self.position = degrees.clamp(0.0, 180.0);
        self.record(ServoWrite::Position(self.id, self.position));
    }

    fn trim(&self) -> i32 {
        self.trim
    }

    fn set_trim(&mut self, trim: i32) {
        self.trim = trim;
        self.record(ServoWrite::Trim(self.id, trim));
    }

    fn set_speed(&mut self, speed: i32) {
        self.speed = speed.clamp(-100, 100);
        self.record(ServoWrite::Speed(self.id, self.speed));
    }

    fn stop_rotation(&mut self) {
        self.speed = 0;
        self.record(ServoWrite::Stop(self.id));
    }

    fn set_limiter(&mut self, degrees_per_sec: u32) {
        self.limiter = Some(degrees_per_sec);
        self.record(ServoWrite::Limiter(self.id, self.limiter));
    }

    fn disable_limiter(&mut self) {
        self.limiter = None;
        self.record(ServoWrite::Limiter(self.id, None));
    }
}

/// Build a channel table of simulated servos for every id in `present`
pub fn simulated_channels(present: &[ChannelId], log: Option<&ServoLog>) -> Channels {
    let mut channels = Channels::new();
    for &id in present {
        let servo = match log {
            Some(log) => SimServo::logged(id, log),
            None => SimServo::new(id),
        };
        debug!("Attaching simulated servo for {}", id);
        channels.insert(id, Box::new(servo));
    }
    channels
}
