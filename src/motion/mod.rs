// Motion control for the Otto wheel robot
//
// Provides:
// - Actuator channel trait and the fixed six-slot channel table
// - Simulated servos for running without hardware
// - Gait phase table and wheel-mode drive table
// - The motion engine (interpolation, gait, mode transitions, gestures)

mod cancel;
pub mod channel;
mod engine;
pub mod gait;
pub mod sim;
pub mod wheels;

pub use cancel::{CancelToken, StopSignal};
pub use channel::{ActuatorChannel, BoxedChannel, CHANNEL_COUNT, ChannelId, Channels};
pub use engine::{MotionEngine, MotionError, SERVO_LIMIT_DEFAULT, TICK, TrimInbox};
pub use gait::Heading;
pub use sim::{ServoLog, ServoWrite, SimServo, simulated_channels};
pub use wheels::FootSpeeds;
