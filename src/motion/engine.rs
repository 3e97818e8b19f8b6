// Motion engine: interpolated moves, gait, wheel/foot mode and hand gestures
//
// The engine owns the six channels exclusively. All timing runs on tokio's
// monotonic clock; every wait goes through `hold`, which checks the cancel token
// once per 10 ms tick so a stop request never leaves a loop running.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, info, warn};

use super::cancel::CancelToken;
use super::channel::{CHANNEL_COUNT, ChannelId, Channels};
use super::gait::{self, FOOT_NEUTRAL_ANGLE, GAIT_PHASE_DELAY, GAIT_PHASES, Heading, INITIAL_ANGLE};
use super::wheels::{self, FootSpeeds};
use crate::messages::{AttackSide, Trims, TurnDirection, WalkDirection};

/// Interpolation step
pub const TICK: Duration = Duration::from_millis(10);

/// Extra ticks allowed for the corrective pass after an interpolated move
pub const CONVERGENCE_TICKS: u32 = 10;

/// Duration of the interpolated move to the home pose (ms)
pub const HOME_MOVE_MS: u32 = 500;

/// Settle time after every home request
pub const HOME_SETTLE: Duration = Duration::from_millis(200);

/// Hand rest angle (deg)
pub const HAND_HOME_ANGLE: f32 = 90.0;

/// Hand angles that keep the arms clear of the legs while they swing out (deg)
pub const HAND_CLEAR_LEFT_ANGLE: f32 = 50.0;
pub const HAND_CLEAR_RIGHT_ANGLE: f32 = 130.0;

/// Leg angles that fold the feet out into wheels (deg)
pub const WHEEL_LEFT_LEG_ANGLE: f32 = 180.0;
pub const WHEEL_RIGHT_LEG_ANGLE: f32 = 0.0;

/// Raised hand angles for an attack swing (deg)
pub const ATTACK_LEFT_ANGLE: f32 = 30.0;
pub const ATTACK_RIGHT_ANGLE: f32 = 150.0;

/// Default servo slew limit (deg/s)
pub const SERVO_LIMIT_DEFAULT: u32 = 240;

const HAND_CLEAR_SETTLE: Duration = Duration::from_millis(100);
const WHEEL_MODE_SETTLE: Duration = Duration::from_millis(200);
const FOOT_MODE_SETTLE: Duration = Duration::from_millis(500);
const ATTACK_RECOVER: Duration = Duration::from_millis(100);

/// Why a motion stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MotionError {
    #[error("Motion cancelled by stop request")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MotionError>;

/// Trim values waiting to be applied by the engine
///
/// Calibration can arrive while a motion holds the engine; the engine picks up
/// the latest posted trims at its next tick.
#[derive(Debug, Clone, Default)]
pub struct TrimInbox {
    pending: Arc<Mutex<Option<Trims>>>,
}

impl TrimInbox {
    pub fn post(&self, trims: Trims) {
        *self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(trims);
    }

    fn take(&self) -> Option<Trims> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Drives the six Otto channels
pub struct MotionEngine {
    channels: Channels,
    resting: bool,
    wheel_mode: bool,
    has_hands: bool,
    cancel: CancelToken,
    trim_inbox: TrimInbox,
}

impl MotionEngine {
    /// Take ownership of the channel table and park the feet
    pub fn new(mut channels: Channels) -> Self {
        let has_hands =
            channels.is_present(ChannelId::LeftHand) && channels.is_present(ChannelId::RightHand);
        info!(
            "Motion engine initialised {} hand servos",
            if has_hands { "with" } else { "without" }
        );

        // Continuous-rotation feet stop at 90
        for foot in [ChannelId::LeftFoot, ChannelId::RightFoot] {
            if let Some(channel) = channels.get_mut(foot) {
                channel.set_position(FOOT_NEUTRAL_ANGLE);
            }
        }

        Self {
            channels,
            resting: false,
            wheel_mode: false,
            has_hands,
            cancel: CancelToken::never(),
            trim_inbox: TrimInbox::default(),
        }
    }

    pub fn is_resting(&self) -> bool {
        self.resting
    }

    pub fn set_resting(&mut self, resting: bool) {
        self.resting = resting;
    }

    pub fn is_wheel_mode(&self) -> bool {
        self.wheel_mode
    }

    pub fn has_hands(&self) -> bool {
        self.has_hands
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Current commanded position of a channel, `None` when absent
    pub fn position(&self, id: ChannelId) -> Option<f32> {
        self.channels.get(id).map(|channel| channel.position())
    }

    /// Token polled by every wait from now on
    pub fn bind_cancel(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    /// Handle for posting trims from outside the engine
    pub fn trim_inbox(&self) -> TrimInbox {
        self.trim_inbox.clone()
    }

    // === Timing ===

    /// Poll point: apply pending trims, then bail out if stopped
    fn checkpoint(&mut self) -> Result<()> {
        self.apply_pending_trims();
        if self.cancel.is_cancelled() {
            Err(MotionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait for `duration`, checking for a stop once per tick
    async fn hold(&mut self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            sleep_until((now + TICK).min(deadline)).await;
        }
    }

    // === Channel writes ===

    fn write_position(&mut self, id: ChannelId, degrees: f32) {
        if let Some(channel) = self.channels.get_mut(id) {
            channel.set_position(degrees);
        }
    }

    fn write_all(&mut self, targets: &[f32; CHANNEL_COUNT]) {
        for id in ChannelId::ALL {
            self.write_position(id, targets[id.index()]);
        }
    }

    fn on_target(&self, targets: &[f32; CHANNEL_COUNT]) -> bool {
        ChannelId::ALL.into_iter().all(|id| {
            self.channels
                .get(id)
                .is_none_or(|channel| channel.position() == targets[id.index()])
        })
    }

    // === Trims ===

    /// Apply trims to every present channel
    ///
    /// Hand trims are ignored on robots without hands.
    pub fn set_trims(&mut self, trims: &Trims) {
        debug!("Applying trims {:?}", trims);
        for id in ChannelId::ALL {
            if id.is_hand() && !self.has_hands {
                continue;
            }
            if let Some(channel) = self.channels.get_mut(id) {
                channel.set_trim(trims.get(id));
            }
        }
    }

    /// Apply the most recently posted trims, if any
    pub fn apply_pending_trims(&mut self) {
        if let Some(trims) = self.trim_inbox.take() {
            self.set_trims(&trims);
        }
    }

    // === Basic motion ===

    /// Interpolate every present channel to `targets` over `duration_ms`
    ///
    /// Short moves (10 ms or less) jump straight to the targets. A corrective
    /// pass of up to [`CONVERGENCE_TICKS`] ticks then forces stragglers onto
    /// their target; unreachable targets are accepted once it runs out.
    pub async fn move_servos(
        &mut self,
        duration_ms: u32,
        targets: [f32; CHANNEL_COUNT],
    ) -> Result<()> {
        self.resting = false;
        let duration = Duration::from_millis(duration_ms as u64);

        if duration > TICK {
            let tick_count = duration.as_secs_f32() / TICK.as_secs_f32();
            let mut increments = [0.0f32; CHANNEL_COUNT];
            for id in self.channels.present() {
                let current = self.position(id).unwrap_or(targets[id.index()]);
                increments[id.index()] = (targets[id.index()] - current) / tick_count;
            }

            let deadline = Instant::now() + duration;
            let mut tick = interval(TICK);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await; // first tick completes immediately

            while Instant::now() < deadline {
                self.checkpoint()?;
                for id in ChannelId::ALL {
                    if let Some(channel) = self.channels.get_mut(id) {
                        let next = channel.position() + increments[id.index()];
                        channel.set_position(next);
                    }
                }
                tick.tick().await;
            }
        } else {
            self.write_all(&targets);
            self.hold(duration).await?;
        }

        let mut corrections = 0;
        while corrections < CONVERGENCE_TICKS && !self.on_target(&targets) {
            self.write_all(&targets);
            self.hold(TICK).await?;
            corrections += 1;
        }
        if !self.on_target(&targets) {
            debug!("Move ended short of target after {} corrections", corrections);
        }
        Ok(())
    }

    /// Set one channel directly; out-of-range positions fall back to 90
    pub fn move_single(&mut self, position: i32, id: ChannelId) {
        let position = if (0..=180).contains(&position) {
            position
        } else {
            90
        };
        self.resting = false;
        self.write_position(id, position as f32);
    }

    /// Go to the rest pose for the current mode, unless already resting
    ///
    /// With `hands_down` the hands return to 90, otherwise they stay put.
    pub async fn home(&mut self, hands_down: bool) -> Result<()> {
        if !self.resting {
            let mut homes = [INITIAL_ANGLE; CHANNEL_COUNT];
            for id in ChannelId::ALL {
                homes[id.index()] = match id {
                    ChannelId::LeftHand | ChannelId::RightHand if !hands_down => {
                        self.position(id).unwrap_or(HAND_HOME_ANGLE)
                    }
                    ChannelId::LeftHand | ChannelId::RightHand => HAND_HOME_ANGLE,
                    ChannelId::LeftLeg if self.wheel_mode => WHEEL_LEFT_LEG_ANGLE,
                    ChannelId::RightLeg if self.wheel_mode => WHEEL_RIGHT_LEG_ANGLE,
                    _ => INITIAL_ANGLE,
                };
            }
            self.move_servos(HOME_MOVE_MS, homes).await?;
            self.resting = true;
        }
        self.hold(HOME_SETTLE).await
    }

    // === Locomotion ===

    /// Walk forward or backward
    ///
    /// Rolls on the feet in wheel mode, otherwise runs the gait sequencer.
    /// `spin_foot` is accepted for compatibility; foot mode always steps.
    pub async fn walk(
        &mut self,
        steps: f32,
        period_ms: u32,
        direction: WalkDirection,
        spin_foot: bool,
    ) -> Result<()> {
        if self.wheel_mode {
            let run_time = wheels::drive_duration(steps, period_ms);
            self.roll(wheels::drive_speeds(direction), run_time).await?;
            info!(
                "Wheel mode walk: dir={:?}, steps={:.1}, time={}ms",
                direction,
                steps,
                run_time.as_millis()
            );
        } else {
            if spin_foot {
                debug!("spin_foot ignored in foot mode");
            }
            self.walk_sequence(steps, period_ms, direction.into(), 0)
                .await?;
            info!(
                "Foot mode walk: dir={:?}, steps={:.1}, period={}",
                direction, steps, period_ms
            );
        }
        Ok(())
    }

    /// Turn left or right
    ///
    /// Spins on the spot in wheel mode, otherwise runs the gait sequencer.
    pub async fn turn(
        &mut self,
        steps: f32,
        period_ms: u32,
        direction: TurnDirection,
        arm_swing: u32,
    ) -> Result<()> {
        if self.wheel_mode {
            let run_time = wheels::turn_duration(steps, period_ms);
            self.roll(wheels::turn_speeds(direction), run_time).await?;
            info!(
                "Wheel mode turn: dir={:?}, steps={:.1}, time={}ms",
                direction,
                steps,
                run_time.as_millis()
            );
        } else {
            self.walk_sequence(steps, period_ms, direction.into(), arm_swing)
                .await?;
            info!(
                "Foot mode turn: dir={:?}, steps={:.1}, period={}",
                direction, steps, period_ms
            );
        }
        Ok(())
    }

    /// Spin the feet at `speeds` for `run_time`, then stop them
    async fn roll(&mut self, speeds: FootSpeeds, run_time: Duration) -> Result<()> {
        self.resting = false;
        self.set_foot_speed(speeds.left, speeds.right);
        let held = self.hold(run_time).await;
        // Feet stop even when interrupted
        self.stop_foot();
        held
    }

    /// Step `floor(steps)` full gait cycles, then home without moving the hands
    ///
    /// Phases are fixed-length; `period_ms` and `arm_swing` do not change the
    /// phase table.
    pub async fn walk_sequence(
        &mut self,
        steps: f32,
        period_ms: u32,
        heading: Heading,
        arm_swing: u32,
    ) -> Result<()> {
        self.resting = false;
        let cycles = steps.max(0.0).floor() as u32;
        debug!(
            "Gait: {} cycles {:?} (period={}, arm_swing={})",
            cycles, heading, period_ms, arm_swing
        );

        for _ in 0..cycles {
            for phase in 0..GAIT_PHASES {
                self.checkpoint()?;
                self.execute_gait_phase(phase, heading);
                self.hold(GAIT_PHASE_DELAY).await?;
            }
        }

        self.home(false).await
    }

    /// Issue the position writes for one gait phase
    pub fn execute_gait_phase(&mut self, phase: usize, heading: Heading) {
        for (id, angle) in gait::phase_targets(phase, heading) {
            self.write_position(id, angle);
        }
    }

    // === Wheel mode ===

    /// Spin the feet as wheels (-100..=100)
    pub fn set_foot_speed(&mut self, left: i32, right: i32) {
        let speeds = FootSpeeds::new(left, right);
        if let Some(foot) = self.channels.get_mut(ChannelId::LeftFoot) {
            foot.set_speed(speeds.left);
        }
        if let Some(foot) = self.channels.get_mut(ChannelId::RightFoot) {
            foot.set_speed(speeds.right);
        }
    }

    pub fn stop_foot(&mut self) {
        for id in [ChannelId::LeftFoot, ChannelId::RightFoot] {
            if let Some(foot) = self.channels.get_mut(id) {
                foot.stop_rotation();
            }
        }
    }

    /// Fold the legs out so the feet can roll as wheels
    pub async fn enter_wheel_mode(&mut self) -> Result<()> {
        if self.wheel_mode {
            debug!("Already in wheel mode");
            return Ok(());
        }

        if self.has_hands {
            self.write_position(ChannelId::LeftHand, HAND_CLEAR_LEFT_ANGLE);
            self.write_position(ChannelId::RightHand, HAND_CLEAR_RIGHT_ANGLE);
        }
        self.hold(HAND_CLEAR_SETTLE).await?;

        self.write_position(ChannelId::LeftFoot, FOOT_NEUTRAL_ANGLE);
        self.write_position(ChannelId::RightFoot, FOOT_NEUTRAL_ANGLE);
        self.write_position(ChannelId::LeftLeg, WHEEL_LEFT_LEG_ANGLE);
        self.write_position(ChannelId::RightLeg, WHEEL_RIGHT_LEG_ANGLE);

        // The legs are already out; a stop here still counts as wheel mode
        self.wheel_mode = true;
        self.resting = false;
        self.hold(WHEEL_MODE_SETTLE).await?;

        if self.has_hands {
            self.write_position(ChannelId::LeftHand, HAND_HOME_ANGLE);
            self.write_position(ChannelId::RightHand, HAND_HOME_ANGLE);
        }

        info!("Entered wheel mode - legs and feet adjusted");
        Ok(())
    }

    /// Bring the legs back under the body for walking
    pub async fn enter_foot_mode(&mut self) -> Result<()> {
        if !self.wheel_mode {
            debug!("Already in foot mode");
            return Ok(());
        }

        self.stop_foot();
        self.write_position(ChannelId::LeftFoot, FOOT_NEUTRAL_ANGLE);
        self.write_position(ChannelId::RightFoot, FOOT_NEUTRAL_ANGLE);
        self.write_position(ChannelId::LeftLeg, INITIAL_ANGLE);
        self.write_position(ChannelId::RightLeg, INITIAL_ANGLE);

        self.wheel_mode = false;
        self.resting = false;
        self.hold(FOOT_MODE_SETTLE).await?;

        info!("Switched to foot mode - legs and feet adjusted");
        Ok(())
    }

    // === Hands ===

    /// Swing the requested hand(s) once
    ///
    /// `cycles` is accepted but a single swing is performed.
    pub async fn attack(&mut self, side: AttackSide, cycles: u32, period_ms: u32) -> Result<()> {
        if !self.has_hands {
            warn!("Hand servos not available, skipping attack");
            return Ok(());
        }
        if let Some(missing) = side
            .hands()
            .iter()
            .find(|&&hand| !self.channels.is_present(hand))
        {
            warn!("{} servo not available for {:?} attack", missing, side);
            return Ok(());
        }
        if cycles > 1 {
            debug!("Attack swings once, {} cycles requested", cycles);
        }

        self.resting = false;
        for &hand in side.hands() {
            let raised = match hand {
                ChannelId::LeftHand => ATTACK_LEFT_ANGLE,
                _ => ATTACK_RIGHT_ANGLE,
            };
            self.write_position(hand, raised);
        }
        self.hold(Duration::from_millis((period_ms / 2) as u64))
            .await?;

        for &hand in side.hands() {
            self.write_position(hand, HAND_HOME_ANGLE);
        }
        self.hold(ATTACK_RECOVER).await
    }

    // === Servo limiter ===

    pub fn enable_servo_limit(&mut self, degrees_per_sec: u32) {
        for id in ChannelId::ALL {
            if let Some(channel) = self.channels.get_mut(id) {
                channel.set_limiter(degrees_per_sec);
            }
        }
    }

    pub fn disable_servo_limit(&mut self) {
        for id in ChannelId::ALL {
            if let Some(channel) = self.channels.get_mut(id) {
                channel.disable_limiter();
            }
        }
    }

    // === Interruption ===

    /// Leave the channels in a safe pose after an interrupted motion
    ///
    /// Feet stop spinning; in foot mode they are also parked at their stop
    /// position since gait phases drive them positionally.
    pub fn halt(&mut self) {
        self.resting = false;
        self.stop_foot();
        if !self.wheel_mode {
            self.write_position(ChannelId::LeftFoot, FOOT_NEUTRAL_ANGLE);
            self.write_position(ChannelId::RightFoot, FOOT_NEUTRAL_ANGLE);
        }
        debug!("Motion halted");
    }
}
