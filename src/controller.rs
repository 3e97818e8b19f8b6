// Action queue and worker
//
// Callers submit validated actions into a bounded FIFO. A single worker task,
// started on the first submission, runs each action to completion against the
// motion engine. Stop is cooperative: it bumps the stop generation, which the
// engine notices at its next tick and the worker uses to drop stale queue
// entries.

use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{ACTION_QUEUE_CAPACITY, POST_ACTION_PAUSE, QUEUE_POLL, STOP_WAIT};
use crate::messages::{ActionCommand, RobotStatus, TRIM_RANGE, Trims};
use crate::motion::{ChannelId, MotionEngine, MotionError, StopSignal, TrimInbox};
use crate::trims::{StoreError, TrimStore, load_trims};

/// Error types for the controller surface
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Action queue is closed")]
    QueueClosed,

    #[error("Action queue is full")]
    QueueFull,

    #[error(transparent)]
    Trim(#[from] TrimError),
}

/// Calibration failures, reported back to the caller as text
#[derive(Debug, thiserror::Error)]
pub enum TrimError {
    #[error(
        "Unknown servo type {0:?}, use: left_leg, right_leg, left_foot, right_foot, left_hand, right_hand"
    )]
    UnknownServo(String),

    #[error("Trim {value} is outside {min}..={max}")]
    OutOfRange { value: i32, min: i32, max: i32 },

    #[error("Robot has no hand servos configured")]
    NoHands,

    #[error("Failed to persist trim: {0}")]
    Store(#[from] StoreError),

    #[error("Trim write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Action tagged with the stop generation it was queued under
#[derive(Debug)]
struct QueuedAction {
    command: ActionCommand,
    generation: u64,
}

struct Worker {
    tx: mpsc::Sender<QueuedAction>,
    task: JoinHandle<()>,
}

/// State shared with the worker task
struct Shared {
    in_progress: watch::Sender<bool>,
    stop: StopSignal,
}

/// Owned entry point for everything that moves the robot
pub struct ActionController {
    engine: Arc<Mutex<MotionEngine>>,
    trim_inbox: TrimInbox,
    has_hands: bool,
    store: Arc<std::sync::Mutex<Box<dyn TrimStore>>>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl ActionController {
    /// Wrap an engine, applying the stored trims to it
    pub fn new(mut engine: MotionEngine, store: Box<dyn TrimStore>) -> Self {
        let trims = load_trims(&*store);
        info!("Loaded trims from store: {:?}", trims);
        engine.set_trims(&trims);

        let (in_progress, _) = watch::channel(false);
        Self {
            trim_inbox: engine.trim_inbox(),
            has_hands: engine.has_hands(),
            engine: Arc::new(Mutex::new(engine)),
            store: Arc::new(std::sync::Mutex::new(store)),
            shared: Arc::new(Shared {
                in_progress,
                stop: StopSignal::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Create the controller and queue the boot pose (hands down)
    pub async fn start(
        engine: MotionEngine,
        store: Box<dyn TrimStore>,
    ) -> Result<Self, ControllerError> {
        let controller = Self::new(engine, store);
        controller
            .submit(ActionCommand::Home { hands_down: true })
            .await?;
        Ok(controller)
    }

    /// Queue an action, waiting for space when the queue is full
    pub async fn submit(&self, command: ActionCommand) -> Result<(), ControllerError> {
        info!("Queueing action: {:?}", command);
        let tx = self.ensure_worker().await;
        tx.send(self.tag(command))
            .await
            .map_err(|_| ControllerError::QueueClosed)
    }

    /// Queue an action without waiting; fails with `QueueFull` instead
    pub async fn try_submit(&self, command: ActionCommand) -> Result<(), ControllerError> {
        let tx = self.ensure_worker().await;
        tx.try_send(self.tag(command)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ControllerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ControllerError::QueueClosed,
        })
    }

    fn tag(&self, command: ActionCommand) -> QueuedAction {
        QueuedAction {
            command,
            generation: self.shared.stop.generation(),
        }
    }

    /// Start the worker unless one is already running
    async fn ensure_worker(&self) -> mpsc::Sender<QueuedAction> {
        let mut worker = self.worker.lock().await;
        match worker.as_ref() {
            Some(running) if !running.task.is_finished() => return running.tx.clone(),
            _ => {}
        }

        debug!("Starting action worker");
        let (tx, rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        let task = tokio::spawn(run_worker(
            Arc::clone(&self.engine),
            Arc::clone(&self.shared),
            rx,
        ));
        *worker = Some(Worker { tx: tx.clone(), task });
        tx
    }

    pub fn status(&self) -> RobotStatus {
        if *self.shared.in_progress.borrow() {
            RobotStatus::Moving
        } else {
            RobotStatus::Idle
        }
    }

    /// Watch the in-progress flag
    pub fn subscribe_progress(&self) -> watch::Receiver<bool> {
        self.shared.in_progress.subscribe()
    }

    /// Interrupt the current action, drop queued ones, then go home
    pub async fn stop(&self) -> Result<(), ControllerError> {
        self.interrupt();
        self.home_when_settled().await
    }

    /// First half of [`stop`](Self::stop): raise the stop generation
    ///
    /// Actions queued before this call are discarded, actions queued after it
    /// run normally.
    pub fn interrupt(&self) -> u64 {
        let generation = self.shared.stop.raise();
        info!("Stop requested (generation {})", generation);
        generation
    }

    /// Second half of [`stop`](Self::stop): wait up to `STOP_WAIT` for the
    /// interrupted action to settle, then queue `Home(true)`
    pub async fn home_when_settled(&self) -> Result<(), ControllerError> {
        let mut progress = self.shared.in_progress.subscribe();
        let settled = timeout(STOP_WAIT, progress.wait_for(|moving| !*moving))
            .await
            .is_ok();
        if !settled {
            warn!("Action did not settle within {:?}", STOP_WAIT);
        }

        self.submit(ActionCommand::Home { hands_down: true }).await
    }

    /// Stop the worker and drop the queue
    pub async fn shutdown(&self) {
        let Some(Worker { tx, mut task }) = self.worker.lock().await.take() else {
            return;
        };
        info!("Shutting down action worker");
        self.shared.stop.raise();
        drop(tx);
        if timeout(STOP_WAIT, &mut task).await.is_err() {
            warn!("Action worker did not exit in time, aborting");
            task.abort();
        }
    }

    /// Stored trims, re-read from the store
    pub async fn trims(&self) -> Trims {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        load_trims(&**store)
    }

    /// Calibrate one servo, persist it and apply all six trims
    pub async fn set_trim(&self, servo_type: &str, value: i32) -> Result<String, TrimError> {
        let id = ChannelId::from_name(servo_type)
            .ok_or_else(|| TrimError::UnknownServo(servo_type.to_string()))?;
        if !TRIM_RANGE.contains(&value) {
            return Err(TrimError::OutOfRange {
                value,
                min: *TRIM_RANGE.start(),
                max: *TRIM_RANGE.end(),
            });
        }
        if id.is_hand() && !self.has_hands {
            return Err(TrimError::NoHands);
        }
        info!("Setting servo trim: {} = {}", id, value);

        // File stores write synchronously; keep that off the async threads
        let store = Arc::clone(&self.store);
        let trims = tokio::task::spawn_blocking(move || -> Result<Trims, TrimError> {
            let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
            let mut trims = load_trims(&**store);
            trims.set(id, value);
            store.set(id.name(), value)?;
            Ok(trims)
        })
        .await??;

        // Idle engine takes the trims now, a busy one at its next tick
        self.trim_inbox.post(trims);
        if let Ok(mut engine) = self.engine.try_lock() {
            engine.apply_pending_trims();
        }

        Ok(format!(
            "Servo {} trim set to {} degrees and saved",
            id, value
        ))
    }
}

/// Run one action against the engine, homing after locomotion
async fn execute(engine: &mut MotionEngine, command: &ActionCommand) -> Result<(), MotionError> {
    match *command {
        ActionCommand::Walk {
            steps,
            period_ms,
            direction,
            spin_foot,
        } => engine.walk(steps, period_ms, direction, spin_foot).await?,
        ActionCommand::Turn {
            steps,
            period_ms,
            direction,
            arm_swing,
        } => engine.turn(steps, period_ms, direction, arm_swing).await?,
        ActionCommand::Home { hands_down } => engine.home(hands_down).await?,
        ActionCommand::EnterWheelMode => engine.enter_wheel_mode().await?,
        ActionCommand::EnterFootMode => engine.enter_foot_mode().await?,
        ActionCommand::Attack {
            side,
            cycles,
            period_ms,
        } => engine.attack(side, cycles, period_ms).await?,
    }

    if command.homes_afterwards() {
        engine.home(false).await?;
    }
    Ok(())
}

async fn run_worker(
    engine: Arc<Mutex<MotionEngine>>,
    shared: Arc<Shared>,
    mut rx: mpsc::Receiver<QueuedAction>,
) {
    loop {
        let queued = match timeout(QUEUE_POLL, rx.recv()).await {
            Ok(Some(queued)) => queued,
            Ok(None) => {
                debug!("Action queue closed, worker exiting");
                return;
            }
            Err(_) => {
                // idle: pick up calibration that missed the last action
                engine.lock().await.apply_pending_trims();
                continue;
            }
        };

        let token = shared.stop.token_for(queued.generation);
        if token.is_cancelled() {
            debug!("Dropping {:?} queued before stop", queued.command);
            continue;
        }

        info!("Executing action: {:?}", queued.command);
        shared.in_progress.send_replace(true);
        {
            let mut engine = engine.lock().await;
            engine.bind_cancel(token);
            if let Err(MotionError::Cancelled) = execute(&mut engine, &queued.command).await {
                warn!("Action {:?} interrupted by stop", queued.command);
                engine.halt();
            }
            engine.apply_pending_trims();
        }
        shared.in_progress.send_replace(false);
        sleep(POST_ACTION_PAUSE).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{AttackSide, WalkDirection};
    use crate::motion::{ServoLog, ServoWrite, simulated_channels};
    use crate::trims::MemoryTrimStore;
    use std::time::Duration;

    fn controller_with(
        present: &[ChannelId],
        store: MemoryTrimStore,
    ) -> (ActionController, ServoLog) {
        let log = ServoLog::new();
        let engine = MotionEngine::new(simulated_channels(present, Some(&log)));
        let controller = ActionController::new(engine, Box::new(store));
        log.clear();
        (controller, log)
    }

    /// Long enough on virtual time for any queued test action to finish
    async fn settle() {
        sleep(Duration::from_secs(5)).await;
    }

    #[test]
    fn test_stored_trims_applied_at_construction() {
        let log = ServoLog::new();
        let engine = MotionEngine::new(simulated_channels(&ChannelId::ALL, Some(&log)));
        let mut store = MemoryTrimStore::new();
        store.set("left_leg", 5).unwrap();

        let _controller = ActionController::new(engine, Box::new(store));
        assert!(
            log.snapshot()
                .contains(&ServoWrite::Trim(ChannelId::LeftLeg, 5))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_follows_action() {
        let (controller, _log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());
        assert_eq!(controller.status(), RobotStatus::Idle);

        controller
            .submit(ActionCommand::Attack {
                side: AttackSide::Both,
                cycles: 1,
                period_ms: 1000,
            })
            .await
            .unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.status(), RobotStatus::Moving);

        settle().await;
        assert_eq!(controller.status(), RobotStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_is_followed_by_home() {
        let (controller, _log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());
        controller
            .submit(ActionCommand::EnterWheelMode)
            .await
            .unwrap();
        controller
            .submit(ActionCommand::Walk {
                steps: 1.0,
                period_ms: 500,
                direction: WalkDirection::Forward,
                spin_foot: false,
            })
            .await
            .unwrap();
        settle().await;

        let engine = controller.engine.lock().await;
        assert!(engine.is_wheel_mode());
        assert!(engine.is_resting());
        assert_eq!(engine.position(ChannelId::LeftLeg), Some(180.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_and_rehomes() {
        let (controller, log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());
        controller
            .submit(ActionCommand::EnterWheelMode)
            .await
            .unwrap();
        let walk = ActionCommand::Walk {
            steps: 50.0,
            period_ms: 1000,
            direction: WalkDirection::Forward,
            spin_foot: false,
        };
        controller.submit(walk).await.unwrap();
        controller.submit(walk).await.unwrap();
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(controller.status(), RobotStatus::Moving);

        controller.stop().await.unwrap();
        settle().await;
        assert_eq!(controller.status(), RobotStatus::Idle);

        // Second walk was dropped: only one drive command ever issued
        let drives = log
            .snapshot()
            .iter()
            .filter(|w| **w == ServoWrite::Speed(ChannelId::LeftFoot, 50))
            .count();
        assert_eq!(drives, 1);

        let engine = controller.engine.lock().await;
        assert!(engine.is_resting());
        assert_eq!(engine.position(ChannelId::RightLeg), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_trim_validates_and_persists() {
        let (controller, log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());

        assert!(matches!(
            controller.set_trim("tail", 3).await,
            Err(TrimError::UnknownServo(_))
        ));
        assert!(matches!(
            controller.set_trim("left_leg", 51).await,
            Err(TrimError::OutOfRange { .. })
        ));

        let reply = controller.set_trim("right_foot", -8).await.unwrap();
        assert!(reply.contains("right_foot"));
        assert_eq!(controller.trims().await.right_foot, -8);
        assert!(log.snapshot().contains(&ServoWrite::Trim(ChannelId::RightFoot, -8)));
        // All six re-applied together
        assert_eq!(
            log.snapshot()
                .iter()
                .filter(|w| matches!(w, ServoWrite::Trim(..)))
                .count(),
            6
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hand_trim_without_hands() {
        let legs_and_feet = [
            ChannelId::LeftLeg,
            ChannelId::RightLeg,
            ChannelId::LeftFoot,
            ChannelId::RightFoot,
        ];
        let (controller, _log) = controller_with(&legs_and_feet, MemoryTrimStore::new());
        assert!(matches!(
            controller.set_trim("left_hand", 2).await,
            Err(TrimError::NoHands)
        ));
        assert_eq!(controller.trims().await.left_hand, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_submit_reports_full_queue() {
        let (controller, _log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());
        let long_walk = ActionCommand::Walk {
            steps: 100.0,
            period_ms: 1500,
            direction: WalkDirection::Backward,
            spin_foot: false,
        };
        controller.submit(long_walk).await.unwrap();
        sleep(Duration::from_millis(10)).await; // worker takes the first one

        for _ in 0..ACTION_QUEUE_CAPACITY {
            controller.try_submit(long_walk).await.unwrap();
        }
        assert!(matches!(
            controller.try_submit(long_walk).await,
            Err(ControllerError::QueueFull)
        ));
        controller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_then_submit_restarts_worker() {
        let (controller, _log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());
        controller
            .submit(ActionCommand::Home { hands_down: true })
            .await
            .unwrap();
        settle().await;
        controller.shutdown().await;

        controller
            .submit(ActionCommand::EnterWheelMode)
            .await
            .unwrap();
        settle().await;
        assert!(controller.engine.lock().await.is_wheel_mode());
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_waits_for_queue_space() {
        let (controller, _log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());
        controller
            .submit(ActionCommand::Walk {
                steps: 1.0,
                period_ms: 1000,
                direction: WalkDirection::Forward,
                spin_foot: false,
            })
            .await
            .unwrap();
        sleep(Duration::from_millis(10)).await; // worker takes the walk

        let home = ActionCommand::Home { hands_down: true };
        for _ in 0..ACTION_QUEUE_CAPACITY {
            controller.submit(home).await.unwrap();
        }

        let waiting = controller.submit(home);
        tokio::pin!(waiting);
        assert!(
            timeout(Duration::from_millis(500), &mut waiting)
                .await
                .is_err()
        );
        assert_eq!(controller.status(), RobotStatus::Moving);

        // Walk (8 phases + home) ends, the worker takes a queued home, a slot frees up
        timeout(Duration::from_secs(10), &mut waiting)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_gives_up_waiting_after_stop_wait() {
        let (controller, _log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());

        // Worker marks itself busy, then blocks on the engine we hold
        let guard = controller.engine.lock().await;
        controller
            .submit(ActionCommand::EnterWheelMode)
            .await
            .unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.status(), RobotStatus::Moving);

        let start = tokio::time::Instant::now();
        controller.stop().await.unwrap();
        assert!(start.elapsed() >= STOP_WAIT);
        drop(guard);

        settle().await;
        assert_eq!(controller.status(), RobotStatus::Idle);
        let engine = controller.engine.lock().await;
        // Stale wheel-mode request was cut off before the legs folded out
        assert!(!engine.is_wheel_mode());
        assert!(engine.is_resting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_applies_trims_that_missed_the_engine() {
        let (controller, log) = controller_with(&ChannelId::ALL, MemoryTrimStore::new());
        controller
            .submit(ActionCommand::Home { hands_down: true })
            .await
            .unwrap();
        settle().await;

        {
            let _busy = controller.engine.lock().await;
            controller.set_trim("left_leg", 7).await.unwrap();
        }
        assert!(!log.snapshot().contains(&ServoWrite::Trim(ChannelId::LeftLeg, 7)));

        sleep(QUEUE_POLL + Duration::from_millis(100)).await;
        assert!(log.snapshot().contains(&ServoWrite::Trim(ChannelId::LeftLeg, 7)));
    }
}
