// Zenoh bridge: command topics in, status and trims out at 10 Hz
//
// Actions are queued without waiting so the publish loop keeps its rate; a
// full queue is logged and the action dropped. A stop takes effect before the
// tick's actions are looked at: those actions are dropped with it, and only the
// settle-then-home half of the stop runs in its own task.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

// local imports
use crate::config::{
    RobotConfig, STATUS_HZ, TOPIC_CMD_ACTION, TOPIC_CMD_STOP, TOPIC_CMD_TRIM, TOPIC_STATUS,
    TOPIC_TRIMS, TRIM_NAMESPACE,
};
use crate::controller::{ActionController, ControllerError, TrimError};
use crate::messages::{ActionCommand, ActionParams, CommandError, TrimRequest};
use crate::motion::{MotionEngine, simulated_channels};
use crate::trims::JsonTrimStore;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Malformed payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rejected action: {0}")]
    Command(#[from] CommandError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("Trim failed: {0}")]
    Trim(#[from] TrimError),
}

/// Build the engine described by `config` on simulated channels
pub fn build_engine(config: &RobotConfig) -> MotionEngine {
    let present = config.pins.present();
    info!("Channels present: {:?}", present);
    let mut engine = MotionEngine::new(simulated_channels(&present, None));
    if let Some(limit) = config.servo_limit {
        info!("Servo slew limit: {} deg/s", limit);
        engine.enable_servo_limit(limit);
    }
    engine
}

/// Translates bus payloads into controller calls
pub struct Bridge {
    controller: Arc<ActionController>,
}

impl Bridge {
    pub fn new(controller: Arc<ActionController>) -> Self {
        Self { controller }
    }

    /// Validate and queue an action payload
    pub async fn on_action(&self, payload: &[u8]) -> Result<ActionCommand, BridgeError> {
        let params: ActionParams = serde_json::from_slice(payload)?;
        let command = ActionCommand::try_from(params)?;
        self.controller.try_submit(command).await?;
        Ok(command)
    }

    /// Apply a calibration payload, returning the reply text
    pub async fn on_trim(&self, payload: &[u8]) -> Result<String, BridgeError> {
        let request: TrimRequest = serde_json::from_slice(payload)?;
        Ok(self
            .controller
            .set_trim(&request.servo_type, request.trim_value)
            .await?)
    }

    /// Stop, any payload; the interrupt is in effect when this returns
    pub fn on_stop(&self) {
        self.controller.interrupt();
        let controller = Arc::clone(&self.controller);
        tokio::spawn(async move {
            if let Err(e) = controller.home_when_settled().await {
                warn!("Stop failed: {}", e);
            }
        });
    }

    /// Handle one tick's worth of commands, returning how many actions were queued
    pub async fn on_commands(&self, stop_requested: bool, actions: &[Vec<u8>]) -> usize {
        if stop_requested {
            self.on_stop();
            if !actions.is_empty() {
                warn!("Dropped {} action(s) received with stop", actions.len());
            }
            return 0;
        }

        let mut accepted = 0;
        for payload in actions {
            match self.on_action(payload).await {
                Ok(command) => {
                    info!("Accepted action: {:?}", command);
                    accepted += 1;
                }
                Err(e) => warn!("Dropped action: {}", e),
            }
        }
        accepted
    }

    pub fn status_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.controller.status())
    }

    pub async fn trims_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.controller.trims().await)
    }
}

pub async fn run(config: RobotConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let engine = build_engine(&config);
    let store = JsonTrimStore::open(&config.trim_dir, TRIM_NAMESPACE)?;
    let controller = Arc::new(ActionController::start(engine, Box::new(store)).await?);
    let bridge = Bridge::new(Arc::clone(&controller));

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_action = session.declare_subscriber(TOPIC_CMD_ACTION).await?;
    let sub_trim = session.declare_subscriber(TOPIC_CMD_TRIM).await?;
    let sub_stop = session.declare_subscriber(TOPIC_CMD_STOP).await?;
    let pub_status = session.declare_publisher(TOPIC_STATUS).await?;
    let pub_trims = session.declare_publisher(TOPIC_TRIMS).await?;

    let mut tick = interval(Duration::from_millis(1000 / STATUS_HZ));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Bridge started: {}Hz status", STATUS_HZ);
    info!(
        "Subscribed to: {}, {}, {}",
        TOPIC_CMD_ACTION, TOPIC_CMD_TRIM, TOPIC_CMD_STOP
    );
    info!("Publishing to: {}, {}", TOPIC_STATUS, TOPIC_TRIMS);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Ctrl-C received, shutting down");
                break;
            }
        }

        // 1. Drain stop and actions (arrival order), then apply them
        let mut stop_requested = false;
        while let Ok(Some(_)) = sub_stop.try_recv() {
            stop_requested = true;
        }
        let mut actions = Vec::new();
        while let Ok(Some(sample)) = sub_action.try_recv() {
            actions.push(sample.payload().to_bytes().into_owned());
        }
        bridge.on_commands(stop_requested, &actions).await;

        // 2. Calibration requests
        while let Ok(Some(sample)) = sub_trim.try_recv() {
            let payload = sample.payload().to_bytes();
            match bridge.on_trim(&payload).await {
                Ok(reply) => info!("{}", reply),
                Err(e) => warn!("{}", e),
            }
        }

        // 3. Publish state
        pub_status.put(bridge.status_json()?).await?;
        pub_trims.put(bridge.trims_json().await?).await?;
    }

    controller.shutdown().await;
    Ok(())
}
