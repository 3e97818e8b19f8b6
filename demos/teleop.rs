// Keyboard teleop: W/S walk, A/D turn, M/N wheel/foot mode, H home,
// J/K/L attack left/both/right, Space stop, R/F period, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use serde_json::json;
use std::time::Duration;
use tracing::info;

use otto_wheel_runtime::config::{TOPIC_CMD_ACTION, TOPIC_CMD_STOP};
use otto_wheel_runtime::messages::{
    ACTION_ATTACK, ACTION_FOOT_MODE, ACTION_HOME, ACTION_TURN, ACTION_WALK, ACTION_WHEEL_MODE,
    DIR_BACKWARD, DIR_BOTH, DIR_FORWARD, DIR_LEFT, DIR_RIGHT,
};

const PERIODS: [i32; 3] = [1500, 1000, 500]; // ms per step, slow to fast
const STEPS: i32 = 2;
const ARM_SWING: i32 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_action = session.declare_publisher(TOPIC_CMD_ACTION).await?;
    let pub_stop = session.declare_publisher(TOPIC_CMD_STOP).await?;

    info!("Controls: W/S=walk, A/D=turn, M=wheels, N=feet, H=home, J/K/L=attack, Space=stop, R/F=speed, Q=quit");
    print_period(1);

    enable_raw_mode()?;
    let result = run_teleop(&pub_action, &pub_stop).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_action: &zenoh::pubsub::Publisher<'_>,
    pub_stop: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut period_idx: usize = 1;

    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        // Each press is one action; ignore auto-repeat so the queue does not flood
        if kind != KeyEventKind::Press {
            continue;
        }

        let period = PERIODS[period_idx];
        let action = match code {
            KeyCode::Char('w') => Some((ACTION_WALK, STEPS, period, DIR_FORWARD, 0)),
            KeyCode::Char('s') => Some((ACTION_WALK, STEPS, period, DIR_BACKWARD, 0)),
            KeyCode::Char('a') => Some((ACTION_TURN, STEPS, period, DIR_LEFT, ARM_SWING)),
            KeyCode::Char('d') => Some((ACTION_TURN, STEPS, period, DIR_RIGHT, ARM_SWING)),
            KeyCode::Char('m') => Some((ACTION_WHEEL_MODE, 0, 0, 0, 0)),
            KeyCode::Char('n') => Some((ACTION_FOOT_MODE, 0, 0, 0, 0)),
            KeyCode::Char('h') => Some((ACTION_HOME, 0, 0, DIR_FORWARD, 0)),
            KeyCode::Char('j') => Some((ACTION_ATTACK, 1, period, DIR_LEFT, 0)),
            KeyCode::Char('k') => Some((ACTION_ATTACK, 1, period, DIR_BOTH, 0)),
            KeyCode::Char('l') => Some((ACTION_ATTACK, 1, period, DIR_RIGHT, 0)),

            KeyCode::Char(' ') => {
                info!("Stop");
                pub_stop.put("stop").await?;
                None
            }

            // Speed control
            KeyCode::Char('r') => {
                period_idx = (period_idx + 1).min(PERIODS.len() - 1);
                print_period(period_idx);
                None
            }
            KeyCode::Char('f') => {
                period_idx = period_idx.saturating_sub(1);
                print_period(period_idx);
                None
            }

            // Quit
            KeyCode::Char('q') | KeyCode::Esc => break,

            _ => None,
        };

        if let Some((action_type, steps, speed, direction, amount)) = action {
            let cmd = json!({
                "action_type": action_type,
                "steps": steps,
                "speed": speed,
                "direction": direction,
                "amount": amount
            });
            info!("Sending {}", cmd);
            pub_action.put(cmd.to_string()).await?;
        }
    }

    Ok(())
}

fn print_period(idx: usize) {
    let label = ["SLOW", "MED", "FAST"][idx];
    info!("Speed: {} ({} ms/step)", label, PERIODS[idx]);
}
