// File: blockbot-core/src/idle.rs
//!
//! Anti-AFK movement. One task per session, re-armed with a fresh random
//! interval after every firing so the cadence never settles into a
//! detectable pattern.

use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::state::SharedState;
use crate::transport::{ActionSender, OutboundAction, Vec3};

#[derive(Debug, Clone, Copy)]
pub struct IdleSettings {
    pub min_interval: Duration,
    pub max_interval: Duration,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(45),
            max_interval: Duration::from_secs(60),
        }
    }
}

/// Spawns the idle-movement loop for one session. The caller holds the
/// handle and aborts it on teardown; nothing fires after the abort.
pub fn spawn_idle_task(
    sender: ActionSender,
    state: SharedState,
    settings: IdleSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(next_interval(settings)).await;

            if state.lock().unwrap().follow_active() {
                continue;
            }
            if !sender.is_spawned() {
                continue;
            }

            match sender.queue(jittered_move(sender.runtime_id())) {
                Ok(()) => debug!("(IdleScheduler) sent idle movement"),
                Err(e) => warn!("(IdleScheduler) movement send failed => {e}"),
            }
        }
    })
}

fn next_interval(settings: IdleSettings) -> Duration {
    let min = settings.min_interval.as_millis() as u64;
    let max = settings.max_interval.as_millis() as u64;
    if max > min {
        Duration::from_millis(rand::rng().random_range(min..max))
    } else {
        settings.min_interval
    }
}

fn jittered_move(runtime_id: u64) -> OutboundAction {
    let mut rng = rand::rng();
    OutboundAction::MovePlayer {
        runtime_id,
        offset: Vec3 {
            x: rng.random_range(-1.0..1.0),
            y: 0.0,
            z: rng.random_range(-1.0..1.0),
        },
        pitch: rng.random_range(-45.0..45.0),
        yaw: rng.random_range(0.0..360.0),
        head_yaw: rng.random_range(0.0..360.0),
        on_ground: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::BotState;
    use crate::transport::{Session, SessionEvent};
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    fn fast_settings() -> IdleSettings {
        IdleSettings {
            min_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(15),
        }
    }

    fn spawned_session() -> (Session, mpsc::UnboundedReceiver<OutboundAction>) {
        let (tx_actions, rx_actions) = mpsc::unbounded_channel();
        let (_tx_events, rx_events) = mpsc::unbounded_channel::<SessionEvent>();
        let session = Session::new(tx_actions, rx_events);
        session.set_runtime_id(4242);
        (session, rx_actions)
    }

    #[tokio::test]
    async fn fires_with_jitter_while_idle() {
        let (session, mut rx_actions) = spawned_session();
        let state = BotState::shared();

        let handle = spawn_idle_task(session.sender(), state, fast_settings());
        sleep(Duration::from_millis(100)).await;
        handle.abort();

        let mut fired = 0;
        while let Ok(action) = rx_actions.try_recv() {
            fired += 1;
            match action {
                OutboundAction::MovePlayer {
                    runtime_id, offset, ..
                } => {
                    assert_eq!(runtime_id, 4242);
                    assert!(offset.x > -1.0 && offset.x < 1.0);
                    assert!(offset.z > -1.0 && offset.z < 1.0);
                    assert_eq!(offset.y, 0.0);
                }
                other => panic!("unexpected action: {other:?}"),
            }
        }
        assert!(fired >= 2, "expected several firings, got {fired}");
    }

    #[tokio::test]
    async fn suppressed_while_following() {
        let (session, mut rx_actions) = spawned_session();
        let state = BotState::shared();
        state.lock().unwrap().mark_following("alice");

        let handle = spawn_idle_task(session.sender(), state.clone(), fast_settings());

        sleep(Duration::from_millis(80)).await;
        assert!(rx_actions.try_recv().is_err(), "no fire while following");

        state.lock().unwrap().clear_follow();
        sleep(Duration::from_millis(80)).await;
        handle.abort();
        assert!(
            rx_actions.try_recv().is_ok(),
            "fires resume once follow clears"
        );
    }

    #[tokio::test]
    async fn silent_without_runtime_id() {
        let (tx_actions, mut rx_actions) = mpsc::unbounded_channel();
        let (_tx_events, rx_events) = mpsc::unbounded_channel::<SessionEvent>();
        let session = Session::new(tx_actions, rx_events);
        let state = BotState::shared();

        let handle = spawn_idle_task(session.sender(), state, fast_settings());
        sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(rx_actions.try_recv().is_err());
    }

    #[tokio::test]
    async fn abort_cancels_pending_fire() {
        let (session, mut rx_actions) = spawned_session();
        let state = BotState::shared();

        let settings = IdleSettings {
            min_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(60),
        };
        let handle = spawn_idle_task(session.sender(), state, settings);
        // Abort while the first sleep is still pending.
        sleep(Duration::from_millis(10)).await;
        handle.abort();

        sleep(Duration::from_millis(100)).await;
        assert!(rx_actions.try_recv().is_err(), "no action after teardown");
    }
}
