// File: blockbot-server/src/stats.rs
//!
//! Periodic publishers: the dashboard stats tick and the memory log.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::info;

use blockbot_core::eventbus::{BotEvent, EventBus};
use blockbot_core::mem;
use blockbot_core::state::SharedState;

pub const STATS_PERIOD: Duration = Duration::from_secs(1);
pub const MEMORY_LOG_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Publishes a stats snapshot on every tick until shutdown. Stats flow
/// whether or not a session is up, so the dashboard shows reconnect
/// progress too.
pub fn spawn_stats_task(
    state: SharedState,
    bus: Arc<EventBus>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown_rx = bus.shutdown_rx.clone();
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = state.lock().unwrap().stats(mem::process_memory_mb());
                    bus.publish(BotEvent::Stats(stats)).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Logs resident memory on a slow cadence. One task for the process
/// lifetime, not one per session.
pub fn spawn_memory_log_task(bus: Arc<EventBus>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown_rx = bus.shutdown_rx.clone();
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        // interval fires immediately; skip the startup tick.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!("[MEMORY] RAM usage: {:.1} MB", mem::process_memory_mb());
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockbot_core::state::BotState;
    use tokio::time::timeout;

    #[tokio::test]
    async fn stats_tick_publishes_snapshots() {
        let state = BotState::shared();
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe(None).await;

        let handle = spawn_stats_task(state, bus.clone(), Duration::from_millis(10));

        for _ in 0..2 {
            let event = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("tick should publish")
                .expect("bus should be open");
            match event {
                BotEvent::Stats(stats) => {
                    assert_eq!(stats.status, "Disconnected");
                    assert!(stats.memory > 0.0);
                    assert_eq!(stats.uptime, 0);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        bus.shutdown();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn memory_log_task_stops_on_shutdown() {
        let bus = Arc::new(EventBus::new());
        let handle = spawn_memory_log_task(bus.clone(), Duration::from_millis(50));
        bus.shutdown();
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("task should stop on shutdown")
            .unwrap();
    }
}
