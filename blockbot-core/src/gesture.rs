// File: blockbot-core/src/gesture.rs
//!
//! The /teamup crouch gesture: a short run of sneak begin/end pairs.
//! Invocations are not serialized; overlapping sequences interleave
//! their actions on the wire.

use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::{ActionSender, OutboundAction, PlayerActionKind};

pub const SNEAK_DELAY: Duration = Duration::from_millis(150);

pub fn spawn_teamup(sender: ActionSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        perform_teamup(&sender).await;
    })
}

/// Crouch 6-7 times. Emit failures are logged and the sequence keeps
/// going; the next pair may well succeed.
pub async fn perform_teamup(sender: &ActionSender) {
    if !sender.is_spawned() {
        debug!("(Gesture) no active session, skipping teamup");
        return;
    }

    let crouch_count: u32 = rand::rng().random_range(6..=7);
    info!("(Gesture) performing crouch gesture ({crouch_count} crouches)");

    for _ in 0..crouch_count {
        queue_sneak(sender, PlayerActionKind::StartSneak);
        tokio::time::sleep(SNEAK_DELAY).await;
        queue_sneak(sender, PlayerActionKind::StopSneak);
        tokio::time::sleep(SNEAK_DELAY).await;
    }

    info!("(Gesture) gesture completed ({crouch_count} crouches)");
}

fn queue_sneak(sender: &ActionSender, action: PlayerActionKind) {
    let result = sender.queue(OutboundAction::PlayerAction {
        runtime_id: sender.runtime_id(),
        action,
    });
    if let Err(e) = result {
        warn!("(Gesture) sneak send failed => {e}");
    }
}
