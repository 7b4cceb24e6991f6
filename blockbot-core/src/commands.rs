// File: blockbot-core/src/commands.rs
//!
//! Chat-line dispatch. Every inbound line lands in the chat ring and is
//! pushed to dashboard subscribers; lines in `<sender> body` form are
//! additionally matched against the fixed command set.

use std::sync::Arc;

use tracing::{debug, info, warn};

use blockbot_common::models::ChatLogEntry;

use crate::eventbus::{BotEvent, EventBus};
use crate::gesture;
use crate::mem;
use crate::state::SharedState;
use crate::transport::ActionSender;

/// Display budget for the !memory reply. Informational only.
pub const MEMORY_BUDGET_MB: f64 = 450.0;

pub struct ChatDispatcher {
    state: SharedState,
    bus: Arc<EventBus>,
}

impl ChatDispatcher {
    pub fn new(state: SharedState, bus: Arc<EventBus>) -> Self {
        Self { state, bus }
    }

    pub async fn handle_line(&self, line: &str, sender: &ActionSender) {
        info!("[CHAT] {line}");

        let snapshot = {
            let mut st = self.state.lock().unwrap();
            st.push_chat(ChatLogEntry::now(line));
            st.chat_snapshot()
        };
        self.bus.publish(BotEvent::ChatLog(snapshot)).await;

        let Some((from, body)) = parse_chat_line(line) else {
            debug!("(ChatDispatcher) not a chat-format line, ignoring");
            return;
        };

        // Exact matches only; no prefix handling.
        match body {
            "/stop" => {
                let was_following = self.state.lock().unwrap().clear_follow();
                if was_following {
                    info!("(ChatDispatcher) {from} stopped the bot");
                } else {
                    debug!("(ChatDispatcher) {from} sent /stop while not following");
                }
            }
            "/teamup" => {
                info!("(ChatDispatcher) {from} requested teamup gesture");
                gesture::spawn_teamup(sender.clone());
            }
            "!status" => {
                let (following, status) = {
                    let st = self.state.lock().unwrap();
                    (st.follow_active(), st.status())
                };
                let reply = format!(
                    "Following: {} | Status: {}",
                    if following { "Yes" } else { "No" },
                    status
                );
                self.reply(sender, &reply);
            }
            "!memory" => {
                let reply = format!(
                    "RAM: {:.1}MB / {:.0}MB",
                    mem::process_memory_mb(),
                    MEMORY_BUDGET_MB
                );
                self.reply(sender, &reply);
            }
            _ => {}
        }
    }

    /// Chat replies never surface errors to the chat channel itself.
    fn reply(&self, sender: &ActionSender, message: &str) {
        if let Err(e) = sender.queue_chat(message) {
            warn!("(ChatDispatcher) reply send failed => {e}");
        }
    }
}

/// Extracts `(sender, body)` from a `<sender> body` line. Anything else
/// (server notices, malformed lines) yields `None`.
pub fn parse_chat_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix('<')?;
    let (sender, body) = rest.split_once("> ")?;
    if sender.is_empty() || body.is_empty() {
        return None;
    }
    Some((sender, body))
}
