// File: blockbot-common/src/models.rs
//!
//! Shared data model: connection status, follow state, the bounded chat
//! log the dashboard renders, and the per-tick stats snapshot.

use std::collections::VecDeque;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Where the bot currently is in its connection life.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Joined and spawned into the world (the session has a runtime id).
    InGame,
    Reconnecting,
    Disconnected,
    /// Retry attempts exhausted; the process stays up but no longer connects.
    Stopped,
    Error(String),
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Disconnected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "Connecting"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::InGame => write!(f, "In-Game"),
            ConnectionStatus::Reconnecting => write!(f, "Reconnecting"),
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Stopped => write!(f, "Stopped"),
            ConnectionStatus::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// "Following" is a state flag only; there is no tracking logic behind it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FollowState {
    pub active: bool,
    pub target: Option<String>,
}

/// One chat line as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub message: String,
    pub timestamp: String,
}

impl ChatLogEntry {
    /// Entry stamped with the current UTC wall clock.
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now().format("%H:%M:%S").to_string(),
        }
    }
}

pub const CHAT_LOG_CAPACITY: usize = 50;

/// Bounded ring of recent chat lines, newest first.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: VecDeque<ChatLogEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front; the oldest entry falls off past capacity.
    pub fn push(&mut self, entry: ChatLogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(CHAT_LOG_CAPACITY);
    }

    pub fn snapshot(&self) -> Vec<ChatLogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Observational snapshot pushed to dashboard clients every tick.
/// Field names match what the dashboard script reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStats {
    pub status: String,
    /// Resident memory in MB.
    pub memory: f64,
    pub following: bool,
    pub reconnect_attempts: u32,
    /// Epoch millis of the current session's join, 0 while down.
    pub uptime: i64,
    pub last_update: String,
}
