// File: blockbot-core/src/state.rs
//!
//! The single owned mutable bot state. Everything that used to be a
//! free-floating global lives here, with named mutation points: the
//! lifecycle manager drives status and attempt counting, the chat
//! dispatcher clears follow state and appends chat lines.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use blockbot_common::models::{
    BotStats, ChatLog, ChatLogEntry, ConnectionStatus, FollowState,
};

pub type SharedState = Arc<Mutex<BotState>>;

#[derive(Debug, Default)]
pub struct BotState {
    status: ConnectionStatus,
    follow: FollowState,
    reconnect_attempts: u32,
    chat_log: ChatLog,
    connected_at: Option<DateTime<Utc>>,
}

impl BotState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.clone()
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    pub fn is_online(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Connected | ConnectionStatus::InGame
        )
    }

    pub fn follow_active(&self) -> bool {
        self.follow.active
    }

    /// Flag-only: no tracking logic reads the target beyond display.
    pub fn mark_following(&mut self, target: impl Into<String>) {
        self.follow = FollowState {
            active: true,
            target: Some(target.into()),
        };
    }

    /// Returns whether follow was active before clearing.
    pub fn clear_follow(&mut self) -> bool {
        let was_active = self.follow.active;
        self.follow = FollowState::default();
        was_active
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// One more consecutive terminal event; returns the new count.
    pub fn bump_attempt(&mut self) -> u32 {
        self.reconnect_attempts += 1;
        self.reconnect_attempts
    }

    pub fn reset_attempts(&mut self) {
        self.reconnect_attempts = 0;
    }

    /// Successful join: attempt count drops to zero no matter what it was.
    pub fn record_join(&mut self) {
        self.reconnect_attempts = 0;
        self.status = ConnectionStatus::Connected;
        self.connected_at = Some(Utc::now());
    }

    /// Session gone (terminal event or user disconnect): follow state is
    /// cleared along with the join timestamp.
    pub fn record_offline(&mut self, status: ConnectionStatus) {
        self.connected_at = None;
        self.follow = FollowState::default();
        self.status = status;
    }

    pub fn push_chat(&mut self, entry: ChatLogEntry) {
        self.chat_log.push(entry);
    }

    pub fn chat_snapshot(&self) -> Vec<ChatLogEntry> {
        self.chat_log.snapshot()
    }

    /// Observational snapshot for the dashboard; `memory_mb` is sampled by
    /// the caller so this stays lock-cheap.
    pub fn stats(&self, memory_mb: f64) -> BotStats {
        BotStats {
            status: self.status.to_string(),
            memory: (memory_mb * 10.0).round() / 10.0,
            following: self.follow.active,
            reconnect_attempts: self.reconnect_attempts,
            uptime: self
                .connected_at
                .map(|t| t.timestamp_millis())
                .unwrap_or(0),
            last_update: Utc::now().to_rfc3339(),
        }
    }
}
