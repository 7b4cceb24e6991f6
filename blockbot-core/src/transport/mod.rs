// File: blockbot-core/src/transport/mod.rs
//!
//! The session transport seam. Everything above this module is
//! transport-agnostic: a `Session` is a pair of channels (outbound
//! actions in, lifecycle events out) plus the I/O tasks that service
//! them. The packet-level game protocol lives behind the gateway and is
//! out of scope here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Error;

pub mod gateway;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub offline: bool,
    pub protocol_version: String,
}

/// Lifecycle signals a session emits, in the order the server produces
/// them. `Closed` is always the last event a well-behaved transport sends.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Joined,
    Spawned { runtime_id: u64 },
    Text { message: String },
    Error { message: String },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerActionKind {
    StartSneak,
    StopSneak,
}

/// Outbound actions the bot can queue on a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "packet", rename_all = "snake_case")]
pub enum OutboundAction {
    Text {
        message: String,
    },
    MovePlayer {
        runtime_id: u64,
        /// Small bounded offset from the current position, not a teleport.
        offset: Vec3,
        pitch: f32,
        yaw: f32,
        head_yaw: f32,
        on_ground: bool,
    },
    PlayerAction {
        runtime_id: u64,
        action: PlayerActionKind,
    },
}

/// The active connection handle. Exactly one exists at a time; the
/// lifecycle manager owns it and destroys it on any terminal event.
pub struct Session {
    actions: mpsc::UnboundedSender<OutboundAction>,
    /// Held as an Option so the lifecycle manager can `take()` the stream.
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    runtime_id: Arc<AtomicU64>,
    io_tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        actions: mpsc::UnboundedSender<OutboundAction>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Self {
        Self {
            actions,
            events: Some(events),
            runtime_id: Arc::new(AtomicU64::new(0)),
            io_tasks: Vec::new(),
        }
    }

    /// Register an I/O task to be aborted when the session closes.
    pub fn attach_io_task(&mut self, handle: JoinHandle<()>) {
        self.io_tasks.push(handle);
    }

    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events.take()
    }

    /// Runtime entity id assigned on spawn; 0 means not spawned yet.
    pub fn set_runtime_id(&self, id: u64) {
        self.runtime_id.store(id, Ordering::SeqCst);
    }

    /// Cheap handle for background tasks that queue outbound actions.
    pub fn sender(&self) -> ActionSender {
        ActionSender {
            actions: self.actions.clone(),
            runtime_id: Arc::clone(&self.runtime_id),
        }
    }

    /// Aborts the I/O tasks and drops the action channel, which ends the
    /// writer loop on its own.
    pub fn close(self) {
        for handle in self.io_tasks {
            handle.abort();
        }
    }
}

/// Clonable outbound handle shared with the idle scheduler, the gesture
/// sequencer and the chat dispatcher.
#[derive(Clone)]
pub struct ActionSender {
    actions: mpsc::UnboundedSender<OutboundAction>,
    runtime_id: Arc<AtomicU64>,
}

impl ActionSender {
    pub fn runtime_id(&self) -> u64 {
        self.runtime_id.load(Ordering::SeqCst)
    }

    pub fn is_spawned(&self) -> bool {
        self.runtime_id() != 0
    }

    pub fn queue(&self, action: OutboundAction) -> Result<(), Error> {
        self.actions
            .send(action)
            .map_err(|_| Error::Transport("session action channel closed".into()))
    }

    pub fn queue_chat(&self, message: &str) -> Result<(), Error> {
        self.queue(OutboundAction::Text {
            message: message.to_string(),
        })
    }
}

/// Opens sessions. Mocked in lifecycle tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn open(&self, config: &SessionConfig) -> Result<Session, Error>;
}
