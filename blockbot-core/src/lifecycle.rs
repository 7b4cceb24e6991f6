// File: blockbot-core/src/lifecycle.rs
//!
//! Connection lifecycle: session creation, the retry policy, and the
//! orchestration of per-session background work. All transitions run on
//! one task, so a new session can only exist after the previous one's
//! teardown has fully completed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use blockbot_common::models::ConnectionStatus;

use crate::commands::ChatDispatcher;
use crate::eventbus::EventBus;
use crate::gesture;
use crate::idle::{self, IdleSettings};
use crate::state::SharedState;
use crate::transport::{Session, SessionConfig, SessionEvent, SessionTransport};

pub const GREETING: &str = "Bot active! Ready to assist.";
pub const GREETING_DELAY: Duration = Duration::from_secs(2);

/// Linear backoff with a ceiling: 5s, 10s, 15s, ... capped at 60s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_step: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            base_step: Duration::from_secs(5),
            cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.base_step * attempt).min(self.cap)
    }
}

/// External control inputs, fed by the web API.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleCommand {
    Disconnect,
    Reconnect,
    SendChat(String),
    Teamup,
    StopFollow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Error, disconnect, close, or construction failure: retry path.
    Terminal,
    /// Operator asked for a disconnect: park until told otherwise.
    UserDisconnect,
    /// Operator asked for a fresh session: reconnect without backoff.
    Recycle,
    Shutdown,
}

pub struct LifecycleManager {
    transport: Arc<dyn SessionTransport>,
    session_config: SessionConfig,
    state: SharedState,
    bus: Arc<EventBus>,
    dispatcher: ChatDispatcher,
    policy: RetryPolicy,
    idle: IdleSettings,
    commands: mpsc::Receiver<LifecycleCommand>,
}

impl LifecycleManager {
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        session_config: SessionConfig,
        state: SharedState,
        bus: Arc<EventBus>,
        commands: mpsc::Receiver<LifecycleCommand>,
    ) -> Self {
        let dispatcher = ChatDispatcher::new(state.clone(), bus.clone());
        Self {
            transport,
            session_config,
            state,
            bus,
            dispatcher,
            policy: RetryPolicy::default(),
            idle: IdleSettings::default(),
            commands,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_idle(mut self, idle: IdleSettings) -> Self {
        self.idle = idle;
        self
    }

    /// Runs until shutdown. Owns the whole connect / drive / teardown /
    /// retry cycle.
    pub async fn run(mut self) {
        let mut shutdown_rx = self.bus.shutdown_rx.clone();

        loop {
            if self.bus.is_shutdown() {
                break;
            }

            let attempt_no = self.state.lock().unwrap().reconnect_attempts() + 1;
            info!(
                "(Lifecycle) connecting to {}:{} (attempt {}/{})",
                self.session_config.host, self.session_config.port,
                attempt_no, self.policy.max_attempts
            );
            self.state
                .lock()
                .unwrap()
                .set_status(ConnectionStatus::Connecting);

            let opened = self.transport.open(&self.session_config).await;
            let end = match opened {
                Ok(session) => self.drive_session(session, &mut shutdown_rx).await,
                Err(e) => {
                    // Construction failures funnel into the same retry
                    // path as post-join terminal events.
                    error!("(Lifecycle) session creation failed => {e}");
                    SessionEnd::Terminal
                }
            };

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Recycle => {
                    self.state
                        .lock()
                        .unwrap()
                        .record_offline(ConnectionStatus::Reconnecting);
                    self.state.lock().unwrap().reset_attempts();
                }
                SessionEnd::UserDisconnect => {
                    self.state
                        .lock()
                        .unwrap()
                        .record_offline(ConnectionStatus::Disconnected);
                    info!("(Lifecycle) parked; waiting for reconnect command");
                    if !self.park(&mut shutdown_rx).await {
                        break;
                    }
                }
                SessionEnd::Terminal => {
                    self.state
                        .lock()
                        .unwrap()
                        .record_offline(ConnectionStatus::Reconnecting);
                    let attempts = self.state.lock().unwrap().bump_attempt();
                    if attempts >= self.policy.max_attempts {
                        error!(
                            "(Lifecycle) max reconnect attempts ({}) reached, giving up",
                            self.policy.max_attempts
                        );
                        self.state
                            .lock()
                            .unwrap()
                            .set_status(ConnectionStatus::Stopped);
                        if !self.park(&mut shutdown_rx).await {
                            break;
                        }
                    } else {
                        let delay = self.policy.delay_for(attempts);
                        info!("(Lifecycle) retrying in {:?}", delay);
                        if !self.retry_wait(delay, &mut shutdown_rx).await {
                            break;
                        }
                    }
                }
            }
        }

        info!("(Lifecycle) run loop ended");
    }

    /// Drives one session from open to its terminal event. Teardown of
    /// per-session background work happens here, before the caller may
    /// create a new session.
    async fn drive_session(
        &mut self,
        mut session: Session,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let Some(mut events) = session.take_events() else {
            error!("(Lifecycle) session has no event stream");
            return SessionEnd::Terminal;
        };
        let sender = session.sender();
        let mut idle_task: Option<JoinHandle<()>> = None;
        let mut greeting_task: Option<JoinHandle<()>> = None;
        let mut commands_open = true;

        let end = loop {
            tokio::select! {
                ev = events.recv() => match ev {
                    None => {
                        info!("(Lifecycle) event stream ended");
                        break SessionEnd::Terminal;
                    }
                    Some(SessionEvent::Joined) => {
                        info!("(Lifecycle) joined the server");
                        self.state.lock().unwrap().record_join();
                        if idle_task.is_none() {
                            idle_task = Some(idle::spawn_idle_task(
                                sender.clone(),
                                self.state.clone(),
                                self.idle,
                            ));
                        }
                        if greeting_task.is_none() {
                            let greet_sender = sender.clone();
                            greeting_task = Some(tokio::spawn(async move {
                                tokio::time::sleep(GREETING_DELAY).await;
                                if let Err(e) = greet_sender.queue_chat(GREETING) {
                                    warn!("(Lifecycle) greeting send failed => {e}");
                                }
                            }));
                        }
                    }
                    Some(SessionEvent::Spawned { runtime_id }) => {
                        info!("(Lifecycle) spawned in world (runtime id {runtime_id})");
                        session.set_runtime_id(runtime_id);
                        self.state
                            .lock()
                            .unwrap()
                            .set_status(ConnectionStatus::InGame);
                    }
                    Some(SessionEvent::Text { message }) => {
                        self.dispatcher.handle_line(&message, &sender).await;
                    }
                    Some(SessionEvent::Error { message }) => {
                        error!("(Lifecycle) session error => {message}");
                        break SessionEnd::Terminal;
                    }
                    Some(SessionEvent::Disconnected { reason }) => {
                        warn!("(Lifecycle) disconnected => {reason}");
                        break SessionEnd::Terminal;
                    }
                    Some(SessionEvent::Closed) => {
                        info!("(Lifecycle) connection closed");
                        break SessionEnd::Terminal;
                    }
                },
                cmd = self.commands.recv(), if commands_open => match cmd {
                    Some(LifecycleCommand::Disconnect) => {
                        info!("(Lifecycle) disconnect requested");
                        break SessionEnd::UserDisconnect;
                    }
                    Some(LifecycleCommand::Reconnect) => {
                        info!("(Lifecycle) reconnect requested, recycling session");
                        break SessionEnd::Recycle;
                    }
                    Some(LifecycleCommand::SendChat(message)) => {
                        if let Err(e) = sender.queue_chat(&message) {
                            warn!("(Lifecycle) chat send failed => {e}");
                        }
                    }
                    Some(LifecycleCommand::Teamup) => {
                        gesture::spawn_teamup(sender.clone());
                    }
                    Some(LifecycleCommand::StopFollow) => {
                        self.state.lock().unwrap().clear_follow();
                    }
                    None => {
                        debug!("(Lifecycle) command channel closed");
                        commands_open = false;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("(Lifecycle) shutdown signaled");
                        break SessionEnd::Shutdown;
                    }
                }
            }
        };

        // Teardown order matters: stop the idle scheduler and a pending
        // greeting before the session goes away, so nothing fires after
        // this point. Aborting an already-finished task is a no-op.
        if let Some(handle) = idle_task.take() {
            handle.abort();
        }
        if let Some(handle) = greeting_task.take() {
            handle.abort();
        }
        session.close();
        end
    }

    /// Parked (user disconnect or retry exhaustion): idle until a
    /// reconnect command arrives. Returns false on shutdown.
    async fn park(&mut self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(LifecycleCommand::Reconnect) => {
                        info!("(Lifecycle) reconnect requested");
                        self.state.lock().unwrap().reset_attempts();
                        return true;
                    }
                    Some(LifecycleCommand::StopFollow) => {
                        self.state.lock().unwrap().clear_follow();
                    }
                    Some(LifecycleCommand::Disconnect) => {
                        debug!("(Lifecycle) already disconnected");
                    }
                    Some(LifecycleCommand::SendChat(_)) | Some(LifecycleCommand::Teamup) => {
                        warn!("(Lifecycle) no active session, command dropped");
                    }
                    None => return false,
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return false;
                    }
                }
            }
        }
    }

    /// Backoff sleep, interruptible by commands. Returns false on
    /// shutdown.
    async fn retry_wait(
        &mut self,
        delay: Duration,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(LifecycleCommand::Reconnect) => {
                        info!("(Lifecycle) reconnect requested, skipping backoff");
                        self.state.lock().unwrap().reset_attempts();
                        return true;
                    }
                    Some(LifecycleCommand::Disconnect) => {
                        info!("(Lifecycle) disconnect requested during backoff");
                        self.state
                            .lock()
                            .unwrap()
                            .record_offline(ConnectionStatus::Disconnected);
                        return self.park(shutdown_rx).await;
                    }
                    Some(LifecycleCommand::StopFollow) => {
                        self.state.lock().unwrap().clear_follow();
                    }
                    Some(LifecycleCommand::SendChat(_)) | Some(LifecycleCommand::Teamup) => {
                        warn!("(Lifecycle) no active session, command dropped");
                    }
                    None => return false,
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return false;
                    }
                }
            }
        }
    }
}
