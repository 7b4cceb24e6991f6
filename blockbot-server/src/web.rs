// File: blockbot-server/src/web.rs
//!
//! Dashboard HTTP server: the embedded single-page UI, the command and
//! chat endpoints, and the websocket push channel carrying `stats` and
//! `chat` events.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use blockbot_core::config::BotConfig;
use blockbot_core::eventbus::{BotEvent, EventBus};
use blockbot_core::lifecycle::LifecycleCommand;
use blockbot_core::mem;
use blockbot_core::state::SharedState;

#[derive(Clone)]
pub struct AppState {
    pub config: BotConfig,
    pub state: SharedState,
    pub bus: Arc<EventBus>,
    pub commands: mpsc::Sender<LifecycleCommand>,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

pub fn create_router(app: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/ws", get(ws_handler))
        .route("/api/command", post(api_command))
        .route("/api/chat", post(api_chat))
        .with_state(app)
}

async fn serve_index(State(app): State<AppState>) -> impl IntoResponse {
    let page = DASHBOARD_HTML
        .replace("{{username}}", &app.config.username)
        .replace(
            "{{server}}",
            &format!("{}:{}", app.config.server_host, app.config.server_port),
        )
        .replace("{{protocol}}", &app.config.protocol_version);
    Html(page)
}

/// Maps a dashboard command name onto a lifecycle command.
pub fn map_command(name: &str) -> Option<(LifecycleCommand, &'static str)> {
    match name {
        "stop" => Some((LifecycleCommand::StopFollow, "Stopped following")),
        "teamup" => Some((LifecycleCommand::Teamup, "Performing teamup gesture")),
        "disconnect" => Some((LifecycleCommand::Disconnect, "Disconnecting bot")),
        "reconnect" => Some((LifecycleCommand::Reconnect, "Reconnecting bot")),
        _ => None,
    }
}

async fn api_command(
    State(app): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let Some((command, message)) = map_command(&req.command) else {
        warn!("(Web) unknown command '{}'", req.command);
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse {
                success: false,
                message: format!("Unknown command: {}", req.command),
            }),
        )
            .into_response();
    };

    // Session-bound commands against a down session report failure
    // instead of queueing a no-op.
    let needs_session = matches!(
        command,
        LifecycleCommand::Teamup | LifecycleCommand::Disconnect
    );
    if needs_session && !app.state.lock().unwrap().is_online() {
        return Json(ApiResponse {
            success: false,
            message: "Bot is not connected".into(),
        })
        .into_response();
    }

    info!("(Web) command '{}' received", req.command);
    if app.commands.send(command).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                success: false,
                message: "Bot is shutting down".into(),
            }),
        )
            .into_response();
    }

    Json(ApiResponse {
        success: true,
        message: message.into(),
    })
    .into_response()
}

async fn api_chat(State(app): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    let message = req.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse {
                success: false,
                message: "Empty message".into(),
            }),
        )
            .into_response();
    }
    if !app.state.lock().unwrap().is_online() {
        return Json(ApiResponse {
            success: false,
            message: "Bot is not connected".into(),
        })
        .into_response();
    }

    info!("(Web) chat message queued: {message}");
    if app
        .commands
        .send(LifecycleCommand::SendChat(message.to_string()))
        .await
        .is_err()
    {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                success: false,
                message: "Bot is shutting down".into(),
            }),
        )
            .into_response();
    }

    Json(ApiResponse {
        success: true,
        message: "Message sent".into(),
    })
    .into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

/// Wire frame pushed to dashboard clients.
pub fn encode_event(event: &BotEvent) -> Option<String> {
    let frame = match event {
        BotEvent::Stats(stats) => serde_json::json!({ "event": "stats", "data": stats }),
        BotEvent::ChatLog(entries) => serde_json::json!({ "event": "chat", "data": entries }),
        BotEvent::SystemMessage(_) => return None,
    };
    Some(frame.to_string())
}

async fn handle_socket(socket: WebSocket, app: AppState) {
    let conn_id = uuid::Uuid::new_v4();
    debug!("(Web) dashboard client connected: {conn_id}");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Initial snapshot so a fresh page does not wait for the next tick.
    let (stats, chat) = {
        let state = app.state.lock().unwrap();
        (state.stats(mem::process_memory_mb()), state.chat_snapshot())
    };
    for event in [BotEvent::Stats(stats), BotEvent::ChatLog(chat)] {
        if let Some(frame) = encode_event(&event) {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
    }

    let mut bus_rx = app.bus.subscribe(None).await;
    let mut shutdown_rx = app.bus.shutdown_rx.clone();

    loop {
        tokio::select! {
            event = bus_rx.recv() => {
                let Some(event) = event else { break };
                let Some(frame) = encode_event(&event) else { continue };
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Dashboard clients only listen; drain anything else.
                    Some(Ok(_)) => {}
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    debug!("(Web) dashboard client disconnected: {conn_id}");
}

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>BlockBot Dashboard</title>
    <style>
        body { font-family: system-ui, sans-serif; background: #1e1e2e; color: #cdd6f4; margin: 0; padding: 2rem; }
        h1 { margin-top: 0; }
        .card { background: #313244; border-radius: 8px; padding: 1rem 1.5rem; margin-bottom: 1rem; }
        .stats { display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 1rem; }
        .stat-label { font-size: 0.8rem; color: #a6adc8; text-transform: uppercase; }
        .stat-value { font-size: 1.3rem; }
        .dot { display: inline-block; width: 10px; height: 10px; border-radius: 50%; background: #f38ba8; margin-right: 6px; }
        .dot.connected { background: #a6e3a1; }
        button { background: #89b4fa; color: #1e1e2e; border: none; border-radius: 6px; padding: 0.5rem 1rem; margin-right: 0.5rem; cursor: pointer; font-weight: 600; }
        button:hover { background: #b4befe; }
        #chatBox { height: 220px; overflow-y: auto; background: #181825; border-radius: 6px; padding: 0.5rem; font-size: 0.9rem; }
        .chat-timestamp { color: #6c7086; margin-right: 8px; }
        .chat-empty { color: #6c7086; }
        #chatInput { width: 70%; padding: 0.5rem; border-radius: 6px; border: none; background: #181825; color: #cdd6f4; margin-right: 0.5rem; }
    </style>
</head>
<body>
    <h1>BlockBot Dashboard</h1>
    <p style="color: #a6adc8; margin-top: -0.75rem;">{{username}} @ {{server}} &middot; protocol {{protocol}}</p>
    <div class="card">
        <span id="statusDot" class="dot"></span>
        <span id="statusText">Disconnected</span>
    </div>
    <div class="card stats">
        <div><div class="stat-label">Uptime</div><div class="stat-value" id="uptime">-</div></div>
        <div><div class="stat-label">Memory</div><div class="stat-value" id="memory">-</div></div>
        <div><div class="stat-label">Following</div><div class="stat-value" id="following">No</div></div>
        <div><div class="stat-label">Reconnect Attempts</div><div class="stat-value" id="reconnectAttempts">0</div></div>
    </div>
    <div class="card">
        <button onclick="sendCommand('stop')">Stop Following</button>
        <button onclick="sendCommand('teamup')">Teamup Gesture</button>
        <button onclick="sendCommand('disconnect')">Disconnect</button>
        <button onclick="sendCommand('reconnect')">Reconnect</button>
    </div>
    <div class="card">
        <div id="chatBox"><p class="chat-empty">No messages yet...</p></div>
        <div style="margin-top: 0.75rem;">
            <input id="chatInput" placeholder="Send a chat message..." onkeydown="handleChatKey(event)">
            <button onclick="sendChatMessage()">Send</button>
        </div>
    </div>
    <script>
        let startTime = 0;

        function connect() {
            const proto = location.protocol === 'https:' ? 'wss' : 'ws';
            const socket = new WebSocket(`${proto}://${location.host}/ws`);
            socket.onmessage = (raw) => {
                const { event, data } = JSON.parse(raw.data);
                if (event === 'stats') onStats(data);
                else if (event === 'chat') onChat(data);
            };
            socket.onclose = () => setTimeout(connect, 2000);
        }
        connect();

        function onStats(stats) {
            const dot = document.getElementById('statusDot');
            document.getElementById('statusText').textContent = stats.status;
            if (stats.status === 'Connected' || stats.status === 'In-Game') {
                dot.classList.add('connected');
            } else {
                dot.classList.remove('connected');
            }
            if (stats.uptime > 0 && startTime === 0) startTime = stats.uptime;
            if (stats.uptime === 0) startTime = 0;
            if (startTime > 0) {
                const uptime = Math.floor((Date.now() - startTime) / 1000);
                document.getElementById('uptime').textContent = formatUptime(uptime);
            } else {
                document.getElementById('uptime').textContent = '-';
            }
            document.getElementById('memory').textContent = stats.memory + ' MB';
            document.getElementById('following').textContent = stats.following ? 'Yes' : 'No';
            document.getElementById('reconnectAttempts').textContent = stats.reconnectAttempts;
        }

        function onChat(messages) {
            const chatBox = document.getElementById('chatBox');
            if (messages.length === 0) {
                chatBox.innerHTML = '<p class="chat-empty">No messages yet...</p>';
                return;
            }
            chatBox.innerHTML = messages.map(msg => `
                <div class="chat-message">
                    <span class="chat-timestamp">${msg.timestamp}</span>
                    <span>${msg.message}</span>
                </div>
            `).join('');
            chatBox.scrollTop = chatBox.scrollHeight;
        }

        async function sendCommand(command) {
            try {
                const response = await fetch('/api/command', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ command })
                });
                const data = await response.json();
                console.log(data.message);
            } catch (err) {
                console.error('Command error:', err);
            }
        }

        async function sendChatMessage() {
            const input = document.getElementById('chatInput');
            const message = input.value.trim();
            if (!message) return;
            try {
                await fetch('/api/chat', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ message })
                });
                input.value = '';
            } catch (err) {
                console.error('Chat error:', err);
            }
        }

        function handleChatKey(event) {
            if (event.key === 'Enter') sendChatMessage();
        }

        function formatUptime(seconds) {
            const hours = Math.floor(seconds / 3600);
            const minutes = Math.floor((seconds % 3600) / 60);
            const secs = seconds % 60;
            if (hours > 0) return `${hours}h ${minutes}m ${secs}s`;
            if (minutes > 0) return `${minutes}m ${secs}s`;
            return `${secs}s`;
        }
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use blockbot_common::models::{BotStats, ChatLogEntry};
    use blockbot_core::state::BotState;

    fn test_app() -> (AppState, mpsc::Receiver<LifecycleCommand>) {
        let (tx, rx) = mpsc::channel(8);
        let app = AppState {
            config: BotConfig {
                server_host: "localhost".into(),
                server_port: 19132,
                protocol_version: "1.21.114".into(),
                offline: true,
                username: "TestBot".into(),
                web_port: 0,
                gateway_addr: "127.0.0.1:19134".into(),
            },
            state: BotState::shared(),
            bus: Arc::new(EventBus::new()),
            commands: tx,
        };
        (app, rx)
    }

    async fn response_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn known_commands_map_to_lifecycle_commands() {
        assert_eq!(
            map_command("stop").unwrap().0,
            LifecycleCommand::StopFollow
        );
        assert_eq!(map_command("teamup").unwrap().0, LifecycleCommand::Teamup);
        assert_eq!(
            map_command("disconnect").unwrap().0,
            LifecycleCommand::Disconnect
        );
        assert_eq!(
            map_command("reconnect").unwrap().0,
            LifecycleCommand::Reconnect
        );
        assert!(map_command("selfdestruct").is_none());
        assert!(map_command("Stop").is_none(), "names are case-sensitive");
    }

    #[tokio::test]
    async fn command_endpoint_forwards_to_lifecycle() {
        let (app, mut rx) = test_app();
        let response = api_command(
            State(app),
            Json(CommandRequest {
                command: "reconnect".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.try_recv().unwrap(), LifecycleCommand::Reconnect);
    }

    #[tokio::test]
    async fn unknown_command_is_rejected() {
        let (app, mut rx) = test_app();
        let response = api_command(
            State(app),
            Json(CommandRequest {
                command: "fly".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn session_bound_commands_fail_politely_when_offline() {
        let (app, mut rx) = test_app();
        for name in ["disconnect", "teamup"] {
            let response = api_command(
                State(app.clone()),
                Json(CommandRequest {
                    command: name.into(),
                }),
            )
            .await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = response_body(response).await;
            assert_eq!(body["success"], false, "{name} against a down session");
            assert!(rx.try_recv().is_err(), "{name} should not be queued");
        }

        // Reconnect is the way back up, so it always passes through.
        let response = api_command(
            State(app),
            Json(CommandRequest {
                command: "reconnect".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.try_recv().unwrap(), LifecycleCommand::Reconnect);
    }

    #[tokio::test]
    async fn chat_endpoint_trims_and_forwards() {
        let (app, mut rx) = test_app();
        app.state.lock().unwrap().record_join();
        let response = api_chat(
            State(app.clone()),
            Json(ChatRequest {
                message: "  hello world  ".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            rx.try_recv().unwrap(),
            LifecycleCommand::SendChat("hello world".into())
        );

        let response = api_chat(
            State(app.clone()),
            Json(ChatRequest { message: "   ".into() }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(rx.try_recv().is_err());

        app.state
            .lock()
            .unwrap()
            .record_offline(blockbot_common::models::ConnectionStatus::Disconnected);
        let response = api_chat(State(app), Json(ChatRequest { message: "hi".into() })).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_body(response).await["success"], false);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn push_frames_are_tagged_by_event_kind() {
        let stats = BotStats {
            status: "Connected".into(),
            memory: 123.4,
            following: false,
            reconnect_attempts: 2,
            uptime: 0,
            last_update: "12:00:00".into(),
        };
        let frame = encode_event(&BotEvent::Stats(stats)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["event"], "stats");
        assert_eq!(parsed["data"]["reconnectAttempts"], 2);

        let frame =
            encode_event(&BotEvent::ChatLog(vec![ChatLogEntry::now("<a> hi")])).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["event"], "chat");
        assert_eq!(parsed["data"][0]["message"], "<a> hi");

        assert!(encode_event(&BotEvent::SystemMessage("x".into())).is_none());
    }
}
