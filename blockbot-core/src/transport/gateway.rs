// File: blockbot-core/src/transport/gateway.rs
//!
//! Concrete transport speaking newline-delimited JSON frames to a local
//! protocol gateway over TCP. The gateway owns the RakNet/packet layer;
//! this side only frames actions out and parses lifecycle events in.

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::Error;

use super::{OutboundAction, Session, SessionConfig, SessionEvent, SessionTransport};

/// First frame on every connection: tells the gateway where to connect
/// and as whom.
#[derive(Debug, Serialize)]
struct ConnectFrame<'a> {
    packet: &'static str,
    host: &'a str,
    port: u16,
    username: &'a str,
    offline: bool,
    protocol_version: &'a str,
}

pub struct GatewayTransport {
    addr: String,
}

impl GatewayTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl SessionTransport for GatewayTransport {
    async fn open(&self, config: &SessionConfig) -> Result<Session, Error> {
        let tcp = TcpStream::connect(&self.addr).await?;
        let (read_half, write_half) = tokio::io::split(tcp);

        let hello = serde_json::to_string(&ConnectFrame {
            packet: "connect",
            host: &config.host,
            port: config.port,
            username: &config.username,
            offline: config.offline,
            protocol_version: &config.protocol_version,
        })?;

        let (tx_actions, rx_actions) = mpsc::unbounded_channel::<OutboundAction>();
        let (tx_events, rx_events) = mpsc::unbounded_channel::<SessionEvent>();

        let write_task = tokio::spawn(writer_loop(write_half, rx_actions, hello));
        let read_task = tokio::spawn(reader_loop(read_half, tx_events));

        let mut session = Session::new(tx_actions, rx_events);
        session.attach_io_task(read_task);
        session.attach_io_task(write_task);
        Ok(session)
    }
}

async fn reader_loop<R>(read_half: R, tx_events: mpsc::UnboundedSender<SessionEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(read_half);
    let mut line_buffer = String::new();

    loop {
        line_buffer.clear();
        match reader.read_line(&mut line_buffer).await {
            Ok(0) => {
                info!("(Gateway) read loop => EOF");
                break;
            }
            Ok(_) => {
                let line = line_buffer.trim_end();
                if line.is_empty() {
                    continue;
                }
                debug!("<< {}", line);
                match serde_json::from_str::<SessionEvent>(line) {
                    Ok(event) => {
                        if tx_events.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("(Gateway) ignoring unparseable frame => {e}"),
                }
            }
            Err(e) => {
                error!("(Gateway) read error => {:?}", e);
                break;
            }
        }
    }

    let _ = tx_events.send(SessionEvent::Closed);
    info!("(Gateway) reader loop ended");
}

async fn writer_loop<W>(
    mut write_half: W,
    mut rx_actions: mpsc::UnboundedReceiver<OutboundAction>,
    hello: String,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(&mut write_half);

    if write_line(&mut writer, &hello).await.is_err() {
        return;
    }

    while let Some(action) = rx_actions.recv().await {
        let line = match serde_json::to_string(&action) {
            Ok(l) => l,
            Err(e) => {
                error!("(Gateway) failed to serialize action => {e}");
                continue;
            }
        };
        debug!(">> {}", line);
        if write_line(&mut writer, &line).await.is_err() {
            break;
        }
    }

    info!("(Gateway) writer loop ended");
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    if let Err(e) = writer.write_all(line.as_bytes()).await {
        error!("(Gateway) writer error => {:?}", e);
        return Err(e);
    }
    if let Err(e) = writer.write_all(b"\n").await {
        error!("(Gateway) writer error => {:?}", e);
        return Err(e);
    }
    if let Err(e) = writer.flush().await {
        error!("(Gateway) writer flush error => {:?}", e);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PlayerActionKind;
    use tokio::io::AsyncReadExt;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn reader_parses_frames_and_appends_closed_on_eof() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (tx_events, mut rx_events) = mpsc::unbounded_channel();

        let reader = tokio::spawn(reader_loop(client, tx_events));

        server
            .write_all(b"{\"event\":\"joined\"}\n{\"event\":\"spawned\",\"runtime_id\":5}\nnot json\n")
            .await
            .unwrap();
        drop(server);
        reader.await.unwrap();

        assert_eq!(rx_events.recv().await, Some(SessionEvent::Joined));
        assert_eq!(
            rx_events.recv().await,
            Some(SessionEvent::Spawned { runtime_id: 5 })
        );
        // Garbage is skipped; EOF becomes Closed.
        assert_eq!(rx_events.recv().await, Some(SessionEvent::Closed));
        assert_eq!(rx_events.recv().await, None);
    }

    #[tokio::test]
    async fn writer_frames_hello_then_actions() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (tx_actions, rx_actions) = mpsc::unbounded_channel();

        let writer = tokio::spawn(writer_loop(client, rx_actions, "{\"packet\":\"connect\"}".to_string()));

        tx_actions
            .send(OutboundAction::PlayerAction {
                runtime_id: 9,
                action: PlayerActionKind::StartSneak,
            })
            .unwrap();
        drop(tx_actions);
        timeout(Duration::from_secs(1), writer).await.unwrap().unwrap();

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"packet\":\"connect\"}");
        let frame: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(frame["packet"], "player_action");
        assert_eq!(frame["action"], "start_sneak");
    }
}
