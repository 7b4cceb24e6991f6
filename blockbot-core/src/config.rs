// File: blockbot-core/src/config.rs
//!
//! Environment-sourced runtime configuration. The connection target is
//! fixed at build time; only the bot identity, the dashboard port and the
//! gateway address come from the environment.

use rand::Rng;

use crate::transport::SessionConfig;

/// Target server, baked in.
pub const SERVER_HOST: &str = "play.blockbot-smp.net";
pub const SERVER_PORT: u16 = 19132;
pub const PROTOCOL_VERSION: &str = "1.21.114";

pub const DEFAULT_WEB_PORT: u16 = 3000;
pub const DEFAULT_GATEWAY_ADDR: &str = "127.0.0.1:19134";

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub server_host: String,
    pub server_port: u16,
    pub protocol_version: String,
    /// Offline auth for cracked / non-Xbox-auth servers.
    pub offline: bool,
    pub username: String,
    pub web_port: u16,
    /// Address of the protocol gateway the transport speaks to.
    pub gateway_addr: String,
}

impl BotConfig {
    /// Reads `BOT_USERNAME`, `WEB_PORT` and `GATEWAY_ADDR`; anything unset
    /// or unparseable falls back to its default.
    pub fn from_env() -> Self {
        Self {
            server_host: SERVER_HOST.to_string(),
            server_port: SERVER_PORT,
            protocol_version: PROTOCOL_VERSION.to_string(),
            offline: true,
            username: username_or_default(std::env::var("BOT_USERNAME").ok()),
            web_port: web_port_or_default(std::env::var("WEB_PORT").ok()),
            gateway_addr: std::env::var("GATEWAY_ADDR")
                .unwrap_or_else(|_| DEFAULT_GATEWAY_ADDR.to_string()),
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            host: self.server_host.clone(),
            port: self.server_port,
            username: self.username.clone(),
            offline: self.offline,
            protocol_version: self.protocol_version.clone(),
        }
    }
}

fn username_or_default(from_env: Option<String>) -> String {
    match from_env {
        Some(name) if !name.trim().is_empty() => name,
        _ => format!("BedrockBot_{}", rand::rng().random_range(0..1000)),
    }
}

fn web_port_or_default(from_env: Option<String>) -> u16 {
    from_env
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WEB_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_from_env_wins() {
        assert_eq!(
            username_or_default(Some("Steve".into())),
            "Steve".to_string()
        );
    }

    #[test]
    fn blank_username_gets_random_suffix() {
        let name = username_or_default(Some("   ".into()));
        assert!(name.starts_with("BedrockBot_"));
        let suffix: u32 = name["BedrockBot_".len()..].parse().unwrap();
        assert!(suffix < 1000);
    }

    #[test]
    fn web_port_falls_back_on_garbage() {
        assert_eq!(web_port_or_default(Some("8080".into())), 8080);
        assert_eq!(web_port_or_default(Some("not-a-port".into())), DEFAULT_WEB_PORT);
        assert_eq!(web_port_or_default(None), DEFAULT_WEB_PORT);
    }
}
