// File: blockbot-server/src/main.rs

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use blockbot_core::config::BotConfig;
use blockbot_core::eventbus::EventBus;
use blockbot_core::lifecycle::LifecycleManager;
use blockbot_core::state::BotState;
use blockbot_core::transport::gateway::GatewayTransport;

mod stats;
mod web;

#[derive(Parser, Debug, Clone)]
#[command(name = "blockbot")]
#[command(author, version, about = "BlockBot - Bedrock AFK bot with web dashboard")]
struct Args {
    /// Port for the web dashboard (overrides WEB_PORT)
    #[arg(long)]
    web_port: Option<u16>,

    /// Address of the local protocol gateway (overrides GATEWAY_ADDR)
    #[arg(long)]
    gateway_addr: Option<String>,

    /// Run without the web dashboard
    #[arg(long, default_value = "false")]
    headless: bool,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("blockbot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut config = BotConfig::from_env();
    if let Some(port) = args.web_port {
        config.web_port = port;
    }
    if let Some(addr) = args.gateway_addr {
        config.gateway_addr = addr;
    }

    info!(
        "BlockBot starting. username={}, server={}:{}, web_port={}",
        config.username, config.server_host, config.server_port, config.web_port
    );

    let state = BotState::shared();
    let event_bus = Arc::new(EventBus::new());
    let (cmd_tx, cmd_rx) = mpsc::channel(32);

    // Connection lifecycle, owning the session and its retry loop.
    let transport = Arc::new(GatewayTransport::new(config.gateway_addr.clone()));
    let lifecycle = LifecycleManager::new(
        transport,
        config.session(),
        state.clone(),
        event_bus.clone(),
        cmd_rx,
    );
    let lifecycle_handle = tokio::spawn(lifecycle.run());

    // Periodic publishers for the dashboard and the memory log.
    let stats_handle = stats::spawn_stats_task(
        state.clone(),
        event_bus.clone(),
        stats::STATS_PERIOD,
    );
    let memlog_handle =
        stats::spawn_memory_log_task(event_bus.clone(), stats::MEMORY_LOG_PERIOD);

    // Web dashboard, unless running headless.
    let web_handle = if args.headless {
        info!("Headless mode; dashboard disabled");
        None
    } else {
        let app = web::create_router(web::AppState {
            config: config.clone(),
            state: state.clone(),
            bus: event_bus.clone(),
            commands: cmd_tx.clone(),
        });
        let bind_addr = format!("0.0.0.0:{}", config.web_port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!("Dashboard listening on http://{bind_addr}");
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Web server error: {:?}", e);
            }
        }))
    };

    // SIGINT / SIGTERM both funnel into the event bus shutdown flag.
    let eb_clone = event_bus.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler");
            tokio::select! {
                result = ctrl_c => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl-C: {:?}", e);
                    }
                    info!("Ctrl-C detected; shutting down...");
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received; shutting down...");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                error!("Failed to listen for Ctrl-C: {:?}", e);
            }
            info!("Ctrl-C detected; shutting down...");
        }
        eb_clone.shutdown();
    });

    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    loop {
        if shutdown_rx.changed().await.is_err() || *shutdown_rx.borrow() {
            info!("Shutdown signaled; stopping services.");
            break;
        }
    }

    // Lifecycle observes the same shutdown flag and tears the session
    // down itself; wait for it rather than aborting mid-teardown.
    drop(cmd_tx);
    if let Err(e) = lifecycle_handle.await {
        error!("Lifecycle task error: {:?}", e);
    }
    if let Some(handle) = web_handle {
        handle.abort();
    }
    stats_handle.abort();
    memlog_handle.abort();

    info!("BlockBot stopped.");
    Ok(())
}
