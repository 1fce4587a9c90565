use std::sync::Arc;
use std::time::Duration;

use sched_portal::modules;
use sched_portal::modules::session::SessionSweeper;
use sched_portal::proxy;

fn env_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes" | "on")
}

#[tokio::main]
async fn main() -> Result<(), String> {
    modules::logger::init_logger();

    let mut portal_config = match modules::config::load_portal_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::warn!("failed to load portal config: {}. using defaults", err);
            let cfg = proxy::ProxyConfig::default();
            let _ = modules::config::save_portal_config(&cfg);
            cfg
        }
    };

    if let Ok(origin) = std::env::var("SCHED_PORTAL_UPSTREAM") {
        portal_config.upstream_origin = origin;
    }

    if let Ok(value) = std::env::var("SCHED_PORTAL_PORT") {
        portal_config.port = value
            .parse()
            .map_err(|e| format!("invalid SCHED_PORTAL_PORT {:?}: {}", value, e))?;
    }

    if let Ok(value) = std::env::var("SCHED_PORTAL_ALLOW_LAN") {
        if env_flag(&value) {
            portal_config.allow_lan_access = true;
        }
    }

    let bind_address = if let Ok(addr) = std::env::var("SCHED_PORTAL_BIND") {
        if addr != "127.0.0.1" && addr != "localhost" {
            portal_config.allow_lan_access = true;
        }
        addr
    } else {
        portal_config.get_bind_address().to_string()
    };

    let state = proxy::AppState::from_config(&portal_config)
        .map_err(|e| format!("failed to initialize portal: {}", e))?;

    let sweeper = SessionSweeper::start(
        Arc::clone(&state.sessions),
        Duration::from_secs(portal_config.session_sweep_secs.max(1)),
    );

    let (server, handle) = proxy::AxumServer::start(bind_address.clone(), portal_config.port, state)
        .await
        .map_err(|e| format!("failed to start portal server: {}", e))?;

    tracing::info!(
        "sched-portal listening on http://{}:{} (upstream {})",
        bind_address,
        portal_config.port,
        portal_config.upstream_origin
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for shutdown signal: {}", e))?;

    tracing::info!("shutdown requested, stopping server...");
    server.stop();
    let _ = handle.await;
    sweeper.stop().await;

    Ok(())
}
