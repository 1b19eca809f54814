use anyhow::Context;
use clap::Parser;
use gatehouse_bridge::TerminalBridge;
use gatehouse_correlator::{Correlator, MqttBus};
use gatehouse_relay::StreamRelay;
use gatehouse_server::cli::Cli;
use gatehouse_server::clients::BiometricServices;
use gatehouse_server::state::persist_registrations;
use gatehouse_server::{AppState, logging, router};
use gatehouse_storage::Database;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format)?;

    let database = Database::new(cli.database_config())
        .await
        .with_context(|| format!("opening database {}", cli.database_path))?;
    let users = database.users();

    let bridge = TerminalBridge::new(cli.bridge_config());

    let broker = cli.broker_config();
    info!(broker = %broker.broker_address(), "Connecting to message broker");
    let (bus, events) = MqttBus::start(&broker);
    let (correlator, updates) = Correlator::new(bus, cli.correlator_config());

    let runner = correlator.clone();
    tokio::spawn(async move { runner.run(events).await });
    let sweeper = correlator.clone();
    tokio::spawn(async move { sweeper.run_sweeper().await });
    tokio::spawn(persist_registrations(updates, users.clone()));

    let relay = StreamRelay::new(cli.relay_config(), cli.camera_config());
    if !relay.is_configured() {
        warn!("Camera not configured, stream routes will answer 503");
    }
    let services = BiometricServices::new(cli.service_urls())?;

    let state = AppState::new(bridge, correlator.clone(), relay, users, services);
    let app = router(state);

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    info!(addr = %cli.listen, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    let result = correlator.disconnect().await;
    if !result.success {
        warn!(error = result.error_text(), "Broker disconnect failed");
    }
    database.close().await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal as unix_signal};

    match unix_signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = signal::ctrl_c() => {},
                _ = term.recv() => {},
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C");
            let _ = signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
