//! Swap conductor binary entrypoint wiring REST, WebSocket, SSE and the background tasks.

use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swap_conductor::{
    config::AppConfig,
    dao::{save_files::SaveFiles, state_file},
    routes,
    services::{persistence, scheduler},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    // A state file we cannot decode is not silently replaced.
    let mut initial = state_file::load(&config.state_path)
        .await
        .with_context(|| format!("loading state from {}", config.state_path.display()))?
        .unwrap_or_default();
    let saves = SaveFiles::new(config.saves_dir.clone());
    initial.reconcile_after_load(|instance_id| saves.exists(instance_id));
    info!(
        players = initial.players.len(),
        instances = initial.instances.len(),
        mode = %initial.mode,
        "session state loaded"
    );

    let port = config.port;
    let app_state = AppState::new(config, initial);

    let persistence_task = tokio::spawn(persistence::run(app_state.clone()));
    tokio::spawn(scheduler::run(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    persistence_task.abort();
    match persistence::persist_now(&app_state).await {
        Ok(()) => info!("final state written"),
        Err(err) => warn!(error = %err, "failed to write final state"),
    }

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
