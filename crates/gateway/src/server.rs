use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::get,
    },
    pilot_config::{PilotConfig, Severity, validate},
    tokio::net::TcpListener,
    tower_http::{
        catch_panic::CatchPanicLayer,
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{error, info, warn},
};

use crate::{
    error::panic_response, orchestrator::BrowserServices, routes::browser_router,
    state::GatewayState,
};

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/browser", browser_router())
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the gateway with production collaborators and run until SIGINT or
/// SIGTERM.
pub async fn start_gateway(config: PilotConfig) -> anyhow::Result<()> {
    log_diagnostics(&config);

    let services = Arc::new(BrowserServices::from_config(&config));
    let state = GatewayState::new(services);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, version = %state.version, "gateway listening");

    serve(
        listener,
        state,
        shutdown_signal(),
        Duration::from_millis(config.server.shutdown_grace_ms),
    )
    .await
}

/// Serve until `shutdown` resolves, then release every browser session,
/// waiting at most `grace` for the releases to finish.
pub async fn serve(
    listener: TcpListener,
    state: Arc<GatewayState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> anyhow::Result<()> {
    let app = build_gateway_app(Arc::clone(&state));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("gateway shutting down");
        })
        .await?;

    release_sessions(&state, grace).await;
    Ok(())
}

/// Best-effort teardown of all sessions, bounded by `grace`.
pub async fn release_sessions(state: &GatewayState, grace: Duration) {
    let pending = state.registry.release_all().await;
    if pending.is_empty() {
        return;
    }
    let count = pending.len();
    let all = futures::future::join_all(pending);
    match tokio::time::timeout(grace, all).await {
        Ok(_) => info!(sessions = count, "browser sessions released"),
        Err(_) => warn!(
            sessions = count,
            grace_ms = grace.as_millis() as u64,
            "session release still running at shutdown, leaving it to the provider timeout"
        ),
    }
}

fn log_diagnostics(config: &PilotConfig) {
    for diagnostic in validate(config).diagnostics {
        match diagnostic.severity {
            Severity::Error => error!(path = %diagnostic.path, "{}", diagnostic.message),
            Severity::Warning => warn!(path = %diagnostic.path, "{}", diagnostic.message),
            Severity::Info => info!(path = %diagnostic.path, "{}", diagnostic.message),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "conversations": state.registry.len(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}
