use std::sync::Arc;

use delivery_dispatch::api::rest::router;
use delivery_dispatch::config::Config;
use delivery_dispatch::engine::housekeeping::run_housekeeping;
use delivery_dispatch::error::AppError;
use delivery_dispatch::observability::init_tracing;
use delivery_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    init_tracing(&config);

    let shared_state = Arc::new(AppState::new(&config));
    let app = router(shared_state.clone());

    tokio::spawn(run_housekeeping(
        shared_state.clone(),
        config.housekeeping.clone(),
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        pickup = ?config.dispatch.pickup_location,
        strict_transitions = config.dispatch.strict_transitions,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
