use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;

use bomberdino_server::api;
use bomberdino_server::config::Config;
use bomberdino_server::engine::events::BroadcastSink;
use bomberdino_server::engine::server::GameServer;
use bomberdino_server::metrics;
use bomberdino_server::worker_pool::TimerPool;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "bomberdino-server" }))
}

/// Drive every running session at a steady interval.
fn spawn_tick_driver(game_server: Arc<GameServer>, interval_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            game_server.update_all(Instant::now());
        }
    });
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    metrics::register_metrics();

    let config = Config::load();
    tracing::info!(?config, "configuration loaded");

    let timers = Arc::new(TimerPool::new(config.timer_workers));
    let events = Arc::new(BroadcastSink::new(1024));
    let game_server = Arc::new(GameServer::new(
        config.engine_settings(),
        timers,
        events.clone(),
    ));

    spawn_tick_driver(game_server.clone(), config.tick_interval_ms);

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(api::router(game_server, events))
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("bomberdino server listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
