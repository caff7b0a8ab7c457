// Prometheus metrics definitions for the game server.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Sessions held by the registry, in any status.
    pub static ref ACTIVE_SESSIONS: IntGauge =
        IntGauge::new("bomberdino_active_sessions", "Sessions held by the server").unwrap();

    /// Fuse and expiry timers scheduled but not yet run.
    pub static ref PENDING_TIMERS: IntGauge =
        IntGauge::new("bomberdino_pending_timers", "Timers waiting to fire").unwrap();

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("bomberdino_connected_websockets", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    pub static ref BOMBS_PLACED_TOTAL: IntCounter =
        IntCounter::new("bomberdino_bombs_placed_total", "Bombs placed").unwrap();

    pub static ref BOMBS_EXPLODED_TOTAL: IntCounter =
        IntCounter::new("bomberdino_bombs_exploded_total", "Bombs exploded").unwrap();

    pub static ref PLAYERS_KILLED_TOTAL: IntCounter =
        IntCounter::new("bomberdino_players_killed_total", "Player deaths").unwrap();

    /// Power-ups put on the grid, by type.
    pub static ref POWERUPS_SPAWNED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bomberdino_powerups_spawned_total", "Power-ups spawned"),
        &["type"],
    )
    .unwrap();

    /// Power-ups picked up, by type.
    pub static ref POWERUPS_COLLECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bomberdino_powerups_collected_total", "Power-ups collected"),
        &["type"],
    )
    .unwrap();

    /// Player actions refused by the engine, by error kind.
    pub static ref ACTIONS_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bomberdino_actions_rejected_total", "Rejected player actions"),
        &["kind"],
    )
    .unwrap();

    /// Timer jobs that returned an error or panicked, by timer label.
    pub static ref TIMER_JOBS_FAILED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bomberdino_timer_jobs_failed_total", "Failed timer jobs"),
        &["timer"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Time from start to finish of a session, in seconds.
    pub static ref SESSION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("bomberdino_session_duration_seconds", "Session duration in seconds")
            .buckets(vec![10.0, 30.0, 60.0, 120.0, 180.0, 300.0, 600.0]),
    )
    .unwrap();

    /// Time spent sweeping every session in one driver tick, in milliseconds.
    pub static ref SESSION_TICK_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("bomberdino_session_tick_duration_ms", "Per-tick processing time in ms")
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_SESSIONS.clone()),
        Box::new(PENDING_TIMERS.clone()),
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(BOMBS_PLACED_TOTAL.clone()),
        Box::new(BOMBS_EXPLODED_TOTAL.clone()),
        Box::new(PLAYERS_KILLED_TOTAL.clone()),
        Box::new(POWERUPS_SPAWNED_TOTAL.clone()),
        Box::new(POWERUPS_COLLECTED_TOTAL.clone()),
        Box::new(ACTIONS_REJECTED_TOTAL.clone()),
        Box::new(TIMER_JOBS_FAILED_TOTAL.clone()),
        Box::new(SESSION_DURATION_SECONDS.clone()),
        Box::new(SESSION_TICK_DURATION_MS.clone()),
    ];

    for c in collectors {
        // a second call (tests) finds them already registered
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!(error = %e, "metric already registered");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
