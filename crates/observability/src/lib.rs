//! # plaza-observability
//!
//! Observability-Crate fuer Plaza:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//!
//! Beide Endpunkte lesen einen `LaufzeitQuelle`-Snapshot, den der Server
//! bereitstellt.

pub mod health;
pub mod laufzeit;
pub mod logging;
pub mod metrics;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use laufzeit::{FesteLaufzeit, LaufzeitDaten, LaufzeitQuelle};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, MetricsState, PlazaMetrics};

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Baut den Router mit `/metrics` und `/health`
pub fn router_erstellen(quelle: Arc<dyn LaufzeitQuelle>) -> Result<Router> {
    let metriken = PlazaMetrics::neu()?;

    Ok(Router::new()
        .merge(metrics_router(MetricsState {
            metriken,
            quelle: Arc::clone(&quelle),
        }))
        .merge(health_router(HealthState::neu(quelle)))
        .layer(TraceLayer::new_for_http()))
}

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    quelle: Arc<dyn LaufzeitQuelle>,
    mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let app = router_erstellen(quelle)?;

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;

    tracing::info!("Observability-Server gestoppt");
    Ok(())
}
