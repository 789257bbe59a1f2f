//! Prometheus-kompatible Metriken fuer Plaza
//!
//! Registrierte Metriken:
//! - `plaza_connected_clients` – Gauge: Aktuell angemeldete Clients
//! - `plaza_rooms_active` – Gauge: Registrierte Rooms
//! - `plaza_room_members` – Gauge: Mitglieder ueber alle Rooms
//! - `plaza_chat_messages_total` – Counter: Verteilte Chat-Nachrichten
//! - `plaza_signals_relayed_total` – Counter: Zugestellte Offer/Answer/ICE
//!
//! Die Werte werden beim Scrape aus einer `LaufzeitQuelle` uebernommen.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use parking_lot::Mutex;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::laufzeit::{LaufzeitDaten, LaufzeitQuelle};

/// Alle Plaza-Prometheus-Metriken
#[derive(Clone)]
pub struct PlazaMetrics {
    pub registry: Arc<Registry>,

    // Verbindungen und Rooms
    pub connected_clients: IntGauge,
    pub rooms_active: IntGauge,
    pub room_members: IntGauge,

    // Verkehr
    pub chat_messages_total: IntCounter,
    pub signals_relayed_total: IntCounter,

    /// Serialisiert Aktualisierungen paralleler Scrapes
    aktualisierung: Arc<Mutex<()>>,
}

impl PlazaMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "plaza_connected_clients",
            "Anzahl aktuell angemeldeter Clients",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let rooms_active = IntGauge::with_opts(Opts::new(
            "plaza_rooms_active",
            "Anzahl registrierter Rooms",
        ))?;
        registry.register(Box::new(rooms_active.clone()))?;

        let room_members = IntGauge::with_opts(Opts::new(
            "plaza_room_members",
            "Summe der Mitglieder ueber alle Rooms",
        ))?;
        registry.register(Box::new(room_members.clone()))?;

        let chat_messages_total = IntCounter::with_opts(Opts::new(
            "plaza_chat_messages_total",
            "Gesamtanzahl verteilter Chat-Nachrichten",
        ))?;
        registry.register(Box::new(chat_messages_total.clone()))?;

        let signals_relayed_total = IntCounter::with_opts(Opts::new(
            "plaza_signals_relayed_total",
            "Gesamtanzahl zugestellter WebRTC-Signale",
        ))?;
        registry.register(Box::new(signals_relayed_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            rooms_active,
            room_members,
            chat_messages_total,
            signals_relayed_total,
            aktualisierung: Arc::new(Mutex::new(())),
        })
    }

    /// Uebernimmt einen Snapshot
    ///
    /// Gauges werden gesetzt, Counter um die Differenz zum bisherigen Stand
    /// erhoeht. Ein kleinerer Quellwert laesst den Counter unveraendert.
    pub fn aktualisieren(&self, daten: &LaufzeitDaten) {
        let _sperre = self.aktualisierung.lock();

        self.connected_clients.set(gauge_wert(daten.verbundene_clients));
        self.rooms_active.set(gauge_wert(daten.rooms));
        self.room_members.set(gauge_wert(daten.aktive_mitglieder));

        nachziehen(&self.chat_messages_total, daten.chat_nachrichten);
        nachziehen(&self.signals_relayed_total, daten.signale);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn gauge_wert(wert: usize) -> i64 {
    i64::try_from(wert).unwrap_or(i64::MAX)
}

fn nachziehen(counter: &IntCounter, stand: u64) {
    let differenz = stand.saturating_sub(counter.get());
    if differenz > 0 {
        counter.inc_by(differenz);
    }
}

/// Geteilter Zustand fuer den Metrik-Handler
#[derive(Clone)]
pub struct MetricsState {
    pub metriken: PlazaMetrics,
    pub quelle: Arc<dyn LaufzeitQuelle>,
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(state: MetricsState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    state.metriken.aktualisieren(&state.quelle.laufzeit_daten());

    match state.metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
