//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt alle geteilten Services als guenstig klonbare Handles, die sicher
//! zwischen tokio-Tasks geteilt werden koennen.

use plaza_core::types::Position;
use plaza_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use plaza_rooms::RoomRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::{EventBroadcaster, RoomTransport};
use crate::catalog::{KatalogVorgaben, RoomKatalog};
use crate::coordinator::{PresenceCoordinator, STANDARD_MAX_NACHRICHT_BYTES};
use crate::identity::IdentityProvider;
use crate::relay::SignalingRelay;

// ---------------------------------------------------------------------------
// SignalingConfig
// ---------------------------------------------------------------------------

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: u32,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
    /// Startposition neuer Mitglieder
    pub start_position: Position,
    /// Obergrenze fuer Chat-Nachrichten (JSON-kodiert)
    pub max_nachricht_bytes: usize,
    /// Standardwerte fuer neue Rooms
    pub vorgaben: KatalogVorgaben,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Plaza".to_string(),
            max_clients: 512,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
            start_position: Position::neu(100.0, 100.0),
            max_nachricht_bytes: STANDARD_MAX_NACHRICHT_BYTES,
            vorgaben: KatalogVorgaben::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// SignalingStatistik
// ---------------------------------------------------------------------------

/// Monoton steigende Zaehler fuer die Metriken
///
/// Clone teilt die Zaehler.
#[derive(Debug, Clone, Default)]
pub struct SignalingStatistik {
    inner: Arc<StatistikInner>,
}

#[derive(Debug, Default)]
struct StatistikInner {
    chat_nachrichten: AtomicU64,
    signale: AtomicU64,
}

impl SignalingStatistik {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn chat_nachricht_zaehlen(&self) {
        self.inner.chat_nachrichten.fetch_add(1, Ordering::Relaxed);
    }

    pub fn signal_zaehlen(&self) {
        self.inner.signale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chat_nachrichten(&self) -> u64 {
        self.inner.chat_nachrichten.load(Ordering::Relaxed)
    }

    pub fn signale(&self) -> u64 {
        self.inner.signale.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// SignalingState
// ---------------------------------------------------------------------------

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Alle Rooms des Prozesses
    pub registry: RoomRegistry,
    /// Token-Pruefung und Principal-Aufloesung
    pub identitaet: Arc<dyn IdentityProvider>,
    /// Event-Broadcaster (Nachrichten an Clients senden)
    pub broadcaster: EventBroadcaster,
    /// Join, Leave, Position, Chat, Disconnect
    pub coordinator: PresenceCoordinator,
    /// Offer/Answer/ICE und Screen-Share
    pub relay: SignalingRelay,
    /// Room-Verwaltung (Erstellen, Aendern, Loeschen, Listen)
    pub katalog: RoomKatalog,
    /// Zaehler fuer die Metriken
    pub statistik: SignalingStatistik,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Verdrahtet alle Services ueber einer gemeinsamen Registry
    pub fn neu(
        config: SignalingConfig,
        registry: RoomRegistry,
        identitaet: Arc<dyn IdentityProvider>,
    ) -> Arc<Self> {
        let broadcaster = EventBroadcaster::neu();
        let transport: Arc<dyn RoomTransport> = Arc::new(broadcaster.clone());
        let statistik = SignalingStatistik::neu();

        let coordinator = PresenceCoordinator::neu(
            registry.clone(),
            Arc::clone(&identitaet),
            Arc::clone(&transport),
        )
        .mit_start_position(config.start_position)
        .mit_max_nachricht_bytes(config.max_nachricht_bytes)
        .mit_statistik(statistik.clone());

        let relay = SignalingRelay::neu(Arc::clone(&transport)).mit_statistik(statistik.clone());

        let katalog = RoomKatalog::neu(registry.clone(), Arc::clone(&identitaet), transport)
            .mit_vorgaben(config.vorgaben.clone());

        Arc::new(Self {
            config: Arc::new(config),
            registry,
            identitaet,
            broadcaster,
            coordinator,
            relay,
            katalog,
            statistik,
            start_time: Instant::now(),
        })
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
