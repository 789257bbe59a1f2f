//! Laufzeit-Snapshot als Datenquelle fuer `/health` und `/metrics`
//!
//! Der Observability-Crate kennt weder Registry noch Broadcaster. Der Server
//! implementiert `LaufzeitQuelle` und liefert bei jedem Abruf einen
//! aktuellen Snapshot.

use serde::Serialize;

/// Momentaufnahme der Server-Zaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LaufzeitDaten {
    /// Angemeldete Verbindungen
    pub verbundene_clients: usize,
    /// Registrierte Rooms
    pub rooms: usize,
    /// Summe der Mitglieder ueber alle Rooms
    pub aktive_mitglieder: usize,
    /// Seit Start verteilte Chat-Nachrichten (monoton)
    pub chat_nachrichten: u64,
    /// Seit Start zugestellte Signale (monoton)
    pub signale: u64,
}

/// Liefert Laufzeit-Snapshots
pub trait LaufzeitQuelle: Send + Sync + 'static {
    fn laufzeit_daten(&self) -> LaufzeitDaten;
}

/// Quelle mit festen Werten (Tests, Server ohne Signaling)
#[derive(Debug, Clone, Copy, Default)]
pub struct FesteLaufzeit(pub LaufzeitDaten);

impl LaufzeitQuelle for FesteLaufzeit {
    fn laufzeit_daten(&self) -> LaufzeitDaten {
        self.0
    }
}
