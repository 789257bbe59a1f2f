//! Event-Broadcaster – Zustellung von Server-Events an verbundene Clients
//!
//! Der EventBroadcaster verwaltet die Send-Queues aller verbundenen Clients
//! und die Transport-Zuordnung Client -> Room.
//!
//! ## Selektives Broadcasting
//! - An einen User: `an_user_senden`
//! - An einen Room (optional ohne Ausloeser): `an_room_senden`
//! - An einen User innerhalb eines Rooms: `an_room_mitglied_senden`
//!
//! Alle Sendemethoden sind nicht-blockierend (`try_send`). Der Coordinator
//! ruft sie unter dem Room-Lock auf.

use dashmap::DashMap;
use indexmap::IndexSet;
use plaza_core::types::{RoomId, UserId};
use plaza_protocol::control::{ControlMessage, ServerEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Ausgehende Nachricht an einen Client
pub type Ausgehend = ControlMessage<ServerEvent>;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Client
const SEND_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// RoomTransport
// ---------------------------------------------------------------------------

/// Room-bezogene Zustellung wie sie Coordinator und Relay benoetigen
///
/// Implementierungen duerfen nicht blockieren; sie werden unter dem
/// Room-Lock aufgerufen.
pub trait RoomTransport: Send + Sync {
    /// Sendet an einen einzelnen Client
    fn an_user_senden(&self, user_id: &UserId, nachricht: Ausgehend) -> bool;

    /// Sendet an alle Clients im Room, optional ohne `ausser`
    ///
    /// Gibt die Anzahl erfolgreicher Zustellungen zurueck.
    fn an_room_senden(&self, room_id: &RoomId, ausser: Option<&UserId>, nachricht: Ausgehend)
        -> usize;

    /// Sendet an `ziel`, aber nur wenn `ziel` dem Room zugeordnet ist
    fn an_room_mitglied_senden(&self, room_id: &RoomId, ziel: &UserId, nachricht: Ausgehend)
        -> bool;

    /// Ordnet einen Client einem Room zu
    fn room_beitreten(&self, room_id: RoomId, user_id: UserId);

    /// Loest die Zuordnung eines Clients zu einem Room
    fn room_verlassen(&self, room_id: &RoomId, user_id: &UserId);

    /// Loest alle Zuordnungen eines Rooms und gibt die betroffenen Clients zurueck
    fn room_aufloesen(&self, room_id: &RoomId) -> Vec<UserId>;

    /// `true` wenn fuer `user_id` inzwischen eine andere Verbindung registriert ist
    fn verbindung_abgeloest(&self, user_id: &UserId, verbindung: u64) -> bool;
}

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue eines verbundenen Clients
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub user_id: UserId,
    /// Kennung der Verbindung, die diese Queue registriert hat
    pub verbindung: u64,
    pub tx: mpsc::Sender<Ausgehend>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: Ausgehend) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id = %self.user_id, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(user_id = %self.user_id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

/// Ergebnis von `client_registrieren`
#[derive(Debug)]
pub struct Registrierung {
    /// Wird beim Abmelden wieder vorgelegt
    pub verbindung: u64,
    pub empfaenger: mpsc::Receiver<Ausgehend>,
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentraler Event-Broadcaster fuer alle verbundenen Clients
///
/// Pro UserId gibt es genau eine Send-Queue. Eine neue Registrierung fuer
/// dieselbe UserId ersetzt die alte; deren Empfaenger endet dann.
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    /// Client-Sender, indiziert nach UserId
    clients: DashMap<UserId, ClientSender>,
    /// Transport-Zuordnung: room_id -> UserIds in Beitritts-Reihenfolge
    rooms: DashMap<RoomId, IndexSet<UserId>>,
    naechste_verbindung: AtomicU64,
}

impl EventBroadcaster {
    /// Erstellt einen neuen EventBroadcaster
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                rooms: DashMap::new(),
                naechste_verbindung: AtomicU64::new(1),
            }),
        }
    }

    /// Registriert einen Client und gibt seine Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und sendet via TCP.
    pub fn client_registrieren(&self, user_id: UserId) -> Registrierung {
        let (tx, empfaenger) = mpsc::channel(SEND_QUEUE_GROESSE);
        let verbindung = self.inner.naechste_verbindung.fetch_add(1, Ordering::Relaxed);
        let sender = ClientSender {
            user_id,
            verbindung,
            tx,
        };
        if self.inner.clients.insert(user_id, sender).is_some() {
            tracing::info!(user_id = %user_id, "Bestehende Verbindung wird ersetzt");
        }
        tracing::debug!(user_id = %user_id, verbindung, "Client im Broadcaster registriert");
        Registrierung {
            verbindung,
            empfaenger,
        }
    }

    /// Entfernt einen Client, sofern `verbindung` noch die aktuelle ist
    ///
    /// Gibt `false` zurueck wenn die Registrierung inzwischen ersetzt wurde.
    /// Die Room-Zuordnungen bleiben dann fuer die neue Verbindung bestehen.
    pub fn client_entfernen(&self, user_id: &UserId, verbindung: u64) -> bool {
        let entfernt = self
            .inner
            .clients
            .remove_if(user_id, |_, sender| sender.verbindung == verbindung)
            .is_some();
        if !entfernt {
            return false;
        }

        self.inner.rooms.iter_mut().for_each(|mut entry| {
            entry.value_mut().shift_remove(user_id);
        });
        self.inner.rooms.retain(|_, mitglieder| !mitglieder.is_empty());
        tracing::debug!(user_id = %user_id, "Client aus Broadcaster entfernt");
        true
    }

    /// Gibt die Anzahl der registrierten Clients zurueck
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Prueft ob ein Client registriert ist
    pub fn ist_registriert(&self, user_id: &UserId) -> bool {
        self.inner.clients.contains_key(user_id)
    }

    /// Gibt alle User-IDs zurueck die einem Room zugeordnet sind
    pub fn user_ids_in_room(&self, room_id: &RoomId) -> Vec<UserId> {
        self.inner
            .rooms
            .get(room_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn sender(&self, user_id: &UserId) -> Option<ClientSender> {
        self.inner
            .clients
            .get(user_id)
            .map(|eintrag| eintrag.value().clone())
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

impl RoomTransport for EventBroadcaster {
    fn an_user_senden(&self, user_id: &UserId, nachricht: Ausgehend) -> bool {
        match self.sender(user_id) {
            Some(sender) => sender.senden(nachricht),
            None => {
                tracing::debug!(user_id = %user_id, "Senden an unbekannten Client");
                false
            }
        }
    }

    fn an_room_senden(
        &self,
        room_id: &RoomId,
        ausser: Option<&UserId>,
        nachricht: Ausgehend,
    ) -> usize {
        // Kopie ziehen, damit kein Shard-Lock waehrend des Sendens gehalten wird
        let empfaenger = self.user_ids_in_room(room_id);

        let mut gesendet = 0;
        for user_id in empfaenger.iter().filter(|uid| Some(*uid) != ausser) {
            if let Some(sender) = self.sender(user_id) {
                if sender.senden(nachricht.clone()) {
                    gesendet += 1;
                }
            }
        }
        gesendet
    }

    fn an_room_mitglied_senden(&self, room_id: &RoomId, ziel: &UserId, nachricht: Ausgehend) -> bool {
        let zugeordnet = self
            .inner
            .rooms
            .get(room_id)
            .is_some_and(|ids| ids.contains(ziel));
        if !zugeordnet {
            tracing::debug!(room_id = %room_id, ziel = %ziel, "Ziel nicht im Room – nicht zustellbar");
            return false;
        }
        self.an_user_senden(ziel, nachricht)
    }

    fn room_beitreten(&self, room_id: RoomId, user_id: UserId) {
        self.inner.rooms.entry(room_id).or_default().insert(user_id);
    }

    fn room_verlassen(&self, room_id: &RoomId, user_id: &UserId) {
        let leer = match self.inner.rooms.get_mut(room_id) {
            Some(mut ids) => {
                ids.shift_remove(user_id);
                ids.is_empty()
            }
            None => false,
        };
        if leer {
            self.inner.rooms.remove_if(room_id, |_, ids| ids.is_empty());
        }
    }

    fn room_aufloesen(&self, room_id: &RoomId) -> Vec<UserId> {
        self.inner
            .rooms
            .remove(room_id)
            .map(|(_, ids)| ids.into_iter().collect())
            .unwrap_or_default()
    }

    fn verbindung_abgeloest(&self, user_id: &UserId, verbindung: u64) -> bool {
        self.inner
            .clients
            .get(user_id)
            .is_some_and(|sender| sender.verbindung != verbindung)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
