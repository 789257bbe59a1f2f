//! Room-Registry – RoomId -> Room, Lebenszyklus und Mitgliedschafts-Abfragen
//!
//! ## Sperrmodell
//! - Die Map selbst ist eine `DashMap` (strukturelle Aenderungen pro Shard gesperrt)
//! - Jeder Room liegt hinter einem eigenen `parking_lot::Mutex`; alle
//!   Mutationen eines Rooms laufen darunter serialisiert
//! - Ein Shard-Lock wird nie gehalten waehrend ein Room-Mutex angefordert wird.
//!   Umgekehrt (Room-Mutex, dann `remove_if`) ist erlaubt.
//!
//! Die `nachher`-Closures der Mutationen laufen noch unter dem Room-Mutex.
//! Der Coordinator verschickt dort seine Broadcasts, damit die Event-Reihenfolge
//! pro Room der Mutations-Reihenfolge entspricht. Die Closures duerfen nicht
//! blockieren.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use plaza_core::types::{RoomId, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{RoomError, RoomResult};
use crate::policy::{OffenerZutritt, ZutrittsPolicy};
use crate::room::{Mitglied, Room, RoomInfo, RoomSpec, RoomUpdate};

type RoomZelle = Arc<Mutex<Room>>;

// ---------------------------------------------------------------------------
// Austritt
// ---------------------------------------------------------------------------

/// Ergebnis eines `room_verlassen`-Aufrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Austritt {
    /// Der Benutzer war vor dem Aufruf Mitglied
    pub war_mitglied: bool,
    /// Der Room war danach leer und nicht persistent und wurde entfernt
    pub room_aufgeloest: bool,
}

// ---------------------------------------------------------------------------
// RoomRegistry
// ---------------------------------------------------------------------------

/// Verwaltet alle Rooms des Prozesses
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RoomRegistryInner>,
}

struct RoomRegistryInner {
    rooms: DashMap<RoomId, RoomZelle>,
    naechste_sequenz: AtomicU64,
    policy: Box<dyn ZutrittsPolicy>,
}

impl RoomRegistry {
    /// Erstellt eine leere Registry mit offener Zutritts-Policy
    pub fn neu() -> Self {
        Self::mit_policy(OffenerZutritt)
    }

    /// Erstellt eine leere Registry mit eigener Zutritts-Policy
    pub fn mit_policy(policy: impl ZutrittsPolicy + 'static) -> Self {
        Self {
            inner: Arc::new(RoomRegistryInner {
                rooms: DashMap::new(),
                naechste_sequenz: AtomicU64::new(0),
                policy: Box::new(policy),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Registriert einen neuen Room
    ///
    /// Schlaegt mit `DoppelteId` fehl wenn die ID bereits vergeben ist.
    pub fn room_erstellen(&self, spec: RoomSpec) -> RoomResult<RoomInfo> {
        match self.inner.rooms.entry(spec.id) {
            Entry::Occupied(_) => {
                tracing::error!(room_id = %spec.id, "Room-ID bereits vergeben");
                Err(RoomError::DoppelteId(spec.id))
            }
            Entry::Vacant(frei) => {
                let mut room = Room::neu(spec);
                room.sequenz = self.inner.naechste_sequenz.fetch_add(1, Ordering::Relaxed);
                let info = room.oeffentliche_daten();
                frei.insert(Arc::new(Mutex::new(room)));

                tracing::info!(
                    room_id = %info.id,
                    owner_id = %info.owner_id,
                    persistent = info.is_persistent,
                    "Room erstellt"
                );
                Ok(info)
            }
        }
    }

    /// Entfernt einen Room bedingungslos
    ///
    /// Die Besitzer-Pruefung ist Sache des Aufrufers. Gibt die verbliebenen
    /// Mitglieder zurueck, `None` wenn der Room nicht existierte.
    pub fn room_loeschen(&self, room_id: &RoomId) -> Option<Vec<UserId>> {
        let (_, zelle) = self.inner.rooms.remove(room_id)?;
        let mut room = zelle.lock();
        if room.aufgeloest {
            return None;
        }
        room.aufgeloest = true;

        tracing::info!(room_id = %room_id, "Room geloescht");
        Some(room.mitglieder_ids())
    }

    // -----------------------------------------------------------------------
    // Lesen
    // -----------------------------------------------------------------------

    /// Oeffentlicher Snapshot eines Rooms
    pub fn room_info(&self, room_id: &RoomId) -> Option<RoomInfo> {
        self.room_lesen(room_id, Room::oeffentliche_daten)
    }

    /// Fuehrt `f` unter dem Room-Lock mit Lesezugriff aus
    pub fn room_lesen<R>(&self, room_id: &RoomId, f: impl FnOnce(&Room) -> R) -> Option<R> {
        let zelle = self.zelle(room_id)?;
        let room = zelle.lock();
        if room.aufgeloest {
            return None;
        }
        Some(f(&*room))
    }

    /// Fuehrt `f` unter dem Room-Lock mit Schreibzugriff aus
    ///
    /// Fuer Mutationen ohne Lebenszyklus-Folgen (Position, Chat).
    pub fn room_bearbeiten<R>(
        &self,
        room_id: &RoomId,
        f: impl FnOnce(&mut Room) -> R,
    ) -> Option<R> {
        let zelle = self.zelle(room_id)?;
        let mut room = zelle.lock();
        if room.aufgeloest {
            return None;
        }
        Some(f(&mut *room))
    }

    // -----------------------------------------------------------------------
    // Mitgliedschaft
    // -----------------------------------------------------------------------

    /// Traegt ein Mitglied ein und ruft danach `nachher` unter dem Room-Lock auf
    ///
    /// `NichtGefunden` wenn der Room fehlt oder gerade aufgeloest wurde,
    /// `ZugriffVerweigert` wenn die Zutritts-Policy ablehnt.
    pub fn room_beitreten<R>(
        &self,
        room_id: &RoomId,
        mitglied: Mitglied,
        passwort: Option<&str>,
        nachher: impl FnOnce(&Room) -> R,
    ) -> RoomResult<R> {
        let zelle = self
            .zelle(room_id)
            .ok_or(RoomError::NichtGefunden(*room_id))?;
        let mut room = zelle.lock();
        if room.aufgeloest {
            return Err(RoomError::NichtGefunden(*room_id));
        }

        self.inner
            .policy
            .zutritt_pruefen(&room, &mitglied, passwort)?;

        let user_id = mitglied.id;
        room.mitglied_hinzufuegen(mitglied);
        tracing::debug!(
            room_id = %room_id,
            user_id = %user_id,
            mitglieder = room.mitglieder_anzahl(),
            "Mitglied beigetreten"
        );
        Ok(nachher(&*room))
    }

    /// Entfernt ein Mitglied und loest leere, nicht persistente Rooms auf
    ///
    /// `nachher` laeuft unter dem Room-Lock nach dem Entfernen. `None` wenn
    /// der Room nicht (mehr) existiert.
    pub fn room_verlassen<R>(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        nachher: impl FnOnce(&Room, Austritt) -> R,
    ) -> Option<R> {
        self.room_verlassen_wenn(room_id, user_id, |_| true, nachher)
    }

    /// Wie `room_verlassen`, aber nur wenn `bedingung` unter dem Room-Lock zutrifft
    ///
    /// `None` wenn der Room fehlt oder `bedingung` ablehnt; der Room bleibt
    /// dann unveraendert.
    pub fn room_verlassen_wenn<R>(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        bedingung: impl FnOnce(&Room) -> bool,
        nachher: impl FnOnce(&Room, Austritt) -> R,
    ) -> Option<R> {
        let zelle = self.zelle(room_id)?;
        let mut room = zelle.lock();
        if room.aufgeloest || !bedingung(&room) {
            return None;
        }

        let war_mitglied = room.mitglied_entfernen(user_id).is_some();
        let room_aufgeloest = room.ist_leer() && !room.is_persistent();

        if room_aufgeloest {
            room.aufgeloest = true;
            // Nur genau diese Zelle entfernen, nie einen Nachfolger mit gleicher ID
            self.inner
                .rooms
                .remove_if(room_id, |_, eintrag| Arc::ptr_eq(eintrag, &zelle));
            tracing::info!(room_id = %room_id, "Leerer Room aufgeloest");
        }

        if war_mitglied {
            tracing::debug!(room_id = %room_id, user_id = %user_id, "Mitglied ausgetreten");
        }

        Some(nachher(
            &*room,
            Austritt {
                war_mitglied,
                room_aufgeloest,
            },
        ))
    }

    /// Wendet ein partielles Metadaten-Update an
    pub fn room_aktualisieren(&self, room_id: &RoomId, update: RoomUpdate) -> Option<RoomInfo> {
        self.room_bearbeiten(room_id, |room| {
            room.metadaten_aktualisieren(update);
            room.oeffentliche_daten()
        })
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    /// Alle Rooms in denen der Benutzer aktuell Mitglied ist
    pub fn rooms_mit_mitglied(&self, user_id: &UserId) -> Vec<RoomId> {
        self.sortierte_snapshots(|room| {
            room.hat_mitglied(user_id).then(|| room.id())
        })
    }

    /// Alle Rooms die dem Benutzer gehoeren
    pub fn rooms_von_besitzer(&self, user_id: &UserId) -> Vec<RoomInfo> {
        self.sortierte_snapshots(|room| {
            (room.owner_id() == *user_id).then(|| room.oeffentliche_daten())
        })
    }

    /// Oeffentliche Rooms, seitenweise in Erstellungsreihenfolge
    ///
    /// `seite` beginnt bei 1. Seiten hinter dem Ende liefern eine leere Liste.
    pub fn oeffentliche_rooms(&self, seite: usize, limit: usize) -> Vec<RoomInfo> {
        let offset = seite.saturating_sub(1).saturating_mul(limit);
        self.sortierte_snapshots(|room| (!room.is_private()).then(|| room.oeffentliche_daten()))
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect()
    }

    /// Anzahl registrierter Rooms
    pub fn room_anzahl(&self) -> usize {
        self.inner.rooms.len()
    }

    /// Summe der Mitglieder ueber alle Rooms
    pub fn aktive_mitglieder(&self) -> usize {
        self.zellen()
            .iter()
            .map(|zelle| {
                let room = zelle.lock();
                if room.aufgeloest {
                    0
                } else {
                    room.mitglieder_anzahl()
                }
            })
            .sum()
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn zelle(&self, room_id: &RoomId) -> Option<RoomZelle> {
        self.inner
            .rooms
            .get(room_id)
            .map(|eintrag| Arc::clone(eintrag.value()))
    }

    /// Klont alle Zellen heraus, damit kein Shard-Lock gehalten wird
    fn zellen(&self) -> Vec<RoomZelle> {
        self.inner
            .rooms
            .iter()
            .map(|eintrag| Arc::clone(eintrag.value()))
            .collect()
    }

    /// Wendet `f` auf jeden lebenden Room an, sortiert nach Erstellung
    fn sortierte_snapshots<T>(&self, mut f: impl FnMut(&Room) -> Option<T>) -> Vec<T> {
        let mut treffer: Vec<(u64, T)> = self
            .zellen()
            .iter()
            .filter_map(|zelle| {
                let room = zelle.lock();
                if room.aufgeloest {
                    return None;
                }
                f(&*room).map(|wert| (room.sequenz, wert))
            })
            .collect();
        treffer.sort_by_key(|(sequenz, _)| *sequenz);
        treffer.into_iter().map(|(_, wert)| wert).collect()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
