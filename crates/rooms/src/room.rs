//! Room – Mitgliedschaft, Positionen und Chat-Verlauf einer Session
//!
//! Ein `Room` besitzt keine externen Ressourcen. Er wird ausschliesslich
//! ueber die `RoomRegistry` unter dem Room-eigenen Mutex veraendert.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use plaza_core::types::{MessageId, Position, RoomId, UserId};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Maximale Anzahl gespeicherter Chat-Nachrichten pro Room
pub const NACHRICHTEN_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Mitglied
// ---------------------------------------------------------------------------

/// Presence-Eintrag eines Principals innerhalb genau eines Rooms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mitglied {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub position: Position,
    pub joined_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ChatNachricht
// ---------------------------------------------------------------------------

/// Eine Chat-Nachricht (unveraenderlich nach dem Anhaengen)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNachricht {
    pub id: MessageId,
    pub user_id: UserId,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub message: String,
    /// Freies Typ-Tag, Standard "text"
    #[serde(rename = "type")]
    pub typ: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RoomSpec / RoomUpdate / RoomInfo
// ---------------------------------------------------------------------------

/// Vollstaendig aufgeloeste Daten fuer die Room-Erstellung
///
/// ID, Besitzer und Standardwerte sind bereits vom Aufrufer gesetzt.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub owner_id: UserId,
    pub owner_name: String,
    pub map_template: String,
    pub is_private: bool,
    pub password: Option<String>,
    pub max_users: u32,
    pub is_persistent: bool,
    pub created_at: DateTime<Utc>,
}

/// Partielles Update der Room-Metadaten
///
/// Fehlende Felder bleiben unveraendert. Beim Passwort unterscheidet
/// `Some(None)` (explizit `null`, Passwort entfernen) von `None` (fehlt).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(
        default,
        deserialize_with = "feld_mit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_users: Option<u32>,
}

/// Ein vorhandenes Feld (auch `null`) wird zu `Some(..)`
fn feld_mit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Oeffentliche Sicht auf einen Room (ohne Passwort, Mitglieder und Chat)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub description: String,
    pub owner_id: UserId,
    pub owner_name: String,
    pub map_template: String,
    pub is_private: bool,
    pub max_users: u32,
    pub is_persistent: bool,
    /// Mitgliederzahl zum Zeitpunkt des Snapshots
    pub current_users: usize,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Eine Kollaborations-Session mit Mitgliedern und begrenztem Chat-Verlauf
#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    name: String,
    description: String,
    owner_id: UserId,
    owner_name: String,
    map_template: String,
    is_private: bool,
    password: Option<String>,
    max_users: u32,
    is_persistent: bool,
    created_at: DateTime<Utc>,
    mitglieder: IndexMap<UserId, Mitglied>,
    nachrichten: VecDeque<ChatNachricht>,
    /// Erstellungsreihenfolge in der Registry (stabile Listen)
    pub(crate) sequenz: u64,
    /// Gesetzt sobald die Registry den Room entfernt hat
    pub(crate) aufgeloest: bool,
}

impl Room {
    /// Erstellt einen leeren Room aus einer aufgeloesten Spezifikation
    pub fn neu(spec: RoomSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            description: spec.description,
            owner_id: spec.owner_id,
            owner_name: spec.owner_name,
            map_template: spec.map_template,
            is_private: spec.is_private,
            password: spec.password,
            max_users: spec.max_users,
            is_persistent: spec.is_persistent,
            created_at: spec.created_at,
            mitglieder: IndexMap::new(),
            nachrichten: VecDeque::with_capacity(NACHRICHTEN_LIMIT),
            sequenz: 0,
            aufgeloest: false,
        }
    }

    // -----------------------------------------------------------------------
    // Mitgliedschaft
    // -----------------------------------------------------------------------

    /// Fuegt ein Mitglied hinzu oder ersetzt den bisherigen Eintrag
    pub fn mitglied_hinzufuegen(&mut self, mitglied: Mitglied) {
        self.mitglieder.insert(mitglied.id, mitglied);
    }

    /// Entfernt ein Mitglied, gibt den Eintrag zurueck falls vorhanden
    pub fn mitglied_entfernen(&mut self, user_id: &UserId) -> Option<Mitglied> {
        // shift_remove haelt die Einfuege-Reihenfolge der uebrigen Mitglieder
        self.mitglieder.shift_remove(user_id)
    }

    pub fn hat_mitglied(&self, user_id: &UserId) -> bool {
        self.mitglieder.contains_key(user_id)
    }

    pub fn mitglied(&self, user_id: &UserId) -> Option<&Mitglied> {
        self.mitglieder.get(user_id)
    }

    /// Snapshot aller Mitglieder in Beitritts-Reihenfolge
    pub fn mitglieder(&self) -> Vec<Mitglied> {
        self.mitglieder.values().cloned().collect()
    }

    /// IDs aller Mitglieder in Beitritts-Reihenfolge
    pub fn mitglieder_ids(&self) -> Vec<UserId> {
        self.mitglieder.keys().copied().collect()
    }

    pub fn mitglieder_anzahl(&self) -> usize {
        self.mitglieder.len()
    }

    pub fn ist_leer(&self) -> bool {
        self.mitglieder.is_empty()
    }

    /// Setzt die Position eines Mitglieds
    ///
    /// Gibt `false` zurueck wenn der Benutzer kein Mitglied ist; das Update
    /// wird dann verworfen.
    pub fn position_aktualisieren(&mut self, user_id: &UserId, position: Position) -> bool {
        match self.mitglieder.get_mut(user_id) {
            Some(mitglied) => {
                mitglied.position = position;
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Haengt eine Nachricht an und verwirft die aeltesten ueber dem Limit
    pub fn nachricht_anhaengen(&mut self, nachricht: ChatNachricht) {
        self.nachrichten.push_back(nachricht);
        while self.nachrichten.len() > NACHRICHTEN_LIMIT {
            self.nachrichten.pop_front();
        }
    }

    /// Chat-Verlauf, aelteste Nachricht zuerst
    pub fn nachrichten(&self) -> Vec<ChatNachricht> {
        self.nachrichten.iter().cloned().collect()
    }

    pub fn nachrichten_anzahl(&self) -> usize {
        self.nachrichten.len()
    }

    // -----------------------------------------------------------------------
    // Metadaten
    // -----------------------------------------------------------------------

    /// Uebernimmt nur die im Update gesetzten Felder
    pub fn metadaten_aktualisieren(&mut self, update: RoomUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(is_private) = update.is_private {
            self.is_private = is_private;
        }
        if let Some(password) = update.password {
            self.password = password;
        }
        if let Some(max_users) = update.max_users {
            self.max_users = max_users;
        }
    }

    /// Oeffentlicher Snapshot inklusive aktueller Mitgliederzahl
    pub fn oeffentliche_daten(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            owner_id: self.owner_id,
            owner_name: self.owner_name.clone(),
            map_template: self.map_template.clone(),
            is_private: self.is_private,
            max_users: self.max_users,
            is_persistent: self.is_persistent,
            current_users: self.mitglieder.len(),
            created_at: self.created_at,
        }
    }

    // -----------------------------------------------------------------------
    // Zugriffsmethoden
    // -----------------------------------------------------------------------

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn map_template(&self) -> &str {
        &self.map_template
    }

    pub fn is_private(&self) -> bool {
        self.is_private
    }

    pub fn is_persistent(&self) -> bool {
        self.is_persistent
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn max_users(&self) -> u32 {
        self.max_users
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
