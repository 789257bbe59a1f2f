//! Room-Katalog – Erstellen, Lesen, Aendern, Loeschen und Auflisten
//!
//! Besitzer-Operationen (`room_aktualisieren`, `room_loeschen`) pruefen die
//! `owner_id` selbst; die Registry kennt keine Berechtigungen.

use chrono::Utc;
use plaza_core::types::{RoomId, UserId};
use plaza_protocol::control::{
    ControlMessage, RoomCreateRequest, RoomDeleted, RoomDetail, RoomListResponse,
    RoomUpdateRequest, ServerEvent,
};
use plaza_rooms::{RoomInfo, RoomRegistry, RoomSpec};
use std::sync::Arc;

use crate::broadcast::RoomTransport;
use crate::error::{SignalingError, SignalingResult};
use crate::identity::IdentityProvider;

/// Standard-Seitengroesse fuer `room-list`
pub const STANDARD_SEITENGROESSE: usize = 20;

/// Standardwerte fuer Felder die `room-create` offen laesst
#[derive(Debug, Clone)]
pub struct KatalogVorgaben {
    pub standard_vorlage: String,
    pub standard_max_users: u32,
}

impl Default for KatalogVorgaben {
    fn default() -> Self {
        Self {
            standard_vorlage: "office".to_string(),
            standard_max_users: 50,
        }
    }
}

/// Katalog-Operationen ueber der `RoomRegistry`
#[derive(Clone)]
pub struct RoomKatalog {
    registry: RoomRegistry,
    identitaet: Arc<dyn IdentityProvider>,
    transport: Arc<dyn RoomTransport>,
    vorgaben: KatalogVorgaben,
}

impl RoomKatalog {
    pub fn neu(
        registry: RoomRegistry,
        identitaet: Arc<dyn IdentityProvider>,
        transport: Arc<dyn RoomTransport>,
    ) -> Self {
        Self {
            registry,
            identitaet,
            transport,
            vorgaben: KatalogVorgaben::default(),
        }
    }

    pub fn mit_vorgaben(mut self, vorgaben: KatalogVorgaben) -> Self {
        self.vorgaben = vorgaben;
        self
    }

    /// Legt einen neuen Room mit dem Aufrufer als Besitzer an
    pub async fn room_erstellen(
        &self,
        owner_id: UserId,
        anfrage: RoomCreateRequest,
    ) -> SignalingResult<RoomInfo> {
        let name = anfrage
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SignalingError::UngueltigeAnfrage("Room-Name fehlt".to_string()))?;

        let besitzer = self
            .identitaet
            .principal_aufloesen(&owner_id)
            .await?
            .ok_or_else(|| SignalingError::NichtGefunden(format!("Benutzer {owner_id}")))?;

        let spec = RoomSpec {
            id: RoomId::new(),
            name,
            description: anfrage.description.unwrap_or_default(),
            owner_id,
            owner_name: besitzer.name,
            map_template: anfrage
                .map_template
                .unwrap_or_else(|| self.vorgaben.standard_vorlage.clone()),
            is_private: anfrage.is_private.unwrap_or(false),
            password: anfrage.password,
            max_users: anfrage
                .max_users
                .unwrap_or(self.vorgaben.standard_max_users),
            is_persistent: anfrage.is_persistent.unwrap_or(true),
            created_at: Utc::now(),
        };

        Ok(self.registry.room_erstellen(spec)?)
    }

    /// Room-Snapshot samt aktueller Mitgliederliste
    pub fn room_detail(&self, room_id: &RoomId) -> SignalingResult<RoomDetail> {
        self.registry
            .room_lesen(room_id, |room| RoomDetail {
                room: room.oeffentliche_daten(),
                members: room.mitglieder(),
            })
            .ok_or_else(|| SignalingError::NichtGefunden(format!("Room {room_id}")))
    }

    /// Partielles Metadaten-Update, nur durch den Besitzer
    pub fn room_aktualisieren(
        &self,
        user_id: UserId,
        anfrage: RoomUpdateRequest,
    ) -> SignalingResult<RoomInfo> {
        let RoomUpdateRequest { room_id, update } = anfrage;

        // Pruefung und Update unter demselben Room-Lock
        let info = self
            .registry
            .room_bearbeiten(&room_id, |room| {
                if room.owner_id() != user_id {
                    return Err(SignalingError::ZugriffVerweigert(
                        "Nur der Besitzer darf den Room aendern".to_string(),
                    ));
                }
                room.metadaten_aktualisieren(update);
                Ok(room.oeffentliche_daten())
            })
            .ok_or_else(|| SignalingError::NichtGefunden(format!("Room {room_id}")))??;

        tracing::info!(room_id = %room_id, user_id = %user_id, "Room aktualisiert");
        Ok(info)
    }

    /// Loescht einen Room, nur durch den Besitzer
    ///
    /// Verbliebene Mitglieder erhalten `room-deleted` und verlieren ihre
    /// Transport-Zuordnung. Der Ausloeser bekommt die Bestaetigung als
    /// Antwort und nicht zusaetzlich als Broadcast.
    pub fn room_loeschen(&self, user_id: UserId, room_id: RoomId) -> SignalingResult<()> {
        let besitzer = self
            .registry
            .room_lesen(&room_id, |room| room.owner_id())
            .ok_or_else(|| SignalingError::NichtGefunden(format!("Room {room_id}")))?;
        if besitzer != user_id {
            return Err(SignalingError::ZugriffVerweigert(
                "Nur der Besitzer darf den Room loeschen".to_string(),
            ));
        }

        // Parallel aufgeloest (letztes Mitglied gegangen) zaehlt als nicht gefunden
        let mut betroffen = self
            .registry
            .room_loeschen(&room_id)
            .ok_or_else(|| SignalingError::NichtGefunden(format!("Room {room_id}")))?;
        for uid in self.transport.room_aufloesen(&room_id) {
            if !betroffen.contains(&uid) {
                betroffen.push(uid);
            }
        }

        let mut benachrichtigt = 0;
        for uid in betroffen.iter().filter(|uid| **uid != user_id) {
            if self.transport.an_user_senden(
                uid,
                ControlMessage::broadcast(ServerEvent::RoomDeleted(RoomDeleted { room_id })),
            ) {
                benachrichtigt += 1;
            }
        }

        tracing::info!(room_id = %room_id, user_id = %user_id, benachrichtigt, "Room geloescht");
        Ok(())
    }

    /// Oeffentliche Rooms seitenweise
    ///
    /// `page` und `limit` werden auf mindestens 1 angehoben.
    pub fn rooms_auflisten(&self, page: Option<i64>, limit: Option<i64>) -> RoomListResponse {
        let page = seitenwert(page, 1);
        let limit = seitenwert(limit, STANDARD_SEITENGROESSE);
        RoomListResponse {
            rooms: self.registry.oeffentliche_rooms(page, limit),
            page,
            limit,
        }
    }

    /// Alle Rooms des Aufrufers
    pub fn meine_rooms(&self, user_id: &UserId) -> Vec<RoomInfo> {
        self.registry.rooms_von_besitzer(user_id)
    }
}

fn seitenwert(wert: Option<i64>, standard: usize) -> usize {
    match wert {
        None => standard,
        Some(w) => usize::try_from(w.max(1)).unwrap_or(standard),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
