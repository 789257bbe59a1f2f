//! Presence-Coordinator – Join, Leave, Position, Chat und Disconnect
//!
//! Uebersetzt eingehende Client-Events in Registry-Mutationen und verteilt
//! die zugehoerigen Server-Events ueber den `RoomTransport`.
//!
//! ## Reihenfolge
//! Identitaets-Lookups laufen vor dem Room-Lock. Mutation und Broadcast
//! laufen gemeinsam in der `nachher`-Closure der Registry, also unter dem
//! Room-Lock. Pro Room sehen alle Clients die Events daher in
//! Mutations-Reihenfolge.
//!
//! ## Fan-out
//! | Operation | Empfaenger |
//! |---|---|
//! | Join | `joined` an den Ausloeser, `member-joined` an alle anderen |
//! | Leave | `member-left` an alle anderen, nur wenn der User Mitglied war |
//! | Position | `member-moved` an alle anderen |
//! | Chat | `new-message` an alle inklusive Ausloeser |

use chrono::Utc;
use plaza_core::types::{MessageId, Position, Principal, RoomId, UserId};
use plaza_protocol::control::{
    ChatSendRequest, ControlMessage, JoinRequest, Joined, MemberJoined, MemberLeft, MemberMoved,
    PositionUpdateRequest, ServerEvent,
};
use plaza_rooms::{ChatNachricht, Mitglied, Room, RoomRegistry};
use std::sync::Arc;

use crate::broadcast::RoomTransport;
use crate::error::{SignalingError, SignalingResult};
use crate::identity::IdentityProvider;
use crate::server_state::SignalingStatistik;

/// Standard-Typ einer Chat-Nachricht
const STANDARD_NACHRICHTEN_TYP: &str = "text";

/// Obergrenze fuer den JSON-kodierten Nachrichtentext
pub const STANDARD_MAX_NACHRICHT_BYTES: usize = 4096;

/// Obergrenze fuer das JSON-kodierte Typ-Tag
const MAX_TYP_BYTES: usize = 32;

/// Koordiniert Presence und Chat ueber der `RoomRegistry`
///
/// Clone teilt Registry, Identity-Dienst und Transport.
#[derive(Clone)]
pub struct PresenceCoordinator {
    registry: RoomRegistry,
    identitaet: Arc<dyn IdentityProvider>,
    transport: Arc<dyn RoomTransport>,
    statistik: SignalingStatistik,
    start_position: Position,
    max_nachricht_bytes: usize,
}

impl PresenceCoordinator {
    pub fn neu(
        registry: RoomRegistry,
        identitaet: Arc<dyn IdentityProvider>,
        transport: Arc<dyn RoomTransport>,
    ) -> Self {
        Self {
            registry,
            identitaet,
            transport,
            statistik: SignalingStatistik::neu(),
            start_position: Position::neu(100.0, 100.0),
            max_nachricht_bytes: STANDARD_MAX_NACHRICHT_BYTES,
        }
    }

    /// Setzt die Position neuer Mitglieder
    pub fn mit_start_position(mut self, position: Position) -> Self {
        self.start_position = position;
        self
    }

    pub fn mit_statistik(mut self, statistik: SignalingStatistik) -> Self {
        self.statistik = statistik;
        self
    }

    /// Setzt die Obergrenze fuer Chat-Nachrichten
    ///
    /// Der gesamte Verlauf eines Rooms wird mit `joined` in einem Frame
    /// verschickt und muss unter `max_frame_bytes` bleiben.
    pub fn mit_max_nachricht_bytes(mut self, max: usize) -> Self {
        self.max_nachricht_bytes = max;
        self
    }

    // -----------------------------------------------------------------------
    // Join
    // -----------------------------------------------------------------------

    /// Tritt einem Room bei
    ///
    /// Die `joined`-Antwort geht ueber die Send-Queue des Ausloesers, damit
    /// sie vor allen spaeteren Events dieses Rooms ankommt.
    pub async fn beitreten(
        &self,
        user_id: UserId,
        request_id: u32,
        anfrage: JoinRequest,
    ) -> SignalingResult<()> {
        let principal = self.principal(&user_id).await?;
        let JoinRequest {
            room_id,
            avatar,
            password,
        } = anfrage;

        let mitglied = Mitglied {
            id: user_id,
            name: principal.name,
            email: principal.email,
            avatar: avatar.or(principal.avatar),
            position: self.start_position,
            joined_at: Utc::now(),
        };
        let beigetreten = MemberJoined {
            user_id,
            name: mitglied.name.clone(),
            avatar: mitglied.avatar.clone(),
            position: mitglied.position,
        };

        let transport = &self.transport;
        self.registry
            .room_beitreten(&room_id, mitglied, password.as_deref(), |room| {
                transport.room_beitreten(room_id, user_id);

                let joined = Joined {
                    room: room.oeffentliche_daten(),
                    members: room.mitglieder(),
                    messages: room.nachrichten(),
                };
                transport.an_user_senden(
                    &user_id,
                    ControlMessage::new(request_id, ServerEvent::Joined(joined)),
                );
                transport.an_room_senden(
                    &room_id,
                    Some(&user_id),
                    ControlMessage::broadcast(ServerEvent::MemberJoined(beigetreten)),
                );
            })
            .map_err(|e| {
                tracing::warn!(room_id = %room_id, user_id = %user_id, fehler = %e, "Beitritt abgelehnt");
                SignalingError::from(e)
            })?;

        tracing::info!(room_id = %room_id, user_id = %user_id, "Room beigetreten");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Leave
    // -----------------------------------------------------------------------

    /// Verlaesst einen Room
    ///
    /// Idempotent: fuer Nicht-Mitglieder oder unbekannte Rooms passiert
    /// nichts. Gibt zurueck ob der User Mitglied war.
    pub fn verlassen(&self, user_id: UserId, room_id: RoomId) -> bool {
        match self.austreten(user_id, room_id, |_| true) {
            Some(war_mitglied) => war_mitglied,
            None => {
                // Room existiert nicht (mehr); Transport-Zuordnung trotzdem loesen
                self.transport.room_verlassen(&room_id, &user_id);
                false
            }
        }
    }

    /// Gemeinsamer Austritt; `None` wenn der Room fehlt oder `bedingung` ablehnt
    fn austreten(
        &self,
        user_id: UserId,
        room_id: RoomId,
        bedingung: impl FnOnce(&Room) -> bool,
    ) -> Option<bool> {
        let transport = &self.transport;
        let austritt = self.registry.room_verlassen_wenn(
            &room_id,
            &user_id,
            bedingung,
            |_room, austritt| {
                transport.room_verlassen(&room_id, &user_id);
                if austritt.war_mitglied {
                    transport.an_room_senden(
                        &room_id,
                        Some(&user_id),
                        ControlMessage::broadcast(ServerEvent::MemberLeft(MemberLeft { user_id })),
                    );
                }
                if austritt.room_aufgeloest {
                    transport.room_aufloesen(&room_id);
                }
                austritt
            },
        )?;

        if austritt.war_mitglied {
            tracing::info!(
                room_id = %room_id,
                user_id = %user_id,
                aufgeloest = austritt.room_aufgeloest,
                "Room verlassen"
            );
        }
        Some(austritt.war_mitglied)
    }

    // -----------------------------------------------------------------------
    // Position
    // -----------------------------------------------------------------------

    /// Aktualisiert die Position eines Mitglieds
    ///
    /// Best effort: unbekannte Rooms und Nicht-Mitglieder werden still
    /// verworfen. Gibt zurueck ob das Update angewendet wurde.
    pub fn position_aktualisieren(&self, user_id: UserId, anfrage: PositionUpdateRequest) -> bool {
        let PositionUpdateRequest { room_id, position } = anfrage;
        let transport = &self.transport;

        let angewendet = self
            .registry
            .room_bearbeiten(&room_id, |room| {
                if !room.position_aktualisieren(&user_id, position) {
                    return false;
                }
                transport.an_room_senden(
                    &room_id,
                    Some(&user_id),
                    ControlMessage::broadcast(ServerEvent::MemberMoved(MemberMoved {
                        user_id,
                        position,
                    })),
                );
                true
            })
            .unwrap_or(false);

        if !angewendet {
            tracing::trace!(room_id = %room_id, user_id = %user_id, "Positions-Update verworfen");
        }
        angewendet
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Haengt eine Chat-Nachricht an und verteilt sie an alle Mitglieder
    ///
    /// Der Ausloeser erhaelt die Nachricht ebenfalls als `new-message`.
    pub async fn chat_senden(
        &self,
        user_id: UserId,
        anfrage: ChatSendRequest,
    ) -> SignalingResult<ChatNachricht> {
        let ChatSendRequest {
            room_id,
            message,
            typ,
        } = anfrage;

        let laenge = kodierte_laenge(&message);
        if laenge > self.max_nachricht_bytes {
            tracing::warn!(room_id = %room_id, user_id = %user_id, laenge, "Chat-Nachricht zu lang");
            return Err(SignalingError::UngueltigeAnfrage(format!(
                "Nachricht zu lang: {laenge} Bytes (Maximum: {})",
                self.max_nachricht_bytes
            )));
        }
        if typ.as_deref().is_some_and(|t| kodierte_laenge(t) > MAX_TYP_BYTES) {
            return Err(SignalingError::UngueltigeAnfrage(format!(
                "Nachrichtentyp zu lang (Maximum: {MAX_TYP_BYTES} Bytes)"
            )));
        }

        let principal = self.principal(&user_id).await?;

        let nachricht = ChatNachricht {
            id: MessageId::new(),
            user_id,
            user_name: principal.name,
            user_avatar: principal.avatar,
            message,
            typ: typ.unwrap_or_else(|| STANDARD_NACHRICHTEN_TYP.to_string()),
            timestamp: Utc::now(),
        };

        let transport = &self.transport;
        self.registry
            .room_bearbeiten(&room_id, |room| {
                room.nachricht_anhaengen(nachricht.clone());
                transport.an_room_senden(
                    &room_id,
                    None,
                    ControlMessage::broadcast(ServerEvent::NewMessage(nachricht.clone())),
                );
            })
            .ok_or_else(|| SignalingError::NichtGefunden(format!("Room {room_id}")))?;

        self.statistik.chat_nachricht_zaehlen();
        tracing::debug!(room_id = %room_id, user_id = %user_id, message_id = %nachricht.id, "Chat-Nachricht verteilt");
        Ok(nachricht)
    }

    // -----------------------------------------------------------------------
    // Disconnect
    // -----------------------------------------------------------------------

    /// Entfernt einen getrennten Client aus allen Rooms
    ///
    /// Gibt die Rooms zurueck, in denen der User Mitglied war.
    pub fn client_getrennt(&self, user_id: &UserId) -> Vec<RoomId> {
        let rooms: Vec<RoomId> = self
            .registry
            .rooms_mit_mitglied(user_id)
            .into_iter()
            .filter(|room_id| self.verlassen(*user_id, *room_id))
            .collect();

        tracing::info!(user_id = %user_id, rooms = rooms.len(), "Presence nach Disconnect bereinigt");
        rooms
    }

    /// Wie `client_getrennt`, aber nur fuer die Verbindung `verbindung`
    ///
    /// Pro Room wird unter dem Room-Lock geprueft, ob inzwischen eine neuere
    /// Verbindung desselben Users registriert ist. Deren Mitgliedschaften
    /// bleiben unberuehrt.
    pub fn verbindung_getrennt(&self, user_id: &UserId, verbindung: u64) -> Vec<RoomId> {
        let transport = &self.transport;
        let rooms: Vec<RoomId> = self
            .registry
            .rooms_mit_mitglied(user_id)
            .into_iter()
            .filter(|room_id| {
                self.austreten(*user_id, *room_id, |_| {
                    !transport.verbindung_abgeloest(user_id, verbindung)
                }) == Some(true)
            })
            .collect();

        tracing::info!(
            user_id = %user_id,
            verbindung,
            rooms = rooms.len(),
            "Presence nach Disconnect bereinigt"
        );
        rooms
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    async fn principal(&self, user_id: &UserId) -> SignalingResult<Principal> {
        self.identitaet
            .principal_aufloesen(user_id)
            .await?
            .ok_or_else(|| SignalingError::NichtGefunden(format!("Benutzer {user_id}")))
    }
}

/// Laenge eines Strings als JSON-String-Inhalt, ohne Anfuehrungszeichen
fn kodierte_laenge(text: &str) -> usize {
    serde_json::to_string(text)
        .map(|kodiert| kodiert.len().saturating_sub(2))
        .unwrap_or(usize::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::EventBroadcaster;
    use crate::identity::SpeicherIdentitaet;
    use plaza_rooms::RoomSpec;

    struct Aufbau {
        coordinator: PresenceCoordinator,
        registry: RoomRegistry,
        identitaet: SpeicherIdentitaet,
    }

    fn aufbau() -> Aufbau {
        let registry = RoomRegistry::neu();
        let identitaet = SpeicherIdentitaet::neu();
        let coordinator = PresenceCoordinator::neu(
            registry.clone(),
            Arc::new(identitaet.clone()),
            Arc::new(EventBroadcaster::neu()),
        );
        Aufbau {
            coordinator,
            registry,
            identitaet,
        }
    }

    fn principal(identitaet: &SpeicherIdentitaet, name: &str) -> UserId {
        let id = UserId::new();
        identitaet.principal_registrieren(
            Principal {
                id,
                name: name.to_string(),
                email: format!("{name}@example.org"),
                avatar: Some(format!("{name}.png")),
            },
            format!("token-{name}"),
        );
        id
    }

    fn room(registry: &RoomRegistry, persistent: bool) -> RoomId {
        registry
            .room_erstellen(RoomSpec {
                id: RoomId::new(),
                name: "Lounge".to_string(),
                description: String::new(),
                owner_id: UserId::new(),
                owner_name: "owner".to_string(),
                map_template: "office".to_string(),
                is_private: false,
                password: None,
                max_users: 50,
                is_persistent: persistent,
                created_at: Utc::now(),
            })
            .unwrap()
            .id
    }

    fn join(room_id: RoomId) -> JoinRequest {
        JoinRequest {
            room_id,
            avatar: None,
            password: None,
        }
    }

    #[tokio::test]
    async fn beitritt_setzt_startposition_und_avatar() {
        let a = aufbau();
        let uid = principal(&a.identitaet, "ada");
        let room_id = room(&a.registry, true);

        a.coordinator
            .clone()
            .mit_start_position(Position::neu(5.0, 7.0))
            .beitreten(uid, 1, join(room_id))
            .await
            .unwrap();

        let mitglied = a
            .registry
            .room_lesen(&room_id, |room| room.mitglied(&uid).cloned())
            .flatten()
            .unwrap();
        assert_eq!(mitglied.position, Position::neu(5.0, 7.0));
        assert_eq!(mitglied.avatar.as_deref(), Some("ada.png"));
    }

    #[tokio::test]
    async fn avatar_aus_anfrage_hat_vorrang() {
        let a = aufbau();
        let uid = principal(&a.identitaet, "ada");
        let room_id = room(&a.registry, true);

        let mut anfrage = join(room_id);
        anfrage.avatar = Some("fuchs.png".to_string());
        a.coordinator.beitreten(uid, 1, anfrage).await.unwrap();

        let avatar = a
            .registry
            .room_lesen(&room_id, |room| room.mitglied(&uid).and_then(|m| m.avatar.clone()))
            .flatten();
        assert_eq!(avatar.as_deref(), Some("fuchs.png"));
    }

    #[tokio::test]
    async fn beitritt_unbekannter_room_ist_not_found() {
        let a = aufbau();
        let uid = principal(&a.identitaet, "ada");

        let fehler = a.coordinator.beitreten(uid, 1, join(RoomId::new())).await;
        assert!(matches!(fehler, Err(SignalingError::NichtGefunden(_))));
    }

    #[tokio::test]
    async fn unbekannter_principal_ist_not_found() {
        let a = aufbau();
        let room_id = room(&a.registry, true);

        let fehler = a.coordinator.beitreten(UserId::new(), 1, join(room_id)).await;
        assert!(matches!(fehler, Err(SignalingError::NichtGefunden(_))));
        assert_eq!(a.registry.room_info(&room_id).map(|r| r.current_users), Some(0));
    }

    #[tokio::test]
    async fn verlassen_ist_idempotent() {
        let a = aufbau();
        let uid = principal(&a.identitaet, "ada");
        let room_id = room(&a.registry, true);
        a.coordinator.beitreten(uid, 1, join(room_id)).await.unwrap();

        assert!(a.coordinator.verlassen(uid, room_id));
        assert!(!a.coordinator.verlassen(uid, room_id));
        assert!(!a.coordinator.verlassen(uid, RoomId::new()));
    }

    #[tokio::test]
    async fn position_von_nicht_mitglied_wird_verworfen() {
        let a = aufbau();
        let room_id = room(&a.registry, true);

        let angewendet = a.coordinator.position_aktualisieren(
            UserId::new(),
            PositionUpdateRequest {
                room_id,
                position: Position::neu(1.0, 1.0),
            },
        );
        assert!(!angewendet);
        assert!(!a.coordinator.position_aktualisieren(
            UserId::new(),
            PositionUpdateRequest {
                room_id: RoomId::new(),
                position: Position::neu(1.0, 1.0),
            },
        ));
    }

    #[tokio::test]
    async fn chat_setzt_standard_typ() {
        let a = aufbau();
        let uid = principal(&a.identitaet, "ada");
        let room_id = room(&a.registry, true);

        let nachricht = a
            .coordinator
            .chat_senden(
                uid,
                ChatSendRequest {
                    room_id,
                    message: "hallo".to_string(),
                    typ: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(nachricht.typ, "text");
        assert_eq!(nachricht.user_name, "ada");
        assert_eq!(
            a.registry.room_lesen(&room_id, |room| room.nachrichten_anzahl()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn chat_in_unbekanntem_room_ist_not_found() {
        let a = aufbau();
        let uid = principal(&a.identitaet, "ada");

        let fehler = a
            .coordinator
            .chat_senden(
                uid,
                ChatSendRequest {
                    room_id: RoomId::new(),
                    message: "hallo".to_string(),
                    typ: None,
                },
            )
            .await;
        assert!(matches!(fehler, Err(SignalingError::NichtGefunden(_))));
    }

    #[tokio::test]
    async fn zu_lange_nachricht_wird_abgelehnt() {
        let a = aufbau();
        let uid = principal(&a.identitaet, "ada");
        let room_id = room(&a.registry, true);
        let coordinator = a.coordinator.clone().mit_max_nachricht_bytes(8);

        let anfrage = |message: &str, typ: Option<&str>| ChatSendRequest {
            room_id,
            message: message.to_string(),
            typ: typ.map(str::to_string),
        };

        assert!(coordinator.chat_senden(uid, anfrage("12345678", None)).await.is_ok());

        let zu_lang = coordinator.chat_senden(uid, anfrage("123456789", None)).await;
        assert!(matches!(zu_lang, Err(SignalingError::UngueltigeAnfrage(_))));

        // Maskierte Zeichen zaehlen mit ihrer kodierten Laenge
        let maskiert = coordinator.chat_senden(uid, anfrage("\"\"\"\"\"", None)).await;
        assert!(matches!(maskiert, Err(SignalingError::UngueltigeAnfrage(_))));

        let langer_typ = coordinator
            .chat_senden(uid, anfrage("ok", Some(&"t".repeat(MAX_TYP_BYTES + 1))))
            .await;
        assert!(matches!(langer_typ, Err(SignalingError::UngueltigeAnfrage(_))));

        assert_eq!(
            a.registry.room_lesen(&room_id, |room| room.nachrichten_anzahl()),
            Some(1)
        );
    }

    #[test]
    fn kodierte_laenge_ohne_anfuehrungszeichen() {
        assert_eq!(kodierte_laenge(""), 0);
        assert_eq!(kodierte_laenge("hallo"), 5);
        assert_eq!(kodierte_laenge("a\"b"), 4);
        assert_eq!(kodierte_laenge("\n"), 2);
    }

    #[tokio::test]
    async fn abgeloeste_verbindung_raeumt_nicht_auf() {
        let registry = RoomRegistry::neu();
        let identitaet = SpeicherIdentitaet::neu();
        let broadcaster = EventBroadcaster::neu();
        let coordinator = PresenceCoordinator::neu(
            registry.clone(),
            Arc::new(identitaet.clone()),
            Arc::new(broadcaster.clone()),
        );
        let uid = principal(&identitaet, "ada");
        let room_id = room(&registry, false);

        // Alte Verbindung ist bereits abgemeldet, die neue tritt erneut bei
        let alt = broadcaster.client_registrieren(uid);
        coordinator.beitreten(uid, 1, join(room_id)).await.unwrap();
        assert!(broadcaster.client_entfernen(&uid, alt.verbindung));
        let _neu = broadcaster.client_registrieren(uid);
        coordinator.beitreten(uid, 2, join(room_id)).await.unwrap();

        assert!(coordinator.verbindung_getrennt(&uid, alt.verbindung).is_empty());
        assert_eq!(registry.rooms_mit_mitglied(&uid), vec![room_id]);
        assert_eq!(broadcaster.user_ids_in_room(&room_id), vec![uid]);
    }

    #[tokio::test]
    async fn aktuelle_verbindung_raeumt_auf() {
        let registry = RoomRegistry::neu();
        let identitaet = SpeicherIdentitaet::neu();
        let broadcaster = EventBroadcaster::neu();
        let coordinator = PresenceCoordinator::neu(
            registry.clone(),
            Arc::new(identitaet.clone()),
            Arc::new(broadcaster.clone()),
        );
        let uid = principal(&identitaet, "ada");
        let room_id = room(&registry, true);

        let reg = broadcaster.client_registrieren(uid);
        coordinator.beitreten(uid, 1, join(room_id)).await.unwrap();
        assert!(broadcaster.client_entfernen(&uid, reg.verbindung));

        assert_eq!(coordinator.verbindung_getrennt(&uid, reg.verbindung), vec![room_id]);
        assert!(registry.rooms_mit_mitglied(&uid).is_empty());
    }

    #[tokio::test]
    async fn disconnect_entfernt_aus_allen_rooms() {
        let a = aufbau();
        let uid = principal(&a.identitaet, "ada");
        let r1 = room(&a.registry, true);
        let r2 = room(&a.registry, false);
        a.coordinator.beitreten(uid, 1, join(r1)).await.unwrap();
        a.coordinator.beitreten(uid, 2, join(r2)).await.unwrap();

        let verlassen = a.coordinator.client_getrennt(&uid);
        assert_eq!(verlassen, vec![r1, r2]);
        assert!(a.registry.rooms_mit_mitglied(&uid).is_empty());
        // Nicht persistenter Room ist danach aufgeloest
        assert!(a.registry.room_info(&r2).is_none());
    }
}
