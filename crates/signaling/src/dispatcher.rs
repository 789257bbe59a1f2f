//! Message-Dispatcher – Routet Client-Events an Coordinator, Relay und Katalog
//!
//! Der Dispatcher empfaengt Client-Events von einer ClientConnection,
//! bestimmt den zustaendigen Service und gibt die direkte Antwort zurueck.
//!
//! ## Zustandspruefung
//! - `login`, `ping` und `pong` sind immer erlaubt
//! - Alle anderen Events erst nach erfolgreichem Login
//!
//! ## Antworten
//! Events deren Ergebnis ohnehin per Broadcast beim Ausloeser ankommt
//! (`join`, `chat-send`) oder die fire-and-forget sind (`leave`,
//! `position-update`, Signale) liefern `None`. Fehler gehen immer als
//! `error`-Event mit der Request-ID an den Ausloeser.

use chrono::Utc;
use plaza_core::types::{RoomId, UserId};
use plaza_protocol::control::{
    ClientEvent, ControlMessage, ErrorCode, LoggedIn, MyRoomsResponse, RoomDeleted, RoomResponse,
    ServerEvent,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::broadcast::Ausgehend;
use crate::error::{SignalingError, SignalingResult};
use crate::relay::SignalArt;
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug)]
pub struct DispatcherContext {
    /// Peer-Adresse (nur fuer Logs)
    pub peer_addr: SocketAddr,
    /// Angemeldete User-ID (None vor dem Login)
    pub user_id: Option<UserId>,
    /// Kennung der Broadcaster-Registrierung dieser Verbindung
    pub verbindung: Option<u64>,
    /// Frisch registrierte Send-Queue; die Verbindung nimmt sie nach dem Login an sich
    pub empfaenger: Option<mpsc::Receiver<Ausgehend>>,
}

impl DispatcherContext {
    pub fn neu(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            user_id: None,
            verbindung: None,
            empfaenger: None,
        }
    }
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet ein eingehendes Client-Event und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine direkte Antwort gesendet werden soll.
    pub async fn dispatch(
        &self,
        message: ControlMessage<ClientEvent>,
        ctx: &mut DispatcherContext,
    ) -> Option<Ausgehend> {
        let request_id = message.request_id;
        let event_name = message.payload.name();

        match message.payload {
            // -------------------------------------------------------------------
            // Login (nur einmal pro Verbindung)
            // -------------------------------------------------------------------
            ClientEvent::Login(req) => {
                if ctx.user_id.is_some() {
                    return Some(ControlMessage::error(
                        request_id,
                        ErrorCode::InvalidRequest,
                        "Bereits angemeldet",
                    ));
                }

                match self.anmelden(&req.token, ctx).await {
                    Ok(user_id) => Some(ControlMessage::new(
                        request_id,
                        ServerEvent::LoggedIn(LoggedIn { user_id }),
                    )),
                    Err(e) => {
                        tracing::warn!(peer = %ctx.peer_addr, fehler = %e, "Login abgelehnt");
                        Some(e.als_antwort(request_id))
                    }
                }
            }

            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            ClientEvent::Ping(ping) => {
                let server_ts = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
                Some(ControlMessage::pong(request_id, ping.timestamp_ms, server_ts))
            }

            ClientEvent::Pong(_) => {
                tracing::trace!(peer = %ctx.peer_addr, "Pong empfangen");
                None
            }

            // -------------------------------------------------------------------
            // Authentifizierung erfordernde Events
            // -------------------------------------------------------------------
            event => {
                let Some(user_id) = ctx.user_id else {
                    return Some(SignalingError::NichtAuthentifiziert.als_antwort(request_id));
                };

                match self.dispatch_angemeldet(event, request_id, user_id).await {
                    Ok(antwort) => antwort,
                    Err(e) => {
                        tracing::warn!(
                            user_id = %user_id,
                            event = event_name,
                            request_id,
                            fehler = %e,
                            "Anfrage abgelehnt"
                        );
                        Some(e.als_antwort(request_id))
                    }
                }
            }
        }
    }

    /// Routet Events die einen angemeldeten Benutzer erfordern
    async fn dispatch_angemeldet(
        &self,
        event: ClientEvent,
        request_id: u32,
        user_id: UserId,
    ) -> SignalingResult<Option<Ausgehend>> {
        let state = &self.state;

        let antwort = match event {
            // -------------------------------------------------------------------
            // Presence / Chat
            // -------------------------------------------------------------------
            ClientEvent::Join(req) => {
                state.coordinator.beitreten(user_id, request_id, req).await?;
                None
            }

            ClientEvent::Leave(room_id) => {
                state.coordinator.verlassen(user_id, room_id);
                None
            }

            ClientEvent::PositionUpdate(req) => {
                state.coordinator.position_aktualisieren(user_id, req);
                None
            }

            ClientEvent::ChatSend(req) => {
                state.coordinator.chat_senden(user_id, req).await?;
                None
            }

            // -------------------------------------------------------------------
            // Signaling
            // -------------------------------------------------------------------
            ClientEvent::SignalOffer(req) => {
                state.relay.signal_weiterleiten(user_id, SignalArt::Offer, req);
                None
            }

            ClientEvent::SignalAnswer(req) => {
                state.relay.signal_weiterleiten(user_id, SignalArt::Answer, req);
                None
            }

            ClientEvent::SignalIce(req) => {
                state.relay.signal_weiterleiten(user_id, SignalArt::Ice, req);
                None
            }

            ClientEvent::ScreenShareStart(req) => {
                state.relay.screen_share_melden(user_id, req.room_id, true);
                None
            }

            ClientEvent::ScreenShareStop(req) => {
                state.relay.screen_share_melden(user_id, req.room_id, false);
                None
            }

            // -------------------------------------------------------------------
            // Katalog
            // -------------------------------------------------------------------
            ClientEvent::RoomCreate(req) => {
                let room = state.katalog.room_erstellen(user_id, req).await?;
                Some(ServerEvent::Room(RoomResponse { room }))
            }

            ClientEvent::RoomGet(req) => {
                let detail = state.katalog.room_detail(&req.room_id)?;
                Some(ServerEvent::RoomDetail(detail))
            }

            ClientEvent::RoomUpdate(req) => {
                let room = state.katalog.room_aktualisieren(user_id, req)?;
                Some(ServerEvent::Room(RoomResponse { room }))
            }

            ClientEvent::RoomDelete(req) => {
                state.katalog.room_loeschen(user_id, req.room_id)?;
                Some(ServerEvent::RoomDeleted(RoomDeleted {
                    room_id: req.room_id,
                }))
            }

            ClientEvent::RoomList(req) => {
                Some(ServerEvent::RoomList(state.katalog.rooms_auflisten(req.page, req.limit)))
            }

            ClientEvent::MyRooms => Some(ServerEvent::MyRooms(MyRoomsResponse {
                rooms: state.katalog.meine_rooms(&user_id),
            })),

            // Oben bereits behandelt
            ClientEvent::Login(_) | ClientEvent::Ping(_) | ClientEvent::Pong(_) => None,
        };

        Ok(antwort.map(|payload| ControlMessage::new(request_id, payload)))
    }

    /// Prueft das Token und registriert die Verbindung beim Broadcaster
    async fn anmelden(&self, token: &str, ctx: &mut DispatcherContext) -> SignalingResult<UserId> {
        let user_id = self
            .state
            .identitaet
            .token_pruefen(token)
            .await?
            .ok_or(SignalingError::UngueltigeAnmeldung)?;

        let registrierung = self.state.broadcaster.client_registrieren(user_id);
        ctx.user_id = Some(user_id);
        ctx.verbindung = Some(registrierung.verbindung);
        ctx.empfaenger = Some(registrierung.empfaenger);

        tracing::info!(user_id = %user_id, peer = %ctx.peer_addr, "Verbindung authentifiziert");
        Ok(user_id)
    }

    /// Bereinigt alle Ressourcen einer Verbindung beim Trennen
    ///
    /// Die Presence wird nur bereinigt wenn diese Verbindung noch die
    /// aktuelle des Benutzers ist. Wurde sie durch einen neueren Login
    /// ersetzt, gehoeren die Mitgliedschaften der neuen Verbindung; das gilt
    /// auch fuer einen Login, der erst waehrend der Bereinigung eintrifft.
    ///
    /// Gibt die verlassenen Rooms zurueck.
    pub fn client_cleanup(&self, ctx: &DispatcherContext) -> Vec<RoomId> {
        let (Some(user_id), Some(verbindung)) = (ctx.user_id, ctx.verbindung) else {
            return Vec::new();
        };

        if !self.state.broadcaster.client_entfernen(&user_id, verbindung) {
            tracing::debug!(user_id = %user_id, "Verbindung bereits ersetzt – keine Bereinigung");
            return Vec::new();
        }

        let rooms = self.state.coordinator.verbindung_getrennt(&user_id, verbindung);
        tracing::debug!(user_id = %user_id, rooms = rooms.len(), "Client-Ressourcen bereinigt");
        rooms
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
