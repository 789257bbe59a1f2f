//! Control-Protokoll (TCP)
//!
//! Definiert alle Events die ueber die TCP-Verbindung zwischen Client und
//! Server ausgetauscht werden.
//!
//! ## Design
//! - Request/Response Pattern: jede Nachricht hat eine `request_id: u32`
//! - JSON-Serialisierung via serde
//! - Adjacently tagged Enums: `{"event": "<name>", "data": ...}`
//! - `ClientEvent` fliesst Client -> Server, `ServerEvent` Server -> Client

use plaza_core::types::{Position, RoomId, UserId};
use plaza_rooms::{ChatNachricht, Mitglied, RoomInfo, RoomUpdate};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    InvalidRequest,
    NotFound,
    PermissionDenied,
    // Auth
    InvalidCredentials,
    SessionExpired,
}

// ---------------------------------------------------------------------------
// Auth / Keepalive
// ---------------------------------------------------------------------------

/// Login mit einem vom Identity-Dienst ausgestellten Token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub token: String,
}

/// Bestaetigung des Logins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    pub user_id: UserId,
}

/// Ping (Client -> Server oder Server -> Client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub echo_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// Presence / Chat (eingehend)
// ---------------------------------------------------------------------------

/// Room beitreten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: RoomId,
    /// Ueberschreibt den Avatar aus dem Identity-Dienst
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Wird nur an die Zutritts-Policy weitergereicht
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionUpdateRequest {
    pub room_id: RoomId,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendRequest {
    pub room_id: RoomId,
    pub message: String,
    /// Freies Typ-Tag, Standard "text"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// Offer/Answer/ICE vom Client; `payload` wird nicht interpretiert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub room_id: RoomId,
    pub target_user_id: UserId,
    pub payload: serde_json::Value,
}

/// Weitergeleitetes Offer/Answer/ICE an den Ziel-Teilnehmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRelay {
    pub from_user_id: UserId,
    pub target_user_id: UserId,
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Room-Katalog (eingehend)
// ---------------------------------------------------------------------------

/// Anfrage die nur einen Room adressiert (get, delete, screen-share)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRequest {
    pub room_id: RoomId,
}

/// Room erstellen; fehlende Felder bekommen serverseitige Standardwerte
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub map_template: Option<String>,
    pub is_private: Option<bool>,
    pub password: Option<String>,
    pub max_users: Option<u32>,
    pub is_persistent: Option<bool>,
}

/// Partielles Update; die Patch-Felder liegen flach neben `roomId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUpdateRequest {
    pub room_id: RoomId,
    #[serde(flatten)]
    pub update: RoomUpdate,
}

/// Seitenweise Liste oeffentlicher Rooms
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomListRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Antworten und Broadcasts (ausgehend)
// ---------------------------------------------------------------------------

/// Antwort auf einen erfolgreichen Beitritt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joined {
    pub room: RoomInfo,
    pub members: Vec<Mitglied>,
    /// Bisheriger Chat-Verlauf, aelteste Nachricht zuerst
    pub messages: Vec<ChatNachricht>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberJoined {
    pub user_id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberLeft {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberMoved {
    pub user_id: UserId,
    pub position: Position,
}

/// Screen-Share eines Teilnehmers gestartet oder beendet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShare {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomResponse {
    pub room: RoomInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetail {
    pub room: RoomInfo,
    pub members: Vec<Mitglied>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomInfo>,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyRoomsResponse {
    pub rooms: Vec<RoomInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDeleted {
    pub room_id: RoomId,
}

/// Standardisierte Fehler-Antwort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// Alle Events die ein Client senden darf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    // Auth / Keepalive
    Login(LoginRequest),
    Ping(PingMessage),
    Pong(PongMessage),

    // Presence
    Join(JoinRequest),
    Leave(RoomId),
    PositionUpdate(PositionUpdateRequest),
    ChatSend(ChatSendRequest),

    // Signaling
    SignalOffer(SignalRequest),
    SignalAnswer(SignalRequest),
    SignalIce(SignalRequest),
    ScreenShareStart(RoomRequest),
    ScreenShareStop(RoomRequest),

    // Katalog
    RoomCreate(RoomCreateRequest),
    RoomGet(RoomRequest),
    RoomUpdate(RoomUpdateRequest),
    RoomDelete(RoomRequest),
    RoomList(RoomListRequest),
    MyRooms,
}

impl ClientEvent {
    /// Event-Name wie auf dem Draht (fuer Logs)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login(_) => "login",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::PositionUpdate(_) => "position-update",
            Self::ChatSend(_) => "chat-send",
            Self::SignalOffer(_) => "signal-offer",
            Self::SignalAnswer(_) => "signal-answer",
            Self::SignalIce(_) => "signal-ice",
            Self::ScreenShareStart(_) => "screen-share-start",
            Self::ScreenShareStop(_) => "screen-share-stop",
            Self::RoomCreate(_) => "room-create",
            Self::RoomGet(_) => "room-get",
            Self::RoomUpdate(_) => "room-update",
            Self::RoomDelete(_) => "room-delete",
            Self::RoomList(_) => "room-list",
            Self::MyRooms => "my-rooms",
        }
    }
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// Alle Events die der Server sendet (Antworten und Broadcasts)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    // Auth / Keepalive
    LoggedIn(LoggedIn),
    Ping(PingMessage),
    Pong(PongMessage),

    // Presence
    Joined(Joined),
    MemberJoined(MemberJoined),
    MemberLeft(MemberLeft),
    MemberMoved(MemberMoved),
    NewMessage(ChatNachricht),

    // Signaling
    SignalOffer(SignalRelay),
    SignalAnswer(SignalRelay),
    SignalIce(SignalRelay),
    ScreenShareStarted(ScreenShare),
    ScreenShareStopped(ScreenShare),

    // Katalog
    Room(RoomResponse),
    RoomDetail(RoomDetail),
    RoomList(RoomListResponse),
    MyRooms(MyRoomsResponse),
    RoomDeleted(RoomDeleted),

    // Fehler
    Error(ErrorResponse),
}

// ---------------------------------------------------------------------------
// Control-Frame (Umschlag fuer alle Nachrichten)
// ---------------------------------------------------------------------------

/// Control-Protokoll-Nachricht mit Request/Response-Zuordnung
///
/// Jede Nachricht traegt eine `request_id` die der Client vergibt.
/// Der Server kopiert die ID in die Antwort. Broadcasts tragen die ID 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage<P> {
    pub request_id: u32,
    pub payload: P,
}

impl<P> ControlMessage<P> {
    pub fn new(request_id: u32, payload: P) -> Self {
        Self {
            request_id,
            payload,
        }
    }
}

impl ControlMessage<ServerEvent> {
    /// Server-Event ohne zugehoerige Anfrage
    pub fn broadcast(payload: ServerEvent) -> Self {
        Self::new(0, payload)
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(request_id: u32, timestamp_ms: u64) -> Self {
        Self::new(request_id, ServerEvent::Ping(PingMessage { timestamp_ms }))
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ServerEvent::Pong(PongMessage {
                echo_timestamp_ms,
                server_timestamp_ms,
            }),
        )
    }

    /// Erstellt eine Fehler-Antwort
    pub fn error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ServerEvent::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }
}

impl<P: Serialize> ControlMessage<P> {
    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<P: serde::de::DeserializeOwned> ControlMessage<P> {
    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
