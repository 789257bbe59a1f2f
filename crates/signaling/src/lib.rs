//! plaza-signaling – Presence, Chat und WebRTC-Signaling ueber TCP
//!
//! Dieser Crate implementiert den Session-Service fuer Plaza. Er verwaltet
//! TCP-Verbindungen, Login ueber den Identity-Dienst, Room-Presence,
//! Chat-Verteilung und die Weiterleitung von Offer/Answer/ICE.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  State Machine: Verbunden -> MitgliedVon({..}) -> Getrennt
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- PresenceCoordinator (Join, Leave, Position, Chat, Disconnect)
//!     +-- SignalingRelay      (Offer, Answer, ICE, Screen-Share)
//!     +-- RoomKatalog         (Create, Get, Update, Delete, List)
//!
//! RoomRegistry     – Room-Zustand, ein Lock pro Room (plaza-rooms)
//! EventBroadcaster – Send-Queues und Room-Zuordnung der Clients
//! IdentityProvider – Token-Pruefung und Principal-Aufloesung
//! ```

pub mod broadcast;
pub mod catalog;
pub mod connection;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod relay;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::{EventBroadcaster, RoomTransport};
pub use catalog::{KatalogVorgaben, RoomKatalog};
pub use connection::ClientConnection;
pub use coordinator::{PresenceCoordinator, STANDARD_MAX_NACHRICHT_BYTES};
pub use dispatcher::MessageDispatcher;
pub use error::{SignalingError, SignalingResult};
pub use identity::{IdentityProvider, SpeicherIdentitaet};
pub use relay::{SignalArt, SignalingRelay};
pub use server_state::{SignalingConfig, SignalingState, SignalingStatistik};
pub use tcp::SignalingServer;
