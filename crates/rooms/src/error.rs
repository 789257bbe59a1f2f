//! Fehlertypen fuer das Rooms-Crate

use plaza_core::types::RoomId;
use thiserror::Error;

/// Room-Fehlertypen
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    /// Room existiert nicht (oder wurde gerade aufgeloest)
    #[error("Room nicht gefunden: {0}")]
    NichtGefunden(RoomId),

    /// Zutritt oder Besitzer-Operation verweigert
    #[error("Zugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    /// Room-ID bereits vergeben
    #[error("Room-ID bereits vergeben: {0}")]
    DoppelteId(RoomId),
}

pub type RoomResult<T> = Result<T, RoomError>;
