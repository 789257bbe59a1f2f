//! Fehlertypen fuer den Signaling-Service

use plaza_core::PlazaError;
use plaza_protocol::control::{ControlMessage, ErrorCode, ServerEvent};
use plaza_rooms::RoomError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Protokollfehler (ungueltiges Frame, falscher Zustand)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Anfrage vor dem Login
    #[error("Nicht authentifiziert")]
    NichtAuthentifiziert,

    /// Token unbekannt oder abgelaufen
    #[error("Ungueltige Anmeldedaten")]
    UngueltigeAnmeldung,

    /// Pflichtfeld fehlt oder Wert unzulaessig
    #[error("Ungueltige Anfrage: {0}")]
    UngueltigeAnfrage(String),

    /// Room oder Principal nicht gefunden
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Besitzer-Operation durch Fremde oder Zutritt verweigert
    #[error("Berechtigung verweigert: {0}")]
    ZugriffVerweigert(String),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Fehler-Code fuer das Error-Event
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NichtGefunden(_) => ErrorCode::NotFound,
            Self::ZugriffVerweigert(_) => ErrorCode::PermissionDenied,
            Self::UngueltigeAnfrage(_) | Self::Protokoll(_) => ErrorCode::InvalidRequest,
            Self::UngueltigeAnmeldung => ErrorCode::InvalidCredentials,
            Self::NichtAuthentifiziert => ErrorCode::SessionExpired,
            Self::Io(_) | Self::Intern(_) => ErrorCode::InternalError,
        }
    }

    /// Error-Event an den Anfragenden
    ///
    /// Interne Details werden nicht an den Client weitergegeben.
    pub fn als_antwort(&self, request_id: u32) -> ControlMessage<ServerEvent> {
        let text = match self {
            Self::Io(_) | Self::Intern(_) => "Interner Serverfehler".to_string(),
            andere => andere.to_string(),
        };
        ControlMessage::error(request_id, self.error_code(), text)
    }
}

impl From<RoomError> for SignalingError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::NichtGefunden(id) => Self::NichtGefunden(format!("Room {id}")),
            RoomError::ZugriffVerweigert(grund) => Self::ZugriffVerweigert(grund),
            // Wurde in der Registry bereits auf error-Level geloggt
            RoomError::DoppelteId(id) => Self::Intern(format!("Room-ID bereits vergeben: {id}")),
        }
    }
}

impl From<PlazaError> for SignalingError {
    fn from(e: PlazaError) -> Self {
        match e {
            PlazaError::UngueltigeEingabe(grund) => Self::UngueltigeAnfrage(grund),
            andere => Self::Intern(andere.to_string()),
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use plaza_core::types::RoomId;

    #[test]
    fn room_fehler_werden_abgebildet() {
        let id = RoomId::new();
        assert_eq!(
            SignalingError::from(RoomError::NichtGefunden(id)).error_code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            SignalingError::from(RoomError::ZugriffVerweigert("voll".into())).error_code(),
            ErrorCode::PermissionDenied
        );
        assert_eq!(
            SignalingError::from(RoomError::DoppelteId(id)).error_code(),
            ErrorCode::InternalError
        );
    }

    #[test]
    fn interne_details_bleiben_verborgen() {
        let antwort = SignalingError::intern("Mutex vergiftet").als_antwort(9);
        assert_eq!(antwort.request_id, 9);
        match antwort.payload {
            ServerEvent::Error(e) => {
                assert_eq!(e.code, ErrorCode::InternalError);
                assert!(!e.message.contains("Mutex"));
            }
            andere => panic!("Erwartet Error-Event, erhalten {andere:?}"),
        }
    }

    #[test]
    fn identitaet_nicht_erreichbar_ist_intern() {
        let e: SignalingError = PlazaError::IdentitaetNichtErreichbar("timeout".into()).into();
        assert_eq!(e.error_code(), ErrorCode::InternalError);
    }
}
