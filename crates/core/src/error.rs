//! Fehlertypen fuer Plaza
//!
//! Zentraler Fehler-Enum fuer Fehler, die crate-uebergreifend auftreten.
//! Untermodule definieren eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Plaza
pub type Result<T> = std::result::Result<T, PlazaError>;

/// Crate-uebergreifende Fehler im Plaza-System
#[derive(Debug, Error)]
pub enum PlazaError {
    // --- Externe Kollaborateure ---
    #[error("Identity-Dienst nicht erreichbar: {0}")]
    IdentitaetNichtErreichbar(String),

    // --- Eingaben ---
    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PlazaError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}
