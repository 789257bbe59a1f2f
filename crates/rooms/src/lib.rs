//! plaza-rooms – Room-Entity und Room-Registry
//!
//! Dieses Crate haelt den gesamten ephemeren Room-Zustand im Speicher:
//! - `Room`: Mitglieder, Positionen, begrenzter Chat-Verlauf (100 Nachrichten)
//! - `RoomRegistry`: RoomId -> Room, Lebenszyklus, Mitgliedschafts-Abfragen
//! - `ZutrittsPolicy`: Erweiterungspunkt fuer Passwort-/Kapazitaetspruefung
//!
//! Es gibt keine Persistenz; der Zustand lebt so lange wie der Prozess.

pub mod error;
pub mod policy;
pub mod registry;
pub mod room;

// Bequeme Re-Exporte
pub use error::{RoomError, RoomResult};
pub use policy::{OffenerZutritt, PasswortUndKapazitaet, ZutrittsPolicy};
pub use registry::{Austritt, RoomRegistry};
pub use room::{ChatNachricht, Mitglied, Room, RoomInfo, RoomSpec, RoomUpdate, NACHRICHTEN_LIMIT};
