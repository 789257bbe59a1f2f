//! Zutritts-Policy – Erweiterungspunkt fuer Passwort- und Kapazitaetspruefung
//!
//! Die Registry fragt die Policy unter dem Room-Lock, bevor ein Mitglied
//! eingetragen wird. Die Standard-Policy laesst jeden Principal zu.

use crate::error::{RoomError, RoomResult};
use crate::room::{Mitglied, Room};

/// Entscheidet ob ein Principal einem Room beitreten darf
pub trait ZutrittsPolicy: Send + Sync {
    /// Gibt `Err(RoomError::ZugriffVerweigert)` zurueck um den Beitritt abzulehnen
    fn zutritt_pruefen(
        &self,
        room: &Room,
        mitglied: &Mitglied,
        passwort: Option<&str>,
    ) -> RoomResult<()>;
}

/// Laesst jeden authentifizierten Principal zu
#[derive(Debug, Clone, Copy, Default)]
pub struct OffenerZutritt;

impl ZutrittsPolicy for OffenerZutritt {
    fn zutritt_pruefen(
        &self,
        _room: &Room,
        _mitglied: &Mitglied,
        _passwort: Option<&str>,
    ) -> RoomResult<()> {
        Ok(())
    }
}

/// Prueft Room-Passwort und `max_users`
///
/// Nicht standardmaessig aktiv; wird ueber `RoomRegistry::mit_policy` gesetzt.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswortUndKapazitaet;

impl ZutrittsPolicy for PasswortUndKapazitaet {
    fn zutritt_pruefen(
        &self,
        room: &Room,
        mitglied: &Mitglied,
        passwort: Option<&str>,
    ) -> RoomResult<()> {
        if let Some(erwartet) = room.password() {
            if passwort != Some(erwartet) {
                return Err(RoomError::ZugriffVerweigert(
                    "Room-Passwort fehlt oder falsch".to_string(),
                ));
            }
        }

        // Wiederbeitritt ersetzt nur den Eintrag und belegt keinen neuen Platz
        let neuer_platz = !room.hat_mitglied(&mitglied.id);
        if neuer_platz && room.mitglieder_anzahl() >= room.max_users() as usize {
            return Err(RoomError::ZugriffVerweigert("Room ist voll".to_string()));
        }
        Ok(())
    }
}
