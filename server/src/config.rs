//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::Context;
use plaza_core::types::{Position, Principal, UserId};
use plaza_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use plaza_rooms::NACHRICHTEN_LIMIT;
use plaza_signaling::{KatalogVorgaben, SignalingConfig, STANDARD_MAX_NACHRICHT_BYTES};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Keepalive, Timeout und Frame-Groesse
    pub verbindung: VerbindungEinstellungen,
    /// Standardwerte fuer Rooms und Presence
    pub rooms: RoomEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
    /// Principals fuer den In-Memory-Identity-Dienst
    pub benutzer: Vec<BenutzerEintrag>,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitig angemeldeter Clients
    pub max_clients: u32,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Plaza".into(),
            max_clients: 512,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer TCP und Observability
    pub bind_adresse: String,
    /// Port fuer das Session-Protokoll
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 9870,
        }
    }
}

/// Verbindungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungEinstellungen {
    /// Ping-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Trennung nach so vielen Sekunden ohne eingehendes Frame
    pub timeout_sek: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
}

impl Default for VerbindungEinstellungen {
    fn default() -> Self {
        Self {
            keepalive_sek: 30,
            timeout_sek: 90,
            max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Room-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomEinstellungen {
    /// Startposition neuer Mitglieder
    pub start_x: f64,
    pub start_y: f64,
    /// Karten-Vorlage wenn `room-create` keine angibt
    pub standard_vorlage: String,
    /// Kapazitaet wenn `room-create` keine angibt
    pub standard_max_users: u32,
    /// Passwort und `max_users` beim Beitritt pruefen
    pub zutritt_pruefen: bool,
    /// Obergrenze fuer den JSON-kodierten Text einer Chat-Nachricht
    pub max_nachricht_bytes: usize,
}

impl Default for RoomEinstellungen {
    fn default() -> Self {
        Self {
            start_x: 100.0,
            start_y: 100.0,
            standard_vorlage: "office".into(),
            standard_max_users: 50,
            zutritt_pruefen: false,
            max_nachricht_bytes: STANDARD_MAX_NACHRICHT_BYTES,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error" oder EnvFilter-Direktive
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9871,
        }
    }
}

/// Ein vorab bekannter Principal samt Login-Token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenutzerEintrag {
    pub id: UserId,
    pub token: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl BenutzerEintrag {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        Ok(config)
    }

    /// Parst und validiert eine Konfiguration
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte die serde nicht ausschliessen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.verbindung.max_frame_bytes == 0 {
            anyhow::bail!("verbindung.max_frame_bytes muss groesser als 0 sein");
        }
        if self.verbindung.timeout_sek <= self.verbindung.keepalive_sek {
            anyhow::bail!("verbindung.timeout_sek muss groesser als keepalive_sek sein");
        }
        if self.rooms.max_nachricht_bytes == 0 {
            anyhow::bail!("rooms.max_nachricht_bytes muss groesser als 0 sein");
        }
        // Der volle Verlauf geht mit `joined` in einem Frame raus; die andere
        // Haelfte bleibt fuer Mitglieder, Room-Daten und Nachrichten-Metadaten.
        let verlauf = self.rooms.max_nachricht_bytes.saturating_mul(NACHRICHTEN_LIMIT);
        if verlauf > self.verbindung.max_frame_bytes / 2 {
            anyhow::bail!(
                "rooms.max_nachricht_bytes zu gross: {} Nachrichten zu je {} Bytes \
                 passen nicht in die Haelfte von verbindung.max_frame_bytes ({})",
                NACHRICHTEN_LIMIT,
                self.rooms.max_nachricht_bytes,
                self.verbindung.max_frame_bytes
            );
        }
        if self.rooms.standard_vorlage.trim().is_empty() {
            anyhow::bail!("rooms.standard_vorlage darf nicht leer sein");
        }
        let mut tokens = std::collections::HashSet::new();
        for eintrag in &self.benutzer {
            if !tokens.insert(eintrag.token.as_str()) {
                anyhow::bail!("Token von Benutzer '{}' ist doppelt vergeben", eintrag.name);
            }
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(&self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        bind_adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Uebersetzt die Datei-Konfiguration in die Signaling-Konfiguration
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.verbindung.keepalive_sek,
            verbindungs_timeout_sek: self.verbindung.timeout_sek,
            max_frame_bytes: self.verbindung.max_frame_bytes,
            start_position: Position::neu(self.rooms.start_x, self.rooms.start_y),
            max_nachricht_bytes: self.rooms.max_nachricht_bytes,
            vorgaben: KatalogVorgaben {
                standard_vorlage: self.rooms.standard_vorlage.clone(),
                standard_max_users: self.rooms.standard_max_users,
            },
        }
    }
}

fn bind_adresse(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Ungueltige Bind-Adresse '{host}:{port}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_clients, 512);
        assert_eq!(cfg.netzwerk.tcp_port, 9870);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.benutzer.is_empty());
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse().unwrap().to_string(), "0.0.0.0:9870");
        assert_eq!(
            cfg.observability_bind_adresse().unwrap().to_string(),
            "0.0.0.0:9871"
        );
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "kein host".into();
        assert!(cfg.tcp_bind_adresse().is_err());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Mein Plaza"
            max_clients = 100

            [netzwerk]
            tcp_port = 10000

            [rooms]
            start_x = 20.5

            [[benutzer]]
            id = "0190b7d4-5c1e-7a3b-9f2e-1d2c3b4a5f60"
            token = "geheim-ada"
            name = "Ada"
            email = "ada@example.org"
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.server.name, "Mein Plaza");
        assert_eq!(cfg.server.max_clients, 100);
        assert_eq!(cfg.netzwerk.tcp_port, 10000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.rooms.start_y, 100.0);

        assert_eq!(cfg.benutzer.len(), 1);
        let ada = cfg.benutzer[0].principal();
        assert_eq!(ada.name, "Ada");
        assert_eq!(ada.avatar, None);
        assert_eq!(
            ada.id.inner().to_string(),
            "0190b7d4-5c1e-7a3b-9f2e-1d2c3b4a5f60"
        );
    }

    #[test]
    fn signaling_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.rooms.start_x = 1.0;
        cfg.rooms.standard_max_users = 8;
        cfg.verbindung.keepalive_sek = 10;

        let sig = cfg.signaling_config();
        assert_eq!(sig.start_position, Position::neu(1.0, 100.0));
        assert_eq!(sig.vorgaben.standard_max_users, 8);
        assert_eq!(sig.keepalive_sek, 10);
        assert_eq!(sig.verbindungs_timeout_sek, 90);
    }

    #[test]
    fn timeout_muss_keepalive_uebersteigen() {
        let toml = r#"
            [verbindung]
            keepalive_sek = 60
            timeout_sek = 30
        "#;
        assert!(ServerConfig::aus_toml(toml).is_err());
    }

    #[test]
    fn chat_obergrenze_muss_in_den_frame_passen() {
        let mut cfg = ServerConfig::default();
        assert_eq!(cfg.rooms.max_nachricht_bytes, 4096);
        assert_eq!(cfg.signaling_config().max_nachricht_bytes, 4096);

        cfg.rooms.max_nachricht_bytes = cfg.verbindung.max_frame_bytes;
        assert!(cfg.validieren().is_err());

        cfg.rooms.max_nachricht_bytes = 0;
        assert!(cfg.validieren().is_err());

        let toml = r#"
            [verbindung]
            max_frame_bytes = 4194304

            [rooms]
            max_nachricht_bytes = 16384
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.signaling_config().max_nachricht_bytes, 16384);
    }

    #[test]
    fn doppelte_tokens_werden_abgelehnt() {
        let toml = r#"
            [[benutzer]]
            id = "0190b7d4-5c1e-7a3b-9f2e-1d2c3b4a5f60"
            token = "t"
            name = "Ada"

            [[benutzer]]
            id = "0190b7d4-5c1e-7a3b-9f2e-1d2c3b4a5f61"
            token = "t"
            name = "Bob"
        "#;
        assert!(ServerConfig::aus_toml(toml).is_err());
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let cfg = ServerConfig::laden("/nicht/vorhanden/plaza.toml").unwrap();
        assert_eq!(cfg.server.name, "Plaza");
    }
}
