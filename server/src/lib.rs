//! plaza-server – Bibliotheks-Root
//!
//! Verdrahtet Identity, Room-Registry, Signaling und Observability zu einem
//! lauffaehigen Prozess und stellt den Einstiegspunkt fuer Tests bereit.

pub mod config;

use anyhow::Result;
use config::{BenutzerEintrag, RoomEinstellungen, ServerConfig};
use plaza_observability::{LaufzeitDaten, LaufzeitQuelle};
use plaza_rooms::{PasswortUndKapazitaet, RoomRegistry};
use plaza_signaling::{SignalingServer, SignalingState, SpeicherIdentitaet};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Baut den gemeinsamen Signaling-Zustand aus der Konfiguration
    pub fn zustand_aufbauen(&self) -> Arc<SignalingState> {
        let identitaet = identitaet_aufbauen(&self.config.benutzer);
        SignalingState::neu(
            self.config.signaling_config(),
            registry_aufbauen(&self.config.rooms),
            Arc::new(identitaet),
        )
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Zustand aufbauen (Identity, Registry, Services)
    /// 2. TCP-Listener binden (Session-Protokoll)
    /// 3. Observability-Server starten
    /// 4. Auf Ctrl-C warten, dann Shutdown an alle Tasks
    pub async fn starten(self) -> Result<()> {
        let state = self.zustand_aufbauen();
        let tcp_adresse = self.config.tcp_bind_adresse()?;

        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %tcp_adresse,
            benutzer = self.config.benutzer.len(),
            zutritt_pruefen = self.config.rooms.zutritt_pruefen,
            "Server startet"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener = TcpListener::bind(tcp_adresse).await?;
        let signaling = SignalingServer::mit_listener(Arc::clone(&state), listener)?;
        let signaling_task = tokio::spawn(signaling.starten(shutdown_rx.clone()));

        let observability_task = if self.config.observability.aktiviert {
            let adresse = self.config.observability_bind_adresse()?;
            let quelle: Arc<dyn LaufzeitQuelle> = Arc::new(ServerLaufzeit::neu(Arc::clone(&state)));
            Some(tokio::spawn(plaza_observability::observability_server_starten(
                adresse,
                quelle,
                shutdown_rx,
            )))
        } else {
            tracing::info!("Observability deaktiviert");
            None
        };

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        let _ = shutdown_tx.send(true);

        match signaling_task.await {
            Ok(Err(e)) => tracing::error!(fehler = %e, "Signaling-Server mit Fehler beendet"),
            Err(e) => tracing::error!(fehler = %e, "Signaling-Task abgebrochen"),
            Ok(Ok(())) => {}
        }
        if let Some(task) = observability_task {
            match task.await {
                Ok(Err(e)) => tracing::error!(fehler = %e, "Observability-Server mit Fehler beendet"),
                Err(e) => tracing::error!(fehler = %e, "Observability-Task abgebrochen"),
                Ok(Ok(())) => {}
            }
        }

        tracing::info!(
            rooms = state.registry.room_anzahl(),
            uptime_sek = state.uptime_sek(),
            "Server beendet"
        );
        Ok(())
    }
}

/// Legt fuer jeden `[[benutzer]]`-Eintrag einen Principal samt Token an
pub fn identitaet_aufbauen(benutzer: &[BenutzerEintrag]) -> SpeicherIdentitaet {
    let identitaet = SpeicherIdentitaet::neu();
    for eintrag in benutzer {
        identitaet.principal_registrieren(eintrag.principal(), eintrag.token.clone());
    }
    identitaet
}

/// Registry mit der konfigurierten Zutritts-Policy
pub fn registry_aufbauen(einstellungen: &RoomEinstellungen) -> RoomRegistry {
    if einstellungen.zutritt_pruefen {
        RoomRegistry::mit_policy(PasswortUndKapazitaet)
    } else {
        RoomRegistry::neu()
    }
}

// ---------------------------------------------------------------------------
// Laufzeit-Snapshot fuer Metriken und Health
// ---------------------------------------------------------------------------

/// Liest die Kennzahlen direkt aus dem Signaling-Zustand
pub struct ServerLaufzeit {
    state: Arc<SignalingState>,
}

impl ServerLaufzeit {
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }
}

impl LaufzeitQuelle for ServerLaufzeit {
    fn laufzeit_daten(&self) -> LaufzeitDaten {
        LaufzeitDaten {
            verbundene_clients: self.state.broadcaster.client_anzahl(),
            rooms: self.state.registry.room_anzahl(),
            aktive_mitglieder: self.state.registry.aktive_mitglieder(),
            chat_nachrichten: self.state.statistik.chat_nachrichten(),
            signale: self.state.statistik.signale(),
        }
    }
}
