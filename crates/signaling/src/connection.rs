//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Den Login-Zustand haelt der `DispatcherContext`, die
//! Mitgliedschaften haelt die Registry.
//!
//! ## State Machine
//! ```text
//! Verbunden --login--> MitgliedVon({}) --join/leave--> MitgliedVon({..})
//!     |                       |
//!     +------ Disconnect -----+--> Getrennt
//! ```
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Ohne eingehendes Frame innerhalb von `verbindungs_timeout_sek` wird
//!   die Verbindung getrennt
//!
//! ## Ausgehende Events
//! Nach dem Login liest die Verbindung zusaetzlich ihre Send-Queue aus dem
//! `EventBroadcaster`. Endet diese Queue, hat ein neuerer Login desselben
//! Benutzers die Verbindung ersetzt.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use plaza_core::types::RoomId;
use plaza_protocol::{
    control::{ClientEvent, ControlMessage, ErrorCode},
    wire::FrameCodec,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::Framed;

use crate::broadcast::Ausgehend;
use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Grund fuer das Verbindungsende
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ende {
    ClientGetrennt,
    Timeout,
    Fehler,
    Ersetzt,
    Shutdown,
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Frames via `FrameCodec`, dispatcht an `MessageDispatcher` und
/// sendet Antworten sowie Broadcasts zurueck. Laeuft in einem eigenen
/// tokio-Task.
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht. Vor der Rueckkehr ist die Presence des Benutzers bereinigt;
    /// zurueckgegeben werden die dabei verlassenen Rooms.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<RoomId> {
        let peer_addr = self.peer_addr;
        let config = Arc::clone(&self.state.config);
        let keepalive_intervall = Duration::from_secs(config.keepalive_sek.max(1));
        let timeout_dauer = Duration::from_secs(config.verbindungs_timeout_sek);

        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(
            stream,
            FrameCodec::<ClientEvent>::with_max_size(config.max_frame_bytes),
        );

        let mut ctx = DispatcherContext::neu(peer_addr);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        // Broadcaster-Queue, sobald angemeldet
        let mut empfaenger: Option<mpsc::Receiver<Ausgehend>> = None;

        let mut frist = Instant::now() + timeout_dauer;
        let mut keepalive = tokio::time::interval_at(
            Instant::now() + keepalive_intervall,
            keepalive_intervall,
        );
        let mut ping_request_id: u32 = 0;

        let ende = loop {
            tokio::select! {
                // Eingehendes Frame vom Client
                frame = framed.next() => {
                    let nachricht = match frame {
                        Some(Ok(Ok(nachricht))) => nachricht,
                        Some(Ok(Err(ungueltig))) => {
                            frist = Instant::now() + timeout_dauer;
                            tracing::debug!(
                                peer = %peer_addr,
                                request_id = ungueltig.request_id,
                                grund = %ungueltig.grund,
                                "Ungueltige Nachricht"
                            );
                            let antwort = ControlMessage::error(
                                ungueltig.request_id,
                                ErrorCode::InvalidRequest,
                                format!("Ungueltige Nachricht: {}", ungueltig.grund),
                            );
                            if let Err(e) = framed.send(antwort).await {
                                tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                break Ende::Fehler;
                            }
                            continue;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break Ende::Fehler;
                        }
                        None => break Ende::ClientGetrennt,
                    };

                    frist = Instant::now() + timeout_dauer;
                    tracing::trace!(
                        peer = %peer_addr,
                        request_id = nachricht.request_id,
                        event = nachricht.payload.name(),
                        "Nachricht empfangen"
                    );

                    let antwort = dispatcher.dispatch(nachricht, &mut ctx).await;

                    // Nach erfolgreichem Login die Broadcaster-Queue uebernehmen
                    if let Some(rx) = ctx.empfaenger.take() {
                        empfaenger = Some(rx);
                    }

                    if let Some(antwort) = antwort {
                        if let Err(e) = framed.send(antwort).await {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                            break Ende::Fehler;
                        }
                    }
                }

                // Ausgehendes Event aus dem Broadcaster
                ausgehend = naechstes_event(&mut empfaenger) => {
                    match ausgehend {
                        Some(event) => {
                            if let Err(e) = framed.send(event).await {
                                tracing::warn!(peer = %peer_addr, fehler = %e, "Broadcast-Senden fehlgeschlagen");
                                break Ende::Fehler;
                            }
                        }
                        None => {
                            let abschied = ControlMessage::error(
                                0,
                                ErrorCode::SessionExpired,
                                "Sitzung ersetzt",
                            );
                            let _ = framed.send(abschied).await;
                            break Ende::Ersetzt;
                        }
                    }
                }

                // Keepalive-Ping
                _ = keepalive.tick() => {
                    ping_request_id = ping_request_id.wrapping_add(1);
                    let ts = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
                    if let Err(e) = framed.send(ControlMessage::ping(ping_request_id, ts)).await {
                        tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break Ende::Fehler;
                    }
                }

                // Inaktivitaets-Timeout
                _ = tokio::time::sleep_until(frist) => {
                    tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                    break Ende::Timeout;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        let abschied = ControlMessage::error(
                            0,
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break Ende::Shutdown;
                    }
                }
            }
        };

        // Cleanup beim Verbindungsende
        let verlassen = dispatcher.client_cleanup(&ctx);

        tracing::info!(
            peer = %peer_addr,
            ende = ?ende,
            rooms = verlassen.len(),
            "Verbindungs-Task beendet"
        );
        verlassen
    }
}

/// Wartet auf das naechste Event der Send-Queue
///
/// Ohne Queue (vor dem Login) wird nie aufgeloest.
async fn naechstes_event(empfaenger: &mut Option<mpsc::Receiver<Ausgehend>>) -> Option<Ausgehend> {
    match empfaenger {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
