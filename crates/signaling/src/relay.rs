//! Signaling-Relay – Offer/Answer/ICE und Screen-Share-Meldungen
//!
//! Das Relay interpretiert keine Payloads. Es adressiert nur: Signale gehen
//! an genau einen Ziel-Teilnehmer im selben Room, Screen-Share-Meldungen an
//! alle anderen Teilnehmer des Rooms.

use plaza_core::types::{RoomId, UserId};
use plaza_protocol::control::{ControlMessage, ScreenShare, ServerEvent, SignalRelay, SignalRequest};
use std::sync::Arc;

use crate::broadcast::RoomTransport;
use crate::server_state::SignalingStatistik;

/// Art eines weitergeleiteten WebRTC-Signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalArt {
    Offer,
    Answer,
    Ice,
}

impl SignalArt {
    fn event(self, relay: SignalRelay) -> ServerEvent {
        match self {
            Self::Offer => ServerEvent::SignalOffer(relay),
            Self::Answer => ServerEvent::SignalAnswer(relay),
            Self::Ice => ServerEvent::SignalIce(relay),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Ice => "ice",
        }
    }
}

/// Leitet Signale zwischen Room-Teilnehmern weiter
#[derive(Clone)]
pub struct SignalingRelay {
    transport: Arc<dyn RoomTransport>,
    statistik: SignalingStatistik,
}

impl SignalingRelay {
    pub fn neu(transport: Arc<dyn RoomTransport>) -> Self {
        Self {
            transport,
            statistik: SignalingStatistik::neu(),
        }
    }

    pub fn mit_statistik(mut self, statistik: SignalingStatistik) -> Self {
        self.statistik = statistik;
        self
    }

    /// Leitet ein Signal an `target_user_id` weiter
    ///
    /// Ist das Ziel nicht im Room verbunden, wird das Signal still
    /// verworfen. Gibt zurueck ob zugestellt wurde.
    pub fn signal_weiterleiten(&self, von: UserId, art: SignalArt, anfrage: SignalRequest) -> bool {
        let SignalRequest {
            room_id,
            target_user_id,
            payload,
        } = anfrage;

        let relay = SignalRelay {
            from_user_id: von,
            target_user_id,
            payload,
        };
        let zugestellt = self.transport.an_room_mitglied_senden(
            &room_id,
            &target_user_id,
            ControlMessage::broadcast(art.event(relay)),
        );

        if zugestellt {
            self.statistik.signal_zaehlen();
        }
        tracing::trace!(
            room_id = %room_id,
            von = %von,
            ziel = %target_user_id,
            art = art.name(),
            zugestellt,
            "Signal weitergeleitet"
        );
        zugestellt
    }

    /// Meldet Start oder Ende eines Screen-Shares an alle anderen Teilnehmer
    pub fn screen_share_melden(&self, von: UserId, room_id: RoomId, aktiv: bool) -> usize {
        let meldung = ScreenShare { user_id: von };
        let event = if aktiv {
            ServerEvent::ScreenShareStarted(meldung)
        } else {
            ServerEvent::ScreenShareStopped(meldung)
        };

        let empfaenger =
            self.transport
                .an_room_senden(&room_id, Some(&von), ControlMessage::broadcast(event));
        tracing::debug!(room_id = %room_id, user_id = %von, aktiv, empfaenger, "Screen-Share gemeldet");
        empfaenger
    }
}
