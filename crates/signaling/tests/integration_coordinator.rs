//! Integrationstests fuer Presence-Coordinator und Signaling-Relay
//!
//! Verwendet die In-Memory-Identitaet und die echten Send-Queues des
//! `EventBroadcaster`, um Fan-out und Reihenfolge zu pruefen.

use chrono::Utc;
use plaza_core::types::{Position, Principal, RoomId, UserId};
use plaza_protocol::control::{
    ChatSendRequest, JoinRequest, PositionUpdateRequest, ServerEvent, SignalRequest,
};
use plaza_protocol::wire::{write_frame, DEFAULT_MAX_FRAME_SIZE};
use plaza_rooms::{RoomRegistry, RoomSpec, NACHRICHTEN_LIMIT};
use plaza_signaling::broadcast::Ausgehend;
use plaza_signaling::{
    EventBroadcaster, PresenceCoordinator, SignalArt, SignalingError, SignalingRelay,
    SpeicherIdentitaet, STANDARD_MAX_NACHRICHT_BYTES,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Umgebung {
    registry: RoomRegistry,
    identitaet: SpeicherIdentitaet,
    broadcaster: EventBroadcaster,
    coordinator: PresenceCoordinator,
    relay: SignalingRelay,
}

impl Umgebung {
    fn neu() -> Self {
        let registry = RoomRegistry::neu();
        let identitaet = SpeicherIdentitaet::neu();
        let broadcaster = EventBroadcaster::neu();
        let coordinator = PresenceCoordinator::neu(
            registry.clone(),
            Arc::new(identitaet.clone()),
            Arc::new(broadcaster.clone()),
        );
        let relay = SignalingRelay::neu(Arc::new(broadcaster.clone()));
        Self {
            registry,
            identitaet,
            broadcaster,
            coordinator,
            relay,
        }
    }

    /// Legt einen Principal an und registriert eine Send-Queue
    fn client(&self, name: &str) -> (UserId, mpsc::Receiver<Ausgehend>) {
        let id = UserId::new();
        self.identitaet.principal_registrieren(
            Principal {
                id,
                name: name.to_string(),
                email: format!("{name}@example.org"),
                avatar: None,
            },
            format!("token-{name}"),
        );
        (id, self.broadcaster.client_registrieren(id).empfaenger)
    }

    fn room(&self, persistent: bool) -> RoomId {
        self.registry
            .room_erstellen(RoomSpec {
                id: RoomId::new(),
                name: "Plaza".to_string(),
                description: String::new(),
                owner_id: UserId::new(),
                owner_name: "owner".to_string(),
                map_template: "office".to_string(),
                is_private: false,
                password: None,
                max_users: 50,
                is_persistent: persistent,
                created_at: Utc::now(),
            })
            .unwrap()
            .id
    }

    async fn beitreten(&self, uid: UserId, room_id: RoomId) {
        self.coordinator
            .beitreten(
                uid,
                1,
                JoinRequest {
                    room_id,
                    avatar: None,
                    password: None,
                },
            )
            .await
            .unwrap();
    }
}

/// Alle aktuell wartenden Events einer Queue
fn leeren(rx: &mut mpsc::Receiver<Ausgehend>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(nachricht) = rx.try_recv() {
        events.push(nachricht.payload);
    }
    events
}

#[tokio::test]
async fn beitritt_meldet_joined_und_member_joined() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, mut rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");

    u.beitreten(ada, room).await;
    let events = leeren(&mut rx_ada);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ServerEvent::Joined(j) => {
            assert_eq!(j.room.id, room);
            assert_eq!(j.members.len(), 1);
            assert!(j.messages.is_empty());
        }
        andere => panic!("Erwartet joined, erhalten {andere:?}"),
    }

    u.beitreten(bob, room).await;
    match leeren(&mut rx_ada).as_slice() {
        [ServerEvent::MemberJoined(m)] => {
            assert_eq!(m.user_id, bob);
            assert_eq!(m.name, "bob");
            assert_eq!(m.position, Position::neu(100.0, 100.0));
        }
        andere => panic!("Erwartet genau ein member-joined, erhalten {andere:?}"),
    }
    // Bob bekommt nur sein joined, kein member-joined ueber sich selbst
    match leeren(&mut rx_bob).as_slice() {
        [ServerEvent::Joined(j)] => {
            let ids: Vec<UserId> = j.members.iter().map(|m| m.id).collect();
            assert_eq!(ids, vec![ada, bob]);
        }
        andere => panic!("Erwartet genau ein joined, erhalten {andere:?}"),
    }
}

#[tokio::test]
async fn joined_enthaelt_chat_verlauf() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, mut rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");

    u.beitreten(ada, room).await;
    for i in 0..3 {
        u.coordinator
            .chat_senden(
                ada,
                ChatSendRequest {
                    room_id: room,
                    message: format!("m{i}"),
                    typ: None,
                },
            )
            .await
            .unwrap();
    }
    leeren(&mut rx_ada);

    u.beitreten(bob, room).await;
    match leeren(&mut rx_bob).as_slice() {
        [ServerEvent::Joined(j)] => {
            let texte: Vec<&str> = j.messages.iter().map(|m| m.message.as_str()).collect();
            assert_eq!(texte, vec!["m0", "m1", "m2"]);
        }
        andere => panic!("Erwartet joined, erhalten {andere:?}"),
    }
}

#[tokio::test]
async fn chat_erreicht_alle_inklusive_absender() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, mut rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");
    let (_carl, mut rx_carl) = u.client("carl");
    u.beitreten(ada, room).await;
    u.beitreten(bob, room).await;
    leeren(&mut rx_ada);
    leeren(&mut rx_bob);

    let nachricht = u
        .coordinator
        .chat_senden(
            bob,
            ChatSendRequest {
                room_id: room,
                message: "hallo".to_string(),
                typ: Some("emote".to_string()),
            },
        )
        .await
        .unwrap();

    for rx in [&mut rx_ada, &mut rx_bob] {
        match leeren(rx).as_slice() {
            [ServerEvent::NewMessage(n)] => {
                assert_eq!(n, &nachricht);
                assert_eq!(n.typ, "emote");
            }
            andere => panic!("Erwartet new-message, erhalten {andere:?}"),
        }
    }
    assert!(leeren(&mut rx_carl).is_empty());
}

#[tokio::test]
async fn voller_verlauf_passt_in_joined_frame() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, mut rx_ada) = u.client("ada");
    u.beitreten(ada, room).await;

    let chat = |message: String| ChatSendRequest {
        room_id: room,
        message,
        typ: None,
    };

    // Knapp unter der Frame-Grenze: wird abgelehnt, niemand bekommt etwas
    let riesig = u
        .coordinator
        .chat_senden(ada, chat("x".repeat(DEFAULT_MAX_FRAME_SIZE - 200)))
        .await;
    assert!(matches!(riesig, Err(SignalingError::UngueltigeAnfrage(_))));
    leeren(&mut rx_ada);
    assert!(rx_ada.try_recv().is_err());

    for _ in 0..NACHRICHTEN_LIMIT {
        u.coordinator
            .chat_senden(ada, chat("x".repeat(STANDARD_MAX_NACHRICHT_BYTES)))
            .await
            .unwrap();
        leeren(&mut rx_ada);
    }

    let (bob, mut rx_bob) = u.client("bob");
    u.beitreten(bob, room).await;
    let joined = rx_bob.try_recv().unwrap();
    match &joined.payload {
        ServerEvent::Joined(j) => assert_eq!(j.messages.len(), NACHRICHTEN_LIMIT),
        andere => panic!("Erwartet joined, erhalten {andere:?}"),
    }

    let mut frame = Vec::new();
    write_frame(&mut frame, &joined, DEFAULT_MAX_FRAME_SIZE)
        .await
        .unwrap();
    assert!(frame.len() <= DEFAULT_MAX_FRAME_SIZE);
}

#[tokio::test]
async fn position_geht_nur_an_andere() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, mut rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");
    u.beitreten(ada, room).await;
    u.beitreten(bob, room).await;
    leeren(&mut rx_ada);
    leeren(&mut rx_bob);

    assert!(u.coordinator.position_aktualisieren(
        ada,
        PositionUpdateRequest {
            room_id: room,
            position: Position::neu(12.5, 40.0),
        },
    ));

    assert!(leeren(&mut rx_ada).is_empty());
    match leeren(&mut rx_bob).as_slice() {
        [ServerEvent::MemberMoved(m)] => {
            assert_eq!(m.user_id, ada);
            assert_eq!(m.position, Position::neu(12.5, 40.0));
        }
        andere => panic!("Erwartet member-moved, erhalten {andere:?}"),
    }
}

#[tokio::test]
async fn position_von_nicht_mitglied_erzeugt_nichts() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, mut rx_ada) = u.client("ada");
    let (fremd, _rx_fremd) = u.client("fremd");
    u.beitreten(ada, room).await;
    leeren(&mut rx_ada);

    assert!(!u.coordinator.position_aktualisieren(
        fremd,
        PositionUpdateRequest {
            room_id: room,
            position: Position::neu(1.0, 2.0),
        },
    ));
    assert!(leeren(&mut rx_ada).is_empty());
    assert!(u
        .registry
        .room_lesen(&room, |r| !r.hat_mitglied(&fremd))
        .unwrap());
}

#[tokio::test]
async fn disconnect_meldet_genau_ein_member_left_pro_room() {
    let u = Umgebung::neu();
    let raum_a = u.room(true);
    let raum_b = u.room(true);
    let (ada, _rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");
    let (carl, mut rx_carl) = u.client("carl");

    u.beitreten(bob, raum_a).await;
    u.beitreten(carl, raum_b).await;
    u.beitreten(ada, raum_a).await;
    u.beitreten(ada, raum_b).await;
    leeren(&mut rx_bob);
    leeren(&mut rx_carl);

    let verlassen = u.coordinator.client_getrennt(&ada);
    assert_eq!(verlassen.len(), 2);

    for (room, rx) in [(raum_a, &mut rx_bob), (raum_b, &mut rx_carl)] {
        assert!(u.registry.room_lesen(&room, |r| !r.hat_mitglied(&ada)).unwrap());
        match leeren(rx).as_slice() {
            [ServerEvent::MemberLeft(m)] => assert_eq!(m.user_id, ada),
            andere => panic!("Erwartet genau ein member-left, erhalten {andere:?}"),
        }
    }
    assert!(u.registry.rooms_mit_mitglied(&ada).is_empty());
}

#[tokio::test]
async fn doppeltes_verlassen_meldet_nur_einmal() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, _rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");
    u.beitreten(ada, room).await;
    u.beitreten(bob, room).await;
    leeren(&mut rx_bob);

    u.coordinator.verlassen(ada, room);
    u.coordinator.verlassen(ada, room);

    assert_eq!(leeren(&mut rx_bob).len(), 1);
    assert_eq!(
        u.registry.room_lesen(&room, |r| r.mitglieder_ids()),
        Some(vec![bob])
    );
}

#[tokio::test]
async fn letzter_austritt_loest_transport_room_auf() {
    let u = Umgebung::neu();
    let room = u.room(false);
    let (ada, _rx_ada) = u.client("ada");
    u.beitreten(ada, room).await;
    assert_eq!(u.broadcaster.user_ids_in_room(&room), vec![ada]);

    u.coordinator.verlassen(ada, room);
    assert!(u.registry.room_info(&room).is_none());
    assert!(u.broadcaster.user_ids_in_room(&room).is_empty());
}

#[tokio::test]
async fn signal_geht_nur_an_das_ziel() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, mut rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");
    let (carl, mut rx_carl) = u.client("carl");
    for uid in [ada, bob, carl] {
        u.beitreten(uid, room).await;
    }
    for rx in [&mut rx_ada, &mut rx_bob, &mut rx_carl] {
        leeren(rx);
    }

    let zugestellt = u.relay.signal_weiterleiten(
        ada,
        SignalArt::Answer,
        SignalRequest {
            room_id: room,
            target_user_id: carl,
            payload: json!({"sdp": "answer"}),
        },
    );
    assert!(zugestellt);
    assert!(leeren(&mut rx_ada).is_empty());
    assert!(leeren(&mut rx_bob).is_empty());
    match leeren(&mut rx_carl).as_slice() {
        [ServerEvent::SignalAnswer(s)] => {
            assert_eq!(s.from_user_id, ada);
            assert_eq!(s.payload, json!({"sdp": "answer"}));
        }
        andere => panic!("Erwartet signal-answer, erhalten {andere:?}"),
    }
}

#[tokio::test]
async fn signal_an_ausgetretenes_ziel_ist_nicht_zustellbar() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, _rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");
    u.beitreten(ada, room).await;
    u.beitreten(bob, room).await;
    u.coordinator.verlassen(bob, room);
    leeren(&mut rx_bob);

    let zugestellt = u.relay.signal_weiterleiten(
        ada,
        SignalArt::Ice,
        SignalRequest {
            room_id: room,
            target_user_id: bob,
            payload: json!({"candidate": "udp 1"}),
        },
    );
    assert!(!zugestellt);
    assert!(leeren(&mut rx_bob).is_empty());
}

#[tokio::test]
async fn screen_share_geht_an_alle_anderen() {
    let u = Umgebung::neu();
    let room = u.room(true);
    let (ada, mut rx_ada) = u.client("ada");
    let (bob, mut rx_bob) = u.client("bob");
    let (carl, mut rx_carl) = u.client("carl");
    for uid in [ada, bob, carl] {
        u.beitreten(uid, room).await;
    }
    for rx in [&mut rx_ada, &mut rx_bob, &mut rx_carl] {
        leeren(rx);
    }

    assert_eq!(u.relay.screen_share_melden(bob, room, true), 2);
    assert!(leeren(&mut rx_bob).is_empty());
    for rx in [&mut rx_ada, &mut rx_carl] {
        assert!(matches!(
            leeren(rx).as_slice(),
            [ServerEvent::ScreenShareStarted(s)] if s.user_id == bob
        ));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nebenlaeufige_joins_liefern_konsistente_member_joined() {
    let u = Arc::new(Umgebung::neu());
    let room = u.room(true);
    let (beobachter, mut rx_beobachter) = u.client("beobachter");
    u.beitreten(beobachter, room).await;
    leeren(&mut rx_beobachter);

    let mut clients = Vec::new();
    for i in 0..20 {
        clients.push(u.client(&format!("gast{i}")));
    }

    let mut tasks = Vec::new();
    for (uid, _) in &clients {
        let u = Arc::clone(&u);
        let uid = *uid;
        tasks.push(tokio::spawn(async move { u.beitreten(uid, room).await }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Reihenfolge der member-joined entspricht der Mitglieder-Reihenfolge
    let gemeldet: Vec<UserId> = leeren(&mut rx_beobachter)
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::MemberJoined(m) => Some(m.user_id),
            _ => None,
        })
        .collect();
    let mitglieder = u.registry.room_lesen(&room, |r| r.mitglieder_ids()).unwrap();
    assert_eq!(mitglieder.len(), 21);
    assert_eq!(&mitglieder[1..], gemeldet.as_slice());
}
