use super::*;
use actions::{Action, ObjectId, PathPayload, Point, ShapeKind, ShapePayload, Style, Transform};
use serde_json::Value;
use tokio::time::timeout;

fn relay(action: &Action) -> RelayedAction {
    let text = actions::encode_action(action).expect("encode");
    RelayedAction::decode(text.into()).expect("valid action")
}

fn path(id: &str) -> RelayedAction {
    relay(&Action::Path(PathPayload {
        id: Some(ObjectId::from(id)),
        points: vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)],
        style: Style::default(),
        transform: Transform::default(),
    }))
}

fn shape(id: &str) -> RelayedAction {
    relay(&Action::Shape(ShapePayload {
        id: Some(ObjectId::from(id)),
        kind: ShapeKind::Rectangle,
        width: 10.0,
        height: 10.0,
        style: Style::default(),
        transform: Transform::at(1.0, 1.0),
    }))
}

/// A shape message carrying payload fields the server has no type for.
fn shape_with_extras(id: &str) -> String {
    let mut value: Value = serde_json::from_str(shape(id).text().as_str()).expect("json");
    value["payload"]["opacity"] = Value::from(0.5);
    value["payload"]["strokeWidth"] = Value::from(3);
    value.to_string()
}

/// Log as a late joiner would see it.
fn replay(room: &mut RoomSession) -> Vec<RelayedAction> {
    let (tx, _rx) = mpsc::channel(1);
    let conn = Uuid::new_v4();
    let log = room.join(conn, tx);
    room.leave(conn);
    log
}

async fn assert_channel_has_action(rx: &mut mpsc::Receiver<RelayedAction>) -> RelayedAction {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("action receive timed out")
        .expect("channel closed")
}

async fn assert_channel_empty(rx: &mut mpsc::Receiver<RelayedAction>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected channel to remain empty"
    );
}

// =============================================================================
// RoomId
// =============================================================================

#[test]
fn generated_room_ids_are_unique_and_parseable() {
    let a = RoomId::generate();
    let b = RoomId::generate();
    assert_ne!(a, b);
    assert_eq!(RoomId::parse(&a.to_string()).expect("valid"), a);
}

#[test]
fn room_id_parse_rejects_unsafe_input() {
    assert!(RoomId::parse("").is_err());
    assert!(RoomId::parse("../etc").is_err());
    assert!(RoomId::parse("a b").is_err());
    assert!(RoomId::parse(&"x".repeat(MAX_ROOM_ID_LEN + 1)).is_err());
    assert!(RoomId::parse("team_board-2").is_ok());
}

// =============================================================================
// RoomSession
// =============================================================================

#[test]
fn log_keeps_only_most_recent_entries() {
    let mut room = RoomSession::new(RoomId::from("r"), 2);
    let sender = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    room.join(sender, tx);

    for id in ["p1", "p2", "p3"] {
        room.publish(sender, path(id)).expect("publish");
    }

    assert_eq!(replay(&mut room), vec![path("p2"), path("p3")]);
}

#[test]
fn clear_empties_log_for_later_joiners() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let sender = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    room.join(sender, tx);
    room.publish(sender, path("p1")).expect("publish");
    room.publish(sender, relay(&Action::Clear)).expect("clear");

    let (late_tx, _late_rx) = mpsc::channel(8);
    let replay = room.join(Uuid::new_v4(), late_tx);
    assert!(replay.is_empty());
}

#[test]
fn undo_and_redo_are_relayed_but_not_logged() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let sender = Uuid::new_v4();
    let peer = Uuid::new_v4();
    let (tx_s, _rx_s) = mpsc::channel(8);
    let (tx_p, mut rx_p) = mpsc::channel(8);
    room.join(sender, tx_s);
    room.join(peer, tx_p);

    room.publish(sender, shape("obj_1")).expect("shape");
    let delivery = room.publish(sender, relay(&Action::Undo)).expect("undo");
    room.publish(sender, relay(&Action::Redo)).expect("redo");

    assert_eq!(delivery.delivered, 1);
    assert_eq!(rx_p.try_recv().expect("shape"), shape("obj_1"));
    assert_eq!(rx_p.try_recv().expect("undo").kind(), ActionKind::Undo);
    assert_eq!(rx_p.try_recv().expect("redo").kind(), ActionKind::Redo);
    assert_eq!(replay(&mut room), vec![shape("obj_1")]);
}

#[test]
fn zero_history_bound_logs_nothing() {
    let mut room = RoomSession::new(RoomId::from("r"), 0);
    let sender = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    room.join(sender, tx);
    room.publish(sender, path("p1")).expect("publish");
    assert!(replay(&mut room).is_empty());
}

#[test]
fn publish_requires_membership() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let stranger = Uuid::new_v4();
    let err = room.publish(stranger, path("p1")).expect_err("should reject");
    assert!(matches!(err, SyncError::NotMember(id) if id == stranger));
    assert!(replay(&mut room).is_empty());
}

#[test]
fn client_sent_history_is_rejected() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let sender = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    room.join(sender, tx);

    let history = relay(&Action::History(Vec::new()));
    let err = room.publish(sender, history).expect_err("should reject");
    assert!(matches!(err, SyncError::MalformedMessage(_)));
    assert!(replay(&mut room).is_empty());
}

#[test]
fn dropped_member_can_no_longer_publish() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let sender = Uuid::new_v4();
    let slow = Uuid::new_v4();
    let (tx_s, _rx_s) = mpsc::channel(8);
    let (tx_slow, _rx_slow) = mpsc::channel(1);
    room.join(sender, tx_s);
    room.join(slow, tx_slow);

    room.publish(sender, path("p1")).expect("first");
    room.publish(sender, path("p2")).expect("second");

    let err = room.publish(slow, shape("obj_1")).expect_err("slow member was dropped");
    assert!(matches!(err, SyncError::NotMember(id) if id == slow));
    assert_eq!(replay(&mut room), vec![path("p1"), path("p2")]);
}

// =============================================================================
// Relay fidelity
// =============================================================================

#[test]
fn relayed_action_keeps_text_verbatim() {
    let text = shape_with_extras("obj_1");
    let relayed = RelayedAction::decode(text.clone().into()).expect("valid");
    assert_eq!(relayed.kind(), ActionKind::Shape);
    assert_eq!(relayed.text().as_str(), text);
}

#[test]
fn relayed_action_rejects_what_the_codec_rejects() {
    for text in ["not json", r#"{"payload":{}}"#, r#"{"type":"cursor","payload":{}}"#, r#"{"type":"path","payload":{}}"#] {
        assert!(RelayedAction::decode(text.to_owned().into()).is_err(), "for {text}");
    }
}

#[test]
fn unknown_payload_fields_survive_fanout_and_replay() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let sender = Uuid::new_v4();
    let peer = Uuid::new_v4();
    let (tx_s, _rx_s) = mpsc::channel(8);
    let (tx_p, mut rx_p) = mpsc::channel(8);
    room.join(sender, tx_s);
    room.join(peer, tx_p);

    let text = shape_with_extras("obj_1");
    room.publish(sender, RelayedAction::decode(text.clone().into()).expect("valid")).expect("publish");

    assert_eq!(rx_p.try_recv().expect("relayed").text().as_str(), text);

    let batch: Value = serde_json::from_str(&history_message(&replay(&mut room))).expect("history json");
    let original: Value = serde_json::from_str(&text).expect("json");
    assert_eq!(batch["type"], "history");
    assert_eq!(batch["payload"], Value::Array(vec![original]));
    assert_eq!(batch["payload"][0]["payload"]["opacity"], 0.5);
}

#[test]
fn history_message_decodes_as_history_action() {
    assert_eq!(
        actions::decode_action(&history_message(&[])).expect("empty batch"),
        Action::History(Vec::new())
    );

    let entries = [path("p1"), shape("obj_1")];
    let Action::History(decoded) = actions::decode_action(&history_message(&entries)).expect("batch") else {
        panic!("expected history");
    };
    let kinds: Vec<ActionKind> = decoded.iter().map(Action::kind).collect();
    assert_eq!(kinds, vec![ActionKind::Path, ActionKind::Shape]);
}

#[test]
fn full_member_queue_drops_that_member_only() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let sender = Uuid::new_v4();
    let slow = Uuid::new_v4();
    let fast = Uuid::new_v4();
    let (tx_s, _rx_s) = mpsc::channel(8);
    let (tx_slow, _rx_slow) = mpsc::channel(1);
    let (tx_fast, mut rx_fast) = mpsc::channel(8);
    room.join(sender, tx_s);
    room.join(slow, tx_slow);
    room.join(fast, tx_fast);

    room.publish(sender, path("p1")).expect("first");
    let delivery = room.publish(sender, path("p2")).expect("second");

    assert_eq!(delivery.dropped, vec![slow]);
    assert_eq!(room.member_count(), 2);
    assert_eq!(rx_fast.try_recv().expect("p1"), path("p1"));
    assert_eq!(rx_fast.try_recv().expect("p2"), path("p2"));
}

#[test]
fn closed_member_queue_is_dropped() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let sender = Uuid::new_v4();
    let gone = Uuid::new_v4();
    let (tx_s, _rx_s) = mpsc::channel(8);
    let (tx_gone, rx_gone) = mpsc::channel(8);
    room.join(sender, tx_s);
    room.join(gone, tx_gone);
    drop(rx_gone);

    let delivery = room.publish(sender, path("p1")).expect("publish");
    assert_eq!(delivery.delivered, 0);
    assert_eq!(delivery.dropped, vec![gone]);
    assert_eq!(room.member_count(), 1);
}

#[test]
fn idle_tracking_follows_membership() {
    let mut room = RoomSession::new(RoomId::from("r"), 10);
    let start = Instant::now();
    assert!(room.is_idle_for(Duration::ZERO, start));

    let conn = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    room.join(conn, tx);
    assert!(!room.is_idle_for(Duration::ZERO, Instant::now()));
    assert!(room.stats(Instant::now()).idle_for.is_none());

    assert!(room.leave(conn));
    assert!(!room.leave(conn));
    assert!(room.is_idle_for(Duration::ZERO, Instant::now()));
    assert!(!room.is_idle_for(Duration::from_secs(3600), Instant::now()));
}

// =============================================================================
// RoomHandle (actor)
// =============================================================================

#[tokio::test]
async fn broadcast_reaches_all_members_except_sender() {
    let room = RoomHandle::spawn(RoomId::from("r"), 10);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    let (tx_c, mut rx_c) = mpsc::channel(8);
    room.join(a, tx_a).await.expect("join a");
    room.join(b, tx_b).await.expect("join b");
    room.join(c, tx_c).await.expect("join c");

    let delivery = room.publish(a, path("p1")).await.expect("publish");
    assert_eq!(delivery.delivered, 2);

    assert_eq!(assert_channel_has_action(&mut rx_b).await, path("p1"));
    assert_eq!(assert_channel_has_action(&mut rx_c).await, path("p1"));
    assert_channel_empty(&mut rx_a).await;
}

#[tokio::test]
async fn late_joiner_gets_replay_and_nothing_further() {
    let room = RoomHandle::spawn(RoomId::from("r"), 10);
    let first = Uuid::new_v4();
    let (tx_first, _rx_first) = mpsc::channel(8);
    room.join(first, tx_first).await.expect("join first");
    room.publish(first, shape("obj_1")).await.expect("publish");

    let late = Uuid::new_v4();
    let (tx_late, mut rx_late) = mpsc::channel(8);
    let replay = room.join(late, tx_late).await.expect("join late");

    assert_eq!(replay, vec![shape("obj_1")]);
    assert_channel_empty(&mut rx_late).await;
}

#[tokio::test]
async fn publishes_from_many_members_arrive_in_one_order_everywhere() {
    let room = RoomHandle::spawn(RoomId::from("r"), 100);
    let observer_a = Uuid::new_v4();
    let observer_b = Uuid::new_v4();
    let (tx_a, mut rx_a) = mpsc::channel(64);
    let (tx_b, mut rx_b) = mpsc::channel(64);
    room.join(observer_a, tx_a).await.expect("join a");
    room.join(observer_b, tx_b).await.expect("join b");

    let mut writers = Vec::new();
    for w in 0..4 {
        let room = room.clone();
        writers.push(tokio::spawn(async move {
            let conn = Uuid::new_v4();
            let (tx, _rx) = mpsc::channel(64);
            room.join(conn, tx).await.expect("join writer");
            for i in 0..5 {
                room.publish(conn, path(&format!("w{w}_{i}"))).await.expect("publish");
            }
            room.leave(conn).await;
        }));
    }
    for writer in writers {
        writer.await.expect("writer task");
    }

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for _ in 0..20 {
        seen_a.push(assert_channel_has_action(&mut rx_a).await);
        seen_b.push(assert_channel_has_action(&mut rx_b).await);
    }
    assert_eq!(seen_a, seen_b);

    let stats = room.stats().await.expect("stats");
    assert_eq!(stats.history_len, 20);
    assert_eq!(stats.members, 2);
}

#[tokio::test]
async fn leave_stops_delivery_to_that_member() {
    let room = RoomHandle::spawn(RoomId::from("r"), 10);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let (tx_a, _rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    room.join(a, tx_a).await.expect("join a");
    room.join(b, tx_b).await.expect("join b");

    room.leave(b).await;
    room.publish(a, path("p1")).await.expect("publish");

    // The room dropped its sender, so the receiver sees end-of-stream.
    let next = timeout(Duration::from_millis(200), rx_b.recv()).await.expect("recv");
    assert!(next.is_none());
}

#[tokio::test]
async fn retire_stops_only_idle_rooms() {
    let room = RoomHandle::spawn(RoomId::from("r"), 10);
    let conn = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(8);
    room.join(conn, tx).await.expect("join");

    assert!(!room.try_retire(Duration::ZERO).await);
    assert!(!room.is_closed());

    room.leave(conn).await;
    assert!(room.try_retire(Duration::ZERO).await);

    let err = room.stats().await.expect_err("actor stopped");
    assert!(matches!(err, SyncError::RoomClosed(_)));
    assert!(room.is_closed());
    assert!(room.try_retire(Duration::ZERO).await);
}

#[test]
fn epoch_ms_is_positive_for_now() {
    assert!(epoch_ms(SystemTime::now()) > 0);
    assert_eq!(epoch_ms(UNIX_EPOCH), 0);
}
