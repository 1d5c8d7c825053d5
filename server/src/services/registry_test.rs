use super::*;
use tokio::sync::mpsc;
use uuid::Uuid;

#[tokio::test]
async fn create_room_returns_distinct_ids() {
    let registry = RoomRegistry::new(10, 50);
    let a = registry.create_room().await.expect("create a");
    let b = registry.create_room().await.expect("create b");
    assert_ne!(a, b);
    assert_eq!(registry.len().await, 2);
    assert!(registry.get_room(&a).await.is_ok());
}

#[tokio::test]
async fn create_room_fails_at_limit() {
    let registry = RoomRegistry::new(1, 50);
    registry.create_room().await.expect("first room");

    let err = registry.create_room().await.expect_err("limit reached");
    assert!(matches!(err, SyncError::ResourceExhausted { max_rooms: 1 }));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn concurrent_creates_never_exceed_limit() {
    let registry = RoomRegistry::new(5, 50);
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move { registry.create_room().await.is_ok() }));
    }
    let mut created = 0;
    for task in tasks {
        if task.await.expect("task") {
            created += 1;
        }
    }
    assert_eq!(created, 5);
    assert_eq!(registry.len().await, 5);
}

#[tokio::test]
async fn get_room_reports_unknown_ids() {
    let registry = RoomRegistry::new(10, 50);
    let err = registry.get_room(&RoomId::from("missing")).await.err().expect("should fail");
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn ensure_room_creates_once_and_reuses() {
    let registry = RoomRegistry::new(10, 50);
    let id = RoomId::from("team-board");
    let first = registry.ensure_room(&id).await.expect("ensure");
    let second = registry.ensure_room(&id).await.expect("ensure again");
    assert!(first.same_room(&second));
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn ensure_room_respects_limit_for_new_ids_only() {
    let registry = RoomRegistry::new(1, 50);
    let id = RoomId::from("only");
    registry.ensure_room(&id).await.expect("first");
    assert!(registry.ensure_room(&id).await.is_ok());

    let err = registry.ensure_room(&RoomId::from("other")).await.err().expect("limit");
    assert!(matches!(err, SyncError::ResourceExhausted { .. }));
}

#[tokio::test]
async fn sweep_retires_only_empty_rooms() {
    let registry = RoomRegistry::new(10, 50);
    let busy = registry.create_room().await.expect("busy");
    let idle = registry.create_room().await.expect("idle");

    let handle = registry.get_room(&busy).await.expect("busy handle");
    let (tx, _rx) = mpsc::channel(8);
    handle.join(Uuid::new_v4(), tx).await.expect("join");

    let removed = registry.sweep_idle(Duration::ZERO).await;
    assert_eq!(removed, vec![idle.clone()]);
    assert!(registry.get_room(&busy).await.is_ok());
    assert!(matches!(registry.get_room(&idle).await.err(), Some(SyncError::NotFound(_))));
}

#[tokio::test]
async fn sweep_keeps_rooms_younger_than_ttl() {
    let registry = RoomRegistry::new(10, 50);
    registry.create_room().await.expect("room");
    assert!(registry.sweep_idle(Duration::from_secs(3600)).await.is_empty());
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn ensure_room_replaces_a_retired_handle() {
    let registry = RoomRegistry::new(10, 50);
    let id = RoomId::from("recycled");
    let old = registry.ensure_room(&id).await.expect("ensure");
    assert!(old.try_retire(Duration::ZERO).await);
    assert!(old.stats().await.is_err());

    let fresh = registry.ensure_room(&id).await.expect("replace");
    assert!(!fresh.same_room(&old));
    assert!(fresh.stats().await.is_ok());
}

#[tokio::test]
async fn sweep_frees_a_slot_for_new_rooms() {
    let registry = RoomRegistry::new(1, 50);
    registry.create_room().await.expect("first");
    assert!(registry.create_room().await.is_err());

    assert_eq!(registry.sweep_idle(Duration::ZERO).await.len(), 1);
    assert!(registry.create_room().await.is_ok());
}
