//! Integration tests for the change detector
//!
//! A running detector must keep the local list in line with changes made directly
//! on the player.

mod helpers;

use helpers::Harness;
use jukebox::detector::ChangeDetector;
use jukebox::queue::QueueSnapshot;
use jukebox::fanout::Subscription;
use jukebox::Error;
use std::sync::Arc;
use std::time::Duration;

async fn next_snapshot(sub: &mut Subscription) -> Arc<QueueSnapshot> {
    tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("no snapshot within 2s")
        .expect("subscription ended")
}

async fn running(h: &Harness) -> ChangeDetector {
    ChangeDetector::start(&h.control, h.queue.clone(), 8)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_external_jump_is_mirrored() {
    let h = Harness::new();
    let detector = running(&h).await;
    h.fill(&["a", "b", "c"]).await;
    let mut sub = h.queue.subscribe();

    let target = h.player.slots()[2].clone();
    assert!(h.player.jump_to(&target));

    let snapshot = next_snapshot(&mut sub).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.head().unwrap().slot(), Some(&target));
    assert_eq!(h.ids(), vec!["c"]);

    detector.shutdown().await;
}

#[tokio::test]
async fn test_external_stop_clears_queue() {
    let h = Harness::new();
    let detector = running(&h).await;
    h.fill(&["a", "b"]).await;
    let mut sub = h.queue.subscribe();

    h.player.stop();

    let snapshot = next_snapshot(&mut sub).await;
    assert!(snapshot.is_empty());

    detector.shutdown().await;
}

#[tokio::test]
async fn test_playing_through_the_list() {
    let h = Harness::new();
    let detector = running(&h).await;
    h.fill(&["a", "b"]).await;
    let mut sub = h.queue.subscribe();

    // Advancing on the player directly, as its own controls would
    h.control.next().await.unwrap();
    assert_eq!(next_snapshot(&mut sub).await.len(), 1);
    assert_eq!(h.ids(), vec!["b"]);

    h.control.next().await.unwrap();
    assert!(next_snapshot(&mut sub).await.is_empty());

    detector.shutdown().await;
}

#[tokio::test]
async fn test_own_mutations_are_not_applied_twice() {
    let h = Harness::new();
    let detector = running(&h).await;
    h.fill(&["a", "b", "c"]).await;
    let mut sub = h.queue.subscribe();

    let removed = h.queue.remove_track(0).await.unwrap();
    assert_eq!(next_snapshot(&mut sub).await.version, removed.version);

    // The player's own notification for the skip arrives afterwards and matches
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sub.try_recv().is_none());
    assert_eq!(h.ids(), vec!["b", "c"]);

    detector.shutdown().await;
}

#[tokio::test]
async fn test_overlapping_skips_keep_the_mirror() {
    let h = Harness::new();
    let detector = running(&h).await;
    h.fill(&["a", "b", "c"]).await;
    h.player.set_delay(Some(Duration::from_millis(50)));

    let queue = h.queue.clone();
    let first = tokio::spawn(async move { queue.remove_track(0).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let queue = h.queue.clone();
    let second = tokio::spawn(async move { queue.remove_track(0).await });

    assert_eq!(first.await.unwrap().unwrap().len(), 2);
    assert_eq!(second.await.unwrap().unwrap().len(), 1);
    h.player.set_delay(None);

    // Let the notifications of both skips reach the reconciler
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h.ids(), vec!["c"]);
    let snapshot = h.queue.snapshot();
    assert_eq!(snapshot.head().unwrap().slot(), h.player.current_slot().as_ref());

    detector.shutdown().await;
}

#[tokio::test]
async fn test_rejected_subscription_is_fatal() {
    let h = Harness::new();
    h.player.reject_subscriptions(true);

    let result = ChangeDetector::start(&h.control, h.queue.clone(), 8).await;

    assert!(matches!(result, Err(Error::Subscription(_))));
}

#[tokio::test]
async fn test_no_reconciliation_after_shutdown() {
    let h = Harness::new();
    let detector = running(&h).await;
    h.fill(&["a", "b"]).await;
    assert!(detector.is_running());

    detector.shutdown().await;
    let version = h.queue.snapshot().version;

    let last = h.player.slots()[1].clone();
    h.player.jump_to(&last);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.queue.snapshot().version, version);
    assert_eq!(h.ids(), vec!["a", "b"]);
}
