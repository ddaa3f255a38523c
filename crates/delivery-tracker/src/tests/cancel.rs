//! cancel and clear_all.

use super::harness::{drain_events, event_names, settle_tasks, tracker_with, ScriptedTransport, Step};
use crate::{DeliveryError, DeliveryEvent, TransportError};
use serde_json::json;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn cancel_settles_pending_message_as_cancelled() {
    let transport = ScriptedTransport::with_script(vec![Step::Hang]);
    let tracker = tracker_with(transport.clone());
    let mut events = tracker.subscribe();

    let pending = tracker.submit("s1", "m1", json!({})).unwrap();
    settle_tasks().await;

    assert!(tracker.cancel("m1"));

    let result = pending.wait().await;
    assert!(matches!(result, Err(DeliveryError::Cancelled(ref id)) if id == "m1"));
    assert!(tracker.pending_ids().is_empty());
    assert!(!tracker.is_pending("m1"));
    assert_eq!(
        event_names(&drain_events(&mut events)),
        vec!["message-pending", "message-sending", "message-cancelled"]
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent() {
    let transport = ScriptedTransport::with_script(vec![Step::Hang]);
    let tracker = tracker_with(transport.clone());
    let mut events = tracker.subscribe();

    let _pending = tracker.submit("s1", "m1", json!({})).unwrap();
    assert!(tracker.cancel("m1"));
    assert!(!tracker.cancel("m1"));
    assert!(!tracker.cancel("never-submitted"));

    let names = event_names(&drain_events(&mut events));
    assert_eq!(names.iter().filter(|n| **n == "message-cancelled").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_further_attempts() {
    let transport = ScriptedTransport::new();
    transport.set_default(Step::Fail(TransportError::NotConnected));
    let tracker = tracker_with(transport.clone());

    let pending = tracker.submit("s1", "m1", json!({})).unwrap();
    settle_tasks().await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(tracker.retry_count("m1"), Some(1));

    tracker.cancel("m1");
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(transport.request_count(), 1);
    assert!(matches!(pending.wait().await, Err(DeliveryError::Cancelled(_))));
}

#[tokio::test(start_paused = true)]
async fn resubmit_after_cancel_is_not_disturbed_by_old_attempt() {
    let transport = ScriptedTransport::with_script(vec![
        Step::DelayThenAck(Duration::from_secs(2)),
        Step::Hang,
    ]);
    let tracker = tracker_with(transport.clone());
    let mut events = tracker.subscribe();

    let _first = tracker.submit("s1", "m1", json!({"v": 1})).unwrap();
    settle_tasks().await;
    tracker.cancel("m1");

    let second = tracker.submit("s1", "m1", json!({"v": 2})).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    // The cancelled attempt's ack would have landed at 2s.
    assert!(tracker.is_pending("m1"));
    assert!(!event_names(&drain_events(&mut events)).contains(&"message-acked"));

    tracker.cancel("m1");
    assert!(matches!(second.wait().await, Err(DeliveryError::Cancelled(_))));
}

#[tokio::test(start_paused = true)]
async fn clear_all_fails_every_pending_message() {
    let transport = ScriptedTransport::new();
    transport.set_default(Step::Hang);
    let tracker = tracker_with(transport.clone());
    let mut events = tracker.subscribe();

    let handles: Vec<_> = ["m1", "m2", "m3"]
        .iter()
        .map(|id| tracker.submit("s1", id, json!({})).unwrap())
        .collect();
    settle_tasks().await;
    assert_eq!(tracker.pending_count(), 3);

    tracker.clear_all();

    assert!(tracker.pending_ids().is_empty());
    for handle in handles {
        assert!(matches!(handle.wait().await, Err(DeliveryError::ConnectionClosed)));
    }

    let events = drain_events(&mut events);
    assert_eq!(
        events.last(),
        Some(&DeliveryEvent::AllCleared {
            local_ids: vec!["m1".into(), "m2".into(), "m3".into()],
        })
    );

    // No timer survives the clear.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn clear_all_with_nothing_pending_still_reports() {
    let tracker = tracker_with(ScriptedTransport::new());
    let mut events = tracker.subscribe();

    tracker.clear_all();

    assert_eq!(
        drain_events(&mut events),
        vec![DeliveryEvent::AllCleared { local_ids: vec![] }]
    );
}
