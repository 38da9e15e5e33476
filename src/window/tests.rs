//! 窗口的单元测试。
//! Unit tests for the window.

use super::*;
use crate::config::WindowConfig;
use crate::testing::{MockUplink, data_message};
use std::time::Duration;
use tokio::time::{advance, timeout};

fn test_config() -> WindowConfig {
    WindowConfig {
        initial_cap: 1000.0,
        max_cap: 8000.0,
        ..WindowConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_add_within_capacity_does_not_block() {
    let uplink = MockUplink::new();
    let window = Window::new(test_config(), uplink.clone());

    for seq in 0..3 {
        timeout(Duration::from_secs(1), window.add(data_message(300), seq))
            .await
            .expect("admission within capacity must not block")
            .unwrap();
    }

    assert_eq!(window.in_flight_bytes().await, 900);
    assert_eq!(uplink.sent_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ack_of_oldest_evicts_contiguous_acked_run() {
    let uplink = MockUplink::new();
    let window = Window::new(test_config(), uplink.clone());

    window.add(data_message(100), 0).await.unwrap();
    window.add(data_message(200), 1).await.unwrap();
    window.add(data_message(300), 2).await.unwrap();

    // Acking the middle item evicts nothing: the head is still unacked.
    window.ack(1, false).await.unwrap();
    assert_eq!(window.in_flight_bytes().await, 600);

    // Acking the head evicts the head and the already-acked run behind it.
    window.ack(0, false).await.unwrap();
    assert_eq!(window.in_flight_bytes().await, 300);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_ack_is_reported_and_changes_nothing() {
    let uplink = MockUplink::new();
    let window = Window::new(test_config(), uplink.clone());

    window.add(data_message(100), 0).await.unwrap();
    window.add(data_message(100), 1).await.unwrap();

    window.ack(1, false).await.unwrap();
    let cap = window.capacity().await;
    let size = window.in_flight_bytes().await;

    match window.ack(1, false).await {
        Err(Error::AlreadyAcked { seq: 1 }) => {}
        other => panic!("expected AlreadyAcked, got {:?}", other),
    }
    assert_eq!(window.capacity().await, cap);
    assert_eq!(window.in_flight_bytes().await, size);
}

#[tokio::test(start_paused = true)]
async fn test_ack_out_of_window() {
    let uplink = MockUplink::new();
    let window = Window::new(test_config(), uplink.clone());

    window.add(data_message(100), 0).await.unwrap();

    // Never sent.
    match window.ack(7, false).await {
        Err(Error::MessageNotInWindow { seq: 7 }) => {}
        other => panic!("expected MessageNotInWindow, got {:?}", other),
    }

    // Already evicted.
    window.ack(0, false).await.unwrap();
    match window.ack(0, false).await {
        Err(Error::MessageNotInWindow { seq: 0 }) => {}
        other => panic!("expected MessageNotInWindow, got {:?}", other),
    }
    assert_eq!(window.in_flight_bytes().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_clean_acks_grow_capacity_up_to_max() {
    let uplink = MockUplink::new();
    let window = Window::new(test_config(), uplink.clone());

    // A steady RTT never shows queuing delay, so every ack grows the ceiling.
    let mut last_cap = window.capacity().await;
    for seq in 0..10 {
        window.add(data_message(100), seq).await.unwrap();
        advance(Duration::from_millis(20)).await;
        window.ack(seq, false).await.unwrap();

        let cap = window.capacity().await;
        assert!(
            cap > last_cap || cap == 8000.0,
            "capacity must grow until the maximum, got {} after {}",
            cap,
            last_cap
        );
        last_cap = cap;
    }
    assert_eq!(last_cap, 8000.0);
}

#[tokio::test(start_paused = true)]
async fn test_congestion_shrinks_capacity_down_to_initial() {
    let uplink = MockUplink::new();
    let window = Window::new(test_config(), uplink.clone());

    // One fast sample establishes a low baseline.
    window.add(data_message(100), 0).await.unwrap();
    advance(Duration::from_millis(10)).await;
    window.ack(0, false).await.unwrap();

    // Sustained slow samples push SRTT - RTTVAR above the baseline, which
    // must eventually drive the ceiling back down to its floor.
    for seq in 1..30 {
        window.add(data_message(100), seq).await.unwrap();
        advance(Duration::from_millis(500)).await;
        window.ack(seq, false).await.unwrap();
    }

    assert_eq!(window.capacity().await, 1000.0);
}

#[tokio::test(start_paused = true)]
async fn test_retransmitted_ack_taints_later_items() {
    let uplink = MockUplink::new();
    let window = Window::new(test_config(), uplink.clone());

    window.add(data_message(100), 0).await.unwrap();
    window.add(data_message(100), 1).await.unwrap();
    window.add(data_message(100), 2).await.unwrap();
    advance(Duration::from_millis(20)).await;

    // A retransmitted ack must not touch the RTT statistics or the ceiling.
    let cap = window.capacity().await;
    window.ack(1, true).await.unwrap();
    assert_eq!(window.capacity().await, cap);

    // Item 2 queued after the retransmitted one: its sample is unreliable.
    window.ack(2, false).await.unwrap();
    assert_eq!(window.capacity().await, cap);

    // Item 0 queued before it is unaffected and updates the ceiling.
    window.ack(0, false).await.unwrap();
    assert!(window.capacity().await > cap);
    assert_eq!(window.in_flight_bytes().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_take_expired_marks_and_reschedules() {
    let uplink = MockUplink::new();
    let window = Window::new(test_config(), uplink.clone());

    window.add(data_message(100), 0).await.unwrap();

    // Before the initial RTO elapses nothing is due.
    assert!(window.take_expired().await.is_empty());

    advance(Duration::from_millis(400)).await;
    let expired = window.take_expired().await;
    assert_eq!(expired.len(), 1);

    // The deadline was pushed forward, so an immediate re-check is empty.
    assert!(window.take_expired().await.is_empty());

    // The eventual ack of a locally retransmitted item must not feed the
    // estimator with its bogus sample.
    let cap = window.capacity().await;
    window.ack(0, false).await.unwrap();
    assert_eq!(window.capacity().await, cap);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_add_resumes_after_eviction() {
    let uplink = MockUplink::new();
    let window = Arc::new(Window::new(test_config(), uplink.clone()));

    window.add(data_message(800), 0).await.unwrap();

    let blocked = {
        let window = window.clone();
        tokio::spawn(async move { window.add(data_message(800), 1).await })
    };
    tokio::task::yield_now().await;
    assert_eq!(uplink.sent_count(), 1, "second admission must be blocked");

    window.ack(0, false).await.unwrap();
    timeout(Duration::from_secs(1), blocked)
        .await
        .expect("blocked admission must resume after eviction")
        .unwrap()
        .unwrap();
    assert_eq!(uplink.sent_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_admissions_within_capacity_all_succeed() {
    let uplink = MockUplink::new();
    let window = Arc::new(Window::new(test_config(), uplink.clone()));

    let results = futures::future::join_all((0..5).map(|seq| {
        let window = window.clone();
        async move { window.add(data_message(100), seq).await }
    }))
    .await;

    assert!(results.into_iter().all(|r| r.is_ok()));
    assert_eq!(uplink.sent_count(), 5);
    assert_eq!(window.in_flight_bytes().await, 500);
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_blocked_add() {
    let uplink = MockUplink::new();
    let window = Arc::new(Window::new(test_config(), uplink.clone()));

    window.add(data_message(800), 0).await.unwrap();

    let blocked = {
        let window = window.clone();
        tokio::spawn(async move { window.add(data_message(800), 1).await })
    };
    tokio::task::yield_now().await;

    window.close().await;
    let result = timeout(Duration::from_secs(1), blocked)
        .await
        .expect("teardown must release blocked admissions")
        .unwrap();
    match result {
        Err(Error::ConnectionAborted) => {}
        other => panic!("expected ConnectionAborted, got {:?}", other),
    }

    // Closing again is a no-op.
    window.close().await;
}
