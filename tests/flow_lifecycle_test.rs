// Integration tests for the popup flow lifecycle.
//
// Time is paused, so poll intervals and deadlines advance only as far as the
// test sleeps (or as far as tokio auto-advances while everything is idle).

use connectflow::flow::{FLOW_TIMEOUT, POPUP_BLOCKED};
use connectflow::{
    ConnectFlowConfig, FlowCoordinator, FlowResult, MessageBridge, ProviderConfig, SimulatedHost,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

const ORIGIN: &str = "https://connect.example.com";

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Harness {
    host: Arc<SimulatedHost>,
    coordinator: FlowCoordinator,
    results: broadcast::Receiver<FlowResult>,
}

fn harness_with(config: ConnectFlowConfig, provider: ProviderConfig) -> Harness {
    let host = Arc::new(SimulatedHost::new());
    let bridge = MessageBridge::new(&config.bridge);
    bridge.install(host.as_ref()).unwrap();

    let coordinator = FlowCoordinator::new(provider, host.clone(), bridge, &config).unwrap();
    let results = coordinator.subscribe();

    Harness {
        host,
        coordinator,
        results,
    }
}

fn harness() -> Harness {
    let mut config = ConnectFlowConfig::default();
    config.poller.interval_ms = 100;
    harness_with(
        config,
        ProviderConfig::new("accounting", format!("{}/accounting/authorize", ORIGIN)),
    )
}

async fn next_result(rx: &mut broadcast::Receiver<FlowResult>) -> FlowResult {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no result published")
        .expect("result channel closed")
}

fn post(h: &Harness, data: Value) {
    assert!(h.host.post_message(ORIGIN, data));
}

fn assert_no_result(rx: &mut broadcast::Receiver<FlowResult>) {
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

/// Success message → `{succeeded: true}`, popup closed, timer stopped.
#[tokio::test(start_paused = true)]
async fn test_success_message() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    post(&h, json!({"type": "flow", "status": "success"}));

    let result = next_result(&mut h.results).await;
    assert_eq!(
        result,
        FlowResult {
            succeeded: true,
            message: None
        }
    );

    let popup = h.host.last_popup().unwrap();
    assert!(popup.is_closed());
    assert_eq!(popup.close_calls(), 1);
    assert!(!h.coordinator.is_connecting());

    // Timer stopped: the closed flag is never read again
    let checks = popup.closed_checks();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(popup.closed_checks(), checks);
    assert_no_result(&mut h.results);
}

/// User closes the popup → next poll tick publishes `{succeeded: false}`.
#[tokio::test(start_paused = true)]
async fn test_user_closes_popup() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(h.coordinator.is_connecting());

    h.host.last_popup().unwrap().user_close();

    let result = next_result(&mut h.results).await;
    assert_eq!(
        result,
        FlowResult {
            succeeded: false,
            message: None
        }
    );
    assert!(!h.coordinator.is_connecting());
    assert_eq!(h.host.last_popup().unwrap().close_calls(), 0);
}

/// Back-to-back initiate → second publishes a rejection, first keeps going.
#[tokio::test(start_paused = true)]
async fn test_double_initiate_is_single_flight() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    let first = h.coordinator.current_flow().unwrap();
    h.coordinator.initiate_auth_flow();

    assert_eq!(h.results.try_recv().unwrap(), FlowResult::rejected());
    assert_eq!(h.host.opened_count(), 1);
    assert_eq!(h.coordinator.current_flow(), Some(first));
    assert!(!h.host.last_popup().unwrap().is_closed());

    // First flow still completes normally
    post(&h, json!({"type": "flow", "status": "success"}));
    assert!(next_result(&mut h.results).await.succeeded);
    assert_no_result(&mut h.results);
}

/// Fail message with detail → detail is published.
#[tokio::test(start_paused = true)]
async fn test_fail_message_with_detail() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    post(&h, json!({"type": "flow", "status": "fail", "message": "SOME_ERROR"}));

    assert_eq!(
        next_result(&mut h.results).await,
        FlowResult {
            succeeded: false,
            message: Some("SOME_ERROR".to_string())
        }
    );
}

/// Unknown status → treated as a failure rather than hanging the flow.
#[tokio::test(start_paused = true)]
async fn test_unrecognized_status() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    post(&h, json!({"type": "flow", "status": "half-connected"}));

    assert_eq!(
        next_result(&mut h.results).await,
        FlowResult {
            succeeded: false,
            message: None
        }
    );
    assert!(!h.coordinator.is_connecting());
}

// ── Filtering ─────────────────────────────────────────────────────────────────

/// Payloads without the discriminator change nothing.
#[tokio::test(start_paused = true)]
async fn test_unrelated_messages_ignored() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    post(&h, json!({"status": "success"}));
    post(&h, json!({"source": "react-devtools", "payload": {}}));
    post(&h, json!("plain string"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.coordinator.is_connecting());
    assert_no_result(&mut h.results);
    assert!(!h.host.last_popup().unwrap().is_closed());
}

/// Flow messages from an origin the provider does not trust are ignored.
#[tokio::test(start_paused = true)]
async fn test_foreign_origin_rejected() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    assert!(h
        .host
        .post_message("https://evil.example.net", json!({"type": "flow", "status": "success"})));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.coordinator.is_connecting());
    assert_no_result(&mut h.results);

    // The genuine message still gets through afterwards
    post(&h, json!({"type": "flow", "status": "success"}));
    assert!(next_result(&mut h.results).await.succeeded);
}

/// Explicitly allowed callback origin replaces the auth_url origin.
#[tokio::test(start_paused = true)]
async fn test_allowed_origin_override() {
    let provider = ProviderConfig::new("social", "https://www.facebook.com/dialog/oauth")
        .with_allowed_origin("https://lending.example.com");
    let mut h = harness_with(ConnectFlowConfig::default(), provider);

    h.coordinator.initiate_auth_flow();
    h.host.post_message(
        "https://www.facebook.com",
        json!({"type": "flow", "status": "success"}),
    );
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.coordinator.is_connecting());

    h.host.post_message(
        "https://lending.example.com",
        json!({"type": "flow", "status": "success"}),
    );
    assert!(next_result(&mut h.results).await.succeeded);
}

/// Messages arriving after the flow finished are inert.
#[tokio::test(start_paused = true)]
async fn test_late_message_after_cancel() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    h.host.last_popup().unwrap().user_close();
    assert!(!next_result(&mut h.results).await.succeeded);

    post(&h, json!({"type": "flow", "status": "success"}));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_no_result(&mut h.results);
}

// ── Resource handling ─────────────────────────────────────────────────────────

/// Racing message and close: exactly one result.
#[tokio::test(start_paused = true)]
async fn test_message_and_close_race() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    h.host.last_popup().unwrap().user_close();
    post(&h, json!({"type": "flow", "status": "success"}));
    h.coordinator.check_if_closed();

    next_result(&mut h.results).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_no_result(&mut h.results);
}

/// Flows can be retried immediately after finishing.
#[tokio::test(start_paused = true)]
async fn test_retry_after_cancel() {
    let mut h = harness();

    h.coordinator.initiate_auth_flow();
    h.host.last_popup().unwrap().user_close();
    assert!(!next_result(&mut h.results).await.succeeded);

    h.coordinator.initiate_auth_flow();
    assert_eq!(h.host.opened_count(), 2);
    post(&h, json!({"type": "flow", "status": "success"}));
    assert!(next_result(&mut h.results).await.succeeded);
}

/// Blocked popup fails the flow at once instead of hanging.
#[tokio::test(start_paused = true)]
async fn test_popup_blocked() {
    let mut h = harness();
    h.host.set_block_popups(true);

    h.coordinator.initiate_auth_flow();

    assert_eq!(
        h.results.try_recv().unwrap(),
        FlowResult {
            succeeded: false,
            message: Some(POPUP_BLOCKED.to_string())
        }
    );
    assert!(!h.coordinator.is_connecting());

    // Unblocked, the next attempt proceeds
    h.host.set_block_popups(false);
    h.coordinator.initiate_auth_flow();
    assert!(h.coordinator.is_connecting());
}

/// An abandoned popup is closed once the maximum duration passes.
#[tokio::test(start_paused = true)]
async fn test_flow_deadline() {
    let mut config = ConnectFlowConfig::default();
    config.poller.interval_ms = 100;
    config.flow.max_duration_seconds = 2;
    let mut h = harness_with(
        config,
        ProviderConfig::new("accounting", format!("{}/authorize", ORIGIN)),
    );

    h.coordinator.initiate_auth_flow();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(h.coordinator.is_connecting());

    assert_eq!(
        next_result(&mut h.results).await,
        FlowResult {
            succeeded: false,
            message: Some(FLOW_TIMEOUT.to_string())
        }
    );
    assert_eq!(h.host.last_popup().unwrap().close_calls(), 1);
}

/// With the deadline disabled an untouched flow stays connecting.
#[tokio::test(start_paused = true)]
async fn test_no_deadline() {
    let mut config = ConnectFlowConfig::default();
    config.flow.max_duration_seconds = 0;
    let mut h = harness_with(
        config,
        ProviderConfig::new("accounting", format!("{}/authorize", ORIGIN)),
    );

    h.coordinator.initiate_auth_flow();
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert!(h.coordinator.is_connecting());
    assert_no_result(&mut h.results);
}

/// Query parameters reach the popup URL.
#[tokio::test(start_paused = true)]
async fn test_popup_url_carries_query() {
    let provider = ProviderConfig::new("accounting", format!("{}/authorize", ORIGIN))
        .with_query("merchant", "m-42");
    let h = harness_with(ConnectFlowConfig::default(), provider);

    h.coordinator.initiate_auth_flow();
    assert_eq!(
        h.host.last_popup().unwrap().url(),
        "https://connect.example.com/authorize?merchant=m-42"
    );
}

/// The stream view sees the same results as direct subscribers.
#[tokio::test(start_paused = true)]
async fn test_results_stream() {
    let h = harness();
    let mut stream = Box::pin(h.coordinator.results());

    h.coordinator.initiate_auth_flow();
    h.coordinator.initiate_auth_flow();
    post(&h, json!({"type": "flow", "status": "cancel"}));

    let first = stream.next().await.unwrap();
    let second = stream.next().await.unwrap();
    assert_eq!(first, FlowResult::rejected());
    assert_eq!(
        second,
        FlowResult {
            succeeded: false,
            message: None
        }
    );
}
