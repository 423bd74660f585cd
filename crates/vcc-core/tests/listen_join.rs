//! Listen & Join across several nodes

mod common;

use common::*;
use rvoip_vcc_core::error::DomainError;
use rvoip_vcc_core::events::{Notification, NotificationKind};
use rvoip_vcc_core::listen_join::{
    ListenJoinMode, ListenJoinResult, MonitorOutcome, NodeSubscribeOutcome, SubscriptionState,
    MODE_SWITCH_CONTENT_TYPE,
};
use rvoip_vcc_core::wire::paths;
use rvoip_vcc_core::NodeId;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_partial_subscribe_reports_limited_nodes() {
    let mut h = Harness::new(&[1, 2, 3]);
    h.bring_up(1, default_script()).await;
    h.bring_down(2).await;
    h.bring_up(3, reply_on(paths::LISTEN_JOIN_SUBSCRIBE, Reply::Silent))
        .await;

    let outcome = h
        .registry
        .monitor()
        .monitor(ListenJoinMode::Listen, "2001")
        .await
        .unwrap();

    let MonitorOutcome::Started(report) = outcome else {
        panic!("expected a fresh start, got {:?}", outcome);
    };
    assert_eq!(report.result, ListenJoinResult::SuccessLimitedNodes);
    assert_eq!(report.nodes[&NodeId(1)], NodeSubscribeOutcome::Subscribed);
    assert_eq!(report.nodes[&NodeId(2)], NodeSubscribeOutcome::SkipNodeIsDown);
    assert_eq!(report.nodes[&NodeId(3)], NodeSubscribeOutcome::Timeout);

    let states = h.registry.monitor().subscription_states();
    assert_eq!(states[&NodeId(1)], SubscriptionState::Subscribed);
    assert_eq!(states[&NodeId(2)], SubscriptionState::Unsubscribed);
    assert_eq!(states[&NodeId(3)], SubscriptionState::Unsubscribed);
    assert_eq!(h.registry.monitor().mode().await, ListenJoinMode::Listen);

    // The timed out node gets a best-effort unsubscribe
    let fake3 = h.fake(3);
    assert!(
        eventually(|| async move { !fake3.requests_to(paths::LISTEN_JOIN_UNSUBSCRIBE).is_empty() })
            .await
    );
}

#[tokio::test]
async fn test_all_nodes_report_monitored_elsewhere() {
    let mut h = Harness::new(&[1, 2]);
    let busy = || {
        reply_on(
            paths::LISTEN_JOIN_SUBSCRIBE,
            Reply::Status(406, "Not Acceptable"),
        )
    };
    h.bring_up(1, busy()).await;
    h.bring_up(2, busy()).await;
    let mut changes = h.registry.bus().subscribe(NotificationKind::ListenJoinChanged);

    let outcome = h
        .registry
        .monitor()
        .monitor(ListenJoinMode::Join, "2001")
        .await
        .unwrap();

    let MonitorOutcome::Started(report) = outcome else {
        panic!("expected a fresh start");
    };
    assert_eq!(
        report.result,
        ListenJoinResult::ErrorPositionIsBeingMonitoredByAnotherPosition
    );
    assert_eq!(h.registry.monitor().mode().await, ListenJoinMode::Off);
    assert_eq!(h.registry.monitor().target().await, None);

    match changes.recv().await.unwrap() {
        Notification::ListenJoinChanged { mode, result, .. } => {
            assert_eq!(mode, ListenJoinMode::Off);
            assert_eq!(
                result,
                Some(ListenJoinResult::ErrorPositionIsBeingMonitoredByAnotherPosition)
            );
        }
        other => panic!("unexpected notification {:?}", other),
    }
}

#[tokio::test]
async fn test_mode_switch_in_call_sends_info() {
    let mut h = Harness::new(&[1]);
    h.bring_up(1, default_script()).await;
    let monitor = h.registry.monitor();

    monitor.monitor(ListenJoinMode::Listen, "2001").await.unwrap();
    monitor.set_active_call(NodeId(1), "sess-9").await;

    let outcome = monitor.monitor(ListenJoinMode::Whisper, "2001").await.unwrap();
    assert_eq!(outcome, MonitorOutcome::ModeSwitched { in_call: true });
    assert_eq!(monitor.mode().await, ListenJoinMode::Whisper);

    let infos = h.sessions.infos();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].0, "sess-9");
    assert_eq!(infos[0].2, MODE_SWITCH_CONTENT_TYPE);
    assert!(infos[0].3.contains("whisper"));

    // Only one subscribe went out; the switch did not resubscribe
    assert_eq!(h.fake(1).requests_to(paths::LISTEN_JOIN_SUBSCRIBE).len(), 1);
}

#[tokio::test]
async fn test_involuntary_termination_resubscribes() {
    let mut h = Harness::new(&[1, 2]);
    h.bring_up(1, default_script()).await;
    h.bring_up(2, default_script()).await;
    let monitor = h.registry.monitor();

    monitor.monitor(ListenJoinMode::Listen, "2001").await.unwrap();
    monitor.set_active_call(NodeId(1), "sess-1").await;

    h.fake(1)
        .emit(paths::EV_LISTEN_JOIN_TERMINATED, json!({"target": "2001"}))
        .await;

    let fake1 = h.fake(1);
    assert!(
        eventually(|| async move { fake1.requests_to(paths::LISTEN_JOIN_SUBSCRIBE).len() == 2 }).await
    );
    assert!(
        eventually(|| async move {
            monitor.subscription_state(NodeId(1)) == SubscriptionState::Subscribed
        })
        .await
    );
    assert_eq!(fake1.requests_to(paths::LISTEN_JOIN_UNSUBSCRIBE).len(), 1);
    assert_eq!(h.sessions.hangups(), vec![("sess-1".to_string(), NodeId(1))]);
    assert!(monitor.active_call().await.is_none());

    // The other node was never touched
    assert_eq!(h.fake(2).requests_to(paths::LISTEN_JOIN_SUBSCRIBE).len(), 1);
    assert_eq!(monitor.subscription_state(NodeId(2)), SubscriptionState::Subscribed);
}

#[tokio::test]
async fn test_cancel_unsubscribes_everywhere() {
    let mut h = Harness::new(&[1, 2]);
    h.bring_up(1, default_script()).await;
    h.bring_up(2, default_script()).await;
    let monitor = h.registry.monitor();

    monitor.monitor(ListenJoinMode::Listen, "2001").await.unwrap();
    let outcome = monitor.monitor(ListenJoinMode::Off, "2001").await.unwrap();
    assert_eq!(outcome, MonitorOutcome::Stopped);

    for id in [1, 2] {
        assert_eq!(h.fake(id).requests_to(paths::LISTEN_JOIN_UNSUBSCRIBE).len(), 1);
        assert_eq!(monitor.subscription_state(NodeId(id)), SubscriptionState::Unsubscribed);
    }
    assert_eq!(monitor.mode().await, ListenJoinMode::Off);
}

fn targets(fake: &FakeNode, path: &str) -> Vec<String> {
    fake.requests_to(path)
        .iter()
        .filter_map(|r| r.body.as_ref()?["target"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_retarget_moves_every_node_to_new_target() {
    let mut h = Harness::new(&[1, 2]);
    h.bring_up(1, default_script()).await;
    h.bring_up(2, default_script()).await;
    let monitor = h.registry.monitor();

    monitor.monitor(ListenJoinMode::Listen, "2001").await.unwrap();
    let outcome = monitor.monitor(ListenJoinMode::Listen, "2002").await.unwrap();

    let MonitorOutcome::Started(report) = outcome else {
        panic!("expected a fresh start, got {:?}", outcome);
    };
    assert_eq!(report.result, ListenJoinResult::Success);
    assert_eq!(monitor.target().await.as_deref(), Some("2002"));
    assert_eq!(monitor.mode().await, ListenJoinMode::Listen);

    for id in [1, 2] {
        let fake = h.fake(id);
        assert_eq!(targets(fake, paths::LISTEN_JOIN_SUBSCRIBE), vec!["2001", "2002"]);
        assert_eq!(targets(fake, paths::LISTEN_JOIN_UNSUBSCRIBE), vec!["2001"]);
        assert_eq!(monitor.subscription_state(NodeId(id)), SubscriptionState::Subscribed);
    }
}

#[tokio::test]
async fn test_mode_switch_without_call_stays_local() {
    let mut h = Harness::new(&[1]);
    h.bring_up(1, default_script()).await;
    let monitor = h.registry.monitor();

    monitor.monitor(ListenJoinMode::Listen, "2001").await.unwrap();
    let sent_before = h.fake(1).paths().len();

    let outcome = monitor.monitor(ListenJoinMode::Join, "2001").await.unwrap();
    assert_eq!(outcome, MonitorOutcome::ModeSwitched { in_call: false });
    assert_eq!(monitor.mode().await, ListenJoinMode::Join);
    assert_eq!(monitor.subscription_state(NodeId(1)), SubscriptionState::Subscribed);

    assert_eq!(h.fake(1).paths().len(), sent_before);
    assert!(h.sessions.infos().is_empty());
}

#[tokio::test]
async fn test_reconnect_resubscribes_only_that_node() {
    let mut h = Harness::new(&[1, 2]);
    h.bring_up(1, default_script()).await;
    h.bring_up(2, default_script()).await;
    let monitor = Arc::clone(h.registry.monitor());
    monitor.monitor(ListenJoinMode::Listen, "2001").await.unwrap();

    h.fake(1).close("link lost").await;
    let m = &monitor;
    assert!(
        eventually(|| async move {
            m.subscription_state(NodeId(1)) == SubscriptionState::Unsubscribed
        })
        .await
    );
    assert_eq!(monitor.subscription_state(NodeId(2)), SubscriptionState::Subscribed);

    // Keep-alive comes back with the new connection
    h.connect(1, default_script()).await;

    assert_eq!(monitor.subscription_state(NodeId(1)), SubscriptionState::Subscribed);
    assert_eq!(targets(h.fake(1), paths::LISTEN_JOIN_SUBSCRIBE), vec!["2001"]);

    let fake2 = h.fake(2);
    assert_eq!(fake2.requests_to(paths::LISTEN_JOIN_SUBSCRIBE).len(), 1);
    assert!(fake2.requests_to(paths::LISTEN_JOIN_UNSUBSCRIBE).is_empty());
    assert_eq!(monitor.subscription_state(NodeId(2)), SubscriptionState::Subscribed);
}

#[tokio::test]
async fn test_all_nodes_reject_bad_target() {
    let mut h = Harness::new(&[1, 2]);
    let conflict = || reply_on(paths::LISTEN_JOIN_SUBSCRIBE, Reply::Status(409, "Conflict"));
    h.bring_up(1, conflict()).await;
    h.bring_up(2, conflict()).await;
    let monitor = h.registry.monitor();

    let outcome = monitor.monitor(ListenJoinMode::Join, "9999").await.unwrap();

    let MonitorOutcome::Started(report) = outcome else {
        panic!("expected a fresh start, got {:?}", outcome);
    };
    assert_eq!(report.result, ListenJoinResult::ErrorBadTarget);
    assert_eq!(
        report.nodes[&NodeId(1)],
        NodeSubscribeOutcome::Rejected(DomainError::BadTarget)
    );
    assert_eq!(monitor.mode().await, ListenJoinMode::Off);
    assert_eq!(monitor.target().await, None);
    for id in [1, 2] {
        assert_eq!(monitor.subscription_state(NodeId(id)), SubscriptionState::Unsubscribed);
    }
}
