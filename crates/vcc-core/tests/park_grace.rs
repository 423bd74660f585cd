//! Release-for-park grace timing

mod common;

use async_trait::async_trait;
use common::*;
use rvoip_vcc_core::call_registry::{CallKey, CallRegistry, CallState, InMemoryCallRegistry};
use rvoip_vcc_core::events::{Notification, NotificationBus, NotificationKind};
use rvoip_vcc_core::router::{ClusterControl, EventRouter, RouteOutcome};
use rvoip_vcc_core::state::{AcdLoginState, DynamicAcdEntry, RgLoginState};
use rvoip_vcc_core::wire::{paths, Event};
use rvoip_vcc_core::{NodeId, NodeLiveness};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct NoCluster;

#[async_trait]
impl ClusterControl for NoCluster {
    async fn node_liveness_changed(&self, _node: NodeId, _liveness: NodeLiveness) {}
    async fn acd_state_reported(&self, _node: NodeId, _state: AcdLoginState, _forced: bool) {}
    async fn rg_state_reported(&self, _node: NodeId, _state: RgLoginState) {}
    async fn dynamic_acd_reported(&self, _node: NodeId, _entries: Vec<DynamicAcdEntry>) {}
    async fn listen_join_terminated(&self, _node: NodeId) {}
}

const GRACE: Duration = Duration::from_secs(2);

struct Setup {
    router: EventRouter,
    calls: Arc<InMemoryCallRegistry>,
    bus: Arc<NotificationBus>,
}

fn setup() -> Setup {
    let calls = Arc::new(InMemoryCallRegistry::new());
    let bus = Arc::new(NotificationBus::new());
    let router = EventRouter::new(context(), calls.clone(), Arc::clone(&bus), GRACE);
    Setup { router, calls, bus }
}

impl Setup {
    async fn route(&self, path: &str, body: Value) -> RouteOutcome {
        let event = Event {
            path: path.to_string(),
            query: None,
            body: Some(body),
        };
        self.router.route(NodeId(1), &event, &NoCluster).await
    }

    async fn state_of(&self, ucid: &str) -> Option<CallState> {
        self.calls
            .find(&CallKey::UniqueCallId(ucid.to_string()))
            .await
            .map(|c| c.state)
    }

    /// Connect a call on this device and release it for park
    async fn connected_then_released(&self, ucid: &str) {
        self.route(
            paths::EV_SHARED_LINE_CONNECT,
            json!({"ucid": ucid, "device": DEVICE}),
        )
        .await;
        assert_eq!(self.state_of(ucid).await, Some(CallState::Connected));

        let outcome = self
            .route(
                paths::EV_SHARED_LINE_RELEASE,
                json!({"ucid": ucid, "releasedForPark": true}),
            )
            .await;
        assert_eq!(outcome, RouteOutcome::Handled);
    }
}

#[tokio::test(start_paused = true)]
async fn test_release_without_park_event_finishes_after_grace() {
    let s = setup();
    s.connected_then_released("u1").await;
    assert_eq!(s.router.pending_park_graces(), 1);

    tokio::time::sleep(GRACE - Duration::from_millis(100)).await;
    assert_eq!(s.calls.active_count(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(s.calls.active_count(), 0);
    assert_eq!(s.router.pending_park_graces(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_park_event_in_time_keeps_call() {
    let s = setup();
    s.connected_then_released("u2").await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(s.route(paths::EV_PARK, json!({"ucid": "u2"})).await, RouteOutcome::Handled);
    assert_eq!(s.router.pending_park_graces(), 0);

    tokio::time::sleep(GRACE * 2).await;
    assert_eq!(s.state_of("u2").await, Some(CallState::Parked));

    // A late release of an already parked call changes nothing
    let outcome = s
        .route(paths::EV_SHARED_LINE_RELEASE, json!({"ucid": "u2"}))
        .await;
    assert_eq!(outcome, RouteOutcome::Ignored("call already parked"));
    assert_eq!(s.state_of("u2").await, Some(CallState::Parked));
}

#[tokio::test(start_paused = true)]
async fn test_abandon_during_grace_finishes_immediately() {
    let s = setup();
    s.connected_then_released("u3").await;

    assert_eq!(
        s.route(paths::EV_ABANDONED, json!({"ucid": "u3"})).await,
        RouteOutcome::Handled
    );
    assert_eq!(s.calls.active_count(), 0);
    assert_eq!(s.router.pending_park_graces(), 0);

    // The expired timer finds nothing to finish
    tokio::time::sleep(GRACE * 2).await;
    assert_eq!(s.calls.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_release_restarts_grace() {
    let s = setup();
    s.connected_then_released("u4").await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    s.route(
        paths::EV_SHARED_LINE_RELEASE,
        json!({"ucid": "u4", "releasedForPark": true}),
    )
    .await;

    // The first timer expires without effect
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(s.calls.active_count(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(s.calls.active_count(), 0);
}

#[tokio::test]
async fn test_reoffer_to_other_device_marks_busy() {
    let s = setup();
    s.route(paths::EV_PARK, json!({"ucid": "u5", "device": DEVICE})).await;
    assert_eq!(s.state_of("u5").await, Some(CallState::Parked));
    let mut reoffers = s.bus.subscribe(NotificationKind::ParkReoffer);

    s.route(
        paths::EV_PARK_TIMEOUT,
        json!({"ucid": "u5", "type": "ReofferDevice", "device": DEVICE}),
    )
    .await;
    assert!(matches!(
        reoffers.try_recv(),
        Ok(Notification::ParkReoffer { route: None, .. })
    ));

    s.route(
        paths::EV_PARK_TIMEOUT,
        json!({"ucid": "u5", "type": "ReofferDevice", "device": "SIP/3999"}),
    )
    .await;
    assert_eq!(s.state_of("u5").await, Some(CallState::Busy));

    // Park timeouts only apply to parked calls
    let outcome = s
        .route(paths::EV_PARK_TIMEOUT, json!({"ucid": "u5", "type": "TimeoutReached"}))
        .await;
    assert_eq!(outcome, RouteOutcome::Ignored("call not parked"));
}
