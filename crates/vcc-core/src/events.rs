//! # Typed Notification Bus
//!
//! Status changes for the operator UI are published as [`Notification`]
//! values. Each [`NotificationKind`] gets its own broadcast channel, created
//! on first use, so a subscriber only ever sees the kind it asked for.
//!
//! ```
//! use rvoip_vcc_core::events::{Notification, NotificationBus, NotificationKind};
//! use rvoip_vcc_core::types::{KeepAlive, NodeId};
//!
//! let bus = NotificationBus::new();
//! let mut rx = bus.subscribe(NotificationKind::KeepAliveChanged);
//! bus.publish(Notification::KeepAliveChanged { node: NodeId(1), keep_alive: KeepAlive::Up });
//! assert!(matches!(rx.try_recv(), Ok(Notification::KeepAliveChanged { .. })));
//! ```

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::call_registry::CallId;
use crate::listen_join::{ListenJoinMode, ListenJoinResult};
use crate::node::nena::{NenaQueueStatus, NenaServiceStatus};
use crate::state::{AcdLoginState, DynamicAcdEntry, RgLoginState};
use crate::types::{KeepAlive, NodeId, NodeLiveness};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    AcdStateChanged,
    RgStateChanged,
    DynamicAcdChanged,
    NodeLivenessChanged,
    KeepAliveChanged,
    CallTerminatedByNodeDown,
    ParkReoffer,
    ParkTimeoutWarning,
    ParkTimeoutReached,
    NenaQueueStateChanged,
    NenaServiceStateChanged,
    ListenJoinChanged,
}

#[derive(Debug, Clone)]
pub enum Notification {
    /// Consolidated ACD login state changed
    AcdStateChanged(Arc<AcdLoginState>),
    RgStateChanged(Arc<RgLoginState>),
    DynamicAcdChanged(Arc<Vec<DynamicAcdEntry>>),
    NodeLivenessChanged {
        node: NodeId,
        liveness: NodeLiveness,
    },
    KeepAliveChanged {
        node: NodeId,
        keep_alive: KeepAlive,
    },
    CallTerminatedByNodeDown {
        node: NodeId,
        call: CallId,
    },
    /// A parked call is being offered back to this position
    ParkReoffer {
        call: CallId,
        route: Option<String>,
    },
    ParkTimeoutWarning {
        call: CallId,
    },
    ParkTimeoutReached {
        call: CallId,
    },
    NenaQueueStateChanged {
        node: NodeId,
        status: NenaQueueStatus,
    },
    NenaServiceStateChanged {
        node: NodeId,
        status: NenaServiceStatus,
    },
    ListenJoinChanged {
        mode: ListenJoinMode,
        target: Option<String>,
        result: Option<ListenJoinResult>,
    },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::AcdStateChanged(_) => NotificationKind::AcdStateChanged,
            Notification::RgStateChanged(_) => NotificationKind::RgStateChanged,
            Notification::DynamicAcdChanged(_) => NotificationKind::DynamicAcdChanged,
            Notification::NodeLivenessChanged { .. } => NotificationKind::NodeLivenessChanged,
            Notification::KeepAliveChanged { .. } => NotificationKind::KeepAliveChanged,
            Notification::CallTerminatedByNodeDown { .. } => {
                NotificationKind::CallTerminatedByNodeDown
            }
            Notification::ParkReoffer { .. } => NotificationKind::ParkReoffer,
            Notification::ParkTimeoutWarning { .. } => NotificationKind::ParkTimeoutWarning,
            Notification::ParkTimeoutReached { .. } => NotificationKind::ParkTimeoutReached,
            Notification::NenaQueueStateChanged { .. } => NotificationKind::NenaQueueStateChanged,
            Notification::NenaServiceStateChanged { .. } => {
                NotificationKind::NenaServiceStateChanged
            }
            Notification::ListenJoinChanged { .. } => NotificationKind::ListenJoinChanged,
        }
    }
}

/// One broadcast channel per notification kind
pub struct NotificationBus {
    channels: DashMap<NotificationKind, broadcast::Sender<Notification>>,
    capacity: usize,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, kind: NotificationKind) -> broadcast::Sender<Notification> {
        self.channels
            .entry(kind)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, kind: NotificationKind) -> broadcast::Receiver<Notification> {
        self.sender(kind).subscribe()
    }

    /// Publish to subscribers of the notification's kind; returns how many
    /// receivers got it
    pub fn publish(&self, notification: Notification) -> usize {
        let kind = notification.kind();
        match self.sender(kind).send(notification) {
            Ok(n) => n,
            Err(_) => {
                trace!("No subscribers for {:?}", kind);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_only_see_their_kind() {
        let bus = NotificationBus::new();
        let mut keep_alive = bus.subscribe(NotificationKind::KeepAliveChanged);
        let mut liveness = bus.subscribe(NotificationKind::NodeLivenessChanged);

        bus.publish(Notification::NodeLivenessChanged {
            node: NodeId(2),
            liveness: NodeLiveness::Down,
        });

        assert!(keep_alive.try_recv().is_err());
        match liveness.recv().await.unwrap() {
            Notification::NodeLivenessChanged { node, liveness } => {
                assert_eq!(node, NodeId(2));
                assert_eq!(liveness, NodeLiveness::Down);
            }
            other => panic!("unexpected notification {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = NotificationBus::new();
        assert_eq!(
            bus.publish(Notification::ParkTimeoutWarning { call: CallId::new() }),
            0
        );
    }
}
