//! # Cross-Node Consolidation
//!
//! Pure folds that turn N per-node snapshots into one effective view. None of
//! these functions touch shared state; the registry calls them after any
//! node-scoped state changes and publishes the result as a single replace.
//!
//! ## Merge rules
//!
//! | State            | Status                               | Collections                     |
//! |------------------|--------------------------------------|---------------------------------|
//! | ACD login        | LoggedIn > LoggedOut > Unknown       | queue union, first occurrence wins |
//! | Ring-group login | LoggedIn > LoggedOut > Unknown       | ring-group set union            |
//! | Dynamic ACD      | per agent, latest `manageable` wins  | queue status by engagement rank |
//! | Operation status | Ok if any Ok, else first non-Error   |                                 |

use std::collections::BTreeSet;

use crate::error::{DomainError, VccError};
use crate::state::{
    AcdLoginState, AcdQueue, DynamicAcdEntry, LoginStatus, QueueStatus, RgLoginState,
};

/// Outcome of one node's part in a fan-out operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpStatus {
    Ok,
    Rejected(DomainError),
    Timeout,
    NotConnected,
    Error,
}

impl OpStatus {
    pub fn from_result<T>(result: &Result<T, VccError>) -> Self {
        match result {
            Ok(_) => OpStatus::Ok,
            Err(VccError::Domain(e)) => OpStatus::Rejected(e.clone()),
            Err(VccError::Timeout { .. }) => OpStatus::Timeout,
            Err(VccError::ConnectionLost(_))
            | Err(VccError::SendFailed { .. })
            | Err(VccError::NodeUnavailable(_)) => OpStatus::NotConnected,
            Err(_) => OpStatus::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, OpStatus::Ok)
    }
}

/// `Ok` if any node succeeded, otherwise the first status that is not a plain
/// `Error`, defaulting to `Error`
pub fn consolidate_op_status(statuses: &[OpStatus]) -> OpStatus {
    if statuses.iter().any(OpStatus::is_ok) {
        return OpStatus::Ok;
    }
    statuses
        .iter()
        .find(|s| !matches!(s, OpStatus::Error))
        .cloned()
        .unwrap_or(OpStatus::Error)
}

fn consolidate_status<'a>(statuses: impl Iterator<Item = &'a LoginStatus>) -> LoginStatus {
    let mut result = LoginStatus::Unknown;
    for status in statuses {
        match status {
            LoginStatus::LoggedIn => return LoginStatus::LoggedIn,
            LoginStatus::LoggedOut => result = LoginStatus::LoggedOut,
            LoginStatus::Unknown => {}
        }
    }
    result
}

/// Fold per-node ACD login snapshots into the effective login state
///
/// `ready` is OR'd across LoggedIn nodes. The reason fields come from the
/// first node holding the winning status, so a single snapshot consolidates
/// to itself.
pub fn consolidate_acd(states: &[AcdLoginState]) -> AcdLoginState {
    let login_status = consolidate_status(states.iter().map(|s| &s.login_status));

    let representative = states
        .iter()
        .find(|s| s.login_status == login_status)
        .or_else(|| states.first());

    let ready = match login_status {
        LoginStatus::LoggedIn => states
            .iter()
            .filter(|s| s.login_status == LoginStatus::LoggedIn)
            .any(|s| s.ready),
        _ => representative.map(|s| s.ready).unwrap_or(false),
    };

    let mut queue_list: Vec<AcdQueue> = Vec::new();
    for queue in states.iter().flat_map(|s| s.queue_list.iter()) {
        if !queue_list.iter().any(|q| q.queue == queue.queue) {
            queue_list.push(queue.clone());
        }
    }

    AcdLoginState {
        login_status,
        ready,
        reason_code: representative.and_then(|s| s.reason_code.clone()),
        reason_desc: representative.and_then(|s| s.reason_desc.clone()),
        queue_list,
    }
}

pub fn consolidate_rg(states: &[RgLoginState]) -> RgLoginState {
    let ring_groups: BTreeSet<String> = states
        .iter()
        .flat_map(|s| s.ring_groups.iter().cloned())
        .collect();
    RgLoginState {
        login_status: consolidate_status(states.iter().map(|s| &s.login_status)),
        ring_groups,
    }
}

/// Merge one node's dynamic ACD entries into a consolidated list
///
/// Agents are matched by id. `manageable` takes the update's value; each
/// queue keeps whichever status ranks higher, so a LogOn never gets
/// downgraded by a LogOff seen elsewhere.
pub fn merge_dynamic_acd_update(
    consolidated: &[DynamicAcdEntry],
    update: &[DynamicAcdEntry],
) -> Vec<DynamicAcdEntry> {
    let mut merged = consolidated.to_vec();

    for incoming in update {
        let Some(existing) = merged.iter_mut().find(|e| e.agent == incoming.agent) else {
            merged.push(incoming.clone());
            continue;
        };

        existing.manageable = incoming.manageable;
        for qs in &incoming.queue_status_list {
            match existing
                .queue_status_list
                .iter_mut()
                .find(|e| e.queue == qs.queue)
            {
                Some(current) if qs.status.rank() > current.status.rank() => {
                    current.status = qs.status;
                }
                Some(_) => {}
                None => existing.queue_status_list.push(QueueStatus {
                    queue: qs.queue.clone(),
                    status: qs.status,
                }),
            }
        }
    }

    merged
}

/// Fold every node's dynamic ACD view, in node order
pub fn consolidate_dynamic_acd(per_node: &[Vec<DynamicAcdEntry>]) -> Vec<DynamicAcdEntry> {
    per_node
        .iter()
        .fold(Vec::new(), |acc, node| merge_dynamic_acd_update(&acc, node))
}
