//! # Login and Queue State Snapshots
//!
//! Value types for the node-scoped and consolidated views of ACD login,
//! ring-group login, and dynamic ACD queue membership, plus their wire body
//! encodings. Snapshots are immutable once built; owners replace them whole.
//!
//! ## ACD queue list encoding
//!
//! Nodes report queue membership as a compact list:
//!
//! ```text
//! qlist: [{"q": "5", "p": "3", "t": "1", "f": "2"}]
//!          queue     penalty  type     force-connect policy
//! ```
//!
//! Penalty is clamped to `1..=9`; `t` and `f` are 3-valued codes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use tracing::warn;

use crate::error::{Result, VccError};

pub const MIN_PENALTY: u8 = 1;
pub const MAX_PENALTY: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoginStatus {
    LoggedIn,
    LoggedOut,
    #[default]
    Unknown,
}

impl LoginStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "LoggedOn" | "LoggedIn" => LoginStatus::LoggedIn,
            "LoggedOff" | "LoggedOut" => LoginStatus::LoggedOut,
            _ => LoginStatus::Unknown,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            LoginStatus::LoggedIn => "LoggedOn",
            LoginStatus::LoggedOut => "LoggedOff",
            LoginStatus::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueType {
    Static,
    Dynamic,
    DynamicOn,
}

impl QueueType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(QueueType::Static),
            "1" => Some(QueueType::Dynamic),
            "2" => Some(QueueType::DynamicOn),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            QueueType::Static => "0",
            QueueType::Dynamic => "1",
            QueueType::DynamicOn => "2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForceConnectPolicy {
    Disabled,
    Enabled,
    UseAgentQueueSettings,
}

impl ForceConnectPolicy {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(ForceConnectPolicy::Disabled),
            "1" => Some(ForceConnectPolicy::Enabled),
            "2" => Some(ForceConnectPolicy::UseAgentQueueSettings),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ForceConnectPolicy::Disabled => "0",
            ForceConnectPolicy::Enabled => "1",
            ForceConnectPolicy::UseAgentQueueSettings => "2",
        }
    }
}

/// One ACD queue the agent belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcdQueue {
    pub queue: String,
    /// Routing penalty, always within `1..=9`
    pub penalty: u8,
    pub queue_type: QueueType,
    pub force_connect: ForceConnectPolicy,
}

impl AcdQueue {
    pub fn new(queue: impl Into<String>, penalty: u8, queue_type: QueueType) -> Self {
        Self {
            queue: queue.into(),
            penalty: clamp_penalty(penalty as i64),
            queue_type,
            force_connect: ForceConnectPolicy::UseAgentQueueSettings,
        }
    }
}

/// ACD login state of the agent, per node or consolidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AcdLoginState {
    pub login_status: LoginStatus,
    pub ready: bool,
    pub reason_code: Option<String>,
    pub reason_desc: Option<String>,
    /// Queue identities are unique within the list
    pub queue_list: Vec<AcdQueue>,
}

impl AcdLoginState {
    /// State used whenever a node's view can no longer be trusted
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_logged_in(&self) -> bool {
        self.login_status == LoginStatus::LoggedIn
    }

    /// Build from an ACD status body such as
    /// `{status: "LoggedOn", paused: false, qlist: [...]}`
    pub fn from_body(body: &Value) -> Result<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| VccError::invalid_response("ACD state body is not an object"))?;

        let login_status = obj
            .get("status")
            .and_then(Value::as_str)
            .map(LoginStatus::from_wire)
            .unwrap_or_default();
        let paused = obj.get("paused").and_then(Value::as_bool).unwrap_or(false);
        let queue_list = obj.get("qlist").map(unpack_acd_qlist).unwrap_or_default();

        Ok(Self {
            login_status,
            ready: login_status == LoginStatus::LoggedIn && !paused,
            reason_code: string_field(obj, "reasonCode"),
            reason_desc: string_field(obj, "reasonDesc"),
            queue_list,
        })
    }

    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("status".into(), json!(self.login_status.as_wire()));
        body.insert("paused".into(), json!(!self.ready));
        if let Some(code) = &self.reason_code {
            body.insert("reasonCode".into(), json!(code));
        }
        if let Some(desc) = &self.reason_desc {
            body.insert("reasonDesc".into(), json!(desc));
        }
        body.insert("qlist".into(), pack_acd_qlist(&self.queue_list));
        Value::Object(body)
    }
}

/// Ring-group login state, per node or consolidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RgLoginState {
    pub login_status: LoginStatus,
    pub ring_groups: BTreeSet<String>,
}

impl RgLoginState {
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Build from `{status: "LoggedOn", rgList: ["rg1", ...]}`
    pub fn from_body(body: &Value) -> Result<Self> {
        let obj = body
            .as_object()
            .ok_or_else(|| VccError::invalid_response("ring group body is not an object"))?;
        let login_status = obj
            .get("status")
            .and_then(Value::as_str)
            .map(LoginStatus::from_wire)
            .unwrap_or_default();
        let ring_groups = obj
            .get("rgList")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            login_status,
            ring_groups,
        })
    }
}

/// Lifecycle of an agent's membership in a dynamic queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DynamicQueueStatus {
    AcdLogOn,
    AcdLogOff,
    DynamicAcdLogOn,
    DynamicAcdLogOff,
    DynamicOnAcdLogOn,
    DynamicOnAcdLogOff,
}

impl DynamicQueueStatus {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "ACDLogOn" => Some(Self::AcdLogOn),
            "ACDLogOff" => Some(Self::AcdLogOff),
            "DynamicACDLogOn" => Some(Self::DynamicAcdLogOn),
            "DynamicACDLogOff" => Some(Self::DynamicAcdLogOff),
            "DynamicOnACDLogOn" => Some(Self::DynamicOnAcdLogOn),
            "DynamicOnACDLogOff" => Some(Self::DynamicOnAcdLogOff),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::AcdLogOn => "ACDLogOn",
            Self::AcdLogOff => "ACDLogOff",
            Self::DynamicAcdLogOn => "DynamicACDLogOn",
            Self::DynamicAcdLogOff => "DynamicACDLogOff",
            Self::DynamicOnAcdLogOn => "DynamicOnACDLogOn",
            Self::DynamicOnAcdLogOff => "DynamicOnACDLogOff",
        }
    }

    /// Position in the engagement lattice; a merge keeps the higher rank
    pub fn rank(&self) -> u8 {
        match self {
            Self::AcdLogOff => 0,
            Self::AcdLogOn => 1,
            Self::DynamicAcdLogOff | Self::DynamicOnAcdLogOff => 2,
            Self::DynamicAcdLogOn | Self::DynamicOnAcdLogOn => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queue: String,
    pub status: DynamicQueueStatus,
}

/// Dynamic ACD membership of one agent as seen by a supervisor position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicAcdEntry {
    pub agent: String,
    /// False when a satellite node owns this agent exclusively
    pub manageable: bool,
    pub queue_status_list: Vec<QueueStatus>,
}

impl DynamicAcdEntry {
    /// Parse the `agents` list of a dynamic ACD status body
    ///
    /// Entries without an agent id are skipped, and unknown queue status values
    /// are dropped with a warning.
    pub fn list_from_body(body: &Value) -> Vec<DynamicAcdEntry> {
        let Some(agents) = body.get("agents").and_then(Value::as_array) else {
            return Vec::new();
        };

        agents
            .iter()
            .filter_map(|agent| {
                let id = agent.get("agent").and_then(Value::as_str)?;
                let manageable = agent
                    .get("manageable")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                let queue_status_list = agent
                    .get("qlist")
                    .and_then(Value::as_array)
                    .map(|list| {
                        list.iter()
                            .filter_map(|q| {
                                let queue = scalar_string(q.get("q")?)?;
                                let raw = q.get("s").and_then(Value::as_str)?;
                                match DynamicQueueStatus::from_wire(raw) {
                                    Some(status) => Some(QueueStatus { queue, status }),
                                    None => {
                                        warn!("Unknown dynamic queue status {} for agent {}", raw, id);
                                        None
                                    }
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(DynamicAcdEntry {
                    agent: id.to_string(),
                    manageable,
                    queue_status_list,
                })
            })
            .collect()
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(scalar_string).filter(|s| !s.is_empty())
}

/// Accept both `"3"` and `3` for numeric-looking fields
fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn clamp_penalty(raw: i64) -> u8 {
    raw.clamp(MIN_PENALTY as i64, MAX_PENALTY as i64) as u8
}

/// Decode a node `qlist` into queue entries
///
/// Missing or unparsable penalties clamp into range, unknown type codes fall
/// back to `Static`, unknown policy codes to `UseAgentQueueSettings`. A queue
/// that appears twice keeps its first occurrence.
pub fn unpack_acd_qlist(qlist: &Value) -> Vec<AcdQueue> {
    let Some(items) = qlist.as_array() else {
        return Vec::new();
    };

    let mut out: Vec<AcdQueue> = Vec::with_capacity(items.len());
    for item in items {
        let Some(queue) = item.get("q").and_then(scalar_string) else {
            warn!("Skipping qlist entry without queue id: {}", item);
            continue;
        };
        if out.iter().any(|q| q.queue == queue) {
            continue;
        }

        let penalty = item
            .get("p")
            .and_then(scalar_string)
            .and_then(|p| p.parse::<i64>().ok())
            .map(clamp_penalty)
            .unwrap_or(MIN_PENALTY);
        let queue_type = item
            .get("t")
            .and_then(scalar_string)
            .and_then(|t| QueueType::from_code(&t))
            .unwrap_or(QueueType::Static);
        let force_connect = item
            .get("f")
            .and_then(scalar_string)
            .and_then(|f| ForceConnectPolicy::from_code(&f))
            .unwrap_or(ForceConnectPolicy::UseAgentQueueSettings);

        out.push(AcdQueue {
            queue,
            penalty,
            queue_type,
            force_connect,
        });
    }
    out
}

/// Encode queue entries into the node `qlist` form
pub fn pack_acd_qlist(queues: &[AcdQueue]) -> Value {
    Value::Array(
        queues
            .iter()
            .map(|q| {
                json!({
                    "q": q.queue,
                    "p": clamp_penalty(q.penalty as i64).to_string(),
                    "t": q.queue_type.code(),
                    "f": q.force_connect.code(),
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acd_login_body_example() {
        let body = json!({
            "status": "LoggedOn",
            "paused": false,
            "qlist": [{"q": "5", "p": "3", "t": "1", "f": "2"}]
        });
        let state = AcdLoginState::from_body(&body).unwrap();
        assert_eq!(state.login_status, LoginStatus::LoggedIn);
        assert!(state.ready);
        assert_eq!(
            state.queue_list,
            vec![AcdQueue {
                queue: "5".into(),
                penalty: 3,
                queue_type: QueueType::Dynamic,
                force_connect: ForceConnectPolicy::UseAgentQueueSettings,
            }]
        );
    }

    #[test]
    fn test_paused_agent_is_not_ready() {
        let body = json!({"status": "LoggedOn", "paused": true, "reasonCode": "7", "reasonDesc": "Break"});
        let state = AcdLoginState::from_body(&body).unwrap();
        assert!(!state.ready);
        assert_eq!(state.reason_code.as_deref(), Some("7"));
        assert_eq!(state.reason_desc.as_deref(), Some("Break"));
    }

    #[test]
    fn test_qlist_pack_unpack_preserves_well_formed_lists() {
        let qlist = json!([
            {"q": "5", "p": "3", "t": "1", "f": "2"},
            {"q": "9", "p": "1", "t": "0", "f": "0"},
            {"q": "12", "p": "9", "t": "2", "f": "1"}
        ]);
        assert_eq!(pack_acd_qlist(&unpack_acd_qlist(&qlist)), qlist);
    }

    #[test]
    fn test_qlist_penalty_is_clamped() {
        let queues = unpack_acd_qlist(&json!([
            {"q": "1", "p": "0", "t": "0", "f": "0"},
            {"q": "2", "p": 42, "t": "0", "f": "0"},
            {"q": "3", "t": "0", "f": "0"}
        ]));
        let penalties: Vec<u8> = queues.iter().map(|q| q.penalty).collect();
        assert_eq!(penalties, vec![1, 9, 1]);
    }

    #[test]
    fn test_qlist_duplicate_queue_keeps_first() {
        let queues = unpack_acd_qlist(&json!([
            {"q": "5", "p": "3", "t": "1", "f": "2"},
            {"q": "5", "p": "8", "t": "0", "f": "0"}
        ]));
        assert_eq!(queues.len(), 1);
        assert_eq!(queues[0].penalty, 3);
    }

    #[test]
    fn test_rg_body() {
        let state =
            RgLoginState::from_body(&json!({"status": "LoggedOn", "rgList": ["rg2", "rg1"]}))
                .unwrap();
        assert_eq!(state.login_status, LoginStatus::LoggedIn);
        assert_eq!(
            state.ring_groups.into_iter().collect::<Vec<_>>(),
            vec!["rg1".to_string(), "rg2".to_string()]
        );
    }

    #[test]
    fn test_dynamic_acd_body() {
        let entries = DynamicAcdEntry::list_from_body(&json!({
            "agents": [
                {"agent": "1001", "manageable": false, "qlist": [
                    {"q": "5", "s": "DynamicACDLogOn"},
                    {"q": "6", "s": "Bogus"}
                ]},
                {"manageable": true}
            ]
        }));
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].manageable);
        assert_eq!(entries[0].queue_status_list.len(), 1);
        assert_eq!(
            entries[0].queue_status_list[0].status,
            DynamicQueueStatus::DynamicAcdLogOn
        );
    }
}
