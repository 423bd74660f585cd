//! NENA i3 queue and service state
//!
//! Nodes expose the standardized i3 availability states of PSAP queues and
//! services. An operator may override the computed state; clearing the
//! override hands control back to the node.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use super::{position_body, NodeClient};
use crate::error::{Result, VccError};
use crate::multiplexer::RequestSpec;
use crate::types::PositionContext;
use crate::wire::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NenaQueueState {
    Active,
    Inactive,
    Disabled,
    Full,
    Standby,
}

impl std::str::FromStr for NenaQueueState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Active" | "active" => Ok(NenaQueueState::Active),
            "Inactive" | "inactive" => Ok(NenaQueueState::Inactive),
            "Disabled" | "disabled" => Ok(NenaQueueState::Disabled),
            "Full" | "full" => Ok(NenaQueueState::Full),
            "Standby" | "standby" => Ok(NenaQueueState::Standby),
            _ => Err(format!("Unknown NENA queue state: {}", s)),
        }
    }
}

impl fmt::Display for NenaQueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NenaQueueState::Active => "Active",
            NenaQueueState::Inactive => "Inactive",
            NenaQueueState::Disabled => "Disabled",
            NenaQueueState::Full => "Full",
            NenaQueueState::Standby => "Standby",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NenaServiceState {
    Normal,
    Unmanned,
    ScheduledMaintenanceDown,
    ScheduledMaintenanceAvailable,
    MajorIncidentInProgress,
    Partial,
    Overloaded,
    GoingDown,
    Down,
}

impl std::str::FromStr for NenaServiceState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Normal" => Ok(NenaServiceState::Normal),
            "Unmanned" => Ok(NenaServiceState::Unmanned),
            "ScheduledMaintenanceDown" => Ok(NenaServiceState::ScheduledMaintenanceDown),
            "ScheduledMaintenanceAvailable" => Ok(NenaServiceState::ScheduledMaintenanceAvailable),
            "MajorIncidentInProgress" => Ok(NenaServiceState::MajorIncidentInProgress),
            "Partial" => Ok(NenaServiceState::Partial),
            "Overloaded" => Ok(NenaServiceState::Overloaded),
            "GoingDown" => Ok(NenaServiceState::GoingDown),
            "Down" => Ok(NenaServiceState::Down),
            _ => Err(format!("Unknown NENA service state: {}", s)),
        }
    }
}

impl fmt::Display for NenaServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// State of one NENA queue as reported by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NenaQueueStatus {
    pub queue: String,
    pub state: NenaQueueState,
    /// An operator override is in force
    pub overridden: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NenaServiceStatus {
    pub service: String,
    pub state: NenaServiceState,
    pub overridden: bool,
    pub reason: Option<String>,
}

/// Pull `(id, state, overridden, reason)` out of a NENA body
fn parse_common<S: std::str::FromStr>(
    body: &Value,
    id_key: &str,
) -> Option<(String, S, bool, Option<String>)> {
    let id = body.get(id_key).and_then(Value::as_str)?.to_string();
    let state = body.get("state").and_then(Value::as_str)?.parse().ok()?;
    let overridden = body.get("override").and_then(Value::as_bool).unwrap_or(false);
    let reason = body
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some((id, state, overridden, reason))
}

impl NenaQueueStatus {
    pub fn from_body(body: &Value) -> Option<Self> {
        parse_common(body, "queue").map(|(queue, state, overridden, reason)| Self {
            queue,
            state,
            overridden,
            reason,
        })
    }
}

impl NenaServiceStatus {
    pub fn from_body(body: &Value) -> Option<Self> {
        parse_common(body, "service").map(|(service, state, overridden, reason)| Self {
            service,
            state,
            overridden,
            reason,
        })
    }
}

impl NodeClient {
    pub async fn get_nena_queue_state(
        &self,
        ctx: &PositionContext,
        queue: &str,
    ) -> Result<NenaQueueStatus> {
        let spec = RequestSpec::get(paths::NENA_QUEUE_STATE)
            .with_query(json!({ "queue": queue, "position": ctx.position_id }));
        let body = self.call(spec).await?.unwrap_or(Value::Null);
        NenaQueueStatus::from_body(&body)
            .ok_or_else(|| VccError::invalid_response(format!("bad NENA queue state for {}", queue)))
    }

    pub async fn set_nena_queue_state_override(
        &self,
        ctx: &PositionContext,
        queue: &str,
        state: NenaQueueState,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut body = position_body(ctx);
        body.insert("queue".into(), json!(queue));
        body.insert("state".into(), json!(state.to_string()));
        if let Some(reason) = reason {
            body.insert("reason".into(), json!(reason));
        }
        self.call(RequestSpec::put(paths::NENA_QUEUE_STATE_OVERRIDE).with_body(Value::Object(body)))
            .await
            .map(drop)
    }

    pub async fn clear_nena_queue_state_override(
        &self,
        ctx: &PositionContext,
        queue: &str,
    ) -> Result<()> {
        let mut body = position_body(ctx);
        body.insert("queue".into(), json!(queue));
        self.call(
            RequestSpec::delete(paths::NENA_QUEUE_STATE_OVERRIDE).with_body(Value::Object(body)),
        )
        .await
        .map(drop)
    }

    pub async fn get_nena_service_state(
        &self,
        ctx: &PositionContext,
        service: &str,
    ) -> Result<NenaServiceStatus> {
        let spec = RequestSpec::get(paths::NENA_SERVICE_STATE)
            .with_query(json!({ "service": service, "position": ctx.position_id }));
        let body = self.call(spec).await?.unwrap_or(Value::Null);
        NenaServiceStatus::from_body(&body).ok_or_else(|| {
            VccError::invalid_response(format!("bad NENA service state for {}", service))
        })
    }

    pub async fn set_nena_service_state_override(
        &self,
        ctx: &PositionContext,
        service: &str,
        state: NenaServiceState,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut body = position_body(ctx);
        body.insert("service".into(), json!(service));
        body.insert("state".into(), json!(state.to_string()));
        if let Some(reason) = reason {
            body.insert("reason".into(), json!(reason));
        }
        self.call(
            RequestSpec::put(paths::NENA_SERVICE_STATE_OVERRIDE).with_body(Value::Object(body)),
        )
        .await
        .map(drop)
    }

    pub async fn clear_nena_service_state_override(
        &self,
        ctx: &PositionContext,
        service: &str,
    ) -> Result<()> {
        let mut body = position_body(ctx);
        body.insert("service".into(), json!(service));
        self.call(
            RequestSpec::delete(paths::NENA_SERVICE_STATE_OVERRIDE).with_body(Value::Object(body)),
        )
        .await
        .map(drop)
    }
}
