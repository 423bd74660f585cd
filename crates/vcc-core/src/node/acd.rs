//! ACD login, readiness and queue verbs

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{position_body, NodeClient};
use crate::error::{Result, VccError};
use crate::multiplexer::RequestSpec;
use crate::state::{
    pack_acd_qlist, AcdLoginState, AcdQueue, DynamicAcdEntry, DynamicQueueStatus, LoginStatus,
    QueueStatus,
};
use crate::types::PositionContext;
use crate::wire::paths;

impl NodeClient {
    /// Run an ACD exchange and store the resulting node snapshot
    ///
    /// A response body carrying a `status` is authoritative. Otherwise
    /// `on_success` derives the new state from the current one. Any failure
    /// resets the snapshot to unknown.
    async fn acd_exchange<F>(&self, spec: RequestSpec, on_success: F) -> Result<Arc<AcdLoginState>>
    where
        F: FnOnce(&AcdLoginState) -> Result<AcdLoginState>,
    {
        let path = spec.path.clone();
        let result = match self.call(spec).await {
            Ok(Some(body)) if body.get("status").is_some() => AcdLoginState::from_body(&body),
            Ok(_) => on_success(&*self.acd_state().await),
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => Ok(self.set_acd_state(state).await),
            Err(e) => {
                warn!("Node {} {} failed: {}", self.node_id(), path, e);
                self.reset_acd_state().await;
                Err(e)
            }
        }
    }

    pub async fn acd_login(
        &self,
        ctx: &PositionContext,
        queues: &[AcdQueue],
    ) -> Result<Arc<AcdLoginState>> {
        let mut body = position_body(ctx);
        if !queues.is_empty() {
            body.insert("qlist".into(), pack_acd_qlist(queues));
        }
        let state = self
            .acd_exchange(
                RequestSpec::post(paths::ACD_LOGIN).with_body(Value::Object(body)),
                |_| {
                    Ok(AcdLoginState {
                        login_status: LoginStatus::LoggedIn,
                        ready: false,
                        reason_code: None,
                        reason_desc: None,
                        queue_list: queues.to_vec(),
                    })
                },
            )
            .await?;
        info!(
            "Agent {} logged in on node {} ({} queues)",
            ctx.agent_id,
            self.node_id(),
            state.queue_list.len()
        );
        Ok(state)
    }

    pub async fn acd_logout(
        &self,
        ctx: &PositionContext,
        reason_code: Option<&str>,
    ) -> Result<Arc<AcdLoginState>> {
        let mut body = position_body(ctx);
        if let Some(code) = reason_code {
            body.insert("reasonCode".into(), json!(code));
        }
        self.acd_exchange(
            RequestSpec::post(paths::ACD_LOGOUT).with_body(Value::Object(body)),
            |_| {
                Ok(AcdLoginState {
                    login_status: LoginStatus::LoggedOut,
                    ..AcdLoginState::default()
                })
            },
        )
        .await
    }

    pub async fn acd_ready(&self, ctx: &PositionContext) -> Result<Arc<AcdLoginState>> {
        self.acd_exchange(
            RequestSpec::post(paths::ACD_READY).with_body(Value::Object(position_body(ctx))),
            |current| {
                Ok(AcdLoginState {
                    ready: true,
                    reason_code: None,
                    reason_desc: None,
                    ..current.clone()
                })
            },
        )
        .await
    }

    pub async fn acd_not_ready(
        &self,
        ctx: &PositionContext,
        reason_code: Option<&str>,
        reason_desc: Option<&str>,
    ) -> Result<Arc<AcdLoginState>> {
        let mut body = position_body(ctx);
        if let Some(code) = reason_code {
            body.insert("reasonCode".into(), json!(code));
        }
        if let Some(desc) = reason_desc {
            body.insert("reasonDesc".into(), json!(desc));
        }
        self.acd_exchange(
            RequestSpec::post(paths::ACD_NOT_READY).with_body(Value::Object(body)),
            |current| {
                Ok(AcdLoginState {
                    ready: false,
                    reason_code: reason_code.map(str::to_string),
                    reason_desc: reason_desc.map(str::to_string),
                    ..current.clone()
                })
            },
        )
        .await
    }

    /// Query the node's view of this agent's ACD state
    pub async fn get_acd_state(&self, ctx: &PositionContext) -> Result<Arc<AcdLoginState>> {
        let spec = RequestSpec::get(paths::ACD_STATE)
            .with_query(json!({ "agent": ctx.agent_id, "device": ctx.device_id }));
        self.acd_exchange(spec, |_| {
            Err(VccError::invalid_response("ACD state response has no body"))
        })
        .await
    }

    /// Log an agent on to a dynamic queue on behalf of a supervisor
    pub async fn queue_acd_log_on(
        &self,
        ctx: &PositionContext,
        agent: &str,
        queue: &str,
    ) -> Result<()> {
        self.queue_op(ctx, paths::QUEUE_ACD_LOG_ON, agent, queue, DynamicQueueStatus::DynamicAcdLogOn)
            .await
    }

    pub async fn queue_acd_log_off(
        &self,
        ctx: &PositionContext,
        agent: &str,
        queue: &str,
    ) -> Result<()> {
        self.queue_op(ctx, paths::QUEUE_ACD_LOG_OFF, agent, queue, DynamicQueueStatus::DynamicAcdLogOff)
            .await
    }

    async fn queue_op(
        &self,
        ctx: &PositionContext,
        path: &str,
        agent: &str,
        queue: &str,
        expected: DynamicQueueStatus,
    ) -> Result<()> {
        let mut body = position_body(ctx);
        body.insert("targetAgent".into(), json!(agent));
        body.insert("q".into(), json!(queue));

        match self
            .call(RequestSpec::post(path).with_body(Value::Object(body)))
            .await
        {
            Ok(Some(body)) if body.get("agents").is_some() => {
                self.apply_dynamic_acd_update(DynamicAcdEntry::list_from_body(&body))
                    .await;
                Ok(())
            }
            Ok(_) => {
                self.record_queue_status(agent, queue, expected).await;
                Ok(())
            }
            Err(e) => {
                warn!(
                    "Node {} {} for agent {} queue {} failed: {}",
                    self.node_id(),
                    path,
                    agent,
                    queue,
                    e
                );
                self.reset_dynamic_acd().await;
                Err(e)
            }
        }
    }

    async fn record_queue_status(&self, agent: &str, queue: &str, status: DynamicQueueStatus) {
        let mut slot = self.dynamic_acd.write().await;
        let mut entry = slot
            .iter()
            .find(|e| e.agent == agent)
            .cloned()
            .unwrap_or_else(|| DynamicAcdEntry {
                agent: agent.to_string(),
                manageable: true,
                queue_status_list: Vec::new(),
            });

        // Keep the family (Dynamic vs DynamicOn) the node reported earlier
        let status = match entry.queue_status_list.iter().find(|q| q.queue == queue) {
            Some(QueueStatus {
                status: DynamicQueueStatus::DynamicOnAcdLogOn | DynamicQueueStatus::DynamicOnAcdLogOff,
                ..
            }) => match status {
                DynamicQueueStatus::DynamicAcdLogOn => DynamicQueueStatus::DynamicOnAcdLogOn,
                DynamicQueueStatus::DynamicAcdLogOff => DynamicQueueStatus::DynamicOnAcdLogOff,
                other => other,
            },
            _ => status,
        };

        entry.queue_status_list.retain(|q| q.queue != queue);
        entry.queue_status_list.push(QueueStatus {
            queue: queue.to_string(),
            status,
        });

        let mut next: Vec<DynamicAcdEntry> =
            slot.iter().filter(|e| e.agent != agent).cloned().collect();
        next.push(entry);
        *slot = Arc::new(next);
    }

    /// Subscribe this supervisor position to dynamic ACD status updates and
    /// store the initial agent list
    pub async fn subscribe_dynamic_acd(
        &self,
        ctx: &PositionContext,
    ) -> Result<Arc<Vec<DynamicAcdEntry>>> {
        let spec = RequestSpec::post(paths::DYNAMIC_ACD_SUBSCRIBE)
            .with_body(Value::Object(position_body(ctx)));
        match self.call(spec).await {
            Ok(body) => {
                let entries = body
                    .as_ref()
                    .map(DynamicAcdEntry::list_from_body)
                    .unwrap_or_default();
                Ok(self.set_dynamic_acd(entries).await)
            }
            Err(e) => {
                warn!("Node {} dynamic ACD subscribe failed: {}", self.node_id(), e);
                self.reset_dynamic_acd().await;
                Err(e)
            }
        }
    }
}
