//! Ring-group login verbs

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use super::{position_body, NodeClient};
use crate::error::{Result, VccError};
use crate::multiplexer::RequestSpec;
use crate::state::{LoginStatus, RgLoginState};
use crate::types::PositionContext;
use crate::wire::paths;

impl NodeClient {
    async fn rg_exchange<F>(&self, spec: RequestSpec, on_success: F) -> Result<Arc<RgLoginState>>
    where
        F: FnOnce(&RgLoginState) -> Result<RgLoginState>,
    {
        let path = spec.path.clone();
        let result = match self.call(spec).await {
            Ok(Some(body)) if body.get("status").is_some() => RgLoginState::from_body(&body),
            Ok(_) => on_success(&*self.rg_state().await),
            Err(e) => Err(e),
        };

        match result {
            Ok(state) => Ok(self.set_rg_state(state).await),
            Err(e) => {
                warn!("Node {} {} failed: {}", self.node_id(), path, e);
                self.reset_rg_state().await;
                Err(e)
            }
        }
    }

    pub async fn rg_login(
        &self,
        ctx: &PositionContext,
        ring_groups: &[String],
    ) -> Result<Arc<RgLoginState>> {
        let mut body = position_body(ctx);
        body.insert("rgList".into(), json!(ring_groups));
        self.rg_exchange(
            RequestSpec::post(paths::RG_LOGIN).with_body(Value::Object(body)),
            |current| {
                let mut groups = current.ring_groups.clone();
                groups.extend(ring_groups.iter().cloned());
                Ok(RgLoginState {
                    login_status: LoginStatus::LoggedIn,
                    ring_groups: groups,
                })
            },
        )
        .await
    }

    /// Leave the given ring groups, or all of them when the list is empty
    pub async fn rg_logout(
        &self,
        ctx: &PositionContext,
        ring_groups: &[String],
    ) -> Result<Arc<RgLoginState>> {
        let mut body = position_body(ctx);
        if !ring_groups.is_empty() {
            body.insert("rgList".into(), json!(ring_groups));
        }
        self.rg_exchange(
            RequestSpec::post(paths::RG_LOGOUT).with_body(Value::Object(body)),
            |current| {
                let remaining: BTreeSet<String> = if ring_groups.is_empty() {
                    BTreeSet::new()
                } else {
                    current
                        .ring_groups
                        .iter()
                        .filter(|g| !ring_groups.contains(*g))
                        .cloned()
                        .collect()
                };
                let login_status = if remaining.is_empty() {
                    LoginStatus::LoggedOut
                } else {
                    LoginStatus::LoggedIn
                };
                Ok(RgLoginState {
                    login_status,
                    ring_groups: remaining,
                })
            },
        )
        .await
    }

    pub async fn get_rg_state(&self, ctx: &PositionContext) -> Result<Arc<RgLoginState>> {
        let spec = RequestSpec::get(paths::RG_STATE)
            .with_query(json!({ "agent": ctx.agent_id, "device": ctx.device_id }));
        self.rg_exchange(spec, |_| {
            Err(VccError::invalid_response("ring group state response has no body"))
        })
        .await
    }
}
