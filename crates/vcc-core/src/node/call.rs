//! Call and conference verbs
//!
//! These never touch login state; failures are returned as-is.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{position_body, NodeClient};
use crate::error::{Result, VccError};
use crate::multiplexer::RequestSpec;
use crate::types::PositionContext;
use crate::wire::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    /// Hand the call over without talking to the destination first
    Blind,
    /// Consult the destination, then complete
    Attended,
}

impl TransferMode {
    fn as_wire(&self) -> &'static str {
        match self {
            TransferMode::Blind => "blind",
            TransferMode::Attended => "attended",
        }
    }
}

impl NodeClient {
    async fn call_verb(
        &self,
        ctx: &PositionContext,
        path: &str,
        fields: Map<String, Value>,
    ) -> Result<Option<Value>> {
        let mut body = position_body(ctx);
        body.extend(fields);
        debug!("Node {} call verb {}", self.node_id(), path);
        self.call(RequestSpec::post(path).with_body(Value::Object(body)))
            .await
    }

    async fn conference_verb(
        &self,
        ctx: &PositionContext,
        path: &str,
        fields: Map<String, Value>,
    ) -> Result<Option<Value>> {
        let mut body = position_body(ctx);
        body.extend(fields);
        self.exchange(
            RequestSpec::post(path).with_body(Value::Object(body)),
            self.timeouts().conference(),
        )
        .await
    }

    pub async fn answer_call(&self, ctx: &PositionContext, ucid: &str) -> Result<()> {
        self.call_verb(ctx, paths::CALL_ANSWER, fields([("ucid", json!(ucid))]))
            .await
            .map(drop)
    }

    pub async fn hold_call(&self, ctx: &PositionContext, ucid: &str) -> Result<()> {
        self.call_verb(ctx, paths::CALL_HOLD, fields([("ucid", json!(ucid))]))
            .await
            .map(drop)
    }

    pub async fn unhold_call(&self, ctx: &PositionContext, ucid: &str) -> Result<()> {
        self.call_verb(ctx, paths::CALL_UNHOLD, fields([("ucid", json!(ucid))]))
            .await
            .map(drop)
    }

    /// Park a call, optionally on a specific park slot; returns the slot the
    /// node used when it reports one
    pub async fn park_call(
        &self,
        ctx: &PositionContext,
        ucid: &str,
        slot: Option<&str>,
    ) -> Result<Option<String>> {
        let mut f = fields([("ucid", json!(ucid))]);
        if let Some(slot) = slot {
            f.insert("slot".into(), json!(slot));
        }
        let body = self.call_verb(ctx, paths::CALL_PARK, f).await?;
        Ok(body
            .as_ref()
            .and_then(|b| b.get("slot"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    pub async fn unpark_call(&self, ctx: &PositionContext, ucid: &str) -> Result<()> {
        self.call_verb(ctx, paths::CALL_UNPARK, fields([("ucid", json!(ucid))]))
            .await
            .map(drop)
    }

    pub async fn transfer_call(
        &self,
        ctx: &PositionContext,
        ucid: &str,
        destination: &str,
        mode: TransferMode,
    ) -> Result<()> {
        self.call_verb(
            ctx,
            paths::CALL_TRANSFER,
            fields([
                ("ucid", json!(ucid)),
                ("destination", json!(destination)),
                ("mode", json!(mode.as_wire())),
            ]),
        )
        .await
        .map(drop)
    }

    pub async fn mute_call(&self, ctx: &PositionContext, ucid: &str, muted: bool) -> Result<()> {
        self.call_verb(
            ctx,
            paths::CALL_MUTE,
            fields([("ucid", json!(ucid)), ("on", json!(muted))]),
        )
        .await
        .map(drop)
    }

    pub async fn deafen_call(&self, ctx: &PositionContext, ucid: &str, deafened: bool) -> Result<()> {
        self.call_verb(
            ctx,
            paths::CALL_DEAFEN,
            fields([("ucid", json!(ucid)), ("on", json!(deafened))]),
        )
        .await
        .map(drop)
    }

    /// Turn a call into a conference and return the conference id
    pub async fn conference_acquire(&self, ctx: &PositionContext, ucid: &str) -> Result<String> {
        let body = self
            .conference_verb(ctx, paths::CONFERENCE_ACQUIRE, fields([("ucid", json!(ucid))]))
            .await?;
        body.as_ref()
            .and_then(|b| b.get("conferenceId"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| VccError::invalid_response("conference acquire returned no conferenceId"))
    }

    pub async fn conference_invite(
        &self,
        ctx: &PositionContext,
        conference_id: &str,
        destination: &str,
    ) -> Result<()> {
        self.conference_verb(
            ctx,
            paths::CONFERENCE_INVITE,
            fields([
                ("conferenceId", json!(conference_id)),
                ("destination", json!(destination)),
            ]),
        )
        .await
        .map(drop)
    }

    pub async fn conference_join(
        &self,
        ctx: &PositionContext,
        conference_id: &str,
        ucid: &str,
    ) -> Result<()> {
        self.conference_verb(
            ctx,
            paths::CONFERENCE_JOIN,
            fields([("conferenceId", json!(conference_id)), ("ucid", json!(ucid))]),
        )
        .await
        .map(drop)
    }

    pub async fn conference_lock(&self, ctx: &PositionContext, conference_id: &str) -> Result<()> {
        self.conference_verb(
            ctx,
            paths::CONFERENCE_LOCK,
            fields([("conferenceId", json!(conference_id))]),
        )
        .await
        .map(drop)
    }

    pub async fn conference_unlock(&self, ctx: &PositionContext, conference_id: &str) -> Result<()> {
        self.conference_verb(
            ctx,
            paths::CONFERENCE_UNLOCK,
            fields([("conferenceId", json!(conference_id))]),
        )
        .await
        .map(drop)
    }

    pub async fn conference_remove(
        &self,
        ctx: &PositionContext,
        conference_id: &str,
        participant: &str,
    ) -> Result<()> {
        self.conference_verb(
            ctx,
            paths::CONFERENCE_REMOVE,
            fields([
                ("conferenceId", json!(conference_id)),
                ("participant", json!(participant)),
            ]),
        )
        .await
        .map(drop)
    }
}

fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
