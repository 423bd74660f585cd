//! Listen & Join subscription verbs

use serde_json::{json, Value};

use super::{position_body, NodeClient};
use crate::error::Result;
use crate::listen_join::ListenJoinMode;
use crate::multiplexer::RequestSpec;
use crate::types::PositionContext;
use crate::wire::paths;

impl NodeClient {
    /// Ask the node to monitor `target` for this position
    ///
    /// Uses the subscribe race window as the request timeout, so the first of
    /// accept, rejection or local timeout decides the outcome.
    pub async fn listen_join_subscribe(
        &self,
        ctx: &PositionContext,
        target: &str,
        mode: ListenJoinMode,
    ) -> Result<()> {
        let mut body = position_body(ctx);
        body.insert("target".into(), json!(target));
        body.insert("mode".into(), json!(mode.to_string()));
        self.exchange(
            RequestSpec::post(paths::LISTEN_JOIN_SUBSCRIBE).with_body(Value::Object(body)),
            self.timeouts().listen_join_subscribe(),
        )
        .await
        .map(drop)
    }

    pub async fn listen_join_unsubscribe(&self, ctx: &PositionContext, target: &str) -> Result<()> {
        let mut body = position_body(ctx);
        body.insert("target".into(), json!(target));
        self.call(RequestSpec::post(paths::LISTEN_JOIN_UNSUBSCRIBE).with_body(Value::Object(body)))
            .await
            .map(drop)
    }
}
