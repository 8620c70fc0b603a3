//! Turns parsed tasks into an [`ActionSequence`] by resolving and invoking
//! registered handlers, one task at a time.

use crate::error::PilotError;
use crate::registry::ProtocolRegistry;
use crate::sequence::{ActionResult, ActionSequence, ParsedAction};
use alloy_primitives::Address;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Caller identity applied to every task of one invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub user_id: Option<String>,
    /// Filled into `userAddress` when a task's params leave it out.
    pub user_address: Option<Address>,
}

pub struct ActionInvoker {
    registry: Arc<ProtocolRegistry>,
}

impl ActionInvoker {
    pub fn new(registry: Arc<ProtocolRegistry>) -> Self {
        Self { registry }
    }

    /// One result per parsed action, in input order. Never fails as a whole.
    pub async fn invoke(&self, parsed: Vec<ParsedAction>, ctx: &InvocationContext) -> ActionSequence {
        let mut results = Vec::with_capacity(parsed.len());
        for task in parsed {
            let description = task.task.clone();
            let result = match self.invoke_one(task, ctx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(task = %description, code = e.code(), error = %e, "action invocation failed");
                    ActionResult::failed(description, &e)
                }
            };
            results.push(result);
        }
        let sequence = ActionSequence::new(ctx.user_id.clone(), results);
        info!(
            sequence_id = %sequence.id,
            actions = sequence.actions.len(),
            errors = sequence.error_count(),
            "invocation complete"
        );
        sequence
    }

    async fn invoke_one(&self, task: ParsedAction, ctx: &InvocationContext) -> crate::Result<ActionResult> {
        if let Some(needed) = task.information_needed() {
            return Err(PilotError::IncompleteInformation(needed));
        }
        let registered = self
            .registry
            .resolve(task.action, task.protocol_name.as_deref())?;
        debug!(
            action = %registered.kind,
            protocol = %registered.protocol,
            chain_id = task.chain_id,
            "resolved handler"
        );

        let params = with_context(task.params, task.chain_id, ctx);
        registered
            .handler
            .validate(&params)
            .map_err(PilotError::Validation)?;
        let action = registered.handler.build(params).await?;
        Ok(ActionResult::ok(task.task, action))
    }
}

/// Default `chainId` and `userAddress` from the task and caller.
fn with_context(params: Value, chain_id: u64, ctx: &InvocationContext) -> Value {
    let mut map = match params {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return other,
    };
    map.entry("chainId").or_insert_with(|| Value::from(chain_id));
    if let Some(address) = ctx.user_address {
        map.entry("userAddress")
            .or_insert_with(|| Value::String(address.to_string()));
    }
    Value::Object(map)
}
