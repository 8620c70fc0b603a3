//! Contracts every protocol module implements.
//!
//! A protocol declares its metadata and a list of [`ActionDefinition`]s at
//! registration time. Handlers receive raw JSON parameters; the typed adapter
//! deserializes them into the handler's parameter struct before building.

use crate::error::{PilotError, Result};
use crate::params::{self, Params, ValidationIssue};
use crate::types::{Action, ActionKind, ChainId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMetadata {
    pub name: String,
    pub description: String,
    pub supported_chains: Vec<ChainId>,
}

impl ProtocolMetadata {
    pub fn supports(&self, chain_id: ChainId) -> bool {
        self.supported_chains.contains(&chain_id)
    }

    pub fn ensure_supported(&self, chain_id: ChainId) -> Result<()> {
        if self.supports(chain_id) {
            Ok(())
        } else {
            Err(PilotError::UnsupportedChain {
                protocol: self.name.clone(),
                chain_id,
            })
        }
    }
}

/// Builds unsigned transactions for one (action kind, protocol) pair.
/// Never signs or broadcasts.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn parameter_schema(&self) -> Value;
    fn validate(&self, params: &Value) -> std::result::Result<(), Vec<ValidationIssue>>;
    async fn build(&self, params: Value) -> Result<Action>;
}

/// Typed counterpart of [`ActionHandler`] implemented by protocol modules.
#[async_trait]
pub trait BuildAction<P: Params>: Send + Sync {
    async fn build(&self, params: P) -> Result<Action>;
}

struct TypedHandler<P, H> {
    inner: Arc<H>,
    _params: PhantomData<fn() -> P>,
}

#[async_trait]
impl<P, H> ActionHandler for TypedHandler<P, H>
where
    P: Params,
    H: BuildAction<P> + 'static,
{
    fn parameter_schema(&self) -> Value {
        params::schema::<P>()
    }

    fn validate(&self, params: &Value) -> std::result::Result<(), Vec<ValidationIssue>> {
        params::parse::<P>(params).map(|_| ())
    }

    async fn build(&self, params: Value) -> Result<Action> {
        let typed = params::parse::<P>(&params).map_err(PilotError::Validation)?;
        self.inner.build(typed).await
    }
}

pub struct ActionDefinition {
    pub kind: ActionKind,
    pub description: String,
    pub is_default: bool,
    pub handler: Arc<dyn ActionHandler>,
}

impl ActionDefinition {
    pub fn typed<P, H>(kind: ActionKind, description: &str, is_default: bool, handler: Arc<H>) -> Self
    where
        P: Params,
        H: BuildAction<P> + 'static,
    {
        Self {
            kind,
            description: description.to_string(),
            is_default,
            handler: Arc::new(TypedHandler::<P, H> {
                inner: handler,
                _params: PhantomData,
            }),
        }
    }
}

pub trait Protocol: Send + Sync {
    fn metadata(&self) -> ProtocolMetadata;
    fn actions(self: Arc<Self>) -> Vec<ActionDefinition>;
}
