use crate::chain_client::ChainRegistry;
use crate::error::{PilotError, Result};
use crate::protocol::{ActionHandler, Protocol, ProtocolMetadata};
use crate::types::ActionKind;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

pub struct RegisteredAction {
    pub kind: ActionKind,
    pub protocol: String,
    pub description: String,
    pub is_default: bool,
    pub handler: Arc<dyn ActionHandler>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub action: ActionKind,
    pub description: String,
    pub is_default: bool,
    pub schema: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSummary {
    #[serde(flatten)]
    pub metadata: ProtocolMetadata,
    pub actions: Vec<ActionSummary>,
}

/// Lookup of action handlers by `(kind, protocol)`, plus one optional default
/// protocol per action kind. Built once at startup.
#[derive(Default)]
pub struct ProtocolRegistry {
    protocols: Vec<ProtocolMetadata>,
    actions: BTreeMap<(ActionKind, String), Arc<RegisteredAction>>,
    defaults: HashMap<ActionKind, String>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a protocol and all of its actions. Any conflict rejects the whole
    /// protocol and leaves the registry unchanged.
    pub fn register(&mut self, protocol: Arc<dyn Protocol>) -> Result<()> {
        let metadata = protocol.metadata();
        if self.protocols.iter().any(|p| p.name == metadata.name) {
            return Err(PilotError::DuplicateProtocol(metadata.name));
        }
        let definitions = protocol.actions();

        let mut new_defaults: HashMap<ActionKind, String> = HashMap::new();
        for (i, def) in definitions.iter().enumerate() {
            let key = (def.kind, metadata.name.clone());
            if self.actions.contains_key(&key) || definitions[..i].iter().any(|d| d.kind == def.kind) {
                return Err(PilotError::DuplicateAction {
                    action: def.kind.to_string(),
                    protocol: metadata.name.clone(),
                });
            }
            if def.is_default {
                if let Some(existing) = self.defaults.get(&def.kind) {
                    return Err(PilotError::DuplicateDefault {
                        action: def.kind.to_string(),
                        existing: existing.clone(),
                        protocol: metadata.name.clone(),
                    });
                }
                new_defaults.insert(def.kind, metadata.name.clone());
            }
        }

        for def in definitions {
            info!(
                protocol = %metadata.name,
                action = %def.kind,
                default = def.is_default,
                "registered action"
            );
            self.actions.insert(
                (def.kind, metadata.name.clone()),
                Arc::new(RegisteredAction {
                    kind: def.kind,
                    protocol: metadata.name.clone(),
                    description: def.description,
                    is_default: def.is_default,
                    handler: def.handler,
                }),
            );
        }
        self.defaults.extend(new_defaults);
        self.protocols.push(metadata);
        Ok(())
    }

    /// Exact handler when `protocol` is given, otherwise the kind's default.
    pub fn resolve(&self, kind: ActionKind, protocol: Option<&str>) -> Result<Arc<RegisteredAction>> {
        let name = match protocol {
            Some(name) => Some(name.to_string()),
            None => self.defaults.get(&kind).cloned(),
        };
        name.and_then(|n| self.actions.get(&(kind, n)).cloned())
            .ok_or_else(|| PilotError::ActionNotFound {
                action: kind.to_string(),
                protocol: protocol.map(str::to_string),
            })
    }

    pub fn protocols(&self) -> &[ProtocolMetadata] {
        &self.protocols
    }

    pub fn summaries(&self) -> Vec<ProtocolSummary> {
        self.protocols
            .iter()
            .map(|p| ProtocolSummary {
                metadata: p.clone(),
                actions: self
                    .actions_of(&p.name)
                    .map(|a| ActionSummary {
                        action: a.kind,
                        description: a.description.clone(),
                        is_default: a.is_default,
                        schema: a.handler.parameter_schema(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn actions_of<'a>(&'a self, protocol: &'a str) -> impl Iterator<Item = &'a Arc<RegisteredAction>> + 'a {
        self.actions
            .values()
            .filter(move |a| a.protocol == protocol)
    }

    /// Markdown catalogue of every protocol, its chains and actions.
    pub fn describe_all(&self, chains: &ChainRegistry) -> String {
        let mut out = String::from("# Protocols Overview\n\n");
        for p in &self.protocols {
            out.push_str(&format!("## {}\n\n", p.name));
            out.push_str(&format!("**Description:** {}\n\n", p.description));
            out.push_str("### Supported Chains\n\n");
            if p.supported_chains.is_empty() {
                out.push_str("_No supported chains listed._\n");
            } else {
                for id in &p.supported_chains {
                    let name = chains
                        .metadata(*id)
                        .map(|m| m.name.as_str())
                        .unwrap_or("Unknown");
                    out.push_str(&format!("- `{}` ({})\n", name, id));
                }
            }
            out.push_str("\n### Supported Actions\n\n");
            for action in self.actions_of(&p.name) {
                out.push_str(&format!("#### {}\n\n", action.kind));
                out.push_str(&format!("**Description:** {}\n\n", action.description));
            }
            out.push_str("---\n\n");
        }
        out
    }
}
