use crate::error::{PilotError, Result};
use crate::params::{self, Params, ValidationIssue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Tool contract
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    fn validate(&self, args: &Value) -> std::result::Result<(), Vec<ValidationIssue>>;
    async fn call(&self, args: Value) -> Result<Value>;
}

/// Typed tool body implemented by providers; see [`typed_tool`].
#[async_trait]
pub trait CallTool<P: Params>: Send + Sync {
    async fn call(&self, params: P) -> Result<Value>;
}

struct TypedTool<P, H> {
    name: String,
    description: String,
    inner: Arc<H>,
    _params: PhantomData<fn() -> P>,
}

#[async_trait]
impl<P, H> Tool for TypedTool<P, H>
where
    P: Params,
    H: CallTool<P> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        params::schema::<P>()
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), Vec<ValidationIssue>> {
        params::parse::<P>(args).map(|_| ())
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let typed = params::parse::<P>(&args).map_err(PilotError::Validation)?;
        self.inner.call(typed).await
    }
}

pub fn typed_tool<P, H>(name: &str, description: &str, handler: Arc<H>) -> Box<dyn Tool>
where
    P: Params,
    H: CallTool<P> + 'static,
{
    Box::new(TypedTool::<P, H> {
        name: name.to_string(),
        description: description.to_string(),
        inner: handler,
        _params: PhantomData,
    })
}

/// A component exposing tools under a common owner prefix.
pub trait ToolProvider: Send + Sync {
    fn owner(&self) -> &str;
    fn tools(self: Arc<Self>) -> Vec<Box<dyn Tool>>;
}

// ---------------------------------------------------------------------------
// ToolOutcome
// ---------------------------------------------------------------------------

/// Uniform result of a tool call. Tool execution never surfaces an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<ValidationIssue>>,
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            error: false,
            data: Some(data),
            code: None,
            message: None,
            validation_errors: None,
        }
    }

    pub fn invalid(issues: Vec<ValidationIssue>) -> Self {
        Self {
            error: true,
            data: None,
            code: Some("VALIDATION_ERROR".to_string()),
            message: Some("Invalid parameters provided".to_string()),
            validation_errors: Some(issues),
        }
    }

    pub fn failure(err: &PilotError) -> Self {
        if let PilotError::Validation(issues) = err {
            return Self::invalid(issues.clone());
        }
        Self {
            error: true,
            data: None,
            code: Some(err.code().to_string()),
            message: Some(err.to_string()),
            validation_errors: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

// ---------------------------------------------------------------------------
// ToolRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every tool of `provider` as `{owner}_{name}`. A name clash rejects
    /// the whole provider.
    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) -> Result<()> {
        let owner = provider.owner().to_string();
        let tools = provider.tools();
        let mut named = Vec::with_capacity(tools.len());
        for tool in tools {
            let name = format!("{}_{}", owner, tool.name());
            if self.tools.contains_key(&name) || named.iter().any(|(n, _)| n == &name) {
                return Err(PilotError::DuplicateTool(name));
            }
            named.push((name, tool));
        }
        for (name, tool) in named {
            debug!(tool = %name, "registered tool");
            self.tools.insert(name, tool);
        }
        Ok(())
    }

    pub fn get_all(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|(name, tool)| ToolSpec {
                name: name.clone(),
                description: tool.description().to_string(),
                input_schema: tool.schema(),
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutcome::failure(&PilotError::ToolNotFound(name.to_string()));
        };
        if let Err(issues) = tool.validate(&args) {
            return ToolOutcome::invalid(issues);
        }
        match tool.call(args).await {
            Ok(data) => ToolOutcome::success(data),
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                ToolOutcome::failure(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct EchoParams {
        text: String,
    }

    impl Params for EchoParams {
        fn check(&self) -> Vec<ValidationIssue> {
            if self.text.is_empty() {
                vec![ValidationIssue::new("text", "must not be empty")]
            } else {
                Vec::new()
            }
        }
    }

    struct Echo {
        owner: &'static str,
    }

    #[async_trait]
    impl CallTool<EchoParams> for Echo {
        async fn call(&self, params: EchoParams) -> Result<Value> {
            if params.text == "boom" {
                return Err(PilotError::ExternalApi("upstream down".into()));
            }
            Ok(json!({ "echo": params.text }))
        }
    }

    impl ToolProvider for Echo {
        fn owner(&self) -> &str {
            self.owner
        }

        fn tools(self: Arc<Self>) -> Vec<Box<dyn Tool>> {
            vec![typed_tool::<EchoParams, _>("echo", "Echo text back", self)]
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(Echo { owner: "test" })).unwrap();
        reg
    }

    #[tokio::test]
    async fn names_tools_by_owner_and_method() {
        let reg = registry();
        let all = reg.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "test_echo");
        assert!(all[0].input_schema["properties"]["text"].is_object());
    }

    #[test]
    fn duplicate_tool_names_fail() {
        let mut reg = registry();
        let err = reg.register(Arc::new(Echo { owner: "test" })).unwrap_err();
        assert!(matches!(err, PilotError::DuplicateTool(name) if name == "test_echo"));
    }

    #[tokio::test]
    async fn success_is_wrapped() {
        let outcome = registry().execute("test_echo", json!({"text": "hi"})).await;
        assert_eq!(
            serde_json::to_value(outcome).unwrap(),
            json!({"error": false, "data": {"echo": "hi"}})
        );
    }

    #[tokio::test]
    async fn validation_failures_carry_issues() {
        let outcome = registry().execute("test_echo", json!({"text": ""})).await;
        assert!(outcome.error);
        assert_eq!(outcome.code.as_deref(), Some("VALIDATION_ERROR"));
        assert_eq!(outcome.message.as_deref(), Some("Invalid parameters provided"));
        assert_eq!(
            outcome.validation_errors.unwrap(),
            vec![ValidationIssue::new("text", "must not be empty")]
        );
    }

    #[tokio::test]
    async fn execution_errors_become_error_results() {
        let outcome = registry().execute("test_echo", json!({"text": "boom"})).await;
        assert!(outcome.error);
        assert_eq!(outcome.code.as_deref(), Some("EXTERNAL_API_ERROR"));
        assert!(outcome.message.unwrap().contains("upstream down"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let outcome = registry().execute("nope", json!({})).await;
        assert_eq!(outcome.code.as_deref(), Some("TOOL_NOT_FOUND"));
    }
}
