//! Typed parameter parsing shared by action handlers and tools.
//!
//! Every handler and tool declares a serde struct deriving `JsonSchema`.
//! The derived schema is what the conversational layer sees; validation is
//! deserialization followed by the struct's own semantic checks.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub trait Params: DeserializeOwned + JsonSchema + Send + Sync + 'static {
    /// Semantic checks that the type system cannot express.
    fn check(&self) -> Vec<ValidationIssue> {
        Vec::new()
    }
}

/// Deserialize and check `value` as `P`.
pub fn parse<P: Params>(value: &Value) -> Result<P, Vec<ValidationIssue>> {
    let params: P = serde_json::from_value(value.clone())
        .map_err(|e| vec![ValidationIssue::new("", e.to_string())])?;
    let issues = params.check();
    if issues.is_empty() {
        Ok(params)
    } else {
        Err(issues)
    }
}

pub fn schema<P: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(P)).unwrap_or(Value::Null)
}

/// Push an issue unless `amount` is a positive decimal number.
pub fn check_amount(path: &str, amount: &str, issues: &mut Vec<ValidationIssue>) {
    match amount.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => {}
        _ => issues.push(ValidationIssue::new(path, "Invalid amount")),
    }
}
