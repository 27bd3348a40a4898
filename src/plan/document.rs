use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::{PlanError, CHILD_PLAN, CHILD_PLANS};
use crate::util::json::from_str_unbounded;

/// Key of the EXPLAIN result column holding the plan.
pub const QUERY_PLAN_KEY: &str = "QUERY PLAN";

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma pattern is valid"));

/// Ordered key-value view over one plan node.
///
/// Vendors add fields freely, so the document keeps everything it was given
/// (in the order it was given) and exposes typed accessors for the handful
/// of fields the engine understands. Accessors never fail: a missing or
/// mistyped field simply reads as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PlanDocument(Map<String, Value>);

impl PlanDocument {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Copies a node object, leaving out its nested child plans.
    pub fn without_children(node: &Map<String, Value>) -> Self {
        Self(
            node.iter()
                .filter(|(key, _)| key.as_str() != CHILD_PLAN && key.as_str() != CHILD_PLANS)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Finite, non-negative number.
    pub fn f64_field(&self, key: &str) -> Option<f64> {
        self.0
            .get(key)
            .and_then(Value::as_f64)
            .filter(|value| value.is_finite() && *value >= 0.0)
    }

    /// Non-negative integer; integral floats such as `12.0` are accepted.
    pub fn u64_field(&self, key: &str) -> Option<u64> {
        let value = self.0.get(key)?;
        value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        })
    }
}

/// Pulls the plan out of a record's EXPLAIN result rows.
///
/// The row carrying [`QUERY_PLAN_KEY`] holds a list whose first element is the
/// plan, either as JSON text or already decoded.
pub fn extract_plan_payload(data: &[Value]) -> Result<Value, PlanError> {
    let entry = data
        .iter()
        .filter_map(Value::as_object)
        .find_map(|row| row.get(QUERY_PLAN_KEY))
        .ok_or(PlanError::MissingPlan)?;

    let plan = match entry {
        Value::Array(items) => items.first().ok_or(PlanError::MissingPlan)?,
        other => other,
    };

    match plan {
        Value::String(text) => decode_plan_text(text),
        Value::Null => Err(PlanError::MissingPlan),
        other => Ok(other.clone()),
    }
}

/// Decodes plan text, retrying once with trailing commas removed.
pub fn decode_plan_text(text: &str) -> Result<Value, PlanError> {
    match from_str_unbounded(text) {
        Ok(value) => Ok(value),
        Err(first) => {
            let cleaned = TRAILING_COMMA.replace_all(text.trim(), "$1");
            from_str_unbounded(&cleaned).map_err(|_| PlanError::InvalidJson(first.to_string()))
        }
    }
}
