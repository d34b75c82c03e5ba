use std::cmp::Ordering;

use serde_json::Value;
use tracing::warn;

use switchyard_core::policy::{Condition, Operator};

/// Resolve a dot path. Array segments are numeric indices. Null resolves to `None`.
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Evaluate a condition tree. `and` of nothing is true, `or` of nothing is false.
pub fn evaluate(condition: &Condition, context: &Value) -> bool {
    match condition {
        Condition::Leaf { field, op, value } => match lookup(context, field) {
            Some(actual) => compare(actual, *op, value),
            None => false,
        },
        Condition::And(children) => children.iter().all(|c| evaluate(c, context)),
        Condition::Or(children) => children.iter().any(|c| evaluate(c, context)),
        Condition::Not(inner) => !evaluate(inner, context),
    }
}

fn compare(actual: &Value, op: Operator, expected: &Value) -> bool {
    match op {
        Operator::Eq => values_equal(actual, expected),
        Operator::Ne => !values_equal(actual, expected),
        Operator::Gt => ordering(actual, expected) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            ordering(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lt => ordering(actual, expected) == Some(Ordering::Less),
        Operator::Lte => matches!(
            ordering(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::In => match expected {
            Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
        Operator::NotIn => match expected {
            Value::Array(items) => !items.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
        Operator::Regex => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(pattern)) => match regex::Regex::new(pattern) {
                Ok(re) => re.is_match(text),
                Err(e) => {
                    warn!(
                        pattern = %pattern,
                        error = %e,
                        "Invalid rule regex, treating as no match"
                    );
                    false
                }
            },
            _ => false,
        },
        Operator::Contains => match (actual, expected) {
            (Value::String(text), Value::String(needle)) => text.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| values_equal(item, needle)),
            _ => false,
        },
        Operator::StartsWith => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(prefix)) => text.starts_with(prefix),
            _ => false,
        },
        Operator::EndsWith => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(suffix)) => text.ends_with(suffix),
            _ => false,
        },
    }
}

/// Equality that treats `10` and `10.0` as equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// Numbers compare numerically, strings lexically, anything else is unordered.
fn ordering(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
