//! Dot-path resolution and strict equality for automation filters.

use serde_json::Value;

/// Result of resolving a dot path against a value tree.
///
/// `Found(&Value::Null)` means the field exists and holds null, which is
/// not the same as `Missing`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a Value),
    Missing,
}

impl<'a> Lookup<'a> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Self::Found(v) => Some(v),
            Self::Missing => None,
        }
    }
}

/// Resolves a dot-separated path such as `metadata.city` against `root`.
///
/// Object segments are looked up by key; array segments must be a decimal
/// index. Descending into a scalar (including null) yields `Missing`.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Lookup<'a> {
    if path.is_empty() {
        return Lookup::Missing;
    }
    descend(root, path.split('.'))
}

fn descend<'a, 'p>(node: &'a Value, mut segments: impl Iterator<Item = &'p str>) -> Lookup<'a> {
    let Some(segment) = segments.next() else {
        return Lookup::Found(node);
    };

    let child = match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    };

    match child {
        Some(child) => descend(child, segments),
        None => Lookup::Missing,
    }
}

/// Strict equality between a resolved value and an expected filter literal.
///
/// Numbers compare by numeric value, so `1` equals `1.0`. No coercion
/// between types: `"1"` never equals `1`.
pub fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => actual == expected,
    }
}

/// Whether `path` resolves in `root` to a value strictly equal to `expected`.
pub fn path_equals(root: &Value, path: &str, expected: &Value) -> bool {
    match resolve_path(root, path) {
        Lookup::Found(actual) => values_equal(actual, expected),
        Lookup::Missing => false,
    }
}
