//! Structural query keys and the filters used to match them.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Ordered identifier of a logical query, e.g. `["category", "42", {"epoch": 3}]`.
///
/// Equality is structural: two keys built from equal values are the same
/// key no matter how they were constructed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryKey(Vec<Value>);

impl QueryKey {
  /// Key with a single resource name segment.
  pub fn root(resource: &str) -> Self {
    Self(vec![Value::String(resource.to_string())])
  }

  /// Append a segment. Anything serializable works; `None` becomes `null`.
  pub fn with(mut self, segment: impl Serialize) -> Self {
    let value = match serde_json::to_value(segment) {
      Ok(value) => value,
      Err(e) => {
        tracing::warn!(error = %e, "query key segment failed to serialize");
        Value::Null
      }
    };
    self.0.push(value);
    self
  }

  pub fn segments(&self) -> &[Value] {
    &self.0
  }

  /// Whether `prefix` matches the leading segments of this key.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
  }

  /// Stable, fixed-length hash of the canonical JSON form.
  pub fn cache_hash(&self) -> String {
    let mut canonical = String::new();
    write_canonical(&Value::Array(self.0.clone()), &mut canonical);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Serialize with object members in sorted order so structurally equal
/// keys hash the same regardless of map insertion order.
fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    Value::Object(map) => {
      let mut members: Vec<_> = map.iter().collect();
      members.sort_by(|a, b| a.0.cmp(b.0));
      out.push('{');
      for (i, (name, item)) in members.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&Value::String(name.clone()).to_string());
        out.push(':');
        write_canonical(item, out);
      }
      out.push('}');
    }
    scalar => out.push_str(&scalar.to_string()),
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", Value::Array(self.0.clone()))
  }
}

impl From<&str> for QueryKey {
  fn from(resource: &str) -> Self {
    QueryKey::root(resource)
  }
}

/// Selects cache entries for invalidation, refetching or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
  key: QueryKey,
  exact: bool,
}

impl QueryFilter {
  /// Match every key that starts with `key` (the default for invalidation).
  pub fn prefix(key: impl Into<QueryKey>) -> Self {
    Self {
      key: key.into(),
      exact: false,
    }
  }

  /// Match only `key` itself.
  pub fn exact(key: impl Into<QueryKey>) -> Self {
    Self {
      key: key.into(),
      exact: true,
    }
  }

  pub fn matches(&self, key: &QueryKey) -> bool {
    if self.exact {
      *key == self.key
    } else {
      key.starts_with(&self.key)
    }
  }
}

impl From<QueryKey> for QueryFilter {
  fn from(key: QueryKey) -> Self {
    QueryFilter::prefix(key)
  }
}
