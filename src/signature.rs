//! Canonical keys for calls.
//!
//! A [`CallKey`] is a JSON encoding with object keys sorted at every level,
//! so two structurally equal values always produce the same key no matter
//! the order their fields were inserted in.

use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Canonical key derived from a serializable value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CallKey(String);

impl CallKey {
    /// Computes the key of `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized to JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use fetchstate::CallKey;
    /// use serde_json::json;
    ///
    /// let a = CallKey::of(&json!({ "id": 1, "tab": "posts" })).unwrap();
    /// let b = CallKey::of(&json!({ "tab": "posts", "id": 1 })).unwrap();
    /// assert_eq!(a, b);
    /// ```
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let value =
            serde_json::to_value(value).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        let mut out = String::new();
        write_canonical(&value, &mut out);
        Ok(CallKey(out))
    }

    /// The canonical text of this key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

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
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_objects_are_sorted() {
        let key = CallKey::of(&json!(["getUser", { "b": { "y": 1, "x": 2 }, "a": [3, { "d": 4, "c": 5 }] }]))
            .unwrap();

        assert_eq!(
            key.as_str(),
            r#"["getUser",{"a":[3,{"c":5,"d":4}],"b":{"x":2,"y":1}}]"#
        );
    }

    #[test]
    fn different_values_give_different_keys() {
        let a = CallKey::of(&json!({ "id": 1 })).unwrap();
        let b = CallKey::of(&json!({ "id": "1" })).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn array_order_is_significant() {
        let a = CallKey::of(&json!([1, 2])).unwrap();
        let b = CallKey::of(&json!([2, 1])).unwrap();
        assert_ne!(a, b);
    }
}
