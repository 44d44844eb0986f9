//! Path templates with `:name` placeholders.
//!
//! Placeholder values that have no matching token in the template are not
//! dropped: truthy ones are appended to the URL as query parameters.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use url::form_urlencoded;

/// Placeholder values for a single call, in insertion order.
pub type Placeholders = serde_json::Map<String, Value>;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":([A-Za-z0-9_]+)").expect("placeholder token pattern is valid")
});

/// Lists the placeholder names that appear in `template`, in order of
/// appearance, without duplicates.
///
/// # Examples
///
/// ```
/// use fetchstate::url_template::template_placeholders;
///
/// assert_eq!(
///     template_placeholders("/orgs/:org/users/:id"),
///     vec!["org".to_string(), "id".to_string()]
/// );
/// ```
pub fn template_placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for capture in TOKEN.captures_iter(template) {
        let name = &capture[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Substitutes `placeholders` into `template`.
///
/// For every key, the first `:key` token is replaced by the value. Keys
/// without a token become `key=value` query parameters when their value is
/// truthy. The query string keeps the placeholders' insertion order.
///
/// # Examples
///
/// ```
/// use fetchstate::url_template::{build_url, Placeholders};
/// use serde_json::json;
///
/// let mut placeholders = Placeholders::new();
/// placeholders.insert("id".to_string(), json!(5));
/// placeholders.insert("active".to_string(), json!(true));
///
/// assert_eq!(build_url("/users/:id", &placeholders), "/users/5?active=true");
/// ```
pub fn build_url(template: &str, placeholders: &Placeholders) -> String {
    let mut url = template.to_string();
    let mut query = form_urlencoded::Serializer::new(String::new());
    let mut has_query = false;

    for (key, value) in placeholders {
        if let Some(range) = find_token(&url, key) {
            url.replace_range(range, &path_value(value));
            continue;
        }

        if !is_truthy(value) {
            continue;
        }

        match value {
            Value::Array(items) => {
                for item in items.iter().filter(|item| !item.is_null()) {
                    query.append_pair(key, &path_value(item));
                    has_query = true;
                }
            }
            other => {
                query.append_pair(key, &path_value(other));
                has_query = true;
            }
        }
    }

    if has_query {
        format!("{}?{}", url, query.finish())
    } else {
        url
    }
}

/// JavaScript-style truthiness: `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn find_token(url: &str, key: &str) -> Option<std::ops::Range<usize>> {
    TOKEN
        .captures_iter(url)
        .find(|capture| &capture[1] == key)
        .and_then(|capture| capture.get(0))
        .map(|m| m.range())
}

fn path_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(path_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
