use std::fmt;

use serde_json::{Map, Value};

/// Unique handle for a bus listener or a store watcher.
///
/// Returned by `XBus::on(..).subscribe()` and `Store::watch()`; pass it back
/// to `XBus::off()` / `Store::unwatch()` to release the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// JSON truthiness: `null`, `false`, `0`, `""` are falsy; everything else,
/// including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Walk object keys from `root`. Returns `None` as soon as a segment is missing.
pub fn at_path<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |node, segment| node.get(segment.as_ref()))
}

/// Mutable variant of [`at_path`].
pub fn at_path_mut<'a, S: AsRef<str>>(root: &'a mut Value, path: &[S]) -> Option<&'a mut Value> {
    path.iter()
        .try_fold(root, |node, segment| node.get_mut(segment.as_ref()))
}

/// Join path segments with `/`.
pub fn join_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ========================================================================
    // Truthiness
    // ========================================================================

    #[test]
    fn falsy_values() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
    }

    #[test]
    fn truthy_values() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!(-3.5)));
        assert!(is_truthy(&json!("pizza")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    // ========================================================================
    // Paths
    // ========================================================================

    #[test]
    fn at_path_walks_objects() {
        let root = json!({"x": {"searchBox": {"query": "pizza"}}});
        assert_eq!(
            at_path(&root, &["x", "searchBox", "query"]),
            Some(&json!("pizza"))
        );
        assert_eq!(at_path(&root, &["x", "missing"]), None);
    }

    #[test]
    fn at_path_empty_returns_root() {
        let root = json!({"a": 1});
        let empty: [&str; 0] = [];
        assert_eq!(at_path(&root, &empty), Some(&root));
    }

    #[test]
    fn at_path_mut_allows_edit() {
        let mut root = json!({"x": {"searchBox": {"query": ""}}});
        *at_path_mut(&mut root, &["x", "searchBox", "query"]).unwrap() = json!("sushi");
        assert_eq!(root["x"]["searchBox"]["query"], "sushi");
    }

    #[test]
    fn join_path_uses_slashes() {
        assert_eq!(join_path(&["x", "searchBox"]), "x/searchBox");
        let empty: [&str; 0] = [];
        assert_eq!(join_path(&empty), "");
    }

    // ========================================================================
    // SubscriptionId
    // ========================================================================

    #[test]
    fn subscription_id_equality_and_display() {
        assert_eq!(SubscriptionId(1), SubscriptionId(1));
        assert_ne!(SubscriptionId(1), SubscriptionId(2));
        assert_eq!(SubscriptionId(7).to_string(), "#7");
    }

    #[test]
    fn subscription_id_hash() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(SubscriptionId(1));
        set.insert(SubscriptionId(2));
        set.insert(SubscriptionId(1));
        assert_eq!(set.len(), 2);
    }
}
