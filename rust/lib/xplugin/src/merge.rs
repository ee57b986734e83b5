use serde_json::{Map, Value};

/// Merge `patch` into `base` in place (RFC 7386, JSON Merge Patch).
///
/// A non-object patch replaces `base`. An object patch turns `base` into an
/// object if it is not one, then for each key: `null` removes it, an object
/// merges recursively, anything else (scalars, arrays) replaces it.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *base = patch.clone();
        return;
    };
    if !base.is_object() {
        *base = Value::Object(Map::new());
    }
    if let Value::Object(target) = base {
        for (key, value) in patch {
            match value {
                Value::Null => {
                    target.remove(key);
                }
                Value::Object(_) => {
                    deep_merge(target.entry(key.clone()).or_insert(Value::Null), value);
                }
                _ => {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Shallow assign: every top-level key of `patch` overwrites the key in `target`.
///
/// Nested objects are replaced wholesale. No-op unless both sides are objects.
pub fn shallow_assign(target: &mut Value, patch: &Value) {
    if let (Some(target_obj), Some(patch_obj)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            target_obj.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ========================================================================
    // deep_merge
    // ========================================================================

    #[test]
    fn merges_messages_and_drops_nulls() {
        let mut config = json!({
            "consent": false,
            "documentDirection": "ltr",
            "messages": {"searchBox": {"placeholder": "Search"}},
        });
        deep_merge(
            &mut config,
            &json!({
                "documentDirection": null,
                "messages": {"searchBox": {"clear": "Clear"}},
                "currencyOptions": {"format": "$i,iii.dd"},
            }),
        );
        assert_eq!(
            config,
            json!({
                "consent": false,
                "messages": {"searchBox": {"placeholder": "Search", "clear": "Clear"}},
                "currencyOptions": {"format": "$i,iii.dd"},
            })
        );
    }

    #[test]
    fn arrays_are_replaced() {
        let mut state = json!({"suggestions": ["pizza", "pasta"], "facets": {"brand": ["acme"]}});
        deep_merge(&mut state, &json!({"suggestions": ["sushi"], "facets": {"brand": []}}));
        assert_eq!(state, json!({"suggestions": ["sushi"], "facets": {"brand": []}}));
    }

    #[test]
    fn untouched_fields_survive_at_depth() {
        let mut state = json!({
            "config": {"debounce": {"ms": 150, "leading": false}, "maxLength": 64},
        });
        deep_merge(&mut state, &json!({"config": {"debounce": {"ms": 300}}}));
        assert_eq!(
            state,
            json!({"config": {"debounce": {"ms": 300, "leading": false}, "maxLength": 64}})
        );
    }

    #[test]
    fn object_patch_over_scalar_starts_fresh() {
        let mut state = json!({"query": "pizza"});
        deep_merge(&mut state, &json!({"query": {"text": "pizza", "dropped": null}}));
        assert_eq!(state, json!({"query": {"text": "pizza"}}));
    }

    #[test]
    fn scalar_patch_replaces_base() {
        let mut state = json!({"page": 1});
        deep_merge(&mut state, &json!(["page", 2]));
        assert_eq!(state, json!(["page", 2]));
    }

    // ========================================================================
    // shallow_assign
    // ========================================================================

    #[test]
    fn shallow_assign_overwrites_top_level_only() {
        let mut config = json!({"debounce": 100, "history": {"max": 5, "persist": true}});
        shallow_assign(&mut config, &json!({"history": {"max": 10}, "autofocus": true}));
        assert_eq!(
            config,
            json!({"debounce": 100, "history": {"max": 10}, "autofocus": true})
        );
    }

    #[test]
    fn shallow_assign_ignores_non_objects() {
        let mut config = json!({"debounce": 100});
        shallow_assign(&mut config, &json!("fast"));
        assert_eq!(config, json!({"debounce": 100}));
    }
}
