//! Field-by-field merging of configuration tiers.
//!
//! Objects merge recursively, everything else (arrays included) is replaced
//! by the higher tier. A null in the higher tier leaves the lower value alone.

use serde_json::Value;

/// Merge `overlay` into `base` in place.
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        if !value.is_null() {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Merge two values, with `overlay` taking precedence.
///
/// ```
/// use serde_json::json;
/// use taskmark::config::deep_merge;
///
/// let base = json!({ "tasks": { "min_id": 1, "delete_subtasks": false } });
/// let overlay = json!({ "tasks": { "min_id": 100 } });
/// assert_eq!(
///     deep_merge(base, overlay),
///     json!({ "tasks": { "min_id": 100, "delete_subtasks": false } })
/// );
/// ```
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

/// Merge tiers in order, later tiers winning.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, |acc, next| {
        if acc.is_null() {
            next
        } else {
            deep_merge(acc, next)
        }
    })
}
