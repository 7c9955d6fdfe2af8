//! Duplicate collapsing.

use serde_json::Value;
use std::collections::HashMap;

use super::ResultItem;

const QUANTITY_FIELD: &str = "stock_quantity";

fn normalize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, normalize(v))).collect()),
        other => other,
    }
}

/// Returns the identity of an item: every field except the quantity, with
/// string values trimmed, as JSON with sorted keys.
#[must_use]
pub fn duplicate_key(item: &ResultItem) -> String {
    let mut value = serde_json::to_value(item).unwrap_or(Value::Null);
    if let Value::Object(ref mut map) = value {
        map.remove(QUANTITY_FIELD);
    }
    normalize(value).to_string()
}

/// Collapses duplicate items, keeping first-seen order.
///
/// With `update_quantity`, an item first seen with a zero quantity is
/// counted: it starts at 1 and each later duplicate adds 1. Items that
/// arrived with a non-zero quantity keep it.
#[must_use]
pub fn collapse_duplicates(items: Vec<ResultItem>, update_quantity: bool) -> Vec<ResultItem> {
    let mut unique: Vec<ResultItem> = Vec::with_capacity(items.len());
    // key -> (index in `unique`, counted)
    let mut seen: HashMap<String, (usize, bool)> = HashMap::new();

    for mut item in items {
        let key = duplicate_key(&item);
        if let Some(&(index, counted)) = seen.get(&key) {
            if counted {
                unique[index].stock_quantity += 1;
            }
            continue;
        }

        let counted = update_quantity && item.stock_quantity == 0;
        if counted {
            item.stock_quantity = 1;
        }
        seen.insert(key, (unique.len(), counted));
        unique.push(item);
    }

    unique
}
