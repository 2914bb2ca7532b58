//!
//! Nested-key assembly: rows stored in an object tree keyed by their leading
//! column values, e.g. rows `(country, city, ...)` become
//! `{ "<country>": { "<city>": { ... } } }`.
//!

use serde_json::{Map, Value};

use crate::database::Row;

/// The first `count` column values of `row`, in column order, as object keys.
pub fn leading_keys(row: &Row, count: usize) -> Vec<String> {
    row.values().take(count).map(key_string).collect()
}

/// Render a column value as an object key. Strings are used verbatim.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Store `value` at `path` below `target`, creating intermediate objects.
///
/// Intermediate values that are not objects are replaced; the leaf is
/// overwritten. An empty path leaves `target` untouched.
pub fn set_path(target: &mut Map<String, Value>, path: &[String], value: Value) {
    let (last, parents) = match path.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut current = target;
    for key in parents {
        let slot = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        };
    }

    current.insert(last.clone(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_intermediate_objects() {
        let mut target = Map::new();
        set_path(&mut target, &["se".to_owned(), "oslo".to_owned()], json!({ "n": 1 }));
        set_path(&mut target, &["se".to_owned(), "lund".to_owned()], json!({ "n": 2 }));

        assert_eq!(
            Value::Object(target),
            json!({ "se": { "oslo": { "n": 1 }, "lund": { "n": 2 } } })
        );
    }

    #[test]
    fn leaf_is_overwritten_and_scalars_replaced() {
        let mut target = Map::new();
        set_path(&mut target, &["a".to_owned()], json!(1));
        set_path(&mut target, &["a".to_owned(), "b".to_owned()], json!(2));
        set_path(&mut target, &["a".to_owned(), "b".to_owned()], json!(3));

        assert_eq!(Value::Object(target), json!({ "a": { "b": 3 } }));
    }

    #[test]
    fn keys_follow_column_order() {
        let row = match json!({ "year": 2020, "month": "jan", "total": 5 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(leading_keys(&row, 2), vec!["2020".to_owned(), "jan".to_owned()]);
        assert_eq!(leading_keys(&row, 10).len(), 3);
    }
}
