//!
//! Folding child values into the value being built at a node.
//!
//! A container is `None` until its first real write, so a node nothing was
//! written to stays absent and its parent can prune it.
//!

use serde_json::{Map, Value};

use crate::schema::NodeType;

/// The empty form of a container type: `[]` for arrays, `{}` for objects,
/// nothing for scalar types.
pub fn empty_container(container_type: &NodeType) -> Option<Value> {
    match container_type {
        NodeType::Array => Some(Value::Array(Vec::new())),
        NodeType::Object => Some(Value::Object(Map::new())),
        _ => None,
    }
}

/// True for an absent value: undefined or `null`.
pub fn is_absent(value: &Option<Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// True when nothing meaningful has been written to `container` yet.
pub fn is_empty(container: &Option<Value>) -> bool {
    match container {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

///
/// Merge `element` into `container`.
///
/// * An absent element is dropped unless `nullable`, in which case it is
///   stored as `null`.
/// * `array`: the element is appended.
/// * `object`: the element is stored under `key`; nothing happens without a
///   key. When the key is taken and both values are objects, the element's
///   entries are merged into the existing object, so fields of the same key
///   accumulate across rows. Otherwise the element replaces the old value.
/// * any other type: the element replaces the container.
///
pub fn merge(
    container: Option<Value>,
    element: Option<Value>,
    container_type: &NodeType,
    key: Option<&str>,
    nullable: bool,
) -> Option<Value> {
    if is_absent(&element) && !nullable {
        return container;
    }
    let element = element.unwrap_or(Value::Null);

    let container = match container {
        Some(container) => Some(container),
        None => empty_container(container_type),
    };

    match (container_type, container) {
        (NodeType::Array, Some(Value::Array(mut items))) => {
            items.push(element);
            Some(Value::Array(items))
        }
        (NodeType::Object, Some(Value::Object(mut map))) => {
            let key = match key {
                Some(key) if !key.is_empty() => key,
                _ => return Some(Value::Object(map)),
            };

            match element {
                Value::Object(entries) if map.get(key).map_or(false, Value::is_object) => {
                    if let Some(Value::Object(existing)) = map.get_mut(key) {
                        existing.extend(entries);
                    }
                }
                element => {
                    map.insert(key.to_owned(), element);
                }
            }

            Some(Value::Object(map))
        }
        (_, _) => Some(element),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn absent_element_is_pruned() {
        let container = merge(None, None, &NodeType::Object, Some("a"), false);
        assert_eq!(container, None);

        let container = merge(Some(json!({ "x": 1 })), Some(Value::Null), &NodeType::Object, Some("a"), false);
        assert_eq!(container, Some(json!({ "x": 1 })));
    }

    #[test]
    fn nullable_absent_element_is_null() {
        let container = merge(None, None, &NodeType::Object, Some("a"), true);
        assert_eq!(container, Some(json!({ "a": null })));

        let container = merge(None, None, &NodeType::Array, None, true);
        assert_eq!(container, Some(json!([null])));
    }

    #[test]
    fn falsy_values_are_kept() {
        let mut container = None;
        for element in [json!(0), json!(""), json!(false)] {
            container = merge(container, Some(element), &NodeType::Array, None, false);
        }
        assert_eq!(container, Some(json!([0, "", false])));
    }

    #[test]
    fn object_without_key_is_initialized_only() {
        let container = merge(None, Some(json!(1)), &NodeType::Object, None, false);
        assert_eq!(container, Some(json!({})));

        let container = merge(None, Some(json!(1)), &NodeType::Object, Some(""), false);
        assert_eq!(container, Some(json!({})));
    }

    #[test]
    fn colliding_objects_merge_shallow() {
        let container = merge(None, Some(json!({ "a": 1, "n": { "x": 1 } })), &NodeType::Object, Some("k"), false);
        let container = merge(container, Some(json!({ "b": 2, "n": { "y": 2 } })), &NodeType::Object, Some("k"), false);

        assert_eq!(container, Some(json!({ "k": { "a": 1, "b": 2, "n": { "y": 2 } } })));
    }

    #[test]
    fn colliding_scalar_is_replaced() {
        let container = merge(None, Some(json!("old")), &NodeType::Object, Some("k"), false);
        let container = merge(container, Some(json!({ "new": true })), &NodeType::Object, Some("k"), false);
        assert_eq!(container, Some(json!({ "k": { "new": true } })));
    }

    #[test]
    fn scalar_container_last_write_wins() {
        let ty = NodeType::Scalar("string".to_owned());
        let container = merge(None, Some(json!("a")), &ty, Some("ignored"), false);
        let container = merge(container, Some(json!("b")), &ty, None, false);
        assert_eq!(container, Some(json!("b")));
    }

    #[test]
    fn empty_containers() {
        assert_eq!(empty_container(&NodeType::Array), Some(json!([])));
        assert_eq!(empty_container(&NodeType::Object), Some(json!({})));
        assert_eq!(empty_container(&NodeType::Json), None);
        assert!(is_empty(&Some(json!({}))));
        assert!(!is_empty(&Some(json!(0))));
    }

    proptest! {
        #[test]
        fn disjoint_contributions_union(
            left in proptest::collection::btree_map("[a-m]{1,4}", any::<i64>(), 0..8),
            right in proptest::collection::btree_map("[n-z]{1,4}", any::<i64>(), 0..8),
        ) {
            let as_object = |entries: &std::collections::BTreeMap<String, i64>| {
                Value::Object(entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect())
            };

            let container = merge(None, Some(as_object(&left)), &NodeType::Object, Some("key"), false);
            let container = merge(container, Some(as_object(&right)), &NodeType::Object, Some("key"), false);

            let merged = container.unwrap();
            let entry = merged["key"].as_object().unwrap();
            prop_assert_eq!(entry.len(), left.len() + right.len());
            for (k, v) in left.iter().chain(right.iter()) {
                prop_assert_eq!(&entry[k.as_str()], &json!(v));
            }
        }

        #[test]
        fn non_nullable_absent_never_changes_container(
            items in proptest::collection::vec(any::<i32>(), 0..10),
            use_null in any::<bool>(),
        ) {
            let container = Some(Value::Array(items.iter().map(|i| json!(i)).collect()));
            let element = if use_null { Some(Value::Null) } else { None };
            let merged = merge(container.clone(), element, &NodeType::Array, None, false);
            prop_assert_eq!(merged, container);
        }
    }
}
