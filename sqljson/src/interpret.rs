//!
//! The recursive schema walk.
//!
//! Depth first and strictly sequential: a node's queries complete before any
//! of its rows are processed, and rows are folded in order, so colliding
//! object keys always merge the same way.
//!

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{Map, Value};
use tracing::trace;

use crate::cache::TableCache;
use crate::container;
use crate::database::{MemQuery, RemoteQuery, Row};
use crate::fetch::Fetcher;
use crate::nested;
use crate::reference::{self, Reference};
use crate::schema::{NodeType, SchemaNode};
use crate::value;
use crate::SqlJsonResult;

pub(crate) struct Interpreter<'e, R, M> {
    fetcher: Fetcher<'e, R, M>,
    cache: &'e TableCache,
}

impl<'e, R, M> Interpreter<'e, R, M>
where
    R: RemoteQuery,
    M: MemQuery,
{
    pub fn new(fetcher: Fetcher<'e, R, M>, cache: &'e TableCache) -> Self {
        Self { fetcher, cache }
    }

    ///
    /// Compute the value of `node`.
    ///
    /// `reference` is the correlation inherited from the ancestors, `input`
    /// the column the parent row holds under the node's `dbName`.
    /// `None` means the node produced nothing.
    ///
    pub fn interpret<'a>(
        &'a self,
        node: &'a SchemaNode,
        reference: Reference,
        input: Option<Value>,
    ) -> BoxFuture<'a, SqlJsonResult<Option<Value>>> {
        async move {
            trace!(node_type = node.node_type.as_str(), name = ?node.name, "interpret");

            match &node.node_type {
                NodeType::Array | NodeType::Object => self.interpret_list(node, reference).await,
                NodeType::Json => Ok(value::json_value(input)),
                NodeType::Number => Ok(value::number_value(input)),
                NodeType::Scalar(_) => Ok(value::scalar_value(input)),
            }
        }
        .boxed()
    }

    async fn interpret_list(
        &self,
        node: &SchemaNode,
        reference: Reference,
    ) -> SqlJsonResult<Option<Value>> {
        let mut data = None;

        if let Some(keys) = &node.predefined_keys {
            for (key, field) in keys.iter().zip(&node.fields) {
                let element = self.interpret(field, reference.clone(), None).await?;
                data = container::merge(
                    data,
                    element,
                    &node.node_type,
                    Some(key.as_str()),
                    node.nullable,
                );
            }
        }

        let rows = self.fetcher.fetch(node, &reference, self.cache).await?;
        trace!(rows = rows.len(), name = ?node.name, "fetched");

        if node.diver {
            return self.interpret_nested(node, data, &rows, reference).await;
        }

        if !rows.is_empty() {
            let mut reference = reference;
            for row in &rows {
                reference = reference::compute_reference(row, node.ref_field.as_ref(), reference);

                for field in &node.fields {
                    let element = self
                        .interpret(field, reference.clone(), column(row, field))
                        .await?;
                    let key = entry_key(row, node, field);
                    data = container::merge(
                        data,
                        element,
                        &node.node_type,
                        key.as_deref(),
                        field.nullable,
                    );
                }
            }
        } else if node.nullable && container::is_empty(&data) {
            // Objects keep every key present, as null when nothing backs it.
            let complete = node.node_type == NodeType::Object;
            data = container::empty_container(&node.node_type);
            for field in &node.fields {
                let element = self
                    .interpret(field, reference.clone(), Some(Value::Null))
                    .await?;
                data = container::merge(
                    data,
                    element,
                    &node.node_type,
                    field.name.as_deref(),
                    complete || field.nullable,
                );
            }
        }

        Ok(data)
    }

    /// `diver` nodes: each row's fields form an object, stored at the path
    /// made of the row's first `numOfKeys` column values.
    async fn interpret_nested(
        &self,
        node: &SchemaNode,
        data: Option<Value>,
        rows: &[Row],
        reference: Reference,
    ) -> SqlJsonResult<Option<Value>> {
        let mut tree = match data {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let depth = node.num_of_keys.unwrap_or(1);

        for row in rows {
            let mut entry = None;
            for field in &node.fields {
                let element = self
                    .interpret(field, reference.clone(), column(row, field))
                    .await?;
                entry = container::merge(
                    entry,
                    element,
                    &NodeType::Object,
                    field.name.as_deref(),
                    false,
                );
            }

            let path = nested::leading_keys(row, depth);
            nested::set_path(
                &mut tree,
                &path,
                entry.unwrap_or_else(|| Value::Object(Map::new())),
            );
        }

        Ok(Some(Value::Object(tree)))
    }
}

/// The column `field` reads from `row`.
fn column(row: &Row, field: &SchemaNode) -> Option<Value> {
    field
        .db_name
        .as_deref()
        .and_then(|name| row.get(name))
        .cloned()
}

/// The key a row's field is stored under: the row's `keyField` value when
/// present and non-empty, the field's own name otherwise.
fn entry_key(row: &Row, node: &SchemaNode, field: &SchemaNode) -> Option<String> {
    let from_row = node
        .key_field
        .as_deref()
        .and_then(|key_field| row.get(key_field))
        .and_then(|key| match key {
            Value::Null | Value::Array(_) | Value::Object(_) => None,
            other => Some(nested::key_string(other)),
        })
        .filter(|key| !key.is_empty());

    from_row.or_else(|| field.name.clone())
}
