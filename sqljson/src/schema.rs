//!
//! The schema tree: plain, serializable data describing the output document.
//!

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::logging::LogLevel;
use crate::reference::Reference;
use crate::{SqlJsonError, SqlJsonResult};

/// The type of a schema node, deciding both how the node computes its value
/// and how values are folded into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Array,
    Object,
    Json,
    Number,
    /// Any other type name (`string`, `boolean`, ...). The value is passed through.
    Scalar(String),
}

impl NodeType {
    /// Array and object nodes hold child fields and may be backed by queries.
    pub fn is_list(&self) -> bool {
        matches!(self, NodeType::Array | NodeType::Object)
    }

    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Array => "array",
            NodeType::Object => "object",
            NodeType::Json => "json",
            NodeType::Number => "number",
            NodeType::Scalar(name) => name,
        }
    }
}

impl Default for NodeType {
    fn default() -> Self {
        NodeType::Scalar(String::new())
    }
}

impl From<String> for NodeType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "array" => NodeType::Array,
            "object" => NodeType::Object,
            "json" => NodeType::Json,
            "number" => NodeType::Number,
            _ => NodeType::Scalar(name),
        }
    }
}

impl From<&str> for NodeType {
    fn from(name: &str) -> Self {
        NodeType::from(name.to_owned())
    }
}

impl From<NodeType> for String {
    fn from(ty: NodeType) -> Self {
        ty.as_str().to_owned()
    }
}

/// Either a single item or a sequence of them, as the schema allows for
/// `query`, `memQuery` and `refField`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        OneOrMany::One(item)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany::Many(items)
    }
}

/// A query text plus its own bound parameters.
///
/// In a schema this is either a bare string or `{ "sql": ..., "params": [...] }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawQuerySpec")]
pub struct QuerySpec {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuerySpec {
    Text(String),
    Full {
        sql: String,
        #[serde(default)]
        params: Vec<Value>,
    },
}

impl From<RawQuerySpec> for QuerySpec {
    fn from(raw: RawQuerySpec) -> Self {
        match raw {
            RawQuerySpec::Text(sql) => Self {
                sql,
                params: Vec::new(),
            },
            RawQuerySpec::Full { sql, params } => Self { sql, params },
        }
    }
}

impl QuerySpec {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// The parameters to send: the query's own, then the reference values.
    /// Placeholders in the query text must follow this positional order.
    pub fn bind(&self, reference: &Reference) -> Vec<Value> {
        self.params
            .iter()
            .chain(reference.values())
            .cloned()
            .collect()
    }
}

impl From<&str> for QuerySpec {
    fn from(sql: &str) -> Self {
        QuerySpec::new(sql)
    }
}

///
/// One node of the schema tree.
///
/// The tree is read-only during a build; the same node is re-interpreted for
/// every row of its parent and keeps no state between rows.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    #[serde(rename = "type", default)]
    pub node_type: NodeType,

    /// Child nodes of an `array`/`object` node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaNode>,

    /// Fixed keys, paired by position with `fields`, evaluated before any row.
    #[serde(
        rename = "preDefinedkeys",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub predefined_keys: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<OneOrMany<QuerySpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_query: Option<OneOrMany<QuerySpec>>,

    /// Columns of the current row that make up the reference for the children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_field: Option<OneOrMany<String>>,

    /// Column whose value becomes the object key for a row's fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_field: Option<String>,

    /// Column read from the parent's row as this node's input value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,

    /// Key of this node inside an `object` parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub nullable: bool,

    /// Root only: tables fetched once up front and queried in memory afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_load_tables: Option<BTreeMap<String, QuerySpec>>,

    /// Level for this node's query diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,

    /// Store each row's object at the path made of its leading column values.
    #[serde(default)]
    pub diver: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_of_keys: Option<usize>,
}

impl SchemaNode {
    pub fn from_json_str(text: &str) -> SqlJsonResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_value(value: Value) -> SqlJsonResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Check the structural rules the interpreter relies on, for this node
    /// and all of its descendants.
    pub fn validate(&self) -> SqlJsonResult<()> {
        self.validate_at("$")
    }

    fn validate_at(&self, path: &str) -> SqlJsonResult<()> {
        if let Some(keys) = &self.predefined_keys {
            if keys.len() > self.fields.len() {
                return Err(SqlJsonError::Schema(format!(
                    "{}: {} preDefinedkeys but only {} fields",
                    path,
                    keys.len(),
                    self.fields.len()
                )));
            }
        }

        if self.diver && self.num_of_keys.unwrap_or(0) == 0 {
            return Err(SqlJsonError::Schema(format!(
                "{}: diver requires numOfKeys of at least 1",
                path
            )));
        }

        for (index, field) in self.fields.iter().enumerate() {
            let child_path = match &field.name {
                Some(name) => format!("{}.{}", path, name),
                None => format!("{}[{}]", path, index),
            };
            field.validate_at(&child_path)?;
        }

        Ok(())
    }
}
