//!
//! Correlation values threaded from a parent row into its descendants' queries.
//!

use serde_json::Value;

use crate::database::Row;
use crate::schema::OneOrMany;

/// The ordered values bound after a query's own parameters.
///
/// Empty at the root, before any row has been seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reference(Vec<Value>);

impl Reference {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Reference {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Compute the reference handed to the children of the node owning `ref_field`.
///
/// Without a `ref_field` the `fallback` passes through, so a correlation can
/// span levels that declare none. Otherwise the named columns are read from
/// `row` in declaration order; a missing column contributes `null`.
pub fn compute_reference(
    row: &Row,
    ref_field: Option<&OneOrMany<String>>,
    fallback: Reference,
) -> Reference {
    match ref_field {
        Some(columns) if !columns.is_empty() => Reference(
            columns
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
        _ => fallback,
    }
}
