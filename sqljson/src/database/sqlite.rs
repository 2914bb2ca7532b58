//!
//! In-memory queries on SQLite.
//!
//! The preloaded tables of one build are loaded once, into an in-memory
//! database attached to that build's [`TableCache`]. Rows a node publishes
//! under the fetched-table name go into a temporary table, which shadows a
//! cached table of the same name and is replaced on every query.
//!
//! A table without rows has no known columns. It takes on any column a query
//! names, so selecting from it yields no rows rather than an error.
//!

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Statement};
use serde_json::{Number, Value};

use super::{BoxError, MemQuery, Row};
use crate::cache::{NamedTables, TableCache};

#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteMemEngine;

impl SqliteMemEngine {
    pub fn new() -> Self {
        Self
    }
}

impl MemQuery for SqliteMemEngine {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        tables: &NamedTables<'_>,
    ) -> Result<Vec<Row>, BoxError> {
        tables.cache().with_engine_state(
            |cache| Ok(MemDatabase::load(cache)?),
            |db: &mut MemDatabase| {
                db.publish(tables.fetched())?;
                Ok(db.query(sql, params)?)
            },
        )
    }
}

/// A table created without rows, with the columns it was given since.
struct EmptyTable {
    schema: &'static str,
    name: String,
    columns: Vec<String>,
}

struct MemDatabase {
    conn: Connection,
    empty: Vec<EmptyTable>,
    /// Name of the temporary table holding the current fetched rows.
    published: Option<String>,
}

impl MemDatabase {
    fn load(cache: &TableCache) -> rusqlite::Result<Self> {
        let mut db = Self {
            conn: Connection::open_in_memory()?,
            empty: Vec::new(),
            published: None,
        };
        for (name, rows) in cache.iter() {
            db.create("main", name, rows)?;
        }
        Ok(db)
    }

    fn publish(&mut self, fetched: Option<(&str, &[Row])>) -> rusqlite::Result<()> {
        if let Some(name) = self.published.take() {
            self.conn
                .execute(&format!("DROP TABLE temp.{}", quote(&name)), [])?;
            self.empty
                .retain(|table| !(table.schema == "temp" && table.name == name));
        }

        if let Some((name, rows)) = fetched {
            self.create("temp", name, rows)?;
            self.published = Some(name.to_owned());
        }
        Ok(())
    }

    /// Create `schema.name` with one untyped column per distinct key and
    /// insert `rows`.
    fn create(&mut self, schema: &'static str, name: &str, rows: &[Row]) -> rusqlite::Result<()> {
        let table = format!("{}.{}", schema, quote(name));

        let mut columns: Vec<&str> = Vec::new();
        for row in rows {
            for key in row.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }

        if columns.is_empty() {
            // SQLite tables need at least one column.
            self.conn
                .execute(&format!("CREATE TABLE {} (_empty)", table), [])?;
            self.empty.push(EmptyTable {
                schema,
                name: name.to_owned(),
                columns: Vec::new(),
            });
            return Ok(());
        }

        let column_list = columns
            .iter()
            .map(|column| quote(column))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn
            .execute(&format!("CREATE TABLE {} ({})", table, column_list), [])?;

        let placeholders = (1..=columns.len())
            .map(|index| format!("?{}", index))
            .collect::<Vec<_>>()
            .join(", ");
        let mut insert = self.conn.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table, column_list, placeholders
        ))?;

        for row in rows {
            let values = columns
                .iter()
                .map(|column| row.get(*column).map(to_sql).unwrap_or(SqlValue::Null));
            insert.execute(params_from_iter(values))?;
        }

        Ok(())
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
        loop {
            let (column, err) = match self.conn.prepare(sql) {
                Ok(stmt) => return run(stmt, params),
                Err(err) => match missing_column(&err) {
                    Some(column) => (column, err),
                    None => return Err(err),
                },
            };

            if !self.widen(&column)? {
                return Err(err);
            }
        }
    }

    ///
    /// Give the empty tables a query may mean by `missing` that column.
    ///
    /// A qualified name only widens the table it names, unless no empty table
    /// has that name (it may be an alias). Returns false when no table could
    /// take the column, so the query really is wrong.
    ///
    fn widen(&mut self, missing: &str) -> rusqlite::Result<bool> {
        let (qualifier, column) = match missing.rsplit_once('.') {
            Some((qualifier, column)) => (Some(qualifier), column),
            None => (None, missing),
        };
        let named = qualifier.map_or(false, |qualifier| {
            self.empty.iter().any(|table| table.name == qualifier)
        });

        let mut widened = false;
        for table in &mut self.empty {
            if named && Some(table.name.as_str()) != qualifier {
                continue;
            }
            if table.columns.iter().any(|known| known == column) {
                continue;
            }

            self.conn.execute(
                &format!(
                    "ALTER TABLE {}.{} ADD COLUMN {}",
                    table.schema,
                    quote(&table.name),
                    quote(column)
                ),
                [],
            )?;
            table.columns.push(column.to_owned());
            widened = true;
        }

        Ok(widened)
    }
}

fn run(mut stmt: Statement<'_>, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let bound: Vec<SqlValue> = params.iter().map(to_sql).collect();
    let mut result = stmt.query(params_from_iter(bound.iter()))?;

    let mut rows = Vec::new();
    while let Some(record) = result.next()? {
        let mut row = Row::new();
        for (index, column) in columns.iter().enumerate() {
            let value: SqlValue = record.get(index)?;
            row.insert(column.clone(), from_sql(value));
        }
        rows.push(row);
    }

    Ok(rows)
}

/// The column named by a "no such column" error.
fn missing_column(err: &rusqlite::Error) -> Option<String> {
    let message = match err {
        rusqlite::Error::SqlInputError { msg, .. } => msg,
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg,
        _ => return None,
    };
    message.strip_prefix("no such column: ").map(str::to_owned)
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(*flag as i64),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(integer) => Value::from(integer),
        SqlValue::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text),
        SqlValue::Blob(bytes) => Value::Array(bytes.into_iter().map(Value::from).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TableCache;
    use crate::database::to_rows;
    use serde_json::json;

    fn cache() -> TableCache {
        let mut cache = TableCache::new();
        cache.insert(
            "people",
            to_rows(vec![
                json!({ "id": 1, "name": "ada", "score": 1.5 }),
                json!({ "id": 2, "name": "bob", "tags": ["x"] }),
            ]),
        );
        cache
    }

    #[test]
    fn query_with_params() {
        let cache = cache();
        let rows = SqliteMemEngine
            .query(
                "SELECT name, score FROM people WHERE id = ?",
                &[json!(1)],
                &NamedTables::new(&cache),
            )
            .unwrap();

        assert_eq!(rows, to_rows(vec![json!({ "name": "ada", "score": 1.5 })]));
    }

    #[test]
    fn missing_columns_are_null_and_nested_values_text() {
        let cache = cache();
        let rows = SqliteMemEngine
            .query(
                "SELECT tags, score FROM people ORDER BY id",
                &[],
                &NamedTables::new(&cache),
            )
            .unwrap();

        assert_eq!(
            rows,
            to_rows(vec![
                json!({ "tags": null, "score": 1.5 }),
                json!({ "tags": "[\"x\"]", "score": null }),
            ])
        );
    }

    #[test]
    fn fetched_rows_are_queryable() {
        let cache = TableCache::new();
        let fetched = to_rows(vec![json!({ "v": "a" }), json!({ "v": "b" })]);
        let tables = NamedTables::new(&cache).with_fetched("parent", &fetched);

        let rows = SqliteMemEngine
            .query("SELECT count(*) AS n FROM parent", &[], &tables)
            .unwrap();
        assert_eq!(rows, to_rows(vec![json!({ "n": 2 })]));
    }

    #[test]
    fn one_database_per_cache() {
        let mut cache = cache();
        SqliteMemEngine
            .query("CREATE TABLE scratch (x)", &[], &NamedTables::new(&cache))
            .unwrap();

        let rows = SqliteMemEngine
            .query("SELECT count(*) AS n FROM scratch", &[], &NamedTables::new(&cache))
            .unwrap();
        assert_eq!(rows, to_rows(vec![json!({ "n": 0 })]));

        // New cache contents mean a freshly loaded database.
        cache.insert("other", to_rows(vec![json!({ "x": 1 })]));
        let result = SqliteMemEngine.query("SELECT * FROM scratch", &[], &NamedTables::new(&cache));
        assert!(result.is_err());
    }

    #[test]
    fn fetched_rows_are_replaced_per_query() {
        let cache = cache();
        let first = to_rows(vec![json!({ "id": 7 }), json!({ "id": 8 })]);
        let second = to_rows(vec![json!({ "id": 9 })]);
        let count = |tables: NamedTables<'_>| {
            SqliteMemEngine.query("SELECT count(*) AS n FROM people", &[], &tables)
        };

        // The fetched table shadows the preloaded one of the same name.
        let rows = count(NamedTables::new(&cache).with_fetched("people", &first)).unwrap();
        assert_eq!(rows, to_rows(vec![json!({ "n": 2 })]));

        let rows = count(NamedTables::new(&cache).with_fetched("people", &second)).unwrap();
        assert_eq!(rows, to_rows(vec![json!({ "n": 1 })]));

        let rows = count(NamedTables::new(&cache)).unwrap();
        assert_eq!(rows, to_rows(vec![json!({ "n": 2 })]));
    }

    #[test]
    fn empty_table_takes_any_column() {
        let mut cache = cache();
        cache.insert("vacant", Vec::new());
        let tables = NamedTables::new(&cache);

        let rows = SqliteMemEngine
            .query("SELECT v, k FROM vacant WHERE k = ?", &[json!(1)], &tables)
            .unwrap();
        assert!(rows.is_empty());

        let rows = SqliteMemEngine
            .query(
                "SELECT p.name, e.w FROM people p LEFT JOIN vacant e ON e.id = p.id ORDER BY p.id",
                &[],
                &tables,
            )
            .unwrap();
        assert_eq!(
            rows,
            to_rows(vec![
                json!({ "name": "ada", "w": null }),
                json!({ "name": "bob", "w": null }),
            ])
        );
    }

    #[test]
    fn empty_fetched_rows_take_any_column() {
        let cache = TableCache::new();
        let tables = NamedTables::new(&cache).with_fetched("parent", &[]);

        let rows = SqliteMemEngine
            .query("SELECT sum(n) AS total FROM parent", &[], &tables)
            .unwrap();
        assert_eq!(rows, to_rows(vec![json!({ "total": null })]));
    }

    #[test]
    fn unknown_column_of_a_filled_table_still_fails() {
        let mut cache = cache();
        cache.insert("vacant", Vec::new());

        let result = SqliteMemEngine.query("SELECT nope FROM people", &[], &NamedTables::new(&cache));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_table_fails() {
        let cache = TableCache::new();
        let result = SqliteMemEngine.query("SELECT * FROM nowhere", &[], &NamedTables::new(&cache));
        assert!(result.is_err());
    }
}
