//!
//! Canned backends for exercising `sqljson` schemas without a database.
//!
//! Responses are matched on the exact query text, and optionally on the
//! bound parameters. Every call is recorded for later inspection.
//!

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use sqljson::database::{to_rows, BoxError, MemQuery, QueryResponse, RemoteQuery, Row};
use sqljson::NamedTables;

/// One recorded query call.
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub sql: String,
    pub params: Vec<Value>,
    /// Table names visible to an in-memory query; empty for remote calls.
    pub tables: Vec<String>,
}

#[derive(Clone, Debug)]
enum Outcome {
    Respond(QueryResponse),
    Fail(String),
    Hang,
    Table(String),
}

#[derive(Clone, Debug)]
struct Stub {
    sql: String,
    params: Option<Vec<Value>>,
    outcome: Outcome,
}

#[derive(Default)]
struct Stubs {
    stubs: Vec<Stub>,
    calls: Mutex<Vec<Call>>,
}

impl Stubs {
    fn push(&mut self, sql: impl Into<String>, params: Option<Vec<Value>>, outcome: Outcome) {
        self.stubs.push(Stub {
            sql: sql.into(),
            params,
            outcome,
        });
    }

    /// A stub for the exact parameters wins over one for any parameters.
    fn lookup(&self, sql: &str, params: &[Value]) -> Option<&Outcome> {
        let mut candidates = self.stubs.iter().filter(|stub| stub.sql == sql);
        let exact = candidates
            .clone()
            .find(|stub| stub.params.as_deref() == Some(params));

        exact
            .or_else(|| candidates.find(|stub| stub.params.is_none()))
            .map(|stub| &stub.outcome)
    }

    fn record(&self, sql: &str, params: &[Value], tables: Vec<String>) {
        self.calls.lock().push(Call {
            sql: sql.to_owned(),
            params: params.to_vec(),
            tables,
        });
    }
}

///
/// A [`RemoteQuery`] answering from canned responses.
///
/// Unknown queries fail, so a test notices any query it did not expect.
///
#[derive(Default)]
pub struct StaticRemote {
    stubs: Stubs,
}

impl StaticRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `rows`, whatever the parameters.
    pub fn rows(mut self, sql: impl Into<String>, rows: Vec<Value>) -> Self {
        let response = QueryResponse::Rows(to_rows(rows));
        self.stubs.push(sql, None, Outcome::Respond(response));
        self
    }

    /// Answer `sql` with `rows` when bound to exactly `params`.
    pub fn rows_for(mut self, sql: impl Into<String>, params: Vec<Value>, rows: Vec<Value>) -> Self {
        let response = QueryResponse::Rows(to_rows(rows));
        self.stubs.push(sql, Some(params), Outcome::Respond(response));
        self
    }

    /// Answer `sql` with a `{ rows: [...] }` result object.
    pub fn wrapped_rows(mut self, sql: impl Into<String>, rows: Vec<Value>) -> Self {
        let response = QueryResponse::Wrapped {
            rows: to_rows(rows),
        };
        self.stubs.push(sql, None, Outcome::Respond(response));
        self
    }

    pub fn fail(mut self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.stubs.push(sql, None, Outcome::Fail(message.into()));
        self
    }

    /// Never answer `sql`.
    pub fn hang(mut self, sql: impl Into<String>) -> Self {
        self.stubs.push(sql, None, Outcome::Hang);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.stubs.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteQuery for StaticRemote {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResponse, BoxError> {
        self.stubs.record(sql, params, Vec::new());

        match self.stubs.lookup(sql, params) {
            Some(Outcome::Respond(response)) => Ok(response.clone()),
            Some(Outcome::Fail(message)) => Err(message.clone().into()),
            Some(Outcome::Hang) => futures_util::future::pending().await,
            Some(Outcome::Table(_)) | None => {
                Err(format!("no stubbed response for: {}", sql).into())
            }
        }
    }
}

///
/// A [`MemQuery`] answering from canned responses, or by returning a named
/// table verbatim.
///
#[derive(Default)]
pub struct StaticMem {
    stubs: Stubs,
}

impl StaticMem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(mut self, sql: impl Into<String>, rows: Vec<Value>) -> Self {
        let response = QueryResponse::Rows(to_rows(rows));
        self.stubs.push(sql, None, Outcome::Respond(response));
        self
    }

    pub fn rows_for(mut self, sql: impl Into<String>, params: Vec<Value>, rows: Vec<Value>) -> Self {
        let response = QueryResponse::Rows(to_rows(rows));
        self.stubs.push(sql, Some(params), Outcome::Respond(response));
        self
    }

    /// Answer `sql` with every row of the named table; fails when the table
    /// is not visible to the query.
    pub fn table(mut self, sql: impl Into<String>, table: impl Into<String>) -> Self {
        self.stubs.push(sql, None, Outcome::Table(table.into()));
        self
    }

    pub fn fail(mut self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.stubs.push(sql, None, Outcome::Fail(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.stubs.calls.lock().clone()
    }
}

impl MemQuery for StaticMem {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        tables: &NamedTables<'_>,
    ) -> Result<Vec<Row>, BoxError> {
        let names = tables.names().into_iter().map(str::to_owned).collect();
        self.stubs.record(sql, params, names);

        match self.stubs.lookup(sql, params) {
            Some(Outcome::Respond(response)) => Ok(response.clone().into_rows()),
            Some(Outcome::Table(name)) => tables
                .get(name)
                .map(<[Row]>::to_vec)
                .ok_or_else(|| format!("table {} not found", name).into()),
            Some(Outcome::Fail(message)) => Err(message.clone().into()),
            Some(Outcome::Hang) | None => Err(format!("no stubbed response for: {}", sql).into()),
        }
    }
}
