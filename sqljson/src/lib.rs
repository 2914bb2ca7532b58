//!
//! Build nested JSON documents out of flat relational rows.
//!
//! A caller describes the wanted document as a tree of [`SchemaNode`]s. Each
//! list node (`array`/`object`) may be backed by queries; every returned row
//! drives its child fields, and values from that row are threaded down as the
//! _reference_ bound into the children's queries:
//!
//! ```text
//! array  query: SELECT id, title FROM book            refField: id
//!  |
//!  +-- object
//!       +-- title   (string, dbName: title)
//!       +-- authors (array, query: SELECT name FROM author WHERE book_id = $1)
//!            +-- name (string, dbName: name)
//! ```
//!
//! Results of a node's queries are folded into its container with
//! array-append, object-key-merge or scalar-overwrite semantics.
//!

pub mod cache;
pub mod cancel;
pub mod config;
pub mod container;
pub mod database;
pub mod logging;
pub mod nested;
pub mod reference;
pub mod schema;
pub mod value;

mod fetch;
mod interpret;

use serde_json::Value;
use tracing::{debug, info};

pub use crate::cache::{NamedTables, TableCache};
pub use crate::cancel::CancelToken;
pub use crate::config::EngineConfig;
pub use crate::database::{BoxError, MemQuery, QueryResponse, RemoteQuery, Row};
pub use crate::reference::Reference;
pub use crate::schema::{NodeType, OneOrMany, QuerySpec, SchemaNode};

#[derive(thiserror::Error, Debug)]
pub enum SqlJsonError {
    #[error("Error while query {sql} with params {params:?}. {source}")]
    Query {
        sql: String,
        params: Vec<Value>,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    MemQuery(BoxError),

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SqlJsonResult<T> = Result<T, SqlJsonError>;

///
/// The engine handle.
///
/// `R` executes queries against the live database, `M` executes in-memory
/// queries over the tables preloaded for one build. The handle holds no
/// per-build state, so one instance may serve any number of concurrent
/// `execute` calls.
///
pub struct SqlJson<R, M = ()> {
    remote: R,
    mem: M,
    config: EngineConfig,
}

impl<R: RemoteQuery> SqlJson<R> {
    /// An engine without an in-memory query engine.
    /// Schemas using `memQuery` will fail against it.
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            mem: (),
            config: EngineConfig::default(),
        }
    }
}

impl<R, M> SqlJson<R, M> {
    pub fn with_mem_engine<M2: MemQuery>(self, mem: M2) -> SqlJson<R, M2> {
        SqlJson {
            remote: self.remote,
            mem,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn mem_engine(&self) -> &M {
        &self.mem
    }
}

impl<R, M> SqlJson<R, M>
where
    R: RemoteQuery,
    M: MemQuery,
{
    /// Build the document described by `schema`.
    ///
    /// Tables listed in the root's `preLoadTables` are fetched first, then the
    /// tree is walked depth first. A branch that produced nothing at the root
    /// comes back as `null`.
    pub async fn execute(&self, schema: &SchemaNode) -> SqlJsonResult<Value> {
        self.execute_with_cancel(schema, &CancelToken::new()).await
    }

    /// Like [`SqlJson::execute`], aborting with [`SqlJsonError::Cancelled`]
    /// at the next query once `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        schema: &SchemaNode,
        cancel: &CancelToken,
    ) -> SqlJsonResult<Value> {
        schema.validate()?;

        let mut cache = TableCache::new();
        let result = self.build(schema, &mut cache, cancel).await;

        // The cache belongs to this call alone; empty it whichever way the build went.
        debug!(tables = cache.len(), "clearing pre load tables");
        cache.clear();

        result
    }

    async fn build(
        &self,
        schema: &SchemaNode,
        cache: &mut TableCache,
        cancel: &CancelToken,
    ) -> SqlJsonResult<Value> {
        let fetcher = fetch::Fetcher::new(&self.remote, &self.mem, &self.config, cancel);

        if let Some(tables) = &schema.pre_load_tables {
            fetcher.preload(tables, cache).await?;
        }

        info!("Building JSON structure");
        let interpreter = interpret::Interpreter::new(fetcher, cache);
        let data = interpreter
            .interpret(schema, Reference::default(), None)
            .await?;

        Ok(data.unwrap_or(Value::Null))
    }
}
