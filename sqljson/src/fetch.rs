//!
//! Data fetching for one schema node: remote queries first, then in-memory
//! queries, all rows concatenated in declaration order.
//!

use futures_util::future::{self, Either};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use crate::cache::{NamedTables, TableCache};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::database::{MemQuery, RemoteQuery, Row};
use crate::logging::{event_at, LogLevel};
use crate::reference::Reference;
use crate::schema::{QuerySpec, SchemaNode};
use crate::{SqlJsonError, SqlJsonResult};

pub(crate) struct Fetcher<'e, R, M> {
    remote: &'e R,
    mem: &'e M,
    config: &'e EngineConfig,
    cancel: &'e CancelToken,
}

impl<'e, R, M> Fetcher<'e, R, M>
where
    R: RemoteQuery,
    M: MemQuery,
{
    pub fn new(
        remote: &'e R,
        mem: &'e M,
        config: &'e EngineConfig,
        cancel: &'e CancelToken,
    ) -> Self {
        Self {
            remote,
            mem,
            config,
            cancel,
        }
    }

    /// Fill `cache` with the root's `preLoadTables`. No row context exists
    /// yet, so only each query's own parameters are bound.
    pub async fn preload(
        &self,
        tables: &BTreeMap<String, QuerySpec>,
        cache: &mut TableCache,
    ) -> SqlJsonResult<()> {
        if tables.is_empty() {
            return Ok(());
        }

        info!(tables = tables.len(), "Loading pre load tables");
        for (name, spec) in tables {
            let rows = self
                .remote_query(spec, spec.params.clone(), self.config.query_log_level)
                .await?;
            cache.insert(name.clone(), rows);
        }

        Ok(())
    }

    /// All rows backing `node` for the given reference.
    pub async fn fetch(
        &self,
        node: &SchemaNode,
        reference: &Reference,
        cache: &TableCache,
    ) -> SqlJsonResult<Vec<Row>> {
        let level = node.log_level.unwrap_or(self.config.query_log_level);
        let mut rows = Vec::new();

        if let Some(queries) = &node.query {
            for spec in queries.iter() {
                let fetched = self.remote_query(spec, spec.bind(reference), level).await?;
                rows.extend(fetched);
            }
        }

        if let Some(queries) = &node.mem_query {
            let mut tables = NamedTables::new(cache);
            if let Some(name) = &self.config.fetched_table {
                tables = tables.with_fetched(name, &rows);
            }

            let mut fetched = Vec::new();
            for spec in queries.iter() {
                fetched.extend(self.mem_query(spec, spec.bind(reference), &tables, level)?);
            }
            rows.extend(fetched);
        }

        Ok(rows)
    }

    async fn remote_query(
        &self,
        spec: &QuerySpec,
        params: Vec<Value>,
        level: LogLevel,
    ) -> SqlJsonResult<Vec<Row>> {
        self.cancel.check()?;
        event_at!(level, sql = %spec.sql, params = ?params, "running query");

        let query = self.remote.query(&spec.sql, &params);
        let response = match future::select(query, self.cancel.cancelled()).await {
            Either::Left((response, _)) => response,
            Either::Right(_) => return Err(SqlJsonError::Cancelled),
        };

        let rows = match response {
            Ok(response) => response.into_rows(),
            Err(source) => {
                return Err(SqlJsonError::Query {
                    sql: spec.sql.clone(),
                    params,
                    source,
                })
            }
        };

        self.log_result(level, &spec.sql, &rows);
        Ok(rows)
    }

    fn mem_query(
        &self,
        spec: &QuerySpec,
        params: Vec<Value>,
        tables: &NamedTables<'_>,
        level: LogLevel,
    ) -> SqlJsonResult<Vec<Row>> {
        self.cancel.check()?;
        event_at!(
            level,
            sql = %spec.sql,
            params = ?params,
            tables = ?tables.names(),
            "running memQuery"
        );

        let rows = self
            .mem
            .query(&spec.sql, &params, tables)
            .map_err(SqlJsonError::MemQuery)?;

        self.log_result(level, &spec.sql, &rows);
        Ok(rows)
    }

    fn log_result(&self, level: LogLevel, sql: &str, rows: &[Row]) {
        if self.config.log_results {
            event_at!(level, sql, rows = ?rows, "result is");
        } else {
            event_at!(level, sql, rows = rows.len(), "result rows");
        }
    }
}
