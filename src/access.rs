//! The synchronous database-access seam.
//!
//! [`SqlAccess`] is the collaborator interface a concrete driver implements;
//! the engine never depends on a driver directly. [`CachedAccess`] wraps one
//! driver with the query-result cache and the implicit-transaction stack and
//! is what the schema store and the orchestrator actually talk through.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tracing::{debug, trace};

use crate::cache::{CachedResult, QueryCache, QueryKey, ResultShape};
use crate::dialect::DialectAdapter;
use crate::error::Result;
use crate::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// A synchronous, parameterized connection to one backing store. Every call
/// blocks the calling thread for the duration of the I/O; one implementation
/// instance is one connection and is not safe for concurrent statement
/// execution.
pub trait SqlAccess {
    /// Runs a statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;
    /// The first column of the first row, or null when there are no rows.
    fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value>;
    fn row(&self, sql: &str, params: &[Value]) -> Result<Option<Row>>;
    fn rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
    /// Feeds rows one at a time to `sink` without materializing the result.
    fn stream_rows(
        &self,
        sql: &str,
        params: &[Value],
        sink: &mut dyn FnMut(Row) -> Result<()>,
    ) -> Result<()>;

    fn begin(&self, isolation: Option<IsolationLevel>) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
    fn in_transaction(&self) -> bool;
}

/// The cache-aware access layer.
///
/// Reads are served from the bounded query cache when possible. Before any
/// statement that does not match the dialect's read-only pattern executes,
/// the whole cache is cleared: a coarse, global invalidation that trades
/// precision for the guarantee that no stale read ever survives a write.
/// A transaction rollback clears the cache as well, since uncommitted
/// effects may already have been observed.
pub struct CachedAccess {
    inner: Box<dyn SqlAccess>,
    dialect: Arc<dyn DialectAdapter>,
    cache: Mutex<QueryCache>,
    depth: Mutex<u32>,
    isolation: Option<IsolationLevel>,
}

impl CachedAccess {
    pub fn new(
        inner: Box<dyn SqlAccess>,
        dialect: Arc<dyn DialectAdapter>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            inner,
            dialect,
            cache: Mutex::new(QueryCache::new(cache_capacity)),
            depth: Mutex::new(0),
            isolation: None,
        }
    }

    pub fn with_isolation(mut self, isolation: Option<IsolationLevel>) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn dialect(&self) -> &Arc<dyn DialectAdapter> {
        &self.dialect
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().unwrap().capacity()
    }

    pub fn set_cache_capacity(&self, capacity: usize) {
        self.cache.lock().unwrap().set_capacity(capacity);
    }

    fn invalidate_if_write(&self, sql: &str) {
        if !self.dialect.is_read_only(sql) {
            let mut cache = self.cache.lock().unwrap();
            if !cache.is_empty() {
                debug!(statement = sql, "writing statement, clearing query cache");
            }
            cache.clear();
        }
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        trace!(sql, "execute");
        self.invalidate_if_write(sql);
        self.inner.execute(sql, params)
    }

    pub fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
        trace!(sql, "scalar");
        if !self.dialect.is_read_only(sql) {
            self.invalidate_if_write(sql);
            return self.inner.scalar(sql, params);
        }
        let key = QueryKey {
            shape: ResultShape::Scalar,
            sql: sql.to_owned(),
            params: params.to_vec(),
        };
        if let Some(CachedResult::Scalar(value)) = self.cache.lock().unwrap().get(&key) {
            return Ok(value);
        }
        let value = self.inner.scalar(sql, params)?;
        self.cache
            .lock()
            .unwrap()
            .put(key, CachedResult::Scalar(value.clone()));
        Ok(value)
    }

    pub fn row(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        trace!(sql, "row");
        if !self.dialect.is_read_only(sql) {
            self.invalidate_if_write(sql);
            return self.inner.row(sql, params);
        }
        let key = QueryKey {
            shape: ResultShape::Row,
            sql: sql.to_owned(),
            params: params.to_vec(),
        };
        if let Some(CachedResult::Row(row)) = self.cache.lock().unwrap().get(&key) {
            return Ok(row);
        }
        let row = self.inner.row(sql, params)?;
        self.cache
            .lock()
            .unwrap()
            .put(key, CachedResult::Row(row.clone()));
        Ok(row)
    }

    pub fn rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        trace!(sql, "rows");
        if !self.dialect.is_read_only(sql) {
            self.invalidate_if_write(sql);
            return self.inner.rows(sql, params);
        }
        let key = QueryKey {
            shape: ResultShape::Rows,
            sql: sql.to_owned(),
            params: params.to_vec(),
        };
        if let Some(CachedResult::Rows(rows)) = self.cache.lock().unwrap().get(&key) {
            return Ok(rows);
        }
        let rows = self.inner.rows(sql, params)?;
        self.cache
            .lock()
            .unwrap()
            .put(key, CachedResult::Rows(rows.clone()));
        Ok(rows)
    }

    /// Streamed results are never cached; writes through this path still
    /// invalidate.
    pub fn stream_rows(
        &self,
        sql: &str,
        params: &[Value],
        sink: &mut dyn FnMut(Row) -> Result<()>,
    ) -> Result<()> {
        trace!(sql, "stream_rows");
        self.invalidate_if_write(sql);
        self.inner.stream_rows(sql, params, sink)
    }

    /// Runs `body` inside a transaction. Reentrant: when a transaction is
    /// already ambient (non-zero depth), the inner call simply executes
    /// within it, and only the outermost boundary decides commit/rollback.
    pub fn transaction<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        {
            let mut depth = self.depth.lock().unwrap();
            if *depth > 0 {
                *depth += 1;
                drop(depth);
                let result = body();
                *self.depth.lock().unwrap() -= 1;
                return result;
            }
            self.inner.begin(self.isolation)?;
            *depth = 1;
        }
        let result = body();
        *self.depth.lock().unwrap() = 0;
        match result {
            Ok(value) => {
                self.inner.commit()?;
                Ok(value)
            }
            Err(error) => {
                debug!("rolling back, clearing query cache");
                let _ = self.inner.rollback();
                self.cache.lock().unwrap().clear();
                Err(error)
            }
        }
    }

    pub fn in_transaction(&self) -> bool {
        *self.depth.lock().unwrap() > 0
    }
}
