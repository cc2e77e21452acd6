#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use rusqlite::Connection;

use limber::access::{CachedAccess, IsolationLevel, SqlAccess};
use limber::crud::CrudOrchestrator;
use limber::dialect::DialectAdapter;
use limber::error::{LimberError, Result};
use limber::keys::KeyRegistry;
use limber::schema::SchemaStore;
use limber::settings::ConversionOptions;
use limber::sqlite::SqliteDialect;
use limber::value::{Row, Value};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn access_error(e: rusqlite::Error) -> LimberError {
    LimberError::Access(e.to_string())
}

fn to_sql(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Int(i) => Sql::Integer(*i),
        Value::UInt(u) => match i64::try_from(*u) {
            Ok(i) => Sql::Integer(i),
            Err(_) => Sql::Text(u.to_string()),
        },
        Value::Double(d) => Sql::Real(*d),
        Value::Decimal(d) => Sql::Text(d.to_string()),
        Value::Text(s) => Sql::Text(s.clone()),
        Value::Date(d) => Sql::Text(d.to_string()),
        Value::DateTime(d) => Sql::Text(d.to_string()),
        Value::DateTimeOffset(d) => Sql::Text(d.to_rfc3339()),
        Value::Guid(g) => Sql::Text(g.to_string()),
        Value::Blob(b) => Sql::Blob(b.clone()),
    }
}

fn from_sql(value: rusqlite::types::ValueRef) -> Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(d) => Value::Double(d),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// A real driver over an in-memory SQLite database, with a counter on the
/// read operations so tests can observe cache hits and misses.
pub struct RusqliteAccess {
    conn: Connection,
    reads: Rc<Cell<usize>>,
}

impl RusqliteAccess {
    pub fn in_memory() -> (Self, Rc<Cell<usize>>) {
        let conn = Connection::open_in_memory().expect("in-memory database");
        let reads = Rc::new(Cell::new(0));
        (
            Self {
                conn,
                reads: Rc::clone(&reads),
            },
            reads,
        )
    }
}

impl SqlAccess for RusqliteAccess {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut stmt = self.conn.prepare(sql).map_err(access_error)?;
        let affected = stmt
            .execute(rusqlite::params_from_iter(params.iter().map(to_sql)))
            .map_err(access_error)?;
        Ok(affected as u64)
    }

    fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
        self.reads.set(self.reads.get() + 1);
        let mut stmt = self.conn.prepare(sql).map_err(access_error)?;
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(to_sql)))
            .map_err(access_error)?;
        match rows.next().map_err(access_error)? {
            Some(row) => Ok(from_sql(row.get_ref(0).map_err(access_error)?)),
            None => Ok(Value::Null),
        }
    }

    fn row(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.rows(sql, params)?.into_iter().next())
    }

    fn rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.reads.set(self.reads.get() + 1);
        let mut stmt = self.conn.prepare(sql).map_err(access_error)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(to_sql)))
            .map_err(access_error)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(access_error)? {
            let mut record = Row::new();
            for (i, name) in names.iter().enumerate() {
                record.insert(name.clone(), from_sql(row.get_ref(i).map_err(access_error)?));
            }
            result.push(record);
        }
        Ok(result)
    }

    fn stream_rows(
        &self,
        sql: &str,
        params: &[Value],
        sink: &mut dyn FnMut(Row) -> Result<()>,
    ) -> Result<()> {
        for row in self.rows(sql, params)? {
            sink(row)?;
        }
        Ok(())
    }

    fn begin(&self, _isolation: Option<IsolationLevel>) -> Result<()> {
        self.conn.execute_batch("begin").map_err(access_error)
    }

    fn commit(&self) -> Result<()> {
        self.conn.execute_batch("commit").map_err(access_error)
    }

    fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("rollback").map_err(access_error)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Affected(u64),
    Scalar(Value),
    Row(Option<Row>),
    Rows(Vec<Row>),
}

/// A driver fake that records every statement and replays scripted
/// responses, for asserting on the exact SQL a dialect emits.
pub struct RecordingAccess {
    log: Rc<RefCell<Vec<String>>>,
    responses: Rc<RefCell<VecDeque<Scripted>>>,
}

impl RecordingAccess {
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            responses: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn log_handle(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.log)
    }

    pub fn response_queue(&self) -> Rc<RefCell<VecDeque<Scripted>>> {
        Rc::clone(&self.responses)
    }

    fn next(&self) -> Option<Scripted> {
        self.responses.borrow_mut().pop_front()
    }
}

impl SqlAccess for RecordingAccess {
    fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.log.borrow_mut().push(sql.to_owned());
        match self.next() {
            Some(Scripted::Affected(n)) => Ok(n),
            _ => Ok(1),
        }
    }

    fn scalar(&self, sql: &str, _params: &[Value]) -> Result<Value> {
        self.log.borrow_mut().push(sql.to_owned());
        match self.next() {
            Some(Scripted::Scalar(value)) => Ok(value),
            _ => Ok(Value::Null),
        }
    }

    fn row(&self, sql: &str, _params: &[Value]) -> Result<Option<Row>> {
        self.log.borrow_mut().push(sql.to_owned());
        match self.next() {
            Some(Scripted::Row(row)) => Ok(row),
            _ => Ok(None),
        }
    }

    fn rows(&self, sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        self.log.borrow_mut().push(sql.to_owned());
        match self.next() {
            Some(Scripted::Rows(rows)) => Ok(rows),
            _ => Ok(Vec::new()),
        }
    }

    fn stream_rows(
        &self,
        sql: &str,
        params: &[Value],
        sink: &mut dyn FnMut(Row) -> Result<()>,
    ) -> Result<()> {
        for row in self.rows(sql, params)? {
            sink(row)?;
        }
        Ok(())
    }

    fn begin(&self, _isolation: Option<IsolationLevel>) -> Result<()> {
        self.log.borrow_mut().push("<begin>".to_owned());
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.log.borrow_mut().push("<commit>".to_owned());
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.log.borrow_mut().push("<rollback>".to_owned());
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        false
    }
}

pub struct Harness {
    pub orchestrator: Arc<CrudOrchestrator>,
    pub schema: Arc<SchemaStore>,
    pub access: Arc<CachedAccess>,
    pub keys: Arc<KeyRegistry>,
    pub reads: Rc<Cell<usize>>,
}

/// The full stack over an in-memory SQLite database, fluid mode on.
pub fn sqlite_harness() -> Harness {
    sqlite_harness_with(ConversionOptions::default())
}

pub fn sqlite_harness_with(conversion: ConversionOptions) -> Harness {
    init_tracing();
    let (driver, reads) = RusqliteAccess::in_memory();
    let access = Arc::new(CachedAccess::new(
        Box::new(driver),
        Arc::new(SqliteDialect),
        500,
    ));
    let keys = Arc::new(KeyRegistry::new());
    let schema = Arc::new(SchemaStore::new(
        Arc::clone(&access),
        Arc::clone(&keys),
        conversion,
    ));
    schema.enter_fluid_mode();
    let orchestrator = CrudOrchestrator::new(
        Arc::clone(&schema),
        Arc::clone(&access),
        Arc::clone(&keys),
    );
    Harness {
        orchestrator,
        schema,
        access,
        keys,
        reads,
    }
}

pub struct RecordingHarness {
    pub orchestrator: Arc<CrudOrchestrator>,
    pub schema: Arc<SchemaStore>,
    pub access: Arc<CachedAccess>,
    pub keys: Arc<KeyRegistry>,
    pub log: Rc<RefCell<Vec<String>>>,
    pub responses: Rc<RefCell<VecDeque<Scripted>>>,
}

/// The full stack over the recording fake, for SQL-shape assertions.
/// Fluid mode stays off unless the test turns it on.
pub fn recording_harness(dialect: Arc<dyn DialectAdapter>) -> RecordingHarness {
    init_tracing();
    let driver = RecordingAccess::new();
    let log = driver.log_handle();
    let responses = driver.response_queue();
    let access = Arc::new(CachedAccess::new(Box::new(driver), dialect, 500));
    let keys = Arc::new(KeyRegistry::new());
    let schema = Arc::new(SchemaStore::new(
        Arc::clone(&access),
        Arc::clone(&keys),
        ConversionOptions::default(),
    ));
    let orchestrator = CrudOrchestrator::new(
        Arc::clone(&schema),
        Arc::clone(&access),
        Arc::clone(&keys),
    );
    RecordingHarness {
        orchestrator,
        schema,
        access,
        keys,
        log,
        responses,
    }
}
