//! The per-backend extension point. A dialect adapter supplies the SQL
//! fragments, the rank tables and the value conversions one backend needs;
//! everything above this trait is dialect-agnostic.

use crate::access::CachedAccess;
use crate::error::{LimberError, Result};
use crate::rank::Rank;
use crate::value::{Row, Value};

pub trait DialectAdapter {
    fn name(&self) -> &'static str;

    /// The placeholder for the parameter at `index` in generated SQL.
    fn param_name(&self, index: usize) -> String;
    fn quote_name(&self, name: &str) -> String;
    /// The trailing clause selecting one page of a result.
    fn paginate(&self, page: usize, per_page: usize) -> String;

    fn supports_native_boolean(&self) -> bool;
    fn supports_native_decimal(&self) -> bool;
    /// Column definition fragment for an auto-increment primary key.
    fn auto_key_ddl(&self, name: &str) -> String;
    /// Where an unsafe 64-bit-integer-to-double widen lands instead.
    fn safe_wide_text_rank(&self) -> Rank {
        Rank::TextLong
    }

    /// Classifies a runtime value on this dialect's rank ladder.
    fn rank_of(&self, value: &Value) -> Rank;
    /// The SQL type name backing a rank; an error for ranks this dialect
    /// never emits.
    fn sql_type_of(&self, rank: Rank) -> Result<String>;
    /// The inverse of [`sql_type_of`](Self::sql_type_of), used when
    /// introspecting existing columns. Unrecognized types map to
    /// [`Rank::Custom`].
    fn rank_of_sql_type(&self, sql_type: &str) -> Rank;
    /// The smallest integer rank on this dialect's ladder that holds the
    /// given value.
    fn narrow_integer_rank(&self, value: i64) -> Rank;
    /// Rewrites a value into the shape this dialect actually stores
    /// (boolean/decimal down-casts, temporal formatting, unsigned overflow).
    fn convert_value(&self, value: Value) -> Value;

    /// Whether the statement matches this dialect's read-only pattern.
    /// Anything else invalidates the query cache before it executes.
    fn is_read_only(&self, sql: &str) -> bool;

    // schema introspection
    fn list_tables(&self, access: &CachedAccess) -> Result<Vec<String>>;
    fn list_columns(&self, access: &CachedAccess, table: &str) -> Result<Vec<Row>>;
    fn column_name(&self, column: &Row) -> Result<String>;
    fn column_sql_type(&self, column: &Row) -> Result<String>;
    fn is_nullable_column(&self, column: &Row) -> bool;
    fn default_value_of(&self, column: &Row) -> Option<Value>;

    /// The insert form for a row with no columns at all.
    fn empty_insert(&self, table: &str) -> String {
        format!("insert into {} default values", self.quote_name(table))
    }
    /// Executes an INSERT and returns the generated key, when `auto_key`
    /// names an auto-increment column. Some backends return the key inline,
    /// others need a follow-up query.
    fn exec_insert(
        &self,
        access: &CachedAccess,
        table: &str,
        row: &Row,
        auto_key: Option<&str>,
    ) -> Result<Option<Value>>;
    /// Applies accumulated column changes (widenings) and additions in one
    /// go, in whatever form this backend's DDL requires.
    fn apply_schema_changes(
        &self,
        access: &CachedAccess,
        table: &str,
        changed: &[(String, Rank)],
        added: &[(String, Rank)],
    ) -> Result<()>;
}

/// Column names in generated statements always appear in sorted order, so
/// that the same logical row yields the same SQL text (and the same cache
/// key) every time.
pub(crate) fn sorted_names(row: &Row) -> Vec<&str> {
    let mut names: Vec<&str> = row.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

/// `insert into <table> (<columns>) values (<placeholders>)` with the
/// parameters in column order.
pub(crate) fn insert_statement(
    dialect: &dyn DialectAdapter,
    table: &str,
    row: &Row,
) -> (String, Vec<Value>) {
    let names = sorted_names(row);
    let mut columns = Vec::with_capacity(names.len());
    let mut marks = Vec::with_capacity(names.len());
    let mut params = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        columns.push(dialect.quote_name(name));
        marks.push(dialect.param_name(i));
        params.push(row[*name].clone());
    }
    let sql = format!(
        "insert into {} ({}) values ({})",
        dialect.quote_name(table),
        columns.join(", "),
        marks.join(", ")
    );
    (sql, params)
}

pub(crate) fn text_field(column: &Row, field: &str) -> Result<String> {
    match column.get(field) {
        Some(Value::Text(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(LimberError::Access(format!(
            "introspection row is missing the {} field",
            field
        ))),
    }
}

pub(crate) fn int_field(column: &Row, field: &str) -> Option<i64> {
    match column.get(field) {
        Some(Value::Int(i)) => Some(*i),
        Some(Value::UInt(u)) => i64::try_from(*u).ok(),
        Some(Value::Text(s)) => s.parse().ok(),
        _ => None,
    }
}

/// The single value of a one-column row, for introspection results whose
/// column name varies by server ("show tables" and friends).
pub(crate) fn single_value(row: &Row) -> Option<&Value> {
    row.values().next()
}
