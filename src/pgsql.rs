//! PostgreSQL adapter. The richest ladder of the four: native boolean and
//! arbitrary-precision numeric, a single unbounded text rung, and the full
//! static zone (timestamp, timestamptz, uuid, bytea). Generated keys come
//! back inline through a returning clause.

use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;

use bigdecimal::BigDecimal;

use crate::access::CachedAccess;
use crate::dialect::{DialectAdapter, insert_statement, text_field};
use crate::error::{LimberError, Result};
use crate::rank::Rank;
use crate::value::{Row, Value};

lazy_static! {
    static ref READ_ONLY: Regex =
        Regex::new(r"(?i)^\s*(select|show|explain|with)\b").unwrap();
}

pub struct PgSqlDialect;

impl DialectAdapter for PgSqlDialect {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    fn param_name(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn quote_name(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn paginate(&self, page: usize, per_page: usize) -> String {
        format!("limit {} offset {}", per_page, page * per_page)
    }

    fn supports_native_boolean(&self) -> bool {
        true
    }

    fn supports_native_decimal(&self) -> bool {
        true
    }

    fn auto_key_ddl(&self, name: &str) -> String {
        format!("{} bigserial primary key", self.quote_name(name))
    }

    fn rank_of(&self, value: &Value) -> Rank {
        match value {
            Value::Null => Rank::Null,
            Value::Bool(_) => Rank::Bool,
            Value::Int(i) => self.narrow_integer_rank(*i),
            Value::UInt(u) => match i64::try_from(*u) {
                Ok(i) => self.narrow_integer_rank(i),
                Err(_) => Rank::Numeric,
            },
            Value::Double(_) => Rank::Double,
            Value::Decimal(_) => Rank::Numeric,
            Value::Text(_) => Rank::TextLong,
            Value::Date(_) | Value::DateTime(_) => Rank::DateTime,
            Value::DateTimeOffset(_) => Rank::DateTimeOffset,
            Value::Guid(_) => Rank::Guid,
            Value::Blob(_) => Rank::Blob,
        }
    }

    fn sql_type_of(&self, rank: Rank) -> Result<String> {
        let name = match rank {
            Rank::Bool => "boolean",
            Rank::Int32 => "integer",
            Rank::Int64 => "bigint",
            Rank::Double => "double precision",
            Rank::Numeric => "numeric",
            Rank::TextLong => "text",
            Rank::DateTime => "timestamp",
            Rank::DateTimeOffset => "timestamptz",
            Rank::Guid => "uuid",
            Rank::Blob => "bytea",
            other => {
                return Err(LimberError::Schema(format!(
                    "pgsql has no column type for the {} rank",
                    other
                )));
            }
        };
        Ok(name.to_owned())
    }

    fn rank_of_sql_type(&self, sql_type: &str) -> Rank {
        match sql_type.trim().to_lowercase().as_str() {
            "boolean" | "bool" => Rank::Bool,
            "integer" | "int" | "int4" => Rank::Int32,
            "bigint" | "int8" => Rank::Int64,
            "double precision" | "float8" => Rank::Double,
            "numeric" | "decimal" => Rank::Numeric,
            "text" => Rank::TextLong,
            "timestamp" | "timestamp without time zone" => Rank::DateTime,
            "timestamptz" | "timestamp with time zone" => Rank::DateTimeOffset,
            "uuid" => Rank::Guid,
            "bytea" => Rank::Blob,
            _ => Rank::Custom,
        }
    }

    fn narrow_integer_rank(&self, value: i64) -> Rank {
        if i32::try_from(value).is_ok() {
            Rank::Int32
        } else {
            Rank::Int64
        }
    }

    fn convert_value(&self, value: Value) -> Value {
        match value {
            // numeric holds the full unsigned range exactly
            Value::UInt(u) => match i64::try_from(u) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Decimal(BigDecimal::from(u)),
            },
            Value::Date(d) => Value::DateTime(d.and_time(NaiveTime::MIN)),
            other => other,
        }
    }

    fn is_read_only(&self, sql: &str) -> bool {
        READ_ONLY.is_match(sql)
    }

    fn list_tables(&self, access: &CachedAccess) -> Result<Vec<String>> {
        let rows = access.rows(
            "select table_name from information_schema.tables \
             where table_schema = 'public' and table_type = 'BASE TABLE'",
            &[],
        )?;
        rows.iter()
            .map(|row| text_field(row, "table_name"))
            .collect()
    }

    fn list_columns(&self, access: &CachedAccess, table: &str) -> Result<Vec<Row>> {
        access.rows(
            "select column_name, data_type, is_nullable, column_default \
             from information_schema.columns where table_name = $1",
            &[Value::Text(table.to_owned())],
        )
    }

    fn column_name(&self, column: &Row) -> Result<String> {
        text_field(column, "column_name")
    }

    fn column_sql_type(&self, column: &Row) -> Result<String> {
        text_field(column, "data_type")
    }

    fn is_nullable_column(&self, column: &Row) -> bool {
        matches!(column.get("is_nullable"), Some(Value::Text(s)) if s.eq_ignore_ascii_case("yes"))
    }

    fn default_value_of(&self, column: &Row) -> Option<Value> {
        match column.get("column_default") {
            Some(Value::Null) | None => None,
            Some(value) => Some(value.clone()),
        }
    }

    fn exec_insert(
        &self,
        access: &CachedAccess,
        table: &str,
        row: &Row,
        auto_key: Option<&str>,
    ) -> Result<Option<Value>> {
        let (mut sql, params) = if row.is_empty() {
            (self.empty_insert(table), Vec::new())
        } else {
            insert_statement(self, table, row)
        };
        match auto_key {
            Some(key) => {
                sql.push_str(&format!(" returning {}", self.quote_name(key)));
                Ok(Some(access.scalar(&sql, &params)?))
            }
            None => {
                access.execute(&sql, &params)?;
                Ok(None)
            }
        }
    }

    fn apply_schema_changes(
        &self,
        access: &CachedAccess,
        table: &str,
        changed: &[(String, Rank)],
        added: &[(String, Rank)],
    ) -> Result<()> {
        let mut actions = Vec::with_capacity(changed.len() + added.len());
        for (name, rank) in changed {
            let quoted = self.quote_name(name);
            let sql_type = self.sql_type_of(*rank)?;
            // widening casts like bigint to text are not implicit in
            // postgres, hence the explicit using clause
            actions.push(format!(
                "alter column {} type {} using {}::{}",
                quoted, sql_type, quoted, sql_type
            ));
        }
        for (name, rank) in added {
            actions.push(format!(
                "add column {} {}",
                self.quote_name(name),
                self.sql_type_of(*rank)?
            ));
        }
        access.execute(
            &format!("alter table {} {}", self.quote_name(table), actions.join(", ")),
            &[],
        )?;
        Ok(())
    }
}
