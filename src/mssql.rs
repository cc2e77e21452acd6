//! SQL Server adapter. Its tinyint is unsigned (0..=255), the text ladder
//! climbs nvarchar(32) / nvarchar(4000) / nvarchar(MAX), and generated keys
//! come back inline through an output clause. Booleans and decimals are
//! down-cast before ranking.

use chrono::NaiveTime;
use lazy_static::lazy_static;
use regex::Regex;

use crate::access::CachedAccess;
use crate::dialect::{DialectAdapter, int_field, sorted_names, text_field};
use crate::error::{LimberError, Result};
use crate::rank::Rank;
use crate::value::{Row, Value};

lazy_static! {
    static ref READ_ONLY: Regex = Regex::new(r"(?i)^\s*select\b").unwrap();
}

pub struct MsSqlDialect;

impl MsSqlDialect {
    fn text_rank(&self, text: &str) -> Rank {
        let length = text.chars().count();
        if length <= 32 {
            Rank::TextShort
        } else if length <= 4000 {
            Rank::TextMedium
        } else {
            Rank::TextLong
        }
    }
}

impl DialectAdapter for MsSqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn param_name(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn quote_name(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn paginate(&self, page: usize, per_page: usize) -> String {
        format!(
            "offset {} rows fetch next {} rows only",
            page * per_page,
            per_page
        )
    }

    fn supports_native_boolean(&self) -> bool {
        false
    }

    fn supports_native_decimal(&self) -> bool {
        false
    }

    fn auto_key_ddl(&self, name: &str) -> String {
        format!("{} bigint identity(1,1) primary key", self.quote_name(name))
    }

    fn rank_of(&self, value: &Value) -> Rank {
        match value {
            Value::Null => Rank::Null,
            Value::Bool(_) => Rank::Int8,
            Value::Int(i) => self.narrow_integer_rank(*i),
            Value::UInt(u) => match i64::try_from(*u) {
                Ok(i) => self.narrow_integer_rank(i),
                Err(_) => self.text_rank(&u.to_string()),
            },
            Value::Double(_) => Rank::Double,
            Value::Decimal(d) => self.text_rank(&d.to_string()),
            Value::Text(s) => self.text_rank(s),
            Value::Date(_) | Value::DateTime(_) => Rank::DateTime,
            Value::DateTimeOffset(_) => Rank::DateTimeOffset,
            Value::Guid(_) => Rank::Guid,
            Value::Blob(_) => Rank::Blob,
        }
    }

    fn sql_type_of(&self, rank: Rank) -> Result<String> {
        let name = match rank {
            Rank::Int8 => "tinyint",
            Rank::Int32 => "int",
            Rank::Int64 => "bigint",
            Rank::Double => "float(53)",
            Rank::TextShort => "nvarchar(32)",
            Rank::TextMedium => "nvarchar(4000)",
            Rank::TextLong => "nvarchar(max)",
            Rank::DateTime => "datetime2",
            Rank::DateTimeOffset => "datetimeoffset",
            Rank::Guid => "uniqueidentifier",
            Rank::Blob => "varbinary(max)",
            other => {
                return Err(LimberError::Schema(format!(
                    "mssql has no column type for the {} rank",
                    other
                )));
            }
        };
        Ok(name.to_owned())
    }

    fn rank_of_sql_type(&self, sql_type: &str) -> Rank {
        let normalized = sql_type.trim().to_lowercase();
        let base = normalized.split('(').next().unwrap_or("").trim();
        match base {
            "tinyint" => Rank::Int8,
            "int" => Rank::Int32,
            "bigint" => Rank::Int64,
            "float" | "real" => Rank::Double,
            "nvarchar" | "nchar" | "varchar" => {
                if normalized.contains("max") {
                    return Rank::TextLong;
                }
                let length: usize = normalized
                    .split(['(', ')'])
                    .nth(1)
                    .and_then(|l| l.trim().parse().ok())
                    .unwrap_or(0);
                if length > 0 && length <= 32 {
                    Rank::TextShort
                } else if length > 32 && length <= 4000 {
                    Rank::TextMedium
                } else {
                    Rank::Custom
                }
            }
            "datetime2" | "datetime" => Rank::DateTime,
            "datetimeoffset" => Rank::DateTimeOffset,
            "uniqueidentifier" => Rank::Guid,
            "varbinary" => Rank::Blob,
            _ => Rank::Custom,
        }
    }

    fn narrow_integer_rank(&self, value: i64) -> Rank {
        if (0..=255).contains(&value) {
            Rank::Int8
        } else if i32::try_from(value).is_ok() {
            Rank::Int32
        } else {
            Rank::Int64
        }
    }

    fn convert_value(&self, value: Value) -> Value {
        match value {
            Value::Bool(b) => Value::Int(b as i64),
            Value::UInt(u) => match i64::try_from(u) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(u.to_string()),
            },
            Value::Decimal(d) => Value::Text(d.to_string()),
            Value::Date(d) => Value::DateTime(d.and_time(NaiveTime::MIN)),
            other => other,
        }
    }

    fn is_read_only(&self, sql: &str) -> bool {
        READ_ONLY.is_match(sql)
    }

    fn list_tables(&self, access: &CachedAccess) -> Result<Vec<String>> {
        let rows = access.rows(
            "select table_name from information_schema.tables where table_type = 'BASE TABLE'",
            &[],
        )?;
        rows.iter()
            .map(|row| text_field(row, "table_name"))
            .collect()
    }

    fn list_columns(&self, access: &CachedAccess, table: &str) -> Result<Vec<Row>> {
        access.rows(
            "select column_name, data_type, character_maximum_length, is_nullable, column_default \
             from information_schema.columns where table_name = @p0",
            &[Value::Text(table.to_owned())],
        )
    }

    fn column_name(&self, column: &Row) -> Result<String> {
        text_field(column, "column_name")
    }

    fn column_sql_type(&self, column: &Row) -> Result<String> {
        let base = text_field(column, "data_type")?;
        // re-attach the length so the type round-trips through the ladder
        if matches!(base.as_str(), "nvarchar" | "nchar" | "varchar" | "varbinary") {
            match int_field(column, "character_maximum_length") {
                Some(-1) => return Ok(format!("{}(max)", base)),
                Some(length) => return Ok(format!("{}({})", base, length)),
                None => {}
            }
        }
        Ok(base)
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
        let quoted_table = self.quote_name(table);
        let output = auto_key
            .map(|key| format!(" output inserted.{}", self.quote_name(key)))
            .unwrap_or_default();
        let (sql, params) = if row.is_empty() {
            (format!("insert into {}{} default values", quoted_table, output), Vec::new())
        } else {
            let names = sorted_names(row);
            let mut columns = Vec::with_capacity(names.len());
            let mut marks = Vec::with_capacity(names.len());
            let mut params = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                columns.push(self.quote_name(name));
                marks.push(self.param_name(i));
                params.push(row[*name].clone());
            }
            (
                format!(
                    "insert into {} ({}){} values ({})",
                    quoted_table,
                    columns.join(", "),
                    output,
                    marks.join(", ")
                ),
                params,
            )
        };
        if auto_key.is_some() {
            Ok(Some(access.scalar(&sql, &params)?))
        } else {
            access.execute(&sql, &params)?;
            Ok(None)
        }
    }

    fn apply_schema_changes(
        &self,
        access: &CachedAccess,
        table: &str,
        changed: &[(String, Rank)],
        added: &[(String, Rank)],
    ) -> Result<()> {
        let quoted_table = self.quote_name(table);
        // one statement per action: alter table accepts no action list here
        for (name, rank) in changed {
            access.execute(
                &format!(
                    "alter table {} alter column {} {}",
                    quoted_table,
                    self.quote_name(name),
                    self.sql_type_of(*rank)?
                ),
                &[],
            )?;
        }
        for (name, rank) in added {
            access.execute(
                &format!(
                    "alter table {} add {} {}",
                    quoted_table,
                    self.quote_name(name),
                    self.sql_type_of(*rank)?
                ),
                &[],
            )?;
        }
        Ok(())
    }
}
