//! SQLite adapter. The rank ladder is short because SQLite's type affinity
//! does most of the work: integer, real, text, plus a static blob rank.
//! Column types cannot be altered in place, so widening rebuilds the table.

use lazy_static::lazy_static;
use regex::Regex;

use crate::access::CachedAccess;
use crate::dialect::{DialectAdapter, insert_statement, int_field, text_field};
use crate::error::{LimberError, Result};
use crate::rank::Rank;
use crate::value::{Row, Value};

lazy_static! {
    static ref READ_ONLY: Regex =
        Regex::new(r"(?i)^\s*(select|pragma|explain|values|with)\b").unwrap();
}

pub struct SqliteDialect;

impl DialectAdapter for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn param_name(&self, index: usize) -> String {
        format!("?{}", index + 1)
    }

    fn quote_name(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn paginate(&self, page: usize, per_page: usize) -> String {
        format!("limit {} offset {}", per_page, page * per_page)
    }

    fn supports_native_boolean(&self) -> bool {
        false
    }

    fn supports_native_decimal(&self) -> bool {
        false
    }

    fn auto_key_ddl(&self, name: &str) -> String {
        // the rowid alias; generated values come back via last_insert_rowid()
        format!("{} integer primary key", self.quote_name(name))
    }

    fn rank_of(&self, value: &Value) -> Rank {
        match value {
            Value::Null => Rank::Null,
            Value::Bool(_) => Rank::Int64,
            Value::Int(_) => Rank::Int64,
            Value::UInt(u) => {
                if i64::try_from(*u).is_ok() {
                    Rank::Int64
                } else {
                    Rank::TextLong
                }
            }
            Value::Double(_) => Rank::Double,
            Value::Decimal(_) | Value::Text(_) => Rank::TextLong,
            Value::Date(_) | Value::DateTime(_) | Value::DateTimeOffset(_) | Value::Guid(_) => {
                Rank::TextLong
            }
            Value::Blob(_) => Rank::Blob,
        }
    }

    fn sql_type_of(&self, rank: Rank) -> Result<String> {
        let name = match rank {
            Rank::Int64 => "integer",
            Rank::Double => "real",
            Rank::TextLong => "text",
            Rank::Blob => "blob",
            other => {
                return Err(LimberError::Schema(format!(
                    "sqlite has no column type for the {} rank",
                    other
                )));
            }
        };
        Ok(name.to_owned())
    }

    fn rank_of_sql_type(&self, sql_type: &str) -> Rank {
        match sql_type.trim().to_lowercase().as_str() {
            "integer" => Rank::Int64,
            "real" => Rank::Double,
            "text" => Rank::TextLong,
            "blob" => Rank::Blob,
            _ => Rank::Custom,
        }
    }

    fn narrow_integer_rank(&self, _value: i64) -> Rank {
        Rank::Int64
    }

    fn convert_value(&self, value: Value) -> Value {
        match value {
            Value::Bool(b) => Value::Int(b as i64),
            Value::UInt(u) => match i64::try_from(u) {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Text(u.to_string()),
            },
            Value::Decimal(d) => Value::Text(d.to_string()),
            Value::Date(d) => Value::Text(d.to_string()),
            Value::DateTime(d) => Value::Text(d.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::DateTimeOffset(d) => Value::Text(d.to_rfc3339()),
            Value::Guid(g) => Value::Text(g.to_string()),
            other => other,
        }
    }

    fn is_read_only(&self, sql: &str) -> bool {
        READ_ONLY.is_match(sql)
    }

    fn list_tables(&self, access: &CachedAccess) -> Result<Vec<String>> {
        let rows = access.rows(
            "select name from sqlite_master where type = 'table' and name not like 'sqlite_%'",
            &[],
        )?;
        rows.iter().map(|row| text_field(row, "name")).collect()
    }

    fn list_columns(&self, access: &CachedAccess, table: &str) -> Result<Vec<Row>> {
        access.rows(
            &format!("pragma table_info({})", self.quote_name(table)),
            &[],
        )
    }

    fn column_name(&self, column: &Row) -> Result<String> {
        text_field(column, "name")
    }

    fn column_sql_type(&self, column: &Row) -> Result<String> {
        text_field(column, "type")
    }

    fn is_nullable_column(&self, column: &Row) -> bool {
        int_field(column, "notnull").unwrap_or(0) == 0
    }

    fn default_value_of(&self, column: &Row) -> Option<Value> {
        match column.get("dflt_value") {
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
        if row.is_empty() {
            access.execute(&self.empty_insert(table), &[])?;
        } else {
            let (sql, params) = insert_statement(self, table, row);
            access.execute(&sql, &params)?;
        }
        if auto_key.is_some() {
            Ok(Some(access.scalar("select last_insert_rowid()", &[])?))
        } else {
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
        if changed.is_empty() {
            for (name, rank) in added {
                access.execute(
                    &format!(
                        "alter table {} add column {} {}",
                        quoted_table,
                        self.quote_name(name),
                        self.sql_type_of(*rank)?
                    ),
                    &[],
                )?;
            }
            return Ok(());
        }

        // SQLite cannot alter a column type in place: create a replacement
        // table with the widened schema, copy the rows over, then swap it in.
        let columns = self.list_columns(access, table)?;
        let mut definitions = Vec::new();
        let mut existing = Vec::new();
        for column in &columns {
            let name = self.column_name(column)?;
            existing.push(self.quote_name(&name));
            let declared = self.column_sql_type(column)?;
            let is_key = int_field(column, "pk").unwrap_or(0) != 0;
            let definition = if is_key && declared.eq_ignore_ascii_case("integer") {
                self.auto_key_ddl(&name)
            } else if is_key {
                format!("{} {} primary key", self.quote_name(&name), declared)
            } else {
                match changed.iter().find(|(changed_name, _)| changed_name == &name) {
                    Some((_, rank)) => {
                        format!("{} {}", self.quote_name(&name), self.sql_type_of(*rank)?)
                    }
                    None => format!("{} {}", self.quote_name(&name), declared),
                }
            };
            definitions.push(definition);
        }
        for (name, rank) in added {
            definitions.push(format!(
                "{} {}",
                self.quote_name(name),
                self.sql_type_of(*rank)?
            ));
        }

        let replacement = self.quote_name(&format!("{}_widening", table));
        access.execute(
            &format!("create table {} ({})", replacement, definitions.join(", ")),
            &[],
        )?;
        let column_list = existing.join(", ");
        access.execute(
            &format!(
                "insert into {} ({}) select {} from {}",
                replacement, column_list, column_list, quoted_table
            ),
            &[],
        )?;
        access.execute(&format!("drop table {}", quoted_table), &[])?;
        access.execute(
            &format!("alter table {} rename to {}", replacement, quoted_table),
            &[],
        )?;
        Ok(())
    }
}
