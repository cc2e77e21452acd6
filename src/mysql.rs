//! MySQL / MariaDB adapter. The short text rung is varchar(191), the widest
//! column that stays indexable under utf8mb4. No native boolean or decimal:
//! both are down-cast before ranking.

use lazy_static::lazy_static;
use regex::Regex;

use crate::access::CachedAccess;
use crate::dialect::{DialectAdapter, insert_statement, single_value, text_field};
use crate::error::{LimberError, Result};
use crate::rank::Rank;
use crate::value::{Row, Value};

lazy_static! {
    static ref READ_ONLY: Regex =
        Regex::new(r"(?i)^\s*(select|show|describe|explain)\b").unwrap();
}

pub struct MySqlDialect;

impl MySqlDialect {
    fn text_rank(&self, text: &str) -> Rank {
        if text.chars().count() <= 191 {
            Rank::TextShort
        } else if text.len() <= 65_535 {
            Rank::TextMedium
        } else {
            Rank::TextLong
        }
    }
}

impl DialectAdapter for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn param_name(&self, _index: usize) -> String {
        "?".to_owned()
    }

    fn quote_name(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn paginate(&self, page: usize, per_page: usize) -> String {
        format!("limit {}, {}", page * per_page, per_page)
    }

    fn supports_native_boolean(&self) -> bool {
        false
    }

    fn supports_native_decimal(&self) -> bool {
        false
    }

    fn auto_key_ddl(&self, name: &str) -> String {
        format!(
            "{} bigint not null auto_increment primary key",
            self.quote_name(name)
        )
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
            Value::Date(_) => Rank::TextShort,
            Value::DateTime(_) => Rank::DateTime,
            Value::DateTimeOffset(_) => Rank::TextShort,
            Value::Guid(_) => Rank::TextShort,
            Value::Blob(_) => Rank::Blob,
        }
    }

    fn sql_type_of(&self, rank: Rank) -> Result<String> {
        let name = match rank {
            Rank::Int8 => "tinyint",
            Rank::Int32 => "int",
            Rank::Int64 => "bigint",
            Rank::Double => "double",
            Rank::TextShort => "varchar(191)",
            Rank::TextMedium => "text",
            Rank::TextLong => "longtext",
            Rank::DateTime => "datetime",
            Rank::Blob => "longblob",
            other => {
                return Err(LimberError::Schema(format!(
                    "mysql has no column type for the {} rank",
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
            // display widths like tinyint(4) and bigint(20) are noise
            "tinyint" => Rank::Int8,
            "int" | "integer" => Rank::Int32,
            "bigint" => Rank::Int64,
            "double" => Rank::Double,
            "varchar" | "char" => {
                let length: usize = normalized
                    .split(['(', ')'])
                    .nth(1)
                    .and_then(|l| l.trim().parse().ok())
                    .unwrap_or(0);
                if length > 0 && length <= 191 {
                    Rank::TextShort
                } else if length > 191 {
                    Rank::TextMedium
                } else {
                    Rank::Custom
                }
            }
            "text" => Rank::TextMedium,
            "longtext" => Rank::TextLong,
            "datetime" => Rank::DateTime,
            "longblob" => Rank::Blob,
            _ => Rank::Custom,
        }
    }

    fn narrow_integer_rank(&self, value: i64) -> Rank {
        if i8::try_from(value).is_ok() {
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
            Value::Date(d) => Value::Text(d.to_string()),
            Value::DateTimeOffset(d) => Value::Text(d.to_rfc3339()),
            Value::Guid(g) => Value::Text(g.to_string()),
            other => other,
        }
    }

    fn is_read_only(&self, sql: &str) -> bool {
        READ_ONLY.is_match(sql)
    }

    fn list_tables(&self, access: &CachedAccess) -> Result<Vec<String>> {
        let rows = access.rows("show tables", &[])?;
        Ok(rows
            .iter()
            .filter_map(single_value)
            .map(|v| v.to_string())
            .collect())
    }

    fn list_columns(&self, access: &CachedAccess, table: &str) -> Result<Vec<Row>> {
        access.rows(&format!("show columns from {}", self.quote_name(table)), &[])
    }

    fn column_name(&self, column: &Row) -> Result<String> {
        text_field(column, "Field")
    }

    fn column_sql_type(&self, column: &Row) -> Result<String> {
        text_field(column, "Type")
    }

    fn is_nullable_column(&self, column: &Row) -> bool {
        matches!(column.get("Null"), Some(Value::Text(s)) if s.eq_ignore_ascii_case("yes"))
    }

    fn default_value_of(&self, column: &Row) -> Option<Value> {
        match column.get("Default") {
            Some(Value::Null) | None => None,
            Some(value) => Some(value.clone()),
        }
    }

    fn empty_insert(&self, table: &str) -> String {
        format!("insert into {} () values ()", self.quote_name(table))
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
            Ok(Some(access.scalar("select last_insert_id()", &[])?))
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
        let mut actions = Vec::with_capacity(changed.len() + added.len());
        for (name, rank) in changed {
            actions.push(format!(
                "modify column {} {}",
                self.quote_name(name),
                self.sql_type_of(*rank)?
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
