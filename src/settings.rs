use std::sync::Arc;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::access::IsolationLevel;
use crate::dialect::DialectAdapter;
use crate::error::{LimberError, Result};
use crate::mssql::MsSqlDialect;
use crate::mysql::MySqlDialect;
use crate::pgsql::PgSqlDialect;
use crate::sqlite::SqliteDialect;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Sqlite,
    Mysql,
    Pgsql,
    Mssql,
}

impl DialectKind {
    /// The bundled adapter for this dialect.
    pub fn adapter(self) -> Arc<dyn DialectAdapter> {
        match self {
            DialectKind::Sqlite => Arc::new(SqliteDialect),
            DialectKind::Mysql => Arc::new(MySqlDialect),
            DialectKind::Pgsql => Arc::new(PgSqlDialect),
            DialectKind::Mssql => Arc::new(MsSqlDialect),
        }
    }
}

/// The generic value-conversion rules applied to every property on its way
/// into the store, before the dialect's own conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    pub trim_strings: bool,
    pub empty_string_as_null: bool,
    pub recognize_integers: bool,
}

impl ConversionOptions {
    pub fn apply(&self, value: Value) -> Value {
        let Value::Text(text) = value else {
            return value;
        };
        let text = if self.trim_strings {
            text.trim().to_owned()
        } else {
            text
        };
        if self.empty_string_as_null && text.is_empty() {
            return Value::Null;
        }
        if self.recognize_integers {
            if let Some(integer) = exact_integer(&text) {
                return Value::Int(integer);
            }
        }
        Value::Text(text)
    }
}

/// Only strings that round-trip exactly become integers: "007", "+5" and
/// anything outside the 64-bit range stay text.
fn exact_integer(text: &str) -> Option<i64> {
    let integer: i64 = text.parse().ok()?;
    if integer.to_string() == text {
        Some(integer)
    } else {
        None
    }
}

/// Runtime configuration, loadable from a `limber` config file and
/// `LIMBER_`-prefixed environment variables. Every field has a default, so
/// an empty source yields `Settings::default()`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dialect: DialectKind,
    pub trim_strings: bool,
    pub empty_string_as_null: bool,
    pub recognize_integers: bool,
    pub dirty_tracking: bool,
    pub implicit_transactions: bool,
    pub transaction_isolation: Option<IsolationLevel>,
    pub cache_capacity: usize,
    pub initial_fluid_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            trim_strings: false,
            empty_string_as_null: false,
            recognize_integers: false,
            dirty_tracking: true,
            implicit_transactions: true,
            transaction_isolation: None,
            cache_capacity: 500,
            initial_fluid_mode: false,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("limber").required(false))
            .add_source(Environment::with_prefix("LIMBER"))
            .build()
            .map_err(|e| LimberError::Config(e.to_string()))?;
        config
            .try_deserialize()
            .map_err(|e| LimberError::Config(e.to_string()))
    }

    pub fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            trim_strings: self.trim_strings,
            empty_string_as_null: self.empty_string_as_null,
            recognize_integers: self.recognize_integers,
        }
    }
}
