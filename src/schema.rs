//! The schema store: owner of the live schema snapshot, executor of reads,
//! writes and deletes, and home of the widening / create-table algorithm
//! that fluid mode runs on every write.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::access::CachedAccess;
use crate::dialect::sorted_names;
use crate::error::{LimberError, Result};
use crate::keys::{Key, KeyRegistry};
use crate::rank::Rank;
use crate::settings::ConversionOptions;
use crate::value::{Row, Value};

/// The live schema as last introspected: kind to column-to-rank map.
/// Auto-increment key columns are not part of it.
pub type Schema = HashMap<String, HashMap<String, Rank>>;

pub struct SchemaStore {
    access: Arc<CachedAccess>,
    keys: Arc<KeyRegistry>,
    conversion: ConversionOptions,
    fluid: AtomicBool,
    snapshot: Mutex<Option<Schema>>,
}

impl SchemaStore {
    pub fn new(
        access: Arc<CachedAccess>,
        keys: Arc<KeyRegistry>,
        conversion: ConversionOptions,
    ) -> Self {
        Self {
            access,
            keys,
            conversion,
            fluid: AtomicBool::new(false),
            snapshot: Mutex::new(None),
        }
    }

    /// In fluid mode, missing tables and columns are created or widened
    /// automatically from the data written. Outside it the schema is assumed
    /// to already match.
    pub fn enter_fluid_mode(&self) {
        self.fluid.store(true, Ordering::Relaxed);
    }
    pub fn exit_fluid_mode(&self) {
        self.fluid.store(false, Ordering::Relaxed);
    }
    pub fn is_fluid_mode(&self) -> bool {
        self.fluid.load(Ordering::Relaxed)
    }

    pub fn access(&self) -> &Arc<CachedAccess> {
        &self.access
    }

    /// A copy of the current snapshot, introspecting the database if none
    /// has been loaded yet.
    pub fn get_schema(&self) -> Result<Schema> {
        self.with_schema(|schema| schema.clone())
    }

    /// Discards the snapshot so the next consultation reloads it. Called
    /// after every create/alter.
    pub fn invalidate_schema(&self) {
        *self.snapshot.lock().unwrap() = None;
    }

    pub fn is_known_kind(&self, kind: &str) -> Result<bool> {
        self.with_schema(|schema| schema.contains_key(kind))
    }

    fn schema_of(&self, kind: &str) -> Result<Option<HashMap<String, Rank>>> {
        self.with_schema(|schema| schema.get(kind).cloned())
    }

    fn with_schema<T>(&self, read: impl FnOnce(&Schema) -> T) -> Result<T> {
        let mut guard = self.snapshot.lock().unwrap();
        if guard.is_none() {
            *guard = Some(self.load_schema()?);
        }
        Ok(read(guard.as_ref().unwrap()))
    }

    fn load_schema(&self) -> Result<Schema> {
        let dialect = self.access.dialect();
        let mut schema = Schema::new();
        for table in dialect.list_tables(&self.access)? {
            let auto = self.keys.is_auto_increment(&table);
            let key_names = self.keys.key_names(&table);
            let mut columns = HashMap::new();
            for column in dialect.list_columns(&self.access, &table)? {
                let name = dialect.column_name(&column)?;
                if auto && key_names.contains(&name) {
                    // generated key columns never take part in evolution
                    continue;
                }
                // only a nullable, default-less column is eligible for
                // automatic evolution; everything else is pinned
                let rank = if !dialect.is_nullable_column(&column)
                    || dialect.default_value_of(&column).is_some()
                {
                    Rank::Custom
                } else {
                    dialect.rank_of_sql_type(&dialect.column_sql_type(&column)?)
                };
                columns.insert(name, rank);
            }
            schema.insert(table, columns);
        }
        debug!(tables = schema.len(), "loaded schema snapshot");
        Ok(schema)
    }

    /// Whether storing this row would insert rather than update: for
    /// auto-increment kinds a row is new iff it carries no key value, for
    /// the rest iff no stored row has its key.
    pub fn is_new(&self, kind: &str, row: &Row) -> Result<bool> {
        Ok(self.resolve_key(kind, row)?.1)
    }

    fn resolve_key(&self, kind: &str, row: &Row) -> Result<(Option<Key>, bool)> {
        let auto = self.keys.is_auto_increment(kind);
        let key = self.keys.key_of(kind, row)?;
        let is_new = match (&key, auto) {
            (None, true) => true,
            (Some(_), true) => false,
            (None, false) => {
                return Err(LimberError::Usage(format!(
                    "cannot store a {} row: auto-increment is disabled and no key value is set",
                    kind
                )));
            }
            (Some(key), false) => {
                if self.is_fluid_mode() && !self.is_known_kind(kind)? {
                    true
                } else {
                    self.count_rows(kind, key)? == 0
                }
            }
        };
        Ok((key, is_new))
    }

    fn count_rows(&self, kind: &str, key: &Key) -> Result<i64> {
        let dialect = self.access.dialect();
        let (condition, params) = self.key_condition(kind, key, 0)?;
        let sql = format!(
            "select count(*) from {} where {}",
            dialect.quote_name(kind),
            condition
        );
        match self.access.scalar(&sql, &params)? {
            Value::Int(count) => Ok(count),
            Value::UInt(count) => Ok(count as i64),
            other => Err(LimberError::Access(format!(
                "count(*) returned a {} value",
                other.type_name()
            ))),
        }
    }

    fn key_condition(
        &self,
        kind: &str,
        key: &Key,
        param_offset: usize,
    ) -> Result<(String, Vec<Value>)> {
        let dialect = self.access.dialect();
        let names = self.keys.key_names(kind);
        match key {
            Key::Scalar(value) => {
                if names.len() != 1 {
                    return Err(LimberError::Usage(format!(
                        "kind {} has a compound key; a scalar key cannot address it",
                        kind
                    )));
                }
                Ok((
                    format!(
                        "{} = {}",
                        dialect.quote_name(&names[0]),
                        dialect.param_name(param_offset)
                    ),
                    vec![value.clone()],
                ))
            }
            Key::Compound(compound) => {
                if names.len() <= 1 {
                    return Err(LimberError::Usage(format!(
                        "kind {} has a scalar key; a compound key cannot address it",
                        kind
                    )));
                }
                let mut clauses = Vec::with_capacity(names.len());
                let mut params = Vec::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    let value = compound.get(name).ok_or_else(|| {
                        LimberError::Usage(format!(
                            "the compound key is missing the {} component of kind {}",
                            name, kind
                        ))
                    })?;
                    clauses.push(format!(
                        "{} = {}",
                        dialect.quote_name(name),
                        dialect.param_name(param_offset + i)
                    ));
                    params.push(value.clone());
                }
                Ok((clauses.join(" and "), params))
            }
        }
    }

    /// Persists one row, evolving the schema first when fluid mode is on,
    /// and returns the resolved key. Compound keys are never produced here,
    /// only verified. `dirty` restricts an update to the named columns.
    pub fn store(&self, kind: &str, mut row: Row, dirty: Option<&HashSet<String>>) -> Result<Key> {
        let key_names = self.keys.key_names(kind);
        let (key, is_new) = self.resolve_key(kind, &row)?;

        if !is_new {
            // keys are immutable after creation, never part of the write set
            for name in &key_names {
                row.remove(name);
            }
        }
        if let Some(dirty) = dirty {
            row.retain(|name, _| dirty.contains(name));
        }

        let dialect = Arc::clone(self.access.dialect());
        let mut converted = Row::with_capacity(row.len());
        for (name, value) in row {
            converted.insert(name, dialect.convert_value(self.conversion.apply(value)));
        }
        let mut row = converted;

        if self.is_fluid_mode() {
            let known = self.schema_of(kind)?;
            // a null value alone can never justify creating a typed column
            match &known {
                Some(columns) => {
                    row.retain(|name, value| !value.is_null() || columns.contains_key(name))
                }
                None => row.retain(|_, value| !value.is_null()),
            }
            self.evolve(kind, &row, known)?;
        }

        if is_new {
            let auto_key = if self.keys.is_auto_increment(kind) {
                Some(key_names[0].clone())
            } else {
                None
            };
            let generated = dialect.exec_insert(&self.access, kind, &row, auto_key.as_deref())?;
            return match (key, generated) {
                (Some(key), _) => Ok(key),
                (None, Some(value)) => Ok(Key::Scalar(value)),
                (None, None) => Err(LimberError::Access(format!(
                    "the {} insert returned no generated key",
                    kind
                ))),
            };
        }

        let key = key.expect("an update always has a key");
        if row.is_empty() {
            // dirty tracking left nothing to write
            return Ok(key);
        }
        let names = sorted_names(&row);
        let mut assignments = Vec::with_capacity(names.len());
        let mut params = Vec::with_capacity(names.len() + key_names.len());
        for (i, name) in names.iter().enumerate() {
            assignments.push(format!(
                "{} = {}",
                dialect.quote_name(name),
                dialect.param_name(i)
            ));
            params.push(row[*name].clone());
        }
        let (condition, mut key_params) = self.key_condition(kind, &key, names.len())?;
        params.append(&mut key_params);
        let sql = format!(
            "update {} set {} where {}",
            dialect.quote_name(kind),
            assignments.join(", "),
            condition
        );
        let affected = self.access.execute(&sql, &params)?;
        if affected == 0 {
            return Err(LimberError::RowNotFound {
                kind: kind.to_owned(),
                key: key.to_string(),
            });
        }
        Ok(key)
    }

    /// The stored row under the given key, or none. In fluid mode an
    /// unknown kind short-circuits: nothing can exist in a table that was
    /// never created.
    pub fn load(&self, kind: &str, key: &Key) -> Result<Option<Row>> {
        if self.is_fluid_mode() && !self.is_known_kind(kind)? {
            return Ok(None);
        }
        let dialect = self.access.dialect();
        let (condition, params) = self.key_condition(kind, key, 0)?;
        let sql = format!(
            "select * from {} where {}",
            dialect.quote_name(kind),
            condition
        );
        self.access.row(&sql, &params)
    }

    /// Deletes the row under the given key; a no-op for unknown kinds in
    /// fluid mode.
    pub fn trash(&self, kind: &str, key: &Key) -> Result<()> {
        if self.is_fluid_mode() && !self.is_known_kind(kind)? {
            return Ok(());
        }
        let dialect = self.access.dialect();
        let (condition, params) = self.key_condition(kind, key, 0)?;
        let sql = format!(
            "delete from {} where {}",
            dialect.quote_name(kind),
            condition
        );
        self.access.execute(&sql, &params)?;
        Ok(())
    }

    fn evolve(
        &self,
        kind: &str,
        row: &Row,
        known: Option<HashMap<String, Rank>>,
    ) -> Result<()> {
        let dialect = Arc::clone(self.access.dialect());
        let names = sorted_names(row);
        match known {
            None => {
                let mut definitions = Vec::with_capacity(names.len() + 1);
                if self.keys.is_auto_increment(kind) {
                    definitions.push(dialect.auto_key_ddl(&self.keys.key_names(kind)[0]));
                }
                for name in &names {
                    let value = &row[*name];
                    let rank = dialect.rank_of(value);
                    if rank.is_custom() {
                        return Err(LimberError::Schema(format!(
                            "cannot auto-create column {}.{} for a {} value",
                            kind,
                            name,
                            value.type_name()
                        )));
                    }
                    definitions.push(format!(
                        "{} {}",
                        dialect.quote_name(name),
                        dialect.sql_type_of(rank)?
                    ));
                }
                info!(table = kind, "creating table");
                self.access.execute(
                    &format!(
                        "create table {} ({})",
                        dialect.quote_name(kind),
                        definitions.join(", ")
                    ),
                    &[],
                )?;
                self.invalidate_schema();
            }
            Some(columns) => {
                let mut changed = Vec::new();
                let mut added = Vec::new();
                for name in &names {
                    let value = &row[*name];
                    let new_rank = dialect.rank_of(value);
                    match columns.get(*name) {
                        Some(&current) => {
                            if current.can_widen_to(new_rank) {
                                let mut target = new_rank;
                                if current == Rank::Int64
                                    && new_rank == Rank::Double
                                    && !self.int64_column_fits_double(kind, name)?
                                {
                                    target = dialect.safe_wide_text_rank();
                                }
                                info!(table = kind, column = %name, from = %current, to = %target, "widening column");
                                changed.push(((*name).to_owned(), target));
                            }
                        }
                        None => {
                            if new_rank.is_custom() {
                                return Err(LimberError::Schema(format!(
                                    "cannot auto-create column {}.{} for a {} value",
                                    kind,
                                    name,
                                    value.type_name()
                                )));
                            }
                            info!(table = kind, column = %name, rank = %new_rank, "adding column");
                            added.push(((*name).to_owned(), new_rank));
                        }
                    }
                }
                if !changed.is_empty() || !added.is_empty() {
                    dialect.apply_schema_changes(&self.access, kind, &changed, &added)?;
                    self.invalidate_schema();
                }
            }
        }
        Ok(())
    }

    /// Doubles hold integers exactly only up to 2^53, so an int64 column is
    /// scanned before it may widen to double; outside the safe range the
    /// caller falls back to the dialect's wide text rank instead. The probe
    /// runs outside any transaction relative to the alter that follows:
    /// under concurrent writers that is a time-of-check/time-of-use gap,
    /// accepted for as long as schema evolution has no locking story.
    fn int64_column_fits_double(&self, kind: &str, column: &str) -> Result<bool> {
        const DOUBLE_SAFE: u64 = 1 << 53;
        let dialect = self.access.dialect();
        let quoted = dialect.quote_name(column);
        let sql = format!(
            "select min({}) as {}, max({}) as {} from {}",
            quoted,
            dialect.quote_name("low"),
            quoted,
            dialect.quote_name("high"),
            dialect.quote_name(kind)
        );
        let Some(bounds) = self.access.row(&sql, &[])? else {
            return Ok(true);
        };
        let fits = |value: Option<&Value>| match value {
            Some(Value::Int(i)) => i.unsigned_abs() <= DOUBLE_SAFE,
            Some(Value::UInt(u)) => *u <= DOUBLE_SAFE,
            _ => true, // empty column
        };
        Ok(fits(bounds.get("low")) && fits(bounds.get("high")))
    }
}
