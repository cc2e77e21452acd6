use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::error::{LimberError, Result};
use crate::value::{Row, Value};

/// The key column name a kind gets when nothing else is registered.
pub const DEFAULT_KEY_NAME: &str = "id";

/// An ordered name-to-value mapping standing in for a scalar key whenever a
/// kind has more than one key column. Every component must be non-null, and
/// once a row has been created its compound key is never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompoundKey {
    parts: Vec<(String, Value)>,
}

impl CompoundKey {
    pub fn new(parts: Vec<(String, Value)>) -> Result<Self> {
        for (name, value) in &parts {
            if value.is_null() {
                return Err(LimberError::Usage(format!(
                    "compound key component {} must not be null",
                    name
                )));
            }
        }
        Ok(Self { parts })
    }
    pub fn parts(&self) -> &[(String, Value)] {
        &self.parts
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for CompoundKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        for (name, value) in &self.parts {
            s += &format!("{}={},", name, value);
        }
        s.pop();
        write!(f, "{{{}}}", s)
    }
}

/// A resolved primary key: a scalar for single-column keys, a compound
/// value otherwise. Call sites match on the tag instead of probing runtime
/// types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Scalar(Value),
    Compound(CompoundKey),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Key::Scalar(v) => write!(f, "{}", v),
            Key::Compound(c) => write!(f, "{}", c),
        }
    }
}

#[derive(Debug, Clone)]
struct KeyDescriptor {
    names: Vec<String>,
    auto_increment: Option<bool>,
}

/// Per-kind primary-key metadata: key column names and the auto-increment
/// policy. Unregistered kinds fall back to a single conventionally named
/// auto-increment column.
#[derive(Debug)]
pub struct KeyRegistry {
    default_auto_increment: bool,
    registered: Mutex<HashMap<String, KeyDescriptor>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self {
            default_auto_increment: true,
            registered: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the defaults for one kind. Passing `None` for
    /// `auto_increment` keeps the derived policy: auto-increment iff the key
    /// is a single column and the registry default is on.
    pub fn register_key(&self, kind: &str, names: Vec<String>, auto_increment: Option<bool>) {
        self.registered.lock().unwrap().insert(
            kind.to_owned(),
            KeyDescriptor {
                names,
                auto_increment,
            },
        );
    }

    pub fn key_names(&self, kind: &str) -> Vec<String> {
        match self.registered.lock().unwrap().get(kind) {
            Some(desc) => desc.names.clone(),
            None => vec![DEFAULT_KEY_NAME.to_owned()],
        }
    }

    pub fn is_auto_increment(&self, kind: &str) -> bool {
        match self.registered.lock().unwrap().get(kind) {
            Some(desc) => desc
                .auto_increment
                .unwrap_or(desc.names.len() <= 1 && self.default_auto_increment),
            None => self.default_auto_increment,
        }
    }

    /// Reads the key carried by a row: `None` when no component is set,
    /// a usage error when a compound key is only partially set.
    pub fn key_of(&self, kind: &str, row: &Row) -> Result<Option<Key>> {
        let names = self.key_names(kind);
        if names.len() == 1 {
            return Ok(match row.get(&names[0]) {
                Some(v) if !v.is_null() => Some(Key::Scalar(v.clone())),
                _ => None,
            });
        }
        let mut parts = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in &names {
            match row.get(name) {
                Some(v) if !v.is_null() => parts.push((name.clone(), v.clone())),
                _ => missing.push(name.as_str()),
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        if !missing.is_empty() {
            return Err(LimberError::Usage(format!(
                "compound key of kind {} is missing the component(s) {}",
                kind,
                missing.join(", ")
            )));
        }
        Ok(Some(Key::Compound(CompoundKey::new(parts)?)))
    }

    /// Writes a key back into a row. Only scalar keys travel through here
    /// for single-column kinds; pushing a scalar into a multi-column kind,
    /// or a compound key into a single-column kind, is a usage error.
    pub fn set_key(&self, kind: &str, row: &mut Row, key: &Key) -> Result<()> {
        let names = self.key_names(kind);
        match key {
            Key::Scalar(value) => {
                if names.len() != 1 {
                    return Err(LimberError::Usage(format!(
                        "kind {} has a compound key; it cannot be set through the scalar path",
                        kind
                    )));
                }
                row.insert(names[0].clone(), value.clone());
            }
            Key::Compound(compound) => {
                if names.len() <= 1 {
                    return Err(LimberError::Usage(format!(
                        "kind {} has a scalar key; a compound key cannot be set on it",
                        kind
                    )));
                }
                for (name, value) in compound.parts() {
                    if !names.contains(name) {
                        return Err(LimberError::Usage(format!(
                            "{} is not a key column of kind {}",
                            name, kind
                        )));
                    }
                    row.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// Zips positionally supplied values to the kind's registered key names.
    pub fn pack_compound_key(&self, kind: &str, values: Vec<Value>) -> Result<CompoundKey> {
        let names = self.key_names(kind);
        if names.len() != values.len() {
            return Err(LimberError::Usage(format!(
                "kind {} has {} key column(s), {} value(s) given",
                kind,
                names.len(),
                values.len()
            )));
        }
        CompoundKey::new(names.into_iter().zip(values).collect())
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
