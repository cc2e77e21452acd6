use std::collections::{HashMap, HashSet};
use std::sync::Weak;

use crate::crud::CrudOrchestrator;
use crate::value::{Row, Value};

/// An in-memory, dynamically typed record destined for one row of its
/// kind's table.
///
/// Entities obtained through the orchestrator's dispense or load operations
/// are storable; directly constructed ones never are. The dirty snapshot
/// remembers each property's value before the current pending changes,
/// recorded lazily on first change and cleared after every successful
/// persist or load. The owner reference is set once, at creation, and the
/// entity is never transferred to another orchestrator.
#[derive(Debug)]
pub struct Entity {
    kind: String,
    props: Row,
    dirty: HashMap<String, Option<Value>>,
    dispensed: bool,
    owner: Weak<CrudOrchestrator>,
}

impl Entity {
    /// A detached entity. It can hold properties, but the orchestrator will
    /// refuse to persist it; use the dispense operation instead.
    pub fn detached(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            props: Row::new(),
            dirty: HashMap::new(),
            dispensed: false,
            owner: Weak::new(),
        }
    }

    pub(crate) fn dispensed_by(kind: &str, owner: Weak<CrudOrchestrator>) -> Self {
        Self {
            kind: kind.to_owned(),
            props: Row::new(),
            dirty: HashMap::new(),
            dispensed: true,
            owner,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_dispensed(&self) -> bool {
        self.dispensed
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn properties(&self) -> &Row {
        &self.props
    }

    /// Sets a property, recording its previous value in the dirty snapshot
    /// on the first change. A snapshot entry of `None` means the property
    /// did not exist before.
    pub fn put(&mut self, name: &str, value: impl Into<Value>) {
        let previous = self.props.get(name).cloned();
        self.dirty.entry(name.to_owned()).or_insert(previous);
        self.props.insert(name.to_owned(), value.into());
    }

    /// Removes a property altogether. To write a null, put a null instead.
    pub fn unset(&mut self, name: &str) {
        if let Some(previous) = self.props.remove(name) {
            self.dirty.entry(name.to_owned()).or_insert(Some(previous));
        }
    }

    /// The properties whose current value actually differs from the
    /// snapshot: setting a property back to its original value takes it off
    /// this list again.
    pub fn dirty_names(&self) -> HashSet<String> {
        self.dirty
            .iter()
            .filter(|(name, before)| self.props.get(*name) != before.as_ref())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn export(&self) -> Row {
        self.props.clone()
    }

    pub(crate) fn import(&mut self, row: Row) {
        self.props = row;
    }

    pub(crate) fn props_mut(&mut self) -> &mut Row {
        &mut self.props
    }

    pub(crate) fn is_owned_by(&self, orchestrator: &Weak<CrudOrchestrator>) -> bool {
        self.owner.upgrade().is_some() && Weak::ptr_eq(&self.owner, orchestrator)
    }
}
