//! The lifecycle orchestrator: dispense, load, store and trash, each
//! sequencing validation, hook dispatch, dirty-tracked writes and the
//! implicit transaction around the schema store.

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use crate::access::CachedAccess;
use crate::entity::Entity;
use crate::error::{LimberError, Result};
use crate::keys::{Key, KeyRegistry};
use crate::schema::SchemaStore;

/// Lifecycle hooks around every entity operation, all no-ops by default.
///
/// An observer reporting `Some(kind)` from
/// [`observed_kind`](EntityObserver::observed_kind) fires only for entities
/// of that kind and before every global observer; within each group
/// observers fire in registration order. A hook error aborts the remaining
/// chain and rolls the enclosing transaction back.
pub trait EntityObserver: Any {
    fn observed_kind(&self) -> Option<&str> {
        None
    }
    fn after_dispense(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn before_load(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn after_load(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn before_store(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn before_insert(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn before_update(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn after_insert(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn after_update(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn after_store(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn before_trash(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
    fn after_trash(&self, _entity: &mut Entity) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Observers {
    list: Vec<Box<dyn EntityObserver>>,
    seen: HashSet<TypeId>,
}

pub struct CrudOrchestrator {
    schema: Arc<SchemaStore>,
    access: Arc<CachedAccess>,
    keys: Arc<KeyRegistry>,
    observers: Mutex<Observers>,
    dirty_tracking: bool,
    implicit_transactions: bool,
    // handed to every dispensed entity as its owner reference
    self_weak: Weak<CrudOrchestrator>,
}

impl CrudOrchestrator {
    pub fn new(
        schema: Arc<SchemaStore>,
        access: Arc<CachedAccess>,
        keys: Arc<KeyRegistry>,
    ) -> Arc<Self> {
        Self::with_options(schema, access, keys, true, true)
    }

    pub fn with_options(
        schema: Arc<SchemaStore>,
        access: Arc<CachedAccess>,
        keys: Arc<KeyRegistry>,
        dirty_tracking: bool,
        implicit_transactions: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            schema,
            access,
            keys,
            observers: Mutex::new(Observers::default()),
            dirty_tracking,
            implicit_transactions,
            self_weak: self_weak.clone(),
        })
    }

    pub fn schema_store(&self) -> &Arc<SchemaStore> {
        &self.schema
    }

    pub fn key_registry(&self) -> &Arc<KeyRegistry> {
        &self.keys
    }

    /// Registers a hook observer. One instance per observer type: a second
    /// registration of the same type is a no-op.
    pub fn register_observer<O: EntityObserver>(&self, observer: O) {
        let mut observers = self.observers.lock().unwrap();
        if observers.seen.insert(TypeId::of::<O>()) {
            observers.list.push(Box::new(observer));
        }
    }

    fn fire(
        &self,
        entity: &mut Entity,
        hook: impl Fn(&dyn EntityObserver, &mut Entity) -> Result<()>,
    ) -> Result<()> {
        let kind = entity.kind().to_owned();
        let observers = self.observers.lock().unwrap();
        for observer in observers
            .list
            .iter()
            .filter(|o| o.observed_kind() == Some(kind.as_str()))
        {
            hook(observer.as_ref(), entity)?;
        }
        for observer in observers.list.iter().filter(|o| o.observed_kind().is_none()) {
            hook(observer.as_ref(), entity)?;
        }
        Ok(())
    }

    fn check_storable(&self, entity: &Entity) -> Result<()> {
        if !entity.is_dispensed() {
            return Err(LimberError::Usage(
                "use the dispense operation, not direct construction, to obtain a storable entity"
                    .to_owned(),
            ));
        }
        if !entity.is_owned_by(&self.self_weak) {
            return Err(LimberError::Usage(
                "the entity belongs to a different orchestrator".to_owned(),
            ));
        }
        Ok(())
    }

    /// A fresh entity of the given kind: in memory only, no key yet.
    pub fn dispense(&self, kind: &str) -> Result<Entity> {
        let mut entity = Entity::dispensed_by(kind, self.self_weak.clone());
        self.fire(&mut entity, |observer, e| observer.after_dispense(e))?;
        Ok(entity)
    }

    /// Hydrates the stored row under the given key into an entity, or none.
    pub fn load(&self, kind: &str, key: &Key) -> Result<Option<Entity>> {
        let Some(row) = self.schema.load(kind, key)? else {
            return Ok(None);
        };
        let mut entity = Entity::dispensed_by(kind, self.self_weak.clone());
        self.fire(&mut entity, |observer, e| observer.before_load(e))?;
        entity.import(row);
        entity.clear_dirty();
        self.fire(&mut entity, |observer, e| observer.after_load(e))?;
        Ok(Some(entity))
    }

    /// Persists the entity, writes any generated scalar key back onto it
    /// and returns the key. Runs inside an implicit transaction; note that
    /// hook effects already applied to the in-memory entity before a
    /// failure are not rolled back, only the physical write is.
    pub fn store(&self, entity: &mut Entity) -> Result<Key> {
        self.check_storable(entity)?;
        let kind = entity.kind().to_owned();
        let is_new = self.schema.is_new(&kind, entity.properties())?;
        let mut body = || -> Result<Key> {
            self.fire(entity, |observer, e| observer.before_store(e))?;
            if is_new {
                self.fire(entity, |observer, e| observer.before_insert(e))?;
            } else {
                self.fire(entity, |observer, e| observer.before_update(e))?;
            }
            let dirty = if self.dirty_tracking && !is_new {
                Some(entity.dirty_names())
            } else {
                None
            };
            let key = self.schema.store(&kind, entity.export(), dirty.as_ref())?;
            if matches!(key, Key::Scalar(_)) {
                // compound keys are established by the caller at creation
                // and never written back
                self.keys.set_key(&kind, entity.props_mut(), &key)?;
            }
            if is_new {
                self.fire(entity, |observer, e| observer.after_insert(e))?;
            } else {
                self.fire(entity, |observer, e| observer.after_update(e))?;
            }
            self.fire(entity, |observer, e| observer.after_store(e))?;
            entity.clear_dirty();
            Ok(key)
        };
        if self.implicit_transactions {
            self.access.transaction(body)
        } else {
            body()
        }
    }

    /// Deletes the entity's row. An entity that never carried a key was
    /// never persisted: nothing is deleted and no hooks fire.
    pub fn trash(&self, entity: &mut Entity) -> Result<()> {
        self.check_storable(entity)?;
        let kind = entity.kind().to_owned();
        let Some(key) = self.keys.key_of(&kind, entity.properties())? else {
            return Ok(());
        };
        let mut body = || -> Result<()> {
            self.fire(entity, |observer, e| observer.before_trash(e))?;
            self.schema.trash(&kind, &key)?;
            self.fire(entity, |observer, e| observer.after_trash(e))?;
            Ok(())
        };
        if self.implicit_transactions {
            self.access.transaction(body)
        } else {
            body()
        }
    }
}
