//! Limber – a schema-adaptive, multi-dialect data-access engine.
//!
//! Limber persists loosely typed record objects ("entities") to a relational
//! store, inferring and evolving the physical schema from the data actually
//! written. There are no migration files: the live catalog *is* the schema.
//! In fluid mode, storing an entity of a new kind creates its table; storing
//! a value a column cannot hold widens the column, following a totally
//! ordered ladder of type ranks.
//!
//! ## Modules
//! * [`value`] – The dynamically typed [`value::Value`] an entity property
//!   holds, and the [`value::Row`] shape rows travel in.
//! * [`rank`] – The [`rank::Rank`] ladder: ordinary (widenable) ranks, the
//!   static zone of fixed native types, and the custom sentinel.
//! * [`dialect`] – The [`dialect::DialectAdapter`] trait, the extension
//!   point a new backend implements.
//! * [`sqlite`], [`mysql`], [`pgsql`], [`mssql`] – The four bundled
//!   adapters.
//! * [`cache`] – The bounded, recency-ordered [`cache::QueryCache`].
//! * [`access`] – The [`access::SqlAccess`] collaborator interface and the
//!   cache-aware, transaction-stacking [`access::CachedAccess`] layer.
//! * [`keys`] – [`keys::KeyRegistry`] and the scalar/compound
//!   [`keys::Key`].
//! * [`schema`] – The [`schema::SchemaStore`]: snapshot owner and home of
//!   the widening algorithm.
//! * [`entity`] – The in-memory [`entity::Entity`] record.
//! * [`crud`] – The [`crud::CrudOrchestrator`] lifecycles and the
//!   [`crud::EntityObserver`] hook trait.
//! * [`settings`] – Runtime [`settings::Settings`], loadable from a config
//!   file and the environment.
//!
//! ## Wiring
//! Construction is explicit: build a dialect adapter, wrap a driver's
//! [`access::SqlAccess`] implementation in an [`access::CachedAccess`],
//! then a [`keys::KeyRegistry`], a [`schema::SchemaStore`] and a
//! [`crud::CrudOrchestrator`] on top, and share them via `Arc`. One access
//! layer owns one connection and serves one unit of work at a time.
//!
//! ## Quick Start
//! ```
//! use limber::cache::{CachedResult, QueryCache, QueryKey, ResultShape};
//! use limber::rank::Rank;
//! use limber::value::Value;
//!
//! // ranks are totally ordered; widening only ever moves up the ladder
//! assert!(Rank::Int64.can_widen_to(Rank::Double));
//! assert!(!Rank::DateTime.can_widen_to(Rank::Blob));
//!
//! let mut cache = QueryCache::new(2);
//! let key = QueryKey {
//!     shape: ResultShape::Scalar,
//!     sql: "select count(*) from \"book\"".to_owned(),
//!     params: Vec::new(),
//! };
//! cache.put(key.clone(), CachedResult::Scalar(Value::Int(42)));
//! assert!(cache.contains(&key));
//! ```

pub mod access;
pub mod cache;
pub mod crud;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod keys;
pub mod mssql;
pub mod mysql;
pub mod pgsql;
pub mod rank;
pub mod schema;
pub mod settings;
pub mod sqlite;
pub mod value;
