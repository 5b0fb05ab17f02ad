//! Promise-style convenience layer over browser IndexedDB.
//!
//! The crate wraps the low-level `web_sys` `Idb*` bindings: schemas are
//! declared up front as an immutable version history, the callback-based
//! request model is adapted to Rust futures, and connection lifecycle
//! events (`versionchange`, `abort`, `error`) are re-exposed through an
//! explicit listener registry. All transactional guarantees come from the
//! engine itself; this layer only scopes transactions and maps completion
//! signals. It will not work outside a browser or worker context.
//!
//! ```no_run
//! use wasm_bindgen::JsValue;
//! use webidb::{Database, Schema, StoreOptions};
//!
//! # async fn example() -> webidb::Result<()> {
//! let schema = Schema::new().version(1).add_store_with(
//!     "magazines",
//!     StoreOptions {
//!         key_path: Some("id".into()),
//!         ..Default::default()
//!     },
//! );
//!
//! let db = Database::open("library", &schema).await?;
//! let magazines = db.store("magazines")?;
//!
//! let value = js_sys::JSON::parse(r#"{"id":4,"words":["hey"]}"#).unwrap();
//! magazines.put(&value).await?;
//! let loaded = magazines.get(&JsValue::from_f64(4.0)).await?;
//! assert!(loaded.is_some());
//! # Ok(())
//! # }
//! ```

mod cursor;
mod database;
mod error;
mod events;
mod index;
mod query;
mod request;
mod schema;
mod store;

pub use crate::cursor::{Cursor, CursorEntry};
pub use crate::database::{ConnectionStatus, Database};
pub use crate::error::{DbError, Result};
pub use crate::events::{EventKind, ListenerId};
pub use crate::index::Index;
pub use crate::query::{Direction, GetAllOptions, KeyRange};
pub use crate::schema::{IndexOptions, KeyPath, MigrationStep, Schema, StoreOptions};
pub use crate::store::{BatchOp, Store};
