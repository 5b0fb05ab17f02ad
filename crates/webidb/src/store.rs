//! Store handle: CRUD and batch operations against one named collection.
//!
//! Every operation opens its own engine transaction scoped to just this
//! store: `readonly` for reads, `readwrite` for writes. Serialization of
//! overlapping readwrite work is the engine's job; this layer only picks the
//! minimal scope.

use std::rc::Rc;

use wasm_bindgen::JsValue;
use web_sys::{IdbObjectStore, IdbTransaction, IdbTransactionMode};

use crate::cursor::{collect_values, Cursor};
use crate::database::DatabaseInner;
use crate::error::{DbError, Result};
use crate::index::Index;
use crate::query::{GetAllOptions, KeyRange};
use crate::request::{await_request, await_transaction};
use crate::schema::KeyPath;

/// One entry of a [`Store::batch`] call.
#[derive(Debug, Clone)]
pub enum BatchOp {
    /// Insert-or-replace; `key` must be `None` for stores with an in-line
    /// key path or a key generator.
    Put {
        key: Option<JsValue>,
        value: JsValue,
    },
    /// Remove by key; a no-op when absent.
    Del { key: JsValue },
}

/// Handle to one named store of an open connection.
pub struct Store {
    db: Rc<DatabaseInner>,
    name: String,
}

impl Store {
    pub(crate) fn new(db: Rc<DatabaseInner>, name: String) -> Self {
        Self { db, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// In-line key path declared for this store, if any.
    pub fn key_path(&self) -> Result<Option<KeyPath>> {
        let path = self.read()?.key_path()?;
        Ok(js_key_path(&path))
    }

    /// Whether the store fills in missing keys from its key generator.
    pub fn auto_increment(&self) -> Result<bool> {
        Ok(self.read()?.auto_increment())
    }

    /// Looks up a single record; `None` when the key is absent.
    pub async fn get(&self, key: &JsValue) -> Result<Option<JsValue>> {
        let store = self.read()?;
        let value = await_request(&store.get(key)?).await?;
        Ok(defined(value))
    }

    /// Records matching `range`, shaped by `options`, in ascending key order
    /// unless `options.reverse` is set.
    pub async fn get_all(
        &self,
        range: Option<&KeyRange>,
        options: Option<&GetAllOptions>,
    ) -> Result<Vec<JsValue>> {
        let options = options.copied().unwrap_or_default();
        let store = self.read()?;
        let request = store.open_cursor_with_range_and_direction(
            &KeyRange::to_query(range)?,
            options.direction().to_idb(),
        )?;
        collect_values(Cursor::attach(request), options.offset, options.limit).await
    }

    /// Insert-or-replace with the key derived from the store's key path or
    /// generator; returns the effective key.
    pub async fn put(&self, value: &JsValue) -> Result<JsValue> {
        let (_, store) = self.write()?;
        await_request(&store.put(value)?).await
    }

    /// Insert-or-replace under an explicit key; returns the key.
    pub async fn put_with_key(&self, key: &JsValue, value: &JsValue) -> Result<JsValue> {
        let (_, store) = self.write()?;
        await_request(&store.put_with_key(value, key)?).await
    }

    /// Insert-only variant of [`Store::put`]; an existing key fails with
    /// [`DbError::Constraint`].
    pub async fn add(&self, value: &JsValue) -> Result<JsValue> {
        let (_, store) = self.write()?;
        await_request(&store.add(value)?).await
    }

    /// Insert-only variant of [`Store::put_with_key`].
    pub async fn add_with_key(&self, key: &JsValue, value: &JsValue) -> Result<JsValue> {
        let (_, store) = self.write()?;
        await_request(&store.add_with_key(value, key)?).await
    }

    /// Removes a record by key; succeeds even when the key is absent.
    pub async fn del(&self, key: &JsValue) -> Result<()> {
        let (_, store) = self.write()?;
        await_request(&store.delete(key)?).await?;
        Ok(())
    }

    /// Applies `ops` in order inside one readwrite transaction. Any failure
    /// aborts the transaction, leaving the store untouched.
    pub async fn batch(&self, ops: &[BatchOp]) -> Result<()> {
        let (transaction, store) = self.write()?;

        let mut queue_error = None;
        for op in ops {
            let queued = match op {
                BatchOp::Put {
                    key: Some(key),
                    value,
                } => store.put_with_key(value, key),
                BatchOp::Put { key: None, value } => store.put(value),
                BatchOp::Del { key } => store.delete(key),
            };
            if let Err(err) = queued {
                queue_error = Some(DbError::from(err));
                let _ = transaction.abort();
                break;
            }
        }

        // A request that fails after queuing aborts the transaction on its
        // own; either way completion tells the truth.
        let completion = await_transaction(&transaction).await;
        match queue_error {
            Some(err) => Err(err),
            None => completion,
        }
    }

    /// Number of records matching `range` (all records when `None`).
    pub async fn count(&self, range: Option<&KeyRange>) -> Result<u32> {
        let store = self.read()?;
        let query = KeyRange::to_query(range)?;
        let request = if query.is_null() {
            store.count()?
        } else {
            store.count_with_key(&query)?
        };
        let count = await_request(&request).await?;
        Ok(count.as_f64().unwrap_or(0.0) as u32)
    }

    /// Returns a read-only handle to one of this store's indexes.
    pub fn index(&self, name: &str) -> Result<Index> {
        let store = self.read()?;
        if !store.index_names().contains(name) {
            return Err(DbError::NotFound(name.to_owned()));
        }
        Ok(Index::new(
            Rc::clone(&self.db),
            self.name.clone(),
            name.to_owned(),
        ))
    }

    fn read(&self) -> Result<IdbObjectStore> {
        let (_, store) = self
            .db
            .transaction(&self.name, IdbTransactionMode::Readonly)?;
        Ok(store)
    }

    fn write(&self) -> Result<(IdbTransaction, IdbObjectStore)> {
        self.db
            .transaction(&self.name, IdbTransactionMode::Readwrite)
    }
}

/// Maps a `get()`-style result to `None` for absent records.
pub(crate) fn defined(value: JsValue) -> Option<JsValue> {
    if value.is_undefined() || value.is_null() {
        None
    } else {
        Some(value)
    }
}

/// Converts a native keyPath value (string, string array, or null) back to
/// the schema representation.
pub(crate) fn js_key_path(value: &JsValue) -> Option<KeyPath> {
    if let Some(field) = value.as_string() {
        return Some(KeyPath::Single(field));
    }
    if js_sys::Array::is_array(value) {
        let fields = js_sys::Array::from(value)
            .iter()
            .filter_map(|v| v.as_string())
            .collect();
        return Some(KeyPath::Composite(fields));
    }
    None
}
