//! Read-only queries over a secondary ordering of a store's records.

use std::rc::Rc;

use wasm_bindgen::JsValue;
use web_sys::{IdbIndex, IdbTransactionMode};

use crate::cursor::{collect_values, Cursor};
use crate::database::DatabaseInner;
use crate::error::Result;
use crate::query::{Direction, GetAllOptions, KeyRange};
use crate::request::await_request;
use crate::schema::KeyPath;
use crate::store::{defined, js_key_path};

/// Read-only handle to one index of a store. Operations mirror
/// [`Store`](crate::Store) but traverse records in the index's key order.
pub struct Index {
    db: Rc<DatabaseInner>,
    store: String,
    name: String,
}

impl Index {
    pub(crate) fn new(db: Rc<DatabaseInner>, store: String, name: String) -> Self {
        Self { db, store, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field(s) this index orders by.
    pub fn key_path(&self) -> Result<Option<KeyPath>> {
        let path = self.handle()?.key_path()?;
        Ok(js_key_path(&path))
    }

    pub fn unique(&self) -> Result<bool> {
        Ok(self.handle()?.unique())
    }

    /// Whether array-valued keys index each element individually.
    pub fn multi_entry(&self) -> Result<bool> {
        Ok(self.handle()?.multi_entry())
    }

    /// First record whose index key matches; `None` when nothing does.
    pub async fn get(&self, key: &JsValue) -> Result<Option<JsValue>> {
        let index = self.handle()?;
        let value = await_request(&index.get(key)?).await?;
        Ok(defined(value))
    }

    /// Records matching `range` in index-key order, shaped by `options`;
    /// `options.unique` collapses duplicate index keys to one record each.
    pub async fn get_all(
        &self,
        range: Option<&KeyRange>,
        options: Option<&GetAllOptions>,
    ) -> Result<Vec<JsValue>> {
        let options = options.copied().unwrap_or_default();
        let cursor = self.open_cursor(range, options.direction())?;
        collect_values(cursor, options.offset, options.limit).await
    }

    /// Number of records matching `range` (duplicates counted).
    pub async fn count(&self, range: Option<&KeyRange>) -> Result<u32> {
        let index = self.handle()?;
        let query = KeyRange::to_query(range)?;
        let request = if query.is_null() {
            index.count()?
        } else {
            index.count_with_key(&query)?
        };
        let count = await_request(&request).await?;
        Ok(count.as_f64().unwrap_or(0.0) as u32)
    }

    /// Opens a caller-advanced cursor over `range` in the given direction.
    pub fn open_cursor(&self, range: Option<&KeyRange>, direction: Direction) -> Result<Cursor> {
        let index = self.handle()?;
        let request = index
            .open_cursor_with_range_and_direction(&KeyRange::to_query(range)?, direction.to_idb())?;
        Ok(Cursor::attach(request))
    }

    fn handle(&self) -> Result<IdbIndex> {
        let (_, store) = self
            .db
            .transaction(&self.store, IdbTransactionMode::Readonly)?;
        Ok(store.index(&self.name)?)
    }
}
