//! Database connection handle: open/upgrade, store access, lifecycle events.

use std::cell::RefCell;
use std::rc::Rc;

use futures_channel::oneshot;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    Event, IdbDatabase, IdbFactory, IdbIndexParameters, IdbObjectStore,
    IdbObjectStoreParameters, IdbOpenDbRequest, IdbTransaction, IdbTransactionMode,
    IdbVersionChangeEvent,
};

use crate::error::{DbError, Result};
use crate::events::{EventKind, EventRegistry, ListenerId};
use crate::request::request_error;
use crate::schema::{KeyPath, MigrationStep, Schema};
use crate::store::Store;

/// Whether the handle still owns a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closed,
}

pub(crate) struct DatabaseInner {
    name: String,
    db: RefCell<Option<IdbDatabase>>,
    events: EventRegistry<JsValue>,
    // Native event closures; detached on close, freed when the handle drops.
    handlers: RefCell<Vec<Closure<dyn FnMut(Event)>>>,
}

impl DatabaseInner {
    pub(crate) fn db(&self) -> Result<IdbDatabase> {
        self.db.borrow().clone().ok_or(DbError::Closed)
    }

    /// Opens a transaction scoped to exactly one store.
    pub(crate) fn transaction(
        &self,
        store: &str,
        mode: IdbTransactionMode,
    ) -> Result<(IdbTransaction, IdbObjectStore)> {
        let db = self.db()?;
        let transaction = db.transaction_with_str_and_mode(store, mode)?;
        let object_store = transaction.object_store(store)?;
        Ok((transaction, object_store))
    }

    fn close(&self) {
        let db = self.db.borrow_mut().take();
        if let Some(db) = db {
            tracing::debug!(db = self.name.as_str(), "closing connection");
            db.set_onversionchange(None);
            db.set_onabort(None);
            db.set_onerror(None);
            db.close();
        }
        self.events.clear();
    }
}

/// Handle to one named, versioned database.
///
/// Obtained from [`Database::open`]; all store and index handles borrow this
/// connection. Dropping the handle closes the connection.
pub struct Database {
    inner: Rc<DatabaseInner>,
    version: u32,
    store_names: Vec<String>,
}

impl Database {
    /// Opens `name` at the schema's target version, applying any pending
    /// migration steps inside the engine's versionchange transaction.
    ///
    /// Fails with [`DbError::UpgradeBlocked`] when another connection holds
    /// the database at an older version and refuses to close (connections
    /// opened by this crate close themselves, see [`EventKind::VersionChange`]).
    /// The upgrade itself stays queued in the engine: once the blocker goes
    /// away the migration steps still run, and the connection that request
    /// produces is closed immediately so it cannot block later opens.
    pub async fn open(name: &str, schema: &Schema) -> Result<Database> {
        let factory = factory()?;
        let target = schema.target_version();
        tracing::debug!(db = name, version = target, "opening database");

        let request = if target == 0 {
            factory.open(name)?
        } else {
            factory.open_with_u32(name, target)?
        };

        let (sender, receiver) = oneshot::channel::<Result<()>>();
        let outcome = Rc::new(RefCell::new(Some(sender)));
        let upgrade_error: Rc<RefCell<Option<DbError>>> = Rc::default();

        let on_upgrade = {
            let schema = schema.clone();
            let request = request.clone();
            let upgrade_error = Rc::clone(&upgrade_error);
            Closure::once(move |event: IdbVersionChangeEvent| {
                let from = event.old_version() as u32;
                tracing::debug!(from, to = target, "applying schema upgrade");
                if let Err(err) = apply_upgrade(&request, &schema, from, target) {
                    *upgrade_error.borrow_mut() = Some(err);
                    if let Some(transaction) = request.transaction() {
                        let _ = transaction.abort();
                    }
                }
            })
        };
        let on_success = {
            let outcome = Rc::clone(&outcome);
            Closure::once(move |_: Event| resolve(&outcome, Ok(())))
        };
        let on_error = {
            let outcome = Rc::clone(&outcome);
            let request = request.clone();
            let upgrade_error = Rc::clone(&upgrade_error);
            Closure::once(move |_: Event| {
                let err = upgrade_error
                    .borrow_mut()
                    .take()
                    .unwrap_or_else(|| request_error(&request));
                resolve(&outcome, Err(err));
            })
        };
        let on_blocked = {
            let outcome = Rc::clone(&outcome);
            let name = name.to_owned();
            Closure::once(move |_: Event| {
                tracing::warn!(db = name.as_str(), "upgrade blocked by an open connection");
                resolve(&outcome, Err(DbError::UpgradeBlocked));
            })
        };

        request.set_onupgradeneeded(Some(on_upgrade.as_ref().unchecked_ref()));
        request.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        request.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        request.set_onblocked(Some(on_blocked.as_ref().unchecked_ref()));

        let opened = receiver
            .await
            .unwrap_or_else(|_| Err(DbError::Aborted("open signal dropped".to_owned())));

        request.set_onerror(None);
        request.set_onblocked(None);
        if matches!(opened, Err(DbError::UpgradeBlocked)) {
            // The request stays pending inside the engine; once the blocking
            // connection goes away the upgrade still runs. Keep the
            // migration handler attached so the schema actually reaches the
            // requested version, and close the late connection when it
            // arrives so it cannot pin the database.
            let late = request.clone();
            let name = name.to_owned();
            let on_late_success = Closure::once(move |_: Event| {
                if let Ok(result) = late.result() {
                    let db: IdbDatabase = result.unchecked_into();
                    tracing::debug!(db = name.as_str(), "closing connection from a blocked open");
                    db.close();
                }
            });
            request.set_onsuccess(Some(on_late_success.as_ref().unchecked_ref()));
            on_late_success.forget();
            on_upgrade.forget();
        } else {
            request.set_onupgradeneeded(None);
            request.set_onsuccess(None);
        }
        opened?;

        let db: IdbDatabase = request.result()?.unchecked_into();
        Ok(Self::attach(name, db))
    }

    /// Wraps an open connection: captures the fixed store set and re-emits
    /// the connection's lifecycle events through the listener registry.
    fn attach(name: &str, db: IdbDatabase) -> Database {
        let version = db.version() as u32;
        let store_names = string_list(&db.object_store_names());

        let inner = Rc::new(DatabaseInner {
            name: name.to_owned(),
            db: RefCell::new(Some(db.clone())),
            events: EventRegistry::default(),
            handlers: RefCell::new(Vec::new()),
        });

        // Handlers hold the inner weakly so the registry table cannot keep
        // the connection alive.
        let weak = Rc::downgrade(&inner);
        let on_versionchange: Closure<dyn FnMut(Event)> = Closure::new(move |event: Event| {
            if let Some(inner) = weak.upgrade() {
                tracing::warn!(
                    db = inner.name.as_str(),
                    "newer version requested elsewhere; auto-closing"
                );
                inner.events.emit(EventKind::VersionChange, event.as_ref());
                inner.close();
            }
        });
        let weak = Rc::downgrade(&inner);
        let on_abort: Closure<dyn FnMut(Event)> = Closure::new(move |event: Event| {
            if let Some(inner) = weak.upgrade() {
                inner.events.emit(EventKind::Abort, event.as_ref());
            }
        });
        let weak = Rc::downgrade(&inner);
        let on_error: Closure<dyn FnMut(Event)> = Closure::new(move |event: Event| {
            if let Some(inner) = weak.upgrade() {
                inner.events.emit(EventKind::Error, event.as_ref());
            }
        });

        db.set_onversionchange(Some(on_versionchange.as_ref().unchecked_ref()));
        db.set_onabort(Some(on_abort.as_ref().unchecked_ref()));
        db.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        inner
            .handlers
            .borrow_mut()
            .extend([on_versionchange, on_abort, on_error]);

        Database {
            inner,
            version,
            store_names,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Version the connection was opened at.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Store names of this connection, sorted. Fixed for the handle's
    /// lifetime; further upgrades require a fresh open.
    pub fn stores(&self) -> &[String] {
        &self.store_names
    }

    pub fn status(&self) -> ConnectionStatus {
        if self.inner.db.borrow().is_some() {
            ConnectionStatus::Open
        } else {
            ConnectionStatus::Closed
        }
    }

    /// Returns a handle bound to one of this connection's stores.
    pub fn store(&self, name: &str) -> Result<Store> {
        self.inner.db()?;
        if !self.store_names.iter().any(|n| n == name) {
            return Err(DbError::NotFound(name.to_owned()));
        }
        Ok(Store::new(Rc::clone(&self.inner), name.to_owned()))
    }

    /// Subscribes to a lifecycle event; callbacks run in subscription order
    /// and receive the native event object.
    pub fn on(&self, kind: EventKind, callback: impl Fn(&JsValue) + 'static) -> ListenerId {
        self.inner.events.subscribe(kind, callback)
    }

    /// Removes a listener; returns whether it was still registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Releases the connection and every registered listener. Idempotent;
    /// later operations fail with [`DbError::Closed`].
    pub fn close(&self) {
        self.inner.close();
    }

    /// Closes this handle and destroys the underlying database.
    pub async fn delete(self) -> Result<()> {
        self.inner.close();
        Self::delete_database(&self.inner.name).await
    }

    /// Destroys a database by name; fails with [`DbError::DeleteBlocked`]
    /// while other connections keep it open.
    pub async fn delete_database(name: &str) -> Result<()> {
        let factory = factory()?;
        let request = factory.delete_database(name)?;

        let (sender, receiver) = oneshot::channel::<Result<()>>();
        let outcome = Rc::new(RefCell::new(Some(sender)));

        let on_success = {
            let outcome = Rc::clone(&outcome);
            Closure::once(move |_: Event| resolve(&outcome, Ok(())))
        };
        let on_error = {
            let outcome = Rc::clone(&outcome);
            let request = request.clone();
            Closure::once(move |_: Event| resolve(&outcome, Err(request_error(&request))))
        };
        let on_blocked = {
            let outcome = Rc::clone(&outcome);
            let name = name.to_owned();
            Closure::once(move |_: Event| {
                tracing::warn!(db = name.as_str(), "delete blocked by an open connection");
                resolve(&outcome, Err(DbError::DeleteBlocked));
            })
        };

        request.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        request.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        request.set_onblocked(Some(on_blocked.as_ref().unchecked_ref()));

        let result = receiver
            .await
            .unwrap_or_else(|_| Err(DbError::Aborted("delete signal dropped".to_owned())));

        request.set_onsuccess(None);
        request.set_onerror(None);
        request.set_onblocked(None);
        result
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.inner.close();
    }
}

fn resolve(outcome: &Rc<RefCell<Option<oneshot::Sender<Result<()>>>>>, value: Result<()>) {
    if let Some(sender) = outcome.borrow_mut().take() {
        let _ = sender.send(value);
    }
}

fn factory() -> Result<IdbFactory> {
    let global = js_sys::global();
    let factory = if let Some(window) = global.dyn_ref::<web_sys::Window>() {
        window.indexed_db()?
    } else if let Some(worker) = global.dyn_ref::<web_sys::WorkerGlobalScope>() {
        worker.indexed_db()?
    } else {
        None
    };
    factory.ok_or(DbError::Unavailable)
}

fn string_list(list: &web_sys::DomStringList) -> Vec<String> {
    let mut names: Vec<String> = (0..list.length()).filter_map(|i| list.get(i)).collect();
    names.sort();
    names
}

/// Replays the schema's pending migration steps inside the versionchange
/// transaction of an in-flight open request.
fn apply_upgrade(request: &IdbOpenDbRequest, schema: &Schema, from: u32, to: u32) -> Result<()> {
    let db: IdbDatabase = request.result()?.unchecked_into();
    let transaction = request
        .transaction()
        .ok_or_else(|| DbError::Aborted("upgrade without a versionchange transaction".to_owned()))?;

    for step in schema.steps_between(from, to) {
        match step {
            MigrationStep::CreateStore { name, options } => {
                let params = IdbObjectStoreParameters::new();
                if let Some(key_path) = &options.key_path {
                    params.set_key_path(&key_path_js(key_path));
                }
                params.set_auto_increment(options.auto_increment);
                db.create_object_store_with_optional_parameters(name, &params)?;
            }
            MigrationStep::DeleteStore { name } => {
                db.delete_object_store(name)?;
            }
            MigrationStep::CreateIndex {
                store,
                name,
                key_path,
                options,
            } => {
                let object_store = transaction.object_store(store)?;
                let params = IdbIndexParameters::new();
                params.set_unique(options.unique);
                params.set_multi_entry(options.multi_entry);
                match key_path {
                    KeyPath::Single(field) => {
                        object_store
                            .create_index_with_str_and_optional_parameters(name, field, &params)?;
                    }
                    KeyPath::Composite(_) => {
                        object_store.create_index_with_str_sequence_and_optional_parameters(
                            name,
                            &key_path_js(key_path),
                            &params,
                        )?;
                    }
                }
            }
            MigrationStep::DeleteIndex { store, name } => {
                transaction.object_store(store)?.delete_index(name)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn key_path_js(key_path: &KeyPath) -> JsValue {
    match key_path {
        KeyPath::Single(field) => JsValue::from_str(field),
        KeyPath::Composite(fields) => {
            let array = js_sys::Array::new();
            for field in fields {
                array.push(&JsValue::from_str(field));
            }
            array.into()
        }
    }
}
