//! Caller-pulled async cursors.
//!
//! A native cursor reports each position through a fresh `success` event on
//! the originating request. [`Cursor`] turns that push model into a pull
//! model: every [`Cursor::next`] either consumes the already-delivered step
//! or arms a oneshot and waits for the following event. Steps that arrive
//! while nobody is waiting are buffered, so no event ordering is lost.

use std::cell::RefCell;
use std::rc::Rc;

use futures_channel::oneshot;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Event, IdbCursorWithValue, IdbRequest};

use crate::error::{DbError, Result};
use crate::request::request_error;

/// One cursor position: the traversal key, the record's primary key, and
/// the record value.
#[derive(Debug, Clone)]
pub struct CursorEntry {
    key: JsValue,
    primary_key: JsValue,
    value: JsValue,
}

impl CursorEntry {
    /// Key in the traversal ordering (the index key for index cursors).
    pub fn key(&self) -> &JsValue {
        &self.key
    }

    /// Key of the record in its store.
    pub fn primary_key(&self) -> &JsValue {
        &self.primary_key
    }

    pub fn value(&self) -> &JsValue {
        &self.value
    }

    pub fn into_value(self) -> JsValue {
        self.value
    }
}

#[derive(Default)]
struct StepState {
    waiting: Option<oneshot::Sender<Result<()>>>,
    buffered: Option<Result<()>>,
}

impl StepState {
    fn notify(state: &Rc<RefCell<Self>>, outcome: Result<()>) {
        let waiting = state.borrow_mut().waiting.take();
        match waiting {
            Some(sender) => {
                let _ = sender.send(outcome);
            }
            None => state.borrow_mut().buffered = Some(outcome),
        }
    }
}

/// Stateful iterator over a range's matches, advanced explicitly via
/// [`Cursor::next`].
pub struct Cursor {
    request: IdbRequest,
    state: Rc<RefCell<StepState>>,
    started: bool,
    done: bool,
    _on_success: Closure<dyn FnMut(Event)>,
    _on_error: Closure<dyn FnMut(Event)>,
}

impl Cursor {
    /// Wraps a just-issued `openCursor` request.
    pub(crate) fn attach(request: IdbRequest) -> Self {
        let state: Rc<RefCell<StepState>> = Rc::default();

        let on_success = {
            let state = Rc::clone(&state);
            Closure::new(move |_: Event| StepState::notify(&state, Ok(())))
        };
        let on_error = {
            let state = Rc::clone(&state);
            let request = request.clone();
            Closure::new(move |_: Event| {
                StepState::notify(&state, Err(request_error(&request)));
            })
        };

        request.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
        request.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        Self {
            request,
            state,
            started: false,
            done: false,
            _on_success: on_success,
            _on_error: on_error,
        }
    }

    /// Advances to the next matching record; `None` once exhausted (and on
    /// every call after that).
    pub async fn next(&mut self) -> Result<Option<CursorEntry>> {
        if self.done {
            return Ok(None);
        }

        if self.started {
            self.current()?.continue_()?;
        }
        self.started = true;

        let step = {
            let buffered = self.state.borrow_mut().buffered.take();
            match buffered {
                Some(outcome) => outcome,
                None => {
                    let (sender, receiver) = oneshot::channel();
                    self.state.borrow_mut().waiting = Some(sender);
                    receiver.await.unwrap_or_else(|_| {
                        Err(DbError::Aborted("cursor signal dropped".to_owned()))
                    })
                }
            }
        };
        if let Err(err) = step {
            self.done = true;
            return Err(err);
        }

        let result = self.request.result()?;
        if result.is_null() || result.is_undefined() {
            self.done = true;
            return Ok(None);
        }

        let cursor: IdbCursorWithValue = result.unchecked_into();
        Ok(Some(CursorEntry {
            key: cursor.key()?,
            primary_key: cursor.primary_key()?,
            value: cursor.value()?,
        }))
    }

    fn current(&self) -> Result<IdbCursorWithValue> {
        let result = self.request.result()?;
        if result.is_null() || result.is_undefined() {
            return Err(DbError::Aborted("cursor is already exhausted".to_owned()));
        }
        Ok(result.unchecked_into())
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.request.set_onsuccess(None);
        self.request.set_onerror(None);
    }
}

/// Drains a cursor into values, applying offset/limit shaping.
pub(crate) async fn collect_values(
    mut cursor: Cursor,
    offset: u32,
    limit: Option<u32>,
) -> Result<Vec<JsValue>> {
    let mut values = Vec::new();
    if limit == Some(0) {
        return Ok(values);
    }

    let mut skipped = 0u32;
    while let Some(entry) = cursor.next().await? {
        if skipped < offset {
            skipped += 1;
            continue;
        }
        values.push(entry.into_value());
        if limit.is_some_and(|limit| values.len() as u32 >= limit) {
            break;
        }
    }
    Ok(values)
}
