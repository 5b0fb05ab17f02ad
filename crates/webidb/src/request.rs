//! Adapts the engine's callback-based completion model to futures.
//!
//! Every native operation hands back an `IDBRequest` (or transaction) that
//! reports completion through `success`/`error` events. The helpers here
//! register one-shot closures routing the outcome through a
//! `futures_channel::oneshot` pair, so callers simply `.await`. Closures are
//! detached again once the outcome is known so no handler outlives its
//! request.

use std::cell::RefCell;
use std::rc::Rc;

use futures_channel::oneshot;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Event, IdbRequest, IdbTransaction};

use crate::error::{DbError, Result};

type Outcome<T> = Rc<RefCell<Option<oneshot::Sender<Result<T>>>>>;

fn send<T>(outcome: &Outcome<T>, value: Result<T>) {
    if let Some(sender) = outcome.borrow_mut().take() {
        let _ = sender.send(value);
    }
}

/// Extracts the structured error of a failed request.
pub(crate) fn request_error(request: &IdbRequest) -> DbError {
    match request.error() {
        Ok(Some(exception)) => DbError::from_dom_exception(&exception),
        Ok(None) => DbError::Aborted("request failed without an error object".to_owned()),
        Err(err) => DbError::from(err),
    }
}

/// Resolves with `request.result()` on success, or the mapped exception on
/// failure. Error events keep their default behavior, so a failure inside a
/// multi-request transaction still aborts it.
pub(crate) async fn await_request(request: &IdbRequest) -> Result<JsValue> {
    let (sender, receiver) = oneshot::channel();
    let outcome: Outcome<JsValue> = Rc::new(RefCell::new(Some(sender)));

    let on_success = {
        let outcome = Rc::clone(&outcome);
        let request = request.clone();
        Closure::once(move |_: Event| {
            send(&outcome, request.result().map_err(DbError::from));
        })
    };
    let on_error = {
        let outcome = Rc::clone(&outcome);
        let request = request.clone();
        Closure::once(move |_: Event| {
            send(&outcome, Err(request_error(&request)));
        })
    };

    request.set_onsuccess(Some(on_success.as_ref().unchecked_ref()));
    request.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    let result = receiver
        .await
        .unwrap_or_else(|_| Err(DbError::Aborted("completion signal dropped".to_owned())));

    request.set_onsuccess(None);
    request.set_onerror(None);
    result
}

/// Resolves once the transaction commits; an abort (explicit or caused by a
/// failed request) yields the transaction's error, mapped through the
/// taxonomy.
pub(crate) async fn await_transaction(transaction: &IdbTransaction) -> Result<()> {
    let (sender, receiver) = oneshot::channel();
    let outcome: Outcome<()> = Rc::new(RefCell::new(Some(sender)));

    let on_complete = {
        let outcome = Rc::clone(&outcome);
        Closure::once(move |_: Event| send(&outcome, Ok(())))
    };
    let on_abort = {
        let outcome = Rc::clone(&outcome);
        let transaction = transaction.clone();
        Closure::once(move |_: Event| {
            let err = match transaction.error() {
                Some(exception) => DbError::from_dom_exception(&exception),
                None => DbError::Aborted("transaction aborted".to_owned()),
            };
            send(&outcome, Err(err));
        })
    };

    transaction.set_oncomplete(Some(on_complete.as_ref().unchecked_ref()));
    transaction.set_onabort(Some(on_abort.as_ref().unchecked_ref()));

    let result = receiver
        .await
        .unwrap_or_else(|_| Err(DbError::Aborted("completion signal dropped".to_owned())));

    transaction.set_oncomplete(None);
    transaction.set_onabort(None);
    result
}
