use wasm_bindgen::{JsCast, JsValue};

pub type Result<T> = std::result::Result<T, DbError>;

/// Unified error type for all `webidb` operations.
///
/// Note: variants carry a `String` (or `JsValue`) rather than a DOM error
/// object so callers never need `web_sys` types to match on failures.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("IndexedDB is not available in this context")]
    Unavailable,
    #[error("no such store or index: {0}")]
    NotFound(String),
    #[error("key already exists in store")]
    Constraint,
    #[error("version upgrade blocked by an open connection")]
    UpgradeBlocked,
    #[error("database deletion blocked by an open connection")]
    DeleteBlocked,
    #[error("connection is closed")]
    Closed,
    #[error("invalid key range: {0}")]
    InvalidRange(&'static str),
    #[error("transaction aborted: {0}")]
    Aborted(String),
    #[error("indexeddb operation failed: {0:?}")]
    Js(JsValue),
}

impl DbError {
    pub(crate) fn from_dom_exception(ex: &web_sys::DomException) -> Self {
        // https://webidl.spec.whatwg.org/#idl-DOMException-error-names
        match ex.name().as_str() {
            "ConstraintError" => DbError::Constraint,
            "NotFoundError" => DbError::NotFound(ex.message()),
            "AbortError" => DbError::Aborted(ex.message()),
            "VersionError" => DbError::UpgradeBlocked,
            _ => DbError::Js(ex.into()),
        }
    }

    /// Maps an arbitrary JS error value, unwrapping `DOMException`s so the
    /// common engine failures land on structured variants.
    pub(crate) fn from_js(value: JsValue) -> Self {
        match value.dyn_into::<web_sys::DomException>() {
            Ok(ex) => Self::from_dom_exception(&ex),
            Err(other) => DbError::Js(other),
        }
    }
}

impl From<JsValue> for DbError {
    fn from(value: JsValue) -> Self {
        DbError::from_js(value)
    }
}
