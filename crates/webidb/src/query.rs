//! Key ranges, result-shaping options, and cursor directions.

use wasm_bindgen::JsValue;

use crate::error::{DbError, Result};

/// Bound specification restricting which keys a query matches.
///
/// At most one lower bound (`gte` xor `gt`) and one upper bound (`lte` xor
/// `lt`) may be set; an empty range matches every key.
///
/// ```no_run
/// # use webidb::KeyRange;
/// # use wasm_bindgen::JsValue;
/// let range = KeyRange::new().gte(JsValue::from_f64(10.0)).lt(JsValue::from_f64(20.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeyRange {
    gte: Option<JsValue>,
    gt: Option<JsValue>,
    lte: Option<JsValue>,
    lt: Option<JsValue>,
}

impl KeyRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inclusive lower bound.
    pub fn gte(mut self, key: impl Into<JsValue>) -> Self {
        self.gte = Some(key.into());
        self
    }

    /// Exclusive lower bound.
    pub fn gt(mut self, key: impl Into<JsValue>) -> Self {
        self.gt = Some(key.into());
        self
    }

    /// Inclusive upper bound.
    pub fn lte(mut self, key: impl Into<JsValue>) -> Self {
        self.lte = Some(key.into());
        self
    }

    /// Exclusive upper bound.
    pub fn lt(mut self, key: impl Into<JsValue>) -> Self {
        self.lt = Some(key.into());
        self
    }

    /// Converts to the engine's range object; `Ok(None)` when unbounded.
    pub(crate) fn to_idb(&self) -> Result<Option<web_sys::IdbKeyRange>> {
        let lower = match (&self.gte, &self.gt) {
            (Some(_), Some(_)) => return Err(DbError::InvalidRange("both gte and gt set")),
            (Some(key), None) => Some((key, false)),
            (None, Some(key)) => Some((key, true)),
            (None, None) => None,
        };
        let upper = match (&self.lte, &self.lt) {
            (Some(_), Some(_)) => return Err(DbError::InvalidRange("both lte and lt set")),
            (Some(key), None) => Some((key, false)),
            (None, Some(key)) => Some((key, true)),
            (None, None) => None,
        };

        let range = match (lower, upper) {
            (Some((lo, lo_open)), Some((hi, hi_open))) => Some(
                web_sys::IdbKeyRange::bound_with_lower_open_and_upper_open(
                    lo, hi, lo_open, hi_open,
                )?,
            ),
            (Some((lo, lo_open)), None) => {
                Some(web_sys::IdbKeyRange::lower_bound_with_open(lo, lo_open)?)
            }
            (None, Some((hi, hi_open))) => {
                Some(web_sys::IdbKeyRange::upper_bound_with_open(hi, hi_open)?)
            }
            (None, None) => None,
        };
        Ok(range)
    }

    /// Range (or unbounded) as the `JsValue` query argument native calls take.
    pub(crate) fn to_query(range: Option<&KeyRange>) -> Result<JsValue> {
        Ok(match range.map(KeyRange::to_idb).transpose()?.flatten() {
            Some(idb_range) => idb_range.into(),
            None => JsValue::NULL,
        })
    }
}

/// Result shaping applied after range matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetAllOptions {
    /// Skip this many matching records.
    pub offset: u32,
    /// Stop after this many records.
    pub limit: Option<u32>,
    /// Traverse in descending key order.
    pub reverse: bool,
    /// Collapse duplicate (index) keys to their first record.
    pub unique: bool,
}

impl GetAllOptions {
    pub(crate) fn direction(&self) -> Direction {
        match (self.reverse, self.unique) {
            (false, false) => Direction::Next,
            (false, true) => Direction::NextUnique,
            (true, false) => Direction::Prev,
            (true, true) => Direction::PrevUnique,
        }
    }
}

/// Cursor traversal order; the `*Unique` variants visit one record per
/// distinct key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Next,
    NextUnique,
    Prev,
    PrevUnique,
}

impl Direction {
    pub(crate) fn to_idb(self) -> web_sys::IdbCursorDirection {
        match self {
            Direction::Next => web_sys::IdbCursorDirection::Next,
            Direction::NextUnique => web_sys::IdbCursorDirection::Nextunique,
            Direction::Prev => web_sys::IdbCursorDirection::Prev,
            Direction::PrevUnique => web_sys::IdbCursorDirection::Prevunique,
        }
    }
}
