use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::listing::{CursorStyle, Listing, SortField};
use crate::sort::FieldValue;

/// Opaque position token handed out with every page but the last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Wrap cursor text received from a client or the server.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Raw cursor text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cursor {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Cursor {
    fn from(text: &str) -> Self {
        Self(text.to_owned())
    }
}

/// Cursor text that does not have the shape its listing expects.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CursorError {
    /// Malformed JSON, missing `value`/`id`, or a non-numeric bound on a numeric field.
    #[error("Invalid cursor format")]
    InvalidFormat,
}

/// Where the next page starts, in the types the collection compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBound {
    /// Start after `(value, id)` under a `(field, id)` ordering.
    After {
        /// Sort value of the last row seen.
        value: FieldValue,
        /// Document id of the last row seen.
        id: String,
    },
    /// Start after `value` under a single-field ordering.
    AfterValue(FieldValue),
}

#[derive(Serialize)]
struct CompositeWire<'a> {
    value: Value,
    id: &'a str,
}

/// Build the cursor pointing just past `last_row`.
///
/// Scalar listings have no cursor for a null or empty value, which marks the
/// page as the last one.
#[must_use]
pub fn encode<L: Listing>(last_row: &L::Entity, field: L::SortField) -> Option<Cursor> {
    let value = L::sort_value(last_row, field);
    match L::CURSOR_STYLE {
        CursorStyle::Composite => {
            let wire = CompositeWire {
                value: value.to_json(),
                id: L::entity_id(last_row),
            };
            serde_json::to_string(&wire).ok().map(Cursor)
        }
        CursorStyle::Scalar => value.to_cursor_text().map(Cursor),
    }
}

/// Turn cursor text back into a query bound for `field`.
///
/// # Errors
/// Returns [`CursorError::InvalidFormat`] when the text does not match the
/// listing's cursor style.
pub fn decode<L: Listing>(cursor: &Cursor, field: L::SortField) -> Result<QueryBound, CursorError> {
    match L::CURSOR_STYLE {
        CursorStyle::Composite => decode_composite(cursor.as_str()),
        CursorStyle::Scalar => decode_scalar(cursor.as_str(), field.is_numeric()),
    }
}

fn decode_composite(text: &str) -> Result<QueryBound, CursorError> {
    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(text) else {
        return Err(CursorError::InvalidFormat);
    };
    let raw_value = fields.remove("value").ok_or(CursorError::InvalidFormat)?;
    let id = match fields.remove("id") {
        Some(Value::String(id)) => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(CursorError::InvalidFormat),
    };
    let value = FieldValue::from_json(&raw_value).ok_or(CursorError::InvalidFormat)?;
    Ok(QueryBound::After { value, id })
}

fn decode_scalar(text: &str, numeric: bool) -> Result<QueryBound, CursorError> {
    if !numeric {
        return Ok(QueryBound::AfterValue(FieldValue::Text(text.to_owned())));
    }
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(|n| QueryBound::AfterValue(FieldValue::Number(n)))
        .ok_or(CursorError::InvalidFormat)
}
