//! Response envelope decoding.
//!
//! The endpoint wraps generated text in a `result` field whose shape depends
//! on the model: sometimes a bare string, sometimes an object carrying the
//! text under one of several keys. Extraction walks [`EXTRACTORS`] in order and
//! the first non-empty string wins.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Top-level response body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Envelope {
    /// Generated payload; shape varies by model.
    #[serde(default)]
    pub result: Option<Value>,
    /// `false` when the platform accepted the request but reports failure in-band.
    #[serde(default)]
    pub success: Option<bool>,
    /// In-band error list accompanying `success: false`.
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// The `result` field resolved into the shapes we understand.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    /// `"result": "..."`.
    Text(String),
    /// `"result": { ... }`.
    Object(Map<String, Value>),
    /// Missing, null, or any other JSON type.
    Absent,
}

impl From<Option<Value>> for ResultPayload {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::Text(s),
            Some(Value::Object(map)) => Self::Object(map),
            _ => Self::Absent,
        }
    }
}

/// One way of pulling text out of a [`ResultPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// The payload itself is the text.
    String,
    /// The payload is an object with the text under this key.
    ObjectWithField(&'static str),
}

/// Extractors in precedence order.
pub const EXTRACTORS: &[Extractor] = &[
    Extractor::String,
    Extractor::ObjectWithField("response"),
    Extractor::ObjectWithField("output_text"),
    Extractor::ObjectWithField("text"),
];

impl Extractor {
    /// Apply this extractor. Only non-blank strings count as a match.
    pub fn apply<'a>(&self, payload: &'a ResultPayload) -> Option<&'a str> {
        let raw = match (self, payload) {
            (Self::String, ResultPayload::Text(s)) => s.as_str(),
            (Self::ObjectWithField(key), ResultPayload::Object(map)) => match map.get(*key) {
                Some(Value::String(s)) => s.as_str(),
                _ => return None,
            },
            _ => return None,
        };
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Run every extractor in order and return the first match, trimmed.
pub fn extract_text(payload: &ResultPayload) -> Option<String> {
    EXTRACTORS
        .iter()
        .find_map(|extractor| extractor.apply(payload))
        .map(str::to_string)
}
