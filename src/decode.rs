//! Turns fetched bytes into a storable payload.
//!
//! Decoding validates the document before anything touches the store: an
//! empty body, malformed JSON, or a document that decodes to nothing all
//! stop the pipeline here.  A successful decode yields the natural key and
//! the canonical payload text.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use crate::error::DecodeError;
use crate::record::UNKNOWN_KEY;

/// Field the key is read from when nothing else is configured.
pub const DEFAULT_KEY_FIELD: &str = "chartName";

const INDENT: &[u8] = b"    ";

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub key: String,
    pub payload: String,
}

/// Decodes JSON documents and extracts the natural key.
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    key_path: Vec<String>,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_FIELD)
    }
}

impl PayloadDecoder {
    /// `key_field` is a dotted path into the document, e.g. `chartName` or
    /// `meta.name`.
    pub fn new(key_field: &str) -> Self {
        Self {
            key_path: key_field.split('.').map(str::to_string).collect(),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedPayload, DecodeError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }

        let document: Value = serde_json::from_slice(bytes)?;
        if let Some(kind) = emptiness(&document) {
            return Err(DecodeError::EmptyDocument(kind));
        }

        let key = self.extract_key(&document);
        let payload = canonicalize(&document)?;
        Ok(DecodedPayload { key, payload })
    }

    fn extract_key(&self, document: &Value) -> String {
        let found = self
            .key_path
            .iter()
            .try_fold(document, |node, segment| node.get(segment.as_str()));

        match found {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            _ => UNKNOWN_KEY.to_string(),
        }
    }
}

/// Documents that carry no content, named for the error message.
fn emptiness(document: &Value) -> Option<&'static str> {
    match document {
        Value::Null => Some("null"),
        Value::Bool(false) => Some("false"),
        Value::Number(n) if n.as_f64() == Some(0.0) => Some("zero"),
        Value::String(s) if s.is_empty() || s == "0" => Some("empty string"),
        Value::Array(a) if a.is_empty() => Some("empty array"),
        Value::Object(o) if o.is_empty() => Some("empty object"),
        _ => None,
    }
}

/// Rebuild every object with its keys inserted in sorted order, whatever map
/// representation serde_json was compiled with.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Re-serialize with four-space indentation.  Object keys come out sorted,
/// so upstream whitespace and key order do not leak into storage.
fn canonicalize(document: &Value) -> Result<String, DecodeError> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(INDENT));
    sorted(document)
        .serialize(&mut serializer)
        .map_err(|e| DecodeError::Serialize(e.to_string()))?;
    String::from_utf8(out).map_err(|e| DecodeError::Serialize(e.to_string()))
}
