//! Records and the JSON object view shared by inference and parsing.
//!
//! JSON-Lines values are kept as borrowed [`RawValue`]s so numbers, booleans
//! and nested documents reach the store exactly as they were written in the
//! source; only strings are unescaped.

use serde::Deserialize;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde_json::value::RawValue;
use std::fmt;

/// One parsed record: field values in table column order.
pub type Record = Vec<String>;

/// The top-level key/value pairs of one JSON-Lines object, in document order.
#[derive(Debug)]
pub struct JsonObject<'a>(pub Vec<(String, &'a RawValue)>);

impl<'de> Deserialize<'de> for JsonObject<'de> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ObjectVisitor;

        impl<'de> Visitor<'de> for ObjectVisitor {
            type Value = JsonObject<'de>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(8));
                while let Some((key, value)) = map.next_entry::<String, &'de RawValue>()? {
                    fields.push((key, value));
                }
                Ok(JsonObject(fields))
            }
        }

        deserializer.deserialize_map(ObjectVisitor)
    }
}

/// Parse one line as a JSON object.
pub fn parse_object(line: &[u8]) -> Result<JsonObject<'_>, serde_json::Error> {
    serde_json::from_slice(line)
}

/// JSON kind of a raw value, read from its first byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

pub fn kind_of(raw: &RawValue) -> JsonKind {
    match raw.get().trim_start().as_bytes().first() {
        Some(b'"') => JsonKind::String,
        Some(b'{') => JsonKind::Object,
        Some(b'[') => JsonKind::Array,
        Some(b't' | b'f') => JsonKind::Bool,
        Some(b'n') | None => JsonKind::Null,
        Some(_) => JsonKind::Number,
    }
}

/// Text form of a raw value as it is written to the store.
pub fn render(raw: &RawValue) -> Result<String, serde_json::Error> {
    match kind_of(raw) {
        JsonKind::Null => Ok(String::new()),
        JsonKind::String => serde_json::from_str(raw.get()),
        _ => Ok(raw.get().trim().to_string()),
    }
}

pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

pub(crate) fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keeps_document_order() {
        let obj = parse_object(br#"{"z":1,"a":"x","m":null}"#).unwrap();
        let keys: Vec<_> = obj.0.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(parse_object(b"[1,2]").is_err());
        assert!(parse_object(b"42").is_err());
        assert!(parse_object(b"{\"a\":").is_err());
    }

    #[test]
    fn render_keeps_source_text() {
        let obj = parse_object(br#"{"n":1.50,"s":"a\"b","b":true,"o":{"k":[1,2]},"x":null}"#).unwrap();
        let rendered: Vec<_> = obj.0.iter().map(|(_, v)| render(v).unwrap()).collect();
        assert_eq!(rendered, ["1.50", "a\"b", "true", r#"{"k":[1,2]}"#, ""]);
    }

    #[test]
    fn kinds_follow_first_byte() {
        let obj = parse_object(br#"{"a":-3,"b":"s","c":[],"d":{},"e":false,"f":null}"#).unwrap();
        let kinds: Vec<_> = obj.0.iter().map(|(_, v)| kind_of(v)).collect();
        assert_eq!(
            kinds,
            [
                JsonKind::Number,
                JsonKind::String,
                JsonKind::Array,
                JsonKind::Object,
                JsonKind::Bool,
                JsonKind::Null
            ]
        );
    }
}
