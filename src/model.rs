//! Typed view of the input JSON.
//!
//! The input is loosely structured: every node of the body tree may be a
//! string, an object or an array. It is decoded once into [`ContentItem`]
//! so the assembler can match on a closed set of variants. Shapes that are
//! not understood are dropped here with a warning rather than rejected.

use log::warn;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Root of the input: `{title, sections}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Document {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::records")]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Section {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient::records")]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Question {
    #[serde(default, deserialize_with = "lenient::content")]
    pub content: Vec<ContentItem>,
}

/// One node of a question body.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text(String),
    Image(ImageRef),
    /// Alternative answers, one paragraph each.
    Options(Vec<ContentItem>),
    /// Rows of cells; rows may be ragged.
    Table(Vec<Vec<ContentItem>>),
    /// `{content: ...}` wrapper or a bare array.
    Nested(Vec<ContentItem>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageRef {
    /// `src`, falling back to `url`. Never empty.
    pub src: Option<String>,
    pub alt: Option<String>,
}

impl Document {
    /// Parse a document from JSON text. The root must be an object.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)?;
        if !value.is_object() {
            return Err(Error::InputParse(format!(
                "document root must be an object, found {}",
                value_kind(&value)
            )));
        }
        Ok(Document::deserialize(value)?)
    }
}

impl ContentItem {
    /// Decode one content node. Returns `None` for shapes with no meaning.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(ContentItem::Text(text)),
            Value::Array(items) => Some(ContentItem::Nested(decode_items(items))),
            Value::Object(mut map) => {
                let kind = map.get("type").and_then(Value::as_str).map(str::to_owned);
                match kind.as_deref() {
                    Some("image") => Some(ContentItem::Image(ImageRef::from_map(&map))),
                    Some("options") => Some(ContentItem::Options(match map.remove("content") {
                        Some(Value::Array(items)) => decode_items(items),
                        _ => Vec::new(),
                    })),
                    Some("table") => Some(ContentItem::Table(match map.remove("content") {
                        Some(Value::Array(rows)) => rows.into_iter().map(decode_row).collect(),
                        _ => Vec::new(),
                    })),
                    _ => map
                        .remove("content")
                        .map(|content| ContentItem::Nested(content_items(content))),
                }
            }
            _ => None,
        }
    }
}

impl ImageRef {
    fn from_map(map: &Map<String, Value>) -> Self {
        let non_empty = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_owned)
        };
        ImageRef {
            src: non_empty("src").or_else(|| non_empty("url")),
            alt: map.get("alt").and_then(Value::as_str).map(str::to_owned),
        }
    }
}

fn decode_items(items: Vec<Value>) -> Vec<ContentItem> {
    items
        .into_iter()
        .filter_map(|item| {
            let kind = value_kind(&item);
            let decoded = ContentItem::from_value(item);
            if decoded.is_none() {
                warn!("skipping unsupported content item ({kind})");
            }
            decoded
        })
        .collect()
}

/// Wrapper content may be a list or a single node.
fn content_items(value: Value) -> Vec<ContentItem> {
    match value {
        Value::Array(items) => decode_items(items),
        other => decode_items(vec![other]),
    }
}

/// Cells keep their column position even when their content is unusable.
fn decode_row(row: Value) -> Vec<ContentItem> {
    match row {
        Value::Array(cells) => cells
            .into_iter()
            .map(|cell| ContentItem::from_value(cell).unwrap_or(ContentItem::Nested(Vec::new())))
            .collect(),
        _ => Vec::new(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

mod lenient {
    use super::*;
    use serde::de::DeserializeOwned;
    use serde::Deserializer;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn records<'de, D, T>(d: D) -> std::result::Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let Value::Array(items) = Value::deserialize(d)? else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| {
                if !item.is_object() {
                    warn!("skipping {} where an object was expected", value_kind(&item));
                    return None;
                }
                match T::deserialize(item) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("skipping malformed entry: {e}");
                        None
                    }
                }
            })
            .collect())
    }

    pub fn content<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<ContentItem>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => decode_items(items),
            _ => Vec::new(),
        })
    }
}
