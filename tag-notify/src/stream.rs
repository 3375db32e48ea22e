//! DynamoDB stream event model.
//!
//! Records arrive as loosely-typed attribute maps. The new image is kept as
//! raw JSON and [`ChangeRecord::media_item`] reads only the fields a
//! notification needs, each through its typed DynamoDB form. A field with an
//! unexpected shape reads as absent, so a stray attribute elsewhere in the
//! image never costs the record.

use std::collections::BTreeMap;
use std::fmt;
use std::num::IntErrorKind;

use serde::{Deserialize, Serialize};
use serde_dynamo::AttributeValue;
use serde_json::Value;

pub const FIELD_THUMBNAIL_KEY: &str = "thumbnailKey";
pub const FIELD_FULL_KEY: &str = "fullKey";
pub const FIELD_TAGS: &str = "tags";

/// New image of a stream record, one untyped entry per attribute.
pub type Image = BTreeMap<String, Value>;

/// Tag name to count. Ordered by name.
pub type MediaTagSet = BTreeMap<String, i64>;

/// Typed view of one image attribute. `None` when absent or malformed.
pub fn attribute(image: &Image, name: &str) -> Option<AttributeValue> {
    image
        .get(name)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Count held by one entry of the `tags` map.
///
/// Anything that does not read as an integer is 0. Out-of-range integers
/// saturate.
pub fn tag_count(value: &Value) -> i64 {
    match serde_json::from_value::<AttributeValue>(value.clone()) {
        Ok(AttributeValue::N(n)) => parse_count(&n),
        Ok(_) => 0,
        Err(_) => value.get("N").map(loose_count).unwrap_or(0),
    }
}

/// `N` payload that is not the usual numeric string.
fn loose_count(n: &Value) -> i64 {
    match n {
        Value::String(s) => parse_count(s),
        Value::Number(num) => num
            .as_i64()
            .or_else(|| num.as_u64().map(|_| i64::MAX))
            .or_else(|| num.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

/// Integer text with optional sign, surrounding whitespace and single `_`
/// separators between digits.
fn parse_count(raw: &str) -> i64 {
    let s = raw.trim();
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    let well_formed = !digits.is_empty()
        && !digits.starts_with('_')
        && !digits.ends_with('_')
        && !digits.contains("__")
        && digits.chars().all(|c| c.is_ascii_digit() || c == '_');
    if !well_formed {
        return 0;
    }
    match s.replace('_', "").parse::<i64>() {
        Ok(v) => v,
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => i64::MAX,
            IntErrorKind::NegOverflow => i64::MIN,
            _ => 0,
        },
    }
}

/// Batch delivered by the stream. Records stay raw so that one malformed
/// record cannot fail the whole batch.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    Insert,
    Modify,
    Remove,
    Other(String),
}

impl EventType {
    pub fn parse(name: &str) -> Self {
        match name {
            "INSERT" => EventType::Insert,
            "MODIFY" => EventType::Modify,
            "REMOVE" => EventType::Remove,
            other => EventType::Other(other.to_string()),
        }
    }

    /// Whether this event can announce new media.
    pub fn is_notifiable(&self) -> bool {
        matches!(self, EventType::Insert | EventType::Modify)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub dynamodb: Option<StreamRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamRecord {
    #[serde(default)]
    pub new_image: Option<Image>,
}

/// Why a record produced no notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    IgnoredEvent,
    NoNewImage,
    MissingThumbnail,
    NoTags,
    Malformed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::IgnoredEvent => "event type is not INSERT or MODIFY",
            SkipReason::NoNewImage => "record has no new image",
            SkipReason::MissingThumbnail => "new image has no thumbnail key",
            SkipReason::NoTags => "new image has no tags",
            SkipReason::Malformed => "record could not be decoded",
        };
        f.write_str(s)
    }
}

/// The fields of a new image that a notification is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub event_name: String,
    pub thumbnail_key: String,
    pub full_key: Option<String>,
    pub tags: MediaTagSet,
}

impl ChangeRecord {
    pub fn from_value(value: Value) -> Result<Self, SkipReason> {
        serde_json::from_value(value).map_err(|_| SkipReason::Malformed)
    }

    pub fn event_type(&self) -> EventType {
        EventType::parse(self.event_name.as_deref().unwrap_or_default())
    }

    pub fn new_image(&self) -> Option<&Image> {
        self.dynamodb
            .as_ref()
            .and_then(|d| d.new_image.as_ref())
            .filter(|image| !image.is_empty())
    }

    pub fn media_item(&self) -> Result<MediaItem, SkipReason> {
        if !self.event_type().is_notifiable() {
            return Err(SkipReason::IgnoredEvent);
        }
        let image = self.new_image().ok_or(SkipReason::NoNewImage)?;

        let thumbnail_key = string_field(image, FIELD_THUMBNAIL_KEY)
            .ok_or(SkipReason::MissingThumbnail)?;
        let full_key = string_field(image, FIELD_FULL_KEY);

        // Entries are read one by one; a bad count must not drop the map.
        let tags: MediaTagSet = image
            .get(FIELD_TAGS)
            .and_then(|t| t.get("M"))
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(name, v)| (name.clone(), tag_count(v))).collect())
            .unwrap_or_default();
        if tags.is_empty() {
            return Err(SkipReason::NoTags);
        }

        Ok(MediaItem {
            event_name: self.event_name.clone().unwrap_or_default(),
            thumbnail_key,
            full_key,
            tags,
        })
    }
}

fn string_field(image: &Image, name: &str) -> Option<String> {
    match attribute(image, name)? {
        AttributeValue::S(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}
