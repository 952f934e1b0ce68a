//! Documents and typed attribute values

use crate::search::conventions::{
    ATTRIBUTE_DESCRIPTION, ATTRIBUTE_ID, ATTRIBUTE_NAME, ATTRIBUTE_TITLE, ATTRIBUTE_URI_PATH,
    RESERVED_ATTRIBUTES,
};
use crate::search::error::{SearchError, SearchResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A single typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Text(_) => String::TYPE_NAME,
            AttributeValue::Integer(_) => i64::TYPE_NAME,
            AttributeValue::Float(_) => f64::TYPE_NAME,
            AttributeValue::Boolean(_) => bool::TYPE_NAME,
            AttributeValue::Timestamp(_) => <DateTime<Utc>>::TYPE_NAME,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Wire representation; timestamps are RFC 3339 in UTC
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Text(s) => Value::String(s.clone()),
            AttributeValue::Integer(i) => Value::Number((*i).into()),
            AttributeValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            AttributeValue::Boolean(b) => Value::Bool(*b),
            AttributeValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }

    /// Parse a scalar wire value; strings in RFC 3339 form become timestamps
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => AttributeValue::Timestamp(ts.with_timezone(&Utc)),
                Err(_) => AttributeValue::Text(s.clone()),
            }),
            Value::Number(n) => n
                .as_i64()
                .map(AttributeValue::Integer)
                .or_else(|| n.as_f64().map(AttributeValue::Float)),
            Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => write!(f, "{}", s),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Boolean(b) => write!(f, "{}", b),
            AttributeValue::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Integer(value.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::Timestamp(value)
    }
}

/// Rust types an attribute can be viewed as
pub trait AttributeType: Sized {
    const TYPE_NAME: &'static str;

    fn from_value(value: &AttributeValue) -> Option<Self>;
}

impl AttributeType for String {
    const TYPE_NAME: &'static str = "text";

    fn from_value(value: &AttributeValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl AttributeType for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl AttributeType for f64 {
    const TYPE_NAME: &'static str = "float";

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl AttributeType for bool {
    const TYPE_NAME: &'static str = "boolean";

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl AttributeType for DateTime<Utc> {
    const TYPE_NAME: &'static str = "timestamp";

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// A multi-valued document attribute
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentAttribute {
    id: String,
    values: Vec<AttributeValue>,
}

impl DocumentAttribute {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    pub fn first(&self) -> Option<&AttributeValue> {
        self.values.first()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn add_value(&mut self, value: impl Into<AttributeValue>) {
        self.values.push(value.into());
    }

    /// Append unless an equal value is already present; returns whether it was added
    pub fn add_value_if_absent(&mut self, value: impl Into<AttributeValue>) -> bool {
        let value = value.into();
        if self.values.contains(&value) {
            return false;
        }
        self.values.push(value);
        true
    }

    /// Typed view of all values.
    ///
    /// Fails with `InvalidArgument` as soon as a value, checked from the
    /// first one on, cannot be read as `T`.
    pub fn of_type<T: AttributeType>(&self) -> SearchResult<Vec<T>> {
        self.values
            .iter()
            .map(|value| {
                T::from_value(value).ok_or_else(|| {
                    SearchError::InvalidArgument(format!(
                        "attribute '{}' holds {} values, {} requested",
                        self.id,
                        value.type_name(),
                        T::TYPE_NAME
                    ))
                })
            })
            .collect()
    }

    fn to_json(&self) -> Value {
        match self.values.as_slice() {
            [single] => single.to_json(),
            values => Value::Array(values.iter().map(AttributeValue::to_json).collect()),
        }
    }
}

/// Search document: an optional id plus attributes keyed by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    id: Option<String>,
    attributes: BTreeMap<String, DocumentAttribute>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append a value to an attribute, creating it if needed
    pub fn with_value(
        mut self,
        attribute_id: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.add_value(attribute_id, value);
        self
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_single(ATTRIBUTE_NAME, name.into())
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with_single(ATTRIBUTE_TITLE, title.into())
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.with_single(ATTRIBUTE_DESCRIPTION, description.into())
    }

    pub fn with_uri_path(self, uri_path: impl Into<String>) -> Self {
        self.with_single(ATTRIBUTE_URI_PATH, uri_path.into())
    }

    fn with_single(mut self, attribute_id: &str, value: String) -> Self {
        let mut attribute = DocumentAttribute::new(attribute_id);
        attribute.add_value(value);
        self.attributes.insert(attribute_id.to_string(), attribute);
        self
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn add_value(&mut self, attribute_id: impl Into<String>, value: impl Into<AttributeValue>) {
        let attribute_id = attribute_id.into();
        self.attributes
            .entry(attribute_id.clone())
            .or_insert_with(|| DocumentAttribute::new(attribute_id))
            .add_value(value);
    }

    /// Insert or replace a whole attribute
    pub fn put_attribute(&mut self, attribute: DocumentAttribute) {
        self.attributes.insert(attribute.id().to_string(), attribute);
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.first_text(ATTRIBUTE_NAME)
    }

    pub fn title(&self) -> Option<&str> {
        self.first_text(ATTRIBUTE_TITLE)
    }

    pub fn description(&self) -> Option<&str> {
        self.first_text(ATTRIBUTE_DESCRIPTION)
    }

    pub fn uri_path(&self) -> Option<&str> {
        self.first_text(ATTRIBUTE_URI_PATH)
    }

    fn first_text(&self, attribute_id: &str) -> Option<&str> {
        self.attributes
            .get(attribute_id)
            .and_then(DocumentAttribute::first)
            .and_then(AttributeValue::as_str)
    }

    /// Any attribute by id, reserved ones included
    pub fn attribute(&self, attribute_id: &str) -> Option<&DocumentAttribute> {
        self.attributes.get(attribute_id)
    }

    /// Attributes without a dedicated accessor
    pub fn attributes(&self) -> impl Iterator<Item = &DocumentAttribute> {
        self.attributes
            .values()
            .filter(|a| !RESERVED_ATTRIBUTES.contains(&a.id()))
    }

    pub(crate) fn all_attributes(&self) -> impl Iterator<Item = &DocumentAttribute> {
        self.attributes.values()
    }

    /// Backend field map; multi-valued attributes become value lists
    pub fn to_backend_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(ref id) = self.id {
            fields.insert(ATTRIBUTE_ID.to_string(), Value::String(id.clone()));
        }
        for attribute in self.attributes.values().filter(|a| !a.is_empty()) {
            if attribute.id() == ATTRIBUTE_ID {
                continue;
            }
            fields.insert(attribute.id().to_string(), attribute.to_json());
        }
        fields
    }

    /// Rebuild a document from a backend row
    pub fn from_backend_fields(fields: &Map<String, Value>) -> Self {
        let mut document = Document::new();
        for (field, value) in fields {
            if field == ATTRIBUTE_ID {
                document.id = match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                };
                continue;
            }

            let mut attribute = DocumentAttribute::new(field.clone());
            match value {
                Value::Array(items) => items
                    .iter()
                    .filter_map(AttributeValue::from_json)
                    .for_each(|v| attribute.add_value(v)),
                scalar => {
                    if let Some(v) = AttributeValue::from_json(scalar) {
                        attribute.add_value(v);
                    }
                }
            }
            if !attribute.is_empty() {
                document.put_attribute(attribute);
            }
        }
        document
    }
}
