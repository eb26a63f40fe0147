//! Tagged property values.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered field name → value mapping held by an entity.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A single property value.
///
/// Serialized untagged so graph documents stay plain JSON. Date/time values
/// come back as strings and are re-coerced by the field's schema on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    #[serde(with = "rfc3339")]
    DateTime(DateTime<Utc>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Null and the empty string both count as "no value".
    pub fn is_null(&self) -> bool {
        match self {
            PropertyValue::Null => true,
            PropertyValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(n) => Some(*n),
            PropertyValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the variant, used in validation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Boolean(_) => "boolean",
            PropertyValue::Integer(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::DateTime(_) => "datetime",
            PropertyValue::Map(_) => "map",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => Ok(()),
            PropertyValue::Boolean(b) => write!(f, "{b}"),
            PropertyValue::Integer(n) => write!(f, "{n}"),
            PropertyValue::Float(n) => write!(f, "{n}"),
            PropertyValue::String(s) => f.write_str(s),
            PropertyValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            PropertyValue::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        PropertyValue::Integer(n)
    }
}

impl From<i32> for PropertyValue {
    fn from(n: i32) -> Self {
        PropertyValue::Integer(i64::from(n))
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Float(n)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(dt: DateTime<Utc>) -> Self {
        PropertyValue::DateTime(dt)
    }
}

impl From<BTreeMap<String, PropertyValue>> for PropertyValue {
    fn from(map: BTreeMap<String, PropertyValue>) -> Self {
        PropertyValue::Map(map)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropertyValue::Null, Into::into)
    }
}

impl From<&PropertyValue> for serde_json::Value {
    fn from(value: &PropertyValue) -> Self {
        serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
    }
}

mod rfc3339 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_string_counts_as_null() {
        assert!(PropertyValue::Null.is_null());
        assert!(PropertyValue::from("").is_null());
        assert!(!PropertyValue::from("x").is_null());
        assert!(!PropertyValue::from(0).is_null());
    }

    #[test]
    fn test_display_formats() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(PropertyValue::from(dt).to_string(), "2024-03-01 09:30");
        assert_eq!(PropertyValue::from(42).to_string(), "42");
        assert_eq!(PropertyValue::Null.to_string(), "");
    }

    #[test]
    fn test_untagged_json_shape() {
        let mut props = Properties::new();
        props.insert("address".into(), "a@b.com".into());
        props.insert("verified".into(), true.into());
        props.insert("age".into(), 31.into());
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(json, r#"{"address":"a@b.com","age":31,"verified":true}"#);

        let back: Properties = serde_json::from_str(&json).unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn test_float_stays_float() {
        let v: PropertyValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, PropertyValue::Float(2.5));
        let v: PropertyValue = serde_json::from_str("7").unwrap();
        assert_eq!(v, PropertyValue::Integer(7));
    }

    #[test]
    fn test_datetime_serializes_as_string() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let json = serde_json::to_string(&PropertyValue::from(dt)).unwrap();
        assert_eq!(json, r#""2024-03-01T09:30:00Z""#);
    }
}
