//! Property schemas: per-entity-type declarations of typed, validated fields.
//!
//! A schema is an ordered list of [`FieldSpec`]s. Every write to an entity's
//! properties goes through [`PropertySchema::validate_value`], which coerces
//! the incoming value to the field's semantic type or rejects it.

mod value;

pub use value::{Properties, PropertyValue};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::error::{PanoError, Result};

/// Pattern used by the `email` semantic type.
pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// Fields every entity type carries after its declared ones.
pub const STANDARD_FIELDS: &[&str] = &["notes", "image"];

/// Declared semantic type of a field, with its constraints.
#[derive(Debug, Clone)]
pub enum PropertyKind {
    String {
        min_length: usize,
        max_length: Option<usize>,
        pattern: Option<Regex>,
    },
    Integer {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    DateTime,
    Enum {
        choices: Vec<String>,
        allow_empty: bool,
    },
    Nested(Box<PropertySchema>),
}

impl PropertyKind {
    /// Unconstrained string.
    pub fn string() -> Self {
        PropertyKind::String {
            min_length: 0,
            max_length: None,
            pattern: None,
        }
    }

    /// String with a minimum length.
    pub fn string_min(min_length: usize) -> Self {
        PropertyKind::String {
            min_length,
            max_length: None,
            pattern: None,
        }
    }

    /// String that must match `pattern`.
    pub fn pattern(pattern: &str) -> std::result::Result<Self, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(PropertyKind::String {
            min_length: 0,
            max_length: None,
            pattern: Some(regex),
        })
    }

    /// Email address string.
    pub fn email() -> Self {
        let regex = Regex::new(EMAIL_PATTERN).expect("Invalid regex pattern");
        PropertyKind::String {
            min_length: 0,
            max_length: None,
            pattern: Some(regex),
        }
    }

    pub fn integer() -> Self {
        PropertyKind::Integer { min: None, max: None }
    }

    pub fn integer_range(min: i64, max: i64) -> Self {
        PropertyKind::Integer {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn float() -> Self {
        PropertyKind::Float { min: None, max: None }
    }

    pub fn float_range(min: f64, max: f64) -> Self {
        PropertyKind::Float {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn choices(choices: &[&str]) -> Self {
        PropertyKind::Enum {
            choices: choices.iter().map(|c| c.to_string()).collect(),
            allow_empty: true,
        }
    }

    /// Name of the semantic type, as used in entity type definition files.
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::String { .. } => "string",
            PropertyKind::Integer { .. } => "integer",
            PropertyKind::Float { .. } => "float",
            PropertyKind::Boolean => "boolean",
            PropertyKind::DateTime => "datetime",
            PropertyKind::Enum { .. } => "enum",
            PropertyKind::Nested(_) => "nested",
        }
    }

    /// Coerce `value` into this kind, or explain why it cannot be.
    fn coerce(&self, value: PropertyValue) -> std::result::Result<PropertyValue, String> {
        match self {
            PropertyKind::String {
                min_length,
                max_length,
                pattern,
            } => {
                let s = match value {
                    PropertyValue::String(s) => s,
                    PropertyValue::Integer(n) => n.to_string(),
                    PropertyValue::Float(n) => n.to_string(),
                    PropertyValue::Boolean(b) => b.to_string(),
                    other => return Err(format!("expected string, got {}", other.kind_name())),
                };
                let len = s.chars().count();
                if len < *min_length {
                    return Err(format!("string length must be at least {min_length}"));
                }
                if let Some(max) = max_length {
                    if len > *max {
                        return Err(format!("string length must be at most {max}"));
                    }
                }
                if let Some(re) = pattern {
                    if !re.find(&s).is_some_and(|m| m.start() == 0) {
                        return Err(format!("string must match pattern {}", re.as_str()));
                    }
                }
                Ok(PropertyValue::String(s))
            }
            PropertyKind::Integer { min, max } => {
                let n = match value {
                    PropertyValue::Integer(n) => n,
                    PropertyValue::Float(f) if f.fract() == 0.0 && f.is_finite() => f as i64,
                    PropertyValue::String(ref s) => s
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| format!("expected integer, got '{s}'"))?,
                    other => return Err(format!("expected integer, got {}", other.kind_name())),
                };
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("value must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("value must be at most {max}"));
                    }
                }
                Ok(PropertyValue::Integer(n))
            }
            PropertyKind::Float { min, max } => {
                let n = match value {
                    PropertyValue::Float(f) => f,
                    PropertyValue::Integer(n) => n as f64,
                    PropertyValue::String(ref s) => s
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| format!("expected number, got '{s}'"))?,
                    other => return Err(format!("expected number, got {}", other.kind_name())),
                };
                if !n.is_finite() {
                    return Err("value must be finite".to_string());
                }
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("value must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("value must be at most {max}"));
                    }
                }
                Ok(PropertyValue::Float(n))
            }
            PropertyKind::Boolean => match value {
                PropertyValue::Boolean(b) => Ok(PropertyValue::Boolean(b)),
                PropertyValue::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(PropertyValue::Boolean(true)),
                    "false" => Ok(PropertyValue::Boolean(false)),
                    _ => Err(format!("expected boolean, got '{s}'")),
                },
                other => Err(format!("expected boolean, got {}", other.kind_name())),
            },
            PropertyKind::DateTime => match value {
                PropertyValue::DateTime(dt) => Ok(PropertyValue::DateTime(dt)),
                PropertyValue::Integer(millis) => Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .map(PropertyValue::DateTime)
                    .ok_or_else(|| format!("timestamp {millis} out of range")),
                PropertyValue::String(ref s) => parse_datetime(s)
                    .map(PropertyValue::DateTime)
                    .ok_or_else(|| format!("expected date/time, got '{s}'")),
                other => Err(format!("expected date/time, got {}", other.kind_name())),
            },
            PropertyKind::Enum {
                choices,
                allow_empty,
            } => {
                let s = match value {
                    PropertyValue::String(s) => s,
                    other => return Err(format!("expected one of {choices:?}, got {}", other.kind_name())),
                };
                if s.is_empty() && *allow_empty {
                    return Ok(PropertyValue::String(s));
                }
                if choices.iter().any(|c| c == &s) {
                    Ok(PropertyValue::String(s))
                } else {
                    Err(format!("value must be one of: {}", choices.join(", ")))
                }
            }
            PropertyKind::Nested(schema) => match value {
                PropertyValue::Map(map) => schema
                    .validate(map)
                    .map(PropertyValue::Map)
                    .map_err(|e| match e {
                        PanoError::Schema { field, reason, .. } => format!("{field}: {reason}"),
                        other => other.to_string(),
                    }),
                other => Err(format!("expected nested structure, got {}", other.kind_name())),
            },
        }
    }
}

/// Accepts RFC 3339 plus the `YYYY-MM-DD HH:MM[:SS]` and `YYYY-MM-DD` forms.
fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: PropertyKind,
    pub default: Option<PropertyValue>,
    /// Whether the field is shown in property listings.
    pub display: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            display: true,
        }
    }

    pub fn with_default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.display = false;
        self
    }
}

/// Ordered, immutable set of field declarations for one entity type.
#[derive(Debug, Clone)]
pub struct PropertySchema {
    entity_type: String,
    fields: Vec<FieldSpec>,
}

impl PropertySchema {
    /// Build a schema, rejecting duplicate field names and invalid defaults.
    pub fn new(entity_type: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let entity_type = entity_type.into();
        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(PanoError::schema(&entity_type, "", "field name must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(PanoError::schema(&entity_type, &field.name, "duplicate field name"));
            }
        }
        let schema = Self { entity_type, fields };
        for field in &schema.fields {
            if let Some(default) = &field.default {
                schema.validate_value(&field.name, default.clone())?;
            }
        }
        Ok(schema)
    }

    /// Same as [`PropertySchema::new`] with the standard fields appended.
    pub fn with_standard_fields(
        entity_type: impl Into<String>,
        mut fields: Vec<FieldSpec>,
    ) -> Result<Self> {
        for name in STANDARD_FIELDS {
            if !fields.iter().any(|f| f.name == *name) {
                let spec = FieldSpec::new(*name, PropertyKind::string());
                fields.push(if *name == "image" { spec.hidden() } else { spec });
            }
        }
        Self::new(entity_type, fields)
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Validate and coerce one value. `Null` is always accepted and means "clear".
    pub fn validate_value(&self, field: &str, value: PropertyValue) -> Result<PropertyValue> {
        let spec = self.field(field).ok_or_else(|| {
            PanoError::schema(
                &self.entity_type,
                field,
                format!("unknown property for {}", self.entity_type),
            )
        })?;
        if matches!(value, PropertyValue::Null) {
            return Ok(PropertyValue::Null);
        }
        spec.kind
            .coerce(value)
            .map_err(|reason| PanoError::schema(&self.entity_type, field, reason))
    }

    /// Validate a whole property map. Null values are dropped from the result.
    pub fn validate(&self, properties: Properties) -> Result<Properties> {
        let mut out = BTreeMap::new();
        for (name, value) in properties {
            let value = self.validate_value(&name, value)?;
            if !matches!(value, PropertyValue::Null) {
                out.insert(name, value);
            }
        }
        Ok(out)
    }

    /// Declared defaults, applied to fields the caller left unset.
    pub fn apply_defaults(&self, properties: &mut Properties) {
        for field in &self.fields {
            if let Some(default) = &field.default {
                let unset = properties.get(&field.name).map_or(true, PropertyValue::is_null);
                if unset {
                    properties.insert(field.name.clone(), default.clone());
                }
            }
        }
    }
}
