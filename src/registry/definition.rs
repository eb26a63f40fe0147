//! Entity types declared in TOML files.
//!
//! ```toml
//! [[entity_type]]
//! name = "Wallet"
//! label = ["address"]
//! key = [["chain", "address"]]
//!
//! [[entity_type.fields]]
//! name = "address"
//! kind = "string"
//! min_length = 26
//!
//! [[entity_type.fields]]
//! name = "chain"
//! kind = "enum"
//! choices = ["btc", "eth"]
//! ```

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::error::{PanoError, Result};
use crate::schema::{FieldSpec, PropertyKind, PropertySchema, PropertyValue};

/// Contents of one definition file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityTypeFile {
    #[serde(default, rename = "entity_type")]
    pub entity_types: Vec<EntityTypeDefinition>,
}

impl EntityTypeFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PanoError::Config(format!("invalid entity type file: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Label fields, in display order.
    #[serde(default)]
    pub label: Vec<String>,
    #[serde(default)]
    pub separator: Option<String>,
    /// Equality key alternatives; the first fully populated one is used.
    #[serde(default)]
    pub key: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    /// `string`, `email`, `integer`, `float`, `boolean`, `datetime`, `enum` or `nested`.
    pub kind: String,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_empty: bool,
    #[serde(default)]
    pub default: Option<PropertyValue>,
    #[serde(default = "default_true")]
    pub display: bool,
    /// Inner fields of a `nested` field.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

fn default_true() -> bool {
    true
}

impl EntityTypeDefinition {
    pub fn build(&self) -> Result<EntityType> {
        let fields = self
            .fields
            .iter()
            .map(|f| f.to_spec(&self.name))
            .collect::<Result<Vec<_>>>()?;
        let mut builder = EntityType::builder(&self.name)
            .description(&self.description)
            .fields(fields)
            .label_fields(self.label.clone())
            .key_alternatives(self.key.clone());
        if let Some(color) = &self.color {
            builder = builder.color(color);
        }
        if let Some(separator) = &self.separator {
            builder = builder.separator(separator);
        }
        builder.build()
    }
}

impl FieldDefinition {
    pub fn to_spec(&self, entity_type: &str) -> Result<FieldSpec> {
        let mut spec = FieldSpec::new(&self.name, self.kind(entity_type)?);
        spec.default = self.default.clone();
        spec.display = self.display;
        Ok(spec)
    }

    fn kind(&self, entity_type: &str) -> Result<PropertyKind> {
        let err = |reason: String| PanoError::schema(entity_type, &self.name, reason);
        let kind = match self.kind.as_str() {
            "string" => {
                let pattern = match &self.pattern {
                    Some(p) => Some(
                        regex::Regex::new(p).map_err(|e| err(format!("invalid pattern: {e}")))?,
                    ),
                    None => None,
                };
                PropertyKind::String {
                    min_length: self.min_length.unwrap_or(0),
                    max_length: self.max_length,
                    pattern,
                }
            }
            "email" => PropertyKind::email(),
            "integer" => PropertyKind::Integer {
                min: self.min.map(|v| whole(v, "min")).transpose().map_err(err)?,
                max: self.max.map(|v| whole(v, "max")).transpose().map_err(err)?,
            },
            "float" => PropertyKind::Float {
                min: self.min,
                max: self.max,
            },
            "boolean" => PropertyKind::Boolean,
            "datetime" => PropertyKind::DateTime,
            "enum" => {
                if self.choices.is_empty() {
                    return Err(err("enum field declares no choices".into()));
                }
                PropertyKind::Enum {
                    choices: self.choices.clone(),
                    allow_empty: self.allow_empty,
                }
            }
            "nested" => {
                let scope = format!("{entity_type}.{}", self.name);
                let inner = self
                    .fields
                    .iter()
                    .map(|f| f.to_spec(&scope))
                    .collect::<Result<Vec<_>>>()?;
                PropertyKind::Nested(Box::new(PropertySchema::new(scope, inner)?))
            }
            other => return Err(err(format!("unrecognized semantic type '{other}'"))),
        };
        Ok(kind)
    }
}

fn whole(value: f64, bound: &str) -> std::result::Result<i64, String> {
    if value.fract() == 0.0 {
        Ok(value as i64)
    } else {
        Err(format!("integer {bound} must be a whole number"))
    }
}
