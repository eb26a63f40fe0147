//! Entities: typed nodes of the investigation graph.
//!
//! An [`EntityType`] bundles a [`PropertySchema`] with the rules that derive
//! an entity's display label and its equality key. [`Entity`] instances are
//! created and mutated only by the investigation graph, which validates every
//! write against the entity's type.

pub mod builtin;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{PanoError, Result};
use crate::schema::{FieldSpec, Properties, PropertySchema, PropertyValue};

/// Opaque key/value bag not subject to schema validation (e.g. UI position).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Fills or recomputes derived fields before validation.
pub type DeriveFn = fn(&mut Properties);

/// Process-unique entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Fresh random identifier (UUID v4).
    pub fn new() -> Self {
        EntityId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId(s)
    }
}

/// Label = non-empty values of `fields` joined by `separator`, else the type name.
#[derive(Debug, Clone)]
pub struct LabelRule {
    pub fields: Vec<String>,
    pub separator: String,
}

impl LabelRule {
    pub fn format(&self, type_name: &str, properties: &Properties) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .filter_map(|f| properties.get(f))
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .collect();
        if parts.is_empty() {
            type_name.to_string()
        } else {
            parts.join(&self.separator)
        }
    }
}

/// Equality key rule: the first alternative whose fields are all set wins.
#[derive(Debug, Clone, Default)]
pub struct KeyRule {
    pub alternatives: Vec<Vec<String>>,
}

impl KeyRule {
    /// Normalized key, or `None` when no alternative is fully populated.
    pub fn compute(&self, properties: &Properties) -> Option<String> {
        self.alternatives.iter().find_map(|fields| {
            let parts: Option<Vec<String>> = fields
                .iter()
                .map(|f| {
                    properties
                        .get(f)
                        .filter(|v| !v.is_null())
                        .map(|v| normalize_key_part(&v.to_string()))
                })
                .collect();
            parts
                .filter(|p| !p.is_empty() && p.iter().all(|s| !s.is_empty()))
                .map(|p| p.join("|"))
        })
    }

    fn fields(&self) -> impl Iterator<Item = &String> {
        self.alternatives.iter().flatten()
    }
}

/// Lower-case with all whitespace removed.
pub fn normalize_key_part(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// A registered kind of entity.
#[derive(Debug, Clone)]
pub struct EntityType {
    name: String,
    description: String,
    color: String,
    schema: PropertySchema,
    label_rule: LabelRule,
    key_rule: KeyRule,
    derive: Vec<DeriveFn>,
}

impl EntityType {
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            name: name.into(),
            description: String::new(),
            color: "#607D8B".to_string(),
            fields: Vec::new(),
            label_fields: Vec::new(),
            separator: ", ".to_string(),
            key_alternatives: Vec::new(),
            derive: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    pub fn label_rule(&self) -> &LabelRule {
        &self.label_rule
    }

    pub fn key_rule(&self) -> &KeyRule {
        &self.key_rule
    }

    /// Run derivations, validate, and apply defaults for a new entity's properties.
    pub fn prepare(&self, properties: Properties) -> Result<Properties> {
        let mut validated = self.normalize(properties)?;
        self.schema.apply_defaults(&mut validated);
        Ok(validated)
    }

    /// Run derivations and validate, leaving unset fields unset.
    pub fn normalize(&self, mut properties: Properties) -> Result<Properties> {
        for derive in &self.derive {
            derive(&mut properties);
        }
        self.schema.validate(properties)
    }

    /// Re-run derivations over already-validated properties after a write.
    pub fn rederive(&self, properties: &Properties) -> Result<Properties> {
        let mut next = properties.clone();
        for derive in &self.derive {
            derive(&mut next);
        }
        self.schema.validate(next)
    }

    pub fn label_for(&self, properties: &Properties) -> String {
        self.label_rule.format(&self.name, properties)
    }

    pub fn key_for(&self, properties: &Properties) -> Option<String> {
        self.key_rule.compute(properties)
    }

    pub fn is_label_field(&self, field: &str) -> bool {
        self.label_rule.fields.iter().any(|f| f == field)
    }

    /// Whether the field takes part in any equality-key alternative.
    pub fn is_key_field(&self, field: &str) -> bool {
        self.key_rule.fields().any(|f| f == field)
    }
}

/// Builder for [`EntityType`]; `build` checks that label and key fields exist.
#[derive(Debug)]
pub struct EntityTypeBuilder {
    name: String,
    description: String,
    color: String,
    fields: Vec<FieldSpec>,
    label_fields: Vec<String>,
    separator: String,
    key_alternatives: Vec<Vec<String>>,
    derive: Vec<DeriveFn>,
}

impl EntityTypeBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn label(mut self, fields: &[&str]) -> Self {
        self.label_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn label_fields(mut self, fields: Vec<String>) -> Self {
        self.label_fields = fields;
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Add one equality-key alternative; earlier alternatives take precedence.
    pub fn key(mut self, fields: &[&str]) -> Self {
        self.key_alternatives
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn key_alternatives(mut self, alternatives: Vec<Vec<String>>) -> Self {
        self.key_alternatives.extend(alternatives);
        self
    }

    pub fn derive(mut self, derive: DeriveFn) -> Self {
        self.derive.push(derive);
        self
    }

    pub fn build(self) -> Result<EntityType> {
        if self.name.trim().is_empty() {
            return Err(PanoError::schema("", "", "entity type name must not be empty"));
        }
        let schema = PropertySchema::with_standard_fields(&self.name, self.fields)?;
        let label_rule = LabelRule {
            fields: self.label_fields,
            separator: self.separator,
        };
        let key_rule = KeyRule {
            alternatives: self.key_alternatives,
        };
        for field in label_rule.fields.iter().chain(key_rule.fields()) {
            if !schema.contains(field) {
                return Err(PanoError::schema(
                    &self.name,
                    field,
                    "label/key rule references an undeclared field",
                ));
            }
        }
        Ok(EntityType {
            name: self.name,
            description: self.description,
            color: self.color,
            schema,
            label_rule,
            key_rule,
            derive: self.derive,
        })
    }
}

/// A typed node instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    id: EntityId,
    #[serde(rename = "type")]
    entity_type: String,
    properties: Properties,
    label: String,
    source: String,
    metadata: Metadata,
    #[serde(skip)]
    key: Option<String>,
}

impl Entity {
    /// Build an entity from already-validated properties.
    pub(crate) fn from_validated(
        id: EntityId,
        entity_type: &EntityType,
        properties: Properties,
        source: String,
        metadata: Metadata,
    ) -> Self {
        let label = entity_type.label_for(&properties);
        let key = entity_type.key_for(&properties);
        Self {
            id,
            entity_type: entity_type.name().to_string(),
            properties,
            label,
            source,
            metadata,
            key,
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// String value of a property, empty when unset or not a string.
    pub fn property_str(&self, name: &str) -> &str {
        self.properties
            .get(name)
            .and_then(PropertyValue::as_str)
            .unwrap_or("")
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn equality_key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Non-empty, displayable properties formatted for listing.
    pub fn display_properties(&self, entity_type: &EntityType) -> Vec<(String, String)> {
        entity_type
            .schema()
            .fields()
            .iter()
            .filter(|f| f.display)
            .filter_map(|f| {
                self.properties
                    .get(&f.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (f.name.clone(), v.to_string()))
            })
            .collect()
    }

    /// Replace properties and recompute the label and key.
    pub(crate) fn replace_properties(&mut self, entity_type: &EntityType, properties: Properties) {
        self.label = entity_type.label_for(&properties);
        self.key = entity_type.key_for(&properties);
        self.properties = properties;
    }

    pub(crate) fn set_key(&mut self, key: Option<String>) {
        self.key = key;
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub(crate) fn set_source(&mut self, source: String) {
        self.source = source;
    }
}
