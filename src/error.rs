use thiserror::Error;

/// Main error type for Pano
#[derive(Error, Debug)]
pub enum PanoError {
    /// Invalid property value, unknown field, or malformed schema declaration
    #[error("Schema error on {entity_type}.{field}: {reason}")]
    Schema {
        entity_type: String,
        field: String,
        reason: String,
    },

    /// Entity type not registered
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Entity type registered twice
    #[error("Entity type already registered: {0}")]
    DuplicateType(String),

    /// Transform registered twice
    #[error("Transform already registered: {0}")]
    DuplicateTransform(String),

    /// Transform descriptor references types the registry does not know
    #[error("Incompatible transform descriptor '{transform}': {reason}")]
    IncompatibleDescriptor { transform: String, reason: String },

    /// Entity id not present in the graph
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// A write would give two entities of one type the same equality key
    #[error("Duplicate {entity_type} entity for key '{key}'")]
    DuplicateKey { entity_type: String, key: String },

    /// Helper registered twice
    #[error("Helper already registered: {0}")]
    DuplicateHelper(String),

    /// Graph document that cannot be restored as-is
    #[error("Invalid graph document: {0}")]
    InvalidDocument(String),

    /// Transform runtime failure
    #[error("Transform '{transform}' failed: {reason}")]
    Transform { transform: String, reason: String },

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph document (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PanoError {
    /// Build a schema error for one field of one entity type.
    pub fn schema(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PanoError::Schema {
            entity_type: entity_type.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised by property validation.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            PanoError::Schema { .. } | PanoError::UnknownEntityType(_)
        )
    }

    /// True for errors raised while registering plugins.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            PanoError::DuplicateType(_)
                | PanoError::DuplicateTransform(_)
                | PanoError::DuplicateHelper(_)
                | PanoError::IncompatibleDescriptor { .. }
        )
    }
}

/// Convenient Result type using PanoError
pub type Result<T> = std::result::Result<T, PanoError>;
