pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod graph;
pub mod helper;
pub mod registry;
pub mod schema;
pub mod status;
pub mod transform;

pub use config::Config;
pub use engine::{EngineConfig, ExecutionReport, Outcome, TransformEngine};
pub use entity::{Entity, EntityId, EntityType};
pub use error::{PanoError, Result};
pub use graph::{InvestigationGraph, Relationship, RelationshipId, SharedGraph};
pub use registry::PluginRegistry;
pub use schema::{Properties, PropertyValue};
pub use status::{StatusEvent, StatusReporter};
pub use transform::{Transform, TransformContext, TransformDescriptor, TransformOutput};
