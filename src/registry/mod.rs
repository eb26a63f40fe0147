//! Plugin registry: entity types, transforms, and helpers.
//!
//! Built once at startup (from the compiled-in builtins plus configured
//! definition files), then shared read-only behind an `Arc`. Tests build
//! isolated instances; binaries install one process-wide instance with
//! [`install_global`].

pub mod definition;

use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use crate::config::PluginsConfig;
use crate::entity::builtin::builtin_entity_types;
use crate::entity::EntityType;
use crate::error::{PanoError, Result};
use crate::helper::{builtin_helpers, Helper};
use crate::transform::{builtin_transforms, Transform};

use definition::EntityTypeFile;

/// Something a plugin contributes to the registry.
pub enum Plugin {
    EntityType(EntityType),
    Transform(Arc<dyn Transform>),
    Helper(Arc<dyn Helper>),
}

impl Plugin {
    pub fn name(&self) -> &str {
        match self {
            Plugin::EntityType(t) => t.name(),
            Plugin::Transform(t) => t.descriptor().name.as_str(),
            Plugin::Helper(h) => h.name(),
        }
    }
}

/// Outcome of a bulk load: what went in and what was skipped.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub registered: Vec<String>,
    pub skipped: Vec<(String, PanoError)>,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.registered.extend(other.registered);
        self.skipped.extend(other.skipped);
    }
}

/// Indices over everything that was registered.
#[derive(Default)]
pub struct PluginRegistry {
    entity_types: IndexMap<String, Arc<EntityType>>,
    transforms: IndexMap<String, Arc<dyn Transform>>,
    // entity type -> names of transforms accepting it, in registration order
    compatibility: HashMap<String, Vec<String>>,
    helpers: IndexMap<String, Arc<dyn Helper>>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in entity types, transforms, and helpers.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        for entity_type in builtin_entity_types()? {
            registry.register_entity_type(entity_type)?;
        }
        for transform in builtin_transforms() {
            registry.register_transform(transform)?;
        }
        for helper in builtin_helpers() {
            registry.register_helper(helper)?;
        }
        Ok(registry)
    }

    /// Builtins plus configured definition files, minus disabled transforms.
    /// Faulty definition files are logged and skipped.
    pub fn from_config(config: &PluginsConfig) -> Result<Self> {
        let mut registry = Self::new();
        let mut plugins: Vec<Plugin> = builtin_entity_types()?
            .into_iter()
            .map(Plugin::EntityType)
            .collect();
        let mut report = LoadReport::default();

        for path in &config.entity_type_files {
            match read_definitions(path) {
                Ok((types, skipped)) => {
                    plugins.extend(types.into_iter().map(Plugin::EntityType));
                    report.skipped.extend(skipped);
                }
                Err(e) => {
                    log::warn!("Skipping entity type file {}: {}", path.display(), e);
                    report.skipped.push((path.display().to_string(), e));
                }
            }
        }

        let disabled: HashSet<&str> = config.disabled_transforms.iter().map(String::as_str).collect();
        for transform in builtin_transforms() {
            if disabled.contains(transform.descriptor().name.as_str()) {
                log::info!("Transform '{}' disabled by configuration", transform.descriptor().name);
                continue;
            }
            plugins.push(Plugin::Transform(transform));
        }
        plugins.extend(builtin_helpers().into_iter().map(Plugin::Helper));

        report.merge(registry.load(plugins));
        log::info!(
            "Plugin registry ready: {} entity types, {} transforms, {} helpers ({} skipped)",
            registry.entity_types.len(),
            registry.transforms.len(),
            registry.helpers.len(),
            report.skipped.len()
        );
        Ok(registry)
    }

    /// Register many plugins, entity types first. Failures are logged and
    /// skipped; they never abort the rest of the load.
    pub fn load(&mut self, plugins: impl IntoIterator<Item = Plugin>) -> LoadReport {
        let mut ordered: Vec<Plugin> = plugins.into_iter().collect();
        ordered.sort_by_key(|p| match p {
            Plugin::EntityType(_) => 0,
            Plugin::Transform(_) => 1,
            Plugin::Helper(_) => 2,
        });

        let mut report = LoadReport::default();
        for plugin in ordered {
            let name = plugin.name().to_string();
            let result = match plugin {
                Plugin::EntityType(t) => self.register_entity_type(t),
                Plugin::Transform(t) => self.register_transform(t),
                Plugin::Helper(h) => self.register_helper(h),
            };
            match result {
                Ok(()) => report.registered.push(name),
                Err(e) => {
                    log::warn!("Skipping plugin '{}': {}", name, e);
                    report.skipped.push((name, e));
                }
            }
        }
        report
    }

    /// Register every valid definition in a TOML file.
    pub fn load_entity_type_file(&mut self, path: &Path) -> Result<LoadReport> {
        let (types, skipped) = read_definitions(path)?;
        let mut report = self.load(types.into_iter().map(Plugin::EntityType));
        report.skipped.extend(skipped);
        Ok(report)
    }

    pub fn register_entity_type(&mut self, entity_type: EntityType) -> Result<()> {
        let name = entity_type.name().to_string();
        if self.entity_types.contains_key(&name) {
            return Err(PanoError::DuplicateType(name));
        }
        log::debug!("Registered entity type '{}'", name);
        self.entity_types.insert(name, Arc::new(entity_type));
        Ok(())
    }

    /// Register a transform whose declared input/output types are all known.
    pub fn register_transform(&mut self, transform: Arc<dyn Transform>) -> Result<()> {
        let descriptor = transform.descriptor();
        let name = descriptor.name.clone();
        let incompatible = |reason: String| PanoError::IncompatibleDescriptor {
            transform: name.clone(),
            reason,
        };

        if name.trim().is_empty() {
            return Err(incompatible("transform name must not be empty".into()));
        }
        if self.transforms.contains_key(&name) {
            return Err(PanoError::DuplicateTransform(name.clone()));
        }
        if descriptor.input_types.is_empty() {
            return Err(incompatible("declares no input types".into()));
        }
        for ty in &descriptor.input_types {
            if !self.entity_types.contains_key(ty) {
                return Err(incompatible(format!("unknown input type '{ty}'")));
            }
        }
        for ty in &descriptor.output_types {
            if !self.entity_types.contains_key(ty) {
                return Err(incompatible(format!("unknown output type '{ty}'")));
            }
        }

        for ty in &descriptor.input_types {
            let names = self.compatibility.entry(ty.clone()).or_default();
            if !names.contains(&name) {
                names.push(name.clone());
            }
        }
        log::debug!("Registered transform '{}'", name);
        self.transforms.insert(name, transform);
        Ok(())
    }

    pub fn register_helper(&mut self, helper: Arc<dyn Helper>) -> Result<()> {
        let name = helper.name().to_string();
        if self.helpers.contains_key(&name) {
            return Err(PanoError::DuplicateHelper(name));
        }
        self.helpers.insert(name, helper);
        Ok(())
    }

    pub fn entity_type(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.entity_types.get(name)
    }

    /// Entity types in registration order.
    pub fn entity_types(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.entity_types.values()
    }

    pub fn transform(&self, name: &str) -> Option<&Arc<dyn Transform>> {
        self.transforms.get(name)
    }

    pub fn transforms(&self) -> impl Iterator<Item = &Arc<dyn Transform>> {
        self.transforms.values()
    }

    /// Transforms accepting `entity_type`, in registration order. Empty when none apply.
    pub fn transforms_for(&self, entity_type: &str) -> Vec<Arc<dyn Transform>> {
        self.compatibility
            .get(entity_type)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| self.transforms.get(n).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn helper(&self, name: &str) -> Option<&Arc<dyn Helper>> {
        self.helpers.get(name)
    }

    pub fn helpers(&self) -> impl Iterator<Item = &Arc<dyn Helper>> {
        self.helpers.values()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("entity_types", &self.entity_types.keys().collect::<Vec<_>>())
            .field("transforms", &self.transforms.keys().collect::<Vec<_>>())
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Parse a definition file; invalid definitions are returned as skipped.
fn read_definitions(path: &Path) -> Result<(Vec<EntityType>, Vec<(String, PanoError)>)> {
    let content = std::fs::read_to_string(path)?;
    let file = EntityTypeFile::parse(&content)?;
    let mut types = Vec::new();
    let mut skipped = Vec::new();
    for definition in &file.entity_types {
        match definition.build() {
            Ok(t) => types.push(t),
            Err(e) => {
                log::warn!(
                    "Skipping entity type '{}' from {}: {}",
                    definition.name,
                    path.display(),
                    e
                );
                skipped.push((definition.name.clone(), e));
            }
        }
    }
    Ok((types, skipped))
}

static GLOBAL: OnceLock<Arc<PluginRegistry>> = OnceLock::new();

/// Install the process-wide registry. Only the first call takes effect.
pub fn install_global(registry: PluginRegistry) -> Arc<PluginRegistry> {
    let mut candidate = Some(registry);
    let installed = GLOBAL.get_or_init(|| Arc::new(candidate.take().unwrap_or_default()));
    if candidate.is_some() {
        log::warn!("Plugin registry already installed; ignoring second registry");
    }
    Arc::clone(installed)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<Arc<PluginRegistry>> {
    GLOBAL.get().cloned()
}
