use std::ops::Deref;
use std::sync::Arc;

use crate::adapters;
use crate::config::ContainerConfig;
use crate::container::descriptor::Registration;
use crate::container::module::Module;
use crate::container::registry::{ComponentRegistry, RegistrationSource};
use crate::container::scope::LifetimeScope;
use crate::errors::ContainerError;

/// Builder for constructing containers from registrations, sources and modules
pub struct ContainerBuilder {
    config: ContainerConfig,
    registrations: Vec<Registration>,
    sources: Vec<Arc<dyn RegistrationSource>>,
    modules: Vec<Arc<dyn Module>>,
    default_sources: bool,
}

impl std::fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("config", &self.config)
            .field("registrations", &self.registrations.len())
            .field("sources", &self.sources.len())
            .field("modules", &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("default_sources", &self.default_sources)
            .finish()
    }
}

impl ContainerBuilder {
    /// Create a new container builder
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            registrations: Vec::new(),
            sources: Vec::new(),
            modules: Vec::new(),
            default_sources: true,
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Skip the built-in adapter sources (`Meta`, `Factory`, `Lazy`, `All`, `Keyed`)
    pub fn without_default_sources(mut self) -> Self {
        self.default_sources = false;
        self
    }

    /// Add a registration
    pub fn register(mut self, registration: impl Into<Registration>) -> Self {
        self.add_registration(registration);
        self
    }

    /// Add a registration through a mutable reference, as modules do
    pub fn add_registration(&mut self, registration: impl Into<Registration>) -> &mut Self {
        self.registrations.push(registration.into());
        self
    }

    /// Add a registration source, consulted before the built-in ones
    pub fn register_source(mut self, source: impl RegistrationSource + 'static) -> Self {
        self.add_source(source);
        self
    }

    pub fn add_source(&mut self, source: impl RegistrationSource + 'static) -> &mut Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Add a module, loaded when the container is built
    pub fn register_module(mut self, module: impl Module + 'static) -> Self {
        self.add_module(module);
        self
    }

    pub fn add_module(&mut self, module: impl Module + 'static) -> &mut Self {
        self.modules.push(Arc::new(module));
        self
    }

    /// Configure the builder from a configuration closure
    pub fn configure<F>(self, configure: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        configure(self)
    }

    /// Number of registrations added so far
    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Move registrations and sources into `registry`
    pub(crate) fn apply_to(self, registry: &mut ComponentRegistry) -> Result<(), ContainerError> {
        for registration in self.registrations {
            registry.register(registration)?;
        }
        for source in self.sources {
            registry.add_source(source)?;
        }
        if self.default_sources {
            for source in adapters::default_sources() {
                registry.add_source(source)?;
            }
        }
        Ok(())
    }

    /// Build the container
    pub fn build(mut self) -> Result<Container, ContainerError> {
        self.config.validate()?;

        // Modules may register further modules while loading
        let mut loaded: Vec<Arc<dyn Module>> = Vec::new();
        while !self.modules.is_empty() {
            for module in std::mem::take(&mut self.modules) {
                tracing::debug!("Loading module '{}'", module.name());
                module.load(&mut self);
                loaded.push(module);
            }
        }

        let config = Arc::new(self.config.clone());
        let mut registry = ComponentRegistry::new();
        registry.set_default_selection(config.default_selection);
        self.apply_to(&mut registry)?;

        for module in &loaded {
            for registration in registry.registrations() {
                module.attach_to_registration(&registry, registration)?;
            }
        }

        registry.freeze();
        tracing::debug!(
            "Built container with {} registration(s), {} source(s) and {} module(s)",
            registry.len(),
            registry.sources().count(),
            loaded.len()
        );

        Ok(Container {
            root: LifetimeScope::root(Arc::new(registry), config),
        })
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A built container; dereferences to its root lifetime scope.
///
/// Dropping the container disposes the root scope and everything under it.
pub struct Container {
    root: LifetimeScope,
}

impl Container {
    /// Start building a container
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn root_scope(&self) -> &LifetimeScope {
        &self.root
    }
}

impl Deref for Container {
    type Target = LifetimeScope;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("root", &self.root)
            .field("registry", self.root.registry())
            .finish()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.root.is_disposed() {
            return;
        }
        if let Err(e) = self.root.dispose() {
            tracing::warn!("Error disposing container: {}", e);
        }
    }
}
