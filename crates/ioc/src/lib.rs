pub mod adapters;
pub mod config;
pub mod container;
pub mod errors;

// Re-export key types for convenience
pub use adapters::{All, Factory, Keyed, Lazy, Meta, MetadataView, ViewDescriptor, ViewParameter, ViewProperty};
pub use config::{ConfigError, ContainerConfig, DefaultSelection};
pub use container::{
    Activator, Arguments, ComponentRegistry, ConstructorInfo, Container, ContainerBuilder,
    Disposable, Injectable, LifetimeScope, Lifetime, Metadata, Module, Ownership, Parameter,
    Registration, RegistrationSource, Resolvable, ResolveContext, ScopeTag, ServiceId,
};
pub use errors::{BoxError, ContainerError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
