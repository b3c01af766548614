use thiserror::Error;

use crate::config::ConfigError;

/// Boxed error returned by activators and disposal hooks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for registration, resolution and scope teardown
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("The requested service '{service}' has not been registered")]
    ComponentNotRegistered { service: String },

    #[error("Circular component dependency detected: {path}")]
    CircularDependency { path: String, chain: Vec<String> },

    #[error("Maximum resolve depth of {depth} exceeded, probable circular dependency: {path}")]
    ResolveDepthExceeded { depth: usize, path: String },

    #[error("No metadata value was supplied for the property '{property}' and it declares no default")]
    MissingMetadata { property: String },

    #[error("The metadata view '{view}' has no unambiguous constructor that can be populated from metadata")]
    InvalidViewImplementation { view: String },

    #[error("An error occurred while activating '{component}': {source}")]
    ActivationFailed { component: String, source: BoxError },

    #[error("Lifetime scope '{scope}' has already been disposed")]
    ObjectDisposed { scope: String },

    #[error("No scope tagged '{tag}' is visible from the scope in which '{service}' was requested")]
    NoMatchingScope { tag: String, service: String },

    #[error("The component registry is frozen, registrations cannot be added after build")]
    RegistryFrozen,

    #[error("Invalid registration for '{component}': {message}")]
    InvalidRegistration { component: String, message: String },

    #[error("Instance of '{service}' could not be converted to '{expected}'")]
    TypeMismatch { service: String, expected: String },

    #[error("{} error(s) occurred while disposing lifetime scope '{scope}'", .errors.len())]
    Disposal { scope: String, errors: Vec<BoxError> },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{source} (while resolving '{service}', path: {path})")]
    DependencyResolution {
        service: String,
        path: String,
        source: Box<ContainerError>,
    },
}

impl ContainerError {
    /// Create a component not registered error
    pub fn not_registered(service: impl Into<String>) -> Self {
        Self::ComponentNotRegistered {
            service: service.into(),
        }
    }

    /// Create a missing metadata error
    pub fn missing_metadata(property: impl Into<String>) -> Self {
        Self::MissingMetadata {
            property: property.into(),
        }
    }

    /// Create an invalid view implementation error
    pub fn invalid_view(view: impl Into<String>) -> Self {
        Self::InvalidViewImplementation { view: view.into() }
    }

    /// Create an object disposed error
    pub fn disposed(scope: impl Into<String>) -> Self {
        Self::ObjectDisposed {
            scope: scope.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(service: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            service: service.into(),
            expected: expected.into(),
        }
    }

    /// Classify an error raised by an activator.
    ///
    /// Container errors bubbling out of nested resolves keep their identity,
    /// anything else is an activation failure of `component`.
    pub fn from_activation(component: impl Into<String>, error: BoxError) -> Self {
        match error.downcast::<ContainerError>() {
            Ok(inner) => *inner,
            Err(source) => Self::ActivationFailed {
                component: component.into(),
                source,
            },
        }
    }

    /// The root cause, unwrapping any resolution context
    pub fn innermost(&self) -> &ContainerError {
        match self {
            Self::DependencyResolution { source, .. } => source.innermost(),
            other => other,
        }
    }

    /// Check if the error means the service is simply not registered
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::ComponentNotRegistered { .. })
    }

    /// Check if the root cause is a circular dependency
    pub fn is_circular(&self) -> bool {
        matches!(
            self.innermost(),
            Self::CircularDependency { .. } | Self::ResolveDepthExceeded { .. }
        )
    }

    /// Check if the root cause is a disposed scope
    pub fn is_disposed(&self) -> bool {
        matches!(self.innermost(), Self::ObjectDisposed { .. })
    }
}
