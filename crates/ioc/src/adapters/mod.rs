//! Registration sources synthesizing adapter services.
//!
//! Each wrapper type attaches a request descriptor to its service key so the
//! matching source can find the wrapped service without reflection.

pub mod collection;
pub mod factory;
pub mod keyed;
pub mod lazy;
pub mod metadata;

use std::sync::Arc;

use crate::container::activator::Activator;
use crate::container::autowiring::{Parameter, Resolvable};
use crate::container::descriptor::{Ownership, Registration, ServiceId};
use crate::container::registry::RegistrationSource;
use crate::container::scope::WeakLifetimeScope;
use crate::errors::ContainerError;

pub use collection::{All, CollectionSource};
pub use factory::{Factory, FactorySource};
pub use keyed::{Keyed, KeyedSource};
pub use lazy::{Lazy, LazySource};
pub use metadata::{
    Meta, MetaSource, MetadataView, ViewArguments, ViewDescriptor, ViewParameter, ViewProperty,
};

/// The built-in adapter sources, in the order they are consulted
pub fn default_sources() -> Vec<Arc<dyn RegistrationSource>> {
    vec![
        Arc::new(MetaSource),
        Arc::new(FactorySource),
        Arc::new(LazySource),
        Arc::new(CollectionSource),
        Arc::new(KeyedSource),
    ]
}

/// The request descriptor of type `S` carried by `service`, if any
fn request<S: Clone + Send + Sync + 'static>(service: &ServiceId) -> Option<S> {
    service.shape()?.downcast_ref::<S>().cloned()
}

/// The wrapped service key, inheriting the adapter key's name
fn adapted(service: &ServiceId, inner: ServiceId) -> ServiceId {
    match &service.name {
        Some(name) => inner.with_name(name.clone()),
        None => inner,
    }
}

/// Registration for an adapter wrapping `inner`.
///
/// Adapters never own what they wrap and carry the wrapped registration's
/// metadata so adapters can be layered.
fn adapter_registration(
    component: String,
    service: &ServiceId,
    activator: Activator,
    inner: Option<&Registration>,
) -> Registration {
    let registration = Registration::new(component, service.clone(), activator)
        .with_ownership(Ownership::ExternallyOwned);
    match inner {
        Some(inner) => registration.with_metadata_bag(inner.metadata().clone()),
        None => registration,
    }
}

/// A resolve of one particular registration, performed later from the scope
/// that was active when the adapter was created
#[derive(Clone)]
struct DeferredResolve {
    scope: WeakLifetimeScope,
    service: ServiceId,
    registration: Arc<Registration>,
}

impl DeferredResolve {
    fn resolve<R: Resolvable>(&self, parameters: &[Parameter]) -> Result<R, ContainerError> {
        let scope = self.scope.upgrade()?;
        let instance = scope.resolve_registration(&self.service, &self.registration, parameters)?;
        R::from_instance(&instance)
    }

    fn component(&self) -> &str {
        self.registration.component()
    }
}

impl std::fmt::Debug for DeferredResolve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredResolve")
            .field("service", &self.service)
            .field("component", &self.registration.component())
            .field("scope", &self.scope)
            .finish()
    }
}
