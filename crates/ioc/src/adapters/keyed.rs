use std::marker::PhantomData;
use std::sync::Arc;

use super::{adapter_registration, request};
use crate::container::activator::Activator;
use crate::container::autowiring::Resolvable;
use crate::container::descriptor::{Instance, Registration, ServiceId, ServiceShape};
use crate::container::registry::{ComponentRegistry, RegistrationSource};
use crate::container::scope::WeakLifetimeScope;
use crate::errors::ContainerError;

/// Index over the named registrations of `R`, resolved on demand from the
/// scope the index was resolved in
pub struct Keyed<R> {
    scope: WeakLifetimeScope,
    _element: PhantomData<fn() -> R>,
}

impl<R: Resolvable> Keyed<R> {
    fn key(name: &str) -> ServiceId {
        R::service_id().with_name(name)
    }

    /// Resolve the registration named `name`
    pub fn get(&self, name: &str) -> Result<R, ContainerError> {
        let instance = self.scope.upgrade()?.resolve_service(&Self::key(name), &[])?;
        R::from_instance(&instance)
    }

    /// Like `get`, but `None` when nothing is registered under `name`
    pub fn try_get(&self, name: &str) -> Result<Option<R>, ContainerError> {
        match self.scope.upgrade()?.try_resolve_service(&Self::key(name), &[])? {
            Some(instance) => R::from_instance(&instance).map(Some),
            None => Ok(None),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scope
            .upgrade()
            .map(|scope| scope.registry().is_registered(&Self::key(name)))
            .unwrap_or(false)
    }
}

impl<R> Clone for Keyed<R> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            _element: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for Keyed<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyed")
            .field("element", &std::any::type_name::<R>())
            .field("scope", &self.scope)
            .finish()
    }
}

trait KeyedRequest: Send + Sync {
    fn build(&self, scope: WeakLifetimeScope) -> Instance;
}

struct KeyedShape<R>(PhantomData<fn() -> R>);

impl<R: Resolvable> KeyedRequest for KeyedShape<R> {
    fn build(&self, scope: WeakLifetimeScope) -> Instance {
        Arc::new(Keyed::<R> {
            scope,
            _element: PhantomData,
        })
    }
}

impl<R: Resolvable> Resolvable for Keyed<R> {
    fn service_id() -> ServiceId {
        let shape: Arc<dyn KeyedRequest> = Arc::new(KeyedShape::<R>(PhantomData));
        ServiceId::of::<Keyed<R>>().with_shape(ServiceShape::new(shape))
    }
}

/// Synthesizes `Keyed<R>` indexes
#[derive(Debug, Default)]
pub struct KeyedSource;

impl RegistrationSource for KeyedSource {
    fn registrations_for(&self, service: &ServiceId, _registry: &ComponentRegistry) -> Vec<Registration> {
        // Only the unnamed index exists
        if service.name.is_some() {
            return Vec::new();
        }
        let Some(request) = request::<Arc<dyn KeyedRequest>>(service) else {
            return Vec::new();
        };

        let component = format!("Keyed<{}>", service.type_name());
        let activator = Activator::raw(move |context| Ok(request.build(context.scope().downgrade())));
        vec![adapter_registration(component, service, activator, None)]
    }
}
