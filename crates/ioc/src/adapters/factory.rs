use std::marker::PhantomData;
use std::sync::Arc;

use super::{adapted, adapter_registration, request, DeferredResolve};
use crate::container::activator::Activator;
use crate::container::autowiring::{Parameter, Resolvable};
use crate::container::descriptor::{Instance, Registration, ServiceId, ServiceShape};
use crate::container::registry::{ComponentRegistry, RegistrationSource};
use crate::errors::ContainerError;

/// Creates a fresh `R` on every call.
///
/// Resolves happen in the scope the factory was resolved from, not the
/// scope of the caller invoking it.
pub struct Factory<R> {
    deferred: DeferredResolve,
    _product: PhantomData<fn() -> R>,
}

impl<R: Resolvable> Factory<R> {
    pub fn create(&self) -> Result<R, ContainerError> {
        self.deferred.resolve(&[])
    }

    /// Create with parameters overriding the product's constructor arguments
    pub fn create_with(&self, parameters: &[Parameter]) -> Result<R, ContainerError> {
        self.deferred.resolve(parameters)
    }
}

impl<R> Clone for Factory<R> {
    fn clone(&self) -> Self {
        Self {
            deferred: self.deferred.clone(),
            _product: PhantomData,
        }
    }
}

impl<R> std::fmt::Debug for Factory<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Factory").field(&self.deferred).finish()
    }
}

trait FactoryRequest: Send + Sync {
    fn product(&self) -> ServiceId;
    fn build(&self, deferred: DeferredResolve) -> Instance;
}

struct FactoryShape<R>(PhantomData<fn() -> R>);

impl<R: Resolvable> FactoryRequest for FactoryShape<R> {
    fn product(&self) -> ServiceId {
        R::service_id()
    }

    fn build(&self, deferred: DeferredResolve) -> Instance {
        Arc::new(Factory::<R> {
            deferred,
            _product: PhantomData,
        })
    }
}

impl<R: Resolvable> Resolvable for Factory<R> {
    fn service_id() -> ServiceId {
        let shape: Arc<dyn FactoryRequest> = Arc::new(FactoryShape::<R>(PhantomData));
        ServiceId::of::<Factory<R>>().with_shape(ServiceShape::new(shape))
    }
}

/// Synthesizes `Factory<R>` for every registration of `R`
#[derive(Debug, Default)]
pub struct FactorySource;

impl RegistrationSource for FactorySource {
    fn registrations_for(&self, service: &ServiceId, registry: &ComponentRegistry) -> Vec<Registration> {
        let Some(request) = request::<Arc<dyn FactoryRequest>>(service) else {
            return Vec::new();
        };
        let product = adapted(service, request.product());

        registry
            .registrations_for(&product)
            .into_iter()
            .map(|target| {
                let request = request.clone();
                let product = product.clone();
                let component = format!("Factory<{}>", target.component());
                let inner = target.clone();

                let activator = Activator::raw(move |context| {
                    Ok(request.build(DeferredResolve {
                        scope: context.scope().downgrade(),
                        service: product.clone(),
                        registration: inner.clone(),
                    }))
                });
                adapter_registration(component, service, activator, Some(&target))
            })
            .collect()
    }
}

impl<R> Factory<R> {
    /// Name of the component the factory creates
    pub fn component(&self) -> &str {
        self.deferred.component()
    }
}
