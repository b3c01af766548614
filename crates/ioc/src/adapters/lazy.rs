use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::{adapted, adapter_registration, request, DeferredResolve};
use crate::container::activator::Activator;
use crate::container::autowiring::Resolvable;
use crate::container::descriptor::{Instance, Registration, ServiceId, ServiceShape};
use crate::container::registry::{ComponentRegistry, RegistrationSource};
use crate::errors::ContainerError;

struct LazyState<R> {
    deferred: DeferredResolve,
    value: OnceCell<R>,
}

/// Resolves `R` on first access and keeps it for the life of the wrapper.
///
/// Clones share the same value. A failed first access is not cached; the
/// next access tries again.
pub struct Lazy<R> {
    state: Arc<LazyState<R>>,
}

impl<R: Resolvable> Lazy<R> {
    pub fn value(&self) -> Result<R, ContainerError> {
        self.state
            .value
            .get_or_try_init(|| self.state.deferred.resolve(&[]))
            .cloned()
    }

    pub fn is_value_created(&self) -> bool {
        self.state.value.get().is_some()
    }
}

impl<R> Clone for Lazy<R> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<R> std::fmt::Debug for Lazy<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy")
            .field("deferred", &self.state.deferred)
            .field("created", &self.state.value.get().is_some())
            .finish()
    }
}

trait LazyRequest: Send + Sync {
    fn target(&self) -> ServiceId;
    fn build(&self, deferred: DeferredResolve) -> Instance;
}

struct LazyShape<R>(PhantomData<fn() -> R>);

impl<R: Resolvable> LazyRequest for LazyShape<R> {
    fn target(&self) -> ServiceId {
        R::service_id()
    }

    fn build(&self, deferred: DeferredResolve) -> Instance {
        Arc::new(Lazy::<R> {
            state: Arc::new(LazyState {
                deferred,
                value: OnceCell::new(),
            }),
        })
    }
}

impl<R: Resolvable> Resolvable for Lazy<R> {
    fn service_id() -> ServiceId {
        let shape: Arc<dyn LazyRequest> = Arc::new(LazyShape::<R>(PhantomData));
        ServiceId::of::<Lazy<R>>().with_shape(ServiceShape::new(shape))
    }
}

/// Synthesizes `Lazy<R>` for every registration of `R`
#[derive(Debug, Default)]
pub struct LazySource;

impl RegistrationSource for LazySource {
    fn registrations_for(&self, service: &ServiceId, registry: &ComponentRegistry) -> Vec<Registration> {
        let Some(request) = request::<Arc<dyn LazyRequest>>(service) else {
            return Vec::new();
        };
        let target_service = adapted(service, request.target());

        registry
            .registrations_for(&target_service)
            .into_iter()
            .map(|target| {
                let request = request.clone();
                let target_service = target_service.clone();
                let component = format!("Lazy<{}>", target.component());
                let inner = target.clone();

                let activator = Activator::raw(move |context| {
                    Ok(request.build(DeferredResolve {
                        scope: context.scope().downgrade(),
                        service: target_service.clone(),
                        registration: inner.clone(),
                    }))
                });
                adapter_registration(component, service, activator, Some(&target))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::builder::ContainerBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Expensive(usize);

    #[test]
    fn test_lazy_resolves_once_on_first_access() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let container = ContainerBuilder::new()
            .register(Registration::from_delegate(move |_| {
                Ok(Expensive(counter.fetch_add(1, Ordering::SeqCst)))
            }))
            .build()
            .unwrap();

        let lazy = container.get::<Lazy<Arc<Expensive>>>().unwrap();
        assert!(!lazy.is_value_created());
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let first = lazy.value().unwrap();
        let second = lazy.clone().value().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(lazy.is_value_created());
        assert_eq!(built.load(Ordering::SeqCst), 1);

        let other = container.get::<Lazy<Arc<Expensive>>>().unwrap();
        assert_eq!(other.value().unwrap().0, 1);
    }

    #[test]
    fn test_lazy_failure_is_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let container = ContainerBuilder::new()
            .register(Registration::from_delegate(move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err("warming up".into());
                }
                Ok(Expensive(7))
            }))
            .build()
            .unwrap();

        let lazy = container.get::<Lazy<Arc<Expensive>>>().unwrap();
        assert!(lazy.value().is_err());
        assert!(!lazy.is_value_created());
        assert_eq!(lazy.value().unwrap().0, 7);
    }
}
