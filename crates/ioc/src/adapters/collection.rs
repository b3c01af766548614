use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use super::{adapted, adapter_registration, request};
use crate::container::activator::Activator;
use crate::container::autowiring::Resolvable;
use crate::container::descriptor::{Instance, Registration, ServiceId, ServiceShape};
use crate::container::registry::{ComponentRegistry, RegistrationSource};
use crate::errors::ContainerError;

/// Every registration of `R`, resolved in registration order
pub struct All<R> {
    items: Arc<Vec<R>>,
}

impl<R> All<R> {
    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<R: Clone> All<R> {
    pub fn to_vec(&self) -> Vec<R> {
        self.items.as_ref().clone()
    }
}

impl<R> Deref for All<R> {
    type Target = [R];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<'a, R> IntoIterator for &'a All<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<R> Clone for All<R> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<R> std::fmt::Debug for All<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("All").field("len", &self.items.len()).finish()
    }
}

trait CollectionRequest: Send + Sync {
    fn element(&self) -> ServiceId;
    fn collect(&self, instances: Vec<Instance>) -> Result<Instance, ContainerError>;
}

struct CollectionShape<R>(PhantomData<fn() -> R>);

impl<R: Resolvable> CollectionRequest for CollectionShape<R> {
    fn element(&self) -> ServiceId {
        R::service_id()
    }

    fn collect(&self, instances: Vec<Instance>) -> Result<Instance, ContainerError> {
        let items = instances
            .iter()
            .map(R::from_instance)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(All {
            items: Arc::new(items),
        }))
    }
}

impl<R: Resolvable> Resolvable for All<R> {
    fn service_id() -> ServiceId {
        let shape: Arc<dyn CollectionRequest> = Arc::new(CollectionShape::<R>(PhantomData));
        ServiceId::of::<All<R>>().with_shape(ServiceShape::new(shape))
    }
}

/// Synthesizes `All<R>`; an empty collection when `R` has no registrations
#[derive(Debug, Default)]
pub struct CollectionSource;

impl RegistrationSource for CollectionSource {
    fn registrations_for(&self, service: &ServiceId, _registry: &ComponentRegistry) -> Vec<Registration> {
        let Some(request) = request::<Arc<dyn CollectionRequest>>(service) else {
            return Vec::new();
        };
        let element = adapted(service, request.element());
        let component = format!("All<{}>", element);

        let activator = Activator::raw(move |context| {
            // Registrations come back most recent first
            let mut registrations = context.registry().registrations_for(&element);
            registrations.reverse();

            let instances = registrations
                .iter()
                .map(|registration| context.resolve_registration(&element, registration))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(request.collect(instances)?)
        });

        vec![adapter_registration(component, service, activator, None)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::builder::ContainerBuilder;

    trait Handler: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Audit;
    struct Mail;

    impl Handler for Audit {
        fn name(&self) -> &'static str {
            "audit"
        }
    }

    impl Handler for Mail {
        fn name(&self) -> &'static str {
            "mail"
        }
    }

    #[test]
    fn test_all_preserves_registration_order() {
        let container = ContainerBuilder::new()
            .register(Registration::from_shared_instance(Arc::new(Audit) as Arc<dyn Handler>))
            .register(Registration::from_shared_instance(Arc::new(Mail) as Arc<dyn Handler>))
            .build()
            .unwrap();

        let handlers = container.get::<All<Arc<dyn Handler>>>().unwrap();
        let names: Vec<_> = handlers.iter().map(|handler| handler.name()).collect();
        assert_eq!(names, vec!["audit", "mail"]);

        assert_eq!(container.resolve::<dyn Handler>().unwrap().name(), "mail");
    }

    #[test]
    fn test_all_of_nothing_is_empty() {
        let container = ContainerBuilder::new().build().unwrap();
        let handlers = container.get::<All<Arc<dyn Handler>>>().unwrap();
        assert!(handlers.is_empty());
        assert!(container.is_registered::<All<Arc<dyn Handler>>>());
    }
}
