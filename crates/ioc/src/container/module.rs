use crate::container::builder::ContainerBuilder;
use crate::container::descriptor::Registration;
use crate::container::registry::ComponentRegistry;
use crate::errors::ContainerError;

/// A group of related registrations loaded into a container together
pub trait Module: Send + Sync {
    /// Module name for identification
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Add the module's registrations, sources or nested modules
    fn load(&self, builder: &mut ContainerBuilder);

    /// Inspect every registration of the container being built.
    ///
    /// Runs once the registry holds all registrations; an error aborts the build.
    fn attach_to_registration(
        &self,
        _registry: &ComponentRegistry,
        _registration: &Registration,
    ) -> Result<(), ContainerError> {
        Ok(())
    }

    /// Load this module directly into an unfrozen registry
    fn configure(&self, registry: &mut ComponentRegistry) -> Result<(), ContainerError> {
        let mut builder = ContainerBuilder::new().without_default_sources();
        self.load(&mut builder);
        builder.apply_to(registry)?;

        for registration in registry.registrations() {
            self.attach_to_registration(registry, registration)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::descriptor::{Lifetime, ServiceId};

    struct Clock;

    struct ClockModule;

    impl Module for ClockModule {
        fn load(&self, builder: &mut ContainerBuilder) {
            builder.add_registration(Registration::from_delegate(|_| Ok(Clock)).single_instance());
        }
    }

    struct NoSingletons;

    impl Module for NoSingletons {
        fn load(&self, _builder: &mut ContainerBuilder) {}

        fn attach_to_registration(
            &self,
            _registry: &ComponentRegistry,
            registration: &Registration,
        ) -> Result<(), ContainerError> {
            if registration.lifetime() == &Lifetime::SingleInstance {
                return Err(ContainerError::InvalidRegistration {
                    component: registration.component().to_string(),
                    message: "single instances are not allowed here".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn test_configure_loads_into_registry() {
        let mut registry = ComponentRegistry::new();
        ClockModule.configure(&mut registry).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.is_registered(&ServiceId::of::<Clock>()));
        assert!(ClockModule.name().ends_with("ClockModule"));
    }

    #[test]
    fn test_attach_can_reject_registrations() {
        let mut registry = ComponentRegistry::new();
        ClockModule.configure(&mut registry).unwrap();

        let error = NoSingletons.configure(&mut registry).unwrap_err();
        assert!(matches!(error, ContainerError::InvalidRegistration { .. }));
    }
}
