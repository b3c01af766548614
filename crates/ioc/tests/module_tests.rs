use std::sync::Arc;

use parking_lot::Mutex;

use elif_ioc::container::RegistrationId;
use elif_ioc::{
    ComponentRegistry, ContainerBuilder, ContainerError, Module, Registration, ServiceId,
};

struct Settings;

struct SettingsModule;

impl Module for SettingsModule {
    fn load(&self, builder: &mut ContainerBuilder) {
        builder.add_registration(Registration::from_instance(Settings));
    }
}

#[test]
fn test_loads_registrations() {
    let mut registry = ComponentRegistry::new();
    SettingsModule.configure(&mut registry).unwrap();
    assert!(registry.is_registered(&ServiceId::of::<Settings>()));
}

#[derive(Default)]
struct AttachingModule {
    registrations: Arc<Mutex<Vec<RegistrationId>>>,
}

impl Module for AttachingModule {
    fn load(&self, _builder: &mut ContainerBuilder) {}

    fn attach_to_registration(
        &self,
        _registry: &ComponentRegistry,
        registration: &Registration,
    ) -> Result<(), ContainerError> {
        self.registrations.lock().push(registration.id());
        Ok(())
    }
}

#[test]
fn test_attaches_to_registrations() {
    let attaching = AttachingModule::default();
    let seen = attaching.registrations.clone();
    assert!(seen.lock().is_empty());

    let container = ContainerBuilder::new()
        .register(Registration::from_instance(Settings))
        .register_module(attaching)
        .register(Registration::from_instance("Hello!".to_string()))
        .build()
        .unwrap();

    let registered: Vec<_> = container
        .registry()
        .registrations()
        .map(|registration| registration.id())
        .collect();
    assert_eq!(*seen.lock(), registered);
}

#[test]
fn test_modules_contribute_to_the_built_container() {
    let container = ContainerBuilder::new()
        .register_module(SettingsModule)
        .build()
        .unwrap();

    assert!(container.resolve::<Settings>().is_ok());
}
