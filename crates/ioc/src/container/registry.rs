use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::DefaultSelection;
use crate::container::descriptor::{Registration, ServiceId};
use crate::errors::ContainerError;

/// Synthesizes registrations for services nobody registered explicitly
pub trait RegistrationSource: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Produce registrations for `service`, or an empty list to decline.
    ///
    /// `registry` may be queried for the services being adapted, which in turn
    /// may consult other sources.
    fn registrations_for(
        &self,
        service: &ServiceId,
        registry: &ComponentRegistry,
    ) -> Vec<Registration>;
}

/// Maps service keys to the registrations able to satisfy them
pub struct ComponentRegistry {
    /// All static registrations in registration order
    registrations: Vec<Arc<Registration>>,
    /// Static registrations by service, in registration order
    services: HashMap<ServiceId, Vec<Arc<Registration>>>,
    sources: Vec<Arc<dyn RegistrationSource>>,
    /// Source results, most recent first, cached once the registry is frozen
    synthesized: RwLock<HashMap<ServiceId, Vec<Arc<Registration>>>>,
    selection: DefaultSelection,
    frozen: bool,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("registrations", &self.registrations.len())
            .field("services", &self.services.len())
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("selection", &self.selection)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            services: HashMap::new(),
            sources: Vec::new(),
            synthesized: RwLock::new(HashMap::new()),
            selection: DefaultSelection::default(),
            frozen: false,
        }
    }

    /// Set the policy picking the default registration
    pub fn set_default_selection(&mut self, selection: DefaultSelection) {
        self.selection = selection;
    }

    /// Add a registration; fails once the registry is frozen
    pub fn register(
        &mut self,
        registration: impl Into<Registration>,
    ) -> Result<Arc<Registration>, ContainerError> {
        if self.frozen {
            return Err(ContainerError::RegistryFrozen);
        }

        let registration = Arc::new(registration.into());
        for service in registration.services() {
            self.services
                .entry(service.clone())
                .or_default()
                .push(registration.clone());
        }
        self.registrations.push(registration.clone());

        tracing::trace!(
            "Registered '{}' ({}) as {}",
            registration.component(),
            registration.lifetime(),
            registration
                .services()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(registration)
    }

    /// Append a registration source, consulted after every earlier one
    pub fn add_source(&mut self, source: Arc<dyn RegistrationSource>) -> Result<(), ContainerError> {
        if self.frozen {
            return Err(ContainerError::RegistryFrozen);
        }
        self.sources.push(source);
        Ok(())
    }

    /// Make the registry read-only
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Static registrations for `service`, most recently registered first
    pub fn lookup(&self, service: &ServiceId) -> Vec<Arc<Registration>> {
        self.services
            .get(service)
            .map(|registrations| registrations.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Registrations for `service`, falling back to registration sources.
    ///
    /// The first source producing anything wins; its result is cached so
    /// later lookups reuse the same synthesized registrations.
    pub fn registrations_for(&self, service: &ServiceId) -> Vec<Arc<Registration>> {
        let registrations = self.lookup(service);
        if !registrations.is_empty() {
            return registrations;
        }

        if self.frozen {
            if let Some(cached) = self.synthesized.read().get(service) {
                return cached.clone();
            }
        }

        let synthesized = self.synthesize(service);

        if !self.frozen {
            return synthesized;
        }

        // Sources run outside the lock since they query the registry themselves;
        // when two threads race, the first stored result is kept.
        self.synthesized
            .write()
            .entry(service.clone())
            .or_insert(synthesized)
            .clone()
    }

    fn synthesize(&self, service: &ServiceId) -> Vec<Arc<Registration>> {
        for source in &self.sources {
            let registrations = source.registrations_for(service, self);
            if !registrations.is_empty() {
                tracing::trace!(
                    "Registration source '{}' synthesized {} registration(s) for {}",
                    source.name(),
                    registrations.len(),
                    service
                );
                return registrations.into_iter().map(Arc::new).collect();
            }
        }
        Vec::new()
    }

    /// The registration answering a single-result resolve of `service`
    pub fn default_registration(&self, service: &ServiceId) -> Option<Arc<Registration>> {
        let registrations = self.registrations_for(service);
        match self.selection {
            DefaultSelection::LastRegistered => registrations.into_iter().next(),
            DefaultSelection::FirstRegistered => registrations.into_iter().last(),
        }
    }

    /// Check if `service` can be resolved through a registration or a source
    pub fn is_registered(&self, service: &ServiceId) -> bool {
        !self.registrations_for(service).is_empty()
    }

    /// All static registrations in registration order
    pub fn registrations(&self) -> impl Iterator<Item = &Arc<Registration>> {
        self.registrations.iter()
    }

    pub fn sources(&self) -> impl Iterator<Item = &Arc<dyn RegistrationSource>> {
        self.sources.iter()
    }

    /// Number of static registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
