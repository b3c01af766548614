use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::container::activator::Activator;
use crate::container::autowiring::Injectable;
use crate::container::lifecycle::Disposable;
use crate::container::resolver::ResolveContext;
use crate::container::scope::ScopeTag;
use crate::errors::{BoxError, ContainerError};

/// A live, type-erased service instance.
///
/// Plain services of type `T` are stored as `Arc<T>`; adapter wrappers such as
/// `Meta` or `Factory` are stored as themselves.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Free-form metadata attached to a registration
pub type Metadata = HashMap<String, serde_json::Value>;

/// Opaque request descriptor attached to a service key by adapter types
#[derive(Clone)]
pub struct ServiceShape(Arc<dyn Any + Send + Sync>);

impl ServiceShape {
    /// Wrap a shape descriptor
    pub fn new<S: Any + Send + Sync>(shape: S) -> Self {
        Self(Arc::new(shape))
    }

    /// Access the descriptor if it is of type `S`
    pub fn downcast_ref<S: Any>(&self) -> Option<&S> {
        self.0.downcast_ref::<S>()
    }
}

impl std::fmt::Debug for ServiceShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServiceShape(<descriptor>)")
    }
}

/// Service identifier combining type and optional name.
///
/// Equality and hashing only consider the type and the name; the optional
/// shape is carried along for registration sources that need to decompose
/// composite requests such as `Meta<Factory<T>, V>`.
#[derive(Debug, Clone)]
pub struct ServiceId {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub name: Option<String>,
    shape: Option<ServiceShape>,
}

impl ServiceId {
    /// Create a new service ID for a type
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: None,
            shape: None,
        }
    }

    /// Create a named service ID for a type
    pub fn named<T: 'static + ?Sized>(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::of::<T>()
        }
    }

    /// Attach an adapter shape to this key
    pub fn with_shape(mut self, shape: ServiceShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Replace the name discriminator
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The adapter shape, if this key was produced by an adapter type
    pub fn shape(&self) -> Option<&ServiceShape> {
        self.shape.as_ref()
    }

    /// Check if this ServiceId matches a type and name without allocating
    pub fn matches_named<T: 'static + ?Sized>(&self, name: &str) -> bool {
        self.type_id == TypeId::of::<T>() && self.name.as_deref() == Some(name)
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ServiceId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.name == other.name
    }
}

impl Eq for ServiceId {}

impl Hash for ServiceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.name.hash(state);
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}({})", self.type_name, name),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// Controls how instances of a registration are shared
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// A new instance for every dependency
    PerDependency,
    /// One instance for the whole container, held by the root scope
    SingleInstance,
    /// One instance per lifetime scope
    PerLifetimeScope,
    /// One instance per nearest scope carrying the tag
    PerMatchingScope(ScopeTag),
}

impl Lifetime {
    /// Check if instances are cached by some scope
    pub fn is_shared(&self) -> bool {
        !matches!(self, Lifetime::PerDependency)
    }

    /// Get the lifetime name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::PerDependency => "per_dependency",
            Lifetime::SingleInstance => "single_instance",
            Lifetime::PerLifetimeScope => "per_lifetime_scope",
            Lifetime::PerMatchingScope(_) => "per_matching_scope",
        }
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Lifetime::PerDependency
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifetime::PerMatchingScope(tag) => write!(f, "per_matching_scope({})", tag),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Whether the container disposes the instances it activates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ownership {
    #[default]
    Owned,
    ExternallyOwned,
}

/// Unique identity of a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(uuid::Uuid);

impl RegistrationId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type CastFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;
type DisposeHook = Arc<dyn Fn(&Instance) -> Option<Arc<dyn Disposable>> + Send + Sync>;

/// A service exposed by a registration
#[derive(Clone)]
struct ExposedService {
    service: ServiceId,
    /// Converts the activated instance into this service; `None` for the primary service
    cast: Option<CastFn>,
}

/// Immutable description of how to produce instances for one or more services
#[derive(Clone)]
pub struct Registration {
    id: RegistrationId,
    component: String,
    services: Vec<ExposedService>,
    activator: Activator,
    lifetime: Lifetime,
    ownership: Ownership,
    metadata: Metadata,
    disposer: Option<DisposeHook>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("component", &self.component)
            .field("services", &self.services().collect::<Vec<_>>())
            .field("activator", &self.activator)
            .field("lifetime", &self.lifetime)
            .field("ownership", &self.ownership)
            .field("metadata", &self.metadata)
            .field("disposable", &self.disposer.is_some())
            .finish()
    }
}

impl Registration {
    /// Create a per-dependency registration exposing `service`
    pub fn new(component: impl Into<String>, service: ServiceId, activator: Activator) -> Self {
        Self {
            id: RegistrationId::new(),
            component: component.into(),
            services: vec![ExposedService {
                service,
                cast: None,
            }],
            activator,
            lifetime: Lifetime::PerDependency,
            ownership: Ownership::Owned,
            metadata: Metadata::new(),
            disposer: None,
        }
    }

    /// Register `T` built through its `Injectable` constructor
    pub fn from_type<T: Injectable>() -> RegistrationBuilder<T> {
        RegistrationBuilder::new(Activator::for_injectable::<T>())
    }

    /// Register `T` built by a delegate
    pub fn from_delegate<T, F>(factory: F) -> RegistrationBuilder<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        RegistrationBuilder::new(Activator::delegate(factory))
    }

    /// Register a pre-built instance; provided instances are always single instance
    pub fn from_instance<T: Send + Sync + 'static>(instance: T) -> RegistrationBuilder<T> {
        Self::from_shared_instance(Arc::new(instance))
    }

    /// Register a pre-built shared instance, which may be a trait object
    pub fn from_shared_instance<T: ?Sized + Send + Sync + 'static>(
        instance: Arc<T>,
    ) -> RegistrationBuilder<T> {
        let mut builder = RegistrationBuilder::new(Activator::Instance(Arc::new(instance)));
        builder.registration.lifetime = Lifetime::SingleInstance;
        builder
    }

    /// Set the lifetime
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the ownership
    pub fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    /// Replace the metadata bag
    pub fn with_metadata_bag(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// Name of the component type this registration activates
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Services this registration can satisfy
    pub fn services(&self) -> impl Iterator<Item = &ServiceId> {
        self.services.iter().map(|exposed| &exposed.service)
    }

    pub fn activator(&self) -> &Activator {
        &self.activator
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Check if activated instances are handed to a disposal list
    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some() && self.ownership == Ownership::Owned
    }

    /// Convert an activated instance into the representation of `service`
    pub(crate) fn instance_for(
        &self,
        service: &ServiceId,
        instance: &Instance,
    ) -> Result<Instance, ContainerError> {
        let exposed = self
            .services
            .iter()
            .find(|exposed| exposed.service.type_id == service.type_id)
            .ok_or_else(|| ContainerError::type_mismatch(&self.component, service.to_string()))?;

        match &exposed.cast {
            None => Ok(instance.clone()),
            Some(cast) => cast(instance)
                .ok_or_else(|| ContainerError::type_mismatch(&self.component, service.to_string())),
        }
    }

    /// The disposal handle for an activated instance, if this registration owns it
    pub(crate) fn disposable(&self, instance: &Instance) -> Option<Arc<dyn Disposable>> {
        if self.ownership != Ownership::Owned {
            return None;
        }
        self.disposer.as_ref().and_then(|hook| hook(instance))
    }
}

/// Typed builder producing a [`Registration`] for component `T`
pub struct RegistrationBuilder<T: ?Sized> {
    registration: Registration,
    _component: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> RegistrationBuilder<T> {
    fn new(activator: Activator) -> Self {
        Self {
            registration: Registration::new(
                std::any::type_name::<T>(),
                ServiceId::of::<T>(),
                activator,
            ),
            _component: PhantomData,
        }
    }

    /// Expose the component under a name instead of its bare type
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        for exposed in &mut self.registration.services {
            exposed.service.name = Some(name.clone());
        }
        self
    }

    /// Additionally expose the component as service `S`, e.g. a trait object
    pub fn as_service<S, F>(mut self, cast: F) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>) -> Arc<S> + Send + Sync + 'static,
    {
        let name = self.registration.services[0].service.name.clone();
        let mut service = ServiceId::of::<S>();
        service.name = name;

        let cast: CastFn = Arc::new(move |instance: &Instance| {
            instance
                .downcast_ref::<Arc<T>>()
                .map(|component| Arc::new(cast(component.clone())) as Instance)
        });

        self.registration.services.push(ExposedService {
            service,
            cast: Some(cast),
        });
        self
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.registration.lifetime = lifetime;
        self
    }

    pub fn instance_per_dependency(self) -> Self {
        self.with_lifetime(Lifetime::PerDependency)
    }

    pub fn single_instance(self) -> Self {
        self.with_lifetime(Lifetime::SingleInstance)
    }

    pub fn instance_per_lifetime_scope(self) -> Self {
        self.with_lifetime(Lifetime::PerLifetimeScope)
    }

    pub fn instance_per_matching_scope(self, tag: impl Into<ScopeTag>) -> Self {
        self.with_lifetime(Lifetime::PerMatchingScope(tag.into()))
    }

    /// Leave disposal of activated instances to the caller
    pub fn externally_owned(mut self) -> Self {
        self.registration.ownership = Ownership::ExternallyOwned;
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.registration.metadata.insert(key.into(), value.into());
        self
    }

    /// Finish the registration
    pub fn build(self) -> Registration {
        self.registration
    }
}

impl<T: ?Sized + Disposable + 'static> RegistrationBuilder<T> {
    /// Hand activated instances to the owning scope's disposal list
    pub fn disposable(mut self) -> Self {
        let hook: DisposeHook = Arc::new(|instance: &Instance| {
            instance
                .downcast_ref::<Arc<T>>()
                .map(|component| Arc::new(DisposeArc(component.clone())) as Arc<dyn Disposable>)
        });
        self.registration.disposer = Some(hook);
        self
    }
}

/// Adapts `Arc<T>` for possibly unsized `T` to a `Disposable` trait object
struct DisposeArc<T: ?Sized>(Arc<T>);

impl<T: ?Sized + Disposable> Disposable for DisposeArc<T> {
    fn dispose(&self) -> Result<(), BoxError> {
        self.0.dispose()
    }
}

impl<T: ?Sized + Send + Sync + 'static> From<RegistrationBuilder<T>> for Registration {
    fn from(builder: RegistrationBuilder<T>) -> Self {
        builder.build()
    }
}
