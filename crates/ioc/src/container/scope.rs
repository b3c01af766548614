use std::collections::HashMap;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use uuid::Uuid;

use crate::config::ContainerConfig;
use crate::container::autowiring::{Parameter, Resolvable};
use crate::container::descriptor::{Instance, Lifetime, Registration, RegistrationId, ServiceId};
use crate::container::lifecycle::{Disposable, DisposalList};
use crate::container::registry::ComponentRegistry;
use crate::container::resolver::ResolveOperation;
use crate::errors::{BoxError, ContainerError};

/// Label attached to a lifetime scope, matched by `PerMatchingScope` lifetimes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeTag(String);

impl ScopeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ScopeTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for ScopeTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl std::fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type SharedSlot = Arc<OnceCell<Instance>>;

#[derive(Default)]
struct ScopeState {
    disposed: bool,
    /// Shared instances owned by this scope, one slot per registration
    cache: HashMap<RegistrationId, SharedSlot>,
    disposals: DisposalList,
    children: Vec<Arc<ScopeInner>>,
}

/// Shared state behind a [`LifetimeScope`] handle
pub(crate) struct ScopeInner {
    id: Uuid,
    tag: Option<ScopeTag>,
    parent: Option<Weak<ScopeInner>>,
    registry: Arc<ComponentRegistry>,
    config: Arc<ContainerConfig>,
    state: Mutex<ScopeState>,
    /// Held while a shared instance owned by this scope is activated
    activation: ReentrantMutex<()>,
}

impl ScopeInner {
    fn new(
        tag: Option<ScopeTag>,
        parent: Option<Weak<ScopeInner>>,
        registry: Arc<ComponentRegistry>,
        config: Arc<ContainerConfig>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tag,
            parent,
            registry,
            config,
            state: Mutex::new(ScopeState::default()),
            activation: ReentrantMutex::new(()),
        }
    }

    pub(crate) fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub(crate) fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Serialize activation of shared instances owned by this scope.
    ///
    /// Activating in a scope only ever locks that scope or its ancestors.
    pub(crate) fn lock_activation(&self) -> ReentrantMutexGuard<'_, ()> {
        self.activation.lock()
    }

    pub(crate) fn display_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{} ({})", tag, self.id),
            None => self.id.to_string(),
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<(), ContainerError> {
        if self.state.lock().disposed {
            return Err(ContainerError::disposed(self.display_name()));
        }
        Ok(())
    }

    fn parent(&self) -> Result<Option<Arc<ScopeInner>>, ContainerError> {
        match &self.parent {
            None => Ok(None),
            Some(parent) => parent
                .upgrade()
                .map(Some)
                .ok_or_else(|| ContainerError::disposed(format!("parent of {}", self.display_name()))),
        }
    }

    /// The scope that owns instances of `lifetime` when resolving from `scope`
    pub(crate) fn owner_for(
        scope: &Arc<ScopeInner>,
        lifetime: &Lifetime,
        service: &ServiceId,
    ) -> Result<Arc<ScopeInner>, ContainerError> {
        match lifetime {
            Lifetime::PerDependency | Lifetime::PerLifetimeScope => Ok(scope.clone()),
            Lifetime::SingleInstance => {
                let mut current = scope.clone();
                while let Some(parent) = current.parent()? {
                    current = parent;
                }
                Ok(current)
            }
            Lifetime::PerMatchingScope(tag) => {
                let mut current = Some(scope.clone());
                while let Some(candidate) = current {
                    if candidate.tag.as_ref() == Some(tag) {
                        return Ok(candidate);
                    }
                    current = candidate.parent()?;
                }
                Err(ContainerError::NoMatchingScope {
                    tag: tag.to_string(),
                    service: service.to_string(),
                })
            }
        }
    }

    /// The sharing slot for `registration`, created on first use
    pub(crate) fn slot(&self, registration: RegistrationId) -> Result<SharedSlot, ContainerError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(ContainerError::disposed(self.display_name()));
        }
        Ok(state
            .cache
            .entry(registration)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone())
    }

    /// Add an activated instance to this scope's disposal list
    pub(crate) fn track(
        &self,
        component: &str,
        disposable: Arc<dyn Disposable>,
    ) -> Result<(), ContainerError> {
        {
            let mut state = self.state.lock();
            if !state.disposed {
                state.disposals.add(component, disposable);
                return Ok(());
            }
        }

        // The scope was disposed while the instance was being activated
        if let Err(e) = disposable.dispose() {
            tracing::warn!("Error disposing late instance of '{}': {}", component, e);
        }
        Err(ContainerError::disposed(self.display_name()))
    }

    fn dispose(&self) -> Vec<BoxError> {
        let (children, disposals) = {
            let mut state = self.state.lock();
            if state.disposed {
                return Vec::new();
            }
            state.disposed = true;
            state.cache.clear();
            (std::mem::take(&mut state.children), state.disposals.take())
        };

        tracing::debug!(
            "Disposing lifetime scope {} ({} child scope(s), {} tracked instance(s))",
            self.display_name(),
            children.len(),
            disposals.len()
        );

        let mut errors = Vec::new();
        for child in children.iter().rev() {
            errors.extend(child.dispose());
        }
        errors.extend(disposals.dispose_all());
        errors
    }

    fn detach_child(&self, child: &Arc<ScopeInner>) {
        self.state
            .lock()
            .children
            .retain(|candidate| !Arc::ptr_eq(candidate, child));
    }
}

/// A node in the scope tree: owns shared instances and disposes what it activated.
///
/// Handles are cheap to clone; all clones refer to the same scope.
#[derive(Clone)]
pub struct LifetimeScope {
    inner: Arc<ScopeInner>,
}

impl std::fmt::Debug for LifetimeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("LifetimeScope")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("disposed", &state.disposed)
            .field("cached_instances", &state.cache.len())
            .field("children", &state.children.len())
            .finish()
    }
}

impl LifetimeScope {
    /// Create the root scope of a container
    pub(crate) fn root(registry: Arc<ComponentRegistry>, config: Arc<ContainerConfig>) -> Self {
        let tag = Some(ScopeTag::new(config.root_tag.clone()));
        Self::from_inner(Arc::new(ScopeInner::new(tag, None, registry, config)))
    }

    pub(crate) fn from_inner(inner: Arc<ScopeInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn tag(&self) -> Option<&ScopeTag> {
        self.inner.tag.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// The parent scope; `None` for the root
    pub fn parent(&self) -> Option<LifetimeScope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Self::from_inner)
    }

    /// Number of live child scopes
    pub fn child_count(&self) -> usize {
        self.inner.state.lock().children.len()
    }

    /// Weak handle that does not keep the scope alive
    pub fn downgrade(&self) -> WeakLifetimeScope {
        WeakLifetimeScope {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Begin an untagged child scope
    pub fn begin_child_scope(&self) -> Result<LifetimeScope, ContainerError> {
        self.begin_scope(None)
    }

    /// Begin a child scope carrying `tag`
    pub fn begin_tagged_scope(
        &self,
        tag: impl Into<ScopeTag>,
    ) -> Result<LifetimeScope, ContainerError> {
        self.begin_scope(Some(tag.into()))
    }

    fn begin_scope(&self, tag: Option<ScopeTag>) -> Result<LifetimeScope, ContainerError> {
        let child = Arc::new(ScopeInner::new(
            tag,
            Some(Arc::downgrade(&self.inner)),
            self.inner.registry.clone(),
            self.inner.config.clone(),
        ));

        // Checked under the same lock as the insertion so a concurrent dispose
        // cannot miss the new child.
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Err(ContainerError::disposed(self.inner.display_name()));
        }
        state.children.push(child.clone());
        drop(state);

        tracing::debug!(
            "Began lifetime scope {} under {}",
            child.display_name(),
            self.inner.display_name()
        );
        Ok(Self::from_inner(child))
    }

    /// Resolve a service by type
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.get::<Arc<T>>()
    }

    /// Resolve a named service
    pub fn resolve_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<Arc<T>, ContainerError> {
        let instance = self.resolve_service(&ServiceId::named::<T>(name), &[])?;
        Arc::<T>::from_instance(&instance)
    }

    /// Resolve a service, overriding constructor parameters of the requested component
    pub fn resolve_with<T: ?Sized + Send + Sync + 'static>(
        &self,
        parameters: &[Parameter],
    ) -> Result<Arc<T>, ContainerError> {
        self.get_with::<Arc<T>>(parameters)
    }

    /// Resolve a service, or `None` if it is not registered
    pub fn try_resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Option<Arc<T>>, ContainerError> {
        self.try_get::<Arc<T>>()
    }

    /// Resolve any resolvable shape, including adapter types
    pub fn get<R: Resolvable>(&self) -> Result<R, ContainerError> {
        self.get_with(&[])
    }

    pub fn get_with<R: Resolvable>(&self, parameters: &[Parameter]) -> Result<R, ContainerError> {
        let instance = self.resolve_service(&R::service_id(), parameters)?;
        R::from_instance(&instance)
    }

    pub fn try_get<R: Resolvable>(&self) -> Result<Option<R>, ContainerError> {
        match self.try_resolve_service(&R::service_id(), &[])? {
            Some(instance) => R::from_instance(&instance).map(Some),
            None => Ok(None),
        }
    }

    /// Check if a resolvable shape can be satisfied
    pub fn is_registered<R: Resolvable>(&self) -> bool {
        self.inner.registry.is_registered(&R::service_id())
    }

    /// Resolve a service key.
    ///
    /// An unregistered top-level service fails with `ComponentNotRegistered`;
    /// every other failure is wrapped with the service requested and the path
    /// at which it surfaced.
    pub fn resolve_service(
        &self,
        service: &ServiceId,
        parameters: &[Parameter],
    ) -> Result<Instance, ContainerError> {
        self.inner.ensure_active()?;
        let registration = self
            .inner
            .registry
            .default_registration(service)
            .ok_or_else(|| ContainerError::not_registered(service.to_string()))?;
        self.resolve_registration(service, &registration, parameters)
    }

    /// Resolve a service key, or `None` if the service is not registered.
    ///
    /// Failures further down the graph are still errors.
    pub fn try_resolve_service(
        &self,
        service: &ServiceId,
        parameters: &[Parameter],
    ) -> Result<Option<Instance>, ContainerError> {
        match self.resolve_service(service, parameters) {
            Ok(instance) => Ok(Some(instance)),
            Err(e) if e.is_not_registered() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve `service` through one particular registration.
    ///
    /// Called during another activation on this thread, the resolve joins that
    /// operation so its cycle detection covers the deferred adapters too.
    pub(crate) fn resolve_registration(
        &self,
        service: &ServiceId,
        registration: &Arc<Registration>,
        parameters: &[Parameter],
    ) -> Result<Instance, ContainerError> {
        tracing::trace!(
            "Resolving {} via '{}' from scope {}",
            service,
            registration.component(),
            self.inner.display_name()
        );

        ResolveOperation::run(&self.inner, service, registration, parameters)
    }

    /// Dispose this scope and its whole subtree.
    ///
    /// Child scopes are disposed first, then the instances this scope
    /// activated in reverse activation order. Every instance is attempted;
    /// failures are aggregated. Disposing twice is a no-op.
    pub fn dispose(&self) -> Result<(), ContainerError> {
        let errors = self.inner.dispose();

        if let Some(parent) = self.inner.parent.as_ref().and_then(Weak::upgrade) {
            parent.detach_child(&self.inner);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::Disposal {
                scope: self.inner.display_name(),
                errors,
            })
        }
    }
}

/// Non-owning handle to a lifetime scope, held by adapters that resolve later
#[derive(Clone)]
pub struct WeakLifetimeScope {
    inner: Weak<ScopeInner>,
}

impl WeakLifetimeScope {
    /// Upgrade to a live scope; fails once the scope has gone away or been disposed
    pub fn upgrade(&self) -> Result<LifetimeScope, ContainerError> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| ContainerError::disposed("released lifetime scope"))?;
        inner.ensure_active()?;
        Ok(LifetimeScope::from_inner(inner))
    }
}

impl std::fmt::Debug for WeakLifetimeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WeakLifetimeScope(alive: {})", self.inner.strong_count() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::descriptor::Registration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter(usize);

    struct Closer {
        log: Arc<Mutex<Vec<String>>>,
        name: String,
    }

    impl Disposable for Closer {
        fn dispose(&self) -> Result<(), BoxError> {
            self.log.lock().push(self.name.clone());
            Ok(())
        }
    }

    fn root_with(registrations: Vec<Registration>) -> LifetimeScope {
        let mut registry = ComponentRegistry::new();
        for registration in registrations {
            registry.register(registration).unwrap();
        }
        registry.freeze();
        LifetimeScope::root(Arc::new(registry), Arc::new(ContainerConfig::default()))
    }

    fn counting(lifetime: Lifetime, created: Arc<AtomicUsize>) -> Registration {
        Registration::from_delegate(move |_| Ok(Counter(created.fetch_add(1, Ordering::SeqCst))))
            .with_lifetime(lifetime)
            .build()
    }

    #[test]
    fn test_scope_tag_conversions() {
        assert_eq!(ScopeTag::from("request").as_str(), "request");
        assert_eq!(ScopeTag::from("request".to_string()), ScopeTag::new("request"));
        assert_eq!(ScopeTag::new("job").to_string(), "job");
    }

    #[test]
    fn test_root_scope_carries_configured_tag() {
        let root = root_with(Vec::new());
        assert_eq!(root.tag(), Some(&ScopeTag::from("root")));
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_per_lifetime_scope_sharing() {
        let created = Arc::new(AtomicUsize::new(0));
        let root = root_with(vec![counting(Lifetime::PerLifetimeScope, created.clone())]);
        let child = root.begin_child_scope().unwrap();

        let a = child.resolve::<Counter>().unwrap();
        let b = child.resolve::<Counter>().unwrap();
        let c = root.resolve::<Counter>().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_instance_shared_across_scopes() {
        let created = Arc::new(AtomicUsize::new(0));
        let root = root_with(vec![counting(Lifetime::SingleInstance, created.clone())]);
        let child = root.begin_child_scope().unwrap();
        let grandchild = child.begin_child_scope().unwrap();

        let a = grandchild.resolve::<Counter>().unwrap();
        let b = root.resolve::<Counter>().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_per_matching_scope_uses_nearest_tag() {
        let created = Arc::new(AtomicUsize::new(0));
        let root = root_with(vec![counting(
            Lifetime::PerMatchingScope(ScopeTag::from("request")),
            created.clone(),
        )]);

        let request = root.begin_tagged_scope("request").unwrap();
        let nested = request.begin_child_scope().unwrap();

        let a = nested.resolve::<Counter>().unwrap();
        let b = request.resolve::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let error = root.resolve::<Counter>().unwrap_err();
        assert!(matches!(
            error.innermost(),
            ContainerError::NoMatchingScope { tag, .. } if tag == "request"
        ));
    }

    #[test]
    fn test_dispose_children_first_then_reverse_activation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registration = |name: &'static str, lifetime: Lifetime, log: Arc<Mutex<Vec<String>>>| {
            Registration::from_delegate(move |_| {
                Ok(Closer {
                    log: log.clone(),
                    name: name.to_string(),
                })
            })
            .named(name)
            .with_lifetime(lifetime)
            .disposable()
            .build()
        };

        let root = root_with(vec![
            registration("first", Lifetime::PerLifetimeScope, log.clone()),
            registration("second", Lifetime::PerLifetimeScope, log.clone()),
            registration("child", Lifetime::PerLifetimeScope, log.clone()),
        ]);

        root.resolve_named::<Closer>("first").unwrap();
        root.resolve_named::<Closer>("second").unwrap();
        let child = root.begin_child_scope().unwrap();
        child.resolve_named::<Closer>("child").unwrap();

        root.dispose().unwrap();

        assert_eq!(*log.lock(), vec!["child", "second", "first"]);
        assert!(child.is_disposed());
        assert_eq!(root.child_count(), 0);

        root.dispose().unwrap();
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn test_disposed_scope_rejects_work() {
        let root = root_with(vec![Registration::from_instance(Counter(7)).build()]);
        let child = root.begin_child_scope().unwrap();
        let weak = child.downgrade();

        child.dispose().unwrap();

        assert!(child.resolve::<Counter>().unwrap_err().is_disposed());
        assert!(child.begin_child_scope().unwrap_err().is_disposed());
        assert!(weak.upgrade().unwrap_err().is_disposed());
        assert_eq!(root.child_count(), 0);
        assert_eq!(root.resolve::<Counter>().unwrap().0, 7);
    }

    #[test]
    fn test_try_resolve_distinguishes_unregistered() {
        let root = root_with(Vec::new());
        assert!(root.try_resolve::<Counter>().unwrap().is_none());
        assert!(root.resolve::<Counter>().unwrap_err().is_not_registered());
    }
}
