use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::container::activator::Activator;
use crate::container::autowiring::{supplied_value, Arguments, ConstructorInfo, Parameter, Resolvable};
use crate::container::descriptor::{Instance, Registration, RegistrationId, ServiceId};
use crate::container::registry::ComponentRegistry;
use crate::container::scope::{LifetimeScope, ScopeInner};
use crate::errors::ContainerError;

/// A service being activated by the current resolve operation
#[derive(Debug, Clone)]
struct Frame {
    service: ServiceId,
    registration: RegistrationId,
}

/// Dependency resolution path for cycle detection and error reporting
#[derive(Debug, Clone, Default)]
pub struct ResolutionPath {
    frames: Vec<Frame>,
}

impl ResolutionPath {
    /// Create a new resolution path
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, service: ServiceId, registration: RegistrationId) {
        self.frames.push(Frame {
            service,
            registration,
        });
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    /// Check if the path contains a service/registration pair (for cycle detection)
    pub fn contains(&self, service: &ServiceId, registration: RegistrationId) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.registration == registration && &frame.service == service)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Services on the path, outermost first
    pub fn services(&self) -> impl Iterator<Item = &ServiceId> {
        self.frames.iter().map(|frame| &frame.service)
    }

    /// Get the path as a string for error messages
    pub fn path_string(&self) -> String {
        self.services()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

thread_local! {
    /// The operation executing on this thread, if any
    static CURRENT_OPERATION: RefCell<Option<Rc<ResolveOperation>>> = RefCell::new(None);
}

/// Marks an operation as in flight on this thread until dropped
struct ActiveOperation;

impl ActiveOperation {
    fn enter(operation: Rc<ResolveOperation>) -> Self {
        CURRENT_OPERATION.with(|current| *current.borrow_mut() = Some(operation));
        ActiveOperation
    }
}

impl Drop for ActiveOperation {
    fn drop(&mut self) {
        CURRENT_OPERATION.with(|current| current.borrow_mut().take());
    }
}

/// State of a single top-level resolve.
///
/// Nested resolves triggered while activating dependencies share the same
/// operation, so the path doubles as the cycle detection stack. This includes
/// resolves made through `Factory`, `Lazy` or `Keyed` on the same thread.
pub(crate) struct ResolveOperation {
    path: RefCell<ResolutionPath>,
    /// Path captured where the first failure surfaced
    failure_path: RefCell<Option<String>>,
    max_depth: usize,
}

impl ResolveOperation {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            path: RefCell::new(ResolutionPath::new()),
            failure_path: RefCell::new(None),
            max_depth,
        }
    }

    /// Resolve `service` through `registration`, joining the operation already
    /// in flight on this thread or starting a new top-level one.
    ///
    /// Only a top-level operation wraps failures with the resolution path.
    pub(crate) fn run(
        scope: &Arc<ScopeInner>,
        service: &ServiceId,
        registration: &Arc<Registration>,
        parameters: &[Parameter],
    ) -> Result<Instance, ContainerError> {
        if let Some(operation) = CURRENT_OPERATION.with(|current| current.borrow().clone()) {
            return operation.execute(scope, service, registration, parameters);
        }

        let operation = Rc::new(ResolveOperation::new(scope.config().max_resolve_depth));
        let _active = ActiveOperation::enter(operation.clone());
        operation
            .execute(scope, service, registration, parameters)
            .map_err(|e| operation.wrap_error(service, e))
    }

    /// Resolve the default registration of `service` within this operation
    pub(crate) fn resolve(
        &self,
        scope: &Arc<ScopeInner>,
        service: &ServiceId,
        parameters: &[Parameter],
    ) -> Result<Instance, ContainerError> {
        let registration = scope
            .registry()
            .default_registration(service)
            .ok_or_else(|| ContainerError::not_registered(service.to_string()))?;
        self.execute(scope, service, &registration, parameters)
    }

    /// Resolve `service` through a specific registration
    pub(crate) fn execute(
        &self,
        scope: &Arc<ScopeInner>,
        service: &ServiceId,
        registration: &Arc<Registration>,
        parameters: &[Parameter],
    ) -> Result<Instance, ContainerError> {
        self.enter(service, registration.id())?;
        let result = self.share_or_activate(scope, service, registration, parameters);
        if result.is_err() {
            self.record_failure();
        }
        self.path.borrow_mut().pop();
        result
    }

    /// Wrap a failure with the service requested and the path where it surfaced
    fn wrap_error(&self, service: &ServiceId, error: ContainerError) -> ContainerError {
        let path = self
            .failure_path
            .borrow_mut()
            .take()
            .unwrap_or_else(|| service.to_string());
        ContainerError::DependencyResolution {
            service: service.to_string(),
            path,
            source: Box::new(error),
        }
    }

    fn enter(&self, service: &ServiceId, registration: RegistrationId) -> Result<(), ContainerError> {
        let mut path = self.path.borrow_mut();

        if path.contains(service, registration) {
            let mut chain: Vec<String> = path.services().map(ToString::to_string).collect();
            chain.push(service.to_string());
            let rendered = chain.join(" -> ");
            self.failure_path.replace(Some(rendered.clone()));
            return Err(ContainerError::CircularDependency {
                path: rendered,
                chain,
            });
        }

        if path.len() >= self.max_depth {
            let rendered = format!("{} -> {}", path.path_string(), service);
            self.failure_path.replace(Some(rendered.clone()));
            return Err(ContainerError::ResolveDepthExceeded {
                depth: self.max_depth,
                path: rendered,
            });
        }

        path.push(service.clone(), registration);
        Ok(())
    }

    fn record_failure(&self) {
        let mut failure_path = self.failure_path.borrow_mut();
        if failure_path.is_none() {
            *failure_path = Some(self.path.borrow().path_string());
        }
    }

    fn share_or_activate(
        &self,
        scope: &Arc<ScopeInner>,
        service: &ServiceId,
        registration: &Arc<Registration>,
        parameters: &[Parameter],
    ) -> Result<Instance, ContainerError> {
        let owner = ScopeInner::owner_for(scope, registration.lifetime(), service)?;

        let instance = if registration.lifetime().is_shared() {
            let slot = owner.slot(registration.id())?;
            match slot.get() {
                Some(instance) => instance.clone(),
                None => {
                    // Shared activations in a scope are serialized; a nested
                    // activation on this thread re-enters the lock.
                    let _activation = owner.lock_activation();
                    match slot.get() {
                        Some(instance) => {
                            tracing::trace!(
                                "Reusing '{}' cached in scope {}",
                                registration.component(),
                                owner.display_name()
                            );
                            instance.clone()
                        }
                        None => {
                            let instance = self.activate(&owner, registration, parameters)?;
                            slot.get_or_init(|| instance).clone()
                        }
                    }
                }
            }
        } else {
            self.activate(&owner, registration, parameters)?
        };

        registration.instance_for(service, &instance)
    }

    fn activate(
        &self,
        scope: &Arc<ScopeInner>,
        registration: &Registration,
        parameters: &[Parameter],
    ) -> Result<Instance, ContainerError> {
        scope.ensure_active()?;
        tracing::debug!(
            "Activating '{}' ({} activator, {}) in scope {}",
            registration.component(),
            registration.activator().kind(),
            registration.lifetime(),
            scope.display_name()
        );

        let context = ResolveContext {
            operation: self,
            scope,
            parameters,
        };

        let instance = match registration.activator() {
            Activator::Instance(instance) => instance.clone(),
            Activator::Delegate(factory) => factory(&context)
                .map_err(|e| ContainerError::from_activation(registration.component(), e))?,
            Activator::Constructor { info, construct } => {
                let arguments = self.gather(&context, info)?;
                construct(arguments)
                    .map_err(|e| ContainerError::from_activation(registration.component(), e))?
            }
        };

        if let Some(disposable) = registration.disposable(&instance) {
            scope.track(registration.component(), disposable)?;
        }

        Ok(instance)
    }

    /// Gather constructor arguments: supplied parameters first, then the
    /// container, then declared defaults.
    fn gather(
        &self,
        context: &ResolveContext<'_>,
        info: &ConstructorInfo,
    ) -> Result<Arguments, ContainerError> {
        let mut values = Vec::with_capacity(info.parameters.len());

        for parameter in &info.parameters {
            let value = if let Some(supplied) = supplied_value(context.parameters, parameter) {
                Some(supplied.clone())
            } else if let Some(registration) =
                context.registry().default_registration(&parameter.service_id)
            {
                Some(self.execute(context.scope, &parameter.service_id, &registration, &[])?)
            } else if let Some(default) = parameter.default_value() {
                Some(default.clone())
            } else if parameter.is_optional {
                None
            } else {
                return Err(ContainerError::not_registered(parameter.service_id.to_string()));
            };
            values.push((parameter.name, value));
        }

        Ok(Arguments::new(info.service_type, values))
    }
}

/// Handle given to activators for resolving their dependencies
pub struct ResolveContext<'a> {
    operation: &'a ResolveOperation,
    scope: &'a Arc<ScopeInner>,
    parameters: &'a [Parameter],
}

impl<'a> ResolveContext<'a> {
    /// Parameters supplied for this activation
    pub fn parameters(&self) -> &[Parameter] {
        self.parameters
    }

    /// The scope in which the component is being activated
    pub fn scope(&self) -> LifetimeScope {
        LifetimeScope::from_inner(self.scope.clone())
    }

    pub fn registry(&self) -> &ComponentRegistry {
        self.scope.registry()
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
        let instance = self.resolve_service(&ServiceId::named::<T>(name))?;
        Arc::<T>::from_instance(&instance)
    }

    /// Resolve any resolvable shape, e.g. an adapter type
    pub fn get<R: Resolvable>(&self) -> Result<R, ContainerError> {
        let instance = self.resolve_service(&R::service_id())?;
        R::from_instance(&instance)
    }

    /// Like `get`, but `None` when the service is not registered
    pub fn try_get<R: Resolvable>(&self) -> Result<Option<R>, ContainerError> {
        let service = R::service_id();
        if !self.registry().is_registered(&service) {
            return Ok(None);
        }
        let instance = self.resolve_service(&service)?;
        R::from_instance(&instance).map(Some)
    }

    /// Resolve a service key within the current operation
    pub fn resolve_service(&self, service: &ServiceId) -> Result<Instance, ContainerError> {
        self.operation.resolve(self.scope, service, &[])
    }

    /// Resolve `service` through one particular registration
    pub fn resolve_registration(
        &self,
        service: &ServiceId,
        registration: &Arc<Registration>,
    ) -> Result<Instance, ContainerError> {
        self.operation.execute(self.scope, service, registration, &[])
    }
}
