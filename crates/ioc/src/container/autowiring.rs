use std::any::TypeId;
use std::sync::Arc;

use crate::container::descriptor::{Instance, ServiceId};
use crate::errors::{BoxError, ContainerError};

/// Anything that can be requested from a lifetime scope.
///
/// Plain services are requested as `Arc<T>`; adapter types provide their own
/// shaped service keys so registration sources can synthesize them.
pub trait Resolvable: Clone + Send + Sync + 'static {
    /// The service key this request resolves
    fn service_id() -> ServiceId;

    /// Recover the typed value from a resolved instance
    fn from_instance(instance: &Instance) -> Result<Self, ContainerError> {
        instance.downcast_ref::<Self>().cloned().ok_or_else(|| {
            ContainerError::type_mismatch(
                Self::service_id().to_string(),
                std::any::type_name::<Self>(),
            )
        })
    }
}

impl<T: ?Sized + Send + Sync + 'static> Resolvable for Arc<T> {
    fn service_id() -> ServiceId {
        ServiceId::of::<T>()
    }
}

/// Trait for components the container can construct from declared parameters
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Describe the constructor parameters
    fn constructor() -> ConstructorInfo;

    /// Build the component from gathered arguments
    fn construct(args: Arguments) -> Result<Self, BoxError>;
}

/// Metadata about a constructor parameter
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub name: &'static str,
    pub position: usize,
    /// The type name of the parameter
    pub type_name: &'static str,
    /// Type of the argument value, used to match typed parameters
    pub value_type: TypeId,
    /// The service ID this parameter requires
    pub service_id: ServiceId,
    /// Whether this parameter is optional
    pub is_optional: bool,
    default: Option<Instance>,
}

impl ParameterInfo {
    fn of<R: Resolvable>(name: &'static str, position: usize) -> Self {
        Self {
            name,
            position,
            type_name: std::any::type_name::<R>(),
            value_type: TypeId::of::<R>(),
            service_id: R::service_id(),
            is_optional: false,
            default: None,
        }
    }

    /// The declared default value
    pub fn default_value(&self) -> Option<&Instance> {
        self.default.as_ref()
    }
}

/// Metadata about a service constructor
#[derive(Debug, Clone)]
pub struct ConstructorInfo {
    /// The service type name
    pub service_type: &'static str,
    /// Parameters required by the constructor
    pub parameters: Vec<ParameterInfo>,
}

impl ConstructorInfo {
    /// Start describing the constructor of `T`
    pub fn new<T: ?Sized + 'static>() -> Self {
        Self {
            service_type: std::any::type_name::<T>(),
            parameters: Vec::new(),
        }
    }

    /// Add a required parameter
    pub fn parameter<R: Resolvable>(mut self, name: &'static str) -> Self {
        let position = self.parameters.len();
        self.parameters.push(ParameterInfo::of::<R>(name, position));
        self
    }

    /// Add a parameter that is `None` when its service is not registered
    pub fn optional<R: Resolvable>(mut self, name: &'static str) -> Self {
        let position = self.parameters.len();
        let mut parameter = ParameterInfo::of::<R>(name, position);
        parameter.is_optional = true;
        self.parameters.push(parameter);
        self
    }

    /// Add a parameter of type `Arc<T>` falling back to `default`
    pub fn parameter_with_default<T: Send + Sync + 'static>(
        mut self,
        name: &'static str,
        default: T,
    ) -> Self {
        let position = self.parameters.len();
        let mut parameter = ParameterInfo::of::<Arc<T>>(name, position);
        parameter.default = Some(Arc::new(Arc::new(default)));
        self.parameters.push(parameter);
        self
    }
}

/// A resolution-time value overriding one constructor parameter
#[derive(Clone)]
pub enum Parameter {
    Positional { position: usize, value: Instance },
    Named { name: String, value: Instance },
    Typed { value_type: TypeId, value: Instance },
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parameter::Positional { position, .. } => write!(f, "Positional({})", position),
            Parameter::Named { name, .. } => write!(f, "Named({})", name),
            Parameter::Typed { value_type, .. } => write!(f, "Typed({:?})", value_type),
        }
    }
}

impl Parameter {
    /// Supply the parameter at `position`; the constructor receives `Arc<T>`
    pub fn positional<T: Send + Sync + 'static>(position: usize, value: T) -> Self {
        Parameter::Positional {
            position,
            value: Arc::new(Arc::new(value)),
        }
    }

    /// Supply the parameter called `name`
    pub fn named<T: Send + Sync + 'static>(name: impl Into<String>, value: T) -> Self {
        Parameter::Named {
            name: name.into(),
            value: Arc::new(Arc::new(value)),
        }
    }

    /// Supply every parameter declared as `Arc<T>`
    pub fn typed<T: Send + Sync + 'static>(value: T) -> Self {
        Parameter::Typed {
            value_type: TypeId::of::<Arc<T>>(),
            value: Arc::new(Arc::new(value)),
        }
    }

    pub fn value(&self) -> &Instance {
        match self {
            Parameter::Positional { value, .. }
            | Parameter::Named { value, .. }
            | Parameter::Typed { value, .. } => value,
        }
    }

    /// Check if this value can be supplied for `parameter`
    pub fn supplies(&self, parameter: &ParameterInfo) -> bool {
        match self {
            Parameter::Positional { position, .. } => *position == parameter.position,
            Parameter::Named { name, .. } => name == parameter.name,
            Parameter::Typed { value_type, .. } => *value_type == parameter.value_type,
        }
    }
}

/// Find the first supplied parameter that can satisfy `parameter`
pub(crate) fn supplied_value<'a>(
    parameters: &'a [Parameter],
    parameter: &ParameterInfo,
) -> Option<&'a Instance> {
    parameters
        .iter()
        .find(|supplied| supplied.supplies(parameter))
        .map(Parameter::value)
}

/// Gathered constructor arguments, in declaration order
#[derive(Debug)]
pub struct Arguments {
    component: &'static str,
    values: Vec<(&'static str, Option<Instance>)>,
}

impl Arguments {
    pub(crate) fn new(component: &'static str, values: Vec<(&'static str, Option<Instance>)>) -> Self {
        Self { component, values }
    }

    fn slot(&self, name: &str) -> Result<&Option<Instance>, ContainerError> {
        self.values
            .iter()
            .find(|(declared, _)| *declared == name)
            .map(|(_, value)| value)
            .ok_or_else(|| ContainerError::InvalidRegistration {
                component: self.component.to_string(),
                message: format!("constructor has no parameter named '{}'", name),
            })
    }

    /// Take a required argument by name
    pub fn get<R: Resolvable>(&self, name: &str) -> Result<R, ContainerError> {
        match self.slot(name)? {
            Some(instance) => R::from_instance(instance),
            None => Err(ContainerError::not_registered(R::service_id().to_string())),
        }
    }

    /// Take an optional argument by name
    pub fn optional<R: Resolvable>(&self, name: &str) -> Result<Option<R>, ContainerError> {
        match self.slot(name)? {
            Some(instance) => R::from_instance(instance).map(Some),
            None => Ok(None),
        }
    }

    /// Take a required argument by position
    pub fn at<R: Resolvable>(&self, position: usize) -> Result<R, ContainerError> {
        let (name, _) = self.values.get(position).ok_or_else(|| ContainerError::InvalidRegistration {
            component: self.component.to_string(),
            message: format!("constructor has no parameter at position {}", position),
        })?;
        self.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
