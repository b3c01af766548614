use std::sync::Arc;

use crate::container::autowiring::{Arguments, ConstructorInfo, Injectable};
use crate::container::descriptor::Instance;
use crate::container::resolver::ResolveContext;
use crate::errors::BoxError;

/// Builds an instance from gathered constructor arguments
pub type ConstructFn = Arc<dyn Fn(Arguments) -> Result<Instance, BoxError> + Send + Sync>;

/// Builds an instance with access to the resolve in progress
pub type DelegateFn =
    Arc<dyn Fn(&ResolveContext<'_>) -> Result<Instance, BoxError> + Send + Sync>;

/// Strategy for activating/creating service instances
#[derive(Clone)]
pub enum Activator {
    /// Parameters are gathered from the container, then the constructor runs
    Constructor {
        info: ConstructorInfo,
        construct: ConstructFn,
    },
    /// Service created via factory function
    Delegate(DelegateFn),
    /// A provided instance returned as is
    Instance(Instance),
}

impl std::fmt::Debug for Activator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Activator::Constructor { info, .. } => f
                .debug_struct("Constructor")
                .field("service_type", &info.service_type)
                .field("parameters", &info.parameters.len())
                .finish(),
            Activator::Delegate(_) => write!(f, "Delegate(<factory_fn>)"),
            Activator::Instance(_) => write!(f, "Instance(<instance>)"),
        }
    }
}

impl Activator {
    /// Constructor activator for an `Injectable` component
    pub fn for_injectable<T: Injectable>() -> Self {
        let construct: ConstructFn = Arc::new(|args: Arguments| {
            let component = T::construct(args)?;
            Ok(Arc::new(Arc::new(component)) as Instance)
        });

        Activator::Constructor {
            info: T::constructor(),
            construct,
        }
    }

    /// Delegate activator for a factory returning `T`
    pub fn delegate<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ResolveContext<'_>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Activator::raw(move |context| {
            let component = factory(context)?;
            Ok(Arc::new(Arc::new(component)) as Instance)
        })
    }

    /// Delegate activator producing a raw instance, used by registration sources
    pub fn raw<F>(factory: F) -> Self
    where
        F: Fn(&ResolveContext<'_>) -> Result<Instance, BoxError> + Send + Sync + 'static,
    {
        Activator::Delegate(Arc::new(factory))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Activator::Constructor { .. } => "constructor",
            Activator::Delegate(_) => "delegate",
            Activator::Instance(_) => "instance",
        }
    }
}
