pub mod activator;
pub mod autowiring;
pub mod builder;
pub mod descriptor;
pub mod lifecycle;
pub mod module;
pub mod registry;
pub mod resolver;
pub mod scope;

pub use activator::Activator;
pub use autowiring::{Arguments, ConstructorInfo, Injectable, Parameter, ParameterInfo, Resolvable};
pub use builder::{Container, ContainerBuilder};
pub use descriptor::{
    Instance, Lifetime, Metadata, Ownership, Registration, RegistrationBuilder, RegistrationId,
    ServiceId, ServiceShape,
};
pub use lifecycle::{Disposable, DisposalList};
pub use module::Module;
pub use registry::{ComponentRegistry, RegistrationSource};
pub use resolver::{ResolutionPath, ResolveContext};
pub use scope::{LifetimeScope, ScopeTag, WeakLifetimeScope};
