//! Strongly typed metadata views.
//!
//! A registration's metadata bag is free-form JSON. `Meta<R, V>` pairs a
//! resolved `R` with a view `V` populated from the bag of the registration
//! that produced it. Views describe their constructors through
//! [`MetadataView`]; the provider picks one in this order:
//!
//! 1. a mapping constructor receiving the whole bag,
//! 2. the single constructor whose parameters all match writable properties
//!    by name and type.
//!
//! Abstract views cannot be built and make the source decline.

use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{adapted, adapter_registration, request};
use crate::container::activator::Activator;
use crate::container::autowiring::Resolvable;
use crate::container::descriptor::{Instance, Metadata, Registration, ServiceId, ServiceShape};
use crate::container::registry::{ComponentRegistry, RegistrationSource};
use crate::errors::{BoxError, ContainerError};

/// A resolved value together with its registration's metadata
pub struct Meta<R, V: ?Sized = Metadata> {
    value: R,
    metadata: Arc<V>,
}

impl<R, V: ?Sized> Meta<R, V> {
    pub fn value(&self) -> &R {
        &self.value
    }

    pub fn metadata(&self) -> &V {
        &self.metadata
    }

    pub fn into_parts(self) -> (R, Arc<V>) {
        (self.value, self.metadata)
    }
}

impl<R: Clone, V: ?Sized> Clone for Meta<R, V> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

impl<R, V: ?Sized> std::fmt::Debug for Meta<R, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meta")
            .field("value", &std::any::type_name::<R>())
            .field("view", &std::any::type_name::<V>())
            .finish()
    }
}

/// A type that can be populated from a metadata bag
pub trait MetadataView: Send + Sync + 'static {
    fn describe() -> ViewDescriptor<Self>;
}

impl MetadataView for Metadata {
    fn describe() -> ViewDescriptor<Self> {
        ViewDescriptor::concrete().mapping(|bag| Ok(bag.clone()))
    }
}

/// A property of a view
#[derive(Debug, Clone)]
pub struct ViewProperty {
    pub name: &'static str,
    pub value_type: TypeId,
    pub type_name: &'static str,
    pub writable: bool,
}

impl ViewProperty {
    /// A property the provider may populate
    pub fn writable<T: 'static>(name: &'static str) -> Self {
        Self {
            name,
            value_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            writable: true,
        }
    }

    /// A computed property, never populated from metadata
    pub fn read_only<T: 'static>(name: &'static str) -> Self {
        Self {
            writable: false,
            ..Self::writable::<T>(name)
        }
    }
}

/// A parameter of a property-matching constructor
#[derive(Clone)]
pub struct ViewParameter {
    pub name: &'static str,
    pub value_type: TypeId,
    pub type_name: &'static str,
    accepts: fn(&Value) -> bool,
    default: Option<Value>,
}

impl std::fmt::Debug for ViewParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewParameter")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("default", &self.default)
            .finish()
    }
}

fn accepts<T: DeserializeOwned>(value: &Value) -> bool {
    T::deserialize(value).is_ok()
}

impl ViewParameter {
    pub fn of<T: DeserializeOwned + 'static>(name: &'static str) -> Self {
        Self {
            name,
            value_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            accepts: accepts::<T>,
            default: None,
        }
    }

    /// Value used when the bag has no assignable entry
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn matches(&self, property: &ViewProperty) -> bool {
        property.writable && property.name == self.name && property.value_type == self.value_type
    }
}

type MappingFn<V> = Arc<dyn Fn(&Metadata) -> Result<V, BoxError> + Send + Sync>;
type BuildFn<V> = Arc<dyn Fn(&ViewArguments) -> Result<V, BoxError> + Send + Sync>;

enum ViewConstructor<V> {
    Mapping(MappingFn<V>),
    Properties {
        parameters: Vec<ViewParameter>,
        build: BuildFn<V>,
    },
}

impl<V> Clone for ViewConstructor<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Mapping(mapping) => Self::Mapping(mapping.clone()),
            Self::Properties { parameters, build } => Self::Properties {
                parameters: parameters.clone(),
                build: build.clone(),
            },
        }
    }
}

enum ViewShape<V: ?Sized> {
    Abstract(PhantomData<fn() -> Arc<V>>),
    Concrete {
        properties: Vec<ViewProperty>,
        constructors: Vec<ViewConstructor<Arc<V>>>,
    },
}

/// How a view is constructed from metadata
pub struct ViewDescriptor<V: ?Sized> {
    shape: ViewShape<V>,
}

impl<V: ?Sized + 'static> ViewDescriptor<V> {
    /// A view that cannot be constructed, e.g. a trait object
    pub fn abstract_view() -> Self {
        Self {
            shape: ViewShape::Abstract(PhantomData),
        }
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.shape, ViewShape::Abstract(_))
    }
}

impl<V: Send + Sync + 'static> ViewDescriptor<V> {
    /// A constructible view with no properties or constructors yet
    pub fn concrete() -> Self {
        Self {
            shape: ViewShape::Concrete {
                properties: Vec::new(),
                constructors: Vec::new(),
            },
        }
    }

    pub fn property(mut self, property: ViewProperty) -> Self {
        if let ViewShape::Concrete { properties, .. } = &mut self.shape {
            properties.push(property);
        }
        self
    }

    /// Constructor receiving the whole metadata bag
    pub fn mapping<F>(self, mapping: F) -> Self
    where
        F: Fn(&Metadata) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.push(ViewConstructor::Mapping(Arc::new(
            move |bag: &Metadata| -> Result<Arc<V>, BoxError> { Ok(Arc::new(mapping(bag)?)) },
        )))
    }

    /// Constructor whose parameters are matched against writable properties
    pub fn constructor<F>(self, parameters: Vec<ViewParameter>, build: F) -> Self
    where
        F: Fn(&ViewArguments) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.push(ViewConstructor::Properties {
            parameters,
            build: Arc::new(move |arguments: &ViewArguments| -> Result<Arc<V>, BoxError> {
                Ok(Arc::new(build(arguments)?))
            }),
        })
    }

    fn push(mut self, constructor: ViewConstructor<Arc<V>>) -> Self {
        if let ViewShape::Concrete { constructors, .. } = &mut self.shape {
            constructors.push(constructor);
        }
        self
    }
}

/// Values gathered for a property-matching constructor
#[derive(Debug)]
pub struct ViewArguments {
    view: &'static str,
    values: Vec<(&'static str, Value)>,
}

impl ViewArguments {
    /// Take the value gathered for `name`
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ContainerError> {
        let value = self
            .values
            .iter()
            .find(|(parameter, _)| *parameter == name)
            .map(|(_, value)| value)
            .ok_or_else(|| ContainerError::missing_metadata(name))?;

        T::deserialize(value).map_err(|_| {
            ContainerError::type_mismatch(
                format!("{}.{}", self.view, name),
                std::any::type_name::<T>(),
            )
        })
    }
}

type ViewFactory<V> = Arc<dyn Fn(&Metadata) -> Result<Arc<V>, ContainerError> + Send + Sync>;

/// Pick the constructor of `V`, or `None` when `V` is abstract
fn view_factory<V: ?Sized + MetadataView>() -> Option<ViewFactory<V>> {
    let view = std::any::type_name::<V>();

    let (properties, constructors) = match V::describe().shape {
        ViewShape::Abstract(_) => return None,
        ViewShape::Concrete {
            properties,
            constructors,
        } => (properties, constructors),
    };

    let mapping = constructors.iter().find_map(|constructor| match constructor {
        ViewConstructor::Mapping(mapping) => Some(mapping.clone()),
        ViewConstructor::Properties { .. } => None,
    });
    if let Some(mapping) = mapping {
        return Some(Arc::new(move |bag: &Metadata| {
            mapping(bag).map_err(|e| ContainerError::from_activation(view, e))
        }));
    }

    let mut eligible = constructors.into_iter().filter_map(|constructor| match constructor {
        ViewConstructor::Properties { parameters, build }
            if parameters
                .iter()
                .all(|parameter| properties.iter().any(|property| parameter.matches(property))) =>
        {
            Some((parameters, build))
        }
        _ => None,
    });

    let (parameters, build) = match (eligible.next(), eligible.next()) {
        (Some(only), None) => only,
        _ => {
            return Some(Arc::new(
                move |_: &Metadata| -> Result<Arc<V>, ContainerError> {
                    Err(ContainerError::invalid_view(view))
                },
            ))
        }
    };

    Some(Arc::new(move |bag: &Metadata| -> Result<Arc<V>, ContainerError> {
        let values = parameters
            .iter()
            .map(|parameter| -> Result<(&'static str, Value), ContainerError> {
                let value = match bag.get(parameter.name) {
                    Some(value) if (parameter.accepts)(value) => value.clone(),
                    _ => parameter
                        .default
                        .clone()
                        .ok_or_else(|| ContainerError::missing_metadata(parameter.name))?,
                };
                Ok((parameter.name, value))
            })
            .collect::<Result<Vec<_>, ContainerError>>()?;

        build(&ViewArguments { view, values }).map_err(|e| ContainerError::from_activation(view, e))
    }))
}

type MetaProvider = Arc<dyn Fn(&Instance, &Metadata) -> Result<Instance, ContainerError> + Send + Sync>;

trait MetaRequest: Send + Sync {
    fn inner(&self) -> ServiceId;
    fn provider(&self) -> Option<MetaProvider>;
}

struct MetaShape<R, V: ?Sized>(PhantomData<fn() -> (R, Arc<V>)>);

impl<R: Resolvable, V: ?Sized + MetadataView> MetaRequest for MetaShape<R, V> {
    fn inner(&self) -> ServiceId {
        R::service_id()
    }

    fn provider(&self) -> Option<MetaProvider> {
        let view = view_factory::<V>()?;
        Some(Arc::new(move |value: &Instance, bag: &Metadata| -> Result<Instance, ContainerError> {
            let value = R::from_instance(value)?;
            let metadata = view(bag)?;
            Ok(Arc::new(Meta::<R, V> { value, metadata }) as Instance)
        }))
    }
}

impl<R: Resolvable, V: ?Sized + MetadataView> Resolvable for Meta<R, V> {
    fn service_id() -> ServiceId {
        let shape: Arc<dyn MetaRequest> = Arc::new(MetaShape::<R, V>(PhantomData));
        ServiceId::of::<Meta<R, V>>().with_shape(ServiceShape::new(shape))
    }
}

/// Synthesizes `Meta<R, V>` for every registration of `R`
#[derive(Debug, Default)]
pub struct MetaSource;

impl RegistrationSource for MetaSource {
    fn registrations_for(&self, service: &ServiceId, registry: &ComponentRegistry) -> Vec<Registration> {
        let Some(request) = request::<Arc<dyn MetaRequest>>(service) else {
            return Vec::new();
        };
        let Some(provider) = request.provider() else {
            tracing::trace!("Metadata view of {} is abstract, declining", service);
            return Vec::new();
        };
        let inner = adapted(service, request.inner());

        registry
            .registrations_for(&inner)
            .into_iter()
            .map(|target| {
                let provider = provider.clone();
                let inner = inner.clone();
                let component = format!("Meta<{}>", target.component());
                let wrapped = target.clone();

                let activator = Activator::raw(move |context| {
                    let value = context.resolve_registration(&inner, &wrapped)?;
                    Ok(provider(&value, wrapped.metadata())?)
                });
                adapter_registration(component, service, activator, Some(&target))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain {
        the_int: i32,
    }

    impl MetadataView for Plain {
        fn describe() -> ViewDescriptor<Self> {
            ViewDescriptor::concrete()
                .property(ViewProperty::writable::<i32>("TheInt"))
                .constructor(vec![ViewParameter::of::<i32>("TheInt")], |args| {
                    Ok(Plain {
                        the_int: args.get("TheInt")?,
                    })
                })
        }
    }

    struct Ambiguous;

    impl MetadataView for Ambiguous {
        fn describe() -> ViewDescriptor<Self> {
            ViewDescriptor::concrete()
                .property(ViewProperty::writable::<i32>("A"))
                .property(ViewProperty::writable::<i32>("B"))
                .constructor(vec![ViewParameter::of::<i32>("A")], |_| Ok(Ambiguous))
                .constructor(vec![ViewParameter::of::<i32>("B")], |_| Ok(Ambiguous))
        }
    }

    fn bag(entries: &[(&str, Value)]) -> Metadata {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn test_property_constructor_reads_bag() {
        let factory = view_factory::<Plain>().unwrap();
        let view = factory(&bag(&[("TheInt", Value::from(123))])).unwrap();
        assert_eq!(view.the_int, 123);
    }

    #[test]
    fn test_unassignable_value_counts_as_missing() {
        let factory = view_factory::<Plain>().unwrap();
        let error = factory(&bag(&[("TheInt", Value::from("not a number"))])).err().unwrap();
        assert!(matches!(
            error,
            ContainerError::MissingMetadata { ref property } if property == "TheInt"
        ));
    }

    #[test]
    fn test_several_eligible_constructors_are_ambiguous() {
        let factory = view_factory::<Ambiguous>().unwrap();
        let error = factory(&Metadata::new()).err().unwrap();
        assert!(matches!(error, ContainerError::InvalidViewImplementation { .. }));
    }

    #[test]
    fn test_raw_metadata_view_is_the_bag() {
        let factory = view_factory::<Metadata>().unwrap();
        let view = factory(&bag(&[("Name", Value::from("Homer"))])).unwrap();
        assert_eq!(view["Name"], "Homer");
    }

    #[test]
    fn test_view_arguments_type_checks() {
        let arguments = ViewArguments {
            view: "Plain",
            values: vec![("TheInt", Value::from(5))],
        };
        assert_eq!(arguments.get::<i32>("TheInt").unwrap(), 5);
        assert!(arguments.get::<String>("TheInt").is_err());
        assert!(matches!(
            arguments.get::<i32>("Other"),
            Err(ContainerError::MissingMetadata { .. })
        ));
    }
}
