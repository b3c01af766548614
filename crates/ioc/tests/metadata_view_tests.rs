use std::sync::Arc;

use elif_ioc::{
    All, Arguments, BoxError, ConstructorInfo, Container, ContainerBuilder, ContainerError, Factory,
    Injectable, Meta, Metadata, MetadataView, Registration, ViewDescriptor, ViewParameter,
    ViewProperty,
};

const SUPPLIED_INT_VALUE: i32 = 123;
const SUPPLIED_NAME_VALUE: &str = "Homer";

#[derive(Debug)]
struct Widget;

impl Injectable for Widget {
    fn constructor() -> ConstructorInfo {
        ConstructorInfo::new::<Widget>()
    }

    fn construct(_args: Arguments) -> Result<Self, BoxError> {
        Ok(Widget)
    }
}

#[derive(Debug)]
struct Gadget;

struct MyMeta {
    the_int: i32,
}

impl MetadataView for MyMeta {
    fn describe() -> ViewDescriptor<Self> {
        ViewDescriptor::concrete()
            .property(ViewProperty::writable::<i32>("TheInt"))
            .constructor(vec![ViewParameter::of::<i32>("TheInt")], |args| {
                Ok(MyMeta {
                    the_int: args.get("TheInt")?,
                })
            })
    }
}

struct MyMetaWithDefault {
    the_int: i32,
}

impl MetadataView for MyMetaWithDefault {
    fn describe() -> ViewDescriptor<Self> {
        ViewDescriptor::concrete()
            .property(ViewProperty::writable::<i32>("TheInt"))
            .constructor(
                vec![ViewParameter::of::<i32>("TheInt").with_default(42)],
                |args| {
                    Ok(MyMetaWithDefault {
                        the_int: args.get("TheInt")?,
                    })
                },
            )
    }
}

struct MyMetaWithDictionary {
    the_name: String,
}

impl MetadataView for MyMetaWithDictionary {
    fn describe() -> ViewDescriptor<Self> {
        ViewDescriptor::concrete()
            .property(ViewProperty::read_only::<String>("TheName"))
            .mapping(|bag: &Metadata| {
                let the_name = bag
                    .get("Name")
                    .and_then(|value| value.as_str())
                    .ok_or("metadata has no Name")?
                    .to_string();
                Ok(MyMetaWithDictionary { the_name })
            })
    }
}

struct MyMetaWithReadOnlyProperty {
    the_int: i32,
}

impl MyMetaWithReadOnlyProperty {
    fn doubled(&self) -> i32 {
        self.the_int * 2
    }
}

impl MetadataView for MyMetaWithReadOnlyProperty {
    fn describe() -> ViewDescriptor<Self> {
        ViewDescriptor::concrete()
            .property(ViewProperty::writable::<i32>("TheInt"))
            .property(ViewProperty::read_only::<i32>("Doubled"))
            .constructor(vec![ViewParameter::of::<i32>("TheInt")], |args| {
                Ok(MyMetaWithReadOnlyProperty {
                    the_int: args.get("TheInt")?,
                })
            })
    }
}

struct MyMetaWithInvalidConstructor;

impl MetadataView for MyMetaWithInvalidConstructor {
    fn describe() -> ViewDescriptor<Self> {
        ViewDescriptor::concrete()
            .property(ViewProperty::writable::<i32>("TheInt"))
            .constructor(vec![ViewParameter::of::<String>("Unrelated")], |_| {
                Ok(MyMetaWithInvalidConstructor)
            })
    }
}

trait MyMetaInterface: Send + Sync {
    fn the_int(&self) -> i32;
}

impl MetadataView for dyn MyMetaInterface {
    fn describe() -> ViewDescriptor<Self> {
        ViewDescriptor::abstract_view()
    }
}

fn container_with_metadata() -> Container {
    ContainerBuilder::new()
        .register(
            Registration::from_type::<Widget>()
                .with_metadata("TheInt", SUPPLIED_INT_VALUE)
                .with_metadata("Name", SUPPLIED_NAME_VALUE),
        )
        .build()
        .unwrap()
}

fn container_without_metadata() -> Container {
    ContainerBuilder::new()
        .register(Registration::from_type::<Widget>())
        .build()
        .unwrap()
}

#[test]
fn test_values_are_provided_from_metadata() {
    let container = container_with_metadata();
    let meta = container.get::<Meta<Arc<Widget>, MyMeta>>().unwrap();
    assert_eq!(meta.metadata().the_int, SUPPLIED_INT_VALUE);
}

#[test]
fn test_values_provided_are_unique_to_each_registration() {
    let container = ContainerBuilder::new()
        .register(Registration::from_type::<Widget>().with_metadata("TheInt", 123))
        .register(Registration::from_delegate(|_| Ok(Gadget)).with_metadata("TheInt", 321))
        .build()
        .unwrap();

    let widget = container.get::<Meta<Arc<Widget>, MyMeta>>().unwrap();
    assert_eq!(widget.metadata().the_int, 123);

    let gadget = container.get::<Meta<Arc<Gadget>, MyMeta>>().unwrap();
    assert_eq!(gadget.metadata().the_int, 321);
}

#[test]
fn test_values_provided_from_metadata_override_defaults() {
    let container = container_with_metadata();
    let meta = container.get::<Meta<Arc<Widget>, MyMetaWithDefault>>().unwrap();
    assert_eq!(meta.metadata().the_int, SUPPLIED_INT_VALUE);
}

#[test]
fn test_values_provided_to_types_with_mapping_constructor() {
    let container = container_with_metadata();
    let meta = container.get::<Meta<Arc<Widget>, MyMetaWithDictionary>>().unwrap();
    assert_eq!(meta.metadata().the_name, SUPPLIED_NAME_VALUE);
}

#[test]
fn test_read_only_properties_on_metadata_view_are_ignored() {
    let container = container_with_metadata();
    let meta = container
        .get::<Meta<Arc<Widget>, MyMetaWithReadOnlyProperty>>()
        .unwrap();
    assert_eq!(meta.metadata().the_int, SUPPLIED_INT_VALUE);
    assert_eq!(meta.metadata().doubled(), SUPPLIED_INT_VALUE * 2);
}

#[test]
fn test_resolving_metadata_view_with_invalid_constructor_fails() {
    let container = container_with_metadata();
    let error = container
        .get::<Meta<Arc<Widget>, MyMetaWithInvalidConstructor>>()
        .unwrap_err();

    assert!(matches!(error, ContainerError::DependencyResolution { .. }));
    match error.innermost() {
        ContainerError::InvalidViewImplementation { view } => {
            assert!(view.ends_with("MyMetaWithInvalidConstructor"))
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_resolving_metadata_view_with_interface_is_not_registered() {
    let container = container_with_metadata();
    let error = container
        .get::<Meta<Arc<Widget>, dyn MyMetaInterface>>()
        .unwrap_err();

    assert!(error.is_not_registered());
    assert!(container
        .try_get::<Meta<Arc<Widget>, dyn MyMetaInterface>>()
        .unwrap()
        .is_none());
}

#[test]
fn test_values_bubble_up_through_adapters() {
    let container = container_with_metadata();
    let meta = container
        .get::<Meta<Factory<Arc<Widget>>, MyMeta>>()
        .unwrap();

    assert_eq!(meta.metadata().the_int, SUPPLIED_INT_VALUE);
    meta.value().create().unwrap();
}

#[test]
fn test_raw_metadata_is_available_without_a_view() {
    let container = container_with_metadata();
    let meta = container.get::<Meta<Arc<Widget>>>().unwrap();
    assert_eq!(meta.metadata()["Name"], SUPPLIED_NAME_VALUE);
}

#[test]
fn test_every_registration_gets_its_own_view() {
    let container = ContainerBuilder::new()
        .register(Registration::from_type::<Widget>().with_metadata("TheInt", 1))
        .register(Registration::from_type::<Widget>().with_metadata("TheInt", 2))
        .build()
        .unwrap();

    let all = container.get::<All<Meta<Arc<Widget>, MyMeta>>>().unwrap();
    let values: Vec<_> = all.iter().map(|meta| meta.metadata().the_int).collect();
    assert_eq!(values, vec![1, 2]);

    // The default registration is the most recent one
    let single = container.get::<Meta<Arc<Widget>, MyMeta>>().unwrap();
    assert_eq!(single.metadata().the_int, 2);
}

#[test]
fn test_resolving_metadata_view_without_default_value_fails() {
    let container = container_without_metadata();
    let error = container.get::<Meta<Arc<Widget>, MyMeta>>().unwrap_err();

    assert_eq!(
        error.innermost().to_string(),
        ContainerError::missing_metadata("TheInt").to_string()
    );
}

#[test]
fn test_resolving_metadata_view_with_default_value_provides_default() {
    let container = container_without_metadata();
    let meta = container
        .get::<Meta<Arc<Widget>, MyMetaWithDefault>>()
        .unwrap();
    assert_eq!(meta.metadata().the_int, 42);
}
