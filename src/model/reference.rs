use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

use crate::model::{Annotation, Application, ElementKind, Endpoint, Id, Input, Parameter};

/// A model element that can be the target of a [`WeakReference`].
///
/// The container is what the reference is resolved against: endpoints live in an
/// [`Application`], parameters in their [`Endpoint`], inputs in an [`Annotation`].
pub trait Referable: Sized {
    type Container;

    const KIND: ElementKind;

    fn find<'a>(container: &'a Self::Container, id: &str) -> Option<&'a Self>;
}

impl Referable for Endpoint {
    type Container = Application;

    const KIND: ElementKind = ElementKind::Endpoint;

    fn find<'a>(container: &'a Application, id: &str) -> Option<&'a Self> {
        container.find_endpoint(id)
    }
}

impl Referable for Parameter {
    type Container = Endpoint;

    const KIND: ElementKind = ElementKind::Parameter;

    fn find<'a>(container: &'a Endpoint, id: &str) -> Option<&'a Self> {
        container.find_parameter(id)
    }
}

impl Referable for Input {
    type Container = Annotation;

    const KIND: ElementKind = ElementKind::Input;

    fn find<'a>(container: &'a Annotation, id: &str) -> Option<&'a Self> {
        container.find_input(id)
    }
}

/// Pointer by (declared type, id) to a model element.
///
/// It never owns the target and holds no object reference; it is resolved on
/// demand against whichever snapshot the caller supplies. Serialized as the bare id.
pub struct WeakReference<T: Referable> {
    id: Id,
    _target: PhantomData<fn() -> T>,
}

impl<T: Referable> WeakReference<T> {
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            _target: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ElementKind {
        T::KIND
    }

    pub fn resolve<'a>(&self, container: &'a T::Container) -> Option<&'a T> {
        T::find(container, &self.id)
    }

    pub fn is_dangling(&self, container: &T::Container) -> bool {
        self.resolve(container).is_none()
    }

    pub fn element_reference(&self) -> ModelElementReference {
        ModelElementReference::new(T::KIND, self.id.clone())
    }
}

impl<T: Referable> Clone for WeakReference<T> {
    fn clone(&self) -> Self {
        Self::new(self.id.clone())
    }
}

impl<T: Referable> PartialEq for WeakReference<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: Referable> Eq for WeakReference<T> {}

impl<T: Referable> fmt::Debug for WeakReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakReference<{}>({})", T::KIND, self.id)
    }
}

impl<T: Referable> Serialize for WeakReference<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id)
    }
}

impl<'de, T: Referable> Deserialize<'de> for WeakReference<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Ok(Self::new(id))
    }
}

/// Type-erased (type, id) pair identifying a model or annotation element in reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelElementReference {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub id: Id,
}

impl ModelElementReference {
    pub fn new(kind: ElementKind, id: impl Into<Id>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn endpoint(id: impl Into<Id>) -> Self {
        Self::new(ElementKind::Endpoint, id)
    }

    pub fn parameter(id: impl Into<Id>) -> Self {
        Self::new(ElementKind::Parameter, id)
    }

    /// Bucket for system changes that no annotation element refers to.
    pub fn system_changes() -> Self {
        Self::new(ElementKind::SystemChanges, "System changes")
    }
}

impl fmt::Display for ModelElementReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.kind)
    }
}
