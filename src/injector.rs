//! Type-keyed service registry backing handler injection.

use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    ops::Deref,
    sync::Arc,
};

use tracing::debug;

use crate::Request;

type Value = Arc<dyn Any + Send + Sync>;

/// A registry holding at most one instance per type.
///
/// `Router`, `Endpoint` and every `Context` carry one. At dispatch the global and endpoint
/// registries are merged, endpoint bindings winning, and the result becomes the request's
/// injector.
#[derive(Clone, Default)]
pub struct Injector {
    inner: HashMap<TypeId, Value>,
}

impl Injector {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Binds `service` to its type, replacing any previous instance of that type.
    ///
    /// The request types every handler receives automatically are reserved and registering one
    /// of them is ignored.
    pub fn register<T>(&mut self, service: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        if is_reserved(TypeId::of::<T>()) {
            debug!(ty = type_name::<T>(), "ignoring registration of reserved type");

            return self;
        }

        self.inner.insert(TypeId::of::<T>(), Arc::new(service));

        self
    }

    /// Builder form of [`Injector::register`].
    pub fn with<T>(mut self, service: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.register(service);

        self
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.inner
            .get(&TypeId::of::<T>())
            .and_then(|f| f.downcast_ref())
    }

    /// Shared handle to the registered instance of `T`, if any.
    pub fn service<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.inner
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|f| f.downcast().ok())
    }

    /// Like [`Injector::service`] but a missing instance resolves to `T::default()`.
    pub fn resolve<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync + Default,
    {
        self.service().unwrap_or_default()
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.inner.contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.inner
            .remove(&TypeId::of::<T>())
            .and_then(|f| f.downcast().ok())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Copies every binding of `other` into `self`, overwriting on collision.
    pub fn extend(&mut self, other: &Injector) {
        self.inner
            .extend(other.inner.iter().map(|(k, v)| (*k, Arc::clone(v))));
    }

    /// Unions `injectors` into a new registry. Later sources win on type collision.
    pub fn merge<'a>(injectors: impl IntoIterator<Item = &'a Injector>) -> Injector {
        let mut merged = Injector::new();

        for injector in injectors {
            merged.extend(injector);
        }

        merged
    }
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("services", &self.inner.len())
            .finish()
    }
}

fn is_reserved(id: TypeId) -> bool {
    id == TypeId::of::<Request>() || id == TypeId::of::<Arc<Request>>()
}

/// A registered service, resolved by type when a handler is invoked.
///
/// When nothing of type `T` has been registered the handler receives `T::default()`. Take
/// `Option<Service<T>>` to observe the absence instead.
pub struct Service<T>(Arc<T>);

impl<T> Service<T> {
    pub fn into_inner(self) -> Arc<T> {
        self.0
    }
}

impl<T> Clone for Service<T> {
    fn clone(&self) -> Self {
        Service(Arc::clone(&self.0))
    }
}

impl<T> From<Arc<T>> for Service<T> {
    fn from(inner: Arc<T>) -> Self {
        Service(inner)
    }
}

impl<T> Deref for Service<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Service<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Service").field(&self.0).finish()
    }
}
