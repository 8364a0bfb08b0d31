use std::{
    future::Future,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    args::{Arg, ArgValue, BoundArgs},
    errors::{BindError, ProviderError},
    request::{Depends, Request},
    resource::{AsyncResource, DynAsyncResource, DynResource, Resource},
    types::{DynError, Injectable, Instance, TypeInfo},
};

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of a registered provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    fn next() -> Self {
        ProviderId(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type SyncBody = Box<dyn Fn(&BoundArgs) -> Result<Instance, DynError> + Send + Sync>;
type AsyncBody =
    Box<dyn Fn(BoundArgs) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync>;
type ResourceBody =
    Box<dyn Fn(&BoundArgs) -> Result<Box<dyn DynResource>, DynError> + Send + Sync>;
type AsyncResourceBody =
    Box<dyn Fn(&BoundArgs) -> Result<Box<dyn DynAsyncResource>, DynError> + Send + Sync>;

/// What invoking a provider produces
pub(crate) enum Body {
    /// A value, immediately
    Sync(SyncBody),
    /// A future resolving to the value
    Async(AsyncBody),
    /// A resource which is entered in place
    Resource(ResourceBody),
    /// A resource whose entry has to be awaited
    AsyncResource(AsyncResourceBody),
    /// Declared ahead, defined by another provider later on
    Forward(OnceLock<Arc<ProviderInner>>),
}

/// The default of a provider parameter
pub(crate) enum ParamDefault {
    Value(Arg),
    Depends(Request),
}

/// A named parameter of a provider
pub struct Parameter {
    pub(crate) name: &'static str,
    pub(crate) default: Option<ParamDefault>,
}

impl Parameter {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Whether the default of this parameter is a dependency
    pub fn is_dependency(&self) -> bool {
        matches!(self.default, Some(ParamDefault::Depends(_)))
    }
}

pub(crate) struct ProviderInner {
    pub(crate) id: ProviderId,
    pub(crate) name: &'static str,
    pub(crate) output: TypeInfo,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) body: Body,
}

impl ProviderInner {
    /// The provider holding the parameters and body, following a forward declaration
    pub(crate) fn definition(&self) -> Result<&ProviderInner, BindError> {
        match &self.body {
            Body::Forward(target) => target
                .get()
                .map(|target| &**target)
                .ok_or(BindError::Undefined { provider: self.name }),
            _ => Ok(self),
        }
    }

    pub(crate) fn is_async(&self) -> bool {
        self.definition().is_ok_and(|definition| {
            matches!(definition.body, Body::Async(_) | Body::AsyncResource(_))
        })
    }
}

/// A registered provider of `T`
///
/// Cloning is cheap and keeps the identity: a clone and its original are the same provider.
pub struct Provider<T> {
    pub(crate) inner: Arc<ProviderInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.inner.name)
            .field("output", &self.inner.output.type_name)
            .finish()
    }
}

impl<T> Provider<T> {
    pub fn id(&self) -> ProviderId {
        self.inner.id
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Declared parameters, empty for a forward declaration that is not defined yet
    pub fn parameters(&self) -> &[Parameter] {
        match self.inner.definition() {
            Ok(definition) => &definition.parameters,
            Err(_) => &[],
        }
    }

    /// Whether invoking the provider suspends
    pub fn is_async(&self) -> bool {
        self.inner.is_async()
    }
}

/// Starts declaring a provider called `name`
pub fn provider(name: &'static str) -> ProviderBuilder {
    ProviderBuilder::new(name)
}

/// Declares the parameters of a provider, finished by one of the `build_*` functions
///
/// # Panics
///
/// When a parameter name is declared twice.
#[must_use]
pub struct ProviderBuilder {
    name: &'static str,
    parameters: Vec<Parameter>,
}

impl ProviderBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parameters: Vec::new(),
        }
    }

    fn push(mut self, name: &'static str, default: Option<ParamDefault>) -> Self {
        assert!(
            self.parameters.iter().all(|param| param.name != name),
            "Parameter '{name}' of '{}' declared twice",
            self.name
        );
        self.parameters.push(Parameter { name, default });
        self
    }

    /// A parameter the caller has to supply
    pub fn param(self, name: &'static str) -> Self {
        self.push(name, None)
    }

    /// A parameter with a plain default value
    pub fn param_or<V: ArgValue>(self, name: &'static str, default: V) -> Self {
        self.push(name, Some(ParamDefault::Value(Arg::new(default))))
    }

    /// A parameter resolved from another provider unless the caller supplies it
    pub fn depends(self, name: &'static str, dependency: Depends) -> Self {
        self.push(name, Some(ParamDefault::Depends(dependency.into_request())))
    }

    fn finish<T: Injectable>(self, body: Body) -> Provider<T> {
        Provider {
            inner: Arc::new(ProviderInner {
                id: ProviderId::next(),
                name: self.name,
                output: TypeInfo::of::<T>(),
                parameters: self.parameters,
                body,
            }),
            _marker: PhantomData,
        }
    }

    /// A provider computing its value in place
    pub fn build_sync<T, F>(self, body: F) -> Provider<T>
    where
        T: Injectable,
        F: Fn(&BoundArgs) -> Result<T, DynError> + Send + Sync + 'static,
    {
        self.finish(Body::Sync(Box::new(move |args| body(args).map(Instance::new))))
    }

    /// A provider whose value is computed by a future
    pub fn build_async<T, F, Fut>(self, body: F) -> Provider<T>
    where
        T: Injectable,
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, DynError>> + Send + 'static,
    {
        self.finish(Body::Async(Box::new(move |args| {
            body(args).map(|result| result.map(Instance::new)).boxed()
        })))
    }

    /// A provider creating a resource, which is entered to produce the value
    pub fn build_resource<R, F>(self, body: F) -> Provider<R::Output>
    where
        R: Resource,
        F: Fn(&BoundArgs) -> Result<R, DynError> + Send + Sync + 'static,
    {
        self.finish(Body::Resource(Box::new(move |args| {
            body(args).map(|resource| Box::new(resource) as Box<dyn DynResource>)
        })))
    }

    /// A provider creating an async resource, which is entered to produce the value
    pub fn build_async_resource<R, F>(self, body: F) -> Provider<R::Output>
    where
        R: AsyncResource,
        F: Fn(&BoundArgs) -> Result<R, DynError> + Send + Sync + 'static,
    {
        self.finish(Body::AsyncResource(Box::new(move |args| {
            body(args).map(|resource| Box::new(resource) as Box<dyn DynAsyncResource>)
        })))
    }

    /// A provider without a body, its value has to be seeded
    pub fn build_seeded<T: Injectable>(self) -> Provider<T> {
        let name = self.name;
        self.finish(Body::Sync(Box::new(move |_| {
            Err(ProviderError::NotSeeded(name).into())
        })))
    }
}

/// A provider declared before it is defined
///
/// The declared provider can be depended upon right away, which allows providers to
/// depend on each other. Requests of the declared provider are evaluated with the
/// parameters and body of its definition.
pub struct Forward<T> {
    provider: Provider<T>,
}

/// Declares a provider called `name`, to be defined with [Forward::define]
pub fn forward<T: Injectable>(name: &'static str) -> Forward<T> {
    Forward {
        provider: ProviderBuilder::new(name).finish(Body::Forward(OnceLock::new())),
    }
}

impl<T> Forward<T> {
    pub fn provider(&self) -> &Provider<T> {
        &self.provider
    }

    /// Defines the declared provider as `definition`
    ///
    /// Fails, handing back `definition`, if already defined or if `definition` is itself a
    /// forward declaration.
    pub fn define(&self, definition: &Provider<T>) -> Result<(), Provider<T>> {
        let Body::Forward(target) = &self.provider.inner.body else {
            return Err(definition.clone());
        };
        if matches!(definition.inner.body, Body::Forward(_)) {
            return Err(definition.clone());
        }

        target
            .set(definition.inner.clone())
            .map_err(|_| definition.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::depends;

    #[test]
    fn clones_share_identity() {
        let a = provider("a").build_sync(|_| Ok(1_u8));
        let b = provider("a").build_sync(|_| Ok(1_u8));
        assert_eq!(a.id(), a.clone().id());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn records_parameters_in_order() {
        let inner = provider("inner").build_sync(|_| Ok(0_i64));
        let outer = provider("outer")
            .param("first")
            .param_or("second", 2_i64)
            .depends("third", depends(&inner))
            .build_sync(|_| Ok(()));

        let names: Vec<_> = outer.parameters().iter().map(Parameter::name).collect();
        assert_eq!(names, ["first", "second", "third"]);
        assert!(!outer.parameters()[0].has_default());
        assert!(outer.parameters()[1].has_default());
        assert!(outer.parameters()[2].is_dependency());
    }

    #[test]
    fn reports_kind() {
        let sync = provider("sync").build_sync(|_| Ok(()));
        let future = provider("async").build_async(|_| async { Ok::<_, DynError>(()) });
        assert!(!sync.is_async());
        assert!(future.is_async());
    }

    #[test]
    fn forward_declaration_takes_definition() {
        let declared = forward::<u8>("declared");
        assert!(declared.provider().parameters().is_empty());
        assert!(!declared.provider().is_async());

        let definition = provider("definition")
            .param("x")
            .build_async(|_| async { Ok::<_, DynError>(1_u8) });
        declared.define(&definition).unwrap();

        assert_eq!(declared.provider().parameters().len(), 1);
        assert!(declared.provider().is_async());
        assert_ne!(declared.provider().id(), definition.id());
        assert!(declared.define(&definition).is_err());
    }

    #[test]
    fn forward_cannot_alias_a_forward() {
        let first = forward::<u8>("first");
        let second = forward::<u8>("second");
        assert!(first.define(second.provider()).is_err());
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn rejects_duplicate_parameters() {
        let _ = provider("dup").param("x").param("x");
    }
}
