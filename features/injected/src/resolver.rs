use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    args::Args,
    binder::ResolutionContext,
    cache::ShapeCache,
    dependency_graph::{DependencyGraph, MAX_RESOLUTION_DEPTH},
    errors::ResolveError,
    provider::Provider,
    request::Request,
    scheduler,
    types::{Injectable, Instance},
};

/// Values supplied ahead of resolution, by provider
///
/// A seeded value replaces the zero-argument request of its provider. Neither the provider
/// nor anything only it depends on is evaluated.
#[derive(Clone, Default)]
pub struct Seed {
    values: ResolutionContext,
}

impl Seed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `provider` with `value`
    pub fn with<T: Injectable>(mut self, provider: &Provider<T>, value: T) -> Self {
        self.insert(provider, value);
        self
    }

    pub fn insert<T: Injectable>(&mut self, provider: &Provider<T>, value: T) {
        self.values.insert(
            Request::new(provider.inner.clone(), Args::new()),
            Instance::new(value),
        );
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries of `other` take precedence
    fn merged(&self, other: &Seed) -> ResolutionContext {
        let mut values = self.values.clone();
        values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Limits of a single resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Resolution fails with [ResolveError::Timeout] once this has passed
    pub timeout: Option<Duration>,
    /// Longest dependency chain allowed
    pub max_depth: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_depth: MAX_RESOLUTION_DEPTH,
        }
    }
}

impl ResolverOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Resolves a target provider together with everything it depends on
///
/// ```
/// use injected::{depends, provider, resolver, Args};
///
/// let greeting = provider("greeting").build_sync(|_| Ok("Hello".to_string()));
/// let message = provider("message")
///     .param("name")
///     .depends("greeting", depends(&greeting))
///     .build_sync(|args| {
///         let greeting = args.get::<String>("greeting")?;
///         let name = args.get_ref::<String>("name")?;
///         Ok(format!("{greeting}, {name}!"))
///     });
///
/// let message = resolver(&message)
///     .call(Args::new().arg("World".to_string()))
///     .unwrap();
/// assert_eq!(*message, "Hello, World!");
/// ```
pub struct Resolver<T> {
    target: Provider<T>,
    seed: Seed,
    options: ResolverOptions,
    cache: ShapeCache,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            seed: self.seed.clone(),
            options: self.options,
            cache: self.cache.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("target", &self.target)
            .field("seed", &self.seed)
            .field("options", &self.options)
            .finish()
    }
}

/// Wraps `target` into a [Resolver]
pub fn resolver<T: Injectable>(target: &Provider<T>) -> Resolver<T> {
    Resolver {
        target: target.clone(),
        seed: Seed::new(),
        options: ResolverOptions::default(),
        cache: ShapeCache::new(),
    }
}

/// Binds `seed` to `resolver`, used by every call made through it
pub fn seed_context<T: Injectable>(resolver: Resolver<T>, seed: Seed) -> Resolver<T> {
    resolver.with_seed(seed)
}

impl<T: Injectable> Resolver<T> {
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.options.max_depth = max_depth;
        self
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares dependency shapes with other resolvers holding `cache`
    pub fn with_shape_cache(mut self, cache: ShapeCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn target(&self) -> &Provider<T> {
        &self.target
    }

    /// Whether the target provider suspends
    pub fn is_async(&self) -> bool {
        self.target.is_async()
    }

    /// Resolves the target, blocking the current thread until done
    ///
    /// Async dependencies are driven on the current thread, so they must not rely on a
    /// runtime being present.
    pub fn call(&self, args: Args) -> Result<Arc<T>, ResolveError> {
        futures::executor::block_on(self.call_async(args))
    }

    pub fn call_with_seed(&self, args: Args, seed: &Seed) -> Result<Arc<T>, ResolveError> {
        futures::executor::block_on(self.call_async_with_seed(args, seed))
    }

    /// Resolves the target
    ///
    /// Dropping the returned future cancels the resolution. Entered sync resources are then
    /// exited with [Completion::Cancelled](crate::Completion::Cancelled), entered async
    /// resources are dropped without being exited.
    pub fn call_async(
        &self,
        args: Args,
    ) -> impl Future<Output = Result<Arc<T>, ResolveError>> + '_ {
        self.resolve(args, self.seed.values.clone())
    }

    /// Resolves the target, with entries of `seed` replacing the bound seed
    pub fn call_async_with_seed(
        &self,
        args: Args,
        seed: &Seed,
    ) -> impl Future<Output = Result<Arc<T>, ResolveError>> + '_ {
        self.resolve(args, self.seed.merged(seed))
    }

    async fn resolve(&self, args: Args, context: ResolutionContext) -> Result<Arc<T>, ResolveError> {
        let root = Request::new(self.target.inner.clone(), args);
        let instance = scheduler::resolve(&root, context, &self.options, &self.cache).await?;

        instance
            .downcast::<T>()
            .map_err(|actual_type| ResolveError::DowncastFailed {
                required_type: std::any::type_name::<T>(),
                actual_type,
            })
    }

    /// Builds the dependency graph of calling the target with `args`, without executing it
    pub fn graph(&self, args: Args) -> Result<DependencyGraph, ResolveError> {
        let root = Request::new(self.target.inner.clone(), args);
        DependencyGraph::build(&root, &self.seed.values, &self.cache, self.options.max_depth)
    }
}
