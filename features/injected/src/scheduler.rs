use std::{
    sync::Arc,
    thread::{self, sleep},
    time::Duration,
};

use futures::{
    future::{self, BoxFuture, Fuse},
    stream::FuturesUnordered,
    FutureExt, StreamExt,
};
use futures_channel::oneshot;

use crate::{
    binder::{self, ResolutionContext},
    cache::ShapeCache,
    dependency_graph::DependencyGraph,
    errors::ResolveError,
    provider::Body,
    request::Request,
    resolver::ResolverOptions,
    resource::{Completion, Entered, ResourceStack},
    topology::TopologicalCursor,
    types::{DynError, Instance},
};

/// What a suspended provider produced
enum Outcome {
    Value(Instance),
    Entered(Entered),
}

type Pending = BoxFuture<'static, (Request, Result<Outcome, DynError>)>;

/// Resolves `root`, starting from the already known values in `context`
///
/// Every distinct request of the dependency graph is evaluated once, dependencies before
/// dependents. Suspending providers run concurrently. Entered resources are exited in
/// reverse order before this returns, with [Completion::Failure] if resolution failed.
pub(crate) async fn resolve(
    root: &Request,
    context: ResolutionContext,
    options: &ResolverOptions,
    cache: &ShapeCache,
) -> Result<Instance, ResolveError> {
    if let Some(seeded) = context.get(root) {
        tracing::debug!("'{root}' is seeded, nothing to resolve");
        return Ok(seeded.clone());
    }

    let graph = DependencyGraph::build(root, &context, cache, options.max_depth)?;
    let cursor = TopologicalCursor::prepare(&graph)?;

    tracing::debug!(
        "Resolving '{root}' with {} requests and {} seeded values",
        graph.len(),
        context.len()
    );

    let mut scheduler = Scheduler {
        context,
        cursor,
        resources: ResourceStack::new(),
        total: graph.len(),
    };

    // In flight providers are dropped before any resource is exited
    let result = scheduler.run(root, deadline(options.timeout)).await;

    match result {
        Ok(instance) => {
            scheduler.resources.unwind(Completion::Success).await?;
            tracing::debug!("Resolved '{root}'");
            Ok(instance)
        }
        Err(error) => {
            tracing::debug!("Resolution of '{root}' failed: {error}");
            if let Err(teardown) = scheduler.resources.unwind(Completion::Failure).await {
                tracing::warn!("Teardown after failed resolution of '{root}' failed: {teardown}");
            }
            Err(error)
        }
    }
}

/// Resolves once the timeout has passed, or never
fn deadline(timeout: Option<Duration>) -> Fuse<BoxFuture<'static, ()>> {
    let Some(timeout) = timeout else {
        return future::pending().boxed().fuse();
    };

    let (timeout_tx, timeout_rx) = oneshot::channel::<()>();
    // We don't join the thread - it will just die after the timeout
    thread::spawn(move || {
        sleep(timeout);
        let _ = timeout_tx.send(());
    });

    async move {
        let _ = timeout_rx.await;
    }
    .boxed()
    .fuse()
}

struct Scheduler {
    /// Seeded and resolved values
    context: ResolutionContext,
    cursor: TopologicalCursor,
    resources: ResourceStack,
    total: usize,
}

impl Scheduler {
    async fn run(
        &mut self,
        root: &Request,
        mut timeout: Fuse<BoxFuture<'static, ()>>,
    ) -> Result<Instance, ResolveError> {
        let mut pending = FuturesUnordered::new();

        loop {
            // Synchronous providers finish in place and can make more requests ready
            loop {
                let ready = self.cursor.get_ready();
                if ready.is_empty() {
                    break;
                }
                for request in ready {
                    if let Some(future) = self.dispatch(request)? {
                        pending.push(future);
                    }
                }
            }

            if !self.cursor.is_active() {
                break;
            }

            tracing::debug!(
                "Waiting for {} providers to finish [{} of {} complete]",
                self.cursor.in_flight(),
                self.total - self.cursor.remaining(),
                self.total
            );

            futures::select! {
                result = pending.next() => {
                    let Some((request, result)) = result else {
                        return Err(ResolveError::Stalled {
                            pending: self.cursor.remaining(),
                        });
                    };
                    self.complete(request, result)?;
                }
                _ = timeout => {
                    return Err(ResolveError::Timeout)
                }
            }
        }

        let instance = self
            .context
            .get(root)
            .cloned()
            .expect("root is resolved once every request is done");
        Ok(instance)
    }

    /// Invokes the provider of `request`
    ///
    /// Returns the future to wait for if the provider suspends.
    fn dispatch(&mut self, request: Request) -> Result<Option<Pending>, ResolveError> {
        let bound = binder::bind(&request, &self.context)?;
        let provider = request.provider.clone();
        let name = provider.name;

        tracing::trace!("Invoking '{request}'");
        match &provider.definition()?.body {
            Body::Sync(body) => {
                let instance = body(&bound).map_err(|error| failed(name, error))?;
                self.commit(request, instance);
                Ok(None)
            }
            Body::Resource(body) => {
                let mut resource = body(&bound).map_err(|error| failed(name, error))?;
                let instance = resource.enter().map_err(|error| failed(name, error))?;
                self.resources.push_sync(name, resource);
                self.commit(request, instance);
                Ok(None)
            }
            Body::Async(body) => {
                let future = body(bound);
                let pending = async move { (request, future.await.map(Outcome::Value)) };
                Ok(Some(pending.boxed()))
            }
            Body::AsyncResource(body) => {
                let resource = body(&bound).map_err(|error| failed(name, error))?;
                let pending = async move {
                    let entered = resource.enter().await;
                    (request, entered.map(Outcome::Entered))
                };
                Ok(Some(pending.boxed()))
            }
            Body::Forward(_) => unreachable!("a definition is never a forward declaration"),
        }
    }

    /// Handles the result of a suspended provider
    fn complete(
        &mut self,
        request: Request,
        result: Result<Outcome, DynError>,
    ) -> Result<(), ResolveError> {
        match result {
            Ok(Outcome::Value(instance)) => self.commit(request, instance),
            Ok(Outcome::Entered((instance, resource))) => {
                self.resources.push_async(request.provider.name, resource);
                self.commit(request, instance);
            }
            // If one provider fails - abort resolution
            Err(error) => return Err(failed(request.provider.name, error)),
        }
        Ok(())
    }

    fn commit(&mut self, request: Request, instance: Instance) {
        tracing::trace!("Resolved '{request}' to {}", instance.info.type_name);
        self.cursor.done(&request);
        self.context.insert(request, instance);
    }
}

fn failed(provider: &'static str, error: DynError) -> ResolveError {
    ResolveError::ProviderFailed {
        provider,
        error: Arc::new(error),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use futures::executor::block_on;

    use super::*;
    use crate::{
        args::{Arg, Args},
        provider::{provider, Provider},
        request::depends,
        resource::Scoped,
    };

    fn request<T>(provider: &Provider<T>) -> Request {
        Request::new(provider.inner.clone(), Args::new())
    }

    fn run<T>(root: &Provider<T>, context: ResolutionContext) -> Result<Instance, ResolveError> {
        block_on(resolve(
            &request(root),
            context,
            &ResolverOptions::default(),
            &ShapeCache::new(),
        ))
    }

    #[test]
    fn evaluates_shared_dependency_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let base = provider("base").build_sync(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(2_u32)
        });
        let left = provider("left")
            .depends("base", depends(&base))
            .build_sync(|args| Ok(args.value::<u32>("base")? + 1));
        let right = provider("right")
            .depends("base", depends(&base))
            .build_async(|args| async move { Ok::<_, DynError>(args.value::<u32>("base")? * 10) });
        let top = provider("top")
            .depends("left", depends(&left))
            .depends("right", depends(&right))
            .build_sync(|args| Ok(args.value::<u32>("left")? + args.value::<u32>("right")?));

        let instance = run(&top, ResolutionContext::new()).unwrap();

        assert_eq!(*instance.downcast::<u32>().unwrap(), 23);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn seeded_root_is_returned_as_is() {
        let root = provider("root").build_seeded::<u32>();
        let mut context = ResolutionContext::new();
        context.insert(request(&root), Arg::new(9_u32).to_instance());

        let instance = run(&root, context).unwrap();
        assert_eq!(*instance.downcast::<u32>().unwrap(), 9);
    }

    #[test]
    fn failure_exits_entered_resources() {
        let completions = Arc::new(Mutex::new(Vec::new()));
        let sink = completions.clone();
        let resource = provider("resource").build_resource(move |_| {
            let sink = sink.clone();
            Ok(Scoped::new(1_u8, move |completion: Completion| {
                sink.lock().unwrap().push(completion)
            }))
        });
        let failing = provider("failing")
            .depends("resource", depends(&resource))
            .build_sync(|_| Err::<u8, DynError>("broken".into()));

        let error = run(&failing, ResolutionContext::new()).unwrap_err();

        assert!(matches!(
            error,
            ResolveError::ProviderFailed { provider: "failing", .. }
        ));
        assert_eq!(error.provider_error().unwrap().to_string(), "broken");
        assert_eq!(*completions.lock().unwrap(), [Completion::Failure]);
    }

    #[test]
    fn times_out() {
        let never = provider("never").build_async(|_| future::pending::<Result<u8, DynError>>());

        let result = block_on(resolve(
            &request(&never),
            ResolutionContext::new(),
            &ResolverOptions::default().with_timeout(Duration::from_millis(20)),
            &ShapeCache::new(),
        ));
        assert!(matches!(result, Err(ResolveError::Timeout)));
    }
}
