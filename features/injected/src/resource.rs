use std::{future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    errors::ResolveError,
    types::{DynError, Injectable, Instance},
};

/// How the resolution that entered a resource ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    /// A provider failed or the resolution timed out
    Failure,
    /// The resolution was dropped before it finished
    Cancelled,
}

/// A scoped resource providing a value
///
/// Entered at most once per resolution, exited exactly once after every dependent has
/// used the entered value.
pub trait Resource: Send + 'static {
    type Output: Injectable;
    type Error: Into<DynError>;

    /// Acquires the resource, returning the value handed to dependents
    fn enter(&mut self) -> Result<Self::Output, Self::Error>;

    /// Releases the resource
    fn exit(self, completion: Completion) -> Result<(), Self::Error>;
}

/// A scoped resource whose acquisition and release may suspend
///
/// `exit` is awaited on success and on failure. If the resolution future itself is
/// dropped before it finishes, entered async resources are dropped without `exit` being
/// called, since nothing is left to await it. Teardown which must also run on
/// cancellation belongs in the resource's `Drop` impl, or in a sync [Resource].
pub trait AsyncResource: Send + 'static {
    type Output: Injectable;
    type Error: Into<DynError>;

    /// Acquires the resource, returning the value handed to dependents
    fn enter(&mut self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send + '_;

    /// Releases the resource
    fn exit(self, completion: Completion) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Wrapper Trait for resources, providing instances of Any
pub(crate) trait DynResource: Send {
    fn enter(&mut self) -> Result<Instance, DynError>;

    fn exit(self: Box<Self>, completion: Completion) -> Result<(), DynError>;
}
// Impl DynResource for any Resource
impl<R: Resource> DynResource for R {
    fn enter(&mut self) -> Result<Instance, DynError> {
        Resource::enter(self)
            .map(Instance::new)
            .map_err(Into::into)
    }

    fn exit(self: Box<Self>, completion: Completion) -> Result<(), DynError> {
        Resource::exit(*self, completion).map_err(Into::into)
    }
}

pub(crate) type Entered = (Instance, Box<dyn DynAsyncResource>);

/// Wrapper Trait for async resources, providing instances of Any
pub(crate) trait DynAsyncResource: Send {
    /// Enters the resource, handing it back for the stack once entered
    fn enter(self: Box<Self>) -> BoxFuture<'static, Result<Entered, DynError>>;

    fn exit(self: Box<Self>, completion: Completion) -> BoxFuture<'static, Result<(), DynError>>;
}
// Impl DynAsyncResource for any AsyncResource
impl<R: AsyncResource> DynAsyncResource for R {
    fn enter(mut self: Box<Self>) -> BoxFuture<'static, Result<Entered, DynError>> {
        let entry_fut = async move {
            let output = AsyncResource::enter(&mut *self)
                .await
                .map_err(Into::<DynError>::into)?;
            Ok::<_, DynError>((Instance::new(output), self as Box<dyn DynAsyncResource>))
        };

        entry_fut.boxed()
    }

    fn exit(self: Box<Self>, completion: Completion) -> BoxFuture<'static, Result<(), DynError>> {
        let exit_fut = async move {
            AsyncResource::exit(*self, completion)
                .await
                .map_err(Into::<DynError>::into)
        };

        exit_fut.boxed()
    }
}

/// A resource built from a value and a teardown closure
pub struct Scoped<T, F> {
    value: Option<T>,
    teardown: F,
}

impl<T, F> Scoped<T, F>
where
    T: Injectable,
    F: FnOnce(Completion) + Send + 'static,
{
    pub fn new(value: T, teardown: F) -> Self {
        Self {
            value: Some(value),
            teardown,
        }
    }
}

impl<T, F> Resource for Scoped<T, F>
where
    T: Injectable,
    F: FnOnce(Completion) + Send + 'static,
{
    type Output = T;
    type Error = DynError;

    fn enter(&mut self) -> Result<T, DynError> {
        self.value.take().ok_or_else(|| "scoped resource entered twice".into())
    }

    fn exit(self, completion: Completion) -> Result<(), DynError> {
        (self.teardown)(completion);
        Ok(())
    }
}

/// An async resource built from a value and a teardown future
pub struct AsyncScoped<T, F> {
    value: Option<T>,
    teardown: F,
}

impl<T, F, Fut> AsyncScoped<T, F>
where
    T: Injectable,
    F: FnOnce(Completion) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(value: T, teardown: F) -> Self {
        Self {
            value: Some(value),
            teardown,
        }
    }
}

impl<T, F, Fut> AsyncResource for AsyncScoped<T, F>
where
    T: Injectable,
    F: FnOnce(Completion) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    type Output = T;
    type Error = DynError;

    async fn enter(&mut self) -> Result<T, DynError> {
        self.value.take().ok_or_else(|| "scoped resource entered twice".into())
    }

    async fn exit(self, completion: Completion) -> Result<(), DynError> {
        (self.teardown)(completion).await;
        Ok(())
    }
}

enum StackEntry {
    Sync(Box<dyn DynResource>),
    Async(Box<dyn DynAsyncResource>),
}

/// Entered resources in acquisition order
///
/// `unwind` exits them in reverse order. A stack dropped before unwinding exits the
/// remaining synchronous resources with [Completion::Cancelled]; async resources can't be
/// awaited from `drop` and are dropped instead.
#[derive(Default)]
pub(crate) struct ResourceStack {
    entries: Vec<(&'static str, StackEntry)>,
}

impl ResourceStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_sync(&mut self, provider: &'static str, resource: Box<dyn DynResource>) {
        tracing::trace!("Entered resource '{provider}'");
        self.entries.push((provider, StackEntry::Sync(resource)));
    }

    pub(crate) fn push_async(
        &mut self,
        provider: &'static str,
        resource: Box<dyn DynAsyncResource>,
    ) {
        tracing::trace!("Entered async resource '{provider}'");
        self.entries.push((provider, StackEntry::Async(resource)));
    }

    /// Exits every entered resource, last acquired first
    ///
    /// All resources are exited even if some fail. Returns the first failure.
    pub(crate) async fn unwind(&mut self, completion: Completion) -> Result<(), ResolveError> {
        tracing::debug!(
            "Exiting {} resources [{completion:?}]",
            self.entries.len()
        );

        let mut first_error = None;
        // Pop before exiting, so nothing is exited twice if this future is dropped
        while let Some((provider, entry)) = self.entries.pop() {
            let result = match entry {
                StackEntry::Sync(resource) => resource.exit(completion),
                StackEntry::Async(resource) => resource.exit(completion).await,
            };

            if let Err(error) = result {
                tracing::error!("Teardown of '{provider}' failed: {error}");
                if first_error.is_none() {
                    first_error = Some(ResolveError::TeardownFailed {
                        provider,
                        error: Arc::new(error),
                    });
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        while let Some((provider, entry)) = self.entries.pop() {
            match entry {
                StackEntry::Sync(resource) => {
                    if let Err(error) = resource.exit(Completion::Cancelled) {
                        tracing::error!("Teardown of '{provider}' failed: {error}");
                    }
                }
                StackEntry::Async(_) => {
                    tracing::warn!("Async resource '{provider}' dropped without being exited");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::executor::block_on;

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (events, move |event: &str| {
            sink.lock().unwrap().push(event.to_string())
        })
    }

    #[test]
    fn unwinds_in_reverse_order() {
        let (events, record) = recorder();
        let mut stack = ResourceStack::new();
        for name in ["a", "b", "c"] {
            let record = record.clone();
            let mut resource = Scoped::new(name, move |_| record(name));
            DynResource::enter(&mut resource).unwrap();
            stack.push_sync(name, Box::new(resource));
        }

        block_on(stack.unwind(Completion::Success)).unwrap();

        assert_eq!(*events.lock().unwrap(), ["c", "b", "a"]);
        assert!(stack.entries.is_empty());
    }

    #[test]
    fn drop_exits_remaining_sync_resources_as_cancelled() {
        let completions = Arc::new(Mutex::new(Vec::new()));
        {
            let mut stack = ResourceStack::new();
            let sink = completions.clone();
            let resource = Scoped::new(1_u8, move |completion: Completion| {
                sink.lock().unwrap().push(completion)
            });
            stack.push_sync("one", Box::new(resource));
        }

        assert_eq!(*completions.lock().unwrap(), [Completion::Cancelled]);
    }

    #[test]
    fn drop_skips_async_resources() {
        let completions = Arc::new(Mutex::new(Vec::new()));
        {
            let mut stack = ResourceStack::new();
            let sink = completions.clone();
            stack.push_sync(
                "sync",
                Box::new(Scoped::new(1_u8, move |completion: Completion| {
                    sink.lock().unwrap().push(completion)
                })),
            );
            let sink = completions.clone();
            stack.push_async(
                "async",
                Box::new(AsyncScoped::new(2_u8, move |completion: Completion| async move {
                    sink.lock().unwrap().push(completion)
                })),
            );
        }

        // Only the sync resource is exited
        assert_eq!(*completions.lock().unwrap(), [Completion::Cancelled]);
    }

    struct FailingExit;
    impl Resource for FailingExit {
        type Output = ();
        type Error = DynError;

        fn enter(&mut self) -> Result<(), DynError> {
            Ok(())
        }

        fn exit(self, _: Completion) -> Result<(), DynError> {
            Err("exit failed".into())
        }
    }

    #[test]
    fn failing_exit_does_not_skip_earlier_resources() {
        let (events, record) = recorder();
        let mut stack = ResourceStack::new();
        stack.push_sync("first", Box::new(Scoped::new((), move |_| record("first"))));
        stack.push_sync("failing", Box::new(FailingExit));

        let result = block_on(stack.unwind(Completion::Success));

        assert!(matches!(
            result,
            Err(ResolveError::TeardownFailed { provider: "failing", .. })
        ));
        assert_eq!(*events.lock().unwrap(), ["first"]);
    }
}
