use std::{
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{
    args::{ArgValue, Args},
    provider::{Provider, ProviderId, ProviderInner},
};

/// A call of a provider with specific arguments
///
/// Two requests are equal if they call the same provider with structurally equal
/// arguments. Every distinct request is evaluated at most once per resolution.
#[derive(Clone)]
pub struct Request {
    pub(crate) provider: Arc<ProviderInner>,
    pub(crate) args: Args,
}

impl Request {
    pub(crate) fn new(provider: Arc<ProviderInner>, args: Args) -> Self {
        Self { provider, args }
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider.id
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name
    }

    pub fn args(&self) -> &Args {
        &self.args
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.provider.id == other.provider.id && self.args == other.args
    }
}
impl Eq for Request {}

impl Hash for Request {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.provider.id.hash(state);
        self.args.hash(state);
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.provider.name, self.args)
    }
}

impl Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Marks a parameter as resolved from a provider
///
/// Only meant to be handed to [ProviderBuilder::depends](crate::ProviderBuilder::depends).
/// A marker is not a value: it can't be compared
///
/// ```compile_fail
/// use injected::{depends, provider};
///
/// let config = provider("config").build_sync(|_| Ok(1_u32));
/// let _ = depends(&config) == depends(&config);
/// ```
///
/// formatted
///
/// ```compile_fail
/// use injected::{depends, provider};
///
/// let config = provider("config").build_sync(|_| Ok(1_u32));
/// let _ = format!("{}", depends(&config));
/// ```
///
/// or tested for truth
///
/// ```compile_fail
/// use injected::{depends, provider};
///
/// let config = provider("config").build_sync(|_| Ok(1_u32));
/// if depends(&config) {}
/// ```
#[must_use]
pub struct Depends {
    request: Request,
}

/// Declares a dependency on `provider`, called without arguments unless some are added
pub fn depends<T>(provider: &Provider<T>) -> Depends {
    Depends {
        request: Request::new(provider.inner.clone(), Args::new()),
    }
}

impl Depends {
    /// Passes a positional argument to the provider
    pub fn arg<V: ArgValue>(mut self, value: V) -> Self {
        self.request.args = self.request.args.arg(value);
        self
    }

    /// Passes a named argument to the provider
    pub fn named<V: ArgValue>(mut self, name: impl Into<String>, value: V) -> Self {
        self.request.args = self.request.args.named(name, value);
        self
    }

    pub(crate) fn into_request(self) -> Request {
        self.request
    }
}
