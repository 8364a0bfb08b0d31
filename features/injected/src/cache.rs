use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{binder, errors::BindError, provider::ProviderId, request::Request};

/// What decides the dependencies of a request
///
/// Binding only looks at how many positional arguments are passed and which names are
/// passed, never at the values, so calls differing only in their values share a shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ShapeKey {
    provider: ProviderId,
    positional: usize,
    named: Vec<String>,
}

impl ShapeKey {
    fn of(request: &Request) -> Self {
        ShapeKey {
            provider: request.provider.id,
            positional: request.args.positional.len(),
            named: request.args.named.keys().cloned().collect(),
        }
    }
}

/// Memoized dependency shapes, shareable between resolvers
///
/// Which dependencies a request has only depends on its provider's declaration and on
/// which of its parameters the call binds, so it is computed once per provider and
/// binding pattern and reused by every later resolution holding the same cache.
#[derive(Clone, Default)]
pub struct ShapeCache {
    shapes: Arc<RwLock<HashMap<ShapeKey, Arc<[Request]>>>>,
}

impl ShapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct dependencies of `request`, before removing seeded requests
    pub(crate) fn dependencies(&self, request: &Request) -> Result<Arc<[Request]>, BindError> {
        let key = ShapeKey::of(request);
        if let Some(shape) = self
            .shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(shape.clone());
        }

        let shape: Arc<[Request]> = binder::dependencies(request)?.into();
        let mut shapes = self.shapes.write().unwrap_or_else(PoisonError::into_inner);
        Ok(shapes.entry(key).or_insert(shape).clone())
    }

    /// Number of memoized shapes
    pub fn len(&self) -> usize {
        self.shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.shapes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for ShapeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeCache").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        args::Args,
        provider::{provider, Provider},
        request::depends,
    };

    fn request<T>(provider: &Provider<T>, args: Args) -> Request {
        Request::new(provider.inner.clone(), args)
    }

    #[test]
    fn values_share_a_shape() {
        let base = provider("base").build_sync(|_| Ok(1_u32));
        let user = provider("user")
            .param("id")
            .depends("base", depends(&base))
            .build_sync(|_| Ok(0_u32));

        let cache = ShapeCache::new();
        for id in 0..100_u32 {
            let shape = cache.dependencies(&request(&user, Args::new().arg(id))).unwrap();
            assert_eq!(&*shape, [request(&base, Args::new())]);
        }
        cache
            .dependencies(&request(&user, Args::new().named("id", 7_u32)))
            .unwrap();

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn overriding_a_dependency_is_its_own_shape() {
        let base = provider("base").build_sync(|_| Ok(1_u32));
        let user = provider("user")
            .depends("base", depends(&base))
            .build_sync(|_| Ok(0_u32));

        let cache = ShapeCache::new();
        let overridden = cache
            .dependencies(&request(&user, Args::new().named("base", 2_u32)))
            .unwrap();
        let resolved = cache.dependencies(&request(&user, Args::new())).unwrap();

        assert!(overridden.is_empty());
        assert_eq!(resolved.len(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_binding_is_not_memoized() {
        let user = provider("user").build_sync(|_| Ok(0_u32));

        let cache = ShapeCache::new();
        assert!(cache
            .dependencies(&request(&user, Args::new().arg(1_u32)))
            .is_err());
        assert!(cache.is_empty());
    }
}
