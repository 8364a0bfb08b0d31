//! Call-site dependency resolution
//!
//! Providers declare their parameters up front. A parameter whose default is a
//! [depends] marker is resolved from another provider before the provider runs, unless
//! the caller passes a value for it.
//!
//! A [Resolver] expands the call into a dependency graph of [Request]s, evaluates every
//! distinct request once in dependency order and hands back the target's value. Async
//! providers run concurrently, resources are exited in reverse once resolution is over.
//!
//! ```
//! use injected::{depends, provider, resolver, Args, DynError};
//!
//! let left = provider("left").build_sync(|_| Ok(3_u32));
//! let right = provider("right").build_async(|_| async { Ok::<_, DynError>(5_u32) });
//! let product = provider("product")
//!     .depends("left", depends(&left))
//!     .depends("right", depends(&right))
//!     .build_sync(|args| Ok(args.value::<u32>("left")? * args.value::<u32>("right")?));
//!
//! assert_eq!(*resolver(&product).call(Args::new()).unwrap(), 15);
//! ```

mod args;
mod binder;
mod cache;
mod dependency_graph;
mod errors;
mod provider;
mod request;
mod resolver;
mod resource;
mod scheduler;
mod topology;
mod types;

pub use args::{Arg, ArgValue, Args, BoundArgs};
pub use cache::ShapeCache;
pub use dependency_graph::{DependencyGraph, DependencyGraphError, MAX_RESOLUTION_DEPTH};
pub use errors::{ArgumentError, BindError, ProviderError, ResolveError};
pub use provider::{forward, provider, Forward, Parameter, Provider, ProviderBuilder, ProviderId};
pub use request::{depends, Depends, Request};
pub use resolver::{resolver, seed_context, Resolver, ResolverOptions, Seed};
pub use resource::{AsyncResource, AsyncScoped, Completion, Resource, Scoped};
pub use types::{DynError, Injectable, Instance, TypeInfo};
