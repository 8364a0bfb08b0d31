use std::sync::Arc;

use thiserror::Error;

use crate::{dependency_graph::DependencyGraphError, types::DynError};

/// Errors of a single top level resolution
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// The dependency graph could not be built or ordered
    #[error(transparent)]
    Graph(#[from] DependencyGraphError),
    /// Call arguments did not fit a provider's parameters
    #[error(transparent)]
    Bind(#[from] BindError),
    /// A provider, or the entry of a resource, failed
    #[error("Provider '{provider}' failed - error: {error}")]
    ProviderFailed {
        provider: &'static str,
        error: Arc<DynError>,
    },
    /// Exiting a resource failed after every provider succeeded
    #[error("Teardown of '{provider}' failed - error: {error}")]
    TeardownFailed {
        provider: &'static str,
        error: Arc<DynError>,
    },
    /// Resolution timed out
    #[error("Resolution timed out")]
    Timeout,
    /// Nothing is running but requests are left - only reachable through a broken graph
    #[error("Resolution stalled with {pending} requests never becoming ready")]
    Stalled { pending: usize },
    /// The root value was not of the requested type
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}

impl ResolveError {
    /// The error a provider or resource returned, as it was returned
    pub fn provider_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            ResolveError::ProviderFailed { error, .. }
            | ResolveError::TeardownFailed { error, .. } => Some(&***error),
            _ => None,
        }
    }
}

/// Errors while binding call arguments to a provider's parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("'{provider}' takes {max} positional arguments but {given} were given")]
    TooManyPositional {
        provider: &'static str,
        max: usize,
        given: usize,
    },
    #[error("'{provider}' got an unexpected argument '{name}'")]
    UnexpectedArgument {
        provider: &'static str,
        name: String,
    },
    #[error("'{provider}' got multiple values for argument '{name}'")]
    MultipleValues {
        provider: &'static str,
        name: &'static str,
    },
    #[error("'{provider}' is missing a required argument '{name}'")]
    MissingArgument {
        provider: &'static str,
        name: &'static str,
    },
    #[error("'{provider}' was declared but never defined")]
    Undefined { provider: &'static str },
}

/// Errors when a provider reads its bound arguments
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("'{provider}' has no parameter '{name}'")]
    Missing { provider: &'static str, name: String },
    #[error("Failed to downcast '{name}', required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        name: String,
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// Errors originating from the providers this crate builds itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// A seed-only provider was invoked without a seed value
    #[error("'{0}' must be supplied through a seed context")]
    NotSeeded(&'static str),
}
