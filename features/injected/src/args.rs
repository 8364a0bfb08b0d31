use std::{
    any::{Any, TypeId},
    collections::BTreeMap,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{
    errors::ArgumentError,
    types::{Injectable, Instance, TypeInfo},
};

/// A value usable as a provider argument.
///
/// Requests are deduplicated by comparing and hashing their arguments, so only values
/// which are `Hash + Eq` can be passed. Anything else is rejected when the crate using it
/// is compiled.
pub trait ArgValue: Any + Send + Sync + Debug {
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn type_name(&self) -> &'static str;
    fn dyn_eq(&self, other: &dyn ArgValue) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T: Any + Send + Sync + Debug + Hash + Eq> ArgValue for T {
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn dyn_eq(&self, other: &dyn ArgValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        // Values of different types never collide structurally
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Type erased provider argument with structural equality
#[derive(Clone)]
pub struct Arg(Arc<dyn ArgValue>);

impl Arg {
    pub fn new<T: ArgValue>(value: T) -> Self {
        // Avoid wrapping an already erased argument a second time
        if let Some(arg) = (&value as &dyn Any).downcast_ref::<Arg>() {
            return arg.clone();
        }
        Arg(Arc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub(crate) fn to_instance(&self) -> Instance {
        let info = TypeInfo {
            type_name: self.0.type_name(),
            type_id: Any::type_id(self.0.as_any()),
        };
        Instance::from_parts(info, self.0.clone().into_any())
    }
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(&*other.0)
    }
}
impl Eq for Arg {}

impl Hash for Arg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

/// Positional and named arguments of a provider call
///
/// Named arguments are kept sorted, so the order they were given in does not affect
/// equality.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Args {
    pub(crate) positional: Vec<Arg>,
    pub(crate) named: BTreeMap<String, Arg>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument
    pub fn arg<T: ArgValue>(mut self, value: T) -> Self {
        self.positional.push(Arg::new(value));
        self
    }

    /// Sets a named argument, replacing an earlier value for the same name
    pub fn named<T: ArgValue>(mut self, name: impl Into<String>, value: T) -> Self {
        self.named.insert(name.into(), Arg::new(value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    pub fn positional(&self) -> &[Arg] {
        &self.positional
    }

    pub fn named_args(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.named.iter().map(|(name, arg)| (name.as_str(), arg))
    }
}

impl Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = self.positional.iter().map(|arg| format!("{arg:?}")).collect();
        parts.extend(self.named.iter().map(|(name, arg)| format!("{name}={arg:?}")));
        f.write_str(&parts.join(", "))
    }
}

/// The final arguments a provider is invoked with
///
/// Every parameter of the provider has exactly one value: an explicit call argument, a
/// plain default, or the resolved value of a dependency.
pub struct BoundArgs {
    provider: &'static str,
    values: Vec<(&'static str, Instance)>,
}

impl BoundArgs {
    pub(crate) fn new(provider: &'static str, values: Vec<(&'static str, Instance)>) -> Self {
        Self { provider, values }
    }

    fn instance(&self, name: &str) -> Result<&Instance, ArgumentError> {
        self.values
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, instance)| instance)
            .ok_or_else(|| ArgumentError::Missing {
                provider: self.provider,
                name: name.to_string(),
            })
    }

    /// Shared handle to the value bound to `name`
    pub fn get<T: Injectable>(&self, name: &str) -> Result<Arc<T>, ArgumentError> {
        self.instance(name)?
            .downcast::<T>()
            .map_err(|actual_type| ArgumentError::DowncastFailed {
                name: name.to_string(),
                required_type: std::any::type_name::<T>(),
                actual_type,
            })
    }

    pub fn get_ref<T: Injectable>(&self, name: &str) -> Result<&T, ArgumentError> {
        self.instance(name)?
            .downcast_ref::<T>()
            .map_err(|actual_type| ArgumentError::DowncastFailed {
                name: name.to_string(),
                required_type: std::any::type_name::<T>(),
                actual_type,
            })
    }

    /// Copy of the value bound to `name`
    pub fn value<T: Injectable + Clone>(&self, name: &str) -> Result<T, ArgumentError> {
        self.get_ref::<T>(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
