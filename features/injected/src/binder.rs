use std::collections::HashMap;

use crate::{
    args::{Arg, BoundArgs},
    errors::BindError,
    provider::ParamDefault,
    request::Request,
    types::Instance,
};

/// Resolved values of one resolution, by request
pub(crate) type ResolutionContext = HashMap<Request, Instance>;

/// Where the value of a parameter comes from
pub(crate) enum Binding<'a> {
    /// Passed by the caller
    Explicit(&'a Arg),
    /// The declared default of the parameter
    Default(&'a ParamDefault),
    /// Neither passed nor defaulted
    Unbound,
}

/// Binds the call arguments of `request` to its provider's parameters
///
/// Positional arguments fill parameters in order, named arguments by name, declared
/// defaults fill the rest. Required parameters may stay unbound.
pub(crate) fn bind_partial(request: &Request) -> Result<Vec<Binding<'_>>, BindError> {
    let provider = &request.provider;
    let parameters = &provider.definition()?.parameters;
    let args = &request.args;

    if args.positional.len() > parameters.len() {
        return Err(BindError::TooManyPositional {
            provider: provider.name,
            max: parameters.len(),
            given: args.positional.len(),
        });
    }

    let mut bindings: Vec<Binding> = parameters.iter().map(|_| Binding::Unbound).collect();
    for (binding, arg) in bindings.iter_mut().zip(&args.positional) {
        *binding = Binding::Explicit(arg);
    }

    for (name, arg) in &args.named {
        let Some(index) = parameters
            .iter()
            .position(|param| param.name == name.as_str())
        else {
            return Err(BindError::UnexpectedArgument {
                provider: provider.name,
                name: name.clone(),
            });
        };

        if matches!(bindings[index], Binding::Explicit(_)) {
            return Err(BindError::MultipleValues {
                provider: provider.name,
                name: parameters[index].name,
            });
        }
        bindings[index] = Binding::Explicit(arg);
    }

    for (binding, param) in bindings.iter_mut().zip(parameters) {
        if !matches!(binding, Binding::Unbound) {
            continue;
        }
        if let Some(default) = &param.default {
            *binding = Binding::Default(default);
        }
    }

    Ok(bindings)
}

/// The requests `request` directly depends on
///
/// Only dependencies whose parameter is not supplied by the call arguments count.
pub(crate) fn dependencies(request: &Request) -> Result<Vec<Request>, BindError> {
    let dependencies = bind_partial(request)?
        .into_iter()
        .filter_map(|binding| match binding {
            Binding::Default(ParamDefault::Depends(dependency)) => Some(dependency.clone()),
            _ => None,
        })
        .collect();

    Ok(dependencies)
}

/// Binds the final arguments to invoke the provider of `request` with
///
/// # Panics
///
/// If a dependency of `request` has not been resolved into `context` yet. The scheduler
/// never dispatches a request before all of its dependencies are committed.
pub(crate) fn bind(request: &Request, context: &ResolutionContext) -> Result<BoundArgs, BindError> {
    let provider = &request.provider;
    let parameters = &provider.definition()?.parameters;
    let bindings = bind_partial(request)?;

    let mut values = Vec::with_capacity(bindings.len());
    for (param, binding) in parameters.iter().zip(bindings) {
        let value = match binding {
            Binding::Explicit(arg) | Binding::Default(ParamDefault::Value(arg)) => {
                arg.to_instance()
            }
            Binding::Default(ParamDefault::Depends(dependency)) => context
                .get(dependency)
                .cloned()
                .unwrap_or_else(|| {
                    panic!("'{dependency}' needed by '{request}' was dispatched before resolved")
                }),
            Binding::Unbound => {
                return Err(BindError::MissingArgument {
                    provider: provider.name,
                    name: param.name,
                })
            }
        };
        values.push((param.name, value));
    }

    Ok(BoundArgs::new(provider.name, values))
}
