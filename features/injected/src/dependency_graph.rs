use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
    binder::ResolutionContext, cache::ShapeCache, errors::ResolveError, request::Request,
};

/// Default maximum length of a dependency chain
pub const MAX_RESOLUTION_DEPTH: usize = 100;

/// Dependency graph of a single resolution
///
/// Maps every request needed to resolve the root to the requests it directly depends on.
/// Seeded requests are leaves which are never expanded.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    root: Request,
    map: HashMap<Request, HashSet<Request>>,
}

impl DependencyGraph {
    /// Expands `root` into the graph of everything needed to resolve it
    ///
    /// Nothing is executed. Dependencies whose parameter is supplied through the call
    /// arguments are not part of the graph.
    pub(crate) fn build(
        root: &Request,
        known: &ResolutionContext,
        cache: &ShapeCache,
        max_depth: usize,
    ) -> Result<Self, ResolveError> {
        let mut graph = Self {
            root: root.clone(),
            map: HashMap::new(),
        };

        let mut dependency_chain = Vec::new();
        graph.expand(root, known, cache, max_depth, &mut dependency_chain)?;

        tracing::trace!("Built dependency graph of '{root}' with {} requests", graph.len());
        Ok(graph)
    }

    fn expand(
        &mut self,
        request: &Request,
        known: &ResolutionContext,
        cache: &ShapeCache,
        max_depth: usize,
        dependency_chain: &mut Vec<Request>,
    ) -> Result<(), ResolveError> {
        // Circular Dependency Check
        if let Some(start) = dependency_chain.iter().position(|other| other == request) {
            let mut chain = dependency_chain[start..].to_vec();
            chain.push(request.clone()); // Add current so chain is complete

            let to = dependency_chain
                .last()
                .cloned()
                .expect("must have entries");
            return Err(DependencyGraphError::CircularDependency {
                from: request.clone(),
                to,
                chain,
            }
            .into());
        }

        // Skip other checks if already expanded
        if self.map.contains_key(request) {
            return Ok(());
        }

        if dependency_chain.len() >= max_depth {
            return Err(DependencyGraphError::MaxDepthExceeded {
                request: request.clone(),
                max_depth,
            }
            .into());
        }

        let dependencies: HashSet<Request> = cache
            .dependencies(request)?
            .iter()
            .filter(|dependency| !known.contains_key(*dependency))
            .cloned()
            .collect();

        dependency_chain.push(request.clone());
        for dependency in &dependencies {
            self.expand(dependency, known, cache, max_depth, dependency_chain)?;
        }
        dependency_chain.pop();

        self.map.insert(request.clone(), dependencies);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn from_map(root: Request, map: HashMap<Request, HashSet<Request>>) -> Self {
        Self { root, map }
    }

    pub fn root(&self) -> &Request {
        &self.root
    }

    /// Direct dependencies of `request`, if it is part of the graph
    pub fn dependencies(&self, request: &Request) -> Option<&HashSet<Request>> {
        self.map.get(request)
    }

    pub fn contains(&self, request: &Request) -> bool {
        self.map.contains_key(request)
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.map.keys()
    }

    /// Number of distinct requests
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Request, &HashSet<Request>)> {
        self.map.iter()
    }

    /// Renders the graph in Graphviz DOT format, edges pointing at dependencies
    pub fn to_dot(&self) -> String {
        let mut nodes: Vec<(String, &Request)> = self
            .map
            .keys()
            .map(|request| (request.to_string(), request))
            .collect();
        nodes.sort_by(|(a, _), (b, _)| a.cmp(b));

        let positions: HashMap<&Request, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, (_, request))| (*request, i))
            .collect();
        let positions = &positions;

        let mut dot = String::from("digraph dependencies {\n");
        for (i, (label, _)) in nodes.iter().enumerate() {
            let label = label.replace('\\', "\\\\").replace('"', "\\\"");
            dot.push_str(&format!("    n{i} [label=\"{label}\"];\n"));
        }

        let mut edges: Vec<(usize, usize)> = self
            .map
            .iter()
            .flat_map(|(request, dependencies)| {
                let from = positions[request];
                dependencies
                    .iter()
                    .map(move |dependency| (from, positions[dependency]))
            })
            .collect();
        edges.sort_unstable();
        for (from, to) in edges {
            dot.push_str(&format!("    n{from} -> n{to};\n"));
        }

        dot.push_str("}\n");
        dot
    }
}

#[derive(Error, Debug, Clone)]
pub enum DependencyGraphError {
    #[error("A Circular Dependency exists between '{from}' and '{to}' through {chain:?}")]
    CircularDependency {
        from: Request,
        to: Request,
        chain: Vec<Request>,
    },
    #[error("Resolving '{request}' exceeds the maximum dependency depth of {max_depth}")]
    MaxDepthExceeded { request: Request, max_depth: usize },
    #[error("The dependency graph has no valid order, {remaining} requests are never ready")]
    NoValidOrder { remaining: usize },
}
