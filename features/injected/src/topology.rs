use std::collections::{HashMap, VecDeque};

use crate::{
    dependency_graph::{DependencyGraph, DependencyGraphError},
    request::Request,
};

/// Incremental topological order over a [DependencyGraph]
///
/// Requests become ready once every dependency is marked done. Each request is handed
/// out exactly once.
pub(crate) struct TopologicalCursor {
    /// Dependencies not done yet, per request
    waiting_on: HashMap<Request, usize>,
    /// Requests depending on a request
    dependents: HashMap<Request, Vec<Request>>,
    ready: VecDeque<Request>,
    in_flight: usize,
    remaining: usize,
}

impl TopologicalCursor {
    /// Prepares the order, failing if the graph contains a cycle
    pub(crate) fn prepare(graph: &DependencyGraph) -> Result<Self, DependencyGraphError> {
        let mut waiting_on = HashMap::with_capacity(graph.len());
        let mut dependents: HashMap<Request, Vec<Request>> = HashMap::new();
        let mut ready = VecDeque::new();

        for (request, dependencies) in graph.iter() {
            if dependencies.is_empty() {
                ready.push_back(request.clone());
            } else {
                waiting_on.insert(request.clone(), dependencies.len());
            }
            for dependency in dependencies {
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(request.clone());
            }
        }

        Self::check(graph.len(), &ready, &waiting_on, &dependents)?;

        Ok(Self {
            waiting_on,
            dependents,
            ready,
            in_flight: 0,
            remaining: graph.len(),
        })
    }

    /// Kahn's algorithm without handing anything out
    fn check(
        total: usize,
        ready: &VecDeque<Request>,
        waiting_on: &HashMap<Request, usize>,
        dependents: &HashMap<Request, Vec<Request>>,
    ) -> Result<(), DependencyGraphError> {
        let mut waiting_on = waiting_on.clone();
        let mut queue: VecDeque<&Request> = ready.iter().collect();
        let mut ordered = 0;

        while let Some(request) = queue.pop_front() {
            ordered += 1;
            for dependent in dependents.get(request).into_iter().flatten() {
                if let Some(count) = waiting_on.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if ordered == total {
            Ok(())
        } else {
            Err(DependencyGraphError::NoValidOrder {
                remaining: total - ordered,
            })
        }
    }

    /// Takes every request whose dependencies are all done
    pub(crate) fn get_ready(&mut self) -> Vec<Request> {
        let ready: Vec<Request> = self.ready.drain(..).collect();
        self.in_flight += ready.len();
        ready
    }

    /// Marks a handed out request as done, which may make its dependents ready
    pub(crate) fn done(&mut self, request: &Request) {
        self.in_flight -= 1;
        self.remaining -= 1;

        for dependent in self.dependents.remove(request).into_iter().flatten() {
            let Some(count) = self.waiting_on.get_mut(&dependent) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                self.waiting_on.remove(&dependent);
                self.ready.push_back(dependent);
            }
        }
    }

    /// Whether anything is left to hand out or to be marked done
    pub(crate) fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Requests handed out but not done
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Requests not done yet
    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        args::Args,
        binder::ResolutionContext,
        cache::ShapeCache,
        dependency_graph::MAX_RESOLUTION_DEPTH,
        provider::{provider, Provider},
        request::depends,
    };

    fn request<T>(provider: &Provider<T>) -> Request {
        Request::new(provider.inner.clone(), Args::new())
    }

    fn graph_of<T>(root: &Provider<T>) -> DependencyGraph {
        DependencyGraph::build(
            &request(root),
            &ResolutionContext::new(),
            &ShapeCache::new(),
            MAX_RESOLUTION_DEPTH,
        )
        .unwrap()
    }

    #[test]
    fn orders_dependencies_first() {
        let base = provider("base").build_sync(|_| Ok(0_u8));
        let left = provider("left")
            .depends("base", depends(&base))
            .build_sync(|_| Ok(0_u8));
        let right = provider("right")
            .depends("base", depends(&base))
            .build_sync(|_| Ok(0_u8));
        let top = provider("top")
            .depends("left", depends(&left))
            .depends("right", depends(&right))
            .build_sync(|_| Ok(0_u8));

        let mut cursor = TopologicalCursor::prepare(&graph_of(&top)).unwrap();
        assert!(cursor.is_active());

        assert_eq!(cursor.get_ready(), vec![request(&base)]);
        assert!(cursor.get_ready().is_empty());
        cursor.done(&request(&base));

        let mut middle = cursor.get_ready();
        middle.sort_by_key(|request| request.provider_name());
        assert_eq!(middle, vec![request(&left), request(&right)]);
        assert_eq!(cursor.in_flight(), 2);

        cursor.done(&request(&left));
        assert!(cursor.get_ready().is_empty());
        cursor.done(&request(&right));

        assert_eq!(cursor.get_ready(), vec![request(&top)]);
        cursor.done(&request(&top));
        assert!(!cursor.is_active());
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn single_request_is_ready_immediately() {
        let only = provider("only").build_sync(|_| Ok(0_u8));
        let mut cursor = TopologicalCursor::prepare(&graph_of(&only)).unwrap();

        assert_eq!(cursor.get_ready(), vec![request(&only)]);
        cursor.done(&request(&only));
        assert!(!cursor.is_active());
    }

    #[test]
    fn rejects_graph_without_order() {
        let leaf = request(&provider("leaf").build_sync(|_| Ok(0_u8)));
        let ping = request(&provider("ping").build_sync(|_| Ok(0_u8)));
        let pong = request(&provider("pong").build_sync(|_| Ok(0_u8)));

        let map = HashMap::from([
            (leaf.clone(), HashSet::new()),
            (ping.clone(), HashSet::from([leaf.clone(), pong.clone()])),
            (pong.clone(), HashSet::from([ping.clone()])),
        ]);
        let graph = DependencyGraph::from_map(ping, map);

        assert!(matches!(
            TopologicalCursor::prepare(&graph),
            Err(DependencyGraphError::NoValidOrder { remaining: 2 })
        ));
    }
}
