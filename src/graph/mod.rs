//! Directed state graph.
//!
//! Nodes receive the current state and return the updated state. Routing is
//! declared up front with plain edges (`add_edge`) or router functions
//! (`add_conditional_edges`) and validated by [`StateGraph::compile`]. The
//! compiled graph walks from [`START`] until a route reaches [`END`].

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use tracing::debug;

use crate::error::GraphError;

pub const START: &str = "__start__";
pub const END: &str = "__end__";

const DEFAULT_RECURSION_LIMIT: u32 = 25;

/// One step of a graph: state in, updated state out.
#[async_trait]
pub trait Node<S>: Send + Sync {
    async fn run(&self, state: S) -> Result<S, GraphError>;
}

/// Adapts an async closure into a [`Node`].
pub struct FnNode<F>(F);

pub fn node_fn<S, F, Fut>(f: F) -> FnNode<F>
where
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, GraphError>> + Send,
{
    FnNode(f)
}

#[async_trait]
impl<S, F, Fut> Node<S> for FnNode<F>
where
    S: Send + 'static,
    F: Fn(S) -> Fut + Send + Sync,
    Fut: Future<Output = Result<S, GraphError>> + Send,
{
    async fn run(&self, state: S) -> Result<S, GraphError> {
        (self.0)(state).await
    }
}

type Router<S> = dyn Fn(&S) -> String + Send + Sync;

enum Route<S> {
    Direct(String),
    Conditional {
        router: Box<Router<S>>,
        path_map: HashMap<String, String>,
    },
}

impl<S> Route<S> {
    fn targets(&self) -> Vec<&str> {
        match self {
            Route::Direct(to) => vec![to.as_str()],
            Route::Conditional { path_map, .. } => path_map.values().map(String::as_str).collect(),
        }
    }
}

pub struct StateGraph<S> {
    nodes: HashMap<String, Box<dyn Node<S>>>,
    edges: Vec<(String, Route<S>)>,
}

impl<S> Default for StateGraph<S>
where
    S: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
        }
    }

    /// Registers a node. A later registration under the same id replaces it.
    pub fn add_node<N>(&mut self, id: impl Into<String>, node: N) -> &mut Self
    where
        N: Node<S> + 'static,
    {
        self.nodes.insert(id.into(), Box::new(node));
        self
    }

    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), Route::Direct(to.into())));
        self
    }

    /// Routes out of `from` by calling `router` on the state and looking its
    /// answer up in `path_map`.
    pub fn add_conditional_edges<R, I, K, V>(
        &mut self,
        from: impl Into<String>,
        router: R,
        path_map: I,
    ) -> &mut Self
    where
        R: Fn(&S) -> String + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let path_map = path_map
            .into_iter()
            .map(|(key, target)| (key.into(), target.into()))
            .collect();
        self.edges.push((
            from.into(),
            Route::Conditional {
                router: Box::new(router),
                path_map,
            },
        ));
        self
    }

    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        for id in self.nodes.keys() {
            if id == START || id == END {
                return Err(GraphError::ReservedNodeId(id.clone()));
            }
        }

        let mut routes: HashMap<String, Route<S>> = HashMap::new();
        for (from, route) in self.edges {
            if from != START && !self.nodes.contains_key(&from) {
                return Err(GraphError::NodeNotFound(from));
            }
            for target in route.targets() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(GraphError::NodeNotFound(target.to_string()));
                }
            }
            if routes.contains_key(&from) {
                return Err(GraphError::DuplicateRoute(from));
            }
            routes.insert(from, route);
        }

        if !routes.contains_key(START) {
            return Err(GraphError::MissingEntry);
        }

        if let Some(dead_end) = self.nodes.keys().find(|id| !routes.contains_key(*id)) {
            return Err(GraphError::DeadEnd(dead_end.clone()));
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            routes,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        })
    }
}

/// Validated, immutable graph ready for [`CompiledGraph::invoke`].
pub struct CompiledGraph<S> {
    nodes: HashMap<String, Box<dyn Node<S>>>,
    routes: HashMap<String, Route<S>>,
    recursion_limit: u32,
}

impl<S> CompiledGraph<S>
where
    S: Send + 'static,
{
    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub async fn invoke(&self, state: S) -> Result<S, GraphError> {
        let mut state = state;
        let mut current = self.next_after(START, &state)?;
        let mut steps = 0;

        while current != END {
            steps += 1;
            if steps > self.recursion_limit {
                return Err(GraphError::RecursionLimit(self.recursion_limit));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::NodeNotFound(current.clone()))?;
            debug!(node = %current, step = steps, "running graph node");
            state = node.run(state).await?;
            current = self.next_after(&current, &state)?;
        }

        Ok(state)
    }

    fn next_after(&self, from: &str, state: &S) -> Result<String, GraphError> {
        match self.routes.get(from) {
            Some(Route::Direct(to)) => Ok(to.clone()),
            Some(Route::Conditional { router, path_map }) => {
                let route = router(state);
                path_map
                    .get(&route)
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownRoute {
                        node: from.to_string(),
                        route,
                    })
            }
            None => Err(GraphError::DeadEnd(from.to_string())),
        }
    }
}
