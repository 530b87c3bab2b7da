//! Parallel multi-query scheduler.
//!
//! Queries form a dependency DAG. A query becomes ready when every query it
//! depends on has finished; ready queries run on a fixed-size worker pool and
//! their results land in the [`SharedEnvironment`] under the query name.
//!
//! Scheduling state (indegrees, statuses, the failure slot) sits behind one
//! `parking_lot::Mutex`. Query bodies run outside the lock. The calling
//! thread acts as the collector: it waits on a condition variable until all
//! DAG sinks are done, or until a failure was captured and the running
//! queries have drained.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex};
use pathwise_graph::GraphAccess;

use crate::config::SchedulerConfig;
use crate::env::SharedEnvironment;
use crate::error::{EvalError, EvalResult};
use crate::query::Query;
use crate::value::Value;

/// Work the scheduler can run.
pub trait QueryBody: Send {
    fn run(&mut self, graph: &dyn GraphAccess, env: &SharedEnvironment) -> EvalResult<Value>;
}

impl QueryBody for Query {
    fn run(&mut self, graph: &dyn GraphAccess, env: &SharedEnvironment) -> EvalResult<Value> {
        self.reset_to_initial_state();
        self.evaluate(graph, Some(env))
    }
}

impl<F> QueryBody for F
where
    F: FnMut(&dyn GraphAccess, &SharedEnvironment) -> EvalResult<Value> + Send,
{
    fn run(&mut self, graph: &dyn GraphAccess, env: &SharedEnvironment) -> EvalResult<Value> {
        self(graph, env)
    }
}

// ============================================================================
// Dependency graph
// ============================================================================

struct QueryNode {
    name: String,
    body: Option<Box<dyn QueryBody>>,
    successors: Vec<usize>,
    predecessors: Vec<usize>,
}

/// Queries and their "successor depends on predecessor" edges.
#[derive(Default)]
pub struct DependencyGraph {
    nodes: Vec<QueryNode>,
    index: AHashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    pub fn add_query(
        &mut self,
        name: impl Into<String>,
        body: impl QueryBody + 'static,
    ) -> EvalResult<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(EvalError::DuplicateQuery(name));
        }
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(QueryNode {
            name,
            body: Some(Box::new(body)),
            successors: Vec::new(),
            predecessors: Vec::new(),
        });
        Ok(())
    }

    /// `successor` may only start after `predecessor` finished.
    pub fn add_dependency(&mut self, successor: &str, predecessor: &str) -> EvalResult<()> {
        let s = self.position(successor)?;
        let p = self.position(predecessor)?;
        if !self.nodes[p].successors.contains(&s) {
            self.nodes[p].successors.push(s);
            self.nodes[s].predecessors.push(p);
        }
        Ok(())
    }

    /// Names of the queries `name` depends on.
    pub fn dependencies_of(&self, name: &str) -> EvalResult<Vec<&str>> {
        let i = self.position(name)?;
        Ok(self.nodes[i]
            .predecessors
            .iter()
            .map(|&p| self.nodes[p].name.as_str())
            .collect())
    }

    fn position(&self, name: &str) -> EvalResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| EvalError::UnknownQuery(name.to_string()))
    }

    /// Kahn ordering; fails with the names of the queries left on a cycle.
    pub fn topological_order(&self) -> EvalResult<Vec<String>> {
        let mut indegree: Vec<usize> = self.nodes.iter().map(|n| n.predecessors.len()).collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &s in &self.nodes[i].successors {
                indegree[s] -= 1;
                if indegree[s] == 0 {
                    queue.push_back(s);
                }
            }
        }
        if order.len() < self.nodes.len() {
            let queries = (0..self.nodes.len())
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.nodes[i].name.clone())
                .collect();
            return Err(EvalError::CyclicDependency { queries });
        }
        Ok(order
            .into_iter()
            .map(|i| self.nodes[i].name.clone())
            .collect())
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("queries", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub struct ScheduleReport {
    pub statuses: Vec<(String, QueryStatus)>,
    pub failure: Option<EvalError>,
}

impl ScheduleReport {
    pub fn status(&self, name: &str) -> Option<QueryStatus> {
        self.statuses
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }

    pub fn into_result(self) -> EvalResult<()> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct ScheduleState {
    indegree: Vec<usize>,
    status: Vec<QueryStatus>,
    bodies: Vec<Option<Box<dyn QueryBody>>>,
    /// Dispatched but not yet finished.
    outstanding: usize,
    sinks_remaining: usize,
    failure: Option<EvalError>,
}

struct Shared<'g> {
    state: Mutex<ScheduleState>,
    changed: Condvar,
    graph: &'g dyn GraphAccess,
    env: &'g SharedEnvironment,
    names: Vec<String>,
    successors: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Default)]
pub struct ParallelScheduler {
    config: SchedulerConfig,
}

impl ParallelScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every query in `dag`, blocking until all finished or the first
    /// failure has been captured and running queries drained.
    pub fn run(
        &self,
        graph: &dyn GraphAccess,
        dag: &mut DependencyGraph,
        env: &SharedEnvironment,
    ) -> EvalResult<()> {
        self.run_with_report(graph, dag, env).into_result()
    }

    pub fn run_with_report(
        &self,
        graph: &dyn GraphAccess,
        dag: &mut DependencyGraph,
        env: &SharedEnvironment,
    ) -> ScheduleReport {
        let pending = || {
            dag.nodes
                .iter()
                .map(|n| (n.name.clone(), QueryStatus::Pending))
                .collect::<Vec<_>>()
        };
        if let Err(err) = dag.topological_order() {
            tracing::warn!(error = %err, "rejecting query batch");
            return ScheduleReport {
                statuses: pending(),
                failure: Some(err),
            };
        }
        let workers = self.config.worker_count();
        let prefix = self.config.thread_name_prefix.clone();
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(err) => {
                return ScheduleReport {
                    statuses: pending(),
                    failure: Some(EvalError::WorkerPool(err.to_string())),
                }
            }
        };

        let n = dag.nodes.len();
        let shared = Shared {
            state: Mutex::new(ScheduleState {
                indegree: dag.nodes.iter().map(|q| q.predecessors.len()).collect(),
                status: vec![QueryStatus::Pending; n],
                bodies: dag.nodes.iter_mut().map(|q| q.body.take()).collect(),
                outstanding: 0,
                sinks_remaining: dag.nodes.iter().filter(|q| q.successors.is_empty()).count(),
                failure: None,
            }),
            changed: Condvar::new(),
            graph,
            env,
            names: dag.nodes.iter().map(|q| q.name.clone()).collect(),
            successors: dag.nodes.iter().map(|q| q.successors.clone()).collect(),
        };
        tracing::info!(queries = n, workers, "scheduler started");

        pool.in_place_scope(|scope| {
            let ready: Vec<usize> = {
                let mut st = shared.state.lock();
                let ready: Vec<usize> = (0..n).filter(|&i| st.indegree[i] == 0).collect();
                for &i in &ready {
                    st.status[i] = QueryStatus::Ready;
                }
                st.outstanding += ready.len();
                ready
            };
            for i in ready {
                spawn_query(scope, &shared, i);
            }

            // Collector.
            let mut st = shared.state.lock();
            while !(st.sinks_remaining == 0 || (st.failure.is_some() && st.outstanding == 0)) {
                shared.changed.wait(&mut st);
            }
        });

        let mut st = shared.state.into_inner();
        for (node, body) in dag.nodes.iter_mut().zip(st.bodies.drain(..)) {
            node.body = body;
        }
        for (i, status) in st.status.iter_mut().enumerate() {
            if matches!(status, QueryStatus::Pending | QueryStatus::Ready) {
                tracing::warn!(query = %shared.names[i], "query cancelled");
                *status = QueryStatus::Cancelled;
            }
        }
        let completed = st
            .status
            .iter()
            .filter(|s| **s == QueryStatus::Done)
            .count();
        tracing::info!(
            completed,
            failed = st.failure.is_some(),
            "scheduler finished"
        );
        ScheduleReport {
            statuses: shared.names.into_iter().zip(st.status).collect(),
            failure: st.failure,
        }
    }
}

fn spawn_query<'s>(scope: &rayon::Scope<'s>, shared: &'s Shared<'s>, idx: usize) {
    scope.spawn(move |scope| run_query(scope, shared, idx));
}

fn run_query<'s>(scope: &rayon::Scope<'s>, shared: &'s Shared<'s>, idx: usize) {
    let name = &shared.names[idx];
    let body = {
        let mut st = shared.state.lock();
        if st.failure.is_some() {
            st.status[idx] = QueryStatus::Cancelled;
            st.outstanding -= 1;
            shared.changed.notify_all();
            tracing::warn!(query = %name, "query cancelled");
            return;
        }
        st.status[idx] = QueryStatus::Running;
        st.bodies[idx].take()
    };

    tracing::trace!(query = %name, "query dispatched");
    let (body, result) = match body {
        Some(mut body) => {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                body.run(shared.graph, shared.env)
            }));
            let result = match outcome {
                Ok(Ok(value)) => shared.env.insert_new(name, value),
                Ok(Err(err)) => Err(err),
                Err(payload) => Err(EvalError::QueryPanicked {
                    query: name.clone(),
                    message: panic_message(payload.as_ref()),
                }),
            };
            (Some(body), result)
        }
        None => (
            None,
            Err(EvalError::UnknownQuery(format!("{name} (no body)"))),
        ),
    };

    let ready = {
        let mut st = shared.state.lock();
        st.bodies[idx] = body;
        st.outstanding -= 1;
        let mut ready = Vec::new();
        match result {
            Ok(()) => {
                st.status[idx] = QueryStatus::Done;
                if shared.successors[idx].is_empty() {
                    st.sinks_remaining -= 1;
                }
                if st.failure.is_none() {
                    for &s in &shared.successors[idx] {
                        st.indegree[s] -= 1;
                        if st.indegree[s] == 0 {
                            st.status[s] = QueryStatus::Ready;
                            ready.push(s);
                        }
                    }
                    st.outstanding += ready.len();
                }
            }
            Err(err) => {
                st.status[idx] = QueryStatus::Failed;
                tracing::warn!(query = %name, error = %err, "query failed");
                if st.failure.is_none() {
                    st.failure = Some(match err {
                        panicked @ EvalError::QueryPanicked { .. } => panicked,
                        err => EvalError::QueryFailed {
                            query: name.clone(),
                            source: Box::new(err),
                        },
                    });
                }
            }
        }
        shared.changed.notify_all();
        ready
    };
    for s in ready {
        spawn_query(scope, shared, s);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
