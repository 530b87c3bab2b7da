//! Automaton simulation over the graph.
//!
//! Traversal is a breadth-first search over `(vertex, state)` pairs. Each
//! pair is enqueued at most once, so the search terminates on any graph and
//! any automaton, epsilon cycles included. A vertex is in the result when it
//! is visited together with a final state.

use std::collections::VecDeque;

use ahash::AHashMap;
use pathwise_graph::{Direction, EdgeRef, GraphAccess, VertexId};
use roaring::RoaringBitmap;

use crate::automaton::{Nfa, StateId, Transition};
use crate::config::TraversalLimits;
use crate::error::{EvalError, EvalResult};
use crate::eval::Evaluator;

#[derive(Debug, Clone, Copy)]
struct Step {
    prev: Option<(VertexId, StateId)>,
    edge: Option<EdgeRef>,
    hops: u32,
}

struct Traversal {
    accepted: RoaringBitmap,
    steps: AHashMap<(VertexId, StateId), Step>,
}

pub struct PathEvaluator<'n> {
    nfa: &'n Nfa,
    limits: TraversalLimits,
}

impl<'n> PathEvaluator<'n> {
    pub fn new(nfa: &'n Nfa) -> Self {
        Self {
            nfa,
            limits: TraversalLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Vertices reachable from `start` along an accepted path.
    pub fn reachable(
        &self,
        start: &RoaringBitmap,
        ev: &mut Evaluator<'_>,
    ) -> EvalResult<RoaringBitmap> {
        Ok(self.traverse(start, ev, false)?.accepted)
    }

    /// Vertices from which some vertex of `target` is reachable.
    pub fn reachable_backward(
        &self,
        target: &RoaringBitmap,
        ev: &mut Evaluator<'_>,
    ) -> EvalResult<RoaringBitmap> {
        let reversed = self.nfa.reverse();
        PathEvaluator::new(&reversed)
            .with_limits(self.limits)
            .reachable(target, ev)
    }

    pub fn exists(
        &self,
        start: &RoaringBitmap,
        target: &RoaringBitmap,
        ev: &mut Evaluator<'_>,
    ) -> EvalResult<bool> {
        if target.is_empty() {
            return Ok(false);
        }
        Ok(self.reachable(start, ev)?.intersection_len(target) > 0)
    }

    /// Reachable vertices plus one shortest accepted path to each.
    pub fn path_system(
        &self,
        start: &RoaringBitmap,
        ev: &mut Evaluator<'_>,
    ) -> EvalResult<PathSystem> {
        let traversal = self.traverse(start, ev, true)?;
        Ok(PathSystem {
            roots: start.clone(),
            reachable: traversal.accepted,
            steps: traversal.steps,
            finals: self.nfa.finals(),
        })
    }

    fn traverse(
        &self,
        start: &RoaringBitmap,
        ev: &mut Evaluator<'_>,
        record: bool,
    ) -> EvalResult<Traversal> {
        let graph = ev.graph();
        let nfa = self.nfa;
        let mut visited: Vec<RoaringBitmap> = vec![RoaringBitmap::new(); nfa.state_count()];
        let mut visited_pairs = 0usize;
        let mut out = Traversal {
            accepted: RoaringBitmap::new(),
            steps: AHashMap::new(),
        };
        let mut queue: VecDeque<(VertexId, StateId, u32)> = VecDeque::new();

        let mut visit = |v: VertexId,
                         s: StateId,
                         step: Step,
                         queue: &mut VecDeque<(VertexId, StateId, u32)>,
                         out: &mut Traversal|
         -> EvalResult<()> {
            if !visited[s.index()].insert(v) {
                return Ok(());
            }
            visited_pairs += 1;
            if let Some(limit) = self.limits.max_visited {
                if visited_pairs > limit {
                    return Err(EvalError::TraversalLimit { limit });
                }
            }
            if nfa.is_final(s) {
                out.accepted.insert(v);
            }
            if record {
                out.steps.insert((v, s), step);
            }
            queue.push_back((v, s, step.hops));
            Ok(())
        };

        for v in start.iter() {
            if !graph.contains_vertex(v) {
                continue;
            }
            for &s in nfa.epsilon_closure(nfa.initial()) {
                let seed = Step {
                    prev: None,
                    edge: None,
                    hops: 0,
                };
                visit(v, s, seed, &mut queue, &mut out)?;
            }
        }

        while let Some((v, s, hops)) = queue.pop_front() {
            if self.limits.max_hops.is_some_and(|max| hops >= max) {
                continue;
            }
            let consuming: Vec<&Transition> = nfa
                .out_transitions(s)
                .filter(|t| t.kind.consumes_edge())
                .collect();
            if consuming.is_empty() {
                continue;
            }
            let incidences = graph.incidences(v, incidence_direction(&consuming));
            for t in &consuming {
                for &inc in &incidences {
                    if !t.kind.accepts(graph, v, Some(inc), ev)? {
                        continue;
                    }
                    let Some(w) = graph.that(inc) else {
                        continue;
                    };
                    let step = Step {
                        prev: Some((v, s)),
                        edge: Some(inc),
                        hops: hops + 1,
                    };
                    for &next in nfa.epsilon_closure(t.to) {
                        visit(w, next, step, &mut queue, &mut out)?;
                    }
                }
            }
        }

        tracing::debug!(
            start = start.len(),
            accepted = out.accepted.len(),
            visited = visited_pairs,
            "path traversal finished"
        );
        Ok(out)
    }
}

/// Narrowest direction that still covers every transition in `ts`.
fn incidence_direction(ts: &[&Transition]) -> Direction {
    let (mut out, mut inc) = (false, false);
    for t in ts {
        match t.kind.constraint().map(|c| c.direction) {
            Some(Direction::Out) => out = true,
            Some(Direction::In) => inc = true,
            _ => return Direction::Any,
        }
    }
    match (out, inc) {
        (true, false) => Direction::Out,
        (false, true) => Direction::In,
        _ => Direction::Any,
    }
}

// ============================================================================
// Path systems
// ============================================================================

/// Result of a path-system query: for every reached `(vertex, state)` pair
/// the pair it was first reached from and the edge taken.
#[derive(Debug, Clone)]
pub struct PathSystem {
    roots: RoaringBitmap,
    reachable: RoaringBitmap,
    steps: AHashMap<(VertexId, StateId), Step>,
    finals: Vec<StateId>,
}

impl PathSystem {
    pub fn roots(&self) -> &RoaringBitmap {
        &self.roots
    }

    /// Vertices reached in a final state.
    pub fn reachable(&self) -> &RoaringBitmap {
        &self.reachable
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.reachable.contains(v)
    }

    fn best_final(&self, v: VertexId) -> Option<(VertexId, StateId)> {
        self.finals
            .iter()
            .filter_map(|&f| self.steps.get(&(v, f)).map(|step| (step.hops, f)))
            .min()
            .map(|(_, f)| (v, f))
    }

    /// Edge count of the shortest accepted path to `v`.
    pub fn distance(&self, v: VertexId) -> Option<u32> {
        let key = self.best_final(v)?;
        self.steps.get(&key).map(|s| s.hops)
    }

    /// Edges of one shortest accepted path from a root to `v`.
    pub fn path_to(&self, v: VertexId) -> Option<Vec<EdgeRef>> {
        let mut key = self.best_final(v)?;
        let mut edges = Vec::new();
        while let Some(step) = self.steps.get(&key) {
            match (step.prev, step.edge) {
                (Some(prev), Some(edge)) => {
                    edges.push(edge);
                    key = prev;
                }
                _ => break,
            }
        }
        edges.reverse();
        Some(edges)
    }

    /// Root the shortest accepted path to `v` starts from.
    pub fn root_of(&self, v: VertexId) -> Option<VertexId> {
        let mut key = self.best_final(v)?;
        while let Some(Step {
            prev: Some(prev), ..
        }) = self.steps.get(&key)
        {
            key = *prev;
        }
        Some(key.0)
    }
}
