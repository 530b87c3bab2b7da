//! Per-query evaluator cache.
//!
//! One entry per AST node, indexed by [`NodeId`]. An entry moves
//! `Uninitialized -> InProgress -> Done`; finding an entry `InProgress` when
//! its result is requested means the node depends on itself. The cache is
//! owned by exactly one query, so entry transitions never race.

use ahash::AHashSet;

use crate::ast::{AstGraph, NodeId};
use crate::error::{EvalError, EvalResult};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    #[default]
    Uninitialized,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub state: EntryState,
    pub value: Option<Value>,
    /// How many times the node's rule has run since the cache was created.
    pub evaluations: u32,
}

#[derive(Debug, Clone, Default)]
pub struct EvaluatorCache {
    entries: Vec<CacheEntry>,
}

impl EvaluatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn slot(&mut self, node: NodeId) -> &mut CacheEntry {
        if node.index() >= self.entries.len() {
            self.entries.resize_with(node.index() + 1, CacheEntry::default);
        }
        &mut self.entries[node.index()]
    }

    pub fn state(&self, node: NodeId) -> EntryState {
        self.entries
            .get(node.index())
            .map(|e| e.state)
            .unwrap_or_default()
    }

    pub fn evaluations(&self, node: NodeId) -> u32 {
        self.entries
            .get(node.index())
            .map(|e| e.evaluations)
            .unwrap_or(0)
    }

    pub fn value(&self, node: NodeId) -> Option<&Value> {
        self.entries.get(node.index()).and_then(|e| e.value.as_ref())
    }

    /// Start evaluating `node`. Returns the memoized value when the entry is
    /// done; otherwise marks it in progress and returns `None`.
    pub fn begin(&mut self, node: NodeId) -> EvalResult<Option<Value>> {
        let entry = self.slot(node);
        match entry.state {
            EntryState::Done => Ok(entry.value.clone()),
            EntryState::InProgress => Err(EvalError::CyclicEvaluation { node }),
            EntryState::Uninitialized => {
                entry.state = EntryState::InProgress;
                entry.evaluations += 1;
                Ok(None)
            }
        }
    }

    pub fn finish(&mut self, node: NodeId, value: Value) {
        let entry = self.slot(node);
        entry.state = EntryState::Done;
        entry.value = Some(value);
    }

    /// Evaluation failed; the node may be tried again.
    pub fn abort(&mut self, node: NodeId) {
        let entry = self.slot(node);
        entry.state = EntryState::Uninitialized;
        entry.value = None;
    }

    /// Return every node reachable from `root` to `Uninitialized`. Entries
    /// currently in progress are left alone so an enclosing evaluation can
    /// still finish (and still detect self-dependency).
    pub fn reset_from(&mut self, ast: &AstGraph, root: NodeId) {
        self.reset_reachable(ast, root, true);
    }

    /// Like [`EvaluatorCache::reset_from`], but `InProgress` entries are reset
    /// too. Only valid between evaluations, e.g. after one was unwound.
    pub fn reset_all_from(&mut self, ast: &AstGraph, root: NodeId) {
        self.reset_reachable(ast, root, false);
    }

    fn reset_reachable(&mut self, ast: &AstGraph, root: NodeId, keep_in_progress: bool) {
        let mut seen = AHashSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if let Some(entry) = self.entries.get_mut(node.index()) {
                if !(keep_in_progress && entry.state == EntryState::InProgress) {
                    entry.state = EntryState::Uninitialized;
                    entry.value = None;
                }
            }
            if let Ok(n) = ast.get(node) {
                stack.extend(n.children());
            }
        }
    }

    /// Forget every memoized value.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.state = EntryState::Uninitialized;
            entry.value = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstNode;

    #[test]
    fn entry_lifecycle() {
        let mut ast = AstGraph::new();
        let id = ast.literal(1i64);
        let mut cache = EvaluatorCache::new();

        assert_eq!(cache.state(id), EntryState::Uninitialized);
        assert!(cache.begin(id).unwrap().is_none());
        assert_eq!(cache.state(id), EntryState::InProgress);
        assert!(matches!(
            cache.begin(id),
            Err(EvalError::CyclicEvaluation { node }) if node == id
        ));
        cache.finish(id, Value::Int(1));
        assert_eq!(cache.begin(id).unwrap(), Some(Value::Int(1)));
        assert_eq!(cache.evaluations(id), 1);
    }

    #[test]
    fn reset_walks_children_and_skips_in_progress() {
        let mut ast = AstGraph::new();
        let leaf = ast.literal(true);
        let not = ast.add(AstNode::Not(leaf));
        let other = ast.literal(false);
        let mut cache = EvaluatorCache::new();

        for id in [leaf, not, other] {
            cache.begin(id).unwrap();
            cache.finish(id, Value::Bool(true));
        }
        cache.reset_from(&ast, not);
        assert_eq!(cache.state(leaf), EntryState::Uninitialized);
        assert_eq!(cache.state(not), EntryState::Uninitialized);
        assert_eq!(cache.state(other), EntryState::Done);

        cache.begin(not).unwrap();
        cache.reset_from(&ast, not);
        assert_eq!(cache.state(not), EntryState::InProgress);
    }

    #[test]
    fn full_reset_clears_abandoned_entries() {
        let mut ast = AstGraph::new();
        let leaf = ast.literal(true);
        let not = ast.add(AstNode::Not(leaf));
        let mut cache = EvaluatorCache::new();

        // an evaluation unwound after marking both nodes
        cache.begin(not).unwrap();
        cache.begin(leaf).unwrap();
        cache.reset_all_from(&ast, not);
        assert_eq!(cache.state(not), EntryState::Uninitialized);
        assert_eq!(cache.state(leaf), EntryState::Uninitialized);
        assert!(cache.begin(not).unwrap().is_none());
    }
}
