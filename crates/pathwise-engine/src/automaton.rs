//! Path-description automata.
//!
//! An [`Nfa`] is an arena: states and transitions are stored in vectors and
//! refer to each other by index, so composition, copying and reversal only
//! shuffle indices. Composition follows the Thompson construction; every
//! splice point is an epsilon transition.
//!
//! Epsilon self-loops are never created. Longer epsilon cycles (from nested
//! iteration) are allowed and handled by the closure computation, which
//! tracks visited states.

use std::fmt;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use ahash::AHashSet;

use crate::error::{EvalError, EvalResult};
use crate::transition::TransitionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(u32);

impl StateId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn offset(self, by: usize) -> Self {
        StateId(self.0 + by as u32)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Process-wide source of state serial numbers.
pub struct StateRegistry;

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(0);

impl StateRegistry {
    pub fn next_serial() -> u32 {
        NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of serials handed out so far.
    pub fn issued() -> u32 {
        NEXT_SERIAL.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct State {
    pub id: StateId,
    pub serial: u32,
    pub is_final: bool,
    /// Indices of outgoing transitions.
    pub out: Vec<usize>,
    /// Indices of incoming transitions.
    pub inc: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
    pub kind: TransitionKind,
}

#[derive(Debug, Clone)]
pub struct Nfa {
    states: Vec<State>,
    transitions: Vec<Transition>,
    initial: StateId,
    closure: OnceLock<Vec<Vec<StateId>>>,
}

impl Nfa {
    /// Automaton with a single state that is both initial and final.
    pub fn epsilon() -> Self {
        let mut nfa = Self {
            states: Vec::new(),
            transitions: Vec::new(),
            initial: StateId(0),
            closure: OnceLock::new(),
        };
        let s = nfa.new_state();
        nfa.set_final(s, true);
        nfa
    }

    /// Automaton accepting exactly one step of `kind`.
    pub fn single(kind: TransitionKind) -> Self {
        let mut nfa = Self::epsilon();
        let start = nfa.initial;
        nfa.set_final(start, false);
        let end = nfa.new_state();
        nfa.set_final(end, true);
        nfa.add_transition(start, end, kind);
        nfa
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.index()]
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn is_final(&self, id: StateId) -> bool {
        self.states[id.index()].is_final
    }

    pub fn finals(&self) -> Vec<StateId> {
        self.states
            .iter()
            .filter(|s| s.is_final)
            .map(|s| s.id)
            .collect()
    }

    /// Outgoing transitions of a state.
    pub fn out_transitions(&self, id: StateId) -> impl Iterator<Item = &Transition> {
        self.states[id.index()]
            .out
            .iter()
            .map(move |&t| &self.transitions[t])
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn new_state(&mut self) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(State {
            id,
            serial: StateRegistry::next_serial(),
            is_final: false,
            out: Vec::new(),
            inc: Vec::new(),
        });
        self.touch();
        id
    }

    pub fn set_final(&mut self, id: StateId, is_final: bool) {
        self.states[id.index()].is_final = is_final;
    }

    pub fn set_initial(&mut self, id: StateId) {
        self.initial = id;
    }

    /// Link `from` to `to`. Returns the transition index.
    pub fn add_transition(&mut self, from: StateId, to: StateId, kind: TransitionKind) -> usize {
        debug_assert!(
            !(kind.is_epsilon() && from == to),
            "epsilon self-loop on {from}"
        );
        let idx = self.transitions.len();
        self.transitions.push(Transition { from, to, kind });
        self.states[from.index()].out.push(idx);
        self.states[to.index()].inc.push(idx);
        self.touch();
        idx
    }

    fn touch(&mut self) {
        self.closure.take();
    }

    /// Move all of `other`'s states and transitions into `self`, returning the
    /// index offset applied to `other`'s state ids.
    fn absorb(&mut self, other: Nfa) -> usize {
        let offset = self.states.len();
        let t_offset = self.transitions.len();
        for mut s in other.states {
            s.id = s.id.offset(offset);
            s.out.iter_mut().for_each(|t| *t += t_offset);
            s.inc.iter_mut().for_each(|t| *t += t_offset);
            self.states.push(s);
        }
        for mut t in other.transitions {
            t.from = t.from.offset(offset);
            t.to = t.to.offset(offset);
            self.transitions.push(t);
        }
        self.touch();
        offset
    }

    // ========================================================================
    // Composition
    // ========================================================================

    /// `self` followed by `next`.
    pub fn concat(mut self, next: Nfa) -> Nfa {
        let finals = self.finals();
        let next_initial = next.initial;
        let offset = self.absorb(next);
        let target = next_initial.offset(offset);
        for f in finals {
            self.set_final(f, false);
            self.add_transition(f, target, TransitionKind::Epsilon);
        }
        self
    }

    /// `self` or `other`, through a fresh initial state.
    pub fn union(mut self, other: Nfa) -> Nfa {
        let first = self.initial;
        let other_initial = other.initial;
        let offset = self.absorb(other);
        let start = self.new_state();
        self.add_transition(start, first, TransitionKind::Epsilon);
        self.add_transition(start, other_initial.offset(offset), TransitionKind::Epsilon);
        self.initial = start;
        self
    }

    /// Zero or more repetitions.
    pub fn star(self) -> Nfa {
        self.iterate(true)
    }

    /// One or more repetitions.
    pub fn plus(self) -> Nfa {
        self.iterate(false)
    }

    fn iterate(mut self, allow_empty: bool) -> Nfa {
        let inner_initial = self.initial;
        let finals = self.finals();
        let start = self.new_state();
        let end = self.new_state();
        self.add_transition(start, inner_initial, TransitionKind::Epsilon);
        for f in finals {
            self.set_final(f, false);
            self.add_transition(f, end, TransitionKind::Epsilon);
            if f != inner_initial {
                self.add_transition(f, inner_initial, TransitionKind::Epsilon);
            }
        }
        if allow_empty {
            self.add_transition(start, end, TransitionKind::Epsilon);
        }
        self.set_final(end, true);
        self.initial = start;
        self
    }

    /// Zero or one occurrence.
    pub fn optional(mut self) -> Nfa {
        let inner_initial = self.initial;
        let start = self.new_state();
        self.add_transition(start, inner_initial, TransitionKind::Epsilon);
        self.set_final(start, true);
        self.initial = start;
        self
    }

    /// `n` copies in sequence; `n == 0` accepts only the empty path.
    pub fn exponent(&self, n: u32) -> Nfa {
        if n == 0 {
            return Nfa::epsilon();
        }
        let mut out = self.copy(true);
        for _ in 1..n {
            out = out.concat(self.copy(true));
        }
        out
    }

    /// Automaton for the transposed path: every transition reversed, initial
    /// and final designations swapped.
    pub fn reverse(&self) -> Nfa {
        let mut out = Nfa {
            states: self
                .states
                .iter()
                .map(|s| State {
                    id: s.id,
                    serial: s.serial,
                    is_final: s.id == self.initial,
                    out: Vec::new(),
                    inc: Vec::new(),
                })
                .collect(),
            transitions: Vec::with_capacity(self.transitions.len()),
            initial: self.initial,
            closure: OnceLock::new(),
        };
        for t in &self.transitions {
            out.add_transition(t.to, t.from, t.kind.reverse());
        }
        match self.finals().as_slice() {
            [only] => out.initial = *only,
            finals => {
                let start = out.new_state();
                for &f in finals {
                    out.add_transition(start, f, TransitionKind::Epsilon);
                }
                out.initial = start;
            }
        }
        out
    }

    /// Deep copy. Constraints are shared; with `register` every state gets a
    /// fresh serial from the [`StateRegistry`].
    pub fn copy(&self, register: bool) -> Nfa {
        let mut out = Nfa {
            states: self.states.clone(),
            transitions: self.transitions.clone(),
            initial: self.initial,
            closure: OnceLock::new(),
        };
        if register {
            for s in &mut out.states {
                s.serial = StateRegistry::next_serial();
            }
        }
        out
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// States reachable from `id` through epsilon transitions, `id` included.
    pub fn epsilon_closure(&self, id: StateId) -> &[StateId] {
        &self.closure.get_or_init(|| self.compute_closures())[id.index()]
    }

    fn compute_closures(&self) -> Vec<Vec<StateId>> {
        let n = self.states.len();
        let mut out = Vec::with_capacity(n);
        let mut seen = vec![false; n];
        for s in &self.states {
            seen.iter_mut().for_each(|b| *b = false);
            let mut closure = Vec::new();
            let mut stack = vec![s.id];
            seen[s.id.index()] = true;
            while let Some(cur) = stack.pop() {
                closure.push(cur);
                for t in self.out_transitions(cur) {
                    if t.kind.is_epsilon() && !seen[t.to.index()] {
                        seen[t.to.index()] = true;
                        stack.push(t.to);
                    }
                }
            }
            closure.sort();
            out.push(closure);
        }
        out
    }

    /// Check structural invariants.
    pub fn validate(&self) -> EvalResult<()> {
        let n = self.states.len();
        if self.initial.index() >= n {
            return Err(EvalError::InvalidAutomaton(format!(
                "initial state {} out of range",
                self.initial
            )));
        }
        for (i, t) in self.transitions.iter().enumerate() {
            if t.from.index() >= n || t.to.index() >= n {
                return Err(EvalError::InvalidAutomaton(format!(
                    "transition {i} ({} -> {}) dangles",
                    t.from, t.to
                )));
            }
            if t.kind.is_epsilon() && t.from == t.to {
                return Err(EvalError::InvalidAutomaton(format!(
                    "epsilon self-loop on {}",
                    t.from
                )));
            }
            if !self.states[t.from.index()].out.contains(&i)
                || !self.states[t.to.index()].inc.contains(&i)
            {
                return Err(EvalError::InvalidAutomaton(format!(
                    "transition {i} missing from adjacency lists"
                )));
            }
        }
        let reachable = self.reachable_states();
        if let Some(f) = self.finals().into_iter().find(|f| !reachable.contains(f)) {
            return Err(EvalError::InvalidAutomaton(format!(
                "final state {f} is unreachable"
            )));
        }
        Ok(())
    }

    fn reachable_states(&self) -> AHashSet<StateId> {
        let mut seen = AHashSet::new();
        let mut stack = vec![self.initial];
        seen.insert(self.initial);
        while let Some(cur) = stack.pop() {
            for t in self.out_transitions(cur) {
                if seen.insert(t.to) {
                    stack.push(t.to);
                }
            }
        }
        seen
    }

    /// Drop parallel transitions with equal symbols. Returns how many were
    /// removed.
    pub fn dedup_transitions(&mut self) -> usize {
        let mut keep: Vec<Transition> = Vec::with_capacity(self.transitions.len());
        for t in &self.transitions {
            let dup = keep
                .iter()
                .any(|k| k.from == t.from && k.to == t.to && k.kind.equal_symbol(&t.kind));
            if !dup {
                keep.push(t.clone());
            }
        }
        let removed = self.transitions.len() - keep.len();
        if removed == 0 {
            return 0;
        }
        for s in &mut self.states {
            s.out.clear();
            s.inc.clear();
        }
        self.transitions.clear();
        for t in keep {
            self.add_transition(t.from, t.to, t.kind);
        }
        removed
    }

    /// Graphviz rendering.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph nfa {\n");
        out.push_str("  rankdir=LR;\n");
        out.push_str("  __start [shape=point];\n");
        for s in &self.states {
            let shape = if s.is_final { "doublecircle" } else { "circle" };
            let _ = writeln!(
                out,
                "  {} [shape={shape}, label=\"{}\\n#{}\"];",
                s.id, s.id, s.serial
            );
        }
        let _ = writeln!(out, "  __start -> {};", self.initial);
        for t in &self.transitions {
            let label = t.kind.to_string().replace('"', "\\\"");
            let _ = writeln!(out, "  {} -> {} [label=\"{label}\"];", t.from, t.to);
        }
        out.push_str("}\n");
        out
    }
}
