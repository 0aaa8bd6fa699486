//! Finite state automata
//!
//! A small automaton engine generic over its transition label. Automata are
//! built as NFAs (with epsilon transitions), converted with the subset
//! construction and then executed deterministically, one input at a time.
//!
//! The transition graph is reference counted: cloning an automaton to get a
//! fresh runtime position is cheap and shares the tables.

use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeSet, VecDeque};
use std::fmt::{self, Debug, Write as _};
use std::hash::Hash;
use std::sync::Arc;

/// Identifier of a state inside one automaton
pub type StateId = usize;

/// Role of a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateType {
    /// The start state
    Start,
    /// The start state, also accepting
    StartEnd,
    /// Neither start nor accepting
    Internal,
    /// An accepting state
    End,
}

impl StateType {
    /// Whether input may end in this state
    pub fn is_accepting(&self) -> bool {
        matches!(self, StateType::StartEnd | StateType::End)
    }

    /// Whether this is the start state
    pub fn is_start(&self) -> bool {
        matches!(self, StateType::Start | StateType::StartEnd)
    }
}

/// Matches runtime input against a transition label
///
/// Exact stepping uses label equality; this trait covers inputs that a label
/// may accept without being equal to it, such as names against wildcards.
pub trait InputMatcher<I: ?Sized> {
    /// Whether the label accepts the input
    fn matches_input(&self, input: &I) -> bool;
}

#[derive(Debug, Clone)]
struct Graph<L> {
    states: Vec<StateType>,
    start: Option<StateId>,
    transitions: Vec<IndexMap<L, Vec<StateId>>>,
    epsilon: Vec<Vec<StateId>>,
}

impl<L> Default for Graph<L> {
    fn default() -> Self {
        Self {
            states: Vec::new(),
            start: None,
            transitions: Vec::new(),
            epsilon: Vec::new(),
        }
    }
}

/// A finite state automaton with its current execution position
#[derive(Clone)]
pub struct Automaton<L> {
    graph: Arc<Graph<L>>,
    current: Option<StateId>,
    last_transition: Option<L>,
}

impl<L> Default for Automaton<L> {
    fn default() -> Self {
        Self {
            graph: Arc::new(Graph::default()),
            current: None,
            last_transition: None,
        }
    }
}

impl<L> Automaton<L>
where
    L: Clone + Eq + Hash + Debug,
{
    /// Create an empty automaton
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Allocate a new state
    ///
    /// Only one start state exists; a second start state is demoted to an
    /// internal (or accepting) state.
    pub fn add_state(&mut self, state_type: StateType) -> StateId {
        let graph = Arc::make_mut(&mut self.graph);
        let id = graph.states.len();
        let state_type = if state_type.is_start() && graph.start.is_some() {
            tracing::warn!("automaton already has a start state, demoting state {}", id);
            if state_type.is_accepting() {
                StateType::End
            } else {
                StateType::Internal
            }
        } else {
            state_type
        };
        if state_type.is_start() {
            graph.start = Some(id);
        }
        graph.states.push(state_type);
        graph.transitions.push(IndexMap::new());
        graph.epsilon.push(Vec::new());
        id
    }

    /// Add a labelled transition, duplicates make the automaton non-deterministic
    pub fn add_transition(&mut self, from: StateId, label: L, to: StateId) {
        let graph = Arc::make_mut(&mut self.graph);
        if let Some(table) = graph.transitions.get_mut(from) {
            let targets = table.entry(label).or_default();
            if !targets.contains(&to) {
                targets.push(to);
            }
        }
    }

    /// Add an epsilon transition
    pub fn add_epsilon_transition(&mut self, from: StateId, to: StateId) {
        let graph = Arc::make_mut(&mut self.graph);
        if let Some(targets) = graph.epsilon.get_mut(from) {
            if !targets.contains(&to) {
                targets.push(to);
            }
        }
    }

    /// Discard all states and transitions
    pub fn clear(&mut self) {
        self.graph = Arc::new(Graph::default());
        self.current = None;
        self.last_transition = None;
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Position execution at the start state
    pub fn reset(&mut self) {
        self.current = self.graph.start;
        self.last_transition = None;
    }

    /// Take the transition labelled `label` from the current state
    ///
    /// On failure the position is unchanged and false is returned.
    pub fn proceed(&mut self, label: &L) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        let target = self.graph.transitions[current]
            .get(label)
            .and_then(|targets| targets.first().copied());
        match target {
            Some(target) => {
                self.current = Some(target);
                self.last_transition = Some(label.clone());
                true
            }
            None => false,
        }
    }

    /// Take the first transition whose label matches `input`
    pub fn proceed_matching<I: ?Sized>(&mut self, input: &I) -> bool
    where
        L: InputMatcher<I>,
    {
        let Some(current) = self.current else {
            return false;
        };
        let matched = self.graph.transitions[current]
            .iter()
            .find(|(label, _)| Self::input_equals_transition(input, label))
            .and_then(|(label, targets)| targets.first().map(|t| (label.clone(), *t)));
        match matched {
            Some((label, target)) => {
                self.current = Some(target);
                self.last_transition = Some(label);
                true
            }
            None => false,
        }
    }

    /// Whether `label` accepts `input`
    pub fn input_equals_transition<I: ?Sized>(input: &I, label: &L) -> bool
    where
        L: InputMatcher<I>,
    {
        label.matches_input(input)
    }

    /// Labels of the transitions leaving the current state
    pub fn possible_transitions(&self) -> Vec<L> {
        match self.current {
            Some(current) => self.graph.transitions[current].keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Whether the current state is accepting
    pub fn in_end_state(&self) -> bool {
        self.current
            .map(|s| self.graph.states[s].is_accepting())
            .unwrap_or(false)
    }

    /// Label of the last successful step
    pub fn last_transition(&self) -> Option<&L> {
        self.last_transition.as_ref()
    }

    /// Current state, None before `reset`
    pub fn current_state(&self) -> Option<StateId> {
        self.current
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Number of states
    pub fn state_count(&self) -> usize {
        self.graph.states.len()
    }

    /// Start state, if one was added
    pub fn start_state(&self) -> Option<StateId> {
        self.graph.start
    }

    /// Role of a state
    pub fn state_type(&self, state: StateId) -> Option<StateType> {
        self.graph.states.get(state).copied()
    }

    /// Whether there are no epsilon transitions and every label has one target
    pub fn is_deterministic(&self) -> bool {
        self.graph.epsilon.iter().all(|e| e.is_empty())
            && self
                .graph
                .transitions
                .iter()
                .all(|table| table.values().all(|targets| targets.len() <= 1))
    }

    /// Run a complete label sequence from the start state
    ///
    /// Works for NFAs as well: all reachable states are tracked at once.
    pub fn accepts(&self, input: &[L]) -> bool {
        let Some(start) = self.graph.start else {
            return false;
        };
        let mut current = self.epsilon_closure(std::iter::once(start).collect());
        for label in input {
            current = self.epsilon_closure(self.move_on(&current, label));
            if current.is_empty() {
                return false;
            }
        }
        current.iter().any(|s| self.graph.states[*s].is_accepting())
    }

    fn epsilon_closure(&self, mut set: BTreeSet<StateId>) -> BTreeSet<StateId> {
        let mut stack: Vec<StateId> = set.iter().copied().collect();
        while let Some(state) = stack.pop() {
            for &next in &self.graph.epsilon[state] {
                if set.insert(next) {
                    stack.push(next);
                }
            }
        }
        set
    }

    fn move_on(&self, set: &BTreeSet<StateId>, label: &L) -> BTreeSet<StateId> {
        set.iter()
            .filter_map(|s| self.graph.transitions[*s].get(label))
            .flatten()
            .copied()
            .collect()
    }

    // =========================================================================
    // Subset construction
    // =========================================================================

    /// Convert to an equivalent deterministic automaton
    ///
    /// Each DFA state stands for the epsilon closure of a set of NFA states
    /// and is accepting iff that set contains an accepting state.
    pub fn to_dfa(&self) -> Automaton<L> {
        let mut dfa = Automaton::new();
        let Some(start) = self.graph.start else {
            return dfa;
        };

        let is_accepting =
            |set: &BTreeSet<StateId>| set.iter().any(|s| self.graph.states[*s].is_accepting());

        let start_set = self.epsilon_closure(std::iter::once(start).collect());
        let start_type = if is_accepting(&start_set) {
            StateType::StartEnd
        } else {
            StateType::Start
        };
        let mut table: IndexMap<BTreeSet<StateId>, StateId> = IndexMap::new();
        table.insert(start_set.clone(), dfa.add_state(start_type));

        let mut queue = VecDeque::from([start_set]);
        while let Some(set) = queue.pop_front() {
            let from = table[&set];
            let labels: IndexSet<&L> = set
                .iter()
                .flat_map(|s| self.graph.transitions[*s].keys())
                .collect();
            for label in labels {
                let target = self.epsilon_closure(self.move_on(&set, label));
                if target.is_empty() {
                    continue;
                }
                let to = match table.get(&target) {
                    Some(id) => *id,
                    None => {
                        let state_type = if is_accepting(&target) {
                            StateType::End
                        } else {
                            StateType::Internal
                        };
                        let id = dfa.add_state(state_type);
                        table.insert(target.clone(), id);
                        queue.push_back(target);
                        id
                    }
                };
                dfa.add_transition(from, label.clone(), to);
            }
        }

        tracing::trace!(
            nfa_states = self.state_count(),
            dfa_states = dfa.state_count(),
            "subset construction finished"
        );
        dfa
    }

    /// Graphviz rendering, for debugging content models
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph automaton {\n    rankdir=LR;\n");
        for (id, state_type) in self.graph.states.iter().enumerate() {
            let shape = if state_type.is_accepting() {
                "doublecircle"
            } else {
                "circle"
            };
            let _ = writeln!(out, "    s{} [shape={}];", id, shape);
            if state_type.is_start() {
                let _ = writeln!(out, "    start [shape=point];\n    start -> s{};", id);
            }
        }
        for (from, table) in self.graph.transitions.iter().enumerate() {
            for (label, targets) in table {
                for to in targets {
                    let text = format!("{:?}", label).replace('"', "\\\"");
                    let _ = writeln!(out, "    s{} -> s{} [label=\"{}\"];", from, to, text);
                }
            }
            for to in &self.graph.epsilon[from] {
                let _ = writeln!(out, "    s{} -> s{} [label=\"ε\"];", from, to);
            }
        }
        out.push_str("}\n");
        out
    }
}

impl<L: Debug> Debug for Automaton<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Automaton")
            .field("states", &self.graph.states.len())
            .field("start", &self.graph.start)
            .field("current", &self.current)
            .field("last_transition", &self.last_transition)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (a|b)*abb as a textbook NFA
    fn abb() -> Automaton<char> {
        let mut nfa = Automaton::new();
        let s0 = nfa.add_state(StateType::Start);
        let s1 = nfa.add_state(StateType::Internal);
        let s2 = nfa.add_state(StateType::Internal);
        let s3 = nfa.add_state(StateType::End);
        nfa.add_transition(s0, 'a', s0);
        nfa.add_transition(s0, 'b', s0);
        nfa.add_transition(s0, 'a', s1);
        nfa.add_transition(s1, 'b', s2);
        nfa.add_transition(s2, 'b', s3);
        nfa
    }

    #[test]
    fn test_nfa_accepts() {
        let nfa = abb();
        assert!(!nfa.is_deterministic());
        assert!(nfa.accepts(&['a', 'b', 'b']));
        assert!(nfa.accepts(&['b', 'a', 'a', 'b', 'b']));
        assert!(!nfa.accepts(&['a', 'b']));
        assert!(!nfa.accepts(&[]));
    }

    #[test]
    fn test_to_dfa_equivalence() {
        let nfa = abb();
        let dfa = nfa.to_dfa();
        assert!(dfa.is_deterministic());
        for input in [
            "abb", "aabb", "babb", "ab", "", "abba", "bbbabb", "abbabb",
        ] {
            let labels: Vec<char> = input.chars().collect();
            assert_eq!(nfa.accepts(&labels), dfa.accepts(&labels), "input {:?}", input);
        }
    }

    #[test]
    fn test_epsilon_closure_start_accepting() {
        let mut nfa = Automaton::new();
        let s0 = nfa.add_state(StateType::Start);
        let s1 = nfa.add_state(StateType::End);
        nfa.add_epsilon_transition(s0, s1);
        nfa.add_transition(s1, 'x', s1);

        let mut dfa = nfa.to_dfa();
        assert_eq!(dfa.state_type(0), Some(StateType::StartEnd));
        dfa.reset();
        assert!(dfa.in_end_state());
        assert!(dfa.proceed(&'x'));
        assert!(dfa.in_end_state());
    }

    #[test]
    fn test_proceed_keeps_position_on_failure() {
        let mut dfa = abb().to_dfa();
        dfa.reset();
        assert!(dfa.proceed(&'a'));
        let position = dfa.current_state();
        assert!(!dfa.proceed(&'c'));
        assert_eq!(dfa.current_state(), position);
        assert_eq!(dfa.last_transition(), Some(&'a'));
        let mut possible = dfa.possible_transitions();
        possible.sort();
        assert_eq!(possible, vec!['a', 'b']);
    }

    #[test]
    fn test_second_start_state_is_demoted() {
        let mut automaton: Automaton<char> = Automaton::new();
        let first = automaton.add_state(StateType::Start);
        let second = automaton.add_state(StateType::StartEnd);
        assert_eq!(automaton.start_state(), Some(first));
        assert_eq!(automaton.state_type(second), Some(StateType::End));
    }

    struct Vowel;

    impl InputMatcher<Vowel> for char {
        fn matches_input(&self, _input: &Vowel) -> bool {
            "aeiou".contains(*self)
        }
    }

    #[test]
    fn test_proceed_matching() {
        let mut automaton = Automaton::new();
        let s0 = automaton.add_state(StateType::Start);
        let s1 = automaton.add_state(StateType::End);
        automaton.add_transition(s0, 'x', s0);
        automaton.add_transition(s0, 'e', s1);
        automaton.reset();

        assert!(automaton.proceed_matching(&Vowel));
        assert_eq!(automaton.last_transition(), Some(&'e'));
        assert!(automaton.in_end_state());
        assert!(!automaton.proceed_matching(&Vowel));
    }

    #[test]
    fn test_clear_and_clone_share_nothing_after_mutation() {
        let nfa = abb();
        let mut copy = nfa.clone();
        copy.clear();
        assert_eq!(copy.state_count(), 0);
        assert_eq!(nfa.state_count(), 4);
        assert!(nfa.to_dot().contains("doublecircle"));
    }
}
