//! LR(0) automaton with predecessor tracking.

use crate::{
    analysis::Analysis,
    grammar::{Grammar, NonterminalID, RuleID, SymbolID, TerminalID},
    types::{Map, Queue, Set},
    util::display_fn,
};
pub use dynlr_runtime::definition::StateID;
use std::fmt;

/// The LR(0) item, a rule with a dot in its right-hand side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Item {
    pub rule: RuleID,
    pub dot: u16,
}

impl Item {
    /// The symbol right after the dot, `None` for a final item.
    pub fn marker(&self, g: &Grammar) -> Option<SymbolID> {
        g.rule(self.rule).right().get(usize::from(self.dot)).copied()
    }

    pub fn is_final(&self, g: &Grammar) -> bool {
        self.marker(g).is_none()
    }

    fn shifted(&self) -> Self {
        Self {
            rule: self.rule,
            dot: self.dot + 1,
        }
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            let rule = g.rule(self.rule);
            write!(f, "{} -> [", g.nonterminals[&rule.left()])?;
            for (i, symbol) in rule.right().iter().enumerate() {
                if i == usize::from(self.dot) {
                    f.write_str(" .")?;
                }
                write!(f, " {}", g.symbol_name(*symbol))?;
            }
            if rule.right().len() == usize::from(self.dot) {
                f.write_str(" .")?;
            }
            f.write_str(" ]")
        })
    }
}

/// The items of a state sharing the same marker symbol.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: StateID,
    /// `None` groups the final items.
    pub marker: Option<SymbolID>,
    /// Indices into the items of `from`.
    pub items: Vec<usize>,
    pub next: Option<StateID>,
}

#[derive(Debug, Clone)]
pub struct State {
    id: StateID,
    /// The kernel items followed by the closure items.
    items: Vec<Item>,
    kernel_len: usize,
    transitions: Vec<StateTransition>,
    /// For each item, the states holding the same rule with the dot at 0
    /// from which the item has been reached.
    preds: Vec<Set<StateID>>,
}

impl State {
    pub fn id(&self) -> StateID {
        self.id
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn kernel(&self) -> &[Item] {
        &self.items[..self.kernel_len]
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn preds(&self, index: usize) -> Option<&Set<StateID>> {
        self.preds.get(index)
    }

    pub fn shifts(&self) -> impl Iterator<Item = (TerminalID, StateID)> + '_ {
        self.transitions.iter().filter_map(|t| match (t.marker, t.next) {
            (Some(SymbolID::T(symbol)), Some(next)) => Some((symbol, next)),
            _ => None,
        })
    }

    pub fn gotos(&self) -> impl Iterator<Item = (NonterminalID, StateID)> + '_ {
        self.transitions.iter().filter_map(|t| match (t.marker, t.next) {
            (Some(SymbolID::N(symbol)), Some(next)) => Some((symbol, next)),
            _ => None,
        })
    }

    /// The indices of the final items.
    pub fn final_items(&self) -> impl Iterator<Item = usize> + '_ {
        self.transitions
            .iter()
            .filter(|t| t.marker.is_none())
            .flat_map(|t| t.items.iter().copied())
    }

    fn position(&self, item: Item) -> Option<usize> {
        self.kernel().iter().position(|i| *i == item)
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            writeln!(f, "#### State {:?}", self.id)?;
            writeln!(f, "## items:")?;
            for (i, item) in self.items.iter().enumerate() {
                let mark = if i < self.kernel_len { "*" } else { "-" };
                write!(f, "{} {}", mark, item.display(g))?;
                if let Some(preds) = self.preds.get(i) {
                    let mut preds: Vec<_> = preds.iter().copied().collect();
                    preds.sort();
                    write!(f, " preds={:?}", preds)?;
                }
                writeln!(f)?;
            }
            writeln!(f, "## transitions:")?;
            for t in &self.transitions {
                match (t.marker, t.next) {
                    (Some(symbol), Some(next)) => {
                        writeln!(f, "- {} => {:?}", g.symbol_name(symbol), next)?
                    }
                    _ => writeln!(f, "- (reduce) {:?}", t.items)?,
                }
            }
            Ok(())
        })
    }
}

#[derive(Debug)]
pub struct Automaton {
    pub states: Map<StateID, State>,
}

impl Automaton {
    /// Build the LR(0) automaton and propagate the predecessor sets to the fixpoint.
    pub fn new(g: &Grammar, analysis: &Analysis) -> Self {
        let mut automaton = build(g, analysis);
        let mut rounds = 1;
        while automaton.compute_preds() {
            rounds += 1;
        }
        tracing::debug!(
            "built {} states ({} rounds of predecessor propagation)",
            automaton.states.len(),
            rounds
        );
        automaton
    }

    pub fn state(&self, id: StateID) -> &State {
        &self.states[&id]
    }

    /// Run a single propagation pass of the predecessor sets.
    ///
    /// Every item with the dot at 0 has its own state as predecessor, and
    /// the successor of an item across a transition inherits the
    /// predecessors of that item. Returns whether any set grew.
    pub fn compute_preds(&mut self) -> bool {
        let mut changed = false;
        let mut updates = vec![];
        for state in self.states.values_mut() {
            let id = state.id;
            for (item, preds) in state.items.iter().zip(&mut state.preds) {
                if item.dot == 0 {
                    changed |= preds.insert(id);
                }
            }

            for transition in &state.transitions {
                let next = match transition.next {
                    Some(next) => next,
                    None => continue,
                };
                for &i in &transition.items {
                    updates.push((next, state.items[i].shifted(), state.preds[i].clone()));
                }
            }
        }

        for (next, item, preds) in updates {
            let state = &mut self.states[&next];
            if let Some(j) = state.position(item) {
                let target = &mut state.preds[j];
                for p in preds {
                    changed |= target.insert(p);
                }
            }
        }

        changed
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (i, state) in self.states.values().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                write!(f, "{}", state.display(g))?;
            }
            Ok(())
        })
    }
}

fn build(g: &Grammar, analysis: &Analysis) -> Automaton {
    let mut rules_by_left: Map<NonterminalID, Vec<RuleID>> = Map::default();
    for (&id, rule) in &g.rules {
        rules_by_left.entry(rule.left()).or_default().push(id);
    }

    let mut next_state_id = 0;
    let mut state_id = move || {
        let id = StateID::from_raw(next_state_id);
        next_state_id += 1;
        id
    };

    let initial = vec![Item {
        rule: RuleID::ACCEPT,
        dot: 0,
    }];
    let mut isocores = Map::<Vec<Item>, StateID>::default();
    let mut pending = Queue::<(StateID, Vec<Item>)>::default();
    let first = state_id();
    isocores.insert(initial.clone(), first);
    pending.push((first, initial));

    let mut states = Map::default();
    while let Some((current, kernel)) = pending.pop() {
        let kernel_len = kernel.len();
        let mut items = kernel;
        let mut seen: Set<Item> = items.iter().copied().collect();
        for i in 0..kernel_len {
            if let Some(SymbolID::N(n)) = items[i].marker(g) {
                for target in analysis.closure_targets(n) {
                    for &rule in rules_by_left.get(&target).into_iter().flatten() {
                        let item = Item { rule, dot: 0 };
                        if seen.insert(item) {
                            items.push(item);
                        }
                    }
                }
            }
        }

        let mut groups = Map::<Option<SymbolID>, Vec<usize>>::default();
        for (i, item) in items.iter().enumerate() {
            groups.entry(item.marker(g)).or_default().push(i);
        }

        let mut transitions = Vec::with_capacity(groups.len());
        for (marker, indices) in groups {
            let next = match marker {
                Some(..) => {
                    let mut new_kernel: Vec<_> =
                        indices.iter().map(|&i| items[i].shifted()).collect();
                    new_kernel.sort();
                    new_kernel.dedup();
                    let id = match isocores.get(&new_kernel) {
                        Some(id) => *id,
                        None => {
                            let id = state_id();
                            isocores.insert(new_kernel.clone(), id);
                            pending.push((id, new_kernel));
                            id
                        }
                    };
                    Some(id)
                }
                None => None,
            };
            transitions.push(StateTransition {
                from: current,
                marker,
                items: indices,
                next,
            });
        }

        let preds = vec![Set::default(); items.len()];
        states.insert(
            current,
            State {
                id: current,
                items,
                kernel_len,
                transitions,
                preds,
            },
        );
    }

    Automaton { states }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SymbolID::{N, T};

    fn arithmetic() -> Grammar {
        // E := E + T | T; T := n | ( E )
        Grammar::define(|g| {
            let plus = g.terminal("+", None)?;
            let num = g.terminal("n", None)?;
            let lparen = g.terminal("(", None)?;
            let rparen = g.terminal(")", None)?;
            let e = g.nonterminal("E")?;
            let t = g.nonterminal("T")?;
            g.rule(e, [N(e), T(plus), N(t)], None)?;
            g.rule(e, [N(t)], None)?;
            g.rule(t, [T(num)], None)?;
            g.rule(t, [T(lparen), N(e), T(rparen)], None)?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn canonical_lr0_states() {
        let g = arithmetic();
        let analysis = Analysis::new(&g).unwrap();
        let automaton = Automaton::new(&g, &analysis);
        // The classic LR(0) collection of this grammar has 9 states.
        assert_eq!(automaton.states.len(), 9);

        let initial = automaton.state(StateID::from_raw(0));
        assert_eq!(initial.kernel().len(), 1);
        // $start := . E, E := . E + T, E := . T, T := . n, T := . ( E )
        assert_eq!(initial.items().len(), 5);
        assert_eq!(initial.shifts().count(), 2);
        assert_eq!(initial.gotos().count(), 2);
    }

    #[test]
    fn kernels_are_unique() {
        let g = arithmetic();
        let analysis = Analysis::new(&g).unwrap();
        let automaton = Automaton::new(&g, &analysis);
        let kernels: Set<Vec<Item>> = automaton
            .states
            .values()
            .map(|s| s.kernel().to_vec())
            .collect();
        assert_eq!(kernels.len(), automaton.states.len());
    }

    #[test]
    fn preds_point_to_origin_states() {
        let g = arithmetic();
        let analysis = Analysis::new(&g).unwrap();
        let mut automaton = Automaton::new(&g, &analysis);
        assert!(!automaton.compute_preds());

        for state in automaton.states.values() {
            for (i, item) in state.items().iter().enumerate() {
                let preds = state.preds(i).unwrap();
                assert!(!preds.is_empty(), "{}", item.display(&g));
                for p in preds {
                    let origin = automaton.state(*p);
                    let start = Item {
                        rule: item.rule,
                        dot: 0,
                    };
                    assert!(origin.items().contains(&start));
                }
            }
        }
    }
}
