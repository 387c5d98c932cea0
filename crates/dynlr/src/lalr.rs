//! Lookahead sets of the reductions.
//!
//! `Follow(p, C)` is the set of terminals that may come after `C` once it
//! has been reduced in state `p`. It is derived from the kernel items of
//! `p` and the rule paths leading to `C`, and refers to the follow sets of
//! the states the kernel items originate from, so it is iterated to a
//! fixpoint. The lookahead of a final item `A := α .` is then the union of
//! `Follow(p, A)` over the predecessors `p` of that item.

use crate::{
    analysis::Analysis,
    grammar::{Grammar, NonterminalID, RuleID, SymbolID, TerminalID},
    lr0::{Automaton, StateID},
    types::{Map, TerminalSet},
    util::display_fn,
};
use std::fmt;

#[derive(Debug)]
pub struct Lookaheads {
    follows: Map<(StateID, NonterminalID), TerminalSet>,
    reduces: Map<(StateID, RuleID), TerminalSet>,
}

impl Lookaheads {
    pub fn compute(g: &Grammar, analysis: &Analysis, automaton: &Automaton) -> Self {
        let follows = follow_sets(g, analysis, automaton);

        let mut reduces = Map::default();
        for (&id, state) in &automaton.states {
            for i in state.final_items() {
                let item = state.items()[i];
                let mut lookaheads = TerminalSet::new();
                if item.rule == RuleID::ACCEPT {
                    lookaheads.insert(TerminalID::EOI);
                } else {
                    let left = g.rule(item.rule).left();
                    for p in state.preds(i).into_iter().flatten() {
                        if let Some(follow) = follows.get(&(*p, left)) {
                            lookaheads.union_with(follow);
                        }
                    }
                }
                reduces
                    .entry((id, item.rule))
                    .or_insert_with(TerminalSet::new)
                    .union_with(&lookaheads);
            }
        }

        Self { follows, reduces }
    }

    /// The lookahead set of the reduction by `rule` in `state`.
    pub fn get(&self, state: StateID, rule: RuleID) -> Option<&TerminalSet> {
        self.reduces.get(&(state, rule))
    }

    pub fn follow(&self, state: StateID, symbol: NonterminalID) -> Option<&TerminalSet> {
        self.follows.get(&(state, symbol))
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for ((state, rule), lookaheads) in &self.reduces {
                let names: Vec<_> = lookaheads.iter().map(|t| g.terminals[&t].name()).collect();
                writeln!(
                    f,
                    "- {:?}: {} on [{}]",
                    state,
                    g.rule(*rule).display(g),
                    names.join(", ")
                )?;
            }
            Ok(())
        })
    }
}

fn follow_sets(
    g: &Grammar,
    analysis: &Analysis,
    automaton: &Automaton,
) -> Map<(StateID, NonterminalID), TerminalSet> {
    let mut follows: Map<(StateID, NonterminalID), TerminalSet> = Map::default();
    let mut rounds = 0;
    let mut changed = true;
    while changed {
        changed = false;
        rounds += 1;

        for (&id, state) in &automaton.states {
            for (i, item) in state.kernel().iter().enumerate() {
                let rule = g.rule(item.rule);
                let dot = usize::from(item.dot);
                let symbol = match rule.right().get(dot) {
                    Some(SymbolID::N(n)) => *n,
                    _ => continue,
                };
                let (rest_first, rest_nullable) = analysis.first_of(&rule.right()[dot + 1..]);

                // What follows the left-hand side of the kernel item.
                let mut outer = TerminalSet::new();
                if rest_nullable {
                    if item.rule == RuleID::ACCEPT {
                        outer.insert(TerminalID::EOI);
                    } else {
                        for p in state.preds(i).into_iter().flatten() {
                            if let Some(follow) = follows.get(&(*p, rule.left())) {
                                outer.union_with(follow);
                            }
                        }
                    }
                }

                for (target, paths) in analysis.paths_from(symbol) {
                    let mut added = paths.first().clone();
                    if paths.nullable() {
                        added.union_with(&rest_first);
                        if rest_nullable {
                            added.union_with(&outer);
                        }
                    }
                    changed |= follows
                        .entry((id, target))
                        .or_insert_with(TerminalSet::new)
                        .union_with(&added);
                }
            }
        }
    }
    tracing::debug!("follow sets converged after {} rounds", rounds);

    follows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SymbolID::{N, T};

    #[test]
    fn lalr_but_not_slr() {
        // S := L = R | R; L := * R | id; R := L
        let g = Grammar::define(|g| {
            let eq = g.terminal("=", None)?;
            let star = g.terminal("*", None)?;
            let id = g.terminal("id", None)?;
            let s = g.nonterminal("S")?;
            let l = g.nonterminal("L")?;
            let r = g.nonterminal("R")?;
            g.rule(s, [N(l), T(eq), N(r)], None)?;
            g.rule(s, [N(r)], None)?;
            g.rule(l, [T(star), N(r)], None)?;
            g.rule(l, [T(id)], None)?;
            g.rule(r, [N(l)], None)?;
            Ok(())
        })
        .unwrap();
        let analysis = Analysis::new(&g).unwrap();
        let automaton = Automaton::new(&g, &analysis);
        let lookaheads = Lookaheads::compute(&g, &analysis, &automaton);

        let eq = TerminalID::from_raw(1);
        let r_to_l = RuleID::from_raw(5);
        // The state reached from the initial state on `L` holds both
        // `S := L . = R` and `R := L .`; only EOI may follow `R` there.
        let (_, after_l) = automaton
            .state(StateID::from_raw(0))
            .gotos()
            .find(|(n, _)| *n == NonterminalID::from_raw(2))
            .unwrap();
        let la = lookaheads.get(after_l, r_to_l).unwrap();
        assert!(!la.contains(eq));
        assert!(la.contains(TerminalID::EOI));
    }

    #[test]
    fn empty_rule_lookaheads() {
        // S := A b; A := %empty
        let g = Grammar::define(|g| {
            let b = g.terminal("b", None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            g.rule(s, [N(a), T(b)], None)?;
            g.rule(a, [], None)?;
            Ok(())
        })
        .unwrap();
        let analysis = Analysis::new(&g).unwrap();
        let automaton = Automaton::new(&g, &analysis);
        let lookaheads = Lookaheads::compute(&g, &analysis, &automaton);
        let la = lookaheads.get(StateID::from_raw(0), RuleID::from_raw(2)).unwrap();
        assert_eq!(la.iter().collect::<Vec<_>>(), vec![TerminalID::from_raw(1)]);
    }
}
