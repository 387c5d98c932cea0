//! Calculation of the action table with conflict resolution.

use crate::{
    grammar::{
        Assoc, Fixity, Grammar, NonterminalID, OperatorTable, Precedence, RuleID, SymbolID,
        TerminalID,
    },
    lalr::Lookaheads,
    lr0::{Automaton, StateID},
    report::Reporter,
    types::Map,
    util::display_fn,
};
pub use dynlr_runtime::definition::{Action, DynamicIndex, RuleInfo};
use dynlr_runtime::definition;
use std::{cmp::Ordering, fmt};

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("detected shift/accept conflict in {:?} on `{}'", state, terminal)]
    ShiftAcceptConflict { state: StateID, terminal: String },

    #[error("detected reduce/accept conflict in {:?} on `{}'", state, terminal)]
    ReduceAcceptConflict { state: StateID, terminal: String },

    #[error("too many conflicts ({} > {})", count, max)]
    TooManyConflicts { count: usize, max: usize },

    #[error("too many candidate lists ({})", count)]
    TooManyCandidateLists { count: usize },

    #[error("right-hand side of {:?} is too long ({} symbols)", rule, len)]
    RuleTooLong { rule: RuleID, len: usize },
}

/// How a shift/reduce conflict without usable precedences is settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShiftReducePolicy {
    PreferShift,
    /// Keep every action and let the parser try them in turn.
    Choice,
}

/// How a reduce/reduce conflict is settled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReduceReducePolicy {
    /// Reduce by the rule declared first.
    EarliestRule,
    /// Keep every reduction and let the parser try them in turn.
    Choice,
}

#[derive(Debug, Clone)]
pub struct Config {
    shift_reduce: ShiftReducePolicy,
    reduce_reduce: ReduceReducePolicy,
    max_conflicts: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shift_reduce: ShiftReducePolicy::PreferShift,
            reduce_reduce: ReduceReducePolicy::EarliestRule,
            max_conflicts: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shift_reduce(mut self, policy: ShiftReducePolicy) -> Self {
        self.shift_reduce = policy;
        self
    }

    pub fn reduce_reduce(mut self, policy: ReduceReducePolicy) -> Self {
        self.reduce_reduce = policy;
        self
    }

    /// The number of reported conflicts tolerated before giving up.
    pub fn max_conflicts(mut self, max: Option<usize>) -> Self {
        self.max_conflicts = max;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConflictReason {
    /// At least one of the competing actions has no precedence.
    MissingPrecedence,

    /// The competing actions have the same priority but different
    /// associativities.
    AssociativityMismatch,

    /// At least one of shift/reduce conflict resolution result is
    /// inconsistent with the others.
    InconsistentShiftResolution,

    /// The state has multiple reductions even though it has no shift action
    /// on the target lookahead symbol.
    MultipleReductions,

    /// The decision depends on operators only known while parsing.
    DynamicOperator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub state: StateID,
    pub terminal: TerminalID,
    pub shift: Option<StateID>,
    pub reduces: Vec<RuleID>,
    pub reason: ConflictReason,
    pub resolution: Action,
}

impl Conflict {
    /// Whether the conflict is left for the parser to decide.
    pub fn is_deferred(&self) -> bool {
        matches!(self.reason, ConflictReason::DynamicOperator)
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(
                f,
                "{:?} conflict in {:?} on `{}':",
                self.reason, self.state, g.terminals[&self.terminal]
            )?;
            if let Some(next) = self.shift {
                write!(f, " shift({:?})", next)?;
            }
            for reduce in &self.reduces {
                write!(f, " reduce({})", g.rule(*reduce).display(g))?;
            }
            write!(f, " => {:?}", self.resolution)
        })
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub struct ParserState {
    pub actions: Map<TerminalID, Action>,
    pub gotos: Map<NonterminalID, StateID>,
}

/// The generated tables, ready to drive `dynlr_runtime::parser::Parser`.
#[derive(Debug)]
pub struct ParseTable {
    states: Map<StateID, ParserState>,
    rules: Map<RuleID, RuleInfo>,
    candidates: Vec<Vec<Action>>,
    conflicts: Vec<Conflict>,
    operators: OperatorTable,
    operator_terminals: Map<(NonterminalID, Fixity), TerminalID>,
    nonterminal_names: Map<NonterminalID, String>,
}

impl ParseTable {
    pub fn states(&self) -> impl Iterator<Item = (StateID, &ParserState)> + '_ {
        self.states.iter().map(|(id, state)| (*id, state))
    }

    pub fn state(&self, id: StateID) -> Option<&ParserState> {
        self.states.get(&id)
    }

    pub fn candidate_lists(&self) -> &[Vec<Action>] {
        &self.candidates
    }

    /// Every conflict met during construction, deferred ones included.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            for (i, (id, state)) in self.states.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }

                writeln!(f, "#### State {:?}", id)?;
                writeln!(f, "## actions")?;
                let mut actions: Vec<_> = state.actions.iter().collect();
                actions.sort_by(|(a, _), (b, _)| {
                    g.compare_symbols(SymbolID::T(**a), SymbolID::T(**b))
                });
                for (token, action) in actions {
                    let token = &g.terminals[token];
                    match action {
                        Action::Shift(n) => writeln!(f, "- {} => shift({:?})", token, n)?,
                        Action::Reduce(r) => {
                            writeln!(f, "- {} => reduce({})", token, g.rule(*r).display(g))?
                        }
                        Action::Accept => writeln!(f, "- {} => accept", token)?,
                        Action::Dynamic(d) => writeln!(f, "- {} => dynamic({:?})", token, d)?,
                        Action::Choice(d) => writeln!(f, "- {} => choice({:?})", token, d)?,
                        Action::Error => writeln!(f, "- {} => error", token)?,
                    }
                }

                writeln!(f, "## gotos")?;
                let mut gotos: Vec<_> = state.gotos.iter().collect();
                gotos.sort_by(|(a, _), (b, _)| {
                    g.compare_symbols(SymbolID::N(**a), SymbolID::N(**b))
                });
                for (symbol, goto) in gotos {
                    writeln!(f, "- {} => goto({:?})", g.nonterminals[symbol], goto)?;
                }
            }

            if !self.candidates.is_empty() {
                writeln!(f, "\n#### Candidates")?;
                for (i, candidates) in self.candidates.iter().enumerate() {
                    writeln!(f, "- D#{:03} => {:?}", i, candidates)?;
                }
            }

            if !self.conflicts.is_empty() {
                writeln!(f, "\n#### Conflicts")?;
                for conflict in &self.conflicts {
                    writeln!(f, "- {}", conflict.display(g))?;
                }
            }
            Ok(())
        })
    }
}

impl definition::ParseTable for ParseTable {
    fn initial_state(&self) -> StateID {
        StateID::from_raw(0)
    }

    fn action(&self, current: StateID, lookahead: TerminalID) -> Action {
        self.states
            .get(&current)
            .and_then(|state| state.actions.get(&lookahead))
            .copied()
            .unwrap_or(Action::Error)
    }

    fn goto(&self, current: StateID, symbol: NonterminalID) -> Option<StateID> {
        self.states
            .get(&current)
            .and_then(|state| state.gotos.get(&symbol))
            .copied()
    }

    fn rule(&self, rule: RuleID) -> Option<RuleInfo> {
        self.rules.get(&rule).copied()
    }

    fn candidates(&self, index: DynamicIndex) -> Option<&[Action]> {
        self.candidates
            .get(usize::from(index.into_raw()))
            .map(|c| &c[..])
    }

    fn expected_terminals(&self, current: StateID) -> Vec<TerminalID> {
        let mut expected: Vec<_> = self
            .states
            .get(&current)
            .into_iter()
            .flat_map(|state| state.actions.iter())
            .filter(|(_, action)| !action.is_error())
            .map(|(t, _)| *t)
            .collect();
        expected.sort();
        expected
    }

    fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    fn operator_terminal(&self, category: NonterminalID, fixity: Fixity) -> Option<TerminalID> {
        self.operator_terminals.get(&(category, fixity)).copied()
    }

    fn nonterminal_name(&self, symbol: NonterminalID) -> Option<&str> {
        self.nonterminal_names.get(&symbol).map(String::as_str)
    }
}

pub fn generate(
    g: &Grammar,
    automaton: &Automaton,
    lookaheads: &Lookaheads,
    config: &Config,
    reporter: &mut dyn Reporter,
) -> Result<ParseTable, TableError> {
    let span = tracing::debug_span!("generate_table");
    let _entered = span.enter();

    let mut builder = Builder {
        g,
        config,
        candidates: vec![],
        interned: Map::default(),
        conflicts: vec![],
    };

    let mut states = Map::default();
    for (&id, state) in &automaton.states {
        #[derive(Default)]
        struct PendingAction {
            shift: Option<StateID>,
            shift_rules: Vec<RuleID>,
            reduces: Vec<RuleID>,
        }
        let mut pending = Map::<TerminalID, PendingAction>::default();

        for transition in state.transitions() {
            if let (Some(SymbolID::T(t)), Some(next)) = (transition.marker, transition.next) {
                let action = pending.entry(t).or_default();
                action.shift = Some(next);
                action
                    .shift_rules
                    .extend(transition.items.iter().map(|&i| state.items()[i].rule));
            }
        }
        for i in state.final_items() {
            let rule = state.items()[i].rule;
            if rule == RuleID::ACCEPT {
                pending.entry(TerminalID::EOI).or_default().reduces.push(rule);
                continue;
            }
            for t in lookaheads.get(id, rule).into_iter().flat_map(|la| la.iter()) {
                pending.entry(t).or_default().reduces.push(rule);
            }
        }

        let mut actions = Map::default();
        for (t, mut action) in pending {
            action.reduces.sort();
            action.reduces.dedup();
            let resolved =
                builder.resolve(id, t, action.shift, &action.shift_rules, &action.reduces)?;
            actions.insert(t, resolved);
        }

        let gotos = state.gotos().collect();
        states.insert(id, ParserState { actions, gotos });
    }

    let mut reported = 0;
    for conflict in &builder.conflicts {
        if conflict.is_deferred() {
            tracing::debug!("deferred {}", conflict.display(g));
        } else {
            reported += 1;
            reporter.report_warning(conflict.display(g).to_string());
        }
    }
    if let Some(max) = config.max_conflicts {
        if reported > max {
            reporter.report_error(format!("too many conflicts ({} > {})", reported, max));
            return Err(TableError::TooManyConflicts {
                count: reported,
                max,
            });
        }
    }

    let rules = g
        .rules
        .iter()
        .map(|(&id, rule)| {
            let len = rule.right().len();
            let info = RuleInfo {
                left: rule.left(),
                len: u16::try_from(len).map_err(|_| TableError::RuleTooLong { rule: id, len })?,
                operator: rule.operator_position(g),
            };
            Ok((id, info))
        })
        .collect::<Result<Map<_, _>, TableError>>()?;

    Ok(ParseTable {
        states,
        rules,
        candidates: builder.candidates,
        conflicts: builder.conflicts,
        operators: g.operators.clone(),
        operator_terminals: g
            .operator_terminals()
            .map(|(category, fixity, t)| ((category, fixity), t))
            .collect(),
        nonterminal_names: g
            .nonterminals
            .iter()
            .map(|(&id, n)| (id, n.name().to_owned()))
            .collect(),
    })
}

struct Builder<'g> {
    g: &'g Grammar,
    config: &'g Config,
    candidates: Vec<Vec<Action>>,
    interned: Map<Vec<Action>, DynamicIndex>,
    conflicts: Vec<Conflict>,
}

impl Builder<'_> {
    fn resolve(
        &mut self,
        state: StateID,
        terminal: TerminalID,
        shift: Option<StateID>,
        shift_rules: &[RuleID],
        reduces: &[RuleID],
    ) -> Result<Action, TableError> {
        match (shift, reduces) {
            (Some(next), []) => return Ok(Action::Shift(next)),
            (None, [RuleID::ACCEPT]) => return Ok(Action::Accept),
            (None, [reduce]) => return Ok(Action::Reduce(*reduce)),
            (None, []) => return Ok(Action::Error),
            _ => (),
        }

        if reduces.contains(&RuleID::ACCEPT) {
            let name = self.g.terminals[&terminal].name().to_owned();
            return Err(if shift.is_some() {
                TableError::ShiftAcceptConflict {
                    state,
                    terminal: name,
                }
            } else {
                TableError::ReduceAcceptConflict {
                    state,
                    terminal: name,
                }
            });
        }

        let dynamic = self.g.terminals[&terminal].is_operator()
            || reduces
                .iter()
                .any(|r| self.g.rule(*r).operator_position(self.g).is_some());
        if dynamic {
            let candidates: Vec<_> = shift
                .map(Action::Shift)
                .into_iter()
                .chain(reduces.iter().map(|r| Action::Reduce(*r)))
                .collect();
            let index = self.intern(&candidates)?;
            let resolution = if candidates.len() <= 2 {
                Action::Dynamic(index)
            } else {
                Action::Choice(index)
            };
            return Ok(self.record(
                state,
                terminal,
                shift,
                reduces,
                ConflictReason::DynamicOperator,
                resolution,
            ));
        }

        let next = match shift {
            Some(next) => next,
            None => {
                let resolution = match self.config.reduce_reduce {
                    ReduceReducePolicy::EarliestRule => Action::Reduce(reduces[0]),
                    ReduceReducePolicy::Choice => self.choice(None, reduces)?,
                };
                return Ok(self.record(
                    state,
                    terminal,
                    shift,
                    reduces,
                    ConflictReason::MultipleReductions,
                    resolution,
                ));
            }
        };

        let shift_prec = self.g.terminals[&terminal].precedence();
        let mut resolved = None;
        let mut mismatch = false;
        for reduce in reduces {
            let reduce_prec = self.g.rule(*reduce).precedence(self.g);
            let diff = match compare_precs(shift_prec, reduce_prec) {
                Some(PrecDiff::Mismatch) => {
                    mismatch = true;
                    // Settled by declaration order.
                    let first_shift = shift_rules.iter().min();
                    if first_shift.map_or(false, |first| reduce < first) {
                        PrecDiff::Reduce
                    } else {
                        PrecDiff::Shift
                    }
                }
                Some(diff) => diff,
                None => {
                    let resolution = self.shift_reduce_policy(next, reduces)?;
                    return Ok(self.record(
                        state,
                        terminal,
                        shift,
                        reduces,
                        ConflictReason::MissingPrecedence,
                        resolution,
                    ));
                }
            };
            match resolved {
                None => resolved = Some(diff),
                Some(prev) if prev == diff => (),
                Some(..) => {
                    let resolution = self.shift_reduce_policy(next, reduces)?;
                    return Ok(self.record(
                        state,
                        terminal,
                        shift,
                        reduces,
                        ConflictReason::InconsistentShiftResolution,
                        resolution,
                    ));
                }
            }
        }

        let resolution = match resolved {
            Some(PrecDiff::Shift) => Action::Shift(next),
            Some(PrecDiff::Neither) => Action::Error,
            Some(PrecDiff::Reduce) if reduces.len() == 1 => Action::Reduce(reduces[0]),
            _ => {
                let resolution = self.shift_reduce_policy(next, reduces)?;
                return Ok(self.record(
                    state,
                    terminal,
                    shift,
                    reduces,
                    ConflictReason::InconsistentShiftResolution,
                    resolution,
                ));
            }
        };
        if mismatch {
            return Ok(self.record(
                state,
                terminal,
                shift,
                reduces,
                ConflictReason::AssociativityMismatch,
                resolution,
            ));
        }
        Ok(resolution)
    }

    fn shift_reduce_policy(
        &mut self,
        next: StateID,
        reduces: &[RuleID],
    ) -> Result<Action, TableError> {
        match self.config.shift_reduce {
            ShiftReducePolicy::PreferShift => Ok(Action::Shift(next)),
            ShiftReducePolicy::Choice => self.choice(Some(next), reduces),
        }
    }

    fn choice(
        &mut self,
        shift: Option<StateID>,
        reduces: &[RuleID],
    ) -> Result<Action, TableError> {
        let candidates: Vec<_> = shift
            .map(Action::Shift)
            .into_iter()
            .chain(reduces.iter().map(|r| Action::Reduce(*r)))
            .collect();
        Ok(Action::Choice(self.intern(&candidates)?))
    }

    /// Return the index of a candidate list, sharing equal lists.
    fn intern(&mut self, candidates: &[Action]) -> Result<DynamicIndex, TableError> {
        if let Some(index) = self.interned.get(candidates) {
            return Ok(*index);
        }
        let count = self.candidates.len();
        let raw = u16::try_from(count).map_err(|_| TableError::TooManyCandidateLists { count })?;
        let index = DynamicIndex::from_raw(raw);
        self.candidates.push(candidates.to_vec());
        self.interned.insert(candidates.to_vec(), index);
        Ok(index)
    }

    fn record(
        &mut self,
        state: StateID,
        terminal: TerminalID,
        shift: Option<StateID>,
        reduces: &[RuleID],
        reason: ConflictReason,
        resolution: Action,
    ) -> Action {
        self.conflicts.push(Conflict {
            state,
            terminal,
            shift,
            reduces: reduces.to_vec(),
            reason,
            resolution,
        });
        resolution
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum PrecDiff {
    Shift,
    Reduce,
    Neither,
    /// Equal priorities with different associativities.
    Mismatch,
}

fn compare_precs(
    shift_prec: Option<Precedence>,
    reduce_prec: Option<Precedence>,
) -> Option<PrecDiff> {
    match (shift_prec, reduce_prec) {
        (Some(p1), Some(p2)) => match Ord::cmp(&p1.priority, &p2.priority) {
            Ordering::Greater => Some(PrecDiff::Shift),
            Ordering::Less => Some(PrecDiff::Reduce),
            Ordering::Equal if p1.assoc != p2.assoc => Some(PrecDiff::Mismatch),
            Ordering::Equal => match p1.assoc {
                Assoc::Left => Some(PrecDiff::Reduce),
                Assoc::Right => Some(PrecDiff::Shift),
                Assoc::Nonassoc => Some(PrecDiff::Neither),
            },
        },
        _ => None,
    }
}
