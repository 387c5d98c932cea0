//! Parse table definition.

use crate::operator::{Fixity, OperatorTable};
use std::{fmt, rc::Rc, sync::Arc};

macro_rules! index_type {
    ($(#[$m:meta])* $Name:ident, $prefix:literal) => {
        $(#[$m])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $Name {
            raw: u16,
        }
        impl $Name {
            #[inline]
            pub const fn from_raw(raw: u16) -> Self {
                Self { raw }
            }
            #[inline]
            pub const fn into_raw(self) -> u16 {
                self.raw
            }
        }
        impl fmt::Debug for $Name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{:03}"), self.raw)
            }
        }
    };
}

index_type! {
    /// The dense index of a terminal symbol.
    TerminalID, "T"
}
impl TerminalID {
    /// Reserved symbol used as a terminal symbol that means the end of input.
    pub const EOI: Self = Self::from_raw(0);
}

index_type! {
    /// The dense index of a nonterminal symbol.
    NonterminalID, "N"
}
impl NonterminalID {
    /// The augmented start symbol.
    pub const START: Self = Self::from_raw(0);
}

index_type! {
    /// The dense index of a production rule.
    RuleID, "R"
}
impl RuleID {
    /// The augmented rule `$start := S`.
    pub const ACCEPT: Self = Self::from_raw(0);
}

index_type! {
    /// The state number of the LR automaton.
    StateID, "S"
}

index_type! {
    /// Index into the table of candidate lists for `Dynamic`/`Choice` actions.
    DynamicIndex, "D"
}

/// The action that the automaton performs in a state on a particular
/// lookahead symbol.
///
/// Two actions are equal iff their variant and payload are equal, so a
/// single action may be shared between several cells of the table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Read the lookahead symbol and transition to the specified state.
    Shift(StateID),

    /// Reduce by the specified production rule.
    Reduce(RuleID),

    Accept,

    /// The decision depends on the precedences of the dynamic operators
    /// involved, which are only known while parsing.
    Dynamic(DynamicIndex),

    /// Several alternatives remain viable; they are explored in order with
    /// backtracking.
    Choice(DynamicIndex),

    /// Reject the lookahead symbol.
    Error,
}

impl Action {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

/// What the parser needs to know about a production rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RuleInfo {
    /// The left-hand side of the rule.
    pub left: NonterminalID,
    /// The number of symbols in the right-hand side.
    pub len: u16,
    /// Position of the operator terminal in the right-hand side whose
    /// operator decides the precedence of this rule at parse time.
    pub operator: Option<u16>,
}

/// The trait for abstracting the generated parse table.
///
/// A table is immutable once built and may be consulted by any number of
/// parsers at the same time.
pub trait ParseTable {
    /// Return the initial state number.
    fn initial_state(&self) -> StateID;

    /// Return the action corresponding to the specified state number and
    /// lookahead symbol.
    fn action(&self, current: StateID, lookahead: TerminalID) -> Action;

    /// Return the state to transition to after a reduction to `symbol`.
    fn goto(&self, current: StateID, symbol: NonterminalID) -> Option<StateID>;

    fn rule(&self, rule: RuleID) -> Option<RuleInfo>;

    /// Return the candidate actions of a `Dynamic` or `Choice` action.
    fn candidates(&self, index: DynamicIndex) -> Option<&[Action]>;

    /// The terminals that have a non-error action in the specified state.
    fn expected_terminals(&self, current: StateID) -> Vec<TerminalID>;

    /// The operators declared together with the grammar.
    fn operators(&self) -> &OperatorTable;

    /// The terminal that stands for operators of `category` with the specified fixity.
    fn operator_terminal(&self, category: NonterminalID, fixity: Fixity) -> Option<TerminalID>;

    fn nonterminal_name(&self, symbol: NonterminalID) -> Option<&str>;
}

macro_rules! forward_parse_table {
    ($($Ptr:ty),*) => {$(
        impl<T: ?Sized> ParseTable for $Ptr
        where
            T: ParseTable,
        {
            fn initial_state(&self) -> StateID {
                (**self).initial_state()
            }

            fn action(&self, current: StateID, lookahead: TerminalID) -> Action {
                (**self).action(current, lookahead)
            }

            fn goto(&self, current: StateID, symbol: NonterminalID) -> Option<StateID> {
                (**self).goto(current, symbol)
            }

            fn rule(&self, rule: RuleID) -> Option<RuleInfo> {
                (**self).rule(rule)
            }

            fn candidates(&self, index: DynamicIndex) -> Option<&[Action]> {
                (**self).candidates(index)
            }

            fn expected_terminals(&self, current: StateID) -> Vec<TerminalID> {
                (**self).expected_terminals(current)
            }

            fn operators(&self) -> &OperatorTable {
                (**self).operators()
            }

            fn operator_terminal(
                &self,
                category: NonterminalID,
                fixity: Fixity,
            ) -> Option<TerminalID> {
                (**self).operator_terminal(category, fixity)
            }

            fn nonterminal_name(&self, symbol: NonterminalID) -> Option<&str> {
                (**self).nonterminal_name(symbol)
            }
        }
    )*};
}

forward_parse_table!(&T, Rc<T>, Arc<T>);
