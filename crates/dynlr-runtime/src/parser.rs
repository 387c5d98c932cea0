//! Parser.
//!
//! The parser drives a parse table like an ordinary shift-reduce machine
//! until the table (or the operator readings of a token) leaves more than
//! one way to continue. At that point a choice point is pushed, the first
//! alternative is explored, and a dead end rewinds the parser to the most
//! recent choice point using the trail of reductions performed since.

use crate::{
    definition::{Action, DynamicIndex, NonterminalID, ParseTable, RuleID, StateID, TerminalID},
    operator::{Operator, OperatorError, OperatorTable, Specifier},
};
use std::{collections::VecDeque, fmt, rc::Rc, sync::Arc};

/// A trait for abstracting token symbols.
pub trait Token {
    /// Return the terminal symbol assigned to this token by the tokenizer.
    fn terminal(&self) -> TerminalID;

    /// Return the name under which this token may denote an operator.
    fn operator_name(&self) -> Option<&str> {
        None
    }
}

/// The trait for constructing the semantic values of reductions.
pub trait NodeBuilder<TTok> {
    type Node;
    type Error;

    /// Build the node for a reduction by `rule` from the popped handle.
    ///
    /// The handle is restored verbatim if the reduction is undone, so any
    /// side effect beyond the returned node must be safe to repeat.
    fn reduce(
        &mut self,
        rule: RuleID,
        handle: Handle<'_, TTok, Self::Node>,
    ) -> Result<Self::Node, Self::Error>;
}

/// A monotonically increasing counter, advanced whenever a choice point is created.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A token viewed as one particular terminal symbol.
pub struct DynamicToken<TTok> {
    original: Rc<TTok>,
    terminal: TerminalID,
    operator: Option<Arc<Operator>>,
    position: usize,
    stamp: Timestamp,
}

impl<TTok> DynamicToken<TTok> {
    /// The token as produced by the tokenizer.
    pub fn original(&self) -> &TTok {
        &self.original
    }

    /// The terminal symbol this token is currently read as.
    pub fn terminal(&self) -> TerminalID {
        self.terminal
    }

    /// The operator this token is currently read as, if any.
    pub fn operator(&self) -> Option<&Arc<Operator>> {
        self.operator.as_ref()
    }

    /// The index of this token in the input.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn stamp(&self) -> Timestamp {
        self.stamp
    }

    /// Return another view of the same token, leaving this one untouched.
    pub fn reinterpret(
        &self,
        terminal: TerminalID,
        operator: Option<Arc<Operator>>,
        stamp: Timestamp,
    ) -> Self {
        Self {
            original: self.original.clone(),
            terminal,
            operator,
            position: self.position,
            stamp,
        }
    }
}

impl<TTok> Clone for DynamicToken<TTok> {
    fn clone(&self) -> Self {
        Self {
            original: self.original.clone(),
            terminal: self.terminal,
            operator: self.operator.clone(),
            position: self.position,
            stamp: self.stamp,
        }
    }
}

impl<TTok: fmt::Debug> fmt::Debug for DynamicToken<TTok> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicToken")
            .field("original", &self.original)
            .field("terminal", &self.terminal)
            .field("operator", &self.operator.as_ref().map(|op| op.name()))
            .field("position", &self.position)
            .finish()
    }
}

#[derive(Debug)]
pub enum ParseItem<TTok, TNode> {
    T(DynamicToken<TTok>),
    N(TNode),
}

impl<TTok, TNode> ParseItem<TTok, TNode> {
    pub fn token(&self) -> Option<&DynamicToken<TTok>> {
        match self {
            Self::T(t) => Some(t),
            Self::N(..) => None,
        }
    }

    pub fn node(&self) -> Option<&TNode> {
        match self {
            Self::T(..) => None,
            Self::N(n) => Some(n),
        }
    }
}

/// An entry of the parser stack.
#[derive(Debug)]
pub struct StackElement<TTok, TNode> {
    state: StateID,
    item: ParseItem<TTok, TNode>,
    /// The priority of the principal operator of a reduced node, 0 for
    /// tokens and for nodes built without an operator.
    priority: u16,
    stamp: Timestamp,
}

impl<TTok, TNode> StackElement<TTok, TNode> {
    pub fn state(&self) -> StateID {
        self.state
    }

    pub fn item(&self) -> &ParseItem<TTok, TNode> {
        &self.item
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn stamp(&self) -> Timestamp {
        self.stamp
    }
}

/// The stack elements consumed by a reduction.
#[derive(Debug)]
pub struct Handle<'a, TTok, TNode> {
    elements: &'a [StackElement<TTok, TNode>],
}

impl<'a, TTok, TNode> Handle<'a, TTok, TNode> {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a ParseItem<TTok, TNode>> {
        self.elements.get(index).map(|e| &e.item)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a ParseItem<TTok, TNode>> + 'a {
        self.elements.iter().map(|e| &e.item)
    }

    pub fn token(&self, index: usize) -> Option<&'a DynamicToken<TTok>> {
        self.get(index).and_then(ParseItem::token)
    }

    pub fn node(&self, index: usize) -> Option<&'a TNode> {
        self.get(index).and_then(ParseItem::node)
    }
}

/// The record of one reduction, kept while a choice point may still undo it.
#[derive(Debug)]
struct TrailEntry<TTok, TNode> {
    stamp: Timestamp,
    rule: RuleID,
    handle: Vec<StackElement<TTok, TNode>>,
}

enum Lookahead<TTok> {
    Token(DynamicToken<TTok>),
    End,
}

impl<TTok> Lookahead<TTok> {
    fn terminal(&self) -> TerminalID {
        match self {
            Self::Token(t) => t.terminal(),
            Self::End => TerminalID::EOI,
        }
    }

    fn operator(&self) -> Option<&Arc<Operator>> {
        match self {
            Self::Token(t) => t.operator(),
            Self::End => None,
        }
    }
}

impl<TTok> Clone for Lookahead<TTok> {
    fn clone(&self) -> Self {
        match self {
            Self::Token(t) => Self::Token(t.clone()),
            Self::End => Self::End,
        }
    }
}

/// One way of reading a token.
#[derive(Debug, Clone)]
struct Reading {
    terminal: TerminalID,
    operator: Option<Arc<Operator>>,
}

enum Alternatives {
    Actions(VecDeque<Action>),
    Tokens(VecDeque<Reading>),
}

enum Alternative {
    Action(Action),
    Reading(Reading),
}

impl Alternatives {
    fn pop(&mut self) -> Option<Alternative> {
        match self {
            Self::Actions(q) => q.pop_front().map(Alternative::Action),
            Self::Tokens(q) => q.pop_front().map(Alternative::Reading),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Actions(q) => q.is_empty(),
            Self::Tokens(q) => q.is_empty(),
        }
    }
}

/// A choice point with the alternatives not tried yet.
struct Choice<TTok> {
    stamp: Timestamp,
    position: usize,
    lookahead: Lookahead<TTok>,
    alternatives: Alternatives,
}

impl<TTok> Choice<TTok> {
    /// Whether this choice is between readings of a token rather than
    /// between parser actions.
    fn is_token_choice(&self) -> bool {
        matches!(self.alternatives, Alternatives::Tokens(..))
    }
}

#[derive(Debug, Copy, Clone)]
struct DeadEnd {
    position: usize,
    state: StateID,
    lookahead: TerminalID,
}

#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ParserConfig {
    /// The maximum number of pending choice points.
    pub max_choice_depth: Option<usize>,
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_choice_depth(mut self, depth: usize) -> Self {
        self.max_choice_depth = Some(depth);
        self
    }
}

/// Counters collected during the last parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ParseStats {
    pub reductions: usize,
    pub choice_points: usize,
    pub backtracks: usize,
    pub undone_reductions: usize,
    pub max_choice_depth: usize,
    /// The number of pending choice points when the input was accepted.
    pub choices_at_accept: usize,
    /// The length of the trail when the input was accepted.
    pub trail_at_accept: usize,
}

/// The parser driven based on the generated parse table.
pub struct Parser<TDef, TBuild, TTok>
where
    TDef: ParseTable,
    TBuild: NodeBuilder<TTok>,
{
    definition: TDef,
    builder: TBuild,
    operators: OperatorTable,
    config: ParserConfig,
    stack: Vec<StackElement<TTok, TBuild::Node>>,
    choices: Vec<Choice<TTok>>,
    trail: Vec<TrailEntry<TTok, TBuild::Node>>,
    clock: Timestamp,
    input: Vec<Rc<TTok>>,
    exhausted: bool,
    position: usize,
    lookahead: Option<Lookahead<TTok>>,
    forced: Option<Action>,
    farthest: Option<DeadEnd>,
    stats: ParseStats,
}

impl<TDef, TBuild, TTok> fmt::Debug for Parser<TDef, TBuild, TTok>
where
    TDef: ParseTable,
    TBuild: NodeBuilder<TTok>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("operators", &self.operators)
            .field("config", &self.config)
            .field("stack_depth", &self.stack.len())
            .field("choice_depth", &self.choices.len())
            .field("trail_len", &self.trail.len())
            .field("position", &self.position)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<TDef, TBuild, TTok> Parser<TDef, TBuild, TTok>
where
    TDef: ParseTable,
    TBuild: NodeBuilder<TTok>,
    TTok: Token,
{
    /// Create an instance of `Parser` using the specified parse table.
    pub fn new(definition: TDef, builder: TBuild) -> Self {
        Self::with_config(definition, builder, ParserConfig::default())
    }

    pub fn with_config(definition: TDef, builder: TBuild, config: ParserConfig) -> Self {
        let operators = definition.operators().clone();
        Self {
            definition,
            builder,
            operators,
            config,
            stack: vec![],
            choices: vec![],
            trail: vec![],
            clock: Timestamp::default(),
            input: vec![],
            exhausted: false,
            position: 0,
            lookahead: None,
            forced: None,
            farthest: None,
            stats: ParseStats::default(),
        }
    }

    pub fn builder(&self) -> &TBuild {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut TBuild {
        &mut self.builder
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    /// Define an operator for subsequent parses.
    ///
    /// Returns the definition it replaces, if any. A priority of 0 removes
    /// the operator.
    pub fn define_operator(
        &mut self,
        name: &str,
        specifier: &str,
        priority: u16,
        category: NonterminalID,
    ) -> Result<Option<Arc<Operator>>, OperatorError> {
        let specifier = Specifier::decode(specifier)?;
        let terminal = self
            .definition
            .operator_terminal(category, specifier.fixity)
            .ok_or(OperatorError::MissingOperatorTerminal {
                category,
                fixity: specifier.fixity,
            })?;
        let category_name = self
            .definition
            .nonterminal_name(category)
            .unwrap_or("<unknown>");
        let op = Operator::new(name, specifier, priority, category, category_name, terminal)?;
        tracing::debug!("define operator {}", op);
        Ok(self.operators.define(op))
    }

    /// Return the statistics of the last parse.
    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse the tokens until the input is accepted or every alternative
    /// has been exhausted.
    pub fn parse<I, E>(&mut self, tokens: I) -> Result<TBuild::Node, ParseError<E, TBuild::Error>>
    where
        I: IntoIterator<Item = Result<TTok, E>>,
    {
        let span = tracing::trace_span!("parse");
        let _entered = span.enter();

        self.discard();
        self.stats = ParseStats::default();
        let mut tokens = tokens.into_iter();

        loop {
            let current = self.current_state();
            let lookahead = match self.lookahead(&mut tokens, current)? {
                Some(lookahead) => lookahead,
                None => {
                    self.dead_end(current)?;
                    continue;
                }
            };

            let action = match self.forced.take() {
                Some(action) => action,
                None => self.definition.action(current, lookahead.terminal()),
            };

            match action {
                Action::Shift(next) => self.shift(next, lookahead)?,
                Action::Reduce(rule) => {
                    if !self.reduce(rule)? {
                        self.dead_end(current)?;
                    }
                }
                Action::Accept => return self.accept(),
                Action::Dynamic(index) => {
                    let candidates = self.rank(index, &lookahead)?;
                    if !self.branch(candidates, lookahead)? {
                        self.dead_end(current)?;
                    }
                }
                Action::Choice(index) => {
                    let candidates = self
                        .definition
                        .candidates(index)
                        .ok_or(ParseError::UnknownCandidates(index))?
                        .iter()
                        .copied()
                        .collect();
                    if !self.branch(candidates, lookahead)? {
                        self.dead_end(current)?;
                    }
                }
                Action::Error => self.dead_end(current)?,
            }
        }
    }

    fn current_state(&self) -> StateID {
        self.stack
            .last()
            .map_or_else(|| self.definition.initial_state(), |e| e.state)
    }

    fn fetch<I, E>(
        &mut self,
        tokens: &mut I,
    ) -> Result<Option<Rc<TTok>>, ParseError<E, TBuild::Error>>
    where
        I: Iterator<Item = Result<TTok, E>>,
    {
        if let Some(token) = self.input.get(self.position) {
            return Ok(Some(token.clone()));
        }
        if self.exhausted {
            return Ok(None);
        }
        match tokens.next() {
            Some(Ok(token)) => {
                let token = Rc::new(token);
                self.input.push(token.clone());
                Ok(Some(token))
            }
            Some(Err(err)) => Err(ParseError::Lexer(err)),
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// Decide how the next token is read in the current state.
    ///
    /// Returns `None` if no reading of the token is acceptable here.
    fn lookahead<I, E>(
        &mut self,
        tokens: &mut I,
        current: StateID,
    ) -> Result<Option<Lookahead<TTok>>, ParseError<E, TBuild::Error>>
    where
        I: Iterator<Item = Result<TTok, E>>,
    {
        if let Some(lookahead) = &self.lookahead {
            return Ok(Some(lookahead.clone()));
        }

        let token = match self.fetch(tokens)? {
            Some(token) => token,
            None => {
                self.lookahead = Some(Lookahead::End);
                return Ok(Some(Lookahead::End));
            }
        };

        let mut readings = self.readings(&token, current);
        let first = match readings.pop_front() {
            Some(first) => first,
            None => return Ok(None),
        };

        let mut token = DynamicToken {
            original: token,
            terminal: first.terminal,
            operator: first.operator,
            position: self.position,
            stamp: self.clock,
        };
        if !readings.is_empty() {
            self.push_choice(
                Lookahead::Token(token.clone()),
                Alternatives::Tokens(readings),
            )?;
            token.stamp = self.clock;
        }

        let lookahead = Lookahead::Token(token);
        self.lookahead = Some(lookahead.clone());
        Ok(Some(lookahead))
    }

    /// The readings of a token that have an action in the specified state.
    fn readings(&self, token: &TTok, current: StateID) -> VecDeque<Reading> {
        let mut readings = VecDeque::new();
        let plain = token.terminal();
        if !self.definition.action(current, plain).is_error() {
            readings.push_back(Reading {
                terminal: plain,
                operator: None,
            });
        }
        if let Some(name) = token.operator_name() {
            for op in self.operators.lookup(name) {
                if !self.definition.action(current, op.terminal()).is_error() {
                    readings.push_back(Reading {
                        terminal: op.terminal(),
                        operator: Some(op.clone()),
                    });
                }
            }
        }
        readings
    }

    fn shift<E>(
        &mut self,
        next: StateID,
        lookahead: Lookahead<TTok>,
    ) -> Result<(), ParseError<E, TBuild::Error>> {
        let token = match lookahead {
            Lookahead::Token(token) => token,
            Lookahead::End => return Err(ParseError::UnexpectedEOI),
        };
        tracing::trace!("shift {:?} -> {:?}", token.terminal(), next);
        self.stack.push(StackElement {
            state: next,
            item: ParseItem::T(token),
            priority: 0,
            stamp: self.clock,
        });
        self.position += 1;
        self.lookahead = None;
        Ok(())
    }

    /// Returns `false` if the operator of the handle refuses its arguments.
    fn reduce<E>(&mut self, rule: RuleID) -> Result<bool, ParseError<E, TBuild::Error>> {
        let info = self
            .definition
            .rule(rule)
            .ok_or(ParseError::UnknownRule(rule))?;
        let n = usize::from(info.len);
        let at = self
            .stack
            .len()
            .checked_sub(n)
            .ok_or(ParseError::EmptyStack)?;
        let priority = match info.operator {
            Some(pos) => match self.principal_priority(at, usize::from(pos)) {
                Some(priority) => priority,
                None => {
                    tracing::debug!("operator of {:?} refuses its arguments", rule);
                    return Ok(false);
                }
            },
            None => 0,
        };
        let handle = self.stack.split_off(at);

        let node = self
            .builder
            .reduce(rule, Handle { elements: &handle })
            .map_err(ParseError::Builder)?;

        let current = self.current_state();
        let next = self
            .definition
            .goto(current, info.left)
            .ok_or(ParseError::MissingGoto {
                state: current,
                symbol: info.left,
            })?;
        tracing::trace!("reduce {:?} -> {:?}", rule, next);

        if !self.choices.is_empty() {
            self.trail.push(TrailEntry {
                stamp: self.clock,
                rule,
                handle,
            });
        }
        self.stack.push(StackElement {
            state: next,
            item: ParseItem::N(node),
            priority,
            stamp: self.clock,
        });
        self.stats.reductions += 1;
        Ok(true)
    }

    /// The priority of the operator at `pos` in the handle starting at `at`,
    /// or `None` if an argument binds looser than the operator allows.
    fn principal_priority(&self, at: usize, pos: usize) -> Option<u16> {
        let handle = &self.stack[at..];
        let op = match handle
            .get(pos)
            .and_then(|e| e.item.token())
            .and_then(|t| t.operator())
        {
            Some(op) => op,
            None => return Some(0),
        };
        let fits = |index: Option<usize>, max: Option<u16>| {
            match (index.and_then(|i| handle.get(i)), max) {
                (Some(arg), Some(max)) if arg.item.node().is_some() => arg.priority <= max,
                _ => true,
            }
        };
        if fits(pos.checked_sub(1), op.left_max()) && fits(Some(pos + 1), op.right_max()) {
            Some(op.priority())
        } else {
            None
        }
    }

    fn accept<E>(&mut self) -> Result<TBuild::Node, ParseError<E, TBuild::Error>> {
        self.stats.choices_at_accept = self.choices.len();
        self.stats.trail_at_accept = self.trail.len();
        let top = self.stack.pop().ok_or(ParseError::EmptyStack)?;
        self.discard();
        tracing::trace!("accept");
        match top.item {
            ParseItem::N(node) => Ok(node),
            ParseItem::T(..) => Err(ParseError::UnexpectedItem),
        }
    }

    /// Order the candidates of a `Dynamic` action by the precedences of
    /// the operators involved, dropping those the operators forbid.
    fn rank<E>(
        &self,
        index: DynamicIndex,
        lookahead: &Lookahead<TTok>,
    ) -> Result<VecDeque<Action>, ParseError<E, TBuild::Error>> {
        let candidates = self
            .definition
            .candidates(index)
            .ok_or(ParseError::UnknownCandidates(index))?;
        let incoming = lookahead.operator();

        let mut pending = Vec::with_capacity(candidates.len());
        for action in candidates {
            let op = match action {
                Action::Reduce(rule) => self.handle_operator(*rule)?,
                _ => None,
            };
            pending.push(op);
        }
        let ranked_reduces = incoming.is_some() && pending.iter().any(Option::is_some);
        let shift_allowed = match incoming {
            Some(incoming) => pending.iter().flatten().any(|op| {
                op.right_max()
                    .map_or(true, |max| incoming.priority() <= max)
            }),
            None => false,
        };

        let mut ranked = vec![];
        let mut unranked = vec![];
        for (action, op) in candidates.iter().zip(&pending) {
            match (action, op, incoming) {
                (Action::Reduce(..), Some(op), Some(incoming)) => {
                    let viable = incoming
                        .left_max()
                        .map_or(true, |max| op.priority() <= max);
                    if viable {
                        ranked.push((op.priority(), 0u8, *action));
                    }
                }
                (Action::Shift(..), _, Some(incoming)) if ranked_reduces => {
                    if shift_allowed {
                        ranked.push((incoming.priority(), 1u8, *action));
                    }
                }
                _ => unranked.push(*action),
            }
        }
        ranked.sort_by_key(|(priority, order, _)| (*priority, *order));

        Ok(ranked
            .into_iter()
            .map(|(_, _, action)| action)
            .chain(unranked)
            .collect())
    }

    /// Return the operator the pending reduction by `rule` was built around.
    fn handle_operator<E>(
        &self,
        rule: RuleID,
    ) -> Result<Option<Arc<Operator>>, ParseError<E, TBuild::Error>> {
        let info = self
            .definition
            .rule(rule)
            .ok_or(ParseError::UnknownRule(rule))?;
        let pos = match info.operator {
            Some(pos) => usize::from(pos),
            None => return Ok(None),
        };
        let base = match self.stack.len().checked_sub(usize::from(info.len)) {
            Some(base) => base,
            None => return Ok(None),
        };
        Ok(self
            .stack
            .get(base + pos)
            .and_then(|e| e.item.token())
            .and_then(|t| t.operator().cloned()))
    }

    /// Continue with the first candidate, keeping the others in a choice point.
    ///
    /// Returns `false` if there is no candidate at all.
    fn branch<E>(
        &mut self,
        mut candidates: VecDeque<Action>,
        lookahead: Lookahead<TTok>,
    ) -> Result<bool, ParseError<E, TBuild::Error>> {
        let first = match candidates.pop_front() {
            Some(first) => first,
            None => return Ok(false),
        };
        if !candidates.is_empty() {
            self.push_choice(lookahead, Alternatives::Actions(candidates))?;
        }
        self.forced = Some(first);
        Ok(true)
    }

    fn push_choice<E>(
        &mut self,
        lookahead: Lookahead<TTok>,
        alternatives: Alternatives,
    ) -> Result<(), ParseError<E, TBuild::Error>> {
        if let Some(depth) = self.config.max_choice_depth {
            if self.choices.len() >= depth {
                return Err(ParseError::ChoiceLimit { depth });
            }
        }
        self.clock = self.clock.next();
        let choice = Choice {
            stamp: self.clock,
            position: self.position,
            lookahead,
            alternatives,
        };
        tracing::debug!(
            "push choice point at token {} (token choice: {}, stamp: {:?})",
            choice.position,
            choice.is_token_choice(),
            choice.stamp
        );
        self.choices.push(choice);
        self.stats.choice_points += 1;
        self.stats.max_choice_depth = self.stats.max_choice_depth.max(self.choices.len());
        Ok(())
    }

    fn dead_end<E>(&mut self, current: StateID) -> Result<(), ParseError<E, TBuild::Error>> {
        let lookahead = match &self.lookahead {
            Some(lookahead) => lookahead.terminal(),
            None => self
                .input
                .get(self.position)
                .map_or(TerminalID::EOI, |t| t.terminal()),
        };
        let dead_end = DeadEnd {
            position: self.position,
            state: current,
            lookahead,
        };
        if self
            .farthest
            .map_or(true, |farthest| farthest.position < dead_end.position)
        {
            self.farthest = Some(dead_end);
        }

        if self.backtrack() {
            return Ok(());
        }

        let dead_end = self.farthest.take().unwrap_or(dead_end);
        let expected = self.definition.expected_terminals(dead_end.state);
        self.discard();
        Err(ParseError::Rejected {
            position: dead_end.position,
            lookahead: dead_end.lookahead,
            expected,
        })
    }

    /// Rewind to the innermost choice point and resume with its next alternative.
    ///
    /// Returns `false` if no choice point is left.
    fn backtrack(&mut self) -> bool {
        loop {
            let choice = match self.choices.last_mut() {
                Some(choice) => choice,
                None => return false,
            };
            let next = choice.alternatives.pop();
            let stamp = choice.stamp;
            let position = choice.position;
            let lookahead = choice.lookahead.clone();
            if choice.alternatives.is_empty() {
                self.choices.pop();
            }
            let next = match next {
                Some(next) => next,
                None => continue,
            };

            self.rewind(stamp);
            if self.choices.is_empty() {
                self.trail.clear();
            }
            self.position = position;
            self.forced = None;
            match next {
                Alternative::Action(action) => {
                    tracing::debug!("backtrack to token {}: try {:?}", position, action);
                    self.lookahead = Some(lookahead);
                    self.forced = Some(action);
                }
                Alternative::Reading(reading) => {
                    tracing::debug!(
                        "backtrack to token {}: read as {:?}",
                        position,
                        reading.terminal
                    );
                    self.lookahead = Some(match lookahead {
                        Lookahead::Token(token) => Lookahead::Token(token.reinterpret(
                            reading.terminal,
                            reading.operator,
                            self.clock,
                        )),
                        Lookahead::End => Lookahead::End,
                    });
                }
            }
            self.stats.backtracks += 1;
            return true;
        }
    }

    /// Undo every shift and reduction stamped at or after `stamp`, newest first.
    fn rewind(&mut self, stamp: Timestamp) {
        while self.stack.last().map_or(false, |e| e.stamp >= stamp) {
            let top = match self.stack.pop() {
                Some(top) => top,
                None => break,
            };
            if let ParseItem::N(..) = top.item {
                match self.trail.pop() {
                    Some(entry) => {
                        debug_assert!(entry.stamp >= stamp);
                        tracing::trace!("undo reduction {:?}", entry.rule);
                        self.stack.extend(entry.handle);
                        self.stats.undone_reductions += 1;
                    }
                    None => break,
                }
            }
        }
    }

    fn discard(&mut self) {
        self.stack.clear();
        self.choices.clear();
        self.trail.clear();
        self.clock = Timestamp::default();
        self.input.clear();
        self.exhausted = false;
        self.position = 0;
        self.lookahead = None;
        self.forced = None;
        self.farthest = None;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError<L, B> {
    #[error("from lexer: {0}")]
    Lexer(L),

    #[error("from node builder: {0}")]
    Builder(B),

    /// Every alternative has been exhausted without accepting the input.
    #[error("rejected the input at token {} (lookahead {:?})", position, lookahead)]
    Rejected {
        position: usize,
        lookahead: TerminalID,
        expected: Vec<TerminalID>,
    },

    #[error("exceeded the maximum number of pending choice points ({})", depth)]
    ChoiceLimit { depth: usize },

    #[error("unexpected EOI")]
    UnexpectedEOI,

    #[error("empty parser stack")]
    EmptyStack,

    #[error("missing goto from {:?} on {:?}", state, symbol)]
    MissingGoto {
        state: StateID,
        symbol: NonterminalID,
    },

    #[error("unknown rule {:?}", _0)]
    UnknownRule(RuleID),

    #[error("unknown candidate list {:?}", _0)]
    UnknownCandidates(DynamicIndex),

    #[error("unexpected item on the parser stack")]
    UnexpectedItem,
}

impl<L, B> ParseError<L, B> {
    /// Whether the input itself is unparseable, as opposed to a failure of
    /// the tokenizer, the node builder or the table.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{definition::RuleInfo, operator::Fixity};
    use std::{collections::HashMap, convert::Infallible};

    const A: TerminalID = TerminalID::from_raw(1);
    const C: TerminalID = TerminalID::from_raw(2);
    const D: TerminalID = TerminalID::from_raw(3);

    const S: NonterminalID = NonterminalID::from_raw(1);
    const X: NonterminalID = NonterminalID::from_raw(2);
    const Y: NonterminalID = NonterminalID::from_raw(3);

    /// `S := X c | Y d; X := a; Y := a;` with the reductions of `a` left
    /// undecided so that the parser has to guess.
    struct GuessingTable {
        actions: HashMap<(u16, TerminalID), Action>,
        gotos: HashMap<(u16, NonterminalID), u16>,
        rules: Vec<RuleInfo>,
        candidates: Vec<Vec<Action>>,
        operators: OperatorTable,
    }

    impl GuessingTable {
        fn new() -> Self {
            let s = StateID::from_raw;
            let r = RuleID::from_raw;
            let mut actions = HashMap::new();
            actions.insert((0, A), Action::Shift(s(1)));
            actions.insert((1, C), Action::Choice(DynamicIndex::from_raw(0)));
            actions.insert((1, D), Action::Choice(DynamicIndex::from_raw(0)));
            actions.insert((2, TerminalID::EOI), Action::Accept);
            actions.insert((3, C), Action::Shift(s(5)));
            actions.insert((4, D), Action::Shift(s(6)));
            actions.insert((5, TerminalID::EOI), Action::Reduce(r(1)));
            actions.insert((6, TerminalID::EOI), Action::Reduce(r(2)));

            let mut gotos = HashMap::new();
            gotos.insert((0, S), 2);
            gotos.insert((0, X), 3);
            gotos.insert((0, Y), 4);

            let rule = |left, len| RuleInfo {
                left,
                len,
                operator: None,
            };
            Self {
                actions,
                gotos,
                rules: vec![
                    rule(NonterminalID::START, 1),
                    rule(S, 2),
                    rule(S, 2),
                    rule(X, 1),
                    rule(Y, 1),
                ],
                candidates: vec![vec![Action::Reduce(r(4)), Action::Reduce(r(3))]],
                operators: OperatorTable::new(),
            }
        }
    }

    impl ParseTable for GuessingTable {
        fn initial_state(&self) -> StateID {
            StateID::from_raw(0)
        }

        fn action(&self, current: StateID, lookahead: TerminalID) -> Action {
            self.actions
                .get(&(current.into_raw(), lookahead))
                .copied()
                .unwrap_or(Action::Error)
        }

        fn goto(&self, current: StateID, symbol: NonterminalID) -> Option<StateID> {
            self.gotos
                .get(&(current.into_raw(), symbol))
                .map(|raw| StateID::from_raw(*raw))
        }

        fn rule(&self, rule: RuleID) -> Option<RuleInfo> {
            self.rules.get(usize::from(rule.into_raw())).copied()
        }

        fn candidates(&self, index: DynamicIndex) -> Option<&[Action]> {
            self.candidates
                .get(usize::from(index.into_raw()))
                .map(|c| &c[..])
        }

        fn expected_terminals(&self, current: StateID) -> Vec<TerminalID> {
            let mut expected: Vec<_> = self
                .actions
                .keys()
                .filter(|(state, _)| *state == current.into_raw())
                .map(|(_, t)| *t)
                .collect();
            expected.sort();
            expected
        }

        fn operators(&self) -> &OperatorTable {
            &self.operators
        }

        fn operator_terminal(&self, _: NonterminalID, _: Fixity) -> Option<TerminalID> {
            None
        }

        fn nonterminal_name(&self, _: NonterminalID) -> Option<&str> {
            None
        }
    }

    #[derive(Debug)]
    struct Tok(TerminalID, &'static str);

    impl Token for Tok {
        fn terminal(&self) -> TerminalID {
            self.0
        }
    }

    /// Renders reductions as `R<n>(...)`.
    struct Printer;

    impl NodeBuilder<Tok> for Printer {
        type Node = String;
        type Error = Infallible;

        fn reduce(
            &mut self,
            rule: RuleID,
            handle: Handle<'_, Tok, String>,
        ) -> Result<String, Infallible> {
            let args: Vec<String> = handle
                .iter()
                .map(|item| match item {
                    ParseItem::T(t) => t.original().1.to_owned(),
                    ParseItem::N(n) => n.clone(),
                })
                .collect();
            Ok(format!("R{}({})", rule.into_raw(), args.join(" ")))
        }
    }

    fn tokens(input: &[Tok]) -> impl Iterator<Item = Result<Tok, Infallible>> + '_ {
        input.iter().map(|Tok(t, s)| Ok(Tok(*t, s)))
    }

    #[test]
    fn backtrack_wrong_guess() {
        let mut parser = Parser::new(GuessingTable::new(), Printer);
        let input = [Tok(A, "a"), Tok(C, "c")];
        let node = parser.parse(tokens(&input)).unwrap();
        assert_eq!(node, "R1(R3(a) c)");

        let stats = parser.stats();
        assert_eq!(stats.choice_points, 1);
        assert_eq!(stats.backtracks, 1);
        assert_eq!(stats.undone_reductions, 1);
        assert_eq!(stats.choices_at_accept, 0);
        assert_eq!(stats.trail_at_accept, 0);
    }

    #[test]
    fn first_guess_succeeds() {
        let mut parser = Parser::new(GuessingTable::new(), Printer);
        let input = [Tok(A, "a"), Tok(D, "d")];
        let node = parser.parse(tokens(&input)).unwrap();
        assert_eq!(node, "R2(R4(a) d)");

        let stats = parser.stats();
        assert_eq!(stats.backtracks, 0);
        assert_eq!(stats.choices_at_accept, 1);
        // `Y := a` and `S := Y d` both happen while the choice is pending.
        assert_eq!(stats.trail_at_accept, 2);
    }

    #[test]
    fn exhausted_choices_reject() {
        let mut parser = Parser::new(GuessingTable::new(), Printer);
        let input = [Tok(A, "a"), Tok(A, "a")];
        let err = parser.parse(tokens(&input)).unwrap_err();
        assert!(err.is_rejection());
        match err {
            ParseError::Rejected {
                position,
                lookahead,
                ..
            } => {
                assert_eq!(position, 1);
                assert_eq!(lookahead, A);
            }
            err => panic!("unexpected error: {}", err),
        }
        assert_eq!(parser.stats().backtracks, 0);
    }

    #[test]
    fn choice_limit() {
        let config = ParserConfig::new().max_choice_depth(0);
        let mut parser = Parser::with_config(GuessingTable::new(), Printer, config);
        let input = [Tok(A, "a"), Tok(C, "c")];
        let err = parser.parse(tokens(&input)).unwrap_err();
        assert!(matches!(err, ParseError::ChoiceLimit { depth: 0 }));
    }

    #[test]
    fn parser_is_reusable() {
        let table = GuessingTable::new();
        let mut parser = Parser::new(&table, Printer);
        let first = [Tok(A, "a"), Tok(C, "c")];
        let second = [Tok(A, "a"), Tok(D, "d")];
        assert_eq!(parser.parse(tokens(&first)).unwrap(), "R1(R3(a) c)");
        assert_eq!(parser.parse(tokens(&second)).unwrap(), "R2(R4(a) d)");
    }
}
