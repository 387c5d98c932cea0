//! Grammar types.

use crate::{
    types::{Map, Set},
    util::display_fn,
};
pub use dynlr_runtime::{
    definition::{NonterminalID, RuleID, TerminalID},
    operator::{compare_names, Assoc, Fixity, Operator, OperatorError, OperatorTable, Specifier},
};
use std::{cmp::Ordering, fmt, marker::PhantomData, sync::Arc};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TerminalKind {
    /// An ordinary token kind produced by the tokenizer.
    Plain,
    /// A terminal that only carries a precedence for rule tags.
    Tag,
    /// The sub-category terminal standing for every operator of a category
    /// with the given fixity.
    Operator {
        category: NonterminalID,
        fixity: Fixity,
    },
}

#[derive(Debug)]
pub struct Terminal {
    id: TerminalID,
    name: String,
    precedence: Option<Precedence>,
    kind: TerminalKind,
}

impl Terminal {
    pub fn id(&self) -> TerminalID {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn precedence(&self) -> Option<Precedence> {
        self.precedence
    }

    pub fn kind(&self) -> TerminalKind {
        self.kind
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.kind, TerminalKind::Tag)
    }

    pub fn is_operator(&self) -> bool {
        matches!(self.kind, TerminalKind::Operator { .. })
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug)]
pub struct Nonterminal {
    id: NonterminalID,
    name: String,
}

impl Nonterminal {
    pub fn id(&self) -> NonterminalID {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Nonterminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolID {
    T(TerminalID),
    N(NonterminalID),
}

/// The type that represents a production rule in grammar.
#[derive(Debug)]
pub struct Rule {
    id: RuleID,
    left: NonterminalID,
    right: Vec<SymbolID>,
    tag: Option<TerminalID>,
}

impl Rule {
    pub fn id(&self) -> RuleID {
        self.id
    }

    /// Return the left-hand side of this production.
    pub fn left(&self) -> NonterminalID {
        self.left
    }

    /// Return the right-hand side of this production.
    pub fn right(&self) -> &[SymbolID] {
        &self.right[..]
    }

    pub fn tag(&self) -> Option<TerminalID> {
        self.tag
    }

    /// The terminal whose precedence this rule takes: the tag if any,
    /// otherwise the last terminal of the right-hand side.
    pub fn precedence_terminal(&self) -> Option<TerminalID> {
        self.tag.or_else(|| {
            self.right.iter().rev().find_map(|symbol| match symbol {
                SymbolID::T(t) => Some(*t),
                SymbolID::N(..) => None,
            })
        })
    }

    pub fn precedence(&self, g: &Grammar) -> Option<Precedence> {
        self.precedence_terminal()
            .and_then(|t| g.terminals.get(&t))
            .and_then(Terminal::precedence)
    }

    /// The position in the right-hand side of the operator terminal that
    /// decides the precedence of this rule at parse time.
    pub fn operator_position(&self, g: &Grammar) -> Option<u16> {
        if self.tag.is_some() {
            return None;
        }
        let (pos, t) = self
            .right
            .iter()
            .enumerate()
            .rev()
            .find_map(|(pos, symbol)| match symbol {
                SymbolID::T(t) => Some((pos, *t)),
                SymbolID::N(..) => None,
            })?;
        if g.terminals.get(&t).map_or(false, Terminal::is_operator) {
            u16::try_from(pos).ok()
        } else {
            None
        }
    }

    // `"LHS := R1 R2 R3"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} :=", g.nonterminals[&self.left])?;
            if self.right.is_empty() {
                f.write_str(" %empty")?;
            }
            for symbol in &self.right {
                write!(f, " {}", g.symbol_name(*symbol))?;
            }
            if let Some(tag) = self.tag {
                write!(f, " %prec {}", g.terminals[&tag])?;
            }
            Ok(())
        })
    }
}

/// The static precedence of a terminal. A higher priority binds tighter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Precedence {
    pub priority: u16,
    pub assoc: Assoc,
}

impl Precedence {
    pub const fn new(priority: u16, assoc: Assoc) -> Self {
        Self { priority, assoc }
    }
}

impl Default for Precedence {
    fn default() -> Self {
        Self::new(0, Assoc::Nonassoc)
    }
}

/// The grammar definition used to derive the parser tables.
#[derive(Debug)]
#[non_exhaustive]
pub struct Grammar {
    pub terminals: Map<TerminalID, Terminal>,
    pub nonterminals: Map<NonterminalID, Nonterminal>,
    pub rules: Map<RuleID, Rule>,
    pub start_symbol: NonterminalID,
    /// The operators known before any input is parsed.
    pub operators: OperatorTable,
    operator_terminals: Map<(NonterminalID, Fixity), TerminalID>,
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## terminals:")?;
        for t in self.sorted_terminals() {
            let terminal = &self.terminals[&t];
            write!(f, "{}", terminal)?;
            match terminal.kind() {
                TerminalKind::Plain => (),
                TerminalKind::Tag => write!(f, " (tag)")?,
                TerminalKind::Operator { category, fixity } => {
                    write!(f, " ({} operators of {})", fixity, self.nonterminals[&category])?
                }
            }
            if let Some(prec) = terminal.precedence() {
                write!(f, " (priority={}, assoc={})", prec.priority, prec.assoc)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## nonterminals:")?;
        for n in self.sorted_nonterminals() {
            write!(f, "{}", self.nonterminals[&n])?;
            if n == self.start_symbol {
                write!(f, " (start)")?;
            }
            writeln!(f)?;
        }

        if !self.operators.is_empty() {
            writeln!(f, "\n## operators:")?;
            let mut operators: Vec<_> = self.operators.iter().collect();
            operators.sort();
            for op in operators {
                writeln!(f, "{}", op)?;
            }
        }

        writeln!(f, "\n## rules:")?;
        for rule in self.rules.values() {
            writeln!(f, "{}", rule.display(self))?;
        }

        Ok(())
    }
}

impl Grammar {
    /// Define a grammar using the specified function.
    pub fn define<F>(f: F) -> Result<Self, GrammarDefError>
    where
        F: FnOnce(&mut GrammarDef) -> Result<(), GrammarDefError>,
    {
        let mut def = GrammarDef {
            terminals: Map::default(),
            nonterminals: Map::default(),
            rules: Map::default(),
            start: None,
            operators: OperatorTable::new(),
            operator_terminals: Map::default(),
            next_terminal_id: 1,
            next_nonterminal_id: 1,
            next_rule_id: 1,
            _marker: PhantomData,
        };

        def.terminals.insert(
            TerminalID::EOI,
            Terminal {
                id: TerminalID::EOI,
                name: "$eoi".into(),
                precedence: None,
                kind: TerminalKind::Plain,
            },
        );
        def.nonterminals.insert(
            NonterminalID::START,
            Nonterminal {
                id: NonterminalID::START,
                name: "$start".into(),
            },
        );

        f(&mut def)?;

        def.end()
    }

    pub fn rule(&self, id: RuleID) -> &Rule {
        &self.rules[&id]
    }

    pub fn symbol_name(&self, symbol: SymbolID) -> &str {
        match symbol {
            SymbolID::T(t) => self.terminals.get(&t).map_or("<unknown>", |t| t.name()),
            SymbolID::N(n) => self.nonterminals.get(&n).map_or("<unknown>", |n| n.name()),
        }
    }

    /// The terminal standing for the operators of `category` with the specified fixity.
    pub fn operator_terminal(&self, category: NonterminalID, fixity: Fixity) -> Option<TerminalID> {
        self.operator_terminals.get(&(category, fixity)).copied()
    }

    pub fn operator_terminals(
        &self,
    ) -> impl Iterator<Item = (NonterminalID, Fixity, TerminalID)> + '_ {
        self.operator_terminals
            .iter()
            .map(|(&(category, fixity), &t)| (category, fixity, t))
    }

    /// Compare two symbols for reporting purposes: terminals come before
    /// nonterminals and each kind is ordered by name.
    pub fn compare_symbols(&self, a: SymbolID, b: SymbolID) -> Ordering {
        match (a, b) {
            (SymbolID::T(..), SymbolID::N(..)) => Ordering::Less,
            (SymbolID::N(..), SymbolID::T(..)) => Ordering::Greater,
            _ => compare_names(self.symbol_name(a), self.symbol_name(b)).then_with(|| a.cmp(&b)),
        }
    }

    pub fn sorted_terminals(&self) -> Vec<TerminalID> {
        let mut terminals: Vec<_> = self.terminals.keys().copied().collect();
        terminals.sort_by(|a, b| self.compare_symbols(SymbolID::T(*a), SymbolID::T(*b)));
        terminals
    }

    pub fn sorted_nonterminals(&self) -> Vec<NonterminalID> {
        let mut nonterminals: Vec<_> = self.nonterminals.keys().copied().collect();
        nonterminals.sort_by(|a, b| self.compare_symbols(SymbolID::N(*a), SymbolID::N(*b)));
        nonterminals
    }

    /// Terminals declared but never used in a right-hand side.
    pub fn unused_terminals(&self) -> Vec<TerminalID> {
        let used: Set<TerminalID> = self
            .rules
            .values()
            .flat_map(|rule| rule.right.iter())
            .filter_map(|symbol| match symbol {
                SymbolID::T(t) => Some(*t),
                SymbolID::N(..) => None,
            })
            .collect();
        self.terminals
            .values()
            .filter(|t| t.id() != TerminalID::EOI && !t.is_tag() && !used.contains(&t.id()))
            .map(Terminal::id)
            .collect()
    }

    /// Nonterminals that no derivation from the start symbol reaches.
    pub fn unreachable_nonterminals(&self) -> Vec<NonterminalID> {
        let mut reachable = Set::default();
        reachable.insert(NonterminalID::START);
        let mut pending = vec![NonterminalID::START];
        while let Some(n) = pending.pop() {
            for rule in self.rules.values().filter(|rule| rule.left == n) {
                for symbol in &rule.right {
                    if let SymbolID::N(m) = symbol {
                        if reachable.insert(*m) {
                            pending.push(*m);
                        }
                    }
                }
            }
        }
        self.nonterminals
            .keys()
            .filter(|n| !reachable.contains(*n))
            .copied()
            .collect()
    }
}

/// The contextural values for building a `Grammar`.
#[derive(Debug)]
pub struct GrammarDef<'def> {
    terminals: Map<TerminalID, Terminal>,
    nonterminals: Map<NonterminalID, Nonterminal>,
    rules: Map<RuleID, Rule>,
    start: Option<NonterminalID>,
    operators: OperatorTable,
    operator_terminals: Map<(NonterminalID, Fixity), TerminalID>,
    next_terminal_id: u16,
    next_nonterminal_id: u16,
    next_rule_id: u16,
    _marker: PhantomData<&'def mut ()>,
}

impl<'def> GrammarDef<'def> {
    /// Declare a terminal symbol used in this grammar.
    pub fn terminal(
        &mut self,
        name: &str,
        precedence: Option<Precedence>,
    ) -> Result<TerminalID, GrammarDefError> {
        self.add_terminal(name, precedence, TerminalKind::Plain)
    }

    /// Declare a terminal that only serves as a precedence tag of rules.
    pub fn tag(
        &mut self,
        name: &str,
        precedence: Precedence,
    ) -> Result<TerminalID, GrammarDefError> {
        self.add_terminal(name, Some(precedence), TerminalKind::Tag)
    }

    /// Declare a nonterminal symbol used in this grammar.
    pub fn nonterminal(&mut self, name: &str) -> Result<NonterminalID, GrammarDefError> {
        if name.is_empty() {
            return Err("empty nonterminal name".into());
        }
        if self.nonterminals.values().any(|n| n.name == name) {
            return Err(format!("The nonterminal `{}' has already been declared", name).into());
        }

        let id = NonterminalID::from_raw(next_id(&mut self.next_nonterminal_id, "nonterminals")?);
        self.nonterminals.insert(
            id,
            Nonterminal {
                id,
                name: name.to_owned(),
            },
        );

        Ok(id)
    }

    /// Return the terminal standing for the operators of `category` with
    /// the specified fixity, declaring it on first use.
    pub fn operator_terminal(
        &mut self,
        category: NonterminalID,
        fixity: Fixity,
    ) -> Result<TerminalID, GrammarDefError> {
        if let Some(t) = self.operator_terminals.get(&(category, fixity)) {
            return Ok(*t);
        }
        let category_name = match self.nonterminals.get(&category) {
            Some(n) if category != NonterminalID::START => n.name.clone(),
            _ => return Err(format!("unknown operator category: {:?}", category).into()),
        };
        let name = format!("{}${}", category_name, fixity);
        let t = self.add_terminal(&name, None, TerminalKind::Operator { category, fixity })?;
        self.operator_terminals.insert((category, fixity), t);
        Ok(t)
    }

    /// Declare an operator known before any input is parsed.
    pub fn operator(
        &mut self,
        name: &str,
        specifier: &str,
        priority: u16,
        category: NonterminalID,
    ) -> Result<Arc<Operator>, GrammarDefError> {
        let specifier = Specifier::decode(specifier)?;
        if priority == 0 {
            return Err(format!("the operator `{}' must have a positive priority", name).into());
        }
        let terminal = self.operator_terminal(category, specifier.fixity)?;
        let category_name = self.nonterminals[&category].name.clone();
        let op = Operator::new(name, specifier, priority, category, &category_name, terminal)?;
        self.operators.define(op);
        self.operators
            .lookup(name)
            .iter()
            .find(|op| op.category() == category && op.fixity() == specifier.fixity)
            .cloned()
            .ok_or_else(|| format!("failed to register the operator `{}'", name).into())
    }

    /// Specify a production rule into this grammer.
    pub fn rule<I>(
        &mut self,
        left: NonterminalID,
        right: I,
        tag: Option<TerminalID>,
    ) -> Result<RuleID, GrammarDefError>
    where
        I: IntoIterator<Item = SymbolID>,
    {
        if left == NonterminalID::START || !self.nonterminals.contains_key(&left) {
            return Err(format!("invalid left-hand side: {:?}", left).into());
        }

        let right: Vec<_> = right.into_iter().collect();
        if u16::try_from(right.len()).is_err() {
            return Err(format!("too long right-hand side ({} symbols)", right.len()).into());
        }
        for symbol in &right {
            match symbol {
                SymbolID::T(t) => match self.terminals.get(t) {
                    Some(terminal) if terminal.is_tag() => {
                        return Err(format!(
                            "The tag `{}' cannot appear in a right-hand side",
                            terminal.name
                        )
                        .into())
                    }
                    Some(..) if *t != TerminalID::EOI => (),
                    _ => return Err(format!("invalid terminal in rule: {:?}", t).into()),
                },
                SymbolID::N(n) => {
                    if *n == NonterminalID::START || !self.nonterminals.contains_key(n) {
                        return Err(format!("invalid nonterminal in rule: {:?}", n).into());
                    }
                }
            }
        }

        if let Some(tag) = tag {
            if tag == TerminalID::EOI || !self.terminals.contains_key(&tag) {
                return Err(format!("invalid precedence tag: {:?}", tag).into());
            }
        }

        if self
            .rules
            .values()
            .any(|rule| rule.left == left && rule.right == right)
        {
            return Err("Duplicate production rule detected".into());
        }

        let id = RuleID::from_raw(next_id(&mut self.next_rule_id, "rules")?);
        self.rules.insert(
            id,
            Rule {
                id,
                left,
                right,
                tag,
            },
        );

        Ok(id)
    }

    /// Specify the start symbol for this grammar.
    pub fn start_symbol(&mut self, symbol: NonterminalID) -> Result<(), GrammarDefError> {
        if symbol == NonterminalID::START || !self.nonterminals.contains_key(&symbol) {
            return Err(format!("invalid start symbol: {:?}", symbol).into());
        }
        self.start.replace(symbol);
        Ok(())
    }

    fn add_terminal(
        &mut self,
        name: &str,
        precedence: Option<Precedence>,
        kind: TerminalKind,
    ) -> Result<TerminalID, GrammarDefError> {
        if name.is_empty() {
            return Err("empty terminal name".into());
        }
        if self.terminals.values().any(|t| t.name == name) {
            return Err(format!("The terminal `{}' has already been declared", name).into());
        }

        let id = TerminalID::from_raw(next_id(&mut self.next_terminal_id, "terminals")?);
        self.terminals.insert(
            id,
            Terminal {
                id,
                name: name.to_owned(),
                precedence,
                kind,
            },
        );

        Ok(id)
    }

    fn end(mut self) -> Result<Grammar, GrammarDefError> {
        // The first declared nonterminal is the default start symbol.
        let start = match self.start.take() {
            Some(start) => start,
            None => self
                .nonterminals
                .keys()
                .find(|id| **id != NonterminalID::START)
                .copied()
                .ok_or("empty nonterminal symbols")?,
        };

        let mut rules = Map::default();
        rules.insert(
            RuleID::ACCEPT,
            Rule {
                id: RuleID::ACCEPT,
                left: NonterminalID::START,
                right: vec![SymbolID::N(start)],
                tag: None,
            },
        );
        rules.extend(self.rules.drain(..));

        let defined: Set<NonterminalID> = rules.values().map(|rule| rule.left).collect();
        for rule in rules.values() {
            for symbol in &rule.right {
                if let SymbolID::N(n) = symbol {
                    if !defined.contains(n) {
                        return Err(format!(
                            "The nonterminal `{}' is used but has no production rules",
                            self.nonterminals[n].name
                        )
                        .into());
                    }
                }
            }
        }

        Ok(Grammar {
            terminals: self.terminals,
            nonterminals: self.nonterminals,
            rules,
            start_symbol: start,
            operators: self.operators,
            operator_terminals: self.operator_terminals,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarDefError {
    #[error("operator error: {}", _0)]
    Operator(
        #[from]
        #[source]
        OperatorError,
    ),

    #[error("Other error: {}", msg)]
    Other { msg: String },
}

/// Take the next raw index from `counter`.
fn next_id(counter: &mut u16, what: &str) -> Result<u16, GrammarDefError> {
    let id = *counter;
    *counter = id
        .checked_add(1)
        .ok_or_else(|| format!("too many {}", what))?;
    Ok(id)
}

impl From<&str> for GrammarDefError {
    fn from(msg: &str) -> Self {
        Self::Other { msg: msg.into() }
    }
}
impl From<String> for GrammarDefError {
    fn from(msg: String) -> Self {
        Self::Other { msg }
    }
}
