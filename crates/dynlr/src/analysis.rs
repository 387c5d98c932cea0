//! Nullability, FIRST sets and rule paths.
//!
//! A rule path from `A` to `C` is a chain of rules `A := B β1`,
//! `B := .. β2`, ..., `.. := C βk` along which `A` derives `C βk .. β1`.
//! The paths are discovered backward from `C`, so the FIRST set and the
//! nullability of the trailing `βk .. β1` can be accumulated one rule at a
//! time.

use crate::{
    grammar::{Grammar, NonterminalID, RuleID, SymbolID, TerminalID},
    types::{Map, Set, TerminalSet},
    util::display_fn,
};
use std::{collections::VecDeque, fmt};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("cyclic derivation: `{}' derives itself", name)]
    CyclicDerivation { symbol: NonterminalID, name: String },
}

/// FIRST set and nullability of the right-hand side of a rule, minus its
/// leading symbol.
#[derive(Debug, Clone, Default)]
struct Suffix {
    first: TerminalSet,
    nullable: bool,
}

/// A chain of rules leading from `start` to `end` through leftmost nonterminals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulePath {
    start: NonterminalID,
    end: NonterminalID,
    /// Innermost rule first.
    rules: Vec<RuleID>,
    first: TerminalSet,
    nullable: bool,
}

impl RulePath {
    /// The empty path from `symbol` to itself.
    pub fn empty(symbol: NonterminalID) -> Self {
        Self {
            start: symbol,
            end: symbol,
            rules: vec![],
            first: TerminalSet::new(),
            nullable: true,
        }
    }

    pub fn start(&self) -> NonterminalID {
        self.start
    }

    pub fn end(&self) -> NonterminalID {
        self.end
    }

    /// The rules of this path, innermost first.
    pub fn rules(&self) -> &[RuleID] {
        &self.rules
    }

    /// The terminals that may follow `end` within the derivations of this path.
    pub fn first(&self) -> &TerminalSet {
        &self.first
    }

    /// Whether the symbols following `end` within this path may vanish.
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Return a copy of this path extended by an outer rule `left := start suffix`.
    fn prepend(&self, rule: RuleID, left: NonterminalID, suffix: &Suffix) -> Self {
        let mut path = self.clone();
        path.start = left;
        path.rules.push(rule);
        if self.nullable {
            path.first.union_with(&suffix.first);
        }
        path.nullable = self.nullable && suffix.nullable;
        path
    }
}

/// The rule paths between a pair of nonterminals.
#[derive(Debug, Clone, Default)]
pub struct Paths {
    paths: Vec<RulePath>,
    first: TerminalSet,
    nullable: bool,
}

impl Paths {
    /// Add a path unless the paths already present subsume it.
    ///
    /// Returns whether the path was added.
    pub fn add(&mut self, path: RulePath) -> bool {
        let subsumed = !self.paths.is_empty()
            && path.first.is_subset(&self.first)
            && (self.nullable || !path.nullable);
        if subsumed {
            return false;
        }
        self.first.union_with(&path.first);
        self.nullable |= path.nullable;
        self.paths.push(path);
        true
    }

    /// The union of the FIRST sets of every path.
    pub fn first(&self) -> &TerminalSet {
        &self.first
    }

    /// Whether some path is nullable.
    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn iter(&self) -> impl Iterator<Item = &RulePath> + '_ {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug)]
pub struct Analysis {
    nullables: Set<NonterminalID>,
    firsts: Map<NonterminalID, TerminalSet>,
    suffixes: Map<RuleID, Suffix>,
    /// Keyed by the start and then the end of the paths.
    paths: Map<NonterminalID, Map<NonterminalID, Paths>>,
}

impl Analysis {
    pub fn new(g: &Grammar) -> Result<Self, AnalysisError> {
        let nullables = nullables(g);
        let firsts = first_sets(g, &nullables);

        let mut analysis = Self {
            nullables,
            firsts,
            suffixes: Map::default(),
            paths: Map::default(),
        };

        for (&id, rule) in &g.rules {
            let rest = rule.right().get(1..).unwrap_or(&[]);
            let (first, nullable) = analysis.first_of(rest);
            analysis.suffixes.insert(id, Suffix { first, nullable });
        }

        analysis.paths = rule_paths(g, &analysis.suffixes)?;

        Ok(analysis)
    }

    pub fn is_nullable(&self, symbol: NonterminalID) -> bool {
        self.nullables.contains(&symbol)
    }

    pub fn first(&self, symbol: NonterminalID) -> Option<&TerminalSet> {
        self.firsts.get(&symbol)
    }

    /// `First(symbols)`, and whether every symbol is nullable.
    pub fn first_of(&self, symbols: &[SymbolID]) -> (TerminalSet, bool) {
        let mut first = TerminalSet::new();
        for symbol in symbols {
            match symbol {
                SymbolID::T(t) => {
                    first.insert(*t);
                    return (first, false);
                }
                SymbolID::N(n) => {
                    if let Some(added) = self.firsts.get(n) {
                        first.union_with(added);
                    }
                    if !self.nullables.contains(n) {
                        return (first, false);
                    }
                }
            }
        }
        (first, true)
    }

    pub fn paths(&self, start: NonterminalID, end: NonterminalID) -> Option<&Paths> {
        self.paths.get(&start).and_then(|paths| paths.get(&end))
    }

    /// Every path bucket starting at `start`, keyed by its end.
    pub fn paths_from(
        &self,
        start: NonterminalID,
    ) -> impl Iterator<Item = (NonterminalID, &Paths)> + '_ {
        self.paths
            .get(&start)
            .into_iter()
            .flat_map(|paths| paths.iter().map(|(end, paths)| (*end, paths)))
    }

    /// The nonterminals whose rules enter the closure of an item with the
    /// dot before `symbol`, `symbol` itself included.
    pub fn closure_targets(
        &self,
        symbol: NonterminalID,
    ) -> impl Iterator<Item = NonterminalID> + '_ {
        self.paths_from(symbol).map(|(end, _)| end)
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        let terminals = move |set: &'g TerminalSet| {
            display_fn(move |f| {
                let mut names: Vec<_> = set.iter().map(|t| g.terminals[&t].name()).collect();
                names.sort_by(|a, b| crate::grammar::compare_names(a, b));
                write!(f, "{{{}}}", names.join(", "))
            })
        };
        display_fn(move |f| {
            writeln!(f, "## nullables:")?;
            for n in g.sorted_nonterminals() {
                if self.nullables.contains(&n) {
                    writeln!(f, "- {}", g.nonterminals[&n])?;
                }
            }

            writeln!(f, "\n## first sets:")?;
            for n in g.sorted_nonterminals() {
                if let Some(first) = self.firsts.get(&n) {
                    writeln!(f, "- {}: {}", g.nonterminals[&n], terminals(first))?;
                }
            }

            writeln!(f, "\n## rule paths:")?;
            for start in g.sorted_nonterminals() {
                for end in g.sorted_nonterminals() {
                    let paths = match self.paths(start, end) {
                        Some(paths) => paths,
                        None => continue,
                    };
                    write!(
                        f,
                        "- {} -> {}: {}",
                        g.nonterminals[&start],
                        g.nonterminals[&end],
                        terminals(paths.first())
                    )?;
                    if paths.nullable() {
                        write!(f, " (nullable)")?;
                    }
                    writeln!(f)?;
                }
            }
            Ok(())
        })
    }
}

/// Calculate the set of nullable nonterminals in this grammar.
fn nullables(g: &Grammar) -> Set<NonterminalID> {
    let mut nullables = Set::default();
    let mut changed = true;
    while changed {
        changed = false;
        for rule in g.rules.values() {
            if nullables.contains(&rule.left()) {
                continue;
            }
            let nullable = rule.right().iter().all(|symbol| match symbol {
                SymbolID::T(..) => false,
                SymbolID::N(n) => nullables.contains(n),
            });
            if nullable {
                nullables.insert(rule.left());
                changed = true;
            }
        }
    }
    nullables
}

fn first_sets(g: &Grammar, nullables: &Set<NonterminalID>) -> Map<NonterminalID, TerminalSet> {
    let mut firsts: Map<NonterminalID, TerminalSet> = g
        .nonterminals
        .keys()
        .map(|n| (*n, TerminalSet::new()))
        .collect();

    // For `X := Y1 .. Yn` with `Y1 .. Y(k-1)` nullable and `Yk` not,
    // First(X) includes First(Yi) for each i <= k.
    enum Source {
        T(TerminalID),
        N(NonterminalID),
    }
    let mut constraints = vec![];
    for rule in g.rules.values() {
        for symbol in rule.right() {
            match symbol {
                SymbolID::T(t) => {
                    constraints.push((rule.left(), Source::T(*t)));
                    break;
                }
                SymbolID::N(n) => {
                    if *n != rule.left() {
                        constraints.push((rule.left(), Source::N(*n)));
                    }
                    if !nullables.contains(n) {
                        break;
                    }
                }
            }
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for (sup, sub) in &constraints {
            let added = match sub {
                Source::T(t) => Some(*t).into_iter().collect(),
                Source::N(n) => firsts.get(n).cloned().unwrap_or_default(),
            };
            if let Some(first) = firsts.get_mut(sup) {
                changed |= first.union_with(&added);
            }
        }
    }

    firsts
}

fn rule_paths(
    g: &Grammar,
    suffixes: &Map<RuleID, Suffix>,
) -> Result<Map<NonterminalID, Map<NonterminalID, Paths>>, AnalysisError> {
    // The rules whose right-hand side starts with each nonterminal.
    let mut leading: Map<NonterminalID, Vec<RuleID>> = Map::default();
    for (&id, rule) in &g.rules {
        if let Some(SymbolID::N(n)) = rule.right().first() {
            leading.entry(*n).or_default().push(id);
        }
    }

    let mut paths: Map<NonterminalID, Map<NonterminalID, Paths>> = Map::default();
    let mut pending = VecDeque::new();
    for &end in g.nonterminals.keys() {
        let empty = RulePath::empty(end);
        paths
            .entry(end)
            .or_default()
            .entry(end)
            .or_default()
            .add(empty.clone());
        pending.push_back(empty);

        while let Some(path) = pending.pop_front() {
            for &id in leading.get(&path.start).into_iter().flatten() {
                let rule = &g.rules[&id];
                let suffix = &suffixes[&id];
                let extended = path.prepend(id, rule.left(), suffix);
                if extended.start == extended.end && extended.nullable {
                    return Err(AnalysisError::CyclicDerivation {
                        symbol: end,
                        name: g.nonterminals[&end].name().to_owned(),
                    });
                }
                let added = paths
                    .entry(extended.start)
                    .or_default()
                    .entry(end)
                    .or_default()
                    .add(extended.clone());
                if added {
                    pending.push_back(extended);
                }
            }
        }
    }

    Ok(paths)
}
