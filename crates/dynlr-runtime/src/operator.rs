//! Dynamic operators.
//!
//! An operator is declared with a Prolog-style specifier such as `yfx` or
//! `fy`. The position of `f` gives the fixity and the argument letters give
//! the associativity: an `x` argument must bind strictly tighter than the
//! operator itself, a `y` argument may bind equally tight.
//!
//! Operator priorities follow the Prolog convention: a smaller priority
//! binds tighter.

use crate::definition::{NonterminalID, TerminalID};
use std::{cmp::Ordering, collections::BTreeMap, fmt, sync::Arc};

/// The largest priority an operator may have.
pub const MAX_PRIORITY: u16 = 1200;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fixity {
    Prefix,
    Infix,
    Postfix,
}

impl fmt::Display for Fixity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix => f.write_str("prefix"),
            Self::Infix => f.write_str("infix"),
            Self::Postfix => f.write_str("postfix"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}

impl fmt::Display for Assoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Nonassoc => write!(f, "nonassoc"),
        }
    }
}

/// The decoded form of an operator specifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    pub fixity: Fixity,
    pub assoc: Assoc,
}

impl Specifier {
    /// Decode a specifier string such as `"yfx"`.
    pub fn decode(s: &str) -> Result<Self, OperatorError> {
        let (fixity, assoc) = match s {
            "fy" => (Fixity::Prefix, Assoc::Right),
            "fx" => (Fixity::Prefix, Assoc::Nonassoc),
            "yf" => (Fixity::Postfix, Assoc::Left),
            "xf" => (Fixity::Postfix, Assoc::Nonassoc),
            "yfx" => (Fixity::Infix, Assoc::Left),
            "xfy" => (Fixity::Infix, Assoc::Right),
            "xfx" => (Fixity::Infix, Assoc::Nonassoc),
            _ => return Err(OperatorError::BadSpecifier(s.to_owned())),
        };
        Ok(Self { fixity, assoc })
    }

    fn has_left_argument(&self) -> bool {
        matches!(self.fixity, Fixity::Infix | Fixity::Postfix)
    }

    fn has_right_argument(&self) -> bool {
        matches!(self.fixity, Fixity::Prefix | Fixity::Infix)
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match (self.fixity, self.assoc) {
            (Fixity::Prefix, Assoc::Right) => "fy",
            (Fixity::Prefix, _) => "fx",
            (Fixity::Postfix, Assoc::Left) => "yf",
            (Fixity::Postfix, _) => "xf",
            (Fixity::Infix, Assoc::Left) => "yfx",
            (Fixity::Infix, Assoc::Right) => "xfy",
            (Fixity::Infix, Assoc::Nonassoc) => "xfx",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperatorError {
    #[error("bad operator specifier: `{}'", _0)]
    BadSpecifier(String),

    #[error("operator priority {} is out of range (0..={})", _0, MAX_PRIORITY)]
    PriorityOutOfRange(u16),

    #[error("the grammar has no {} operators for category {:?}", fixity, category)]
    MissingOperatorTerminal {
        category: NonterminalID,
        fixity: Fixity,
    },
}

/// An operator definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operator {
    name: String,
    category: NonterminalID,
    category_name: String,
    specifier: Specifier,
    priority: u16,
    terminal: TerminalID,
}

impl Operator {
    /// Create an operator definition.
    ///
    /// `terminal` is the sub-category terminal of `category` for the fixity
    /// of the specifier.
    pub fn new(
        name: &str,
        specifier: Specifier,
        priority: u16,
        category: NonterminalID,
        category_name: &str,
        terminal: TerminalID,
    ) -> Result<Self, OperatorError> {
        if priority > MAX_PRIORITY {
            return Err(OperatorError::PriorityOutOfRange(priority));
        }
        Ok(Self {
            name: name.to_owned(),
            category,
            category_name: category_name.to_owned(),
            specifier,
            priority,
            terminal,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> NonterminalID {
        self.category
    }

    pub fn category_name(&self) -> &str {
        &self.category_name
    }

    pub fn specifier(&self) -> Specifier {
        self.specifier
    }

    pub fn fixity(&self) -> Fixity {
        self.specifier.fixity
    }

    pub fn assoc(&self) -> Assoc {
        self.specifier.assoc
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    /// The terminal symbol this operator is read as.
    pub fn terminal(&self) -> TerminalID {
        self.terminal
    }

    /// The largest priority accepted for the left argument, if any.
    pub fn left_max(&self) -> Option<u16> {
        if !self.specifier.has_left_argument() {
            return None;
        }
        Some(match self.specifier.assoc {
            Assoc::Left => self.priority,
            _ => self.priority.saturating_sub(1),
        })
    }

    /// The largest priority accepted for the right argument, if any.
    pub fn right_max(&self) -> Option<u16> {
        if !self.specifier.has_right_argument() {
            return None;
        }
        Some(match self.specifier.assoc {
            Assoc::Right => self.priority,
            _ => self.priority.saturating_sub(1),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "op({}, {}, {}) in {}",
            self.priority, self.specifier, self.name, self.category_name
        )
    }
}

impl PartialOrd for Operator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Operator {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_ignore_case(&self.category_name, &other.category_name)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| cmp_ignore_case(&self.name, &other.name))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.category.cmp(&other.category))
            .then_with(|| self.specifier.fixity.cmp(&other.specifier.fixity))
    }
}

/// Compare symbol names for reports.
///
/// A leading run of characters that are neither letters nor digits is
/// ignored, and letters are compared case-insensitively.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let strip = |s: &str| s.trim_start_matches(|ch: char| !ch.is_alphanumeric()).to_owned();
    cmp_ignore_case(&strip(a), &strip(b)).then_with(|| a.cmp(b))
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    let a = a.chars().flat_map(char::to_lowercase);
    let b = b.chars().flat_map(char::to_lowercase);
    a.cmp(b)
}

/// The set of operators currently defined, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct OperatorTable {
    by_name: BTreeMap<String, Vec<Arc<Operator>>>,
}

impl OperatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator.
    ///
    /// A previous definition with the same name, category and fixity is
    /// replaced and returned. An operator with priority 0 removes such a
    /// definition without adding itself.
    pub fn define(&mut self, op: Operator) -> Option<Arc<Operator>> {
        let entries = self.by_name.entry(op.name.clone()).or_default();
        let previous = entries
            .iter()
            .position(|e| e.category == op.category && e.fixity() == op.fixity())
            .map(|i| entries.remove(i));
        if op.priority > 0 {
            entries.push(Arc::new(op));
            entries.sort();
        } else if entries.is_empty() {
            let name = op.name;
            self.by_name.remove(&name);
        }
        previous
    }

    /// Return the operators named `name`, in `Operator` order.
    pub fn lookup(&self, name: &str) -> &[Arc<Operator>] {
        self.by_name.get(name).map_or(&[], |ops| &ops[..])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Operator>> + '_ {
        self.by_name.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(name: &str, spec: &str, priority: u16) -> Operator {
        let specifier = Specifier::decode(spec).unwrap();
        let terminal = match specifier.fixity {
            Fixity::Prefix => TerminalID::from_raw(1),
            Fixity::Infix => TerminalID::from_raw(2),
            Fixity::Postfix => TerminalID::from_raw(3),
        };
        Operator::new(
            name,
            specifier,
            priority,
            NonterminalID::from_raw(1),
            "expr",
            terminal,
        )
        .unwrap()
    }

    #[test]
    fn decode_specifiers() {
        use Assoc::*;
        use Fixity::*;
        let cases = [
            ("fy", Prefix, Right),
            ("fx", Prefix, Nonassoc),
            ("yf", Postfix, Left),
            ("xf", Postfix, Nonassoc),
            ("yfx", Infix, Left),
            ("xfy", Infix, Right),
            ("xfx", Infix, Nonassoc),
        ];
        for (s, fixity, assoc) in cases {
            let spec = Specifier::decode(s).unwrap();
            assert_eq!(spec, Specifier { fixity, assoc });
            assert_eq!(spec.to_string(), s);
        }
    }

    #[test]
    fn reject_bad_specifiers() {
        for s in ["", "f", "zzz", "yfy", "xx", "fyx", "ff", "xfxf"] {
            assert_eq!(
                Specifier::decode(s),
                Err(OperatorError::BadSpecifier(s.to_owned()))
            );
        }
    }

    #[test]
    fn argument_bounds() {
        let plus = op("+", "yfx", 500);
        assert_eq!(plus.left_max(), Some(500));
        assert_eq!(plus.right_max(), Some(499));

        let pow = op("^", "xfy", 200);
        assert_eq!(pow.left_max(), Some(199));
        assert_eq!(pow.right_max(), Some(200));

        let neg = op("-", "fy", 200);
        assert_eq!(neg.left_max(), None);
        assert_eq!(neg.right_max(), Some(200));

        let fact = op("!", "xf", 100);
        assert_eq!(fact.left_max(), Some(99));
        assert_eq!(fact.right_max(), None);
    }

    #[test]
    fn priority_out_of_range() {
        let spec = Specifier::decode("xfx").unwrap();
        let err = Operator::new(
            "=",
            spec,
            1201,
            NonterminalID::from_raw(1),
            "expr",
            TerminalID::from_raw(2),
        )
        .unwrap_err();
        assert_eq!(err, OperatorError::PriorityOutOfRange(1201));
    }

    #[test]
    fn name_ordering() {
        assert_eq!(compare_names("$zed", "Foo"), Ordering::Greater);
        assert_eq!(compare_names("#foo", "goo"), Ordering::Less);
        assert_eq!(compare_names("bar", "_Baz"), Ordering::Less);
        assert_eq!(compare_names("ABC", "abd"), Ordering::Less);
        assert_eq!(compare_names("x", "x"), Ordering::Equal);
    }

    #[test]
    fn operator_ordering() {
        let mut ops = vec![op("-", "yfx", 500), op("!", "xf", 100), op("*", "yfx", 400)];
        ops.sort();
        let names: Vec<_> = ops.iter().map(|op| op.name()).collect();
        assert_eq!(names, ["!", "*", "-"]);
    }

    #[test]
    fn define_replace_and_remove() {
        let mut table = OperatorTable::new();
        assert!(table.define(op("-", "yfx", 500)).is_none());
        assert!(table.define(op("-", "fy", 200)).is_none());
        assert_eq!(table.lookup("-").len(), 2);
        assert_eq!(table.lookup("-")[0].fixity(), Fixity::Prefix);

        let replaced = table.define(op("-", "xfx", 700)).unwrap();
        assert_eq!(replaced.priority(), 500);
        assert_eq!(table.lookup("-").len(), 2);

        let removed = table.define(op("-", "fy", 0)).unwrap();
        assert_eq!(removed.fixity(), Fixity::Prefix);
        assert_eq!(table.lookup("-").len(), 1);

        table.define(op("-", "xfx", 0));
        assert!(table.lookup("-").is_empty());
        assert!(table.is_empty());
    }
}
