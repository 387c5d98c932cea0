#![allow(dead_code)]

use dynlr::{
    grammar::{
        Fixity, Grammar, GrammarDefError, NonterminalID,
        SymbolID::{N, T},
        TerminalID,
    },
    report::Log,
    runtime::parser::{Handle, NodeBuilder, ParseError, Parser, Token},
    table::{Config, ParseTable},
};
use std::{collections::HashMap, convert::Infallible, fmt};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub struct Word {
    pub terminal: TerminalID,
    pub text: String,
}

impl Token for Word {
    fn terminal(&self) -> TerminalID {
        self.terminal
    }

    fn operator_name(&self) -> Option<&str> {
        Some(&self.text)
    }
}

/// Splits the input at whitespace. Keywords get their own terminal, every
/// other word is an atom.
#[derive(Debug, Clone)]
pub struct Lexer {
    atom: TerminalID,
    keywords: HashMap<String, TerminalID>,
}

impl Lexer {
    pub fn new(atom: TerminalID) -> Self {
        Self {
            atom,
            keywords: HashMap::new(),
        }
    }

    pub fn keyword(mut self, text: &str, terminal: TerminalID) -> Self {
        self.keywords.insert(text.to_owned(), terminal);
        self
    }

    pub fn tokenize<'a>(
        &'a self,
        input: &'a str,
    ) -> impl Iterator<Item = Result<Word, Infallible>> + 'a {
        input.split_whitespace().map(move |w| {
            Ok(Word {
                terminal: self.keywords.get(w).copied().unwrap_or(self.atom),
                text: w.to_owned(),
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tree {
    Atom(String),
    Op(String, Vec<Tree>),
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(name) => f.write_str(name),
            Self::Op(name, args) => {
                write!(f, "({}", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Builds S-expressions named after the first token of each handle.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    pub reductions: usize,
}

impl NodeBuilder<Word> for TreeBuilder {
    type Node = Tree;
    type Error = Infallible;

    fn reduce(
        &mut self,
        _: dynlr::grammar::RuleID,
        handle: Handle<'_, Word, Tree>,
    ) -> Result<Tree, Infallible> {
        self.reductions += 1;
        let tokens: Vec<&Word> = handle
            .iter()
            .filter_map(|item| item.token())
            .map(|t| t.original())
            .collect();
        let nodes: Vec<Tree> = handle.iter().filter_map(|item| item.node()).cloned().collect();
        Ok(match (&tokens[..], &nodes[..]) {
            ([token], []) => Tree::Atom(token.text.clone()),
            ([l, r], [node]) if l.text == "(" && r.text == ")" => node.clone(),
            ([], [node]) => node.clone(),
            ([op, ..], _) => Tree::Op(op.text.clone(), nodes),
            _ => Tree::Op(String::new(), nodes),
        })
    }
}

pub type TreeParser<'t> = Parser<&'t ParseTable, TreeBuilder, Word>;

pub fn parse(
    parser: &mut TreeParser<'_>,
    lexer: &Lexer,
    input: &str,
) -> Result<Tree, ParseError<Infallible, Infallible>> {
    parser.parse(lexer.tokenize(input))
}

/// `expr := expr INFIX expr | PREFIX expr | expr POSTFIX | ATOM | ( expr )`
#[derive(Debug)]
pub struct OperatorGrammar {
    pub grammar: Grammar,
    pub expr: NonterminalID,
    pub atom: TerminalID,
    pub lparen: TerminalID,
    pub rparen: TerminalID,
}

impl OperatorGrammar {
    pub fn new(operators: &[(&str, &str, u16)]) -> Result<Self, GrammarDefError> {
        let mut ids = None;
        let grammar = Grammar::define(|g| {
            let atom = g.terminal("ATOM", None)?;
            let lparen = g.terminal("LPAREN", None)?;
            let rparen = g.terminal("RPAREN", None)?;
            let expr = g.nonterminal("expr")?;
            let infix = g.operator_terminal(expr, Fixity::Infix)?;
            let prefix = g.operator_terminal(expr, Fixity::Prefix)?;
            let postfix = g.operator_terminal(expr, Fixity::Postfix)?;

            g.rule(expr, [N(expr), T(infix), N(expr)], None)?;
            g.rule(expr, [T(prefix), N(expr)], None)?;
            g.rule(expr, [N(expr), T(postfix)], None)?;
            g.rule(expr, [T(atom)], None)?;
            g.rule(expr, [T(lparen), N(expr), T(rparen)], None)?;

            for (name, specifier, priority) in operators {
                g.operator(name, specifier, *priority, expr)?;
            }

            ids = Some((expr, atom, lparen, rparen));
            Ok(())
        })?;
        let (expr, atom, lparen, rparen) = ids.ok_or("missing symbols")?;
        Ok(Self {
            grammar,
            expr,
            atom,
            lparen,
            rparen,
        })
    }

    pub fn lexer(&self) -> Lexer {
        Lexer::new(self.atom)
            .keyword("(", self.lparen)
            .keyword(")", self.rparen)
    }

    pub fn table(&self) -> (ParseTable, Log) {
        build_table(&self.grammar, &Config::new())
    }
}

pub fn build_table(grammar: &Grammar, config: &Config) -> (ParseTable, Log) {
    let mut log = Log::new().printing(true);
    let table = dynlr::compute(grammar, config, &mut log).unwrap();
    (table, log)
}
