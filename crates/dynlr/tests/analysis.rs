use dynlr::{
    analysis::Analysis,
    grammar::{
        Grammar, NonterminalID,
        SymbolID::{self, N, T},
        TerminalID,
    },
};
use std::collections::{BTreeSet, HashSet, VecDeque};

const MAX_FORM_LEN: usize = 8;

/// Leftmost derivations from `symbol`, up to forms of `MAX_FORM_LEN`
/// symbols. Returns the terminals seen at the head of some form, and
/// whether the empty form is derivable.
fn derive(g: &Grammar, symbol: NonterminalID) -> (BTreeSet<TerminalID>, bool) {
    let mut first = BTreeSet::new();
    let mut nullable = false;
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(vec![N(symbol)]);

    while let Some(form) = queue.pop_front() {
        if !visited.insert(form.clone()) {
            continue;
        }
        match form.first() {
            None => nullable = true,
            Some(T(t)) => {
                first.insert(*t);
            }
            Some(N(n)) => {
                for rule in g.rules.values().filter(|r| r.left() == *n) {
                    let mut next: Vec<SymbolID> = rule.right().to_vec();
                    next.extend_from_slice(&form[1..]);
                    if next.len() <= MAX_FORM_LEN {
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    (first, nullable)
}

fn check(g: &Grammar) {
    let analysis = Analysis::new(g).unwrap();
    for &n in g.nonterminals.keys() {
        if n == NonterminalID::START {
            continue;
        }
        let (expected_first, expected_nullable) = derive(g, n);
        let actual: BTreeSet<_> = analysis
            .first(n)
            .map(|set| set.iter().collect())
            .unwrap_or_default();
        let name = g.nonterminals[&n].name();
        assert_eq!(actual, expected_first, "First({})", name);
        assert_eq!(analysis.is_nullable(n), expected_nullable, "Nullable({})", name);
    }
}

#[test]
fn empty_grammar() {
    // S := %empty
    let g = Grammar::define(|g| {
        let s = g.nonterminal("S")?;
        g.rule(s, [], None)?;
        Ok(())
    })
    .unwrap();
    check(&g);
}

#[test]
fn arithmetic() {
    // E := E + T | T; T := T * F | F; F := ( E ) | num
    let g = Grammar::define(|g| {
        let plus = g.terminal("PLUS", None)?;
        let star = g.terminal("STAR", None)?;
        let lparen = g.terminal("LPAREN", None)?;
        let rparen = g.terminal("RPAREN", None)?;
        let num = g.terminal("NUM", None)?;
        let e = g.nonterminal("E")?;
        let t = g.nonterminal("T")?;
        let f = g.nonterminal("F")?;
        g.rule(e, [N(e), T(plus), N(t)], None)?;
        g.rule(e, [N(t)], None)?;
        g.rule(t, [N(t), T(star), N(f)], None)?;
        g.rule(t, [N(f)], None)?;
        g.rule(f, [T(lparen), N(e), T(rparen)], None)?;
        g.rule(f, [T(num)], None)?;
        Ok(())
    })
    .unwrap();
    check(&g);
}

#[test]
fn nullable_prefixes() {
    // S := A a | b B; A := c | %empty; B := d B | %empty
    let g = Grammar::define(|g| {
        let a = g.terminal("a", None)?;
        let b = g.terminal("b", None)?;
        let c = g.terminal("c", None)?;
        let d = g.terminal("d", None)?;
        let s = g.nonterminal("S")?;
        let na = g.nonterminal("A")?;
        let nb = g.nonterminal("B")?;
        g.rule(s, [N(na), T(a)], None)?;
        g.rule(s, [T(b), N(nb)], None)?;
        g.rule(na, [T(c)], None)?;
        g.rule(na, [], None)?;
        g.rule(nb, [T(d), N(nb)], None)?;
        g.rule(nb, [], None)?;
        Ok(())
    })
    .unwrap();
    check(&g);
}
