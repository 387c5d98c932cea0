//! LR parse table generator for grammars with operators defined at parse time.
//!
//! A grammar names the categories that operators may belong to and the
//! sub-category terminals standing for their prefix, infix and postfix
//! forms. Conflicts that hinge on those terminals cannot be settled until
//! the actual operators are known, so the generated table defers them to
//! the backtracking parser of `dynlr-runtime`.

pub mod analysis;
pub mod grammar;
pub mod lalr;
pub mod lr0;
pub mod report;
pub mod table;
pub mod types;
pub mod util;

pub use dynlr_runtime as runtime;

use crate::{
    analysis::{Analysis, AnalysisError},
    grammar::Grammar,
    lalr::Lookaheads,
    lr0::Automaton,
    report::Reporter,
    table::{Config, ParseTable, TableError},
};
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("grammar analysis failed: {}", _0)]
    Analysis(
        #[from]
        #[source]
        AnalysisError,
    ),

    #[error("table construction failed: {}", _0)]
    Table(
        #[from]
        #[source]
        TableError,
    ),
}

/// Compute the parse table of the specified grammar.
///
/// Nothing is returned unless every stage succeeds.
pub fn compute(
    g: &Grammar,
    config: &Config,
    reporter: &mut dyn Reporter,
) -> Result<ParseTable, BuildError> {
    let span = tracing::info_span!("compute");
    let _entered = span.enter();

    for t in g.unused_terminals() {
        reporter.report_warning(format!("unused terminal `{}'", g.terminals[&t]));
    }
    for n in g.unreachable_nonterminals() {
        reporter.report_warning(format!("unreachable nonterminal `{}'", g.nonterminals[&n]));
    }

    let started = Instant::now();
    let analysis = Analysis::new(g).map_err(|err| {
        reporter.report_error(err.to_string());
        err
    })?;
    tracing::info!("analyzed the grammar in {:?}", started.elapsed());

    let started = Instant::now();
    let automaton = Automaton::new(g, &analysis);
    let lookaheads = Lookaheads::compute(g, &analysis, &automaton);
    tracing::info!(
        "built the automaton ({} states) in {:?}",
        automaton.states.len(),
        started.elapsed()
    );

    let started = Instant::now();
    let table = table::generate(g, &automaton, &lookaheads, config, reporter)?;
    tracing::info!(
        "generated the action table ({} conflicts) in {:?}",
        table.conflicts().len(),
        started.elapsed()
    );

    Ok(table)
}
