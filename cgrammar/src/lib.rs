#![cfg_attr(docsrs, feature(doc_cfg))]

//! Context-free grammar engine for a C front end.
//!
//! A [`Grammar`] holds terminals, non-terminals, ordered productions, a start
//! symbol and an operator precedence table. On top of that it provides:
//!
//!  - FIRST/FOLLOW sets and nullability, cached per revision ([`grammar::sets`])
//!  - analysis: left recursion, LL(1) conflicts, ambiguity heuristics
//!    ([`grammar::analysis`])
//!  - transformations: left-recursion elimination, left factoring, epsilon and
//!    useless-symbol removal ([`grammar::transform`])
//!  - pluggable rewrite rules for resolving LL(1) conflicts, with a set
//!    tailored to C declarations ([`rewrite`])
//!  - a textual grammar format ([`grammar::loader`])
//!  - operator precedence tables ([`precedence`])
//!
//! Diagnostics go through a [`LogSink`]. By default they are forwarded to
//! [`tracing`].
//!
//! # Example
//!
//! ```
//! # use cgrammar::{Grammar, Error};
//! # fn main() -> Result<(), Error> {
//! let mut grammar = Grammar::new();
//! grammar.try_load_from_string(
//!     r#"
//!     START: E
//!     E -> E '+' T | T
//!     T -> id
//!     "#,
//! )?;
//!
//! assert!(grammar.has_left_recursion());
//! grammar.eliminate_left_recursion();
//! assert!(!grammar.has_left_recursion());
//! assert!(grammar.is_ll1());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod grammar;
pub mod log;
pub mod precedence;
pub mod rewrite;
pub mod symbol;

use std::path::PathBuf;

pub use crate::{
    builder::GrammarBuilder,
    config::{
        EpsilonPolicy,
        GrammarOptions,
    },
    grammar::{
        analysis::{
            AmbiguityFinding,
            Ll1Conflict,
        },
        validate::ValidationError,
        Grammar,
        GrammarStatistics,
    },
    log::{
        Level,
        LogSink,
        MemorySink,
        TracingSink,
    },
    precedence::{
        OperatorPrecedenceTable,
        PrecedenceConflict,
        Relation,
    },
    rewrite::RewriteRule,
    symbol::{
        Associativity,
        Production,
        Symbol,
        SymbolKind,
        END_MARKER,
        EPSILON,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rule index {index} out of range ({len} rules)")]
    RuleIndexOutOfRange { index: usize, len: usize },

    #[error("io error: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("grammar has no productions")]
    NoProductions,
}
