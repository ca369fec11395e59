//! Parsed lines of the textual grammar format.
//!
//! The format is line-oriented, so the parser produces one [`Line`] per
//! source line. Classifying bare names into terminals and non-terminals
//! needs the whole file and happens in [`loader`](super::loader).

use crate::symbol::Associativity;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line<'source> {
    /// Blank lines, comments and lone `;` or `|`.
    Noise,

    /// `START: name`
    Start(Id<'source>),

    /// `TERMINAL: name [pattern]`
    Terminal {
        name: Token<'source>,
        pattern: Option<&'source str>,
    },

    /// `NONTERMINAL: name ...`
    NonTerminals(Vec<Id<'source>>),

    /// `PRECEDENCE: symbol level [associativity]`
    Precedence {
        symbol: Token<'source>,
        level: i32,
        associativity: Option<Associativity>,
    },

    /// `lhs : alternative | ...`
    Production {
        lhs: Id<'source>,
        alternatives: Vec<Alternative<'source>>,
    },

    /// `| alternative | ...`, continuing the previous production.
    Continuation(Vec<Alternative<'source>>),
}

#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    derive_more::Display,
    derive_more::From,
    derive_more::AsRef,
)]
pub struct Id<'source>(pub(super) &'source str);

impl<'source> Id<'source> {
    pub fn as_str(&self) -> &'source str {
        self.0
    }
}

/// A symbol on a right-hand side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'source> {
    /// `'text'`, always a terminal. Escapes are already resolved.
    Quoted(String),

    /// Anything else. Classified by the loader.
    Bare(Id<'source>),
}

impl<'source> Token<'source> {
    pub fn name(&self) -> &str {
        match self {
            Token::Quoted(name) => name,
            Token::Bare(id) => id.as_str(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Alternative<'source> {
    pub symbols: Vec<Token<'source>>,
    pub annotation: Annotation,
}

/// `[prec: N, assoc: A]`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotation {
    pub precedence: Option<i32>,
    pub associativity: Option<Associativity>,
}
