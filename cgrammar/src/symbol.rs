//! Grammar vocabulary and rules.
//!
//! Symbols and productions are plain values with string identity. A
//! [`Production`] compares equal to another one iff the left-hand side and
//! the exact right-hand side sequence match; precedence, associativity, source
//! line and semantic action are metadata and don't take part in equality.

use std::{
    fmt,
    str::FromStr,
    sync::Arc,
};

use derivative::Derivative;
use itertools::Itertools;

/// The epsilon marker, i.e. the empty string.
pub const EPSILON: &str = "ε";

/// The end-of-input marker used in FOLLOW sets.
pub const END_MARKER: &str = "$";

/// Returns `true` for the spellings of the epsilon marker.
pub fn is_epsilon(name: &str) -> bool {
    name == EPSILON || name == "epsilon"
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum SymbolKind {
    #[display(fmt = "terminal")]
    Terminal,
    #[display(fmt = "non-terminal")]
    NonTerminal,
    #[display(fmt = "epsilon")]
    Epsilon,
}

/// A grammar symbol.
///
/// Terminals can carry the lexical pattern of the token they stand for. The
/// pattern is informational and is ignored by equality.
#[derive(Clone, Derivative)]
#[derivative(Debug, PartialEq, Eq, Hash)]
pub struct Symbol {
    name: String,
    kind: SymbolKind,
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    pattern: Option<String>,
}

impl Symbol {
    pub fn terminal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::Terminal,
            pattern: None,
        }
    }

    pub fn terminal_with_pattern(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::Terminal,
            pattern: Some(pattern.into()),
        }
    }

    pub fn non_terminal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::NonTerminal,
            pattern: None,
        }
    }

    pub fn epsilon() -> Self {
        Self {
            name: EPSILON.to_owned(),
            kind: SymbolKind::Epsilon,
            pattern: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == SymbolKind::Terminal
    }

    pub fn is_non_terminal(&self) -> bool {
        self.kind == SymbolKind::NonTerminal
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SymbolKind::Terminal => write!(f, "'{}'", self.name),
            SymbolKind::NonTerminal => write!(f, "<{}>", self.name),
            SymbolKind::Epsilon => write!(f, "{EPSILON}"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Associativity {
    #[display(fmt = "left")]
    Left,
    #[display(fmt = "right")]
    Right,
    #[display(fmt = "none")]
    None,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid associativity: '{0}'")]
pub struct InvalidAssociativity(pub String);

impl FromStr for Associativity {
    type Err = InvalidAssociativity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "none" | "nonassoc" => Ok(Self::None),
            _ => Err(InvalidAssociativity(s.to_owned())),
        }
    }
}

/// Closure run when a production is reduced. It receives the texts of the
/// right-hand side children and returns the synthesized text.
pub type SemanticAction = Arc<dyn Fn(&[String]) -> String + Send + Sync>;

/// A rewrite rule `lhs -> rhs`.
///
/// An empty right-hand side is an epsilon production. The epsilon marker is
/// stripped from the right-hand side on construction, so `A -> ε` and `A -> `
/// are the same production.
#[derive(Clone, Derivative)]
#[derivative(Debug, PartialEq, Eq, Hash)]
pub struct Production {
    lhs: String,
    rhs: Vec<String>,

    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    precedence: Option<i32>,

    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    associativity: Option<Associativity>,

    /// 1-based line in the grammar source, if loaded from text.
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    line: Option<usize>,

    #[derivative(Debug = "ignore", PartialEq = "ignore", Hash = "ignore")]
    action: Option<SemanticAction>,
}

impl Production {
    pub fn new<I>(lhs: impl Into<String>, rhs: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            lhs: lhs.into(),
            rhs: normalize_rhs(rhs),
            precedence: None,
            associativity: None,
            line: None,
            action: None,
        }
    }

    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = Some(precedence);
        self
    }

    pub fn with_associativity(mut self, associativity: Associativity) -> Self {
        self.associativity = Some(associativity);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_action(mut self, action: SemanticAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn lhs(&self) -> &str {
        &self.lhs
    }

    pub fn rhs(&self) -> &[String] {
        &self.rhs
    }

    pub fn precedence(&self) -> Option<i32> {
        self.precedence
    }

    pub fn associativity(&self) -> Option<Associativity> {
        self.associativity
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn action(&self) -> Option<&SemanticAction> {
        self.action.as_ref()
    }

    /// Number of right-hand side symbols.
    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    /// `true` for epsilon productions.
    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }

    pub fn first_symbol(&self) -> Option<&str> {
        self.rhs.first().map(String::as_str)
    }

    /// Checks whether this production is `lhs -> rhs`, with `rhs` normalized
    /// the same way the constructor does it.
    pub fn matches<I>(&self, lhs: &str, rhs: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.lhs == lhs && self.rhs == normalize_rhs(rhs)
    }

    /// Builds a production with a new body, keeping this one's precedence,
    /// associativity and line. The semantic action is not carried over.
    pub(crate) fn rebuild<I>(&self, lhs: impl Into<String>, rhs: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            lhs: lhs.into(),
            rhs: normalize_rhs(rhs),
            precedence: self.precedence,
            associativity: self.associativity,
            line: self.line,
            action: None,
        }
    }
}

impl fmt::Display for Production {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rhs.is_empty() {
            write!(f, "{} -> {EPSILON}", self.lhs)?;
        }
        else {
            write!(f, "{} -> {}", self.lhs, self.rhs.iter().join(" "))?;
        }
        if let Some(precedence) = self.precedence {
            write!(f, " [prec: {precedence}]")?;
        }
        Ok(())
    }
}

pub(crate) fn normalize_rhs<I>(rhs: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    rhs.into_iter()
        .filter(|s| !is_epsilon(s.as_ref()))
        .map(|s| s.as_ref().to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_formats_symbols() {
        assert_eq!(Symbol::terminal("id").to_string(), "'id'");
        assert_eq!(Symbol::non_terminal("E").to_string(), "<E>");
        assert_eq!(Symbol::epsilon().to_string(), "ε");
    }

    #[test]
    fn it_compares_symbols_by_name_and_kind() {
        assert_eq!(
            Symbol::terminal("id"),
            Symbol::terminal_with_pattern("id", "[a-z]+")
        );
        assert_ne!(Symbol::terminal("E"), Symbol::non_terminal("E"));
    }

    #[test]
    fn it_formats_productions() {
        assert_eq!(
            Production::new("E", ["E", "+", "T"]).to_string(),
            "E -> E + T"
        );
        assert_eq!(Production::new("E'", ["ε"]).to_string(), "E' -> ε");
        assert_eq!(
            Production::new("E", ["E", "*", "T"])
                .with_precedence(2)
                .to_string(),
            "E -> E * T [prec: 2]"
        );
    }

    #[test]
    fn it_treats_epsilon_and_empty_rhs_as_equal() {
        let a = Production::new("A", ["ε"]);
        let b = Production::new("A", Vec::<String>::new());
        assert_eq!(a, b);
        assert!(a.is_empty());
        assert_eq!(a.len(), 0);
    }

    #[test]
    fn it_ignores_metadata_in_equality() {
        let a = Production::new("E", ["T"]).with_precedence(3).with_line(7);
        let b = Production::new("E", ["T"]);
        assert_eq!(a, b);
        assert_ne!(a, Production::new("E", ["T", "T"]));
        assert_ne!(
            Production::new("E", ["a", "b"]),
            Production::new("E", ["b", "a"])
        );
    }

    #[test]
    fn it_parses_associativity() {
        assert_eq!("left".parse::<Associativity>().unwrap(), Associativity::Left);
        assert_eq!("Right".parse::<Associativity>().unwrap(), Associativity::Right);
        assert_eq!("none".parse::<Associativity>().unwrap(), Associativity::None);
        assert!("up".parse::<Associativity>().is_err());
    }
}
