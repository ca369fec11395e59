//! The grammar engine.
//!
//! A [`Grammar`] owns the vocabulary (terminals and non-terminals), the
//! ordered list of productions, the start symbol and the precedence table.
//! Derived data (FIRST and FOLLOW sets) is computed lazily and cached per
//! grammar revision, see [`sets`].
//!
//! # Example
//!
//! ```
//! # use cgrammar::Grammar;
//! let mut grammar = Grammar::new();
//! grammar.add_rule("E", ["T", "E'"]);
//! grammar.add_rule("E'", ["+", "T", "E'"]);
//! grammar.add_rule("E'", ["ε"]);
//! grammar.add_rule("T", ["id"]);
//! grammar.set_start_symbol("E");
//!
//! assert!(grammar.first_set("E").contains("id"));
//! assert!(grammar.follow_set("E'").contains("$"));
//! assert!(grammar.is_ll1());
//! ```

pub mod analysis;
pub mod ast;
pub mod loader;
mod parser;
pub mod sets;
pub mod transform;
pub mod validate;

use std::{
    cell::RefCell,
    collections::{
        BTreeMap,
        BTreeSet,
    },
    fmt,
    sync::Arc,
};

use derivative::Derivative;

use self::sets::SetCache;
use crate::{
    config::GrammarOptions,
    log::{
        LogSink,
        TracingSink,
    },
    rewrite::RewriteRule,
    symbol::{
        is_epsilon,
        Associativity,
        Production,
        Symbol,
    },
    Error,
};

/// A context-free grammar.
///
/// Every structural mutation (adding or removing symbols or productions,
/// changing the start symbol, clearing, loading) bumps the
/// [revision](Self::revision) and drops cached FIRST/FOLLOW sets.
///
/// The grammar is meant to be used by one thread at a time. Cached sets live
/// in a [`RefCell`], so a `Grammar` is `Send` but not `Sync`.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Grammar {
    terminals: BTreeSet<String>,
    terminal_patterns: BTreeMap<String, String>,
    non_terminals: BTreeSet<String>,
    productions: Vec<Production>,
    start: Option<String>,
    precedence: BTreeMap<String, i32>,
    associativity: BTreeMap<String, Associativity>,

    /// Suffix counter for `_factored_<n>` non-terminals.
    factor_counter: usize,

    revision: u64,

    #[derivative(Debug = "ignore")]
    cache: RefCell<SetCache>,

    options: GrammarOptions,

    #[derivative(Debug = "ignore")]
    sink: Arc<dyn LogSink>,

    #[derivative(Debug = "ignore")]
    rewrite_rules: Vec<Arc<dyn RewriteRule>>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::with_options(GrammarOptions::default())
    }
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: GrammarOptions) -> Self {
        Self {
            terminals: BTreeSet::new(),
            terminal_patterns: BTreeMap::new(),
            non_terminals: BTreeSet::new(),
            productions: vec![],
            start: None,
            precedence: BTreeMap::new(),
            associativity: BTreeMap::new(),
            factor_counter: 0,
            revision: 0,
            cache: RefCell::new(SetCache::default()),
            options,
            sink: Arc::new(TracingSink),
            rewrite_rules: vec![],
        }
    }

    /// Replaces the logging sink.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn set_sink(&mut self, sink: Arc<dyn LogSink>) {
        self.sink = sink;
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    pub fn options(&self) -> &GrammarOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut GrammarOptions {
        &mut self.options
    }

    /// Monotonically increasing counter of structural mutations.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Invalidates derived data. Must be called by every structural mutation.
    fn touch(&mut self) {
        self.revision += 1;
        self.cache.get_mut().clear();
    }

    /// Declares a terminal. Returns `false` if it was already declared, or if
    /// the name is a non-terminal.
    pub fn add_terminal(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if is_epsilon(&name) {
            return false;
        }
        if self.non_terminals.contains(&name) {
            self.sink.warning(&format!(
                "'{name}' is already a non-terminal and can't be declared as terminal"
            ));
            return false;
        }
        let inserted = self.terminals.insert(name);
        if inserted {
            self.touch();
        }
        inserted
    }

    /// Declares a terminal with the lexical pattern of its token.
    pub fn add_terminal_with_pattern(
        &mut self,
        name: impl Into<String>,
        pattern: impl Into<String>,
    ) -> bool {
        let name = name.into();
        let inserted = self.add_terminal(name.clone());
        if self.terminals.contains(&name) {
            self.terminal_patterns.insert(name, pattern.into());
        }
        inserted
    }

    /// Declares a non-terminal. A terminal with the same name is promoted to
    /// a non-terminal. Returns `false` if it was already a non-terminal.
    pub fn add_non_terminal(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if is_epsilon(&name) || self.non_terminals.contains(&name) {
            return false;
        }
        if self.terminals.remove(&name) {
            tracing::trace!(symbol = %name, "promoting terminal to non-terminal");
            self.terminal_patterns.remove(&name);
        }
        self.non_terminals.insert(name);
        self.touch();
        true
    }

    /// Removes a terminal. Productions mentioning it are kept and show up in
    /// validation.
    pub fn remove_terminal(&mut self, name: &str) -> bool {
        let removed = self.terminals.remove(name);
        if removed {
            self.terminal_patterns.remove(name);
            self.precedence.remove(name);
            self.associativity.remove(name);
            self.touch();
        }
        removed
    }

    /// Removes a non-terminal together with its own productions. Productions
    /// referring to it on the right-hand side are kept.
    pub fn remove_non_terminal(&mut self, name: &str) -> bool {
        let removed = self.non_terminals.remove(name);
        if removed {
            self.productions.retain(|p| p.lhs() != name);
            if self.start.as_deref() == Some(name) {
                self.start = None;
            }
            self.touch();
        }
        removed
    }

    /// Adds the rule `lhs -> rhs`. `ε` or an empty `rhs` makes an epsilon
    /// production.
    ///
    /// The left-hand side is declared as non-terminal, undeclared
    /// right-hand side symbols as terminals (unless disabled by
    /// [`GrammarOptions::undeclared_as_terminal`]). Returns `false` if the
    /// exact rule already exists.
    pub fn add_rule<I>(&mut self, lhs: impl Into<String>, rhs: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.add_production(Production::new(lhs, rhs))
    }

    /// Adds a fully specified production. See [`Self::add_rule`].
    pub fn add_production(&mut self, production: Production) -> bool {
        self.add_non_terminal(production.lhs());
        if self.options.undeclared_as_terminal {
            for symbol in production.rhs() {
                if !self.is_declared(symbol) {
                    self.terminals.insert(symbol.clone());
                }
            }
        }

        // the insertions above don't touch, since we always touch below.
        self.touch();

        if self.productions.contains(&production) {
            tracing::debug!(%production, "ignoring duplicate production");
            return false;
        }

        self.productions.push(production);
        true
    }

    /// Removes the production `lhs -> rhs`. Returns whether it existed.
    pub fn remove_rule<I>(&mut self, lhs: &str, rhs: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let rhs = crate::symbol::normalize_rhs(rhs);
        let Some(index) = self.productions.iter().position(|p| p.matches(lhs, &rhs))
        else {
            return false;
        };
        self.productions.remove(index);
        self.touch();
        true
    }

    pub fn has_rule<I>(&self, lhs: &str, rhs: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let rhs = crate::symbol::normalize_rhs(rhs);
        self.productions.iter().any(|p| p.matches(lhs, &rhs))
    }

    /// Returns the production at insertion-order `index`.
    pub fn get_rule(&self, index: usize) -> Result<&Production, Error> {
        self.productions
            .get(index)
            .ok_or(Error::RuleIndexOutOfRange {
                index,
                len: self.productions.len(),
            })
    }

    pub fn rule_count(&self) -> usize {
        self.productions.len()
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    /// All productions of `non_terminal`, in insertion order.
    pub fn productions_for(&self, non_terminal: &str) -> Vec<&Production> {
        self.productions
            .iter()
            .filter(|p| p.lhs() == non_terminal)
            .collect()
    }

    /// Resets the grammar to empty. Options, sink and rewrite rules are kept.
    pub fn clear(&mut self) {
        self.terminals.clear();
        self.terminal_patterns.clear();
        self.non_terminals.clear();
        self.productions.clear();
        self.start = None;
        self.precedence.clear();
        self.associativity.clear();
        self.factor_counter = 0;
        self.touch();
    }

    /// Sets the start symbol, declaring it as non-terminal.
    pub fn set_start_symbol(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.add_non_terminal(name.clone());
        self.start = Some(name);
        self.touch();
    }

    pub fn start_symbol(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn terminals(&self) -> &BTreeSet<String> {
        &self.terminals
    }

    pub fn non_terminals(&self) -> &BTreeSet<String> {
        &self.non_terminals
    }

    pub fn terminal_pattern(&self, terminal: &str) -> Option<&str> {
        self.terminal_patterns.get(terminal).map(String::as_str)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminals.contains(name)
    }

    pub fn is_non_terminal(&self, name: &str) -> bool {
        self.non_terminals.contains(name)
    }

    fn is_declared(&self, name: &str) -> bool {
        self.terminals.contains(name) || self.non_terminals.contains(name)
    }

    /// Every declared symbol, terminals first.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.terminals
            .iter()
            .map(|t| {
                match self.terminal_patterns.get(t) {
                    Some(pattern) => Symbol::terminal_with_pattern(t, pattern),
                    None => Symbol::terminal(t),
                }
            })
            .chain(self.non_terminals.iter().map(Symbol::non_terminal))
            .collect()
    }

    pub fn set_precedence(
        &mut self,
        symbol: impl Into<String>,
        level: i32,
        associativity: Associativity,
    ) {
        let symbol = symbol.into();
        self.precedence.insert(symbol.clone(), level);
        self.associativity.insert(symbol, associativity);
    }

    pub fn precedence(&self, symbol: &str) -> Option<i32> {
        self.precedence.get(symbol).copied()
    }

    pub fn associativity(&self, symbol: &str) -> Option<Associativity> {
        self.associativity.get(symbol).copied()
    }

    pub fn precedence_table(&self) -> impl Iterator<Item = (&str, i32, Option<Associativity>)> {
        self.precedence.iter().map(|(symbol, level)| {
            (
                symbol.as_str(),
                *level,
                self.associativity.get(symbol).copied(),
            )
        })
    }

    pub fn register_rewrite_rule(&mut self, rule: Arc<dyn RewriteRule>) {
        self.rewrite_rules.push(rule);
    }

    pub fn rewrite_rules(&self) -> &[Arc<dyn RewriteRule>] {
        &self.rewrite_rules
    }

    pub fn statistics(&self) -> GrammarStatistics {
        GrammarStatistics {
            terminal_count: self.terminals.len(),
            non_terminal_count: self.non_terminals.len(),
            production_count: self.productions.len(),
            max_production_length: self
                .productions
                .iter()
                .map(Production::len)
                .max()
                .unwrap_or(0),
            has_epsilon_productions: self.productions.iter().any(Production::is_empty),
            has_left_recursion: self.has_left_recursion(),
        }
    }

    /// Non-terminals in the order they first appear as a left-hand side,
    /// followed by declared non-terminals without productions.
    pub(crate) fn lhs_order(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut order = vec![];
        for production in &self.productions {
            if seen.insert(production.lhs()) {
                order.push(production.lhs().to_owned());
            }
        }
        for non_terminal in &self.non_terminals {
            if !seen.contains(non_terminal.as_str()) {
                order.push(non_terminal.clone());
            }
        }
        order
    }

    /// Returns `base` if it's not a declared symbol, otherwise `base_1`,
    /// `base_2`, ...
    pub(crate) fn fresh_name(&self, base: &str) -> String {
        if !self.is_declared(base) {
            return base.to_owned();
        }
        (1..)
            .map(|i| format!("{base}_{i}"))
            .find(|name| !self.is_declared(name))
            .unwrap_or_else(|| base.to_owned())
    }

    /// Replaces all productions of `non_terminal` by `replacement`, placing
    /// them where its first production was (or at the end if it had none).
    pub(crate) fn replace_productions_of(
        &mut self,
        non_terminal: &str,
        replacement: Vec<Production>,
    ) {
        let position = self
            .productions
            .iter()
            .position(|p| p.lhs() == non_terminal)
            .unwrap_or(self.productions.len());
        self.productions.retain(|p| p.lhs() != non_terminal);
        let position = position.min(self.productions.len());
        self.splice_productions(position, replacement);
    }

    /// Replaces one production by `replacement`, in place.
    pub(crate) fn replace_production(&mut self, production: &Production, replacement: Vec<Production>) {
        let Some(position) = self.productions.iter().position(|p| p == production)
        else {
            return;
        };
        self.productions.remove(position);
        self.splice_productions(position, replacement);
    }

    /// Inserts productions at `position`, declaring their symbols and
    /// skipping duplicates.
    pub(crate) fn splice_productions(&mut self, position: usize, productions: Vec<Production>) {
        let mut position = position;
        for production in productions {
            self.non_terminals.insert(production.lhs().to_owned());
            for symbol in production.rhs() {
                if !self.is_declared(symbol) {
                    self.terminals.insert(symbol.clone());
                }
            }
            if !self.productions.contains(&production) {
                self.productions.insert(position, production);
                position += 1;
            }
        }
        self.touch();
    }
}

/// Read-only snapshot of grammar dimensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarStatistics {
    pub terminal_count: usize,
    pub non_terminal_count: usize,
    pub production_count: usize,
    pub max_production_length: usize,
    pub has_epsilon_productions: bool,
    pub has_left_recursion: bool,
}

impl fmt::Display for GrammarStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "terminals:             {}", self.terminal_count)?;
        writeln!(f, "non-terminals:         {}", self.non_terminal_count)?;
        writeln!(f, "productions:           {}", self.production_count)?;
        writeln!(f, "max production length: {}", self.max_production_length)?;
        writeln!(f, "epsilon productions:   {}", self.has_epsilon_productions)?;
        write!(f, "left recursion:        {}", self.has_left_recursion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression_grammar() -> Grammar {
        let mut grammar = Grammar::new();
        grammar.add_rule("E", ["E", "+", "T"]);
        grammar.add_rule("E", ["T"]);
        grammar.add_rule("T", ["id"]);
        grammar.set_start_symbol("E");
        grammar
    }

    #[test]
    fn it_registers_symbols_when_adding_rules() {
        let grammar = expression_grammar();
        assert!(grammar.is_non_terminal("E"));
        assert!(grammar.is_non_terminal("T"));
        assert!(grammar.is_terminal("+"));
        assert!(grammar.is_terminal("id"));
        assert!(!grammar.is_terminal("T"));
        assert_eq!(grammar.rule_count(), 3);
    }

    #[test]
    fn it_keeps_undeclared_symbols_undeclared_if_configured() {
        let mut grammar = Grammar::with_options(GrammarOptions {
            undeclared_as_terminal: false,
            ..Default::default()
        });
        grammar.add_rule("S", ["a"]);
        assert!(!grammar.is_terminal("a"));
        assert!(grammar.is_non_terminal("S"));
    }

    #[test]
    fn it_returns_rules_by_index() {
        let grammar = expression_grammar();
        assert_eq!(
            grammar.get_rule(0).unwrap(),
            &Production::new("E", ["E", "+", "T"])
        );
        assert_eq!(grammar.get_rule(2).unwrap(), &Production::new("T", ["id"]));
    }

    #[test]
    fn it_fails_for_out_of_range_rule_index() {
        let grammar = expression_grammar();
        assert!(matches!(
            grammar.get_rule(3),
            Err(Error::RuleIndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(Grammar::new().get_rule(0).is_err());
    }

    #[test]
    fn it_removes_exact_rules() {
        let mut grammar = expression_grammar();
        assert!(grammar.remove_rule("E", ["T"]));
        assert_eq!(grammar.rule_count(), 2);
        assert!(!grammar.has_rule("E", ["T"]));

        assert!(!grammar.remove_rule("E", ["T"]));
        assert!(!grammar.remove_rule("E", ["+", "E", "T"]));
        assert_eq!(grammar.rule_count(), 2);
    }

    #[test]
    fn it_matches_epsilon_rules() {
        let mut grammar = Grammar::new();
        grammar.add_rule("A", ["ε"]);
        assert!(grammar.has_rule("A", Vec::<&str>::new()));
        assert!(grammar.has_rule("A", ["epsilon"]));
        assert!(!grammar.is_terminal("ε"));
        assert!(grammar.remove_rule("A", ["ε"]));
    }

    #[test]
    fn it_ignores_duplicate_rules() {
        let mut grammar = expression_grammar();
        assert!(!grammar.add_rule("T", ["id"]));
        assert_eq!(grammar.rule_count(), 3);
    }

    #[test]
    fn it_lists_productions_in_insertion_order() {
        let mut grammar = expression_grammar();
        grammar.add_rule("E", ["(", "E", ")"]);
        let productions = grammar.productions_for("E");
        assert_eq!(productions.len(), 3);
        assert_eq!(productions[0].rhs(), ["E", "+", "T"]);
        assert_eq!(productions[1].rhs(), ["T"]);
        assert_eq!(productions[2].rhs(), ["(", "E", ")"]);
    }

    #[test]
    fn it_promotes_terminals_that_get_rules() {
        let mut grammar = Grammar::new();
        grammar.add_rule("S", ["A", "b"]);
        assert!(grammar.is_terminal("A"));
        grammar.add_rule("A", ["a"]);
        assert!(grammar.is_non_terminal("A"));
        assert!(!grammar.is_terminal("A"));
    }

    #[test]
    fn it_bumps_revision_on_mutation() {
        let mut grammar = expression_grammar();
        let revision = grammar.revision();
        grammar.add_rule("T", ["(", "E", ")"]);
        assert!(grammar.revision() > revision);

        let revision = grammar.revision();
        grammar.remove_rule("T", ["(", "E", ")"]);
        assert!(grammar.revision() > revision);

        let revision = grammar.revision();
        grammar.add_terminal("num");
        assert!(grammar.revision() > revision);

        let revision = grammar.revision();
        grammar.remove_terminal("num");
        assert!(grammar.revision() > revision);

        let revision = grammar.revision();
        grammar.add_non_terminal("F");
        assert!(grammar.revision() > revision);

        let revision = grammar.revision();
        grammar.remove_non_terminal("F");
        assert!(grammar.revision() > revision);

        let revision = grammar.revision();
        grammar.set_start_symbol("T");
        assert!(grammar.revision() > revision);

        let revision = grammar.revision();
        grammar.clear();
        assert!(grammar.revision() > revision);
    }

    #[test]
    fn it_recomputes_sets_after_symbol_mutations() {
        let mut grammar = expression_grammar();
        assert!(grammar.follow_set("E").contains("$"));

        grammar.set_start_symbol("T");
        assert!(!grammar.follow_set("E").contains("$"));
        assert!(grammar.follow_set("T").contains("$"));

        grammar.add_non_terminal("id");
        assert!(grammar.first_set("T").is_empty());
        grammar.add_rule("id", ["x"]);
        assert_eq!(grammar.first_set("T"), BTreeSet::from(["x".to_owned()]));

        grammar.remove_non_terminal("id");
        assert!(grammar.first_set("id").is_empty());
    }

    #[test]
    fn it_clears_everything() {
        let mut grammar = expression_grammar();
        grammar.set_precedence("+", 1, Associativity::Left);
        grammar.clear();
        assert_eq!(grammar.rule_count(), 0);
        assert!(grammar.terminals().is_empty());
        assert!(grammar.non_terminals().is_empty());
        assert_eq!(grammar.start_symbol(), None);
        assert_eq!(grammar.precedence("+"), None);
    }

    #[test]
    fn it_removes_non_terminals_with_their_productions() {
        let mut grammar = expression_grammar();
        assert!(grammar.remove_non_terminal("T"));
        assert!(grammar.productions_for("T").is_empty());
        assert!(grammar.has_rule("E", ["T"]));
        assert!(!grammar.remove_non_terminal("T"));
    }

    #[test]
    fn it_computes_statistics() {
        let mut grammar = expression_grammar();
        grammar.add_rule("T", ["ε"]);
        let statistics = grammar.statistics();
        assert_eq!(statistics.terminal_count, 2);
        assert_eq!(statistics.non_terminal_count, 2);
        assert_eq!(statistics.production_count, 4);
        assert_eq!(statistics.max_production_length, 3);
        assert!(statistics.has_epsilon_productions);
        assert!(statistics.has_left_recursion);
    }

    #[test]
    fn it_makes_fresh_names() {
        let grammar = expression_grammar();
        assert_eq!(grammar.fresh_name("E_rest"), "E_rest");
        assert_eq!(grammar.fresh_name("E"), "E_1");
    }
}
