//! FIRST, FOLLOW and nullable sets.
//!
//! All sets are computed by iterating over the productions until no set
//! grows. Results are cached together with the grammar revision they were
//! computed for, and recomputed from scratch on the first query after a
//! mutation.

use std::{
    collections::{
        BTreeSet,
        HashMap,
    },
    sync::Arc,
};

use super::Grammar;
use crate::symbol::{
    is_epsilon,
    END_MARKER,
    EPSILON,
};

/// Symbol name to set of terminal names (possibly including `ε` or `$`).
pub type SymbolSets = HashMap<String, BTreeSet<String>>;

#[derive(Clone, Debug, Default)]
pub(crate) struct SetCache {
    revision: u64,
    first: Option<Arc<SymbolSets>>,
    follow: Option<Arc<SymbolSets>>,
}

impl SetCache {
    pub fn clear(&mut self) {
        self.first = None;
        self.follow = None;
    }

    /// Drops everything if it was computed for another revision.
    fn sync(&mut self, revision: u64) {
        if self.revision != revision {
            self.clear();
            self.revision = revision;
        }
    }
}

impl Grammar {
    /// FIRST sets of all declared symbols.
    pub fn first_sets(&self) -> Arc<SymbolSets> {
        {
            let mut cache = self.cache.borrow_mut();
            cache.sync(self.revision);
            if let Some(first) = &cache.first {
                return first.clone();
            }
        }

        let first = Arc::new(self.compute_first_sets());
        self.cache.borrow_mut().first = Some(first.clone());
        first
    }

    /// FOLLOW sets of all declared non-terminals.
    pub fn follow_sets(&self) -> Arc<SymbolSets> {
        {
            let mut cache = self.cache.borrow_mut();
            cache.sync(self.revision);
            if let Some(follow) = &cache.follow {
                return follow.clone();
            }
        }

        let first = self.first_sets();
        let follow = Arc::new(self.compute_follow_sets(&first));
        self.cache.borrow_mut().follow = Some(follow.clone());
        follow
    }

    /// FIRST set of a single symbol. Empty for undeclared names.
    pub fn first_set(&self, symbol: &str) -> BTreeSet<String> {
        if is_epsilon(symbol) {
            return BTreeSet::from([EPSILON.to_owned()]);
        }
        self.first_sets().get(symbol).cloned().unwrap_or_default()
    }

    /// FOLLOW set of a non-terminal. Empty for anything else.
    pub fn follow_set(&self, non_terminal: &str) -> BTreeSet<String> {
        self.follow_sets()
            .get(non_terminal)
            .cloned()
            .unwrap_or_default()
    }

    /// FIRST set of a symbol sequence. Contains `ε` iff every symbol is
    /// nullable (in particular for the empty sequence).
    pub fn first_of_sequence<S: AsRef<str>>(&self, symbols: &[S]) -> BTreeSet<String> {
        first_of_sequence_in(&self.first_sets(), symbols)
    }

    pub fn is_nullable(&self, symbol: &str) -> bool {
        self.first_set(symbol).contains(EPSILON)
    }

    /// Non-terminals that derive the empty string.
    ///
    /// A non-terminal is nullable if it has an epsilon production, or a
    /// production whose right-hand side consists of nullable symbols only.
    pub fn nullable_non_terminals(&self) -> BTreeSet<String> {
        let mut nullable = BTreeSet::new();
        loop {
            let mut changed = false;
            for production in &self.productions {
                if nullable.contains(production.lhs()) {
                    continue;
                }
                if production.rhs().iter().all(|s| nullable.contains(s)) {
                    nullable.insert(production.lhs().to_owned());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        nullable
    }

    fn compute_first_sets(&self) -> SymbolSets {
        let _span = tracing::debug_span!("first sets").entered();

        let mut first = SymbolSets::new();
        for terminal in &self.terminals {
            first.insert(terminal.clone(), BTreeSet::from([terminal.clone()]));
        }
        for non_terminal in &self.non_terminals {
            first.entry(non_terminal.clone()).or_default();
        }

        let mut iterations = 0;
        loop {
            iterations += 1;
            let mut changed = false;

            for production in &self.productions {
                let sequence_first = first_of_sequence_in(&first, production.rhs());
                let entry = first.entry(production.lhs().to_owned()).or_default();
                for symbol in sequence_first {
                    changed |= entry.insert(symbol);
                }
            }

            if !changed {
                break;
            }
        }

        tracing::trace!(iterations, "first sets converged");
        first
    }

    fn compute_follow_sets(&self, first: &SymbolSets) -> SymbolSets {
        let _span = tracing::debug_span!("follow sets").entered();

        let mut follow: SymbolSets = self
            .non_terminals
            .iter()
            .map(|non_terminal| (non_terminal.clone(), BTreeSet::new()))
            .collect();

        if let Some(start) = &self.start {
            follow
                .entry(start.clone())
                .or_default()
                .insert(END_MARKER.to_owned());
        }

        let mut iterations = 0;
        loop {
            iterations += 1;
            let mut changed = false;

            for production in &self.productions {
                let rhs = production.rhs();
                for (i, symbol) in rhs.iter().enumerate() {
                    if !self.non_terminals.contains(symbol) {
                        continue;
                    }

                    let beta_first = first_of_sequence_in(first, &rhs[i + 1..]);
                    let mut additions = beta_first
                        .iter()
                        .filter(|s| s.as_str() != EPSILON)
                        .cloned()
                        .collect::<Vec<_>>();
                    if beta_first.contains(EPSILON) {
                        if let Some(lhs_follow) = follow.get(production.lhs()) {
                            additions.extend(lhs_follow.iter().cloned());
                        }
                    }

                    let entry = follow.entry(symbol.clone()).or_default();
                    for addition in additions {
                        changed |= entry.insert(addition);
                    }
                }
            }

            if !changed {
                break;
            }
        }

        tracing::trace!(iterations, "follow sets converged");
        follow
    }
}

/// FIRST of a sequence given FIRST sets of the single symbols. Names missing
/// from `first` are treated like terminals.
pub(crate) fn first_of_sequence_in<S: AsRef<str>>(
    first: &SymbolSets,
    symbols: &[S],
) -> BTreeSet<String> {
    let mut result = BTreeSet::new();

    for symbol in symbols {
        let symbol = symbol.as_ref();
        if is_epsilon(symbol) {
            continue;
        }

        match first.get(symbol) {
            Some(set) => {
                result.extend(set.iter().filter(|s| s.as_str() != EPSILON).cloned());
                if !set.contains(EPSILON) {
                    return result;
                }
            }
            None => {
                result.insert(symbol.to_owned());
                return result;
            }
        }
    }

    result.insert(EPSILON.to_owned());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ll1_expression_grammar() -> Grammar {
        let mut grammar = Grammar::new();
        grammar.add_rule("E", ["T", "E'"]);
        grammar.add_rule("E'", ["+", "T", "E'"]);
        grammar.add_rule("E'", ["ε"]);
        grammar.add_rule("T", ["id"]);
        grammar.set_start_symbol("E");
        grammar
    }

    fn full_expression_grammar() -> Grammar {
        let mut grammar = Grammar::new();
        grammar.add_rule("E", ["T", "E'"]);
        grammar.add_rule("E'", ["+", "T", "E'"]);
        grammar.add_rule("E'", ["ε"]);
        grammar.add_rule("T", ["F", "T'"]);
        grammar.add_rule("T'", ["*", "F", "T'"]);
        grammar.add_rule("T'", ["ε"]);
        grammar.add_rule("F", ["(", "E", ")"]);
        grammar.add_rule("F", ["id"]);
        grammar.set_start_symbol("E");
        grammar
    }

    #[test]
    fn it_computes_first_of_terminals() {
        let grammar = full_expression_grammar();
        for terminal in grammar.terminals() {
            assert_eq!(grammar.first_set(terminal), set(&[terminal.as_str()]));
        }
    }

    #[test]
    fn it_computes_first_and_follow_sets() {
        let grammar = ll1_expression_grammar();
        assert_eq!(grammar.first_set("E"), set(&["id"]));
        assert_eq!(grammar.first_set("E'"), set(&["+", "ε"]));
        assert_eq!(grammar.follow_set("E"), set(&["$"]));
        assert_eq!(grammar.follow_set("E'"), set(&["$"]));
        assert_eq!(grammar.follow_set("T"), set(&["+", "$"]));
    }

    #[test]
    fn it_computes_sets_of_textbook_grammar() {
        let grammar = full_expression_grammar();
        assert_eq!(grammar.first_set("E"), set(&["(", "id"]));
        assert_eq!(grammar.first_set("T'"), set(&["*", "ε"]));
        assert_eq!(grammar.follow_set("E"), set(&[")", "$"]));
        assert_eq!(grammar.follow_set("T"), set(&["+", ")", "$"]));
        assert_eq!(grammar.follow_set("F"), set(&["*", "+", ")", "$"]));
    }

    #[test]
    fn it_computes_first_of_sequences() {
        let grammar = full_expression_grammar();
        assert_eq!(grammar.first_of_sequence(&["E'", "T'"]), set(&["+", "*", "ε"]));
        assert_eq!(grammar.first_of_sequence(&["E'", "id"]), set(&["+", "id"]));
        assert_eq!(grammar.first_of_sequence::<&str>(&[]), set(&["ε"]));
    }

    #[test]
    fn it_is_idempotent() {
        let grammar = full_expression_grammar();
        let first = grammar.first_sets();
        let follow = grammar.follow_sets();
        assert!(Arc::ptr_eq(&first, &grammar.first_sets()));

        let recomputed = grammar.clone();
        recomputed.cache.borrow_mut().clear();
        assert_eq!(*first, *recomputed.first_sets());
        assert_eq!(*follow, *recomputed.follow_sets());
    }

    #[test]
    fn it_recomputes_after_mutation() {
        let mut grammar = ll1_expression_grammar();
        assert_eq!(grammar.first_set("T"), set(&["id"]));
        grammar.add_rule("T", ["num"]);
        assert_eq!(grammar.first_set("T"), set(&["id", "num"]));
        assert_eq!(grammar.first_set("E"), set(&["id", "num"]));
        grammar.remove_rule("T", ["id"]);
        assert_eq!(grammar.first_set("E"), set(&["num"]));
    }

    #[test]
    fn it_computes_nullable_non_terminals() {
        let mut grammar = Grammar::new();
        grammar.add_rule("S", ["A", "B"]);
        grammar.add_rule("A", ["ε"]);
        grammar.add_rule("B", ["A", "A"]);
        grammar.add_rule("B", ["b"]);
        grammar.add_rule("C", ["c"]);
        grammar.set_start_symbol("S");

        assert_eq!(grammar.nullable_non_terminals(), set(&["S", "A", "B"]));
        assert!(grammar.is_nullable("S"));
        assert!(!grammar.is_nullable("C"));
        assert!(!grammar.is_nullable("b"));
    }

    #[test]
    fn it_handles_left_recursion_without_looping() {
        let mut grammar = Grammar::new();
        grammar.add_rule("E", ["E", "+", "T"]);
        grammar.add_rule("E", ["T"]);
        grammar.add_rule("T", ["id"]);
        grammar.set_start_symbol("E");

        assert_eq!(grammar.first_set("E"), set(&["id"]));
        assert_eq!(grammar.follow_set("E"), set(&["+", "$"]));
    }
}
