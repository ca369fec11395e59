//! Structural rewrites.
//!
//! All passes mutate the grammar in place and keep the relative order of
//! untouched productions. Productions generated for a non-terminal are placed
//! where its first production was.

use std::collections::BTreeSet;

use super::Grammar;
use crate::{
    config::EpsilonPolicy,
    symbol::Production,
};

impl Grammar {
    /// Eliminates direct left recursion of every non-terminal.
    ///
    /// Indirect left recursion (`A -> B α`, `B -> A β`) is not eliminated.
    /// Non-terminals that are still left-recursive afterwards are logged as
    /// warnings. Returns whether the grammar changed.
    pub fn eliminate_left_recursion(&mut self) -> bool {
        let _span = tracing::debug_span!("eliminate left recursion").entered();

        let mut changed = false;
        for non_terminal in self.lhs_order() {
            if self.has_direct_left_recursion(&non_terminal) {
                changed |= self.eliminate_left_recursion_for(&non_terminal);
            }
        }

        for non_terminal in self.left_recursive_non_terminals() {
            self.sink.warning(&format!(
                "{non_terminal} is still left-recursive, indirect left recursion is not eliminated"
            ));
        }

        changed
    }

    /// Rewrites `A -> A α1 | ... | A αn | β1 | ... | βm` into
    ///
    /// ```text
    /// A      -> β1 A_rest | ... | βm A_rest
    /// A_rest -> α1 A_rest | ... | αn A_rest | ε
    /// ```
    ///
    /// Returns `false` if `non_terminal` isn't directly left-recursive, or if
    /// it has no non-recursive alternative (which is logged).
    pub fn eliminate_left_recursion_for(&mut self, non_terminal: &str) -> bool {
        let (recursive, rest): (Vec<_>, Vec<_>) = self
            .productions_for(non_terminal)
            .into_iter()
            .cloned()
            .partition(|p| p.first_symbol() == Some(non_terminal));

        if recursive.is_empty() {
            return false;
        }
        if rest.is_empty() {
            self.sink.warning(&format!(
                "can't eliminate left recursion of {non_terminal}: every alternative is left-recursive"
            ));
            return false;
        }

        let tail = self.fresh_name(&format!("{non_terminal}_rest"));
        let mut replacement = vec![];

        for production in &rest {
            let mut rhs = production.rhs().to_vec();
            rhs.push(tail.clone());
            replacement.push(production.rebuild(non_terminal, rhs));
        }

        for production in &recursive {
            let alpha = &production.rhs()[1..];
            if alpha.is_empty() {
                // A -> A
                continue;
            }
            let mut rhs = alpha.to_vec();
            rhs.push(tail.clone());
            replacement.push(production.rebuild(tail.clone(), rhs));
        }

        replacement.push(Production::new(tail.clone(), Vec::<String>::new()));

        self.replace_productions_of(non_terminal, replacement);
        self.sink.info(&format!(
            "eliminated left recursion of {non_terminal} using {tail}"
        ));
        true
    }

    /// Factors out common first symbols of alternatives.
    ///
    /// For every group of at least two alternatives `A -> x α1 | ... | x αn`
    /// a fresh `A_factored_<n>` non-terminal is introduced:
    ///
    /// ```text
    /// A              -> x A_factored_n
    /// A_factored_n   -> α1 | ... | αn
    /// ```
    ///
    /// Repeats until nothing changes, but at most
    /// [`left_factor_max_iterations`](crate::GrammarOptions::left_factor_max_iterations)
    /// times, so the result may still contain common prefixes. Returns whether
    /// the grammar changed.
    pub fn left_factor(&mut self) -> bool {
        let _span = tracing::debug_span!("left factor").entered();

        let max_iterations = self.options.left_factor_max_iterations;
        let mut changed_any = false;

        for iteration in 0..max_iterations {
            let mut changed = false;
            for non_terminal in self.lhs_order() {
                changed |= self.left_factor_non_terminal(&non_terminal);
            }
            tracing::trace!(iteration, changed, "left factoring iteration");

            if !changed {
                return changed_any;
            }
            changed_any = true;
        }

        if self.has_common_prefixes() {
            self.sink.warning(&format!(
                "left factoring stopped after {max_iterations} iterations, the grammar still has common prefixes"
            ));
        }

        changed_any
    }

    /// One round of left factoring for a single non-terminal.
    pub(crate) fn left_factor_non_terminal(&mut self, non_terminal: &str) -> bool {
        let productions = self
            .productions_for(non_terminal)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();

        let prefixes = common_first_symbols(&productions);
        if prefixes.is_empty() {
            return false;
        }

        let mut replacement = vec![];
        let mut factored_productions = vec![];
        let mut emitted = BTreeSet::new();

        for production in &productions {
            let Some(prefix) = production.first_symbol().filter(|s| prefixes.contains(*s))
            else {
                replacement.push(production.clone());
                continue;
            };
            if !emitted.insert(prefix.to_owned()) {
                continue;
            }

            self.factor_counter += 1;
            let factored =
                self.fresh_name(&format!("{non_terminal}_factored_{}", self.factor_counter));

            replacement.push(production.rebuild(non_terminal, [prefix, factored.as_str()]));

            for member in productions
                .iter()
                .filter(|p| p.first_symbol() == Some(prefix))
            {
                factored_productions.push(member.rebuild(factored.clone(), &member.rhs()[1..]));
            }

            // declare now, so the next fresh name can't collide with it.
            self.non_terminals.insert(factored);
        }

        replacement.extend(factored_productions);
        self.replace_productions_of(non_terminal, replacement);
        true
    }

    fn has_common_prefixes(&self) -> bool {
        self.lhs_order().iter().any(|non_terminal| {
            let productions = self
                .productions_for(non_terminal)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>();
            !common_first_symbols(&productions).is_empty()
        })
    }

    /// Removes epsilon productions.
    ///
    /// Every production is replaced by all variants obtained by leaving out
    /// any subset of its nullable symbols, except the empty variant.
    ///
    /// If the start symbol is nullable, the grammar no longer accepts the
    /// empty input unless [`EpsilonPolicy::KeepStartEpsilon`] is configured.
    /// Returns `true` if the empty string was dropped from the language this
    /// way, which is also logged as a warning.
    pub fn remove_epsilon_productions(&mut self) -> bool {
        let _span = tracing::debug_span!("remove epsilon productions").entered();

        let nullable = self.nullable_non_terminals();
        let mut productions: Vec<Production> = vec![];

        for production in &self.productions {
            if production.is_empty() {
                continue;
            }

            let mut variants: Vec<Vec<&str>> = vec![vec![]];
            for symbol in production.rhs() {
                if nullable.contains(symbol) {
                    let without = variants.clone();
                    for variant in &mut variants {
                        variant.push(symbol.as_str());
                    }
                    variants.extend(without);
                }
                else {
                    for variant in &mut variants {
                        variant.push(symbol.as_str());
                    }
                }
            }

            for variant in variants {
                if variant.is_empty() {
                    continue;
                }
                let candidate = if variant.len() == production.len() {
                    production.clone()
                }
                else {
                    production.rebuild(production.lhs(), variant)
                };
                if !productions.contains(&candidate) {
                    productions.push(candidate);
                }
            }
        }

        self.productions = productions;

        let nullable_start = self
            .start
            .clone()
            .filter(|start| nullable.contains(start));

        let mut dropped_empty_string = false;
        if let Some(start) = nullable_start {
            match self.options.epsilon_policy {
                EpsilonPolicy::RemoveAll => {
                    self.sink.warning(&format!(
                        "start symbol {start} derives the empty string, removing epsilon productions drops it from the language"
                    ));
                    dropped_empty_string = true;
                }
                EpsilonPolicy::KeepStartEpsilon => {
                    self.productions
                        .push(Production::new(start, Vec::<String>::new()));
                }
            }
        }

        self.touch();
        dropped_empty_string
    }

    /// Removes non-productive and unreachable symbols and their productions.
    ///
    /// First every production that mentions a non-productive non-terminal is
    /// removed, then every production of a non-terminal that isn't reachable
    /// from the start symbol. The symbol sets are rebuilt from what's left;
    /// the start symbol always stays declared. Returns whether the grammar
    /// changed.
    pub fn remove_useless_symbols(&mut self) -> bool {
        let _span = tracing::debug_span!("remove useless symbols").entered();

        let before = (
            self.productions.len(),
            self.terminals.len(),
            self.non_terminals.len(),
        );

        let productive = self.productive_non_terminals();
        let non_terminals = &self.non_terminals;
        self.productions.retain(|p| {
            productive.contains(p.lhs())
                && p.rhs()
                    .iter()
                    .all(|s| !non_terminals.contains(s) || productive.contains(s))
        });
        self.touch();

        let reachable = self.reachable_symbols();
        self.productions.retain(|p| reachable.contains(p.lhs()));

        let mut terminals = BTreeSet::new();
        let mut non_terminals = BTreeSet::new();
        for production in &self.productions {
            non_terminals.insert(production.lhs().to_owned());
        }
        for production in &self.productions {
            for symbol in production.rhs() {
                if !non_terminals.contains(symbol) && !self.non_terminals.contains(symbol) {
                    terminals.insert(symbol.clone());
                }
            }
        }
        if let Some(start) = &self.start {
            non_terminals.insert(start.clone());
        }

        for removed in self.non_terminals.difference(&non_terminals) {
            self.sink
                .info(&format!("removed useless non-terminal {removed}"));
        }

        self.terminal_patterns
            .retain(|terminal, _| terminals.contains(terminal));
        self.terminals = terminals;
        self.non_terminals = non_terminals;
        self.touch();

        before
            != (
                self.productions.len(),
                self.terminals.len(),
                self.non_terminals.len(),
            )
    }

    /// Applies the registered [rewrite rules](crate::rewrite::RewriteRule)
    /// until the grammar is LL(1), no rule changes anything, or
    /// [`max_resolution_rounds`](crate::GrammarOptions::max_resolution_rounds)
    /// is reached. Remaining conflicts are logged. Returns
    /// [`Self::is_ll1`] of the result.
    pub fn resolve_ll1_conflicts(&mut self) -> bool {
        let _span = tracing::debug_span!("resolve ll1 conflicts").entered();

        let rules = self.rewrite_rules.clone();
        for round in 0..self.options.max_resolution_rounds {
            if self.is_ll1() {
                return true;
            }

            let mut changed = false;
            for rule in &rules {
                if rule.apply(self) {
                    tracing::debug!(round, rule = rule.name(), "rewrite rule applied");
                    self.sink
                        .info(&format!("rewrite rule '{}' changed the grammar", rule.name()));
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        let conflicts = self.ll1_conflicts();
        for conflict in &conflicts {
            self.sink.warning(&format!("unresolved: {conflict}"));
        }
        conflicts.is_empty()
    }
}

/// First symbols shared by at least two of the productions.
fn common_first_symbols(productions: &[Production]) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut common = BTreeSet::new();
    for first in productions.iter().filter_map(Production::first_symbol) {
        if !seen.insert(first) {
            common.insert(first.to_owned());
        }
    }
    common
}
