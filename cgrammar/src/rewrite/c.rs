//! Repairs for the C grammar.
//!
//! Each rule only touches non-terminals whose name contains its pattern.
//! Register them all with
//!
//! ```
//! # use cgrammar::{Grammar, rewrite::c::c_grammar_rules};
//! let mut grammar = Grammar::new();
//! for rule in c_grammar_rules() {
//!     grammar.register_rewrite_rule(rule);
//! }
//! ```

use std::sync::Arc;

use super::{
    matching_non_terminals,
    RewriteRule,
};
use crate::{
    symbol::{
        Production,
        EPSILON,
    },
    Grammar,
};

/// The three C-grammar rules, in the order they should run.
pub fn c_grammar_rules() -> Vec<Arc<dyn RewriteRule>> {
    vec![
        Arc::new(ParameterDeclarationRule::default()),
        Arc::new(DirectDeclaratorRule::default()),
        Arc::new(EpsilonConflictRule::default()),
    ]
}

/// Merges alternatives that share a first symbol by factoring out their
/// longest common prefix into a `<nt>_tail` non-terminal, in one step.
///
/// `parameter_declaration` is the typical case:
///
/// ```text
/// parameter_declaration -> declaration_specifiers declarator
///                        | declaration_specifiers abstract_declarator
///                        | declaration_specifiers
/// ```
#[derive(Clone, Debug)]
pub struct ParameterDeclarationRule {
    pattern: String,
}

impl ParameterDeclarationRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl Default for ParameterDeclarationRule {
    fn default() -> Self {
        Self::new("parameter_declaration")
    }
}

impl RewriteRule for ParameterDeclarationRule {
    fn name(&self) -> &str {
        "parameter declaration"
    }

    fn apply(&self, grammar: &mut Grammar) -> bool {
        let mut changed = false;
        for non_terminal in matching_non_terminals(grammar, &self.pattern) {
            changed |= factor_longest_prefixes(grammar, &non_terminal);
        }
        changed
    }
}

fn factor_longest_prefixes(grammar: &mut Grammar, non_terminal: &str) -> bool {
    let productions = grammar
        .productions_for(non_terminal)
        .into_iter()
        .cloned()
        .collect::<Vec<_>>();

    let mut replacement = vec![];
    let mut tails = vec![];
    let mut done = vec![];
    let mut changed = false;

    for production in &productions {
        let Some(first) = production.first_symbol()
        else {
            replacement.push(production.clone());
            continue;
        };
        if done.contains(&first) {
            continue;
        }
        done.push(first);

        let group = productions
            .iter()
            .filter(|p| p.first_symbol() == Some(first))
            .collect::<Vec<_>>();
        if group.len() < 2 {
            replacement.push(production.clone());
            continue;
        }

        let prefix_len = common_prefix_len(group.iter().map(|p| p.rhs()));
        let tail = grammar.fresh_name(&format!("{non_terminal}_tail"));
        grammar.add_non_terminal(tail.clone());

        let mut rhs = production.rhs()[..prefix_len].to_vec();
        rhs.push(tail.clone());
        replacement.push(production.rebuild(non_terminal, rhs));

        for member in group {
            tails.push(member.rebuild(tail.clone(), &member.rhs()[prefix_len..]));
        }

        changed = true;
    }

    if changed {
        replacement.extend(tails);
        grammar.replace_productions_of(non_terminal, replacement);
    }
    changed
}

fn common_prefix_len<'a>(mut sequences: impl Iterator<Item = &'a [String]>) -> usize {
    let Some(first) = sequences.next()
    else {
        return 0;
    };

    sequences.fold(first.len(), |len, sequence| {
        first
            .iter()
            .zip(sequence)
            .take(len)
            .take_while(|(a, b)| a == b)
            .count()
    })
}

/// Eliminates the direct left recursion of declarator-like non-terminals and
/// left-factors the result.
///
/// ```text
/// direct_declarator -> direct_declarator '[' ']' | direct_declarator '(' ')' | identifier
/// ```
#[derive(Clone, Debug)]
pub struct DirectDeclaratorRule {
    pattern: String,
}

impl DirectDeclaratorRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl Default for DirectDeclaratorRule {
    fn default() -> Self {
        Self::new("direct_declarator")
    }
}

impl RewriteRule for DirectDeclaratorRule {
    fn name(&self) -> &str {
        "direct declarator"
    }

    fn apply(&self, grammar: &mut Grammar) -> bool {
        let mut changed = false;

        for non_terminal in matching_non_terminals(grammar, &self.pattern) {
            if grammar.has_direct_left_recursion(&non_terminal) {
                changed |= grammar.eliminate_left_recursion_for(&non_terminal);
            }
        }

        for _ in 0..grammar.options().left_factor_max_iterations {
            let mut factored = false;
            for non_terminal in matching_non_terminals(grammar, &self.pattern) {
                factored |= grammar.left_factor_non_terminal(&non_terminal);
            }
            if !factored {
                break;
            }
            changed = true;
        }

        changed
    }
}

/// Inlines nullable helper non-terminals that cause FIRST/FOLLOW conflicts.
///
/// Left factoring leaves `<nt>_factored_<n>` non-terminals with an epsilon
/// alternative. If such a non-terminal can start with a terminal that can
/// also follow it, its alternatives are substituted into every production
/// referring to it and the non-terminal is removed. Recursive non-terminals
/// and the start symbol are left alone.
#[derive(Clone, Debug)]
pub struct EpsilonConflictRule {
    pattern: String,
}

impl EpsilonConflictRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl Default for EpsilonConflictRule {
    fn default() -> Self {
        Self::new("factored")
    }
}

impl RewriteRule for EpsilonConflictRule {
    fn name(&self) -> &str {
        "epsilon conflict"
    }

    fn apply(&self, grammar: &mut Grammar) -> bool {
        let mut changed = false;
        for non_terminal in matching_non_terminals(grammar, &self.pattern) {
            if grammar.start_symbol() == Some(non_terminal.as_str()) {
                continue;
            }
            if has_first_follow_conflict(grammar, &non_terminal) {
                changed |= inline_non_terminal(grammar, &non_terminal);
            }
        }
        changed
    }
}

fn has_first_follow_conflict(grammar: &Grammar, non_terminal: &str) -> bool {
    let first = grammar.first_set(non_terminal);
    if !first.contains(EPSILON) {
        return false;
    }
    let follow = grammar.follow_set(non_terminal);
    first
        .iter()
        .any(|terminal| terminal != EPSILON && follow.contains(terminal))
}

fn inline_non_terminal(grammar: &mut Grammar, non_terminal: &str) -> bool {
    let alternatives = grammar
        .productions_for(non_terminal)
        .into_iter()
        .map(|p| p.rhs().to_vec())
        .collect::<Vec<_>>();
    if alternatives
        .iter()
        .any(|rhs| rhs.iter().any(|s| s == non_terminal))
    {
        return false;
    }

    let referrers = grammar
        .productions()
        .iter()
        .filter(|p| p.lhs() != non_terminal && p.rhs().iter().any(|s| s == non_terminal))
        .cloned()
        .collect::<Vec<_>>();

    for referrer in &referrers {
        let replacement = expand(referrer.rhs(), non_terminal, &alternatives)
            .into_iter()
            .map(|rhs| referrer.rebuild(referrer.lhs(), rhs))
            .collect::<Vec<Production>>();
        grammar.replace_production(referrer, replacement);
    }

    grammar.remove_non_terminal(non_terminal);
    grammar
        .sink()
        .info(&format!("inlined {non_terminal} into {} productions", referrers.len()));
    true
}

/// Every way of replacing each occurrence of `non_terminal` in `rhs` by one
/// of `alternatives`.
fn expand(rhs: &[String], non_terminal: &str, alternatives: &[Vec<String>]) -> Vec<Vec<String>> {
    let Some(position) = rhs.iter().position(|s| s == non_terminal)
    else {
        return vec![rhs.to_vec()];
    };

    alternatives
        .iter()
        .flat_map(|alternative| {
            let mut expanded = rhs[..position].to_vec();
            expanded.extend(alternative.iter().cloned());
            expanded.extend_from_slice(&rhs[position + 1..]);
            expand(&expanded, non_terminal, alternatives)
        })
        .collect()
}
