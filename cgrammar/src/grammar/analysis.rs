//! Grammar class checks and diagnostics.

use std::{
    collections::{
        BTreeSet,
        HashMap,
        VecDeque,
    },
    fmt,
};

use itertools::Itertools;

use super::{
    sets::first_of_sequence_in,
    Grammar,
};
use crate::symbol::{
    Production,
    EPSILON,
};

/// A violation of the LL(1) conditions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ll1Conflict {
    /// Two alternatives of `non_terminal` can start with the same terminal.
    FirstFirst {
        non_terminal: String,
        first: Production,
        second: Production,
        overlap: BTreeSet<String>,
    },

    /// `non_terminal` is nullable and a terminal that can start one of its
    /// alternatives can also follow it.
    FirstFollow {
        non_terminal: String,
        overlap: BTreeSet<String>,
        line: Option<usize>,
    },
}

impl Ll1Conflict {
    pub fn non_terminal(&self) -> &str {
        match self {
            Self::FirstFirst { non_terminal, .. } | Self::FirstFollow { non_terminal, .. } => {
                non_terminal
            }
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            Self::FirstFirst { first, .. } => first.line(),
            Self::FirstFollow { line, .. } => *line,
        }
    }
}

impl fmt::Display for Ll1Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstFirst {
                non_terminal,
                first,
                second,
                overlap,
            } => {
                write!(
                    f,
                    "FIRST/FIRST conflict in {non_terminal}: '{first}' and '{second}' both start with {{{}}}",
                    overlap.iter().join(", ")
                )?;
            }
            Self::FirstFollow {
                non_terminal,
                overlap,
                ..
            } => {
                write!(
                    f,
                    "FIRST/FOLLOW conflict in nullable {non_terminal}: {{{}}} can start and follow it",
                    overlap.iter().join(", ")
                )?;
            }
        }
        if let Some(line) = self.line() {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

/// A pattern that hints at an ambiguous grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AmbiguityFinding {
    OverlappingAlternatives {
        non_terminal: String,
        overlap: BTreeSet<String>,
    },
    DanglingElse {
        non_terminal: String,
    },
    MissingOperatorPrecedence {
        operator: String,
    },
}

impl fmt::Display for AmbiguityFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverlappingAlternatives {
                non_terminal,
                overlap,
            } => {
                write!(
                    f,
                    "alternatives of {non_terminal} overlap on {{{}}}",
                    overlap.iter().join(", ")
                )
            }
            Self::DanglingElse { non_terminal } => {
                write!(f, "dangling else in {non_terminal}")
            }
            Self::MissingOperatorPrecedence { operator } => {
                write!(f, "binary operator '{operator}' has no precedence")
            }
        }
    }
}

impl Grammar {
    /// Edges `A -> B` where `B` can be the leftmost symbol of a sentential
    /// form derived in one step from `A`.
    fn left_dependency_graph(&self) -> HashMap<&str, BTreeSet<&str>> {
        let nullable = self.nullable_non_terminals();
        let mut graph: HashMap<&str, BTreeSet<&str>> = HashMap::new();

        for production in &self.productions {
            let edges = graph.entry(production.lhs()).or_default();
            for symbol in production.rhs() {
                if !self.non_terminals.contains(symbol) {
                    break;
                }
                edges.insert(symbol.as_str());
                if !nullable.contains(symbol) {
                    break;
                }
            }
        }

        graph
    }

    /// All non-terminals that can derive a string starting with themselves,
    /// directly or through other non-terminals.
    pub fn left_recursive_non_terminals(&self) -> BTreeSet<String> {
        let graph = self.left_dependency_graph();
        let mut left_recursive = BTreeSet::new();

        for &origin in graph.keys() {
            let mut visited = BTreeSet::new();
            let mut stack = graph[origin].iter().copied().collect::<Vec<_>>();
            while let Some(symbol) = stack.pop() {
                if symbol == origin {
                    left_recursive.insert(origin.to_owned());
                    break;
                }
                if visited.insert(symbol) {
                    if let Some(next) = graph.get(symbol) {
                        stack.extend(next.iter().copied());
                    }
                }
            }
        }

        left_recursive
    }

    pub fn has_left_recursion(&self) -> bool {
        !self.left_recursive_non_terminals().is_empty()
    }

    pub fn is_left_recursive(&self, non_terminal: &str) -> bool {
        self.left_recursive_non_terminals().contains(non_terminal)
    }

    /// `true` if `non_terminal` has a production `A -> A α`.
    pub fn has_direct_left_recursion(&self, non_terminal: &str) -> bool {
        self.productions
            .iter()
            .any(|p| p.lhs() == non_terminal && p.first_symbol() == Some(non_terminal))
    }

    /// All LL(1) violations.
    pub fn ll1_conflicts(&self) -> Vec<Ll1Conflict> {
        self.find_ll1_conflicts(false)
    }

    /// Checks the LL(1) conditions for every non-terminal with more than one
    /// production:
    ///
    ///  1. FIRST sets of the alternatives are pairwise disjoint (ignoring ε).
    ///  2. If an alternative is nullable, the union of the alternatives' FIRST
    ///     sets doesn't intersect the non-terminal's FOLLOW set.
    ///
    /// Stops at the first violation, which is logged.
    pub fn is_ll1(&self) -> bool {
        match self.find_ll1_conflicts(true).first() {
            Some(conflict) => {
                self.sink.info(&format!("grammar is not LL(1): {conflict}"));
                false
            }
            None => true,
        }
    }

    fn find_ll1_conflicts(&self, stop_at_first: bool) -> Vec<Ll1Conflict> {
        let first = self.first_sets();
        let follow = self.follow_sets();
        let mut conflicts = vec![];

        for non_terminal in self.lhs_order() {
            let alternatives = self.productions_for(&non_terminal);
            if alternatives.len() < 2 {
                continue;
            }

            let alternative_firsts = alternatives
                .iter()
                .map(|p| first_of_sequence_in(&first, p.rhs()))
                .collect::<Vec<_>>();

            for ((i, a), (j, b)) in alternative_firsts.iter().enumerate().tuple_combinations() {
                let overlap = without_epsilon(a.intersection(b));
                if !overlap.is_empty() {
                    conflicts.push(Ll1Conflict::FirstFirst {
                        non_terminal: non_terminal.clone(),
                        first: alternatives[i].clone(),
                        second: alternatives[j].clone(),
                        overlap,
                    });
                    if stop_at_first {
                        return conflicts;
                    }
                }
            }

            let nullable_alternative = alternative_firsts
                .iter()
                .position(|first| first.contains(EPSILON));
            if let Some(nullable_alternative) = nullable_alternative {
                let union = without_epsilon(alternative_firsts.iter().flatten());
                let overlap = match follow.get(&non_terminal) {
                    Some(follow) => union.intersection(follow).cloned().collect::<BTreeSet<_>>(),
                    None => BTreeSet::new(),
                };
                if !overlap.is_empty() {
                    conflicts.push(Ll1Conflict::FirstFollow {
                        non_terminal: non_terminal.clone(),
                        overlap,
                        line: alternatives[nullable_alternative].line(),
                    });
                    if stop_at_first {
                        return conflicts;
                    }
                }
            }
        }

        conflicts
    }

    /// Heuristic LR(1) gate.
    ///
    /// This is **not** an LR(1) decision procedure: no item sets are built.
    /// It only checks necessary-looking conditions: no left recursion, no
    /// overlapping FIRST sets between alternatives, no ambiguity (see
    /// [`Self::has_ambiguity`]) and structural validity. Grammars rejected
    /// here can still be LR(1), e.g. any left-recursive expression grammar.
    pub fn is_lr1(&self) -> bool {
        if self.has_left_recursion() {
            return false;
        }
        if !self.overlapping_alternatives().is_empty() {
            return false;
        }
        if self.has_ambiguity() {
            return false;
        }
        self.validation_errors()
            .iter()
            .all(|error| !error.is_structural())
    }

    /// Individual ambiguity hints: overlapping alternatives, dangling-else
    /// patterns and binary operators without precedence.
    pub fn ambiguity_report(&self) -> Vec<AmbiguityFinding> {
        let mut findings = self.overlapping_alternatives();
        findings.extend(self.dangling_else());
        findings.extend(self.operators_without_precedence());
        findings
    }

    /// Decides ambiguity by trying to repair the grammar with the registered
    /// rewrite rules (on a copy) and checking whether LL(1) conflicts remain.
    /// The findings of [`Self::ambiguity_report`] are logged as warnings.
    pub fn has_ambiguity(&self) -> bool {
        for finding in self.ambiguity_report() {
            self.sink.warning(&format!("possible ambiguity: {finding}"));
        }

        let mut repaired = self.clone();
        repaired.resolve_ll1_conflicts();
        !repaired.is_ll1()
    }

    fn overlapping_alternatives(&self) -> Vec<AmbiguityFinding> {
        let first = self.first_sets();
        let mut findings = vec![];

        for non_terminal in self.lhs_order() {
            let alternative_firsts = self
                .productions_for(&non_terminal)
                .iter()
                .map(|p| first_of_sequence_in(&first, p.rhs()))
                .collect::<Vec<_>>();

            let overlap = alternative_firsts
                .iter()
                .tuple_combinations()
                .flat_map(|(a, b)| without_epsilon(a.intersection(b)))
                .collect::<BTreeSet<_>>();

            if !overlap.is_empty() {
                findings.push(AmbiguityFinding::OverlappingAlternatives {
                    non_terminal,
                    overlap,
                });
            }
        }

        findings
    }

    fn dangling_else(&self) -> Vec<AmbiguityFinding> {
        let mut findings = vec![];

        for non_terminal in self.lhs_order() {
            let (with_else, without_else): (Vec<_>, Vec<_>) = self
                .productions_for(&non_terminal)
                .into_iter()
                .filter(|p| p.rhs().iter().any(|s| s == "if"))
                .partition(|p| p.rhs().iter().any(|s| s == "else"));

            if !with_else.is_empty() && !without_else.is_empty() {
                findings.push(AmbiguityFinding::DanglingElse { non_terminal });
            }
        }

        findings
    }

    fn operators_without_precedence(&self) -> Vec<AmbiguityFinding> {
        let mut operators = BTreeSet::new();

        for production in &self.productions {
            for window in production.rhs().windows(3) {
                let [left, operator, right] = window
                else {
                    continue;
                };
                if self.non_terminals.contains(left)
                    && self.non_terminals.contains(right)
                    && self.terminals.contains(operator)
                    && is_operator_like(operator)
                    && !self.precedence.contains_key(operator)
                {
                    operators.insert(operator.clone());
                }
            }
        }

        operators
            .into_iter()
            .map(|operator| AmbiguityFinding::MissingOperatorPrecedence { operator })
            .collect()
    }

    /// Non-terminals that derive at least one terminal string.
    pub fn productive_non_terminals(&self) -> BTreeSet<String> {
        let mut productive = BTreeSet::new();
        loop {
            let mut changed = false;
            for production in &self.productions {
                if productive.contains(production.lhs()) {
                    continue;
                }
                let all_productive = production
                    .rhs()
                    .iter()
                    .all(|s| !self.non_terminals.contains(s) || productive.contains(s));
                if all_productive {
                    productive.insert(production.lhs().to_owned());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        productive
    }

    /// Symbols (terminals and non-terminals) reachable from the start symbol.
    pub fn reachable_symbols(&self) -> BTreeSet<String> {
        let mut reachable = BTreeSet::new();
        let Some(start) = &self.start
        else {
            return reachable;
        };

        let mut queue = VecDeque::from([start.clone()]);
        reachable.insert(start.clone());

        while let Some(symbol) = queue.pop_front() {
            for production in self.productions.iter().filter(|p| p.lhs() == symbol) {
                for next in production.rhs() {
                    if reachable.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }

        reachable
    }
}

fn without_epsilon<'a>(symbols: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    symbols
        .into_iter()
        .filter(|s| s.as_str() != EPSILON)
        .cloned()
        .collect()
}

/// Terminals spelled with punctuation only, excluding brackets and
/// separators.
fn is_operator_like(terminal: &str) -> bool {
    !terminal.is_empty()
        && terminal
            .chars()
            .all(|c| c.is_ascii_punctuation() && !"()[]{};,".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Associativity;

    fn left_recursive_grammar() -> Grammar {
        let mut grammar = Grammar::new();
        grammar.add_rule("E", ["E", "+", "T"]);
        grammar.add_rule("E", ["T"]);
        grammar.add_rule("T", ["id"]);
        grammar.set_start_symbol("E");
        grammar
    }

    fn ll1_grammar() -> Grammar {
        let mut grammar = Grammar::new();
        grammar.add_rule("E", ["T", "E'"]);
        grammar.add_rule("E'", ["+", "T", "E'"]);
        grammar.add_rule("E'", ["ε"]);
        grammar.add_rule("T", ["id"]);
        grammar.set_start_symbol("E");
        grammar
    }

    #[test]
    fn it_detects_direct_left_recursion() {
        let grammar = left_recursive_grammar();
        assert!(grammar.has_left_recursion());
        assert!(grammar.has_direct_left_recursion("E"));
        assert!(!grammar.has_direct_left_recursion("T"));
        assert!(!grammar.is_ll1());
    }

    #[test]
    fn it_accepts_ll1_grammar() {
        let grammar = ll1_grammar();
        assert!(!grammar.has_left_recursion());
        assert!(grammar.is_ll1());
        assert!(grammar.ll1_conflicts().is_empty());
    }

    #[test]
    fn it_detects_indirect_left_recursion() {
        let mut grammar = Grammar::new();
        grammar.add_rule("A", ["B", "a"]);
        grammar.add_rule("B", ["A", "b"]);
        grammar.add_rule("B", ["c"]);
        grammar.set_start_symbol("A");

        assert_eq!(
            grammar.left_recursive_non_terminals(),
            BTreeSet::from(["A".to_owned(), "B".to_owned()])
        );
        assert!(!grammar.has_direct_left_recursion("A"));
    }

    #[test]
    fn it_detects_left_recursion_behind_nullable_prefix() {
        let mut grammar = Grammar::new();
        grammar.add_rule("A", ["N", "A", "x"]);
        grammar.add_rule("A", ["y"]);
        grammar.add_rule("N", ["ε"]);
        grammar.set_start_symbol("A");

        assert!(grammar.is_left_recursive("A"));
        assert!(!grammar.is_left_recursive("N"));
    }

    #[test]
    fn it_reports_first_first_conflicts() {
        let conflicts = left_recursive_grammar().ll1_conflicts();
        assert_eq!(conflicts.len(), 1);
        match &conflicts[0] {
            Ll1Conflict::FirstFirst {
                non_terminal,
                overlap,
                ..
            } => {
                assert_eq!(non_terminal, "E");
                assert!(overlap.contains("id"));
            }
            other => panic!("unexpected conflict: {other:?}"),
        }
    }

    #[test]
    fn it_reports_first_follow_conflicts() {
        let mut grammar = Grammar::new();
        grammar.add_rule("S", ["A", "a"]);
        grammar.add_rule("A", ["a"]);
        grammar.add_rule("A", ["ε"]);
        grammar.set_start_symbol("S");

        assert!(!grammar.is_ll1());
        let conflicts = grammar.ll1_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert!(matches!(
            &conflicts[0],
            Ll1Conflict::FirstFollow { non_terminal, .. } if non_terminal == "A"
        ));
        assert!(conflicts[0].to_string().contains("FIRST/FOLLOW"));
    }

    #[test]
    fn it_finds_missing_operator_precedence() {
        let mut grammar = Grammar::new();
        grammar.add_rule("E", ["E", "+", "E"]);
        grammar.add_rule("E", ["E", "*", "E"]);
        grammar.add_rule("E", ["(", "E", ")"]);
        grammar.add_rule("E", ["id"]);
        grammar.set_start_symbol("E");
        grammar.set_precedence("*", 2, Associativity::Left);

        let report = grammar.ambiguity_report();
        assert!(report.contains(&AmbiguityFinding::MissingOperatorPrecedence {
            operator: "+".to_owned()
        }));
        assert!(!report.contains(&AmbiguityFinding::MissingOperatorPrecedence {
            operator: "*".to_owned()
        }));
        assert!(grammar.has_ambiguity());
    }

    #[test]
    fn it_finds_dangling_else() {
        let mut grammar = Grammar::new();
        grammar.add_rule("S", ["if", "C", "then", "S"]);
        grammar.add_rule("S", ["if", "C", "then", "S", "else", "S"]);
        grammar.add_rule("S", ["x"]);
        grammar.add_rule("C", ["c"]);
        grammar.set_start_symbol("S");

        let report = grammar.ambiguity_report();
        assert!(report.contains(&AmbiguityFinding::DanglingElse {
            non_terminal: "S".to_owned()
        }));
        assert!(grammar.has_ambiguity());
    }

    #[test]
    fn it_finds_no_ambiguity_in_ll1_grammar() {
        let grammar = ll1_grammar();
        assert!(grammar.ambiguity_report().is_empty());
        assert!(!grammar.has_ambiguity());
    }

    #[test]
    fn it_does_not_mutate_on_ambiguity_check() {
        let grammar = left_recursive_grammar();
        let revision = grammar.revision();
        grammar.has_ambiguity();
        assert_eq!(grammar.revision(), revision);
        assert_eq!(grammar.rule_count(), 3);
    }

    #[test]
    fn it_approximates_lr1() {
        assert!(ll1_grammar().is_lr1());
        assert!(!left_recursive_grammar().is_lr1());
    }

    #[test]
    fn it_computes_productive_and_reachable_symbols() {
        let mut grammar = Grammar::new();
        grammar.add_rule("S", ["a", "A"]);
        grammar.add_rule("S", ["b"]);
        grammar.add_rule("A", ["A", "a"]);
        grammar.add_rule("B", ["b"]);
        grammar.set_start_symbol("S");

        let productive = grammar.productive_non_terminals();
        assert!(productive.contains("S"));
        assert!(productive.contains("B"));
        assert!(!productive.contains("A"));

        let reachable = grammar.reachable_symbols();
        assert!(reachable.contains("S"));
        assert!(reachable.contains("A"));
        assert!(reachable.contains("a"));
        assert!(!reachable.contains("B"));
    }
}
