//! Operator precedence relations between terminals.
//!
//! The table is derived from a finished grammar and is not kept in sync with
//! later changes to it. For every production:
//!
//!  - `a b` (two terminals) gives `a = b`.
//!  - `a B...` gives `a < b` for every `b` in FIRST of the sequence after
//!    `a`. So a nullable `B` lets the next symbols contribute too.
//!  - `B b` gives `a > b` for every terminal `a` in FOLLOW(`B`).
//!
//! The end marker `$` is related to the start symbol: `$ < a` for `a` in
//! FIRST(start) and `a > $` for the terminals in FOLLOW(start).

use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    fmt,
};

use crate::{
    symbol::{
        END_MARKER,
        EPSILON,
    },
    Grammar,
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Relation {
    #[display(fmt = "<")]
    LessThan,
    #[display(fmt = ">")]
    GreaterThan,
    #[display(fmt = "=")]
    Equal,
    #[default]
    #[display(fmt = "")]
    Undefined,
}

/// Two different relations derived for the same pair. The first one is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecedenceConflict {
    pub left: String,
    pub right: String,
    pub kept: Relation,
    pub rejected: Relation,
}

impl fmt::Display for PrecedenceConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{left} {kept} {right} conflicts with {left} {rejected} {right}",
            left = self.left,
            right = self.right,
            kept = self.kept,
            rejected = self.rejected,
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct OperatorPrecedenceTable {
    operators: BTreeSet<String>,
    relations: BTreeMap<String, BTreeMap<String, Relation>>,
    conflicts: Vec<PrecedenceConflict>,
    operator_grammar: bool,
}

impl OperatorPrecedenceTable {
    pub fn build(grammar: &Grammar) -> Self {
        let _span = tracing::debug_span!("operator precedence table").entered();

        let mut table = Self {
            operators: grammar.terminals().clone(),
            operator_grammar: is_operator_grammar(grammar),
            ..Default::default()
        };
        table.operators.insert(END_MARKER.to_owned());

        let is_terminal = |symbol: &str| !grammar.is_non_terminal(symbol);

        for production in grammar.productions() {
            let rhs = production.rhs();

            for (i, pair) in rhs.windows(2).enumerate() {
                let [symbol, next] = pair
                else {
                    continue;
                };

                if is_terminal(symbol.as_str()) {
                    if is_terminal(next.as_str()) {
                        table.set(symbol, next, Relation::Equal);
                        continue;
                    }

                    for first in grammar.first_of_sequence(&rhs[i + 1..]) {
                        if first != EPSILON {
                            table.set(symbol, &first, Relation::LessThan);
                        }
                    }
                }
                else if is_terminal(next.as_str()) {
                    // `$` is a boundary, not an operator to the left of
                    // `next`. Its relations come from the start symbol below.
                    for follow in grammar.follow_set(symbol) {
                        if follow != END_MARKER {
                            table.set(&follow, next, Relation::GreaterThan);
                        }
                    }
                }
            }
        }

        if let Some(start) = grammar.start_symbol() {
            for first in grammar.first_set(start) {
                if first != EPSILON {
                    table.set(END_MARKER, &first, Relation::LessThan);
                }
            }
            for follow in grammar.follow_set(start) {
                if follow != END_MARKER {
                    table.set(&follow, END_MARKER, Relation::GreaterThan);
                }
            }
        }

        for conflict in &table.conflicts {
            grammar
                .sink()
                .warning(&format!("operator precedence conflict: {conflict}"));
        }

        table
    }

    fn set(&mut self, left: &str, right: &str, relation: Relation) {
        self.operators.insert(left.to_owned());
        self.operators.insert(right.to_owned());

        let row = self.relations.entry(left.to_owned()).or_default();
        match row.get(right) {
            None => {
                row.insert(right.to_owned(), relation);
            }
            Some(kept) if *kept == relation => {}
            Some(kept) => {
                let conflict = PrecedenceConflict {
                    left: left.to_owned(),
                    right: right.to_owned(),
                    kept: *kept,
                    rejected: relation,
                };
                if !self.conflicts.contains(&conflict) {
                    self.conflicts.push(conflict);
                }
            }
        }
    }

    /// Relation between `left` and `right`, [`Relation::Undefined`] if none
    /// was derived.
    pub fn relation(&self, left: &str, right: &str) -> Relation {
        self.relations
            .get(left)
            .and_then(|row| row.get(right))
            .copied()
            .unwrap_or_default()
    }

    /// The terminals of the grammar plus `$`.
    pub fn operators(&self) -> &BTreeSet<String> {
        &self.operators
    }

    pub fn conflicts(&self) -> &[PrecedenceConflict] {
        &self.conflicts
    }

    /// Whether the grammar is an operator grammar (no epsilon productions, no
    /// adjacent non-terminals) and the table has no conflicts.
    pub fn is_operator_precedence(&self) -> bool {
        self.operator_grammar && self.conflicts.is_empty()
    }
}

fn is_operator_grammar(grammar: &Grammar) -> bool {
    grammar.productions().iter().all(|production| {
        !production.is_empty()
            && !production
                .rhs()
                .windows(2)
                .any(|pair| grammar.is_non_terminal(&pair[0]) && grammar.is_non_terminal(&pair[1]))
    })
}

impl fmt::Display for OperatorPrecedenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.operators.iter().map(|o| o.len()).max().unwrap_or(1) + 1;

        let mut header = format!("{:width$}", "");
        for operator in &self.operators {
            header.push_str(&format!("{operator:width$}"));
        }
        writeln!(f, "{}", header.trim_end())?;

        for left in &self.operators {
            let mut row = format!("{left:width$}");
            for right in &self.operators {
                let relation = self.relation(left, right).to_string();
                row.push_str(&format!("{relation:width$}"));
            }
            writeln!(f, "{}", row.trim_end())?;
        }

        Ok(())
    }
}
