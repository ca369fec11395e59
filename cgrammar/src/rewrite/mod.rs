//! Pluggable grammar rewrites used to repair LL(1) conflicts.
//!
//! The engine itself knows nothing about specific grammars. Callers register
//! [`RewriteRule`]s on a [`Grammar`] and
//! [`Grammar::resolve_ll1_conflicts`] applies them round by round. Rules for
//! the C grammar live in [`c`].

pub mod c;

use crate::Grammar;

/// A grammar-specific repair.
pub trait RewriteRule: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Rewrites `grammar` in place. Returns whether anything changed.
    fn apply(&self, grammar: &mut Grammar) -> bool;
}

/// Non-terminals of `grammar` whose name contains `pattern`, in order of
/// their first production.
pub(crate) fn matching_non_terminals(grammar: &Grammar, pattern: &str) -> Vec<String> {
    grammar
        .lhs_order()
        .into_iter()
        .filter(|non_terminal| non_terminal.contains(pattern))
        .collect()
}
