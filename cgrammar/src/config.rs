/// What [`Grammar::remove_epsilon_productions`](crate::Grammar::remove_epsilon_productions)
/// does when the start symbol derives the empty string.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum EpsilonPolicy {
    /// Remove every epsilon production, including the start symbol's. The
    /// grammar then no longer accepts the empty input.
    #[default]
    RemoveAll,

    /// Re-add `start -> ε` if the start symbol was nullable.
    KeepStartEpsilon,
}

#[derive(Clone, Debug)]
pub struct GrammarOptions {
    /// Register undeclared right-hand side symbols as terminals when a rule
    /// is added. If `false` they are left undeclared and reported by
    /// validation.
    pub undeclared_as_terminal: bool,

    /// Cap on the outer iterations of left factoring.
    pub left_factor_max_iterations: usize,

    /// Cap on the rounds of rewrite rules applied while resolving LL(1)
    /// conflicts.
    pub max_resolution_rounds: usize,

    pub epsilon_policy: EpsilonPolicy,
}

impl Default for GrammarOptions {
    fn default() -> Self {
        Self {
            undeclared_as_terminal: true,
            left_factor_max_iterations: 10,
            max_resolution_rounds: 10,
            epsilon_policy: EpsilonPolicy::RemoveAll,
        }
    }
}
