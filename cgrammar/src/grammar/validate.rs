use super::Grammar;

/// A problem found by [`Grammar::validation_errors`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no start symbol")]
    MissingStartSymbol,

    #[error("start symbol {0} is not a non-terminal")]
    StartNotNonTerminal(String),

    #[error("undeclared symbol '{symbol}' in {production}")]
    UndeclaredSymbol { symbol: String, production: String },

    #[error("left-hand side {lhs} is not a non-terminal")]
    InvalidLhs { lhs: String },

    #[error("grammar has no productions")]
    NoProductions,

    #[error("grammar has no non-terminals")]
    NoNonTerminals,

    #[error("non-terminal {0} is unreachable from the start symbol")]
    Unreachable(String),

    #[error("non-terminal {0} derives no terminal string")]
    NonProductive(String),

    #[error("non-terminal {0} is left-recursive")]
    LeftRecursive(String),

    #[error("grammar is not LL(1)")]
    NotLl1,
}

impl ValidationError {
    /// Whether this breaks the grammar itself, as opposed to only ruling out
    /// a parsing strategy (left recursion, LL(1) conflicts) or being dead
    /// weight (unreachable non-terminals).
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            Self::Unreachable(_) | Self::LeftRecursive(_) | Self::NotLl1
        )
    }
}

impl Grammar {
    /// `true` if [`Self::validation_errors`] finds nothing.
    pub fn validate(&self) -> bool {
        let errors = self.validation_errors();
        for error in &errors {
            self.sink.error(&error.to_string());
        }
        errors.is_empty()
    }

    /// Collects every consistency and quality problem of the grammar.
    pub fn validation_errors(&self) -> Vec<ValidationError> {
        let mut errors = vec![];

        match &self.start {
            None => errors.push(ValidationError::MissingStartSymbol),
            Some(start) if !self.non_terminals.contains(start) => {
                errors.push(ValidationError::StartNotNonTerminal(start.clone()))
            }
            Some(_) => {}
        }

        for production in &self.productions {
            if !self.non_terminals.contains(production.lhs()) {
                errors.push(ValidationError::InvalidLhs {
                    lhs: production.lhs().to_owned(),
                });
            }
            for symbol in production.rhs() {
                if !self.is_declared(symbol) {
                    errors.push(ValidationError::UndeclaredSymbol {
                        symbol: symbol.clone(),
                        production: production.to_string(),
                    });
                }
            }
        }

        if self.productions.is_empty() {
            errors.push(ValidationError::NoProductions);
        }
        if self.non_terminals.is_empty() {
            errors.push(ValidationError::NoNonTerminals);
        }

        if self.start.is_some() {
            let reachable = self.reachable_symbols();
            errors.extend(
                self.non_terminals
                    .iter()
                    .filter(|nt| !reachable.contains(*nt))
                    .map(|nt| ValidationError::Unreachable(nt.clone())),
            );
        }

        let productive = self.productive_non_terminals();
        errors.extend(
            self.non_terminals
                .iter()
                .filter(|nt| !productive.contains(*nt))
                .map(|nt| ValidationError::NonProductive(nt.clone())),
        );

        errors.extend(
            self.left_recursive_non_terminals()
                .into_iter()
                .map(ValidationError::LeftRecursive),
        );

        if !self.productions.is_empty() && !self.is_ll1() {
            errors.push(ValidationError::NotLl1);
        }

        errors
    }
}
