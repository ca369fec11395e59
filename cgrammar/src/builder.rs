use std::sync::Arc;

use crate::{
    config::GrammarOptions,
    log::LogSink,
    rewrite::RewriteRule,
    symbol::{
        Associativity,
        Production,
    },
    Grammar,
};

/// Fluent construction of a [`Grammar`].
///
/// Every call forwards to the corresponding [`Grammar`] method.
///
/// ```
/// # use cgrammar::{GrammarBuilder, Associativity};
/// let grammar = GrammarBuilder::new()
///     .rule("E", ["E", "+", "T"])
///     .rule("E", ["T"])
///     .rule("T", ["id"])
///     .precedence("+", 1, Associativity::Left)
///     .start("E")
///     .build();
///
/// assert_eq!(grammar.rule_count(), 3);
/// assert!(grammar.has_left_recursion());
/// ```
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    grammar: Grammar,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the options. Call this first: symbols added before are
    /// already registered under the old options.
    pub fn options(mut self, options: GrammarOptions) -> Self {
        *self.grammar.options_mut() = options;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.grammar.set_sink(sink);
        self
    }

    pub fn terminal(mut self, name: impl Into<String>) -> Self {
        self.grammar.add_terminal(name);
        self
    }

    pub fn terminal_with_pattern(
        mut self,
        name: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        self.grammar.add_terminal_with_pattern(name, pattern);
        self
    }

    pub fn non_terminal(mut self, name: impl Into<String>) -> Self {
        self.grammar.add_non_terminal(name);
        self
    }

    pub fn rule<I>(mut self, lhs: impl Into<String>, rhs: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.grammar.add_rule(lhs, rhs);
        self
    }

    pub fn production(mut self, production: Production) -> Self {
        self.grammar.add_production(production);
        self
    }

    pub fn start(mut self, name: impl Into<String>) -> Self {
        self.grammar.set_start_symbol(name);
        self
    }

    pub fn precedence(
        mut self,
        symbol: impl Into<String>,
        level: i32,
        associativity: Associativity,
    ) -> Self {
        self.grammar.set_precedence(symbol, level, associativity);
        self
    }

    pub fn rewrite_rule(mut self, rule: Arc<dyn RewriteRule>) -> Self {
        self.grammar.register_rewrite_rule(rule);
        self
    }

    pub fn build(self) -> Grammar {
        self.grammar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        log::{
            Level,
            MemorySink,
        },
        rewrite::c::c_grammar_rules,
    };

    #[test]
    fn it_builds_grammars() {
        let grammar = GrammarBuilder::new()
            .terminal_with_pattern("id", "[a-z]+")
            .terminal("unused")
            .non_terminal("E'")
            .rule("E", ["T", "E'"])
            .rule("E'", ["+", "T", "E'"])
            .rule("E'", ["ε"])
            .production(Production::new("T", ["id"]).with_line(7))
            .start("E")
            .precedence("+", 1, Associativity::Left)
            .build();

        assert_eq!(grammar.start_symbol(), Some("E"));
        assert_eq!(grammar.rule_count(), 4);
        assert!(grammar.is_terminal("unused"));
        assert_eq!(grammar.terminal_pattern("id"), Some("[a-z]+"));
        assert_eq!(grammar.get_rule(3).unwrap().line(), Some(7));
        assert_eq!(grammar.precedence("+"), Some(1));
        assert!(grammar.is_ll1());
    }

    #[test]
    fn it_applies_options_and_sink() {
        let sink = MemorySink::new();
        let mut builder = GrammarBuilder::new()
            .options(GrammarOptions {
                undeclared_as_terminal: false,
                ..Default::default()
            })
            .sink(sink.clone());
        for rule in c_grammar_rules() {
            builder = builder.rewrite_rule(rule);
        }
        let grammar = builder.non_terminal("S").terminal("S").rule("S", ["x"]).build();

        assert!(!grammar.is_terminal("x"));
        assert_eq!(grammar.rewrite_rules().len(), 3);
        assert!(sink.contains(Level::Warning, "already a non-terminal"));
    }
}
