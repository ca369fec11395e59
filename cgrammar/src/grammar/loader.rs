//! Loading and saving the textual grammar format.
//!
//! ```text
//! # comments and blank lines are ignored
//! START: E
//! TERMINAL: id [a-zA-Z_][a-zA-Z0-9_]*
//! PRECEDENCE: '+' 1 left
//!
//! E  -> T E'
//! E' : '+' T E'
//!    | ε
//! T ::= id | '(' E ')'
//! ```
//!
//! Quoted tokens are terminals. Bare names are non-terminals if they appear
//! on some left-hand side or in a `START:` or `NONTERMINAL:` directive, and
//! terminals if declared by `TERMINAL:`. Remaining bare names are classified
//! by spelling: single non-alphabetic characters, names starting with a
//! lowercase letter and names containing operator punctuation are terminals,
//! everything else is a non-terminal.
//!
//! Malformed lines are skipped with a warning.

use std::{
    collections::BTreeSet,
    fs,
    path::Path,
};

use itertools::Itertools;
use nom::error::convert_error;

use super::{
    ast::{
        Alternative,
        Line,
        Token,
    },
    parser::{
        is_plain_name,
        parse_line_complete,
    },
    Grammar,
};
use crate::{
    symbol::{
        is_epsilon,
        Associativity,
        Production,
        SymbolKind,
        EPSILON,
    },
    Error,
};

impl Grammar {
    /// Replaces this grammar with the one described by `source`.
    ///
    /// Returns `false` and leaves the grammar untouched if `source` contains
    /// no production. The failure is logged. Options, sink and rewrite rules
    /// are kept.
    pub fn load_from_string(&mut self, source: &str) -> bool {
        match self.try_load_from_string(source) {
            Ok(()) => true,
            Err(e) => {
                self.sink.error(&format!("failed to load grammar: {e}"));
                false
            }
        }
    }

    pub fn try_load_from_string(&mut self, source: &str) -> Result<(), Error> {
        let _span = tracing::debug_span!("load grammar").entered();

        let lines = self.parse_lines(source);
        let loaded = self.lower(&lines)?;

        self.sink.info(&format!(
            "loaded grammar with {} productions, {} terminals and {} non-terminals",
            loaded.productions.len(),
            loaded.terminals.len(),
            loaded.non_terminals.len(),
        ));

        let revision = self.revision;
        *self = loaded;
        self.revision = revision;
        self.touch();

        Ok(())
    }

    /// Like [`Self::load_from_string`], reading the file at `path`.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> bool {
        match self.try_load_from_file(path) {
            Ok(()) => true,
            Err(e) => {
                self.sink.error(&format!("failed to load grammar: {e}"));
                false
            }
        }
    }

    pub fn try_load_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| {
            Error::Io {
                path: path.to_owned(),
                source,
            }
        })?;
        self.try_load_from_string(&source)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> bool {
        match self.try_save_to_file(path) {
            Ok(()) => true,
            Err(e) => {
                self.sink.error(&format!("failed to save grammar: {e}"));
                false
            }
        }
    }

    pub fn try_save_to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        fs::write(path, self.serialize()).map_err(|source| {
            Error::Io {
                path: path.to_owned(),
                source,
            }
        })
    }

    /// Renders the grammar in the textual format.
    ///
    /// Loading the output yields a grammar with the same start symbol,
    /// symbols, productions and precedence table. Terminals are always
    /// quoted.
    ///
    /// Two cases don't survive loading and are logged as warnings:
    ///
    ///  - Without a start symbol no `START:` line is written, so loading picks
    ///    the first non-terminal.
    ///  - Non-terminal names containing whitespace, `:`, `|` or `->` can't be
    ///    written bare and the lines mentioning them are skipped when loading.
    pub fn serialize(&self) -> String {
        let mut lines = vec![];

        match &self.start {
            Some(start) => lines.push(format!("START: {start}")),
            None => {
                self.sink.warning(
                    "serializing grammar without start symbol, loading it picks the first non-terminal",
                );
            }
        }

        for non_terminal in self.non_terminals.iter().filter(|nt| !is_plain_name(nt)) {
            self.sink.warning(&format!(
                "non-terminal '{non_terminal}' can't be written as a bare name and won't load back"
            ));
        }

        let used = self
            .productions
            .iter()
            .flat_map(|p| p.rhs().iter().map(String::as_str))
            .collect::<BTreeSet<_>>();
        for terminal in &self.terminals {
            match self.terminal_patterns.get(terminal) {
                Some(pattern) => {
                    lines.push(format!("TERMINAL: {} {pattern}", quote(terminal)))
                }
                None if !used.contains(terminal.as_str()) => {
                    lines.push(format!("TERMINAL: {}", quote(terminal)))
                }
                None => {}
            }
        }

        let with_productions = self
            .productions
            .iter()
            .map(Production::lhs)
            .collect::<BTreeSet<_>>();
        let without_productions = self
            .non_terminals
            .iter()
            .filter(|nt| !with_productions.contains(nt.as_str()))
            .collect::<Vec<_>>();
        if !without_productions.is_empty() {
            lines.push(format!(
                "NONTERMINAL: {}",
                without_productions.iter().join(" ")
            ));
        }

        for (symbol, level, associativity) in self.precedence_table() {
            let mut line = format!("PRECEDENCE: {} {level}", self.render_symbol(symbol));
            if let Some(associativity) = associativity {
                line.push_str(&format!(" {associativity}"));
            }
            lines.push(line);
        }

        for production in &self.productions {
            let rhs = if production.is_empty() {
                EPSILON.to_owned()
            }
            else {
                production
                    .rhs()
                    .iter()
                    .map(|symbol| self.render_symbol(symbol))
                    .join(" ")
            };

            let mut line = format!("{} -> {rhs}", production.lhs());

            let annotation = production
                .precedence()
                .map(|level| format!("prec: {level}"))
                .into_iter()
                .chain(
                    production
                        .associativity()
                        .map(|associativity| format!("assoc: {associativity}")),
                )
                .join(", ");
            if !annotation.is_empty() {
                line.push_str(&format!(" [{annotation}]"));
            }

            lines.push(line);
        }

        let mut output = lines.join("\n");
        output.push('\n');
        output
    }

    fn render_symbol(&self, symbol: &str) -> String {
        if self.non_terminals.contains(symbol) {
            symbol.to_owned()
        }
        else {
            quote(symbol)
        }
    }

    /// Parses every line, logging and dropping malformed ones.
    fn parse_lines<'source>(&self, source: &'source str) -> Vec<(usize, Line<'source>)> {
        let mut lines = vec![];

        for (index, text) in source.lines().enumerate() {
            let line_number = index + 1;
            match parse_line_complete(text) {
                Ok((_, Line::Noise)) => {}
                Ok((_, line)) => lines.push((line_number, line)),
                Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                    self.sink.warning(&format!(
                        "skipping malformed line {line_number}:\n{}",
                        convert_error(text, e)
                    ));
                }
                Err(nom::Err::Incomplete(_)) => {
                    self.sink
                        .warning(&format!("skipping incomplete line {line_number}"));
                }
            }
        }

        lines
    }

    /// Builds a grammar from parsed lines, with this grammar's options, sink
    /// and rewrite rules.
    fn lower(&self, lines: &[(usize, Line)]) -> Result<Grammar, Error> {
        let mut non_terminals = BTreeSet::new();
        let mut terminals = BTreeSet::new();
        for (_, line) in lines {
            match line {
                Line::Start(id) => {
                    non_terminals.insert(id.as_str());
                }
                Line::NonTerminals(ids) => non_terminals.extend(ids.iter().map(|id| id.as_str())),
                Line::Production { lhs, .. } => {
                    non_terminals.insert(lhs.as_str());
                }
                Line::Terminal {
                    name: Token::Bare(id),
                    ..
                } => {
                    terminals.insert(id.as_str());
                }
                _ => {}
            }
        }
        let classes = Classes {
            non_terminals,
            terminals,
        };

        let mut grammar = Grammar::with_options(self.options.clone()).with_sink(self.sink.clone());
        grammar.rewrite_rules = self.rewrite_rules.clone();

        let mut start = None;
        let mut first_non_terminal = None;
        let mut current_lhs = None;

        for (line_number, line) in lines {
            let line_number = *line_number;
            match line {
                Line::Noise => {}
                Line::Start(id) => start = Some(id.as_str()),
                Line::Terminal { name, pattern } => {
                    match pattern {
                        Some(pattern) => grammar.add_terminal_with_pattern(name.name(), *pattern),
                        None => grammar.add_terminal(name.name()),
                    };
                }
                Line::NonTerminals(ids) => {
                    for id in ids {
                        first_non_terminal.get_or_insert(id.as_str());
                        grammar.add_non_terminal(id.as_str());
                    }
                }
                Line::Precedence {
                    symbol,
                    level,
                    associativity,
                } => {
                    grammar.set_precedence(
                        symbol.name(),
                        *level,
                        associativity.unwrap_or(Associativity::None),
                    );
                }
                Line::Production { lhs, alternatives } => {
                    first_non_terminal.get_or_insert(lhs.as_str());
                    current_lhs = Some(lhs.as_str());
                    grammar.add_non_terminal(lhs.as_str());
                    add_alternatives(&mut grammar, &classes, lhs.as_str(), alternatives, line_number);
                }
                Line::Continuation(alternatives) => {
                    match current_lhs {
                        Some(lhs) => {
                            add_alternatives(&mut grammar, &classes, lhs, alternatives, line_number)
                        }
                        None => {
                            self.sink.warning(&format!(
                                "skipping alternatives on line {line_number}: no production to continue"
                            ));
                        }
                    }
                }
            }
        }

        if grammar.productions.is_empty() {
            return Err(Error::NoProductions);
        }

        if let Some(start) = start.or(first_non_terminal) {
            grammar.set_start_symbol(start);
        }

        Ok(grammar)
    }
}

/// Names whose kind is known from the whole file.
struct Classes<'a> {
    non_terminals: BTreeSet<&'a str>,
    terminals: BTreeSet<&'a str>,
}

impl<'a> Classes<'a> {
    fn classify(&self, token: &Token) -> SymbolKind {
        let name = match token {
            Token::Quoted(_) => return SymbolKind::Terminal,
            Token::Bare(id) => id.as_str(),
        };

        if is_epsilon(name) {
            SymbolKind::Epsilon
        }
        else if self.non_terminals.contains(name) {
            SymbolKind::NonTerminal
        }
        else if self.terminals.contains(name) {
            SymbolKind::Terminal
        }
        else {
            classify_by_spelling(name)
        }
    }
}

fn classify_by_spelling(name: &str) -> SymbolKind {
    let mut chars = name.chars();
    let Some(first) = chars.next()
    else {
        return SymbolKind::NonTerminal;
    };

    let single_non_alphabetic = chars.next().is_none() && !first.is_alphabetic();
    let operator_punctuation = name
        .chars()
        .any(|c| c.is_ascii_punctuation() && c != '_' && c != '\'');

    if single_non_alphabetic || first.is_lowercase() || operator_punctuation {
        SymbolKind::Terminal
    }
    else {
        SymbolKind::NonTerminal
    }
}

fn add_alternatives(
    grammar: &mut Grammar,
    classes: &Classes,
    lhs: &str,
    alternatives: &[Alternative],
    line_number: usize,
) {
    for alternative in alternatives {
        let mut rhs = vec![];
        for token in &alternative.symbols {
            match classes.classify(token) {
                SymbolKind::Epsilon => {}
                SymbolKind::Terminal => {
                    grammar.add_terminal(token.name());
                    rhs.push(token.name().to_owned());
                }
                SymbolKind::NonTerminal => {
                    grammar.add_non_terminal(token.name());
                    rhs.push(token.name().to_owned());
                }
            }
        }

        let mut production = Production::new(lhs, rhs).with_line(line_number);
        if let Some(level) = alternative.annotation.precedence {
            production = production.with_precedence(level);
        }
        if let Some(associativity) = alternative.annotation.associativity {
            production = production.with_associativity(associativity);
        }

        if !grammar.add_production(production) {
            tracing::debug!(line_number, "duplicate alternative");
        }
    }
}

fn quote(name: &str) -> String {
    format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;
    use crate::{
        log::{
            Level,
            MemorySink,
        },
        rewrite::c::c_grammar_rules,
    };

    const EXPRESSIONS: &str = r#"
# classic expression grammar
START: E
TERMINAL: id [a-zA-Z_][a-zA-Z0-9_]*
PRECEDENCE: '+' 1 left

E  -> T E'
E' : '+' T E'
   | ε
T ::= id | '(' E ')'
"#;

    fn load(source: &str) -> Grammar {
        let mut grammar = Grammar::new();
        assert!(grammar.load_from_string(source));
        grammar
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn it_loads_grammars() {
        let grammar = load(EXPRESSIONS);

        assert_eq!(grammar.start_symbol(), Some("E"));
        assert_eq!(grammar.non_terminals(), &names(&["E", "E'", "T"]));
        assert_eq!(grammar.terminals(), &names(&["+", "(", ")", "id"]));
        assert_eq!(grammar.rule_count(), 5);
        assert!(grammar.has_rule("E'", ["ε"]));
        assert_eq!(grammar.terminal_pattern("id"), Some("[a-zA-Z_][a-zA-Z0-9_]*"));
        assert_eq!(grammar.precedence("+"), Some(1));
        assert_eq!(grammar.associativity("+"), Some(Associativity::Left));
        assert!(grammar.is_ll1());
    }

    #[test]
    fn it_records_line_numbers() {
        let grammar = load(EXPRESSIONS);
        let lines = grammar
            .productions()
            .iter()
            .map(|p| p.line())
            .collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![Some(7), Some(8), Some(9), Some(10), Some(10)]
        );
    }

    #[test]
    fn it_classifies_bare_names() {
        let grammar = load("S : expr SEMI | Foo + a.b | _x\nFoo -> z\n");

        assert!(grammar.is_terminal("expr"));
        assert!(grammar.is_non_terminal("SEMI"));
        assert!(grammar.is_non_terminal("Foo"));
        assert!(grammar.is_terminal("+"));
        assert!(grammar.is_terminal("a.b"));
        assert!(grammar.is_non_terminal("_x"));
        assert!(grammar.is_terminal("z"));
    }

    #[test]
    fn it_prefers_declarations_over_spelling() {
        let grammar = load(
            "NONTERMINAL: decl\nTERMINAL: IDENT\nprogram : decl IDENT\ndecl -> 'int'\n",
        );

        assert!(grammar.is_non_terminal("program"));
        assert!(grammar.is_non_terminal("decl"));
        assert!(grammar.is_terminal("IDENT"));
        assert!(grammar.is_terminal("int"));
        assert_eq!(grammar.start_symbol(), Some("decl"));
    }

    #[test]
    fn it_loads_annotations() {
        let grammar = load("E -> E '*' E [prec: 2, assoc: left] | id\n");
        let production = grammar.get_rule(0).unwrap();
        assert_eq!(production.precedence(), Some(2));
        assert_eq!(production.associativity(), Some(Associativity::Left));
        assert_eq!(grammar.get_rule(1).unwrap().precedence(), None);
    }

    #[test]
    fn it_skips_malformed_lines() {
        let sink = MemorySink::new();
        let mut grammar = Grammar::new().with_sink(sink.clone());

        assert!(grammar.load_from_string("S -> a\nthis is not a production\n| b\n;\n"));
        assert_eq!(grammar.rule_count(), 2);
        assert!(grammar.has_rule("S", ["b"]));
        assert!(sink.contains(Level::Warning, "malformed line 2"));
    }

    #[test]
    fn it_warns_about_dangling_continuations() {
        let sink = MemorySink::new();
        let mut grammar = Grammar::new().with_sink(sink.clone());

        assert!(grammar.load_from_string("| a b\nS -> c\n"));
        assert_eq!(grammar.rule_count(), 1);
        assert!(sink.contains(Level::Warning, "no production to continue"));
    }

    #[test]
    fn it_keeps_state_when_nothing_loads() {
        let sink = MemorySink::new();
        let mut grammar = load(EXPRESSIONS).with_sink(sink.clone());

        assert!(!grammar.load_from_string("# nothing here\n\nSTART: S\n"));
        assert_eq!(grammar.rule_count(), 5);
        assert_eq!(grammar.start_symbol(), Some("E"));
        assert!(sink.contains(Level::Error, "no productions"));

        assert!(matches!(
            grammar.try_load_from_string(""),
            Err(Error::NoProductions)
        ));
    }

    #[test]
    fn it_replaces_previous_state() {
        let mut grammar = load(EXPRESSIONS);
        let revision = grammar.revision();
        grammar.register_rewrite_rule(Arc::new(NoopRule));

        assert!(grammar.load_from_string("S -> a S b | ε\n"));
        assert_eq!(grammar.start_symbol(), Some("S"));
        assert_eq!(grammar.rule_count(), 2);
        assert!(!grammar.is_non_terminal("E"));
        assert_eq!(grammar.precedence("+"), None);
        assert!(grammar.revision() > revision);
        assert_eq!(grammar.rewrite_rules().len(), 1);
    }

    struct NoopRule;

    impl crate::rewrite::RewriteRule for NoopRule {
        fn name(&self) -> &str {
            "noop"
        }

        fn apply(&self, _grammar: &mut Grammar) -> bool {
            false
        }
    }

    #[test]
    fn it_round_trips() {
        let mut original = load(EXPRESSIONS);
        original.add_terminal("unused");
        original.add_non_terminal("Empty");
        original.add_rule("T", ["it's", "\\"]);

        let source = original.serialize();
        let reloaded = load(&source);

        assert_eq!(reloaded.start_symbol(), original.start_symbol());
        assert_eq!(reloaded.rule_count(), original.rule_count());
        assert_eq!(reloaded.terminals(), original.terminals());
        assert_eq!(reloaded.non_terminals(), original.non_terminals());
        assert_eq!(reloaded.productions(), original.productions());
        assert_eq!(reloaded.terminal_pattern("id"), original.terminal_pattern("id"));
        assert_eq!(reloaded.associativity("+"), Some(Associativity::Left));
    }

    #[test]
    fn it_round_trips_names_with_hyphens() {
        let mut original = Grammar::new();
        original.add_rule("expr-list", ["a"]);
        original.add_rule("expr-list", ["a", ",", "expr-list"]);
        original.add_rule("S", ["expr-list"]);
        original.add_non_terminal("type-name");
        original.set_start_symbol("S");

        let reloaded = load(&original.serialize());

        assert_eq!(reloaded.rule_count(), 3);
        assert_eq!(reloaded.non_terminals(), original.non_terminals());
        assert_eq!(reloaded.terminals(), original.terminals());
        assert_eq!(reloaded.productions(), original.productions());
        assert!(reloaded.is_non_terminal("expr-list"));
    }

    #[test]
    fn it_warns_about_lossy_serialization() {
        let sink = MemorySink::new();
        let mut grammar = Grammar::new().with_sink(sink.clone());
        grammar.add_rule("E", ["id"]);
        grammar.add_rule("my list", ["E"]);

        let source = grammar.serialize();
        assert!(!source.contains("START:"));
        assert!(sink.contains(Level::Warning, "without start symbol"));
        assert!(sink.contains(Level::Warning, "'my list' can't be written as a bare name"));
        assert!(!sink.contains(Level::Warning, "'E' can't"));

        let reloaded = load(&source);
        assert_eq!(reloaded.start_symbol(), Some("E"));
    }

    #[test]
    fn it_serializes_canonically() {
        let grammar = load("E -> E '+' T [prec: 1] | T\nT -> id\n");
        assert_eq!(
            grammar.serialize(),
            "START: E\nE -> E '+' T [prec: 1]\nE -> T\nT -> 'id'\n"
        );
    }

    #[test]
    fn it_round_trips_transformed_grammars() {
        let mut grammar = load("E -> E '+' T | T\nT -> id\n");
        grammar.eliminate_left_recursion();

        let reloaded = load(&grammar.serialize());
        assert_eq!(reloaded.productions(), grammar.productions());
        assert!(reloaded.is_ll1());
    }

    #[test]
    fn it_saves_and_loads_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("expressions.grammar");

        let mut grammar = load(EXPRESSIONS);
        grammar.set_sink(MemorySink::new());
        assert!(grammar.save_to_file(&path));

        let mut loaded = Grammar::new();
        assert!(loaded.load_from_file(&path));
        assert_eq!(loaded.productions(), grammar.productions());
        assert_eq!(loaded.start_symbol(), Some("E"));
    }

    #[test]
    fn it_fails_for_missing_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.grammar");

        let sink = MemorySink::new();
        let mut grammar = Grammar::new().with_sink(sink.clone());
        assert!(!grammar.load_from_file(&path));
        assert!(sink.contains(Level::Error, "failed to load grammar"));
        assert!(matches!(
            grammar.try_load_from_file(&path),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn it_loads_with_c_grammar_rules_registered() {
        let mut grammar = Grammar::new();
        for rule in c_grammar_rules() {
            grammar.register_rewrite_rule(rule);
        }
        assert!(grammar.load_from_string(EXPRESSIONS));
        assert_eq!(grammar.rewrite_rules().len(), 3);
    }
}
