use std::{
    collections::BTreeSet,
    path::{
        Path,
        PathBuf,
    },
};

use cgrammar::{
    rewrite::c::c_grammar_rules,
    Grammar,
    OperatorPrecedenceTable,
};
use color_eyre::eyre::{
    bail,
    Error,
};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Args {
    /// Directory that relative grammar paths are resolved against.
    #[structopt(long, env = "CGRAMMAR_GRAMMAR_DIR")]
    grammar_dir: Option<PathBuf>,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Prints statistics, FIRST/FOLLOW sets and LL(1) diagnostics.
    Analyze {
        grammar: PathBuf,

        #[structopt(long)]
        start: Option<String>,
    },
    /// Prints validation errors. Fails if the grammar is invalid.
    Validate {
        grammar: PathBuf,

        #[structopt(long)]
        start: Option<String>,
    },
    /// Applies transformation passes and writes the resulting grammar.
    Transform {
        grammar: PathBuf,

        #[structopt(long)]
        start: Option<String>,

        #[structopt(long)]
        left_recursion: bool,

        #[structopt(long)]
        left_factor: bool,

        #[structopt(long)]
        epsilon: bool,

        #[structopt(long)]
        useless: bool,

        /// Resolve LL(1) conflicts with the rewrite rules for C grammars.
        #[structopt(long)]
        resolve_c: bool,

        #[structopt(short, long)]
        output: Option<PathBuf>,
    },
    /// Prints the operator precedence matrix.
    Precedence {
        grammar: PathBuf,

        #[structopt(long)]
        start: Option<String>,
    },
}

impl Args {
    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.grammar_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_owned(),
        }
    }

    fn load(&self, path: &Path, start: Option<&str>) -> Result<Grammar, Error> {
        let path = self.resolve(path);
        tracing::debug!(path = %path.display(), "loading grammar");

        let mut grammar = Grammar::new();
        grammar.try_load_from_file(&path)?;
        if let Some(start) = start {
            grammar.set_start_symbol(start);
        }
        Ok(grammar)
    }

    pub fn run(self) -> Result<(), Error> {
        match &self.command {
            Command::Analyze { grammar, start } => {
                let grammar = self.load(grammar, start.as_deref())?;

                println!("{}", grammar.statistics());
                println!();

                let first_sets = grammar.first_sets();
                let follow_sets = grammar.follow_sets();
                println!("FIRST / FOLLOW:");
                for non_terminal in grammar.non_terminals() {
                    println!(
                        "  {non_terminal}: FIRST = {}, FOLLOW = {}",
                        format_set(first_sets.get(non_terminal)),
                        format_set(follow_sets.get(non_terminal)),
                    );
                }
                println!();

                let conflicts = grammar.ll1_conflicts();
                if conflicts.is_empty() {
                    println!("grammar is LL(1)");
                }
                else {
                    println!("LL(1) conflicts:");
                    for conflict in &conflicts {
                        println!("  {conflict}");
                    }
                }
                println!("LR(1) (heuristic): {}", grammar.is_lr1());

                let findings = grammar.ambiguity_report();
                if !findings.is_empty() {
                    println!("possible ambiguities:");
                    for finding in &findings {
                        println!("  {finding}");
                    }
                }
            }
            Command::Validate { grammar, start } => {
                let grammar = self.load(grammar, start.as_deref())?;

                let errors = grammar.validation_errors();
                if errors.is_empty() {
                    println!("grammar is valid");
                }
                else {
                    for error in &errors {
                        println!("{error}");
                    }
                    bail!("grammar is invalid ({} errors)", errors.len());
                }
            }
            Command::Transform {
                grammar,
                start,
                left_recursion,
                left_factor,
                epsilon,
                useless,
                resolve_c,
                output,
            } => {
                let mut grammar = self.load(grammar, start.as_deref())?;

                if *left_recursion {
                    grammar.eliminate_left_recursion();
                }
                if *left_factor {
                    grammar.left_factor();
                }
                if *epsilon {
                    grammar.remove_epsilon_productions();
                }
                if *useless {
                    grammar.remove_useless_symbols();
                }
                if *resolve_c {
                    for rule in c_grammar_rules() {
                        grammar.register_rewrite_rule(rule);
                    }
                    grammar.resolve_ll1_conflicts();
                }

                match output {
                    Some(output) => grammar.try_save_to_file(output)?,
                    None => print!("{}", grammar.serialize()),
                }
            }
            Command::Precedence { grammar, start } => {
                let grammar = self.load(grammar, start.as_deref())?;

                let table = OperatorPrecedenceTable::build(&grammar);
                print!("{table}");

                if !table.conflicts().is_empty() {
                    println!();
                    println!("conflicts:");
                    for conflict in table.conflicts() {
                        println!("  {conflict}");
                    }
                }
                println!(
                    "operator precedence grammar: {}",
                    table.is_operator_precedence()
                );
            }
        }

        Ok(())
    }
}

fn format_set(set: Option<&BTreeSet<String>>) -> String {
    let items = set
        .map(|set| set.iter().map(String::as_str).collect::<Vec<_>>())
        .unwrap_or_default();
    format!("{{{}}}", items.join(", "))
}

fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let args = Args::from_args();
    args.run()?;

    Ok(())
}
