use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "tabrank",
    about = "Interactive table search with relevance-feedback reranking"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a JSONL table corpus into the store and the index
    Ingest(IngestArgs),
    /// One-shot search without the feedback loop
    Search(SearchArgs),
    /// Interactive search session with feedback and reranking
    Shell(ShellArgs),
    /// Show corpus statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Path to a JSONL file, one table record per line
    pub file: PathBuf,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "5")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Shell --

#[derive(Debug, Parser)]
pub struct ShellArgs {
    /// Initial number of results per query
    #[arg(short = 'n', long, default_value = "5")]
    pub count: usize,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "tabrank",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from(["tabrank", "search", "red chair"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "red chair");
                assert_eq!(args.count, 5);
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_shell_with_count() {
        let cli = Cli::parse_from(["tabrank", "shell", "-n", "12"]);
        match cli.command {
            Command::Shell(args) => assert_eq!(args.count, 12),
            _ => panic!("expected shell command"),
        }
    }
}
