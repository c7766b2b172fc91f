use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubeconverge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge Kubernetes resources to a declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored summary for terminals
    Human,
    /// Module result record as JSON
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile one resource described by a module-args file
    Apply(ApplyArgs),

    /// Show what apply would change, without changing anything
    Diff(DiffArgs),

    /// List supported resource kinds and their parameters
    Kinds {
        /// Only show this kind
        kind: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Module-args file (JSON, or TOML by extension)
    pub args_file: PathBuf,

    /// Compute and report the result without mutating the cluster
    #[arg(long)]
    pub check: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Module-args file (JSON, or TOML by extension)
    pub args_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from(["kubeconverge", "-vv", "apply", "args.json", "--check", "--format", "json"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Apply(args) => {
                assert!(args.check);
                assert!(!args.yes);
                assert_eq!(args.args_file, PathBuf::from("args.json"));
            }
            _ => panic!("expected apply"),
        }
    }
}
