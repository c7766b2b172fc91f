mod cli;
mod commands;
mod config;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, OutputFormat};
use converge::FailureReport;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub format: OutputFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        format: cli.format,
    };

    match run(&ctx, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::failure(&failure_report(&err), ctx.format == OutputFormat::Json);
            ExitCode::FAILURE
        }
    }
}

fn run(ctx: &Context, command: Command) -> Result<()> {
    log::trace!("verbosity {}", ctx.verbose);
    match command {
        Command::Apply(args) => commands::apply::run(ctx, args),
        Command::Diff(args) => commands::diff::run(ctx, args),
        Command::Kinds { kind } => commands::kinds::run(ctx, kind.as_deref()),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "kubeconverge", &mut io::stdout());
            Ok(())
        }
    }
}

/// Reconciliation errors keep their taxonomy; anything else is reported
/// with its full context chain
fn failure_report(err: &anyhow::Error) -> FailureReport {
    match err.downcast_ref::<converge::Error>() {
        Some(converge_err) => FailureReport::from(converge_err),
        None => FailureReport {
            failed: true,
            msg: format!("{:#}", err),
            error: "Error".to_string(),
        },
    }
}
