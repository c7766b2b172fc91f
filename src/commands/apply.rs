//! `apply` - reconcile one resource

use anyhow::Result;
use colored::Colorize;
use converge::backend::http::HttpBackend;
use converge::reconciler::{self, Action, Outcome};

use crate::Context;
use crate::cli::{ApplyArgs, OutputFormat};
use crate::config::ModuleArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let module = ModuleArgs::load(&args.args_file)?;
    let request = module.request(args.check)?;
    let backend = HttpBackend::new(&module.connection)?;

    let plan = reconciler::plan(&backend, &request)?;
    let human = ctx.format == OutputFormat::Human;

    if human && !ctx.quiet {
        ui::display_plan(&plan);
    }

    let check_mode = request.check_mode;
    if human && plan.has_changes() && !check_mode && !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let outcome = reconciler::execute(&backend, plan, check_mode)?;

    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome.to_json())?),
        OutputFormat::Human => print_outcome(&outcome, check_mode),
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome, check_mode: bool) {
    println!();
    let name = outcome
        .resource
        .as_ref()
        .or(outcome.before.as_ref())
        .and_then(|doc| doc.name())
        .unwrap_or("resource")
        .to_string();

    match outcome.action {
        Action::NoChange => ui::success(&format!("{} is up to date", name)),
        action if check_mode => ui::info(&format!(
            "Check mode - {} would be {} (no changes made)",
            name, action
        )),
        action => ui::success(&format!("{} {}", name, action)),
    }

    if let Some(version) = outcome.resource.as_ref().and_then(|d| d.resource_version()) {
        ui::kv("resourceVersion", version);
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
