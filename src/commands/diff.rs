//! `diff` - show what apply would change

use anyhow::Result;
use converge::backend::http::HttpBackend;
use converge::reconciler;

use crate::Context;
use crate::cli::{DiffArgs, OutputFormat};
use crate::config::ModuleArgs;
use crate::ui;

pub fn run(ctx: &Context, args: DiffArgs) -> Result<()> {
    let module = ModuleArgs::load(&args.args_file)?;
    let request = module.request(true)?;
    let backend = HttpBackend::new(&module.connection)?;

    let plan = reconciler::plan(&backend, &request)?;
    let expected = plan.expected();

    if ctx.format == OutputFormat::Json {
        let patch = match &plan.decision {
            reconciler::Decision::Patch(patch) => serde_json::to_value(patch)?,
            _ => serde_json::Value::Null,
        };
        let record = serde_json::json!({
            "changed": plan.has_changes(),
            "action": plan.decision.action(),
            "patch": patch,
            "before": plan.live,
            "after": expected,
        });
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    ui::header(&format!("{} ({})", plan.target, plan.decision.action()));
    ui::display_document_diff(plan.live.as_ref(), expected.as_ref());
    if !plan.has_changes() {
        ui::dim("Nothing to do");
    }
    Ok(())
}
