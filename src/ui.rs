use colored::{ColoredString, Colorize};
use converge::reconciler::{Action, Decision, Plan};
use converge::{FailureReport, PatchOp, ResourceDocument};
use similar::{ChangeTag, TextDiff};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Symbol for a reconciliation action
pub fn action_symbol(action: Action) -> ColoredString {
    match action {
        Action::Created => "+".green(),
        Action::Patched => "~".yellow(),
        Action::Deleted => "-".red(),
        Action::NoChange => "○".dimmed(),
    }
}

/// Symbol for a single field change
fn op_symbol(op: &PatchOp) -> ColoredString {
    match op {
        PatchOp::Set { .. } => "~".yellow(),
        PatchOp::MergeList { .. } => "+".green(),
        PatchOp::ReplaceList { .. } => "!".red(),
    }
}

/// Short one-line rendering of a JSON value
pub fn preview(value: &serde_json::Value, max_len: usize) -> String {
    let text = value.to_string();
    if text.chars().count() <= max_len {
        text
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

/// Display what a plan will do
pub fn display_plan(plan: &Plan<'_>) {
    let action = plan.decision.action();

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Reconcile Plan".bold()
    );
    println!("│");
    println!("│ {} {}", action_symbol(action), plan.target.to_string().bold());

    match &plan.decision {
        Decision::Create => println!("│   {}", "(not found) → create".dimmed()),
        Decision::Delete => println!("│   {}", "(will remove)".dimmed()),
        Decision::NoChange => println!("│   {}", "(up to date)".dimmed()),
        Decision::Patch(patch) => {
            for op in &patch.ops {
                let detail = match op {
                    PatchOp::Set { value, .. } => format!("= {}", preview(value, 48)),
                    PatchOp::MergeList { items, .. } => format!("merge {} item(s)", items.len()),
                    PatchOp::ReplaceList { items, .. } => {
                        format!("replace with {} item(s)", items.len())
                    }
                };
                println!(
                    "│   {} {:<40} {}",
                    op_symbol(op),
                    op.path().join("."),
                    detail.dimmed()
                );
            }
        }
    }

    println!("│");
    println!("└─────────────────────────────────────────────────────┘");
}

/// Pretty JSON of a document, empty when there is none
pub fn document_text(doc: Option<&ResourceDocument>) -> String {
    doc.and_then(|d| serde_json::to_string_pretty(d).ok())
        .map(|mut text| {
            text.push('\n');
            text
        })
        .unwrap_or_default()
}

/// Print a unified diff between two documents. Returns whether they differ.
pub fn display_document_diff(before: Option<&ResourceDocument>, after: Option<&ResourceDocument>) -> bool {
    let old = document_text(before);
    let new = document_text(after);
    let diff = TextDiff::from_lines(&old, &new);

    let mut has_changes = false;
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        has_changes = true;
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            match change.tag() {
                ChangeTag::Delete => print!("{}", format!("-{change}").red()),
                ChangeTag::Insert => print!("{}", format!("+{change}").green()),
                ChangeTag::Equal => print!(" {change}"),
            }
        }
    }

    if !has_changes {
        println!("  {}", "(no differences)".dimmed());
    }
    has_changes
}

/// Print a failure record
pub fn failure(report: &FailureReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(_) => error(&report.msg),
        }
    } else {
        error(&format!("{}: {}", report.error, report.msg));
    }
}
