//! `kinds` - list supported resource kinds

use anyhow::{Result, bail};
use colored::Colorize;
use converge::schema::{self, KindDescriptor};
use serde_json::{Value, json};

use crate::Context;
use crate::cli::OutputFormat;
use crate::ui;

pub fn run(ctx: &Context, kind: Option<&str>) -> Result<()> {
    let kinds: Vec<&KindDescriptor> = match kind {
        Some(name) => match schema::lookup(name) {
            Some(k) => vec![k],
            None => bail!("Unknown kind '{}'", name),
        },
        None => schema::BUILTIN_KINDS.to_vec(),
    };

    if ctx.format == OutputFormat::Json {
        let listing: Vec<Value> = kinds.iter().map(|k| describe(k)).collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for k in kinds {
        ui::header(k.kind);
        ui::kv("apiVersion", k.api_version);
        ui::kv("plural", k.plural);
        ui::kv("return key", k.return_key);
        println!();

        for field in k.all_fields() {
            let alias = field.alias.map(|a| format!(" ({})", a)).unwrap_or_default();
            let choices = if field.choices.is_empty() {
                String::new()
            } else {
                format!(" [{}]", field.choices.join("|"))
            };
            println!(
                "  {:<48} {:<12} {}{}",
                format!("{}{}", field.param, alias),
                field.ty.to_string().cyan(),
                field.path.dimmed(),
                choices.dimmed()
            );
        }
    }
    Ok(())
}

fn describe(kind: &KindDescriptor) -> Value {
    let fields: Vec<Value> = kind
        .all_fields()
        .map(|f| {
            json!({
                "param": f.param,
                "alias": f.alias,
                "path": f.path,
                "type": f.ty.to_string(),
                "choices": f.choices,
            })
        })
        .collect();

    json!({
        "kind": kind.kind,
        "api_version": kind.api_version,
        "plural": kind.plural,
        "namespaced": kind.namespaced,
        "return_key": kind.return_key,
        "fields": fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_lists_aliases() {
        let pvc = describe(&schema::PERSISTENT_VOLUME_CLAIM);
        assert_eq!(pvc["return_key"], "persistent_volume_claim");

        let fields = pvc["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["param"] == "spec_volume_name" && f["alias"] == "volume_name"));
        assert!(fields.iter().any(|f| f["param"] == "name"));
    }
}
