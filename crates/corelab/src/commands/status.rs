use super::AppContext;
use colored::Colorize;
use corelab_pipeline::{KeySource, StageId};

pub async fn handle(ctx: &AppContext) -> anyhow::Result<bool> {
    ctx.print_header("保存済みの状態");
    println!(
        "  パラメータ: {}",
        ctx.settings.parameter_prefix.cyan()
    );
    println!();

    let entries = ctx.store.load_with_sources().await?;
    if entries.is_empty() {
        println!("{}", "保存された値はありません".dimmed());
        return Ok(true);
    }

    for stage in StageId::ALL {
        let produced: Vec<_> = entries
            .iter()
            .filter(|(key, _, _)| StageId::producer_of(key) == Some(stage))
            .collect();
        if produced.is_empty() {
            println!("{} {}", "○".dimmed(), stage.to_string().dimmed());
            continue;
        }
        println!("{} {}", "●".green(), stage.to_string().bold());
        for (key, value, source) in produced {
            println!("    {:<24} {} {}", key, value.cyan(), source_label(*source));
        }
    }

    let others: Vec<_> = entries
        .iter()
        .filter(|(key, _, _)| StageId::producer_of(key).is_none())
        .collect();
    if !others.is_empty() {
        println!("{} {}", "●".blue(), "その他".bold());
        for (key, value, source) in others {
            println!("    {:<24} {} {}", key, value.cyan(), source_label(*source));
        }
    }

    Ok(true)
}

fn source_label(source: KeySource) -> colored::ColoredString {
    format!("({})", source).dimmed()
}
