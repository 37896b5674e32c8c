use super::AppContext;
use crate::ui;
use colored::Colorize;

/// Sweeper を実行して結果を表示（失敗が無ければ true）
pub async fn run_sweep(ctx: &AppContext) -> bool {
    println!("{}", "🧹 リソースを削除しています...".blue());
    let ledger = ctx.sweeper().sweep().await;
    ui::print_ledger(&ledger);
    ledger.is_clean()
}

pub async fn handle(ctx: &AppContext, yes: bool) -> anyhow::Result<bool> {
    ctx.print_header("クリーンアップ");

    if !yes {
        if !ctx.interactive() {
            println!(
                "{}",
                "非対話モードで削除するには --yes を指定してください".yellow()
            );
            return Ok(false);
        }
        if !ctx.confirm("ワークショップのリソースをすべて削除しますか?", false) {
            println!("{}", "クリーンアップをキャンセルしました".yellow());
            return Ok(true);
        }
    }

    Ok(run_sweep(ctx).await)
}
