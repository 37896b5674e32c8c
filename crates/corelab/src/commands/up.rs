use super::{AppContext, check, cleanup};
use crate::ui;
use colored::Colorize;

pub async fn handle(ctx: &AppContext, simulate: bool, cleanup_after: bool) -> anyhow::Result<bool> {
    ctx.print_header("ワークショップ環境を構築します");

    // シミュレーション時は外部ツールを使わない
    if !simulate {
        let items = check::run_checks(ctx).await;
        if items.iter().any(|i| !i.passed) {
            check::print_checks(&items);
            if !ctx.confirm("前提条件を満たしていません。続行しますか?", false) {
                return Ok(false);
            }
        }
    }

    let report = ctx.orchestrator().run_all().await;
    ui::print_report(&report);
    let mut success = report.success();

    let sweep = if cleanup_after {
        true
    } else {
        ctx.interactive() && ctx.confirm("作成したリソースを削除しますか?", false)
    };
    if sweep {
        success &= cleanup::run_sweep(ctx).await;
    } else if report.success() {
        if let Some(url) = report.config.get(corelab_pipeline::keys::FRONTEND_URL) {
            println!();
            println!("フロントエンド: {}", url.cyan());
        }
        println!(
            "{}",
            "削除するには `corelab cleanup` を実行してください".dimmed()
        );
    }

    Ok(success)
}
