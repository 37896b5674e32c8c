use super::AppContext;
use crate::ui;
use corelab_pipeline::StageId;

/// 1つのステージだけを実行（前のステージの出力は状態ファイルから読む）
pub async fn handle(ctx: &AppContext, stage: StageId) -> anyhow::Result<bool> {
    ctx.print_header(&format!("ステージ {} を実行します", stage));

    let report = ctx.orchestrator().run_only(stage).await;
    ui::print_report(&report);
    Ok(report.success())
}
