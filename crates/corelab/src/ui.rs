//! ターミナル表示（スピナー・確認プロンプト・レポート）

use colored::Colorize;
use corelab_pipeline::{
    CleanupLedger, ErrorRecord, PipelineObserver, Prompt, RunOutcome, RunReport, StageId,
    StageResult, SweepStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// ステージ実行中にスピナーを表示する
#[derive(Default)]
pub struct SpinnerObserver {
    current: Mutex<Option<ProgressBar>>,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn take(&self) -> Option<ProgressBar> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

impl PipelineObserver for SpinnerObserver {
    fn on_stage_start(&self, stage: StageId, description: &str, number: usize, total: usize) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(format!("[{}/{}] {} ({})", number, total, description, stage));
        pb.enable_steady_tick(Duration::from_millis(100));

        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(pb);
    }

    fn on_stage_result(&self, result: &StageResult) {
        if let Some(pb) = self.take() {
            pb.finish_and_clear();
        }
        print_stage_result(result);
    }
}

/// 標準入力で y/n を尋ねる
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&self, question: &str, default: bool) -> bool {
        let choices = if default { "[Y/n]" } else { "[y/N]" };
        print!("{} {}: ", question, choices);
        if std::io::stdout().flush().is_err() {
            return default;
        }

        let mut input = String::new();
        match std::io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => default,
            Ok(_) => match input.trim().to_ascii_lowercase().as_str() {
                "" => default,
                "y" | "yes" => true,
                _ => false,
            },
        }
    }
}

pub fn print_stage_result(result: &StageResult) {
    let elapsed = result.elapsed().num_milliseconds() as f64 / 1000.0;
    if result.succeeded {
        println!(
            "{} {} ({:.1}s)",
            "✓".green(),
            result.stage_id.to_string().bold(),
            elapsed
        );
        for (key, value) in &result.produced {
            println!("    {} = {}", key.dimmed(), value.cyan());
        }
    } else {
        println!(
            "{} {} ({:.1}s)",
            "✗".red(),
            result.stage_id.to_string().bold(),
            elapsed
        );
        if let Some(record) = &result.error {
            print_error_record(record);
        }
    }
    for warning in &result.warnings {
        println!("    {} {}", "⚠".yellow(), warning);
    }
}

pub fn print_error_record(record: &ErrorRecord) {
    println!("    {} [{}] {}", "原因:".yellow(), record.class, record.message);
    println!("    {} {}", "対処:".yellow(), record.hint);
}

pub fn print_report(report: &RunReport) {
    println!();
    println!("{}", "実行結果".bold());

    let succeeded: Vec<String> = report.succeeded().map(|r| r.stage_id.to_string()).collect();
    let failed: Vec<String> = report.failed().map(|r| r.stage_id.to_string()).collect();
    let skipped: Vec<String> = report.not_attempted.iter().map(|s| s.to_string()).collect();

    println!("  {} {}", "成功:".green(), list_or_dash(&succeeded));
    println!("  {} {}", "失敗:".red(), list_or_dash(&failed));
    println!("  {} {}", "未実行:".dimmed(), list_or_dash(&skipped));
    if report.warning_count() > 0 {
        println!("  {} {}", "警告:".yellow(), report.warning_count());
    }

    println!();
    match (report.outcome, report.success()) {
        (RunOutcome::Completed, true) => println!("{}", "✓ すべてのステージが完了しました".green().bold()),
        (RunOutcome::Completed, false) => {
            println!("{}", "⚠ 完了しましたが失敗したステージがあります".yellow().bold())
        }
        (RunOutcome::Aborted, _) => println!("{}", "✗ 中断しました".red().bold()),
    }
}

pub fn print_ledger(ledger: &CleanupLedger) {
    println!();
    println!("{}", "クリーンアップ結果".bold());
    for (category, outcomes) in ledger.entries() {
        println!("  {}", category.to_string().cyan());
        for outcome in outcomes {
            match &outcome.status {
                SweepStatus::Deleted => println!("    {} {}", "✓".green(), outcome.target),
                SweepStatus::Absent => {
                    println!("    {} {} {}", "-".dimmed(), outcome.target, "(存在しません)".dimmed())
                }
                SweepStatus::Failed(e) => {
                    println!("    {} {} {}", "✗".red(), outcome.target, e.red())
                }
            }
        }
    }

    println!();
    match ledger.partial_failure() {
        None => println!("{}", "✓ クリーンアップが完了しました".green().bold()),
        Some(record) => {
            println!("{}", "⚠ 一部のリソースを削除できませんでした".yellow().bold());
            print_error_record(&record);
        }
    }
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
