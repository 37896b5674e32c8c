mod commands;
mod ui;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{AppContext, GlobalOptions};
use corelab_pipeline::StageId;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "corelab")]
#[command(about = "AgentCore カスタマーサポート・ワークショップ環境を構築・削除する", long_about = None)]
struct Cli {
    /// 確認プロンプトを出さずに実行（失敗したステージで即中断）
    #[arg(long, global = true)]
    non_interactive: bool,

    /// AWS に接続せずインメモリのシミュレーターで実行
    #[arg(long, global = true)]
    simulate: bool,

    /// 設定ファイルのパス（省略時は corelab.toml を探索）
    #[arg(short, long, global = true, env = "CORELAB_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 全ステージを順番に実行
    Up {
        /// 完了後に作成したリソースを削除する
        #[arg(long)]
        cleanup: bool,
    },
    /// 1つのステージだけを実行
    Stage {
        /// ステージ名 (memory, identity, gateway, runtime, frontend)
        stage: StageId,
    },
    /// 作成したリソースをすべて削除
    Cleanup {
        /// 確認プロンプトをスキップ
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// 保存済みの識別子を表示
    Status,
    /// 前提条件（認証情報・aws CLI・コンテナツール）を確認
    Check,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr、RUST_LOG で詳細度を変更
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("corelab {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Ctrl-C: 保存済みの状態はそのままにして終了
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "✗ 中断しました".red().bold());
            std::process::exit(1);
        }
    });

    let options = GlobalOptions {
        non_interactive: cli.non_interactive,
        simulate: cli.simulate,
        config: cli.config,
    };
    let ctx = AppContext::build(&options).await?;

    let success = match cli.command {
        Commands::Up { cleanup } => commands::up::handle(&ctx, options.simulate, cleanup).await?,
        Commands::Stage { stage } => commands::stage::handle(&ctx, stage).await?,
        Commands::Cleanup { yes } => commands::cleanup::handle(&ctx, yes).await?,
        Commands::Status => commands::status::handle(&ctx).await?,
        Commands::Check => commands::check::handle(&ctx).await?,
        Commands::Version => true,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
