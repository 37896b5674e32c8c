use super::AppContext;
use colored::Colorize;
use tokio::process::Command;

/// 前提条件チェックの1項目
pub struct CheckItem {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckItem {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// `program --version` の1行目（起動できなければ None）
async fn tool_version(program: &str) -> Option<String> {
    let output = Command::new(program).arg("--version").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}

/// 認証情報・aws CLI・コンテナツールを確認
pub async fn run_checks(ctx: &AppContext) -> Vec<CheckItem> {
    let mut items = Vec::new();

    items.push(match ctx.client.check_auth().await {
        Ok(status) if status.authenticated => CheckItem::pass(
            "認証情報",
            status.account_info.unwrap_or_default(),
        ),
        Ok(status) => CheckItem::fail("認証情報", status.error.unwrap_or_default()),
        Err(e) => CheckItem::fail("認証情報", e.to_string()),
    });

    // イメージの push（ECR ログイン）に aws CLI を使う
    items.push(match tool_version("aws").await {
        Some(version) => CheckItem::pass("aws CLI", version),
        None => CheckItem::fail("aws CLI", "aws が見つかりません: https://aws.amazon.com/cli/"),
    });

    let mut container_tool = None;
    for program in ["docker", "finch"] {
        if let Some(version) = tool_version(program).await {
            container_tool = Some(version);
            break;
        }
    }
    items.push(match container_tool {
        Some(version) => CheckItem::pass("コンテナツール", version),
        None => CheckItem::fail("コンテナツール", "docker / finch が見つかりません"),
    });

    items
}

pub fn print_checks(items: &[CheckItem]) {
    println!("{}", "前提条件チェック".bold());
    for item in items {
        let mark = if item.passed {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("  {} {:<16} {}", mark, item.name, item.detail.dimmed());
    }
    println!();
}

pub async fn handle(ctx: &AppContext) -> anyhow::Result<bool> {
    let items = run_checks(ctx).await;
    print_checks(&items);

    let passed = items.iter().all(|i| i.passed);
    if passed {
        println!("{}", "✓ すべての前提条件を満たしています".green().bold());
    } else {
        println!("{}", "✗ 満たしていない前提条件があります".red().bold());
    }
    Ok(passed)
}
