use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// リージョン未指定時のフォールバック
pub const DEFAULT_REGION: &str = "us-east-1";

/// corelab 全体の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// AWS リージョン (未指定なら AWS_REGION / AWS_DEFAULT_REGION)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// リモートパラメータの名前空間
    pub parameter_prefix: String,

    /// ステージ間で共有する状態ファイル (work_dir からの相対パス)
    pub state_file: PathBuf,

    /// 成果物を生成する作業ディレクトリ
    pub work_dir: PathBuf,

    pub poll: PollSettings,

    pub names: ResourceNames,

    /// クリーンアップ対象のロググループ接頭辞
    pub log_group_prefixes: Vec<String>,

    /// クリーンアップ対象のローカルファイル・ディレクトリ
    pub local_artifacts: Vec<String>,

    /// ランタイムのコンテナイメージ (未指定ならレジストリから組み立てる)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_uri: Option<String>,

    /// ゲートウェイのツールを提供する Lambda
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda_arn: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: None,
            parameter_prefix: "/app/customersupport/agentcore".to_string(),
            state_file: PathBuf::from("lab_config.json"),
            work_dir: PathBuf::from("."),
            poll: PollSettings::default(),
            names: ResourceNames::default(),
            log_group_prefixes: vec![
                "/aws/bedrock/agentcore/runtime".to_string(),
                "/aws/bedrock/agentcore/gateway".to_string(),
                "/aws/lambda/customer-support".to_string(),
            ],
            local_artifacts: vec![
                "lab_config.json".to_string(),
                "runtime_agent".to_string(),
                "streamlit_app".to_string(),
                ".bedrock_agentcore.yaml".to_string(),
                "Dockerfile".to_string(),
            ],
            container_uri: None,
            lambda_arn: None,
        }
    }
}

impl Settings {
    /// 設定 → AWS_REGION → AWS_DEFAULT_REGION → us-east-1 の順で解決
    pub fn resolve_region(&self) -> String {
        self.region
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty()))
            .or_else(|| {
                std::env::var("AWS_DEFAULT_REGION")
                    .ok()
                    .filter(|r| !r.is_empty())
            })
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// 状態ファイルの実パス
    pub fn state_path(&self) -> PathBuf {
        self.work_dir.join(&self.state_file)
    }

    /// 作業ディレクトリ内の成果物パス
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    /// 読み込み後の整合性チェック
    pub fn validate(&self) -> Result<()> {
        if !self.parameter_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "parameter_prefix は '/' で始まる必要があります: {}",
                self.parameter_prefix
            )));
        }
        if self.poll.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "poll.max_attempts は 1 以上にしてください".to_string(),
            ));
        }
        if self.state_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("state_file が空です".to_string()));
        }
        Ok(())
    }
}

/// 準備完了待ちのポーリング設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            max_attempts: 30,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// 各リソースの規定名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceNames {
    pub memory: String,
    pub gateway: String,
    pub gateway_target: String,
    pub runtime: String,
    pub execution_role: String,
    pub gateway_role: String,
    pub identity_pool: String,
    pub pool_client: String,
    pub registry: String,
    pub secret: String,
}

impl Default for ResourceNames {
    fn default() -> Self {
        Self {
            memory: "CustomerSupportMemory".to_string(),
            gateway: "customersupport-gw".to_string(),
            gateway_target: "LambdaToolsTarget".to_string(),
            runtime: "customer_support_agent".to_string(),
            execution_role: "AgentCoreRuntimeExecutionRole".to_string(),
            gateway_role: "AgentCoreGatewayRole".to_string(),
            identity_pool: "CustomerSupportPool".to_string(),
            pool_client: "CustomerSupportClient".to_string(),
            registry: "customer-support-agent-runtime".to_string(),
            secret: "customer-support-secret".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.parameter_prefix, "/app/customersupport/agentcore");
        assert_eq!(settings.state_path(), PathBuf::from("./lab_config.json"));
        assert_eq!(settings.poll.interval(), Duration::from_secs(10));
        assert_eq!(settings.log_group_prefixes.len(), 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_relative_prefix() {
        let settings = Settings {
            parameter_prefix: "app/x".to_string(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    #[serial]
    fn test_region_precedence() {
        temp_env::with_vars(
            [
                ("AWS_REGION", Some("eu-west-1")),
                ("AWS_DEFAULT_REGION", Some("ap-northeast-1")),
            ],
            || {
                let mut settings = Settings::default();
                assert_eq!(settings.resolve_region(), "eu-west-1");

                settings.region = Some("us-west-2".to_string());
                assert_eq!(settings.resolve_region(), "us-west-2");
            },
        );

        temp_env::with_vars(
            [
                ("AWS_REGION", None::<&str>),
                ("AWS_DEFAULT_REGION", Some("ap-northeast-1")),
            ],
            || {
                assert_eq!(Settings::default().resolve_region(), "ap-northeast-1");
            },
        );

        temp_env::with_vars_unset(["AWS_REGION", "AWS_DEFAULT_REGION"], || {
            assert_eq!(Settings::default().resolve_region(), DEFAULT_REGION);
        });
    }
}
