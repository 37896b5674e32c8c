pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{DEFAULT_REGION, PollSettings, ResourceNames, Settings};

use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// 環境変数の接頭辞 (CORELAB_POLL__MAX_ATTEMPTS など)
pub const ENV_PREFIX: &str = "CORELAB";

/// corelab のグローバル設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("corelab");

    Ok(config_dir)
}

/// 設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 CORELAB_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: corelab.toml, .corelab.toml
/// 3. ~/.config/corelab/corelab.toml (グローバル設定)
///
/// 設定ファイルは任意。見つからなければ None を返す。
pub fn find_settings_file() -> Result<Option<PathBuf>> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("CORELAB_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::SettingsFileNotFound(path));
    }

    // 2. カレントディレクトリで検索
    let current_dir = std::env::current_dir()?;
    for filename in ["corelab.toml", ".corelab.toml"] {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // 3. グローバル設定ファイル
    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("corelab.toml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// 設定を読み込む
///
/// 組み込みデフォルト → 設定ファイル → CORELAB_* 環境変数 の順に重ねる。
/// ネストしたキーは `__` で区切る (例: CORELAB_NAMES__GATEWAY)。
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let defaults = serde_json::to_string(&Settings::default())?;
    let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::SettingsFileNotFound(path.to_path_buf()));
        }
        tracing::debug!("Loading settings from {}", path.display());
        builder = builder.add_source(File::from(path));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

/// 設定ファイルを探索して読み込む
pub fn discover_settings() -> Result<Settings> {
    let path = find_settings_file()?;
    load_settings(path.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("corelab"));
    }

    #[test]
    #[serial]
    fn test_find_settings_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("corelab.toml"), "# test").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset("CORELAB_CONFIG_PATH", find_settings_file);
        assert!(result.unwrap().unwrap().ends_with("corelab.toml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_visible_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join(".corelab.toml"), "# hidden").unwrap();
        fs::write(temp_dir.path().join("corelab.toml"), "# visible").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();

        let result = temp_env::with_var_unset("CORELAB_CONFIG_PATH", find_settings_file).unwrap();

        // corelab.toml が優先される
        assert!(result.unwrap().ends_with("corelab.toml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_env_path_must_exist() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing.toml");

        temp_env::with_var("CORELAB_CONFIG_PATH", Some(&missing), || {
            match find_settings_file() {
                Err(ConfigError::SettingsFileNotFound(path)) => assert_eq!(path, missing),
                other => panic!("Expected SettingsFileNotFound, got {:?}", other),
            }
        });
    }

    #[test]
    #[serial]
    fn test_load_defaults_without_file() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.names.gateway, "customersupport-gw");
        assert_eq!(settings.poll.max_attempts, 30);
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("corelab.toml");
        fs::write(
            &path,
            r#"
region = "eu-central-1"
state_file = "state/lab.json"

[poll]
interval_secs = 2

[names]
gateway = "workshop-gw"
"#,
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.region.as_deref(), Some("eu-central-1"));
        assert_eq!(settings.poll.interval_secs, 2);
        // 指定していないキーはデフォルトのまま
        assert_eq!(settings.poll.max_attempts, 30);
        assert_eq!(settings.names.gateway, "workshop-gw");
        assert_eq!(settings.names.memory, "CustomerSupportMemory");
        assert_eq!(settings.state_file, PathBuf::from("state/lab.json"));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("corelab.toml");
        fs::write(&path, "[poll]\nmax_attempts = 12\n").unwrap();

        temp_env::with_vars(
            [
                ("CORELAB_POLL__MAX_ATTEMPTS", Some("3")),
                ("CORELAB_NAMES__RUNTIME", Some("agent_under_test")),
            ],
            || {
                let settings = load_settings(Some(&path)).unwrap();
                assert_eq!(settings.poll.max_attempts, 3);
                assert_eq!(settings.names.runtime, "agent_under_test");
            },
        );
    }

    #[test]
    #[serial]
    fn test_invalid_file_value_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("corelab.toml");
        fs::write(&path, "[poll]\nmax_attempts = 0\n").unwrap();

        assert!(matches!(
            load_settings(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }
}
