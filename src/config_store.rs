use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::Error;

/// カスタムフィールドIDの優先順位リスト
///
/// インスタンスごとにIDが異なるため、先頭から順に試して最初に値を持つものを採用する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldConfig {
    /// エピックリンクの候補
    #[serde(default = "default_epic_fields")]
    pub epic_fields: Vec<String>,
    /// スプリントの候補
    #[serde(default = "default_sprint_fields")]
    pub sprint_fields: Vec<String>,
    /// ストーリーポイントの候補
    #[serde(default = "default_story_point_fields")]
    pub story_point_fields: Vec<String>,
}

fn default_epic_fields() -> Vec<String> {
    ["customfield_10014", "customfield_10008", "customfield_10002"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sprint_fields() -> Vec<String> {
    ["customfield_10020", "customfield_10010", "customfield_10004"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_story_point_fields() -> Vec<String> {
    vec!["customfield_10026".to_string()]
}

impl CustomFieldConfig {
    pub fn new() -> Self {
        Self {
            epic_fields: default_epic_fields(),
            sprint_fields: default_sprint_fields(),
            story_point_fields: default_story_point_fields(),
        }
    }

    pub fn epic_fields(mut self, fields: Vec<String>) -> Self {
        self.epic_fields = fields;
        self
    }

    pub fn sprint_fields(mut self, fields: Vec<String>) -> Self {
        self.sprint_fields = fields;
        self
    }

    pub fn story_point_fields(mut self, fields: Vec<String>) -> Self {
        self.story_point_fields = fields;
        self
    }
}

impl Default for CustomFieldConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// JSONファイルに保存するカスタムフィールド設定ストア
pub struct FieldConfigStore {
    /// 設定ファイルのパス
    path: PathBuf,
}

impl FieldConfigStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// デフォルトの設定ディレクトリ（`<config_dir>/jira-extract/fields.json`）
    pub fn default_location() -> Result<Self, Error> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::ConfigurationMissing("設定ディレクトリが見つかりません".to_string()))?
            .join("jira-extract");

        Ok(Self::new(config_dir.join("fields.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 設定を読み込む。ファイルがなければデフォルト値を返す
    pub async fn load(&self) -> Result<CustomFieldConfig, Error> {
        if !self.path.exists() {
            return Ok(CustomFieldConfig::default());
        }

        let mut file = fs::File::open(&self.path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        if contents.trim().is_empty() {
            return Ok(CustomFieldConfig::default());
        }

        serde_json::from_str(&contents).map_err(|e| {
            Error::InvalidConfiguration(format!(
                "{}: JSON deserialization failed: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// 明示的に指定された設定を読み込む。ファイルがなければエラーにする
    pub async fn load_required(&self) -> Result<CustomFieldConfig, Error> {
        if !self.path.exists() {
            return Err(Error::ConfigurationMissing(format!(
                "Field config not found: {}",
                self.path.display()
            )));
        }
        self.load().await
    }

    /// 設定を保存する
    pub async fn save(&self, config: &CustomFieldConfig) -> Result<(), Error> {
        // 親ディレクトリを作成
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json_data = serde_json::to_string_pretty(config)?;

        let mut file = fs::File::create(&self.path).await?;
        file.write_all(json_data.as_bytes()).await?;
        file.sync_all().await?;

        Ok(())
    }
}
