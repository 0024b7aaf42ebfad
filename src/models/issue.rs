use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ChangeEntry;

/// 抽出結果の正規化済みIssueレコード
///
/// フィールドの並びがそのままJSON出力のキー順になる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub id: String,
    pub key: String,
    pub summary: String,
    /// リッチテキストから変換したプレーンテキスト
    pub description: Option<String>,
    pub issue_type: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub resolved: Option<String>,
    pub project_key: Option<String>,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub fix_versions: Vec<String>,
    pub story_points: Option<f64>,
    pub parent_key: Option<String>,
    pub epic_key: Option<String>,
    pub epic_name: Option<String>,
    pub linked_issues: Vec<LinkedIssue>,
    pub sprint_info: Vec<SprintInfo>,
    /// 上流が返した時系列順のまま保持する
    pub changelogs: Vec<ChangeEntry>,
    pub api_url: Option<String>,
    pub web_url: Option<String>,
    /// 取得したままのペイロード（リレーショナル出力でのみ保存）
    #[serde(skip)]
    pub raw_data: Option<Value>,
}

/// Issueリンクの向き
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Inward,
    Outward,
}

impl LinkDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkDirection::Inward => "inward",
            LinkDirection::Outward => "outward",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedIssue {
    /// リンク種別の表示名（例: "Blocks"）
    #[serde(rename = "type")]
    pub link_type: String,
    pub direction: LinkDirection,
    pub issue_key: String,
    pub summary: Option<String>,
}

/// スプリントの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintState {
    Future,
    Active,
    Closed,
}

impl SprintState {
    /// 大文字小文字を区別せずに解釈する。未知の値は `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "future" => Some(SprintState::Future),
            "active" => Some(SprintState::Active),
            "closed" => Some(SprintState::Closed),
            _ => None,
        }
    }
}

/// Issueが所属したスプリントのスナップショット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SprintInfo {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub state: Option<SprintState>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub complete_date: Option<String>,
}
