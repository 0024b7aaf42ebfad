use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::User;

/// `/rest/api/3/issue/{key}/changelog` の1ページ分
#[derive(Debug, Clone, Deserialize)]
pub struct ChangelogPage {
    #[serde(rename = "startAt", default)]
    pub start_at: u32,
    #[serde(rename = "maxResults", default)]
    pub max_results: u32,
    #[serde(default)]
    pub total: Option<u32>,
    #[serde(rename = "isLast", default)]
    pub is_last: Option<bool>,
    #[serde(default)]
    pub values: Vec<History>,
}

/// 1回の更新操作（複数フィールドの変更をまとめたグループ）
#[derive(Debug, Clone, Deserialize)]
pub struct History {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryItem {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(rename = "fieldtype", default)]
    pub field_type: Option<String>,
    #[serde(rename = "fieldId", default)]
    pub field_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub from: Option<String>,
    #[serde(rename = "fromString", default, deserialize_with = "lenient_string")]
    pub from_string: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub to: Option<String>,
    #[serde(rename = "toString", default, deserialize_with = "lenient_string")]
    pub to_string: Option<String>,
}

/// 変更されたフィールドの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "jira-system")]
    JiraSystem,
    #[serde(rename = "custom")]
    Custom,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::JiraSystem => "jira-system",
            FieldType::Custom => "custom",
        }
    }
}

/// 1フィールド分の変更を平坦化したレコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// 変更グループのID（同じグループの項目で共有される）
    pub change_id: Option<String>,
    pub author: Option<String>,
    pub created: Option<String>,
    pub field_name: String,
    pub field_type: FieldType,
    pub from_value: Option<String>,
    pub to_value: Option<String>,
    pub from_string: Option<String>,
    pub to_string: Option<String>,
}

/// 文字列・数値・真偽値をすべて文字列として受け取る
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}
