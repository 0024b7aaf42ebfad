use serde_json::{Map, Value};

use crate::adf;
use crate::config_store::CustomFieldConfig;
use crate::error::{Error, Result};
use crate::models::{IssueRecord, LinkDirection, LinkedIssue, SprintInfo, SprintState};

/// どのカスタムフィールドIDが採用されたか
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldResolution {
    pub epic_field: Option<String>,
    pub sprint_field: Option<String>,
    pub story_points_field: Option<String>,
}

/// 正規化の結果
#[derive(Debug, Clone)]
pub struct NormalizedIssue {
    /// changelogsは空のまま（後でアタッチされる）
    pub record: IssueRecord,
    pub resolution: FieldResolution,
}

/// 生の検索結果ペイロードを `IssueRecord` に変換する
///
/// フォールバックはIssueごとに評価し、どのIDが使われたかをインスタンス単位で
/// キャッシュしない。同じペイロードからは常に同じ結果になる。
#[derive(Debug, Clone, Default)]
pub struct FieldNormalizer {
    fields: CustomFieldConfig,
}

impl FieldNormalizer {
    pub fn new(fields: CustomFieldConfig) -> Self {
        Self { fields }
    }

    pub fn field_config(&self) -> &CustomFieldConfig {
        &self.fields
    }

    pub fn normalize(&self, raw: &Value) -> Result<NormalizedIssue> {
        let id = scalar_string(raw.get("id"))
            .ok_or_else(|| Error::MalformedPayload("issue payload has no id".to_string()))?;
        let key = scalar_string(raw.get("key"))
            .ok_or_else(|| Error::MalformedPayload(format!("issue {} has no key", id)))?;

        let empty = Map::new();
        let fields = raw
            .get("fields")
            .and_then(|f| f.as_object())
            .unwrap_or(&empty);

        let mut resolution = FieldResolution::default();

        let (epic_key, epic_name) = match self.resolve_epic(fields) {
            Some((field_id, epic_key, epic_name)) => {
                resolution.epic_field = Some(field_id);
                (epic_key, epic_name)
            }
            None => (None, None),
        };

        let sprint_info = match self.resolve_sprints(fields) {
            Some((field_id, sprints)) => {
                resolution.sprint_field = Some(field_id);
                sprints
            }
            None => Vec::new(),
        };

        let story_points = match self.resolve_story_points(fields) {
            Some((field_id, points)) => {
                resolution.story_points_field = Some(field_id);
                Some(points)
            }
            None => None,
        };

        let api_url = non_empty_str(raw.get("self"));
        let web_url = api_url.as_deref().and_then(|url| browse_url(url, &key));

        let project_key = nested_str(fields, "project", "key")
            .or_else(|| key.rsplit_once('-').map(|(project, _)| project.to_string()));

        let record = IssueRecord {
            summary: non_empty_str(fields.get("summary")).unwrap_or_default(),
            description: description_text(fields.get("description")),
            issue_type: nested_str(fields, "issuetype", "name"),
            status: nested_str(fields, "status", "name"),
            priority: nested_str(fields, "priority", "name"),
            assignee: user_label(fields.get("assignee")),
            reporter: user_label(fields.get("reporter")),
            created: non_empty_str(fields.get("created")),
            updated: non_empty_str(fields.get("updated")),
            resolved: non_empty_str(fields.get("resolutiondate")),
            project_key,
            labels: string_list(fields.get("labels")),
            components: name_list(fields.get("components")),
            fix_versions: name_list(fields.get("fixVersions")),
            story_points,
            parent_key: fields
                .get("parent")
                .and_then(|p| non_empty_str(p.get("key"))),
            epic_key,
            epic_name,
            linked_issues: linked_issues(fields.get("issuelinks")),
            sprint_info,
            changelogs: Vec::new(),
            api_url,
            web_url,
            raw_data: Some(raw.clone()),
            id,
            key,
        };

        Ok(NormalizedIssue { record, resolution })
    }

    /// エピック: 最初に値を持つフィールドを採用する
    fn resolve_epic(
        &self,
        fields: &Map<String, Value>,
    ) -> Option<(String, Option<String>, Option<String>)> {
        self.fields.epic_fields.iter().find_map(|field_id| {
            let (epic_key, epic_name) = match fields.get(field_id)? {
                Value::String(s) if !s.trim().is_empty() => (Some(s.trim().to_string()), None),
                Value::Object(obj) => {
                    let epic_key = non_empty_str(obj.get("key"));
                    let epic_name = non_empty_str(obj.get("name"))
                        .or_else(|| non_empty_str(obj.get("summary")))
                        .or_else(|| {
                            obj.get("fields")
                                .and_then(|f| non_empty_str(f.get("summary")))
                        });
                    if epic_key.is_none() && epic_name.is_none() {
                        return None;
                    }
                    (epic_key, epic_name)
                }
                _ => return None,
            };
            Some((field_id.clone(), epic_key, epic_name))
        })
    }

    /// スプリント: 最初に値を持つフィールドを採用し、解釈できない要素は読み飛ばす
    fn resolve_sprints(&self, fields: &Map<String, Value>) -> Option<(String, Vec<SprintInfo>)> {
        self.fields.sprint_fields.iter().find_map(|field_id| {
            let entries: Vec<&Value> = match fields.get(field_id)? {
                Value::Array(items) if !items.is_empty() => items.iter().collect(),
                Value::String(s) if s.trim().is_empty() => return None,
                value @ (Value::Object(_) | Value::String(_)) => vec![value],
                _ => return None,
            };

            let sprints = entries
                .into_iter()
                .filter_map(|entry| {
                    let sprint = parse_sprint(entry);
                    if sprint.is_none() {
                        tracing::warn!(field = %field_id, "Skipping unparseable sprint entry: {}", entry);
                    }
                    sprint
                })
                .collect();
            Some((field_id.clone(), sprints))
        })
    }

    /// ストーリーポイント: 最初に数値として解釈できる値を採用する
    fn resolve_story_points(&self, fields: &Map<String, Value>) -> Option<(String, f64)> {
        self.fields
            .story_point_fields
            .iter()
            .find_map(|field_id| {
                let points = match fields.get(field_id)? {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .filter(|p| p.is_finite())?;
                Some((field_id.clone(), points))
            })
    }
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn nested_str(fields: &Map<String, Value>, object: &str, key: &str) -> Option<String> {
    fields.get(object).and_then(|o| non_empty_str(o.get(key)))
}

fn user_label(value: Option<&Value>) -> Option<String> {
    let user = value?;
    non_empty_str(user.get("displayName")).or_else(|| non_empty_str(user.get("name")))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn name_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| non_empty_str(item.get("name")))
                .collect()
        })
        .unwrap_or_default()
}

fn description_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        doc @ (Value::Object(_) | Value::Array(_)) => {
            Some(adf::to_plain_text(doc)).filter(|text| !text.is_empty())
        }
        other => Some(other.to_string()),
    }
}

fn linked_issues(value: Option<&Value>) -> Vec<LinkedIssue> {
    let Some(links) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    links
        .iter()
        .filter_map(|link| {
            let (direction, other) = if let Some(issue) = link.get("inwardIssue") {
                (LinkDirection::Inward, issue)
            } else if let Some(issue) = link.get("outwardIssue") {
                (LinkDirection::Outward, issue)
            } else {
                return None;
            };

            Some(LinkedIssue {
                link_type: link
                    .get("type")
                    .and_then(|t| non_empty_str(t.get("name")))
                    .unwrap_or_default(),
                direction,
                issue_key: non_empty_str(other.get("key"))?,
                summary: other
                    .get("fields")
                    .and_then(|f| non_empty_str(f.get("summary"))),
            })
        })
        .collect()
}

/// `https://site/rest/api/3/issue/1` から `https://site/browse/KEY` を作る
fn browse_url(api_url: &str, key: &str) -> Option<String> {
    let (base, _) = api_url.split_once("/rest/api/")?;
    if base.is_empty() {
        return None;
    }
    Some(format!("{}/browse/{}", base, key))
}

fn parse_sprint(entry: &Value) -> Option<SprintInfo> {
    match entry {
        Value::Object(obj) => {
            let sprint = SprintInfo {
                id: obj.get("id").and_then(sprint_id),
                name: non_empty_str(obj.get("name")),
                state: obj
                    .get("state")
                    .and_then(|s| s.as_str())
                    .and_then(SprintState::parse),
                start_date: non_empty_str(obj.get("startDate")),
                end_date: non_empty_str(obj.get("endDate")),
                complete_date: non_empty_str(obj.get("completeDate")),
            };
            (sprint.id.is_some() || sprint.name.is_some()).then_some(sprint)
        }
        Value::String(s) => parse_sprint_descriptor(s),
        _ => None,
    }
}

fn sprint_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Server/Data Centerのスプリント文字列を解釈する
///
/// 形式: `com.atlassian.greenhopper.service.sprint.Sprint@1a2b[id=1,state=CLOSED,name=Sprint 1,...]`
/// 角括弧のない文字列は名前だけのスプリントとして扱う。
fn parse_sprint_descriptor(raw: &str) -> Option<SprintInfo> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let Some(open) = raw.find('[') else {
        if raw.contains(']') {
            return None;
        }
        return Some(SprintInfo {
            id: None,
            name: Some(raw.to_string()),
            state: None,
            start_date: None,
            end_date: None,
            complete_date: None,
        });
    };
    if !raw.ends_with(']') || open + 1 > raw.len() - 1 {
        return None;
    }

    // 名前にカンマが含まれることがあるため、`key=` で始まらない断片は直前の値に連結する
    let body = &raw[open + 1..raw.len() - 1];
    let mut pairs: Vec<(&str, String)> = Vec::new();
    for segment in body.split(',') {
        match segment.split_once('=') {
            Some((name, value))
                if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                pairs.push((name, value.to_string()));
            }
            _ => {
                let (_, value) = pairs.last_mut()?;
                value.push(',');
                value.push_str(segment);
            }
        }
    }

    let lookup = |name: &str| {
        pairs
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty() && *v != "<null>")
            .map(|v| v.to_string())
    };

    let sprint = SprintInfo {
        id: lookup("id").and_then(|v| v.parse().ok()),
        name: lookup("name"),
        state: lookup("state").as_deref().and_then(SprintState::parse),
        start_date: lookup("startDate"),
        end_date: lookup("endDate"),
        complete_date: lookup("completeDate"),
    };
    (sprint.id.is_some() || sprint.name.is_some()).then_some(sprint)
}
