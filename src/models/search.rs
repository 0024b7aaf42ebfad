use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一括検索リクエストのパラメータ
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchParams {
    #[serde(rename = "startAt")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<u32>,

    #[serde(rename = "maxResults")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

/// 一括検索の1ページ分
///
/// Issueはフィールド構成がインスタンスごとに異なるため、生のJSONのまま保持する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "startAt", default)]
    pub start_at: u32,

    #[serde(rename = "maxResults", default)]
    pub max_results: u32,

    #[serde(default)]
    pub total: Option<u32>,

    #[serde(rename = "isLast", default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_last: Option<bool>,

    #[serde(default)]
    pub issues: Vec<Value>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_at(mut self, start_at: u32) -> Self {
        self.start_at = Some(start_at);
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

impl SearchResult {
    /// 上流がこれ以上のページはないと示しているか
    pub fn reports_last_page(&self) -> bool {
        if self.is_last == Some(true) {
            return true;
        }
        match self.total {
            Some(total) => self.start_at as u64 + self.issues.len() as u64 >= total as u64,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_params_serialization() {
        let params = SearchParams::new().start_at(10).max_results(25);

        let json = serde_json::to_value(&params).unwrap();

        assert_eq!(json["startAt"], 10);
        assert_eq!(json["maxResults"], 25);
        assert_eq!(json.as_object().unwrap().len(), 2);

        // None values should be omitted
        let json = serde_json::to_value(SearchParams::new()).unwrap();
        assert!(json.get("startAt").is_none());
    }

    #[test]
    fn test_search_result_reports_last_page() {
        let page: SearchResult = serde_json::from_value(json!({
            "startAt": 50,
            "maxResults": 50,
            "total": 60,
            "issues": [{ "id": "1", "key": "TEST-1" }]
        }))
        .unwrap();
        assert!(!page.reports_last_page());

        let page: SearchResult = serde_json::from_value(json!({
            "startAt": 50,
            "maxResults": 50,
            "total": 51,
            "issues": [{ "id": "1", "key": "TEST-1" }]
        }))
        .unwrap();
        assert!(page.reports_last_page());

        let page: SearchResult = serde_json::from_value(json!({
            "issues": [],
            "isLast": true
        }))
        .unwrap();
        assert!(page.reports_last_page());
    }
}
