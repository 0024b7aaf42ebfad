use serde_json::Value;

use crate::error::Result;
use crate::{JiraClient, SearchParams, SearchResult};

const SEARCH_ENDPOINT: &str = "/rest/api/3/search";

/// JQL一括検索のページ送り
///
/// 各ページは直前のオフセットに依存するため逐次に取得する。
/// 重複除去は行わない（上流のページングが一貫していることを前提とする）。
#[derive(Debug, Clone)]
pub struct SearchPaginator {
    page_size: u32,
    max_results: Option<usize>,
}

impl SearchPaginator {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            max_results: None,
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 取得件数の上限（`None` は無制限）
    pub fn max_results(mut self, max_results: Option<usize>) -> Self {
        self.max_results = max_results;
        self
    }

    /// 1ページ分の要求件数
    fn request_size(&self, fetched: usize) -> u32 {
        match self.max_results {
            Some(max) => (self.page_size as usize).min(max.saturating_sub(fetched)) as u32,
            None => self.page_size,
        }
    }

    /// 全ページを取得して、上流の順序どおりに生のIssueを返す
    ///
    /// 途中のページ取得に失敗した場合は部分的な結果を返さずエラーにする。
    pub async fn search_all(&self, client: &JiraClient, jql: &str) -> Result<Vec<Value>> {
        let mut issues: Vec<Value> = Vec::new();
        let mut start_at = 0u32;

        loop {
            let batch_size = self.request_size(issues.len());
            if batch_size == 0 {
                break;
            }

            tracing::info!(
                "Fetching issues {} to {}",
                start_at,
                start_at + batch_size
            );

            let params = SearchParams::new()
                .start_at(start_at)
                .max_results(batch_size);

            let page = client.search_issues(jql, params).await?;
            let page_len = page.issues.len();
            let last_page = page.reports_last_page();

            if page_len == 0 {
                break;
            }

            issues.extend(page.issues);

            if last_page {
                break;
            }
            if let Some(max) = self.max_results {
                if issues.len() >= max {
                    break;
                }
            }

            start_at += page_len as u32;
        }

        tracing::info!("Retrieved {} issues", issues.len());
        Ok(issues)
    }
}

impl Default for SearchPaginator {
    fn default() -> Self {
        Self::new()
    }
}

impl JiraClient {
    /// 一括検索を1ページ分実行する
    pub async fn search_issues(&self, jql: &str, params: SearchParams) -> Result<SearchResult> {
        let mut body = serde_json::json!({
            "jql": jql
        });

        // SearchParamsの値をリクエストボディにマージ
        if let Some(start_at) = params.start_at {
            body["startAt"] = start_at.into();
        }
        if let Some(max_results) = params.max_results {
            body["maxResults"] = max_results.into();
        }

        let data = self.post(SEARCH_ENDPOINT, &body).await?;
        Ok(serde_json::from_value(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Auth, Error, JiraConfig, RetryPolicy};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> JiraClient {
        let config = JiraConfig::new(
            base_url,
            Auth::Basic {
                username: "test@example.com".to_string(),
                api_token: "test_token".to_string(),
            },
        )
        .unwrap()
        .retry(
            RetryPolicy::new()
                .max_retries(1)
                .base_delay(Duration::from_millis(5)),
        );
        JiraClient::new(config).unwrap()
    }

    fn make_issues(count: usize, offset: usize) -> Vec<Value> {
        (0..count)
            .map(|i| {
                json!({
                    "id": format!("{}", 10000 + i + offset),
                    "key": format!("TEST-{}", i + offset + 1),
                    "fields": { "summary": format!("Issue {}", i + offset + 1) }
                })
            })
            .collect()
    }

    async fn mount_page(server: &MockServer, start_at: u32, max_results: u32, total: u32, issues: Vec<Value>) {
        Mock::given(method("POST"))
            .and(path("/rest/api/3/search"))
            .and(body_partial_json(json!({
                "startAt": start_at,
                "maxResults": max_results
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": start_at,
                "maxResults": max_results,
                "total": total,
                "issues": issues
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_request_size_respects_cap() {
        let paginator = SearchPaginator::new().page_size(100).max_results(Some(250));

        assert_eq!(paginator.request_size(0), 100);
        assert_eq!(paginator.request_size(200), 50);
        assert_eq!(paginator.request_size(250), 0);
        assert_eq!(SearchPaginator::new().request_size(10_000), 100);
    }

    #[tokio::test]
    async fn test_search_issues_sends_only_paging_fields() {
        // Given: リクエストボディを完全一致で検証するモックサーバー
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/3/search"))
            .and(body_json(json!({
                "jql": "project = TEST",
                "startAt": 0,
                "maxResults": 2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": 0,
                "maxResults": 2,
                "total": 1,
                "issues": make_issues(1, 0)
            })))
            .expect(1)
            .mount(&server)
            .await;

        // When: 1ページ分検索
        let page = test_client(&server.uri())
            .search_issues("project = TEST", SearchParams::new().start_at(0).max_results(2))
            .await
            .unwrap();

        // Then: fieldsやexpandで絞らず、全フィールドのIssueが返る
        assert_eq!(page.issues.len(), 1);
        assert!(page.reports_last_page());
    }

    #[tokio::test]
    async fn test_search_all_multiple_pages_in_order() {
        // Given: 2ページに分かれた5件の検索結果
        let server = MockServer::start().await;
        mount_page(&server, 0, 3, 5, make_issues(3, 0)).await;
        mount_page(&server, 3, 3, 5, make_issues(2, 3)).await;

        let client = test_client(&server.uri());

        // When: 全件取得
        let issues = SearchPaginator::new()
            .page_size(3)
            .search_all(&client, "project = TEST")
            .await
            .unwrap();

        // Then: 上流の順序どおりに重複なく5件返る
        let keys: Vec<&str> = issues.iter().map(|i| i["key"].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["TEST-1", "TEST-2", "TEST-3", "TEST-4", "TEST-5"]);
    }

    #[tokio::test]
    async fn test_search_all_stops_at_max_results() {
        // Given: 上限4件、ページサイズ3
        let server = MockServer::start().await;
        mount_page(&server, 0, 3, 10, make_issues(3, 0)).await;
        mount_page(&server, 3, 1, 10, make_issues(1, 3)).await;

        let client = test_client(&server.uri());

        // When: 上限付きで取得
        let issues = SearchPaginator::new()
            .page_size(3)
            .max_results(Some(4))
            .search_all(&client, "project = TEST")
            .await
            .unwrap();

        // Then: 2ページ目は残り1件だけ要求される
        assert_eq!(issues.len(), 4);
    }

    #[tokio::test]
    async fn test_search_all_stops_on_empty_page() {
        // Given: totalを返さず、2ページ目が空
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/rest/api/3/search"))
            .and(body_partial_json(json!({ "startAt": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": 0,
                "maxResults": 2,
                "issues": make_issues(2, 0)
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/rest/api/3/search"))
            .and(body_partial_json(json!({ "startAt": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "startAt": 2,
                "maxResults": 2,
                "issues": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());

        // When: 全件取得
        let issues = SearchPaginator::new()
            .page_size(2)
            .search_all(&client, "project = TEST")
            .await
            .unwrap();

        // Then: 空ページで終了する
        assert_eq!(issues.len(), 2);
    }

    #[tokio::test]
    async fn test_search_all_fails_on_page_error() {
        // Given: 2ページ目が常に503
        let server = MockServer::start().await;
        mount_page(&server, 0, 2, 4, make_issues(2, 0)).await;

        Mock::given(method("POST"))
            .and(path("/rest/api/3/search"))
            .and(body_partial_json(json!({ "startAt": 2 })))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());

        // When: 全件取得
        let result = SearchPaginator::new()
            .page_size(2)
            .search_all(&client, "project = TEST")
            .await;

        // Then: 部分的な結果ではなくエラーが返る
        assert!(matches!(result, Err(Error::TransientNetwork { .. })));
    }
}
