/// エンドツーエンド統合テスト
///
/// モックサーバーに対して抽出パイプライン全体を実行します：
/// 1. JQL検索のページ送り
/// 2. フィールド正規化
/// 3. 変更履歴の並行取得
/// 4. JSON / DuckDB への書き込み
use jira_extract::{
    Auth, DuckDBStore, ExtractOptions, Extractor, JiraClient, JiraConfig, JsonStore,
    RetryPolicy,
};
use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CANONICAL_FIELDS: [&str; 23] = [
    "id",
    "key",
    "summary",
    "description",
    "issue_type",
    "status",
    "priority",
    "assignee",
    "reporter",
    "created",
    "updated",
    "resolved",
    "project_key",
    "labels",
    "components",
    "fix_versions",
    "story_points",
    "parent_key",
    "epic_key",
    "epic_name",
    "linked_issues",
    "sprint_info",
    "changelogs",
];

fn test_client(base_url: &str, max_workers: usize) -> JiraClient {
    let config = JiraConfig::new(
        base_url,
        Auth::Basic {
            username: "test@example.com".to_string(),
            api_token: "test_token".to_string(),
        },
    )
    .unwrap()
    .max_workers(max_workers)
    .retry(
        RetryPolicy::new()
            .max_retries(2)
            .base_delay(Duration::from_millis(5)),
    );
    JiraClient::new(config).unwrap()
}

/// 検索結果として返すモックIssue
fn mock_issue(server_uri: &str, number: u32) -> Value {
    let key = format!("TEST-{}", number);
    json!({
        "id": (10000 + number).to_string(),
        "key": key,
        "self": format!("{}/rest/api/3/issue/{}", server_uri, 10000 + number),
        "fields": {
            "summary": format!("Issue number {}", number),
            "description": {
                "type": "doc",
                "version": 1,
                "content": [{
                    "type": "paragraph",
                    "content": [{ "type": "text", "text": format!("Description {}", number) }]
                }]
            },
            "issuetype": { "name": "Story" },
            "status": { "name": "In Progress" },
            "priority": { "name": "Medium" },
            "assignee": { "displayName": "Alice" },
            "reporter": { "displayName": "Bob" },
            "created": "2024-01-01T09:00:00.000+0000",
            "updated": "2024-01-05T09:00:00.000+0000",
            "resolutiondate": null,
            "project": { "key": "TEST", "name": "Test Project" },
            "labels": ["backend"],
            "components": [{ "name": "API" }],
            "fixVersions": [{ "name": "1.0" }],
            "customfield_10026": number as f64,
            "customfield_10014": "TEST-100",
            "customfield_10020": [{
                "id": 7,
                "name": "Sprint 7",
                "state": "active",
                "startDate": "2024-01-01T00:00:00.000Z",
                "endDate": "2024-01-14T00:00:00.000Z"
            }],
            "issuelinks": [{
                "type": { "name": "Blocks", "inward": "is blocked by", "outward": "blocks" },
                "outwardIssue": { "key": "TEST-99", "fields": { "summary": "Blocked work" } }
            }]
        }
    })
}

fn changelog_page(key: &str) -> Value {
    json!({
        "startAt": 0,
        "maxResults": 100,
        "total": 2,
        "isLast": true,
        "values": [
            {
                "id": format!("{}-1", key),
                "author": { "displayName": "Alice" },
                "created": "2024-01-02T10:00:00.000+0000",
                "items": [{
                    "field": "status",
                    "fieldtype": "jira",
                    "fieldId": "status",
                    "from": "1",
                    "fromString": "Open",
                    "to": "3",
                    "toString": "In Progress"
                }]
            },
            {
                "id": format!("{}-2", key),
                "author": { "displayName": "Bob" },
                "created": "2024-01-03T10:00:00.000+0000",
                "items": [{
                    "field": "Story Points",
                    "fieldtype": "custom",
                    "fieldId": "customfield_10026",
                    "from": null,
                    "fromString": null,
                    "to": "3",
                    "toString": "3"
                }]
            }
        ]
    })
}

/// 3件の検索結果・変更履歴・エピックを返すモックサーバー
async fn start_mock_jira() -> MockServer {
    let server = MockServer::start().await;
    let issues: Vec<Value> = (1..=3).map(|n| mock_issue(&server.uri(), n)).collect();

    Mock::given(method("POST"))
        .and(path("/rest/api/3/search"))
        .and(body_partial_json(json!({
            "jql": "project = TEST",
            "startAt": 0,
            "maxResults": 10
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": 0,
            "maxResults": 10,
            "total": 3,
            "issues": issues
        })))
        .mount(&server)
        .await;

    for n in 1..=3 {
        let key = format!("TEST-{}", n);
        Mock::given(method("GET"))
            .and(path(format!("/rest/api/3/issue/{}/changelog", key)))
            .respond_with(ResponseTemplate::new(200).set_body_json(changelog_page(&key)))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/rest/api/3/issue/TEST-100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "key": "TEST-100",
            "fields": { "summary": "Platform epic" }
        })))
        .mount(&server)
        .await;

    server
}

fn scenario_options() -> ExtractOptions {
    ExtractOptions::new()
        .max_workers(2)
        .max_results(Some(10))
}

#[tokio::test]
async fn test_extract_to_json_scenario() {
    // Given: 3件のIssueを返すJIRA
    let server = start_mock_jira().await;
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("issues.json");

    // When: 2ワーカー・上限10件で抽出
    let extractor = Extractor::new(test_client(&server.uri(), 2), scenario_options());
    let mut sink = JsonStore::new(&output);
    let summary = extractor.run("project = TEST", &mut sink).await.unwrap();

    // Then: 3件の配列が、全ての正規フィールドを持って出力される
    assert_eq!(summary.written_issues, 3);
    assert!(summary.changelog_failures.is_empty());
    assert_eq!(summary.change_entries, 6);

    let contents = tokio::fs::read_to_string(&output).await.unwrap();
    let document: Value = serde_json::from_str(&contents).unwrap();
    let issues = document.as_array().unwrap();
    assert_eq!(issues.len(), 3);

    for (index, issue) in issues.iter().enumerate() {
        let object = issue.as_object().unwrap();
        for field in CANONICAL_FIELDS {
            assert!(object.contains_key(field), "missing field {}", field);
        }
        assert_eq!(issue["key"], format!("TEST-{}", index + 1));

        // 変更履歴は上流の作成日時の昇順
        let created: Vec<&str> = issue["changelogs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["created"].as_str().unwrap())
            .collect();
        assert_eq!(created.len(), 2);
        assert!(created.windows(2).all(|w| w[0] <= w[1]));
    }

    let first = &issues[0];
    assert_eq!(first["description"], "Description 1");
    assert_eq!(first["story_points"], 1.0);
    assert_eq!(first["epic_key"], "TEST-100");
    assert_eq!(first["epic_name"], "Platform epic");
    assert_eq!(first["sprint_info"][0]["state"], "active");
    assert_eq!(first["linked_issues"][0]["direction"], "outward");
    assert_eq!(first["linked_issues"][0]["issue_key"], "TEST-99");
    assert_eq!(first["changelogs"][1]["field_type"], "custom");
    assert_eq!(
        first["web_url"],
        format!("{}/browse/TEST-1", server.uri())
    );
}

#[tokio::test]
async fn test_rerun_produces_identical_json() {
    // Given: 同じ上流状態
    let server = start_mock_jira().await;
    let temp_dir = TempDir::new().unwrap();
    let first_path = temp_dir.path().join("first.json");
    let second_path = temp_dir.path().join("second.json");

    // When: 同じJQLで2回抽出
    for output in [&first_path, &second_path] {
        let extractor = Extractor::new(test_client(&server.uri(), 2), scenario_options());
        let mut sink = JsonStore::new(output);
        extractor.run("project = TEST", &mut sink).await.unwrap();
    }

    // Then: バイト単位で一致する
    let first = std::fs::read(&first_path).unwrap();
    let second = std::fs::read(&second_path).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_skip_changelogs_mode() {
    let server = start_mock_jira().await;
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("issues.json");

    let extractor = Extractor::new(
        test_client(&server.uri(), 2),
        scenario_options().include_changelogs(false),
    );
    let mut sink = JsonStore::new(&output).with_pretty(false);
    let summary = extractor.run("project = TEST", &mut sink).await.unwrap();

    assert_eq!(summary.change_entries, 0);
    let document: Value =
        serde_json::from_str(&tokio::fs::read_to_string(&output).await.unwrap()).unwrap();
    for issue in document.as_array().unwrap() {
        assert_eq!(issue["changelogs"], json!([]));
    }
}

#[tokio::test]
async fn test_extract_to_duckdb() {
    // Given: DuckDBファイルへの出力
    let server = start_mock_jira().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("jira_data.duckdb");

    // When: 2回続けて抽出
    for _ in 0..2 {
        let extractor = Extractor::new(test_client(&server.uri(), 2), scenario_options());
        let mut store = DuckDBStore::new(&db_path).unwrap().with_batch_size(2);
        store.initialize().await.unwrap();
        let summary = extractor.run("project = TEST", &mut store).await.unwrap();
        assert_eq!(summary.written_issues, 3);
    }

    // Then: 行は置き換えられ、重複しない
    let store = DuckDBStore::new(&db_path).unwrap();
    assert_eq!(store.count_rows("issues").await.unwrap(), 3);
    assert_eq!(store.count_rows("changelogs").await.unwrap(), 6);
}
