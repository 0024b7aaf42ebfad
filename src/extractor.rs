use std::collections::HashMap;
use std::sync::Arc;

use crate::config_store::CustomFieldConfig;
use crate::coordinator::ChangelogCoordinator;
use crate::error::Result;
use crate::normalizer::FieldNormalizer;
use crate::paginator::SearchPaginator;
use crate::summary::ExtractionSummary;
use crate::{IssueRecord, IssueSink, JiraClient};

/// 1回の抽出実行の設定
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// 検索1ページあたりの件数
    pub page_size: u32,
    /// 取得件数の上限（`None` は無制限）
    pub max_results: Option<usize>,
    /// 変更履歴取得の同時実行数
    pub max_workers: usize,
    pub include_changelogs: bool,
    /// エピック名が取れなかったときにエピック本体を引くかどうか
    pub resolve_epic_names: bool,
    pub fields: CustomFieldConfig,
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            max_results: None,
            max_workers: 10,
            include_changelogs: true,
            resolve_epic_names: true,
            fields: CustomFieldConfig::default(),
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn max_results(mut self, max_results: Option<usize>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn include_changelogs(mut self, include: bool) -> Self {
        self.include_changelogs = include;
        self
    }

    pub fn resolve_epic_names(mut self, resolve: bool) -> Self {
        self.resolve_epic_names = resolve;
        self
    }

    pub fn fields(mut self, fields: CustomFieldConfig) -> Self {
        self.fields = fields;
        self
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// 検索 → 正規化 → 変更履歴のアタッチ → 出力 をつなぐパイプライン
pub struct Extractor {
    client: JiraClient,
    options: ExtractOptions,
    normalizer: FieldNormalizer,
}

impl Extractor {
    pub fn new(client: JiraClient, options: ExtractOptions) -> Self {
        let normalizer = FieldNormalizer::new(options.fields.clone());
        Self {
            client,
            options,
            normalizer,
        }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// JQLに一致するIssueを抽出して出力先に書き込む
    ///
    /// 検索の失敗と出力の失敗は実行全体を中断する。変更履歴とエピック名の
    /// 取得失敗はIssue単位の警告としてサマリーに記録される。
    pub async fn run<S>(&self, jql: &str, sink: &mut S) -> Result<ExtractionSummary>
    where
        S: IssueSink + ?Sized,
    {
        let mut summary = ExtractionSummary::new(&self.options.fields);
        tracing::info!("Searching issues with JQL: {}", jql);

        let raw_issues = SearchPaginator::new()
            .page_size(self.options.page_size)
            .max_results(self.options.max_results)
            .search_all(&self.client, jql)
            .await?;
        summary.fetched_issues = raw_issues.len();

        let mut records = Vec::with_capacity(raw_issues.len());
        for (index, raw) in raw_issues.iter().enumerate() {
            match self.normalizer.normalize(raw) {
                Ok(normalized) => {
                    summary.record_resolution(&normalized.resolution);
                    records.push(normalized.record);
                }
                Err(e) => {
                    tracing::warn!("Skipping issue #{}: {}", index, e);
                    summary.skipped_malformed.push(format!("#{}: {}", index, e));
                }
            }
        }

        if self.options.resolve_epic_names {
            summary.epic_name_failures = self.fill_epic_names(&mut records).await;
        }

        if self.options.include_changelogs && !records.is_empty() {
            let coordinator = ChangelogCoordinator::new(self.options.max_workers);
            summary.changelog_failures = coordinator
                .attach(Arc::new(self.client.clone()), &mut records)
                .await;
        }

        summary.change_entries = records.iter().map(|r| r.changelogs.len()).sum();

        for record in records {
            sink.append(record).await?;
        }
        summary.written_issues = sink.finalize().await?;

        summary.finish();
        summary.log();
        Ok(summary)
    }

    /// エピックキーはあるが名前がないレコードを補完し、失敗したキーを返す
    async fn fill_epic_names(&self, records: &mut [IssueRecord]) -> Vec<String> {
        let mut cache: HashMap<String, Option<String>> = HashMap::new();
        let mut failures = Vec::new();

        for record in records.iter_mut() {
            let Some(epic_key) = record.epic_key.clone() else {
                continue;
            };
            if record.epic_name.is_some() {
                continue;
            }

            if !cache.contains_key(&epic_key) {
                let name = match self.client.get_issue_summary(&epic_key).await {
                    Ok(name) => name,
                    Err(e) => {
                        tracing::warn!(epic = %epic_key, "Could not fetch epic name: {}", e);
                        failures.push(epic_key.clone());
                        None
                    }
                };
                cache.insert(epic_key.clone(), name);
            }

            record.epic_name = cache.get(&epic_key).cloned().flatten();
        }

        failures
    }
}

impl JiraClient {
    /// Issueのサマリーだけを取得する（エピック名の補完用）
    pub async fn get_issue_summary(&self, issue_key: &str) -> Result<Option<String>> {
        let path = format!("/rest/api/3/issue/{}", urlencoding::encode(issue_key));
        let data = self
            .get(&path, &[("fields", "summary".to_string())])
            .await?;

        Ok(data
            .pointer("/fields/summary")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string()))
    }
}
