use async_trait::async_trait;

use crate::changelog_parser::ChangelogParser;
use crate::error::Result;
use crate::models::{ChangeEntry, ChangelogPage};
use crate::JiraClient;

const CHANGELOG_PAGE_SIZE: u32 = 100;

/// Issueキーから変更履歴を取得する抽象
///
/// コーディネーターはこのトレイト越しに呼び出すため、テストでは偽の実装に差し替えられる。
#[async_trait]
pub trait ChangelogSource: Send + Sync {
    async fn fetch_changelog(&self, issue_key: &str) -> Result<Vec<ChangeEntry>>;
}

impl JiraClient {
    /// 変更履歴の1ページ分を取得
    pub async fn get_changelog_page(&self, issue_key: &str, start_at: u32) -> Result<ChangelogPage> {
        let path = format!(
            "/rest/api/3/issue/{}/changelog",
            urlencoding::encode(issue_key)
        );
        let data = self
            .get(
                &path,
                &[
                    ("startAt", start_at.to_string()),
                    ("maxResults", CHANGELOG_PAGE_SIZE.to_string()),
                ],
            )
            .await?;
        Ok(serde_json::from_value(data)?)
    }
}

#[async_trait]
impl ChangelogSource for JiraClient {
    /// 履歴を最後のページまで取得し、上流の順序のまま平坦化する
    async fn fetch_changelog(&self, issue_key: &str) -> Result<Vec<ChangeEntry>> {
        let mut histories = Vec::new();
        let mut start_at = 0u32;

        loop {
            let page = self.get_changelog_page(issue_key, start_at).await?;
            let page_len = page.values.len();
            let fetched = start_at as u64 + page_len as u64;
            let is_last = page.is_last == Some(true)
                || page.total.is_some_and(|total| fetched >= total as u64);

            histories.extend(page.values);

            if page_len == 0 || is_last {
                break;
            }
            start_at += page_len as u32;
        }

        Ok(ChangelogParser::flatten(&histories))
    }
}
