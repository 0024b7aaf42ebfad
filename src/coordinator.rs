use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::history::ChangelogSource;
use crate::models::{ChangeEntry, IssueRecord};

/// 1件の変更履歴取得の失敗
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangelogFailure {
    pub issue_key: String,
    pub message: String,
}

/// 全Issue分の取得結果（入力と同じ順序）
#[derive(Debug, Default)]
pub struct ChangelogBatch {
    pub results: Vec<Result<Vec<ChangeEntry>, String>>,
}

impl ChangelogBatch {
    pub fn failures(&self, issue_keys: &[String]) -> Vec<ChangelogFailure> {
        self.results
            .iter()
            .zip(issue_keys)
            .filter_map(|(result, key)| match result {
                Err(message) => Some(ChangelogFailure {
                    issue_key: key.clone(),
                    message: message.clone(),
                }),
                Ok(_) => None,
            })
            .collect()
    }
}

/// 固定数のワーカーで変更履歴を並行取得するコーディネーター
///
/// 結果は完了順ではなく入力インデックスに書き戻すため、出力順は入力順と一致する。
/// 1件の失敗は実行全体を止めず、そのIssueの履歴は空のままになる。
#[derive(Debug, Clone)]
pub struct ChangelogCoordinator {
    max_workers: usize,
}

impl ChangelogCoordinator {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// 全キーの変更履歴を取得する
    pub async fn fetch_all<S>(&self, source: Arc<S>, issue_keys: &[String]) -> ChangelogBatch
    where
        S: ChangelogSource + ?Sized + 'static,
    {
        let total = issue_keys.len();
        if total == 0 {
            return ChangelogBatch::default();
        }

        let keys: Arc<Vec<String>> = Arc::new(issue_keys.to_vec());
        // 各スロットは担当ワーカーが一度だけ書き込む
        let slots: Arc<Vec<OnceLock<Result<Vec<ChangeEntry>, String>>>> =
            Arc::new((0..total).map(|_| OnceLock::new()).collect());
        let next = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let worker_count = self.max_workers.min(total);
        tracing::info!(
            "Fetching changelogs for {} issues using {} concurrent workers",
            total,
            worker_count
        );

        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let source = Arc::clone(&source);
            let keys = Arc::clone(&keys);
            let slots = Arc::clone(&slots);
            let next = Arc::clone(&next);
            let completed = Arc::clone(&completed);

            handles.push(tokio::spawn(async move {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(issue_key) = keys.get(index) else {
                        break;
                    };

                    let result = source
                        .fetch_changelog(issue_key)
                        .await
                        .map_err(|e| e.to_string());
                    if let Err(message) = &result {
                        tracing::warn!(issue = %issue_key, "Error fetching changelog: {}", message);
                    }
                    let _ = slots[index].set(result);

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if done % 10 == 0 || done == keys.len() {
                        tracing::info!("Fetched changelogs for {}/{} issues", done, keys.len());
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Changelog worker terminated abnormally: {}", e);
            }
        }

        // 全ワーカーの終了後に入力順へ組み立てる
        let results = slots
            .iter()
            .map(|slot| match slot.get() {
                Some(result) => result.clone(),
                None => Err("changelog worker terminated before completing this issue".to_string()),
            })
            .collect();

        ChangelogBatch { results }
    }

    /// 取得した履歴を同じ順序のレコードに書き込み、失敗を返す
    pub async fn attach<S>(&self, source: Arc<S>, records: &mut [IssueRecord]) -> Vec<ChangelogFailure>
    where
        S: ChangelogSource + ?Sized + 'static,
    {
        let keys: Vec<String> = records.iter().map(|r| r.key.clone()).collect();
        let batch = self.fetch_all(source, &keys).await;
        let failures = batch.failures(&keys);

        for (record, result) in records.iter_mut().zip(batch.results) {
            record.changelogs = result.unwrap_or_default();
        }

        failures
    }
}

impl Default for ChangelogCoordinator {
    fn default() -> Self {
        Self::new(10)
    }
}
