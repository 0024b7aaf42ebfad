use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config_store::CustomFieldConfig;
use crate::coordinator::ChangelogFailure;
use crate::normalizer::FieldResolution;

/// 1カテゴリ分のフォールバック解決状況
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldUsage {
    /// 設定された候補フィールドID（優先順）
    pub candidates: Vec<String>,
    /// 採用されたフィールドIDごとのIssue数
    pub matched: BTreeMap<String, usize>,
    /// どの候補にも値がなかったIssue数
    pub unresolved: usize,
}

impl FieldUsage {
    pub fn new(candidates: &[String]) -> Self {
        Self {
            candidates: candidates.to_vec(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, field_id: Option<&str>) {
        match field_id {
            Some(id) => *self.matched.entry(id.to_string()).or_insert(0) += 1,
            None => self.unresolved += 1,
        }
    }

    /// 一度も採用されなかった候補（設定ミスの手がかり）
    pub fn never_matched(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .filter(|id| !self.matched.contains_key(id.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// 抽出実行の結果
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// 検索で取得した生のIssue数
    pub fetched_issues: usize,
    /// 出力先に書き込んだIssue数
    pub written_issues: usize,
    /// 必須フィールドがなく出力しなかったIssue
    pub skipped_malformed: Vec<String>,
    /// 変更履歴を取得できなかったIssue
    pub changelog_failures: Vec<ChangelogFailure>,
    pub change_entries: usize,
    /// エピック名の補完に失敗したエピックキー
    pub epic_name_failures: Vec<String>,
    pub epic_usage: FieldUsage,
    pub sprint_usage: FieldUsage,
    pub story_points_usage: FieldUsage,
}

impl ExtractionSummary {
    pub fn new(fields: &CustomFieldConfig) -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            end_time: now,
            fetched_issues: 0,
            written_issues: 0,
            skipped_malformed: Vec::new(),
            changelog_failures: Vec::new(),
            change_entries: 0,
            epic_name_failures: Vec::new(),
            epic_usage: FieldUsage::new(&fields.epic_fields),
            sprint_usage: FieldUsage::new(&fields.sprint_fields),
            story_points_usage: FieldUsage::new(&fields.story_point_fields),
        }
    }

    pub fn record_resolution(&mut self, resolution: &FieldResolution) {
        self.epic_usage.record(resolution.epic_field.as_deref());
        self.sprint_usage.record(resolution.sprint_field.as_deref());
        self.story_points_usage
            .record(resolution.story_points_field.as_deref());
    }

    pub fn finish(&mut self) {
        self.end_time = Utc::now();
    }

    /// 処理時間（秒）
    pub fn duration_seconds(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    /// 変更履歴が欠けているIssueのキー
    pub fn issues_missing_changelogs(&self) -> Vec<&str> {
        self.changelog_failures
            .iter()
            .map(|f| f.issue_key.as_str())
            .collect()
    }

    /// 実行結果をログに出す
    pub fn log(&self) {
        tracing::info!(
            "Extraction finished in {:.1}s: {} issues written ({} fetched), {} change entries",
            self.duration_seconds(),
            self.written_issues,
            self.fetched_issues,
            self.change_entries
        );

        if !self.skipped_malformed.is_empty() {
            tracing::warn!(
                "Skipped {} malformed issues: {}",
                self.skipped_malformed.len(),
                self.skipped_malformed.join(", ")
            );
        }
        if !self.changelog_failures.is_empty() {
            tracing::warn!(
                "{} issues are missing changelogs: {}",
                self.changelog_failures.len(),
                self.issues_missing_changelogs().join(", ")
            );
        }
        if !self.epic_name_failures.is_empty() {
            tracing::warn!(
                "Could not resolve epic names for: {}",
                self.epic_name_failures.join(", ")
            );
        }

        for (category, usage) in [
            ("epic", &self.epic_usage),
            ("sprint", &self.sprint_usage),
            ("story points", &self.story_points_usage),
        ] {
            tracing::info!(
                "{} fields: matched {:?}, unresolved in {} issues",
                category,
                usage.matched,
                usage.unresolved
            );
            let never = usage.never_matched();
            if !never.is_empty() && self.written_issues > 0 {
                tracing::warn!(
                    "{} field candidates never matched: {}",
                    category,
                    never.join(", ")
                );
            }
        }
    }
}
