use async_trait::async_trait;
use duckdb::{Connection, params, params_from_iter};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task;

use crate::{ChangeEntry, Error, IssueRecord, IssueSink};

const DEFAULT_BATCH_SIZE: usize = 100;

/// DuckDB形式の出力先
///
/// `issues` テーブルにIssueを1行ずつ、`changelogs` テーブルに変更エントリを1行ずつ書き込む。
/// 同じキーのIssueを再度書き込むと、既存の行と履歴は置き換えられる。
pub struct DuckDBStore {
    /// データベースファイルのパス
    db_path: PathBuf,
    /// DuckDB接続（スレッドセーフ）
    connection: Arc<Mutex<Connection>>,
    batch_size: usize,
    pending: Vec<IssueRecord>,
    /// コミット済みのIssueキー（バッチをまたいだ重複は1件と数える）
    written_keys: HashSet<String>,
    initialized: bool,
    finalized: bool,
}

impl DuckDBStore {
    /// 新しいDuckDBストアを作成
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, Error> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::SinkWrite(format!("Failed to create directory: {}", e)))?;
        }
        let connection = Connection::open(&db_path)
            .map_err(|e| Error::SinkWrite(format!("Failed to open DuckDB: {}", e)))?;

        Ok(Self::with_connection(db_path, connection))
    }

    /// インメモリデータベースを作成
    pub fn new_in_memory() -> Result<Self, Error> {
        let connection = Connection::open_in_memory()
            .map_err(|e| Error::SinkWrite(format!("Failed to create in-memory DuckDB: {}", e)))?;

        Ok(Self::with_connection(PathBuf::from(":memory:"), connection))
    }

    fn with_connection(db_path: PathBuf, connection: Connection) -> Self {
        Self {
            db_path,
            connection: Arc::new(Mutex::new(connection)),
            batch_size: DEFAULT_BATCH_SIZE,
            pending: Vec::new(),
            written_keys: HashSet::new(),
            initialized: false,
            finalized: false,
        }
    }

    /// 何件ごとにコミットするか
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 接続をロックしてブロッキングスレッドで処理を実行する
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, duckdb::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.connection);

        task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::SinkWrite("DuckDB connection lock poisoned".to_string()))?;
            f(&conn).map_err(Error::from)
        })
        .await
        .map_err(|e| Error::SinkWrite(format!("Task join error: {}", e)))?
    }

    /// データベーススキーマを初期化
    pub async fn initialize(&mut self) -> Result<(), Error> {
        self.run_blocking(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS issues (
                    id VARCHAR NOT NULL,
                    key VARCHAR PRIMARY KEY,
                    summary VARCHAR,
                    description TEXT,
                    issue_type VARCHAR,
                    status VARCHAR,
                    priority VARCHAR,
                    assignee VARCHAR,
                    reporter VARCHAR,
                    created VARCHAR,
                    updated VARCHAR,
                    resolved VARCHAR,
                    project_key VARCHAR,
                    labels TEXT,
                    components TEXT,
                    fix_versions TEXT,
                    story_points DOUBLE,
                    parent_key VARCHAR,
                    epic_key VARCHAR,
                    epic_name VARCHAR,
                    linked_issues TEXT,
                    sprint_info TEXT,
                    api_url VARCHAR,
                    web_url VARCHAR,
                    raw_data TEXT,
                    extracted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                );

                CREATE SEQUENCE IF NOT EXISTS changelog_id_seq START 1;

                CREATE TABLE IF NOT EXISTS changelogs (
                    id BIGINT PRIMARY KEY DEFAULT nextval('changelog_id_seq'),
                    issue_key VARCHAR NOT NULL REFERENCES issues(key),
                    change_id VARCHAR,
                    author VARCHAR,
                    created VARCHAR,
                    field_name VARCHAR NOT NULL,
                    field_type VARCHAR NOT NULL,
                    from_value TEXT,
                    to_value TEXT,
                    from_string TEXT,
                    to_string TEXT,
                    extracted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                );

                CREATE INDEX IF NOT EXISTS idx_changelogs_issue_key ON changelogs(issue_key);
                CREATE INDEX IF NOT EXISTS idx_changelogs_field_name ON changelogs(field_name);
                "#,
            )
        })
        .await?;

        self.initialized = true;
        Ok(())
    }

    /// 保留中のレコードを1トランザクションで書き込む
    async fn flush(&mut self) -> Result<(), Error> {
        if self.pending.is_empty() {
            return Ok(());
        }
        if !self.initialized {
            self.initialize().await?;
        }

        let rows = dedup_by_key(
            self.pending
                .iter()
                .map(IssueRow::from_record)
                .collect::<Result<Vec<_>, Error>>()?,
        );
        let keys: Vec<String> = rows.iter().map(|row| row.key.clone()).collect();

        self.run_blocking(move |conn| write_batch(conn, &rows)).await?;

        self.pending.clear();
        tracing::debug!("Wrote {} issues to DuckDB", keys.len());
        self.written_keys.extend(keys);
        Ok(())
    }

    /// テーブルの行数を数える（テスト・サマリー用）
    pub async fn count_rows(&self, table: &'static str) -> Result<usize, Error> {
        self.run_blocking(move |conn| {
            let count: i64 = conn
                .prepare(&format!("SELECT COUNT(*) FROM {}", table))?
                .query_row(params![], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

#[async_trait]
impl IssueSink for DuckDBStore {
    async fn append(&mut self, record: IssueRecord) -> Result<(), Error> {
        if self.finalized {
            return Err(Error::SinkWrite("DuckDB sink already finalized".to_string()));
        }
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<usize, Error> {
        if self.finalized {
            return Err(Error::SinkWrite("DuckDB sink already finalized".to_string()));
        }
        if !self.initialized {
            self.initialize().await?;
        }
        self.flush().await?;
        self.run_blocking(|conn| conn.execute_batch("CHECKPOINT")).await?;

        self.finalized = true;
        let written = self.written_keys.len();
        tracing::info!(
            "Saved {} issues to DuckDB database {}",
            written,
            self.db_path.display()
        );
        Ok(written)
    }
}

/// `issues` テーブルの1行分（配列フィールドはJSON文字列）
struct IssueRow {
    id: String,
    key: String,
    summary: String,
    description: Option<String>,
    issue_type: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    assignee: Option<String>,
    reporter: Option<String>,
    created: Option<String>,
    updated: Option<String>,
    resolved: Option<String>,
    project_key: Option<String>,
    labels: String,
    components: String,
    fix_versions: String,
    story_points: Option<f64>,
    parent_key: Option<String>,
    epic_key: Option<String>,
    epic_name: Option<String>,
    linked_issues: String,
    sprint_info: String,
    api_url: Option<String>,
    web_url: Option<String>,
    raw_data: Option<String>,
    changelogs: Vec<ChangeEntry>,
}

impl IssueRow {
    fn from_record(record: &IssueRecord) -> Result<Self, Error> {
        Ok(Self {
            id: record.id.clone(),
            key: record.key.clone(),
            summary: record.summary.clone(),
            description: record.description.clone(),
            issue_type: record.issue_type.clone(),
            status: record.status.clone(),
            priority: record.priority.clone(),
            assignee: record.assignee.clone(),
            reporter: record.reporter.clone(),
            created: record.created.clone(),
            updated: record.updated.clone(),
            resolved: record.resolved.clone(),
            project_key: record.project_key.clone(),
            labels: encode_json(&record.labels)?,
            components: encode_json(&record.components)?,
            fix_versions: encode_json(&record.fix_versions)?,
            story_points: record.story_points,
            parent_key: record.parent_key.clone(),
            epic_key: record.epic_key.clone(),
            epic_name: record.epic_name.clone(),
            linked_issues: encode_json(&record.linked_issues)?,
            sprint_info: encode_json(&record.sprint_info)?,
            api_url: record.api_url.clone(),
            web_url: record.web_url.clone(),
            raw_data: record.raw_data.as_ref().map(encode_json).transpose()?,
            changelogs: record.changelogs.clone(),
        })
    }
}

fn encode_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value)
        .map_err(|e| Error::SinkWrite(format!("JSON serialization failed: {}", e)))
}

/// 同じキーが複数回現れた場合は最後のものを残す（出現順は維持）
fn dedup_by_key(rows: Vec<IssueRow>) -> Vec<IssueRow> {
    let mut seen = HashSet::new();
    let mut kept: Vec<IssueRow> = rows
        .into_iter()
        .rev()
        .filter(|row| seen.insert(row.key.clone()))
        .collect();
    kept.reverse();
    kept
}

/// バッチ全体を1トランザクションで書き込む（失敗時は何も残さない）
fn write_batch(conn: &Connection, rows: &[IssueRow]) -> Result<(), duckdb::Error> {
    in_transaction(conn, |conn| {
        delete_changelogs(conn, rows)?;
        insert_rows(conn, rows)
    })
}

fn in_transaction<F>(conn: &Connection, f: F) -> Result<(), duckdb::Error>
where
    F: FnOnce(&Connection) -> Result<(), duckdb::Error>,
{
    conn.execute_batch("BEGIN TRANSACTION")?;
    match f(conn) {
        Ok(()) => conn.execute_batch("COMMIT"),
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("Rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

/// 置き換え対象のIssueの既存履歴を削除する
fn delete_changelogs(conn: &Connection, rows: &[IssueRow]) -> Result<(), duckdb::Error> {
    let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
    let placeholders = vec!["?"; keys.len()].join(", ");

    conn.execute(
        &format!("DELETE FROM changelogs WHERE issue_key IN ({})", placeholders),
        params_from_iter(keys.iter()),
    )?;
    Ok(())
}

fn insert_rows(conn: &Connection, rows: &[IssueRow]) -> Result<(), duckdb::Error> {
    let mut issue_stmt = conn.prepare(
        r#"
        INSERT INTO issues
        (id, key, summary, description, issue_type, status, priority, assignee, reporter,
         created, updated, resolved, project_key, labels, components, fix_versions,
         story_points, parent_key, epic_key, epic_name, linked_issues, sprint_info,
         api_url, web_url, raw_data)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (key) DO UPDATE SET
            id = EXCLUDED.id,
            summary = EXCLUDED.summary,
            description = EXCLUDED.description,
            issue_type = EXCLUDED.issue_type,
            status = EXCLUDED.status,
            priority = EXCLUDED.priority,
            assignee = EXCLUDED.assignee,
            reporter = EXCLUDED.reporter,
            created = EXCLUDED.created,
            updated = EXCLUDED.updated,
            resolved = EXCLUDED.resolved,
            project_key = EXCLUDED.project_key,
            labels = EXCLUDED.labels,
            components = EXCLUDED.components,
            fix_versions = EXCLUDED.fix_versions,
            story_points = EXCLUDED.story_points,
            parent_key = EXCLUDED.parent_key,
            epic_key = EXCLUDED.epic_key,
            epic_name = EXCLUDED.epic_name,
            linked_issues = EXCLUDED.linked_issues,
            sprint_info = EXCLUDED.sprint_info,
            api_url = EXCLUDED.api_url,
            web_url = EXCLUDED.web_url,
            raw_data = EXCLUDED.raw_data,
            extracted_at = CURRENT_TIMESTAMP
        "#,
    )?;
    let mut change_stmt = conn.prepare(
        r#"
        INSERT INTO changelogs
        (issue_key, change_id, author, created, field_name, field_type,
         from_value, to_value, from_string, to_string)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )?;

    for row in rows {
        issue_stmt.execute(params![
            &row.id,
            &row.key,
            &row.summary,
            &row.description,
            &row.issue_type,
            &row.status,
            &row.priority,
            &row.assignee,
            &row.reporter,
            &row.created,
            &row.updated,
            &row.resolved,
            &row.project_key,
            &row.labels,
            &row.components,
            &row.fix_versions,
            &row.story_points,
            &row.parent_key,
            &row.epic_key,
            &row.epic_name,
            &row.linked_issues,
            &row.sprint_info,
            &row.api_url,
            &row.web_url,
            &row.raw_data,
        ])?;

        for change in &row.changelogs {
            change_stmt.execute(params![
                &row.key,
                &change.change_id,
                &change.author,
                &change.created,
                &change.field_name,
                change.field_type.as_str(),
                &change.from_value,
                &change.to_value,
                &change.from_string,
                &change.to_string,
            ])?;
        }
    }

    Ok(())
}
