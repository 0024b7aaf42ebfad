use async_trait::async_trait;

use crate::{Error, IssueRecord};

/// 抽出結果の出力先の抽象化トレイト
///
/// レコードは渡された時点で確定し、以後変更されない。
#[async_trait]
pub trait IssueSink: Send {
    /// レコードを1件追加（入力順を保つ）
    async fn append(&mut self, record: IssueRecord) -> Result<(), Error>;

    /// 書き出しを確定し、書き込んだIssue数を返す
    async fn finalize(&mut self) -> Result<usize, Error>;
}

/// 出力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    DuckDb,
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "duckdb" | "sqlite" | "db" => Ok(OutputFormat::DuckDb),
            other => Err(Error::InvalidConfiguration(format!(
                "Unknown output format: {}",
                other
            ))),
        }
    }
}
