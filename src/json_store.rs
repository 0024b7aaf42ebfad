use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs::{File, create_dir_all};
use tokio::io::AsyncWriteExt;

use crate::{Error, IssueRecord, IssueSink};

/// 出力先
#[derive(Debug, Clone)]
pub enum JsonTarget {
    File(PathBuf),
    Stdout,
}

/// 全レコードを1つのJSON配列として書き出すストア（gzip圧縮対応）
///
/// レコードは入力順にためておき、`finalize` で一度だけシリアライズする。
pub struct JsonStore {
    target: JsonTarget,
    /// 整形して出力するかどうか
    pretty: bool,
    /// gzip圧縮を使用するかどうか
    use_compression: bool,
    records: Vec<IssueRecord>,
    finalized: bool,
}

impl JsonStore {
    /// ファイルに書き出すストアを作成
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_target(JsonTarget::File(path.as_ref().to_path_buf()))
    }

    /// 標準出力に書き出すストアを作成
    pub fn stdout() -> Self {
        Self::with_target(JsonTarget::Stdout)
    }

    fn with_target(target: JsonTarget) -> Self {
        Self {
            target,
            pretty: true,
            use_compression: false,
            records: Vec::new(),
            finalized: false,
        }
    }

    /// 整形出力を設定
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// 圧縮設定を変更
    pub fn with_compression(mut self, use_compression: bool) -> Self {
        self.use_compression = use_compression;
        self
    }

    /// これまでに追加されたレコード
    pub fn records(&self) -> &[IssueRecord] {
        &self.records
    }

    /// レコード配列をバイト列にする（圧縮対応）
    fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut json_data = if self.pretty {
            serde_json::to_vec_pretty(&self.records)
        } else {
            serde_json::to_vec(&self.records)
        }
        .map_err(|e| Error::SinkWrite(format!("JSON serialization failed: {}", e)))?;

        if !self.use_compression {
            json_data.push(b'\n');
            return Ok(json_data);
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json_data)
            .map_err(|e| Error::SinkWrite(format!("gzip compression failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| Error::SinkWrite(format!("gzip compression failed: {}", e)))
    }

    async fn write_file(path: &Path, data: &[u8]) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).await.map_err(sink_io_error)?;
        }

        let mut file = File::create(path).await.map_err(sink_io_error)?;
        file.write_all(data).await.map_err(sink_io_error)?;
        file.sync_all().await.map_err(sink_io_error)?;

        Ok(())
    }
}

fn sink_io_error(e: std::io::Error) -> Error {
    Error::SinkWrite(format!("IO error: {}", e))
}

#[async_trait]
impl IssueSink for JsonStore {
    async fn append(&mut self, record: IssueRecord) -> Result<(), Error> {
        if self.finalized {
            return Err(Error::SinkWrite("JSON sink already finalized".to_string()));
        }
        self.records.push(record);
        Ok(())
    }

    async fn finalize(&mut self) -> Result<usize, Error> {
        if self.finalized {
            return Err(Error::SinkWrite("JSON sink already finalized".to_string()));
        }

        let data = self.encode()?;
        match &self.target {
            JsonTarget::File(path) => {
                Self::write_file(path, &data).await?;
                tracing::info!("JSON data exported to {}", path.display());
            }
            JsonTarget::Stdout => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&data).await.map_err(sink_io_error)?;
                stdout.flush().await.map_err(sink_io_error)?;
            }
        }

        self.finalized = true;
        Ok(self.records.len())
    }
}
