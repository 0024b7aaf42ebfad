use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Authentication failed: {status} - {message}")]
    AuthenticationFailed { status: u16, message: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Transient network error after {attempts} attempts: {message}")]
    TransientNetwork { attempts: u32, message: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// リトライで回復しうる一時的なエラーかどうか
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. } | Error::TransientNetwork { .. }
        )
    }

    /// 検索パス上で発生した場合に実行全体を中断すべきエラーかどうか
    ///
    /// 不正なペイロードは個々のIssueで吸収されるため致命的ではない。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::MalformedPayload(_))
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Error::SinkWrite(format!("DuckDB error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
