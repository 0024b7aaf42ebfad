use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, is_retryable_status, parse_retry_after};
use base64::Engine;
use chrono::Utc;
use reqwest::{Client, Method, header};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub enum Auth {
    Basic { username: String, api_token: String },
}

#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub auth: Auth,
    /// 同時に動くワーカー数（コネクションプールのサイズにも使う）
    pub max_workers: usize,
    /// 1リクエストあたりのタイムアウト
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl JiraConfig {
    pub fn new(base_url: impl Into<String>, auth: Auth) -> Result<Self> {
        let base_url = base_url.into();

        // Validate URL
        let _ = Url::parse(&base_url)
            .map_err(|_| Error::InvalidConfiguration("Invalid base URL".to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            max_workers: 10,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_env() -> Result<Self> {
        use std::env;

        let base_url = env::var("JIRA_URL").map_err(|_| {
            Error::ConfigurationMissing("JIRA_URL not found in environment".to_string())
        })?;

        let username = env::var("JIRA_USERNAME").map_err(|_| {
            Error::ConfigurationMissing("JIRA_USERNAME not found in environment".to_string())
        })?;

        let api_token = env::var("JIRA_API_TOKEN").map_err(|_| {
            Error::ConfigurationMissing("JIRA_API_TOKEN not found in environment".to_string())
        })?;

        let auth = Auth::Basic { username, api_token };

        Self::new(base_url, auth)
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// 認証・コネクションプール・リトライを備えたJIRA REST APIのトランスポート
///
/// `Clone` は内部の `reqwest::Client` を共有するので、ワーカー間で安価に共有できる。
#[derive(Debug, Clone)]
pub struct JiraClient {
    pub(crate) client: Client,
    pub(crate) config: Arc<JiraConfig>,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        // 認証ヘッダーを追加
        match &config.auth {
            Auth::Basic { username, api_token } => {
                let auth_value = format!("{}:{}", username, api_token);
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(auth_value.as_bytes());
                headers.insert(
                    header::AUTHORIZATION,
                    header::HeaderValue::from_str(&format!("Basic {}", encoded)).map_err(
                        |_| Error::InvalidConfiguration("Invalid auth header".to_string()),
                    )?,
                );
            }
        }

        // ワーカーが新規接続を奪い合わないようにプールをワーカー数に合わせる
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_workers * 2)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &JiraConfig {
        &self.config
    }

    /// リクエストを実行し、JSONレスポンスを返す
    ///
    /// 接続エラー・タイムアウト・本文の読み取り失敗・429・5xxは指数バックオフでリトライする。
    /// 400/401/403/404などのクライアントエラーはレスポンス本文付きで即座に失敗する。
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.config.base_url, path);
        let policy = &self.config.retry;
        let mut last_error = Error::TransientNetwork {
            attempts: 0,
            message: "no attempt made".to_string(),
        };

        for attempt in 0..policy.max_attempts() {
            let mut request = self.client.request(method.clone(), &url).query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!(%method, %url, attempt, "sending request");

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    last_error = Error::TransientNetwork {
                        attempts: attempt + 1,
                        message: e.to_string(),
                    };
                    self.wait_before_retry(attempt, None, &last_error).await;
                    continue;
                }
                Err(e) => return Err(Error::RequestFailed(e)),
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                // 本文の途中で切れた・読み取りがタイムアウトした場合も一時的な失敗として扱う
                let text = match response.text().await {
                    Ok(text) => text,
                    Err(e) if e.is_timeout() || e.is_body() || e.is_decode() => {
                        last_error = Error::TransientNetwork {
                            attempts: attempt + 1,
                            message: e.to_string(),
                        };
                        self.wait_before_retry(attempt, None, &last_error).await;
                        continue;
                    }
                    Err(e) => return Err(Error::RequestFailed(e)),
                };
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return Ok(serde_json::from_str(&text)?);
            }

            if is_retryable_status(status) {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| parse_retry_after(v, Utc::now()));
                let message = response.text().await.unwrap_or_default();

                last_error = if status == 429 {
                    Error::RateLimited {
                        attempts: attempt + 1,
                    }
                } else {
                    Error::TransientNetwork {
                        attempts: attempt + 1,
                        message: format!("{}: {}", status, message),
                    }
                };
                self.wait_before_retry(attempt, retry_after, &last_error)
                    .await;
                continue;
            }

            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(match status {
                401 | 403 => Error::AuthenticationFailed { status, message },
                _ => Error::ApiError { status, message },
            });
        }

        Err(last_error)
    }

    /// 次の試行があるときだけ待機する
    async fn wait_before_retry(&self, attempt: u32, retry_after: Option<Duration>, error: &Error) {
        let policy = &self.config.retry;
        if attempt + 1 >= policy.max_attempts() {
            return;
        }
        let delay = policy.delay_for(attempt + 1, retry_after);
        tracing::warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying after backoff"
        );
        tokio::time::sleep(delay).await;
    }

    pub(crate) async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.execute(Method::GET, path, query, None).await
    }

    pub(crate) async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.execute(Method::POST, path, &[], Some(body)).await
    }
}
