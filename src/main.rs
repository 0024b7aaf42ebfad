use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use jira_extract::{
    Auth, CustomFieldConfig, DuckDBStore, ExtractOptions, Extractor, FieldConfigStore,
    IssueSink, JiraClient, JiraConfig, JsonStore, OutputFormat, RetryPolicy,
};

const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

/// JIRAのIssueと変更履歴をJSONまたはDuckDBに抽出する
#[derive(Parser, Debug)]
#[command(name = "jira-extract", version, about)]
struct Cli {
    /// JIRAサイトのURL
    #[arg(long, env = "JIRA_URL")]
    jira_url: String,

    /// ユーザー名（メールアドレス）
    #[arg(long, env = "JIRA_USERNAME")]
    username: String,

    /// APIトークン
    #[arg(long, env = "JIRA_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// 抽出対象のJQL
    #[arg(long)]
    jql: String,

    /// 出力形式 (json | duckdb | sqlite)
    #[arg(long, default_value = "json")]
    format: OutputFormat,

    /// JSONの出力先（省略時は標準出力）
    #[arg(long)]
    output: Option<PathBuf>,

    /// DuckDBの出力先
    #[arg(long, default_value = "jira_data.duckdb")]
    database: PathBuf,

    /// 取得件数の上限（0以下は無制限）
    #[arg(long, allow_negative_numbers = true)]
    max_results: Option<i64>,

    /// 変更履歴取得の同時実行数
    #[arg(long, default_value_t = 10)]
    max_workers: usize,

    /// 検索1ページあたりの件数
    #[arg(long, default_value_t = 100)]
    page_size: u32,

    /// JSONを整形せずに出力する
    #[arg(long)]
    no_pretty: bool,

    /// JSONをgzip圧縮する
    #[arg(long)]
    gzip: bool,

    /// 変更履歴を取得しない
    #[arg(long)]
    no_changelogs: bool,

    /// エピック名の補完を行わない
    #[arg(long)]
    no_epic_names: bool,

    /// カスタムフィールド設定ファイル
    #[arg(long)]
    field_config: Option<PathBuf>,

    /// リトライ回数
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// 1リクエストあたりのタイムアウト（秒）
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}

/// ログは標準エラーへ（標準出力のJSONを汚さない）
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = JiraConfig::new(
        cli.jira_url.clone(),
        Auth::Basic {
            username: cli.username.clone(),
            api_token: cli.api_token.clone(),
        },
    )
    .context("Invalid JIRA configuration")?
    .max_workers(cli.max_workers)
    .timeout(Duration::from_secs(cli.timeout_secs))
    .retry(RetryPolicy::new().max_retries(cli.max_retries));

    let client = JiraClient::new(config).context("Failed to create JIRA client")?;
    let fields = load_field_config(cli.field_config.as_ref()).await?;

    let options = ExtractOptions::new()
        .page_size(cli.page_size)
        .max_results(cli.max_results.filter(|n| *n > 0).map(|n| n as usize))
        .max_workers(cli.max_workers)
        .include_changelogs(!cli.no_changelogs)
        .resolve_epic_names(!cli.no_epic_names)
        .fields(fields);

    let mut sink: Box<dyn IssueSink> = match cli.format {
        OutputFormat::Json => {
            let store = match &cli.output {
                Some(path) => JsonStore::new(path),
                None => JsonStore::stdout(),
            };
            Box::new(store.with_pretty(!cli.no_pretty).with_compression(cli.gzip))
        }
        OutputFormat::DuckDb => {
            let mut store = DuckDBStore::new(&cli.database).with_context(|| {
                format!("Failed to open database {}", cli.database.display())
            })?;
            store
                .initialize()
                .await
                .context("Failed to initialize database schema")?;
            Box::new(store)
        }
    };

    let extractor = Extractor::new(client, options);
    let summary = extractor
        .run(&cli.jql, sink.as_mut())
        .await
        .context("Extraction failed")?;

    if !summary.changelog_failures.is_empty() {
        tracing::warn!(
            "Completed with {} changelog failures",
            summary.changelog_failures.len()
        );
    }

    Ok(())
}

/// 明示されたパスは必須として、なければ既定の場所から読み込む（ファイルがなければ既定値）
async fn load_field_config(path: Option<&PathBuf>) -> Result<CustomFieldConfig> {
    match path {
        Some(path) => FieldConfigStore::new(path)
            .load_required()
            .await
            .with_context(|| format!("Failed to load field config {}", path.display())),
        None => {
            let store = match FieldConfigStore::default_location() {
                Ok(store) => store,
                Err(e) => {
                    tracing::debug!("No config directory available: {}", e);
                    return Ok(CustomFieldConfig::default());
                }
            };
            store
                .load()
                .await
                .with_context(|| format!("Failed to load field config {}", store.path().display()))
        }
    }
}
