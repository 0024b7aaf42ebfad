pub mod adf;
pub mod changelog_parser;
pub mod client;
pub mod config_store;
pub mod coordinator;
pub mod duckdb_store;
pub mod error;
pub mod extractor;
pub mod history;
pub mod json_store;
pub mod models;
pub mod normalizer;
pub mod paginator;
pub mod persistence;
pub mod retry;
pub mod summary;

pub use client::{Auth, JiraClient, JiraConfig};
pub use error::Error;
pub use models::*;

// Transport re-exports
pub use retry::RetryPolicy;
pub use paginator::SearchPaginator;

// Normalization re-exports
pub use config_store::{CustomFieldConfig, FieldConfigStore};
pub use normalizer::{FieldNormalizer, FieldResolution, NormalizedIssue};
pub use changelog_parser::ChangelogParser;

// Changelog re-exports
pub use history::ChangelogSource;
pub use coordinator::{ChangelogBatch, ChangelogCoordinator, ChangelogFailure};

// Sink re-exports
pub use persistence::{IssueSink, OutputFormat};
pub use json_store::{JsonStore, JsonTarget};
pub use duckdb_store::DuckDBStore;

// Pipeline re-exports
pub use extractor::{ExtractOptions, Extractor};
pub use summary::{ExtractionSummary, FieldUsage};
