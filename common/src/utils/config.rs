use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Memory,
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Local
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_storage_kind")]
    pub storage: StorageKind,

    #[serde(default = "default_generation_model")]
    pub generation_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    /// OpenAI-compatible rerank endpoint. Reranking degrades to identity
    /// order when unset.
    #[serde(default)]
    pub rerank_endpoint: Option<String>,
    #[serde(default)]
    pub rerank_api_key: Option<String>,

    #[serde(default)]
    pub youtube_api_key: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub semantic_scholar_api_key: Option<String>,

    #[serde(default = "default_true")]
    pub unified_pipeline_enabled: bool,
    #[serde(default = "default_true")]
    pub entity_fetch_external_metadata: bool,
    #[serde(default = "default_pipeline_version")]
    pub pipeline_version: String,
    #[serde(default = "default_max_new_tags")]
    pub unified_pipeline_max_new_tags: usize,
    #[serde(default = "default_max_topics")]
    pub entity_max_topics_per_content: usize,
    #[serde(default = "default_min_confidence")]
    pub entity_min_confidence: f32,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Accepted caller API keys, comma separated in the environment.
    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_true() -> bool {
    true
}

fn default_pipeline_version() -> String {
    "1.0.0".to_string()
}

fn default_max_new_tags() -> usize {
    3
}

fn default_max_topics() -> usize {
    7
}

fn default_min_confidence() -> f32 {
    0.6
}

fn default_worker_concurrency() -> usize {
    2
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::default()
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("api_keys"),
        )
        .build()?;

    config.try_deserialize()
}

#[cfg(any(test, feature = "test-utils"))]
impl AppConfig {
    /// Config suitable for in-memory tests; no external services reachable.
    pub fn for_tests() -> Self {
        Self {
            openai_api_key: "test-key".into(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            data_dir: "./data".into(),
            http_port: 0,
            openai_base_url: default_base_url(),
            storage: StorageKind::Memory,
            generation_model: default_generation_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: 3,
            rerank_endpoint: None,
            rerank_api_key: None,
            youtube_api_key: None,
            github_token: None,
            semantic_scholar_api_key: None,
            unified_pipeline_enabled: true,
            entity_fetch_external_metadata: false,
            pipeline_version: default_pipeline_version(),
            unified_pipeline_max_new_tags: default_max_new_tags(),
            entity_max_topics_per_content: default_max_topics(),
            entity_min_confidence: default_min_confidence(),
            worker_concurrency: 1,
            api_keys: vec!["test-api-key".into()],
            webhook_url: None,
            webhook_secret: None,
        }
    }
}
