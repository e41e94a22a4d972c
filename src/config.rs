use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docvault server.
#[derive(Debug)]
pub struct Config {
    /// Base URL of the Gemini-style generation/embedding API.
    pub gemini_url: String,
    /// API key passed to the oracle on every request.
    pub gemini_api_key: String,
    /// Model identifier used for text and vision generation.
    pub gemini_generation_model: String,
    /// Model identifier used for embeddings.
    pub gemini_embedding_model: String,
    /// Base URL of the Chroma instance that stores document vectors.
    pub chroma_url: String,
    /// Chroma tenant identifier.
    pub chroma_tenant: String,
    /// Chroma database name.
    pub chroma_database: String,
    /// Chroma collection used for document vectors.
    pub chroma_collection: String,
    /// Directory where uploaded files are persisted.
    pub storage_root: PathBuf,
    /// Path of the SQLite database holding document records.
    pub database_path: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Maximum number of concurrently in-flight rerank scoring calls.
    pub rerank_concurrency: usize,
    /// Default number of nearest neighbors requested per search.
    pub search_default_top_k: usize,
    /// Upper bound applied to client-supplied `topK` values.
    pub search_max_top_k: usize,
    /// Upper bound applied to client-supplied `pageSize` values.
    pub documents_max_page_size: i64,
    /// Two rerank scores within this distance of each other count as tied.
    pub tie_break_epsilon: f64,
    /// Minimum shared-maximum score required before the tie-break call fires.
    pub tie_break_min_score: f64,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            gemini_url: load_env_optional("GEMINI_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            gemini_api_key: load_env("GEMINI_API_KEY")?,
            gemini_generation_model: load_env_optional("GEMINI_GENERATION_MODEL")
                .unwrap_or_else(|| "gemini-2.5-flash-lite".to_string()),
            gemini_embedding_model: load_env_optional("GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "gemini-embedding-001".to_string()),
            chroma_url: load_env_optional("CHROMA_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            chroma_tenant: load_env_optional("CHROMA_TENANT")
                .unwrap_or_else(|| "default_tenant".to_string()),
            chroma_database: load_env_optional("CHROMA_DATABASE")
                .unwrap_or_else(|| "default_db".to_string()),
            chroma_collection: load_env_optional("CHROMA_COLLECTION")
                .unwrap_or_else(|| "documents".to_string()),
            storage_root: load_env_optional("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/files")),
            database_path: load_env_optional("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/docvault.db")),
            server_port: parse_optional("SERVER_PORT")?,
            rerank_concurrency: parse_optional("RERANK_CONCURRENCY")?.unwrap_or(10),
            search_default_top_k: parse_optional("SEARCH_DEFAULT_TOP_K")?.unwrap_or(50),
            search_max_top_k: parse_optional("SEARCH_MAX_TOP_K")?.unwrap_or(100),
            documents_max_page_size: parse_optional("DOCUMENTS_MAX_PAGE_SIZE")?.unwrap_or(100),
            tie_break_epsilon: parse_optional("TIE_BREAK_EPSILON")?.unwrap_or(1e-4),
            tie_break_min_score: parse_optional("TIE_BREAK_MIN_SCORE")?.unwrap_or(0.0),
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        gemini_url = %config.gemini_url,
        chroma_url = %config.chroma_url,
        collection = %config.chroma_collection,
        server_port = ?config.server_port,
        rerank_concurrency = config.rerank_concurrency,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
