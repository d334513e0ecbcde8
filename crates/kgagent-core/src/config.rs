//! Configuration management for kgagent.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`KGAGENT__` prefix, `__` separator)
//! 2. Config file (`kgagent.toml`, optional)
//! 3. Defaults
//!
//! The conventional `OPENAI_API_KEY` and `NEO4J_*` variables are honoured
//! when their prefixed counterparts are not set.

use serde::Deserialize;

use crate::error::KgError;

pub const ENV_PREFIX: &str = "KGAGENT";

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS (the UI dev server by default).
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

/// Neo4j connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// OpenAI-compatible API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub llm_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    /// Store episode embeddings and use vector search alongside full-text search.
    pub use_embeddings: bool,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            use_embeddings: true,
            timeout_secs: 120,
        }
    }
}

/// Document upload limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: String,
    /// Maximum accepted file size in bytes.
    pub max_file_size: u64,
    /// Lowercase file extensions accepted for upload.
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: "./uploads".to_string(),
            max_file_size: 10 * 1024 * 1024,
            allowed_types: vec!["pdf".to_string(), "txt".to_string()],
        }
    }
}

/// Ingestion pipeline tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Chunk window size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Maximum documents processed concurrently.
    pub max_concurrent_jobs: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4000,
            chunk_overlap: 200,
            max_concurrent_jobs: 4,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub neo4j: Neo4jConfig,
    pub openai: OpenAiConfig,
    pub upload: UploadConfig,
    pub ingest: IngestConfig,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            neo4j: Neo4jConfig::default(),
            openai: OpenAiConfig::default(),
            upload: UploadConfig::default(),
            ingest: IngestConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `<file_prefix>.toml` (if present) and the environment.
    pub fn load(file_prefix: &str) -> Result<Self, KgError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .with_list_parse_key("upload.allowed_types"),
            )
            .build()?;

        let mut app: AppConfig = cfg.try_deserialize()?;
        app.apply_conventional_env(|key| std::env::var(key).ok());
        app.normalize();
        Ok(app)
    }

    /// Fill settings from the unprefixed variables used by common tooling
    /// (`OPENAI_API_KEY`, `NEO4J_URI`, ...) unless the prefixed form is set.
    pub fn apply_conventional_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefixed = |section: &str, key: &str| {
            lookup(&format!("{ENV_PREFIX}__{section}__{key}")).is_some()
        };

        let pairs: [(&str, &str, &str, &mut String); 5] = [
            ("OPENAI", "API_KEY", "OPENAI_API_KEY", &mut self.openai.api_key),
            ("NEO4J", "URI", "NEO4J_URI", &mut self.neo4j.uri),
            ("NEO4J", "USER", "NEO4J_USERNAME", &mut self.neo4j.user),
            ("NEO4J", "PASSWORD", "NEO4J_PASSWORD", &mut self.neo4j.password),
            ("NEO4J", "DATABASE", "NEO4J_DATABASE", &mut self.neo4j.database),
        ];

        for (section, key, conventional, slot) in pairs {
            if prefixed(section, key) {
                continue;
            }
            if let Some(value) = lookup(conventional).filter(|v| !v.trim().is_empty()) {
                *slot = value;
            }
        }
    }

    fn normalize(&mut self) {
        self.upload.allowed_types = self
            .upload
            .allowed_types
            .iter()
            .map(|t| t.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self.openai.base_url = self.openai.base_url.trim_end_matches('/').to_string();
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), KgError> {
        if self.openai.api_key.trim().is_empty() {
            return Err(KgError::Config(
                "OpenAI API key is required (OPENAI_API_KEY or KGAGENT__OPENAI__API_KEY)"
                    .to_string(),
            ));
        }
        if self.neo4j.password.is_empty() {
            return Err(KgError::Config(
                "Neo4j password is required (NEO4J_PASSWORD or KGAGENT__NEO4J__PASSWORD)"
                    .to_string(),
            ));
        }
        if self.ingest.chunk_size == 0 || self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(KgError::Config(format!(
                "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }
        if self.ingest.max_concurrent_jobs == 0 {
            return Err(KgError::Config(
                "ingest.max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.upload.max_file_size == 0 {
            return Err(KgError::Config("upload.max_file_size must be positive".to_string()));
        }
        if self.upload.allowed_types.is_empty() {
            return Err(KgError::Config(
                "upload.allowed_types must list at least one extension".to_string(),
            ));
        }
        if self.openai.use_embeddings && self.openai.embedding_dimensions == 0 {
            return Err(KgError::Config(
                "openai.embedding_dimensions must be positive when embeddings are enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
