use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_GENERATION_MODEL: &str = "models/gemini-flash-latest";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11411";
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

const PROJECT_CONFIG_FILE: &str = "docqa.toml";

/// Runtime configuration, built once at startup and handed to each component.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// `docqa.toml` in the working directory.
    pub fn project_path() -> PathBuf {
        PathBuf::from(PROJECT_CONFIG_FILE)
    }

    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("docqa").join("config.toml"))
    }

    /// The file `load` would read, if any.
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let project = Self::project_path();
        if project.exists() {
            return Some(project);
        }
        Self::global_path().filter(|p| p.exists())
    }

    /// Load from an explicit path, the project file, the global file, or defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match Self::resolve_path(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let index = &self.index;
        if index.chunk_overlap == 0 || index.chunk_overlap >= index.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunk_overlap must satisfy 0 < overlap < chunk_size (got overlap {} with chunk_size {})",
                index.chunk_overlap, index.chunk_size
            )));
        }
        if index.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if index.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.generation.max_context_chars < index.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "max_context_chars must be at least chunk_size (got {} with chunk_size {})",
                self.generation.max_context_chars, index.chunk_size
            )));
        }
        if self.retrieval.k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval k must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "temperature must be between 0.0 and 2.0 (got {})",
                self.generation.temperature
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub recursive: bool,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("documents")
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            recursive: false,
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_inter_batch_delay")]
    pub inter_batch_delay_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("agri_db")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

// One chunk per call keeps the free-tier per-minute quota
fn default_batch_size() -> usize {
    1
}

fn default_inter_batch_delay() -> u64 {
    12
}

fn default_max_attempts() -> u32 {
    15
}

fn default_retry_cooldown() -> u64 {
    180
}

impl IndexConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_secs(self.inter_batch_delay_secs)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            inter_batch_delay_secs: default_inter_batch_delay(),
            max_attempts: default_max_attempts(),
            retry_cooldown_secs: default_retry_cooldown(),
        }
    }
}

/// Which remote service produces embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Google Generative Language `batchEmbedContents`
    #[default]
    Gemini,
    /// Text-embeddings server exposing `POST /embed`
    Http,
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Gemini => write!(f, "gemini"),
            EmbeddingProvider::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Base URL; defaults depend on the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_timeout() -> u64 {
    60
}

impl EmbeddingConfig {
    pub fn base_url(&self) -> &str {
        match (&self.url, self.provider) {
            (Some(url), _) => url,
            (None, EmbeddingProvider::Gemini) => DEFAULT_GEMINI_URL,
            (None, EmbeddingProvider::Http) => DEFAULT_EMBEDDING_URL,
        }
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref())
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            url: None,
            timeout_secs: default_embedding_timeout(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_generation_url")]
    pub url: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on the context block, in characters.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_generation_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_generation_url() -> String {
    DEFAULT_GEMINI_URL.to_string()
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_max_context_chars() -> usize {
    12_000
}

impl GenerationConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref())
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            url: default_generation_url(),
            temperature: 0.0,
            timeout_secs: default_generation_timeout(),
            max_context_chars: default_max_context_chars(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    let non_blank = |k: &str| {
        let k = k.trim();
        (!k.is_empty()).then(|| k.to_string())
    };
    configured
        .and_then(non_blank)
        .or_else(|| std::env::var(API_KEY_ENV).ok().and_then(|k| non_blank(&k)))
}
