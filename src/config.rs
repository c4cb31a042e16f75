use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Top-level pipeline configuration, one section per stage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates requested from each backend
    pub top_n: usize,
    /// Per-call timeout for each backend search
    pub search_timeout_ms: u64,
    /// BM25 search endpoint (Elasticsearch-compatible)
    pub lexical_url: String,
    /// Index queried on the lexical backend
    pub lexical_index: String,
    /// Qdrant endpoint for dense search
    pub vector_url: String,
    /// Qdrant collection holding passage embeddings
    pub vector_collection: String,
    /// Ollama endpoint used to embed the query
    pub embedding_url: String,
    /// Embedding model name
    pub embedding_model: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_n: 20,
            search_timeout_ms: 3_000,
            lexical_url: "http://127.0.0.1:9200".to_string(),
            lexical_index: "documents".to_string(),
            vector_url: "http://127.0.0.1:6334".to_string(),
            vector_collection: "documents".to_string(),
            embedding_url: "http://127.0.0.1:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Reciprocal rank fusion constant; dampens rank 1 vs rank 2
    pub k: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { k: 60.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Fused candidates fed to the cross-encoder
    pub candidate_pool: usize,
    /// Passages kept after reranking
    pub top_k: usize,
    /// Cross-encoder scoring endpoint
    pub endpoint: String,
    /// Timeout for the scoring call
    pub timeout_ms: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            candidate_pool: 20,
            top_k: 5,
            endpoint: "http://127.0.0.1:8580/rerank".to_string(),
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget for the assembled context
    pub max_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_tokens: 2_500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Ollama endpoint
    pub base_url: String,
    /// Model used for grounded generation
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    /// Output token cap
    pub max_output_tokens: usize,
    /// Timeout for the generation call
    pub timeout_ms: u64,
    /// Sentences kept by the extractive fallback
    pub extractive_sentences: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "qwen2.5:7b-instruct".to_string(),
            temperature: 0.1,
            top_p: 0.9,
            max_output_tokens: 400,
            timeout_ms: 8_000,
            extractive_sentences: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Wall-clock deadline for the whole request
    pub deadline_ms: u64,
    pub min_question_chars: usize,
    pub max_question_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 10_000,
            min_question_chars: 5,
            max_question_chars: 500,
        }
    }
}

impl RagConfig {
    /// Load configuration from the default path, creating a default
    /// file if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = RagConfig::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("Failed to read config file")?;

        let config: RagConfig =
            toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".localrag").join("config.toml"))
    }
}
