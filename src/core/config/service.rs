use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;

/// Typed application configuration, loaded from `config.yml`.
///
/// Every field has a default so the server runs without a config file;
/// a partial file overrides only the keys it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub ollama: OllamaSettings,
    pub chat: ChatSettings,
    pub rag: RagSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Origins allowed by the CORS layer. Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Chat model id as known to the model server.
    pub model: String,
    pub temperature: Option<f64>,
    /// Upper bound on prior log messages injected as conversational context.
    pub max_history_messages: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: "mistral".to_string(),
            temperature: None,
            max_history_messages: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Reference document (UTF-8 text), relative paths resolve against the project root.
    pub document: String,
    pub embedding_model: String,
    /// Passage window size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive passages in characters.
    pub chunk_overlap: usize,
    /// Number of passages retrieved per query.
    pub top_k: usize,
    /// Character budget for the excerpt block in the prompt.
    pub max_context_chars: usize,
    /// Passages per embedding request while building the index.
    pub embed_batch_size: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            document: "resources/kent_repertory.txt".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            chunk_size: 800,
            chunk_overlap: 100,
            top_k: 4,
            max_context_chars: 4000,
            embed_batch_size: 32,
        }
    }
}

impl RagSettings {
    pub fn document_path(&self, paths: &AppPaths) -> PathBuf {
        let path = PathBuf::from(&self.document);
        if path.is_absolute() {
            path
        } else {
            paths.project_root.join(path)
        }
    }
}

impl AppConfig {
    pub fn config_path(paths: &AppPaths) -> PathBuf {
        if let Ok(path) = env::var("HOMEO_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        paths.project_root.join("config.yml")
    }

    /// Load the config, falling back to defaults when the file is absent
    /// or unreadable.
    pub fn load(paths: &AppPaths) -> Self {
        let path = Self::config_path(paths);
        if !path.exists() {
            tracing::info!("No config.yml found; using defaults");
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => match serde_yaml::from_str::<AppConfig>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!(
                        "Failed to parse {}: {}; using defaults",
                        path.display(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("Failed to read {}: {}; using defaults", path.display(), err);
                Self::default()
            }
        }
    }
}
