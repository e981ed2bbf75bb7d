use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::auth::AccessGate;
use crate::chat::ChatEngine;
use crate::core::config::{AppConfig, AppPaths};
use crate::llm::{LlmProvider, OllamaProvider};
use crate::rag::{self, VectorIndex};
use crate::store::{ChatLogStore, DoctorStore};

/// Global application state shared across all routes.
///
/// Holds the doctor access gate, the chat log store and the retrieval
/// pipeline, all backed by SQLite files under the data directory.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub gate: AccessGate,
    pub chatlog: ChatLogStore,
    pub engine: Arc<ChatEngine>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Loading configuration
    /// 2. Opening the doctor and chat log databases
    /// 3. Connecting to the model server
    /// 4. Loading or rebuilding the passage index from the reference document
    ///
    /// Fails when a database cannot be opened or when the index needs a
    /// rebuild and the reference document or embedding model is unavailable.
    pub async fn initialize(paths: Arc<AppPaths>) -> anyhow::Result<Arc<Self>> {
        let config = AppConfig::load(&paths);

        let doctors = DoctorStore::new(paths.doctors_db_path.clone())
            .await
            .context("failed to open doctor database")?;
        let chatlog = ChatLogStore::new(paths.chatlog_db_path.clone())
            .await
            .context("failed to open chat log database")?;

        let provider: Arc<dyn LlmProvider> =
            Arc::new(OllamaProvider::new(config.ollama.base_url.clone()));

        match provider.health_check().await {
            Ok(true) => tracing::info!("Model server reachable at {}", config.ollama.base_url),
            Ok(false) => tracing::warn!(
                "Model server at {} is not reporting healthy; chat requests may fail",
                config.ollama.base_url
            ),
            Err(err) => tracing::warn!("Model server health check failed: {}", err),
        }

        let index = Arc::new(
            VectorIndex::open(paths.index_db_path.clone())
                .await
                .context("failed to open passage index")?,
        );

        let document = config.rag.document_path(&paths);
        let report = rag::build_index(provider.as_ref(), &index, &config.rag, &document)
            .await
            .context("failed to prepare the passage index")?;
        if report.reused {
            tracing::info!("Passage index up to date ({} passages)", report.passages);
        } else {
            tracing::info!("Passage index rebuilt ({} passages)", report.passages);
        }

        let engine = Arc::new(ChatEngine::new(provider, index, &config));
        let gate = AccessGate::new(doctors);

        Ok(Arc::new(AppState {
            paths,
            config,
            gate,
            chatlog,
            engine,
            started_at: Utc::now(),
        }))
    }
}
