//! Retrieval side of the pipeline.
//!
//! - `loader`: reads and normalizes the reference text
//! - `chunker`: cuts it into overlapping passages
//! - `index`: persists passage embeddings and runs similarity search
//! - `build_index`: the load-or-build step run once at startup

pub mod chunker;
pub mod index;
pub mod loader;

pub use chunker::Chunker;
pub use index::{Passage, ScoredPassage, VectorIndex};

use std::path::Path;

use uuid::Uuid;

use self::index::{META_DOCUMENT_SHA256, META_EMBEDDING_MODEL};

use crate::core::config::RagSettings;
use crate::core::errors::ApiError;
use crate::llm::provider::LlmProvider;

/// What the startup index step did.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// True when a persisted index matched the document and model and was
    /// reused without re-embedding.
    pub reused: bool,
    pub passages: usize,
}

/// Load the persisted index when its metadata still matches the source
/// document and embedding model; otherwise rebuild it from scratch.
pub async fn build_index(
    provider: &dyn LlmProvider,
    index: &VectorIndex,
    settings: &RagSettings,
    document_path: &Path,
) -> Result<BuildReport, ApiError> {
    let document = loader::load_reference_text(document_path)?;

    let stored_model = index.get_meta(META_EMBEDDING_MODEL).await?;
    let stored_fingerprint = index.get_meta(META_DOCUMENT_SHA256).await?;
    let count = index.count().await?;

    if count > 0
        && stored_model.as_deref() == Some(settings.embedding_model.as_str())
        && stored_fingerprint.as_deref() == Some(document.fingerprint.as_str())
    {
        tracing::info!("Reusing persisted index ({} passages)", count);
        return Ok(BuildReport {
            reused: true,
            passages: count,
        });
    }

    tracing::info!(
        "Building index for {} with model {}",
        document_path.display(),
        settings.embedding_model
    );
    index
        .reset(&settings.embedding_model, &document.fingerprint)
        .await?;

    let chunker = Chunker::new(settings.chunk_size, settings.chunk_overlap);
    let chunks = chunker.split(&document.text, &document.source);
    let total = chunks.len();

    let mut indexed = 0usize;
    for batch in chunks.chunks(settings.embed_batch_size.max(1)) {
        let inputs: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = provider.embed(&inputs, &settings.embedding_model).await?;

        let items = batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                (
                    Passage {
                        id: Uuid::new_v4().to_string(),
                        seq: chunk.seq as i64,
                        content: chunk.text.clone(),
                        source: chunk.source.clone(),
                        start_offset: chunk.start_offset as i64,
                    },
                    embedding,
                )
            })
            .collect();

        index.insert_batch(items).await?;
        indexed += batch.len();
        tracing::debug!("Indexed {}/{} passages", indexed, total);
    }

    tracing::info!("Index built: {} passages", indexed);
    Ok(BuildReport {
        reused: false,
        passages: indexed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::llm::types::ChatRequest;

    /// Deterministic embedder that counts how many texts it was asked to
    /// embed, so tests can tell a rebuild from a reuse.
    struct CountingEmbedder {
        embedded: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LlmProvider for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn chat(&self, _request: ChatRequest, _model_id: &str) -> Result<String, ApiError> {
            Ok(String::new())
        }

        async fn embed(
            &self,
            inputs: &[String],
            _model_id: &str,
        ) -> Result<Vec<Vec<f32>>, ApiError> {
            self.embedded.fetch_add(inputs.len(), Ordering::SeqCst);
            Ok(inputs
                .iter()
                .map(|text| vec![text.len() as f32, 1.0, 0.0])
                .collect())
        }
    }

    fn write_document(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("repertory.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", body).unwrap();
        path
    }

    fn small_settings() -> RagSettings {
        RagSettings {
            chunk_size: 40,
            chunk_overlap: 8,
            embed_batch_size: 2,
            ..RagSettings::default()
        }
    }

    async fn temp_index() -> VectorIndex {
        let tmp = std::env::temp_dir().join(format!(
            "homeo-build-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        VectorIndex::open(tmp).await.unwrap()
    }

    #[tokio::test]
    async fn builds_then_reuses_then_rebuilds_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_document(
            dir.path(),
            "Nux vomica suits irritable patients. Chamomilla suits angry children. Pulsatilla weeps and wants air.",
        );
        let index = temp_index().await;
        let settings = small_settings();
        let embedded = Arc::new(AtomicUsize::new(0));
        let provider = CountingEmbedder {
            embedded: embedded.clone(),
        };

        let report = build_index(&provider, &index, &settings, &doc).await.unwrap();
        assert!(!report.reused);
        assert!(report.passages > 1);
        assert_eq!(embedded.load(Ordering::SeqCst), report.passages);
        assert_eq!(index.count().await.unwrap(), report.passages);

        // Same document, same model: nothing is re-embedded.
        let again = build_index(&provider, &index, &settings, &doc).await.unwrap();
        assert!(again.reused);
        assert_eq!(again.passages, report.passages);
        assert_eq!(embedded.load(Ordering::SeqCst), report.passages);

        // A changed document invalidates the fingerprint and forces a rebuild.
        let doc = write_document(
            dir.path(),
            "Completely revised edition. Sulphur for burning soles. Lycopodium for late afternoon agg.",
        );
        let rebuilt = build_index(&provider, &index, &settings, &doc).await.unwrap();
        assert!(!rebuilt.reused);
        assert!(embedded.load(Ordering::SeqCst) > report.passages);
    }

    #[tokio::test]
    async fn a_different_model_forces_a_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_document(dir.path(), "Arnica for bruises. Rhus tox for stiffness.");
        let index = temp_index().await;
        let embedded = Arc::new(AtomicUsize::new(0));
        let provider = CountingEmbedder {
            embedded: embedded.clone(),
        };

        let mut settings = small_settings();
        build_index(&provider, &index, &settings, &doc).await.unwrap();
        let after_first = embedded.load(Ordering::SeqCst);

        settings.embedding_model = "some-other-embedder".to_string();
        let report = build_index(&provider, &index, &settings, &doc).await.unwrap();
        assert!(!report.reused);
        assert!(embedded.load(Ordering::SeqCst) > after_first);
        assert_eq!(
            index.get_meta(META_EMBEDDING_MODEL).await.unwrap().as_deref(),
            Some("some-other-embedder")
        );
    }

    #[tokio::test]
    async fn missing_document_fails() {
        let index = temp_index().await;
        let provider = CountingEmbedder {
            embedded: Arc::new(AtomicUsize::new(0)),
        };

        let err = build_index(
            &provider,
            &index,
            &small_settings(),
            Path::new("/no/such/document.txt"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
