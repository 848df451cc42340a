//! Query-time retrieval over a loaded index.

use healthrag_embed::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::chunk::ChunkMetadata;
use crate::error::{Result, RetrieverError};
use crate::storage::{ArtifactPaths, IndexedCorpus, load_artifacts};

pub const INDEX_KIND: &str = "flat-l2";

/// One retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Squared L2 distance to the query; lower is closer
    pub score: f32,
    /// Row of the chunk in the index
    #[serde(default)]
    pub row: usize,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub loaded: bool,
    pub total_vectors: usize,
    pub embedding_dim: usize,
    pub model_identity: String,
    pub index_kind: String,
}

/// Embeds queries and searches a frozen, shared corpus.
///
/// The engine starts empty; [`load`](Self::load) reads both artifacts and
/// only installs them once they validate, so a failed load leaves the
/// previous state in place. A loaded corpus is never mutated and can be
/// searched from many tasks at once.
pub struct RetrievalEngine {
    provider: Arc<dyn EmbeddingProvider>,
    corpus: Option<Arc<IndexedCorpus>>,
}

impl RetrievalEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            corpus: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.corpus.is_some()
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub async fn load(&mut self, paths: &ArtifactPaths) -> Result<()> {
        let loaded = load_artifacts(paths).await?;
        let identity = self.provider.model_identity();
        if let Some(recorded) = &loaded.model_identity {
            if recorded != identity {
                return Err(RetrieverError::mismatch("model_identity", identity, recorded));
            }
        }
        self.install(loaded.corpus)?;
        info!(
            "Loaded index with {} vectors from {}",
            self.corpus.as_ref().map_or(0, |c| c.len()),
            paths.index_path.display()
        );
        Ok(())
    }

    /// Install an in-memory corpus.
    pub fn install(&mut self, corpus: IndexedCorpus) -> Result<()> {
        let dim = self.provider.embedding_dimension();
        if corpus.dimension() != dim {
            return Err(RetrieverError::mismatch("embedding_dim", dim, corpus.dimension()));
        }
        self.corpus = Some(Arc::new(corpus));
        Ok(())
    }

    /// Return at most `k` hits ordered by ascending distance.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let corpus = self.corpus.as_ref().ok_or_else(|| {
            RetrieverError::NotReady("no index loaded; run `healthrag index` first".to_string())
        })?;

        let query_vector = self.provider.embed_text(query).await?;
        let ranked = corpus.index().search(&query_vector, k)?;
        debug!("Query matched {} of {} rows", ranked.len(), corpus.len());

        Ok(ranked
            .into_iter()
            .filter_map(|(score, row)| {
                corpus.metadata().get(row).map(|metadata| SearchHit {
                    score,
                    row,
                    metadata: metadata.clone(),
                })
            })
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            loaded: self.corpus.is_some(),
            total_vectors: self.corpus.as_ref().map_or(0, |c| c.len()),
            embedding_dim: self
                .corpus
                .as_ref()
                .map_or(self.provider.embedding_dimension(), |c| c.dimension()),
            model_identity: self.provider.model_identity().to_string(),
            index_kind: INDEX_KIND.to_string(),
        }
    }
}
