pub mod indexing_pipeline;
pub mod search;

pub use indexing_pipeline::{
    BatchIndexingPipeline, IndexingConfig, InterruptHandle, PipelineReport,
};
pub use search::{IndexStats, RetrievalEngine, SearchHit};
