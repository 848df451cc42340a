//! Builds a small index with the hashing provider (no model download),
//! searches it, then verifies an answer against the retrieved sources.

use anyhow::Result;
use healthrag_embed::HashingEmbedProvider;
use healthrag_retriever::{
    chunk::{Chunk, ChunkMetadata},
    config::RetrieverConfig,
    context::RetrieverContext,
    storage::ArtifactPaths,
    verification::render_report,
};
use std::sync::Arc;
use tempfile::tempdir;

const DOCUMENTS: [(&str, &str); 4] = [
    (
        "who/anemia.txt",
        "Iron deficiency anemia develops when the body lacks enough iron to produce hemoglobin. \
         Common symptoms include fatigue, pale skin and shortness of breath.",
    ),
    (
        "who/diabetes.txt",
        "Type 2 diabetes is managed with diet, regular exercise and medication such as metformin.",
    ),
    (
        "NIH/hypertension.txt",
        "High blood pressure rarely causes symptoms but raises the risk of stroke and heart disease.",
    ),
    (
        "NIH/influenza.txt",
        "Annual influenza vaccination is recommended for everyone older than six months.",
    ),
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let dir = tempdir()?;
    let root = dir.path();

    let mut chunks = Vec::new();
    for (i, (source, text)) in DOCUMENTS.iter().enumerate() {
        let path = root.join(source);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, text).await?;
        chunks.push(Chunk::new(
            *text,
            ChunkMetadata::new(*source, 0, 1).with_extra("id", format!("doc-{i}")),
        ));
    }

    let config = RetrieverConfig::default()
        .with_batch_size(1)
        .with_checkpoint_dir(root.join("checkpoint"))
        .with_artifacts(ArtifactPaths::new(
            root.join("vector_index.idx"),
            root.join("vector_metadata.jsonl"),
        ))
        .with_source_root(root);
    let context = RetrieverContext::with_provider(config, Arc::new(HashingEmbedProvider::new(256)?))?;

    let report = context.pipeline()?.run(&chunks, true).await?;
    println!(
        "Indexed {} vectors in {} batches ({:.2}s)",
        report.vectors_indexed, report.batches_processed, report.elapsed_secs
    );

    let engine = context.retrieval_engine().await?;
    let query = "What are the symptoms of iron deficiency anemia?";
    let hits = engine.search(query, 2).await?;
    for hit in &hits {
        println!("{:.4}  {}", hit.score, hit.metadata.source);
    }

    let answer = "Iron deficiency anemia commonly causes fatigue, pale skin and shortness of breath.";
    let verification = context.verifier()?.verify_response(query, answer, &hits).await;
    print!("{}", render_report(&verification));
    Ok(())
}
