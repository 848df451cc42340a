//! Embeds a few health questions with the default model and prints their
//! pairwise cosine similarity.

use healthrag_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let temp_dir = tempfile::tempdir()?;
    let config = EmbedConfig::default_with_path(temp_dir.path()).with_batch_size(2);

    println!("Model: {}", config.model_name);
    let provider = FastEmbedProvider::create(config).await?;
    println!("Dimension: {}", provider.embedding_dimension());

    let texts = vec![
        "What are the symptoms of diabetes?".to_string(),
        "How to treat depression?".to_string(),
        "Blood pressure medication".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;

    for (i, a) in result.embeddings.iter().enumerate() {
        for (j, b) in result.embeddings.iter().enumerate().skip(i + 1) {
            let sim: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            println!("{:>40} <-> {:<40} {sim:.3}", texts[i], texts[j]);
        }
    }
    Ok(())
}
