use std::path::Path;
use std::time::Instant;

use num_format::{Locale, ToFormattedString};

use behavior2vec::config::AppConfig;
use behavior2vec::embedding::{PretrainedVectors, TrainingConfig};
use behavior2vec::io::{read_corpus, read_token_vectors};
use behavior2vec::model::Behavior2Vec;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).expect("Config file not specified!");
    let config = AppConfig::new(config_path);

    let corpus_path = config.data.corpus_path;
    let model_path = if config.data.model_path.is_empty() {
        default_model_path(&corpus_path)
    } else {
        config.data.model_path
    };

    let start_time = Instant::now();
    println!("reading corpus from {}", &corpus_path);
    let corpus = read_corpus(&corpus_path)?;
    println!(
        "{} sessions, reading corpus:{} micros",
        corpus.len().to_formatted_string(&Locale::en),
        start_time.elapsed().as_micros()
    );

    let start_time = Instant::now();
    println!("reading token vectors from {}", &config.data.vectors_path);
    let vectors = read_token_vectors(&config.data.vectors_path)?;
    println!(
        "{} token vectors, reading vectors:{} micros",
        vectors.len().to_formatted_string(&Locale::en),
        start_time.elapsed().as_micros()
    );

    let vector_size = if config.model.vector_size > 0 {
        config.model.vector_size
    } else {
        vectors.values().next().map(Vec::len).unwrap_or(0)
    };
    let training_config = TrainingConfig {
        vector_size,
        window: config.model.window,
        min_count: config.model.min_count,
    };

    let start_time = Instant::now();
    println!("building embedding table and indices");
    let trainer = PretrainedVectors::new(vectors);
    let mut model = Behavior2Vec::new();
    model.train(&trainer, &corpus, &training_config)?;
    println!(
        "building table and indices:{} micros",
        start_time.elapsed().as_micros()
    );

    model.save(&model_path)?;
    println!("model saved to {}", &model_path);
    Ok(())
}

fn default_model_path(corpus_path: &str) -> String {
    let stem = Path::new(corpus_path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("corpus");
    format!("{}-b2v-model.bin", stem)
}
