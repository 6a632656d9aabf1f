use indicatif::ProgressBar;

use behavior2vec::config::AppConfig;
use behavior2vec::io::{read_queries, write_neighbor_lines};
use behavior2vec::knn::Neighbor;
use behavior2vec::model::Behavior2Vec;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).expect("Config file not specified!");
    let config = AppConfig::new(config_path);

    let model = Behavior2Vec::load(&config.data.model_path)?;
    let queries = read_queries(&config.query.test_path)?;
    let num_neighbors_k = config.query.num_neighbors_k;

    let pb = ProgressBar::new(queries.len() as u64);
    let mut results: Vec<Vec<Neighbor>> = Vec::with_capacity(queries.len());
    for query_item in &queries {
        pb.inc(1);
        match model.most_similar_item(query_item, num_neighbors_k, true) {
            Ok(neighbors) => results.push(neighbors),
            Err(error) => {
                // one failing query must not abort the batch
                eprintln!("query '{}' failed: {}", query_item, error);
                results.push(Vec::new());
            }
        }
    }
    pb.finish();

    write_neighbor_lines(&config.query.output_path, &results)?;
    println!(
        "wrote {} result lines to {}",
        results.len(),
        &config.query.output_path
    );
    Ok(())
}
