use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::time::Instant;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::embedding::{
    format_token, split_token, BehaviorEmbeddingTable, EmbeddingTrainer, TrainingConfig,
};
use crate::error::{B2vError, Result};
use crate::io::{Session, Token};
use crate::knn::{KdIndex, Neighbor};

/// Everything a trained model owns: the trained token mapping, the imputed
/// per-behavior table and the nearest-neighbor indices derived from it.
/// Built as a whole and swapped in as a whole, so readers never observe a
/// partially built state.
struct TrainedState {
    token_vectors: HashMap<Token, Vec<f32>>,
    table: BehaviorEmbeddingTable,
    behavior_indices: HashMap<String, KdIndex>,
    item_index: KdIndex,
}

/// On-disk form of a trained model. Only the snapshot data is persisted; the
/// indices are rebuilt deterministically on load, which keeps the round-trip
/// contract: a loaded model answers every query like the saved one.
#[derive(Serialize, Deserialize)]
struct ModelBlob {
    token_vectors: HashMap<Token, Vec<f32>>,
    table: BehaviorEmbeddingTable,
}

impl TrainedState {
    fn build(token_vectors: HashMap<Token, Vec<f32>>) -> Result<Self> {
        let mut table = BehaviorEmbeddingTable::build(&token_vectors)?;
        table.impute_missing()?;
        Self::from_table(token_vectors, table)
    }

    fn from_table(
        token_vectors: HashMap<Token, Vec<f32>>,
        table: BehaviorEmbeddingTable,
    ) -> Result<Self> {
        let items = table.items();

        let mut behavior_indices: HashMap<String, KdIndex> =
            HashMap::with_capacity(table.behaviors().len());
        for behavior in table.behaviors() {
            let mut vectors = Vec::with_capacity(items.len());
            for item_id in &items {
                vectors.push(table.vector_of(behavior, item_id)?.to_vec());
            }
            let index = KdIndex::build(items.clone(), vectors)?;
            behavior_indices.insert(behavior.clone(), index);
        }

        let mut composite_vectors = Vec::with_capacity(items.len());
        for item_id in &items {
            composite_vectors.push(table.composite_vector(item_id)?);
        }
        let item_index = KdIndex::build(items, composite_vectors)?;

        Ok(TrainedState {
            token_vectors,
            table,
            behavior_indices,
            item_index,
        })
    }
}

/// The behavior2vec model. Starts untrained; `train` (or `from_token_vectors`
/// or `load`) moves it into the trained phase, after which all queries are
/// read-only and safe to share across threads.
#[derive(Default)]
pub struct Behavior2Vec {
    trained: Option<TrainedState>,
}

impl Behavior2Vec {
    pub fn new() -> Self {
        Behavior2Vec { trained: None }
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Obtains token vectors from the external trainer and builds the table
    /// and indices. On failure the previous trained state, if any, stays in
    /// place; on success the fresh state replaces it atomically.
    pub fn train<T: EmbeddingTrainer>(
        &mut self,
        trainer: &T,
        corpus: &[Session],
        config: &TrainingConfig,
    ) -> Result<()> {
        let token_vectors = trainer.train(corpus, config)?;
        let state = TrainedState::build(token_vectors)?;
        self.trained = Some(state);
        Ok(())
    }

    /// Builds a trained model directly from an existing token-vector mapping.
    pub fn from_token_vectors(token_vectors: HashMap<Token, Vec<f32>>) -> Result<Self> {
        let state = TrainedState::build(token_vectors)?;
        Ok(Behavior2Vec {
            trained: Some(state),
        })
    }

    fn trained_state(&self) -> Result<&TrainedState> {
        self.trained.as_ref().ok_or(B2vError::NotTrained)
    }

    /// Behavior types in canonical order. Empty slice before training.
    pub fn behaviors(&self) -> &[String] {
        match &self.trained {
            Some(state) => state.table.behaviors(),
            None => &[],
        }
    }

    /// The `k` behavior instances most similar to `query_token`.
    ///
    /// With a target behavior the search is restricted to that behavior's
    /// index. Without one, candidates from every behavior index are pooled
    /// and fully re-sorted by (distance, label), so results are reproducible
    /// across runs. Self-exclusion drops the entry naming the query itself;
    /// otherwise the farthest of the k+1 candidates is dropped.
    pub fn most_similar_behavior(
        &self,
        query_token: &str,
        target_behavior: Option<&str>,
        k: usize,
        exclude_self: bool,
    ) -> Result<Vec<Neighbor>> {
        let state = self.trained_state()?;
        let query_vector = state
            .token_vectors
            .get(query_token)
            .ok_or_else(|| B2vError::UnknownToken(query_token.to_string()))?;
        let (_, query_item) = split_token(query_token)?;

        match target_behavior {
            Some(behavior) => {
                let index = state
                    .behavior_indices
                    .get(behavior)
                    .ok_or_else(|| B2vError::UnknownToken(behavior.to_string()))?;
                let mut neighbors = index.query(query_vector, k + 1)?;
                if exclude_self {
                    neighbors.retain(|neighbor| neighbor.label != query_item);
                }
                neighbors.truncate(k);
                for neighbor in neighbors.iter_mut() {
                    neighbor.label = format_token(behavior, &neighbor.label);
                }
                Ok(neighbors)
            }
            None => {
                let mut pooled: Vec<Neighbor> = Vec::new();
                for behavior in state.table.behaviors() {
                    let index = &state.behavior_indices[behavior];
                    for mut neighbor in index.query(query_vector, k + 1)? {
                        neighbor.label = format_token(behavior, &neighbor.label);
                        pooled.push(neighbor);
                    }
                }
                if exclude_self {
                    pooled.retain(|neighbor| neighbor.label != query_token);
                }
                pooled.sort();
                pooled.truncate(k);
                Ok(pooled)
            }
        }
    }

    /// The `k` items whose composite vectors are closest to `query_item`'s.
    pub fn most_similar_item(
        &self,
        query_item: &str,
        k: usize,
        exclude_self: bool,
    ) -> Result<Vec<Neighbor>> {
        let state = self.trained_state()?;
        let composite = state.table.composite_vector(query_item)?;
        let mut neighbors = state.item_index.query(&composite, k + 1)?;
        if exclude_self {
            neighbors.retain(|neighbor| neighbor.label != query_item);
        }
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// Serializes the trained snapshot to an opaque blob.
    pub fn save(&self, model_path: &str) -> Result<()> {
        let state = self.trained_state()?;
        let blob = ModelBlob {
            token_vectors: state.token_vectors.clone(),
            table: state.table.clone(),
        };
        let file =
            File::create(model_path).map_err(|error| B2vError::Persistence(error.to_string()))?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, &blob)
            .map_err(|error| B2vError::Persistence(error.to_string()))
    }

    /// Loads a model saved with `save` and rebuilds its indices.
    pub fn load(model_path: &str) -> Result<Self> {
        let start_time = Instant::now();
        let file =
            File::open(model_path).map_err(|error| B2vError::Persistence(error.to_string()))?;
        let reader = BufReader::new(file);
        let blob: ModelBlob = bincode::deserialize_from(reader)
            .map_err(|error| B2vError::Persistence(error.to_string()))?;
        let state = TrainedState::from_table(blob.token_vectors, blob.table)?;
        println!(
            "loading model and rebuilding indices:{} micros",
            start_time.elapsed().as_micros()
        );
        Ok(Behavior2Vec {
            trained: Some(state),
        })
    }
}
