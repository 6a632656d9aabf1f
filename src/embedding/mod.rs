use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{B2vError, Result};
use crate::io::{Session, Token};

/// Separator between the behavior type and the item id inside a token,
/// e.g. "view-1234". Item ids must not contain the separator themselves.
pub const TOKEN_SEPARATOR: char = '-';

/// Splits a token into (behavior, item_id). The separator has to occur
/// exactly once.
pub fn split_token(token: &str) -> Result<(&str, &str)> {
    let mut parts = token.split(TOKEN_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(behavior), Some(item_id), None) => Ok((behavior, item_id)),
        _ => Err(B2vError::InvalidTokenFormat(token.to_string())),
    }
}

pub fn format_token(behavior: &str, item_id: &str) -> Token {
    format!("{}{}{}", behavior, TOKEN_SEPARATOR, item_id)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub vector_size: usize,
    pub window: usize,
    pub min_count: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            vector_size: 300,
            window: 5,
            min_count: 1,
        }
    }
}

/// Boundary to the external skip-gram trainer. Implementations must return a
/// mapping that is total over the tokens occurring at least `min_count` times
/// in the corpus, every vector having dimension `vector_size`.
pub trait EmbeddingTrainer {
    fn train(&self, corpus: &[Session], config: &TrainingConfig) -> Result<HashMap<Token, Vec<f32>>>;
}

/// Vectors produced by an out-of-process trainer and loaded from a word2vec
/// style text file. `train` filters the corpus vocabulary by `min_count` and
/// checks that the loaded mapping covers it at the configured dimension.
pub struct PretrainedVectors {
    vectors: HashMap<Token, Vec<f32>>,
}

impl PretrainedVectors {
    pub fn new(vectors: HashMap<Token, Vec<f32>>) -> Self {
        PretrainedVectors { vectors }
    }
}

impl EmbeddingTrainer for PretrainedVectors {
    fn train(&self, corpus: &[Session], config: &TrainingConfig) -> Result<HashMap<Token, Vec<f32>>> {
        assert!(config.vector_size > 0, "vector_size must be positive");
        assert!(config.window > 0, "window must be positive");
        assert!(config.min_count >= 1, "min_count must be at least 1");

        let mut token_counts: HashMap<&str, usize> = HashMap::new();
        for session in corpus {
            for token in session {
                *token_counts.entry(token.as_str()).or_insert(0) += 1;
            }
        }

        let mut token_vectors: HashMap<Token, Vec<f32>> =
            HashMap::with_capacity(token_counts.len());
        for (token, count) in token_counts {
            if count < config.min_count {
                continue;
            }
            let vector = self
                .vectors
                .get(token)
                .ok_or_else(|| B2vError::UnknownToken(token.to_string()))?;
            if vector.len() != config.vector_size {
                return Err(B2vError::DimensionMismatch {
                    expected: config.vector_size,
                    actual: vector.len(),
                });
            }
            token_vectors.insert(token.to_string(), vector.clone());
        }

        Ok(token_vectors)
    }
}

/// Per-behavior item vectors, with missing entries imputed from the behavior
/// average. After `impute_missing` every item known to any behavior has an
/// entry under every behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BehaviorEmbeddingTable {
    vectors_by_behavior: HashMap<String, HashMap<String, Vec<f32>>>,
    // Canonical behavior order, frozen at build time. Composite vector
    // layout depends on it, so it is stored instead of relying on map
    // iteration order.
    behavior_order: Vec<String>,
    dim: usize,
}

impl BehaviorEmbeddingTable {
    pub fn build(token_vectors: &HashMap<Token, Vec<f32>>) -> Result<Self> {
        let mut vectors_by_behavior: HashMap<String, HashMap<String, Vec<f32>>> = HashMap::new();
        let mut dim = 0;

        for (token, vector) in token_vectors {
            let (behavior, item_id) = split_token(token)?;
            if dim == 0 {
                dim = vector.len();
            } else if vector.len() != dim {
                return Err(B2vError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                });
            }
            vectors_by_behavior
                .entry(behavior.to_string())
                .or_default()
                .insert(item_id.to_string(), vector.clone());
        }

        let behavior_order: Vec<String> = vectors_by_behavior.keys().cloned().sorted().collect();

        Ok(BehaviorEmbeddingTable {
            vectors_by_behavior,
            behavior_order,
            dim,
        })
    }

    /// Fills the holes in the table with per-behavior average vectors. The
    /// averages are computed over the originally known vectors only, before
    /// any imputed entry is inserted, so imputed values never feed back into
    /// the average.
    pub fn impute_missing(&mut self) -> Result<()> {
        let mut average_by_behavior: HashMap<String, Vec<f32>> =
            HashMap::with_capacity(self.behavior_order.len());
        for behavior in &self.behavior_order {
            let known = &self.vectors_by_behavior[behavior];
            if known.is_empty() {
                return Err(B2vError::EmptyBehavior(behavior.clone()));
            }
            let mut average = vec![0.0_f32; self.dim];
            for vector in known.values() {
                for (slot, value) in average.iter_mut().zip(vector.iter()) {
                    *slot += value;
                }
            }
            for slot in average.iter_mut() {
                *slot /= known.len() as f32;
            }
            average_by_behavior.insert(behavior.clone(), average);
        }

        let all_items = self.items();
        for behavior in self.behavior_order.clone() {
            let average = &average_by_behavior[&behavior];
            let sub_table = self.vectors_by_behavior.get_mut(&behavior).unwrap();
            for item_id in &all_items {
                if !sub_table.contains_key(item_id) {
                    sub_table.insert(item_id.clone(), average.clone());
                }
            }
        }

        Ok(())
    }

    pub fn vector_of(&self, behavior: &str, item_id: &str) -> Result<&[f32]> {
        self.vectors_by_behavior
            .get(behavior)
            .and_then(|sub_table| sub_table.get(item_id))
            .map(Vec::as_slice)
            .ok_or_else(|| B2vError::UnknownToken(format_token(behavior, item_id)))
    }

    /// Behavior types in canonical order.
    pub fn behaviors(&self) -> &[String] {
        &self.behavior_order
    }

    /// All item ids across behaviors, in ascending order.
    pub fn items(&self) -> Vec<String> {
        let item_set: HashSet<&String> = self
            .vectors_by_behavior
            .values()
            .flat_map(|sub_table| sub_table.keys())
            .collect();
        item_set.into_iter().cloned().sorted().collect()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Concatenates the item's per-behavior vectors in canonical order into
    /// one composite vector of dimension `dim * behaviors().len()`.
    pub fn composite_vector(&self, item_id: &str) -> Result<Vec<f32>> {
        let mut composite = Vec::with_capacity(self.dim * self.behavior_order.len());
        for behavior in &self.behavior_order {
            let vector = self
                .vectors_by_behavior
                .get(behavior)
                .and_then(|sub_table| sub_table.get(item_id))
                .ok_or_else(|| B2vError::UnknownToken(item_id.to_string()))?;
            composite.extend_from_slice(vector);
        }
        Ok(composite)
    }
}

#[cfg(test)]
mod embedding_test {
    use super::*;
    use float_cmp::approx_eq;

    fn token_vectors(entries: &[(&str, Vec<f32>)]) -> HashMap<Token, Vec<f32>> {
        entries
            .iter()
            .map(|(token, vector)| (token.to_string(), vector.clone()))
            .collect()
    }

    #[test]
    fn should_split_tokens_on_single_separator() {
        assert_eq!(("view", "1234"), split_token("view-1234").unwrap());
        assert_eq!(
            Err(B2vError::InvalidTokenFormat("view1234".to_string())),
            split_token("view1234")
        );
        assert_eq!(
            Err(B2vError::InvalidTokenFormat("view-12-34".to_string())),
            split_token("view-12-34")
        );
    }

    #[test]
    fn should_group_vectors_by_behavior() {
        let vectors = token_vectors(&[
            ("v-1", vec![0.0, 0.0]),
            ("v-2", vec![1.0, 0.0]),
            ("p-1", vec![0.0, 1.0]),
        ]);
        let table = BehaviorEmbeddingTable::build(&vectors).unwrap();

        assert_eq!(&["p".to_string(), "v".to_string()], table.behaviors());
        assert_eq!(vec!["1".to_string(), "2".to_string()], table.items());
        assert_eq!(2, table.dim());
        assert_eq!(&[1.0, 0.0][..], table.vector_of("v", "2").unwrap());
    }

    #[test]
    fn should_impute_missing_vectors_from_behavior_average() {
        let vectors = token_vectors(&[
            ("v-1", vec![0.0, 0.0]),
            ("v-2", vec![1.0, 0.0]),
            ("p-1", vec![0.0, 1.0]),
        ]);
        let mut table = BehaviorEmbeddingTable::build(&vectors).unwrap();
        table.impute_missing().unwrap();

        // "p-2" was never trained, so it gets the average of the known
        // "p" vectors, which is just the vector of "p-1".
        assert_eq!(&[0.0, 1.0][..], table.vector_of("p", "2").unwrap());
        // known vectors are never overwritten
        assert_eq!(&[1.0, 0.0][..], table.vector_of("v", "2").unwrap());
    }

    #[test]
    fn should_average_only_originally_known_vectors() {
        let vectors = token_vectors(&[
            ("v-1", vec![2.0]),
            ("v-2", vec![4.0]),
            ("v-3", vec![6.0]),
            ("p-1", vec![1.0]),
        ]);
        let mut table = BehaviorEmbeddingTable::build(&vectors).unwrap();
        table.impute_missing().unwrap();

        let imputed_p2 = table.vector_of("p", "2").unwrap();
        let imputed_p3 = table.vector_of("p", "3").unwrap();
        assert!(approx_eq!(f32, 1.0, imputed_p2[0]));
        assert!(approx_eq!(f32, 1.0, imputed_p3[0]));
    }

    #[test]
    fn should_build_composite_vectors_in_canonical_order() {
        let vectors = token_vectors(&[
            ("v-1", vec![0.0, 0.0]),
            ("v-2", vec![1.0, 0.0]),
            ("p-1", vec![0.0, 1.0]),
        ]);
        let mut table = BehaviorEmbeddingTable::build(&vectors).unwrap();
        table.impute_missing().unwrap();

        // canonical order is ["p", "v"]
        assert_eq!(vec![0.0, 1.0, 0.0, 0.0], table.composite_vector("1").unwrap());
        assert_eq!(vec![0.0, 1.0, 1.0, 0.0], table.composite_vector("2").unwrap());
        assert_eq!(
            Err(B2vError::UnknownToken("99".to_string())),
            table.composite_vector("99")
        );
    }

    #[test]
    fn should_abort_build_on_malformed_token() {
        let vectors = token_vectors(&[("v-1", vec![0.0]), ("purchase", vec![1.0])]);
        assert!(matches!(
            BehaviorEmbeddingTable::build(&vectors),
            Err(B2vError::InvalidTokenFormat(token)) if token == "purchase"
        ));
    }

    #[test]
    fn should_reject_ragged_vector_dimensions() {
        let vectors = token_vectors(&[("v-1", vec![0.0, 0.0]), ("v-2", vec![1.0])]);
        let result = BehaviorEmbeddingTable::build(&vectors);
        assert!(matches!(
            result,
            Err(B2vError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn should_enforce_totality_of_pretrained_vectors() {
        let corpus = vec![vec!["v-1".to_string(), "v-2".to_string()]];
        let trainer = PretrainedVectors::new(token_vectors(&[("v-1", vec![0.0, 1.0])]));
        let config = TrainingConfig {
            vector_size: 2,
            window: 5,
            min_count: 1,
        };
        assert_eq!(
            Err(B2vError::UnknownToken("v-2".to_string())),
            trainer.train(&corpus, &config)
        );
    }

    #[test]
    fn should_filter_corpus_vocabulary_by_min_count() {
        let corpus = vec![
            vec!["v-1".to_string(), "v-2".to_string()],
            vec!["v-1".to_string()],
        ];
        let trainer = PretrainedVectors::new(token_vectors(&[("v-1", vec![0.0, 1.0])]));
        let config = TrainingConfig {
            vector_size: 2,
            window: 5,
            min_count: 2,
        };
        // "v-2" occurs once and falls below min_count, so the missing vector
        // does not fail training.
        let trained = trainer.train(&corpus, &config).unwrap();
        assert_eq!(1, trained.len());
        assert!(trained.contains_key("v-1"));
    }
}
