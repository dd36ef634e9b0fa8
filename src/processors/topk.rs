//! Top-k classification result processing.

use crate::core::{ClassifierError, ClassifierResult};
use std::collections::HashMap;

/// Result structure for top-k processing.
///
/// Contains the top-k class indexes and their corresponding scores for
/// each prediction in a batch, sorted by descending score.
#[derive(Debug, Clone)]
pub struct TopkResult {
    /// Top-k class indexes per prediction.
    pub indexes: Vec<Vec<usize>>,
    /// Scores corresponding to the indexes.
    pub scores: Vec<Vec<f32>>,
    /// Class names, if a mapping was provided.
    pub class_names: Option<Vec<Vec<String>>>,
}

/// Extracts top-k entries from classification score vectors.
///
/// Ties are broken by the underlying stable sort: equal scores keep
/// ascending index order. This is part of the determinism contract.
#[derive(Debug, Default)]
pub struct Topk {
    class_id_map: Option<HashMap<usize, String>>,
}

impl Topk {
    /// Creates a Topk processor with an optional class-name mapping.
    pub fn new(class_id_map: Option<HashMap<usize, String>>) -> Self {
        Self { class_id_map }
    }

    /// Creates a Topk processor whose class names come from a vector
    /// indexed by class id.
    pub fn from_class_names(class_names: Vec<String>) -> Self {
        Self::new(Some(class_names.into_iter().enumerate().collect()))
    }

    /// Whether a class-name mapping is available.
    pub fn has_class_names(&self) -> bool {
        self.class_id_map.is_some()
    }

    /// Processes a batch of score vectors.
    ///
    /// Each inner vector holds the scores for all classes of one
    /// prediction. `k` is clamped to the class count.
    ///
    /// # Errors
    ///
    /// Returns `ClassifierError::InvalidInput` if `k` is zero or any
    /// prediction vector is empty.
    pub fn process(&self, predictions: &[Vec<f32>], k: usize) -> ClassifierResult<TopkResult> {
        if k == 0 {
            return Err(ClassifierError::invalid_input("k must be greater than 0"));
        }

        let mut indexes = Vec::with_capacity(predictions.len());
        let mut scores = Vec::with_capacity(predictions.len());
        let mut class_names = self.class_id_map.as_ref().map(|_| Vec::new());

        for prediction in predictions {
            if prediction.is_empty() {
                return Err(ClassifierError::invalid_input("empty prediction vector"));
            }

            let (top_indexes, top_scores) =
                extract_topk(prediction, k.min(prediction.len()));

            if let Some(names) = class_names.as_mut() {
                names.push(self.map_names(&top_indexes));
            }
            indexes.push(top_indexes);
            scores.push(top_scores);
        }

        Ok(TopkResult {
            indexes,
            scores,
            class_names,
        })
    }

    /// Processes a single score vector.
    pub fn process_single(&self, prediction: &[f32], k: usize) -> ClassifierResult<TopkResult> {
        self.process(&[prediction.to_vec()], k)
    }

    /// Looks up the class name for an id.
    pub fn class_name(&self, class_id: usize) -> Option<&str> {
        self.class_id_map.as_ref()?.get(&class_id).map(String::as_str)
    }

    fn map_names(&self, indexes: &[usize]) -> Vec<String> {
        match &self.class_id_map {
            Some(map) => indexes
                .iter()
                .map(|&idx| {
                    map.get(&idx)
                        .cloned()
                        .unwrap_or_else(|| format!("class_{idx}"))
                })
                .collect(),
            None => indexes.iter().map(|idx| idx.to_string()).collect(),
        }
    }
}

/// Top-k of one score vector. The stable sort preserves ascending index
/// order among equal scores.
fn extract_topk(prediction: &[f32], k: usize) -> (Vec<usize>, Vec<f32>) {
    let mut indexed: Vec<(usize, f32)> = prediction.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.into_iter().take(k).unzip()
}
