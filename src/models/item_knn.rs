//! Item-based neighbourhood model.
//!
//! At fit time the model computes the full item × item similarity matrix from
//! column co-occurrences and keeps, for every item, only its `k` most similar
//! neighbours. A candidate item is scored by summing its similarities to the
//! basket items found among those neighbours.
use ndarray::Array2;

use super::{check_basket, top_n, Similarity};
use crate::matrix::{BasketVector, InteractionMatrix, Normalization};
use crate::{BasketRecommender, ConfigurationError, ItemId, PredictionError, ScoredItem};

/// Hyperparameters of the item-based model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Hyperparameters {
    pub(crate) similarity: Similarity,
    pub(crate) num_neighbours: usize,
    normalization: Option<Normalization>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            similarity: Similarity::Cosine,
            num_neighbours: 5,
            normalization: None,
        }
    }
}

impl Hyperparameters {
    /// Build new hyperparameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the similarity measure.
    pub fn similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    /// Set the number of neighbours kept per item.
    pub fn num_neighbours(mut self, num_neighbours: usize) -> Self {
        self.num_neighbours = num_neighbours;
        self
    }

    /// Normalise weighted training matrices before computing similarities.
    pub fn normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = Some(normalization);
        self
    }

    /// Check the hyperparameters are in range.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.num_neighbours == 0 {
            return Err(ConfigurationError::invalid(
                "item_knn.num_neighbours",
                self.num_neighbours,
                "at least 1",
            ));
        }

        Ok(())
    }

    /// Fit the model.
    pub fn fit(&self, train: &InteractionMatrix) -> ItemKnnModel {
        let normalized;
        let train = match self.normalization {
            Some(normalization) if !train.is_binary() => {
                normalized = train.normalized(normalization);
                &normalized
            }
            _ => train,
        };

        let similarities = self.similarity_matrix(train);
        let num_items = train.num_items();

        // contributions[b] lists every (a, sim) where b is among a's neighbours.
        let mut contributions: Vec<Vec<(ItemId, f32)>> = vec![Vec::new(); num_items];

        for item_a in 0..num_items {
            let mut neighbours: Vec<(ItemId, f32)> = similarities
                .row(item_a)
                .iter()
                .enumerate()
                .filter(|&(item_b, &sim)| item_b != item_a && sim > 0.0)
                .map(|(item_b, &sim)| (item_b, sim))
                .collect();

            neighbours.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(::std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            neighbours.truncate(self.num_neighbours);

            for (item_b, sim) in neighbours {
                contributions[item_b].push((item_a, sim));
            }
        }

        ItemKnnModel {
            num_items,
            contributions,
        }
    }

    fn similarity_matrix(&self, train: &InteractionMatrix) -> Array2<f32> {
        let num_items = train.num_items();

        let mut cooccurrences = Array2::<f32>::zeros((num_items, num_items));
        let mut squared_norms = vec![0.0_f32; num_items];
        let mut lengths = vec![0_usize; num_items];

        for row in train.iter_rows() {
            for (idx, (&item_a, &value_a)) in row.item_ids.iter().zip(row.values).enumerate() {
                squared_norms[item_a] += value_a * value_a;
                lengths[item_a] += 1;

                for (&item_b, &value_b) in row.item_ids[idx + 1..]
                    .iter()
                    .zip(&row.values[idx + 1..])
                {
                    let increment = match self.similarity {
                        Similarity::Cosine => value_a * value_b,
                        Similarity::Jaccard => 1.0,
                    };

                    cooccurrences[[item_a, item_b]] += increment;
                    cooccurrences[[item_b, item_a]] += increment;
                }
            }
        }

        let mut similarities = Array2::<f32>::zeros((num_items, num_items));

        for ((item_a, item_b), &cooccurrence) in cooccurrences.indexed_iter() {
            if item_a == item_b || cooccurrence == 0.0 {
                continue;
            }

            similarities[[item_a, item_b]] = self.similarity.compute(
                cooccurrence,
                squared_norms[item_a],
                squared_norms[item_b],
                cooccurrence as usize,
                lengths[item_a],
                lengths[item_b],
            );
        }

        similarities
    }
}

/// Fitted item-based model.
#[derive(Clone, Debug)]
pub struct ItemKnnModel {
    num_items: usize,
    contributions: Vec<Vec<(ItemId, f32)>>,
}

impl ItemKnnModel {
    /// The neighbourhood entries in which `item_id` appears, as `(item, similarity)`.
    pub fn contributions(&self, item_id: ItemId) -> &[(ItemId, f32)] {
        self.contributions
            .get(item_id)
            .map(|x| x.as_slice())
            .unwrap_or(&[])
    }
}

impl BasketRecommender for ItemKnnModel {
    fn num_items(&self) -> usize {
        self.num_items
    }

    fn recommend(
        &self,
        basket: &BasketVector,
        n: usize,
    ) -> Result<Vec<ScoredItem>, PredictionError> {
        check_basket(basket, self.num_items)?;

        let mut scores = vec![0.0; self.num_items];

        for &item_b in basket.item_ids() {
            for &(item_a, sim) in &self.contributions[item_b] {
                scores[item_a] += sim;
            }
        }

        Ok(top_n(&scores, basket, n))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::scenario;
    use super::*;
    use crate::models::item_ids;

    #[test]
    fn jaccard_scores() {
        let matrix = scenario();
        let model = Hyperparameters::new()
            .similarity(Similarity::Jaccard)
            .num_neighbours(3)
            .fit(&matrix);

        // Columns: A (orders 1, 2, 3), B (1, 2), C (1, 3), D (3).
        // jaccard(B, A) = 2 / 3, jaccard(C, A) = 2 / 3, jaccard(D, A) = 1 / 3.
        let recommended = model
            .recommend(&matrix.vocabulary().encode(&["A"]), 3)
            .unwrap();

        assert_eq!(item_ids(&recommended), vec![1, 2, 3]);
        assert!((recommended[0].score - 2.0 / 3.0).abs() < 1e-6);
        assert!((recommended[2].score - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_sums_over_basket() {
        let matrix = scenario();
        let model = Hyperparameters::new().fit(&matrix);

        // cos(A, D) = 1 / sqrt(3), cos(C, D) = 1 / sqrt(2).
        let recommended = model
            .recommend(&matrix.vocabulary().encode(&["C", "D"]), 1)
            .unwrap();
        let expected_a = 2.0 / 6.0_f32.sqrt() + 1.0 / 3.0_f32.sqrt();

        assert_eq!(item_ids(&recommended), vec![0]);
        assert!((recommended[0].score - expected_a).abs() < 1e-5);
    }

    #[test]
    fn neighbourhoods_are_truncated() {
        let matrix = scenario();
        let model = Hyperparameters::new()
            .similarity(Similarity::Jaccard)
            .num_neighbours(1)
            .fit(&matrix);

        // Each item keeps one neighbour: A -> B (tie with C broken by column),
        // B -> A, C -> A, D -> C.
        assert_eq!(model.contributions(0), &[(1, 2.0 / 3.0), (2, 2.0 / 3.0)]);
        assert_eq!(model.contributions(1), &[(0, 2.0 / 3.0)]);
        assert!(model.contributions(3).is_empty());
    }

    #[test]
    fn validation() {
        assert!(Hyperparameters::new().num_neighbours(0).validate().is_err());
        assert!(Hyperparameters::new().validate().is_ok());
    }
}
