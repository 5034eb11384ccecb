//! User-based neighbourhood model.
//!
//! Baskets are compared against training rows at request time. An inverted
//! column → rows index built at fit time restricts the comparison to rows that
//! share at least one item with the basket, so no row × row similarity matrix is
//! ever materialised.
use std::cmp::Ordering;
use std::collections::HashMap;

use super::{check_basket, top_n, Similarity};
use crate::matrix::{BasketVector, InteractionMatrix, Normalization};
use crate::{BasketRecommender, ConfigurationError, PredictionError, ScoredItem};

/// How the item vectors of the nearest rows are combined into scores.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Sum of neighbour similarity times the neighbour's value for the item.
    SimilarityWeighted,
    /// Number of neighbours containing the item.
    Count,
}

/// Hyperparameters of the user-based model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Hyperparameters {
    pub(crate) similarity: Similarity,
    pub(crate) num_neighbours: usize,
    aggregation: Aggregation,
    normalization: Option<Normalization>,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            similarity: Similarity::Cosine,
            num_neighbours: 500,
            aggregation: Aggregation::SimilarityWeighted,
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

    /// Set the number of nearest rows aggregated per request.
    pub fn num_neighbours(mut self, num_neighbours: usize) -> Self {
        self.num_neighbours = num_neighbours;
        self
    }

    /// Set the aggregation of neighbour rows.
    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
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
                "user_knn.num_neighbours",
                self.num_neighbours,
                "at least 1",
            ));
        }

        Ok(())
    }

    /// Fit the model.
    pub fn fit(&self, train: &InteractionMatrix) -> UserKnnModel {
        let train = match self.normalization {
            Some(normalization) if !train.is_binary() => train.normalized(normalization),
            _ => train.clone(),
        };

        let squared_norms: Vec<f32> = train
            .iter_rows()
            .map(|row| row.values.iter().map(|x| x * x).sum::<f32>())
            .collect();

        UserKnnModel {
            hyper: self.clone(),
            columns: train.to_columns(),
            lengths: train.row_sums(),
            squared_norms,
            train,
        }
    }
}

/// A training row selected as a neighbour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbour {
    /// Row index in the training matrix.
    pub row_id: usize,
    /// Similarity to the basket.
    pub similarity: f32,
}

/// Fitted user-based model.
#[derive(Clone, Debug)]
pub struct UserKnnModel {
    hyper: Hyperparameters,
    train: InteractionMatrix,
    columns: Vec<Vec<(usize, f32)>>,
    lengths: Vec<usize>,
    squared_norms: Vec<f32>,
}

impl UserKnnModel {
    /// The most similar training rows to `basket`, best first.
    ///
    /// Rows sharing no item with the basket are never neighbours.
    pub fn neighbours(&self, basket: &BasketVector) -> Vec<Neighbour> {
        let mut overlaps: HashMap<usize, (f32, usize)> = HashMap::new();

        for &item_id in basket.item_ids() {
            for &(row_id, value) in &self.columns[item_id] {
                let entry = overlaps.entry(row_id).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }

        let basket_len = basket.len();
        let mut neighbours: Vec<Neighbour> = overlaps
            .into_iter()
            .map(|(row_id, (dot, overlap))| Neighbour {
                row_id,
                similarity: self.hyper.similarity.compute(
                    dot,
                    basket_len as f32,
                    self.squared_norms[row_id],
                    overlap,
                    basket_len,
                    self.lengths[row_id],
                ),
            })
            .filter(|x| x.similarity > 0.0)
            .collect();

        neighbours.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.row_id.cmp(&b.row_id))
        });
        neighbours.truncate(self.hyper.num_neighbours);

        neighbours
    }
}

impl BasketRecommender for UserKnnModel {
    fn num_items(&self) -> usize {
        self.train.num_items()
    }

    fn recommend(
        &self,
        basket: &BasketVector,
        n: usize,
    ) -> Result<Vec<ScoredItem>, PredictionError> {
        check_basket(basket, self.num_items())?;

        let mut scores = vec![0.0; self.num_items()];

        for neighbour in self.neighbours(basket) {
            if let Some(row) = self.train.row(neighbour.row_id) {
                for (&item_id, &value) in row.item_ids.iter().zip(row.values) {
                    scores[item_id] += match self.hyper.aggregation {
                        Aggregation::SimilarityWeighted => neighbour.similarity * value,
                        Aggregation::Count => 1.0,
                    };
                }
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
    fn neighbours_are_ranked_by_similarity() {
        let matrix = scenario();
        let model = Hyperparameters::new()
            .similarity(Similarity::Jaccard)
            .fit(&matrix);

        // Basket {B, C}: order 1 = {A, B, C} scores 2 / 3, order 2 = {A, B}
        // and order 3 = {A, C, D} score 1 / 3 and 1 / 4.
        let neighbours = model.neighbours(&matrix.vocabulary().encode(&["B", "C"]));
        let rows: Vec<usize> = neighbours.iter().map(|x| x.row_id).collect();

        assert_eq!(rows, vec![0, 1, 2]);
        assert!((neighbours[0].similarity - 2.0 / 3.0).abs() < 1e-6);
        assert!((neighbours[2].similarity - 0.25).abs() < 1e-6);
    }

    #[test]
    fn neighbourhood_size_limits_aggregation() {
        let matrix = scenario();
        let model = Hyperparameters::new()
            .num_neighbours(1)
            .aggregation(Aggregation::Count)
            .fit(&matrix);

        // The nearest row to {C, D} is order 3, which adds only A.
        let recommended = model
            .recommend(&matrix.vocabulary().encode(&["C", "D"]), 5)
            .unwrap();

        assert_eq!(item_ids(&recommended), vec![0]);
        assert_eq!(recommended[0].score, 1.0);
    }

    #[test]
    fn empty_basket_has_no_neighbours() {
        let matrix = scenario();
        let model = Hyperparameters::new().fit(&matrix);

        let recommended = model
            .recommend(&matrix.vocabulary().encode::<&str>(&[]), 5)
            .unwrap();

        assert!(recommended.is_empty());
    }

    #[test]
    fn weighted_rows_can_be_normalised() {
        let matrix = InteractionMatrix::from_weighted_rows(vec![
            (1, vec![("x".to_owned(), 1.0), ("y".to_owned(), 5.0)]),
            (2, vec![("x".to_owned(), 2.0), ("z".to_owned(), 2.0)]),
        ])
        .unwrap();
        let model = Hyperparameters::new()
            .normalization(Normalization::UnitLength)
            .fit(&matrix);

        let recommended = model
            .recommend(&matrix.vocabulary().encode(&["x"]), 2)
            .unwrap();

        // After unit scaling order 1 is (1, 5) / sqrt(26) and order 2 is
        // (2, 2) / sqrt(8), so z scores 0.5 and y scores 5 / 26.
        assert_eq!(item_ids(&recommended), vec![2, 1]);
        assert!((recommended[0].score - 0.5).abs() < 1e-5);
        assert!((recommended[1].score - 5.0 / 26.0).abs() < 1e-5);
    }
}
