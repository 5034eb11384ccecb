//! Popularity baseline: recommend the items bought in the most training orders.
//!
//! Every column outside the basket is a candidate; columns never seen in
//! training rank last, by column.
use super::{check_basket, top_n_from};
use crate::matrix::{BasketVector, InteractionMatrix};
use crate::{BasketRecommender, PredictionError, ScoredItem};

/// Fitted popularity model.
#[derive(Clone, Debug)]
pub struct PopularityModel {
    counts: Vec<f32>,
}

impl PopularityModel {
    /// Count how many training rows contain each column.
    pub fn fit(train: &InteractionMatrix) -> Self {
        PopularityModel {
            counts: train.column_counts().into_iter().map(|x| x as f32).collect(),
        }
    }

    /// Training frequency of each column.
    pub fn counts(&self) -> &[f32] {
        &self.counts
    }
}

impl BasketRecommender for PopularityModel {
    fn num_items(&self) -> usize {
        self.counts.len()
    }

    fn recommend(
        &self,
        basket: &BasketVector,
        n: usize,
    ) -> Result<Vec<ScoredItem>, PredictionError> {
        check_basket(basket, self.num_items())?;

        let candidates = self
            .counts
            .iter()
            .enumerate()
            .map(|(item_id, &score)| ScoredItem { item_id, score });

        Ok(top_n_from(candidates, basket, n))
    }
}
