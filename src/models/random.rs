//! Random baseline: every column outside the basket gets a uniformly random score.
//!
//! The generator behind each call is seeded from the model seed and the basket
//! contents, so the same request always gets the same answer.
use std::hash::Hasher;

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use siphasher::sip::SipHasher;

use super::{check_basket, top_n_from};
use crate::matrix::{BasketVector, InteractionMatrix};
use crate::{BasketRecommender, PredictionError, ScoredItem};

/// Hyperparameters of the random model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Hyperparameters {
    seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters { seed: 42 }
    }
}

impl Hyperparameters {
    /// Build new hyperparameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit the model; only the column count is retained.
    pub fn fit(&self, train: &InteractionMatrix) -> RandomModel {
        RandomModel {
            num_items: train.num_items(),
            seed: self.seed,
        }
    }
}

/// Fitted random model.
#[derive(Clone, Debug)]
pub struct RandomModel {
    num_items: usize,
    seed: u64,
}

impl RandomModel {
    fn rng_for(&self, basket: &BasketVector) -> XorShiftRng {
        let mut hasher = SipHasher::new_with_keys(self.seed, self.num_items as u64);
        for &item_id in basket.item_ids() {
            hasher.write_usize(item_id);
        }

        XorShiftRng::seed_from_u64(hasher.finish())
    }
}

impl BasketRecommender for RandomModel {
    fn num_items(&self) -> usize {
        self.num_items
    }

    fn recommend(
        &self,
        basket: &BasketVector,
        n: usize,
    ) -> Result<Vec<ScoredItem>, PredictionError> {
        check_basket(basket, self.num_items)?;

        let mut rng = self.rng_for(basket);
        let candidates = (0..self.num_items)
            .map(|item_id| ScoredItem {
                item_id,
                score: rng.gen::<f32>(),
            })
            .collect::<Vec<_>>();

        Ok(top_n_from(candidates.into_iter(), basket, n))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::scenario;
    use super::*;
    use crate::models::item_ids;

    #[test]
    fn reproducible_per_call() {
        let matrix = scenario();
        let model = Hyperparameters::new().seed(3).fit(&matrix);
        let basket = matrix.vocabulary().encode(&["B"]);

        let first = model.recommend(&basket, 3).unwrap();
        let second = model.recommend(&basket, 3).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(!item_ids(&first).contains(&1));
    }

    #[test]
    fn returns_every_remaining_column_at_most() {
        let matrix = scenario();
        let model = Hyperparameters::new().fit(&matrix);
        let basket = matrix.vocabulary().encode(&["A", "B", "C"]);

        let recommended = model.recommend(&basket, 10).unwrap();

        assert_eq!(item_ids(&recommended), vec![3]);
    }
}
