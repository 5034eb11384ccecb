//! Models module.
//!
//! Every model is described by hyperparameters (a variant of [`Algorithm`]) and
//! fitted on an [`InteractionMatrix`] into a [`Model`], which implements
//! [`BasketRecommender`].
use std::cmp::Ordering;
use std::fmt;

use crate::matrix::{BasketVector, InteractionMatrix};
use crate::{BasketRecommender, ConfigurationError, FittingError, ItemId, PredictionError,
            ScoredItem};

pub mod item_knn;
pub mod popularity;
pub mod random;
pub mod rules;
pub mod user_knn;

/// Similarity between two binary (or weighted) vectors.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// Cosine of the angle between the vectors.
    Cosine,
    /// Intersection over union of the present entries.
    Jaccard,
}

impl Similarity {
    /// Similarity from co-occurrence statistics.
    ///
    /// `dot` is the inner product, `norm_a`/`norm_b` the squared L2 norms,
    /// `overlap` the number of shared present entries and `len_a`/`len_b`
    /// the number of present entries of each vector.
    pub(crate) fn compute(
        self,
        dot: f32,
        norm_a: f32,
        norm_b: f32,
        overlap: usize,
        len_a: usize,
        len_b: usize,
    ) -> f32 {
        match self {
            Similarity::Cosine => {
                let denominator = (norm_a * norm_b).sqrt();
                if denominator > 0.0 {
                    dot / denominator
                } else {
                    0.0
                }
            }
            Similarity::Jaccard => {
                let union = len_a + len_b - overlap;
                if union > 0 {
                    overlap as f32 / union as f32
                } else {
                    0.0
                }
            }
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Similarity::Cosine => write!(f, "cosine"),
            Similarity::Jaccard => write!(f, "jaccard"),
        }
    }
}

/// The closed set of recommendation algorithms and their hyperparameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Algorithm {
    /// Uniformly random recommendations.
    Random(random::Hyperparameters),
    /// Globally most frequent items.
    Popularity,
    /// Item-based neighbourhood model.
    ItemKnn(item_knn::Hyperparameters),
    /// User-based neighbourhood model.
    UserKnn(user_knn::Hyperparameters),
    /// Association rules.
    AssociationRules(rules::Hyperparameters),
}

impl Algorithm {
    /// Readable name including the distinguishing hyperparameters.
    pub fn name(&self) -> String {
        match self {
            Algorithm::Random(_) => "random".to_owned(),
            Algorithm::Popularity => "popular".to_owned(),
            Algorithm::ItemKnn(hyper) => {
                format!("ibcf-{}-k{}", hyper.similarity, hyper.num_neighbours)
            }
            Algorithm::UserKnn(hyper) => {
                format!("ubcf-{}-nn{}", hyper.similarity, hyper.num_neighbours)
            }
            Algorithm::AssociationRules(hyper) => format!(
                "ar-s{}-c{}",
                hyper.min_support, hyper.min_confidence
            ),
        }
    }

    /// Check the hyperparameters are in range.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Algorithm::Random(_) | Algorithm::Popularity => Ok(()),
            Algorithm::ItemKnn(hyper) => hyper.validate(),
            Algorithm::UserKnn(hyper) => hyper.validate(),
            Algorithm::AssociationRules(hyper) => hyper.validate(),
        }
    }

    /// Fit the model on `train`.
    pub fn fit(&self, train: &InteractionMatrix) -> Result<Model, FittingError> {
        check_training_data(&self.name(), train)?;

        Ok(match self {
            Algorithm::Random(hyper) => Model::Random(hyper.fit(train)),
            Algorithm::Popularity => Model::Popularity(popularity::PopularityModel::fit(train)),
            Algorithm::ItemKnn(hyper) => Model::ItemKnn(hyper.fit(train)),
            Algorithm::UserKnn(hyper) => Model::UserKnn(hyper.fit(train)),
            Algorithm::AssociationRules(hyper) => Model::AssociationRules(hyper.fit(train)),
        })
    }

    /// Set the similarity of neighbourhood models; other models are returned unchanged.
    pub fn with_similarity(self, similarity: Similarity) -> Self {
        match self {
            Algorithm::ItemKnn(hyper) => Algorithm::ItemKnn(hyper.similarity(similarity)),
            Algorithm::UserKnn(hyper) => Algorithm::UserKnn(hyper.similarity(similarity)),
            other => other,
        }
    }

    /// Set the neighbourhood size of neighbourhood models; other models are returned unchanged.
    pub fn with_num_neighbours(self, num_neighbours: usize) -> Self {
        match self {
            Algorithm::ItemKnn(hyper) => Algorithm::ItemKnn(hyper.num_neighbours(num_neighbours)),
            Algorithm::UserKnn(hyper) => Algorithm::UserKnn(hyper.num_neighbours(num_neighbours)),
            other => other,
        }
    }

    /// Replace the seed of randomised models.
    pub fn with_seed(self, seed: u64) -> Self {
        match self {
            Algorithm::Random(hyper) => Algorithm::Random(hyper.seed(seed)),
            other => other,
        }
    }
}

/// A fitted model.
#[derive(Clone, Debug)]
pub enum Model {
    /// Fitted random model.
    Random(random::RandomModel),
    /// Fitted popularity model.
    Popularity(popularity::PopularityModel),
    /// Fitted item-based model.
    ItemKnn(item_knn::ItemKnnModel),
    /// Fitted user-based model.
    UserKnn(user_knn::UserKnnModel),
    /// Fitted association rules.
    AssociationRules(rules::RulesModel),
}

impl BasketRecommender for Model {
    fn num_items(&self) -> usize {
        match self {
            Model::Random(model) => model.num_items(),
            Model::Popularity(model) => model.num_items(),
            Model::ItemKnn(model) => model.num_items(),
            Model::UserKnn(model) => model.num_items(),
            Model::AssociationRules(model) => model.num_items(),
        }
    }

    fn recommend(
        &self,
        basket: &BasketVector,
        n: usize,
    ) -> Result<Vec<ScoredItem>, PredictionError> {
        match self {
            Model::Random(model) => model.recommend(basket, n),
            Model::Popularity(model) => model.recommend(basket, n),
            Model::ItemKnn(model) => model.recommend(basket, n),
            Model::UserKnn(model) => model.recommend(basket, n),
            Model::AssociationRules(model) => model.recommend(basket, n),
        }
    }
}

fn check_training_data(algorithm: &str, train: &InteractionMatrix) -> Result<(), FittingError> {
    if train.num_items() == 0 {
        return Err(FittingError::NoColumns {
            algorithm: algorithm.to_owned(),
        });
    }
    if train.num_rows() == 0 {
        return Err(FittingError::NoTrainingRows {
            algorithm: algorithm.to_owned(),
        });
    }

    Ok(())
}

pub(crate) fn check_basket(basket: &BasketVector, num_items: usize) -> Result<(), PredictionError> {
    if basket.num_items() != num_items {
        Err(PredictionError::VocabularyMismatch {
            basket: basket.num_items(),
            model: num_items,
        })
    } else {
        Ok(())
    }
}

/// Order by descending score, then ascending column.
fn compare_scored(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.item_id.cmp(&b.item_id))
}

/// Rank a dense score vector, keeping at most `n` positive-scoring items
/// that are not in the basket.
pub(crate) fn top_n(scores: &[f32], basket: &BasketVector, n: usize) -> Vec<ScoredItem> {
    top_n_from(
        scores
            .iter()
            .enumerate()
            .filter(|&(_, &score)| score > 0.0)
            .map(|(item_id, &score)| ScoredItem { item_id, score }),
        basket,
        n,
    )
}

/// Rank sparse candidates, keeping at most `n` that are not in the basket.
pub(crate) fn top_n_from<I: Iterator<Item = ScoredItem>>(
    candidates: I,
    basket: &BasketVector,
    n: usize,
) -> Vec<ScoredItem> {
    let mut candidates: Vec<ScoredItem> = candidates
        .filter(|x| x.score.is_finite() && !basket.contains(x.item_id))
        .collect();

    candidates.sort_by(compare_scored);
    candidates.truncate(n);

    candidates
}

/// Item ids of a ranking, best first.
pub fn item_ids(recommendations: &[ScoredItem]) -> Vec<ItemId> {
    recommendations.iter().map(|x| x.item_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Transaction, Transactions};

    pub(crate) fn scenario() -> InteractionMatrix {
        let transactions = Transactions::from(vec![
            Transaction::new(1, "A"),
            Transaction::new(1, "B"),
            Transaction::new(1, "C"),
            Transaction::new(2, "A"),
            Transaction::new(2, "B"),
            Transaction::new(3, "A"),
            Transaction::new(3, "C"),
            Transaction::new(3, "D"),
        ]);

        InteractionMatrix::from_baskets(&transactions.baskets()).unwrap()
    }

    fn all_algorithms() -> Vec<Algorithm> {
        vec![
            Algorithm::Random(random::Hyperparameters::new()),
            Algorithm::Popularity,
            Algorithm::ItemKnn(item_knn::Hyperparameters::new()),
            Algorithm::ItemKnn(item_knn::Hyperparameters::new().similarity(Similarity::Jaccard)),
            Algorithm::UserKnn(user_knn::Hyperparameters::new()),
            Algorithm::UserKnn(user_knn::Hyperparameters::new().similarity(Similarity::Jaccard)),
            Algorithm::AssociationRules(rules::Hyperparameters::new()),
            Algorithm::AssociationRules(
                rules::Hyperparameters::new()
                    .min_support(0.0)
                    .min_confidence(0.0),
            ),
        ]
    }

    #[test]
    fn recommendations_are_well_formed() {
        let matrix = scenario();

        for algorithm in all_algorithms() {
            let model = algorithm.fit(&matrix).unwrap();

            for basket in &[vec![], vec!["A"], vec!["A", "C"], vec!["B", "D"]] {
                let basket = matrix.vocabulary().encode(basket);

                for n in 0..6 {
                    let recommended = model.recommend(&basket, n).unwrap();

                    assert!(recommended.len() <= n, "{}", algorithm.name());
                    assert!(recommended.len() <= matrix.num_items() - basket.len());
                    assert!(recommended.iter().all(|x| !basket.contains(x.item_id)));
                    for pair in recommended.windows(2) {
                        assert!(pair[0].score >= pair[1].score, "{}", algorithm.name());
                    }
                }
            }
        }
    }

    #[test]
    fn degenerate_training_data_names_the_algorithm() {
        let empty = scenario().select_rows(&[]);

        for algorithm in all_algorithms() {
            let err = algorithm.fit(&empty).unwrap_err();

            assert_eq!(err.algorithm(), algorithm.name());
        }
    }

    #[test]
    fn mismatched_vocabulary_is_rejected() {
        let model = Algorithm::Popularity.fit(&scenario()).unwrap();
        let basket = BasketVector::new(10, vec![1]);

        assert_eq!(
            model.recommend(&basket, 3).unwrap_err(),
            PredictionError::VocabularyMismatch {
                basket: 10,
                model: 4,
            }
        );
    }

    #[test]
    fn ties_break_by_column() {
        let basket = BasketVector::new(4, vec![0]);
        let ranked = top_n(&[5.0, 2.0, 2.0, 3.0], &basket, 3);

        assert_eq!(item_ids(&ranked), vec![3, 1, 2]);
    }

    #[test]
    fn grid_overrides_only_touch_neighbourhood_models() {
        let item = Algorithm::ItemKnn(item_knn::Hyperparameters::new())
            .with_similarity(Similarity::Jaccard)
            .with_num_neighbours(7);

        assert_eq!(item.name(), "ibcf-jaccard-k7");
        assert_eq!(
            Algorithm::Popularity.with_num_neighbours(7),
            Algorithm::Popularity
        );
    }
}
