//! Top-N evaluation of recommenders on held-out basket items.
//!
//! The matrix is split into training and test rows. Each test row is cut into
//! a visible part, given to the model as the basket, and a held-out part the
//! model is expected to recommend back. Recommendations are scored with a
//! confusion matrix over all columns at every requested cutoff.
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;

use crate::matrix::{BasketVector, InteractionMatrix};
use crate::models::Algorithm;
use crate::{BasketRecommender, ConfigurationError, FittingError, InsufficientDataError, ItemId,
            OrderId};

/// How many items of each test row stay visible to the model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "policy", content = "value", rename_all = "snake_case")]
pub enum Given {
    /// All but `k` items are visible; `k` are held out.
    AllBut(usize),
    /// Exactly `k` items are visible.
    Fixed(usize),
    /// This fraction of the items (rounded down) is visible.
    Fraction(f64),
}

impl Given {
    /// Number of visible items for a row of `len` items.
    pub fn visible_count(&self, len: usize) -> usize {
        match *self {
            Given::AllBut(k) => len.saturating_sub(k),
            Given::Fixed(k) => k.min(len),
            Given::Fraction(fraction) => ((fraction * len as f64).floor() as usize).min(len),
        }
    }
}

/// Evaluation settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvaluationScheme {
    /// Share of rows used for training.
    pub train_fraction: f64,
    /// Visible-item policy for test rows.
    pub given: Given,
    /// Test rows left with fewer visible items are skipped.
    pub min_visible: usize,
    /// Recommendation list lengths to score.
    pub cutoffs: Vec<usize>,
    /// Seed of the split and of the visible-item selection.
    pub seed: u64,
}

impl Default for EvaluationScheme {
    fn default() -> Self {
        EvaluationScheme {
            train_fraction: 0.9,
            given: Given::AllBut(1),
            min_visible: 1,
            cutoffs: (1..=10).collect(),
            seed: 42,
        }
    }
}

impl EvaluationScheme {
    /// Set the training share.
    pub fn train_fraction(mut self, train_fraction: f64) -> Self {
        self.train_fraction = train_fraction;
        self
    }

    /// Set the visible-item policy.
    pub fn given(mut self, given: Given) -> Self {
        self.given = given;
        self
    }

    /// Set the minimum number of visible items.
    pub fn min_visible(mut self, min_visible: usize) -> Self {
        self.min_visible = min_visible;
        self
    }

    /// Set the cutoffs.
    pub fn cutoffs(mut self, cutoffs: Vec<usize>) -> Self {
        self.cutoffs = cutoffs;
        self
    }

    /// Set the seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(ConfigurationError::invalid(
                "evaluation.train_fraction",
                self.train_fraction,
                "in (0, 1)",
            ));
        }
        if self.cutoffs.is_empty() || self.cutoffs.contains(&0) {
            return Err(ConfigurationError::invalid(
                "evaluation.cutoffs",
                format!("{:?}", self.cutoffs),
                "a non-empty list of positive lengths",
            ));
        }
        match self.given {
            Given::AllBut(0) => {
                return Err(ConfigurationError::invalid(
                    "evaluation.given",
                    "all_but 0",
                    "holding out at least one item",
                ))
            }
            Given::Fraction(fraction) if !(fraction >= 0.0 && fraction < 1.0) => {
                return Err(ConfigurationError::invalid(
                    "evaluation.given",
                    fraction,
                    "a fraction in [0, 1)",
                ))
            }
            _ => {}
        }

        Ok(())
    }

    fn max_cutoff(&self) -> usize {
        self.cutoffs.iter().cloned().max().unwrap_or(0)
    }
}

/// A test row cut into the basket shown to the model and the items it should find.
#[derive(Clone, Debug)]
pub struct TestRow {
    /// Order the row comes from.
    pub order_id: OrderId,
    /// Visible items.
    pub visible: BasketVector,
    /// Held-out items, ascending.
    pub held_out: Vec<ItemId>,
}

/// A train/test split of an interaction matrix.
#[derive(Clone, Debug)]
pub struct Split {
    /// Training rows.
    pub train: InteractionMatrix,
    /// Evaluable test rows.
    pub test: Vec<TestRow>,
    /// Test rows skipped because the visible-item policy left no visible or no held-out items.
    pub skipped_rows: usize,
}

impl Split {
    /// Split `matrix` following `scheme`.
    pub fn new(
        matrix: &InteractionMatrix,
        scheme: &EvaluationScheme,
    ) -> Result<Self, InsufficientDataError> {
        let mut rng = XorShiftRng::seed_from_u64(scheme.seed);

        let mut row_ids: Vec<usize> = (0..matrix.num_rows()).collect();
        row_ids.shuffle(&mut rng);

        let num_train = (scheme.train_fraction * row_ids.len() as f64).floor() as usize;
        let (train_ids, test_ids) = row_ids.split_at(num_train);

        if test_ids.is_empty() {
            return Err(InsufficientDataError::NoTestRows {
                num_rows: matrix.num_rows(),
            });
        }

        let mut test = Vec::with_capacity(test_ids.len());
        let mut skipped_rows = 0;

        for row in test_ids.iter().filter_map(|&row_id| matrix.row(row_id)) {
            let visible_count = scheme.given.visible_count(row.len());

            if visible_count < scheme.min_visible || visible_count >= row.len() {
                skipped_rows += 1;
                continue;
            }

            let mut items = row.item_ids.to_vec();
            items.shuffle(&mut rng);

            let (visible, held_out) = items.split_at(visible_count);
            let mut held_out = held_out.to_vec();
            held_out.sort_unstable();

            test.push(TestRow {
                order_id: row.order_id,
                visible: BasketVector::new(matrix.num_items(), visible.to_vec()),
                held_out,
            });
        }

        if skipped_rows > 0 {
            warn!(
                skipped_rows,
                evaluated_rows = test.len(),
                "Test rows skipped by the visible-item policy"
            );
        }

        if test.is_empty() {
            return Err(InsufficientDataError::NoTestRows {
                num_rows: matrix.num_rows(),
            });
        }

        Ok(Split {
            train: matrix.select_rows(train_ids),
            test,
            skipped_rows,
        })
    }
}

/// Summed confusion counts of one algorithm at one cutoff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// List length.
    pub cutoff: usize,
    /// Recommended and held out.
    pub true_positives: u64,
    /// Recommended but not held out.
    pub false_positives: u64,
    /// Neither recommended nor held out.
    pub true_negatives: u64,
    /// Held out but not recommended.
    pub false_negatives: u64,
    /// Test rows contributing to the counts.
    pub rows: usize,
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ConfusionMatrix {
    fn new(cutoff: usize) -> Self {
        ConfusionMatrix {
            cutoff,
            ..Default::default()
        }
    }

    /// Add one test row's outcome.
    ///
    /// `recommended` must hold no visible item and `held_out` must be sorted.
    pub fn add(&mut self, recommended: &[ItemId], held_out: &[ItemId], num_items: usize) {
        let hits = recommended
            .iter()
            .filter(|x| held_out.binary_search(x).is_ok())
            .count();

        let true_positives = hits as u64;
        let false_positives = (recommended.len() - hits) as u64;
        let false_negatives = (held_out.len() - hits) as u64;

        self.true_positives += true_positives;
        self.false_positives += false_positives;
        self.false_negatives += false_negatives;
        self.true_negatives +=
            num_items as u64 - true_positives - false_positives - false_negatives;
        self.rows += 1;
    }

    /// TP / (TP + FP).
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// TP / (TP + FN).
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// True-positive rate; identical to recall.
    pub fn true_positive_rate(&self) -> f64 {
        self.recall()
    }

    /// FP / (FP + TN).
    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.false_positives, self.false_positives + self.true_negatives)
    }

    /// Sum of all four counts.
    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

/// Outcome of evaluating one algorithm.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlgorithmEvaluation {
    /// Algorithm name.
    pub algorithm: String,
    /// One confusion matrix per cutoff, or the reason the model could not be fitted.
    pub outcome: Result<Vec<ConfusionMatrix>, FittingError>,
    /// Test rows whose prediction failed; they are left out of the counts.
    pub failed_predictions: usize,
    /// Time spent fitting.
    pub fit_time: Duration,
    /// Time spent predicting.
    pub predict_time: Duration,
}

/// One line of the comparison table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    /// Algorithm name.
    pub algorithm: String,
    /// List length.
    pub cutoff: usize,
    /// Summed true positives.
    pub true_positives: u64,
    /// Summed false positives.
    pub false_positives: u64,
    /// Summed true negatives.
    pub true_negatives: u64,
    /// Summed false negatives.
    pub false_negatives: u64,
    /// Precision.
    pub precision: f64,
    /// Recall.
    pub recall: f64,
    /// True-positive rate.
    pub tpr: f64,
    /// False-positive rate.
    pub fpr: f64,
}

/// Results of evaluating several algorithms on one split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Columns of the evaluated matrix.
    pub num_items: usize,
    /// Training rows.
    pub train_rows: usize,
    /// Evaluated test rows.
    pub test_rows: usize,
    /// Test rows skipped by the visible-item policy.
    pub skipped_test_rows: usize,
    /// Per-algorithm results, in input order.
    pub results: Vec<AlgorithmEvaluation>,
}

impl EvaluationReport {
    /// The comparison table: one row per fitted algorithm and cutoff.
    pub fn table(&self) -> Vec<MetricsRow> {
        self.results
            .iter()
            .filter_map(|result| {
                result
                    .outcome
                    .as_ref()
                    .ok()
                    .map(|matrices| (result.algorithm.as_str(), matrices))
            })
            .flat_map(|(algorithm, matrices)| {
                matrices.iter().map(move |x| MetricsRow {
                    algorithm: algorithm.to_owned(),
                    cutoff: x.cutoff,
                    true_positives: x.true_positives,
                    false_positives: x.false_positives,
                    true_negatives: x.true_negatives,
                    false_negatives: x.false_negatives,
                    precision: x.precision(),
                    recall: x.recall(),
                    tpr: x.true_positive_rate(),
                    fpr: x.false_positive_rate(),
                })
            })
            .collect()
    }

    /// Algorithms that could not be fitted.
    pub fn failures(&self) -> Vec<&FittingError> {
        self.results
            .iter()
            .filter_map(|x| x.outcome.as_ref().err())
            .collect()
    }

    /// Results of one algorithm.
    pub fn get(&self, algorithm: &str) -> Option<&AlgorithmEvaluation> {
        self.results.iter().find(|x| x.algorithm == algorithm)
    }
}

/// Fit `algorithm` on the split and score it on the test rows.
pub fn evaluate_algorithm(
    algorithm: &Algorithm,
    split: &Split,
    scheme: &EvaluationScheme,
) -> AlgorithmEvaluation {
    let name = algorithm.name();
    let num_items = split.train.num_items();

    let start = Instant::now();
    let fitted = algorithm.fit(&split.train);
    let fit_time = start.elapsed();

    let model = match fitted {
        Ok(model) => model,
        Err(err) => {
            warn!(algorithm = %name, error = %err, "Algorithm could not be fitted");

            return AlgorithmEvaluation {
                algorithm: name,
                outcome: Err(err),
                failed_predictions: 0,
                fit_time,
                predict_time: Duration::default(),
            };
        }
    };

    let start = Instant::now();
    let max_cutoff = scheme.max_cutoff();
    let mut matrices: Vec<ConfusionMatrix> = scheme
        .cutoffs
        .iter()
        .map(|&cutoff| ConfusionMatrix::new(cutoff))
        .collect();
    let mut failed_predictions = 0;

    for row in &split.test {
        // Rankings are deterministic, so every shorter list is a prefix of the longest.
        let recommended = match model.recommend(&row.visible, max_cutoff) {
            Ok(recommended) => crate::models::item_ids(&recommended),
            Err(err) => {
                warn!(algorithm = %name, order_id = row.order_id, error = %err, "Prediction failed");
                failed_predictions += 1;
                continue;
            }
        };

        for matrix in &mut matrices {
            let length = matrix.cutoff.min(recommended.len());
            matrix.add(&recommended[..length], &row.held_out, num_items);
        }
    }

    let predict_time = start.elapsed();

    debug!(
        algorithm = %name,
        fit_ms = fit_time.as_millis() as u64,
        predict_ms = predict_time.as_millis() as u64,
        "Evaluated algorithm"
    );

    AlgorithmEvaluation {
        algorithm: name,
        outcome: Ok(matrices),
        failed_predictions,
        fit_time,
        predict_time,
    }
}

/// Evaluate every algorithm on one split of `matrix`.
///
/// Algorithms are evaluated in parallel; one that cannot be fitted is recorded
/// as a failure without affecting the others.
pub fn evaluate(
    matrix: &InteractionMatrix,
    algorithms: &[Algorithm],
    scheme: &EvaluationScheme,
) -> Result<EvaluationReport, failure::Error> {
    scheme.validate()?;
    for algorithm in algorithms {
        algorithm.validate()?;
    }

    let split = Split::new(matrix, scheme)?;

    let results: Vec<AlgorithmEvaluation> = algorithms
        .par_iter()
        .map(|algorithm| evaluate_algorithm(algorithm, &split, scheme))
        .collect();

    info!(
        algorithms = results.len(),
        train_rows = split.train.num_rows(),
        test_rows = split.test.len(),
        "Evaluation finished"
    );

    Ok(EvaluationReport {
        num_items: matrix.num_items(),
        train_rows: split.train.num_rows(),
        test_rows: split.test.len(),
        skipped_test_rows: split.skipped_rows,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::synthetic_transactions;
    use crate::models::{item_knn, rules, user_knn, Similarity};
    use crate::pipeline::prepare;
    use crate::sampling::SampleConfig;

    fn matrix() -> InteractionMatrix {
        let transactions = synthetic_transactions(400, 40, 9);

        prepare(
            &transactions,
            0.9,
            &SampleConfig::default().sample_size(300).min_basket_items(3),
        )
        .unwrap()
        .matrix
    }

    fn algorithms() -> Vec<Algorithm> {
        vec![
            Algorithm::Random(Default::default()),
            Algorithm::Popularity,
            Algorithm::ItemKnn(item_knn::Hyperparameters::new()),
            Algorithm::UserKnn(
                user_knn::Hyperparameters::new()
                    .similarity(Similarity::Jaccard)
                    .num_neighbours(50),
            ),
            Algorithm::AssociationRules(rules::Hyperparameters::new()),
        ]
    }

    #[test]
    fn visible_counts() {
        assert_eq!(Given::AllBut(1).visible_count(3), 2);
        assert_eq!(Given::AllBut(5).visible_count(3), 0);
        assert_eq!(Given::Fixed(2).visible_count(5), 2);
        assert_eq!(Given::Fixed(9).visible_count(5), 5);
        assert_eq!(Given::Fraction(0.5).visible_count(5), 2);
    }

    #[test]
    fn split_hides_items() {
        let matrix = matrix();
        let scheme = EvaluationScheme::default();
        let split = Split::new(&matrix, &scheme).unwrap();

        assert_eq!(
            split.train.num_rows(),
            (0.9 * matrix.num_rows() as f64).floor() as usize
        );
        assert_eq!(
            split.train.num_rows() + split.test.len() + split.skipped_rows,
            matrix.num_rows()
        );

        for row in &split.test {
            assert_eq!(row.held_out.len(), 1);
            assert!(!row.visible.is_empty());
            assert!(row.held_out.iter().all(|&x| !row.visible.contains(x)));
        }
    }

    fn cut(split: &Split) -> Vec<(OrderId, Vec<ItemId>, Vec<ItemId>)> {
        split
            .test
            .iter()
            .map(|row| (row.order_id, row.visible.item_ids().to_vec(), row.held_out.clone()))
            .collect()
    }

    #[test]
    fn split_is_reproducible() {
        let matrix = matrix();
        let scheme = EvaluationScheme::default().given(Given::Fixed(2));

        let first = Split::new(&matrix, &scheme).unwrap();
        let second = Split::new(&matrix, &scheme).unwrap();

        assert_eq!(first.train.order_ids(), second.train.order_ids());
        assert_eq!(cut(&first), cut(&second));

        let other = Split::new(&matrix, &scheme.clone().seed(scheme.seed + 1)).unwrap();

        assert_ne!(first.train.order_ids(), other.train.order_ids());
        assert_ne!(cut(&first), cut(&other));
    }

    #[test]
    fn fixed_policy_skips_small_rows() {
        let matrix = matrix();
        let scheme = EvaluationScheme::default().given(Given::Fixed(3));
        let split = Split::new(&matrix, &scheme).unwrap();

        // Rows of exactly three items would have nothing left to hold out.
        assert!(split.test.iter().all(|row| row.visible.len() == 3));
        assert!(split.test.iter().all(|row| !row.held_out.is_empty()));
    }

    #[test]
    fn empty_visible_baskets_are_opt_in() {
        let matrix = matrix();
        let strict = Split::new(
            &matrix,
            &EvaluationScheme::default().given(Given::Fixed(0)),
        );
        assert!(strict.is_err());

        let relaxed = Split::new(
            &matrix,
            &EvaluationScheme::default()
                .given(Given::Fixed(0))
                .min_visible(0),
        )
        .unwrap();
        assert!(relaxed.test.iter().all(|row| row.visible.is_empty()));
    }

    #[test]
    fn metric_identities_hold() {
        let matrix = matrix();
        let report = evaluate(&matrix, &algorithms(), &EvaluationScheme::default()).unwrap();

        assert!(report.failures().is_empty());
        assert_eq!(report.table().len(), algorithms().len() * 10);

        for result in &report.results {
            for confusion in result.outcome.as_ref().unwrap() {
                assert_eq!(confusion.rows, report.test_rows);
                assert_eq!(
                    confusion.total(),
                    (report.test_rows * report.num_items) as u64
                );
                assert!((0.0..=1.0).contains(&confusion.precision()));
                assert!((0.0..=1.0).contains(&confusion.recall()));
                assert_eq!(confusion.recall(), confusion.true_positive_rate());
                assert!(confusion.true_positives + confusion.false_positives
                    <= (confusion.cutoff * report.test_rows) as u64);
            }
        }
    }

    #[test]
    fn recall_grows_with_cutoff() {
        let matrix = matrix();
        let report = evaluate(
            &matrix,
            &[Algorithm::Popularity],
            &EvaluationScheme::default(),
        )
        .unwrap();
        let matrices = report.results[0].outcome.as_ref().unwrap();

        for pair in matrices.windows(2) {
            assert!(pair[0].true_positives <= pair[1].true_positives);
        }
    }

    #[test]
    fn confusion_counts_for_a_single_row() {
        let mut confusion = ConfusionMatrix::new(3);
        confusion.add(&[4, 1, 7], &[1, 2], 10);

        assert_eq!(confusion.true_positives, 1);
        assert_eq!(confusion.false_positives, 2);
        assert_eq!(confusion.false_negatives, 1);
        assert_eq!(confusion.true_negatives, 6);
        assert!((confusion.precision() - 1.0 / 3.0).abs() < 1e-12);
        assert!((confusion.recall() - 0.5).abs() < 1e-12);
        assert!((confusion.false_positive_rate() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn fitting_failures_are_isolated() {
        let matrix = matrix();
        let split = Split {
            train: matrix.select_rows(&[]),
            ..Split::new(&matrix, &EvaluationScheme::default()).unwrap()
        };

        let failed = evaluate_algorithm(&Algorithm::Popularity, &split, &Default::default());

        assert_eq!(
            failed.outcome.unwrap_err(),
            FittingError::NoTrainingRows {
                algorithm: "popular".to_owned(),
            }
        );
    }

    #[test]
    fn invalid_schemes_are_rejected() {
        assert!(EvaluationScheme::default().train_fraction(1.0).validate().is_err());
        assert!(EvaluationScheme::default().cutoffs(vec![]).validate().is_err());
        assert!(EvaluationScheme::default().cutoffs(vec![0, 1]).validate().is_err());
        assert!(EvaluationScheme::default().given(Given::AllBut(0)).validate().is_err());
        assert!(EvaluationScheme::default().given(Given::Fraction(1.0)).validate().is_err());
    }
}
