//! Hyperparameter grid search over the evaluation harness.
//!
//! Every point of the grid (similarity × neighbourhood size) instantiates the
//! algorithms of an [`AlgorithmCatalog`] and evaluates them on its own split.
//! Each point derives its seed from the base seed and its id, so the runs are
//! independent of each other and of the order they are executed in.
use std::collections::{BTreeMap, HashSet};
use std::hash::Hasher;

use rayon::prelude::*;
use siphasher::sip::SipHasher;

use crate::evaluation::{evaluate, EvaluationReport, EvaluationScheme, MetricsRow};
use crate::matrix::InteractionMatrix;
use crate::models::{item_knn, random, rules, user_knn, Algorithm, Similarity};
use crate::ConfigurationError;

/// One combination of grid parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GridPoint {
    /// Similarity used by the neighbourhood models.
    pub similarity: Similarity,
    /// Neighbourhood size used by the neighbourhood models.
    pub num_neighbours: usize,
}

impl GridPoint {
    /// Readable identifier, e.g. `cosine-k5`.
    pub fn id(&self) -> String {
        format!("{}-k{}", self.similarity, self.num_neighbours)
    }

    fn seed(&self, base_seed: u64) -> u64 {
        let mut hasher = SipHasher::new_with_keys(base_seed, 0);
        hasher.write(self.id().as_bytes());
        hasher.finish()
    }
}

/// The parameter values to cross.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParameterGrid {
    /// Similarities to try.
    pub similarities: Vec<Similarity>,
    /// Neighbourhood sizes to try.
    pub neighbourhood_sizes: Vec<usize>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        ParameterGrid {
            similarities: vec![Similarity::Cosine, Similarity::Jaccard],
            neighbourhood_sizes: vec![5, 50],
        }
    }
}

impl ParameterGrid {
    /// Check the grid is non-empty and free of repeated values.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let unique_similarities: HashSet<_> = self.similarities.iter().collect();
        if self.similarities.is_empty() || unique_similarities.len() != self.similarities.len() {
            return Err(ConfigurationError::invalid(
                "grid.similarities",
                format!("{:?}", self.similarities),
                "a non-empty list without repeats",
            ));
        }

        let unique_sizes: HashSet<_> = self.neighbourhood_sizes.iter().collect();
        if self.neighbourhood_sizes.is_empty()
            || self.neighbourhood_sizes.contains(&0)
            || unique_sizes.len() != self.neighbourhood_sizes.len()
        {
            return Err(ConfigurationError::invalid(
                "grid.neighbourhood_sizes",
                format!("{:?}", self.neighbourhood_sizes),
                "a non-empty list of distinct positive sizes",
            ));
        }

        Ok(())
    }

    /// All combinations, similarity-major.
    pub fn points(&self) -> Vec<GridPoint> {
        iproduct!(
            self.similarities.iter().cloned(),
            self.neighbourhood_sizes.iter().cloned()
        )
        .map(|(similarity, num_neighbours)| GridPoint {
            similarity,
            num_neighbours,
        })
        .collect()
    }
}

/// The algorithms evaluated at every grid point.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AlgorithmCatalog {
    algorithms: Vec<Algorithm>,
}

impl Default for AlgorithmCatalog {
    fn default() -> Self {
        AlgorithmCatalog {
            algorithms: vec![
                Algorithm::Random(random::Hyperparameters::new()),
                Algorithm::Popularity,
                Algorithm::ItemKnn(item_knn::Hyperparameters::new()),
                Algorithm::UserKnn(user_knn::Hyperparameters::new()),
                Algorithm::AssociationRules(rules::Hyperparameters::new()),
            ],
        }
    }
}

impl AlgorithmCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        AlgorithmCatalog {
            algorithms: Vec::new(),
        }
    }

    /// Add an algorithm template.
    pub fn with(mut self, algorithm: Algorithm) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    /// The templates.
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    /// The templates with the grid point's parameters applied.
    pub fn instantiate(&self, point: &GridPoint, seed: u64) -> Vec<Algorithm> {
        self.algorithms
            .iter()
            .cloned()
            .map(|algorithm| {
                algorithm
                    .with_similarity(point.similarity)
                    .with_num_neighbours(point.num_neighbours)
                    .with_seed(seed)
            })
            .collect()
    }

    /// Check every template.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.algorithms.is_empty() {
            return Err(ConfigurationError::invalid(
                "algorithms",
                "[]",
                "at least one algorithm",
            ));
        }

        self.algorithms.iter().map(|x| x.validate()).collect()
    }
}

/// The evaluation of one grid point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridRun {
    /// Parameters of the run.
    pub point: GridPoint,
    /// Seed of the run's split and randomised models.
    pub seed: u64,
    /// Results of the run.
    pub report: EvaluationReport,
}

/// One line of the combined comparison table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridMetricsRow {
    /// Grid point id.
    pub combination: String,
    /// Metrics of one algorithm at one cutoff.
    #[serde(flatten)]
    pub metrics: MetricsRow,
}

/// Results of a grid search, keyed by grid point id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridReport {
    /// Runs by id.
    pub runs: BTreeMap<String, GridRun>,
}

impl GridReport {
    /// Number of runs.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether there are no runs.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// The run of one grid point.
    pub fn get(&self, id: &str) -> Option<&GridRun> {
        self.runs.get(id)
    }

    /// All comparison tables concatenated, tagged with their grid point.
    pub fn table(&self) -> Vec<GridMetricsRow> {
        self.runs
            .iter()
            .flat_map(|(id, run)| {
                run.report.table().into_iter().map(move |metrics| GridMetricsRow {
                    combination: id.clone(),
                    metrics,
                })
            })
            .collect()
    }
}

/// Evaluate the catalog at every point of the grid.
pub fn run_grid(
    matrix: &InteractionMatrix,
    catalog: &AlgorithmCatalog,
    grid: &ParameterGrid,
    scheme: &EvaluationScheme,
) -> Result<GridReport, failure::Error> {
    grid.validate()?;
    catalog.validate()?;
    scheme.validate()?;

    let points = grid.points();

    info!(
        points = points.len(),
        algorithms = catalog.len(),
        "Starting grid search"
    );

    let runs = points
        .par_iter()
        .map(|point| -> Result<(String, GridRun), failure::Error> {
            let seed = point.seed(scheme.seed);
            let scheme = scheme.clone().seed(seed);
            let algorithms = catalog.instantiate(point, seed);

            let report = evaluate(matrix, &algorithms, &scheme)?;

            info!(point = %point.id(), seed, "Finished grid point");

            Ok((
                point.id(),
                GridRun {
                    point: *point,
                    seed,
                    report,
                },
            ))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(GridReport { runs })
}
