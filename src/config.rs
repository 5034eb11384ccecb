//! Run configuration.
//!
//! Every field has a default, so a configuration file only needs to name what
//! it changes:
//!
//! ```json
//! {
//!     "popularity_cutoff": 0.6,
//!     "sample": { "sample_size": 5000 },
//!     "evaluation": { "given": { "policy": "fixed", "value": 2 } },
//!     "grid": { "neighbourhood_sizes": [10, 100] }
//! }
//! ```
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::datasets::MissingProductPolicy;
use crate::evaluation::EvaluationScheme;
use crate::grid::{AlgorithmCatalog, ParameterGrid};
use crate::models::Algorithm;
use crate::sampling::SampleConfig;
use crate::ConfigurationError;

/// Settings of a complete run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// What to do with order lines whose product is not in the catalog.
    pub missing_products: MissingProductPolicy,
    /// Cumulative share of order lines covered by the popular items.
    pub popularity_cutoff: f64,
    /// Basket sampling.
    pub sample: SampleConfig,
    /// Train/test split and scoring.
    pub evaluation: EvaluationScheme,
    /// Algorithm templates evaluated at every grid point.
    pub algorithms: Vec<Algorithm>,
    /// Grid of neighbourhood parameters.
    pub grid: ParameterGrid,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            missing_products: MissingProductPolicy::default(),
            popularity_cutoff: 0.5,
            sample: SampleConfig::default(),
            evaluation: EvaluationScheme::default(),
            algorithms: AlgorithmCatalog::default().algorithms().to_vec(),
            grid: ParameterGrid::default(),
        }
    }
}

impl Config {
    /// Read a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, failure::Error> {
        let reader = BufReader::new(File::open(path)?);
        let config: Config = serde_json::from_reader(reader)?;

        config.validate()?;

        Ok(config)
    }

    /// The algorithm catalog described by `algorithms`.
    pub fn catalog(&self) -> AlgorithmCatalog {
        self.algorithms
            .iter()
            .cloned()
            .fold(AlgorithmCatalog::new(), |catalog, algorithm| {
                catalog.with(algorithm)
            })
    }

    /// Check every setting is in range.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.popularity_cutoff > 0.0 && self.popularity_cutoff <= 1.0) {
            return Err(ConfigurationError::invalid(
                "popularity_cutoff",
                self.popularity_cutoff,
                "in (0, 1]",
            ));
        }

        self.sample.validate()?;
        self.evaluation.validate()?;
        self.catalog().validate()?;
        self.grid.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::Given;
    use crate::models::{user_knn, Similarity};

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.sample.sample_size, 20_000);
        assert_eq!(config.sample.min_basket_items, 3);
        assert_eq!(config.evaluation.given, Given::AllBut(1));
        assert_eq!(config.evaluation.cutoffs, (1..=10).collect::<Vec<_>>());
        assert_eq!(config.catalog().len(), 5);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "popularity_cutoff": 0.6,
                "sample": { "sample_size": 5000 },
                "evaluation": { "given": { "policy": "fixed", "value": 2 } },
                "algorithms": [
                    { "type": "popularity" },
                    { "type": "user_knn", "similarity": "jaccard", "num_neighbours": 30 }
                ],
                "grid": { "neighbourhood_sizes": [10, 100] }
            }"#,
        )
        .unwrap();

        assert_eq!(config.popularity_cutoff, 0.6);
        assert_eq!(config.sample.sample_size, 5000);
        assert_eq!(config.sample.min_basket_items, 3);
        assert_eq!(config.evaluation.given, Given::Fixed(2));
        assert_eq!(config.evaluation.train_fraction, 0.9);
        assert_eq!(
            config.algorithms[1],
            Algorithm::UserKnn(
                user_knn::Hyperparameters::new()
                    .similarity(Similarity::Jaccard)
                    .num_neighbours(30)
            )
        );
        assert_eq!(config.grid.similarities.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let mut config = Config::default();
        config.popularity_cutoff = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sample.min_basket_items = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.algorithms = vec![];
        assert!(config.validate().is_err());
    }
}
