#![warn(missing_docs)]
//! # mbr
//!
//! `mbr` builds market-basket recommenders from retail order logs: given the
//! items already in a customer's basket, a model recommends the items most
//! likely to complete it. It also contains the harness used to compare
//! recommenders on held-out baskets.
//!
//! The pipeline runs in stages, each returning a new immutable structure:
//! transactions are profiled for popularity, a bounded sample of baskets is
//! drawn from the popular vocabulary, and the baskets are pivoted into a sparse
//! order × item matrix that every model trains on.
//!
//! ## Example
//!
//! ```rust
//! # extern crate mbr;
//! use mbr::data::{Transaction, Transactions};
//! use mbr::matrix::InteractionMatrix;
//! use mbr::models::Algorithm;
//! use mbr::BasketRecommender;
//!
//! let transactions = Transactions::from(vec![
//!     Transaction::new(1, "A"),
//!     Transaction::new(1, "B"),
//!     Transaction::new(1, "C"),
//!     Transaction::new(2, "A"),
//!     Transaction::new(2, "B"),
//!     Transaction::new(3, "A"),
//!     Transaction::new(3, "C"),
//!     Transaction::new(3, "D"),
//! ]);
//!
//! let matrix = InteractionMatrix::from_baskets(&transactions.baskets()).unwrap();
//! let model = Algorithm::Popularity.fit(&matrix).unwrap();
//!
//! let basket = matrix.vocabulary().encode(&["A"]);
//! let recommended = model.recommend(&basket, 1).unwrap();
//!
//! assert_eq!(matrix.vocabulary().name(recommended[0].item_id), Some("B"));
//! ```
#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate failure;

#[macro_use]
extern crate tracing;

extern crate csv;
extern crate ndarray;
extern crate rand;
extern crate rand_xorshift;
extern crate rayon;
extern crate serde;
extern crate serde_json;
extern crate siphasher;

pub mod config;
pub mod data;
pub mod datasets;
pub mod evaluation;
pub mod grid;
pub mod matrix;
pub mod models;
pub mod pipeline;
pub mod profile;
pub mod sampling;

use matrix::BasketVector;

/// Alias for order identifiers.
pub type OrderId = u64;
/// Alias for catalog product identifiers.
pub type ProductId = u64;
/// Alias for column indices of an interaction matrix.
pub type ItemId = usize;

/// Errors raised when the raw transaction data is inconsistent.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum DataIntegrityError {
    /// An order line references a product missing from the catalog.
    #[fail(display = "Order {} references product {} which is not in the catalog.", order_id,
           product_id)]
    UnknownProduct {
        /// Order containing the dangling line.
        order_id: OrderId,
        /// Product id without a catalog entry.
        product_id: ProductId,
    },
    /// The catalog lists the same product id twice.
    #[fail(display = "Product {} appears more than once in the catalog.", product_id)]
    DuplicateProduct {
        /// Repeated product id.
        product_id: ProductId,
    },
}

/// Errors raised when filtering leaves nothing to work with.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum InsufficientDataError {
    /// No transactions were supplied.
    #[fail(display = "No transactions to profile.")]
    NoTransactions,
    /// The popularity cutoff selected no items.
    #[fail(display = "No item falls within popularity cutoff {}.", cutoff)]
    NoPopularItems {
        /// Cutoff in use.
        cutoff: f64,
    },
    /// Sampling and basket-size filtering left no baskets.
    #[fail(display = "None of the {} sampled orders has at least {} popular items.",
           sampled_orders, min_basket_items)]
    NoBaskets {
        /// Orders drawn by the sampler.
        sampled_orders: usize,
        /// Minimum basket size in effect.
        min_basket_items: usize,
    },
    /// The baskets contain no items.
    #[fail(display = "Baskets contain no items.")]
    NoColumns,
    /// The train/test split left no evaluable test rows.
    #[fail(display = "Split of {} rows left no test rows.", num_rows)]
    NoTestRows {
        /// Rows in the matrix being split.
        num_rows: usize,
    },
}

/// Errors raised when a model cannot be fitted.
///
/// Every variant names the algorithm so that failures can be reported
/// alongside the results of the algorithms that did fit.
#[derive(Debug, Fail, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittingError {
    /// The training matrix has no rows.
    #[fail(display = "{}: no training rows.", algorithm)]
    NoTrainingRows {
        /// Name of the algorithm.
        algorithm: String,
    },
    /// The training matrix has no columns.
    #[fail(display = "{}: training matrix has no columns.", algorithm)]
    NoColumns {
        /// Name of the algorithm.
        algorithm: String,
    },
}

impl FittingError {
    /// Name of the algorithm that failed to fit.
    pub fn algorithm(&self) -> &str {
        match self {
            FittingError::NoTrainingRows { algorithm } | FittingError::NoColumns { algorithm } => {
                algorithm
            }
        }
    }
}

/// Prediction error types.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum PredictionError {
    /// The basket was encoded over a different vocabulary than the model's.
    #[fail(display = "Basket is encoded over {} columns but the model knows {}.", basket,
           model)]
    VocabularyMismatch {
        /// Columns of the basket vector.
        basket: usize,
        /// Columns the model was trained on.
        model: usize,
    },
}

/// Out-of-range configuration values.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A parameter lies outside its allowed range.
    #[fail(display = "Invalid {} = {}: must be {}.", parameter, value, constraint)]
    InvalidParameter {
        /// Parameter name.
        parameter: &'static str,
        /// Offending value.
        value: String,
        /// Allowed range.
        constraint: &'static str,
    },
}

impl ConfigurationError {
    pub(crate) fn invalid<T: ToString>(
        parameter: &'static str,
        value: T,
        constraint: &'static str,
    ) -> Self {
        ConfigurationError::InvalidParameter {
            parameter,
            value: value.to_string(),
            constraint,
        }
    }
}

/// A column index together with the score a model gave it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    /// Column index in the model's vocabulary.
    pub item_id: ItemId,
    /// Model score; higher is better.
    pub score: f32,
}

/// Trait describing fitted models that complete partial baskets.
pub trait BasketRecommender {
    /// Number of columns in the vocabulary the model was trained on.
    fn num_items(&self) -> usize;
    /// Recommend at most `n` items not already in `basket`, best first.
    ///
    /// Fewer than `n` items are returned when fewer eligible candidates exist.
    fn recommend(&self, basket: &BasketVector, n: usize)
        -> Result<Vec<ScoredItem>, PredictionError>;
}
