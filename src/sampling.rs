//! Bounded, seeded sampling of baskets over the popular vocabulary.
use std::collections::HashSet;

use rand::seq::index;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use crate::data::{Basket, Transactions};
use crate::profile::FrequencyProfile;
use crate::{ConfigurationError, InsufficientDataError, OrderId};

/// Sampler settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    /// Maximum number of orders to draw.
    pub sample_size: usize,
    /// Baskets with fewer distinct popular items are dropped.
    pub min_basket_items: usize,
    /// Seed of the order draw.
    pub seed: u64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        SampleConfig {
            sample_size: 20_000,
            min_basket_items: 3,
            seed: 42,
        }
    }
}

impl SampleConfig {
    /// Set the maximum number of sampled orders.
    pub fn sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Set the minimum basket size.
    pub fn min_basket_items(mut self, min_basket_items: usize) -> Self {
        self.min_basket_items = min_basket_items;
        self
    }

    /// Set the sampling seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.sample_size == 0 {
            return Err(ConfigurationError::invalid(
                "sample_size",
                self.sample_size,
                "at least 1",
            ));
        }
        if self.min_basket_items == 0 {
            return Err(ConfigurationError::invalid(
                "min_basket_items",
                self.min_basket_items,
                "at least 1",
            ));
        }

        Ok(())
    }
}

/// Baskets drawn by the sampler, with an account of everything left out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BasketSample {
    /// Retained baskets, ordered by order id.
    pub baskets: Vec<Basket>,
    /// Requested sample size.
    pub requested: usize,
    /// Distinct orders with at least one popular item.
    pub available_orders: usize,
    /// Orders actually drawn: `min(requested, available_orders)`.
    pub sampled_orders: usize,
    /// Drawn orders dropped for having too few popular items.
    pub dropped_small_baskets: usize,
    /// Order lines dropped because their item is not popular.
    pub dropped_transactions: usize,
}

impl BasketSample {
    /// Whether fewer baskets were retained than requested.
    pub fn is_short(&self) -> bool {
        self.baskets.len() < self.requested
    }

    /// Order ids of the retained baskets.
    pub fn order_ids(&self) -> Vec<OrderId> {
        self.baskets.iter().map(|x| x.order_id).collect()
    }
}

/// Draw a sample of baskets restricted to the popular items of `profile`.
pub fn sample_baskets(
    transactions: &Transactions,
    profile: &FrequencyProfile,
    config: &SampleConfig,
) -> Result<BasketSample, failure::Error> {
    config.validate()?;

    let vocabulary = profile.popular_vocabulary();
    if vocabulary.is_empty() {
        return Err(InsufficientDataError::NoPopularItems {
            cutoff: profile.cutoff(),
        }
        .into());
    }

    let (popular, dropped_transactions) = transactions.restrict_to(&vocabulary);
    let order_ids = popular.order_ids();
    let available_orders = order_ids.len();
    let sampled_orders = config.sample_size.min(available_orders);

    let mut rng = XorShiftRng::seed_from_u64(config.seed);
    let drawn: HashSet<OrderId> = index::sample(&mut rng, available_orders, sampled_orders)
        .into_iter()
        .map(|idx| order_ids[idx])
        .collect();

    let (sampled, _) = popular.restrict_to_orders(&drawn);
    let (baskets, small): (Vec<Basket>, Vec<Basket>) = sampled
        .baskets()
        .into_iter()
        .partition(|basket| basket.len() >= config.min_basket_items);

    if baskets.is_empty() {
        return Err(InsufficientDataError::NoBaskets {
            sampled_orders,
            min_basket_items: config.min_basket_items,
        }
        .into());
    }

    let sample = BasketSample {
        baskets,
        requested: config.sample_size,
        available_orders,
        sampled_orders,
        dropped_small_baskets: small.len(),
        dropped_transactions,
    };

    if sample.is_short() {
        warn!(
            requested = sample.requested,
            retained = sample.baskets.len(),
            available_orders,
            dropped_small_baskets = sample.dropped_small_baskets,
            "Basket sample is smaller than requested"
        );
    }

    info!(
        baskets = sample.baskets.len(),
        dropped_transactions,
        "Sampled baskets"
    );

    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Transaction;
    use crate::datasets::synthetic_transactions;

    fn sample(seed: u64) -> BasketSample {
        let transactions = synthetic_transactions(500, 60, 3);
        let profile = FrequencyProfile::new(&transactions, 0.8).unwrap();

        sample_baskets(
            &transactions,
            &profile,
            &SampleConfig::default()
                .sample_size(100)
                .min_basket_items(3)
                .seed(seed),
        )
        .unwrap()
    }

    #[test]
    fn same_seed_same_sample() {
        assert_eq!(sample(11).order_ids(), sample(11).order_ids());
        assert_ne!(sample(11).order_ids(), sample(12).order_ids());
    }

    #[test]
    fn baskets_respect_minimum_size() {
        let sample = sample(5);

        assert!(sample.sampled_orders <= 100);
        assert!(sample.baskets.len() + sample.dropped_small_baskets == sample.sampled_orders);
        assert!(sample.baskets.iter().all(|basket| basket.len() >= 3));
    }

    #[test]
    fn short_samples_are_reported() {
        let transactions = synthetic_transactions(20, 10, 3);
        let profile = FrequencyProfile::new(&transactions, 1.0).unwrap();
        let sample = sample_baskets(
            &transactions,
            &profile,
            &SampleConfig::default().sample_size(1000).min_basket_items(1),
        )
        .unwrap();

        assert!(sample.is_short());
        assert_eq!(sample.sampled_orders, sample.available_orders);
        assert_eq!(sample.baskets.len(), 20);
    }

    #[test]
    fn empty_popular_set_fails() {
        let transactions = Transactions::from(vec![
            Transaction::new(1, "a"),
            Transaction::new(2, "a"),
            Transaction::new(3, "a"),
            Transaction::new(1, "b"),
            Transaction::new(2, "b"),
            Transaction::new(3, "c"),
        ]);
        // "a" alone covers half of the lines.
        let profile = FrequencyProfile::new(&transactions, 0.3).unwrap();

        let err = sample_baskets(&transactions, &profile, &SampleConfig::default()).unwrap_err();

        assert_eq!(
            err.downcast_ref::<InsufficientDataError>(),
            Some(&InsufficientDataError::NoPopularItems { cutoff: 0.3 })
        );
    }

    #[test]
    fn impossible_filters_fail() {
        let transactions = synthetic_transactions(20, 10, 3);
        let profile = FrequencyProfile::new(&transactions, 1.0).unwrap();

        assert!(sample_baskets(
            &transactions,
            &profile,
            &SampleConfig::default().min_basket_items(100),
        )
        .is_err());
    }
}
