//! Item purchase frequencies and the popular-item cutoff.
use std::collections::{HashMap, HashSet};

use crate::data::Transactions;
use crate::{ConfigurationError, InsufficientDataError};

/// Purchase statistics of a single item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemFrequency {
    /// Product name.
    pub product_name: String,
    /// Number of order lines containing the product.
    pub count: u64,
    /// `count` as a share of all order lines.
    pub share: f64,
    /// Share of this item and every item ranked above it.
    pub cumulative_share: f64,
    /// Whether the cumulative share is within the popularity cutoff.
    pub is_popular: bool,
}

/// Item frequencies, ranked by descending count.
///
/// Ties are broken by ascending product name so that the ranking (and with it
/// the popular set) is deterministic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrequencyProfile {
    entries: Vec<ItemFrequency>,
    total: u64,
    cutoff: f64,
}

impl FrequencyProfile {
    /// Profile `transactions`, marking items popular while their cumulative
    /// share stays within `popularity_cutoff`.
    pub fn new(
        transactions: &Transactions,
        popularity_cutoff: f64,
    ) -> Result<Self, failure::Error> {
        if !(popularity_cutoff > 0.0 && popularity_cutoff <= 1.0) {
            return Err(
                ConfigurationError::invalid("popularity_cutoff", popularity_cutoff, "in (0, 1]")
                    .into(),
            );
        }

        if transactions.is_empty() {
            return Err(InsufficientDataError::NoTransactions.into());
        }

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for transaction in transactions.data() {
            *counts.entry(transaction.product_name()).or_insert(0) += 1;
        }

        let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let total = transactions.len() as u64;
        let mut running = 0;

        let entries = ranked
            .into_iter()
            .map(|(name, count)| {
                running += count;

                // Shares come from integer running counts, so the last one is exactly 1.0.
                let cumulative_share = running as f64 / total as f64;

                ItemFrequency {
                    product_name: name.to_owned(),
                    count,
                    share: count as f64 / total as f64,
                    cumulative_share,
                    is_popular: cumulative_share <= popularity_cutoff,
                }
            })
            .collect();

        Ok(FrequencyProfile {
            entries,
            total,
            cutoff: popularity_cutoff,
        })
    }

    /// All entries in rank order.
    pub fn entries(&self) -> &[ItemFrequency] {
        &self.entries
    }

    /// Total number of order lines profiled.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// The cutoff used to label popular items.
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Popular product names in rank order.
    pub fn popular_items(&self) -> Vec<&str> {
        self.entries
            .iter()
            .take_while(|x| x.is_popular)
            .map(|x| x.product_name.as_str())
            .collect()
    }

    /// Popular product names as a lookup set.
    pub fn popular_vocabulary(&self) -> HashSet<String> {
        self.popular_items()
            .into_iter()
            .map(|x| x.to_owned())
            .collect()
    }

    /// Number of popular items.
    pub fn num_popular(&self) -> usize {
        self.entries.iter().take_while(|x| x.is_popular).count()
    }
}
