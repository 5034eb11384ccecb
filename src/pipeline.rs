//! The preparation stages chained together: profile, sample, pivot.
use crate::config::Config;
use crate::data::Transactions;
use crate::grid::{run_grid, GridReport};
use crate::matrix::InteractionMatrix;
use crate::profile::FrequencyProfile;
use crate::sampling::{sample_baskets, BasketSample, SampleConfig};

/// Everything produced on the way from transactions to the interaction matrix.
#[derive(Clone, Debug)]
pub struct PreparedData {
    /// Item frequencies over all transactions.
    pub profile: FrequencyProfile,
    /// Sampled baskets and what was dropped getting there.
    pub sample: BasketSample,
    /// Binary matrix over the sampled baskets.
    pub matrix: InteractionMatrix,
}

/// Profile `transactions`, sample baskets from the popular items and pivot them.
pub fn prepare(
    transactions: &Transactions,
    popularity_cutoff: f64,
    sample_config: &SampleConfig,
) -> Result<PreparedData, failure::Error> {
    let profile = FrequencyProfile::new(transactions, popularity_cutoff)?;

    info!(
        items = profile.entries().len(),
        popular = profile.num_popular(),
        cutoff = popularity_cutoff,
        "Profiled item frequencies"
    );

    let sample = sample_baskets(transactions, &profile, sample_config)?;
    let matrix = InteractionMatrix::from_baskets(&sample.baskets)?;

    info!(
        rows = matrix.num_rows(),
        columns = matrix.num_items(),
        density = matrix.density(),
        "Prepared interaction matrix"
    );

    Ok(PreparedData {
        profile,
        sample,
        matrix,
    })
}

/// Prepare the matrix and run the configured grid over it.
pub fn run(
    transactions: &Transactions,
    config: &Config,
) -> Result<(PreparedData, GridReport), failure::Error> {
    config.validate()?;

    let prepared = prepare(transactions, config.popularity_cutoff, &config.sample)?;
    let report = run_grid(
        &prepared.matrix,
        &config.catalog(),
        &config.grid,
        &config.evaluation,
    )?;

    Ok((prepared, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Transaction;

    #[test]
    fn small_order_log() {
        let transactions = Transactions::from(vec![
            Transaction::new(1, "A"),
            Transaction::new(1, "B"),
            Transaction::new(1, "C"),
            Transaction::new(2, "A"),
            Transaction::new(2, "B"),
            Transaction::new(3, "A"),
            Transaction::new(3, "C"),
            Transaction::new(3, "D"),
            Transaction::new(4, "D"),
        ]);

        let prepared = prepare(
            &transactions,
            1.0,
            &SampleConfig::default().sample_size(10).min_basket_items(2),
        )
        .unwrap();

        // Order 4 has a single item.
        assert_eq!(prepared.sample.dropped_small_baskets, 1);
        assert_eq!(prepared.matrix.order_ids(), &[1, 2, 3]);
        assert_eq!(prepared.matrix.num_items(), 4);
    }
}
