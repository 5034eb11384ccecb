//! Loading order logs and product catalogs.
//!
//! The readers accept Instacart-style CSV files: a product catalog with at
//! least `product_id` and `product_name` columns, and order lines with at least
//! `order_id` and `product_id` columns. Any other columns are ignored.
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::data::{Transaction, Transactions};
use crate::{DataIntegrityError, OrderId, ProductId};

/// A catalog entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// Catalog identifier.
    pub product_id: ProductId,
    /// Human-readable name; used as the item key everywhere downstream.
    pub product_name: String,
}

/// One product within one order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderLine {
    /// Order identifier.
    pub order_id: OrderId,
    /// Catalog identifier of the product bought.
    pub product_id: ProductId,
}

/// What to do with order lines whose product is missing from the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingProductPolicy {
    /// Abort the load with a `DataIntegrityError`.
    Fail,
    /// Drop the line, log a warning and count it.
    DropAndWarn,
}

impl Default for MissingProductPolicy {
    fn default() -> Self {
        MissingProductPolicy::Fail
    }
}

/// Result of joining order lines against the catalog.
#[derive(Debug)]
pub struct LoadedTransactions {
    /// Joined transactions.
    pub transactions: Transactions,
    /// Lines dropped because their product is not in the catalog.
    pub dropped_lines: usize,
}

/// Read a product catalog from CSV.
pub fn read_products<R: Read>(reader: R) -> Result<Vec<Product>, failure::Error> {
    let mut reader = csv::Reader::from_reader(reader);
    let products = reader.deserialize().collect::<Result<Vec<Product>, _>>()?;

    Ok(products)
}

/// Read order lines from CSV.
pub fn read_order_lines<R: Read>(reader: R) -> Result<Vec<OrderLine>, failure::Error> {
    let mut reader = csv::Reader::from_reader(reader);
    let lines = reader.deserialize().collect::<Result<Vec<OrderLine>, _>>()?;

    Ok(lines)
}

/// Join order lines with the catalog into named transactions.
pub fn join(
    products: &[Product],
    order_lines: &[OrderLine],
    policy: MissingProductPolicy,
) -> Result<LoadedTransactions, DataIntegrityError> {
    let mut names: HashMap<ProductId, &str> = HashMap::with_capacity(products.len());

    for product in products {
        if names
            .insert(product.product_id, &product.product_name)
            .is_some()
        {
            return Err(DataIntegrityError::DuplicateProduct {
                product_id: product.product_id,
            });
        }
    }

    let mut transactions = Vec::with_capacity(order_lines.len());
    let mut dropped_lines = 0;

    for line in order_lines {
        match names.get(&line.product_id) {
            Some(name) => transactions.push(Transaction::new(line.order_id, *name)),
            None => match policy {
                MissingProductPolicy::Fail => {
                    return Err(DataIntegrityError::UnknownProduct {
                        order_id: line.order_id,
                        product_id: line.product_id,
                    })
                }
                MissingProductPolicy::DropAndWarn => {
                    warn!(
                        order_id = line.order_id,
                        product_id = line.product_id,
                        "Dropping order line with unknown product"
                    );
                    dropped_lines += 1;
                }
            },
        }
    }

    if dropped_lines > 0 {
        warn!(dropped_lines, "Order lines dropped during catalog join");
    }

    Ok(LoadedTransactions {
        transactions: Transactions::from(transactions),
        dropped_lines,
    })
}

/// Load and join a catalog file and an order-lines file.
pub fn load_transactions<P: AsRef<Path>, Q: AsRef<Path>>(
    products_path: P,
    order_lines_path: Q,
    policy: MissingProductPolicy,
) -> Result<LoadedTransactions, failure::Error> {
    let products = read_products(File::open(products_path)?)?;
    let order_lines = read_order_lines(File::open(order_lines_path)?)?;

    info!(
        products = products.len(),
        order_lines = order_lines.len(),
        "Read transaction sources"
    );

    Ok(join(&products, &order_lines, policy)?)
}

/// Generate a synthetic order log with a skewed item distribution.
///
/// Product `i` is named `item-{i:04}`; lower indices are bought more often.
/// The output depends only on the arguments.
pub fn synthetic_transactions(num_orders: usize, num_products: usize, seed: u64) -> Transactions {
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let basket_size = Uniform::new_inclusive(1, 12);
    let mut transactions = Vec::new();

    if num_products == 0 {
        return Transactions::from(transactions);
    }

    for order_id in 0..num_orders {
        for _ in 0..basket_size.sample(&mut rng) {
            // Squaring a uniform draw skews mass towards the head of the catalog.
            let draw: f64 = rng.gen();
            let product = ((draw * draw) * num_products as f64) as usize;

            transactions.push(Transaction::new(
                order_id as OrderId,
                format!("item-{:04}", product.min(num_products - 1)),
            ));
        }
    }

    Transactions::from(transactions)
}
