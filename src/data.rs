//! Transaction records and the baskets they group into.
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::OrderId;

/// A single order line: one product bought as part of one order.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct Transaction {
    order_id: OrderId,
    product_name: String,
}

impl Transaction {
    /// Build a new transaction.
    pub fn new<S: Into<String>>(order_id: OrderId, product_name: S) -> Self {
        Transaction {
            order_id,
            product_name: product_name.into(),
        }
    }

    /// The order this line belongs to.
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// The product bought.
    pub fn product_name(&self) -> &str {
        &self.product_name
    }
}

/// The set of products bought in one order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Basket {
    /// Order identifier.
    pub order_id: OrderId,
    /// Distinct product names, in ascending order.
    pub items: BTreeSet<String>,
}

impl Basket {
    /// Number of distinct items in the basket.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the basket holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A collection of transactions.
#[derive(Clone, Debug, Default)]
pub struct Transactions {
    transactions: Vec<Transaction>,
}

impl Transactions {
    /// Build an empty collection.
    pub fn new() -> Self {
        Transactions {
            transactions: Vec::new(),
        }
    }

    /// The underlying records.
    pub fn data(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether there are no transactions.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Distinct order identifiers, ascending.
    pub fn order_ids(&self) -> Vec<OrderId> {
        self.transactions
            .iter()
            .map(|x| x.order_id())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Keep only the transactions accepted by `func`.
    ///
    /// Returns the retained transactions and the number dropped.
    pub fn filter_by<F: Fn(&Transaction) -> bool>(&self, func: F) -> (Self, usize) {
        let retained: Vec<Transaction> = self.transactions
            .iter()
            .filter(|x| func(*x))
            .cloned()
            .collect();
        let dropped = self.len() - retained.len();

        (Transactions::from(retained), dropped)
    }

    /// Keep only transactions whose product is in `vocabulary`.
    pub fn restrict_to(&self, vocabulary: &HashSet<String>) -> (Self, usize) {
        self.filter_by(|x| vocabulary.contains(x.product_name()))
    }

    /// Keep only transactions belonging to the given orders.
    pub fn restrict_to_orders(&self, order_ids: &HashSet<OrderId>) -> (Self, usize) {
        self.filter_by(|x| order_ids.contains(&x.order_id()))
    }

    /// Group transactions into baskets, ordered by order id.
    ///
    /// Repeated products within an order collapse into one basket item.
    pub fn baskets(&self) -> Vec<Basket> {
        let mut grouped: BTreeMap<OrderId, BTreeSet<String>> = BTreeMap::new();

        for transaction in &self.transactions {
            grouped
                .entry(transaction.order_id())
                .or_insert_with(BTreeSet::new)
                .insert(transaction.product_name().to_owned());
        }

        grouped
            .into_iter()
            .map(|(order_id, items)| Basket { order_id, items })
            .collect()
    }
}

impl From<Vec<Transaction>> for Transactions {
    fn from(data: Vec<Transaction>) -> Transactions {
        Transactions { transactions: data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Transactions {
        Transactions::from(vec![
            Transaction::new(2, "milk"),
            Transaction::new(1, "bread"),
            Transaction::new(1, "milk"),
            Transaction::new(1, "milk"),
            Transaction::new(3, "eggs"),
        ])
    }

    #[test]
    fn baskets_deduplicate_items() {
        let baskets = fixture().baskets();

        assert_eq!(baskets.len(), 3);
        assert_eq!(baskets[0].order_id, 1);
        assert_eq!(baskets[0].len(), 2);
        assert_eq!(baskets[1].order_id, 2);
    }

    #[test]
    fn restriction_counts_dropped_lines() {
        let vocabulary: HashSet<String> = vec!["milk".to_owned()].into_iter().collect();
        let (retained, dropped) = fixture().restrict_to(&vocabulary);

        assert_eq!(retained.len(), 3);
        assert_eq!(dropped, 2);
        assert_eq!(retained.order_ids(), vec![1, 2]);
    }
}
