//! Sparse order × item interaction matrices.
//!
//! Rows are stored in compressed sparse row form: `row_pointers[r]..row_pointers[r + 1]`
//! indexes the sorted column ids and values of row `r`. The column vocabulary is
//! frozen when the matrix is built and shared (via `Arc`) with everything
//! derived from it, so that new baskets are always encoded against exactly the
//! columns a model was trained on.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::data::Basket;
use crate::{InsufficientDataError, ItemId, OrderId};

/// Frozen, sorted column names of an interaction matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Vocabulary {
    names: Vec<String>,
    index: HashMap<String, ItemId>,
}

impl Vocabulary {
    /// Build a vocabulary from any collection of names.
    ///
    /// Names are sorted and deduplicated.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|x| x.into())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index = names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        Vocabulary { names, index }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Column names in column order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name of a column.
    pub fn name(&self, item_id: ItemId) -> Option<&str> {
        self.names.get(item_id).map(|x| x.as_str())
    }

    /// Column of a name.
    pub fn get(&self, name: &str) -> Option<ItemId> {
        self.index.get(name).cloned()
    }

    /// Encode a basket of names as a vector over this vocabulary.
    ///
    /// Names outside the vocabulary are ignored with a warning; use
    /// [`Vocabulary::encode_checked`] to get them back.
    pub fn encode<S: AsRef<str>>(&self, names: &[S]) -> BasketVector {
        let (basket, unknown) = self.encode_checked(names);

        if !unknown.is_empty() {
            warn!(unknown = ?unknown, "Ignoring basket items outside the vocabulary");
        }

        basket
    }

    /// Encode a basket of names, returning the names that were not recognised.
    pub fn encode_checked<S: AsRef<str>>(&self, names: &[S]) -> (BasketVector, Vec<String>) {
        let mut unknown = Vec::new();
        let mut item_ids = Vec::with_capacity(names.len());

        for name in names {
            match self.get(name.as_ref()) {
                Some(item_id) => item_ids.push(item_id),
                None => unknown.push(name.as_ref().to_owned()),
            }
        }

        (BasketVector::new(self.len(), item_ids), unknown)
    }
}

/// A partial basket encoded as a binary vector over a vocabulary.
///
/// Only the present columns are stored, sorted and deduplicated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketVector {
    num_items: usize,
    item_ids: Vec<ItemId>,
}

impl BasketVector {
    /// Build a basket vector; ids are sorted, deduplicated and must be below `num_items`.
    pub fn new(num_items: usize, mut item_ids: Vec<ItemId>) -> Self {
        item_ids.sort_unstable();
        item_ids.dedup();
        item_ids.retain(|&x| x < num_items);

        BasketVector { num_items, item_ids }
    }

    /// Number of columns of the vocabulary the basket is encoded over.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Present columns, ascending.
    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    /// Number of present items.
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether no item is present.
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    /// Whether `item_id` is present.
    pub fn contains(&self, item_id: ItemId) -> bool {
        self.item_ids.binary_search(&item_id).is_ok()
    }

    /// Dense 0/1 representation.
    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0.0; self.num_items];
        for &item_id in &self.item_ids {
            dense[item_id] = 1.0;
        }
        dense
    }
}

/// Normalisations applicable to weighted matrices before similarity models use them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Subtract the mean of each row's stored values.
    RowCentering,
    /// Scale each row to unit L2 norm.
    UnitLength,
}

impl Normalization {
    fn apply(self, values: &mut [f32]) {
        if values.is_empty() {
            return;
        }

        match self {
            Normalization::RowCentering => {
                let mean = values.iter().sum::<f32>() / values.len() as f32;
                for value in values.iter_mut() {
                    *value -= mean;
                }
            }
            Normalization::UnitLength => {
                let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for value in values.iter_mut() {
                        *value /= norm;
                    }
                }
            }
        }
    }
}

/// Sparse order × item matrix.
#[derive(Clone, Debug)]
pub struct InteractionMatrix {
    vocabulary: Arc<Vocabulary>,
    order_ids: Vec<OrderId>,
    row_pointers: Vec<usize>,
    item_ids: Vec<ItemId>,
    values: Vec<f32>,
    binary: bool,
}

/// A borrowed row of an interaction matrix.
#[derive(Debug, Clone, Copy)]
pub struct MatrixRow<'a> {
    /// Row index.
    pub row_id: usize,
    /// Order the row was built from.
    pub order_id: OrderId,
    /// Present columns, ascending.
    pub item_ids: &'a [ItemId],
    /// Values of the present columns.
    pub values: &'a [f32],
}

impl<'a> MatrixRow<'a> {
    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether the row is empty.
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

impl InteractionMatrix {
    /// Pivot baskets into a binary matrix, one row per basket.
    ///
    /// The vocabulary is the sorted union of all basket items.
    pub fn from_baskets(baskets: &[Basket]) -> Result<Self, InsufficientDataError> {
        let rows = baskets
            .iter()
            .map(|basket| {
                let items: Vec<(String, f32)> =
                    basket.items.iter().map(|x| (x.clone(), 1.0)).collect();
                (basket.order_id, items)
            })
            .collect::<Vec<_>>();

        let mut matrix = Self::from_weighted_rows(rows)?;
        matrix.binary = true;

        Ok(matrix)
    }

    /// Build a weighted matrix from `(order_id, [(name, weight)])` rows.
    ///
    /// Repeated names within a row have their weights summed.
    pub fn from_weighted_rows(
        rows: Vec<(OrderId, Vec<(String, f32)>)>,
    ) -> Result<Self, InsufficientDataError> {
        if rows.is_empty() {
            return Err(InsufficientDataError::NoBaskets {
                sampled_orders: 0,
                min_basket_items: 0,
            });
        }

        let vocabulary = Vocabulary::new(
            rows.iter()
                .flat_map(|(_, items)| items.iter().map(|(name, _)| name.as_str())),
        );

        if vocabulary.is_empty() {
            return Err(InsufficientDataError::NoColumns);
        }

        let mut order_ids = Vec::with_capacity(rows.len());
        let mut row_pointers = Vec::with_capacity(rows.len() + 1);
        let mut item_ids = Vec::new();
        let mut values = Vec::new();

        row_pointers.push(0);

        for (order_id, items) in rows {
            let mut row: BTreeMap<ItemId, f32> = BTreeMap::new();
            for (name, weight) in items {
                // Every name is in the vocabulary by construction.
                if let Some(item_id) = vocabulary.get(&name) {
                    *row.entry(item_id).or_insert(0.0) += weight;
                }
            }

            for (item_id, value) in row {
                item_ids.push(item_id);
                values.push(value);
            }

            order_ids.push(order_id);
            row_pointers.push(item_ids.len());
        }

        let matrix = InteractionMatrix {
            vocabulary: Arc::new(vocabulary),
            order_ids,
            row_pointers,
            item_ids,
            values,
            binary: false,
        };

        debug!(
            rows = matrix.num_rows(),
            columns = matrix.num_items(),
            density = matrix.density(),
            "Built interaction matrix"
        );

        Ok(matrix)
    }

    /// Return a copy with every row normalised.
    ///
    /// The result is no longer binary even when the input was.
    pub fn normalized(&self, normalization: Normalization) -> Self {
        let mut normalized = self.clone();

        for row_id in 0..self.num_rows() {
            let (start, stop) = (self.row_pointers[row_id], self.row_pointers[row_id + 1]);
            normalization.apply(&mut normalized.values[start..stop]);
        }

        normalized.binary = false;
        normalized
    }

    /// Keep only the given rows, in the given order.
    ///
    /// The vocabulary is shared with `self`, so columns keep their meaning.
    pub fn select_rows(&self, row_ids: &[usize]) -> Self {
        let mut order_ids = Vec::with_capacity(row_ids.len());
        let mut row_pointers = Vec::with_capacity(row_ids.len() + 1);
        let mut item_ids = Vec::new();
        let mut values = Vec::new();

        row_pointers.push(0);

        for row in row_ids.iter().filter_map(|&row_id| self.row(row_id)) {
            order_ids.push(row.order_id);
            item_ids.extend_from_slice(row.item_ids);
            values.extend_from_slice(row.values);
            row_pointers.push(item_ids.len());
        }

        InteractionMatrix {
            vocabulary: self.vocabulary.clone(),
            order_ids,
            row_pointers,
            item_ids,
            values,
            binary: self.binary,
        }
    }

    /// Get a single row.
    pub fn row(&self, row_id: usize) -> Option<MatrixRow> {
        if row_id >= self.num_rows() {
            return None;
        }

        let start = self.row_pointers[row_id];
        let stop = self.row_pointers[row_id + 1];

        Some(MatrixRow {
            row_id,
            order_id: self.order_ids[row_id],
            item_ids: &self.item_ids[start..stop],
            values: &self.values[start..stop],
        })
    }

    /// Iterate over rows.
    pub fn iter_rows(&self) -> MatrixRowIterator {
        MatrixRowIterator {
            matrix: self,
            idx: 0,
        }
    }

    /// The frozen column vocabulary.
    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    /// Order ids, in row order.
    pub fn order_ids(&self) -> &[OrderId] {
        &self.order_ids
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.order_ids.len()
    }

    /// Number of columns.
    pub fn num_items(&self) -> usize {
        self.vocabulary.len()
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_items())
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.item_ids.len()
    }

    /// Fraction of cells that are stored.
    pub fn density(&self) -> f64 {
        let cells = self.num_rows() * self.num_items();

        if cells == 0 {
            0.0
        } else {
            self.nnz() as f64 / cells as f64
        }
    }

    /// Whether every stored value is a presence flag.
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Number of items in each row.
    pub fn row_sums(&self) -> Vec<usize> {
        self.row_pointers.windows(2).map(|x| x[1] - x[0]).collect()
    }

    /// Number of rows containing each column.
    pub fn column_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_items()];
        for &item_id in &self.item_ids {
            counts[item_id] += 1;
        }
        counts
    }

    /// Rows containing each column, as `(row_id, value)` lists.
    pub fn to_columns(&self) -> Vec<Vec<(usize, f32)>> {
        let mut columns = vec![Vec::new(); self.num_items()];

        for row in self.iter_rows() {
            for (&item_id, &value) in row.item_ids.iter().zip(row.values) {
                columns[item_id].push((row.row_id, value));
            }
        }

        columns
    }
}

/// Iterator over the rows of an [`InteractionMatrix`].
pub struct MatrixRowIterator<'a> {
    matrix: &'a InteractionMatrix,
    idx: usize,
}

impl<'a> Iterator for MatrixRowIterator<'a> {
    type Item = MatrixRow<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        let value = self.matrix.row(self.idx);

        self.idx += 1;

        value
    }
}
