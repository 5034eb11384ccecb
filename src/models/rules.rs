//! Association-rule model.
//!
//! Frequent itemsets are mined level by level (Apriori). Candidates of size `k`
//! are counted by enumerating the size-`k` subsets of each training row whose
//! `k - 1`-subsets are all frequent, so only itemsets that actually occur are ever
//! counted and a minimum support of zero stays bounded by the data.
//!
//! Rules have a single consequent, `X => y`, and are matched against a basket
//! when `X` is contained in it and `y` is not.
use std::collections::{HashMap, HashSet};

use itertools::Itertools;

use super::{check_basket, top_n_from};
use crate::matrix::{BasketVector, InteractionMatrix};
use crate::{BasketRecommender, ConfigurationError, ItemId, PredictionError, ScoredItem};

/// Rule statistic used to rank consequents.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleMeasure {
    /// P(y | X).
    Confidence,
    /// Confidence over P(y).
    Lift,
    /// P(X ∪ {y}).
    Support,
}

/// Hyperparameters of the association-rule model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Hyperparameters {
    pub(crate) min_support: f64,
    pub(crate) min_confidence: f64,
    max_len: usize,
    measure: RuleMeasure,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            min_support: 0.01,
            min_confidence: 0.01,
            max_len: 3,
            measure: RuleMeasure::Confidence,
        }
    }
}

impl Hyperparameters {
    /// Build new hyperparameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum itemset support.
    pub fn min_support(mut self, min_support: f64) -> Self {
        self.min_support = min_support;
        self
    }

    /// Set the minimum rule confidence.
    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Set the largest itemset (antecedent plus consequent) mined.
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Set the measure used to rank consequents.
    pub fn measure(mut self, measure: RuleMeasure) -> Self {
        self.measure = measure;
        self
    }

    /// Check the hyperparameters are in range.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=1.0).contains(&self.min_support) {
            return Err(ConfigurationError::invalid(
                "rules.min_support",
                self.min_support,
                "in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigurationError::invalid(
                "rules.min_confidence",
                self.min_confidence,
                "in [0, 1]",
            ));
        }
        if self.max_len < 2 {
            return Err(ConfigurationError::invalid(
                "rules.max_len",
                self.max_len,
                "at least 2",
            ));
        }

        Ok(())
    }

    /// Mine the rules of `train`.
    pub fn fit(&self, train: &InteractionMatrix) -> RulesModel {
        let num_rows = train.num_rows();
        let is_frequent = |count: usize| {
            count > 0 && count as f64 >= self.min_support * num_rows as f64
        };

        let mut counts: HashMap<Vec<ItemId>, usize> = HashMap::new();
        let item_counts = train.column_counts();
        let frequent_items: HashSet<ItemId> = (0..train.num_items())
            .filter(|&item_id| is_frequent(item_counts[item_id]))
            .collect();

        for &item_id in &frequent_items {
            counts.insert(vec![item_id], item_counts[item_id]);
        }

        let rows: Vec<Vec<ItemId>> = train
            .iter_rows()
            .map(|row| {
                row.item_ids
                    .iter()
                    .cloned()
                    .filter(|x| frequent_items.contains(x))
                    .collect()
            })
            .collect();

        let mut previous_level: HashSet<Vec<ItemId>> =
            frequent_items.iter().map(|&x| vec![x]).collect();

        for size in 2..=self.max_len {
            let mut candidates: HashMap<Vec<ItemId>, usize> = HashMap::new();

            for row in rows.iter().filter(|row| row.len() >= size) {
                for itemset in row.iter().cloned().combinations(size) {
                    if all_subsets_frequent(&itemset, &previous_level) {
                        *candidates.entry(itemset).or_insert(0) += 1;
                    }
                }
            }

            let level: HashMap<Vec<ItemId>, usize> = candidates
                .into_iter()
                .filter(|&(_, count)| is_frequent(count))
                .collect();

            if level.is_empty() {
                break;
            }

            previous_level = level.keys().cloned().collect();
            counts.extend(level);
        }

        let mut rules = Vec::new();

        for (itemset, &count) in counts.iter().filter(|(itemset, _)| itemset.len() > 1) {
            for (idx, &consequent) in itemset.iter().enumerate() {
                let antecedent: Vec<ItemId> = itemset
                    .iter()
                    .enumerate()
                    .filter(|&(other, _)| other != idx)
                    .map(|(_, &x)| x)
                    .collect();

                let antecedent_count = match counts.get(&antecedent) {
                    Some(&antecedent_count) => antecedent_count,
                    None => continue,
                };

                let confidence = count as f64 / antecedent_count as f64;
                if confidence < self.min_confidence {
                    continue;
                }

                let consequent_support = item_counts[consequent] as f64 / num_rows as f64;

                rules.push(Rule {
                    antecedent,
                    consequent,
                    support: count as f64 / num_rows as f64,
                    confidence,
                    lift: confidence / consequent_support,
                });
            }
        }

        rules.sort_by(|a, b| {
            a.antecedent
                .cmp(&b.antecedent)
                .then_with(|| a.consequent.cmp(&b.consequent))
        });

        // Rules are reached through the smallest item of their antecedent.
        let mut by_first_item = vec![Vec::new(); train.num_items()];
        for (idx, rule) in rules.iter().enumerate() {
            by_first_item[rule.antecedent[0]].push(idx);
        }

        debug!(
            itemsets = counts.len(),
            rules = rules.len(),
            "Mined association rules"
        );

        RulesModel {
            num_items: train.num_items(),
            measure: self.measure,
            rules,
            by_first_item,
        }
    }
}

fn all_subsets_frequent(itemset: &[ItemId], previous_level: &HashSet<Vec<ItemId>>) -> bool {
    (0..itemset.len()).all(|skip| {
        let subset: Vec<ItemId> = itemset
            .iter()
            .enumerate()
            .filter(|&(idx, _)| idx != skip)
            .map(|(_, &x)| x)
            .collect();

        previous_level.contains(&subset)
    })
}

/// An association rule `antecedent => consequent`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Sorted antecedent items.
    pub antecedent: Vec<ItemId>,
    /// Consequent item.
    pub consequent: ItemId,
    /// Share of training rows containing antecedent and consequent.
    pub support: f64,
    /// Share of rows containing the antecedent that also contain the consequent.
    pub confidence: f64,
    /// Confidence relative to the consequent's own support.
    pub lift: f64,
}

impl Rule {
    fn measure(&self, measure: RuleMeasure) -> f64 {
        match measure {
            RuleMeasure::Confidence => self.confidence,
            RuleMeasure::Lift => self.lift,
            RuleMeasure::Support => self.support,
        }
    }
}

/// Fitted association-rule model.
#[derive(Clone, Debug)]
pub struct RulesModel {
    num_items: usize,
    measure: RuleMeasure,
    rules: Vec<Rule>,
    by_first_item: Vec<Vec<usize>>,
}

impl RulesModel {
    /// All mined rules, ordered by antecedent then consequent.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules whose antecedent is contained in `basket`.
    pub fn matching_rules<'a>(
        &'a self,
        basket: &'a BasketVector,
    ) -> impl Iterator<Item = &'a Rule> + 'a {
        basket
            .item_ids()
            .iter()
            .flat_map(move |&item_id| self.by_first_item[item_id].iter())
            .map(move |&idx| &self.rules[idx])
            .filter(move |rule| rule.antecedent.iter().all(|&x| basket.contains(x)))
    }
}

impl BasketRecommender for RulesModel {
    fn num_items(&self) -> usize {
        self.num_items
    }

    fn recommend(
        &self,
        basket: &BasketVector,
        n: usize,
    ) -> Result<Vec<ScoredItem>, PredictionError> {
        check_basket(basket, self.num_items)?;

        let mut best: HashMap<ItemId, f64> = HashMap::new();

        for rule in self.matching_rules(basket) {
            let value = rule.measure(self.measure);
            let entry = best.entry(rule.consequent).or_insert(value);
            if value > *entry {
                *entry = value;
            }
        }

        Ok(top_n_from(
            best.into_iter().map(|(item_id, score)| ScoredItem {
                item_id,
                score: score as f32,
            }),
            basket,
            n,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::scenario;
    use super::*;
    use crate::models::item_ids;

    #[test]
    fn mines_expected_rules() {
        let matrix = scenario();
        let model = Hyperparameters::new().max_len(2).fit(&matrix);

        let rule = model
            .rules()
            .iter()
            .find(|x| x.antecedent == vec![2] && x.consequent == 3)
            .unwrap();

        // C => D: {C, D} in one of three orders, C in two.
        assert!((rule.support - 1.0 / 3.0).abs() < 1e-9);
        assert!((rule.confidence - 0.5).abs() < 1e-9);
        assert!((rule.lift - 1.5).abs() < 1e-9);
        assert!(model.rules().iter().all(|x| x.antecedent.len() == 1));
    }

    #[test]
    fn ranks_by_chosen_measure() {
        let matrix = scenario();
        let basket = matrix.vocabulary().encode(&["C"]);

        let by_confidence = Hyperparameters::new().fit(&matrix);
        let by_lift = Hyperparameters::new().measure(RuleMeasure::Lift).fit(&matrix);

        assert_eq!(
            item_ids(&by_confidence.recommend(&basket, 3).unwrap()),
            vec![0, 1, 3]
        );
        assert_eq!(
            item_ids(&by_lift.recommend(&basket, 3).unwrap()),
            vec![3, 0, 1]
        );
    }

    #[test]
    fn longer_antecedents_are_matched() {
        let matrix = scenario();
        let model = Hyperparameters::new().fit(&matrix);
        let basket = matrix.vocabulary().encode(&["A", "B"]);

        assert!(model
            .matching_rules(&basket)
            .any(|x| x.antecedent == vec![0, 1] && x.consequent == 2));

        // A => C has confidence 2 / 3, beating {A, B} => C at 1 / 2.
        let recommended = model.recommend(&basket, 5).unwrap();
        assert_eq!(item_ids(&recommended), vec![2, 3]);
        assert!((recommended[0].score - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn zero_thresholds_are_bounded_by_candidates() {
        let matrix = scenario();
        let model = Hyperparameters::new()
            .min_support(0.0)
            .min_confidence(0.0)
            .fit(&matrix);

        for basket in &[vec!["A"], vec!["A", "B", "C"], vec!["A", "B", "C", "D"]] {
            let basket = matrix.vocabulary().encode(basket);
            let recommended = model.recommend(&basket, 10).unwrap();

            assert!(recommended.len() <= matrix.num_items() - basket.len());
        }
    }

    #[test]
    fn high_support_leaves_no_rules() {
        let matrix = scenario();
        let model = Hyperparameters::new().min_support(0.9).fit(&matrix);

        assert!(model.rules().is_empty());
        assert!(model
            .recommend(&matrix.vocabulary().encode(&["A"]), 3)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn validation() {
        assert!(Hyperparameters::new().min_support(1.5).validate().is_err());
        assert!(Hyperparameters::new().min_confidence(-0.1).validate().is_err());
        assert!(Hyperparameters::new().max_len(1).validate().is_err());
    }
}
