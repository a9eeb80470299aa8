//! Data models for the extraction-classification pipeline

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ai::parsing::{lenient_amount, lenient_optional_amount};
use crate::taxonomy::MainCategory;

/// A debit line read off a statement, before classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLineItem {
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: f64,
}

/// A statement line assigned to a budget subcategory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedLineItem {
    pub subcategory: String,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: f64,
}

/// Receipt fields exactly as the model returned them
///
/// Every field is optional so gaps in otherwise valid JSON can be repaired
/// instead of failing the whole decode.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawReceipt {
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
}

/// Validated result of a receipt analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptData {
    pub merchant: String,
    pub amount: f64,
    /// Transaction date as returned by the model (expected `YYYY-MM-DD`)
    pub date: String,
    pub category: MainCategory,
    pub subcategory: String,
}

impl ReceiptData {
    /// The receipt date, if the model produced a valid `YYYY-MM-DD` value
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").ok()
    }
}

/// How repeated subcategories combine when building a budget plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Later lines overwrite earlier ones
    #[default]
    Replace,
    /// Amounts for the same subcategory are added up
    Sum,
}

/// Budgeted amount per subcategory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetPlan {
    pub amounts: BTreeMap<String, f64>,
}

impl BudgetPlan {
    /// Build a plan from classified statement lines
    pub fn from_items(items: &[ClassifiedLineItem], strategy: MergeStrategy) -> Self {
        let mut plan = Self::default();
        plan.merge(items, strategy);
        plan
    }

    /// Fold classified lines into an existing plan
    pub fn merge(&mut self, items: &[ClassifiedLineItem], strategy: MergeStrategy) {
        for item in items {
            match strategy {
                MergeStrategy::Replace => {
                    self.amounts.insert(item.subcategory.clone(), item.amount);
                }
                MergeStrategy::Sum => {
                    *self.amounts.entry(item.subcategory.clone()).or_insert(0.0) += item.amount;
                }
            }
        }
    }

    pub fn get(&self, subcategory: &str) -> Option<f64> {
        self.amounts.get(subcategory).copied()
    }

    pub fn total(&self) -> f64 {
        self.amounts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }
}
