//! Per-category scoring of a fitted model against held-out labels.

use std::fmt;

use log::{info, warn};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use super::error::{ClassifierError, Result};
use super::model::Model;
use super::utils::mean_and_std;
use crate::corpus::LabelMatrix;

/// Scores of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub accuracy: f64,
    /// Macro average over the classes present in the truth or the predictions
    pub precision: f64,
    pub recall: f64,
}

/// Mean and sample standard deviation of one metric across categories
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    fn from_values(values: &[f64]) -> Self {
        let (mean, std) = mean_and_std(values);
        Self { mean, std }
    }
}

/// One row per requested category plus corpus-level summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub categories: Vec<CategoryScore>,
    pub accuracy: MetricSummary,
    pub precision: MetricSummary,
    pub recall: MetricSummary,
}

impl EvaluationReport {
    /// Scores of one category, looked up by name
    pub fn category(&self, name: &str) -> Option<&CategoryScore> {
        self.categories.iter().find(|c| c.category == name)
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .categories
            .iter()
            .map(|c| c.category.len())
            .max()
            .unwrap_or(0)
            .max("target_category".len());
        writeln!(f, "{:<width$}  {:>9}  {:>9}  {:>9}", "target_category", "accuracy", "precision", "recall")?;
        for score in &self.categories {
            writeln!(
                f,
                "{:<width$}  {:>9.4}  {:>9.4}  {:>9.4}",
                score.category, score.accuracy, score.precision, score.recall
            )?;
        }
        writeln!(f, "......")?;
        writeln!(f, "Model Quality:")?;
        writeln!(f, " Model Accuracy:  {:.4} (+/- {:.4})", self.accuracy.mean, self.accuracy.std)?;
        writeln!(f, " Model Precision: {:.4} (+/- {:.4})", self.precision.mean, self.precision.std)?;
        write!(f, " Model Recall:    {:.4} (+/- {:.4})", self.recall.mean, self.recall.std)
    }
}

/// Binary confusion counts of one category
#[derive(Debug, Default, Clone, Copy)]
struct Confusion {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl Confusion {
    fn new(truth: ArrayView1<'_, u8>, predicted: ArrayView1<'_, u8>) -> Self {
        let mut counts = Self::default();
        for (&t, &p) in truth.iter().zip(predicted.iter()) {
            match (t == 1, p == 1) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        counts
    }

    fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    fn accuracy(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        (self.tp + self.tn) as f64 / self.total() as f64
    }

    /// Macro precision and recall over the classes that occur in truth or predictions,
    /// with 0 for any class whose denominator is zero.
    fn macro_precision_recall(&self) -> (f64, f64) {
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        // (precision, recall) of the positive and the negative class
        let positive = (ratio(self.tp, self.tp + self.fp), ratio(self.tp, self.tp + self.fn_));
        let negative = (ratio(self.tn, self.tn + self.fn_), ratio(self.tn, self.tn + self.fp));

        let mut present = Vec::with_capacity(2);
        if self.tn + self.fp + self.fn_ > 0 {
            present.push(negative);
        }
        if self.tp + self.fn_ + self.fp > 0 {
            present.push(positive);
        }
        if present.is_empty() {
            return (0.0, 0.0);
        }
        let n = present.len() as f64;
        (
            present.iter().map(|c| c.0).sum::<f64>() / n,
            present.iter().map(|c| c.1).sum::<f64>() / n,
        )
    }
}

/// Scores a fitted model per category.
#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Predicts `messages` and scores every category in `category_names`, in that order.
    ///
    /// Predictions and truth are matched by category name, never by column position. A category
    /// with no true positives or no predicted positives is reported with precision and recall
    /// of 0 instead of failing the report.
    ///
    /// # Errors
    /// * `ClassifierError::EmptyCategorySet` if `category_names` is empty
    /// * `ClassifierError::DimensionMismatch` if `y_test` does not have one row per message or a
    ///   name is unknown to the model or to `y_test`
    /// * `ClassifierError::NotFitted` if the model has not been fitted
    pub fn evaluate<S: AsRef<str>>(
        &self,
        model: &Model,
        messages: &[S],
        y_test: &LabelMatrix,
        category_names: &[String],
    ) -> Result<EvaluationReport> {
        if category_names.is_empty() {
            return Err(ClassifierError::EmptyCategorySet);
        }
        if messages.len() != y_test.nrows() {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} label rows", messages.len()),
                format!("{} label rows", y_test.nrows()),
            ));
        }

        let y_pred = model.predict(messages)?;
        let mut scores = Vec::with_capacity(category_names.len());
        for name in category_names {
            let pred_idx = model.categories().iter().position(|c| c == name).ok_or_else(|| {
                ClassifierError::dimension_mismatch(
                    format!("category '{}' in the model", name),
                    format!("categories {:?}", model.categories()),
                )
            })?;
            let truth = y_test.column(name).ok_or_else(|| {
                ClassifierError::dimension_mismatch(
                    format!("category '{}' in the test labels", name),
                    format!("categories {:?}", y_test.categories()),
                )
            })?;
            scores.push(score_category(name, truth, y_pred.column(pred_idx)));
        }

        let collect = |metric: fn(&CategoryScore) -> f64| -> Vec<f64> { scores.iter().map(metric).collect() };
        let report = EvaluationReport {
            accuracy: MetricSummary::from_values(&collect(|s| s.accuracy)),
            precision: MetricSummary::from_values(&collect(|s| s.precision)),
            recall: MetricSummary::from_values(&collect(|s| s.recall)),
            categories: scores,
        };
        info!(
            "Evaluated {} categories on {} messages: accuracy {:.4}",
            report.categories.len(),
            messages.len(),
            report.accuracy.mean
        );
        Ok(report)
    }
}

fn score_category(name: &str, truth: ArrayView1<'_, u8>, predicted: ArrayView1<'_, u8>) -> CategoryScore {
    let confusion = Confusion::new(truth, predicted);
    let (precision, recall) = if confusion.tp + confusion.fn_ == 0 || confusion.tp + confusion.fp == 0 {
        warn!(
            "Category '{}' has no true or no predicted positives; precision and recall reported as 0",
            name
        );
        (0.0, 0.0)
    } else {
        confusion.macro_precision_recall()
    };
    CategoryScore {
        category: name.to_string(),
        accuracy: confusion.accuracy(),
        precision,
        recall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_predictions() {
        let truth = array![1u8, 0, 1, 0];
        let score = score_category("water", truth.view(), truth.view());
        assert_eq!(score.accuracy, 1.0);
        assert_eq!(score.precision, 1.0);
        assert_eq!(score.recall, 1.0);
    }

    #[test]
    fn test_all_positive_perfect() {
        let truth = array![1u8, 1, 1];
        let score = score_category("related", truth.view(), truth.view());
        assert_eq!(score.precision, 1.0);
        assert_eq!(score.recall, 1.0);
    }

    #[test]
    fn test_no_positives_is_zero() {
        let truth = array![0u8, 0, 0, 0];
        let score = score_category("fire", truth.view(), truth.view());
        assert_eq!(score.accuracy, 1.0);
        assert_eq!(score.precision, 0.0);
        assert_eq!(score.recall, 0.0);
    }

    #[test]
    fn test_macro_average() {
        // tp=1 fp=1 tn=1 fn=1
        let truth = array![1u8, 1, 0, 0];
        let predicted = array![1u8, 0, 1, 0];
        let score = score_category("food", truth.view(), predicted.view());
        assert_eq!(score.accuracy, 0.5);
        assert!((score.precision - 0.5).abs() < 1e-12);
        assert!((score.recall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_display_has_summary() {
        let report = EvaluationReport {
            categories: vec![CategoryScore {
                category: "water".into(),
                accuracy: 1.0,
                precision: 1.0,
                recall: 1.0,
            }],
            accuracy: MetricSummary { mean: 1.0, std: 0.0 },
            precision: MetricSummary { mean: 1.0, std: 0.0 },
            recall: MetricSummary { mean: 1.0, std: 0.0 },
        };
        let text = report.to_string();
        assert!(text.contains("Model Quality:"));
        assert!(text.contains("Model Accuracy:  1.0000 (+/- 0.0000)"));
        assert!(text.contains("water"));
    }
}
