use serde::{Deserialize, Serialize};

use crate::{
    classifier::TextClassifier,
    error::Result,
    labels::{CategoryScores, GoldCategories},
};

const DECISION_THRESHOLD: f32 = 0.5;
const EPSILON: f64 = 1e-8;

/// Micro-averaged precision, recall and F1 over every (document, label) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// `tp / (tp + fp)`.
    pub precision: f64,
    /// `tp / (tp + fn)`.
    pub recall: f64,
    /// Harmonic mean of precision and recall, 0 when both are 0.
    pub f_score: f64,
}

#[derive(Debug, Clone, Copy)]
struct Confusion {
    tp: f64,
    fp: f64,
    tn: f64,
    fn_: f64,
}

impl Default for Confusion {
    fn default() -> Self {
        Self {
            tp: 0.0,
            fp: EPSILON,
            tn: 0.0,
            fn_: EPSILON,
        }
    }
}

impl Confusion {
    fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.tp += 1.0,
            (true, false) => self.fp += 1.0,
            (false, false) => self.tn += 1.0,
            (false, true) => self.fn_ += 1.0,
        }
    }

    fn metrics(self) -> Metrics {
        let precision = self.tp / (self.tp + self.fp);
        let recall = self.tp / (self.tp + self.fn_);
        let f_score = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Metrics {
            precision,
            recall,
            f_score,
        }
    }
}

/// Scores paired with gold annotations. Labels missing from the gold side are skipped.
pub fn evaluate<'a>(
    pairs: impl IntoIterator<Item = (&'a CategoryScores, &'a GoldCategories)>,
) -> Metrics {
    let mut confusion = Confusion::default();
    for (scores, gold) in pairs {
        for (label, &score) in scores {
            let Some(&truth) = gold.get(label) else {
                continue;
            };
            confusion.record(score >= DECISION_THRESHOLD, truth >= DECISION_THRESHOLD);
        }
    }
    confusion.metrics()
}

/// Classifies every text and evaluates the scores against its gold annotation.
pub fn evaluate_classifier<'a, C>(
    classifier: &C,
    examples: impl IntoIterator<Item = (&'a str, &'a GoldCategories)>,
) -> Result<Metrics>
where
    C: TextClassifier + ?Sized,
{
    let mut scored = Vec::new();
    for (text, gold) in examples {
        scored.push((classifier.classify(text)?, gold));
    }
    Ok(evaluate(scored.iter().map(|(scores, gold)| (scores, *gold))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f32)]) -> CategoryScores {
        pairs
            .iter()
            .map(|(label, value)| ((*label).to_owned(), *value))
            .collect()
    }

    #[test]
    fn perfect_prediction_scores_one() {
        let scores = map(&[("P", 1.0)]);
        let gold = map(&[("P", 1.0)]);
        let metrics = evaluate([(&scores, &gold)]);
        assert!((metrics.precision - 1.0).abs() < 1e-6);
        assert!((metrics.recall - 1.0).abs() < 1e-6);
        assert!((metrics.f_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn no_positives_fall_back_to_zero() {
        let scores = map(&[("P", 0.1), ("N", 0.2)]);
        let gold = map(&[("P", 0.0), ("N", 0.0)]);
        let metrics = evaluate([(&scores, &gold)]);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f_score, 0.0);

        let empty = evaluate(std::iter::empty());
        assert_eq!(empty.f_score, 0.0);
    }

    #[test]
    fn labels_missing_from_gold_are_ignored() {
        let scores = map(&[("P", 0.9), ("N", 0.8), ("NEU", 0.1)]);
        let gold = map(&[("P", 1.0), ("NEU", 0.0)]);
        let metrics = evaluate([(&scores, &gold)]);
        assert!((metrics.precision - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mixed_outcomes() {
        // tp = 1, fp = 1, fn = 1 over two documents
        let first = (map(&[("P", 0.7), ("N", 0.6)]), map(&[("P", 1.0), ("N", 0.0)]));
        let second = (map(&[("P", 0.2), ("N", 0.1)]), map(&[("P", 1.0), ("N", 0.0)]));
        let metrics = evaluate([(&first.0, &first.1), (&second.0, &second.1)]);
        assert!((metrics.precision - 0.5).abs() < 1e-6);
        assert!((metrics.recall - 0.5).abs() < 1e-6);
        assert!((metrics.f_score - 0.5).abs() < 1e-6);
    }
}
