//! Mapping between corpus labels, model scores and the stored integer encoding.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentoError};

/// Per-label scores emitted by a classifier, in the classifier's label order.
pub type CategoryScores = IndexMap<String, f32>;

/// Per-label gold annotation (1.0 for the true label, 0.0 otherwise).
pub type GoldCategories = IndexMap<String, f32>;

/// Three-valued polarity stored in `statuses.sentiment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SentimentCategory {
    /// `N`, stored as -1.
    Negative,
    /// `NEU`, stored as 0.
    Neutral,
    /// `P`, stored as 1.
    Positive,
}

impl SentimentCategory {
    /// Every category, in training label order.
    pub const ALL: [Self; 3] = [Self::Positive, Self::Negative, Self::Neutral];

    /// Corpus/model label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Negative => "N",
            Self::Neutral => "NEU",
            Self::Positive => "P",
        }
    }

    /// Integer written to the store.
    #[must_use]
    pub const fn value(self) -> i16 {
        match self {
            Self::Negative => -1,
            Self::Neutral => 0,
            Self::Positive => 1,
        }
    }

    /// Inverse of [`Self::value`].
    #[must_use]
    pub const fn from_value(value: i16) -> Option<Self> {
        match value {
            -1 => Some(Self::Negative),
            0 => Some(Self::Neutral),
            1 => Some(Self::Positive),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SentimentCategory {
    type Err = SentoError;

    fn from_str(label: &str) -> Result<Self> {
        to_category(label)
    }
}

impl From<SentimentCategory> for String {
    fn from(category: SentimentCategory) -> Self {
        category.label().to_owned()
    }
}

impl TryFrom<String> for SentimentCategory {
    type Error = SentoError;

    fn try_from(label: String) -> Result<Self> {
        to_category(&label)
    }
}

/// Exact-match lookup of a label. Case and whitespace are significant.
pub fn to_category(label: &str) -> Result<SentimentCategory> {
    match label {
        "N" => Ok(SentimentCategory::Negative),
        "NEU" => Ok(SentimentCategory::Neutral),
        "P" => Ok(SentimentCategory::Positive),
        other => Err(SentoError::UnknownLabel(other.to_owned())),
    }
}

/// Picks the highest scoring label; the first one seen wins ties.
pub fn from_model_scores(scores: &CategoryScores) -> Result<SentimentCategory> {
    let mut best: Option<(&str, f32)> = None;
    for (label, &score) in scores {
        if score.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((label.as_str(), score));
        }
    }
    match best {
        Some((label, _)) => to_category(label),
        None if scores.is_empty() => Err(SentoError::EmptyScores),
        None => Err(SentoError::Classification(
            "every category score is NaN".into(),
        )),
    }
}

/// One-hot gold annotation over all categories, in training label order.
#[must_use]
pub fn gold_categories(category: SentimentCategory) -> GoldCategories {
    SentimentCategory::ALL
        .iter()
        .map(|candidate| {
            let hit = if *candidate == category { 1.0 } else { 0.0 };
            (candidate.label().to_owned(), hit)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f32)]) -> CategoryScores {
        pairs
            .iter()
            .map(|(label, score)| ((*label).to_owned(), *score))
            .collect()
    }

    #[test]
    fn labels_round_trip() {
        for label in ["N", "NEU", "P"] {
            assert_eq!(to_category(label).unwrap().label(), label);
        }
        for category in SentimentCategory::ALL {
            assert_eq!(
                SentimentCategory::from_value(category.value()),
                Some(category)
            );
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(matches!(
            to_category("XYZ"),
            Err(SentoError::UnknownLabel(label)) if label == "XYZ"
        ));
        assert!(to_category("p").is_err());
        assert!(to_category("NONE").is_err());
    }

    #[test]
    fn nan_score_never_wins() {
        let picked =
            from_model_scores(&scores(&[("P", f32::NAN), ("N", 0.2), ("NEU", 0.1)])).unwrap();
        assert_eq!(picked, SentimentCategory::Negative);
        let trailing = from_model_scores(&scores(&[("NEU", 0.1), ("P", f32::NAN)])).unwrap();
        assert_eq!(trailing, SentimentCategory::Neutral);
    }

    #[test]
    fn all_nan_scores_are_a_classification_error() {
        let all_nan = scores(&[("P", f32::NAN), ("N", f32::NAN), ("NEU", f32::NAN)]);
        let err = from_model_scores(&all_nan).unwrap_err();
        assert!(matches!(err, SentoError::Classification(_)));
    }

    #[test]
    fn max_score_selects_category() {
        let picked = from_model_scores(&scores(&[("P", 0.3), ("N", 0.3), ("NEU", 0.4)])).unwrap();
        assert_eq!(picked, SentimentCategory::Neutral);
        assert_eq!(picked.value(), 0);
    }

    #[test]
    fn ties_resolve_to_first_seen_label() {
        let picked = from_model_scores(&scores(&[("N", 0.5), ("P", 0.5), ("NEU", 0.1)])).unwrap();
        assert_eq!(picked, SentimentCategory::Negative);
    }

    #[test]
    fn empty_or_foreign_scores_fail() {
        assert!(matches!(
            from_model_scores(&CategoryScores::new()),
            Err(SentoError::EmptyScores)
        ));
        assert!(matches!(
            from_model_scores(&scores(&[("MIXED", 0.9), ("P", 0.1)])),
            Err(SentoError::UnknownLabel(_))
        ));
    }

    #[test]
    fn gold_is_one_hot() {
        let gold = gold_categories(SentimentCategory::Negative);
        assert_eq!(gold.keys().collect::<Vec<_>>(), vec!["P", "N", "NEU"]);
        assert_eq!(gold["N"], 1.0);
        assert_eq!(gold.values().sum::<f32>(), 1.0);
    }
}
