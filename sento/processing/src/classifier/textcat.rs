use std::{
    collections::HashMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use indexmap::IndexSet;
use ndarray::{s, Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{TextClassifier, Tokenizer, TrainableClassifier, UpdateSettings};
use crate::{
    error::{Result, SentoError},
    labels::{CategoryScores, GoldCategories, SentimentCategory},
};

/// File name of the serialized model inside a model directory.
pub const MODEL_FILE: &str = "textcat.json";

const FORMAT_VERSION: u32 = 1;
const LOG_FLOOR: f32 = 1e-7;

#[derive(Debug, Clone)]
struct Averages {
    weights: Array2<f32>,
    bias: Array1<f32>,
    steps: u32,
}

/// Bag-of-words categorizer with one independent sigmoid output per label.
///
/// Rows of `weights` follow the insertion order of `vocab`; columns follow `labels`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCategorizer {
    format_version: u32,
    labels: Vec<String>,
    tokenizer: Tokenizer,
    vocab: IndexSet<String>,
    weights: Array2<f32>,
    bias: Array1<f32>,
    #[serde(skip)]
    averages: Option<Averages>,
}

impl TextCategorizer {
    /// Creates an untrained categorizer over `labels`.
    #[must_use]
    pub fn new<L: Into<String>>(labels: impl IntoIterator<Item = L>) -> Self {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let width = labels.len();
        Self {
            format_version: FORMAT_VERSION,
            labels,
            tokenizer: Tokenizer::default(),
            vocab: IndexSet::new(),
            weights: Array2::zeros((0, width)),
            bias: Array1::zeros(width),
            averages: None,
        }
    }

    /// Untrained categorizer over `P`, `N`, `NEU`.
    #[must_use]
    pub fn sentiment() -> Self {
        Self::new(SentimentCategory::ALL.iter().map(|category| category.label()))
    }

    /// Replaces the feature extractor. Only meaningful before training.
    #[must_use]
    pub const fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Number of known features.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Loads a model from a directory containing [`MODEL_FILE`], or from the file itself.
    pub fn from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_path = if path.is_dir() {
            path.join(MODEL_FILE)
        } else {
            path.to_path_buf()
        };
        let file = File::open(&file_path).map_err(|err| {
            SentoError::Model(format!("opening {}: {err}", file_path.display()))
        })?;
        let model: Self = serde_json::from_reader(BufReader::new(file))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(SentoError::Model(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.labels.is_empty() {
            return Err(SentoError::Model("model has no labels".into()));
        }
        let expected = (self.vocab.len(), self.labels.len());
        if self.weights.dim() != expected || self.bias.len() != self.labels.len() {
            return Err(SentoError::Model(format!(
                "weight shape {:?} / bias {} does not match vocab {} x labels {}",
                self.weights.dim(),
                self.bias.len(),
                expected.0,
                expected.1
            )));
        }
        Ok(())
    }

    fn feature_rows(&self, text: &str) -> Vec<usize> {
        self.tokenizer
            .features(text)
            .iter()
            .filter_map(|feature| self.vocab.get_index_of(feature))
            .collect()
    }

    fn logits(&self, rows: &[usize], scale: f32) -> Array1<f32> {
        let mut logits = self.bias.clone();
        for &row in rows {
            logits.scaled_add(scale, &self.weights.row(row));
        }
        logits
    }

    fn accumulate_average(&mut self) {
        let stale = self
            .averages
            .as_ref()
            .map_or(true, |avg| avg.weights.dim() != self.weights.dim());
        if stale {
            self.averages = Some(Averages {
                weights: self.weights.clone(),
                bias: self.bias.clone(),
                steps: 0,
            });
        }
        if let Some(averages) = self.averages.as_mut() {
            averages.steps += 1;
            #[allow(clippy::cast_precision_loss)]
            let rate = 1.0 / averages.steps as f32;
            averages
                .weights
                .zip_mut_with(&self.weights, |avg, &current| *avg += (current - *avg) * rate);
            averages
                .bias
                .zip_mut_with(&self.bias, |avg, &current| *avg += (current - *avg) * rate);
        }
    }
}

fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

impl TextClassifier for TextCategorizer {
    fn classify(&self, text: &str) -> Result<CategoryScores> {
        let logits = self.logits(&self.feature_rows(text), 1.0);
        Ok(self
            .labels
            .iter()
            .cloned()
            .zip(logits.iter().map(|&logit| sigmoid(logit)))
            .collect())
    }
}

impl TrainableClassifier for TextCategorizer {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn begin_training<'t>(&mut self, texts: impl IntoIterator<Item = &'t str>) {
        let known = self.vocab.len();
        for text in texts {
            self.vocab.extend(self.tokenizer.features(text));
        }
        if self.vocab.len() > known {
            let mut grown = Array2::zeros((self.vocab.len(), self.labels.len()));
            grown.slice_mut(s![..known, ..]).assign(&self.weights);
            self.weights = grown;
        }
        self.averages = Some(Averages {
            weights: self.weights.clone(),
            bias: self.bias.clone(),
            steps: 0,
        });
    }

    fn update<R: Rng>(
        &mut self,
        batch: &[(&str, &GoldCategories)],
        settings: UpdateSettings,
        rng: &mut R,
    ) -> Result<f32> {
        if !(0.0..1.0).contains(&settings.dropout) {
            return Err(SentoError::Configuration(format!(
                "dropout must be in [0, 1), got {}",
                settings.dropout
            )));
        }
        if batch.is_empty() {
            return Ok(0.0);
        }
        let width = self.labels.len();
        let keep_scale = 1.0 / (1.0 - settings.dropout);
        let mut row_grads: HashMap<usize, Array1<f32>> = HashMap::new();
        let mut bias_grad = Array1::<f32>::zeros(width);
        let mut loss = 0.0;

        for (text, gold) in batch {
            let rows: Vec<usize> = self
                .feature_rows(text)
                .into_iter()
                .filter(|_| rng.gen::<f32>() >= settings.dropout)
                .collect();
            let logits = self.logits(&rows, keep_scale);
            let mut delta = Array1::<f32>::zeros(width);
            for (column, label) in self.labels.iter().enumerate() {
                // labels absent from the annotation contribute no gradient
                let Some(&truth) = gold.get(label) else {
                    continue;
                };
                let predicted = sigmoid(logits[column]);
                delta[column] = predicted - truth;
                loss -= truth * predicted.max(LOG_FLOOR).ln()
                    + (1.0 - truth) * (1.0 - predicted).max(LOG_FLOOR).ln();
            }
            bias_grad += &delta;
            for row in rows {
                row_grads
                    .entry(row)
                    .or_insert_with(|| Array1::zeros(width))
                    .scaled_add(keep_scale, &delta);
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let step = settings.learning_rate / batch.len() as f32;
        self.bias.scaled_add(-step, &bias_grad);
        for (row, grad) in row_grads {
            self.weights.row_mut(row).scaled_add(-step, &grad);
        }
        self.accumulate_average();
        Ok(loss)
    }

    fn averaged(&self) -> Self {
        let mut copy = self.clone();
        if let Some(averages) = copy.averages.take() {
            if averages.steps > 0 {
                copy.weights = averages.weights;
                copy.bias = averages.bias;
            }
        }
        copy
    }

    fn to_disk(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let mut writer = BufWriter::new(File::create(dir.join(MODEL_FILE))?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}
