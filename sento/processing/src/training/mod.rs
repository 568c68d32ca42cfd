//! Training procedure for the sentiment categorizer.
//!
//! Fits a [`TrainableClassifier`] on labeled corpus examples with compounding
//! minibatches, evaluates the averaged parameters after every pass and
//! persists the averaged model.

/// Batch size schedules and minibatching.
pub mod batching;
/// Precision / recall / F1 over category scores.
pub mod evaluate;

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    classifier::{TrainableClassifier, UpdateSettings},
    corpus::{self, LabeledExample},
    error::{Result, SentoError},
    labels::{gold_categories, GoldCategories},
    telemetry::SentoTelemetry,
};

pub use batching::{compounding, minibatch, Compounding, Minibatches};
pub use evaluate::{evaluate, evaluate_classifier, Metrics};

/// Hyperparameters of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Passes over the training set.
    pub n_iter: usize,
    /// Feature dropout probability.
    pub dropout: f32,
    /// SGD step size.
    pub learning_rate: f32,
    /// First minibatch size.
    pub batch_start: f64,
    /// Largest minibatch size.
    pub batch_stop: f64,
    /// Growth factor applied after every minibatch.
    pub batch_compound: f64,
    /// Seed for shuffling and dropout.
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            n_iter: 20,
            dropout: 0.2,
            learning_rate: 0.5,
            batch_start: 4.0,
            batch_stop: 32.0,
            batch_compound: 1.001,
            seed: 0,
        }
    }
}

impl TrainingSettings {
    fn validate(&self) -> Result<()> {
        if self.n_iter == 0 {
            return Err(SentoError::Configuration(
                "n_iter must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(SentoError::Configuration(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(SentoError::Configuration(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.batch_start < 1.0 || self.batch_stop < 1.0 || self.batch_compound <= 0.0 {
            return Err(SentoError::Configuration(
                "batch sizes must be at least 1 and the compound factor positive".into(),
            ));
        }
        Ok(())
    }
}

/// Text with its one-hot gold annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Input text.
    pub text: String,
    /// Expected category values.
    pub gold: GoldCategories,
}

impl From<LabeledExample> for TrainingExample {
    fn from(example: LabeledExample) -> Self {
        Self {
            gold: gold_categories(example.polarity),
            text: example.content,
        }
    }
}

/// Training and held-out evaluation examples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingData {
    /// Examples fitted on.
    pub train: Vec<TrainingExample>,
    /// Examples evaluated after every pass.
    pub eval: Vec<TrainingExample>,
}

impl TrainingData {
    /// Reads separate training and dev corpora and shuffles each of them.
    pub fn from_files<R: Rng>(
        train_path: impl AsRef<Path>,
        dev_path: impl AsRef<Path>,
        rng: &mut R,
    ) -> Result<Self> {
        let mut train = examples(corpus::read(train_path)?);
        let mut eval = examples(corpus::read(dev_path)?);
        train.shuffle(rng);
        eval.shuffle(rng);
        Ok(Self { train, eval })
    }

    /// Shuffles one corpus and holds out `eval_fraction` of it for evaluation.
    pub fn split<R: Rng>(
        examples_in: Vec<LabeledExample>,
        eval_fraction: f64,
        rng: &mut R,
    ) -> Result<Self> {
        if !(0.0..1.0).contains(&eval_fraction) {
            return Err(SentoError::Configuration(format!(
                "eval fraction must be in [0, 1), got {eval_fraction}"
            )));
        }
        let mut train = examples(examples_in);
        train.shuffle(rng);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let held_out = ((train.len() as f64) * eval_fraction).round() as usize;
        let eval = train.split_off(train.len() - held_out.min(train.len()));
        Ok(Self { train, eval })
    }

    /// Keeps at most `cap` training examples.
    #[must_use]
    pub fn limit_train(mut self, cap: Option<usize>) -> Self {
        if let Some(cap) = cap {
            self.train.truncate(cap);
        }
        self
    }
}

fn examples(labeled: Vec<LabeledExample>) -> Vec<TrainingExample> {
    labeled.into_iter().map(TrainingExample::from).collect()
}

/// Loss and held-out metrics after one pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// 1-based pass number.
    pub epoch: usize,
    /// Loss summed over every minibatch of the pass.
    pub loss: f32,
    /// Metrics of the averaged parameters on the evaluation set.
    pub metrics: Metrics,
}

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Unique run identifier.
    pub run_id: String,
    /// When training started.
    pub started_at: DateTime<Utc>,
    /// When training finished.
    pub finished_at: DateTime<Utc>,
    /// Number of training examples.
    pub train_examples: usize,
    /// Number of evaluation examples.
    pub eval_examples: usize,
    /// Settings the run used.
    pub settings: TrainingSettings,
    /// One entry per pass.
    pub epochs: Vec<EpochReport>,
    /// Where the averaged model was written, if anywhere.
    pub output_dir: Option<PathBuf>,
}

impl TrainingReport {
    /// Metrics of the last pass.
    #[must_use]
    pub fn final_metrics(&self) -> Option<Metrics> {
        self.epochs.last().map(|epoch| epoch.metrics)
    }
}

/// Runs minibatch training passes and reports per-pass metrics.
#[derive(Debug, Clone)]
pub struct TrainingProcedure {
    settings: TrainingSettings,
    telemetry: SentoTelemetry,
}

impl TrainingProcedure {
    /// Procedure with the given hyperparameters.
    #[must_use]
    pub const fn new(settings: TrainingSettings, telemetry: SentoTelemetry) -> Self {
        Self {
            settings,
            telemetry,
        }
    }

    /// Hyperparameters in use.
    #[must_use]
    pub const fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    /// Trains `model` in place. When `output_dir` is given the averaged model is saved there.
    pub fn run<M: TrainableClassifier>(
        &self,
        model: &mut M,
        data: &TrainingData,
        output_dir: Option<&Path>,
    ) -> Result<TrainingReport> {
        self.settings.validate()?;
        if data.train.is_empty() {
            return Err(SentoError::Configuration(
                "training set is empty".into(),
            ));
        }
        check_labels(model.labels(), data)?;
        if let Some(dir) = output_dir {
            fs::create_dir_all(dir)?;
        }

        let started_at = Utc::now();
        let run_id = format!("run-{}", Uuid::new_v4());
        self.log(
            LogLevel::Info,
            "training.started",
            json!({
                "run_id": run_id,
                "train_examples": data.train.len(),
                "eval_examples": data.eval.len(),
                "settings": self.settings,
            }),
        );

        model.begin_training(data.train.iter().map(|example| example.text.as_str()));
        let batch_items: Vec<(&str, &GoldCategories)> = data
            .train
            .iter()
            .map(|example| (example.text.as_str(), &example.gold))
            .collect();
        let update = UpdateSettings {
            dropout: self.settings.dropout,
            learning_rate: self.settings.learning_rate,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.settings.seed);

        self.log(
            LogLevel::Info,
            &format!("{:^5}\t{:^5}\t{:^5}\t{:^5}", "LOSS", "P", "R", "F"),
            json!({ "run_id": run_id }),
        );
        let mut epochs = Vec::with_capacity(self.settings.n_iter);
        for epoch in 1..=self.settings.n_iter {
            let sizes = compounding(
                self.settings.batch_start,
                self.settings.batch_stop,
                self.settings.batch_compound,
            );
            let mut loss = 0.0;
            for batch in minibatch(&batch_items, sizes) {
                loss += model.update(batch, update, &mut rng)?;
            }
            let averaged = model.averaged();
            let metrics = evaluate_classifier(
                &averaged,
                data.eval
                    .iter()
                    .map(|example| (example.text.as_str(), &example.gold)),
            )?;
            self.log(
                LogLevel::Info,
                &format!(
                    "{loss:.3}\t{:.3}\t{:.3}\t{:.3}",
                    metrics.precision, metrics.recall, metrics.f_score
                ),
                json!({ "run_id": run_id, "epoch": epoch, "loss": loss, "metrics": metrics }),
            );
            epochs.push(EpochReport {
                epoch,
                loss,
                metrics,
            });
        }

        if let Some(dir) = output_dir {
            model.averaged().to_disk(dir)?;
            self.log(
                LogLevel::Info,
                "training.model_saved",
                json!({ "run_id": run_id, "output_dir": dir.display().to_string() }),
            );
        }

        Ok(TrainingReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            train_examples: data.train.len(),
            eval_examples: data.eval.len(),
            settings: self.settings,
            epochs,
            output_dir: output_dir.map(Path::to_path_buf),
        })
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        let _ = self.telemetry.log(level, message, metadata);
    }
}

/// Every gold label must be one the model predicts.
fn check_labels(labels: &[String], data: &TrainingData) -> Result<()> {
    let unknown = data
        .train
        .iter()
        .chain(&data.eval)
        .flat_map(|example| example.gold.keys())
        .find(|label| !labels.contains(label));
    match unknown {
        Some(label) => Err(SentoError::Model(format!(
            "model has no {label:?} output (labels: {labels:?})"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classifier::{TextCategorizer, TextClassifier},
        labels::{from_model_scores, SentimentCategory},
    };
    use tempfile::tempdir;

    fn labeled(content: &str, polarity: SentimentCategory) -> LabeledExample {
        LabeledExample {
            content: content.to_owned(),
            polarity,
        }
    }

    fn toy_examples() -> Vec<LabeledExample> {
        let mut examples = Vec::new();
        for _ in 0..4 {
            examples.push(labeled("qué día tan bueno", SentimentCategory::Positive));
            examples.push(labeled("me encanta y es genial", SentimentCategory::Positive));
            examples.push(labeled("todo es horrible", SentimentCategory::Negative));
            examples.push(labeled("odio este desastre", SentimentCategory::Negative));
            examples.push(labeled("la reunión es mañana", SentimentCategory::Neutral));
            examples.push(labeled("el informe sale a las diez", SentimentCategory::Neutral));
        }
        examples
    }

    fn settings() -> TrainingSettings {
        TrainingSettings {
            n_iter: 30,
            dropout: 0.1,
            seed: 11,
            ..TrainingSettings::default()
        }
    }

    #[test]
    fn split_holds_out_requested_fraction() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let data = TrainingData::split(toy_examples(), 0.25, &mut rng).unwrap();
        assert_eq!(data.train.len(), 18);
        assert_eq!(data.eval.len(), 6);
        assert!(TrainingData::split(toy_examples(), 1.5, &mut rng).is_err());

        let capped = data.limit_train(Some(5));
        assert_eq!(capped.train.len(), 5);
        assert_eq!(capped.eval.len(), 6);
    }

    #[test]
    fn training_improves_and_saves_averaged_model() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("model");
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let data = TrainingData::split(toy_examples(), 0.25, &mut rng).unwrap();
        let mut model = TextCategorizer::sentiment();
        let procedure = TrainingProcedure::new(settings(), SentoTelemetry::disabled("training"));

        let report = procedure.run(&mut model, &data, Some(&output)).unwrap();

        assert_eq!(report.epochs.len(), 30);
        assert!(report.run_id.starts_with("run-"));
        assert!(report.finished_at >= report.started_at);
        let first = report.epochs.first().unwrap().loss;
        let last = report.epochs.last().unwrap().loss;
        assert!(last < first);
        assert!(report.final_metrics().unwrap().f_score > 0.75);

        let saved = TextCategorizer::from_disk(&output).unwrap();
        let predicted = from_model_scores(&saved.classify("odio todo").unwrap()).unwrap();
        assert_eq!(predicted, SentimentCategory::Negative);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn saves_into_directory_with_non_utf8_name() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempdir().unwrap();
        let output = dir.path().join(OsStr::from_bytes(b"model\xff"));
        let data = TrainingData {
            train: examples(toy_examples()),
            eval: Vec::new(),
        };
        let mut model = TextCategorizer::sentiment();
        let telemetry = SentoTelemetry::builder("training")
            .log_path(dir.path().join("training.log"))
            .build()
            .unwrap();
        let procedure = TrainingProcedure::new(
            TrainingSettings {
                n_iter: 1,
                ..settings()
            },
            telemetry.clone(),
        );

        let report = procedure.run(&mut model, &data, Some(&output)).unwrap();
        telemetry.flush().unwrap();

        assert_eq!(report.output_dir.as_deref(), Some(output.as_path()));
        assert!(TextCategorizer::from_disk(&output).is_ok());
        let log = fs::read_to_string(dir.path().join("training.log")).unwrap();
        assert!(log.contains("training.model_saved"));
    }

    #[test]
    fn empty_eval_set_reports_zero_metrics() {
        let data = TrainingData {
            train: examples(toy_examples()),
            eval: Vec::new(),
        };
        let mut model = TextCategorizer::sentiment();
        let procedure = TrainingProcedure::new(
            TrainingSettings {
                n_iter: 2,
                ..settings()
            },
            SentoTelemetry::disabled("training"),
        );
        let report = procedure.run(&mut model, &data, None).unwrap();
        assert_eq!(report.final_metrics().unwrap().f_score, 0.0);
        assert!(report.output_dir.is_none());
    }

    #[test]
    fn rejects_models_missing_gold_labels() {
        let data = TrainingData {
            train: examples(toy_examples()),
            eval: Vec::new(),
        };
        let mut model = TextCategorizer::new(["P", "N"]);
        let procedure = TrainingProcedure::new(settings(), SentoTelemetry::disabled("training"));
        let err = procedure.run(&mut model, &data, None).unwrap_err();
        assert!(matches!(err, SentoError::Model(_)));
    }

    #[test]
    fn rejects_empty_training_set() {
        let mut model = TextCategorizer::sentiment();
        let procedure = TrainingProcedure::new(settings(), SentoTelemetry::disabled("training"));
        let err = procedure
            .run(&mut model, &TrainingData::default(), None)
            .unwrap_err();
        assert!(matches!(err, SentoError::Configuration(_)));
    }
}
