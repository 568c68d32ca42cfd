use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sento_processing::{
    classifier::TextCategorizer,
    corpus,
    telemetry::SentoTelemetry,
    training::{TrainingData, TrainingProcedure, TrainingSettings},
};
use serde_json::json;
use shared_logging::{JsonLogger, LogDestination, LogLevel};

const DEFAULT_TRAIN_CORPUS: &str = "resources/TASS-Datasets/general-train-tagged-3l.xml";

#[derive(Parser, Debug)]
#[command(name = "sento-train", version, about = "Trains the sentiment categorizer on a TASS corpus")]
struct Cli {
    /// Existing model directory to continue training from. A blank model is used otherwise.
    #[arg(short = 'm', long)]
    model: Option<PathBuf>,
    /// Where the averaged model is written (created if missing).
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,
    /// Number of training passes.
    #[arg(short = 'n', long, default_value_t = 20)]
    n_iter: usize,
    /// Keep at most this many training examples.
    #[arg(long)]
    n_texts: Option<usize>,
    /// Training corpus.
    #[arg(long, default_value = DEFAULT_TRAIN_CORPUS)]
    train: PathBuf,
    /// Separate evaluation corpus. Without it `--eval-split` of the training corpus is held out.
    #[arg(long)]
    dev: Option<PathBuf>,
    /// Fraction of the training corpus held out when no `--dev` corpus is given.
    #[arg(long, default_value_t = 0.2)]
    eval_split: f64,
    /// Seed for shuffling and dropout.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Feature dropout probability.
    #[arg(long, default_value_t = 0.2)]
    dropout: f32,
    /// SGD step size.
    #[arg(long, default_value_t = 0.5)]
    learning_rate: f32,
    /// Minimum log level.
    #[arg(long, default_value = "INFO")]
    log_level: String,
    /// `stdout`, `stderr` or a log file path.
    #[arg(long, default_value = "stderr")]
    log_output: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level: LogLevel = cli.log_level.parse().context("parsing --log-level")?;
    let destination: LogDestination = cli.log_output.parse().context("parsing --log-output")?;
    let logger = JsonLogger::with_destination(destination, level).context("opening log output")?;
    let telemetry = SentoTelemetry::builder("training")
        .logger(Arc::new(logger))
        .build()?;

    let mut model = match &cli.model {
        Some(path) => {
            let model = TextCategorizer::from_disk(path)
                .with_context(|| format!("loading model {}", path.display()))?;
            let _ = telemetry.log(
                LogLevel::Info,
                "model.loaded",
                json!({ "model": path.display().to_string(), "vocab_size": model.vocab_size() }),
            );
            model
        }
        None => {
            let _ = telemetry.log(LogLevel::Info, "model.created", json!({}));
            TextCategorizer::sentiment()
        }
    };

    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let data = match &cli.dev {
        Some(dev) => TrainingData::from_files(&cli.train, dev, &mut rng)
            .with_context(|| format!("loading corpora {} and {}", cli.train.display(), dev.display()))?,
        None => {
            let examples = corpus::read(&cli.train)
                .with_context(|| format!("loading corpus {}", cli.train.display()))?;
            TrainingData::split(examples, cli.eval_split, &mut rng)?
        }
    }
    .limit_train(cli.n_texts);
    let _ = telemetry.log(
        LogLevel::Info,
        "corpus.loaded",
        json!({ "train_examples": data.train.len(), "eval_examples": data.eval.len() }),
    );

    let settings = TrainingSettings {
        n_iter: cli.n_iter,
        dropout: cli.dropout,
        learning_rate: cli.learning_rate,
        seed: cli.seed,
        ..TrainingSettings::default()
    };
    let procedure = TrainingProcedure::new(settings, telemetry.clone());
    let outcome = procedure.run(&mut model, &data, cli.output_dir.as_deref());
    if let Err(err) = telemetry.flush() {
        eprintln!("failed to flush logs: {err:?}");
    }
    let report = outcome.context("training failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
