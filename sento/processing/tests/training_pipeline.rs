use std::fs;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sento_processing::{
    classifier::{TextCategorizer, TextClassifier, TrainableClassifier},
    corpus,
    labels::{from_model_scores, SentimentCategory},
    telemetry::SentoTelemetry,
    training::{TrainingData, TrainingProcedure, TrainingSettings},
};
use tempfile::tempdir;

fn tweet(content: &str, polarity: &str) -> String {
    format!(
        "<tweet><content>{content}</content><sentiments>\
         <polarity><value>{polarity}</value></polarity>\
         <polarity><entity>X</entity><value>NEU</value></polarity>\
         </sentiments></tweet>"
    )
}

fn corpus_xml(copies: usize) -> String {
    let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><tweets>");
    for _ in 0..copies {
        body.push_str(&tweet("me encanta este día http://t.co/a1", "P"));
        body.push_str(&tweet("qué alegría tan grande", "P"));
        body.push_str(&tweet("odio los lunes https://t.co/b2", "N"));
        body.push_str(&tweet("qué asco de tráfico", "N"));
        body.push_str(&tweet("el tren sale a las ocho", "NEU"));
        body.push_str(&tweet("mañana hay reunión", "NEU"));
        body.push_str(&tweet("sin etiqueta", "NONE"));
    }
    body.push_str("</tweets>");
    body
}

#[test]
fn corpus_file_trains_a_loadable_model() {
    let dir = tempdir().unwrap();
    let train_path = dir.path().join("train.xml");
    let dev_path = dir.path().join("dev.xml");
    fs::write(&train_path, corpus_xml(5)).unwrap();
    fs::write(&dev_path, corpus_xml(1)).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let data = TrainingData::from_files(&train_path, &dev_path, &mut rng).unwrap();
    assert_eq!(data.train.len(), 30);
    assert_eq!(data.eval.len(), 6);
    assert!(data.train.iter().all(|example| !example.text.contains("http")));

    let output = dir.path().join("model");
    let mut model = TextCategorizer::sentiment();
    let procedure = TrainingProcedure::new(
        TrainingSettings {
            n_iter: 30,
            seed: 42,
            ..TrainingSettings::default()
        },
        SentoTelemetry::disabled("training-test"),
    );
    let report = procedure.run(&mut model, &data, Some(&output)).unwrap();
    assert_eq!(report.train_examples, 30);
    assert_eq!(report.eval_examples, 6);

    let loaded = TextCategorizer::from_disk(&output).unwrap();
    assert_eq!(loaded.labels(), ["P", "N", "NEU"]);
    let predict = |text: &str| from_model_scores(&loaded.classify(text).unwrap()).unwrap();
    assert_eq!(predict("odio el tráfico"), SentimentCategory::Negative);
    assert_eq!(predict("me encanta"), SentimentCategory::Positive);
}

#[test]
fn resumed_training_keeps_labels_and_grows_vocabulary() {
    let dir = tempdir().unwrap();
    let examples = corpus::parse_str(&corpus_xml(3)).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let data = TrainingData::split(examples, 0.2, &mut rng).unwrap();
    let procedure = TrainingProcedure::new(
        TrainingSettings {
            n_iter: 3,
            ..TrainingSettings::default()
        },
        SentoTelemetry::disabled("training-test"),
    );

    let first_dir = dir.path().join("first");
    let mut model = TextCategorizer::sentiment();
    procedure.run(&mut model, &data, Some(&first_dir)).unwrap();

    let mut resumed = TextCategorizer::from_disk(&first_dir).unwrap();
    let known = resumed.vocab_size();
    let extra = corpus::parse_str(&format!(
        "<tweets>{}</tweets>",
        tweet("palabras completamente nuevas", "P")
    ))
    .unwrap();
    let more = TrainingData::split(extra, 0.0, &mut rng).unwrap();
    procedure.run(&mut resumed, &more, None).unwrap();

    assert!(resumed.vocab_size() > known);
    assert_eq!(resumed.labels(), model.labels());
}

#[test]
fn malformed_corpus_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.xml");
    fs::write(&path, "<tweets><tweet><content>sin cerrar").unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    assert!(TrainingData::from_files(&path, &path, &mut rng).is_err());
}
