//! Text classification capability used by the polling loop and the trainer.

/// Word and bigram feature extraction.
pub mod tokenizer;
/// Linear bag-of-words text categorizer.
pub mod textcat;

use std::path::Path;

use rand::Rng;

use crate::{
    error::Result,
    labels::{CategoryScores, GoldCategories},
};

pub use textcat::TextCategorizer;
pub use tokenizer::Tokenizer;

/// Scores a text against every category independently.
pub trait TextClassifier: Send + Sync {
    /// Category scores in the classifier's label order.
    fn classify(&self, text: &str) -> Result<CategoryScores>;
}

/// Hyperparameters for a single minibatch update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSettings {
    /// Probability of dropping each input feature.
    pub dropout: f32,
    /// SGD step size.
    pub learning_rate: f32,
}

/// Classifier that can be fitted with minibatch gradient updates.
pub trait TrainableClassifier: TextClassifier + Sized {
    /// Labels the classifier predicts, in output order.
    fn labels(&self) -> &[String];

    /// Prepares parameters for the given training texts.
    fn begin_training<'t>(&mut self, texts: impl IntoIterator<Item = &'t str>);

    /// Applies one minibatch step and returns the summed batch loss.
    fn update<R: Rng>(
        &mut self,
        batch: &[(&str, &GoldCategories)],
        settings: UpdateSettings,
        rng: &mut R,
    ) -> Result<f32>;

    /// Copy of the classifier using averaged parameters.
    fn averaged(&self) -> Self;

    /// Persists the classifier into `dir`.
    fn to_disk(&self, dir: &Path) -> Result<()>;
}
