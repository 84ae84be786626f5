use std::fmt;

use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::error::{ClassifierError, Result};
use super::features::{tokenize_all, FeatureExtractor, FeatureMatrix, TokenizedDoc, Transformer};
use super::forest::{MaxFeatures, RandomForest};
use super::multi_output::MultiOutputClassifier;
use super::ModelInfo;

/// One point of the hyperparameter space searched by the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Trees per category forest
    pub n_estimators: usize,
    /// Depth limit per tree; `None` grows trees until leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Split candidates drawn per node
    pub max_features: MaxFeatures,
    /// Grow each tree on a bootstrap draw of the rows
    pub bootstrap: bool,
    /// Weight counts by inverse document frequency
    pub use_idf: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            use_idf: true,
        }
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = self.max_depth.map_or_else(|| "none".to_string(), |d| d.to_string());
        write!(
            f,
            "n_estimators={} max_depth={} min_samples_split={} min_samples_leaf={} max_features={:?} bootstrap={} use_idf={}",
            self.n_estimators,
            depth,
            self.min_samples_split,
            self.min_samples_leaf,
            self.max_features,
            self.bootstrap,
            self.use_idf
        )
    }
}

impl Hyperparameters {
    fn forest(&self, seed: u64) -> RandomForest {
        RandomForest::new(self.n_estimators)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
            .with_bootstrap(self.bootstrap)
            .with_random_state(seed)
    }
}

/// The full message classification pipeline: tokenizer, count vectorizer, tf-idf weighting and
/// one forest per category.
///
/// A model is created empty, fitted once, and is read-only afterwards. A fitted model carries
/// everything prediction needs (vocabulary, weights, forests, category names, hyperparameters),
/// so it predicts identically after a save/load round trip.
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use triage::{Hyperparameters, LabelMatrix, Model, MaxFeatures};
///
/// let messages = ["we need water", "send food", "water please", "food please"];
/// let labels = LabelMatrix::from_rows(
///     vec!["water".into(), "food".into()],
///     &[vec![1, 0], vec![0, 1], vec![1, 0], vec![0, 1]],
/// )?;
/// let params = Hyperparameters {
///     n_estimators: 5,
///     bootstrap: false,
///     max_features: MaxFeatures::All,
///     ..Hyperparameters::default()
/// };
/// let mut model = Model::new(params, 42);
/// model.fit(&messages, &labels)?;
/// let predicted = model.predict(&["water water"])?;
/// assert_eq!(predicted[[0, 0]], 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    params: Hyperparameters,
    seed: u64,
    categories: Vec<String>,
    extractor: FeatureExtractor,
    classifier: MultiOutputClassifier,
}

impl Model {
    /// Creates an unfitted model
    pub fn new(params: Hyperparameters, seed: u64) -> Self {
        Self {
            extractor: FeatureExtractor::new(params.use_idf),
            classifier: MultiOutputClassifier::new(params.forest(seed)),
            categories: Vec::new(),
            params,
            seed,
        }
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn is_fitted(&self) -> bool {
        self.extractor.is_fitted() && self.classifier.is_fitted()
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&'static str> {
        let mut names = vec!["tokenize"];
        names.extend(self.extractor.stage_names());
        names.push("clf");
        names
    }

    /// Fits the pipeline on raw messages and their labels
    pub fn fit<S: AsRef<str>>(&mut self, messages: &[S], labels: &crate::LabelMatrix) -> Result<&mut Self> {
        self.fit_tokens(&tokenize_all(messages), labels.categories(), labels.values())
    }

    /// Fits the pipeline on already tokenized messages
    pub(crate) fn fit_tokens(&mut self, docs: &[TokenizedDoc], categories: &[String], y: &Array2<u8>) -> Result<&mut Self> {
        if docs.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        if docs.len() != y.nrows() {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} label rows", docs.len()),
                format!("{} label rows", y.nrows()),
            ));
        }
        if categories.len() != y.ncols() {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} categories", categories.len()),
                format!("{} label columns", y.ncols()),
            ));
        }
        if self.is_fitted() {
            return Err(ClassifierError::InvalidInput("model is already fitted".into()));
        }

        let features = self.extractor.fit_transform(docs)?;
        self.classifier.fit(&features, y)?;
        self.categories = categories.to_vec();
        Ok(self)
    }

    fn features(&self, docs: &[TokenizedDoc]) -> Result<FeatureMatrix> {
        if !self.is_fitted() {
            return Err(ClassifierError::NotFitted("model has not been fitted".into()));
        }
        self.extractor.transform(docs)
    }

    /// Positive-class probability per message (rows) and category (columns)
    pub fn predict_proba<S: AsRef<str>>(&self, messages: &[S]) -> Result<Array2<f64>> {
        self.predict_proba_tokens(&tokenize_all(messages))
    }

    pub(crate) fn predict_proba_tokens(&self, docs: &[TokenizedDoc]) -> Result<Array2<f64>> {
        self.classifier.predict_proba(&self.features(docs)?)
    }

    /// 0/1 label per message (rows) and category (columns), in `categories()` order
    pub fn predict<S: AsRef<str>>(&self, messages: &[S]) -> Result<Array2<u8>> {
        self.predict_tokens(&tokenize_all(messages))
    }

    pub(crate) fn predict_tokens(&self, docs: &[TokenizedDoc]) -> Result<Array2<u8>> {
        self.classifier.predict(&self.features(docs)?)
    }

    /// Returns information about the fitted model
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            categories: self.categories.clone(),
            vocabulary_size: self.extractor.vocabulary_size(),
            trees_per_category: self.classifier.estimators().iter().map(|e| e.trees().len()).collect(),
            params: self.params.clone(),
        }
    }

    pub(crate) fn log_summary(&self) {
        info!(
            "Model: {} categories, {} vocabulary terms, stages {:?}, {}",
            self.categories.len(),
            self.extractor.vocabulary_size(),
            self.stage_names(),
            self.params
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LabelMatrix;

    fn labels() -> LabelMatrix {
        LabelMatrix::from_rows(
            vec!["water".into(), "food".into()],
            &[vec![1, 0], vec![0, 1], vec![1, 0], vec![0, 1]],
        )
        .unwrap()
    }

    const MESSAGES: [&str; 4] = ["we need water", "send food", "water please", "food please"];

    fn params() -> Hyperparameters {
        Hyperparameters {
            n_estimators: 3,
            bootstrap: false,
            max_features: MaxFeatures::All,
            ..Hyperparameters::default()
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let model = Model::new(params(), 1);
        assert!(!model.is_fitted());
        assert!(matches!(model.predict(&["water"]), Err(ClassifierError::NotFitted(_))));
    }

    #[test]
    fn test_fit_and_predict() {
        let mut model = Model::new(params(), 1);
        model.fit(&MESSAGES, &labels()).unwrap();
        assert!(model.is_fitted());
        assert_eq!(model.categories(), &["water", "food"]);
        assert_eq!(&model.predict(&MESSAGES).unwrap(), labels().values());

        let proba = model.predict_proba(&MESSAGES).unwrap();
        assert_eq!(proba.dim(), (4, 2));
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_fit_is_once() {
        let mut model = Model::new(params(), 1);
        model.fit(&MESSAGES, &labels()).unwrap();
        assert!(model.fit(&MESSAGES, &labels()).is_err());
    }

    #[test]
    fn test_empty_training_set() {
        let mut model = Model::new(params(), 1);
        let empty = LabelMatrix::from_rows(vec!["water".into()], &[]).unwrap();
        let no_messages: [&str; 0] = [];
        assert!(matches!(model.fit(&no_messages, &empty), Err(ClassifierError::EmptyTrainingSet)));
    }

    #[test]
    fn test_info_and_stages() {
        let mut model = Model::new(params(), 1);
        model.fit(&MESSAGES, &labels()).unwrap();
        let info = model.info();
        assert_eq!(info.categories.len(), 2);
        assert_eq!(info.trees_per_category, vec![3, 3]);
        assert!(info.vocabulary_size > 0);
        assert_eq!(model.stage_names(), vec!["tokenize", "vect", "tfidf", "clf"]);

        assert_eq!(model.seed(), 1);
        let vocabulary = model.extractor().vectorizer().vocabulary().unwrap();
        assert_eq!(vocabulary.len(), info.vocabulary_size);
        assert!(vocabulary.contains_key("water") && vocabulary.contains_key("food"));
    }
}
