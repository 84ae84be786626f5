use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::error::{ClassifierError, Result};
use super::tokenizer::tokenize;
use super::utils::normalize_vector;

/// The tokens of one message, in order.
pub type TokenizedDoc = Vec<String>;

/// A pipeline stage with a fit/transform capability pair.
///
/// Stages are fitted once on training input and then reused for every later `transform`
/// call. Fitting again replaces the fitted state entirely.
pub trait Transformer {
    type Input: ?Sized;
    type Output;

    /// Short stage name used in logs and model summaries
    fn name(&self) -> &'static str;

    /// Learns the stage state from `input`
    fn fit(&mut self, input: &Self::Input) -> Result<()>;

    /// Applies the fitted stage. Fails with `NotFitted` before `fit`.
    fn transform(&self, input: &Self::Input) -> Result<Self::Output>;

    fn is_fitted(&self) -> bool;

    fn fit_transform(&mut self, input: &Self::Input) -> Result<Self::Output> {
        self.fit(input)?;
        self.transform(input)
    }
}

/// A fixed-length numeric vector stored sparsely. Indices are strictly increasing and only
/// non-zero entries are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    dim: usize,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl FeatureVector {
    fn from_sorted(dim: usize, entries: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let (indices, values): (Vec<usize>, Vec<f64>) = entries.into_iter().filter(|(_, v)| *v != 0.0).unzip();
        Self { dim, indices, values }
    }

    /// Length of the vector, equal to the vocabulary size it was built against
    pub fn len(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.dim == 0
    }

    /// Value at `index`, zero for entries that are not stored
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.dim];
        for (i, v) in self.iter() {
            dense[i] = v;
        }
        dense
    }
}

/// Row-major sparse document-term matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    n_features: usize,
    rows: Vec<FeatureVector>,
}

impl FeatureMatrix {
    pub fn new(n_features: usize, rows: Vec<FeatureVector>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            return Err(ClassifierError::dimension_mismatch(
                format!("rows of length {}", n_features),
                format!("a row of length {}", bad.len()),
            ));
        }
        Ok(Self { n_features, rows })
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.n_features
    }

    pub fn row(&self, i: usize) -> &FeatureVector {
        &self.rows[i]
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.rows[row].get(col)
    }

    /// Copies the given rows, in the given order, into a new matrix
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            n_features: self.n_features,
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.nrows(), self.n_features));
        for (r, row) in self.rows.iter().enumerate() {
            for (c, v) in row.iter() {
                dense[[r, c]] = v;
            }
        }
        dense
    }
}

/// Tokenizes every message. Tokenization is the first stage of every pipeline and holds no
/// fitted state, so tokens can be computed once and shared by all folds of a search.
pub fn tokenize_all<S: AsRef<str>>(messages: &[S]) -> Vec<TokenizedDoc> {
    messages.iter().map(|m| tokenize(m.as_ref())).collect()
}

/// Builds a vocabulary over the fitting corpus and represents each message as raw token counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountVectorizer {
    vocabulary: Option<HashMap<String, usize>>,
}

impl CountVectorizer {
    pub fn new() -> Self {
        Self { vocabulary: None }
    }

    pub fn vocabulary(&self) -> Option<&HashMap<String, usize>> {
        self.vocabulary.as_ref()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.as_ref().map_or(0, HashMap::len)
    }

    /// Tokens ordered by their feature index
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec![String::new(); self.vocabulary_size()];
        if let Some(vocabulary) = &self.vocabulary {
            for (term, &idx) in vocabulary {
                names[idx] = term.clone();
            }
        }
        names
    }
}

impl Transformer for CountVectorizer {
    type Input = [TokenizedDoc];
    type Output = FeatureMatrix;

    fn name(&self) -> &'static str {
        "vect"
    }

    fn fit(&mut self, docs: &[TokenizedDoc]) -> Result<()> {
        // Sorted so that feature indices do not depend on hashing order.
        let terms: BTreeSet<&str> = docs.iter().flatten().map(String::as_str).collect();
        if terms.is_empty() {
            return Err(ClassifierError::InvalidInput(
                "empty vocabulary; the fitting messages contain no tokens".into(),
            ));
        }
        let vocabulary: HashMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx))
            .collect();
        debug!("Vocabulary fitted with {} terms over {} messages", vocabulary.len(), docs.len());
        self.vocabulary = Some(vocabulary);
        Ok(())
    }

    fn transform(&self, docs: &[TokenizedDoc]) -> Result<FeatureMatrix> {
        let vocabulary = self
            .vocabulary
            .as_ref()
            .ok_or_else(|| ClassifierError::NotFitted("count vectorizer has no vocabulary".into()))?;
        let n_features = vocabulary.len();

        let rows = docs
            .iter()
            .map(|doc| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for token in doc {
                    // Tokens outside the frozen vocabulary contribute nothing.
                    if let Some(&idx) = vocabulary.get(token) {
                        *counts.entry(idx).or_insert(0.0) += 1.0;
                    }
                }
                FeatureVector::from_sorted(n_features, counts)
            })
            .collect();

        FeatureMatrix::new(n_features, rows)
    }

    fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }
}

/// Rescales raw counts by smoothed inverse document frequency, then L2-normalizes each row.
///
/// `idf(t) = ln((1 + n) / (1 + df(t))) + 1`, where `n` is the number of fitting messages and
/// `df(t)` the number of them containing `t`. With `use_idf` off only the normalization applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfTransformer {
    pub use_idf: bool,
    idf: Vec<f64>,
    n_features: Option<usize>,
}

impl Default for TfidfTransformer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TfidfTransformer {
    pub fn new(use_idf: bool) -> Self {
        Self {
            use_idf,
            idf: Vec::new(),
            n_features: None,
        }
    }

    /// Fitted idf weights, empty when `use_idf` is off or before fitting
    pub fn idf(&self) -> &[f64] {
        &self.idf
    }
}

impl Transformer for TfidfTransformer {
    type Input = FeatureMatrix;
    type Output = FeatureMatrix;

    fn name(&self) -> &'static str {
        "tfidf"
    }

    fn fit(&mut self, counts: &FeatureMatrix) -> Result<()> {
        let n_features = counts.ncols();
        self.idf = if self.use_idf {
            let mut df = vec![0usize; n_features];
            for row in counts.rows() {
                for (idx, _) in row.iter() {
                    df[idx] += 1;
                }
            }
            let n = counts.nrows() as f64;
            df.into_iter()
                .map(|d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
                .collect()
        } else {
            Vec::new()
        };
        self.n_features = Some(n_features);
        Ok(())
    }

    fn transform(&self, counts: &FeatureMatrix) -> Result<FeatureMatrix> {
        let n_features = self
            .n_features
            .ok_or_else(|| ClassifierError::NotFitted("tf-idf weights have not been fitted".into()))?;
        if counts.ncols() != n_features {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} features", n_features),
                format!("{} features", counts.ncols()),
            ));
        }

        let rows = counts
            .rows()
            .iter()
            .map(|row| {
                let indices: Vec<usize> = row.iter().map(|(i, _)| i).collect();
                let mut values: Vec<f64> = row
                    .iter()
                    .map(|(i, v)| if self.use_idf { v * self.idf[i] } else { v })
                    .collect();
                normalize_vector(&mut values);
                FeatureVector::from_sorted(n_features, indices.into_iter().zip(values))
            })
            .collect();

        FeatureMatrix::new(n_features, rows)
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some()
    }
}

/// Two-stage transform from tokenized messages to weighted feature vectors:
/// token counting over a frozen vocabulary, then tf-idf weighting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureExtractor {
    vectorizer: CountVectorizer,
    tfidf: TfidfTransformer,
}

impl FeatureExtractor {
    pub fn new(use_idf: bool) -> Self {
        Self {
            vectorizer: CountVectorizer::new(),
            tfidf: TfidfTransformer::new(use_idf),
        }
    }

    /// Fits on raw message text
    pub fn fit_texts<S: AsRef<str>>(&mut self, messages: &[S]) -> Result<()> {
        self.fit(&tokenize_all(messages))
    }

    /// Transforms raw message text
    pub fn transform_texts<S: AsRef<str>>(&self, messages: &[S]) -> Result<FeatureMatrix> {
        self.transform(&tokenize_all(messages))
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vectorizer.vocabulary_size()
    }

    pub fn vectorizer(&self) -> &CountVectorizer {
        &self.vectorizer
    }

    pub fn tfidf(&self) -> &TfidfTransformer {
        &self.tfidf
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> [&'static str; 2] {
        [self.vectorizer.name(), self.tfidf.name()]
    }
}

impl Transformer for FeatureExtractor {
    type Input = [TokenizedDoc];
    type Output = FeatureMatrix;

    fn name(&self) -> &'static str {
        "features"
    }

    fn fit(&mut self, docs: &[TokenizedDoc]) -> Result<()> {
        let counts = self.vectorizer.fit_transform(docs)?;
        self.tfidf.fit(&counts)
    }

    fn transform(&self, docs: &[TokenizedDoc]) -> Result<FeatureMatrix> {
        let counts = self.vectorizer.transform(docs)?;
        self.tfidf.transform(&counts)
    }

    fn is_fitted(&self) -> bool {
        self.vectorizer.is_fitted() && self.tfidf.is_fitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<TokenizedDoc> {
        tokenize_all(texts)
    }

    #[test]
    fn test_vocabulary_is_sorted() {
        let mut vect = CountVectorizer::new();
        vect.fit(&docs(&["water food", "shelter water"])).unwrap();
        assert_eq!(vect.feature_names(), vec!["food", "shelter", "water"]);
    }

    #[test]
    fn test_counts() {
        let mut vect = CountVectorizer::new();
        let matrix = vect.fit_transform(&docs(&["water water food"])).unwrap();
        assert_eq!(matrix.ncols(), 2);
        assert_eq!(matrix.get(0, 0), 1.0);
        assert_eq!(matrix.get(0, 1), 2.0);
    }

    #[test]
    fn test_transform_before_fit() {
        let vect = CountVectorizer::new();
        assert!(matches!(vect.transform(&docs(&["water"])), Err(ClassifierError::NotFitted(_))));

        let extractor = FeatureExtractor::new(true);
        assert!(matches!(extractor.transform_texts(&["water"]), Err(ClassifierError::NotFitted(_))));
    }

    #[test]
    fn test_empty_vocabulary() {
        let mut vect = CountVectorizer::new();
        assert!(matches!(vect.fit(&docs(&["", "  "])), Err(ClassifierError::InvalidInput(_))));
    }

    #[test]
    fn test_unseen_tokens_contribute_nothing() {
        let mut extractor = FeatureExtractor::new(true);
        extractor.fit_texts(&["water food", "shelter"]).unwrap();
        let matrix = extractor.transform_texts(&["earthquake tsunami", "water earthquake"]).unwrap();
        assert_eq!(matrix.ncols(), 3);
        assert_eq!(matrix.row(0).nnz(), 0);
        assert_eq!(matrix.row(1).nnz(), 1);
        assert!((matrix.get(1, 2) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_idf_weights() {
        let mut extractor = FeatureExtractor::new(true);
        extractor.fit_texts(&["water food", "water"]).unwrap();
        let idf = extractor.tfidf().idf();
        // food appears in one of two messages, water in both
        assert!((idf[0] - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
        assert!((idf[1] - 1.0).abs() < 1e-12);

        let matrix = extractor.transform_texts(&["water food"]).unwrap();
        let row = matrix.row(0).to_dense();
        let norm: f64 = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-12);
        assert!(row[0] > row[1]);
    }

    #[test]
    fn test_without_idf() {
        let mut extractor = FeatureExtractor::new(false);
        extractor.fit_texts(&["water food", "water"]).unwrap();
        assert!(extractor.tfidf().idf().is_empty());
        let matrix = extractor.transform_texts(&["water food"]).unwrap();
        assert!((matrix.get(0, 0) - matrix.get(0, 1)).abs() < 1e-12);
    }

    #[test]
    fn test_refit_replaces_vocabulary() {
        let mut extractor = FeatureExtractor::new(true);
        extractor.fit_texts(&["water food shelter"]).unwrap();
        assert_eq!(extractor.vocabulary_size(), 3);
        extractor.fit_texts(&["medical"]).unwrap();
        assert_eq!(extractor.vocabulary_size(), 1);
        assert_eq!(extractor.vectorizer().feature_names(), vec!["medical"]);
    }

    #[test]
    fn test_dense_view_has_vocabulary_width() {
        let mut extractor = FeatureExtractor::new(true);
        extractor.fit_texts(&["a b c", "d"]).unwrap();
        let dense = extractor.transform_texts(&["b", "z", ""]).unwrap().to_dense();
        assert_eq!(dense.dim(), (3, 4));
    }
}
