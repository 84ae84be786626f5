//! Labeled message corpora and loading them from a cleaned message table.
//!
//! The table has one text column holding the message and, from a fixed column offset onward,
//! one 0/1 column per category. Category names are taken verbatim from the header row.
//!
//! ```csv
//! id,message,original,genre,related,water,food
//! 1,We need water,,direct,1,1,0
//! 2,Send food please,,direct,1,0,1
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use log::info;
use ndarray::{Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::classifier::{ClassifierError, Result};

/// Where the message and the category columns sit in the input table
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Header of the message column
    pub message_column: String,
    /// Index of the first category column
    pub label_offset: usize,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            message_column: "message".to_string(),
            label_offset: 4,
        }
    }
}

/// A rows x categories matrix of 0/1 labels with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMatrix {
    categories: Vec<String>,
    values: Array2<u8>,
}

impl LabelMatrix {
    /// Creates a label matrix. Every value must be 0 or 1, there must be one column per
    /// category, and category names must be distinct.
    pub fn new(categories: Vec<String>, values: Array2<u8>) -> Result<Self> {
        if categories.len() != values.ncols() {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} label columns", categories.len()),
                format!("{} label columns", values.ncols()),
            ));
        }
        for (i, name) in categories.iter().enumerate() {
            if categories[..i].contains(name) {
                return Err(ClassifierError::InvalidInput(format!("duplicate category '{}'", name)));
            }
        }
        if let Some(bad) = values.iter().find(|&&v| v > 1) {
            return Err(ClassifierError::InvalidInput(format!("label value {} is not 0 or 1", bad)));
        }
        Ok(Self { categories, values })
    }

    /// Creates a label matrix from per-row label vectors. Rows of differing length fail
    /// with `DimensionMismatch`.
    pub fn from_rows(categories: Vec<String>, rows: &[Vec<u8>]) -> Result<Self> {
        let width = categories.len();
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} labels per row", width),
                format!("{} labels in row {}", row.len(), idx),
            ));
        }
        let flat: Vec<u8> = rows.iter().flatten().copied().collect();
        let values = Array2::from_shape_vec((rows.len(), width), flat).map_err(|e| {
            ClassifierError::dimension_mismatch(format!("{} x {}", rows.len(), width), e.to_string())
        })?;
        Self::new(categories, values)
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn values(&self) -> &Array2<u8> {
        &self.values
    }

    pub fn category_index(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == name)
    }

    /// Labels of one category, looked up by name
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, u8>> {
        self.category_index(name).map(|idx| self.values.column(idx))
    }

    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            categories: self.categories.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }
}

/// Ordered (message, labels) records sharing one category set.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    messages: Vec<String>,
    labels: LabelMatrix,
}

impl Corpus {
    pub fn new(messages: Vec<String>, labels: LabelMatrix) -> Result<Self> {
        if messages.len() != labels.nrows() {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} label rows", messages.len()),
                format!("{} label rows", labels.nrows()),
            ));
        }
        Ok(Self { messages, labels })
    }

    /// Loads a corpus from a CSV table on disk
    pub fn from_csv_path<P: AsRef<Path>>(path: P, schema: &TableSchema) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading messages from {:?}", path);
        let file = File::open(path)?;
        Self::from_reader(file, schema)
    }

    /// Loads a corpus from CSV data. An empty message cell is a missing message and fails with
    /// `InvalidInput`, as does any label cell other than `0` or `1`.
    pub fn from_reader<R: Read>(reader: R, schema: &TableSchema) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = rdr.headers()?.clone();

        let message_idx = headers
            .iter()
            .position(|h| h == schema.message_column)
            .ok_or_else(|| {
                ClassifierError::InvalidInput(format!("no '{}' column in table", schema.message_column))
            })?;
        if message_idx >= schema.label_offset {
            return Err(ClassifierError::InvalidInput(format!(
                "message column '{}' lies inside the label columns starting at {}",
                schema.message_column, schema.label_offset
            )));
        }
        let categories: Vec<String> = headers.iter().skip(schema.label_offset).map(str::to_string).collect();
        if categories.is_empty() {
            return Err(ClassifierError::EmptyCategorySet);
        }

        let mut messages = Vec::new();
        let mut rows = Vec::new();
        for (row_idx, record) in rdr.records().enumerate() {
            let record = record?;
            let message = record.get(message_idx).unwrap_or_default();
            if message.is_empty() {
                return Err(ClassifierError::InvalidInput(format!("row {} has no message", row_idx + 1)));
            }
            let labels = record
                .iter()
                .skip(schema.label_offset)
                .zip(&categories)
                .map(|(cell, category)| match cell.trim() {
                    "0" => Ok(0u8),
                    "1" => Ok(1u8),
                    other => Err(ClassifierError::InvalidInput(format!(
                        "row {} has label '{}' for category '{}'; expected 0 or 1",
                        row_idx + 1,
                        other,
                        category
                    ))),
                })
                .collect::<Result<Vec<u8>>>()?;
            messages.push(message.to_string());
            rows.push(labels);
        }

        let labels = LabelMatrix::from_rows(categories, &rows)?;
        info!("Loaded {} messages with {} categories", messages.len(), labels.categories().len());
        Self::new(messages, labels)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn labels(&self) -> &LabelMatrix {
        &self.labels
    }

    pub fn category_names(&self) -> &[String] {
        self.labels.categories()
    }

    /// The given rows, in the given order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            messages: indices.iter().map(|&i| self.messages[i].clone()).collect(),
            labels: self.labels.select_rows(indices),
        }
    }

    /// Shuffles rows with a seeded generator and holds out `ceil(test_size * n)` of them.
    /// Returns `(train, test)`.
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<(Corpus, Corpus)> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ClassifierError::Config(format!("test size {} is outside (0, 1)", test_size)));
        }
        let n = self.len();
        let n_test = (test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(ClassifierError::EmptyTrainingSet);
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let (test_idx, train_idx) = indices.split_at(n_test);
        Ok((self.subset(train_idx), self.subset(test_idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "id,message,original,genre,related,water,food\n\
                         1,We need water,,direct,1,1,0\n\
                         2,Send food please,,direct,1,0,1\n\
                         3,Storm is coming,,news,1,0,0\n";

    #[test]
    fn test_load_table() {
        let corpus = Corpus::from_reader(TABLE.as_bytes(), &TableSchema::default()).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.category_names(), &["related", "water", "food"]);
        assert_eq!(corpus.messages()[1], "Send food please");
        assert_eq!(corpus.labels().column("food").unwrap().to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn test_bad_label_value() {
        let table = "id,message,original,genre,related\n1,hello,,direct,2\n";
        let err = Corpus::from_reader(table.as_bytes(), &TableSchema::default()).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidInput(_)));
    }

    #[test]
    fn test_missing_message() {
        let table = "id,message,original,genre,related\n1,,,direct,1\n";
        let err = Corpus::from_reader(table.as_bytes(), &TableSchema::default()).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidInput(_)));
    }

    #[test]
    fn test_no_categories() {
        let table = "id,message,original,genre\n1,hello,,direct\n";
        let err = Corpus::from_reader(table.as_bytes(), &TableSchema::default()).unwrap_err();
        assert!(matches!(err, ClassifierError::EmptyCategorySet));
    }

    #[test]
    fn test_ragged_label_rows() {
        let err = LabelMatrix::from_rows(vec!["a".into(), "b".into()], &[vec![0, 1], vec![1]]).unwrap_err();
        assert!(matches!(err, ClassifierError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_duplicate_categories() {
        let err = LabelMatrix::from_rows(vec!["a".into(), "a".into()], &[vec![0, 1]]).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidInput(_)));
    }

    #[test]
    fn test_train_test_split() {
        let messages: Vec<String> = (0..10).map(|i| format!("message {}", i)).collect();
        let rows: Vec<Vec<u8>> = (0..10).map(|i| vec![(i % 2) as u8]).collect();
        let labels = LabelMatrix::from_rows(vec!["odd".into()], &rows).unwrap();
        let corpus = Corpus::new(messages, labels).unwrap();

        let (train, test) = corpus.train_test_split(0.2, 3).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        for (i, message) in test.messages().iter().enumerate() {
            let n: usize = message.trim_start_matches("message ").parse().unwrap();
            assert_eq!(test.labels().values()[[i, 0]], (n % 2) as u8);
            assert!(!train.messages().contains(message));
        }

        let (again, _) = corpus.train_test_split(0.2, 3).unwrap();
        assert_eq!(train, again);

        assert!(matches!(corpus.train_test_split(1.5, 3), Err(ClassifierError::Config(_))));
    }
}
