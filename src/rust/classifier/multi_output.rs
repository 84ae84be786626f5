use log::debug;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::{ClassifierError, Result};
use super::features::FeatureMatrix;
use super::forest::{ColumnIndex, RandomForest};

/// One independent binary forest per category, all trained on the same feature matrix.
///
/// Categories share no parameters; forest `j` is fitted against label column `j` only and is
/// seeded with `random_state + j * 1_000_003` so every category draws its own bootstrap samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiOutputClassifier {
    template: RandomForest,
    estimators: Vec<RandomForest>,
}

impl MultiOutputClassifier {
    pub fn new(template: RandomForest) -> Self {
        Self {
            template,
            estimators: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.estimators.is_empty()
    }

    pub fn estimators(&self) -> &[RandomForest] {
        &self.estimators
    }

    /// Fits one forest per column of `y`. A category that cannot be fitted aborts the whole
    /// fit; no category is ever dropped.
    pub fn fit(&mut self, x: &FeatureMatrix, y: &Array2<u8>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        if x.nrows() != y.nrows() {
            return Err(ClassifierError::dimension_mismatch(
                format!("{} label rows", x.nrows()),
                format!("{} label rows", y.nrows()),
            ));
        }
        if y.ncols() == 0 {
            return Err(ClassifierError::EmptyCategorySet);
        }

        let columns = ColumnIndex::new(x);
        let base_seed = self.template.random_state;
        let estimators = (0..y.ncols())
            .into_par_iter()
            .map(|j| {
                let labels = y.column(j).to_vec();
                let mut forest = self
                    .template
                    .clone()
                    .with_random_state(base_seed.wrapping_add((j as u64).wrapping_mul(1_000_003)));
                forest.fit_with_columns(x, &columns, &labels)?;
                debug!("Fitted category column {} ({} positives)", j, labels.iter().filter(|&&v| v == 1).count());
                Ok(forest)
            })
            .collect::<Result<Vec<_>>>()?;

        self.estimators = estimators;
        Ok(self)
    }

    /// Positive-class probability per row (rows) and category (columns)
    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Array2<f64>> {
        if !self.is_fitted() {
            return Err(ClassifierError::NotFitted("multi-output classifier has no estimators".into()));
        }
        let mut proba = Array2::zeros((x.nrows(), self.estimators.len()));
        for (j, forest) in self.estimators.iter().enumerate() {
            for (i, p) in forest.predict_proba(x)?.into_iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    pub fn predict(&self, x: &FeatureMatrix) -> Result<Array2<u8>> {
        Ok(self.predict_proba(x)?.mapv(|p| u8::from(p > 0.5)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::features::FeatureExtractor;
    use crate::classifier::forest::MaxFeatures;
    use ndarray::array;

    #[test]
    fn test_each_category_gets_its_own_forest() {
        let texts = ["water now", "food now", "water and food", "nothing here"];
        let mut extractor = FeatureExtractor::new(true);
        extractor.fit_texts(&texts).unwrap();
        let x = extractor.transform_texts(&texts).unwrap();
        let y = array![[1u8, 0], [0, 1], [1, 1], [0, 0]];

        let template = RandomForest::new(1)
            .with_bootstrap(false)
            .with_max_features(MaxFeatures::All);
        let mut clf = MultiOutputClassifier::new(template);
        clf.fit(&x, &y).unwrap();

        assert_eq!(clf.estimators().len(), 2);
        assert_eq!(clf.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_shape_errors() {
        let texts = ["water", "food"];
        let mut extractor = FeatureExtractor::new(true);
        extractor.fit_texts(&texts).unwrap();
        let x = extractor.transform_texts(&texts).unwrap();

        let mut clf = MultiOutputClassifier::new(RandomForest::new(2));
        let three_rows = Array2::<u8>::zeros((3, 1));
        assert!(matches!(clf.fit(&x, &three_rows), Err(ClassifierError::DimensionMismatch { .. })));
        let no_columns = Array2::<u8>::zeros((2, 0));
        assert!(matches!(clf.fit(&x, &no_columns), Err(ClassifierError::EmptyCategorySet)));
        assert!(matches!(clf.predict(&x), Err(ClassifierError::NotFitted(_))));
    }
}
