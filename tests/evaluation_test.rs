use triage::{ClassifierError, Evaluator, Hyperparameters, LabelMatrix, MaxFeatures, Model};

const MESSAGES: [&str; 4] = [
    "we need water now",
    "please send food",
    "no clean water here",
    "food is running out",
];

fn labels() -> LabelMatrix {
    LabelMatrix::from_rows(
        vec!["water".into(), "food".into(), "fire".into()],
        &[vec![1, 0, 0], vec![0, 1, 0], vec![1, 0, 0], vec![0, 1, 0]],
    )
    .expect("valid labels")
}

fn memorizing_model() -> Model {
    let params = Hyperparameters {
        n_estimators: 5,
        bootstrap: false,
        max_features: MaxFeatures::All,
        ..Hyperparameters::default()
    };
    let mut model = Model::new(params, 42);
    model.fit(&MESSAGES, &labels()).expect("fit");
    model
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_perfect_predictor_scores_one() -> Result<(), Box<dyn std::error::Error>> {
    let model = memorizing_model();
    let report = Evaluator::new().evaluate(&model, &MESSAGES, &labels(), &names(&["water", "food"]))?;

    assert_eq!(report.categories.len(), 2);
    for score in &report.categories {
        assert_eq!(score.accuracy, 1.0, "{}", score.category);
        assert_eq!(score.precision, 1.0, "{}", score.category);
        assert_eq!(score.recall, 1.0, "{}", score.category);
    }
    assert_eq!(report.accuracy.mean, 1.0);
    assert_eq!(report.accuracy.std, 0.0);
    Ok(())
}

#[test]
fn test_category_without_positives_scores_zero() -> Result<(), Box<dyn std::error::Error>> {
    let model = memorizing_model();
    let report = Evaluator::new().evaluate(&model, &MESSAGES, &labels(), &names(&["water", "fire"]))?;

    let fire = report.category("fire").expect("fire row");
    assert_eq!(fire.accuracy, 1.0);
    assert_eq!(fire.precision, 0.0);
    assert_eq!(fire.recall, 0.0);

    // one perfect and one degenerate category
    assert_eq!(report.precision.mean, 0.5);
    assert!((report.precision.std - 0.5f64.sqrt()).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_report_follows_requested_order_by_name() -> Result<(), Box<dyn std::error::Error>> {
    let model = memorizing_model();
    // same data, label columns stored in a different order than the model's
    let reordered = LabelMatrix::from_rows(
        vec!["fire".into(), "food".into(), "water".into()],
        &[vec![0, 0, 1], vec![0, 1, 0], vec![0, 0, 1], vec![0, 1, 0]],
    )?;
    let report = Evaluator::new().evaluate(&model, &MESSAGES, &reordered, &names(&["food", "water"]))?;

    let order: Vec<&str> = report.categories.iter().map(|c| c.category.as_str()).collect();
    assert_eq!(order, vec!["food", "water"]);
    assert!(report.categories.iter().all(|c| c.accuracy == 1.0 && c.recall == 1.0));
    Ok(())
}

#[test]
fn test_evaluation_errors() {
    let model = memorizing_model();
    let evaluator = Evaluator::new();

    assert!(matches!(
        evaluator.evaluate(&model, &MESSAGES, &labels(), &[]),
        Err(ClassifierError::EmptyCategorySet)
    ));
    assert!(matches!(
        evaluator.evaluate(&model, &MESSAGES, &labels(), &names(&["shelter"])),
        Err(ClassifierError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        evaluator.evaluate(&model, &MESSAGES[..2], &labels(), &names(&["water"])),
        Err(ClassifierError::DimensionMismatch { .. })
    ));

    let unfitted = Model::new(Hyperparameters::default(), 1);
    assert!(matches!(
        evaluator.evaluate(&unfitted, &MESSAGES, &labels(), &names(&["water"])),
        Err(ClassifierError::NotFitted(_))
    ));
}

#[test]
fn test_report_display() -> Result<(), Box<dyn std::error::Error>> {
    let model = memorizing_model();
    let report = Evaluator::new().evaluate(&model, &MESSAGES, &labels(), &names(&["water", "food", "fire"]))?;
    let text = report.to_string();
    assert!(text.contains("Model Quality:"));
    assert!(text.contains("Model Precision:"));
    assert!(text.contains("(+/- "));
    assert_eq!(text.lines().filter(|l| l.starts_with("fire")).count(), 1);
    Ok(())
}
