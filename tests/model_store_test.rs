use std::fs;

use tempfile::tempdir;
use triage::{ClassifierError, Hyperparameters, LabelMatrix, Model, ModelStore, CURRENT_SCHEMA_VERSION};

fn trained_model() -> Model {
    let messages = [
        "the river flooded the village",
        "we have no shelter tonight",
        "flood water is rising fast",
        "tents are needed for families",
        "houses flooded near the river",
        "people sleeping outside without shelter",
    ];
    let labels = LabelMatrix::from_rows(
        vec!["floods".into(), "shelter".into()],
        &[vec![1, 0], vec![0, 1], vec![1, 0], vec![0, 1], vec![1, 0], vec![0, 1]],
    )
    .expect("valid labels");
    let params = Hyperparameters {
        n_estimators: 6,
        ..Hyperparameters::default()
    };
    let mut model = Model::new(params, 5);
    model.fit(&messages, &labels).expect("fit");
    model
}

#[test]
fn test_round_trip_preserves_predictions() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("classifier.bin");
    let model = trained_model();

    let store = ModelStore::new();
    assert_eq!(store.schema_version(), CURRENT_SCHEMA_VERSION);
    store.save(&model, &path)?;
    let restored = store.load(&path)?;

    let probe = [
        "the river is rising",
        "we need tents",
        "",
        "completely unrelated words",
    ];
    assert_eq!(restored.predict(&probe)?, model.predict(&probe)?);
    assert_eq!(restored.predict_proba(&probe)?, model.predict_proba(&probe)?);
    assert_eq!(restored.params(), model.params());
    assert_eq!(restored.info().vocabulary_size, model.info().vocabulary_size);
    Ok(())
}

#[test]
fn test_older_schema_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("classifier.bin");
    ModelStore::with_schema_version(1).save(&trained_model(), &path)?;

    let result = ModelStore::with_schema_version(2).load(&path);
    assert!(matches!(result, Err(ClassifierError::CorruptArtifact(_))));
    Ok(())
}

#[test]
fn test_garbage_file_is_corrupt() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("classifier.bin");
    fs::write(&path, b"this is not a model artifact at all, just some bytes")?;
    assert!(matches!(
        ModelStore::new().load(&path),
        Err(ClassifierError::CorruptArtifact(_))
    ));
    Ok(())
}

#[test]
fn test_io_errors_surface_unmodified() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let missing_dir = dir.path().join("missing").join("classifier.bin");
    assert!(matches!(
        ModelStore::new().save(&trained_model(), &missing_dir),
        Err(ClassifierError::Io(_))
    ));
    assert!(matches!(
        ModelStore::new().load(&missing_dir),
        Err(ClassifierError::Io(_))
    ));
    Ok(())
}
