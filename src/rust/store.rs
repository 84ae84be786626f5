use std::fs;
use std::path::Path;

use log::{info, warn};
use sha2::{Digest, Sha256};

use crate::classifier::{ClassifierError, Model, Result};

/// Schema version written by this build
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const MAGIC: &[u8; 8] = b"TRIAGEMD";
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 4 + DIGEST_LEN;

/// Saves and restores fitted models as single self-describing files.
///
/// An artifact is the magic tag, the schema version (u32, little endian), the SHA-256 digest of
/// the payload, and the bincode-encoded model. A store only loads artifacts whose schema version
/// equals its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStore {
    schema_version: u32,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStore {
    pub fn new() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }

    pub fn with_schema_version(schema_version: u32) -> Self {
        Self { schema_version }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Writes `model` to `path`, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, model: &Model, path: P) -> Result<()> {
        let path = path.as_ref();
        if !model.is_fitted() {
            return Err(ClassifierError::NotFitted("only fitted models can be saved".into()));
        }
        let payload = bincode::serialize(model)
            .map_err(|e| ClassifierError::CorruptArtifact(format!("failed to encode model: {}", e)))?;
        let digest = Sha256::digest(&payload);

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&self.schema_version.to_le_bytes());
        bytes.extend_from_slice(&digest);
        bytes.extend_from_slice(&payload);
        fs::write(path, &bytes)?;

        info!(
            "Saved model to {:?} ({} bytes, schema v{}, sha256 {:x})",
            path,
            bytes.len(),
            self.schema_version,
            digest
        );
        Ok(())
    }

    /// Reads a model from `path`.
    ///
    /// # Errors
    /// * `ClassifierError::Io` if the file cannot be read
    /// * `ClassifierError::CorruptArtifact` if the file is not an artifact, was written under a
    ///   different schema version, fails its digest check or does not decode
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Model> {
        let path = path.as_ref();
        info!("Loading model from {:?}", path);
        let bytes = fs::read(path)?;
        self.decode(&bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Model> {
        if bytes.len() < HEADER_LEN {
            return Err(ClassifierError::CorruptArtifact(format!(
                "artifact is {} bytes, shorter than its {} byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let (magic, rest) = bytes.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(ClassifierError::CorruptArtifact("not a model artifact".into()));
        }
        let (version, rest) = rest.split_at(4);
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(version);
        let version = u32::from_le_bytes(version_bytes);
        if version != self.schema_version {
            return Err(ClassifierError::CorruptArtifact(format!(
                "schema version {} is not supported (expected {})",
                version, self.schema_version
            )));
        }

        let (expected, payload) = rest.split_at(DIGEST_LEN);
        let actual = Sha256::digest(payload);
        if actual.as_slice() != expected {
            warn!("Artifact digest mismatch: got {:x}", actual);
            return Err(ClassifierError::CorruptArtifact("payload digest mismatch".into()));
        }

        let model: Model = bincode::deserialize(payload)
            .map_err(|e| ClassifierError::CorruptArtifact(format!("failed to decode model: {}", e)))?;
        if !model.is_fitted() {
            return Err(ClassifierError::CorruptArtifact("artifact holds an unfitted model".into()));
        }
        Ok(model)
    }
}
