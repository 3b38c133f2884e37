//! Versioned model file.
//!
//! Layout: 4 magic bytes, the format version as a little-endian `u32`, then a
//! bincode-encoded [`ModelArtifact`]. The version is checked before the
//! payload is decoded.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::features::FeatureSchema;
use crate::forest::RandomForest;

pub const ARTIFACT_MAGIC: [u8; 4] = *b"DBRF";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = ARTIFACT_MAGIC.len() + 4;

/// A fitted classifier together with the feature schema it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub schema: FeatureSchema,
    pub created_at: DateTime<Utc>,
    pub model: RandomForest,
}

impl ModelArtifact {
    /// # Errors
    ///
    /// Fails when the forest width differs from the schema length.
    pub fn new(schema: FeatureSchema, model: RandomForest) -> Result<Self> {
        if schema.len() != model.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: schema.len(),
                actual: model.n_features(),
            });
        }
        Ok(Self {
            format_version: FORMAT_VERSION,
            schema,
            created_at: Utc::now(),
            model,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = ARTIFACT_MAGIC.to_vec();
        bytes.extend(self.format_version.to_le_bytes());
        bytes.extend(bincode::serialize(self)?);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let rest = bytes
            .strip_prefix(&ARTIFACT_MAGIC[..])
            .ok_or_else(|| ModelError::invalid_format("magic bytes mismatch"))?;
        if bytes.len() < HEADER_LEN {
            return Err(ModelError::invalid_format("truncated header"));
        }
        let (version, payload) = rest.split_at(4);
        let mut raw = [0u8; 4];
        raw.copy_from_slice(version);
        let found = u32::from_le_bytes(raw);
        if found != FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found,
                expected: FORMAT_VERSION,
            });
        }

        let artifact: Self = bincode::deserialize(payload)
            .map_err(|e| ModelError::invalid_format(e.to_string()))?;
        if artifact.format_version != found {
            return Err(ModelError::invalid_format(format!(
                "header version {found} disagrees with payload version {}",
                artifact.format_version
            )));
        }
        Ok(artifact)
    }

    /// Write the artifact, creating parent directories. An existing file is replaced.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes)?;
        info!("Model artifact written to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path)?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes)
    }

    /// Reject artifacts trained on a different feature list or order.
    pub fn ensure_schema(&self, expected: &FeatureSchema) -> Result<()> {
        if &self.schema != expected {
            return Err(ModelError::SchemaMismatch {
                expected: expected.names(),
                actual: self.schema.names(),
            });
        }
        Ok(())
    }
}
