use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::domain::{Artifact, FeatureCollection};
use crate::error::PipelineError;

/// The on-disk home of every pipeline artifact: `{data_root}/{stage}/{group}/{name}.{ext}`.
#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
}

impl Store {
    pub fn new(data_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn artifact_path(&self, artifact: &Artifact) -> Utf8PathBuf {
        self.data_root.join(artifact.relative_path())
    }

    pub fn exists(&self, artifact: &Artifact) -> bool {
        self.artifact_path(artifact).as_std_path().exists()
    }

    pub fn read(&self, artifact: &Artifact) -> Result<Vec<u8>, PipelineError> {
        let path = self.artifact_path(artifact);
        if !path.as_std_path().exists() {
            return Err(PipelineError::ArtifactMissing(path));
        }
        fs::read(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("read {path}: {err}")))
    }

    pub fn read_geojson(
        &self,
        artifact: &Artifact,
    ) -> Result<geojson::FeatureCollection, PipelineError> {
        let path = self.artifact_path(artifact);
        let bytes = self.read(artifact)?;
        serde_json::from_slice(&bytes).map_err(|err| PipelineError::InvalidArtifact {
            path,
            message: err.to_string(),
        })
    }

    pub fn write_features(
        &self,
        artifact: &Artifact,
        collection: &FeatureCollection,
    ) -> Result<Utf8PathBuf, PipelineError> {
        let content = serde_json::to_vec(collection)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        self.write(artifact, &content)
    }

    pub fn write_geojson(
        &self,
        artifact: &Artifact,
        collection: &geojson::FeatureCollection,
    ) -> Result<Utf8PathBuf, PipelineError> {
        let content = serde_json::to_vec(collection)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        self.write(artifact, &content)
    }

    pub fn write(&self, artifact: &Artifact, content: &[u8]) -> Result<Utf8PathBuf, PipelineError> {
        let path = self.artifact_path(artifact);
        Self::write_bytes_atomic(&path, content)?;
        Ok(path)
    }

    /// Writes through a sibling temp file so readers never observe a partial artifact.
    /// An existing file at `path` is replaced.
    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PipelineError> {
        let parent = path
            .parent()
            .ok_or_else(|| PipelineError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".tucson-data")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| PipelineError::Filesystem(format!("persist {path}: {}", err.error)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssetKey;

    #[test]
    fn layout_paths() {
        let store = Store::new("data");
        let path = store.artifact_path(&AssetKey::JurisdictionalBoundaries.artifact());
        assert!(
            path.ends_with("source/jurisdictional_boundaries/jurisdictional_boundaries.geojson")
        );

        let csv = store.artifact_path(&AssetKey::LibrariesTucsonCsv.artifact());
        assert!(csv.starts_with("data/output"));
        assert_eq!(csv.extension(), Some("csv"));
    }
}
