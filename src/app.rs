use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::BoundaryFilter;
use crate::domain::{AssetKey, AssetKind, FeatureCollection, RemoteLayer, ServiceFamily};
use crate::error::PipelineError;
use crate::esri::FeatureSource;
use crate::spatial::clip_to_boundary;
use crate::store::Store;
use crate::tabular::to_csv;

#[derive(Debug, Clone, Serialize)]
pub struct MaterializeResult {
    pub items: Vec<MaterializedAsset>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializedAsset {
    pub asset: String,
    pub path: String,
    /// Features written, or data rows for tabular artifacts.
    pub records: usize,
    pub materialized_at: String,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub assets: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub asset: String,
    pub description: String,
    pub deps: Vec<String>,
    pub path: String,
    pub materialized: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Runs pipeline steps. `P` serves the Pima County layers, `Q` the PAG layers.
#[derive(Clone)]
pub struct App<P: FeatureSource, Q: FeatureSource> {
    store: Store,
    pima_gis: P,
    pag_region: Q,
    boundary: BoundaryFilter,
}

impl<P: FeatureSource, Q: FeatureSource> App<P, Q> {
    pub fn new(store: Store, pima_gis: P, pag_region: Q, boundary: BoundaryFilter) -> Self {
        Self {
            store,
            pima_gis,
            pag_region,
            boundary,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Materializes `assets` in dependency order, each at most once. An empty slice means
    /// every asset. Upstream artifacts are read from disk, not rebuilt.
    pub fn materialize(
        &self,
        assets: &[AssetKey],
        sink: &dyn ProgressSink,
    ) -> Result<MaterializeResult, PipelineError> {
        let selected = AssetKey::ALL
            .into_iter()
            .filter(|key| assets.is_empty() || assets.contains(key))
            .collect::<Vec<_>>();

        let mut items = Vec::with_capacity(selected.len());
        for key in selected {
            items.push(self.materialize_one(key, sink)?);
        }
        Ok(MaterializeResult { items })
    }

    pub fn list(&self) -> ListResult {
        let assets = AssetKey::ALL
            .into_iter()
            .map(|key| {
                let artifact = key.artifact();
                ListEntry {
                    asset: key.name().to_string(),
                    description: key.description().to_string(),
                    deps: key.deps().iter().map(|dep| dep.name().to_string()).collect(),
                    path: self.store.artifact_path(&artifact).to_string(),
                    materialized: self.store.exists(&artifact),
                }
            })
            .collect();
        ListResult { assets }
    }

    fn materialize_one(
        &self,
        key: AssetKey,
        sink: &dyn ProgressSink,
    ) -> Result<MaterializedAsset, PipelineError> {
        sink.event(ProgressEvent {
            message: format!("phase=Start; {key}"),
            elapsed: None,
        });
        let start = Instant::now();

        let (path, records) = match key.kind() {
            AssetKind::Fetch(layer) => self.fetch_layer(key, layer, sink)?,
            AssetKind::ClipToBoundary { input, boundaries } => {
                self.clip(key, input, boundaries, sink)?
            }
            AssetKind::ToCsv { input } => self.convert_csv(key, input, sink)?,
        };

        let elapsed = start.elapsed();
        info!(asset = %key, path = %path, records, "materialized");
        sink.event(ProgressEvent {
            message: format!("phase=Done; {key} records={records}"),
            elapsed: Some(elapsed),
        });
        Ok(MaterializedAsset {
            asset: key.name().to_string(),
            path: path.to_string(),
            records,
            materialized_at: Utc::now().to_rfc3339(),
            elapsed_ms: elapsed.as_millis(),
        })
    }

    fn source(&self, family: ServiceFamily) -> &dyn FeatureSource {
        match family {
            ServiceFamily::PimaGis => &self.pima_gis,
            ServiceFamily::PagRegion => &self.pag_region,
        }
    }

    fn fetch_layer(
        &self,
        key: AssetKey,
        layer: RemoteLayer,
        sink: &dyn ProgressSink,
    ) -> Result<(Utf8PathBuf, usize), PipelineError> {
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {} {}", layer.family, layer.resource_path),
            elapsed: None,
        });
        let start = Instant::now();
        let collection: FeatureCollection = self
            .source(layer.family)
            .fetch_all_features(layer.resource_path)?;
        sink.event(ProgressEvent {
            message: format!("phase=Store; {} features", collection.len()),
            elapsed: Some(start.elapsed()),
        });
        let path = self.store.write_features(&key.artifact(), &collection)?;
        Ok((path, collection.len()))
    }

    fn clip(
        &self,
        key: AssetKey,
        input: AssetKey,
        boundaries: AssetKey,
        sink: &dyn ProgressSink,
    ) -> Result<(Utf8PathBuf, usize), PipelineError> {
        sink.event(ProgressEvent {
            message: format!("phase=Load; {input}, {boundaries}"),
            elapsed: None,
        });
        let boundaries = self.store.read_geojson(&boundaries.artifact())?;
        let mut collection = self.store.read_geojson(&input.artifact())?;

        sink.event(ProgressEvent {
            message: format!(
                "phase=Join; {} within {}={}",
                input, self.boundary.field, self.boundary.value
            ),
            elapsed: None,
        });
        let features = std::mem::take(&mut collection.features);
        collection.features = clip_to_boundary(features, boundaries.features, &self.boundary)?;

        let path = self.store.write_geojson(&key.artifact(), &collection)?;
        Ok((path, collection.features.len()))
    }

    fn convert_csv(
        &self,
        key: AssetKey,
        input: AssetKey,
        sink: &dyn ProgressSink,
    ) -> Result<(Utf8PathBuf, usize), PipelineError> {
        sink.event(ProgressEvent {
            message: format!("phase=Convert; {input} to csv"),
            elapsed: None,
        });
        let collection = self.store.read_geojson(&input.artifact())?;
        let table = to_csv(&collection)?;
        let path = self.store.write(&key.artifact(), &table.bytes)?;
        Ok((path, table.rows))
    }
}
