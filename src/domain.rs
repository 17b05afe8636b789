use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;

/// An assembled feature collection as returned by a feature service.
///
/// Features are kept as opaque JSON so that whatever the service sent is written back out
/// unchanged. The `type` tag is always `"FeatureCollection"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Value>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Value>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Source,
    Processed,
    Output,
}

impl Stage {
    pub fn dir_name(self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Processed => "processed",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    GeoJson,
    Csv,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::GeoJson => "geojson",
            ArtifactFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Location of a persisted dataset relative to the data root.
///
/// `group` is the directory the dataset lives in; raw datasets use their own name, derived
/// datasets share the directory of the dataset they were derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Artifact {
    pub stage: Stage,
    pub group: &'static str,
    pub name: &'static str,
    pub format: ArtifactFormat,
}

impl Artifact {
    pub const fn new(
        stage: Stage,
        group: &'static str,
        name: &'static str,
        format: ArtifactFormat,
    ) -> Self {
        Self {
            stage,
            group,
            name,
            format,
        }
    }

    pub fn relative_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.stage.dir_name())
            .join(self.group)
            .join(format!("{}.{}", self.name, self.format.extension()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceFamily {
    PimaGis,
    PagRegion,
}

impl ServiceFamily {
    pub fn default_base_url(self) -> &'static str {
        match self {
            ServiceFamily::PimaGis => "https://gisdata.pima.gov/arcgis1/rest/services/",
            ServiceFamily::PagRegion => "https://maps.pagregion.com/server/rest/services/",
        }
    }
}

impl fmt::Display for ServiceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceFamily::PimaGis => write!(f, "pima_gis"),
            ServiceFamily::PagRegion => write!(f, "pag_region"),
        }
    }
}

/// A layer on a remote feature service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteLayer {
    pub family: ServiceFamily,
    pub resource_path: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKey {
    Libraries,
    JurisdictionalBoundaries,
    LibrariesTucson,
    LibrariesTucsonCsv,
    BicycleRoutes,
    BicycleRoutesTucson,
    Bikeways,
}

/// What a step does to produce its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Download a layer as-is.
    Fetch(RemoteLayer),
    /// Keep the features of `input` that lie within the selected boundary.
    ClipToBoundary {
        input: AssetKey,
        boundaries: AssetKey,
    },
    /// Re-serialize `input` as CSV.
    ToCsv { input: AssetKey },
}

impl AssetKey {
    /// Every asset, upstream before downstream.
    pub const ALL: [AssetKey; 7] = [
        AssetKey::Libraries,
        AssetKey::JurisdictionalBoundaries,
        AssetKey::BicycleRoutes,
        AssetKey::Bikeways,
        AssetKey::LibrariesTucson,
        AssetKey::BicycleRoutesTucson,
        AssetKey::LibrariesTucsonCsv,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AssetKey::Libraries => "libraries",
            AssetKey::JurisdictionalBoundaries => "jurisdictional_boundaries",
            AssetKey::LibrariesTucson => "libraries_tucson",
            AssetKey::LibrariesTucsonCsv => "libraries_tucson_csv",
            AssetKey::BicycleRoutes => "bicycle_routes",
            AssetKey::BicycleRoutesTucson => "bicycle_routes_tucson",
            AssetKey::Bikeways => "bikeways",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AssetKey::Libraries => "Pima County libraries",
            AssetKey::JurisdictionalBoundaries => "Pima County jurisdiction boundaries",
            AssetKey::LibrariesTucson => "Libraries within the City of Tucson",
            AssetKey::LibrariesTucsonCsv => "Libraries within the City of Tucson, as CSV",
            AssetKey::BicycleRoutes => "Pima County bicycle routes",
            AssetKey::BicycleRoutesTucson => "Bicycle routes within the City of Tucson",
            AssetKey::Bikeways => "PAG Tucson metro bikeways",
        }
    }

    pub fn kind(self) -> AssetKind {
        match self {
            AssetKey::Libraries => AssetKind::Fetch(RemoteLayer {
                family: ServiceFamily::PimaGis,
                resource_path: "GISOpenData/Community/MapServer/2",
            }),
            AssetKey::JurisdictionalBoundaries => AssetKind::Fetch(RemoteLayer {
                family: ServiceFamily::PimaGis,
                resource_path: "GISOpenData/Boundaries/MapServer/11",
            }),
            AssetKey::BicycleRoutes => AssetKind::Fetch(RemoteLayer {
                family: ServiceFamily::PimaGis,
                resource_path: "GISOpenData/Transportation/MapServer/2",
            }),
            AssetKey::Bikeways => AssetKind::Fetch(RemoteLayer {
                family: ServiceFamily::PagRegion,
                resource_path: "/Bikemap/TucsonMetroBikeMap/MapServer/4",
            }),
            AssetKey::LibrariesTucson => AssetKind::ClipToBoundary {
                input: AssetKey::Libraries,
                boundaries: AssetKey::JurisdictionalBoundaries,
            },
            AssetKey::BicycleRoutesTucson => AssetKind::ClipToBoundary {
                input: AssetKey::BicycleRoutes,
                boundaries: AssetKey::JurisdictionalBoundaries,
            },
            AssetKey::LibrariesTucsonCsv => AssetKind::ToCsv {
                input: AssetKey::LibrariesTucson,
            },
        }
    }

    pub fn deps(self) -> Vec<AssetKey> {
        match self.kind() {
            AssetKind::Fetch(_) => Vec::new(),
            AssetKind::ClipToBoundary { input, boundaries } => vec![input, boundaries],
            AssetKind::ToCsv { input } => vec![input],
        }
    }

    pub fn artifact(self) -> Artifact {
        use ArtifactFormat::{Csv, GeoJson};
        match self {
            AssetKey::Libraries => Artifact::new(Stage::Source, "libraries", "libraries", GeoJson),
            AssetKey::JurisdictionalBoundaries => Artifact::new(
                Stage::Source,
                "jurisdictional_boundaries",
                "jurisdictional_boundaries",
                GeoJson,
            ),
            AssetKey::BicycleRoutes => {
                Artifact::new(Stage::Source, "bicycle_routes", "bicycle_routes", GeoJson)
            }
            AssetKey::Bikeways => Artifact::new(Stage::Source, "bikeways", "bikeways", GeoJson),
            AssetKey::LibrariesTucson => {
                Artifact::new(Stage::Output, "libraries", "libraries_tucson", GeoJson)
            }
            AssetKey::LibrariesTucsonCsv => {
                Artifact::new(Stage::Output, "libraries", "libraries_tucson", Csv)
            }
            AssetKey::BicycleRoutesTucson => Artifact::new(
                Stage::Output,
                "bicycle_routes",
                "bicycle_routes_tucson",
                GeoJson,
            ),
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AssetKey {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        AssetKey::ALL
            .into_iter()
            .find(|key| key.name() == trimmed)
            .ok_or_else(|| PipelineError::UnknownAsset(value.to_string()))
    }
}
