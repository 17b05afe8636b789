use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::domain::ServiceFamily;
use crate::error::PipelineError;
use crate::esri::{DEFAULT_PAGE_SIZE, Paging};

pub const DEFAULT_CONFIG_FILE: &str = "tucson-data.json";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BOUNDARY_FIELD: &str = "NAME";
pub const DEFAULT_BOUNDARY_VALUE: &str = "TUCSON";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub boundary: BoundaryConfig,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub pima_gis: Option<ServiceEntry>,
    #[serde(default)]
    pub pag_region: Option<ServiceEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ServiceEntry {
    Shorthand(String),
    Detailed(ServiceEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServiceEntryObject {
    pub base_url: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PagingConfig {
    #[serde(default)]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub max_pages: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BoundaryConfig {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// The boundary record the clipping steps select: `properties[field] == value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryFilter {
    pub field: String,
    pub value: String,
}

impl Default for BoundaryFilter {
    fn default() -> Self {
        Self {
            field: DEFAULT_BOUNDARY_FIELD.to_string(),
            value: DEFAULT_BOUNDARY_VALUE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Utf8PathBuf,
    pub pima_gis_url: String,
    pub pag_region_url: String,
    pub paging: Paging,
    pub boundary: BoundaryFilter,
    pub timeout: Option<Duration>,
}

impl ResolvedConfig {
    pub fn base_url(&self, family: ServiceFamily) -> &str {
        match family {
            ServiceFamily::PimaGis => &self.pima_gis_url,
            ServiceFamily::PagRegion => &self.pag_region_url,
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            data_dir: Utf8PathBuf::from(DEFAULT_DATA_DIR),
            pima_gis_url: ServiceFamily::PimaGis.default_base_url().to_string(),
            pag_region_url: ServiceFamily::PagRegion.default_base_url().to_string(),
            paging: Paging::default(),
            boundary: BoundaryFilter::default(),
            timeout: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `tucson-data.json` when no path is given. A missing default file
    /// yields the built-in defaults; a missing explicit file is an error.
    pub fn resolve(path: Option<&Utf8Path>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PipelineError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(PipelineError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let data_dir = config
            .data_dir
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATA_DIR));

        let pima_gis_url = resolve_service(config.services.pima_gis, ServiceFamily::PimaGis)?;
        let pag_region_url =
            resolve_service(config.services.pag_region, ServiceFamily::PagRegion)?;

        let page_size = config.paging.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "paging.page_size must be greater than zero".to_string(),
            ));
        }
        if config.paging.max_pages == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "paging.max_pages must be greater than zero when set".to_string(),
            ));
        }

        let defaults = BoundaryFilter::default();
        let boundary = BoundaryFilter {
            field: config.boundary.field.unwrap_or(defaults.field),
            value: config.boundary.value.unwrap_or(defaults.value),
        };
        if boundary.field.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "boundary.field must not be empty".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            data_dir,
            pima_gis_url,
            pag_region_url,
            paging: Paging {
                page_size,
                max_pages: config.paging.max_pages,
            },
            boundary,
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }
}

fn resolve_service(
    entry: Option<ServiceEntry>,
    family: ServiceFamily,
) -> Result<String, PipelineError> {
    let base_url = match entry {
        None => return Ok(family.default_base_url().to_string()),
        Some(ServiceEntry::Shorthand(value)) => value,
        Some(ServiceEntry::Detailed(obj)) => obj.base_url,
    };
    Url::parse(base_url.trim()).map_err(|err| {
        PipelineError::InvalidConfig(format!("services.{family}.base_url {base_url:?}: {err}"))
    })?;
    Ok(base_url.trim().to_string())
}
