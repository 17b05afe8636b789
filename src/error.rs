use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("feature service request failed: {0}")]
    Transport(String),

    #[error("feature service returned status {status}: {message}")]
    TransportStatus { status: u16, message: String },

    #[error("malformed feature service response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    #[error("feature service at {endpoint} still reported truncation after {pages} pages")]
    #[diagnostic(help("raise paging.max_pages in the config, or unset it to fetch without a cap"))]
    PageLimitExceeded { endpoint: String, pages: usize },

    #[error("no boundary record has {field} = {value:?}")]
    EmptyBoundarySelection { field: String, value: String },

    #[error("{count} boundary records have {field} = {value:?}, expected exactly one")]
    AmbiguousBoundarySelection {
        field: String,
        value: String,
        count: usize,
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("artifact {path} is not a GeoJSON feature collection: {message}")]
    InvalidArtifact { path: Utf8PathBuf, message: String },

    #[error("input artifact not found: {0}")]
    #[diagnostic(help("materialize the upstream asset first"))]
    ArtifactMissing(Utf8PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("unknown asset: {0}")]
    #[diagnostic(help("run `tucson-data list` to see available assets"))]
    UnknownAsset(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
