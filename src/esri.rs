use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::FeatureCollection;
use crate::error::PipelineError;

/// Records per page on ArcGIS map services unless the layer says otherwise.
pub const DEFAULT_PAGE_SIZE: u64 = 2000;

/// Query parameters sent with every page request. `resultOffset` is appended per page.
const FIXED_QUERY_PARAMS: &[(&str, &str)] = &[
    ("where", "1=1"),
    ("text", ""),
    ("objectIds", ""),
    ("time", ""),
    ("timeRelation", "esriTimeRelationOverlaps"),
    ("geometry", ""),
    ("geometryType", "esriGeometryEnvelope"),
    ("inSR", ""),
    ("spatialRel", "esriSpatialRelIntersects"),
    ("distance", ""),
    ("units", "esriSRUnit_Foot"),
    ("relationParam", ""),
    ("outFields", "*"),
    ("returnGeometry", "true"),
    ("returnTrueCurves", "false"),
    ("maxAllowableOffset", ""),
    ("geometryPrecision", ""),
    ("outSR", ""),
    ("havingClause", ""),
    ("returnIdsOnly", "false"),
    ("returnCountOnly", "false"),
    ("orderByFields", ""),
    ("groupByFieldsForStatistics", ""),
    ("outStatistics", ""),
    ("returnZ", "false"),
    ("returnM", "false"),
    ("gdbVersion", ""),
    ("historicMoment", ""),
    ("returnDistinctValues", "false"),
    ("resultRecordCount", ""),
    ("returnExtentOnly", "false"),
    ("sqlFormat", "none"),
    ("datumTransformation", ""),
    ("parameterValues", ""),
    ("rangeValues", ""),
    ("quantizationParameters", ""),
    ("featureEncoding", "esriDefault"),
    ("f", "geojson"),
];

/// The parameter set for one page request. Only the offset changes between pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    result_offset: u64,
}

impl QueryParams {
    pub fn first_page() -> Self {
        Self { result_offset: 0 }
    }

    pub fn result_offset(&self) -> u64 {
        self.result_offset
    }

    pub fn advance(&mut self, page_size: u64) {
        self.result_offset += page_size;
    }

    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = FIXED_QUERY_PARAMS
            .iter()
            .map(|(key, value)| (*key, value.to_string()))
            .collect::<Vec<_>>();
        pairs.push(("resultOffset", self.result_offset.to_string()));
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page_size: u64,
    /// Fail instead of requesting more than this many pages. `None` follows the server
    /// for as long as it keeps reporting truncation.
    pub max_pages: Option<usize>,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
        }
    }
}

/// Issues a single query request and returns the decoded JSON body.
pub trait QueryTransport: Send + Sync {
    fn get_json(&self, endpoint: &str, params: &QueryParams) -> Result<Value, PipelineError>;
}

/// Something that can assemble every feature of a layer.
pub trait FeatureSource: Send + Sync {
    fn fetch_all_features(&self, resource_path: &str) -> Result<FeatureCollection, PipelineError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tucson-data/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::Transport(err.to_string()))?,
        );
        // reqwest's blocking client defaults to a 30s timeout; `None` here means no limit.
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::Transport(err.to_string()))?;
        Ok(Self { client })
    }
}

impl QueryTransport for HttpTransport {
    fn get_json(&self, endpoint: &str, params: &QueryParams) -> Result<Value, PipelineError> {
        let response = self
            .client
            .get(endpoint)
            .query(&params.pairs())
            .send()
            .map_err(|err| PipelineError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "feature service request failed".to_string());
            return Err(PipelineError::TransportStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| PipelineError::Transport(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| PipelineError::MalformedResponse {
            endpoint: endpoint.to_string(),
            message: format!("body is not JSON: {err}"),
        })
    }
}

/// A configured client for one ArcGIS REST services root.
#[derive(Clone)]
pub struct EsriService<T: QueryTransport> {
    transport: T,
    base_url: String,
    paging: Paging,
}

impl EsriService<HttpTransport> {
    pub fn http(
        base_url: impl Into<String>,
        paging: Paging,
        timeout: Option<Duration>,
    ) -> Result<Self, PipelineError> {
        Ok(Self::new(HttpTransport::new(timeout)?, base_url, paging))
    }
}

impl<T: QueryTransport> EsriService<T> {
    pub fn new(transport: T, base_url: impl Into<String>, paging: Paging) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            paging,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: QueryTransport> FeatureSource for EsriService<T> {
    fn fetch_all_features(&self, resource_path: &str) -> Result<FeatureCollection, PipelineError> {
        fetch_all_features(&self.transport, &self.base_url, resource_path, self.paging)
    }
}

pub fn query_endpoint(base_url: &str, resource_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = resource_path.trim_matches('/');
    format!("{base}/{path}/query")
}

/// Pages through `{base_url}/{resource_path}/query` until the service stops reporting
/// `exceededTransferLimit`, concatenating features in request order.
pub fn fetch_all_features<T: QueryTransport + ?Sized>(
    transport: &T,
    base_url: &str,
    resource_path: &str,
    paging: Paging,
) -> Result<FeatureCollection, PipelineError> {
    let endpoint = query_endpoint(base_url, resource_path);
    let mut params = QueryParams::first_page();
    let mut features = Vec::new();
    let mut pages = 0usize;

    loop {
        if let Some(max_pages) = paging.max_pages {
            if pages >= max_pages {
                return Err(PipelineError::PageLimitExceeded {
                    endpoint,
                    pages: max_pages,
                });
            }
        }

        let body = transport.get_json(&endpoint, &params)?;
        pages += 1;
        let page = take_features(&endpoint, body)?;
        debug!(
            endpoint = %endpoint,
            offset = params.result_offset(),
            count = page.features.len(),
            truncated = page.exceeded_transfer_limit,
            "fetched page"
        );
        features.extend(page.features);

        if !page.exceeded_transfer_limit {
            break;
        }
        params.advance(paging.page_size);
    }

    info!(endpoint = %endpoint, pages, features = features.len(), "fetched layer");
    Ok(FeatureCollection::new(features))
}

struct Page {
    features: Vec<Value>,
    exceeded_transfer_limit: bool,
}

fn take_features(endpoint: &str, mut body: Value) -> Result<Page, PipelineError> {
    let exceeded_transfer_limit = exceeded_transfer_limit(&body);
    let features = match body.get_mut("features").map(Value::take) {
        Some(Value::Array(features)) => features,
        Some(other) => {
            return Err(PipelineError::MalformedResponse {
                endpoint: endpoint.to_string(),
                message: format!("`features` is not an array: {other}"),
            });
        }
        None => {
            let message = service_error_message(&body)
                .map(|detail| format!("missing `features` ({detail})"))
                .unwrap_or_else(|| "missing `features`".to_string());
            return Err(PipelineError::MalformedResponse {
                endpoint: endpoint.to_string(),
                message,
            });
        }
    };
    Ok(Page {
        features,
        exceeded_transfer_limit,
    })
}

fn exceeded_transfer_limit(body: &Value) -> bool {
    body.get("exceededTransferLimit")
        .or_else(|| {
            body.get("properties")
                .and_then(|value| value.get("exceededTransferLimit"))
        })
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// ArcGIS reports query failures as `{"error": {"code": 400, "message": ...}}` with HTTP 200.
fn service_error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    match error.get("code").and_then(Value::as_i64) {
        Some(code) => Some(format!("service error {code}: {message}")),
        None => Some(format!("service error: {message}")),
    }
}
