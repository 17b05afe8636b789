mod common;

use std::sync::Mutex;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use tucson_data::error::PipelineError;
use tucson_data::esri::{
    EsriService, FeatureSource, Paging, QueryParams, QueryTransport, fetch_all_features,
};

use common::feature_server;

/// Answers requests from a fixed list of bodies and records the offsets it was asked for.
struct ScriptedTransport {
    pages: Vec<Value>,
    calls: Mutex<Vec<(String, u64)>>,
}

impl ScriptedTransport {
    fn new(pages: Vec<Value>) -> Self {
        Self {
            pages,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn offsets(&self) -> Vec<u64> {
        self.calls.lock().unwrap().iter().map(|(_, o)| *o).collect()
    }
}

impl QueryTransport for ScriptedTransport {
    fn get_json(&self, endpoint: &str, params: &QueryParams) -> Result<Value, PipelineError> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push((endpoint.to_string(), params.result_offset()));
        self.pages
            .get(index)
            .cloned()
            .ok_or_else(|| PipelineError::Transport("no more scripted pages".to_string()))
    }
}

fn page(ids: std::ops::Range<u64>, truncated: Option<bool>) -> Value {
    let features = ids
        .map(|id| json!({"type": "Feature", "id": id, "geometry": null, "properties": {"OBJECTID": id}}))
        .collect::<Vec<_>>();
    let mut body = json!({"type": "FeatureCollection", "features": features});
    if let Some(flag) = truncated {
        body["exceededTransferLimit"] = json!(flag);
    }
    body
}

fn ids(features: &[Value]) -> Vec<u64> {
    features.iter().map(|f| f["id"].as_u64().unwrap()).collect()
}

#[test]
fn follows_truncation_until_last_page() {
    let transport = ScriptedTransport::new(vec![
        page(0..3, Some(true)),
        page(3..6, Some(true)),
        page(6..8, Some(true)),
        page(8..9, Some(false)),
    ]);

    let collection =
        fetch_all_features(&transport, "https://host/services/", "Layer/MapServer/2", Paging::default())
            .unwrap();

    assert_eq!(ids(&collection.features), (0..9).collect::<Vec<_>>());
    assert_eq!(transport.offsets(), vec![0, 2000, 4000, 6000]);
    let calls = transport.calls.lock().unwrap();
    assert!(
        calls
            .iter()
            .all(|(endpoint, _)| endpoint == "https://host/services/Layer/MapServer/2/query")
    );
}

#[test]
fn absent_flag_means_single_page() {
    let transport = ScriptedTransport::new(vec![page(0..5, None), page(5..6, None)]);

    let collection =
        fetch_all_features(&transport, "https://host/services", "Layer/MapServer/0", Paging::default())
            .unwrap();

    assert_eq!(ids(&collection.features), vec![0, 1, 2, 3, 4]);
    assert_eq!(transport.offsets(), vec![0]);
}

#[test]
fn flag_under_properties_is_honored() {
    let transport = ScriptedTransport::new(vec![
        json!({"type": "FeatureCollection", "features": [{"id": 1}], "properties": {"exceededTransferLimit": true}}),
        json!({"type": "FeatureCollection", "features": [{"id": 2}]}),
    ]);

    let collection =
        fetch_all_features(&transport, "https://host", "Layer", Paging::default()).unwrap();

    assert_eq!(ids(&collection.features), vec![1, 2]);
    assert_eq!(transport.offsets(), vec![0, 2000]);
}

#[test]
fn missing_features_is_malformed() {
    let transport = ScriptedTransport::new(vec![
        page(0..2, Some(true)),
        json!({"exceededTransferLimit": false}),
    ]);

    let err = fetch_all_features(&transport, "https://host", "Layer", Paging::default())
        .unwrap_err();

    assert_matches!(err, PipelineError::MalformedResponse { .. });
}

#[test]
fn empty_layer_yields_empty_collection() {
    let transport = ScriptedTransport::new(vec![json!({"features": []})]);

    let collection =
        fetch_all_features(&transport, "https://host", "Layer", Paging::default()).unwrap();

    assert!(collection.is_empty());
    assert_eq!(
        serde_json::to_value(&collection).unwrap(),
        json!({"type": "FeatureCollection", "features": []})
    );
}

#[test]
fn page_guard_stops_endless_truncation() {
    let transport = ScriptedTransport::new(vec![
        page(0..1, Some(true)),
        page(1..2, Some(true)),
        page(2..3, Some(true)),
    ]);
    let paging = Paging {
        page_size: 2000,
        max_pages: Some(2),
    };

    let err = fetch_all_features(&transport, "https://host", "Layer", paging).unwrap_err();

    assert_matches!(err, PipelineError::PageLimitExceeded { pages: 2, .. });
    assert_eq!(transport.offsets(), vec![0, 2000]);
}

#[test]
fn custom_page_size_advances_offset() {
    let transport = ScriptedTransport::new(vec![page(0..1, Some(true)), page(1..2, None)]);
    let paging = Paging {
        page_size: 1000,
        max_pages: None,
    };

    fetch_all_features(&transport, "https://host", "Layer", paging).unwrap();

    assert_eq!(transport.offsets(), vec![0, 1000]);
}

#[test]
fn http_service_pages_over_the_wire() {
    let server = feature_server::start(|target| {
        let offset: u64 = feature_server::query_param(target, "resultOffset")
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        let body = match offset {
            0 => page(0..2, Some(true)),
            2000 => page(2..4, Some(true)),
            _ => page(4..5, None),
        };
        (200, body.to_string())
    });
    let service = EsriService::http(server.base_url.clone(), Paging::default(), None).unwrap();

    let collection = service
        .fetch_all_features("/GISOpenData/Community/MapServer/2/")
        .unwrap();

    assert_eq!(ids(&collection.features), vec![0, 1, 2, 3, 4]);
    assert_eq!(server.offsets(), vec![0, 2000, 4000]);
    let requests = server.requests();
    assert!(
        requests
            .iter()
            .all(|target| target.starts_with("/arcgis/rest/services/GISOpenData/Community/MapServer/2/query?"))
    );
    assert_eq!(
        feature_server::query_param(&requests[0], "f").as_deref(),
        Some("geojson")
    );
    assert_eq!(
        feature_server::query_param(&requests[0], "outFields").as_deref(),
        Some("*")
    );
}

#[test]
fn http_error_status_is_transport_failure() {
    let server = feature_server::start(|_| (503, "unavailable".to_string()));
    let service = EsriService::http(server.base_url.clone(), Paging::default(), None).unwrap();

    let err = service.fetch_all_features("Layer/MapServer/0").unwrap_err();

    assert_matches!(err, PipelineError::TransportStatus { status: 503, .. });
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn non_json_body_is_malformed() {
    let server = feature_server::start(|_| (200, "<html>maintenance</html>".to_string()));
    let service = EsriService::http(server.base_url.clone(), Paging::default(), None).unwrap();

    let err = service.fetch_all_features("Layer/MapServer/0").unwrap_err();

    assert_matches!(err, PipelineError::MalformedResponse { .. });
}

#[test]
fn unreachable_host_is_transport_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let service =
        EsriService::http(format!("http://127.0.0.1:{port}/"), Paging::default(), None).unwrap();

    let err = service.fetch_all_features("Layer/MapServer/0").unwrap_err();

    assert_matches!(err, PipelineError::Transport(_));
}
