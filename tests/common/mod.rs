#![allow(dead_code)]

pub mod feature_server;

use geojson::{Feature, Geometry, JsonObject, Value};
use serde_json::json;

pub fn square(min: f64, max: f64) -> Value {
    Value::Polygon(vec![vec![
        vec![min, min],
        vec![max, min],
        vec![max, max],
        vec![min, max],
        vec![min, min],
    ]])
}

pub fn feature(geometry: Value, properties: serde_json::Value) -> Feature {
    let properties: JsonObject = match properties {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    };
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn point(x: f64, y: f64, properties: serde_json::Value) -> Feature {
    feature(Value::Point(vec![x, y]), properties)
}

/// Boundaries as the county publishes them: Tucson is the square (0,0)-(10,10).
pub fn boundaries() -> Vec<Feature> {
    vec![
        feature(square(0.0, 10.0), json!({"NAME": "TUCSON", "JURIS": "COT", "OBJECTID": 7})),
        feature(square(20.0, 30.0), json!({"NAME": "MARANA", "JURIS": "MAR", "OBJECTID": 8})),
    ]
}
