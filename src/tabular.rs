//! Flattens a GeoJSON feature collection into CSV: one column per attribute, followed by a
//! `geometry` column holding WKT.

use csv::WriterBuilder;
use geojson::{Feature, FeatureCollection, JsonValue};
use wkt::ToWkt;

use crate::error::PipelineError;
use crate::spatial::Schema;

pub const GEOMETRY_COLUMN: &str = "geometry";

#[derive(Debug, Clone)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: usize,
    pub bytes: Vec<u8>,
}

pub fn to_csv(collection: &FeatureCollection) -> Result<CsvTable, PipelineError> {
    let schema = Schema::of(&collection.features);
    let mut header = schema.columns().to_vec();
    header.push(GEOMETRY_COLUMN.to_string());

    let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    writer
        .write_record(&header)
        .map_err(|err| PipelineError::Csv(err.to_string()))?;

    for feature in &collection.features {
        let mut record = schema
            .columns()
            .iter()
            .map(|column| cell(feature.property(column)))
            .collect::<Vec<_>>();
        record.push(geometry_wkt(feature)?);
        writer
            .write_record(&record)
            .map_err(|err| PipelineError::Csv(err.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| PipelineError::Csv(err.to_string()))?;
    Ok(CsvTable {
        header,
        rows: collection.features.len(),
        bytes,
    })
}

fn cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn geometry_wkt(feature: &Feature) -> Result<String, PipelineError> {
    let Some(geometry) = &feature.geometry else {
        return Ok(String::new());
    };
    let geometry = geo::Geometry::<f64>::try_from(geometry.value.clone())
        .map_err(|err| PipelineError::InvalidGeometry(err.to_string()))?;
    Ok(geometry.wkt_string())
}
