use geo::Relate;
use geojson::{Feature, JsonObject, JsonValue};

use crate::config::BoundaryFilter;
use crate::error::PipelineError;

/// Outcome of looking up a boundary by attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundarySelection {
    Single(Feature),
    Empty,
    Ambiguous(usize),
}

impl BoundarySelection {
    pub fn into_single(self, filter: &BoundaryFilter) -> Result<Feature, PipelineError> {
        match self {
            BoundarySelection::Single(feature) => Ok(feature),
            BoundarySelection::Empty => Err(PipelineError::EmptyBoundarySelection {
                field: filter.field.clone(),
                value: filter.value.clone(),
            }),
            BoundarySelection::Ambiguous(count) => Err(PipelineError::AmbiguousBoundarySelection {
                field: filter.field.clone(),
                value: filter.value.clone(),
                count,
            }),
        }
    }
}

/// Selects the features whose `filter.field` property is exactly the string `filter.value`.
pub fn select_boundary(features: Vec<Feature>, filter: &BoundaryFilter) -> BoundarySelection {
    let mut matches = features
        .into_iter()
        .filter(|feature| {
            feature
                .property(&filter.field)
                .and_then(JsonValue::as_str)
                .is_some_and(|value| value == filter.value)
        })
        .collect::<Vec<_>>();
    match matches.len() {
        0 => BoundarySelection::Empty,
        1 => BoundarySelection::Single(matches.remove(0)),
        count => BoundarySelection::Ambiguous(count),
    }
}

/// The ordered set of property names a dataset carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// Union of property names across `features`, in first-seen order.
    pub fn of<'a>(features: impl IntoIterator<Item = &'a Feature>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for feature in features {
            let Some(properties) = &feature.properties else {
                continue;
            };
            for key in properties.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|existing| existing == column)
    }
}

/// A left-hand feature matched to a boundary. Own and boundary attributes are kept apart
/// so name collisions never need renaming.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedFeature {
    pub feature: Feature,
    pub boundary_index: usize,
    pub boundary_properties: JsonObject,
}

impl JoinedFeature {
    /// Drops every attribute that is not part of `schema`.
    pub fn into_schema(self, schema: &Schema) -> Feature {
        let mut feature = self.feature;
        if let Some(properties) = feature.properties.as_mut() {
            properties.retain(|key, _| schema.contains(key));
        }
        feature
    }
}

/// Inner spatial join with the DE-9IM *within* predicate: each left feature is emitted once
/// for every right feature it lies entirely inside. Features that cross a right geometry's
/// edge, or only touch it, do not match; neither do features without geometry.
pub fn sjoin_within(
    left: Vec<Feature>,
    right: &[Feature],
) -> Result<Vec<JoinedFeature>, PipelineError> {
    let right_geometries = right
        .iter()
        .map(|feature| to_geo(feature).map(|geometry| geometry.map(|g| (feature, g))))
        .collect::<Result<Vec<_>, _>>()?;

    let mut joined = Vec::new();
    for feature in left {
        let Some(geometry) = to_geo(&feature)? else {
            continue;
        };
        for (boundary_index, candidate) in right_geometries.iter().enumerate() {
            let Some((boundary, boundary_geometry)) = candidate else {
                continue;
            };
            if geometry.relate(boundary_geometry).is_within() {
                joined.push(JoinedFeature {
                    feature: feature.clone(),
                    boundary_index,
                    boundary_properties: boundary.properties.clone().unwrap_or_default(),
                });
            }
        }
    }
    Ok(joined)
}

/// Keeps the features of `input` that lie within the boundary selected by `filter`, with
/// `input`'s attributes untouched.
pub fn clip_to_boundary(
    input: Vec<Feature>,
    boundaries: Vec<Feature>,
    filter: &BoundaryFilter,
) -> Result<Vec<Feature>, PipelineError> {
    let schema = Schema::of(&input);
    let boundary = select_boundary(boundaries, filter).into_single(filter)?;
    let joined = sjoin_within(input, std::slice::from_ref(&boundary))?;
    Ok(joined
        .into_iter()
        .map(|row| row.into_schema(&schema))
        .collect())
}

fn to_geo(feature: &Feature) -> Result<Option<geo::Geometry<f64>>, PipelineError> {
    let Some(geometry) = &feature.geometry else {
        return Ok(None);
    };
    geo::Geometry::<f64>::try_from(geometry.value.clone())
        .map(Some)
        .map_err(|err| PipelineError::InvalidGeometry(err.to_string()))
}
