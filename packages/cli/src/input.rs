//! `GeoJSON` input: keyed features with an attribute table and geometry.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use geo::{Centroid, MultiPolygon, Point};
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use lisa_map_weights::{Contiguity, SpatialWeights, WeightsError, contiguity, distance_band};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while reading features or deriving weights from them.
#[derive(Debug, Error)]
pub enum InputError {
    /// I/O error reading the input file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Input is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    /// A feature lacks the key property.
    #[error("Feature {index} has no '{property}' property")]
    MissingKey {
        /// Position of the feature in the collection.
        index: usize,
        /// Name of the key property.
        property: String,
    },
    /// Two features share a key.
    #[error("Duplicate feature key: {0}")]
    DuplicateKey(String),
    /// An attribute is missing or not a number.
    #[error("Feature {key}: property '{property}' is not numeric")]
    NotNumeric {
        /// Feature key.
        key: String,
        /// Name of the attribute.
        property: String,
    },
    /// A feature's geometry cannot serve the requested weights.
    #[error("Feature {key}: {message}")]
    Geometry {
        /// Feature key.
        key: String,
        /// What is wrong with the geometry.
        message: String,
    },
    /// Weights construction failed.
    #[error(transparent)]
    Weights(#[from] WeightsError),
}

/// How to derive neighbor relations from feature geometry.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightsSpec {
    /// Polygons sharing a vertex.
    Queen,
    /// Polygons sharing an edge.
    Rook,
    /// Centroids within `radius` coordinate units.
    DistanceBand {
        /// Neighborhood radius.
        radius: f64,
    },
}

impl std::fmt::Display for WeightsSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queen => write!(f, "queen contiguity"),
            Self::Rook => write!(f, "rook contiguity"),
            Self::DistanceBand { radius } => write!(f, "distance band {radius}"),
        }
    }
}

struct Unit {
    key: String,
    geometry: Option<geo::Geometry<f64>>,
    properties: JsonObject,
}

/// A keyed `GeoJSON` feature collection.
pub struct Dataset {
    units: Vec<Unit>,
}

impl Dataset {
    /// Reads a `FeatureCollection` from disk, keying features by
    /// `key_property`.
    ///
    /// # Errors
    ///
    /// * If the file cannot be read or parsed
    /// * If a feature lacks the key or repeats one
    pub fn from_path(path: &Path, key_property: &str) -> Result<Self, InputError> {
        let text = std::fs::read_to_string(path)?;
        let dataset = Self::from_geojson_str(&text, key_property)?;
        if dataset.is_empty() {
            log::warn!("{} contains no features", path.display());
        }
        log::info!(
            "Loaded {} features from {}",
            dataset.len(),
            path.display()
        );
        Ok(dataset)
    }

    /// Parses a `FeatureCollection`, keying features by `key_property`.
    ///
    /// Numeric keys are rendered as their JSON text, so `11001000100` and
    /// `"11001000100"` name the same unit.
    ///
    /// # Errors
    ///
    /// * If the text is not a `GeoJSON` feature collection
    /// * If a feature lacks the key or repeats one
    pub fn from_geojson_str(text: &str, key_property: &str) -> Result<Self, InputError> {
        let geojson: GeoJson = text.parse()?;
        let collection = FeatureCollection::try_from(geojson)?;

        let mut seen = BTreeSet::new();
        let mut units = Vec::with_capacity(collection.features.len());

        for (index, feature) in collection.features.into_iter().enumerate() {
            let key = match feature.property(key_property) {
                Some(JsonValue::String(s)) => s.clone(),
                Some(JsonValue::Number(n)) => n.to_string(),
                _ => {
                    return Err(InputError::MissingKey {
                        index,
                        property: key_property.to_string(),
                    });
                }
            };
            if !seen.insert(key.clone()) {
                return Err(InputError::DuplicateKey(key));
            }

            let geometry = feature
                .geometry
                .map(geo::Geometry::<f64>::try_from)
                .transpose()?;

            units.push(Unit {
                key,
                geometry,
                properties: feature.properties.unwrap_or_default(),
            });
        }

        Ok(Self { units })
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the collection holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Reads a numeric attribute for every feature.
    ///
    /// Numeric strings (as produced by CSV joins) are accepted.
    ///
    /// # Errors
    ///
    /// * [`InputError::NotNumeric`] if any feature lacks the attribute or
    ///   holds a non-numeric value
    pub fn attribute(&self, name: &str) -> Result<BTreeMap<String, f64>, InputError> {
        self.units
            .iter()
            .map(|unit| {
                let value = match unit.properties.get(name) {
                    Some(JsonValue::Number(n)) => n.as_f64(),
                    Some(JsonValue::String(s)) => s.trim().parse().ok(),
                    _ => None,
                };
                value.map(|v| (unit.key.clone(), v)).ok_or_else(|| {
                    InputError::NotNumeric {
                        key: unit.key.clone(),
                        property: name.to_string(),
                    }
                })
            })
            .collect()
    }

    /// Derives binary weights from the feature geometry.
    ///
    /// # Errors
    ///
    /// * [`InputError::Geometry`] if a feature has no geometry, or a
    ///   non-polygon one under contiguity rules
    /// * [`InputError::Weights`] if the builder rejects the input
    pub fn weights(&self, rule: WeightsSpec) -> Result<SpatialWeights, InputError> {
        let weights = match rule {
            WeightsSpec::Queen => contiguity(&self.polygons()?, Contiguity::Queen)?,
            WeightsSpec::Rook => contiguity(&self.polygons()?, Contiguity::Rook)?,
            WeightsSpec::DistanceBand { radius } => distance_band(&self.points()?, radius)?,
        };
        Ok(weights)
    }

    fn polygons(&self) -> Result<Vec<(String, MultiPolygon<f64>)>, InputError> {
        self.units
            .iter()
            .map(|unit| {
                let polygon = match &unit.geometry {
                    Some(geo::Geometry::Polygon(p)) => MultiPolygon(vec![p.clone()]),
                    Some(geo::Geometry::MultiPolygon(mp)) => mp.clone(),
                    Some(_) => return Err(unit.geometry_error("contiguity needs polygons")),
                    None => return Err(unit.geometry_error("missing geometry")),
                };
                Ok((unit.key.clone(), polygon))
            })
            .collect()
    }

    fn points(&self) -> Result<Vec<(String, Point<f64>)>, InputError> {
        self.units
            .iter()
            .map(|unit| {
                let point = match &unit.geometry {
                    Some(geo::Geometry::Point(p)) => Some(*p),
                    Some(geometry) => geometry.centroid(),
                    None => return Err(unit.geometry_error("missing geometry")),
                };
                point
                    .map(|p| (unit.key.clone(), p))
                    .ok_or_else(|| unit.geometry_error("empty geometry has no centroid"))
            })
            .collect()
    }
}

impl Unit {
    fn geometry_error(&self, message: &str) -> InputError {
        InputError::Geometry {
            key: self.key.clone(),
            message: message.to_string(),
        }
    }
}
