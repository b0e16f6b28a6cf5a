//! GeoJSON types for location responses.
//!
//! Per OGC API Features, an items request returns a FeatureCollection and
//! a single-item request returns a bare Feature. Properties are an open
//! JSON object since every upstream carries its own attribute set.
//!
//! See: <https://datatracker.ietf.org/doc/html/rfc7946>

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A GeoJSON FeatureCollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    /// Type identifier (always "FeatureCollection").
    #[serde(rename = "type")]
    pub type_: String,

    /// Array of features.
    pub features: Vec<Feature>,

    /// Number of features matching the query before limit/offset.
    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<usize>,

    /// Number of features in this response.
    #[serde(rename = "numberReturned")]
    pub number_returned: usize,
}

impl FeatureCollection {
    /// Create a new empty FeatureCollection.
    pub fn new() -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            features: Vec::new(),
            number_matched: None,
            number_returned: 0,
        }
    }

    /// Add multiple features to the collection.
    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features.extend(features);
        self.number_returned = self.features.len();
        self
    }

    /// Set the matched count.
    pub fn with_number_matched(mut self, matched: usize) -> Self {
        self.number_matched = Some(matched);
        self
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// A GeoJSON Feature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    /// Type identifier (always "Feature").
    #[serde(rename = "type")]
    pub type_: String,

    /// Feature identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The geometry, serialized as `null` when skipped.
    pub geometry: Option<Geometry>,

    /// Free-form properties.
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Create a feature with the given geometry and no properties.
    pub fn new(geometry: Option<Geometry>) -> Self {
        Self {
            type_: "Feature".to_string(),
            id: None,
            geometry,
            properties: Map::new(),
        }
    }

    /// Set the feature ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the properties.
    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    /// Keep only the listed property keys.
    pub fn retain_properties(&mut self, keys: &[String]) {
        self.properties.retain(|k, _| keys.iter().any(|s| s == k));
    }
}

/// Either a single Feature or a FeatureCollection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GeoJsonResponse {
    /// Single-item response.
    Feature(Box<Feature>),
    /// Items response.
    FeatureCollection(FeatureCollection),
}

/// GeoJSON geometry types carried by location records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    /// A point geometry.
    Point {
        /// Coordinates as [longitude, latitude].
        coordinates: [f64; 2],
    },

    /// A line string geometry.
    LineString {
        /// Array of [longitude, latitude] coordinate pairs.
        coordinates: Vec<[f64; 2]>,
    },

    /// A polygon geometry.
    Polygon {
        /// Array of linear rings (first is exterior, rest are holes).
        coordinates: Vec<Vec<[f64; 2]>>,
    },

    /// A multi-polygon geometry.
    MultiPolygon {
        /// Array of polygons.
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
}

impl Geometry {
    /// Create a point geometry.
    pub fn point(lon: f64, lat: f64) -> Self {
        Geometry::Point {
            coordinates: [lon, lat],
        }
    }

    /// Create a polygon geometry.
    pub fn polygon(coordinates: Vec<Vec<[f64; 2]>>) -> Self {
        Geometry::Polygon { coordinates }
    }

    /// The point coordinates, if this is a point.
    pub fn as_point(&self) -> Option<(f64, f64)> {
        match self {
            Geometry::Point { coordinates } => Some((coordinates[0], coordinates[1])),
            _ => None,
        }
    }

    /// Rings describing the area covered by this geometry.
    ///
    /// Lines are returned as a single open ring; multi-polygons contribute
    /// their first polygon.
    pub fn area_rings(&self) -> Vec<Vec<[f64; 2]>> {
        match self {
            Geometry::Point { coordinates } => vec![vec![*coordinates]],
            Geometry::LineString { coordinates } => vec![coordinates.clone()],
            Geometry::Polygon { coordinates } => coordinates.clone(),
            Geometry::MultiPolygon { coordinates } => {
                coordinates.first().cloned().unwrap_or_default()
            }
        }
    }

    /// Convert to a `geo` geometry for spatial predicates.
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        fn line(coords: &[[f64; 2]]) -> geo::LineString<f64> {
            coords.iter().map(|c| (c[0], c[1])).collect()
        }
        fn polygon(rings: &[Vec<[f64; 2]>]) -> geo::Polygon<f64> {
            let mut iter = rings.iter();
            let exterior = iter.next().map(|r| line(r)).unwrap_or_else(|| line(&[]));
            geo::Polygon::new(exterior, iter.map(|r| line(r)).collect())
        }

        match self {
            Geometry::Point { coordinates } => {
                geo::Geometry::Point(geo::Point::new(coordinates[0], coordinates[1]))
            }
            Geometry::LineString { coordinates } => geo::Geometry::LineString(line(coordinates)),
            Geometry::Polygon { coordinates } => geo::Geometry::Polygon(polygon(coordinates)),
            Geometry::MultiPolygon { coordinates } => geo::Geometry::MultiPolygon(
                geo::MultiPolygon::new(coordinates.iter().map(|p| polygon(p)).collect()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_collection_new() {
        let fc = FeatureCollection::new();
        assert_eq!(fc.type_, "FeatureCollection");
        assert!(fc.features.is_empty());
        assert_eq!(fc.number_returned, 0);
    }

    #[test]
    fn test_with_features_updates_count() {
        let fc = FeatureCollection::new()
            .with_features(vec![Feature::new(None), Feature::new(None)])
            .with_number_matched(10);
        assert_eq!(fc.number_returned, 2);
        assert_eq!(fc.number_matched, Some(10));
    }

    #[test]
    fn test_skipped_geometry_serializes_as_null() {
        let feature = Feature::new(None).with_id("1");
        let value = serde_json::to_value(&feature).unwrap();
        assert_eq!(value["geometry"], Value::Null);
        assert_eq!(value["id"], "1");
    }

    #[test]
    fn test_retain_properties() {
        let mut props = Map::new();
        props.insert("name".to_string(), json!("Lake Granby"));
        props.insert("elevation".to_string(), json!(8280.0));
        props.insert("type".to_string(), json!("Lake/Reservoir"));

        let mut feature = Feature::new(None).with_properties(props);
        feature.retain_properties(&["name".to_string(), "missing".to_string()]);

        assert_eq!(feature.properties.len(), 1);
        assert!(feature.properties.contains_key("name"));
    }

    #[test]
    fn test_geometry_serialization() {
        let geom = Geometry::point(-105.86, 40.15);
        let json = serde_json::to_string(&geom).unwrap();
        assert_eq!(json, r#"{"type":"Point","coordinates":[-105.86,40.15]}"#);

        let parsed: Geometry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_point(), Some((-105.86, 40.15)));
    }

    #[test]
    fn test_polygon_to_geo() {
        let geom = Geometry::polygon(vec![vec![
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 2.0],
            [0.0, 2.0],
            [0.0, 0.0],
        ]]);
        match geom.to_geo() {
            geo::Geometry::Polygon(p) => assert_eq!(p.exterior().0.len(), 5),
            other => panic!("Expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_response_untagged_serialization() {
        let single = GeoJsonResponse::Feature(Box::new(Feature::new(None)));
        let value = serde_json::to_value(&single).unwrap();
        assert_eq!(value["type"], "Feature");

        let many = GeoJsonResponse::FeatureCollection(FeatureCollection::new());
        let value = serde_json::to_value(&many).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
    }
}
