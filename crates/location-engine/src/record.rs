//! Location records as produced by upstream sources.

use geo::Centroid;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use edr_protocol::Geometry;

/// Default end date marking a location that is still active.
pub const DEFAULT_SENTINEL: &str = "2100-01-01";

/// Attribute keys holding raw coordinates, never rendered as properties.
pub const COORDINATE_FIELDS: [&str; 5] = [
    "locationCoordinates",
    "coordinates",
    "geometry",
    "latitude",
    "longitude",
];

/// A time series attached to a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRef {
    /// Catalog parameter id (e.g. "3" for reservoir storage).
    pub parameter_id: String,

    /// Upstream id used to query this location's results for the parameter.
    pub series_id: String,
}

impl ParameterRef {
    pub fn new(parameter_id: impl Into<String>, series_id: impl Into<String>) -> Self {
        Self {
            parameter_id: parameter_id.into(),
            series_id: series_id.into(),
        }
    }
}

/// One monitoring location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Identifier, unique within a collection.
    pub id: String,

    /// Display name.
    pub name: Option<String>,

    /// Location geometry with raw upstream coordinates.
    pub geometry: Option<Geometry>,

    /// Elevation in the collection's vertical datum.
    pub elevation: Option<f64>,

    /// Start of the validity window.
    pub begin_date: Option<String>,

    /// End of the validity window; may be the open-ended sentinel.
    pub end_date: Option<String>,

    /// Last upstream update timestamp.
    pub updated_at: Option<String>,

    /// Time series parameters available at this location.
    pub parameters: Vec<ParameterRef>,

    /// Open attribute bag.
    pub attributes: Map<String, Value>,
}

impl LocationRecord {
    /// Create a record with only an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            geometry: None,
            elevation: None,
            begin_date: None,
            end_date: None,
            updated_at: None,
            parameters: Vec::new(),
            attributes: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Set the validity window.
    pub fn with_dates(mut self, begin: Option<&str>, end: Option<&str>) -> Self {
        self.begin_date = begin.map(str::to_string);
        self.end_date = end.map(str::to_string);
        self
    }

    pub fn with_updated_at(mut self, updated_at: impl Into<String>) -> Self {
        self.updated_at = Some(updated_at.into());
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterRef) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// The point used for containment tests: the point itself, or the
    /// centroid of a line or polygon.
    pub fn representative_point(&self) -> Option<geo::Point<f64>> {
        let geometry = self.geometry.as_ref()?;
        match geometry.as_point() {
            Some((x, y)) => Some(geo::Point::new(x, y)),
            None => geometry.to_geo().centroid(),
        }
    }

    /// Whether the end date is the open-ended sentinel.
    pub fn is_open_ended(&self, sentinel: &str) -> bool {
        self.end_date
            .as_deref()
            .is_some_and(|end| end.starts_with(sentinel))
    }

    /// Properties as rendered to clients: attributes without raw
    /// coordinate fields, plus `name` and `elevation` when present.
    pub fn rendered_properties(&self) -> Map<String, Value> {
        let mut properties: Map<String, Value> = self
            .attributes
            .iter()
            .filter(|(k, _)| !COORDINATE_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(name) = &self.name {
            properties.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(elevation) = self.elevation {
            properties.insert("elevation".to_string(), Value::from(elevation));
        }
        properties
    }

    /// A single rendered property. `id` resolves to the record identifier.
    pub fn property(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(Value::String(self.id.clone())),
            "name" => self.name.clone().map(Value::String),
            "elevation" => self.elevation.map(Value::from),
            k if COORDINATE_FIELDS.contains(&k) => None,
            k => self.attributes.get(k).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn granby() -> LocationRecord {
        LocationRecord::new("281")
            .with_name("Lake Granby")
            .with_geometry(Geometry::point(-105.86, 40.15))
            .with_elevation(8280.0)
            .with_attribute("locationTypeName", json!("Lake/Reservoir"))
            .with_attribute("locationCoordinates", json!({"type": "Point"}))
    }

    #[test]
    fn test_rendered_properties_drop_coordinates() {
        let props = granby().rendered_properties();
        assert_eq!(props["name"], "Lake Granby");
        assert_eq!(props["elevation"], 8280.0);
        assert_eq!(props["locationTypeName"], "Lake/Reservoir");
        assert!(!props.contains_key("locationCoordinates"));
    }

    #[test]
    fn test_property_lookup() {
        let record = granby();
        assert_eq!(record.property("id"), Some(json!("281")));
        assert_eq!(record.property("elevation"), Some(json!(8280.0)));
        assert_eq!(record.property("locationCoordinates"), None);
        assert_eq!(record.property("missing"), None);
    }

    #[test]
    fn test_representative_point() {
        assert_eq!(
            granby().representative_point(),
            Some(geo::Point::new(-105.86, 40.15))
        );

        let square = LocationRecord::new("1").with_geometry(Geometry::polygon(vec![vec![
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 2.0],
            [0.0, 2.0],
            [0.0, 0.0],
        ]]));
        let centroid = square.representative_point().unwrap();
        assert!((centroid.x() - 1.0).abs() < 1e-9);
        assert!((centroid.y() - 1.0).abs() < 1e-9);

        assert!(LocationRecord::new("2").representative_point().is_none());
    }

    #[test]
    fn test_open_ended() {
        let record = LocationRecord::new("1").with_dates(Some("2020-01-01"), Some("2100-01-01 00:00:00"));
        assert!(record.is_open_ended(DEFAULT_SENTINEL));

        let closed = LocationRecord::new("2").with_dates(Some("2020-01-01"), Some("2024-01-01"));
        assert!(!closed.is_open_ended(DEFAULT_SENTINEL));
    }
}
