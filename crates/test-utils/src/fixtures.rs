//! Common test fixtures for water-edr tests.
//!
//! Payload builders produce JSON in the shape the RISE reservoir API
//! returns: JSON:API `data`/`included` arrays with a `meta.totalItems`
//! envelope on paged endpoints.

use serde_json::{json, Value};

/// Common bounding boxes, formatted as `bbox` query values.
pub mod bbox {
    /// Colorado and the Four Corners.
    pub const FOUR_CORNERS: &str = "-112.0,36.0,-104.0,41.0";

    /// Northern Colorado only (Lake Granby).
    pub const NORTHERN_COLORADO: &str = "-106.5,39.5,-105.0,41.0";

    /// Open ocean, matches nothing.
    pub const PACIFIC: &str = "-150.0,10.0,-140.0,20.0";
}

/// Time constants.
pub mod time {
    /// Default open-ended end date.
    pub const SENTINEL: &str = "2100-01-01";

    /// A date every sample location was already active on.
    pub const ACTIVE_DATE: &str = "2023-06-01T00:00:00Z";
}

/// A location as served by the RISE `location` endpoint.
#[derive(Debug, Clone)]
pub struct RiseLocation {
    pub id: i64,
    pub name: String,
    pub geometry: Value,
    pub elevation: Option<f64>,
    pub location_type: String,
    pub create_date: Option<String>,
    pub update_date: Option<String>,
    /// `(catalog item id, parameter id)` pairs.
    pub catalog_items: Vec<(i64, String)>,
}

impl RiseLocation {
    /// A point location.
    pub fn point(id: i64, name: &str, lon: f64, lat: f64) -> Self {
        Self::with_geometry(id, name, json!({"type": "Point", "coordinates": [lon, lat]}))
    }

    /// A polygon location with a single exterior ring.
    pub fn polygon(id: i64, name: &str, ring: Vec<[f64; 2]>) -> Self {
        Self::with_geometry(id, name, json!({"type": "Polygon", "coordinates": [ring]}))
    }

    fn with_geometry(id: i64, name: &str, geometry: Value) -> Self {
        Self {
            id,
            name: name.to_string(),
            geometry,
            elevation: None,
            location_type: "Lake/Reservoir".to_string(),
            create_date: Some("2019-06-10 10:00:00".to_string()),
            update_date: Some("2024-03-01 08:15:00".to_string()),
            catalog_items: Vec::new(),
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_type(mut self, location_type: &str) -> Self {
        self.location_type = location_type.to_string();
        self
    }

    pub fn with_dates(mut self, create: Option<&str>, update: Option<&str>) -> Self {
        self.create_date = create.map(str::to_string);
        self.update_date = update.map(str::to_string);
        self
    }

    /// Attach a time series parameter through a catalog item.
    pub fn with_item(mut self, item_id: i64, parameter_id: &str) -> Self {
        self.catalog_items.push((item_id, parameter_id.to_string()));
        self
    }

    /// JSON:API resource object for the `data` array.
    pub fn to_data(&self) -> Value {
        let items: Vec<Value> = self
            .catalog_items
            .iter()
            .map(|(item_id, _)| json!({"type": "CatalogItem", "id": catalog_item_ref(*item_id)}))
            .collect();

        json!({
            "id": format!("/rise/api/location/{}", self.id),
            "type": "Location",
            "attributes": {
                "_id": self.id,
                "locationName": self.name,
                "locationCoordinates": self.geometry,
                // RISE serves elevations as strings.
                "elevation": self.elevation.map(|e| e.to_string()),
                "locationTypeName": self.location_type,
                "createDate": self.create_date,
                "updateDate": self.update_date,
                "timezone": "MST",
            },
            "relationships": {
                "catalogItems": {"data": items}
            }
        })
    }

    /// Catalog item resources for the `included` array.
    pub fn included(&self) -> Vec<Value> {
        self.catalog_items
            .iter()
            .map(|(item_id, parameter_id)| {
                json!({
                    "id": catalog_item_ref(*item_id),
                    "type": "CatalogItem",
                    "attributes": {
                        "_id": item_id,
                        "parameterId": parameter_id,
                        "itemTitle": format!("Item {}", item_id),
                    }
                })
            })
            .collect()
    }
}

fn catalog_item_ref(item_id: i64) -> String {
    format!("/rise/api/catalog-item/{}", item_id)
}

/// Five locations covering points, a polygon, a record without
/// elevation and several shared parameters.
pub fn sample_rise_locations() -> Vec<RiseLocation> {
    vec![
        RiseLocation::point(281, "Lake Granby", -105.86, 40.15)
            .with_elevation(8280.0)
            .with_item(4222, "3")
            .with_item(4223, "17"),
        RiseLocation::point(268, "Blue Mesa Reservoir", -107.33, 38.45)
            .with_elevation(7519.0)
            .with_item(4100, "3")
            .with_dates(Some("2020-01-15 00:00:00"), Some("2024-02-11 12:00:00")),
        RiseLocation::point(3514, "Navajo Reservoir", -107.6, 36.8)
            .with_elevation(6085.0)
            .with_item(4300, "3"),
        RiseLocation::point(6124, "Colorado River at Lees Ferry", -111.59, 36.86)
            .with_type("River/Stream")
            .with_item(4500, "1830"),
        RiseLocation::polygon(
            7000,
            "Lake Powell Area",
            vec![
                [-111.5, 36.9],
                [-110.5, 36.9],
                [-110.5, 37.9],
                [-111.5, 37.9],
                [-111.5, 36.9],
            ],
        )
        .with_elevation(3700.0)
        .with_item(4600, "3"),
    ]
}

/// One page of the `location` endpoint.
///
/// `total` sets `meta.totalItems`; `None` omits the paging envelope.
pub fn rise_location_page(locations: &[RiseLocation], total: Option<usize>) -> Value {
    let data: Vec<Value> = locations.iter().map(RiseLocation::to_data).collect();
    let included: Vec<Value> = locations.iter().flat_map(RiseLocation::included).collect();

    let mut page = json!({"data": data, "included": included});
    if let Some(total) = total {
        page["meta"] = json!({"totalItems": total});
    }
    page
}

/// A `result` endpoint payload from `(dateTime, result)` pairs.
pub fn rise_result_page(points: &[(&str, Option<f64>)]) -> Value {
    let data: Vec<Value> = points
        .iter()
        .map(|(date_time, result)| {
            json!({
                "type": "Result",
                "attributes": {"dateTime": date_time, "result": result}
            })
        })
        .collect();
    json!({"data": data, "meta": {"totalItems": data.len()}})
}

/// A `parameter` endpoint resource.
pub fn rise_parameter(id: &str, name: &str, unit: &str, description: &str) -> Value {
    json!({
        "id": format!("/rise/api/parameter/{}", id),
        "type": "Parameter",
        "attributes": {
            "_id": id.parse::<i64>().unwrap_or_default(),
            "parameterName": name,
            "parameterUnit": unit,
            "parameterDescription": description,
        }
    })
}

/// Parameter catalog covering every parameter used by the sample locations.
pub fn sample_rise_parameters() -> Vec<Value> {
    vec![
        rise_parameter("3", "Lake/Reservoir Storage", "af", "Storage volume"),
        rise_parameter("17", "Lake/Reservoir Elevation", "ft", "Water surface elevation"),
        rise_parameter("1830", "Stream Discharge", "cfs", "Mean daily flow"),
        rise_parameter("99", "Unused Parameter", "in", "Not attached to any location"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_page_shape() {
        let locations = sample_rise_locations();
        let page = rise_location_page(&locations, Some(5));

        assert_eq!(page["data"].as_array().unwrap().len(), 5);
        assert_eq!(page["meta"]["totalItems"], 5);
        // Lake Granby carries two catalog items, the rest one each.
        assert_eq!(page["included"].as_array().unwrap().len(), 6);
        assert_eq!(page["data"][0]["attributes"]["elevation"], "8280");
    }

    #[test]
    fn test_location_page_without_envelope() {
        let page = rise_location_page(&sample_rise_locations()[..1], None);
        assert!(page.get("meta").is_none());
    }

    #[test]
    fn test_result_page() {
        let page = rise_result_page(&[("2024-01-01T00:00:00Z", Some(1.0)), ("2024-01-02T00:00:00Z", None)]);
        assert_eq!(page["data"][1]["attributes"]["result"], Value::Null);
    }
}
