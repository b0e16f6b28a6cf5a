//! Adapter for the Bureau of Reclamation RISE API.
//!
//! RISE serves JSON:API documents. Locations come from the `location`
//! endpoint with their catalog items included; each catalog item links a
//! location to one parameter and is the id used to query results.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument, warn};

use edr_protocol::{DateTimeQuery, Geometry, ParameterMetadata};
use remote_cache::pagination::total_items;
use remote_cache::RemoteCache;

use crate::error::{EngineError, EngineResult};
use crate::record::{LocationRecord, ParameterRef, DEFAULT_SENTINEL};
use crate::schema::{FieldSchema, FieldType};
use crate::source::{TimeSeriesParameter, UpstreamSource};

/// Public RISE endpoint.
pub const RISE_BASE_URL: &str = "https://data.usbr.gov/rise/api";

/// Attributes promoted to record fields rather than kept in the bag.
const PROMOTED_ATTRIBUTES: [&str; 4] = ["_id", "locationName", "elevation", "locationCoordinates"];

/// RISE reservoir and streamflow locations.
#[derive(Debug, Clone)]
pub struct RiseSource {
    base_url: String,
    sentinel: String,
    result_page_size: usize,
}

impl RiseSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            result_page_size: 10_000,
        }
    }

    /// Override the open-ended end date.
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Number of results requested per result query.
    pub fn with_result_page_size(mut self, size: usize) -> Self {
        self.result_page_size = size.max(1);
        self
    }

    pub fn locations_url(&self) -> String {
        format!("{}/location?include=catalogRecords.catalogItems", self.base_url)
    }

    pub fn parameters_url(&self) -> String {
        format!("{}/parameter", self.base_url)
    }

    /// Build records from a merged `location` document.
    pub fn parse_locations(&self, merged: &Value) -> EngineResult<Vec<LocationRecord>> {
        let parameters_by_item = catalog_item_parameters(merged);

        merged
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| EngineError::InvalidRecord("Location document has no data array".to_string()))?
            .iter()
            .map(|item| self.parse_location(item, &parameters_by_item))
            .collect()
    }

    fn parse_location(
        &self,
        item: &Value,
        parameters_by_item: &HashMap<String, ParameterRef>,
    ) -> EngineResult<LocationRecord> {
        let attributes = item
            .get("attributes")
            .and_then(Value::as_object)
            .ok_or_else(|| EngineError::InvalidRecord("Location has no attributes".to_string()))?;

        let id = attributes
            .get("_id")
            .and_then(id_string)
            .ok_or_else(|| EngineError::InvalidRecord("Location has no _id".to_string()))?;

        let mut record = LocationRecord::new(id);
        record.name = attributes
            .get("locationName")
            .and_then(Value::as_str)
            .map(str::to_string);
        record.elevation = attributes.get("elevation").and_then(number);
        record.begin_date = attributes
            .get("createDate")
            .and_then(Value::as_str)
            .map(str::to_string);
        // RISE has no decommission date; every location is open-ended.
        record.end_date = Some(self.sentinel.clone());
        record.updated_at = attributes
            .get("updateDate")
            .and_then(Value::as_str)
            .map(str::to_string);

        record.geometry = match attributes.get("locationCoordinates") {
            Some(Value::Null) | None => None,
            Some(coords) => match serde_json::from_value::<Geometry>(coords.clone()) {
                Ok(geometry) => Some(geometry),
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Unreadable location coordinates");
                    None
                }
            },
        };

        record.parameters = item
            .pointer("/relationships/catalogItems/data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|link| link.get("id").and_then(Value::as_str))
            .filter_map(|item_id| parameters_by_item.get(item_id).cloned())
            .collect();

        record.attributes = attributes
            .iter()
            .filter(|(k, _)| !PROMOTED_ATTRIBUTES.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<String, Value>>();

        Ok(record)
    }
}

impl Default for RiseSource {
    fn default() -> Self {
        Self::new(RISE_BASE_URL)
    }
}

/// Map included catalog item ids to the parameter they carry.
fn catalog_item_parameters(merged: &Value) -> HashMap<String, ParameterRef> {
    merged
        .get("included")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|included| {
            let resource_id = included.get("id")?.as_str()?;
            let attributes = included.get("attributes")?;
            let parameter_id = attributes.get("parameterId").and_then(id_string)?;
            let series_id = attributes
                .get("_id")
                .and_then(id_string)
                .or_else(|| resource_id.rsplit('/').next().map(str::to_string))?;
            Some((
                resource_id.to_string(),
                ParameterRef::new(parameter_id, series_id),
            ))
        })
        .collect()
}

/// Render an integer or string id as a string.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Read a number that may be served as a string.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl UpstreamSource for RiseSource {
    fn name(&self) -> &str {
        "rise"
    }

    fn field_schema(&self) -> FieldSchema {
        FieldSchema::new()
            .with_field("id", FieldType::String)
            .with_field("name", FieldType::String)
            .with_field("elevation", FieldType::Number)
            .with_field("locationTypeName", FieldType::String)
            .with_field("timezone", FieldType::String)
            .with_field("createDate", FieldType::String)
            .with_field("updateDate", FieldType::String)
    }

    fn sentinel(&self) -> &str {
        &self.sentinel
    }

    fn matches_update_date(&self) -> bool {
        true
    }

    #[instrument(skip(self, cache))]
    async fn fetch_raw_records(
        &self,
        cache: &RemoteCache,
        force_fetch: bool,
    ) -> EngineResult<Vec<LocationRecord>> {
        let pages = cache
            .get_or_fetch_all_pages(&self.locations_url(), force_fetch)
            .await?;
        let merged = RemoteCache::merge_pages(&pages);
        let records = self.parse_locations(&merged)?;

        debug!(pages = pages.len(), records = records.len(), "Parsed RISE locations");
        Ok(records)
    }

    fn result_query_url(
        &self,
        _location: &LocationRecord,
        parameter: &ParameterRef,
        datetime: Option<&DateTimeQuery>,
    ) -> String {
        let mut url = format!(
            "{}/result?itemId={}&itemsPerPage={}",
            self.base_url, parameter.series_id, self.result_page_size
        );

        if let Some(query) = datetime {
            let (after, before) = query.upstream_bounds();
            if let Some(after) = after {
                url.push_str(&format!("&dateTime[after]={}", after));
            }
            if let Some(before) = before {
                url.push_str(&format!("&dateTime[before]={}", before));
            }
        }
        url
    }

    fn parse_result_series(
        &self,
        parameter_id: &str,
        payload: &Value,
    ) -> EngineResult<TimeSeriesParameter> {
        let data = payload.get("data").and_then(Value::as_array).ok_or_else(|| {
            EngineError::InvalidRecord(format!(
                "Result document for parameter {} has no data array",
                parameter_id
            ))
        })?;

        if let Some(total) = truncated_total(payload, data.len()) {
            warn!(
                parameter = parameter_id,
                returned = data.len(),
                total,
                page_size = self.result_page_size,
                "Result series is longer than one page and was truncated"
            );
        }

        let values = data
            .iter()
            .filter_map(|item| {
                let attributes = item.get("attributes")?;
                let timestamp = attributes.get("dateTime")?.as_str()?.to_string();
                let value = attributes.get("result").and_then(number);
                Some((timestamp, value))
            })
            .collect();

        Ok(TimeSeriesParameter::new(parameter_id, values))
    }

    #[instrument(skip(self, cache, parameter_ids), fields(count = parameter_ids.len()))]
    async fn resolve_field_metadata(
        &self,
        cache: &RemoteCache,
        parameter_ids: &BTreeSet<String>,
    ) -> EngineResult<HashMap<String, ParameterMetadata>> {
        let pages = cache
            .get_or_fetch_all_pages(&self.parameters_url(), false)
            .await?;
        let merged = RemoteCache::merge_pages(&pages);

        let metadata = merged
            .get("data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let attributes = item.get("attributes")?;
                let id = attributes.get("_id").and_then(id_string).or_else(|| {
                    item.get("id")?
                        .as_str()?
                        .rsplit('/')
                        .next()
                        .map(str::to_string)
                })?;
                if !parameter_ids.contains(&id) {
                    return None;
                }

                let text = |key: &str| attributes.get(key).and_then(Value::as_str);
                let mut meta = ParameterMetadata::new(id.clone());
                if let Some(name) = text("parameterName") {
                    meta = meta.with_title(name);
                }
                if let Some(unit) = text("parameterUnit") {
                    meta = meta.with_unit(unit);
                }
                if let Some(description) = text("parameterDescription") {
                    meta = meta.with_description(description);
                }
                Some((id, meta))
            })
            .collect();

        Ok(metadata)
    }
}

/// Upstream total when a result page holds fewer items than it reports.
fn truncated_total(payload: &Value, returned: usize) -> Option<u64> {
    total_items(payload).filter(|total| *total > returned as u64)
}
