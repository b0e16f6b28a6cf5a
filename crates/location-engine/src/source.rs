//! Capability interface implemented once per upstream service.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use edr_protocol::{DateTimeQuery, ParameterMetadata};
use remote_cache::RemoteCache;

use crate::error::EngineResult;
use crate::record::{LocationRecord, ParameterRef, DEFAULT_SENTINEL};
use crate::schema::FieldSchema;

/// One parameter's values at one location, in time order.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesParameter {
    pub parameter_id: String,
    /// `(timestamp, value)` pairs; `None` marks a missing value.
    pub values: Vec<(String, Option<f64>)>,
}

impl TimeSeriesParameter {
    pub fn new(parameter_id: impl Into<String>, values: Vec<(String, Option<f64>)>) -> Self {
        Self {
            parameter_id: parameter_id.into(),
            values,
        }
    }

    /// Whether at least one value is present.
    pub fn has_values(&self) -> bool {
        self.values.iter().any(|(_, v)| v.is_some())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An upstream service the engine can filter and render.
///
/// Adapters supply records, result URLs and payload parsing; everything
/// else (filtering, sorting, paging, rendering) is shared.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Properties that may be filtered and sorted on.
    fn field_schema(&self) -> FieldSchema;

    /// End date prefix marking an open-ended validity window.
    fn sentinel(&self) -> &str {
        DEFAULT_SENTINEL
    }

    /// Whether an instant query also matches on the record's update date.
    fn matches_update_date(&self) -> bool {
        false
    }

    /// Fetch every location record.
    async fn fetch_raw_records(
        &self,
        cache: &RemoteCache,
        force_fetch: bool,
    ) -> EngineResult<Vec<LocationRecord>>;

    /// URL returning one location's results for one parameter.
    fn result_query_url(
        &self,
        location: &LocationRecord,
        parameter: &ParameterRef,
        datetime: Option<&DateTimeQuery>,
    ) -> String;

    /// Parse a result payload into a time series.
    fn parse_result_series(
        &self,
        parameter_id: &str,
        payload: &Value,
    ) -> EngineResult<TimeSeriesParameter>;

    /// Title, unit and description for the given parameter ids.
    ///
    /// Ids missing from the upstream catalog are absent from the result.
    async fn resolve_field_metadata(
        &self,
        cache: &RemoteCache,
        parameter_ids: &BTreeSet<String>,
    ) -> EngineResult<HashMap<String, ParameterMetadata>>;
}
