//! Filter pipeline over a set of location records.
//!
//! Every operation rebuilds the record list in a single pass, keeping the
//! survivors in their original order. Filters commute with each other;
//! sorting and paging should come last.

use chrono::{DateTime, Utc};
use geo::Contains;
use tracing::{debug, instrument};

use edr_protocol::queries::{parse_count, parse_select_properties, sort_by_keys};
use edr_protocol::{
    parse_timestamp, parse_wkt, BboxQuery, DateTimeQuery, QueryParameterError, SortKey, ZFilter,
};
use remote_cache::RemoteCache;

use crate::error::{EngineError, EngineResult};
use crate::record::{LocationRecord, DEFAULT_SENTINEL};
use crate::schema::{values_match, FieldSchema};
use crate::source::UpstreamSource;

/// Query parameters that are not property filters.
const RESERVED_PARAMS: [&str; 12] = [
    "bbox",
    "wkt",
    "coords",
    "z",
    "datetime",
    "sortby",
    "offset",
    "limit",
    "select_properties",
    "skip_geometry",
    "parameter-name",
    "f",
];

/// An ordered set of location records, unique by id.
#[derive(Debug, Clone)]
pub struct LocationCollection {
    records: Vec<LocationRecord>,
    sentinel: String,
    match_update_date: bool,
}

impl LocationCollection {
    /// Build a collection, rejecting duplicate ids.
    pub fn from_records(records: Vec<LocationRecord>) -> EngineResult<Self> {
        let mut seen = std::collections::HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(EngineError::DataIntegrity(format!(
                    "Duplicate location id {}",
                    record.id
                )));
            }
        }

        Ok(Self {
            records,
            sentinel: DEFAULT_SENTINEL.to_string(),
            match_update_date: false,
        })
    }

    /// Fetch every record from a source.
    #[instrument(skip(source, cache), fields(source = source.name()))]
    pub async fn fetch(
        source: &dyn UpstreamSource,
        cache: &RemoteCache,
        force_fetch: bool,
    ) -> EngineResult<Self> {
        let records = source.fetch_raw_records(cache, force_fetch).await?;
        debug!(count = records.len(), "Fetched location records");

        Ok(Self::from_records(records)?
            .with_sentinel(source.sentinel())
            .with_update_date_matching(source.matches_update_date()))
    }

    /// Validate a query, then fetch and narrow the collection.
    ///
    /// A malformed query fails before the source is contacted.
    pub async fn fetch_matching(
        source: &dyn UpstreamSource,
        cache: &RemoteCache,
        query: &CollectionQuery,
        force_fetch: bool,
    ) -> EngineResult<Self> {
        let schema = source.field_schema();
        query.validate(&schema)?;

        let mut collection = Self::fetch(source, cache, force_fetch).await?;
        collection.apply(query, &schema)?;
        Ok(collection)
    }

    /// Set the open-ended end date prefix.
    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }

    /// Let instant queries match on the record's update date.
    pub fn with_update_date_matching(mut self, enabled: bool) -> Self {
        self.match_update_date = enabled;
        self
    }

    pub fn records(&self) -> &[LocationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record ids in order.
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Keep only the record with this id.
    pub fn drop_all_but_id(&mut self, id: &str) -> &mut Self {
        self.records.retain(|r| r.id == id);
        self
    }

    /// Drop the first `offset` records.
    pub fn drop_before_offset(&mut self, offset: usize) -> &mut Self {
        let offset = offset.min(self.records.len());
        self.records.drain(..offset);
        self
    }

    /// Keep at most `limit` records.
    pub fn drop_after_limit(&mut self, limit: usize) -> &mut Self {
        self.records.truncate(limit);
        self
    }

    /// Parse a `datetime` expression and keep records valid for it.
    pub fn select_date_range(&mut self, expr: &str) -> EngineResult<&mut Self> {
        let query = DateTimeQuery::parse(expr)?;
        Ok(self.select_datetime(&query))
    }

    /// Keep records whose validity window covers the query.
    ///
    /// An interval must lie inside `[begin, end]`; an instant must fall
    /// inside it. An open-ended record end skips the upper check. When
    /// update-date matching is on, an instant also matches records
    /// updated on the same day.
    pub fn select_datetime(&mut self, query: &DateTimeQuery) -> &mut Self {
        let sentinel = self.sentinel.clone();
        let match_update_date = self.match_update_date;

        self.records.retain(|record| {
            let begin = record.begin_date.as_deref().and_then(parse_timestamp);
            let open_ended = record.is_open_ended(&sentinel);
            let end = if open_ended {
                None
            } else {
                record.end_date.as_deref().and_then(parse_timestamp)
            };
            let has_bounds = begin.is_some() && (open_ended || end.is_some());

            match query {
                DateTimeQuery::Instant(t) => {
                    let within = has_bounds && within_window(begin, end, t, t);
                    within || (match_update_date && updated_on(record, t))
                }
                DateTimeQuery::Interval { start, end: query_end } => {
                    if !has_bounds {
                        return false;
                    }
                    let lower_ok = match (start, begin) {
                        (Some(start), Some(begin)) => begin <= *start,
                        _ => true,
                    };
                    let upper_ok = match (query_end, end) {
                        (Some(query_end), Some(end)) => *query_end <= end,
                        _ => true,
                    };
                    lower_ok && upper_ok
                }
            }
        });
        self
    }

    /// Keep records inside `geometry` whose elevation satisfies `z`.
    ///
    /// With either filter active, records without an elevation are dropped.
    pub fn filter_by_geometry_and_elevation(
        &mut self,
        geometry: Option<&geo::Geometry<f64>>,
        z: Option<&ZFilter>,
    ) -> &mut Self {
        if geometry.is_none() && z.is_none() {
            return self;
        }

        self.records.retain(|record| {
            let Some(elevation) = record.elevation else {
                return false;
            };
            if let Some(z) = z {
                if !z.matches(elevation) {
                    return false;
                }
            }
            match geometry {
                Some(geometry) => record
                    .representative_point()
                    .is_some_and(|point| geometry.contains(&point)),
                None => true,
            }
        });
        self
    }

    /// Keep records whose rendered properties match every pair.
    ///
    /// Values are coerced to their declared type first, so an unknown or
    /// mistyped property fails before any record is dropped.
    pub fn filter_by_properties(
        &mut self,
        pairs: &[(String, String)],
        schema: &FieldSchema,
    ) -> EngineResult<&mut Self> {
        let expected = pairs
            .iter()
            .map(|(name, raw)| Ok((name.as_str(), schema.coerce(name, raw)?)))
            .collect::<EngineResult<Vec<_>>>()?;

        if expected.is_empty() {
            return Ok(self);
        }

        self.records.retain(|record| {
            expected.iter().all(|(name, want)| {
                record
                    .property(name)
                    .is_some_and(|actual| values_match(&actual, want))
            })
        });
        Ok(self)
    }

    /// Stable multi-key sort; the first key dominates.
    pub fn sort_by(&mut self, keys: &[SortKey]) -> &mut Self {
        sort_by_keys(&mut self.records, keys, |record, key| record.property(key));
        self
    }

    /// Apply a query in canonical order: id, datetime, geometry and
    /// elevation, properties, sort, offset, limit.
    ///
    /// An id lookup that leaves nothing is reported as `NoData`.
    #[instrument(skip(self, query, schema), fields(before = self.records.len()))]
    pub fn apply(&mut self, query: &CollectionQuery, schema: &FieldSchema) -> EngineResult<&mut Self> {
        query.validate(schema)?;

        if let Some(id) = &query.id {
            self.drop_all_but_id(id);
        }
        if let Some(datetime) = &query.datetime {
            self.select_datetime(datetime);
        }
        self.filter_by_geometry_and_elevation(query.geometry.as_ref(), query.z.as_ref());
        self.filter_by_properties(&query.properties, schema)?;
        if !query.sort_by.is_empty() {
            self.sort_by(&query.sort_by);
        }
        if let Some(offset) = query.offset {
            self.drop_before_offset(offset);
        }
        if let Some(limit) = query.limit {
            self.drop_after_limit(limit);
        }

        debug!(after = self.records.len(), "Applied collection query");

        if let Some(id) = &query.id {
            if self.records.is_empty() {
                return Err(EngineError::NoData(format!("No location with id {}", id)));
            }
        }
        Ok(self)
    }
}

fn within_window(
    begin: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    from: &DateTime<Utc>,
    to: &DateTime<Utc>,
) -> bool {
    let lower_ok = begin.is_some_and(|begin| begin <= *from);
    let upper_ok = end.map_or(true, |end| *to <= end);
    lower_ok && upper_ok
}

fn updated_on(record: &LocationRecord, t: &DateTime<Utc>) -> bool {
    let day = t.format("%Y-%m-%d").to_string();
    record
        .updated_at
        .as_deref()
        .is_some_and(|updated| updated.starts_with(&day))
}

/// Parsed collection filters, validated before any upstream request.
#[derive(Debug, Clone, Default)]
pub struct CollectionQuery {
    pub id: Option<String>,
    pub datetime: Option<DateTimeQuery>,
    pub geometry: Option<geo::Geometry<f64>>,
    pub z: Option<ZFilter>,
    pub properties: Vec<(String, String)>,
    pub sort_by: Vec<SortKey>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    /// Property allow-list for rendered features.
    pub select_properties: Option<Vec<String>>,
    pub skip_geometry: bool,
}

impl CollectionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse raw query parameters.
    ///
    /// `bbox` and `wkt` are mutually exclusive. A 6-value bbox supplies a
    /// z range unless `z` is given explicitly. Keys that are not query
    /// parameters become property filters.
    pub fn from_params<'a>(
        params: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, QueryParameterError> {
        let mut query = Self::new();
        let mut bbox: Option<BboxQuery> = None;
        let mut wkt = None;

        for (key, value) in params {
            match key {
                "bbox" => bbox = Some(BboxQuery::parse(value)?),
                "wkt" | "coords" => wkt = Some(parse_wkt(value)?),
                "z" => query.z = Some(ZFilter::parse(value)?),
                "datetime" => query.datetime = Some(DateTimeQuery::parse(value)?),
                "sortby" => query.sort_by = SortKey::parse_list(value)?,
                "offset" => query.offset = Some(parse_count("offset", value)?),
                "limit" => query.limit = Some(parse_count("limit", value)?),
                "select_properties" => {
                    query.select_properties = Some(parse_select_properties(value))
                }
                "skip_geometry" => query.skip_geometry = parse_flag("skip_geometry", value)?,
                k if RESERVED_PARAMS.contains(&k) => {}
                k => query.properties.push((k.to_string(), value.to_string())),
            }
        }

        match (bbox, wkt) {
            (Some(_), Some(_)) => {
                return Err(QueryParameterError::invalid(
                    "wkt",
                    "bbox and wkt cannot be combined",
                ))
            }
            (Some(bbox), None) => {
                if query.z.is_none() {
                    query.z = bbox.z_filter();
                }
                query.geometry = Some(bbox.to_geometry());
            }
            (None, geometry) => query.geometry = geometry,
        }

        Ok(query)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Check property filters and sort keys against a schema.
    pub fn validate(&self, schema: &FieldSchema) -> EngineResult<()> {
        for (name, raw) in &self.properties {
            schema.coerce(name, raw)?;
        }
        validate_sort_keys(&self.sort_by, schema)
    }
}

/// Reject sort keys naming a property records cannot be sorted on.
pub fn validate_sort_keys(keys: &[SortKey], schema: &FieldSchema) -> EngineResult<()> {
    match keys.iter().find(|key| !schema.is_sortable(&key.property)) {
        Some(key) => Err(EngineError::UnknownProperty(key.property.clone())),
        None => Ok(()),
    }
}

fn parse_flag(param: &str, value: &str) -> Result<bool, QueryParameterError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(QueryParameterError::invalid(
            param,
            format!("'{}' is not a boolean", other),
        )),
    }
}
