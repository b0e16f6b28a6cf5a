//! CoverageJSON rendering of location time series.
//!
//! One coverage is produced per location that has at least one parameter
//! with a non-null value. A location's parameters share one time axis:
//! the sorted union of their timestamps, with gaps filled by nulls.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, instrument, warn};

use edr_protocol::queries::format_timestamp;
use edr_protocol::{
    parse_timestamp, CovJsonParameter, CoverageCollection, CoverageJson, DateTimeQuery,
    ParameterMetadata,
};
use remote_cache::{Executor, RemoteCache};

use crate::collection::LocationCollection;
use crate::error::EngineResult;
use crate::record::{LocationRecord, ParameterRef};
use crate::source::{TimeSeriesParameter, UpstreamSource};

/// Builds CoverageJSON collections from a filtered location collection.
pub struct CoverageBuilder<'a> {
    source: &'a dyn UpstreamSource,
    cache: &'a RemoteCache,
    force_fetch: bool,
}

impl<'a> CoverageBuilder<'a> {
    pub fn new(source: &'a dyn UpstreamSource, cache: &'a RemoteCache) -> Self {
        Self {
            source,
            cache,
            force_fetch: false,
        }
    }

    /// Bypass cached results.
    pub fn with_force_fetch(mut self, force: bool) -> Self {
        self.force_fetch = force;
        self
    }

    /// Fetch results for every (location, parameter) pair and render them.
    ///
    /// `parameters` restricts the rendered parameters to the given ids.
    #[instrument(skip(self, collection, parameters), fields(source = self.source.name(), locations = collection.len()))]
    pub async fn render(
        &self,
        collection: &LocationCollection,
        datetime: Option<&DateTimeQuery>,
        parameters: Option<&[String]>,
    ) -> EngineResult<CoverageCollection> {
        // (record index, parameter, url) for every requested series.
        let requests: Vec<(usize, &ParameterRef, String)> = collection
            .records()
            .iter()
            .enumerate()
            .flat_map(|(i, record)| {
                record
                    .parameters
                    .iter()
                    .filter(move |p| is_selected(parameters, p))
                    .map(move |p| (i, p, self.source.result_query_url(record, p, datetime)))
            })
            .collect();

        let urls: Vec<String> = requests.iter().map(|(_, _, url)| url.clone()).collect();
        let results = self.cache.get_or_fetch_group(&urls, self.force_fetch).await?;

        let mut series_by_record: BTreeMap<usize, Vec<TimeSeriesParameter>> = BTreeMap::new();
        for (i, parameter, url) in &requests {
            let Some(payload) = results.get(url) else {
                continue;
            };
            let series = self
                .source
                .parse_result_series(&parameter.parameter_id, payload)?;
            if !series.has_values() {
                debug!(url = %url, "Skipping series without values");
                continue;
            }
            let record_series = series_by_record.entry(*i).or_default();
            if !push_unique(record_series, series) {
                warn!(
                    id = %collection.records()[*i].id,
                    parameter = %parameter.parameter_id,
                    "Location lists a parameter twice, keeping the first series"
                );
            }
        }

        let records = collection.records();
        let mut coverages = Vec::new();
        let mut relevant = BTreeSet::new();

        for (i, series) in series_by_record {
            let record = &records[i];
            match Self::build_coverage(record, &series) {
                Some(coverage) => {
                    relevant.extend(series.iter().map(|s| s.parameter_id.clone()));
                    coverages.push(coverage);
                }
                None => warn!(id = %record.id, "Location has no geometry, skipping coverage"),
            }
        }

        let metadata = if relevant.is_empty() {
            HashMap::new()
        } else {
            self.source
                .resolve_field_metadata(self.cache, &relevant)
                .await?
        };

        let mut output = CoverageCollection::new();
        for coverage in coverages {
            output = output.with_coverage(coverage);
        }
        for id in relevant {
            let param = match metadata.get(&id) {
                Some(meta) => CovJsonParameter::from_metadata(meta),
                None => CovJsonParameter::from_metadata(&ParameterMetadata::new(id.clone())),
            };
            output = output.with_parameter(id, param);
        }
        output.infer_domain_type();

        debug!(coverages = output.len(), parameters = output.parameters.len(), "Rendered coverages");
        Ok(output)
    }

    /// Render from synchronous code by blocking on the executor.
    pub fn render_blocking(
        &self,
        executor: &Executor,
        collection: &LocationCollection,
        datetime: Option<&DateTimeQuery>,
        parameters: Option<&[String]>,
    ) -> EngineResult<CoverageCollection> {
        executor.block_on(self.render(collection, datetime, parameters))
    }

    fn build_coverage(
        record: &LocationRecord,
        series: &[TimeSeriesParameter],
    ) -> Option<CoverageJson> {
        let (timestamps, ranges) = align_series(series);
        let geometry = record.geometry.as_ref()?;

        let coverage = match geometry.as_point() {
            Some((x, y)) => CoverageJson::point_series(x, y, record.elevation, timestamps),
            None => {
                let rings = geometry.area_rings();
                if rings.is_empty() {
                    return None;
                }
                CoverageJson::polygon_series(rings, timestamps)
            }
        };

        Some(
            ranges
                .into_iter()
                .fold(coverage.with_id(record.id.clone()), |cov, (id, values)| {
                    cov.with_time_series(id, values)
                }),
        )
    }
}

fn is_selected(parameters: Option<&[String]>, parameter: &ParameterRef) -> bool {
    parameters.map_or(true, |ids| ids.iter().any(|id| *id == parameter.parameter_id))
}

fn normalize_timestamp(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|ts| format_timestamp(&ts))
        .unwrap_or_else(|| raw.to_string())
}

/// Add a series unless one for the same parameter is already present.
fn push_unique(series: &mut Vec<TimeSeriesParameter>, next: TimeSeriesParameter) -> bool {
    if series.iter().any(|s| s.parameter_id == next.parameter_id) {
        return false;
    }
    series.push(next);
    true
}

/// Index a series by normalized timestamp. The first value at a
/// timestamp wins.
fn index_series(series: &TimeSeriesParameter) -> BTreeMap<String, Option<f64>> {
    let mut indexed = BTreeMap::new();
    let mut duplicates = 0usize;
    for (t, v) in &series.values {
        match indexed.entry(normalize_timestamp(t)) {
            Entry::Vacant(slot) => {
                slot.insert(*v);
            }
            Entry::Occupied(_) => duplicates += 1,
        }
    }
    if duplicates > 0 {
        warn!(
            parameter = %series.parameter_id,
            duplicates,
            "Series repeats timestamps, keeping the first value of each"
        );
    }
    indexed
}

/// Align series on the sorted union of their timestamps.
///
/// Returns the shared time axis and one value vector per series, padded
/// with `None` where a series has no value at a timestamp.
pub fn align_series(series: &[TimeSeriesParameter]) -> (Vec<String>, Vec<(String, Vec<Option<f64>>)>) {
    let indexed: Vec<BTreeMap<String, Option<f64>>> = series.iter().map(index_series).collect();

    let axis: BTreeSet<&String> = indexed.iter().flat_map(|m| m.keys()).collect();
    let axis: Vec<String> = axis.into_iter().cloned().collect();

    let ranges = series
        .iter()
        .zip(&indexed)
        .map(|(s, values)| {
            let aligned = axis
                .iter()
                .map(|t| values.get(t).copied().flatten())
                .collect();
            (s.parameter_id.clone(), aligned)
        })
        .collect();

    (axis, ranges)
}
