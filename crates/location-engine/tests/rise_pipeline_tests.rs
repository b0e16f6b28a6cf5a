//! End-to-end tests of the location pipeline against a mock RISE upstream.

use edr_protocol::coverage_json::AxisValue;
use edr_protocol::{Axis, CoverageJson, DateTimeQuery, GeoJsonResponse};
use httptest::matchers::{contains, eq, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{all_of, Expectation};
use location_engine::{
    CollectionQuery, CoverageBuilder, EngineError, FeatureOptions, FeatureProjector,
    LocationCollection, RiseSource, UpstreamSource,
};
use remote_cache::{CacheConfig, Executor, RemoteCache};
use std::collections::HashSet;
use test_utils::fixtures::{
    bbox, rise_location_page, time, rise_result_page, sample_rise_locations, sample_rise_parameters,
    RiseLocation,
};
use test_utils::{assert_coords_approx_eq, MockUpstream};
use tokio::runtime::Handle;

const LOCATIONS: &str = "/rise/api/location";
const PARAMETERS: &str = "/rise/api/parameter";
const RESULTS: &str = "/rise/api/result";

const PAGE_SIZE: usize = 2;

fn rise_upstream() -> MockUpstream {
    let locations = sample_rise_locations();
    let upstream = MockUpstream::new();
    upstream
        .serve_paged(
            LOCATIONS,
            locations.iter().map(RiseLocation::to_data).collect(),
            locations.iter().flat_map(RiseLocation::included).collect(),
            PAGE_SIZE,
        )
        .serve_paged(PARAMETERS, sample_rise_parameters(), Vec::new(), PAGE_SIZE);
    upstream
}

fn serve_results(upstream: &MockUpstream, item_id: &str, points: &[(&str, Option<f64>)]) {
    upstream.server().expect(
        Expectation::matching(all_of![
            request::method_path("GET", RESULTS),
            request::query(url_decoded(contains(("itemId", eq(item_id.to_string()))))),
        ])
        .times(..)
        .respond_with(json_encoded(rise_result_page(points))),
    );
}

fn config() -> CacheConfig {
    CacheConfig {
        default_items_per_page: PAGE_SIZE,
        ..CacheConfig::default()
    }
}

fn setup(upstream: &MockUpstream) -> (RiseSource, RemoteCache) {
    let source = RiseSource::new(upstream.url("/rise/api"));
    let cache = RemoteCache::in_memory(config(), Handle::current()).unwrap();
    (source, cache)
}

fn axis_float(coverage: &CoverageJson, axis: &str) -> f64 {
    match &coverage.domain.axes[axis] {
        Axis::Values { values } => match values[0] {
            AxisValue::Float(v) => v,
            ref other => panic!("Expected float on {}, got {:?}", axis, other),
        },
        other => panic!("Expected value axis, got {:?}", other),
    }
}

async fn fetch_with(query: &[(&str, &str)]) -> LocationCollection {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);
    let query = CollectionQuery::from_params(query.iter().copied()).unwrap();

    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.apply(&query, &source.field_schema()).unwrap();
    collection
}

// ============================================================================
// Fetching
// ============================================================================

#[tokio::test]
async fn test_fetch_merges_every_page() {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);

    let collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();

    assert_eq!(collection.len(), 5);
    let unique: HashSet<&str> = collection.ids().into_iter().collect();
    assert_eq!(unique.len(), 5);
    assert!(collection.records().iter().all(|r| r.end_date.is_some()));
}

#[tokio::test]
async fn test_catalog_items_attached_from_first_page() {
    let collection = fetch_with(&[]).await;
    let granby = &collection.records()[0];
    assert_eq!(granby.id, "281");
    let ids: Vec<&str> = granby
        .parameters
        .iter()
        .map(|p| p.parameter_id.as_str())
        .collect();
    assert_eq!(ids, vec!["3", "17"]);

    // Lake Powell Area sits on the last page; its items come from page one.
    let powell = &collection.records()[4];
    assert_eq!(powell.parameters[0].series_id, "4600");
}

#[tokio::test]
async fn test_duplicate_location_is_integrity_error() {
    let locations = sample_rise_locations();
    let upstream = MockUpstream::new();
    let mut data: Vec<_> = locations.iter().map(RiseLocation::to_data).collect();
    data.push(locations[0].to_data());
    upstream.serve_paged(LOCATIONS, data, Vec::new(), PAGE_SIZE);
    let (source, cache) = setup(&upstream);

    let err = LocationCollection::fetch(&source, &cache, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DataIntegrity(_)));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn test_upstream_outage_maps_to_bad_gateway() {
    let upstream = MockUpstream::new();
    upstream.serve_status(LOCATIONS, 503);
    let (source, cache) = setup(&upstream);

    let err = LocationCollection::fetch(&source, &cache, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cache(_)));
    assert_eq!(err.status_code(), 502);
}

#[tokio::test]
async fn test_unpaged_location_document() {
    let upstream = MockUpstream::new();
    upstream.serve_json(
        LOCATIONS,
        rise_location_page(&sample_rise_locations()[..2], None),
    );
    let (source, cache) = setup(&upstream);

    let collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    assert_eq!(collection.ids(), vec!["281", "268"]);
}

// ============================================================================
// Filtering
// ============================================================================

#[tokio::test]
async fn test_bbox_filter() {
    let collection = fetch_with(&[("bbox", bbox::FOUR_CORNERS)]).await;
    // Lees Ferry has no elevation and drops out under any spatial filter.
    assert_eq!(collection.ids(), vec!["281", "268", "3514", "7000"]);

    let collection = fetch_with(&[("bbox", bbox::NORTHERN_COLORADO)]).await;
    assert_eq!(collection.ids(), vec!["281"]);
}

#[tokio::test]
async fn test_bbox_without_matches() {
    let collection = fetch_with(&[("bbox", bbox::PACIFIC)]).await;
    assert!(collection.is_empty());
}

#[tokio::test]
async fn test_wkt_and_elevation_filter() {
    let collection = fetch_with(&[
        ("coords", "POLYGON((-112 36, -104 36, -104 41, -112 41, -112 36))"),
        ("z", "6000/8000"),
    ])
    .await;
    assert_eq!(collection.ids(), vec!["268", "3514"]);
}

#[tokio::test]
async fn test_instant_inside_open_window() {
    let collection = fetch_with(&[("datetime", time::ACTIVE_DATE)]).await;
    assert_eq!(collection.len(), 5);
    assert!(collection
        .records()
        .iter()
        .all(|r| r.end_date.as_deref() == Some(time::SENTINEL)));
}

#[tokio::test]
async fn test_instant_before_creation() {
    let collection = fetch_with(&[("datetime", "2019-12-01T00:00:00Z")]).await;
    assert!(!collection.ids().contains(&"268"));
    assert_eq!(collection.len(), 4);
}

#[tokio::test]
async fn test_property_filter_sort_and_paging() {
    let collection = fetch_with(&[
        ("locationTypeName", "Lake/Reservoir"),
        ("sortby", "-elevation"),
        ("offset", "1"),
        ("limit", "2"),
    ])
    .await;
    // Reservoirs by elevation: 281, 268, 3514, 7000.
    assert_eq!(collection.ids(), vec!["268", "3514"]);
}

#[tokio::test]
async fn test_unknown_property_filter() {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);
    let query = CollectionQuery::from_params([("colour", "blue")]).unwrap();

    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    let err = collection
        .apply(&query, &source.field_schema())
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

fn unreachable_upstream() -> MockUpstream {
    let upstream = MockUpstream::new();
    upstream.server().expect(
        Expectation::matching(request::method_path("GET", LOCATIONS))
            .times(0)
            .respond_with(status_code(503)),
    );
    upstream
}

#[tokio::test]
async fn test_unknown_property_rejected_before_fetch() {
    let upstream = unreachable_upstream();
    let (source, cache) = setup(&upstream);
    let query = CollectionQuery::from_params([("colour", "blue")]).unwrap();

    let err = LocationCollection::fetch_matching(&source, &cache, &query, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Query(_)));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_unknown_sort_key_rejected_before_fetch() {
    let upstream = unreachable_upstream();
    let (source, cache) = setup(&upstream);
    let query = CollectionQuery::from_params([("sortby", "-colour")]).unwrap();

    let err = LocationCollection::fetch_matching(&source, &cache, &query, false)
        .await
        .unwrap_err();
    assert!(matches!(&err, EngineError::UnknownProperty(p) if p == "colour"));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_fetch_matching_applies_query() {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);
    let query = CollectionQuery::from_params([("bbox", bbox::NORTHERN_COLORADO)]).unwrap();

    let collection = LocationCollection::fetch_matching(&source, &cache, &query, false)
        .await
        .unwrap();
    assert_eq!(collection.ids(), vec!["281"]);
}

#[tokio::test]
async fn test_unknown_location_id_is_no_data() {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);
    let query = CollectionQuery::new().with_id("99999");

    let err = LocationCollection::fetch_matching(&source, &cache, &query, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoData(_)));
    assert_eq!(err.status_code(), 404);
}

// ============================================================================
// GeoJSON
// ============================================================================

#[tokio::test]
async fn test_items_as_feature_collection() {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);
    let collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    let matched = collection.len();

    let options = FeatureOptions::new(source.field_schema())
        .with_predicates(vec![("locationTypeName".to_string(), "River/Stream".to_string())])
        .with_select_properties(vec!["name".to_string()])
        .with_number_matched(matched);
    let response = FeatureProjector::render(collection, &options).unwrap();

    match response {
        GeoJsonResponse::FeatureCollection(fc) => {
            assert_eq!(fc.features.len(), 1);
            let feature = &fc.features[0];
            assert_eq!(feature.id.as_deref(), Some("6124"));
            assert_eq!(feature.properties.len(), 1);
            assert_eq!(feature.properties["name"], "Colorado River at Lees Ferry");
            assert_eq!(fc.number_matched, Some(5));
        }
        other => panic!("Expected FeatureCollection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_single_item() {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);
    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.drop_all_but_id("7000");

    let options = FeatureOptions::new(source.field_schema()).single();
    match FeatureProjector::render(collection, &options).unwrap() {
        GeoJsonResponse::Feature(feature) => {
            assert_eq!(feature.properties["name"], "Lake Powell Area");
            assert!(feature.geometry.is_some());
        }
        other => panic!("Expected Feature, got {:?}", other),
    }
}

#[tokio::test]
async fn test_single_item_missing() {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);
    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.drop_all_but_id("99999");

    let err = FeatureProjector::render(collection, &FeatureOptions::new(source.field_schema()).single())
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

// ============================================================================
// CoverageJSON
// ============================================================================

#[tokio::test]
async fn test_coverage_for_multi_parameter_location() {
    let upstream = rise_upstream();
    serve_results(
        &upstream,
        "4222",
        &[
            ("2024-01-01T00:00:00Z", Some(250_000.0)),
            ("2024-01-02T00:00:00Z", Some(251_000.0)),
        ],
    );
    serve_results(&upstream, "4223", &[("2024-01-02T00:00:00Z", Some(8270.5))]);
    let (source, cache) = setup(&upstream);

    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.drop_all_but_id("281");

    let output = CoverageBuilder::new(&source, &cache)
        .render(&collection, None, None)
        .await
        .unwrap();

    assert_eq!(output.len(), 1);
    let coverage = &output.coverages[0];
    assert_eq!(coverage.id.as_deref(), Some("281"));
    assert_eq!(coverage.time_len(), 2);
    assert_coords_approx_eq!(
        (axis_float(coverage, "x"), axis_float(coverage, "y")),
        (-105.86, 40.15),
        1e-9
    );
    assert_eq!(coverage.ranges["3"].values, vec![Some(250_000.0), Some(251_000.0)]);
    assert_eq!(coverage.ranges["17"].values, vec![None, Some(8270.5)]);

    let keys: Vec<&str> = output.parameters.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["17", "3"]);
    let storage = &output.parameters["3"];
    assert_eq!(storage.observed_property.label.text(), "Lake/Reservoir Storage");
    assert!(storage.unit.is_some());
}

#[tokio::test]
async fn test_all_null_series_omitted() {
    let upstream = rise_upstream();
    serve_results(&upstream, "4222", &[("2024-01-01T00:00:00Z", Some(1.0))]);
    serve_results(&upstream, "4223", &[("2024-01-01T00:00:00Z", None)]);
    serve_results(
        &upstream,
        "4100",
        &[("2024-01-01T00:00:00Z", None), ("2024-01-02T00:00:00Z", None)],
    );
    let (source, cache) = setup(&upstream);

    let query = CollectionQuery::from_params([("bbox", bbox::FOUR_CORNERS), ("limit", "2")])
        .unwrap();
    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.apply(&query, &source.field_schema()).unwrap();
    assert_eq!(collection.ids(), vec!["281", "268"]);

    let output = CoverageBuilder::new(&source, &cache)
        .render(&collection, None, None)
        .await
        .unwrap();

    assert_eq!(output.len(), 1);
    assert!(!output.coverages[0].ranges.contains_key("17"));
    assert_eq!(output.parameters.keys().collect::<Vec<_>>(), vec!["3"]);
}

#[tokio::test]
async fn test_parameter_selection_and_unused_metadata() {
    let upstream = rise_upstream();
    serve_results(&upstream, "4223", &[("2024-01-01T00:00:00Z", Some(8270.0))]);
    let (source, cache) = setup(&upstream);

    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.drop_all_but_id("281");
    let selected = vec!["17".to_string()];

    let output = CoverageBuilder::new(&source, &cache)
        .render(&collection, None, Some(selected.as_slice()))
        .await
        .unwrap();

    assert_eq!(output.parameters.keys().collect::<Vec<_>>(), vec!["17"]);
    assert!(!output.parameters.contains_key("99"));
    assert!(!output.parameters.contains_key("1830"));
}

#[tokio::test]
async fn test_datetime_forwarded_to_result_query() {
    let upstream = rise_upstream();
    upstream.server().expect(
        Expectation::matching(all_of![
            request::method_path("GET", RESULTS),
            request::query(url_decoded(contains(("itemId", eq("4500"))))),
            request::query(url_decoded(contains((
                "dateTime[after]",
                eq("2024-01-01T00:00:00Z")
            )))),
            request::query(url_decoded(contains((
                "dateTime[before]",
                eq("2024-02-01T00:00:00Z")
            )))),
        ])
        .times(1)
        .respond_with(json_encoded(rise_result_page(&[(
            "2024-01-15T00:00:00Z",
            Some(8000.0),
        )]))),
    );
    let (source, cache) = setup(&upstream);

    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.drop_all_but_id("6124");
    let datetime = DateTimeQuery::parse("2024-01-01/2024-02-01").unwrap();

    let output = CoverageBuilder::new(&source, &cache)
        .render(&collection, Some(&datetime), None)
        .await
        .unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(output.coverages[0].ranges["1830"].values, vec![Some(8000.0)]);
}

#[tokio::test]
async fn test_polygon_location_coverage() {
    let upstream = rise_upstream();
    serve_results(&upstream, "4600", &[("2024-01-01T00:00:00Z", Some(3550.0))]);
    let (source, cache) = setup(&upstream);

    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.drop_all_but_id("7000");

    let output = CoverageBuilder::new(&source, &cache)
        .render(&collection, None, None)
        .await
        .unwrap();
    assert_eq!(output.len(), 1);
    assert_eq!(output.coverages[0].ranges["3"].values, vec![Some(3550.0)]);
}

#[tokio::test]
async fn test_empty_collection_renders_empty_coverage() {
    let upstream = rise_upstream();
    let (source, cache) = setup(&upstream);

    let mut collection = LocationCollection::fetch(&source, &cache, false).await.unwrap();
    collection.drop_all_but_id("missing");

    let output = CoverageBuilder::new(&source, &cache)
        .render(&collection, None, None)
        .await
        .unwrap();
    assert!(output.is_empty());
    assert!(output.parameters.is_empty());
}

#[test]
fn test_render_blocking_from_sync_code() {
    let upstream = rise_upstream();
    serve_results(&upstream, "4300", &[("2024-01-01T00:00:00Z", Some(1_200_000.0))]);

    let executor = Executor::new(Some(2)).unwrap();
    let source = RiseSource::new(upstream.url("/rise/api"));
    let cache = RemoteCache::in_memory(config(), executor.handle()).unwrap();

    let mut collection = executor
        .block_on(LocationCollection::fetch(&source, &cache, false))
        .unwrap();
    collection.drop_all_but_id("3514");

    let output = CoverageBuilder::new(&source, &cache)
        .render_blocking(&executor, &collection, None, None)
        .unwrap();
    assert_eq!(output.len(), 1);
}
