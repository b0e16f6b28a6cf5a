//! GeoJSON rendering of location collections.

use serde_json::Value;
use tracing::debug;

use edr_protocol::queries::sort_by_keys;
use edr_protocol::{Feature, FeatureCollection, GeoJsonResponse, SortKey};

use crate::collection::{validate_sort_keys, CollectionQuery, LocationCollection};
use crate::error::{EngineError, EngineResult};
use crate::record::LocationRecord;
use crate::schema::FieldSchema;

/// Options for an items or single-item request.
#[derive(Debug, Clone, Default)]
pub struct FeatureOptions {
    /// Return one Feature instead of a FeatureCollection.
    pub single_feature: bool,

    /// Emit `null` geometries.
    pub skip_geometry: bool,

    /// Allow-list of property keys kept on each feature.
    pub select_properties: Option<Vec<String>>,

    /// Property value filters applied before rendering.
    pub property_predicates: Vec<(String, String)>,

    /// Declared property types for predicates and sort keys.
    pub schema: FieldSchema,

    /// Sort criteria, first key dominant.
    pub sort_by: Vec<SortKey>,

    /// Count reported as `numberMatched`, when the caller knows it.
    pub number_matched: Option<usize>,
}

impl FeatureOptions {
    pub fn new(schema: FieldSchema) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    /// Options carrying the rendering parameters of a parsed query.
    pub fn from_query(query: &CollectionQuery, schema: FieldSchema) -> Self {
        Self {
            skip_geometry: query.skip_geometry,
            select_properties: query.select_properties.clone(),
            ..Self::new(schema)
        }
    }

    pub fn single(mut self) -> Self {
        self.single_feature = true;
        self
    }

    pub fn skip_geometry(mut self, skip: bool) -> Self {
        self.skip_geometry = skip;
        self
    }

    pub fn with_select_properties(mut self, keys: Vec<String>) -> Self {
        self.select_properties = Some(keys);
        self
    }

    pub fn with_predicates(mut self, pairs: Vec<(String, String)>) -> Self {
        self.property_predicates = pairs;
        self
    }

    pub fn with_sort_by(mut self, keys: Vec<SortKey>) -> Self {
        self.sort_by = keys;
        self
    }

    pub fn with_number_matched(mut self, matched: usize) -> Self {
        self.number_matched = Some(matched);
        self
    }

    fn validate_sort_keys(&self) -> EngineResult<()> {
        validate_sort_keys(&self.sort_by, &self.schema)
    }
}

/// Renders location collections as GeoJSON.
pub struct FeatureProjector;

impl FeatureProjector {
    /// Render a collection.
    ///
    /// Steps: property predicates, feature construction, sort, property
    /// selection, then the single-feature check. An empty collection is a
    /// valid FeatureCollection; a single-feature request must match
    /// exactly one record.
    pub fn render(
        mut collection: LocationCollection,
        options: &FeatureOptions,
    ) -> EngineResult<GeoJsonResponse> {
        options.validate_sort_keys()?;

        collection.filter_by_properties(&options.property_predicates, &options.schema)?;

        let mut features: Vec<Feature> = collection
            .records()
            .iter()
            .map(|record| Self::to_feature(record, options.skip_geometry))
            .collect();

        if !options.sort_by.is_empty() {
            sort_by_keys(&mut features, &options.sort_by, feature_property);
        }

        if let Some(keys) = &options.select_properties {
            for feature in &mut features {
                feature.retain_properties(keys);
            }
        }

        debug!(count = features.len(), "Rendered features");

        if options.single_feature {
            return match features.len() {
                0 => Err(EngineError::NoData(
                    "No location matched the request".to_string(),
                )),
                1 => Ok(GeoJsonResponse::Feature(Box::new(features.remove(0)))),
                n => Err(EngineError::DataIntegrity(format!(
                    "Expected a single location, found {}",
                    n
                ))),
            };
        }

        let mut fc = FeatureCollection::new().with_features(features);
        if let Some(matched) = options.number_matched {
            fc = fc.with_number_matched(matched);
        }
        Ok(GeoJsonResponse::FeatureCollection(fc))
    }

    /// Build the feature for one record.
    pub fn to_feature(record: &LocationRecord, skip_geometry: bool) -> Feature {
        let geometry = if skip_geometry {
            None
        } else {
            record.geometry.clone()
        };

        Feature::new(geometry)
            .with_id(record.id.clone())
            .with_properties(record.rendered_properties())
    }
}

fn feature_property(feature: &Feature, key: &str) -> Option<Value> {
    match key {
        "id" => feature.id.clone().map(Value::String),
        k => feature.properties.get(k).cloned(),
    }
}
