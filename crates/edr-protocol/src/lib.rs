//! OGC API - Environmental Data Retrieval (EDR) and Features documents
//!
//! This crate provides the response documents and query parameter types
//! shared by location-oriented EDR collections: GeoJSON features for
//! items requests, CoverageJSON collections for time series queries and
//! exception documents for errors.
//!
//! # Example
//!
//! ```rust
//! use edr_protocol::{BboxQuery, DateTimeQuery};
//!
//! let bbox = BboxQuery::parse("-109.5,36.5,-101.5,41.5").unwrap();
//! assert!(bbox.z_filter().is_none());
//!
//! let datetime = DateTimeQuery::parse("2024-01-01/..").unwrap();
//! assert!(datetime.is_interval());
//! ```

pub mod coverage_json;
pub mod errors;
pub mod geojson;
pub mod parameters;
pub mod queries;
pub mod responses;

// Re-export commonly used types
pub use coverage_json::{
    Axis, CovJsonParameter, CoverageCollection, CoverageJson, Domain, DomainType, NdArray,
    ReferenceSystem,
};
pub use errors::QueryParameterError;
pub use geojson::{Feature, FeatureCollection, GeoJsonResponse, Geometry};
pub use parameters::{I18nString, ObservedProperty, ParameterMetadata, Unit};
pub use queries::{
    parse_timestamp, parse_wkt, BboxQuery, DateTimeQuery, SortKey, SortOrder, ZFilter,
};
pub use responses::ExceptionResponse;
