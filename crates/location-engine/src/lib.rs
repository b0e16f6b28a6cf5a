//! Filtering and rendering engine for upstream location collections.
//!
//! A [`LocationCollection`] is fetched from an [`UpstreamSource`] through a
//! [`RemoteCache`](remote_cache::RemoteCache), narrowed by spatial,
//! temporal and property filters, then rendered as GeoJSON by the
//! [`FeatureProjector`] or as CoverageJSON by the [`CoverageBuilder`].
//!
//! # Example
//!
//! ```ignore
//! let source = RiseSource::default();
//! let query = CollectionQuery::from_params([("bbox", "-109,36,-102,41")])?;
//!
//! let collection = LocationCollection::fetch_matching(&source, &cache, &query, false).await?;
//!
//! let coverages = CoverageBuilder::new(&source, &cache)
//!     .render(&collection, query.datetime.as_ref(), None)
//!     .await?;
//! ```

pub mod collection;
pub mod coverage;
pub mod error;
pub mod features;
pub mod record;
pub mod schema;
pub mod source;
pub mod sources;

pub use collection::{CollectionQuery, LocationCollection};
pub use coverage::CoverageBuilder;
pub use error::{EngineError, EngineResult};
pub use features::{FeatureOptions, FeatureProjector};
pub use record::{LocationRecord, ParameterRef, DEFAULT_SENTINEL};
pub use schema::{FieldSchema, FieldType};
pub use source::{TimeSeriesParameter, UpstreamSource};
pub use sources::RiseSource;
