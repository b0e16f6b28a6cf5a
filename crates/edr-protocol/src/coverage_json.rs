//! CoverageJSON types for EDR query responses.
//!
//! Location time series are rendered as a `CoverageCollection` holding
//! one coverage per location. Point locations use a `PointSeries`
//! domain, polygon or line locations a `PolygonSeries` domain with a
//! composite spatial axis.
//!
//! See: <https://covjson.org/>

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::parameters::{I18nString, ObservedProperty, ParameterMetadata, Unit};

/// CRS URI for WGS 84 longitude/latitude.
pub const CRS_WGS84: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";

/// CRS URI for NAVD88 heights, used for station elevations.
pub const CRS_NAVD88: &str = "http://www.opengis.net/def/crs/EPSG/0/5703";

/// A collection of coverages sharing parameters and referencing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageCollection {
    /// Document type (always "CoverageCollection").
    #[serde(rename = "type")]
    pub type_: CoverageType,

    /// Domain type shared by every coverage, when uniform.
    #[serde(rename = "domainType", skip_serializing_if = "Option::is_none")]
    pub domain_type: Option<DomainType>,

    /// The coverages.
    pub coverages: Vec<CoverageJson>,

    /// Parameter definitions referenced by the coverages' ranges.
    pub parameters: BTreeMap<String, CovJsonParameter>,

    /// Reference systems for the axes used by the coverages.
    pub referencing: Vec<ReferenceSystemConnection>,
}

impl CoverageCollection {
    /// Create an empty collection with the standard x/y, z and t referencing.
    pub fn new() -> Self {
        Self {
            type_: CoverageType::CoverageCollection,
            domain_type: None,
            coverages: Vec::new(),
            parameters: BTreeMap::new(),
            referencing: ReferenceSystemConnection::standard(),
        }
    }

    /// Add a coverage.
    pub fn with_coverage(mut self, coverage: CoverageJson) -> Self {
        self.coverages.push(coverage);
        self
    }

    /// Add a parameter definition.
    pub fn with_parameter(mut self, name: impl Into<String>, param: CovJsonParameter) -> Self {
        self.parameters.insert(name.into(), param);
        self
    }

    /// Set `domainType` when every coverage shares one domain type.
    pub fn infer_domain_type(&mut self) {
        let mut types = self.coverages.iter().map(|c| &c.domain.domain_type);
        self.domain_type = match types.next() {
            Some(first) if types.all(|t| t == first) => Some(first.clone()),
            _ => None,
        };
    }

    /// Number of coverages.
    pub fn len(&self) -> usize {
        self.coverages.len()
    }

    /// Whether the collection has no coverages.
    pub fn is_empty(&self) -> bool {
        self.coverages.is_empty()
    }
}

impl Default for CoverageCollection {
    fn default() -> Self {
        Self::new()
    }
}

/// A single coverage: a domain plus one range per parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoverageJson {
    /// Document type (always "Coverage").
    #[serde(rename = "type")]
    pub type_: CoverageType,

    /// Identifier of the location this coverage describes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The domain defining the coverage's spatial/temporal extent.
    pub domain: Domain,

    /// Data ranges for each parameter.
    pub ranges: BTreeMap<String, NdArray>,
}

impl CoverageJson {
    /// Create a point series coverage (time series at a point).
    pub fn point_series(x: f64, y: f64, z: Option<f64>, t_values: Vec<String>) -> Self {
        Self {
            type_: CoverageType::Coverage,
            id: None,
            domain: Domain::point_series(x, y, z, t_values),
            ranges: BTreeMap::new(),
        }
    }

    /// Create a polygon series coverage (time series over an area).
    pub fn polygon_series(polygon: Vec<Vec<[f64; 2]>>, t_values: Vec<String>) -> Self {
        Self {
            type_: CoverageType::Coverage,
            id: None,
            domain: Domain::polygon_series(polygon, t_values),
            ranges: BTreeMap::new(),
        }
    }

    /// Set the coverage id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a range along the time axis.
    ///
    /// The range shape follows the domain: `[t]` for point series,
    /// `[t, 1]` over `t` and `composite` for polygon series.
    pub fn with_time_series(mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        let len = values.len();
        let array = match self.domain.domain_type {
            DomainType::PolygonSeries => NdArray::new(
                values,
                vec![len, 1],
                vec!["t".to_string(), "composite".to_string()],
            ),
            _ => NdArray::new(values, vec![len], vec!["t".to_string()]),
        };
        self.ranges.insert(name.into(), array);
        self
    }

    /// Length of the time axis.
    pub fn time_len(&self) -> usize {
        self.domain.axes.get("t").map_or(0, Axis::len)
    }
}

/// Coverage type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CoverageType {
    /// Single coverage.
    Coverage,
    /// Collection of coverages.
    CoverageCollection,
}

/// The domain of a coverage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Domain {
    /// Domain type (always "Domain").
    #[serde(rename = "type")]
    pub type_: String,

    /// The domain type (PointSeries, PolygonSeries).
    #[serde(rename = "domainType")]
    pub domain_type: DomainType,

    /// Axis definitions.
    pub axes: BTreeMap<String, Axis>,

    /// Reference systems for axes; omitted when the enclosing collection declares them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referencing: Option<Vec<ReferenceSystemConnection>>,
}

impl Domain {
    /// Create a point series domain (time series at a single point).
    pub fn point_series(x: f64, y: f64, z: Option<f64>, t_values: Vec<String>) -> Self {
        let mut axes = BTreeMap::new();
        axes.insert("x".to_string(), Axis::floats(vec![x]));
        axes.insert("y".to_string(), Axis::floats(vec![y]));
        axes.insert("t".to_string(), Axis::strings(t_values));

        if let Some(z) = z {
            axes.insert("z".to_string(), Axis::floats(vec![z]));
        }

        Self {
            type_: "Domain".to_string(),
            domain_type: DomainType::PointSeries,
            axes,
            referencing: None,
        }
    }

    /// Create a polygon series domain.
    ///
    /// The polygon is carried on a composite `x,y` axis with a single value.
    pub fn polygon_series(polygon: Vec<Vec<[f64; 2]>>, t_values: Vec<String>) -> Self {
        let mut axes = BTreeMap::new();
        axes.insert(
            "composite".to_string(),
            Axis::Composite {
                data_type: "polygon".to_string(),
                coordinates: vec!["x".to_string(), "y".to_string()],
                values: vec![polygon],
            },
        );
        axes.insert("t".to_string(), Axis::strings(t_values));

        Self {
            type_: "Domain".to_string(),
            domain_type: DomainType::PolygonSeries,
            axes,
            referencing: None,
        }
    }
}

/// Domain types produced by this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainType {
    /// Time series at a point.
    PointSeries,
    /// Time series over a polygon.
    PolygonSeries,
}

/// An axis in the domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Axis {
    /// Composite axis whose values are tuples or geometries.
    Composite {
        #[serde(rename = "dataType")]
        data_type: String,
        coordinates: Vec<String>,
        values: Vec<Vec<Vec<[f64; 2]>>>,
    },
    /// Explicit list of values.
    Values { values: Vec<AxisValue> },
}

impl Axis {
    /// Axis of float values.
    pub fn floats(values: Vec<f64>) -> Self {
        Axis::Values {
            values: values.into_iter().map(AxisValue::Float).collect(),
        }
    }

    /// Axis of string values (timestamps).
    pub fn strings(values: Vec<String>) -> Self {
        Axis::Values {
            values: values.into_iter().map(AxisValue::String).collect(),
        }
    }

    /// Get the number of values in this axis.
    pub fn len(&self) -> usize {
        match self {
            Axis::Values { values } => values.len(),
            Axis::Composite { values, .. } => values.len(),
        }
    }

    /// Check if axis is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A value on an axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AxisValue {
    /// Floating-point value (coordinates, levels).
    Float(f64),
    /// String value (timestamps).
    String(String),
}

/// Connection between axes and their reference system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceSystemConnection {
    /// Axes that use this reference system.
    pub coordinates: Vec<String>,

    /// The reference system.
    pub system: ReferenceSystem,
}

impl ReferenceSystemConnection {
    /// Geographic x/y, vertical z and Gregorian t.
    pub fn standard() -> Vec<Self> {
        vec![
            Self {
                coordinates: vec!["x".to_string(), "y".to_string()],
                system: ReferenceSystem::Geographic {
                    id: CRS_WGS84.to_string(),
                },
            },
            Self {
                coordinates: vec!["z".to_string()],
                system: ReferenceSystem::Vertical {
                    id: CRS_NAVD88.to_string(),
                },
            },
            Self {
                coordinates: vec!["t".to_string()],
                system: ReferenceSystem::Temporal {
                    calendar: "Gregorian".to_string(),
                },
            },
        ]
    }
}

/// Reference system definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ReferenceSystem {
    /// Geographic coordinate reference system.
    #[serde(rename = "GeographicCRS")]
    Geographic {
        /// CRS identifier URI.
        id: String,
    },

    /// Temporal reference system.
    #[serde(rename = "TemporalRS")]
    Temporal {
        /// Calendar system (e.g., "Gregorian").
        calendar: String,
    },

    /// Vertical reference system.
    #[serde(rename = "VerticalCRS")]
    Vertical {
        /// CRS identifier URI.
        id: String,
    },
}

/// A parameter in CoverageJSON format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CovJsonParameter {
    /// Type (always "Parameter").
    #[serde(rename = "type")]
    pub type_: String,

    /// Description of the parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<I18nString>,

    /// The observed property.
    #[serde(rename = "observedProperty")]
    pub observed_property: ObservedProperty,

    /// Unit of measurement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

impl CovJsonParameter {
    /// Create a new CoverageJSON parameter.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            type_: "Parameter".to_string(),
            description: None,
            observed_property: ObservedProperty::new(label),
            unit: None,
        }
    }

    /// Set the unit.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(I18nString::english(&desc.into()));
        self
    }

    /// Convert from catalog metadata.
    pub fn from_metadata(meta: &ParameterMetadata) -> Self {
        let mut param = Self::new(meta.label());
        param.observed_property = param.observed_property.with_id(&meta.id);
        if let Some(unit) = &meta.unit {
            param = param.with_unit(Unit::new(unit.clone(), unit.clone()));
        }
        if let Some(desc) = &meta.description {
            param = param.with_description(desc.clone());
        }
        param
    }
}

/// N-dimensional array containing data values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NdArray {
    /// Type (always "NdArray").
    #[serde(rename = "type")]
    pub type_: String,

    /// Data type of values.
    #[serde(rename = "dataType")]
    pub data_type: String,

    /// Names of axes in order.
    #[serde(rename = "axisNames")]
    pub axis_names: Vec<String>,

    /// Shape of the array.
    pub shape: Vec<usize>,

    /// The data values (may contain null for missing data).
    pub values: Vec<Option<f64>>,
}

impl NdArray {
    /// Create an array with missing data support.
    pub fn new(values: Vec<Option<f64>>, shape: Vec<usize>, axis_names: Vec<String>) -> Self {
        Self {
            type_: "NdArray".to_string(),
            data_type: "float".to_string(),
            axis_names,
            shape,
            values,
        }
    }

    /// Whether at least one value is present.
    pub fn has_values(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }
}
