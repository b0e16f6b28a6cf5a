//! Query parameter parsing for items and EDR endpoints.
//!
//! This module handles parsing and validation of the query parameters
//! understood by the location engine: `bbox`, `datetime`, `z`, `wkt`,
//! `sortby`, `select_properties`, `limit` and `offset`. Parsing happens
//! before any upstream request is made, so every error names the
//! parameter it came from.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wkt::TryFromWkt;

use crate::errors::QueryParameterError;

/// Tolerance for comparing elevations against enumerated z values.
const Z_EPSILON: f64 = 1e-9;

/// Largest level count accepted in a recurring `z` expression.
pub const MAX_Z_LEVELS: usize = 1000;

/// Parse a timestamp in any of the formats upstream services emit.
///
/// Accepts RFC 3339, naive `T`- or space-separated datetimes (with or
/// without fractional seconds) and bare dates, which resolve to midnight
/// UTC. Naive values are interpreted as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Format a timestamp the way upstream query strings expect.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parsed `datetime` parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DateTimeQuery {
    /// A specific instant.
    Instant(DateTime<Utc>),

    /// An interval; `None` marks an open (`..`) bound.
    Interval {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
}

impl DateTimeQuery {
    /// Parse a datetime parameter.
    ///
    /// Accepts formats:
    /// - Instant: `2024-12-29T12:00:00Z`
    /// - Interval: `2024-12-29T00:00:00Z/2024-12-29T23:59:59Z`
    /// - Open start: `../2024-12-29T23:59:59Z`
    /// - Open end: `2024-12-29T00:00:00Z/..`
    pub fn parse(datetime: &str) -> Result<Self, QueryParameterError> {
        let datetime = datetime.trim();

        if datetime.contains(',') {
            return Err(QueryParameterError::invalid(
                "datetime",
                "Lists of instants are not supported, use an interval",
            ));
        }

        if datetime.contains('/') {
            let parts: Vec<&str> = datetime.split('/').collect();
            if parts.len() != 2 {
                return Err(QueryParameterError::invalid(
                    "datetime",
                    format!("Invalid interval '{}', expected start/end", datetime),
                ));
            }

            let start = Self::parse_bound(parts[0])?;
            let end = Self::parse_bound(parts[1])?;

            if start.is_none() && end.is_none() {
                return Err(QueryParameterError::invalid(
                    "datetime",
                    "At least one interval bound must be given",
                ));
            }
            if let (Some(s), Some(e)) = (start, end) {
                if s > e {
                    return Err(QueryParameterError::out_of_range(
                        "datetime",
                        format!("Interval start {} is after end {}", parts[0], parts[1]),
                    ));
                }
            }

            return Ok(DateTimeQuery::Interval { start, end });
        }

        Self::parse_value(datetime).map(DateTimeQuery::Instant)
    }

    fn parse_bound(s: &str) -> Result<Option<DateTime<Utc>>, QueryParameterError> {
        let s = s.trim();
        if s == ".." || s.is_empty() {
            return Ok(None);
        }
        Self::parse_value(s).map(Some)
    }

    fn parse_value(s: &str) -> Result<DateTime<Utc>, QueryParameterError> {
        parse_timestamp(s).ok_or_else(|| {
            QueryParameterError::invalid(
                "datetime",
                format!(
                    "Invalid datetime format '{}'. Expected ISO 8601 format (e.g., 2024-12-29T12:00:00Z)",
                    s
                ),
            )
        })
    }

    /// Check if this is an interval query (with potential open ends).
    pub fn is_interval(&self) -> bool {
        matches!(self, DateTimeQuery::Interval { .. })
    }

    /// Lower and upper bounds for upstream filtering, formatted as strings.
    ///
    /// An instant yields the same value for both bounds.
    pub fn upstream_bounds(&self) -> (Option<String>, Option<String>) {
        match self {
            DateTimeQuery::Instant(t) => (Some(format_timestamp(t)), Some(format_timestamp(t))),
            DateTimeQuery::Interval { start, end } => (
                start.as_ref().map(format_timestamp),
                end.as_ref().map(format_timestamp),
            ),
        }
    }
}

/// Vertical filter parsed from the `z` parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ZFilter {
    /// A single level.
    Single(f64),
    /// An inclusive range.
    Range { min: f64, max: f64 },
    /// An enumerated set of levels.
    Set(Vec<f64>),
}

impl ZFilter {
    /// Parse vertical level parameter.
    ///
    /// Accepts formats:
    /// - Single value: `850`
    /// - Multiple values: `850,700,500`
    /// - Range: `100/200` (inclusive, either order)
    /// - Recurring intervals: `R5/1000/100` (R{count}/{start}/{increment})
    pub fn parse(z_param: &str) -> Result<Self, QueryParameterError> {
        let z_param = z_param.trim();

        if let Some(rest) = z_param
            .strip_prefix('R')
            .or_else(|| z_param.strip_prefix('r'))
        {
            return Self::parse_recurring(rest);
        }

        if z_param.contains('/') {
            let parts: Vec<&str> = z_param.split('/').collect();
            if parts.len() != 2 {
                return Err(QueryParameterError::invalid(
                    "z",
                    "Invalid z range format, expected from/to",
                ));
            }

            let from = Self::parse_number(parts[0])?;
            let to = Self::parse_number(parts[1])?;

            return Ok(ZFilter::Range {
                min: from.min(to),
                max: from.max(to),
            });
        }

        if z_param.contains(',') {
            let values: Result<Vec<f64>, _> = z_param.split(',').map(Self::parse_number).collect();
            return values.map(ZFilter::Set);
        }

        Self::parse_number(z_param).map(ZFilter::Single)
    }

    fn parse_number(s: &str) -> Result<f64, QueryParameterError> {
        s.trim()
            .parse::<f64>()
            .map_err(|_| QueryParameterError::invalid("z", format!("'{}' is not a number", s)))
    }

    /// Parse recurring z interval format: {count}/{start}/{increment}
    /// Example: "4/100/50" -> [100, 150, 200, 250]
    fn parse_recurring(s: &str) -> Result<Self, QueryParameterError> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 3 {
            return Err(QueryParameterError::invalid(
                "z",
                "Invalid recurring z format, expected R{count}/{start}/{increment}",
            ));
        }

        let count: usize = parts[0].trim().parse().map_err(|_| {
            QueryParameterError::invalid("z", format!("'{}' is not a valid count", parts[0]))
        })?;
        let start = Self::parse_number(parts[1])?;
        let increment = Self::parse_number(parts[2])?;

        if count == 0 {
            return Err(QueryParameterError::out_of_range(
                "z",
                "Recurring count must be at least 1",
            ));
        }
        if count > MAX_Z_LEVELS {
            return Err(QueryParameterError::out_of_range(
                "z",
                format!("Recurring count {} exceeds the limit of {}", count, MAX_Z_LEVELS),
            ));
        }

        Ok(ZFilter::Set(
            (0..count).map(|i| start + (i as f64 * increment)).collect(),
        ))
    }

    /// Whether an elevation satisfies this filter.
    pub fn matches(&self, elevation: f64) -> bool {
        match self {
            ZFilter::Single(z) => (elevation - z).abs() < Z_EPSILON,
            ZFilter::Range { min, max } => *min <= elevation && elevation <= *max,
            ZFilter::Set(levels) => levels.iter().any(|z| (elevation - z).abs() < Z_EPSILON),
        }
    }
}

/// Bounding box query parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BboxQuery {
    /// Western longitude.
    pub west: f64,

    /// Southern latitude.
    pub south: f64,

    /// Eastern longitude.
    pub east: f64,

    /// Northern latitude.
    pub north: f64,

    /// Lower elevation bound (6-value bbox only).
    pub min_z: Option<f64>,

    /// Upper elevation bound (6-value bbox only).
    pub max_z: Option<f64>,
}

impl BboxQuery {
    /// Parse a bbox parameter.
    ///
    /// Format: `west,south,east,north` or
    /// `west,south,minz,east,north,maxz`.
    pub fn parse(bbox: &str) -> Result<Self, QueryParameterError> {
        let values: Result<Vec<f64>, _> = bbox
            .split(',')
            .map(|s| {
                s.trim().parse::<f64>().map_err(|_| {
                    QueryParameterError::invalid("bbox", format!("'{}' is not a number", s))
                })
            })
            .collect();
        let values = values?;

        let query = match values.as_slice() {
            [west, south, east, north] => BboxQuery {
                west: *west,
                south: *south,
                east: *east,
                north: *north,
                min_z: None,
                max_z: None,
            },
            [west, south, min_z, east, north, max_z] => {
                if min_z > max_z {
                    return Err(QueryParameterError::out_of_range(
                        "bbox",
                        "Minimum z must be less than or equal to maximum z",
                    ));
                }
                BboxQuery {
                    west: *west,
                    south: *south,
                    east: *east,
                    north: *north,
                    min_z: Some(*min_z),
                    max_z: Some(*max_z),
                }
            }
            other => {
                return Err(QueryParameterError::invalid(
                    "bbox",
                    format!("Expected 4 or 6 values, got {}", other.len()),
                ))
            }
        };

        validate_coordinates("bbox", query.west, query.south)?;
        validate_coordinates("bbox", query.east, query.north)?;

        if query.south > query.north {
            return Err(QueryParameterError::out_of_range(
                "bbox",
                "South must be less than or equal to north",
            ));
        }

        Ok(query)
    }

    /// The horizontal extent as a geometry.
    ///
    /// A box crossing the antimeridian (west > east) becomes two polygons.
    pub fn to_geometry(&self) -> geo::Geometry<f64> {
        let rect = |w: f64, e: f64| {
            geo::Rect::new(
                geo::coord! { x: w, y: self.south },
                geo::coord! { x: e, y: self.north },
            )
            .to_polygon()
        };

        if self.west <= self.east {
            geo::Geometry::Polygon(rect(self.west, self.east))
        } else {
            geo::Geometry::MultiPolygon(geo::MultiPolygon::new(vec![
                rect(self.west, 180.0),
                rect(-180.0, self.east),
            ]))
        }
    }

    /// The vertical range of a 6-value bbox.
    pub fn z_filter(&self) -> Option<ZFilter> {
        match (self.min_z, self.max_z) {
            (Some(min), Some(max)) => Some(ZFilter::Range { min, max }),
            _ => None,
        }
    }
}

fn validate_coordinates(param: &str, lon: f64, lat: f64) -> Result<(), QueryParameterError> {
    if !(-180.0..=180.0).contains(&lon) {
        return Err(QueryParameterError::out_of_range(
            param,
            format!("Longitude {} is out of range [-180, 180]", lon),
        ));
    }

    if !(-90.0..=90.0).contains(&lat) {
        return Err(QueryParameterError::out_of_range(
            param,
            format!("Latitude {} is out of range [-90, 90]", lat),
        ));
    }

    Ok(())
}

/// Parse a WKT geometry for area queries.
pub fn parse_wkt(wkt: &str) -> Result<geo::Geometry<f64>, QueryParameterError> {
    geo::Geometry::<f64>::try_from_wkt_str(wkt.trim()).map_err(|e| {
        QueryParameterError::InvalidWkt {
            param: "wkt".to_string(),
            message: e.to_string(),
        }
    })
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One `sortby` criterion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortKey {
    pub property: String,
    pub order: SortOrder,
}

impl SortKey {
    /// Ascending key.
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            order: SortOrder::Ascending,
        }
    }

    /// Descending key.
    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            order: SortOrder::Descending,
        }
    }

    /// Parse a `sortby` list such as `name,-elevation,+id`.
    pub fn parse_list(sortby: &str) -> Result<Vec<Self>, QueryParameterError> {
        sortby
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|item| {
                let (order, property) = match item.as_bytes()[0] {
                    b'-' => (SortOrder::Descending, &item[1..]),
                    b'+' => (SortOrder::Ascending, &item[1..]),
                    _ => (SortOrder::Ascending, item),
                };
                let property = property.trim();
                if property.is_empty() {
                    return Err(QueryParameterError::invalid(
                        "sortby",
                        format!("Missing property name in '{}'", item),
                    ));
                }
                Ok(SortKey {
                    property: property.to_string(),
                    order,
                })
            })
            .collect()
    }
}

/// Order two optional JSON values.
///
/// Missing and null values sort after everything else. Numbers compare
/// numerically, strings lexically; values of different kinds are ordered
/// bool < number < string < other.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => kind_rank(a).cmp(&kind_rank(b)),
        },
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 4,
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
    }
}

/// Stable multi-key sort.
///
/// Keys are applied last to first so the first key dominates. Nulls sort
/// last under ascending order and first under descending order.
pub fn sort_by_keys<T, F>(items: &mut [T], keys: &[SortKey], property: F)
where
    F: Fn(&T, &str) -> Option<Value>,
{
    for key in keys.iter().rev() {
        items.sort_by(|a, b| {
            let ord = compare_values(
                property(a, &key.property).as_ref(),
                property(b, &key.property).as_ref(),
            );
            match key.order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
    }
}

/// Parse a comma-separated property allow-list.
pub fn parse_select_properties(select: &str) -> Vec<String> {
    select
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a non-negative integer paging parameter (`limit` or `offset`).
pub fn parse_count(param: &str, value: &str) -> Result<usize, QueryParameterError> {
    value.trim().parse::<usize>().map_err(|_| {
        QueryParameterError::invalid(
            param,
            format!("'{}' is not a non-negative integer", value),
        )
    })
}
