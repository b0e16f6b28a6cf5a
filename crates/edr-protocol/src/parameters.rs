//! Parameter metadata types shared by the CoverageJSON encoder.
//!
//! Upstream catalogs describe each time-series parameter with a title,
//! a unit and a free-text description. These types carry that metadata
//! into the `parameters` block of a CoverageCollection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata for one upstream parameter, as resolved from a reference catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ParameterMetadata {
    /// Upstream parameter identifier.
    pub id: String,

    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Unit symbol or name, as the upstream spells it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParameterMetadata {
    /// Create metadata with only an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Title if known, otherwise the identifier.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Internationalized string supporting multiple languages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum I18nString {
    /// Simple string (assumes English).
    Simple(String),
    /// Map of language codes to strings.
    Localized(HashMap<String, String>),
}

impl I18nString {
    /// Create an English-only i18n string.
    pub fn english(s: &str) -> Self {
        let mut map = HashMap::new();
        map.insert("en".to_string(), s.to_string());
        I18nString::Localized(map)
    }

    /// Get the English text, or any available text.
    pub fn text(&self) -> &str {
        match self {
            I18nString::Simple(s) => s,
            I18nString::Localized(map) => map
                .get("en")
                .map(|s| s.as_str())
                .unwrap_or_else(|| map.values().next().map(|s| s.as_str()).unwrap_or("")),
        }
    }
}

/// The observed property being measured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservedProperty {
    /// Identifier for the property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable label.
    pub label: I18nString,
}

impl ObservedProperty {
    /// Create a new observed property with a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: I18nString::english(&label.into()),
        }
    }

    /// Set the ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Unit of measurement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    /// Human-readable label for the unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<I18nString>,

    /// Symbol or abbreviation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Unit {
    /// Create a unit with label and symbol.
    pub fn new(label: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            label: Some(I18nString::english(&label.into())),
            symbol: Some(symbol.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_label_falls_back_to_id() {
        let meta = ParameterMetadata::new("3");
        assert_eq!(meta.label(), "3");

        let meta = meta.with_title("Lake/Reservoir Storage");
        assert_eq!(meta.label(), "Lake/Reservoir Storage");
    }

    #[test]
    fn test_i18n_string_english() {
        let s = I18nString::english("Storage");
        assert_eq!(s.text(), "Storage");

        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"en":"Storage"}"#);
    }

    #[test]
    fn test_i18n_string_simple() {
        let s: I18nString = serde_json::from_str(r#""Inflow""#).unwrap();
        assert_eq!(s.text(), "Inflow");
    }

    #[test]
    fn test_observed_property() {
        let prop = ObservedProperty::new("Reservoir Elevation").with_id("49");

        assert_eq!(prop.id.as_deref(), Some("49"));
        assert_eq!(prop.label.text(), "Reservoir Elevation");
    }

    #[test]
    fn test_unit_serialization() {
        let json = serde_json::to_string(&Unit::new("af", "af")).unwrap();
        assert_eq!(json, r#"{"label":{"en":"af"},"symbol":"af"}"#);
    }
}
