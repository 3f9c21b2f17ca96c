//! Component records supplied by upstream collaborators
//!
//! OCR and claim-analysis code resolves a scanned part into a
//! [`ComponentSpecs`] record; the caches and the saved-component store persist
//! it. `(part_number, manufacturer)` is the natural key across repositories.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Spec name (e.g. `capacity`, `max_output_current`) to value
pub type SpecMap = BTreeMap<String, SpecValue>;

/// Broad component category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCategory {
    Battery,
    Capacitor,
    Inductor,
    Resistor,
    Diode,
    Led,
    Transistor,
    Mosfet,
    VoltageRegulator,
    DcDcConverter,
    ChargerIc,
    Microcontroller,
    SolarCell,
    Motor,
    Other,
}

impl ComponentCategory {
    /// Every category, in declaration order
    pub const ALL: [Self; 15] = [
        Self::Battery,
        Self::Capacitor,
        Self::Inductor,
        Self::Resistor,
        Self::Diode,
        Self::Led,
        Self::Transistor,
        Self::Mosfet,
        Self::VoltageRegulator,
        Self::DcDcConverter,
        Self::ChargerIc,
        Self::Microcontroller,
        Self::SolarCell,
        Self::Motor,
        Self::Other,
    ];

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Battery => "battery",
            Self::Capacitor => "capacitor",
            Self::Inductor => "inductor",
            Self::Resistor => "resistor",
            Self::Diode => "diode",
            Self::Led => "led",
            Self::Transistor => "transistor",
            Self::Mosfet => "mosfet",
            Self::VoltageRegulator => "voltage_regulator",
            Self::DcDcConverter => "dc_dc_converter",
            Self::ChargerIc => "charger_ic",
            Self::Microcontroller => "microcontroller",
            Self::SolarCell => "solar_cell",
            Self::Motor => "motor",
            Self::Other => "other",
        }
    }

    pub(crate) fn parse_stored(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| Error::Parse(format!("Invalid component category: {}", s)))
    }
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a set of specs came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Parsed from a manufacturer datasheet
    Datasheet,
    /// Distributor catalogue data
    Distributor,
    /// Read directly off the part by OCR
    Ocr,
    /// Entered by the user
    Manual,
    /// Inferred from similar parts
    Estimated,
}

impl SourceType {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "datasheet" => Some(Self::Datasheet),
            "distributor" => Some(Self::Distributor),
            "ocr" => Some(Self::Ocr),
            "manual" => Some(Self::Manual),
            "estimated" => Some(Self::Estimated),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Datasheet => "datasheet",
            Self::Distributor => "distributor",
            Self::Ocr => "ocr",
            Self::Manual => "manual",
            Self::Estimated => "estimated",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance of a spec set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecSource {
    pub source_type: SourceType,
    pub url: Option<String>,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub retrieved_at: DateTime<Utc>,
}

impl SpecSource {
    pub fn new(source_type: SourceType, confidence: f64) -> Self {
        Self {
            source_type,
            url: None,
            confidence: super::confidence(confidence),
            retrieved_at: super::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// One electrical or physical specification
///
/// Either a nominal `value`, a `min`/`max` range, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub unit: String,
    /// Test conditions, e.g. "at 25°C"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,
}

impl SpecValue {
    pub fn nominal(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value: Some(value),
            min: None,
            max: None,
            unit: unit.into(),
            conditions: None,
        }
    }

    pub fn range(min: Option<f64>, max: Option<f64>, unit: impl Into<String>) -> Self {
        Self {
            value: None,
            min,
            max,
            unit: unit.into(),
            conditions: None,
        }
    }

    pub fn with_conditions(mut self, conditions: impl Into<String>) -> Self {
        self.conditions = Some(conditions.into());
        self
    }
}

/// A resolved component as produced by the lookup pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpecs {
    pub part_number: String,
    pub manufacturer: String,
    pub category: ComponentCategory,
    #[serde(default)]
    pub specs: SpecMap,
    pub source: SpecSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasheet_url: Option<String>,
}

impl ComponentSpecs {
    pub fn new(
        part_number: impl Into<String>,
        manufacturer: impl Into<String>,
        category: ComponentCategory,
        source: SpecSource,
    ) -> Self {
        Self {
            part_number: part_number.into(),
            manufacturer: manufacturer.into(),
            category,
            specs: SpecMap::new(),
            source,
            datasheet_url: None,
        }
    }

    pub fn with_spec(mut self, name: impl Into<String>, value: SpecValue) -> Self {
        self.specs.insert(name.into(), value);
        self
    }

    pub fn with_datasheet_url(mut self, url: impl Into<String>) -> Self {
        self.datasheet_url = Some(url.into());
        self
    }

    /// Normalized natural key
    pub fn natural_key(&self) -> Result<(String, String)> {
        natural_key(&self.part_number, &self.manufacturer)
    }
}

/// Trim both halves of a natural key; the part number must not be empty
pub fn natural_key(part_number: &str, manufacturer: &str) -> Result<(String, String)> {
    let part_number = part_number.trim();
    if part_number.is_empty() {
        return Err(Error::InvalidInput("part number must not be empty".to_string()));
    }
    Ok((part_number.to_string(), manufacturer.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for category in ComponentCategory::ALL {
            assert_eq!(ComponentCategory::from_str(category.as_str()), Some(category));
        }
        assert_eq!(
            ComponentCategory::from_str("Voltage Regulator"),
            Some(ComponentCategory::VoltageRegulator)
        );
        assert_eq!(
            ComponentCategory::from_str("dc-dc-converter"),
            Some(ComponentCategory::DcDcConverter)
        );
        assert_eq!(ComponentCategory::from_str("flux capacitor"), None);
    }

    #[test]
    fn test_source_type_parse() {
        assert_eq!(SourceType::from_str("OCR"), Some(SourceType::Ocr));
        assert_eq!(SourceType::from_str("rumour"), None);
    }

    #[test]
    fn test_natural_key_trims_and_rejects_empty() {
        assert_eq!(
            natural_key("  LM2596 ", " TI ").unwrap(),
            ("LM2596".to_string(), "TI".to_string())
        );
        assert!(matches!(natural_key("   ", "TI"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(SpecSource::new(SourceType::Ocr, 1.7).confidence, 1.0);
        assert_eq!(SpecSource::new(SourceType::Ocr, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_spec_value_json_omits_empty_fields() {
        let json = serde_json::to_string(&SpecValue::nominal(3.0, "A")).unwrap();
        assert_eq!(json, r#"{"value":3.0,"unit":"A"}"#);

        let parsed: SpecValue = serde_json::from_str(r#"{"max":40,"unit":"V"}"#).unwrap();
        assert_eq!(parsed, SpecValue::range(None, Some(40.0), "V"));
    }
}
