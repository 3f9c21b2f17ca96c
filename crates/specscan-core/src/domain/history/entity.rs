use crate::domain::component::ComponentCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Overall outcome of a plausibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Plausible,
    Questionable,
    Implausible,
    Unknown,
}

impl VerdictKind {
    pub const ALL: [Self; 4] = [
        Self::Plausible,
        Self::Questionable,
        Self::Implausible,
        Self::Unknown,
    ];

    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "plausible" => Some(Self::Plausible),
            "questionable" => Some(Self::Questionable),
            "implausible" => Some(Self::Implausible),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plausible => "plausible",
            Self::Questionable => "questionable",
            Self::Implausible => "implausible",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The advertised claim that was checked, e.g. "9900mAh"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Text as read off the packaging
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Claim kind such as `capacity` or `power`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub claim_type: Option<String>,
}

impl Claim {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            value: None,
            unit: None,
            claim_type: None,
        }
    }

    pub fn with_value(mut self, value: f64, unit: impl Into<String>) -> Self {
        self.value = Some(value);
        self.unit = Some(unit.into());
        self
    }

    pub fn with_type(mut self, claim_type: impl Into<String>) -> Self {
        self.claim_type = Some(claim_type.into());
        self
    }
}

/// Result of the plausibility computation
///
/// `details` carries the analyser's full output; the log stores it verbatim
/// and never looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanVerdict {
    pub verdict: VerdictKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ScanVerdict {
    pub fn new(verdict: VerdictKind) -> Self {
        Self {
            verdict,
            summary: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Where a component was found in the camera frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A component detected during a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanComponent {
    pub part_number: String,
    pub manufacturer: String,
    pub category: ComponentCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    pub confidence: f64,
}

impl ScanComponent {
    pub fn new(
        part_number: impl Into<String>,
        manufacturer: impl Into<String>,
        category: ComponentCategory,
        confidence: f64,
    ) -> Self {
        Self {
            part_number: part_number.into(),
            manufacturer: manufacturer.into(),
            category,
            bounding_box: None,
            confidence: crate::domain::confidence(confidence),
        }
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }
}

/// A logged scan with its components, in detection order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub id: i64,
    pub claim: Claim,
    pub verdict: ScanVerdict,
    pub components: Vec<ScanComponent>,
    pub created_at: DateTime<Utc>,
}

impl ScanHistoryEntry {
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            id: self.id,
            claim_raw: self.claim.raw.clone(),
            claim_value: self.claim.value,
            claim_unit: self.claim.unit.clone(),
            verdict_type: self.verdict.verdict,
            component_count: self.components.len() as i64,
            created_at: self.created_at,
        }
    }
}

/// List view of a scan without component detail or the verdict payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: i64,
    pub claim_raw: String,
    pub claim_value: Option<f64>,
    pub claim_unit: Option<String>,
    pub verdict_type: VerdictKind,
    pub component_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Scan history statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_scans: i64,
    pub by_verdict_type: BTreeMap<String, i64>,
    pub last_scan_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_kind_roundtrip() {
        for kind in VerdictKind::ALL {
            assert_eq!(VerdictKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(VerdictKind::from_str("Implausible"), Some(VerdictKind::Implausible));
        assert_eq!(VerdictKind::from_str("maybe"), None);
    }

    #[test]
    fn test_claim_serializes_type_field() {
        let claim = Claim::new("9900mAh")
            .with_value(9900.0, "mAh")
            .with_type("capacity");
        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["type"], "capacity");
        assert_eq!(serde_json::from_value::<Claim>(json).unwrap(), claim);
    }

    #[test]
    fn test_summary_counts_components() {
        let entry = ScanHistoryEntry {
            id: 7,
            claim: Claim::new("100W"),
            verdict: ScanVerdict::new(VerdictKind::Questionable),
            components: vec![
                ScanComponent::new("A", "X", ComponentCategory::Diode, 0.5),
                ScanComponent::new("B", "Y", ComponentCategory::Led, 0.7),
            ],
            created_at: Utc::now(),
        };
        let summary = entry.summary();
        assert_eq!(summary.component_count, 2);
        assert_eq!(summary.verdict_type, VerdictKind::Questionable);
    }
}
