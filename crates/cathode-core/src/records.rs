//! Property records and final datapoints
//!
//! A [`PropertyRecord`] is what the binder writes per resolved material and
//! sentence; post-processing fans it out into [`FinalRecord`] rows whose JSON
//! form keeps a fixed field order.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Types
// ============================================================================

/// Kind of electrochemical performance a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Cycling performance")]
    Cycling,
    #[serde(rename = "Rate performance")]
    Rate,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cycling => "Cycling performance",
            Self::Rate => "Rate performance",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unit of an applied current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrentUnit {
    #[serde(rename = "mAg-1")]
    MilliAmpPerGram,
    #[serde(rename = "Ag-1")]
    AmpPerGram,
    #[serde(rename = "C")]
    CRate,
}

impl CurrentUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MilliAmpPerGram => "mAg-1",
            Self::AmpPerGram => "Ag-1",
            Self::CRate => "C",
        }
    }

    /// Field name used in serialized records
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::MilliAmpPerGram => "Current: mAg-1",
            Self::AmpPerGram => "Current: Ag-1",
            Self::CRate => "Current: C",
        }
    }
}

impl std::fmt::Display for CurrentUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An applied current with its unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Current {
    pub unit: CurrentUnit,
    pub value: f64,
}

impl Current {
    pub fn new(unit: CurrentUnit, value: f64) -> Self {
        Self { unit, value }
    }
}

/// Cut-off voltage window in volts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageRange {
    pub lower: f64,
    pub upper: f64,
}

impl VoltageRange {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

// ============================================================================
// Property Record
// ============================================================================

/// One resolved material with the performance values bound to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    #[serde(rename = "S_id")]
    pub sentence_id: usize,

    #[serde(rename = "Category")]
    pub category: Category,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Abbreviation")]
    pub abbreviation: Option<String>,

    #[serde(rename = "Elements")]
    pub elements: BTreeMap<String, String>,

    #[serde(rename = "Current")]
    pub current: Option<Current>,

    /// (cycle, capacity mAh/g) pairs, cycling records only
    #[serde(rename = "Cycle_capacity: mAhg-1")]
    pub cycle_capacity: Option<Vec<(u32, f64)>>,

    /// (cycle, retention %) pairs, cycling records only
    #[serde(rename = "Cycle_retention: %")]
    pub cycle_retention: Option<Vec<(u32, f64)>>,

    /// Capacity at the given current, rate records only
    #[serde(rename = "Capacity")]
    pub capacity: Option<f64>,

    /// Retention at the given current, rate records only
    #[serde(rename = "Retention")]
    pub retention: Option<f64>,

    #[serde(rename = "Voltage_range: V")]
    pub voltage: Option<VoltageRange>,

    #[serde(rename = "Sintering temperature")]
    pub sintering_temperature: Option<f64>,

    #[serde(rename = "Sintering time")]
    pub sintering_time: Option<f64>,

    #[serde(rename = "Doi")]
    pub doi: Option<String>,

    #[serde(rename = "Year")]
    pub year: Option<i32>,
}

impl PropertyRecord {
    /// Empty record for a material; values are filled in by the binder
    pub fn new(category: Category, name: impl Into<String>) -> Self {
        Self {
            sentence_id: 0,
            category,
            name: name.into(),
            abbreviation: None,
            elements: BTreeMap::new(),
            current: None,
            cycle_capacity: None,
            cycle_retention: None,
            capacity: None,
            retention: None,
            voltage: None,
            sintering_temperature: None,
            sintering_time: None,
            doi: None,
            year: None,
        }
    }
}

// ============================================================================
// Final Record
// ============================================================================

/// One fully resolved datapoint.
///
/// Serializes as a JSON object in a fixed field order: doi, year, name,
/// abbreviation, sintering conditions, category, cycle, capacity/retention,
/// current, voltage bounds, then the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalRecord {
    pub doi: Option<String>,
    pub year: Option<i32>,
    pub name: String,
    pub abbreviation: Option<String>,
    pub sintering_temperature: Option<f64>,
    pub sintering_time: Option<f64>,
    pub category: Category,
    pub cycle: Option<u32>,
    pub capacity: Option<f64>,
    pub retention: Option<f64>,
    pub current: Option<Current>,
    pub voltage_lower: Option<f64>,
    pub voltage_upper: Option<f64>,
    pub elements: BTreeMap<String, String>,
    /// Left unsplit when the pairs could not be fanned out
    pub cycle_capacity: Option<Vec<(u32, f64)>>,
    pub cycle_retention: Option<Vec<(u32, f64)>>,
}

impl FinalRecord {
    /// Row carrying every field of `record` except the per-cycle lists
    pub fn from_record(record: &PropertyRecord) -> Self {
        Self {
            doi: record.doi.clone(),
            year: record.year,
            name: record.name.clone(),
            abbreviation: record.abbreviation.clone(),
            sintering_temperature: record.sintering_temperature,
            sintering_time: record.sintering_time,
            category: record.category,
            cycle: None,
            capacity: None,
            retention: None,
            current: record.current,
            voltage_lower: record.voltage.map(|v| v.lower),
            voltage_upper: record.voltage.map(|v| v.upper),
            elements: record.elements.clone(),
            cycle_capacity: None,
            cycle_retention: None,
        }
    }
}

impl Serialize for FinalRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("Doi", &self.doi)?;
        map.serialize_entry("Year", &self.year)?;
        map.serialize_entry("Name", &self.name)?;
        map.serialize_entry("Abbreviation", &self.abbreviation)?;
        map.serialize_entry("Sintering temperature", &self.sintering_temperature)?;
        map.serialize_entry("Sintering time", &self.sintering_time)?;
        map.serialize_entry("Category", &self.category)?;
        if let Some(cycle) = self.cycle {
            map.serialize_entry("Cycle", &cycle)?;
        }
        if let Some(capacity) = self.capacity {
            map.serialize_entry("Capacity", &capacity)?;
        }
        if let Some(retention) = self.retention {
            map.serialize_entry("Retention", &retention)?;
        }
        if let Some(current) = self.current {
            map.serialize_entry(current.unit.field_name(), &current.value)?;
        }
        map.serialize_entry("Voltage lower limit", &self.voltage_lower)?;
        map.serialize_entry("Voltage upper limit", &self.voltage_upper)?;
        map.serialize_entry("Elements", &self.elements)?;
        if let Some(pairs) = &self.cycle_capacity {
            map.serialize_entry("Cycle_capacity: mAhg-1", pairs)?;
        }
        if let Some(pairs) = &self.cycle_retention {
            map.serialize_entry("Cycle_retention: %", pairs)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_strings() {
        assert_eq!(Category::Cycling.as_str(), "Cycling performance");
        assert_eq!(
            serde_json::to_string(&Category::Rate).unwrap(),
            "\"Rate performance\""
        );
    }

    #[test]
    fn test_final_record_field_order() {
        let mut record = PropertyRecord::new(Category::Cycling, "Na0.67MnO2");
        record.doi = Some("10.1000/x".to_string());
        record.current = Some(Current::new(CurrentUnit::MilliAmpPerGram, 100.0));
        let mut row = FinalRecord::from_record(&record);
        row.cycle = Some(100);
        row.capacity = Some(120.0);

        let json = serde_json::to_string(&row).unwrap();
        let order = [
            "\"Doi\"",
            "\"Year\"",
            "\"Name\"",
            "\"Abbreviation\"",
            "\"Sintering temperature\"",
            "\"Category\"",
            "\"Cycle\"",
            "\"Capacity\"",
            "\"Current: mAg-1\"",
            "\"Voltage lower limit\"",
            "\"Voltage upper limit\"",
            "\"Elements\"",
        ];
        let positions: Vec<usize> = order.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
        assert!(!json.contains("Retention"));
    }

    #[test]
    fn test_current_field_name() {
        assert_eq!(CurrentUnit::CRate.field_name(), "Current: C");
        assert_eq!(CurrentUnit::AmpPerGram.as_str(), "Ag-1");
    }
}
