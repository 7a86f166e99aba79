//! Everything vessel position related: the raw records going in, the derived segments and the monthly rows coming out.

use crate::*;   // To use everything from the crate
use std::fmt;

// Structs and Enums
//----------------------------------------------------
/// One logged position of a vessel, as supplied by the data source.
/// All fields are kept as text, they are coerced by the aggregator so that bad values can be reported with the record they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    /// Compared exactly, surrounding whitespace is part of the id. Must not be empty or blank
    pub vessel_id: String,
    /// Day first date, optionally with time of day. E.g. "15/01/2023 13:45"
    pub timestamp: String,
    /// Latitude in decimal degrees
    pub latitude: String,
    /// Longitude in decimal degrees
    pub longitude: String,
}

impl PositionRecord {
    pub fn new(vessel_id: impl Into<String>, timestamp: impl Into<String>, latitude: impl Into<String>, longitude: impl Into<String>) -> PositionRecord {
        PositionRecord {
            vessel_id: vessel_id.into(),
            timestamp: timestamp.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
        }
    }
}

/// Calendar month bucket. Displays as `YYYY-MM`
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    /// 1 = January, 12 = December
    pub month: u8,
}

impl YearMonth {
    pub fn new(year: i32, month: u8) -> YearMonth {
        YearMonth { year, month }
    }

    /// Year and month of a date
    pub fn from_date(date: time::Date) -> YearMonth {
        YearMonth {
            year: date.year(),
            month: date.month() as u8,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A position record after coercion, with everything the pipeline derives for it
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSegment {
    /// Position of the record in the input sequence
    pub index: usize,
    pub vessel_id: String,
    pub timestamp: time::PrimitiveDateTime,
    pub year_month: YearMonth,
    pub latitude: f64,
    pub longitude: f64,
    /// Coordinates of the previous record of the same vessel, None for the first record of the vessel
    pub previous_latitude: Option<f64>,
    pub previous_longitude: Option<f64>,
    /// Distance from the previous record, 0 for the first record of the vessel
    pub segment_distance: uom::si::f64::Length,
}

impl PositionSegment {
    pub fn segment_distance_km(&self) -> f64 {
        self.segment_distance.get::<uom::si::length::kilometer>()
    }
}

/// Total distance travelled by one vessel during one calendar month
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyDistance {
    pub vessel_id: String,
    /// Formatted as `YYYY-MM`
    pub year_month: String,
    pub total_distance_km: f64,
}

impl fmt::Display for MonthlyDistance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {:.3} km", self.vessel_id, self.year_month, self.total_distance_km)
    }
}


// Field selection
//----------------------------------------------------
/// Gives the aggregator access to the four raw fields of a record of any type.
/// Returning None means the record does not carry the field, which is reported as malformed input.
pub trait FieldSelector<R> {
    fn vessel_id<'a>(&self, record: &'a R) -> Option<&'a str>;
    fn timestamp<'a>(&self, record: &'a R) -> Option<&'a str>;
    fn latitude<'a>(&self, record: &'a R) -> Option<&'a str>;
    fn longitude<'a>(&self, record: &'a R) -> Option<&'a str>;
}

/// Selector for the crate's own PositionRecord
#[derive(Debug, Copy, Clone, Default)]
pub struct PositionRecordFields;

impl FieldSelector<PositionRecord> for PositionRecordFields {
    fn vessel_id<'a>(&self, record: &'a PositionRecord) -> Option<&'a str> {
        Some(&record.vessel_id)
    }

    fn timestamp<'a>(&self, record: &'a PositionRecord) -> Option<&'a str> {
        Some(&record.timestamp)
    }

    fn latitude<'a>(&self, record: &'a PositionRecord) -> Option<&'a str> {
        Some(&record.latitude)
    }

    fn longitude<'a>(&self, record: &'a PositionRecord) -> Option<&'a str> {
        Some(&record.longitude)
    }
}

/// Names of the position log columns holding each field.
/// The defaults match the fishing fleet logs the tool was first written for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub vessel_id: String,
    pub timestamp: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            vessel_id: "Nombre".to_string(),
            timestamp: "Fecha".to_string(),
            latitude: "Latitud".to_string(),
            longitude: "Longitud".to_string(),
        }
    }
}

/// Selector for csv records, holds the column index of each field
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ColumnSelector {
    vessel_id: usize,
    timestamp: usize,
    latitude: usize,
    longitude: usize,
}

impl ColumnSelector {
    /// Resolves the column names against a header row. Surrounding whitespace in header cells is ignored.
    pub fn from_headers(headers: &csv::StringRecord, columns: &ColumnNames) -> Result<ColumnSelector> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or_else(|| DistanceError::MissingColumn(name.to_string()))
        };

        Ok(ColumnSelector {
            vessel_id: find(&columns.vessel_id)?,
            timestamp: find(&columns.timestamp)?,
            latitude: find(&columns.latitude)?,
            longitude: find(&columns.longitude)?,
        })
    }
}

impl FieldSelector<csv::StringRecord> for ColumnSelector {
    fn vessel_id<'a>(&self, record: &'a csv::StringRecord) -> Option<&'a str> {
        record.get(self.vessel_id)
    }

    fn timestamp<'a>(&self, record: &'a csv::StringRecord) -> Option<&'a str> {
        record.get(self.timestamp)
    }

    fn latitude<'a>(&self, record: &'a csv::StringRecord) -> Option<&'a str> {
        record.get(self.latitude)
    }

    fn longitude<'a>(&self, record: &'a csv::StringRecord) -> Option<&'a str> {
        record.get(self.longitude)
    }
}
