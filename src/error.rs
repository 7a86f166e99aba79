//! Errors for the vessel distance aggregation and its position log I/O.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The raw field of a position record that failed to parse
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PositionField {
    VesselId,
    Timestamp,
    Latitude,
    Longitude,
}

impl fmt::Display for PositionField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PositionField::VesselId => "vessel id",
            PositionField::Timestamp => "timestamp",
            PositionField::Latitude => "latitude",
            PositionField::Longitude => "longitude",
        };
        write!(f, "{}", name)
    }
}

/// All errors produced while computing monthly distances.
#[derive(Error, Debug)]
pub enum DistanceError {
    /// A record field could not be coerced, or a coordinate is outside its geographic range.
    /// `index` is the zero based position of the record in the input sequence.
    #[error("Malformed input at record {index} (vessel {vessel_id:?}): invalid {field} {value:?}: {reason}")]
    MalformedInput {
        index: usize,
        vessel_id: String,
        field: PositionField,
        value: String,
        reason: String,
    },

    /// A configured column name is not present in the position log header.
    #[error("Column {0:?} not found in position log header")]
    MissingColumn(String),

    /// Output files are always csv files.
    #[error("The output path must end with \".csv\": {0}")]
    InvalidOutputPath(PathBuf),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DistanceError>;
