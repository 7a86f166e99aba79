//! Vessel distance logs computes how far every vessel travels per calendar month from irregularly logged positions.
//!
//! Positions are read as text, ordered per vessel, measured pairwise along the great circle
//! and summed per vessel and month. See [`compute_monthly_distances`] for the core and
//! [`load_position_log`] / [`monthly_distances_to_csv`] for the csv side.
//!
//! Distances use the haversine formula on a sphere with the mean earth radius by default,
//! [`DistanceModel::Geodesic`] switches to the WGS84 ellipsoid.

// External crates
use geo::Distance;  // Geographical calculations. Used to calculate the distance between two coordinates
use std::path::Path;

// Internal modules
pub mod error;
pub use crate::error::*;
pub mod aggregators;
pub use crate::aggregators::*;
pub mod vessels;
pub use crate::vessels::*;


// Structs
//----------------------------------------------------
/// A position log read from a delimited file: the header row and every data row
#[derive(Debug, Clone)]
pub struct PositionLog {
    pub headers: csv::StringRecord,
    pub records: Vec<csv::StringRecord>,
}

impl PositionLog {
    /// Resolves the given column names against the log's header
    pub fn column_selector(&self, columns: &ColumnNames) -> Result<ColumnSelector> {
        ColumnSelector::from_headers(&self.headers, columns)
    }

    /// Runs the whole log through a DistanceAggregator using the given column names
    pub fn monthly_distances(&self, columns: &ColumnNames, distance_model: DistanceModel) -> Result<Vec<MonthlyDistance>> {
        let selector = self.column_selector(columns)?;
        DistanceAggregator::new(distance_model).aggregate(&self.records, &selector)
    }
}


// Functions
//----------------------------------------------------

/// Loads a position log from a delimited file with a header row.
/// Rows may have differing lengths, a row too short for a selected column is reported by the aggregator as malformed input.
/// A spinner counting the rows is drawn on stderr when it is a terminal.
/// # Example:
/// ```no_run
/// use vessel_distance_logs::*;
///
/// let log = load_position_log("positions.csv", b',').unwrap();
/// let monthly = log.monthly_distances(&ColumnNames::default(), DistanceModel::Haversine).unwrap();
/// ```
pub fn load_position_log(file_path: impl AsRef<Path>, delimiter: u8) -> Result<PositionLog> {
    let file_path = file_path.as_ref();

    // Read the CSV file
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(file_path)?;
    let headers = csv_reader.headers()?.clone();

    // Only draw progress for interactive sessions
    let progress_bar = if atty::is(atty::Stream::Stderr) {
        indicatif::ProgressBar::new_spinner()
    } else {
        indicatif::ProgressBar::hidden()
    };
    progress_bar.set_message(format!("Reading {}", file_path.display()));

    let mut records: Vec<csv::StringRecord> = Vec::new();
    for result in csv_reader.records() {
        records.push(result?);
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    tracing::debug!(path = %file_path.display(), records = records.len(), "loaded position log");
    Ok(PositionLog { headers, records })
}

/// Saves the monthly distances to a csv file at csv_file_path with the columns
/// vessel_id;year_month;total_distance[km]
/// Will overwrite any file with the same file name at csv_file_path.
/// csv_file_path must end with ".csv"
pub fn monthly_distances_to_csv(csv_file_path: impl AsRef<Path>, rows: &[MonthlyDistance], delimiter: u8) -> Result<()> {
    let csv_file_path = csv_file_path.as_ref();
    // Check if csv_file_path ends with ".csv"
    if csv_file_path.extension().and_then(|e| e.to_str()) != Some("csv") {
        return Err(DistanceError::InvalidOutputPath(csv_file_path.to_path_buf()));
    }

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(csv_file_path)?;

    // Write the header
    wtr.write_record(["vessel_id", "year_month", "total_distance[km]"])?;

    for row in rows {
        wtr.write_record([row.vessel_id.as_str(), row.year_month.as_str(), row.total_distance_km.to_string().as_str()])?;
    }

    // Flush and close the writer
    wtr.flush()?;
    tracing::debug!(path = %csv_file_path.display(), rows = rows.len(), "saved monthly distances");
    Ok(())
}

/// Formats the first n rows as an aligned text table, one line per row after a header line
pub fn preview(rows: &[MonthlyDistance], n: usize) -> String {
    let shown = &rows[..n.min(rows.len())];
    let vessel_width = shown.iter().map(|r| r.vessel_id.chars().count()).max().unwrap_or(0).max("vessel_id".len());

    let mut out = format!("{:<vessel_width$}  {:<10}  {:>17}\n", "vessel_id", "year_month", "total_distance_km");
    for row in shown {
        out.push_str(&format!("{:<vessel_width$}  {:<10}  {:>17.3}\n", row.vessel_id, row.year_month, row.total_distance_km));
    }
    out
}


// Helper functions
//----------------------------------------------------
/// Converts a day first date string into a time::PrimitiveDateTime
/// Accepts DD/MM/YYYY, DD-MM-YYYY and DD.MM.YYYY, optionally followed by a space or T and HH:MM or HH:MM:SS[.fraction].
/// A date whose first part has four digits is read year first (YYYY-MM-DD).
/// On failure the reason is returned.
/// # Example:
/// `let my_timestamp = string_to_date_time("15/01/2023 13:45");`
pub fn string_to_date_time(time_string: &str) -> std::result::Result<time::PrimitiveDateTime, String> {
    let working_str = time_string.trim();
    if working_str.is_empty() {
        return Err("empty timestamp".to_string());
    }

    // Split into date and time of day
    let (date_str, time_str) = match working_str.split_once([' ', 'T']) {
        Some((date_str, time_str)) => (date_str, Some(time_str.trim())),
        None => (working_str, None),
    };

    // Get parts from date
    let parts: Vec<&str> = date_str.split(['/', '-', '.']).collect();
    if parts.len() != 3 {
        return Err(format!("expected day, month and year in {:?}", date_str));
    }
    let (day_str, month_str, year_str) = if parts[0].len() == 4 {
        (parts[2], parts[1], parts[0])
    } else {
        (parts[0], parts[1], parts[2])
    };
    if year_str.len() != 4 {
        return Err(format!("year {:?} must have four digits", year_str));
    }

    let year: i32 = parse_digits(year_str, "year")?;
    let month = time::Month::try_from(parse_digits::<u8>(month_str, "month")?).map_err(|e| e.to_string())?;
    let day_of_month: u8 = parse_digits(day_str, "day")?;
    let date = time::Date::from_calendar_date(year, month, day_of_month).map_err(|e| e.to_string())?;

    let time_hms = match time_str {
        Some(t) if !t.is_empty() => string_to_time_of_day(t)?,
        _ => time::Time::MIDNIGHT,
    };

    Ok(time::PrimitiveDateTime::new(date, time_hms))
}

/// Parses HH:MM or HH:MM:SS with an optional fraction of a second
fn string_to_time_of_day(time_str: &str) -> std::result::Result<time::Time, String> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("expected HH:MM or HH:MM:SS in {:?}", time_str));
    }

    let hour: u8 = parse_digits(parts[0], "hour")?;
    let minute: u8 = parse_digits(parts[1], "minute")?;
    let (second, nanosecond) = match parts.get(2) {
        Some(&seconds) => {
            let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
            let second: u8 = parse_digits(whole, "second")?;
            // Pad or cut the fraction to nanoseconds
            let fraction: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
            (second, parse_digits::<u32>(&fraction, "fraction of second")?)
        }
        None => (0, 0),
    };

    time::Time::from_hms_nano(hour, minute, second, nanosecond).map_err(|e| e.to_string())
}

/// Parses an unsigned run of ascii digits, rejecting signs and whitespace that str::parse would let through
fn parse_digits<T: std::str::FromStr>(digits: &str, name: &str) -> std::result::Result<T, String> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid {} {:?}", name, digits));
    }
    digits.parse::<T>().map_err(|_| format!("invalid {} {:?}", name, digits))
}

/// Converts a string into a coordinate in decimal degrees and checks that it is within [-max_degrees, max_degrees]
/// Use 90 for latitudes and 180 for longitudes.
/// # Example:
/// `let my_latitude: f64 = string_to_coordinate("52.5200", 90.0).unwrap();`
pub fn string_to_coordinate(coord_string: &str, max_degrees: f64) -> std::result::Result<f64, String> {
    let coordinate: f64 = coord_string.trim().parse::<f64>().map_err(|e| e.to_string())?;

    if !coordinate.is_finite() {
        return Err("not a finite number".to_string());
    }
    if coordinate.abs() > max_degrees {
        return Err(format!("outside [-{}, {}]", max_degrees, max_degrees));
    }

    Ok(coordinate)
}

/// Calculates the haversine distance between two points and returns the distance in uom::si::f64::Length
pub fn haversine_distance_uom_units(p1: geo::Point, p2: geo::Point) -> uom::si::f64::Length {
    uom::si::f64::Length::new::<uom::si::length::meter>(geo::Haversine.distance(p1, p2))
}

/// Calculates the geodesic distance on the WGS84 ellipsoid between two points and returns the distance in uom::si::f64::Length
pub fn geodesic_distance_uom_units(p1: geo::Point, p2: geo::Point) -> uom::si::f64::Length {
    uom::si::f64::Length::new::<uom::si::length::meter>(geo::Geodesic.distance(p1, p2))
}
