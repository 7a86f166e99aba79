//! The distance accumulation pipeline: coerce, order per vessel, measure consecutive points, sum per month.

use crate::*;   // To use everything from the crate
use std::collections::BTreeMap;

/// Model of the earth used to measure the distance between two positions
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DistanceModel {
    /// Great circle on a sphere with the mean earth radius
    #[default]
    Haversine,
    /// Shortest path on the WGS84 ellipsoid
    Geodesic,
}

impl DistanceModel {
    /// Distance between two points, p = (longitude, latitude)
    pub fn distance(&self, p1: geo::Point, p2: geo::Point) -> uom::si::f64::Length {
        match self {
            DistanceModel::Haversine => haversine_distance_uom_units(p1, p2),
            DistanceModel::Geodesic => geodesic_distance_uom_units(p1, p2),
        }
    }
}

/// Turns position records into monthly travelled distances per vessel
#[derive(Debug, Copy, Clone, Default)]
pub struct DistanceAggregator {
    pub distance_model: DistanceModel,
}

impl DistanceAggregator {
    pub fn new(distance_model: DistanceModel) -> Self {
        DistanceAggregator { distance_model }
    }

    /// Derives every record's segment: the distance from the previous record of the same vessel.
    /// Segments are returned grouped by vessel (vessel ids ascending), each vessel in chronological order.
    /// Records with equal timestamps keep their input order.
    /// Fails on the first record, in input order, whose fields cannot be coerced.
    pub fn segments<R, S: FieldSelector<R>>(&self, records: &[R], selector: &S) -> Result<Vec<PositionSegment>> {
        // Coerce everything up front so a bad record aborts before any distance is computed
        let mut partitions: BTreeMap<String, Vec<ParsedPosition>> = BTreeMap::new();
        for (index, record) in records.iter().enumerate() {
            let position = ParsedPosition::parse(index, record, selector)?;
            partitions.entry(position.vessel_id.clone()).or_default().push(position);
        }
        tracing::debug!(records = records.len(), vessels = partitions.len(), "coerced position records");

        let mut segments: Vec<PositionSegment> = Vec::with_capacity(records.len());
        for (_, mut positions) in partitions {
            // sort_by_key is stable, ties stay in input order
            positions.sort_by_key(|p| p.timestamp);

            let mut previous: Option<geo::Point> = None;
            for position in positions {
                let segment_distance = match previous {
                    Some(p) => self.distance_model.distance(p, position.point),
                    None => uom::si::f64::Length::new::<uom::si::length::meter>(0.0),
                };

                segments.push(PositionSegment {
                    index: position.index,
                    year_month: YearMonth::from_date(position.timestamp.date()),
                    timestamp: position.timestamp,
                    latitude: position.point.y(),
                    longitude: position.point.x(),
                    previous_latitude: previous.map(|p| p.y()),
                    previous_longitude: previous.map(|p| p.x()),
                    segment_distance,
                    vessel_id: position.vessel_id,
                });

                previous = Some(position.point);
            }
        }

        Ok(segments)
    }

    /// Sums the segment distances per vessel and calendar month of the segment's later record.
    /// Rows are sorted by vessel id, then chronologically.
    pub fn aggregate<R, S: FieldSelector<R>>(&self, records: &[R], selector: &S) -> Result<Vec<MonthlyDistance>> {
        let segments = self.segments(records, selector)?;

        let mut totals: BTreeMap<(String, YearMonth), uom::si::f64::Length> = BTreeMap::new();
        for segment in segments {
            *totals
                .entry((segment.vessel_id, segment.year_month))
                .or_insert(uom::si::f64::Length::new::<uom::si::length::meter>(0.0)) += segment.segment_distance;
        }

        let rows: Vec<MonthlyDistance> = totals
            .into_iter()
            .map(|((vessel_id, year_month), total)| MonthlyDistance {
                vessel_id,
                year_month: year_month.to_string(),
                total_distance_km: total.get::<uom::si::length::kilometer>(),
            })
            .collect();

        tracing::info!(records = records.len(), rows = rows.len(), model = ?self.distance_model, "aggregated monthly distances");
        Ok(rows)
    }
}

/// Computes the total haversine distance per vessel and month for a set of position records.
/// # Example:
/// ```
/// use vessel_distance_logs::{compute_monthly_distances, PositionRecord};
///
/// let records = vec![
///     PositionRecord::new("A", "01/01/2023", "0.0", "0.0"),
///     PositionRecord::new("A", "15/01/2023", "0.0", "1.0"),
/// ];
/// let monthly = compute_monthly_distances(&records).unwrap();
/// assert_eq!(monthly.len(), 1);
/// assert_eq!(monthly[0].year_month, "2023-01");
/// ```
pub fn compute_monthly_distances(records: &[PositionRecord]) -> Result<Vec<MonthlyDistance>> {
    DistanceAggregator::default().aggregate(records, &PositionRecordFields)
}


// Coercion
//----------------------------------------------------
/// A record with its fields coerced, before it is placed in its vessel's track
#[derive(Debug)]
struct ParsedPosition {
    index: usize,
    vessel_id: String,
    timestamp: time::PrimitiveDateTime,
    point: geo::Point,
}

impl ParsedPosition {
    fn parse<R, S: FieldSelector<R>>(index: usize, record: &R, selector: &S) -> Result<ParsedPosition> {
        // The vessel id is needed first since every other error message carries it
        let raw_vessel_id = required(selector.vessel_id(record), index, "", PositionField::VesselId)?;
        if raw_vessel_id.trim().is_empty() {
            return Err(malformed(index, "", PositionField::VesselId, raw_vessel_id, "empty vessel id"));
        }
        // Ids are compared exactly, " A" and "A" are different vessels
        let vessel_id = raw_vessel_id.to_string();

        let timestamp_str = required(selector.timestamp(record), index, &vessel_id, PositionField::Timestamp)?;
        let latitude_str = required(selector.latitude(record), index, &vessel_id, PositionField::Latitude)?;
        let longitude_str = required(selector.longitude(record), index, &vessel_id, PositionField::Longitude)?;

        let timestamp = string_to_date_time(timestamp_str)
            .map_err(|reason| malformed(index, &vessel_id, PositionField::Timestamp, timestamp_str, &reason))?;
        let latitude = string_to_coordinate(latitude_str, 90.0)
            .map_err(|reason| malformed(index, &vessel_id, PositionField::Latitude, latitude_str, &reason))?;
        let longitude = string_to_coordinate(longitude_str, 180.0)
            .map_err(|reason| malformed(index, &vessel_id, PositionField::Longitude, longitude_str, &reason))?;

        Ok(ParsedPosition {
            index,
            vessel_id,
            timestamp,
            // geo points are (x, y) = (longitude, latitude)
            point: geo::Point::new(longitude, latitude),
        })
    }
}

fn required<'a>(value: Option<&'a str>, index: usize, vessel_id: &str, field: PositionField) -> Result<&'a str> {
    value.ok_or_else(|| malformed(index, vessel_id, field, "", "field missing from record"))
}

fn malformed(index: usize, vessel_id: &str, field: PositionField, value: &str, reason: &str) -> DistanceError {
    DistanceError::MalformedInput {
        index,
        vessel_id: vessel_id.to_string(),
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    fn rec(vessel: &str, timestamp: &str, lat: f64, lon: f64) -> PositionRecord {
        PositionRecord::new(vessel, timestamp, lat.to_string(), lon.to_string())
    }

    fn one_degree_at_equator_km() -> f64 {
        haversine_distance_uom_units(geo::Point::new(0.0, 0.0), geo::Point::new(1.0, 0.0))
            .get::<uom::si::length::kilometer>()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let monthly = compute_monthly_distances(&[]).unwrap();
        assert!(monthly.is_empty());
    }

    #[test]
    fn single_vessel_across_two_months() {
        let records = vec![
            rec("A", "01/01/2023", 0.0, 0.0),
            rec("A", "15/01/2023", 0.0, 1.0),
            rec("A", "01/02/2023", 0.0, 2.0),
        ];
        let monthly = compute_monthly_distances(&records).unwrap();
        let d = one_degree_at_equator_km();

        assert!((d - 111.19).abs() < 0.01);
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].vessel_id, "A");
        assert_eq!(monthly[0].year_month, "2023-01");
        assert_close(monthly[0].total_distance_km, d);
        assert_eq!(monthly[1].year_month, "2023-02");
        assert_close(monthly[1].total_distance_km, d);
    }

    #[test]
    fn first_record_of_each_vessel_has_zero_distance() {
        let records = vec![
            rec("B", "03/01/2023", 10.0, 10.0),
            rec("A", "02/01/2023", 0.0, 1.0),
            rec("A", "01/01/2023", 0.0, 0.0),
            rec("B", "02/01/2023", 11.0, 10.0),
        ];
        let segments = DistanceAggregator::default().segments(&records, &PositionRecordFields).unwrap();

        let first_a = segments.iter().find(|s| s.vessel_id == "A").unwrap();
        let first_b = segments.iter().find(|s| s.vessel_id == "B").unwrap();
        assert_eq!(first_a.index, 2);
        assert_eq!(first_a.segment_distance_km(), 0.0);
        assert_eq!(first_a.previous_latitude, None);
        assert_eq!(first_b.index, 3);
        assert_eq!(first_b.segment_distance_km(), 0.0);
        assert_eq!(first_b.previous_longitude, None);
    }

    #[test]
    fn segments_carry_previous_coordinates() {
        let records = vec![rec("A", "01/01/2023", 1.5, 2.5), rec("A", "02/01/2023", 3.0, 4.0)];
        let segments = DistanceAggregator::default().segments(&records, &PositionRecordFields).unwrap();

        assert_eq!(segments[1].previous_latitude, Some(1.5));
        assert_eq!(segments[1].previous_longitude, Some(2.5));
        assert_eq!(segments[1].year_month, YearMonth::new(2023, 1));
        assert!(segments[1].segment_distance_km() > 0.0);
    }

    #[test]
    fn single_point_vessel_gets_one_zero_row() {
        let records = vec![rec("solo", "20/06/2023 08:00", 43.0, -3.0)];
        let monthly = compute_monthly_distances(&records).unwrap();
        assert_eq!(
            monthly,
            vec![MonthlyDistance { vessel_id: "solo".to_string(), year_month: "2023-06".to_string(), total_distance_km: 0.0 }]
        );
    }

    #[test]
    fn month_boundary_segment_goes_to_later_month() {
        let records = vec![
            rec("A", "31/01/2023 23:00", 0.0, 0.0),
            rec("A", "01/02/2023 01:00", 0.0, 1.0),
        ];
        let monthly = compute_monthly_distances(&records).unwrap();

        assert_eq!(monthly[0].year_month, "2023-01");
        assert_eq!(monthly[0].total_distance_km, 0.0);
        assert_eq!(monthly[1].year_month, "2023-02");
        assert_close(monthly[1].total_distance_km, one_degree_at_equator_km());
    }

    #[test]
    fn equal_timestamps_keep_input_order() {
        let records = vec![
            rec("A", "01/01/2023", 0.0, 0.0),
            rec("A", "02/01/2023", 0.0, 2.0),
            rec("A", "02/01/2023", 0.0, 1.0),
        ];
        let segments = DistanceAggregator::default().segments(&records, &PositionRecordFields).unwrap();

        // (0,0) -> (0,2) -> (0,1): two degrees then one degree
        let indices: Vec<usize> = segments.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let d = one_degree_at_equator_km();
        assert!((segments[1].segment_distance_km() - 2.0 * d).abs() < 1e-6);
        assert!((segments[2].segment_distance_km() - d).abs() < 1e-6);
    }

    #[test]
    fn permuted_input_gives_identical_totals() {
        let mut records = vec![
            rec("A", "01/01/2023", 0.0, 0.0),
            rec("A", "05/01/2023", 0.5, 0.7),
            rec("A", "11/02/2023", 1.0, 1.2),
            rec("A", "28/02/2023", 1.4, 1.1),
            rec("B", "02/01/2023", 60.0, 5.0),
            rec("B", "09/03/2023", 61.0, 6.0),
            rec("B", "10/03/2023", 61.5, 6.5),
            rec("C", "15/12/2022", -33.9, 18.4),
            rec("C", "15/01/2023", -34.1, 18.9),
        ];
        let expected = compute_monthly_distances(&records).unwrap();

        let mut rng = StdRng::seed_from_u64(2023);
        for _ in 0..10 {
            records.shuffle(&mut rng);
            assert_eq!(compute_monthly_distances(&records).unwrap(), expected);
        }
    }

    #[test]
    fn interleaved_vessels_match_independent_runs() {
        let a = vec![
            rec("A", "01/03/2023", 10.0, 10.0),
            rec("A", "03/03/2023", 10.5, 10.5),
            rec("A", "05/04/2023", 11.0, 10.0),
        ];
        let b = vec![
            rec("B", "02/03/2023", -5.0, 120.0),
            rec("B", "04/03/2023", -5.5, 121.0),
            rec("B", "06/04/2023", -6.0, 121.5),
        ];
        let interleaved: Vec<PositionRecord> = a.iter().zip(b.iter()).flat_map(|(x, y)| [x.clone(), y.clone()]).collect();

        let mut independent = compute_monthly_distances(&a).unwrap();
        independent.extend(compute_monthly_distances(&b).unwrap());

        assert_eq!(compute_monthly_distances(&interleaved).unwrap(), independent);
    }

    #[test]
    fn output_has_one_row_per_vessel_month_in_input() {
        let records = vec![
            rec("A", "01/01/2023", 0.0, 0.0),
            rec("A", "02/01/2023", 0.1, 0.0),
            rec("A", "01/03/2023", 0.2, 0.0),
            rec("B", "01/03/2023", 0.0, 0.0),
            rec("B", "01/03/2024", 0.0, 0.3),
        ];
        let keys: Vec<(String, String)> = compute_monthly_distances(&records)
            .unwrap()
            .into_iter()
            .map(|m| (m.vessel_id, m.year_month))
            .collect();

        let expected: Vec<(String, String)> = [("A", "2023-01"), ("A", "2023-03"), ("B", "2023-03"), ("B", "2024-03")]
            .iter()
            .map(|(v, ym)| (v.to_string(), ym.to_string()))
            .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn totals_are_never_negative() {
        let records = vec![
            rec("A", "01/01/2023", 89.9, 179.9),
            rec("A", "02/01/2023", -89.9, -179.9),
            rec("A", "03/01/2023", 0.0, -180.0),
            rec("A", "04/01/2023", 0.0, 180.0),
        ];
        let segments = DistanceAggregator::default().segments(&records, &PositionRecordFields).unwrap();
        assert!(segments.iter().all(|s| s.segment_distance_km() >= 0.0));
        let monthly = compute_monthly_distances(&records).unwrap();
        assert!(monthly.iter().all(|m| m.total_distance_km >= 0.0));
    }

    #[test]
    fn non_numeric_longitude_is_malformed_input() {
        let records = vec![
            rec("A", "01/01/2023", 0.0, 0.0),
            PositionRecord::new("A", "02/01/2023", "0.0", "not_a_number"),
        ];
        let err = compute_monthly_distances(&records).unwrap_err();
        match err {
            DistanceError::MalformedInput { index, vessel_id, field, value, .. } => {
                assert_eq!(index, 1);
                assert_eq!(vessel_id, "A");
                assert_eq!(field, PositionField::Longitude);
                assert_eq!(value, "not_a_number");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn out_of_range_latitude_is_malformed_input() {
        let records = vec![PositionRecord::new("A", "01/01/2023", "90.5", "0.0")];
        let err = compute_monthly_distances(&records).unwrap_err();
        assert!(matches!(err, DistanceError::MalformedInput { field: PositionField::Latitude, .. }));
    }

    #[test]
    fn unparseable_timestamp_is_malformed_input() {
        let records = vec![PositionRecord::new("A", "31/02/2023", "0.0", "0.0")];
        let err = compute_monthly_distances(&records).unwrap_err();
        assert!(matches!(err, DistanceError::MalformedInput { field: PositionField::Timestamp, index: 0, .. }));
    }

    #[test]
    fn first_bad_record_in_input_order_is_reported() {
        let records = vec![
            rec("A", "01/01/2023", 0.0, 0.0),
            PositionRecord::new("B", "yesterday", "0.0", "0.0"),
            PositionRecord::new("A", "02/01/2023", "x", "0.0"),
        ];
        let err = compute_monthly_distances(&records).unwrap_err();
        assert!(matches!(err, DistanceError::MalformedInput { index: 1, .. }));
    }

    #[test]
    fn missing_field_from_selector_is_malformed_input() {
        let headers = csv::StringRecord::from(vec!["Nombre", "Fecha", "Latitud", "Longitud"]);
        let selector = ColumnSelector::from_headers(&headers, &ColumnNames::default()).unwrap();
        let records = vec![
            csv::StringRecord::from(vec!["A", "01/01/2023", "0.0", "0.0"]),
            csv::StringRecord::from(vec!["A", "02/01/2023", "0.0"]),
        ];
        let err = DistanceAggregator::default().aggregate(&records, &selector).unwrap_err();
        assert!(matches!(err, DistanceError::MalformedInput { index: 1, field: PositionField::Longitude, .. }));
    }

    #[test]
    fn geodesic_model_is_close_to_haversine() {
        let records = vec![
            rec("A", "01/01/2023", 43.36, -8.41),
            rec("A", "09/01/2023", 36.53, -6.29),
            rec("A", "19/01/2023", 28.13, -15.43),
        ];
        let haversine = DistanceAggregator::new(DistanceModel::Haversine).aggregate(&records, &PositionRecordFields).unwrap();
        let geodesic = DistanceAggregator::new(DistanceModel::Geodesic).aggregate(&records, &PositionRecordFields).unwrap();

        let h = haversine[0].total_distance_km;
        let g = geodesic[0].total_distance_km;
        assert!(h > 0.0);
        assert!((h - g).abs() / h < 0.005, "haversine {} geodesic {}", h, g);
    }

    #[test]
    fn empty_vessel_id_is_malformed_input() {
        let records = vec![rec("", "01/01/2023", 0.0, 0.0), rec("  ", "02/01/2023", 0.0, 1.0)];
        let err = compute_monthly_distances(&records).unwrap_err();
        match err {
            DistanceError::MalformedInput { index, field, value, .. } => {
                assert_eq!(index, 0);
                assert_eq!(field, PositionField::VesselId);
                assert_eq!(value, "");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let blank = vec![rec("A", "01/01/2023", 0.0, 0.0), rec("  ", "02/01/2023", 0.0, 1.0)];
        let err = compute_monthly_distances(&blank).unwrap_err();
        assert!(matches!(err, DistanceError::MalformedInput { index: 1, field: PositionField::VesselId, .. }));
    }

    #[test]
    fn vessel_ids_are_compared_exactly() {
        let records = vec![rec("A", "01/01/2023", 0.0, 0.0), rec(" A", "02/01/2023", 0.0, 1.0)];
        let monthly = compute_monthly_distances(&records).unwrap();

        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].vessel_id, " A");
        assert_eq!(monthly[1].vessel_id, "A");
        assert!(monthly.iter().all(|m| m.total_distance_km == 0.0));
    }

    #[test]
    fn early_years_keep_four_digit_key() {
        let records = vec![rec("A", "01/01/0999", 0.0, 0.0)];
        let monthly = compute_monthly_distances(&records).unwrap();
        assert_eq!(monthly[0].year_month, "0999-01");
    }

    #[test]
    fn input_is_left_untouched() {
        let records = vec![rec("A", "02/01/2023", 0.0, 1.0), rec("A", "01/01/2023", 0.0, 0.0)];
        let before = records.clone();
        compute_monthly_distances(&records).unwrap();
        assert_eq!(records, before);
    }
}
