//! Trip file readers.
//!
//! Source files name their columns differently (yellow vs. green taxi
//! exports, hand-made CSV extracts). A [`ColumnMapping`] declares which
//! source column feeds each trip field; nothing is guessed at runtime. All
//! mapped columns are checked before any row is read.

use std::io::Read;
use std::path::Path;

use duckdb::Connection;
use serde::{Deserialize, Serialize};
use taxi_demand_grid_models::{MissingColumns, TripEvent};

use crate::GridError;
use crate::parsing::{parse_finite, parse_zone_id};

/// Declared mapping from source column names onto trip fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    /// Source column holding the pickup timestamp.
    pub pickup_ts: String,
    /// Source column holding the dropoff timestamp.
    pub dropoff_ts: String,
    /// Source column holding the origin zone id.
    pub zone_id: String,
    /// Source column holding the trip distance.
    pub trip_distance: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::yellow_taxi()
    }
}

impl ColumnMapping {
    /// Column names used by the yellow taxi trip records.
    #[must_use]
    pub fn yellow_taxi() -> Self {
        Self {
            pickup_ts: "tpep_pickup_datetime".to_string(),
            dropoff_ts: "tpep_dropoff_datetime".to_string(),
            zone_id: "PULocationID".to_string(),
            trip_distance: "trip_distance".to_string(),
        }
    }

    /// Identity mapping for files already using the trip field names.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            pickup_ts: "pickup_ts".to_string(),
            dropoff_ts: "dropoff_ts".to_string(),
            zone_id: "zone_id".to_string(),
            trip_distance: "trip_distance".to_string(),
        }
    }

    /// Source columns in trip field order.
    #[must_use]
    pub fn source_columns(&self) -> [&str; 4] {
        [
            self.pickup_ts.as_str(),
            self.dropoff_ts.as_str(),
            self.zone_id.as_str(),
            self.trip_distance.as_str(),
        ]
    }
}

/// On-disk format of a trip file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripFormat {
    /// Apache Parquet, read through `DuckDB`.
    #[default]
    Parquet,
    /// Comma-separated values with a header row.
    Csv,
}

/// Loads every trip from a file of the given format.
///
/// # Errors
///
/// Returns [`GridError`] if the file cannot be read or a mapped column is
/// missing.
pub fn load_trips(
    path: &Path,
    format: TripFormat,
    mapping: &ColumnMapping,
) -> Result<Vec<TripEvent>, GridError> {
    log::info!("Reading {format:?} trips from {}", path.display());
    let trips = match format {
        TripFormat::Parquet => load_trips_parquet(path, mapping)?,
        TripFormat::Csv => read_trips_csv(std::fs::File::open(path)?, mapping)?,
    };
    log::info!("Read {} raw trips", trips.len());
    Ok(trips)
}

/// Reads trips from CSV.
///
/// Empty cells become `None`. Zone ids and distances that are not numeric
/// also become `None` so that cleaning can count them.
///
/// # Errors
///
/// Returns [`GridError::Schema`] if a mapped column is missing, or
/// [`GridError::Csv`] if the CSV is structurally malformed.
pub fn read_trips_csv<R: Read>(
    reader: R,
    mapping: &ColumnMapping,
) -> Result<Vec<TripEvent>, GridError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let present: Vec<&str> = headers.iter().collect();
    MissingColumns::check("trips", &present, &mapping.source_columns())?;

    let [pickup_idx, dropoff_idx, zone_idx, distance_idx] =
        mapping.source_columns().map(|name| {
            headers
                .iter()
                .position(|h| h == name)
                .unwrap_or_default()
        });

    let mut trips = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let cell = |idx: usize| record.get(idx).filter(|v| !v.is_empty());
        trips.push(TripEvent {
            pickup_ts: cell(pickup_idx).map(str::to_string),
            dropoff_ts: cell(dropoff_idx).map(str::to_string),
            zone_id: cell(zone_idx).and_then(parse_zone_id),
            trip_distance: cell(distance_idx).and_then(parse_finite),
        });
    }

    Ok(trips)
}

/// Reads trips from a Parquet file through an in-memory `DuckDB`
/// connection.
///
/// Timestamps are cast to text so that they go through the same coercion
/// as CSV input. Zone ids and distances use `TRY_CAST`, which yields `NULL`
/// for values that cannot be converted.
///
/// # Errors
///
/// Returns [`GridError::Schema`] if a mapped column is missing, or
/// [`GridError::DuckDb`] if the file cannot be scanned.
pub fn load_trips_parquet(path: &Path, mapping: &ColumnMapping) -> Result<Vec<TripEvent>, GridError> {
    let conn = Connection::open_in_memory()?;
    let source = format!(
        "read_parquet('{}')",
        path.to_string_lossy().replace('\'', "''")
    );

    let present = {
        let mut stmt = conn.prepare(&format!("DESCRIBE SELECT * FROM {source}"))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
        names.collect::<Result<Vec<_>, _>>()?
    };
    MissingColumns::check("trips", &present, &mapping.source_columns())?;

    let [pickup, dropoff, zone, distance] = mapping.source_columns().map(quote_ident);
    let sql = format!(
        "SELECT CAST({pickup} AS VARCHAR), CAST({dropoff} AS VARCHAR), \
                TRY_CAST({zone} AS BIGINT), TRY_CAST({distance} AS DOUBLE) \
         FROM {source}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        let zone_id: Option<i64> = row.get(2)?;
        let trip_distance: Option<f64> = row.get(3)?;
        Ok(TripEvent {
            pickup_ts: row.get(0)?,
            dropoff_ts: row.get(1)?,
            zone_id: zone_id.and_then(|z| u32::try_from(z).ok()),
            trip_distance: trip_distance.filter(|d| d.is_finite()),
        })
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_mapped_csv_columns() {
        let input = "\
VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,trip_distance,PULocationID
2,2024-01-01 00:57:55,2024-01-01 01:17:43,1.72,186
1,2024-01-01 00:03:00,2024-01-01 00:09:36,,140
1,,2024-01-01 00:09:36,2.5,abc
";
        let trips = read_trips_csv(input.as_bytes(), &ColumnMapping::yellow_taxi()).unwrap();
        assert_eq!(trips.len(), 3);
        assert_eq!(
            trips[0],
            TripEvent::new("2024-01-01 00:57:55", "2024-01-01 01:17:43", 186, 1.72)
        );
        assert_eq!(trips[1].trip_distance, None);
        assert_eq!(trips[1].zone_id, Some(140));
        assert_eq!(trips[2].pickup_ts, None);
        assert_eq!(trips[2].zone_id, None);
    }

    #[test]
    fn missing_mapped_column_lists_present_columns() {
        let input = "tpep_pickup_datetime,PULocationID\n2024-01-01 00:57:55,186\n";
        let err = read_trips_csv(input.as_bytes(), &ColumnMapping::yellow_taxi()).unwrap_err();
        match err {
            GridError::Schema(missing) => {
                assert_eq!(missing.stage, "trips");
                assert_eq!(
                    missing.missing,
                    vec!["tpep_dropoff_datetime", "trip_distance"]
                );
                assert_eq!(missing.present, vec!["tpep_pickup_datetime", "PULocationID"]);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn identity_mapping_reads_trip_field_names() {
        let input = "pickup_ts,dropoff_ts,zone_id,trip_distance\n2024-01-01 00:00:00,2024-01-01 00:10:00,7,1.0\n";
        let trips = read_trips_csv(input.as_bytes(), &ColumnMapping::identity()).unwrap();
        assert_eq!(trips[0].zone_id, Some(7));
    }

    #[test]
    fn mapping_deserializes_with_defaults() {
        let mapping: ColumnMapping = serde_json::from_str(r#"{"zone_id":"DOLocationID"}"#).unwrap();
        assert_eq!(mapping.zone_id, "DOLocationID");
        assert_eq!(mapping.pickup_ts, "tpep_pickup_datetime");
    }

    #[test]
    fn load_trips_reads_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trips.csv");
        std::fs::write(
            &path,
            "pickup_ts,dropoff_ts,zone_id,trip_distance\n2024-01-01 00:00:00,2024-01-01 00:10:00,7,1.0\n",
        )
        .unwrap();
        let trips = load_trips(&path, TripFormat::Csv, &ColumnMapping::identity()).unwrap();
        assert_eq!(trips.len(), 1);
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("PULocationID"), "\"PULocationID\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
