#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Loads the taxi zone lookup table (`taxi_zone_lookup.csv`) into a
//! [`ZoneCalendar`].
//!
//! The lookup's headers are fixed by the publisher, so they are checked up
//! front and a missing header aborts the load with the full list of
//! columns that were found.

use std::io::Read;
use std::path::Path;

use taxi_demand_grid_models::MissingColumns;
use taxi_demand_zone_models::{ServiceZone, ZoneCalendar, ZoneInfo};

/// Header of the zone id column.
pub const COL_LOCATION_ID: &str = "LocationID";
/// Header of the borough column.
pub const COL_BOROUGH: &str = "Borough";
/// Header of the zone name column.
pub const COL_ZONE: &str = "Zone";
/// Header of the service class column.
pub const COL_SERVICE_ZONE: &str = "service_zone";

const REQUIRED: [&str; 4] = [COL_LOCATION_ID, COL_BOROUGH, COL_ZONE, COL_SERVICE_ZONE];

/// Errors that can occur while loading the zone lookup.
#[derive(Debug, thiserror::Error)]
pub enum ZoneError {
    /// The file could not be opened.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required header is missing.
    #[error(transparent)]
    Schema(#[from] MissingColumns),

    /// A row could not be interpreted.
    #[error("Invalid zone row {line}: {message}")]
    InvalidRow {
        /// 1-based line number in the file.
        line: u64,
        /// Description of what went wrong.
        message: String,
    },
}

/// Loads a zone calendar from a CSV file on disk.
///
/// # Errors
///
/// Returns [`ZoneError`] if the file cannot be read, a required header is
/// missing, or a zone id is not an integer.
pub fn load_zone_calendar(path: &Path) -> Result<ZoneCalendar, ZoneError> {
    log::info!("Loading zone lookup from {}", path.display());
    let file = std::fs::File::open(path)?;
    read_zone_calendar(file)
}

/// Reads a zone calendar from any CSV reader.
///
/// # Errors
///
/// Returns [`ZoneError`] if a required header is missing or a zone id is
/// not an integer.
pub fn read_zone_calendar<R: Read>(reader: R) -> Result<ZoneCalendar, ZoneError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let names: Vec<&str> = headers.iter().collect();
    MissingColumns::check("zones", &names, &REQUIRED)?;

    let index_of = |name: &str| headers.iter().position(|h| h == name).unwrap_or_default();
    let id_idx = index_of(COL_LOCATION_ID);
    let borough_idx = index_of(COL_BOROUGH);
    let zone_idx = index_of(COL_ZONE);
    let service_idx = index_of(COL_SERVICE_ZONE);

    let mut zones = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    for result in csv_reader.records() {
        let record = result?;
        let line = record.position().map_or(0, csv::Position::line);

        let raw_id = record.get(id_idx).unwrap_or_default();
        let zone_id = raw_id.parse::<u32>().map_err(|e| ZoneError::InvalidRow {
            line,
            message: format!("{COL_LOCATION_ID} '{raw_id}' is not an integer: {e}"),
        })?;

        if !seen.insert(zone_id) {
            log::warn!("Duplicate zone id {zone_id} on line {line}, keeping first occurrence");
            continue;
        }

        zones.push(ZoneInfo {
            zone_id,
            borough: record.get(borough_idx).unwrap_or_default().to_string(),
            zone_name: record.get(zone_idx).unwrap_or_default().to_string(),
            service_zone: ServiceZone::from_label(record.get(service_idx).unwrap_or_default()),
        });
    }

    let calendar = ZoneCalendar::from_zones(zones);
    log::info!("Loaded {} zones", calendar.len());
    Ok(calendar)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOKUP: &str = "\
\"LocationID\",\"Borough\",\"Zone\",\"service_zone\"
1,\"EWR\",\"Newark Airport\",\"EWR\"
132,\"Queens\",\"JFK Airport\",\"Airports\"
161,\"Manhattan\",\"Midtown Center\",\"Yellow Zone\"
264,\"Unknown\",\"N/A\",\"N/A\"
";

    #[test]
    fn loads_publisher_format() {
        let calendar = read_zone_calendar(LOOKUP.as_bytes()).unwrap();
        assert_eq!(calendar.len(), 4);
        let jfk = calendar.get(132).unwrap();
        assert_eq!(jfk.borough, "Queens");
        assert_eq!(jfk.zone_name, "JFK Airport");
        assert_eq!(jfk.service_zone, ServiceZone::Airports);
        assert_eq!(calendar.get(1).unwrap().service_zone, ServiceZone::Ewr);
        assert_eq!(calendar.zone_name(264), Some("N/A"));
    }

    #[test]
    fn missing_header_is_schema_error() {
        let input = "LocationID,Borough,Zone\n1,EWR,Newark Airport\n";
        let err = read_zone_calendar(input.as_bytes()).unwrap_err();
        match err {
            ZoneError::Schema(missing) => {
                assert_eq!(missing.missing, vec!["service_zone"]);
                assert_eq!(missing.present, vec!["LocationID", "Borough", "Zone"]);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn non_integer_id_is_rejected() {
        let input = "LocationID,Borough,Zone,service_zone\nabc,EWR,Newark Airport,EWR\n";
        let err = read_zone_calendar(input.as_bytes()).unwrap_err();
        assert!(matches!(err, ZoneError::InvalidRow { line: 2, .. }), "{err:?}");
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let input = "LocationID,Borough,Zone,service_zone\n7,Queens,Astoria,Boro Zone\n7,Queens,Other,Boro Zone\n";
        let calendar = read_zone_calendar(input.as_bytes()).unwrap();
        assert_eq!(calendar.len(), 1);
        assert_eq!(calendar.zone_name(7), Some("Astoria"));
    }
}
