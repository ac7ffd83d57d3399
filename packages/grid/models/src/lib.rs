#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Trip event and demand panel types.
//!
//! Raw [`TripEvent`]s are aggregated into a panel of [`DemandRecord`]s, one
//! per observed (zone, hour). These types are shared by every downstream
//! stage; the [`PanelRow`] trait lets temporal operators (splitting, the
//! baseline) work over both the raw panel and the feature panel.

pub mod timestamp;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Field names of a trip event, as required at the input boundary.
pub const TRIP_FIELDS: [&str; 4] = ["pickup_ts", "dropoff_ts", "zone_id", "trip_distance"];

/// Field names of a persisted demand panel.
pub const DEMAND_FIELDS: [&str; 5] = [
    "zone_id",
    "hour_timestamp",
    "pickup_count",
    "borough",
    "zone_name",
];

/// A single raw trip as read from a trip file.
///
/// Timestamps are kept as text because coercing them is the first cleaning
/// step; a value that fails to parse is counted, not fatal. Zone id and
/// distance are `None` when the source value was missing or not numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEvent {
    /// Pickup timestamp as text.
    pub pickup_ts: Option<String>,
    /// Dropoff timestamp as text.
    pub dropoff_ts: Option<String>,
    /// Origin zone id.
    pub zone_id: Option<u32>,
    /// Trip distance in miles.
    pub trip_distance: Option<f64>,
}

impl TripEvent {
    /// Convenience constructor for a fully populated event.
    #[must_use]
    pub fn new(pickup_ts: &str, dropoff_ts: &str, zone_id: u32, trip_distance: f64) -> Self {
        Self {
            pickup_ts: Some(pickup_ts.to_string()),
            dropoff_ts: Some(dropoff_ts.to_string()),
            zone_id: Some(zone_id),
            trip_distance: Some(trip_distance),
        }
    }
}

/// Pickup count for one zone in one hour.
///
/// `hour_timestamp` is always aligned to the hour boundary, and
/// `(zone_id, hour_timestamp)` is unique within a panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandRecord {
    /// Origin zone id.
    pub zone_id: u32,
    /// Start of the hour bucket.
    #[serde(with = "timestamp")]
    pub hour_timestamp: NaiveDateTime,
    /// Number of pickups in the hour.
    pub pickup_count: u32,
    /// Borough of the zone; `None` when the zone is missing from the lookup.
    pub borough: Option<String>,
    /// Display name of the zone; `None` when the zone is missing from the lookup.
    pub zone_name: Option<String>,
}

/// Minimal view of a panel row used by temporal operators.
pub trait PanelRow {
    /// Zone the row belongs to.
    fn zone_id(&self) -> u32;

    /// Start of the hour bucket.
    fn hour_timestamp(&self) -> NaiveDateTime;

    /// Observed pickups in the hour.
    fn pickup_count(&self) -> u32;

    /// Calendar position of the row.
    fn calendar(&self) -> CalendarSlot {
        CalendarSlot::of(self.hour_timestamp())
    }
}

impl PanelRow for DemandRecord {
    fn zone_id(&self) -> u32 {
        self.zone_id
    }

    fn hour_timestamp(&self) -> NaiveDateTime {
        self.hour_timestamp
    }

    fn pickup_count(&self) -> u32 {
        self.pickup_count
    }
}

/// Calendar position of an hour timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarSlot {
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Day of week, 0 = Monday .. 6 = Sunday.
    pub day_of_week: u8,
    /// Hour of week, `day_of_week * 24 + hour`, 0-167.
    pub hour_of_week: u8,
}

impl CalendarSlot {
    /// Number of distinct hour-of-week slots.
    pub const HOURS_PER_WEEK: u8 = 168;

    /// Computes the calendar slot of a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn of(ts: NaiveDateTime) -> Self {
        let hour = ts.hour() as u8;
        let day_of_week = ts.weekday().num_days_from_monday() as u8;
        Self {
            hour,
            day_of_week,
            hour_of_week: day_of_week * 24 + hour,
        }
    }

    /// Saturday and Sunday.
    #[must_use]
    pub const fn is_weekend(self) -> bool {
        self.day_of_week >= 5
    }
}

/// Why a raw trip was dropped during cleaning.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    /// Pickup timestamp missing or not parseable.
    UnparseablePickup,
    /// Dropoff timestamp missing or not parseable.
    UnparseableDropoff,
    /// Origin zone id missing or not numeric.
    MissingZone,
    /// Dropoff at or before pickup.
    NonPositiveDuration,
    /// Trip lasted 240 minutes or more.
    ExcessiveDuration,
    /// Distance missing, zero, or negative.
    NonPositiveDistance,
    /// Pickup outside the requested month.
    OutsideMonth,
}

/// Observability summary of a grid build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningSummary {
    /// Raw trips received.
    pub rows_before: u64,
    /// Trips that passed every filter.
    pub rows_after: u64,
    /// Trips dropped by any filter.
    pub rows_dropped: u64,
    /// Dropped trips per reason.
    pub drop_reasons: BTreeMap<DropReason, u64>,
    /// Zone ids present in trips but absent from the zone lookup.
    pub unmatched_zone_ids: Vec<u32>,
    /// Rows in the aggregated panel.
    pub panel_rows: u64,
    /// Distinct zones in the aggregated panel.
    pub unique_zones: u64,
    /// Zero-count rows added by densification.
    pub zero_filled_rows: u64,
}

impl CleaningSummary {
    /// Records a dropped trip.
    pub fn record_drop(&mut self, reason: DropReason) {
        self.rows_dropped += 1;
        *self.drop_reasons.entry(reason).or_insert(0) += 1;
    }

    /// Count for a single drop reason.
    #[must_use]
    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        self.drop_reasons.get(&reason).copied().unwrap_or(0)
    }

    /// Fraction of raw trips kept, or `None` for an empty input.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn retention_ratio(&self) -> Option<f64> {
        if self.rows_before == 0 {
            None
        } else {
            Some(self.rows_after as f64 / self.rows_before as f64)
        }
    }
}

/// Error returned when an input table lacks required columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingColumns {
    /// Stage or table that performed the check (e.g. `"trips"`).
    pub stage: String,
    /// Required columns that were not found.
    pub missing: Vec<String>,
    /// Columns that were actually present.
    pub present: Vec<String>,
}

impl MissingColumns {
    /// Checks `present` against `required`, returning every missing name
    /// at once.
    ///
    /// # Errors
    ///
    /// Returns [`MissingColumns`] if any required column is absent.
    pub fn check<S: AsRef<str>>(stage: &str, present: &[S], required: &[&str]) -> Result<(), Self> {
        let missing: Vec<String> = required
            .iter()
            .filter(|name| !present.iter().any(|p| p.as_ref() == **name))
            .map(|name| (*name).to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Self {
                stage: stage.to_string(),
                missing,
                present: present.iter().map(|p| p.as_ref().to_string()).collect(),
            })
        }
    }
}

impl std::fmt::Display for MissingColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: missing required columns [{}]; columns present: [{}]",
            self.stage,
            self.missing.join(", "),
            self.present.join(", ")
        )
    }
}

impl std::error::Error for MissingColumns {}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .unwrap()
    }

    #[test]
    fn calendar_slot_monday_midnight() {
        // 2024-01-01 is a Monday.
        let slot = CalendarSlot::of(at(1, 0));
        assert_eq!(slot.day_of_week, 0);
        assert_eq!(slot.hour, 0);
        assert_eq!(slot.hour_of_week, 0);
        assert!(!slot.is_weekend());
    }

    #[test]
    fn calendar_slot_sunday_last_hour() {
        let slot = CalendarSlot::of(at(7, 23));
        assert_eq!(slot.day_of_week, 6);
        assert_eq!(slot.hour_of_week, 167);
        assert!(slot.is_weekend());
    }

    #[test]
    fn calendar_slot_saturday_is_weekend() {
        let slot = CalendarSlot::of(at(6, 12));
        assert_eq!(slot.day_of_week, 5);
        assert!(slot.is_weekend());
    }

    #[test]
    fn missing_columns_lists_everything() {
        let present = vec!["zone_id".to_string(), "foo".to_string()];
        let err = MissingColumns::check("trips", &present, &TRIP_FIELDS).unwrap_err();
        assert_eq!(err.missing, vec!["pickup_ts", "dropoff_ts", "trip_distance"]);
        assert_eq!(err.present, present);
        let msg = err.to_string();
        assert!(msg.contains("pickup_ts"), "{msg}");
        assert!(msg.contains("foo"), "{msg}");
    }

    #[test]
    fn missing_columns_passes_when_complete() {
        assert!(MissingColumns::check("trips", &TRIP_FIELDS, &TRIP_FIELDS).is_ok());
    }

    #[test]
    fn retention_ratio_handles_empty_input() {
        let summary = CleaningSummary::default();
        assert!(summary.retention_ratio().is_none());
    }

    #[test]
    fn record_drop_counts_per_reason() {
        let mut summary = CleaningSummary {
            rows_before: 4,
            rows_after: 2,
            ..CleaningSummary::default()
        };
        summary.record_drop(DropReason::MissingZone);
        summary.record_drop(DropReason::MissingZone);
        assert_eq!(summary.rows_dropped, 2);
        assert_eq!(summary.dropped_for(DropReason::MissingZone), 2);
        assert_eq!(summary.dropped_for(DropReason::OutsideMonth), 0);
        assert!((summary.retention_ratio().unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn drop_reason_display_is_snake_case() {
        assert_eq!(DropReason::NonPositiveDistance.to_string(), "non_positive_distance");
        assert_eq!(
            "excessive_duration".parse::<DropReason>().unwrap(),
            DropReason::ExcessiveDuration
        );
    }

    #[test]
    fn demand_record_csv_uses_space_separated_timestamp() {
        let record = DemandRecord {
            zone_id: 7,
            hour_timestamp: at(3, 14),
            pickup_count: 12,
            borough: None,
            zone_name: Some("Astoria".to_string()),
        };
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(&record).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "zone_id,hour_timestamp,pickup_count,borough,zone_name\n7,2024-01-03 14:00:00,12,,Astoria\n"
        );

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let back: DemandRecord = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(back, record);
    }
}
