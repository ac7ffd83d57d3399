//! Aggregates cleaned trips into the zone-by-hour demand panel.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, TimeDelta};
use taxi_demand_grid_models::{CleaningSummary, DemandRecord, DropReason, TripEvent};
use taxi_demand_zone_models::ZoneCalendar;

use crate::parsing::{duration_minutes, floor_to_hour, parse_trip_timestamp};

/// Trips lasting this many minutes or longer are treated as meter errors.
pub const MAX_TRIP_MINUTES: f64 = 240.0;

/// A built panel together with its cleaning summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandGrid {
    /// Demand records sorted by `(zone_id, hour_timestamp)`.
    pub panel: Vec<DemandRecord>,
    /// What cleaning kept, dropped, and why.
    pub summary: CleaningSummary,
}

impl DemandGrid {
    /// Materializes zero-count rows for every hour between the panel's
    /// first and last hour, for every zone in the panel, and records how
    /// many rows were added.
    #[must_use]
    pub fn densify(self, calendar: &ZoneCalendar) -> Self {
        let panel = densify_panel(&self.panel, calendar);
        let added = (panel.len() - self.panel.len()) as u64;
        log::info!(
            "Zero-filled {added} (zone, hour) rows; panel now has {} rows",
            panel.len()
        );
        Self {
            summary: CleaningSummary {
                panel_rows: panel.len() as u64,
                zero_filled_rows: self.summary.zero_filled_rows + added,
                ..self.summary
            },
            panel,
        }
    }
}

/// Converts raw trips into a sparse demand panel.
#[derive(Debug, Clone)]
pub struct DemandGridBuilder<'a> {
    calendar: &'a ZoneCalendar,
    window: Option<(NaiveDateTime, NaiveDateTime)>,
}

impl<'a> DemandGridBuilder<'a> {
    /// Creates a builder that labels zones from `calendar`.
    #[must_use]
    pub const fn new(calendar: &'a ZoneCalendar) -> Self {
        Self {
            calendar,
            window: None,
        }
    }

    /// Drops trips whose pickup falls outside `[start, end)`.
    #[must_use]
    pub const fn clip_to(mut self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        self.window = Some((start, end));
        self
    }

    /// Cleans, buckets, and counts `trips`.
    ///
    /// Each rejected trip is counted under exactly one [`DropReason`],
    /// checked in the order the variants are declared. An input with no
    /// surviving trips yields an empty panel.
    #[must_use]
    pub fn build(&self, trips: &[TripEvent]) -> DemandGrid {
        let mut summary = CleaningSummary {
            rows_before: trips.len() as u64,
            ..CleaningSummary::default()
        };

        let mut counts: BTreeMap<(u32, NaiveDateTime), u32> = BTreeMap::new();
        for trip in trips {
            match self.classify(trip) {
                Ok((zone_id, pickup)) => {
                    *counts.entry((zone_id, floor_to_hour(pickup))).or_insert(0) += 1;
                    summary.rows_after += 1;
                }
                Err(reason) => summary.record_drop(reason),
            }
        }

        let mut unmatched = BTreeSet::new();
        let panel: Vec<DemandRecord> = counts
            .into_iter()
            .map(|((zone_id, hour_timestamp), pickup_count)| {
                let info = self.calendar.get(zone_id);
                if info.is_none() {
                    unmatched.insert(zone_id);
                }
                DemandRecord {
                    zone_id,
                    hour_timestamp,
                    pickup_count,
                    borough: info.map(|z| z.borough.clone()),
                    zone_name: info.map(|z| z.zone_name.clone()),
                }
            })
            .collect();

        summary.panel_rows = panel.len() as u64;
        summary.unique_zones = panel
            .iter()
            .map(|r| r.zone_id)
            .collect::<BTreeSet<_>>()
            .len() as u64;
        summary.unmatched_zone_ids = unmatched.into_iter().collect();

        log_summary(&summary);

        DemandGrid { panel, summary }
    }

    fn classify(&self, trip: &TripEvent) -> Result<(u32, NaiveDateTime), DropReason> {
        let pickup = trip
            .pickup_ts
            .as_deref()
            .and_then(parse_trip_timestamp)
            .ok_or(DropReason::UnparseablePickup)?;
        let dropoff = trip
            .dropoff_ts
            .as_deref()
            .and_then(parse_trip_timestamp)
            .ok_or(DropReason::UnparseableDropoff)?;
        let zone_id = trip.zone_id.ok_or(DropReason::MissingZone)?;

        let minutes = duration_minutes(pickup, dropoff);
        if minutes <= 0.0 {
            return Err(DropReason::NonPositiveDuration);
        }
        if minutes >= MAX_TRIP_MINUTES {
            return Err(DropReason::ExcessiveDuration);
        }
        if !trip.trip_distance.is_some_and(|d| d > 0.0) {
            return Err(DropReason::NonPositiveDistance);
        }
        if let Some((start, end)) = self.window
            && (pickup < start || pickup >= end)
        {
            return Err(DropReason::OutsideMonth);
        }

        Ok((zone_id, pickup))
    }
}

fn log_summary(summary: &CleaningSummary) {
    log::info!(
        "Cleaned trips: {} in, {} kept, {} dropped",
        summary.rows_before,
        summary.rows_after,
        summary.rows_dropped
    );
    for (reason, count) in &summary.drop_reasons {
        log::warn!("Dropped {count} trips: {reason}");
    }
    if !summary.unmatched_zone_ids.is_empty() {
        log::warn!(
            "{} zone ids missing from the zone lookup: {:?}",
            summary.unmatched_zone_ids.len(),
            summary.unmatched_zone_ids
        );
    }
    if summary.panel_rows == 0 {
        log::warn!("No trips survived cleaning; the demand panel is empty");
    } else {
        log::info!(
            "Demand panel: {} rows across {} zones",
            summary.panel_rows,
            summary.unique_zones
        );
    }
}

/// Returns a dense copy of `panel`.
///
/// Every zone present in `panel` gets one row per hour from the panel's
/// global first hour through its global last hour. Observed rows are kept
/// as-is; added rows have a zero count and take their zone attributes from
/// `calendar`. The result is sorted by `(zone_id, hour_timestamp)`.
#[must_use]
pub fn densify_panel(panel: &[DemandRecord], calendar: &ZoneCalendar) -> Vec<DemandRecord> {
    let Some(first) = panel.iter().map(|r| r.hour_timestamp).min() else {
        return Vec::new();
    };
    let last = panel.iter().map(|r| r.hour_timestamp).max().unwrap_or(first);

    let observed: BTreeMap<(u32, NaiveDateTime), &DemandRecord> = panel
        .iter()
        .map(|r| ((r.zone_id, r.hour_timestamp), r))
        .collect();
    let zones: BTreeSet<u32> = panel.iter().map(|r| r.zone_id).collect();

    let mut dense = Vec::new();
    for zone_id in zones {
        let info = calendar.get(zone_id);
        let mut hour = first;
        while hour <= last {
            dense.push(observed.get(&(zone_id, hour)).map_or_else(
                || DemandRecord {
                    zone_id,
                    hour_timestamp: hour,
                    pickup_count: 0,
                    borough: info.map(|z| z.borough.clone()),
                    zone_name: info.map(|z| z.zone_name.clone()),
                },
                |r| (*r).clone(),
            ));
            hour += TimeDelta::hours(1);
        }
    }
    dense
}

#[cfg(test)]
mod tests {
    use taxi_demand_zone_models::{ServiceZone, ZoneInfo};

    use super::*;

    fn calendar() -> ZoneCalendar {
        ZoneCalendar::from_zones([ZoneInfo {
            zone_id: 7,
            borough: "Queens".to_string(),
            zone_name: "Astoria".to_string(),
            service_zone: ServiceZone::BoroZone,
        }])
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn trip(pickup: &str, dropoff: &str, zone: u32, distance: f64) -> TripEvent {
        TripEvent::new(pickup, dropoff, zone, distance)
    }

    #[test]
    fn counts_trips_per_zone_hour() {
        let cal = calendar();
        let trips = vec![
            trip("2024-01-01 08:05:00", "2024-01-01 08:20:00", 7, 1.0),
            trip("2024-01-01 08:55:00", "2024-01-01 09:10:00", 7, 2.0),
            trip("2024-01-01 09:00:00", "2024-01-01 09:10:00", 7, 2.0),
            trip("2024-01-01 08:30:00", "2024-01-01 08:45:00", 99, 3.0),
        ];
        let grid = DemandGridBuilder::new(&cal).build(&trips);

        assert_eq!(grid.panel.len(), 3);
        assert_eq!(grid.panel[0].zone_id, 7);
        assert_eq!(grid.panel[0].hour_timestamp, ts("2024-01-01 08:00:00"));
        assert_eq!(grid.panel[0].pickup_count, 2);
        assert_eq!(grid.panel[0].zone_name.as_deref(), Some("Astoria"));
        assert_eq!(grid.panel[1].pickup_count, 1);

        let unmatched = &grid.panel[2];
        assert_eq!(unmatched.zone_id, 99);
        assert!(unmatched.borough.is_none());
        assert!(unmatched.zone_name.is_none());

        assert_eq!(grid.summary.rows_before, 4);
        assert_eq!(grid.summary.rows_after, 4);
        assert_eq!(grid.summary.unmatched_zone_ids, vec![99]);
        assert_eq!(grid.summary.unique_zones, 2);
        assert_eq!(grid.summary.panel_rows, 3);
    }

    #[test]
    fn each_bad_trip_gets_one_reason() {
        let cal = calendar();
        let trips = vec![
            TripEvent {
                pickup_ts: Some("garbage".to_string()),
                dropoff_ts: None,
                zone_id: None,
                trip_distance: None,
            },
            TripEvent {
                pickup_ts: Some("2024-01-01 08:00:00".to_string()),
                dropoff_ts: None,
                zone_id: Some(7),
                trip_distance: Some(1.0),
            },
            TripEvent {
                zone_id: None,
                ..trip("2024-01-01 08:00:00", "2024-01-01 08:10:00", 7, 1.0)
            },
            trip("2024-01-01 08:00:00", "2024-01-01 08:00:00", 7, 1.0),
            trip("2024-01-01 08:00:00", "2024-01-01 07:59:00", 7, 1.0),
            trip("2024-01-01 08:00:00", "2024-01-01 12:00:00", 7, 1.0),
            trip("2024-01-01 08:00:00", "2024-01-01 11:59:00", 7, 0.0),
            TripEvent {
                trip_distance: None,
                ..trip("2024-01-01 08:00:00", "2024-01-01 08:10:00", 7, 1.0)
            },
            trip("2024-01-01 08:00:00", "2024-01-01 11:59:00", 7, 0.1),
        ];
        let grid = DemandGridBuilder::new(&cal).build(&trips);
        let s = &grid.summary;

        assert_eq!(s.rows_before, 9);
        assert_eq!(s.rows_after, 1);
        assert_eq!(s.rows_dropped, 8);
        assert_eq!(s.dropped_for(DropReason::UnparseablePickup), 1);
        assert_eq!(s.dropped_for(DropReason::UnparseableDropoff), 1);
        assert_eq!(s.dropped_for(DropReason::MissingZone), 1);
        assert_eq!(s.dropped_for(DropReason::NonPositiveDuration), 2);
        assert_eq!(s.dropped_for(DropReason::ExcessiveDuration), 1);
        assert_eq!(s.dropped_for(DropReason::NonPositiveDistance), 2);
        assert_eq!(grid.panel.len(), 1);
    }

    #[test]
    fn clip_drops_trips_outside_window() {
        let cal = calendar();
        let trips = vec![
            trip("2023-12-31 23:50:00", "2024-01-01 00:10:00", 7, 1.0),
            trip("2024-01-01 00:10:00", "2024-01-01 00:20:00", 7, 1.0),
            trip("2024-02-01 00:00:00", "2024-02-01 00:20:00", 7, 1.0),
        ];
        let grid = DemandGridBuilder::new(&cal)
            .clip_to(ts("2024-01-01 00:00:00"), ts("2024-02-01 00:00:00"))
            .build(&trips);
        assert_eq!(grid.summary.dropped_for(DropReason::OutsideMonth), 2);
        assert_eq!(grid.panel.len(), 1);
    }

    #[test]
    fn empty_after_filtering_is_not_fatal() {
        let cal = calendar();
        let trips = vec![trip("2024-01-01 08:00:00", "2024-01-01 08:10:00", 7, -1.0)];
        let grid = DemandGridBuilder::new(&cal).build(&trips);
        assert!(grid.panel.is_empty());
        assert_eq!(grid.summary.panel_rows, 0);
        assert_eq!(grid.summary.retention_ratio(), Some(0.0));

        let dense = grid.densify(&cal);
        assert!(dense.panel.is_empty());
    }

    #[test]
    fn build_is_idempotent_and_order_independent() {
        let cal = calendar();
        let mut trips = vec![
            trip("2024-01-01 08:05:00", "2024-01-01 08:20:00", 7, 1.0),
            trip("2024-01-01 10:05:00", "2024-01-01 10:20:00", 99, 1.0),
            trip("2024-01-01 09:05:00", "2024-01-01 09:20:00", 7, 1.0),
        ];
        let first = DemandGridBuilder::new(&cal).build(&trips);
        let second = DemandGridBuilder::new(&cal).build(&trips);
        assert_eq!(first, second);

        trips.reverse();
        let reversed = DemandGridBuilder::new(&cal).build(&trips);
        assert_eq!(first.panel, reversed.panel);
    }

    #[test]
    fn densify_fills_every_zone_across_global_range() {
        let cal = calendar();
        let panel = vec![
            DemandRecord {
                zone_id: 7,
                hour_timestamp: ts("2024-01-01 08:00:00"),
                pickup_count: 3,
                borough: Some("Queens".to_string()),
                zone_name: Some("Astoria".to_string()),
            },
            DemandRecord {
                zone_id: 7,
                hour_timestamp: ts("2024-01-01 10:00:00"),
                pickup_count: 5,
                borough: Some("Queens".to_string()),
                zone_name: Some("Astoria".to_string()),
            },
            DemandRecord {
                zone_id: 99,
                hour_timestamp: ts("2024-01-01 11:00:00"),
                pickup_count: 1,
                borough: None,
                zone_name: None,
            },
        ];

        let dense = densify_panel(&panel, &cal);
        assert_eq!(dense.len(), 8);

        let zone_7: Vec<u32> = dense
            .iter()
            .filter(|r| r.zone_id == 7)
            .map(|r| r.pickup_count)
            .collect();
        assert_eq!(zone_7, vec![3, 0, 5, 0]);
        assert_eq!(dense[1].zone_name.as_deref(), Some("Astoria"));

        let zone_99: Vec<u32> = dense
            .iter()
            .filter(|r| r.zone_id == 99)
            .map(|r| r.pickup_count)
            .collect();
        assert_eq!(zone_99, vec![0, 0, 0, 1]);
        assert!(dense[4].borough.is_none());
    }

    #[test]
    fn densify_updates_summary() {
        let cal = calendar();
        let trips = vec![
            trip("2024-01-01 08:05:00", "2024-01-01 08:20:00", 7, 1.0),
            trip("2024-01-01 11:05:00", "2024-01-01 11:20:00", 7, 1.0),
        ];
        let grid = DemandGridBuilder::new(&cal).build(&trips).densify(&cal);
        assert_eq!(grid.panel.len(), 4);
        assert_eq!(grid.summary.zero_filled_rows, 2);
        assert_eq!(grid.summary.panel_rows, 4);
        assert_eq!(grid.summary.rows_after, 2);
    }
}
