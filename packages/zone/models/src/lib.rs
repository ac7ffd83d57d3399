#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Taxi zone reference types.
//!
//! A [`ZoneCalendar`] maps integer zone identifiers to their descriptive
//! attributes (borough, display name, service class). It is a static,
//! read-only lookup shared by every stage that needs to label a zone.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Service class a taxi zone belongs to.
///
/// Unknown labels are preserved verbatim in [`ServiceZone::Other`] so that a
/// newer lookup table never fails to load.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceZone {
    /// Manhattan core served by street-hail yellow cabs.
    YellowZone,
    /// Outer-borough street-hail zone.
    BoroZone,
    /// Airport zones (JFK, `LaGuardia`).
    Airports,
    /// Newark airport.
    Ewr,
    /// Any label not listed above.
    Other(String),
}

impl ServiceZone {
    /// Parses the `service_zone` column of the zone lookup table.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Yellow Zone" => Self::YellowZone,
            "Boro Zone" => Self::BoroZone,
            "Airports" => Self::Airports,
            "EWR" => Self::Ewr,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the label as it appears in the lookup table.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::YellowZone => "Yellow Zone",
            Self::BoroZone => "Boro Zone",
            Self::Airports => "Airports",
            Self::Ewr => "EWR",
            Self::Other(label) => label,
        }
    }
}

impl std::fmt::Display for ServiceZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Descriptive attributes of a single taxi zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInfo {
    /// Integer zone identifier (`LocationID` in the lookup table).
    pub zone_id: u32,
    /// Borough the zone belongs to (e.g. "Manhattan").
    pub borough: String,
    /// Human-readable zone name (e.g. "JFK Airport").
    pub zone_name: String,
    /// Service class of the zone.
    pub service_zone: ServiceZone,
}

/// Static lookup from zone id to [`ZoneInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneCalendar {
    zones: BTreeMap<u32, ZoneInfo>,
}

impl ZoneCalendar {
    /// Creates an empty calendar. Every lookup against it misses.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            zones: BTreeMap::new(),
        }
    }

    /// Builds a calendar from zone records. When a zone id repeats, the
    /// first record wins.
    #[must_use]
    pub fn from_zones(zones: impl IntoIterator<Item = ZoneInfo>) -> Self {
        let mut map = BTreeMap::new();
        for zone in zones {
            map.entry(zone.zone_id).or_insert(zone);
        }
        Self { zones: map }
    }

    /// Looks up a zone by id.
    #[must_use]
    pub fn get(&self, zone_id: u32) -> Option<&ZoneInfo> {
        self.zones.get(&zone_id)
    }

    /// Returns the borough of a zone, if known.
    #[must_use]
    pub fn borough(&self, zone_id: u32) -> Option<&str> {
        self.get(zone_id).map(|z| z.borough.as_str())
    }

    /// Returns the display name of a zone, if known.
    #[must_use]
    pub fn zone_name(&self, zone_id: u32) -> Option<&str> {
        self.get(zone_id).map(|z| z.zone_name.as_str())
    }

    /// Number of zones in the calendar.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether the calendar has no zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Iterates zones in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &ZoneInfo> {
        self.zones.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: u32, name: &str) -> ZoneInfo {
        ZoneInfo {
            zone_id: id,
            borough: "Queens".to_string(),
            zone_name: name.to_string(),
            service_zone: ServiceZone::Airports,
        }
    }

    #[test]
    fn parses_known_service_zones() {
        assert_eq!(ServiceZone::from_label("Yellow Zone"), ServiceZone::YellowZone);
        assert_eq!(ServiceZone::from_label("Boro Zone"), ServiceZone::BoroZone);
        assert_eq!(ServiceZone::from_label(" Airports "), ServiceZone::Airports);
        assert_eq!(ServiceZone::from_label("EWR"), ServiceZone::Ewr);
    }

    #[test]
    fn keeps_unknown_service_zone_label() {
        let zone = ServiceZone::from_label("N/A");
        assert_eq!(zone, ServiceZone::Other("N/A".to_string()));
        assert_eq!(zone.label(), "N/A");
    }

    #[test]
    fn first_duplicate_wins() {
        let calendar = ZoneCalendar::from_zones([zone(132, "JFK Airport"), zone(132, "Dup")]);
        assert_eq!(calendar.len(), 1);
        assert_eq!(calendar.zone_name(132), Some("JFK Airport"));
    }

    #[test]
    fn missing_zone_yields_none() {
        let calendar = ZoneCalendar::from_zones([zone(138, "LaGuardia Airport")]);
        assert!(calendar.get(1).is_none());
        assert!(calendar.borough(1).is_none());
        assert_eq!(calendar.borough(138), Some("Queens"));
    }
}
