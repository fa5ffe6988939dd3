//! Domain types — trips, itineraries, locations and users.

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TripbellError};

/// Maximum number of recently used locations kept per user.
pub const LOCATION_HISTORY_LIMIT: usize = 10;

/// Seconds since local midnight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeOfDay(pub u32);

impl TimeOfDay {
    pub const fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    /// Wall-clock seconds since midnight for a local time.
    pub fn from_naive(time: NaiveTime) -> Self {
        Self(time.num_seconds_from_midnight())
    }

    /// Parse `HH:MM` or `HH:MM:SS`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || TripbellError::InvalidInput(format!("invalid time of day: '{input}'"));
        let parts: Vec<&str> = input.trim().split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(invalid());
        }
        let mut values = [0u32; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid())?;
        }
        let [h, m, s] = values;
        if h > 23 || m > 59 || s > 59 {
            return Err(invalid());
        }
        Ok(Self::from_hms(h, m, s))
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    /// Format as `HH:MM:SS`.
    pub fn to_hms_string(self) -> String {
        let h = self.0 / 3600;
        let m = (self.0 % 3600) / 60;
        let s = self.0 % 60;
        format!("{h:02}:{m:02}:{s:02}")
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hms_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f32,
    pub longitude: f32,
}

/// A stop or area known to the routing service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub coordinate: Coordinate,
}

/// One vehicle (or walking) segment of an itinerary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub from: Location,
    pub to: Location,
    // Upstream spells the field without the second 'r'.
    #[serde(rename = "departue_time", alias = "departure_time")]
    pub departure_time: TimeOfDay,
    pub arrival_time: TimeOfDay,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub head_sign: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub long_name: Option<String>,
}

impl Leg {
    /// Human label for the leg: short name, then long name, then mode.
    pub fn label(&self) -> String {
        let line = self
            .short_name
            .as_deref()
            .or(self.long_name.as_deref())
            .unwrap_or(&self.mode);
        match &self.head_sign {
            Some(sign) => format!("{line} → {sign}"),
            None => line.to_string(),
        }
    }
}

/// A routed journey between two locations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub from: Location,
    pub to: Location,
    #[serde(rename = "departue_time", alias = "departure_time")]
    pub departure_time: TimeOfDay,
    pub arrival_time: TimeOfDay,
    #[serde(default)]
    pub legs: Vec<Leg>,
}

impl Itinerary {
    pub fn travel_minutes(&self) -> u32 {
        self.arrival_time
            .seconds()
            .saturating_sub(self.departure_time.seconds())
            / 60
    }
}

/// Weekly recurrence mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weekdays {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl Weekdays {
    pub const EVERY_DAY: Self = Self {
        monday: true,
        tuesday: true,
        wednesday: true,
        thursday: true,
        friday: true,
        saturday: true,
        sunday: true,
    };

    pub const WORKDAYS: Self = Self {
        saturday: false,
        sunday: false,
        ..Self::EVERY_DAY
    };

    pub fn runs_on(&self, day: Weekday) -> bool {
        match day {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

impl Default for Weekdays {
    fn default() -> Self {
        Self::EVERY_DAY
    }
}

/// A recurring trip a user wants to be warned about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub from_id: String,
    pub from: String,
    pub to_id: String,
    pub to: String,
    /// Target time of day as entered by the user (`HH:MM[:SS]`).
    pub time: String,
    /// `true` = depart at `time`, `false` = arrive by `time`.
    pub departure: bool,
    pub weekdays: Weekdays,
    pub expected_itinerary: Itinerary,
}

impl Trip {
    pub fn should_run(&self, day: Weekday) -> bool {
        self.weekdays.runs_on(day)
    }

    pub fn departure_time(&self) -> TimeOfDay {
        self.expected_itinerary.departure_time
    }
}

/// A chat user owning trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub channel_id: String,
    /// Recently used locations, most recent last.
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl User {
    /// Push a location to the history, moving it to the end if already present.
    pub fn add_location(&mut self, location: Location) {
        self.locations.retain(|l| l.id != location.id);
        self.locations.push(location);
        if self.locations.len() > LOCATION_HISTORY_LIMIT {
            let excess = self.locations.len() - LOCATION_HISTORY_LIMIT;
            self.locations.drain(..excess);
        }
    }
}
