//! Trips: the record of a vehicle actually leaving and returning.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ParseLabelError, Plate, RequestId, TripId};

/// Whether a trip is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    /// Departed, not yet returned.
    #[default]
    InProgress,
    /// Returned with a final odometer reading.
    Finalized,
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

impl FromStr for TripStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_progress" => Ok(Self::InProgress),
            "finalized" => Ok(Self::Finalized),
            _ => Err(ParseLabelError {
                kind: "trip status",
                value: s.to_string(),
            }),
        }
    }
}

/// One departure and (eventually) arrival of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Engine-assigned identifier.
    pub id: TripId,
    /// Vehicle driven.
    pub plate: Plate,
    /// Driver user id.
    pub driver_id: String,
    /// The schedule request this trip fulfils.
    pub request_id: Option<RequestId>,
    /// Departure time.
    pub departed_at: DateTime<Utc>,
    /// Odometer at departure.
    pub odometer_start: f64,
    /// Arrival time, once finalized.
    pub arrived_at: Option<DateTime<Utc>>,
    /// Odometer at arrival, once finalized.
    pub odometer_end: Option<f64>,
    /// Destination copied from the request.
    pub destination: Option<String>,
    /// Notes; replaced on arrival when new notes are given.
    pub notes: Option<String>,
    /// Lifecycle status.
    pub status: TripStatus,
}

impl Trip {
    /// Whether the vehicle is still out on this trip.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == TripStatus::InProgress
    }

    /// Distance covered, available once the trip is finalized.
    #[must_use]
    pub fn distance(&self) -> Option<f64> {
        match (self.status, self.odometer_end) {
            (TripStatus::Finalized, Some(end)) => Some(end - self.odometer_start),
            _ => None,
        }
    }

    /// Time between departure and arrival.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.arrived_at.map(|arrived| arrived - self.departed_at)
    }
}

/// Partial update of a trip. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripPatch {
    /// New status.
    pub status: Option<TripStatus>,
    /// Arrival time.
    pub arrived_at: Option<DateTime<Utc>>,
    /// Final odometer.
    pub odometer_end: Option<f64>,
    /// Replacement notes.
    pub notes: Option<String>,
}

impl TripPatch {
    /// Apply the patch in place.
    pub fn apply_to(&self, trip: &mut Trip) {
        if let Some(status) = self.status {
            trip.status = status;
        }
        if let Some(at) = self.arrived_at {
            trip.arrived_at = Some(at);
        }
        if let Some(end) = self.odometer_end {
            trip.odometer_end = Some(end);
        }
        if let Some(notes) = &self.notes {
            trip.notes = Some(notes.clone());
        }
    }
}
