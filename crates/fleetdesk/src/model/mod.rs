//! Core entity types for fleetdesk.
//!
//! Every record store maps its native row shape to and from these structs at
//! its boundary, so the workflow engine only ever sees one representation per
//! entity.

mod schedule;
mod trip;
mod user;
mod vehicle;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{Error, Result};

pub use schedule::{
    RequestPatch, RequestStatus, ScheduleInput, ScheduleRequest, TimeWindow, DATE_FORMAT,
    TIME_FORMAT,
};
pub use trip::{Trip, TripPatch, TripStatus};
pub use user::{Actor, NewUser, ProfileEdit, Role, User};
pub use vehicle::{NewVehicle, Vehicle, VehicleEdit, VehiclePatch, VehicleStatus};

/// A stored enum label could not be recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseLabelError {
    /// What was being parsed (e.g. "vehicle status").
    pub kind: &'static str,
    /// The offending label.
    pub value: String,
}

impl From<ParseLabelError> for Error {
    fn from(err: ParseLabelError) -> Self {
        Error::validation(err.to_string())
    }
}

/// A vehicle license plate, normalized to upper case without surrounding
/// whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plate(String);

impl Plate {
    /// Normalize and validate a raw plate.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the plate is empty after trimming.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(Error::validation("plate is required"));
        }
        Ok(Self(normalized))
    }

    /// The normalized plate text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Plate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Plate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Identifier of a [`ScheduleRequest`], assigned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::validation(format!("invalid schedule request id: {s}")))
    }
}

/// Identifier of a [`Trip`], assigned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TripId(Uuid);

impl TripId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TripId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TripId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::validation(format!("invalid trip id: {s}")))
    }
}

/// Trim optional free text, mapping blank input to `None`.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_normalized() {
        let plate = Plate::parse("  abc-1234 ").unwrap();
        assert_eq!(plate.as_str(), "ABC-1234");
        assert_eq!(plate.to_string(), "ABC-1234");
    }

    #[test]
    fn test_plate_empty_rejected() {
        let err = Plate::parse("   ").unwrap_err();
        assert!(err.to_string().contains("plate is required"));
    }

    #[test]
    fn test_plate_equality_after_normalization() {
        assert_eq!(Plate::parse("xyz9a99").unwrap(), "XYZ9A99".parse().unwrap());
    }

    #[test]
    fn test_request_id_round_trip_text() {
        let id = RequestId::new();
        let parsed: RequestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_request_id_invalid() {
        let err = "row-7".parse::<RequestId>().unwrap_err();
        assert!(err.to_string().contains("row-7"));
    }

    #[test]
    fn test_trip_ids_unique() {
        assert_ne!(TripId::new(), TripId::new());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  downtown ")), Some("downtown".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_parse_label_error_display() {
        let err = ParseLabelError {
            kind: "trip status",
            value: "lost".to_string(),
        };
        assert_eq!(err.to_string(), "unknown trip status 'lost'");
    }
}
