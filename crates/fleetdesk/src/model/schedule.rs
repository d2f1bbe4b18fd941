//! Schedule requests: a user's reservation of a vehicle for a future window.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{non_blank, ParseLabelError, Plate, RequestId};
use crate::error::{Error, Result};

/// Date format accepted for requested dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Time format accepted for window bounds.
pub const TIME_FORMAT: &str = "%H:%M";

/// Lifecycle status of a schedule request.
///
/// ```text
/// Requested -> Confirmed -> InUse -> Completed
/// Requested | Confirmed -> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Booked, awaiting confirmation.
    #[default]
    Requested,
    /// Approved; the vehicle may depart.
    Confirmed,
    /// A trip is running against this request.
    InUse,
    /// The trip finished.
    Completed,
    /// Withdrawn.
    Cancelled,
}

impl RequestStatus {
    /// No transition leaves a terminal status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::InUse | Self::Cancelled)
                | (Self::InUse, Self::Completed)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::InUse => write!(f, "in_use"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for RequestStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requested" => Ok(Self::Requested),
            "confirmed" => Ok(Self::Confirmed),
            "in_use" => Ok(Self::InUse),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseLabelError {
                kind: "request status",
                value: s.to_string(),
            }),
        }
    }
}

/// A start/end time window on the requested date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window.
    pub start: NaiveTime,
    /// End of the window; never before `start`.
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Build a window.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `end` precedes `start`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        if end < start {
            return Err(Error::validation(format!(
                "window end ({}) precedes start ({})",
                end.format(TIME_FORMAT),
                start.format(TIME_FORMAT)
            )));
        }
        Ok(Self { start, end })
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format(TIME_FORMAT),
            self.end.format(TIME_FORMAT)
        )
    }
}

/// A reservation of one vehicle by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Engine-assigned identifier.
    pub id: RequestId,
    /// User who booked the vehicle.
    pub requester_id: String,
    /// Target vehicle.
    pub plate: Plate,
    /// Requested date.
    pub date: NaiveDate,
    /// Requested time window.
    pub window: TimeWindow,
    /// Destination text.
    pub destination: Option<String>,
    /// Expected passenger count.
    pub passengers: Option<u32>,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Lifecycle status.
    pub status: RequestStatus,
    /// Reason given on cancellation, recorded verbatim.
    pub cancel_reason: Option<String>,
    /// When the request was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// Raw booking input as received from a form or command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleInput {
    /// Target plate.
    pub plate: String,
    /// Requested date, `YYYY-MM-DD`.
    pub date: String,
    /// Window start, `HH:MM`.
    pub start: String,
    /// Window end, `HH:MM`.
    pub end: String,
    /// Destination text.
    pub destination: Option<String>,
    /// Passenger count.
    pub passengers: Option<u32>,
    /// Notes.
    pub notes: Option<String>,
}

impl ScheduleInput {
    /// Parse and validate the plate, date and window.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first missing or malformed field.
    pub fn parse(&self) -> Result<(Plate, NaiveDate, TimeWindow)> {
        let plate = Plate::parse(&self.plate)?;
        let date = parse_required(&self.date, "date", |s| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
        })?;
        let start = parse_required(&self.start, "start time", |s| {
            NaiveTime::parse_from_str(s, TIME_FORMAT)
        })?;
        let end = parse_required(&self.end, "end time", |s| {
            NaiveTime::parse_from_str(s, TIME_FORMAT)
        })?;
        Ok((plate, date, TimeWindow::new(start, end)?))
    }

    /// Destination with blank input dropped.
    #[must_use]
    pub fn destination(&self) -> Option<String> {
        non_blank(self.destination.as_deref())
    }

    /// Notes with blank input dropped.
    #[must_use]
    pub fn notes(&self) -> Option<String> {
        non_blank(self.notes.as_deref())
    }
}

fn parse_required<T>(
    raw: &str,
    field: &str,
    parse: impl FnOnce(&str) -> chrono::ParseResult<T>,
) -> Result<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    parse(raw).map_err(|e| Error::validation(format!("invalid {field} '{raw}': {e}")))
}

/// Partial update of a schedule request. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestPatch {
    /// New status.
    pub status: Option<RequestStatus>,
    /// Cancellation reason.
    pub cancel_reason: Option<String>,
    /// Cancellation time.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Modification time.
    pub updated_at: Option<DateTime<Utc>>,
}

impl RequestPatch {
    /// Patch that changes the status at the given time.
    #[must_use]
    pub fn status(status: RequestStatus, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            updated_at: Some(at),
            ..Self::default()
        }
    }

    /// Apply the patch in place.
    pub fn apply_to(&self, request: &mut ScheduleRequest) {
        if let Some(status) = self.status {
            request.status = status;
        }
        if let Some(reason) = &self.cancel_reason {
            request.cancel_reason = Some(reason.clone());
        }
        if let Some(at) = self.cancelled_at {
            request.cancelled_at = Some(at);
        }
        if let Some(at) = self.updated_at {
            request.updated_at = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ScheduleInput {
        ScheduleInput {
            plate: "ABC-1234".to_string(),
            date: "2025-06-01".to_string(),
            start: "08:00".to_string(),
            end: "12:00".to_string(),
            ..ScheduleInput::default()
        }
    }

    #[test]
    fn test_transitions() {
        use RequestStatus::*;
        assert!(Requested.can_transition_to(Confirmed));
        assert!(Requested.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(InUse));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(InUse.can_transition_to(Completed));

        assert!(!Requested.can_transition_to(InUse));
        assert!(!InUse.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Completed.can_transition_to(Requested));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
        assert!(!RequestStatus::InUse.is_terminal());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(RequestStatus::InUse.to_string(), "in_use");
        assert_eq!(
            "Cancelled".parse::<RequestStatus>().unwrap(),
            RequestStatus::Cancelled
        );
        assert!("approved".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_parse_valid_input() {
        let (plate, date, window) = input().parse().unwrap();
        assert_eq!(plate.as_str(), "ABC-1234");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(window.to_string(), "08:00-12:00");
        assert_eq!(window.duration(), chrono::Duration::hours(4));
    }

    #[test]
    fn test_parse_missing_fields() {
        let mut missing_plate = input();
        missing_plate.plate = String::new();
        assert!(missing_plate.parse().unwrap_err().to_string().contains("plate"));

        let mut missing_date = input();
        missing_date.date = " ".to_string();
        assert!(missing_date
            .parse()
            .unwrap_err()
            .to_string()
            .contains("date is required"));

        let mut missing_end = input();
        missing_end.end = String::new();
        assert!(missing_end
            .parse()
            .unwrap_err()
            .to_string()
            .contains("end time is required"));
    }

    #[test]
    fn test_parse_malformed_date() {
        let mut bad = input();
        bad.date = "01/06/2025".to_string();
        assert!(bad.parse().unwrap_err().to_string().contains("invalid date"));
    }

    #[test]
    fn test_window_end_before_start() {
        let mut bad = input();
        bad.start = "12:00".to_string();
        bad.end = "08:00".to_string();
        let err = bad.parse().unwrap_err();
        assert!(err.to_string().contains("precedes"));
    }

    #[test]
    fn test_zero_length_window_allowed() {
        let mut same = input();
        same.end = "08:00".to_string();
        assert!(same.parse().is_ok());
    }

    #[test]
    fn test_patch_records_cancellation() {
        let now = Utc::now();
        let (plate, date, window) = input().parse().unwrap();
        let mut request = ScheduleRequest {
            id: RequestId::new(),
            requester_id: "ana@fleet.test".to_string(),
            plate,
            date,
            window,
            destination: None,
            passengers: Some(3),
            notes: None,
            status: RequestStatus::Requested,
            cancel_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        RequestPatch {
            status: Some(RequestStatus::Cancelled),
            cancel_reason: Some("  trip postponed ".to_string()),
            cancelled_at: Some(now),
            updated_at: Some(now),
        }
        .apply_to(&mut request);

        assert_eq!(request.status, RequestStatus::Cancelled);
        assert_eq!(request.cancel_reason.as_deref(), Some("  trip postponed "));
        assert_eq!(request.cancelled_at, Some(now));
    }
}
