//! Read-only views over the fleet.

use std::cmp::Reverse;

use serde::Serialize;

use super::FleetWorkflow;
use crate::error::Result;
use crate::model::{
    Actor, Plate, RequestStatus, Role, ScheduleRequest, Trip, TripStatus, User, Vehicle,
    VehicleStatus,
};
use crate::store::{Consistency, RequestQuery, TripQuery, UserQuery, VehicleQuery};

/// Dashboard counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    /// Vehicles currently available.
    pub available_vehicles: usize,
    /// Trips currently in progress.
    pub trips_in_progress: usize,
    /// Trips that departed today in the fleet's local time.
    pub departed_today: usize,
    /// Atomicity of the backing store.
    pub consistency: Consistency,
}

impl FleetWorkflow {
    /// Requests waiting for a departure.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn confirmed_requests(&self) -> Result<Vec<ScheduleRequest>> {
        self.store.find_requests(&RequestQuery {
            status: Some(RequestStatus::Confirmed),
            ..RequestQuery::default()
        })
    }

    /// Requests `actor` may see: all of them for admins, otherwise their own.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn requests_visible_to(&self, actor: &Actor) -> Result<Vec<ScheduleRequest>> {
        let query = if actor.is_admin() {
            RequestQuery::default()
        } else {
            RequestQuery {
                requester: Some(actor.id.clone()),
                ..RequestQuery::default()
            }
        };
        self.store.find_requests(&query)
    }

    /// Active users who can be assigned to a trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn drivers(&self) -> Result<Vec<User>> {
        self.store.find_users(&UserQuery {
            role: Some(Role::Driver),
            active: Some(true),
            ..UserQuery::default()
        })
    }

    /// Vehicles free to depart.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn available_vehicles(&self) -> Result<Vec<Vehicle>> {
        self.store.find_vehicles(&VehicleQuery {
            status: Some(VehicleStatus::Available),
        })
    }

    /// Trips in progress, oldest departure first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn open_trips(&self) -> Result<Vec<Trip>> {
        self.store.find_trips(&TripQuery {
            status: Some(TripStatus::InProgress),
            ..TripQuery::default()
        })
    }

    /// The trip in progress on `plate`, if any. With more than one, the most
    /// recent departure.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn open_trip_for(&self, plate: &Plate) -> Result<Option<Trip>> {
        Ok(self.store.find_trips(&TripQuery::open_on(plate))?.pop())
    }

    /// Finalized trips, most recent arrival first, at most `limit` of them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn trip_history(&self, limit: Option<usize>) -> Result<Vec<Trip>> {
        let mut trips = self.store.find_trips(&TripQuery {
            status: Some(TripStatus::Finalized),
            ..TripQuery::default()
        })?;
        trips.sort_by_key(|t| Reverse((t.arrived_at, t.departed_at)));
        if let Some(limit) = limit {
            trips.truncate(limit);
        }
        Ok(trips)
    }

    /// Current dashboard counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn summary(&self) -> Result<FleetSummary> {
        let offset = self.settings.utc_offset;
        let today = self.clock.now().with_timezone(&offset).date_naive();

        let trips = self.store.find_trips(&TripQuery::default())?;
        let departed_today = trips
            .iter()
            .filter(|t| t.departed_at.with_timezone(&offset).date_naive() == today)
            .count();
        let trips_in_progress = trips.iter().filter(|t| t.is_open()).count();

        Ok(FleetSummary {
            available_vehicles: self.available_vehicles()?.len(),
            trips_in_progress,
            departed_today,
            consistency: self.consistency(),
        })
    }
}
