//! The fleet workflow engine.
//!
//! [`FleetWorkflow`] owns the lifecycle rules for schedule requests, trips and
//! vehicle availability. It talks to storage only through an injected
//! [`RecordStore`] and issues every multi-record update as one
//! [`RecordStore::commit`], so a failure part way through leaves no half-done
//! departure or arrival behind.
//!
//! Departures, arrivals, maintenance changes and reconciliation for a plate
//! are serialized by a per-plate lock. Request confirmation and cancellation
//! take the same lock so they cannot interleave with a departure.

mod locks;
mod queries;
mod reconcile;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    non_blank, Actor, NewUser, NewVehicle, Plate, ProfileEdit, RequestId, RequestPatch,
    RequestStatus, ScheduleInput, ScheduleRequest, Trip, TripId, TripPatch, TripStatus, User,
    Vehicle, VehicleEdit, VehiclePatch, VehicleStatus,
};
use crate::store::{
    Change, Consistency, Record, RecordKey, RecordStore, RequestQuery, TripQuery, UserQuery,
};

pub use locks::PlateLocks;
pub use queries::FleetSummary;
pub use reconcile::{Correction, ReconcileReport};

/// Tunables for the engine, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// How long to wait for a plate lock before failing with
    /// [`Error::PlateBusy`].
    pub lock_timeout: Duration,
    /// Pattern every registered or requested plate must match.
    pub plate_pattern: Regex,
    /// The fleet's local offset, used for "today".
    pub utc_offset: FixedOffset,
}

impl WorkflowSettings {
    /// Build settings from the `[workflow]` section of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the plate pattern or offset is invalid.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            lock_timeout: config.lock_timeout(),
            plate_pattern: config.plate_regex()?,
            utc_offset: config.utc_offset()?,
        })
    }
}

/// The workflow engine.
#[derive(Debug)]
pub struct FleetWorkflow {
    store: Arc<dyn RecordStore>,
    settings: WorkflowSettings,
    clock: Arc<dyn Clock>,
    locks: PlateLocks,
}

impl FleetWorkflow {
    /// Create an engine over `store` using the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, settings: WorkflowSettings) -> Self {
        Self {
            store,
            settings,
            clock: Arc::new(SystemClock),
            locks: PlateLocks::new(),
        }
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying record store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// The engine's settings.
    #[must_use]
    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Atomicity the store gives multi-record updates.
    #[must_use]
    pub fn consistency(&self) -> Consistency {
        self.store.consistency()
    }

    // === Users and vehicles ===

    /// Register a user.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input or when the id or
    /// email is already registered.
    pub fn register_user(&self, input: NewUser) -> Result<User> {
        let user = input.into_user(self.clock.now())?;

        if self.store.get_user(&user.id)?.is_some() {
            return Err(RecordKey::User(user.id).duplicate());
        }
        if let Some(email) = &user.email {
            let query = UserQuery {
                email: Some(email.clone()),
                ..UserQuery::default()
            };
            if !self.store.find_users(&query)?.is_empty() {
                return Err(Error::validation(format!("email {email} is already registered")));
            }
        }

        self.store.commit(&[Change::insert(Record::User(user.clone()))])?;
        info!(user = %user.id, role = %user.role, "Registered user");
        Ok(user)
    }

    /// Register a vehicle. It starts out available.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input, a plate that does not
    /// match the configured pattern, or a plate that is already registered.
    pub fn register_vehicle(&self, input: NewVehicle) -> Result<Vehicle> {
        let vehicle = input.into_vehicle()?;
        self.check_plate(&vehicle.plate)?;

        self.with_plate(&vehicle.plate, || {
            if self.store.get_vehicle(&vehicle.plate)?.is_some() {
                return Err(RecordKey::Vehicle(vehicle.plate.clone()).duplicate());
            }
            self.store
                .commit(&[Change::insert(Record::Vehicle(vehicle.clone()))])?;
            info!(plate = %vehicle.plate, odometer = vehicle.odometer, "Registered vehicle");
            Ok(vehicle.clone())
        })
    }

    /// Put a vehicle into maintenance (`on`) or release it.
    ///
    /// Releasing sets the status the vehicle's trips imply: in use when a
    /// trip is still open, otherwise available.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins, not-found for an unknown
    /// plate, and an invalid-state error when entering maintenance while a
    /// trip is open.
    pub fn set_maintenance(&self, plate: &Plate, actor: &Actor, on: bool) -> Result<Vehicle> {
        require_admin(actor, "change maintenance status")?;

        self.with_plate(plate, || {
            let vehicle = self.require_vehicle(plate)?;
            let open = self.store.find_trips(&TripQuery::open_on(plate))?;

            let target = match (on, open.is_empty()) {
                (true, false) => {
                    return Err(Error::invalid_state(format!(
                        "vehicle {plate} has a trip in progress"
                    )));
                }
                (true, true) => VehicleStatus::Maintenance,
                (false, true) => VehicleStatus::Available,
                (false, false) => VehicleStatus::InUse,
            };
            if !on && vehicle.status != VehicleStatus::Maintenance {
                debug!(%plate, status = %vehicle.status, "Vehicle not in maintenance");
                return Ok(vehicle);
            }
            if vehicle.status == target {
                return Ok(vehicle);
            }

            let patch = VehiclePatch::status(target);
            self.store
                .commit(&[Change::update_vehicle(&vehicle, patch.clone())])?;
            info!(%plate, from = %vehicle.status, to = %target, actor = %actor.id, "Changed vehicle status");

            let mut updated = vehicle;
            patch.apply_to(&mut updated);
            Ok(updated)
        })
    }

    /// Change a vehicle's descriptive fields.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins, not-found for an unknown
    /// plate, and a validation error when make or model would become blank.
    pub fn update_vehicle(&self, plate: &Plate, actor: &Actor, edit: &VehicleEdit) -> Result<Vehicle> {
        require_admin(actor, "edit vehicles")?;

        self.with_plate(plate, || {
            let vehicle = self.require_vehicle(plate)?;
            let edited = edit.applied_to(&vehicle)?;
            if edited == vehicle {
                debug!(%plate, "Vehicle edit changes nothing");
                return Ok(vehicle);
            }

            self.store.commit(&[Change::replace(
                Record::Vehicle(vehicle),
                Record::Vehicle(edited.clone()),
            )])?;
            info!(%plate, actor = %actor.id, "Updated vehicle");
            Ok(edited)
        })
    }

    /// Take a vehicle out of the fleet. Its past trips and requests are kept.
    ///
    /// # Errors
    ///
    /// Returns a permission error for non-admins, not-found for an unknown
    /// plate, and an invalid-state error while the vehicle has a trip in
    /// progress or an open schedule request.
    pub fn remove_vehicle(&self, plate: &Plate, actor: &Actor) -> Result<Vehicle> {
        require_admin(actor, "remove vehicles")?;

        self.with_plate(plate, || {
            let vehicle = self.require_vehicle(plate)?;
            if !self.store.find_trips(&TripQuery::open_on(plate))?.is_empty() {
                return Err(Error::invalid_state(format!(
                    "vehicle {plate} has a trip in progress"
                )));
            }
            let open_requests = self
                .store
                .find_requests(&RequestQuery {
                    plate: Some(plate.clone()),
                    ..RequestQuery::default()
                })?
                .into_iter()
                .filter(|r| {
                    matches!(
                        r.status,
                        RequestStatus::Requested | RequestStatus::Confirmed | RequestStatus::InUse
                    )
                })
                .count();
            if open_requests > 0 {
                return Err(Error::invalid_state(format!(
                    "vehicle {plate} has {open_requests} open schedule request(s)"
                )));
            }

            self.store
                .commit(&[Change::delete(Record::Vehicle(vehicle.clone()))])?;
            info!(%plate, actor = %actor.id, "Removed vehicle");
            Ok(vehicle)
        })
    }

    /// Change a user's display name or phone. Users edit their own profile;
    /// administrators may edit anyone's.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown user, a permission error when editing
    /// someone else's profile without being an admin, and a validation error
    /// for a blank or too short name.
    pub fn update_profile(&self, user_id: &str, actor: &Actor, edit: &ProfileEdit) -> Result<User> {
        let user = self
            .store
            .get_user(user_id.trim())?
            .ok_or_else(|| Error::not_found("user", user_id))?;
        if actor.id != user.id && !actor.is_admin() {
            return Err(Error::permission(format!(
                "only {} or an administrator can edit this profile",
                user.id
            )));
        }

        let edited = edit.applied_to(&user)?;
        if edited == user {
            return Ok(user);
        }
        self.store
            .commit(&[Change::replace(Record::User(user), Record::User(edited.clone()))])?;
        info!(user = %edited.id, actor = %actor.id, "Updated profile");
        Ok(edited)
    }

    // === Schedule requests ===

    /// Book a vehicle for a date and time window.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the plate, date or window is missing or
    /// malformed, and not-found if the vehicle is not registered.
    pub fn create_schedule_request(
        &self,
        actor: &Actor,
        input: &ScheduleInput,
    ) -> Result<ScheduleRequest> {
        let (plate, date, window) = input.parse()?;
        self.check_plate(&plate)?;
        self.require_vehicle(&plate)?;

        let now = self.clock.now();
        let request = ScheduleRequest {
            id: RequestId::new(),
            requester_id: actor.id.clone(),
            plate,
            date,
            window,
            destination: input.destination(),
            passengers: input.passengers,
            notes: input.notes(),
            status: RequestStatus::Requested,
            cancel_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store
            .commit(&[Change::insert(Record::Request(request.clone()))])?;
        info!(
            request = %request.id,
            plate = %request.plate,
            date = %request.date,
            window = %request.window,
            requester = %request.requester_id,
            "Created schedule request"
        );
        Ok(request)
    }

    /// Confirm a requested booking.
    ///
    /// Confirming a request that is already confirmed or in use changes
    /// nothing and succeeds.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id and an invalid-state error for a
    /// cancelled or completed request.
    pub fn confirm_schedule_request(&self, id: RequestId, actor: &Actor) -> Result<ScheduleRequest> {
        let plate = self.require_request(id)?.plate;

        self.with_plate(&plate, || {
            let request = self.require_request(id)?;
            match request.status {
                RequestStatus::Requested => {}
                RequestStatus::Confirmed | RequestStatus::InUse => {
                    warn!(request = %id, status = %request.status, actor = %actor.id, "Request already confirmed");
                    return Ok(request);
                }
                RequestStatus::Cancelled | RequestStatus::Completed => {
                    return Err(Error::invalid_state(format!(
                        "schedule request {id} is {} and cannot be confirmed",
                        request.status
                    )));
                }
            }

            let patch = RequestPatch::status(RequestStatus::Confirmed, self.clock.now());
            self.store
                .commit(&[Change::update_request(&request, patch.clone())])?;
            info!(request = %id, plate = %request.plate, actor = %actor.id, "Confirmed schedule request");

            let mut confirmed = request;
            patch.apply_to(&mut confirmed);
            Ok(confirmed)
        })
    }

    /// Cancel a booking, recording `reason` exactly as given.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id, a permission error unless the
    /// actor is the requester or an admin, and an invalid-state error once the
    /// request is in use or finished.
    pub fn cancel_schedule_request(
        &self,
        id: RequestId,
        actor: &Actor,
        reason: &str,
    ) -> Result<ScheduleRequest> {
        let plate = self.require_request(id)?.plate;

        self.with_plate(&plate, || {
            let request = self.require_request(id)?;
            if actor.id != request.requester_id && !actor.is_admin() {
                return Err(Error::permission(format!(
                    "only the requester or an administrator can cancel schedule request {id}"
                )));
            }
            if !request.status.can_transition_to(RequestStatus::Cancelled) {
                return Err(Error::invalid_state(format!(
                    "schedule request {id} is {} and cannot be cancelled",
                    request.status
                )));
            }

            let now = self.clock.now();
            let patch = RequestPatch {
                cancel_reason: (!reason.is_empty()).then(|| reason.to_string()),
                cancelled_at: Some(now),
                ..RequestPatch::status(RequestStatus::Cancelled, now)
            };
            self.store
                .commit(&[Change::update_request(&request, patch.clone())])?;
            info!(request = %id, actor = %actor.id, "Cancelled schedule request");

            let mut cancelled = request;
            patch.apply_to(&mut cancelled);
            Ok(cancelled)
        })
    }

    // === Trips ===

    /// Check a vehicle out against a confirmed request.
    ///
    /// Creates the trip, moves the request to in use and marks the vehicle in
    /// use as one unit.
    ///
    /// # Errors
    ///
    /// - not-found if the request or its vehicle does not exist
    /// - invalid-state if the request is not confirmed, the vehicle is in
    ///   maintenance, or the plate already has a trip in progress
    /// - validation if the driver is unknown, inactive or not a driver, or
    ///   the odometer reading is negative
    /// - [`Error::PlateBusy`] if another operation holds the plate
    pub fn depart_vehicle(
        &self,
        request_id: RequestId,
        driver_id: &str,
        odometer_start: f64,
        notes: Option<&str>,
    ) -> Result<Trip> {
        let plate = self.require_request(request_id)?.plate;

        self.with_plate(&plate, || {
            let request = self.require_request(request_id)?;
            if request.status != RequestStatus::Confirmed {
                return Err(Error::invalid_state(format!(
                    "schedule request {request_id} is {}, only confirmed requests can depart",
                    request.status
                )));
            }

            let driver = self
                .store
                .get_user(driver_id.trim())?
                .filter(User::can_drive)
                .ok_or_else(|| {
                    Error::validation(format!("{driver_id} is not an active driver"))
                })?;

            if !odometer_start.is_finite() || odometer_start < 0.0 {
                return Err(Error::validation(format!(
                    "departure odometer must be a non-negative number, got {odometer_start}"
                )));
            }

            let vehicle = self.require_vehicle(&plate)?;
            if vehicle.status == VehicleStatus::Maintenance {
                return Err(Error::invalid_state(format!("vehicle {plate} is in maintenance")));
            }
            if !self.store.find_trips(&TripQuery::open_on(&plate))?.is_empty() {
                return Err(Error::invalid_state(format!(
                    "vehicle {plate} already has a trip in progress"
                )));
            }

            let now = self.clock.now();
            let trip = Trip {
                id: TripId::new(),
                plate: plate.clone(),
                driver_id: driver.id,
                request_id: Some(request.id),
                departed_at: now,
                odometer_start,
                arrived_at: None,
                odometer_end: None,
                destination: request.destination.clone(),
                notes: non_blank(notes),
                status: TripStatus::InProgress,
            };

            self.store.commit(&[
                Change::insert(Record::Trip(trip.clone())),
                Change::update_request(&request, RequestPatch::status(RequestStatus::InUse, now)),
                Change::update_vehicle(&vehicle, VehiclePatch::status(VehicleStatus::InUse)),
            ])?;

            info!(
                trip = %trip.id,
                %plate,
                driver = %trip.driver_id,
                request = %request_id,
                odometer = odometer_start,
                "Vehicle departed"
            );
            Ok(trip)
        })
    }

    /// Check a vehicle back in.
    ///
    /// Finalizes the plate's open trip, makes the vehicle available with the
    /// arrival odometer as its reading, and completes the linked request.
    ///
    /// # Errors
    ///
    /// Returns not-found when the plate has no trip in progress, a validation
    /// error when `odometer_end` is below the departure reading, and
    /// [`Error::PlateBusy`] if another operation holds the plate.
    pub fn arrive_vehicle(
        &self,
        plate: &Plate,
        odometer_end: f64,
        notes: Option<&str>,
    ) -> Result<Trip> {
        self.with_plate(plate, || {
            let open = self.store.find_trips(&TripQuery::open_on(plate))?;
            let count = open.len();
            let Some(trip) = open
                .into_iter()
                .max_by(|a, b| a.departed_at.cmp(&b.departed_at).then(a.id.cmp(&b.id)))
            else {
                return Err(Error::not_found("trip in progress for vehicle", plate));
            };
            if count > 1 {
                warn!(%plate, open = count, trip = %trip.id, "Multiple open trips, finalizing the most recent");
            }

            if !odometer_end.is_finite() {
                return Err(Error::validation(format!(
                    "arrival odometer must be a number, got {odometer_end}"
                )));
            }
            if odometer_end < trip.odometer_start {
                return Err(Error::validation(format!(
                    "arrival odometer ({odometer_end}) is lower than departure odometer ({})",
                    trip.odometer_start
                )));
            }

            let now = self.clock.now();
            let patch = TripPatch {
                status: Some(TripStatus::Finalized),
                arrived_at: Some(now),
                odometer_end: Some(odometer_end),
                notes: non_blank(notes),
            };
            let mut changes = vec![Change::update_trip(&trip, patch.clone())];

            match self.store.get_vehicle(plate)? {
                Some(vehicle) => changes.push(Change::update_vehicle(
                    &vehicle,
                    VehiclePatch {
                        status: Some(VehicleStatus::Available),
                        odometer: Some(odometer_end),
                    },
                )),
                None => warn!(%plate, trip = %trip.id, "Arriving trip has no registered vehicle"),
            }

            if let Some(request_id) = trip.request_id {
                match self.store.get_request(request_id)? {
                    Some(request) => changes.push(Change::update_request(
                        &request,
                        RequestPatch::status(RequestStatus::Completed, now),
                    )),
                    None => warn!(trip = %trip.id, request = %request_id, "Linked schedule request is gone"),
                }
            }

            self.store.commit(&changes)?;

            let mut finalized = trip;
            patch.apply_to(&mut finalized);
            info!(
                trip = %finalized.id,
                %plate,
                distance = finalized.distance(),
                "Vehicle arrived"
            );
            Ok(finalized)
        })
    }

    // === Helpers ===

    fn with_plate<T>(&self, plate: &Plate, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.locks.with_plate(plate, self.settings.lock_timeout, f)
    }

    fn check_plate(&self, plate: &Plate) -> Result<()> {
        if self.settings.plate_pattern.is_match(plate.as_str()) {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "plate {plate} does not match the expected format"
            )))
        }
    }

    fn require_vehicle(&self, plate: &Plate) -> Result<Vehicle> {
        self.store
            .get_vehicle(plate)?
            .ok_or_else(|| Error::not_found("vehicle", plate))
    }

    fn require_request(&self, id: RequestId) -> Result<ScheduleRequest> {
        self.store
            .get_request(id)?
            .ok_or_else(|| Error::not_found("schedule request", id))
    }
}

fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(Error::permission(format!(
            "only administrators can {action} (user {})",
            actor.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::store::testing::{FlakyStore, GatedStore};
    use crate::store::{
        MemoryStore, RequestQuery, SheetStore, SqliteStore, VehicleQuery, Write,
    };
    use assert_matches::assert_matches;
    use chrono::Duration as ChronoDuration;
    use std::sync::Barrier;
    use tempfile::TempDir;

    #[test]
    fn test_full_trip_scenario_on_every_backend() {
        for_each_backend(|fx| {
            let wf = &fx.workflow;
            let request = fx.confirmed_request("ABC-1234");

            let trip = wf
                .depart_vehicle(request.id, DRIVER, 15000.0, Some("  keys in box 3 "))
                .unwrap();
            assert_eq!(trip.status, TripStatus::InProgress);
            assert_eq!(trip.destination.as_deref(), Some("Campinas"));
            assert_eq!(trip.notes.as_deref(), Some("keys in box 3"));
            assert_eq!(fx.request(request.id).status, RequestStatus::InUse);
            assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::InUse);

            fx.clock.advance(ChronoDuration::hours(4));
            let done = wf.arrive_vehicle(&plate("ABC-1234"), 15120.0, None).unwrap();

            assert_eq!(done.status, TripStatus::Finalized);
            assert_eq!(done.distance(), Some(120.0));
            assert_eq!(done.duration(), Some(ChronoDuration::hours(4)));
            assert_eq!(done.notes.as_deref(), Some("keys in box 3"));

            let stored = wf.store().get_trip(trip.id).unwrap().unwrap();
            assert_eq!(stored, done, "backend {}", wf.store().backend_name());
            assert_eq!(fx.request(request.id).status, RequestStatus::Completed);
            let vehicle = fx.vehicle("ABC-1234");
            assert_eq!(vehicle.status, VehicleStatus::Available);
            assert!((vehicle.odometer - 15120.0).abs() < f64::EPSILON);

            let err = wf.arrive_vehicle(&plate("ABC-1234"), 15200.0, None).unwrap_err();
            assert_matches!(err, Error::NotFound { .. });
        });
    }

    #[test]
    fn test_depart_then_arrive_distance() {
        let fx = Fixture::memory();
        fx.add_vehicle("XYZ-0001", 1000.0);
        let request = fx.confirmed_request("XYZ-0001");

        fx.workflow.depart_vehicle(request.id, DRIVER, 1000.0, None).unwrap();
        let trip = fx
            .workflow
            .arrive_vehicle(&plate("XYZ-0001"), 1050.0, Some("tire pressure low"))
            .unwrap();

        assert_eq!(trip.distance(), Some(50.0));
        assert_eq!(trip.notes.as_deref(), Some("tire pressure low"));
        assert_eq!(fx.vehicle("XYZ-0001").status, VehicleStatus::Available);
        assert_eq!(fx.request(request.id).status, RequestStatus::Completed);
    }

    #[test]
    fn test_depart_requires_confirmed_request() {
        for_each_backend(|fx| {
            let request = fx.request_for("ABC-1234");
            let err = fx
                .workflow
                .depart_vehicle(request.id, DRIVER, 15000.0, None)
                .unwrap_err();
            assert_matches!(err, Error::InvalidState { .. });

            fx.workflow
                .cancel_schedule_request(request.id, &fx.requester, "plans changed")
                .unwrap();
            let err = fx
                .workflow
                .depart_vehicle(request.id, DRIVER, 15000.0, None)
                .unwrap_err();
            assert_matches!(err, Error::InvalidState { .. });

            assert!(fx.all_trips().is_empty());
            assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::Available);
        });
    }

    #[test]
    fn test_depart_unknown_request() {
        let fx = Fixture::memory();
        let err = fx
            .workflow
            .depart_vehicle(RequestId::new(), DRIVER, 0.0, None)
            .unwrap_err();
        assert_matches!(err, Error::NotFound { entity: "schedule request", .. });
    }

    #[test]
    fn test_depart_rejects_non_driver() {
        let fx = Fixture::memory();
        let request = fx.confirmed_request("ABC-1234");

        for driver in [REQUESTER, ADMIN, "nobody@fleet.test"] {
            let err = fx
                .workflow
                .depart_vehicle(request.id, driver, 15000.0, None)
                .unwrap_err();
            assert_matches!(err, Error::Validation { ref message } if message.contains(driver));
        }
        assert!(fx.all_trips().is_empty());
        assert_eq!(fx.request(request.id).status, RequestStatus::Confirmed);
    }

    #[test]
    fn test_depart_rejects_bad_odometer() {
        let fx = Fixture::memory();
        let request = fx.confirmed_request("ABC-1234");

        for reading in [-1.0, f64::NAN] {
            let err = fx
                .workflow
                .depart_vehicle(request.id, DRIVER, reading, None)
                .unwrap_err();
            assert_matches!(err, Error::Validation { .. });
        }
    }

    #[test]
    fn test_depart_rejects_vehicle_in_maintenance() {
        let fx = Fixture::memory();
        let request = fx.confirmed_request("ABC-1234");
        fx.workflow
            .set_maintenance(&plate("ABC-1234"), &fx.admin, true)
            .unwrap();

        let err = fx
            .workflow
            .depart_vehicle(request.id, DRIVER, 15000.0, None)
            .unwrap_err();
        assert_matches!(err, Error::InvalidState { ref message } if message.contains("maintenance"));
    }

    #[test]
    fn test_second_departure_on_same_plate_rejected() {
        for_each_backend(|fx| {
            let first = fx.confirmed_request("ABC-1234");
            let second = fx.confirmed_request("ABC-1234");

            fx.workflow.depart_vehicle(first.id, DRIVER, 15000.0, None).unwrap();
            let err = fx
                .workflow
                .depart_vehicle(second.id, DRIVER, 15000.0, None)
                .unwrap_err();

            assert_matches!(err, Error::InvalidState { .. });
            assert_eq!(fx.open_trips("ABC-1234").len(), 1);
            assert_eq!(fx.request(second.id).status, RequestStatus::Confirmed);
        });
    }

    #[test]
    fn test_concurrent_departures_leave_one_open_trip() {
        let stores: Vec<Arc<dyn RecordStore>> = vec![
            Arc::new(MemoryStore::new()),
            Arc::new(SqliteStore::open_in_memory().unwrap()),
        ];
        for store in stores {
            let fx = Fixture::with_store(store, None);
            let requests: Vec<_> = (0..4).map(|_| fx.confirmed_request("ABC-1234")).collect();

            let results: Vec<Result<Trip>> = std::thread::scope(|s| {
                let handles: Vec<_> = requests
                    .iter()
                    .map(|request| {
                        let wf = &fx.workflow;
                        let id = request.id;
                        s.spawn(move || wf.depart_vehicle(id, DRIVER, 15000.0, None))
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            for err in results.into_iter().filter_map(std::result::Result::err) {
                assert_matches!(err, Error::InvalidState { .. });
            }
            assert_eq!(fx.open_trips("ABC-1234").len(), 1);
            let in_use = fx
                .workflow
                .store()
                .find_requests(&RequestQuery {
                    status: Some(RequestStatus::InUse),
                    ..RequestQuery::default()
                })
                .unwrap();
            assert_eq!(in_use.len(), 1);
        }
    }

    #[test]
    fn test_failed_departure_is_compensated() {
        let flaky = Arc::new(FlakyStore::new(Arc::new(MemoryStore::new())));
        let fx = Fixture::with_store(flaky.clone(), None);
        let request = fx.confirmed_request("ABC-1234");

        flaky.fail_on("update_vehicle");
        let err = fx
            .workflow
            .depart_vehicle(request.id, DRIVER, 15000.0, None)
            .unwrap_err();
        assert_matches!(err, Error::Io(_));

        assert!(fx.all_trips().is_empty());
        assert_eq!(fx.request(request.id).status, RequestStatus::Confirmed);
        assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::Available);

        flaky.heal();
        fx.workflow.depart_vehicle(request.id, DRIVER, 15000.0, None).unwrap();
        assert_eq!(fx.open_trips("ABC-1234").len(), 1);
    }

    #[test]
    fn test_failed_arrival_is_compensated() {
        let flaky = Arc::new(FlakyStore::new(Arc::new(MemoryStore::new())));
        let fx = Fixture::with_store(flaky.clone(), None);
        let request = fx.confirmed_request("ABC-1234");
        let trip = fx.workflow.depart_vehicle(request.id, DRIVER, 15000.0, None).unwrap();

        flaky.fail_on("update_request");
        let err = fx
            .workflow
            .arrive_vehicle(&plate("ABC-1234"), 15100.0, None)
            .unwrap_err();
        assert!(err.is_storage_error());

        let stored = fx.workflow.store().get_trip(trip.id).unwrap().unwrap();
        assert_eq!(stored, trip);
        let vehicle = fx.vehicle("ABC-1234");
        assert_eq!(vehicle.status, VehicleStatus::InUse);
        assert!((vehicle.odometer - 15000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_arrive_without_open_trip() {
        for_each_backend(|fx| {
            let err = fx
                .workflow
                .arrive_vehicle(&plate("ABC-1234"), 15100.0, None)
                .unwrap_err();
            assert_matches!(err, Error::NotFound { .. });
            assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::Available);
            assert!(fx.all_trips().is_empty());
        });
    }

    #[test]
    fn test_arrive_with_lower_odometer_keeps_trip_open() {
        for_each_backend(|fx| {
            let request = fx.confirmed_request("ABC-1234");
            fx.workflow.depart_vehicle(request.id, DRIVER, 15000.0, None).unwrap();

            let err = fx
                .workflow
                .arrive_vehicle(&plate("ABC-1234"), 14990.0, None)
                .unwrap_err();
            assert_matches!(
                err,
                Error::Validation { ref message }
                    if message.contains("14990") && message.contains("15000")
            );

            assert_eq!(fx.open_trips("ABC-1234").len(), 1);
            assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::InUse);
            assert_eq!(fx.request(request.id).status, RequestStatus::InUse);
        });
    }

    #[test]
    fn test_arrive_picks_most_recent_open_trip() {
        let fx = Fixture::memory();
        let older = fx.open_trip_directly("ABC-1234", 15000.0);
        fx.clock.advance(ChronoDuration::minutes(30));
        let newer = fx.open_trip_directly("ABC-1234", 15010.0);

        let trip = fx
            .workflow
            .arrive_vehicle(&plate("ABC-1234"), 15050.0, None)
            .unwrap();
        assert_eq!(trip.id, newer.id);

        let open = fx.open_trips("ABC-1234");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, older.id);
    }

    #[test]
    fn test_create_request_validation() {
        let fx = Fixture::memory();

        let mut input = schedule_input("ABC-1234");
        input.end = "07:00".to_string();
        let err = fx
            .workflow
            .create_schedule_request(&fx.requester, &input)
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref message } if message.contains("precedes"));

        let mut input = schedule_input("ABC-1234");
        input.date = String::new();
        let err = fx
            .workflow
            .create_schedule_request(&fx.requester, &input)
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref message } if message.contains("date is required"));

        let err = fx
            .workflow
            .create_schedule_request(&fx.requester, &schedule_input("plate with spaces"))
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = fx
            .workflow
            .create_schedule_request(&fx.requester, &schedule_input("NOPE-42"))
            .unwrap_err();
        assert_matches!(err, Error::NotFound { entity: "vehicle", .. });

        assert!(fx
            .workflow
            .store()
            .find_requests(&RequestQuery::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_create_request_normalizes_plate() {
        let fx = Fixture::memory();
        let request = fx
            .workflow
            .create_schedule_request(&fx.requester, &schedule_input(" abc-1234 "))
            .unwrap();
        assert_eq!(request.plate.as_str(), "ABC-1234");
        assert_eq!(request.status, RequestStatus::Requested);
        assert_eq!(request.requester_id, REQUESTER);
        assert_eq!(request.window.to_string(), "08:00-12:00");
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let fx = Fixture::memory();
        let request = fx.confirmed_request("ABC-1234");
        let before = fx.request(request.id);

        fx.clock.advance(ChronoDuration::minutes(5));
        let again = fx
            .workflow
            .confirm_schedule_request(request.id, &fx.admin)
            .unwrap();
        assert_eq!(again, before);

        fx.workflow.depart_vehicle(request.id, DRIVER, 15000.0, None).unwrap();
        let in_use = fx
            .workflow
            .confirm_schedule_request(request.id, &fx.admin)
            .unwrap();
        assert_eq!(in_use.status, RequestStatus::InUse);
    }

    #[test]
    fn test_confirm_rejects_finished_requests() {
        let fx = Fixture::memory();
        let request = fx.request_for("ABC-1234");
        fx.workflow
            .cancel_schedule_request(request.id, &fx.requester, "")
            .unwrap();

        let err = fx
            .workflow
            .confirm_schedule_request(request.id, &fx.admin)
            .unwrap_err();
        assert_matches!(err, Error::InvalidState { .. });

        let err = fx
            .workflow
            .confirm_schedule_request(RequestId::new(), &fx.admin)
            .unwrap_err();
        assert_matches!(err, Error::NotFound { .. });
    }

    #[test]
    fn test_cancel_permissions() {
        for_each_backend(|fx| {
            let request = fx.request_for("ABC-1234");
            let stranger = Actor::new(DRIVER, crate::model::Role::Driver);

            let err = fx
                .workflow
                .cancel_schedule_request(request.id, &stranger, "mine now")
                .unwrap_err();
            assert_matches!(err, Error::Permission { .. });
            assert_eq!(fx.request(request.id).status, RequestStatus::Requested);

            let cancelled = fx
                .workflow
                .cancel_schedule_request(request.id, &fx.requester, "  meeting moved online ")
                .unwrap();
            assert_eq!(cancelled.status, RequestStatus::Cancelled);

            let stored = fx.request(request.id);
            assert_eq!(stored.cancel_reason.as_deref(), Some("  meeting moved online "));
            assert_eq!(stored.cancelled_at, Some(fx.clock.now()));
        });
    }

    #[test]
    fn test_admin_can_cancel_confirmed_request() {
        let fx = Fixture::memory();
        let request = fx.confirmed_request("ABC-1234");
        let cancelled = fx
            .workflow
            .cancel_schedule_request(request.id, &fx.admin, "vehicle needed elsewhere")
            .unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
    }

    #[test]
    fn test_cancel_checks_existence_then_permission_then_state() {
        let fx = Fixture::memory();
        let err = fx
            .workflow
            .cancel_schedule_request(RequestId::new(), &fx.requester, "x")
            .unwrap_err();
        assert_matches!(err, Error::NotFound { .. });

        let request = fx.confirmed_request("ABC-1234");
        fx.workflow.depart_vehicle(request.id, DRIVER, 15000.0, None).unwrap();

        let stranger = Actor::new("someone@fleet.test", crate::model::Role::Other);
        let err = fx
            .workflow
            .cancel_schedule_request(request.id, &stranger, "x")
            .unwrap_err();
        assert_matches!(err, Error::Permission { .. });

        let err = fx
            .workflow
            .cancel_schedule_request(request.id, &fx.requester, "x")
            .unwrap_err();
        assert_matches!(err, Error::InvalidState { .. });
    }

    #[test]
    fn test_register_vehicle() {
        let fx = Fixture::memory();
        let vehicle = fx.add_vehicle("new-0001", 12.5);
        assert_eq!(vehicle.plate.as_str(), "NEW-0001");
        assert_eq!(vehicle.status, VehicleStatus::Available);

        let err = fx
            .workflow
            .register_vehicle(NewVehicle {
                plate: "NEW-0001".to_string(),
                make: "VW".to_string(),
                model: "Gol".to_string(),
                ..NewVehicle::default()
            })
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref message } if message.contains("already exists"));

        let err = fx
            .workflow
            .register_vehicle(NewVehicle {
                plate: "#!".to_string(),
                make: "VW".to_string(),
                model: "Gol".to_string(),
                ..NewVehicle::default()
            })
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref message } if message.contains("format"));
    }

    #[test]
    fn test_register_user_rejects_duplicates() {
        let fx = Fixture::memory();
        let err = fx
            .workflow
            .register_user(NewUser {
                name: "Ana Again".to_string(),
                email: Some(REQUESTER.to_string()),
                ..NewUser::default()
            })
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = fx
            .workflow
            .register_user(NewUser {
                id: Some("ops".to_string()),
                name: "Ops".to_string(),
                email: Some(ADMIN.to_string()),
                ..NewUser::default()
            })
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref message } if message.contains("already registered"));
    }

    #[test]
    fn test_maintenance_rules() {
        for_each_backend(|fx| {
            let p = plate("ABC-1234");
            let err = fx
                .workflow
                .set_maintenance(&p, &fx.requester, true)
                .unwrap_err();
            assert_matches!(err, Error::Permission { .. });

            let vehicle = fx.workflow.set_maintenance(&p, &fx.admin, true).unwrap();
            assert_eq!(vehicle.status, VehicleStatus::Maintenance);
            let vehicle = fx.workflow.set_maintenance(&p, &fx.admin, false).unwrap();
            assert_eq!(vehicle.status, VehicleStatus::Available);

            let request = fx.confirmed_request("ABC-1234");
            fx.workflow.depart_vehicle(request.id, DRIVER, 15000.0, None).unwrap();
            let err = fx.workflow.set_maintenance(&p, &fx.admin, true).unwrap_err();
            assert_matches!(err, Error::InvalidState { .. });
            assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::InUse);

            let err = fx
                .workflow
                .set_maintenance(&plate("GONE-1"), &fx.admin, true)
                .unwrap_err();
            assert_matches!(err, Error::NotFound { .. });
        });
    }

    #[test]
    fn test_release_maintenance_with_open_trip_sets_in_use() {
        let fx = Fixture::memory();
        fx.open_trip_directly("ABC-1234", 15000.0);
        let before = fx.vehicle("ABC-1234");
        fx.workflow
            .store()
            .apply(&Write::UpdateVehicle {
                plate: before.plate.clone(),
                patch: VehiclePatch::status(VehicleStatus::Maintenance),
            })
            .unwrap();

        let vehicle = fx
            .workflow
            .set_maintenance(&plate("ABC-1234"), &fx.admin, false)
            .unwrap();
        assert_eq!(vehicle.status, VehicleStatus::InUse);
    }

    #[test]
    fn test_contended_plate_reports_busy() {
        let mut settings = test_settings();
        settings.lock_timeout = Duration::from_millis(20);
        let fx = Fixture::with_settings(Arc::new(MemoryStore::new()), None, settings);
        let request = fx.confirmed_request("ABC-1234");
        let p = plate("ABC-1234");

        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        std::thread::scope(|s| {
            let (locks, p) = (&fx.workflow.locks, &p);
            s.spawn(move || {
                locks
                    .with_plate(p, Duration::from_secs(1), || {
                        held_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            });

            held_rx.recv().unwrap();
            let err = fx
                .workflow
                .depart_vehicle(request.id, DRIVER, 15000.0, None)
                .unwrap_err();
            assert_matches!(err, Error::PlateBusy { .. });
            release_tx.send(()).unwrap();
        });

        assert!(fx.all_trips().is_empty());
    }

    #[test]
    fn test_settings_from_config() {
        let settings = WorkflowSettings::from_config(&Config::default()).unwrap();
        assert_eq!(settings.lock_timeout, Duration::from_millis(5000));
        assert!(settings.plate_pattern.is_match("ABC-1234"));
        assert_eq!(settings.utc_offset.local_minus_utc(), -180 * 60);

        let mut config = Config::default();
        config.workflow.plate_pattern = "([".to_string();
        assert!(WorkflowSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_vehicle_query_after_trip_cycle() {
        let fx = Fixture::memory();
        let request = fx.confirmed_request("ABC-1234");
        fx.workflow.depart_vehicle(request.id, DRIVER, 15000.0, None).unwrap();

        let in_use = fx
            .workflow
            .store()
            .find_vehicles(&VehicleQuery {
                status: Some(VehicleStatus::InUse),
            })
            .unwrap();
        assert_eq!(in_use.len(), 1);
        assert_eq!(in_use[0].plate.as_str(), "ABC-1234");
    }

    fn actor_for(fx: &Fixture, id: &str) -> Actor {
        Actor::from(&fx.workflow.store().get_user(id).unwrap().unwrap())
    }

    /// Two engines over their own handles on one file, as two `fleetctl`
    /// processes would have, arrive the same trip with their commits
    /// released together.
    fn race_arrivals(open: impl Fn() -> Arc<dyn RecordStore>) {
        let fx = Fixture::with_store(open(), None);
        let request = fx.confirmed_request("ABC-1234");
        let trip = fx
            .workflow
            .depart_vehicle(request.id, DRIVER, 15000.0, None)
            .unwrap();

        let gate = Arc::new(Barrier::new(2));
        let engines: Vec<FleetWorkflow> = (0..2)
            .map(|_| {
                let store = GatedStore::new(open(), Arc::clone(&gate));
                FleetWorkflow::new(Arc::new(store), test_settings())
            })
            .collect();

        let results: Vec<Result<Trip>> = std::thread::scope(|s| {
            let handles: Vec<_> = engines
                .iter()
                .zip([15100.0, 15500.0])
                .map(|(wf, odometer)| {
                    s.spawn(move || wf.arrive_vehicle(&plate("ABC-1234"), odometer, None))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let backend = fx.workflow.store().backend_name();
        let arrived: Vec<&Trip> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(arrived.len(), 1, "{backend}: {results:?}");
        let lost = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_matches!(lost, Error::Conflict { entity: "trip", .. });

        let stored = fx.workflow.store().get_trip(trip.id).unwrap().unwrap();
        assert_eq!(stored.status, TripStatus::Finalized);
        assert_eq!(stored.odometer_end, arrived[0].odometer_end);
        let vehicle = fx.vehicle("ABC-1234");
        assert_eq!(Some(vehicle.odometer), arrived[0].odometer_end);
        assert_eq!(vehicle.status, VehicleStatus::Available);
        assert_eq!(fx.request(request.id).status, RequestStatus::Completed);
    }

    #[test]
    fn test_racing_arrivals_on_shared_database_finalize_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet.db");
        race_arrivals(|| -> Arc<dyn RecordStore> { Arc::new(SqliteStore::open(&path).unwrap()) });
    }

    #[test]
    fn test_racing_arrivals_on_shared_workbook_finalize_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet-workbook.json");
        race_arrivals(|| -> Arc<dyn RecordStore> { Arc::new(SheetStore::open(&path).unwrap()) });
    }

    #[test]
    fn test_departure_through_second_workbook_handle_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet-workbook.json");
        let fx = Fixture::with_store(Arc::new(SheetStore::open(&path).unwrap()), None);
        let first = fx.confirmed_request("ABC-1234");
        let second = fx.confirmed_request("ABC-1234");

        let other = FleetWorkflow::new(Arc::new(SheetStore::open(&path).unwrap()), test_settings());
        let trip = other.depart_vehicle(first.id, DRIVER, 15000.0, None).unwrap();

        let err = fx
            .workflow
            .depart_vehicle(second.id, DRIVER, 15000.0, None)
            .unwrap_err();
        assert_matches!(err, Error::InvalidState { .. });

        let reopened = SheetStore::open(&path).unwrap();
        let on_disk = reopened.find_trips(&TripQuery::default()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].id, trip.id);
        assert_eq!(fx.request(first.id).status, RequestStatus::InUse);
        assert_eq!(fx.request(second.id).status, RequestStatus::Confirmed);
    }

    #[test]
    fn test_update_vehicle_on_every_backend() {
        for_each_backend(|fx| {
            let edit = VehicleEdit {
                color: Some("White".to_string()),
                year: Some(2021),
                ..VehicleEdit::default()
            };
            let updated = fx
                .workflow
                .update_vehicle(&plate("ABC-1234"), &fx.admin, &edit)
                .unwrap();
            assert_eq!(updated.color.as_deref(), Some("White"));
            assert_eq!(updated.year, Some(2021));
            assert_eq!(updated.odometer, 15000.0);
            assert_eq!(fx.vehicle("ABC-1234"), updated);
        });
    }

    #[test]
    fn test_update_vehicle_checks_actor_and_plate() {
        let fx = Fixture::memory();
        let edit = VehicleEdit {
            make: Some("Volkswagen".to_string()),
            ..VehicleEdit::default()
        };

        let err = fx
            .workflow
            .update_vehicle(&plate("ABC-1234"), &fx.requester, &edit)
            .unwrap_err();
        assert_matches!(err, Error::Permission { .. });
        assert_eq!(fx.vehicle("ABC-1234").make.as_deref(), Some("Fiat"));

        let err = fx
            .workflow
            .update_vehicle(&plate("ZZZ-0000"), &fx.admin, &edit)
            .unwrap_err();
        assert_matches!(err, Error::NotFound { .. });

        let blank = VehicleEdit {
            model: Some("  ".to_string()),
            ..VehicleEdit::default()
        };
        let err = fx
            .workflow
            .update_vehicle(&plate("ABC-1234"), &fx.admin, &blank)
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
    }

    #[test]
    fn test_remove_vehicle_waits_for_open_work() {
        for_each_backend(|fx| {
            let wf = &fx.workflow;
            let request = fx.confirmed_request("ABC-1234");

            let err = wf.remove_vehicle(&plate("ABC-1234"), &fx.admin).unwrap_err();
            assert_matches!(err, Error::InvalidState { ref message } if message.contains("schedule request"));

            wf.depart_vehicle(request.id, DRIVER, 15000.0, None).unwrap();
            let err = wf.remove_vehicle(&plate("ABC-1234"), &fx.admin).unwrap_err();
            assert_matches!(err, Error::InvalidState { ref message } if message.contains("trip in progress"));

            let trip = wf.arrive_vehicle(&plate("ABC-1234"), 15080.0, None).unwrap();
            let removed = wf.remove_vehicle(&plate("ABC-1234"), &fx.admin).unwrap();
            assert_eq!(removed.odometer, 15080.0);

            assert!(wf.store().get_vehicle(&plate("ABC-1234")).unwrap().is_none());
            assert_eq!(wf.store().get_trip(trip.id).unwrap(), Some(trip));
            assert_eq!(fx.request(request.id).status, RequestStatus::Completed);
        });
    }

    #[test]
    fn test_remove_vehicle_refuses_pending_request() {
        let fx = Fixture::memory();
        fx.request_for("ABC-1234");

        let err = fx
            .workflow
            .remove_vehicle(&plate("ABC-1234"), &fx.admin)
            .unwrap_err();
        assert_matches!(err, Error::InvalidState { .. });

        let err = fx
            .workflow
            .remove_vehicle(&plate("ABC-1234"), &fx.requester)
            .unwrap_err();
        assert_matches!(err, Error::Permission { .. });
        assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::Available);
    }

    #[test]
    fn test_remove_idle_vehicle() {
        let fx = Fixture::memory();
        fx.add_vehicle("XYZ-9876", 500.0);

        fx.workflow
            .remove_vehicle(&plate("XYZ-9876"), &fx.admin)
            .unwrap();
        let err = fx
            .workflow
            .remove_vehicle(&plate("XYZ-9876"), &fx.admin)
            .unwrap_err();
        assert_matches!(err, Error::NotFound { .. });
        assert!(fx.workflow.store().get_vehicle(&plate("ABC-1234")).unwrap().is_some());
    }

    #[test]
    fn test_update_own_profile_on_every_backend() {
        for_each_backend(|fx| {
            let edit = ProfileEdit {
                name: Some("Ana Souza Lima".to_string()),
                phone: Some("+55 19 99999-0000".to_string()),
            };
            let updated = fx
                .workflow
                .update_profile(REQUESTER, &fx.requester, &edit)
                .unwrap();
            assert_eq!(updated.name, "Ana Souza Lima");
            assert_eq!(updated.phone.as_deref(), Some("+55 19 99999-0000"));
            assert_eq!(fx.workflow.store().get_user(REQUESTER).unwrap(), Some(updated));
        });
    }

    #[test]
    fn test_profile_edits_by_others() {
        let fx = Fixture::memory();
        let driver = actor_for(&fx, DRIVER);
        let edit = ProfileEdit {
            name: Some("Someone Else".to_string()),
            ..ProfileEdit::default()
        };

        let err = fx
            .workflow
            .update_profile(REQUESTER, &driver, &edit)
            .unwrap_err();
        assert_matches!(err, Error::Permission { .. });

        let updated = fx
            .workflow
            .update_profile(DRIVER, &fx.admin, &edit)
            .unwrap();
        assert_eq!(updated.name, "Someone Else");

        let short = ProfileEdit {
            name: Some("Jo".to_string()),
            ..ProfileEdit::default()
        };
        let err = fx
            .workflow
            .update_profile(DRIVER, &driver, &short)
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = fx
            .workflow
            .update_profile("nobody@fleet.test", &fx.admin, &edit)
            .unwrap_err();
        assert_matches!(err, Error::NotFound { .. });
    }
}
