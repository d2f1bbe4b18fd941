//! Record store layer for fleetdesk.
//!
//! A [`RecordStore`] holds the four entity collections (users, vehicles,
//! schedule requests and trips). Backends differ in what they can promise for
//! multi-step writes, which they report through [`Consistency`]:
//!
//! - [`SqliteStore`] runs a [`commit`](RecordStore::commit) inside a single
//!   database transaction.
//! - [`SheetStore`] and [`MemoryStore`] have no transactions. Their commits
//!   apply writes one by one and, on failure, undo the writes already applied.
//!
//! Every backend refuses a commit whose changes were computed from a record
//! that has since been modified ([`verify_unchanged`]). Together with the
//! per-backend write lock this keeps two processes sharing one file from
//! silently overwriting each other.

mod memory;
mod sheet;
pub mod sqlite;

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::{Config, StoreBackend};
use crate::error::{Error, Result};
use crate::model::{
    Plate, RequestId, RequestPatch, RequestStatus, Role, ScheduleRequest, Trip, TripId,
    TripPatch, TripStatus, User, Vehicle, VehiclePatch, VehicleStatus,
};

pub use memory::MemoryStore;
pub use sheet::SheetStore;
pub use sqlite::SqliteStore;

/// What a backend guarantees when a multi-write commit fails part way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// All writes of a commit land or none do.
    Transactional,
    /// Applied writes are undone one by one after a failure. A crash or a
    /// failing undo can leave the store partially updated.
    Compensating,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transactional => write!(f, "transactional"),
            Self::Compensating => write!(f, "compensating"),
        }
    }
}

/// A complete entity, as inserted or restored.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A user.
    User(User),
    /// A vehicle.
    Vehicle(Vehicle),
    /// A schedule request.
    Request(ScheduleRequest),
    /// A trip.
    Trip(Trip),
}

impl Record {
    /// Primary key of the record.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        match self {
            Self::User(user) => RecordKey::User(user.id.clone()),
            Self::Vehicle(vehicle) => RecordKey::Vehicle(vehicle.plate.clone()),
            Self::Request(request) => RecordKey::Request(request.id),
            Self::Trip(trip) => RecordKey::Trip(trip.id),
        }
    }
}

/// Primary key of a record in one of the four collections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// User id.
    User(String),
    /// Vehicle plate.
    Vehicle(Plate),
    /// Schedule request id.
    Request(RequestId),
    /// Trip id.
    Trip(TripId),
}

impl RecordKey {
    /// Entity name used in error messages.
    #[must_use]
    pub fn entity(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Vehicle(_) => "vehicle",
            Self::Request(_) => "schedule request",
            Self::Trip(_) => "trip",
        }
    }

    /// Not-found error for this key.
    #[must_use]
    pub fn not_found(&self) -> Error {
        Error::not_found(self.entity(), self)
    }

    /// Duplicate-key error for this key.
    #[must_use]
    pub fn duplicate(&self) -> Error {
        Error::validation(format!("{} {self} already exists", self.entity()))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => f.write_str(id),
            Self::Vehicle(plate) => fmt::Display::fmt(plate, f),
            Self::Request(id) => fmt::Display::fmt(id, f),
            Self::Trip(id) => fmt::Display::fmt(id, f),
        }
    }
}

/// A single write against a record store.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Add a new record. Fails if the key exists.
    Insert(Record),
    /// Patch a vehicle.
    UpdateVehicle {
        /// Target vehicle.
        plate: Plate,
        /// Fields to change.
        patch: VehiclePatch,
    },
    /// Patch a schedule request.
    UpdateRequest {
        /// Target request.
        id: RequestId,
        /// Fields to change.
        patch: RequestPatch,
    },
    /// Patch a trip.
    UpdateTrip {
        /// Target trip.
        id: TripId,
        /// Fields to change.
        patch: TripPatch,
    },
    /// Overwrite an existing record with a full copy.
    Restore(Record),
    /// Remove a record.
    Delete(RecordKey),
}

impl Write {
    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::UpdateVehicle { .. } => "update_vehicle",
            Self::UpdateRequest { .. } => "update_request",
            Self::UpdateTrip { .. } => "update_trip",
            Self::Restore(_) => "restore",
            Self::Delete(_) => "delete",
        }
    }

    /// Key of the record this write touches.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        match self {
            Self::Insert(record) | Self::Restore(record) => record.key(),
            Self::UpdateVehicle { plate, .. } => RecordKey::Vehicle(plate.clone()),
            Self::UpdateRequest { id, .. } => RecordKey::Request(*id),
            Self::UpdateTrip { id, .. } => RecordKey::Trip(*id),
            Self::Delete(key) => key.clone(),
        }
    }
}

/// A forward write paired with the write that reverses it.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// The intended write.
    pub forward: Write,
    /// Restores the state from before `forward`.
    pub undo: Write,
}

impl Change {
    /// Insert a record; undone by deleting it.
    #[must_use]
    pub fn insert(record: Record) -> Self {
        let key = record.key();
        Self {
            forward: Write::Insert(record),
            undo: Write::Delete(key),
        }
    }

    /// Patch a vehicle; undone by restoring `before`.
    #[must_use]
    pub fn update_vehicle(before: &Vehicle, patch: VehiclePatch) -> Self {
        Self {
            forward: Write::UpdateVehicle {
                plate: before.plate.clone(),
                patch,
            },
            undo: Write::Restore(Record::Vehicle(before.clone())),
        }
    }

    /// Patch a request; undone by restoring `before`.
    #[must_use]
    pub fn update_request(before: &ScheduleRequest, patch: RequestPatch) -> Self {
        Self {
            forward: Write::UpdateRequest {
                id: before.id,
                patch,
            },
            undo: Write::Restore(Record::Request(before.clone())),
        }
    }

    /// Patch a trip; undone by restoring `before`.
    #[must_use]
    pub fn update_trip(before: &Trip, patch: TripPatch) -> Self {
        Self {
            forward: Write::UpdateTrip {
                id: before.id,
                patch,
            },
            undo: Write::Restore(Record::Trip(before.clone())),
        }
    }

    /// Overwrite `before` with `after`, which must share its key.
    #[must_use]
    pub fn replace(before: Record, after: Record) -> Self {
        Self {
            forward: Write::Restore(after),
            undo: Write::Restore(before),
        }
    }

    /// Remove `before`; undone by inserting it again.
    #[must_use]
    pub fn delete(before: Record) -> Self {
        Self {
            forward: Write::Delete(before.key()),
            undo: Write::Insert(before),
        }
    }

    /// The record this change was computed from, for changes to an existing
    /// record.
    #[must_use]
    pub fn expected(&self) -> Option<&Record> {
        match (&self.forward, &self.undo) {
            (Write::Insert(_), _) => None,
            (_, Write::Restore(before) | Write::Insert(before)) => Some(before),
            _ => None,
        }
    }
}

/// Check that every record `changes` were computed from is still stored
/// unchanged. `current` looks a record up in the state the commit will write
/// to.
///
/// # Errors
///
/// Returns [`Error::Conflict`] for the first record that was modified since
/// it was read, [`Error::NotFound`] for one that is gone, or the lookup's
/// error.
pub fn verify_unchanged(
    changes: &[Change],
    current: impl Fn(&RecordKey) -> Result<Option<Record>>,
) -> Result<()> {
    for expected in changes.iter().filter_map(Change::expected) {
        let key = expected.key();
        match current(&key)? {
            Some(found) if &found == expected => {}
            Some(_) => {
                debug!(%key, "Record changed since it was read");
                return Err(Error::Conflict {
                    entity: key.entity(),
                    key: key.to_string(),
                });
            }
            None => return Err(key.not_found()),
        }
    }
    Ok(())
}

/// Current copy of the record behind `key`.
///
/// # Errors
///
/// Returns an error if the backend cannot be read.
pub fn current_record<S: RecordStore + ?Sized>(store: &S, key: &RecordKey) -> Result<Option<Record>> {
    Ok(match key {
        RecordKey::User(id) => store.get_user(id)?.map(Record::User),
        RecordKey::Vehicle(plate) => store.get_vehicle(plate)?.map(Record::Vehicle),
        RecordKey::Request(id) => store.get_request(*id)?.map(Record::Request),
        RecordKey::Trip(id) => store.get_trip(*id)?.map(Record::Trip),
    })
}

/// Filter for [`RecordStore::find_users`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    /// Only users with this role.
    pub role: Option<Role>,
    /// Only users with this email (case-insensitive).
    pub email: Option<String>,
    /// Only active or inactive users.
    pub active: Option<bool>,
}

impl UserQuery {
    /// Whether `user` passes the filter.
    #[must_use]
    pub fn matches(&self, user: &User) -> bool {
        self.role.is_none_or(|role| user.role == role)
            && self.active.is_none_or(|active| user.active == active)
            && self.email.as_deref().is_none_or(|email| {
                user.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
    }
}

/// Filter for [`RecordStore::find_vehicles`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleQuery {
    /// Only vehicles with this status.
    pub status: Option<VehicleStatus>,
}

impl VehicleQuery {
    /// Whether `vehicle` passes the filter.
    #[must_use]
    pub fn matches(&self, vehicle: &Vehicle) -> bool {
        self.status.is_none_or(|status| vehicle.status == status)
    }
}

/// Filter for [`RecordStore::find_requests`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestQuery {
    /// Only requests with this status.
    pub status: Option<RequestStatus>,
    /// Only requests for this vehicle.
    pub plate: Option<Plate>,
    /// Only requests made by this user.
    pub requester: Option<String>,
}

impl RequestQuery {
    /// Whether `request` passes the filter.
    #[must_use]
    pub fn matches(&self, request: &ScheduleRequest) -> bool {
        self.status.is_none_or(|status| request.status == status)
            && self.plate.as_ref().is_none_or(|plate| &request.plate == plate)
            && self
                .requester
                .as_deref()
                .is_none_or(|requester| request.requester_id == requester)
    }
}

/// Filter for [`RecordStore::find_trips`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripQuery {
    /// Only trips of this vehicle.
    pub plate: Option<Plate>,
    /// Only trips with this status.
    pub status: Option<TripStatus>,
    /// Only trips fulfilling this request.
    pub request: Option<RequestId>,
}

impl TripQuery {
    /// In-progress trips on `plate`.
    #[must_use]
    pub fn open_on(plate: &Plate) -> Self {
        Self {
            plate: Some(plate.clone()),
            status: Some(TripStatus::InProgress),
            request: None,
        }
    }

    /// Whether `trip` passes the filter.
    #[must_use]
    pub fn matches(&self, trip: &Trip) -> bool {
        self.plate.as_ref().is_none_or(|plate| &trip.plate == plate)
            && self.status.is_none_or(|status| trip.status == status)
            && self.request.is_none_or(|id| trip.request_id == Some(id))
    }
}

/// Durable storage for users, vehicles, schedule requests and trips.
///
/// Lookups return entities in the crate's model types; each backend maps its
/// native row shape at this boundary. `find_*` results are ordered: users by
/// id, vehicles by plate, requests by creation time and trips by departure
/// time.
pub trait RecordStore: Send + Sync + Debug {
    /// Short backend name for logs and status output.
    fn backend_name(&self) -> &'static str;

    /// What [`commit`](Self::commit) guarantees.
    fn consistency(&self) -> Consistency {
        Consistency::Compensating
    }

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_user(&self, id: &str) -> Result<Option<User>>;

    /// Look up a vehicle by plate.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_vehicle(&self, plate: &Plate) -> Result<Option<Vehicle>>;

    /// Look up a schedule request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_request(&self, id: RequestId) -> Result<Option<ScheduleRequest>>;

    /// Look up a trip by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_trip(&self, id: TripId) -> Result<Option<Trip>>;

    /// Users matching `query`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn find_users(&self, query: &UserQuery) -> Result<Vec<User>>;

    /// Vehicles matching `query`, ordered by plate.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn find_vehicles(&self, query: &VehicleQuery) -> Result<Vec<Vehicle>>;

    /// Schedule requests matching `query`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn find_requests(&self, query: &RequestQuery) -> Result<Vec<ScheduleRequest>>;

    /// Trips matching `query`, earliest departure first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn find_trips(&self, query: &TripQuery) -> Result<Vec<Trip>>;

    /// Apply one write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when updating, restoring or deleting a
    /// missing key, [`Error::Validation`] when inserting a duplicate key, or a
    /// storage error.
    fn apply(&self, write: &Write) -> Result<()>;

    /// Apply several writes as one logical unit.
    ///
    /// A change to an existing record only lands if that record is still the
    /// copy the change was computed from (see [`Change::expected`]). The
    /// default implementation compensates; see [`commit_compensating`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if a record changed since it was read, the
    /// error of the first failing write, or [`Error::RollbackIncomplete`] if
    /// undoing the earlier writes also failed.
    fn commit(&self, changes: &[Change]) -> Result<()> {
        commit_compensating(self, changes)
    }
}

/// Verify `changes` against the store, then apply them in order; on the
/// first failure, apply the undo of every already-applied change in reverse
/// order.
///
/// # Errors
///
/// Returns [`Error::Conflict`] if a record changed since it was read, the
/// original failure once compensation succeeded, or
/// [`Error::RollbackIncomplete`] when at least one undo failed.
pub fn commit_compensating<S: RecordStore + ?Sized>(store: &S, changes: &[Change]) -> Result<()> {
    verify_unchanged(changes, |key| current_record(store, key))?;
    compensate(store.backend_name(), changes, |write| store.apply(write))
}

/// Apply `changes` through `apply`, undoing the applied ones if a later one
/// fails.
///
/// # Errors
///
/// Returns the original failure once compensation succeeded, or
/// [`Error::RollbackIncomplete`] when at least one undo failed.
pub fn compensate(
    backend: &'static str,
    changes: &[Change],
    mut apply: impl FnMut(&Write) -> Result<()>,
) -> Result<()> {
    for (applied, change) in changes.iter().enumerate() {
        let Err(err) = apply(&change.forward) else {
            continue;
        };
        if applied == 0 {
            return Err(err);
        }

        warn!(
            backend,
            failed = change.forward.label(),
            key = %change.forward.key(),
            applied,
            error = %err,
            "Write failed, undoing applied changes"
        );

        let mut undo_failures = Vec::new();
        for done in changes[..applied].iter().rev() {
            if let Err(undo_err) = apply(&done.undo) {
                error!(
                    backend,
                    undo = done.undo.label(),
                    key = %done.undo.key(),
                    error = %undo_err,
                    "Undo failed, store may be inconsistent"
                );
                undo_failures.push(format!("{} {}: {undo_err}", done.undo.label(), done.undo.key()));
            }
        }

        if undo_failures.is_empty() {
            debug!(backend, undone = applied, "Compensation complete");
            return Err(err);
        }
        return Err(Error::RollbackIncomplete {
            message: format!("{err}; undo failed for {}", undo_failures.join(", ")),
        });
    }
    Ok(())
}

/// Open the backend selected in `config`.
///
/// # Errors
///
/// Returns an error if the backend's file cannot be opened or parsed.
pub fn open(config: &Config) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(config.database_path())?),
        StoreBackend::Sheet => Arc::new(SheetStore::open(config.sheet_path())?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    debug!(
        backend = store.backend_name(),
        consistency = %store.consistency(),
        "Record store ready"
    );
    Ok(store)
}

pub(crate) fn sort_requests(requests: &mut [ScheduleRequest]) {
    requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

pub(crate) fn sort_trips(trips: &mut [Trip]) {
    trips.sort_by(|a, b| a.departed_at.cmp(&b.departed_at).then(a.id.cmp(&b.id)));
}
