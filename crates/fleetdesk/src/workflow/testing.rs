//! Shared fixtures for workflow tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use super::{FleetWorkflow, WorkflowSettings};
use crate::clock::{Clock, ManualClock};
use crate::config::Config;
use crate::model::{
    Actor, NewUser, NewVehicle, Plate, RequestId, Role, ScheduleInput, ScheduleRequest, Trip,
    TripId, TripStatus, Vehicle,
};
use crate::store::{
    MemoryStore, Record, RecordStore, SheetStore, SqliteStore, TripQuery, Write,
};

pub(crate) const ADMIN: &str = "admin@fleet.test";
pub(crate) const REQUESTER: &str = "ana@fleet.test";
pub(crate) const DRIVER: &str = "joao@fleet.test";

pub(crate) fn plate(raw: &str) -> Plate {
    Plate::parse(raw).unwrap()
}

pub(crate) fn test_settings() -> WorkflowSettings {
    let mut settings = WorkflowSettings::from_config(&Config::default()).unwrap();
    settings.lock_timeout = Duration::from_secs(5);
    settings
}

pub(crate) fn schedule_input(raw_plate: &str) -> ScheduleInput {
    ScheduleInput {
        plate: raw_plate.to_string(),
        date: "2025-06-01".to_string(),
        start: "08:00".to_string(),
        end: "12:00".to_string(),
        destination: Some("Campinas".to_string()),
        passengers: Some(2),
        notes: None,
    }
}

/// A workflow over a seeded store: one admin, one requester, one driver and
/// vehicle `ABC-1234` at 15000.
pub(crate) struct Fixture {
    pub(crate) workflow: FleetWorkflow,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) admin: Actor,
    pub(crate) requester: Actor,
    _dir: Option<TempDir>,
}

impl Fixture {
    pub(crate) fn memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), None)
    }

    pub(crate) fn with_store(store: Arc<dyn RecordStore>, dir: Option<TempDir>) -> Self {
        Self::with_settings(store, dir, test_settings())
    }

    pub(crate) fn with_settings(
        store: Arc<dyn RecordStore>,
        dir: Option<TempDir>,
        settings: WorkflowSettings,
    ) -> Self {
        crate::logging::init_test_logging();

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
        ));
        let workflow = FleetWorkflow::new(store, settings).with_clock(clock.clone());

        let mut actors = Vec::new();
        for (name, email, role) in [
            ("Fleet Admin", ADMIN, Role::Admin),
            ("Ana Souza", REQUESTER, Role::Other),
            ("Joao Lima", DRIVER, Role::Driver),
        ] {
            let user = workflow
                .register_user(NewUser {
                    name: name.to_string(),
                    email: Some(email.to_string()),
                    role,
                    ..NewUser::default()
                })
                .unwrap();
            actors.push(Actor::from(&user));
        }

        let fixture = Self {
            workflow,
            clock,
            admin: actors[0].clone(),
            requester: actors[1].clone(),
            _dir: dir,
        };
        fixture.add_vehicle("ABC-1234", 15000.0);
        fixture
    }

    pub(crate) fn add_vehicle(&self, raw: &str, odometer: f64) -> Vehicle {
        self.workflow
            .register_vehicle(NewVehicle {
                plate: raw.to_string(),
                make: "Fiat".to_string(),
                model: "Strada".to_string(),
                odometer,
                ..NewVehicle::default()
            })
            .unwrap()
    }

    pub(crate) fn request_for(&self, raw_plate: &str) -> ScheduleRequest {
        self.workflow
            .create_schedule_request(&self.requester, &schedule_input(raw_plate))
            .unwrap()
    }

    pub(crate) fn confirmed_request(&self, raw_plate: &str) -> ScheduleRequest {
        let request = self.request_for(raw_plate);
        self.workflow
            .confirm_schedule_request(request.id, &self.admin)
            .unwrap()
    }

    pub(crate) fn request(&self, id: RequestId) -> ScheduleRequest {
        self.workflow.store().get_request(id).unwrap().unwrap()
    }

    pub(crate) fn vehicle(&self, raw: &str) -> Vehicle {
        self.workflow.store().get_vehicle(&plate(raw)).unwrap().unwrap()
    }

    pub(crate) fn all_trips(&self) -> Vec<Trip> {
        self.workflow
            .store()
            .find_trips(&TripQuery::default())
            .unwrap()
    }

    pub(crate) fn open_trips(&self, raw: &str) -> Vec<Trip> {
        self.workflow
            .store()
            .find_trips(&TripQuery::open_on(&plate(raw)))
            .unwrap()
    }

    /// Insert an open trip without going through the workflow's checks.
    pub(crate) fn open_trip_directly(&self, raw: &str, odometer_start: f64) -> Trip {
        let trip = Trip {
            id: TripId::new(),
            plate: plate(raw),
            driver_id: DRIVER.to_string(),
            request_id: None,
            departed_at: self.clock.now(),
            odometer_start,
            arrived_at: None,
            odometer_end: None,
            destination: None,
            notes: None,
            status: TripStatus::InProgress,
        };
        self.workflow
            .store()
            .apply(&Write::Insert(Record::Trip(trip.clone())))
            .unwrap();
        trip
    }
}

/// Run `test` once per backend, each on a fresh seeded store.
pub(crate) fn for_each_backend(test: impl Fn(Fixture)) {
    test(Fixture::memory());
    test(Fixture::with_store(
        Arc::new(SqliteStore::open_in_memory().unwrap()),
        None,
    ));

    let dir = TempDir::new().unwrap();
    let sheet = SheetStore::open(dir.path().join("fleet-workbook.json")).unwrap();
    test(Fixture::with_store(Arc::new(sheet), Some(dir)));
}
