//! `SQLite` record store.
//!
//! The relational backend. Each entity has its own table; multi-write commits
//! run inside one transaction, and a partial unique index keeps a second
//! in-progress trip on the same plate from ever being written.
//!
//! Several processes may open the same file. A commit takes the database's
//! write lock up front (`BEGIN IMMEDIATE`) and re-reads every record its
//! changes were computed from before writing, so a writer that lost a race
//! gets [`Error::Conflict`] instead of overwriting the winner.

pub mod migrations;
pub mod schema;

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};
use tracing::{debug, info, warn};

use super::{
    verify_unchanged, Change, Consistency, Record, RecordKey, RecordStore, RequestQuery,
    TripQuery, UserQuery, VehicleQuery, Write,
};
use crate::error::{Error, Result};
use crate::model::{
    Plate, RequestId, ScheduleRequest, TimeWindow, Trip, TripId, User, Vehicle, DATE_FORMAT,
    TIME_FORMAT,
};

/// How long a connection waits for another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const USER_COLUMNS: &str = "id, name, email, phone, role, active, credential, created_at";
const VEHICLE_COLUMNS: &str = "plate, make, model, year, color, fuel_type, odometer, status";
const REQUEST_COLUMNS: &str = "id, requester_id, plate, date, start_time, end_time, destination, \
     passengers, notes, status, cancel_reason, cancelled_at, created_at, updated_at";
const TRIP_COLUMNS: &str = "id, plate, driver_id, request_id, departed_at, odometer_start, \
     arrived_at, odometer_end, destination, notes, status";

const INSERT_USER: &str = "INSERT INTO users (id, name, email, phone, role, active, credential, \
     created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";
const UPDATE_USER: &str = "UPDATE users SET name = ?2, email = ?3, phone = ?4, role = ?5, \
     active = ?6, credential = ?7, created_at = ?8 WHERE id = ?1";

const INSERT_VEHICLE: &str = "INSERT INTO vehicles (plate, make, model, year, color, fuel_type, \
     odometer, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";
const UPDATE_VEHICLE: &str = "UPDATE vehicles SET make = ?2, model = ?3, year = ?4, color = ?5, \
     fuel_type = ?6, odometer = ?7, status = ?8 WHERE plate = ?1";

const INSERT_REQUEST: &str = "INSERT INTO schedule_requests (id, requester_id, plate, date, \
     start_time, end_time, destination, passengers, notes, status, cancel_reason, cancelled_at, \
     created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";
const UPDATE_REQUEST: &str = "UPDATE schedule_requests SET requester_id = ?2, plate = ?3, \
     date = ?4, start_time = ?5, end_time = ?6, destination = ?7, passengers = ?8, notes = ?9, \
     status = ?10, cancel_reason = ?11, cancelled_at = ?12, created_at = ?13, updated_at = ?14 \
     WHERE id = ?1";

const INSERT_TRIP: &str = "INSERT INTO trips (id, plate, driver_id, request_id, departed_at, \
     odometer_start, arrived_at, odometer_end, destination, notes, status) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";
const UPDATE_TRIP: &str = "UPDATE trips SET plate = ?2, driver_id = ?3, request_id = ?4, \
     departed_at = ?5, odometer_start = ?6, arrived_at = ?7, odometer_end = ?8, \
     destination = ?9, notes = ?10, status = ?11 WHERE id = ?1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Insert,
    Overwrite,
}

/// Record store backed by a `SQLite` database file.
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database, mainly for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn consistency(&self) -> Consistency {
        Consistency::Transactional
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        get_user(&self.conn.lock(), id)
    }

    fn get_vehicle(&self, plate: &Plate) -> Result<Option<Vehicle>> {
        get_vehicle(&self.conn.lock(), plate)
    }

    fn get_request(&self, id: RequestId) -> Result<Option<ScheduleRequest>> {
        get_request(&self.conn.lock(), id)
    }

    fn get_trip(&self, id: TripId) -> Result<Option<Trip>> {
        get_trip(&self.conn.lock(), id)
    }

    fn find_users(&self, query: &UserQuery) -> Result<Vec<User>> {
        let mut filter = Filter::default();
        if let Some(role) = query.role {
            filter.eq("role", role.to_string());
        }
        if let Some(email) = &query.email {
            filter.clause("lower(email) = lower(?)", email.clone());
        }
        if let Some(active) = query.active {
            filter.literal(if active { "active = 1" } else { "active = 0" });
        }
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users{} ORDER BY id",
            filter.where_clause()
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let users = stmt
            .query_map(params_from_iter(filter.args.iter()), row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn find_vehicles(&self, query: &VehicleQuery) -> Result<Vec<Vehicle>> {
        let mut filter = Filter::default();
        if let Some(status) = query.status {
            filter.eq("status", status.to_string());
        }
        let sql = format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles{} ORDER BY plate",
            filter.where_clause()
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let vehicles = stmt
            .query_map(params_from_iter(filter.args.iter()), row_to_vehicle)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(vehicles)
    }

    fn find_requests(&self, query: &RequestQuery) -> Result<Vec<ScheduleRequest>> {
        let mut filter = Filter::default();
        if let Some(status) = query.status {
            filter.eq("status", status.to_string());
        }
        if let Some(plate) = &query.plate {
            filter.eq("plate", plate.to_string());
        }
        if let Some(requester) = &query.requester {
            filter.eq("requester_id", requester.clone());
        }
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM schedule_requests{} ORDER BY created_at, id",
            filter.where_clause()
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let requests = stmt
            .query_map(params_from_iter(filter.args.iter()), row_to_request)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(requests)
    }

    fn find_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let mut filter = Filter::default();
        if let Some(plate) = &query.plate {
            filter.eq("plate", plate.to_string());
        }
        if let Some(status) = query.status {
            filter.eq("status", status.to_string());
        }
        if let Some(request) = query.request {
            filter.eq("request_id", request.to_string());
        }
        let sql = format!(
            "SELECT {TRIP_COLUMNS} FROM trips{} ORDER BY departed_at, id",
            filter.where_clause()
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let trips = stmt
            .query_map(params_from_iter(filter.args.iter()), row_to_trip)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(trips)
    }

    fn apply(&self, write: &Write) -> Result<()> {
        apply_on(&self.conn.lock(), write)
    }

    fn commit(&self, changes: &[Change]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        verify_unchanged(changes, |key| record_on(&tx, key))?;
        for change in changes {
            if let Err(err) = apply_on(&tx, &change.forward) {
                warn!(
                    failed = change.forward.label(),
                    key = %change.forward.key(),
                    error = %err,
                    "Write failed, rolling back transaction"
                );
                return Err(err);
            }
        }
        tx.commit()?;
        debug!(writes = changes.len(), "Transaction committed");
        Ok(())
    }
}

/// WHERE-clause builder with positional text arguments.
#[derive(Debug, Default)]
struct Filter {
    clauses: Vec<String>,
    args: Vec<String>,
}

impl Filter {
    fn eq(&mut self, column: &str, value: String) {
        self.clause(&format!("{column} = ?"), value);
    }

    fn clause(&mut self, clause: &str, value: String) {
        self.clauses.push(clause.to_string());
        self.args.push(value);
    }

    fn literal(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn apply_on(conn: &Connection, write: &Write) -> Result<()> {
    let key = write.key();
    debug!(write = write.label(), %key, "sqlite write");

    let affected = match write {
        Write::Insert(record) => {
            if exists(conn, &key)? {
                return Err(key.duplicate());
            }
            write_record(conn, record, Mode::Insert).map_err(|err| match err.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) if matches!(record, Record::Trip(_)) => {
                    Error::invalid_state(format!(
                        "vehicle {} already has a trip in progress",
                        trip_plate(record)
                    ))
                }
                _ => Error::from(err),
            })?
        }
        Write::Restore(record) => write_record(conn, record, Mode::Overwrite)?,
        Write::UpdateVehicle { plate, patch } => {
            let mut vehicle = get_vehicle(conn, plate)?.ok_or_else(|| key.not_found())?;
            patch.apply_to(&mut vehicle);
            write_record(conn, &Record::Vehicle(vehicle), Mode::Overwrite)?
        }
        Write::UpdateRequest { id, patch } => {
            let mut request = get_request(conn, *id)?.ok_or_else(|| key.not_found())?;
            patch.apply_to(&mut request);
            write_record(conn, &Record::Request(request), Mode::Overwrite)?
        }
        Write::UpdateTrip { id, patch } => {
            let mut trip = get_trip(conn, *id)?.ok_or_else(|| key.not_found())?;
            patch.apply_to(&mut trip);
            write_record(conn, &Record::Trip(trip), Mode::Overwrite)?
        }
        Write::Delete(record_key) => match record_key {
            RecordKey::User(id) => conn.execute("DELETE FROM users WHERE id = ?1", [id])?,
            RecordKey::Vehicle(plate) => {
                conn.execute("DELETE FROM vehicles WHERE plate = ?1", [plate.as_str()])?
            }
            RecordKey::Request(id) => conn.execute(
                "DELETE FROM schedule_requests WHERE id = ?1",
                [id.to_string()],
            )?,
            RecordKey::Trip(id) => {
                conn.execute("DELETE FROM trips WHERE id = ?1", [id.to_string()])?
            }
        },
    };

    if affected == 0 {
        return Err(key.not_found());
    }
    Ok(())
}

fn record_on(conn: &Connection, key: &RecordKey) -> Result<Option<Record>> {
    Ok(match key {
        RecordKey::User(id) => get_user(conn, id)?.map(Record::User),
        RecordKey::Vehicle(plate) => get_vehicle(conn, plate)?.map(Record::Vehicle),
        RecordKey::Request(id) => get_request(conn, *id)?.map(Record::Request),
        RecordKey::Trip(id) => get_trip(conn, *id)?.map(Record::Trip),
    })
}

fn trip_plate(record: &Record) -> String {
    match record {
        Record::Trip(trip) => trip.plate.to_string(),
        other => other.key().to_string(),
    }
}

fn exists(conn: &Connection, key: &RecordKey) -> Result<bool> {
    let (sql, arg) = match key {
        RecordKey::User(id) => ("SELECT 1 FROM users WHERE id = ?1", id.clone()),
        RecordKey::Vehicle(plate) => ("SELECT 1 FROM vehicles WHERE plate = ?1", plate.to_string()),
        RecordKey::Request(id) => (
            "SELECT 1 FROM schedule_requests WHERE id = ?1",
            id.to_string(),
        ),
        RecordKey::Trip(id) => ("SELECT 1 FROM trips WHERE id = ?1", id.to_string()),
    };
    let found: Option<i64> = conn.query_row(sql, [arg], |row| row.get(0)).optional()?;
    Ok(found.is_some())
}

fn write_record(conn: &Connection, record: &Record, mode: Mode) -> rusqlite::Result<usize> {
    let insert = mode == Mode::Insert;
    match record {
        Record::User(user) => conn.execute(
            if insert { INSERT_USER } else { UPDATE_USER },
            params![
                user.id,
                user.name,
                user.email,
                user.phone,
                user.role.to_string(),
                user.active,
                user.credential,
                timestamp(&user.created_at),
            ],
        ),
        Record::Vehicle(vehicle) => conn.execute(
            if insert { INSERT_VEHICLE } else { UPDATE_VEHICLE },
            params![
                vehicle.plate.as_str(),
                vehicle.make,
                vehicle.model,
                vehicle.year,
                vehicle.color,
                vehicle.fuel_type,
                vehicle.odometer,
                vehicle.status.to_string(),
            ],
        ),
        Record::Request(request) => conn.execute(
            if insert { INSERT_REQUEST } else { UPDATE_REQUEST },
            params![
                request.id.to_string(),
                request.requester_id,
                request.plate.as_str(),
                request.date.format(DATE_FORMAT).to_string(),
                request.window.start.format(TIME_FORMAT).to_string(),
                request.window.end.format(TIME_FORMAT).to_string(),
                request.destination,
                request.passengers,
                request.notes,
                request.status.to_string(),
                request.cancel_reason,
                request.cancelled_at.as_ref().map(timestamp),
                timestamp(&request.created_at),
                timestamp(&request.updated_at),
            ],
        ),
        Record::Trip(trip) => conn.execute(
            if insert { INSERT_TRIP } else { UPDATE_TRIP },
            params![
                trip.id.to_string(),
                trip.plate.as_str(),
                trip.driver_id,
                trip.request_id.map(|id| id.to_string()),
                timestamp(&trip.departed_at),
                trip.odometer_start,
                trip.arrived_at.as_ref().map(timestamp),
                trip.odometer_end,
                trip.destination,
                trip.notes,
                trip.status.to_string(),
            ],
        ),
    }
}

fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_user).optional()?)
}

fn get_vehicle(conn: &Connection, plate: &Plate) -> Result<Option<Vehicle>> {
    let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE plate = ?1");
    Ok(conn
        .query_row(&sql, [plate.as_str()], row_to_vehicle)
        .optional()?)
}

fn get_request(conn: &Connection, id: RequestId) -> Result<Option<ScheduleRequest>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM schedule_requests WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], row_to_request)
        .optional()?)
}

fn get_trip(conn: &Connection, id: TripId) -> Result<Option<Trip>> {
    let sql = format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], row_to_trip)
        .optional()?)
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Turn a failed text conversion into a rusqlite column error.
fn column<T, E: Display>(idx: usize, parsed: std::result::Result<T, E>) -> rusqlite::Result<T> {
    parsed.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into()))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    column(idx, DateTime::parse_from_rfc3339(&raw)).map(|dt| dt.with_timezone(&Utc))
}

fn optional_timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| column(idx, DateTime::parse_from_rfc3339(&raw)).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
}

fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: Display,
{
    let raw: String = row.get(idx)?;
    column(idx, raw.parse())
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        role: parsed_column(row, 4)?,
        active: row.get(5)?,
        credential: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
    })
}

fn row_to_vehicle(row: &Row<'_>) -> rusqlite::Result<Vehicle> {
    Ok(Vehicle {
        plate: parsed_column(row, 0)?,
        make: row.get(1)?,
        model: row.get(2)?,
        year: row.get(3)?,
        color: row.get(4)?,
        fuel_type: row.get(5)?,
        odometer: row.get(6)?,
        status: parsed_column(row, 7)?,
    })
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<ScheduleRequest> {
    let date: String = row.get(3)?;
    let start: String = row.get(4)?;
    let end: String = row.get(5)?;
    let start = column(4, NaiveTime::parse_from_str(&start, TIME_FORMAT))?;
    let end = column(5, NaiveTime::parse_from_str(&end, TIME_FORMAT))?;

    Ok(ScheduleRequest {
        id: parsed_column(row, 0)?,
        requester_id: row.get(1)?,
        plate: parsed_column(row, 2)?,
        date: column(3, NaiveDate::parse_from_str(&date, DATE_FORMAT))?,
        window: column(5, TimeWindow::new(start, end))?,
        destination: row.get(6)?,
        passengers: row.get(7)?,
        notes: row.get(8)?,
        status: parsed_column(row, 9)?,
        cancel_reason: row.get(10)?,
        cancelled_at: optional_timestamp_column(row, 11)?,
        created_at: timestamp_column(row, 12)?,
        updated_at: timestamp_column(row, 13)?,
    })
}

fn row_to_trip(row: &Row<'_>) -> rusqlite::Result<Trip> {
    let request_id: Option<String> = row.get(3)?;
    Ok(Trip {
        id: parsed_column(row, 0)?,
        plate: parsed_column(row, 1)?,
        driver_id: row.get(2)?,
        request_id: request_id
            .map(|raw| column(3, raw.parse::<RequestId>()))
            .transpose()?,
        departed_at: timestamp_column(row, 4)?,
        odometer_start: row.get(5)?,
        arrived_at: optional_timestamp_column(row, 6)?,
        odometer_end: row.get(7)?,
        destination: row.get(8)?,
        notes: row.get(9)?,
        status: parsed_column(row, 10)?,
    })
}
