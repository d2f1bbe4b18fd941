//! Spreadsheet record store.
//!
//! The workbook holds one worksheet per collection (`Users`, `Vehicles`,
//! `Requests`, `Trips`). A worksheet is a header row plus rows of string
//! cells, the shape a spreadsheet export has. Columns are found by header
//! name, so users may reorder them or add their own; unknown columns and
//! unknown worksheets are carried through untouched.
//!
//! Rows have no stable address of their own, so every worksheet has an `ID`
//! column and the store keeps an id to row-index map per worksheet, rebuilt
//! on load and after each deletion.
//!
//! The workbook file is JSON and is rewritten (temp file, then rename) after
//! every write. There are no transactions; commits compensate. Writers from
//! several processes are serialized by an advisory lock on a sibling
//! `.lock` file.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{
    compensate, sort_requests, sort_trips, verify_unchanged, Change, Record, RecordKey,
    RecordStore, RequestQuery, TripQuery, UserQuery, VehicleQuery, Write,
};
use crate::error::{Error, Result};
use crate::model::{
    Plate, RequestId, ScheduleRequest, TimeWindow, Trip, TripId, User, Vehicle, DATE_FORMAT,
    TIME_FORMAT,
};

const ID: &str = "ID";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Worksheet {
    header: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkbookFile {
    sheets: BTreeMap<String, Worksheet>,
}

/// An entity that lives in one worksheet.
trait SheetRecord: Sized {
    const SHEET: &'static str;
    /// Required columns; the first is always `ID`.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> String;

    /// Normalize an `ID` cell for the row index.
    fn index_key(raw: &str) -> String {
        raw.trim().to_string()
    }

    fn cells(&self) -> Vec<(&'static str, String)>;
    fn from_row(row: &RowView<'_>) -> Result<Self>;
}

/// Read access to one row, by column name.
struct RowView<'a> {
    sheet: &'static str,
    columns: &'a HashMap<String, usize>,
    cells: &'a [String],
}

impl RowView<'_> {
    fn raw(&self, column: &str) -> &str {
        self.columns
            .get(column)
            .and_then(|&idx| self.cells.get(idx))
            .map_or("", String::as_str)
    }

    fn error(&self, column: &str, message: impl Display) -> Error {
        Error::sheet_format(
            self.sheet,
            format!("row {}: column {column}: {message}", self.raw(ID).trim()),
        )
    }

    fn text(&self, column: &str) -> Option<String> {
        let raw = self.raw(column);
        (!raw.is_empty()).then(|| raw.to_string())
    }

    fn required(&self, column: &str) -> Result<String> {
        let raw = self.raw(column).trim();
        if raw.is_empty() {
            return Err(self.error(column, "value is required"));
        }
        Ok(raw.to_string())
    }

    fn parse<T>(&self, column: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.required(column)?;
        raw.parse().map_err(|e| self.error(column, e))
    }

    fn parse_opt<T>(&self, column: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.raw(column).trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(|e| self.error(column, e))
    }

    fn timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        let raw = self.required(column)?;
        parse_timestamp(&raw).map_err(|e| self.error(column, e))
    }

    fn timestamp_opt(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        let raw = self.raw(column).trim();
        if raw.is_empty() {
            return Ok(None);
        }
        parse_timestamp(raw)
            .map(Some)
            .map_err(|e| self.error(column, e))
    }

    fn date(&self, column: &str) -> Result<NaiveDate> {
        let raw = self.required(column)?;
        NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| self.error(column, e))
    }

    fn time(&self, column: &str) -> Result<NaiveTime> {
        let raw = self.required(column)?;
        NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(|e| self.error(column, e))
    }

    fn flag(&self, column: &str) -> Result<bool> {
        match self.raw(column).trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            other => Err(self.error(column, format!("not a boolean: {other}"))),
        }
    }
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn opt<T: ToString>(value: Option<&T>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

impl SheetRecord for User {
    const SHEET: &'static str = "Users";
    const COLUMNS: &'static [&'static str] = &[
        ID,
        "Name",
        "Email",
        "Phone",
        "Role",
        "Active",
        "Credential",
        "CreatedAt",
    ];

    fn id(&self) -> String {
        self.id.clone()
    }

    fn cells(&self) -> Vec<(&'static str, String)> {
        vec![
            (ID, self.id.clone()),
            ("Name", self.name.clone()),
            ("Email", opt(self.email.as_ref())),
            ("Phone", opt(self.phone.as_ref())),
            ("Role", self.role.to_string()),
            ("Active", if self.active { "TRUE" } else { "FALSE" }.to_string()),
            ("Credential", opt(self.credential.as_ref())),
            ("CreatedAt", timestamp(&self.created_at)),
        ]
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            id: row.required(ID)?,
            name: row.required("Name")?,
            email: row.text("Email"),
            phone: row.text("Phone"),
            role: row.parse("Role")?,
            active: row.flag("Active")?,
            credential: row.text("Credential"),
            created_at: row.timestamp("CreatedAt")?,
        })
    }
}

impl SheetRecord for Vehicle {
    const SHEET: &'static str = "Vehicles";
    const COLUMNS: &'static [&'static str] = &[
        ID, "Make", "Model", "Year", "Color", "FuelType", "Odometer", "Status",
    ];

    fn id(&self) -> String {
        self.plate.to_string()
    }

    fn index_key(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    fn cells(&self) -> Vec<(&'static str, String)> {
        vec![
            (ID, self.plate.to_string()),
            ("Make", opt(self.make.as_ref())),
            ("Model", opt(self.model.as_ref())),
            ("Year", opt(self.year.as_ref())),
            ("Color", opt(self.color.as_ref())),
            ("FuelType", opt(self.fuel_type.as_ref())),
            ("Odometer", self.odometer.to_string()),
            ("Status", self.status.to_string()),
        ]
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            plate: Plate::parse(row.raw(ID)).map_err(|e| row.error(ID, e))?,
            make: row.text("Make"),
            model: row.text("Model"),
            year: row.parse_opt("Year")?,
            color: row.text("Color"),
            fuel_type: row.text("FuelType"),
            odometer: row.parse_opt("Odometer")?.unwrap_or(0.0),
            status: row.parse("Status")?,
        })
    }
}

impl SheetRecord for ScheduleRequest {
    const SHEET: &'static str = "Requests";
    const COLUMNS: &'static [&'static str] = &[
        ID,
        "Requester",
        "Plate",
        "Date",
        "Start",
        "End",
        "Destination",
        "Passengers",
        "Notes",
        "Status",
        "CancelReason",
        "CancelledAt",
        "CreatedAt",
        "UpdatedAt",
    ];

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn cells(&self) -> Vec<(&'static str, String)> {
        vec![
            (ID, self.id.to_string()),
            ("Requester", self.requester_id.clone()),
            ("Plate", self.plate.to_string()),
            ("Date", self.date.format(DATE_FORMAT).to_string()),
            ("Start", self.window.start.format(TIME_FORMAT).to_string()),
            ("End", self.window.end.format(TIME_FORMAT).to_string()),
            ("Destination", opt(self.destination.as_ref())),
            ("Passengers", opt(self.passengers.as_ref())),
            ("Notes", opt(self.notes.as_ref())),
            ("Status", self.status.to_string()),
            ("CancelReason", opt(self.cancel_reason.as_ref())),
            (
                "CancelledAt",
                self.cancelled_at.as_ref().map(timestamp).unwrap_or_default(),
            ),
            ("CreatedAt", timestamp(&self.created_at)),
            ("UpdatedAt", timestamp(&self.updated_at)),
        ]
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        let window =
            TimeWindow::new(row.time("Start")?, row.time("End")?).map_err(|e| row.error("End", e))?;
        Ok(Self {
            id: row.parse(ID)?,
            requester_id: row.required("Requester")?,
            plate: row.parse("Plate")?,
            date: row.date("Date")?,
            window,
            destination: row.text("Destination"),
            passengers: row.parse_opt("Passengers")?,
            notes: row.text("Notes"),
            status: row.parse("Status")?,
            cancel_reason: row.text("CancelReason"),
            cancelled_at: row.timestamp_opt("CancelledAt")?,
            created_at: row.timestamp("CreatedAt")?,
            updated_at: row.timestamp("UpdatedAt")?,
        })
    }
}

impl SheetRecord for Trip {
    const SHEET: &'static str = "Trips";
    const COLUMNS: &'static [&'static str] = &[
        ID,
        "Plate",
        "Driver",
        "Request",
        "DepartedAt",
        "OdometerStart",
        "ArrivedAt",
        "OdometerEnd",
        "Destination",
        "Notes",
        "Status",
    ];

    fn id(&self) -> String {
        self.id.to_string()
    }

    fn cells(&self) -> Vec<(&'static str, String)> {
        vec![
            (ID, self.id.to_string()),
            ("Plate", self.plate.to_string()),
            ("Driver", self.driver_id.clone()),
            ("Request", opt(self.request_id.as_ref())),
            ("DepartedAt", timestamp(&self.departed_at)),
            ("OdometerStart", self.odometer_start.to_string()),
            (
                "ArrivedAt",
                self.arrived_at.as_ref().map(timestamp).unwrap_or_default(),
            ),
            ("OdometerEnd", opt(self.odometer_end.as_ref())),
            ("Destination", opt(self.destination.as_ref())),
            ("Notes", opt(self.notes.as_ref())),
            ("Status", self.status.to_string()),
        ]
    }

    fn from_row(row: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            id: row.parse::<TripId>(ID)?,
            plate: row.parse("Plate")?,
            driver_id: row.required("Driver")?,
            request_id: row.parse_opt::<RequestId>("Request")?,
            departed_at: row.timestamp("DepartedAt")?,
            odometer_start: row.parse("OdometerStart")?,
            arrived_at: row.timestamp_opt("ArrivedAt")?,
            odometer_end: row.parse_opt("OdometerEnd")?,
            destination: row.text("Destination"),
            notes: row.text("Notes"),
            status: row.parse("Status")?,
        })
    }
}

/// One worksheet with its column lookup and id index.
#[derive(Debug, Clone)]
struct Table {
    name: &'static str,
    key_of: fn(&str) -> String,
    sheet: Worksheet,
    columns: HashMap<String, usize>,
    index: HashMap<String, usize>,
}

impl Table {
    fn load<R: SheetRecord>(sheet: Option<Worksheet>) -> Result<Self> {
        let sheet = sheet.unwrap_or_else(|| Worksheet {
            header: R::COLUMNS.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        });
        let columns: HashMap<String, usize> = sheet
            .header
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_string(), idx))
            .collect();
        if let Some(missing) = R::COLUMNS.iter().find(|c| !columns.contains_key(**c)) {
            return Err(Error::sheet_format(
                R::SHEET,
                format!("missing column {missing}"),
            ));
        }

        let mut table = Self {
            name: R::SHEET,
            key_of: R::index_key,
            sheet,
            columns,
            index: HashMap::new(),
        };
        table.reindex()?;
        Ok(table)
    }

    /// Rebuild the id to row map. Rows with a blank id are ignored.
    fn reindex(&mut self) -> Result<()> {
        let id_col = self.columns[ID];
        self.index.clear();
        for (row_idx, row) in self.sheet.rows.iter().enumerate() {
            let id = (self.key_of)(row.get(id_col).map_or("", String::as_str));
            if id.is_empty() {
                continue;
            }
            if self.index.insert(id.clone(), row_idx).is_some() {
                return Err(Error::sheet_format(self.name, format!("duplicate ID {id}")));
            }
        }
        Ok(())
    }

    fn view(&self, row_idx: usize) -> RowView<'_> {
        RowView {
            sheet: self.name,
            columns: &self.columns,
            cells: &self.sheet.rows[row_idx],
        }
    }

    fn get<R: SheetRecord>(&self, id: &str) -> Result<Option<R>> {
        self.index
            .get(&(self.key_of)(id))
            .map(|&row_idx| R::from_row(&self.view(row_idx)))
            .transpose()
    }

    fn all<R: SheetRecord>(&self) -> Result<Vec<R>> {
        let mut rows: Vec<usize> = self.index.values().copied().collect();
        rows.sort_unstable();
        rows.into_iter()
            .map(|row_idx| R::from_row(&self.view(row_idx)))
            .collect()
    }

    fn write_cells<R: SheetRecord>(&mut self, row_idx: Option<usize>, record: &R) {
        let width = self.sheet.header.len();
        let mut row = row_idx.map_or_else(Vec::new, |idx| self.sheet.rows[idx].clone());
        row.resize(width, String::new());
        for (column, value) in record.cells() {
            row[self.columns[column]] = value;
        }
        match row_idx {
            Some(idx) => self.sheet.rows[idx] = row,
            None => {
                self.index
                    .insert((self.key_of)(&record.id()), self.sheet.rows.len());
                self.sheet.rows.push(row);
            }
        }
    }

    fn insert<R: SheetRecord>(&mut self, record: &R, key: &RecordKey) -> Result<()> {
        if self.index.contains_key(&(self.key_of)(&record.id())) {
            return Err(key.duplicate());
        }
        self.write_cells(None, record);
        Ok(())
    }

    fn overwrite<R: SheetRecord>(&mut self, record: &R, key: &RecordKey) -> Result<()> {
        let row_idx = *self
            .index
            .get(&(self.key_of)(&record.id()))
            .ok_or_else(|| key.not_found())?;
        self.write_cells(Some(row_idx), record);
        Ok(())
    }

    fn update<R: SheetRecord>(&mut self, key: &RecordKey, patch: impl FnOnce(&mut R)) -> Result<()> {
        let mut record: R = self.get(&key.to_string())?.ok_or_else(|| key.not_found())?;
        patch(&mut record);
        self.overwrite(&record, key)
    }

    fn delete(&mut self, key: &RecordKey) -> Result<()> {
        let row_idx = *self
            .index
            .get(&(self.key_of)(&key.to_string()))
            .ok_or_else(|| key.not_found())?;
        self.sheet.rows.remove(row_idx);
        self.reindex()
    }
}

#[derive(Debug, Clone)]
struct Workbook {
    users: Table,
    vehicles: Table,
    requests: Table,
    trips: Table,
    /// Worksheets fleetdesk does not manage.
    other: BTreeMap<String, Worksheet>,
}

impl Workbook {
    fn from_file(mut file: WorkbookFile) -> Result<Self> {
        Ok(Self {
            users: Table::load::<User>(file.sheets.remove(User::SHEET))?,
            vehicles: Table::load::<Vehicle>(file.sheets.remove(Vehicle::SHEET))?,
            requests: Table::load::<ScheduleRequest>(file.sheets.remove(ScheduleRequest::SHEET))?,
            trips: Table::load::<Trip>(file.sheets.remove(Trip::SHEET))?,
            other: file.sheets,
        })
    }

    fn to_file(&self) -> WorkbookFile {
        let mut sheets = self.other.clone();
        for table in [&self.users, &self.vehicles, &self.requests, &self.trips] {
            sheets.insert(table.name.to_string(), table.sheet.clone());
        }
        WorkbookFile { sheets }
    }

    fn table_mut(&mut self, key: &RecordKey) -> &mut Table {
        match key {
            RecordKey::User(_) => &mut self.users,
            RecordKey::Vehicle(_) => &mut self.vehicles,
            RecordKey::Request(_) => &mut self.requests,
            RecordKey::Trip(_) => &mut self.trips,
        }
    }

    fn record(&self, key: &RecordKey) -> Result<Option<Record>> {
        Ok(match key {
            RecordKey::User(id) => self.users.get(id)?.map(Record::User),
            RecordKey::Vehicle(plate) => self.vehicles.get(plate.as_str())?.map(Record::Vehicle),
            RecordKey::Request(id) => self.requests.get(&id.to_string())?.map(Record::Request),
            RecordKey::Trip(id) => self.trips.get(&id.to_string())?.map(Record::Trip),
        })
    }

    fn apply(&mut self, write: &Write, key: &RecordKey) -> Result<()> {
        match write {
            Write::Insert(Record::User(user)) => self.users.insert(user, key),
            Write::Insert(Record::Vehicle(vehicle)) => self.vehicles.insert(vehicle, key),
            Write::Insert(Record::Request(request)) => self.requests.insert(request, key),
            Write::Insert(Record::Trip(trip)) => self.trips.insert(trip, key),
            Write::Restore(Record::User(user)) => self.users.overwrite(user, key),
            Write::Restore(Record::Vehicle(vehicle)) => self.vehicles.overwrite(vehicle, key),
            Write::Restore(Record::Request(request)) => self.requests.overwrite(request, key),
            Write::Restore(Record::Trip(trip)) => self.trips.overwrite(trip, key),
            Write::UpdateVehicle { patch, .. } => {
                self.vehicles.update(key, |v: &mut Vehicle| patch.apply_to(v))
            }
            Write::UpdateRequest { patch, .. } => self
                .requests
                .update(key, |r: &mut ScheduleRequest| patch.apply_to(r)),
            Write::UpdateTrip { patch, .. } => self.trips.update(key, |t: &mut Trip| patch.apply_to(t)),
            Write::Delete(record_key) => self.table_mut(record_key).delete(record_key),
        }
    }
}

/// Size and modification time of the workbook file when it was last loaded
/// or written by this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl Stamp {
    fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug)]
struct Cached {
    book: Workbook,
    stamp: Option<Stamp>,
}

impl Cached {
    fn load(path: &Path) -> Result<Self> {
        let stamp = Stamp::of(path)?;
        let file: WorkbookFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Ok(Self {
            book: Workbook::from_file(file)?,
            stamp: Some(stamp),
        })
    }
}

/// Record store backed by a spreadsheet-shaped JSON workbook.
///
/// Several processes may share one workbook. Writes hold an exclusive lock
/// on a `.lock` file next to it and reload the workbook first, so they never
/// build on a stale copy. Reads reload when the file changed on disk.
#[derive(Debug)]
pub struct SheetStore {
    path: PathBuf,
    lock_path: PathBuf,
    cache: RwLock<Cached>,
}

impl SheetStore {
    /// Open the workbook at `path`, creating it with empty worksheets if it
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written, is not a
    /// workbook, or a worksheet lacks a required column or repeats an ID.
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

        let mut lock_path = path.as_os_str().to_owned();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let cached = with_file_lock(&lock_path, || {
            if !path.exists() {
                persist(&path, &Workbook::from_file(WorkbookFile::default())?)?;
                info!("Created workbook at {}", path.display());
            }
            debug!("Loading workbook from {}", path.display());
            Cached::load(&path)
        })?;

        Ok(Self {
            path,
            lock_path,
            cache: RwLock::new(cached),
        })
    }

    /// Get the path to the workbook file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached workbook, reloaded first if another writer replaced the
    /// file since this handle last saw it.
    fn current(&self) -> Result<RwLockReadGuard<'_, Cached>> {
        let stamp = Stamp::of(&self.path)?;
        {
            let cached = self.cache.read();
            if cached.stamp == Some(stamp) {
                return Ok(cached);
            }
        }
        let mut cached = self.cache.write();
        if cached.stamp != Some(stamp) {
            trace!("Workbook changed on disk, reloading");
            *cached = Cached::load(&self.path)?;
        }
        Ok(RwLockWriteGuard::downgrade(cached))
    }

    /// Run `f` on a freshly loaded workbook while holding the file lock.
    fn exclusive<T>(&self, f: impl FnOnce(&mut Cached) -> Result<T>) -> Result<T> {
        with_file_lock(&self.lock_path, || {
            let mut cached = self.cache.write();
            *cached = Cached::load(&self.path)?;
            f(&mut *cached)
        })
    }

    /// Apply one write and save the workbook. A failed save leaves the cached
    /// table as it was.
    fn write_through(&self, cached: &mut Cached, write: &Write) -> Result<()> {
        let key = write.key();
        trace!(write = write.label(), %key, "sheet write");

        let before = cached.book.table_mut(&key).clone();
        cached.book.apply(write, &key)?;
        if let Err(err) = persist(&self.path, &cached.book) {
            *cached.book.table_mut(&key) = before;
            return Err(err);
        }
        cached.stamp = Stamp::of(&self.path).ok();
        Ok(())
    }
}

fn with_file_lock<T>(lock_path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    let mut lock = fd_lock::RwLock::new(file);
    let _held = lock.write()?;
    trace!("Acquired workbook lock {}", lock_path.display());
    f()
}

fn persist(path: &Path, book: &Workbook) -> Result<()> {
    let json = serde_json::to_string_pretty(&book.to_file())?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

impl RecordStore for SheetStore {
    fn backend_name(&self) -> &'static str {
        "sheet"
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.current()?.book.users.get(id)
    }

    fn get_vehicle(&self, plate: &Plate) -> Result<Option<Vehicle>> {
        self.current()?.book.vehicles.get(plate.as_str())
    }

    fn get_request(&self, id: RequestId) -> Result<Option<ScheduleRequest>> {
        self.current()?.book.requests.get(&id.to_string())
    }

    fn get_trip(&self, id: TripId) -> Result<Option<Trip>> {
        self.current()?.book.trips.get(&id.to_string())
    }

    fn find_users(&self, query: &UserQuery) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.current()?.book.users.all()?;
        users.retain(|u| query.matches(u));
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    fn find_vehicles(&self, query: &VehicleQuery) -> Result<Vec<Vehicle>> {
        let mut vehicles: Vec<Vehicle> = self.current()?.book.vehicles.all()?;
        vehicles.retain(|v| query.matches(v));
        vehicles.sort_by(|a, b| a.plate.cmp(&b.plate));
        Ok(vehicles)
    }

    fn find_requests(&self, query: &RequestQuery) -> Result<Vec<ScheduleRequest>> {
        let mut requests: Vec<ScheduleRequest> = self.current()?.book.requests.all()?;
        requests.retain(|r| query.matches(r));
        sort_requests(&mut requests);
        Ok(requests)
    }

    fn find_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let mut trips: Vec<Trip> = self.current()?.book.trips.all()?;
        trips.retain(|t| query.matches(t));
        sort_trips(&mut trips);
        Ok(trips)
    }

    fn apply(&self, write: &Write) -> Result<()> {
        self.exclusive(|cached| self.write_through(cached, write))
    }

    fn commit(&self, changes: &[Change]) -> Result<()> {
        self.exclusive(|cached| {
            verify_unchanged(changes, |key| cached.book.record(key))?;
            compensate(self.backend_name(), changes, |write| {
                self.write_through(cached, write)
            })
        })
    }
}
