//! `SQLite` schema definitions for fleetdesk.
//!
//! Timestamps are stored as RFC 3339 text with nanosecond precision so that
//! lexical order matches chronological order.

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    role TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    credential TEXT,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the vehicles table.
pub const CREATE_VEHICLES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS vehicles (
    plate TEXT PRIMARY KEY,
    make TEXT,
    model TEXT,
    year INTEGER,
    color TEXT,
    fuel_type TEXT,
    odometer REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL
)
";

/// SQL statement to create the schedule requests table.
pub const CREATE_REQUESTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS schedule_requests (
    id TEXT PRIMARY KEY,
    requester_id TEXT NOT NULL,
    plate TEXT NOT NULL,
    date TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    destination TEXT,
    passengers INTEGER,
    notes TEXT,
    status TEXT NOT NULL,
    cancel_reason TEXT,
    cancelled_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// SQL statement to create the trips table.
pub const CREATE_TRIPS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS trips (
    id TEXT PRIMARY KEY,
    plate TEXT NOT NULL,
    driver_id TEXT NOT NULL,
    request_id TEXT,
    departed_at TEXT NOT NULL,
    odometer_start REAL NOT NULL,
    arrived_at TEXT,
    odometer_end REAL,
    destination TEXT,
    notes TEXT,
    status TEXT NOT NULL
)
";

/// Index on user email for duplicate checks.
pub const CREATE_USER_EMAIL_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)
";

/// Index on request status for the confirmation queue.
pub const CREATE_REQUEST_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_requests_status ON schedule_requests(status, created_at)
";

/// Index on trip plate and status for open-trip lookups.
pub const CREATE_TRIP_PLATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_trips_plate_status ON trips(plate, status)
";

/// At most one in-progress trip per plate.
pub const CREATE_ONE_OPEN_TRIP_INDEX: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_trips_one_open
ON trips(plate) WHERE status = 'in_progress'
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_VEHICLES_TABLE,
    CREATE_REQUESTS_TABLE,
    CREATE_TRIPS_TABLE,
    CREATE_USER_EMAIL_INDEX,
    CREATE_REQUEST_STATUS_INDEX,
    CREATE_TRIP_PLATE_INDEX,
    CREATE_ONE_OPEN_TRIP_INDEX,
    CREATE_METADATA_TABLE,
];
