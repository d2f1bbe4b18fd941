//! `fleetdesk` - Fleet administration for a small vehicle pool
//!
//! This library keeps track of vehicles, users, schedule requests and trips,
//! and enforces the check-out/check-in workflow over an interchangeable
//! record store (SQLite, a JSON workbook, or memory).

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;
pub mod workflow;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use logging::init_logging;
pub use store::{Consistency, RecordStore};
pub use workflow::{FleetSummary, FleetWorkflow, ReconcileReport, WorkflowSettings};
