//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::model::{RequestStatus, Role, VehicleStatus};

/// Vehicle commands.
#[derive(Debug, Subcommand)]
pub enum VehicleCommand {
    /// Register a vehicle (admin)
    Add {
        /// License plate
        plate: String,

        /// Manufacturer
        #[arg(long)]
        make: String,

        /// Model name
        #[arg(long)]
        model: String,

        /// Model year
        #[arg(long)]
        year: Option<i32>,

        /// Body color
        #[arg(long)]
        color: Option<String>,

        /// Fuel type
        #[arg(long)]
        fuel: Option<String>,

        /// Current odometer reading
        #[arg(long, default_value = "0")]
        odometer: f64,
    },

    /// List vehicles
    List {
        /// Only vehicles with this status
        #[arg(short, long, value_enum)]
        status: Option<VehicleStatusArg>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Put a vehicle into maintenance or release it (admin)
    Maintenance {
        /// License plate
        plate: String,

        /// Release the vehicle instead
        #[arg(long)]
        off: bool,
    },

    /// Change a vehicle's make, model, year, color or fuel (admin)
    Edit {
        /// License plate
        plate: String,

        /// Manufacturer
        #[arg(long)]
        make: Option<String>,

        /// Model name
        #[arg(long)]
        model: Option<String>,

        /// Model year
        #[arg(long)]
        year: Option<i32>,

        /// Body color; an empty value clears it
        #[arg(long)]
        color: Option<String>,

        /// Fuel type; an empty value clears it
        #[arg(long)]
        fuel: Option<String>,
    },

    /// Take a vehicle out of the fleet (admin)
    Remove {
        /// License plate
        plate: String,
    },
}

/// User commands.
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Register a user (admin, or anyone while no users exist)
    Add {
        /// Display name
        name: String,

        /// Email address; also the id unless --id is given
        #[arg(short, long)]
        email: Option<String>,

        /// Explicit user id
        #[arg(long)]
        id: Option<String>,

        /// Phone number
        #[arg(long)]
        phone: Option<String>,

        /// Role
        #[arg(short, long, value_enum, default_value = "other")]
        role: RoleArg,
    },

    /// List users
    List {
        /// Only users with this role
        #[arg(short, long, value_enum)]
        role: Option<RoleArg>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Change a display name or phone number
    Edit {
        /// User to edit; defaults to the acting user
        id: Option<String>,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Phone number; an empty value clears it
        #[arg(long)]
        phone: Option<String>,
    },
}

/// Schedule request commands.
#[derive(Debug, Subcommand)]
pub enum RequestCommand {
    /// Book a vehicle
    Create(CreateRequestArgs),

    /// Confirm a booking
    Confirm {
        /// Schedule request id
        id: String,
    },

    /// Cancel a booking (requester or admin)
    Cancel {
        /// Schedule request id
        id: String,

        /// Why the booking is cancelled
        #[arg(short, long, default_value = "")]
        reason: String,
    },

    /// List bookings visible to the acting user
    List {
        /// Only requests with this status
        #[arg(short, long, value_enum)]
        status: Option<RequestStatusArg>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Arguments for `request create`.
#[derive(Debug, Args)]
pub struct CreateRequestArgs {
    /// License plate
    pub plate: String,

    /// Date (YYYY-MM-DD)
    #[arg(long)]
    pub date: String,

    /// Start time (HH:MM)
    #[arg(long)]
    pub start: String,

    /// End time (HH:MM)
    #[arg(long)]
    pub end: String,

    /// Destination
    #[arg(short, long)]
    pub destination: Option<String>,

    /// Number of passengers
    #[arg(short, long)]
    pub passengers: Option<u32>,

    /// Free-text notes
    #[arg(short, long)]
    pub notes: Option<String>,
}

/// Trip commands.
#[derive(Debug, Subcommand)]
pub enum TripCommand {
    /// Check a vehicle out against a confirmed booking
    Depart {
        /// Schedule request id
        request: String,

        /// Driver user id
        #[arg(short, long)]
        driver: String,

        /// Odometer reading at departure
        #[arg(short, long)]
        odometer: f64,

        /// Free-text notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Check a vehicle back in
    Arrive {
        /// License plate
        plate: String,

        /// Odometer reading at arrival
        #[arg(short, long)]
        odometer: f64,

        /// Free-text notes; replaces the departure notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List trips in progress
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List finished trips, most recent first
    History {
        /// Maximum number of trips
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Reconcile command arguments.
#[derive(Debug, Args)]
pub struct ReconcileCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Vehicle status argument for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VehicleStatusArg {
    /// Free to depart
    Available,
    /// On a trip
    InUse,
    /// Out of service
    Maintenance,
}

impl From<VehicleStatusArg> for VehicleStatus {
    fn from(arg: VehicleStatusArg) -> Self {
        match arg {
            VehicleStatusArg::Available => Self::Available,
            VehicleStatusArg::InUse => Self::InUse,
            VehicleStatusArg::Maintenance => Self::Maintenance,
        }
    }
}

/// Role argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Fleet administrator
    Admin,
    /// May be assigned to trips
    Driver,
    /// May book vehicles
    Other,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Self::Admin,
            RoleArg::Driver => Self::Driver,
            RoleArg::Other => Self::Other,
        }
    }
}

/// Schedule request status argument for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RequestStatusArg {
    /// Waiting for confirmation
    Requested,
    /// Ready to depart
    Confirmed,
    /// Vehicle is out
    InUse,
    /// Trip finished
    Completed,
    /// Called off
    Cancelled,
}

impl From<RequestStatusArg> for RequestStatus {
    fn from(arg: RequestStatusArg) -> Self {
        match arg {
            RequestStatusArg::Requested => Self::Requested,
            RequestStatusArg::Confirmed => Self::Confirmed,
            RequestStatusArg::InUse => Self::InUse,
            RequestStatusArg::Completed => Self::Completed,
            RequestStatusArg::Cancelled => Self::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_status_arg_conversion() {
        assert_eq!(
            VehicleStatus::from(VehicleStatusArg::Available),
            VehicleStatus::Available
        );
        assert_eq!(
            VehicleStatus::from(VehicleStatusArg::InUse),
            VehicleStatus::InUse
        );
        assert_eq!(
            VehicleStatus::from(VehicleStatusArg::Maintenance),
            VehicleStatus::Maintenance
        );
    }

    #[test]
    fn test_role_arg_conversion() {
        assert_eq!(Role::from(RoleArg::Admin), Role::Admin);
        assert_eq!(Role::from(RoleArg::Driver), Role::Driver);
        assert_eq!(Role::from(RoleArg::Other), Role::Other);
    }

    #[test]
    fn test_request_status_arg_conversion() {
        assert_eq!(
            RequestStatus::from(RequestStatusArg::InUse),
            RequestStatus::InUse
        );
        assert_eq!(
            RequestStatus::from(RequestStatusArg::Cancelled),
            RequestStatus::Cancelled
        );
    }

    #[test]
    fn test_value_enum_names() {
        let names: Vec<_> = VehicleStatusArg::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["available", "in-use", "maintenance"]);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
