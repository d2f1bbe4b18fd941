//! Command-line interface for fleetdesk.
//!
//! This module provides the CLI structure for the `fleetctl` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, CreateRequestArgs, ReconcileCommand, RequestCommand, RequestStatusArg,
    RoleArg, StatusCommand, TripCommand, UserCommand, VehicleCommand, VehicleStatusArg,
};

use crate::logging::Verbosity;

/// fleetctl - Run a vehicle fleet from the terminal
///
/// Register vehicles and users, book vehicles, and check them out and back in
/// while keeping availability consistent.
#[derive(Debug, Parser)]
#[command(name = "fleetctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Act as this user id
    #[arg(long = "as", global = true, value_name = "USER")]
    pub acting_as: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage vehicles
    #[command(subcommand)]
    Vehicle(VehicleCommand),

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage schedule requests
    #[command(subcommand)]
    Request(RequestCommand),

    /// Check vehicles out and in
    #[command(subcommand)]
    Trip(TripCommand),

    /// Repair vehicle statuses that disagree with their trips (admin)
    Reconcile(ReconcileCommand),

    /// Show fleet status
    Status(StatusCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn status_cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            acting_as: None,
            command: Command::Status(StatusCommand { json: false }),
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "fleetctl");
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(status_cli(0, true).verbosity(), Verbosity::Quiet);
        assert_eq!(status_cli(0, false).verbosity(), Verbosity::Normal);
        assert_eq!(status_cli(1, false).verbosity(), Verbosity::Verbose);
        assert_eq!(status_cli(2, false).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_status() {
        let cli = Cli::try_parse_from(["fleetctl", "status", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Status(StatusCommand { json: true })));
    }

    #[test]
    fn test_parse_acting_user_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fleetctl",
            "request",
            "confirm",
            "5d0c1a3e-0000-4000-8000-000000000000",
            "--as",
            "admin@fleet.test",
        ])
        .unwrap();
        assert_eq!(cli.acting_as.as_deref(), Some("admin@fleet.test"));
        assert!(matches!(
            cli.command,
            Command::Request(RequestCommand::Confirm { .. })
        ));
    }

    #[test]
    fn test_parse_request_create() {
        let cli = Cli::try_parse_from([
            "fleetctl",
            "request",
            "create",
            "ABC-1234",
            "--date",
            "2025-06-01",
            "--start",
            "08:00",
            "--end",
            "12:00",
            "-d",
            "Campinas",
            "-p",
            "3",
        ])
        .unwrap();
        let Command::Request(RequestCommand::Create(args)) = cli.command else {
            panic!("expected request create");
        };
        assert_eq!(args.plate, "ABC-1234");
        assert_eq!(args.destination.as_deref(), Some("Campinas"));
        assert_eq!(args.passengers, Some(3));
        assert_eq!(args.notes, None);
    }

    #[test]
    fn test_parse_trip_depart_and_arrive() {
        let cli = Cli::try_parse_from([
            "fleetctl", "trip", "depart", "some-id", "--driver", "joao@fleet.test", "-o",
            "15000",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Trip(TripCommand::Depart { odometer, .. }) if (odometer - 15000.0).abs() < f64::EPSILON
        ));

        let cli =
            Cli::try_parse_from(["fleetctl", "trip", "arrive", "ABC-1234", "-o", "15120.5"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Trip(TripCommand::Arrive { odometer, .. }) if (odometer - 15120.5).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn test_parse_trip_depart_requires_odometer() {
        let result =
            Cli::try_parse_from(["fleetctl", "trip", "depart", "some-id", "--driver", "joao"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_vehicle_list_filter() {
        let cli = Cli::try_parse_from(["fleetctl", "vehicle", "list", "-s", "in-use"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Vehicle(VehicleCommand::List {
                status: Some(VehicleStatusArg::InUse),
                json: false
            })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["fleetctl", "-c", "/custom/config.toml", "status"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["fleetctl", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["fleetctl", "-q", "status"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_vehicle_edit_and_remove() {
        let cli = Cli::try_parse_from([
            "fleetctl", "vehicle", "edit", "ABC-1234", "--color", "White", "--year", "2021",
        ])
        .unwrap();
        match cli.command {
            Command::Vehicle(VehicleCommand::Edit {
                plate,
                make,
                year,
                color,
                ..
            }) => {
                assert_eq!(plate, "ABC-1234");
                assert!(make.is_none());
                assert_eq!(year, Some(2021));
                assert_eq!(color.as_deref(), Some("White"));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["fleetctl", "vehicle", "remove", "ABC-1234"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Vehicle(VehicleCommand::Remove { ref plate }) if plate == "ABC-1234"
        ));
    }

    #[test]
    fn test_parse_user_edit_defaults_to_acting_user() {
        let cli = Cli::try_parse_from([
            "fleetctl", "--as", "ana@fleet.test", "user", "edit", "--phone", "",
        ])
        .unwrap();
        match cli.command {
            Command::User(UserCommand::Edit { id, name, phone }) => {
                assert!(id.is_none());
                assert!(name.is_none());
                assert_eq!(phone.as_deref(), Some(""));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "fleetctl", "user", "edit", "joao@fleet.test", "-n", "Joao Lima",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::User(UserCommand::Edit { id: Some(_), name: Some(_), phone: None })
        ));
    }
}
