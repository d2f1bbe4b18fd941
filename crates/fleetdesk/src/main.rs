//! `fleetctl` - CLI for fleetdesk
//!
//! This binary drives the fleet workflow engine against the configured record
//! store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;

use fleetdesk::cli::{
    Cli, Command, ConfigCommand, CreateRequestArgs, RequestCommand, TripCommand, UserCommand,
    VehicleCommand,
};
use fleetdesk::config::StoreBackend;
use fleetdesk::model::{
    Actor, NewUser, NewVehicle, Plate, ProfileEdit, RequestId, RequestStatus, ScheduleInput,
    ScheduleRequest, Trip, User, Vehicle, VehicleEdit,
};
use fleetdesk::store::{self, UserQuery, VehicleQuery};
use fleetdesk::{init_logging, Config, FleetWorkflow, WorkflowSettings};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;
    let acting_as = cli.acting_as.as_deref();

    match cli.command {
        Command::Vehicle(cmd) => handle_vehicle(&open_workflow(&config)?, acting_as, cmd),
        Command::User(cmd) => handle_user(&open_workflow(&config)?, acting_as, cmd),
        Command::Request(cmd) => handle_request(&open_workflow(&config)?, acting_as, cmd),
        Command::Trip(cmd) => handle_trip(&open_workflow(&config)?, acting_as, cmd),
        Command::Reconcile(cmd) => {
            handle_reconcile(&open_workflow(&config)?, acting_as, cmd.json)
        }
        Command::Status(cmd) => handle_status(&config, &open_workflow(&config)?, cmd.json),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_workflow(config: &Config) -> anyhow::Result<FleetWorkflow> {
    if !config.store.backend.is_persistent() {
        bail!(
            "the {} backend keeps nothing between runs, use sqlite or sheet",
            config.store.backend
        );
    }
    let store = store::open(config)
        .with_context(|| format!("opening {} record store", config.store.backend))?;
    Ok(FleetWorkflow::new(store, WorkflowSettings::from_config(config)?))
}

fn resolve_actor(workflow: &FleetWorkflow, acting_as: Option<&str>) -> anyhow::Result<Actor> {
    let Some(id) = acting_as else {
        bail!("this command needs an acting user, pass --as <USER>");
    };
    let user = workflow
        .store()
        .get_user(id.trim())?
        .with_context(|| format!("unknown user {id}"))?;
    if !user.active {
        bail!("user {} is inactive", user.id);
    }
    Ok(Actor::from(&user))
}

fn require_admin(actor: &Actor) -> anyhow::Result<()> {
    if !actor.is_admin() {
        bail!("permission denied: {} is not an administrator", actor.id);
    }
    Ok(())
}

fn handle_vehicle(
    workflow: &FleetWorkflow,
    acting_as: Option<&str>,
    cmd: VehicleCommand,
) -> anyhow::Result<()> {
    match cmd {
        VehicleCommand::Add {
            plate,
            make,
            model,
            year,
            color,
            fuel,
            odometer,
        } => {
            require_admin(&resolve_actor(workflow, acting_as)?)?;
            let vehicle = workflow.register_vehicle(NewVehicle {
                plate,
                make,
                model,
                year,
                color,
                fuel_type: fuel,
                odometer,
            })?;
            println!("Registered vehicle {}.", vehicle.plate);
        }
        VehicleCommand::List { status, json } => {
            let vehicles = workflow.store().find_vehicles(&VehicleQuery {
                status: status.map(Into::into),
            })?;
            if json {
                return print_json(&vehicles);
            }
            for vehicle in &vehicles {
                print_vehicle(vehicle);
            }
        }
        VehicleCommand::Maintenance { plate, off } => {
            let actor = resolve_actor(workflow, acting_as)?;
            let vehicle = workflow.set_maintenance(&Plate::parse(&plate)?, &actor, !off)?;
            println!("Vehicle {} is now {}.", vehicle.plate, vehicle.status);
        }
        VehicleCommand::Edit {
            plate,
            make,
            model,
            year,
            color,
            fuel,
        } => {
            let edit = VehicleEdit {
                make,
                model,
                year,
                color,
                fuel_type: fuel,
            };
            if edit.is_empty() {
                bail!("nothing to change, pass at least one field to edit");
            }
            let actor = resolve_actor(workflow, acting_as)?;
            let vehicle = workflow.update_vehicle(&Plate::parse(&plate)?, &actor, &edit)?;
            print_vehicle(&vehicle);
        }
        VehicleCommand::Remove { plate } => {
            let actor = resolve_actor(workflow, acting_as)?;
            let vehicle = workflow.remove_vehicle(&Plate::parse(&plate)?, &actor)?;
            println!("Removed vehicle {}.", vehicle.plate);
        }
    }
    Ok(())
}

fn handle_user(
    workflow: &FleetWorkflow,
    acting_as: Option<&str>,
    cmd: UserCommand,
) -> anyhow::Result<()> {
    match cmd {
        UserCommand::Add {
            name,
            email,
            id,
            phone,
            role,
        } => {
            // The first user bootstraps the fleet; after that only admins add users.
            let has_users = !workflow.store().find_users(&UserQuery::default())?.is_empty();
            if has_users {
                require_admin(&resolve_actor(workflow, acting_as)?)?;
            }
            let user = workflow.register_user(NewUser {
                id,
                name,
                email,
                phone,
                role: role.into(),
                credential: None,
            })?;
            println!("Registered {} {} ({}).", user.role, user.id, user.name);
        }
        UserCommand::List { role, json } => {
            let users = workflow.store().find_users(&UserQuery {
                role: role.map(Into::into),
                ..UserQuery::default()
            })?;
            if json {
                return print_json(&users);
            }
            for user in &users {
                print_user(user);
            }
        }
        UserCommand::Edit { id, name, phone } => {
            let edit = ProfileEdit { name, phone };
            if edit == ProfileEdit::default() {
                bail!("nothing to change, pass --name or --phone");
            }
            let actor = resolve_actor(workflow, acting_as)?;
            let target = id.unwrap_or_else(|| actor.id.clone());
            let user = workflow.update_profile(&target, &actor, &edit)?;
            print_user(&user);
        }
    }
    Ok(())
}

fn handle_request(
    workflow: &FleetWorkflow,
    acting_as: Option<&str>,
    cmd: RequestCommand,
) -> anyhow::Result<()> {
    let actor = resolve_actor(workflow, acting_as)?;
    match cmd {
        RequestCommand::Create(args) => {
            let request = workflow.create_schedule_request(&actor, &schedule_input(args))?;
            println!("Created schedule request {}.", request.id);
        }
        RequestCommand::Confirm { id } => {
            let request = workflow.confirm_schedule_request(id.parse()?, &actor)?;
            println!("Schedule request {} is {}.", request.id, request.status);
        }
        RequestCommand::Cancel { id, reason } => {
            let request = workflow.cancel_schedule_request(id.parse()?, &actor, &reason)?;
            println!("Schedule request {} is {}.", request.id, request.status);
        }
        RequestCommand::List { status, json } => {
            let mut requests = workflow.requests_visible_to(&actor)?;
            if let Some(status) = status {
                let status: RequestStatus = status.into();
                requests.retain(|r| r.status == status);
            }
            if json {
                return print_json(&requests);
            }
            for request in &requests {
                print_request(request);
            }
        }
    }
    Ok(())
}

fn schedule_input(args: CreateRequestArgs) -> ScheduleInput {
    ScheduleInput {
        plate: args.plate,
        date: args.date,
        start: args.start,
        end: args.end,
        destination: args.destination,
        passengers: args.passengers,
        notes: args.notes,
    }
}

fn handle_trip(
    workflow: &FleetWorkflow,
    acting_as: Option<&str>,
    cmd: TripCommand,
) -> anyhow::Result<()> {
    match cmd {
        TripCommand::Depart {
            request,
            driver,
            odometer,
            notes,
        } => {
            resolve_actor(workflow, acting_as)?;
            let request: RequestId = request.parse()?;
            let trip = workflow.depart_vehicle(request, &driver, odometer, notes.as_deref())?;
            println!("Vehicle {} departed, trip {}.", trip.plate, trip.id);
        }
        TripCommand::Arrive {
            plate,
            odometer,
            notes,
        } => {
            resolve_actor(workflow, acting_as)?;
            let trip = workflow.arrive_vehicle(&Plate::parse(&plate)?, odometer, notes.as_deref())?;
            println!(
                "Vehicle {} arrived after {} km.",
                trip.plate,
                trip.distance().unwrap_or_default()
            );
        }
        TripCommand::List { json } => {
            let trips = workflow.open_trips()?;
            if json {
                return print_json(&trips);
            }
            for trip in &trips {
                print_trip(workflow, trip);
            }
        }
        TripCommand::History { limit, json } => {
            let trips = workflow.trip_history(Some(limit))?;
            if json {
                return print_json(&trips);
            }
            for trip in &trips {
                print_trip(workflow, trip);
            }
        }
    }
    Ok(())
}

fn handle_reconcile(
    workflow: &FleetWorkflow,
    acting_as: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    require_admin(&resolve_actor(workflow, acting_as)?)?;
    let report = workflow.reconcile_availability()?;
    if json {
        return print_json(&report);
    }
    if report.is_clean() {
        println!("All vehicle statuses agree with their trips.");
    }
    for c in &report.corrections {
        println!("corrected  {}  {} -> {}", c.plate, c.from, c.to);
    }
    for plate in &report.duplicate_open {
        println!("attention  {plate}  more than one trip in progress");
    }
    for plate in &report.maintenance_with_open_trip {
        println!("attention  {plate}  in maintenance with a trip in progress");
    }
    for trip in &report.orphan_trips {
        println!("attention  trip {trip}  vehicle not registered");
    }
    Ok(())
}

fn handle_status(config: &Config, workflow: &FleetWorkflow, json: bool) -> anyhow::Result<()> {
    let summary = workflow.summary()?;
    if json {
        let status = serde_json::json!({
            "backend": workflow.store().backend_name(),
            "store_path": store_path(config),
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("fleetctl status");
        println!("---------------");
        println!("Backend:           {}", workflow.store().backend_name());
        if let Some(path) = store_path(config) {
            println!("Store:             {}", path.display());
        }
        println!("Consistency:       {}", summary.consistency);
        println!("Available:         {}", summary.available_vehicles);
        println!("Trips in progress: {}", summary.trips_in_progress);
        println!("Departed today:    {}", summary.departed_today);
    }
    Ok(())
}

fn store_path(config: &Config) -> Option<PathBuf> {
    match config.store.backend {
        StoreBackend::Sqlite => Some(config.database_path()),
        StoreBackend::Sheet => Some(config.sheet_path()),
        StoreBackend::Memory => None,
    }
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Store]");
                println!("  Backend:            {}", config.store.backend);
                println!("  Database path:      {}", config.database_path().display());
                println!("  Workbook path:      {}", config.sheet_path().display());
                println!();
                println!("[Workflow]");
                println!("  Lock timeout (ms):  {}", config.workflow.lock_timeout_ms);
                println!("  Plate pattern:      {}", config.workflow.plate_pattern);
                println!(
                    "  UTC offset (min):   {}",
                    config.workflow.utc_offset_minutes
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::load_from(Some(path))?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_vehicle(vehicle: &Vehicle) {
    println!(
        "{:<10} {:<12} {:>10.1} km  {} {}",
        vehicle.plate.as_str(),
        vehicle.status.to_string(),
        vehicle.odometer,
        vehicle.make.as_deref().unwrap_or("-"),
        vehicle.model.as_deref().unwrap_or("-"),
    );
}

fn print_user(user: &User) {
    println!(
        "{:<28} {:<7} {}{}",
        user.id,
        user.role.to_string(),
        user.name,
        if user.active { "" } else { " (inactive)" }
    );
}

fn print_request(request: &ScheduleRequest) {
    println!(
        "{}  {:<10} {} {}  {:<10} {}",
        request.id,
        request.plate.as_str(),
        request.date,
        request.window,
        request.status.to_string(),
        request.destination.as_deref().unwrap_or("-"),
    );
}

fn print_trip(workflow: &FleetWorkflow, trip: &Trip) {
    let offset = workflow.settings().utc_offset;
    let departed = trip.departed_at.with_timezone(&offset).format("%Y-%m-%d %H:%M");
    match trip.distance() {
        Some(distance) => println!(
            "{}  {:<10} {}  {:<24} {distance:.1} km",
            trip.id,
            trip.plate.as_str(),
            departed,
            trip.driver_id,
        ),
        None => println!(
            "{}  {:<10} {}  {:<24} out since {:.1} km",
            trip.id,
            trip.plate.as_str(),
            departed,
            trip.driver_id,
            trip.odometer_start,
        ),
    }
}
