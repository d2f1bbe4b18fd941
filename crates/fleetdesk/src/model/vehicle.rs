//! Vehicles and their availability status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{non_blank, ParseLabelError, Plate};
use crate::error::{Error, Result};

/// Lifecycle status of a vehicle.
///
/// The workflow only ever writes `Available` and `InUse`; `Maintenance` is set
/// by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    /// Free to be departed.
    #[default]
    Available,
    /// An open trip references this vehicle.
    InUse,
    /// Out of service.
    Maintenance,
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::InUse => write!(f, "in_use"),
            Self::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl FromStr for VehicleStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "in_use" => Ok(Self::InUse),
            "maintenance" => Ok(Self::Maintenance),
            _ => Err(ParseLabelError {
                kind: "vehicle status",
                value: s.to_string(),
            }),
        }
    }
}

/// A fleet vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Unique plate.
    pub plate: Plate,
    /// Manufacturer.
    pub make: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Model year.
    pub year: Option<i32>,
    /// Body color.
    pub color: Option<String>,
    /// Fuel type (gasoline, diesel, ethanol...).
    pub fuel_type: Option<String>,
    /// Last known odometer reading.
    pub odometer: f64,
    /// Availability.
    pub status: VehicleStatus,
}

/// Input for registering a vehicle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewVehicle {
    /// Raw plate as typed.
    pub plate: String,
    /// Manufacturer (required).
    pub make: String,
    /// Model name (required).
    pub model: String,
    /// Model year.
    pub year: Option<i32>,
    /// Body color.
    pub color: Option<String>,
    /// Fuel type.
    pub fuel_type: Option<String>,
    /// Initial odometer reading.
    pub odometer: f64,
}

impl NewVehicle {
    /// Validate the input and build an `Available` vehicle.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the plate, make or model is missing or the
    /// odometer is negative.
    pub fn into_vehicle(self) -> Result<Vehicle> {
        let plate = Plate::parse(&self.plate)?;
        let make = non_blank(Some(&self.make)).ok_or_else(|| Error::validation("make is required"))?;
        let model =
            non_blank(Some(&self.model)).ok_or_else(|| Error::validation("model is required"))?;
        if !self.odometer.is_finite() || self.odometer < 0.0 {
            return Err(Error::validation(format!(
                "odometer must be a non-negative number, got {}",
                self.odometer
            )));
        }

        Ok(Vehicle {
            plate,
            make: Some(make),
            model: Some(model),
            year: self.year,
            color: non_blank(self.color.as_deref()),
            fuel_type: non_blank(self.fuel_type.as_deref()),
            odometer: self.odometer,
            status: VehicleStatus::Available,
        })
    }
}

/// Partial update of a vehicle. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehiclePatch {
    /// New availability.
    pub status: Option<VehicleStatus>,
    /// New odometer reading.
    pub odometer: Option<f64>,
}

impl VehiclePatch {
    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: VehicleStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Apply the patch in place.
    pub fn apply_to(&self, vehicle: &mut Vehicle) {
        if let Some(status) = self.status {
            vehicle.status = status;
        }
        if let Some(odometer) = self.odometer {
            vehicle.odometer = odometer;
        }
    }
}

/// Descriptive fields an administrator may change on a registered vehicle.
///
/// `None` leaves a field unchanged. For the optional fields a blank string
/// clears the stored value. The plate, status and odometer are not editable
/// here; they change through the trip and maintenance workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleEdit {
    /// Manufacturer.
    pub make: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Model year.
    pub year: Option<i32>,
    /// Body color.
    pub color: Option<String>,
    /// Fuel type.
    pub fuel_type: Option<String>,
}

impl VehicleEdit {
    /// Whether the edit changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// A copy of `vehicle` with the edit applied.
    ///
    /// # Errors
    ///
    /// Returns a validation error if make or model would become blank.
    pub fn applied_to(&self, vehicle: &Vehicle) -> Result<Vehicle> {
        let mut edited = vehicle.clone();
        if let Some(make) = &self.make {
            edited.make =
                Some(non_blank(Some(make)).ok_or_else(|| Error::validation("make is required"))?);
        }
        if let Some(model) = &self.model {
            edited.model =
                Some(non_blank(Some(model)).ok_or_else(|| Error::validation("model is required"))?);
        }
        if let Some(year) = self.year {
            edited.year = Some(year);
        }
        if let Some(color) = &self.color {
            edited.color = non_blank(Some(color));
        }
        if let Some(fuel_type) = &self.fuel_type {
            edited.fuel_type = non_blank(Some(fuel_type));
        }
        Ok(edited)
    }
}
