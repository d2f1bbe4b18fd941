//! Availability reconciliation.
//!
//! A vehicle's status is derived data: in use while it has an open trip,
//! available otherwise. Edits made directly in a backend (a worksheet opened
//! by hand, an interrupted compensating commit) can make the stored status
//! drift. [`FleetWorkflow::reconcile_availability`] recomputes it for every
//! vehicle and repairs what it can.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use super::FleetWorkflow;
use crate::error::Result;
use crate::model::{Plate, TripId, VehiclePatch, VehicleStatus};
use crate::store::{Change, TripQuery, VehicleQuery};

/// One repaired vehicle status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
    /// The vehicle.
    pub plate: Plate,
    /// Stored status before the repair.
    pub from: VehicleStatus,
    /// Status implied by the vehicle's trips.
    pub to: VehicleStatus,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Vehicles whose status was rewritten.
    pub corrections: Vec<Correction>,
    /// Plates with more than one trip in progress.
    pub duplicate_open: Vec<Plate>,
    /// Vehicles in maintenance that still have a trip in progress.
    pub maintenance_with_open_trip: Vec<Plate>,
    /// Trips in progress whose vehicle is not registered.
    pub orphan_trips: Vec<TripId>,
}

impl ReconcileReport {
    /// Whether the pass found nothing to repair or report.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
            && self.duplicate_open.is_empty()
            && self.maintenance_with_open_trip.is_empty()
            && self.orphan_trips.is_empty()
    }
}

impl FleetWorkflow {
    /// Bring every vehicle's stored status in line with its trips.
    ///
    /// Each vehicle is checked under its plate lock. Maintenance is never
    /// changed; inconsistencies that need a human are only reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or a plate stays locked past the
    /// configured timeout.
    pub fn reconcile_availability(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let vehicles = self.store.find_vehicles(&VehicleQuery::default())?;
        let known: BTreeSet<Plate> = vehicles.iter().map(|v| v.plate.clone()).collect();

        for listed in vehicles {
            let plate = listed.plate;
            self.with_plate(&plate, || {
                let Some(vehicle) = self.store.get_vehicle(&plate)? else {
                    return Ok(());
                };
                let open = self.store.find_trips(&TripQuery::open_on(&plate))?;
                if open.len() > 1 {
                    warn!(%plate, open = open.len(), "Vehicle has more than one trip in progress");
                    report.duplicate_open.push(plate.clone());
                }

                if vehicle.status == VehicleStatus::Maintenance {
                    if !open.is_empty() {
                        warn!(%plate, "Vehicle in maintenance has a trip in progress");
                        report.maintenance_with_open_trip.push(plate.clone());
                    }
                    return Ok(());
                }

                let expected = if open.is_empty() {
                    VehicleStatus::Available
                } else {
                    VehicleStatus::InUse
                };
                if vehicle.status != expected {
                    self.store.commit(&[Change::update_vehicle(
                        &vehicle,
                        VehiclePatch::status(expected),
                    )])?;
                    warn!(%plate, from = %vehicle.status, to = %expected, "Corrected vehicle status");
                    report.corrections.push(Correction {
                        plate: plate.clone(),
                        from: vehicle.status,
                        to: expected,
                    });
                }
                Ok(())
            })?;
        }

        report.orphan_trips = self
            .open_trips()?
            .into_iter()
            .filter(|t| !known.contains(&t.plate))
            .map(|t| {
                warn!(trip = %t.id, plate = %t.plate, "Trip in progress for unregistered vehicle");
                t.id
            })
            .collect();

        info!(
            corrections = report.corrections.len(),
            duplicate_open = report.duplicate_open.len(),
            maintenance_with_open_trip = report.maintenance_with_open_trip.len(),
            orphan_trips = report.orphan_trips.len(),
            "Reconciled vehicle availability"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::store::Write;

    fn force_status(fx: &Fixture, raw: &str, status: VehicleStatus) {
        fx.workflow
            .store()
            .apply(&Write::UpdateVehicle {
                plate: plate(raw),
                patch: VehiclePatch::status(status),
            })
            .unwrap();
    }

    #[test]
    fn test_clean_fleet() {
        for_each_backend(|fx| {
            let request = fx.confirmed_request("ABC-1234");
            fx.workflow
                .depart_vehicle(request.id, DRIVER, 15000.0, None)
                .unwrap();

            let report = fx.workflow.reconcile_availability().unwrap();
            assert!(report.is_clean(), "{report:?}");
        });
    }

    #[test]
    fn test_drift_is_corrected() {
        for_each_backend(|fx| {
            fx.add_vehicle("XYZ-0001", 10.0);
            force_status(&fx, "ABC-1234", VehicleStatus::InUse);
            fx.open_trip_directly("XYZ-0001", 10.0);

            let report = fx.workflow.reconcile_availability().unwrap();
            assert_eq!(
                report.corrections,
                vec![
                    Correction {
                        plate: plate("ABC-1234"),
                        from: VehicleStatus::InUse,
                        to: VehicleStatus::Available,
                    },
                    Correction {
                        plate: plate("XYZ-0001"),
                        from: VehicleStatus::Available,
                        to: VehicleStatus::InUse,
                    },
                ]
            );
            assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::Available);
            assert_eq!(fx.vehicle("XYZ-0001").status, VehicleStatus::InUse);

            assert!(fx.workflow.reconcile_availability().unwrap().is_clean());
        });
    }

    #[test]
    fn test_reports_what_it_cannot_fix() {
        let fx = Fixture::memory();
        fx.add_vehicle("XYZ-0001", 10.0);
        fx.add_vehicle("MNT-0001", 10.0);

        fx.open_trip_directly("ABC-1234", 15000.0);
        fx.open_trip_directly("ABC-1234", 15000.0);
        fx.open_trip_directly("MNT-0001", 10.0);
        force_status(&fx, "MNT-0001", VehicleStatus::Maintenance);
        let orphan = fx.open_trip_directly("GONE-0001", 1.0);

        let report = fx.workflow.reconcile_availability().unwrap();
        assert_eq!(report.duplicate_open, vec![plate("ABC-1234")]);
        assert_eq!(report.maintenance_with_open_trip, vec![plate("MNT-0001")]);
        assert_eq!(report.orphan_trips, vec![orphan.id]);
        assert_eq!(fx.vehicle("MNT-0001").status, VehicleStatus::Maintenance);
        assert_eq!(fx.vehicle("ABC-1234").status, VehicleStatus::InUse);
    }
}
