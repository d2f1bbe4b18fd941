//! In-memory record store.
//!
//! Behaves like a hosted table service: keyed tables, filtered reads, single
//! row writes and no transactions. Records live as long as the store, so it
//! serves embedders and tests rather than the command line.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::trace;

use super::{
    sort_requests, sort_trips, Record, RecordKey, RecordStore, RequestQuery, TripQuery, UserQuery,
    VehicleQuery, Write,
};
use crate::error::Result;
use crate::model::{Plate, RequestId, ScheduleRequest, Trip, TripId, User, Vehicle};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<String, User>,
    vehicles: BTreeMap<Plate, Vehicle>,
    requests: BTreeMap<RequestId, ScheduleRequest>,
    trips: BTreeMap<TripId, Trip>,
}

/// Record store that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert_new<K: Ord, V>(table: &mut BTreeMap<K, V>, key: K, value: V, record_key: &RecordKey) -> Result<()> {
    if table.contains_key(&key) {
        return Err(record_key.duplicate());
    }
    table.insert(key, value);
    Ok(())
}

fn existing<'a, K: Ord, V>(
    table: &'a mut BTreeMap<K, V>,
    key: &K,
    record_key: &RecordKey,
) -> Result<&'a mut V> {
    table.get_mut(key).ok_or_else(|| record_key.not_found())
}

impl RecordStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.tables.read().users.get(id).cloned())
    }

    fn get_vehicle(&self, plate: &Plate) -> Result<Option<Vehicle>> {
        Ok(self.tables.read().vehicles.get(plate).cloned())
    }

    fn get_request(&self, id: RequestId) -> Result<Option<ScheduleRequest>> {
        Ok(self.tables.read().requests.get(&id).cloned())
    }

    fn get_trip(&self, id: TripId) -> Result<Option<Trip>> {
        Ok(self.tables.read().trips.get(&id).cloned())
    }

    fn find_users(&self, query: &UserQuery) -> Result<Vec<User>> {
        let tables = self.tables.read();
        Ok(tables
            .users
            .values()
            .filter(|u| query.matches(u))
            .cloned()
            .collect())
    }

    fn find_vehicles(&self, query: &VehicleQuery) -> Result<Vec<Vehicle>> {
        let tables = self.tables.read();
        Ok(tables
            .vehicles
            .values()
            .filter(|v| query.matches(v))
            .cloned()
            .collect())
    }

    fn find_requests(&self, query: &RequestQuery) -> Result<Vec<ScheduleRequest>> {
        let mut requests: Vec<_> = {
            let tables = self.tables.read();
            tables
                .requests
                .values()
                .filter(|r| query.matches(r))
                .cloned()
                .collect()
        };
        sort_requests(&mut requests);
        Ok(requests)
    }

    fn find_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let mut trips: Vec<_> = {
            let tables = self.tables.read();
            tables
                .trips
                .values()
                .filter(|t| query.matches(t))
                .cloned()
                .collect()
        };
        sort_trips(&mut trips);
        Ok(trips)
    }

    fn apply(&self, write: &Write) -> Result<()> {
        let key = write.key();
        trace!(write = write.label(), %key, "memory write");
        let mut tables = self.tables.write();

        match write {
            Write::Insert(record) => match record {
                Record::User(user) => insert_new(&mut tables.users, user.id.clone(), user.clone(), &key),
                Record::Vehicle(vehicle) => insert_new(
                    &mut tables.vehicles,
                    vehicle.plate.clone(),
                    vehicle.clone(),
                    &key,
                ),
                Record::Request(request) => {
                    insert_new(&mut tables.requests, request.id, request.clone(), &key)
                }
                Record::Trip(trip) => insert_new(&mut tables.trips, trip.id, trip.clone(), &key),
            },
            Write::UpdateVehicle { plate, patch } => {
                patch.apply_to(existing(&mut tables.vehicles, plate, &key)?);
                Ok(())
            }
            Write::UpdateRequest { id, patch } => {
                patch.apply_to(existing(&mut tables.requests, id, &key)?);
                Ok(())
            }
            Write::UpdateTrip { id, patch } => {
                patch.apply_to(existing(&mut tables.trips, id, &key)?);
                Ok(())
            }
            Write::Restore(record) => {
                match record {
                    Record::User(user) => *existing(&mut tables.users, &user.id, &key)? = user.clone(),
                    Record::Vehicle(vehicle) => {
                        *existing(&mut tables.vehicles, &vehicle.plate, &key)? = vehicle.clone();
                    }
                    Record::Request(request) => {
                        *existing(&mut tables.requests, &request.id, &key)? = request.clone();
                    }
                    Record::Trip(trip) => *existing(&mut tables.trips, &trip.id, &key)? = trip.clone(),
                }
                Ok(())
            }
            Write::Delete(record_key) => {
                let removed = match record_key {
                    RecordKey::User(id) => tables.users.remove(id).is_some(),
                    RecordKey::Vehicle(plate) => tables.vehicles.remove(plate).is_some(),
                    RecordKey::Request(id) => tables.requests.remove(id).is_some(),
                    RecordKey::Trip(id) => tables.trips.remove(id).is_some(),
                };
                if removed {
                    Ok(())
                } else {
                    Err(key.not_found())
                }
            }
        }
    }
}
