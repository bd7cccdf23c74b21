use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

use super::SharedDaySchedule;

/// In-memory booking state: the resource catalog, one locked schedule per
/// (resource, date), and a booking id → schedule index.
#[derive(Default)]
pub struct BookingStore {
    resources: DashMap<ResourceId, Resource>,
    resource_names: DashMap<String, ResourceId>,
    days: DashMap<DayKey, SharedDaySchedule>,
    booking_index: DashMap<BookingId, DayKey>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from replayed events. Nothing else can see the store yet, so
    /// schedules are assembled unlocked and wrapped at the end.
    pub fn from_events(events: &[Event]) -> Self {
        let store = Self::new();
        let mut days: HashMap<DayKey, DaySchedule> = HashMap::new();
        for event in events {
            match event {
                Event::ResourceCreated { .. } => store.apply_catalog_event(event),
                Event::BookingRequested { booking } => {
                    let key = booking.day_key();
                    let day = days
                        .entry(key)
                        .or_insert_with(|| DaySchedule::new(key.0, key.1));
                    store.apply_to_day(day, event);
                }
                Event::BookingStatusChanged { resource_id, date, .. } => {
                    if let Some(day) = days.get_mut(&(*resource_id, *date)) {
                        store.apply_to_day(day, event);
                    }
                }
            }
        }
        for (key, day) in days {
            store.days.insert(key, Arc::new(RwLock::new(day)));
        }
        store
    }

    // ── Resource catalog ─────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn contains_resource(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn resource(&self, id: &ResourceId) -> Option<Resource> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn resource_by_name(&self, name: &str) -> Option<Resource> {
        let id = *self.resource_names.get(name.trim())?.value();
        self.resource(&id)
    }

    /// Highest catalog id, i.e. the most recently created resource.
    pub fn latest_resource_id(&self) -> Option<ResourceId> {
        self.resources.iter().map(|e| *e.key()).max()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.resources.iter().map(|e| e.value().clone()).collect()
    }

    // ── Day schedules ────────────────────────────────────────

    pub fn day(&self, key: &DayKey) -> Option<SharedDaySchedule> {
        self.days.get(key).map(|e| e.value().clone())
    }

    pub fn day_or_create(&self, key: DayKey) -> SharedDaySchedule {
        self.days
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DaySchedule::new(key.0, key.1))))
            .value()
            .clone()
    }

    /// Snapshot of schedule handles, optionally limited to one resource.
    /// Handles are cloned out so no map shard stays locked across an await.
    pub fn days_matching(&self, resource: Option<ResourceId>) -> Vec<SharedDaySchedule> {
        self.days
            .iter()
            .filter(|e| resource.is_none_or(|rid| e.key().0 == rid))
            .map(|e| e.value().clone())
            .collect()
    }

    // ── Booking index ────────────────────────────────────────

    pub fn day_key_for(&self, booking_id: &BookingId) -> Option<DayKey> {
        self.booking_index.get(booking_id).map(|e| *e.value())
    }

    pub fn booking_count(&self) -> usize {
        self.booking_index.len()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a catalog-level event. Booking events go through `apply_to_day`.
    pub fn apply_catalog_event(&self, event: &Event) {
        if let Event::ResourceCreated { id, name, kind, capacity } = event {
            self.resources.insert(
                *id,
                Resource {
                    id: *id,
                    name: name.clone(),
                    kind: *kind,
                    capacity: *capacity,
                },
            );
            self.resource_names.insert(name.clone(), *id);
        }
    }

    /// Apply a booking event to its schedule. Caller holds the schedule's lock.
    pub fn apply_to_day(&self, day: &mut DaySchedule, event: &Event) {
        match event {
            Event::BookingRequested { booking } => {
                self.booking_index.insert(booking.id, booking.day_key());
                day.insert_booking(booking.clone());
            }
            Event::BookingStatusChanged { id, status, .. } => {
                day.set_status(id, *status);
            }
            Event::ResourceCreated { .. } => {}
        }
    }
}
