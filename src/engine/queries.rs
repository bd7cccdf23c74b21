use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::model::*;

use super::conflict::find_conflict;
use super::{BookingError, Engine};

impl Engine {
    /// Whether an active booking other than `exclude` overlaps the range.
    pub async fn conflicts(
        &self,
        resource_id: ResourceId,
        date: NaiveDate,
        range: TimeRange,
        exclude: Option<BookingId>,
    ) -> Result<bool, BookingError> {
        if !self.store.contains_resource(&resource_id) {
            return Err(BookingError::resource_not_found(resource_id.to_string()));
        }
        let Some(day) = self.store.day(&(resource_id, date)) else {
            return Ok(false);
        };
        let guard = day.read().await;
        Ok(find_conflict(&guard, &range, exclude).is_some())
    }

    /// Catalog in creation order.
    pub fn list_resources(&self) -> Vec<Resource> {
        let mut resources = self.store.resources();
        resources.sort_by_key(|r| r.id);
        resources
    }

    pub fn resource_by_name(&self, name: &str) -> Option<Resource> {
        self.store.resource_by_name(name)
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, BookingError> {
        let key = self
            .store
            .day_key_for(&id)
            .ok_or_else(|| BookingError::booking_not_found(id))?;
        let day = self
            .store
            .day(&key)
            .ok_or_else(|| BookingError::booking_not_found(id))?;
        let guard = day.read().await;
        guard
            .get(&id)
            .cloned()
            .ok_or_else(|| BookingError::booking_not_found(id))
    }

    /// A user's bookings in every status, newest date and time first.
    pub async fn list_mine(&self, user_id: UserId) -> Result<Vec<BookingView>, BookingError> {
        let mut bookings = self.collect_bookings(None, |b| b.user_id == user_id).await;
        bookings.sort_by_key(|b| Reverse((b.date, b.range.start)));
        self.to_views(bookings).await
    }

    /// Pending requests, newest request first, optionally only those whose
    /// owner belongs to `department`.
    pub async fn list_pending(
        &self,
        department: Option<DepartmentId>,
    ) -> Result<Vec<BookingView>, BookingError> {
        let mut bookings = self
            .collect_bookings(None, |b| b.status == BookingStatus::Pending)
            .await;
        bookings.sort_by_key(|b| Reverse((b.created_at, b.id)));

        let mut views = self.to_views(bookings).await?;
        if let Some(department) = department {
            let mut kept = Vec::with_capacity(views.len());
            for view in views {
                let owner = self.directory.lookup_user(view.requester_id).await?;
                if owner.is_some_and(|u| u.department_id == department) {
                    kept.push(view);
                }
            }
            views = kept;
        }
        Ok(views)
    }

    /// Calendar entries for pending, approved and conducted bookings, by date
    /// then start time. The shown status depends on the date alone: past
    /// dates read `conducted`, everything else `pending`.
    pub async fn list_calendar_events(
        &self,
        resource: Option<ResourceId>,
    ) -> Result<Vec<CalendarEvent>, BookingError> {
        let today = self.clock.today();
        let mut bookings = self
            .collect_bookings(resource, |b| {
                matches!(
                    b.status,
                    BookingStatus::Pending | BookingStatus::Approved | BookingStatus::Conducted
                )
            })
            .await;
        bookings.sort_by_key(|b| (b.date, b.range.start, b.id));

        let views = self.to_views(bookings).await?;
        Ok(views
            .into_iter()
            .map(|v| CalendarEvent {
                status: DisplayStatus::for_date(v.start.date(), today),
                id: v.id,
                title: v.title,
                resource: v.resource,
                start: v.start,
                end: v.end,
                purpose: v.purpose,
                requester_id: v.requester_id,
                requester_name: v.requester_name,
            })
            .collect())
    }

    async fn collect_bookings(
        &self,
        resource: Option<ResourceId>,
        keep: impl Fn(&Booking) -> bool,
    ) -> Vec<Booking> {
        let mut out = Vec::new();
        for day in self.store.days_matching(resource) {
            let guard = day.read().await;
            out.extend(guard.bookings.iter().filter(|b| keep(b)).cloned());
        }
        out
    }

    /// Attach resource and requester names. Unknown requesters keep `None`.
    async fn to_views(&self, bookings: Vec<Booking>) -> Result<Vec<BookingView>, BookingError> {
        let mut names: HashMap<UserId, Option<String>> = HashMap::new();
        let mut views = Vec::with_capacity(bookings.len());
        for b in bookings {
            let requester_name = match names.get(&b.user_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .directory
                        .lookup_user(b.user_id)
                        .await?
                        .map(|u| u.display_name);
                    names.insert(b.user_id, name.clone());
                    name
                }
            };
            let resource = self
                .store
                .resource(&b.resource_id)
                .map(|r| r.name)
                .unwrap_or_default();
            views.push(BookingView {
                id: b.id,
                start: b.starts_at(),
                end: b.ends_at(),
                title: b.title,
                resource,
                purpose: b.purpose,
                status: b.status,
                requester_id: b.user_id,
                requester_name,
                created_at: b.created_at,
            });
        }
        Ok(views)
    }
}
