use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, validate_request};
use super::{BookingError, Engine};

impl Engine {
    pub async fn create_resource(
        &self,
        name: &str,
        kind: ResourceKind,
        capacity: u32,
    ) -> Result<Resource, BookingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BookingError::invalid("resource name is required"));
        }
        if name.len() > MAX_RESOURCE_NAME_LEN {
            return Err(BookingError::invalid("resource name too long"));
        }
        if capacity == 0 {
            return Err(BookingError::invalid("capacity must be positive"));
        }

        let _writes = self.write_gate.read().await;
        let _catalog = self.catalog_lock.lock().await;
        if self.store.resource_by_name(name).is_some() {
            return Err(BookingError::invalid(format!("resource '{name}' already exists")));
        }

        // Ids double as creation order.
        let candidate = Ulid::new();
        let id = match self.store.latest_resource_id() {
            Some(latest) if latest >= candidate => latest.increment().unwrap_or(candidate),
            _ => candidate,
        };
        let event = Event::ResourceCreated {
            id,
            name: name.to_string(),
            kind,
            capacity,
        };
        self.persist_catalog(&event).await?;
        tracing::info!(%id, name, %kind, capacity, "resource created");
        Ok(Resource {
            id,
            name: name.to_string(),
            kind,
            capacity,
        })
    }

    /// Submit a booking request. It lands in `pending` unless it fails
    /// validation or overlaps an active booking on the same resource and date.
    pub async fn create_booking(
        &self,
        user_id: UserId,
        req: NewBooking,
    ) -> Result<Booking, BookingError> {
        let now = self.clock.now();
        let (req, range) = validate_request(&req, now.date())?;
        let resource = self
            .store
            .resource_by_name(&req.resource)
            .ok_or_else(|| BookingError::resource_not_found(&req.resource))?;

        let booking = Booking {
            id: Ulid::new(),
            user_id,
            resource_id: resource.id,
            title: req.title,
            purpose: req.purpose,
            date: req.date,
            range,
            status: BookingStatus::Pending,
            created_at: now,
        };
        self.insert_checked(booking).await
    }

    /// Load a historical or externally sourced booking as-is. Skips the
    /// calendar rules but still refuses to overlap an active booking.
    pub async fn import_booking(&self, booking: Booking) -> Result<Booking, BookingError> {
        if booking.range.start >= booking.range.end {
            return Err(BookingError::invalid("end time must be after start time"));
        }
        if !self.store.contains_resource(&booking.resource_id) {
            return Err(BookingError::resource_not_found(booking.resource_id.to_string()));
        }
        if self.store.day_key_for(&booking.id).is_some() {
            return Err(BookingError::invalid(format!("booking {} already exists", booking.id)));
        }
        self.insert_checked(booking).await
    }

    /// Conflict check and write under one schedule write lock.
    async fn insert_checked(&self, booking: Booking) -> Result<Booking, BookingError> {
        let _writes = self.write_gate.read().await;
        let day = self.store.day_or_create(booking.day_key());
        let mut guard = day.write().await;
        if booking.is_active() {
            check_no_conflict(&guard, &booking.range, None)?;
        }
        if guard.active_count() >= MAX_BOOKINGS_PER_DAY {
            return Err(BookingError::LimitExceeded("too many bookings for this resource and date"));
        }

        let event = Event::BookingRequested {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            id = %booking.id,
            user = %booking.user_id,
            resource = %booking.resource_id,
            date = %booking.date,
            start = %booking.range.start,
            end = %booking.range.end,
            status = %booking.status,
            "booking recorded"
        );
        Ok(booking)
    }

    /// Apply `action` on behalf of `actor`.
    ///
    /// - cancel: owner or an approver; anything but an already cancelled booking.
    /// - approve/reject: approver only; pending bookings only. Approval
    ///   re-checks the slot against every other active booking.
    pub async fn transition(
        &self,
        booking_id: BookingId,
        action: Action,
        actor: &Identity,
    ) -> Result<Booking, BookingError> {
        let _writes = self.write_gate.read().await;
        let mut guard = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| BookingError::booking_not_found(booking_id))?;

        match action {
            Action::Cancel => {
                if current.user_id != actor.user_id && !actor.role.can_manage_any_booking() {
                    return Err(BookingError::Forbidden("only the owner or an approver may cancel"));
                }
                if current.status == BookingStatus::Cancelled {
                    return Err(BookingError::InvalidState {
                        id: booking_id,
                        status: current.status,
                    });
                }
            }
            Action::Approve | Action::Reject => {
                if !actor.role.can_approve() {
                    return Err(BookingError::Forbidden("approver role required"));
                }
                if current.status != BookingStatus::Pending {
                    return Err(BookingError::InvalidState {
                        id: booking_id,
                        status: current.status,
                    });
                }
                if action == Action::Approve {
                    check_no_conflict(&guard, &current.range, Some(booking_id))?;
                }
            }
        }

        let status = action.target_status();
        let event = Event::BookingStatusChanged {
            id: booking_id,
            resource_id: current.resource_id,
            date: current.date,
            status,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "action" => action.as_str())
            .increment(1);
        tracing::info!(
            id = %booking_id,
            actor = %actor.user_id,
            %action,
            from = %current.status,
            to = %status,
            "booking transitioned"
        );

        Ok(Booking { status, ..current })
    }
}
