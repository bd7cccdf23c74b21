//! Caller-facing contract: string inputs in, views out. Authentication and
//! role gating for list endpoints happen here; booking rules live in the
//! engine.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Timelike};

use crate::directory::{Credentials, IdentityService};
use crate::engine::{BookingError, Engine};
use crate::model::*;

pub struct BookingService {
    engine: Arc<Engine>,
    identity: Arc<dyn IdentityService>,
}

impl BookingService {
    pub fn new(engine: Arc<Engine>, identity: Arc<dyn IdentityService>) -> Self {
        Self { engine, identity }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, BookingError> {
        self.identity.authenticate(credentials).await
    }

    /// `iso_start` and `iso_end` must name the same calendar date.
    pub async fn create_booking(
        &self,
        user_id: UserId,
        resource_name: &str,
        iso_start: &str,
        iso_end: &str,
        title: &str,
        purpose: &str,
    ) -> Result<BookingView, BookingError> {
        let start = parse_iso(iso_start)?;
        let end = parse_iso(iso_end)?;
        if start.date() != end.date() {
            return Err(BookingError::invalid("start and end must be on the same date"));
        }

        let booking = self
            .engine
            .create_booking(
                user_id,
                NewBooking {
                    resource: resource_name.to_string(),
                    date: start.date(),
                    start: start.time(),
                    end: end.time(),
                    title: title.to_string(),
                    purpose: purpose.to_string(),
                },
            )
            .await?;
        self.view_of(booking).await
    }

    /// `action` is one of approve, reject or cancel. A reject reason is
    /// echoed back and logged.
    pub async fn transition_booking(
        &self,
        booking_id: BookingId,
        action: &str,
        actor: &Identity,
        reason: Option<&str>,
    ) -> Result<TransitionOutcome, BookingError> {
        let action: Action = action
            .parse()
            .map_err(|()| BookingError::invalid(format!("invalid action '{}'", action.trim())))?;
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let booking = self.engine.transition(booking_id, action, actor).await?;
        if let Some(reason) = &reason {
            tracing::info!(id = %booking_id, %action, reason, "transition reason");
        }
        Ok(TransitionOutcome {
            id: booking.id,
            status: booking.status,
            action,
            reason,
        })
    }

    pub async fn list_my_bookings(&self, user_id: UserId) -> Result<Vec<BookingView>, BookingError> {
        self.engine.list_mine(user_id).await
    }

    pub async fn list_pending_bookings(
        &self,
        approver: &Identity,
        department: Option<DepartmentId>,
    ) -> Result<Vec<BookingView>, BookingError> {
        if !approver.role.can_approve() {
            return Err(BookingError::Forbidden("approver role required"));
        }
        self.engine.list_pending(department).await
    }

    pub async fn list_calendar_events(
        &self,
        resource: Option<ResourceId>,
    ) -> Result<Vec<CalendarEvent>, BookingError> {
        self.engine.list_calendar_events(resource).await
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        self.engine.list_resources()
    }

    async fn view_of(&self, booking: Booking) -> Result<BookingView, BookingError> {
        let id = booking.id;
        self.engine
            .list_mine(booking.user_id)
            .await?
            .into_iter()
            .find(|v| v.id == id)
            .ok_or_else(|| BookingError::booking_not_found(id))
    }
}

/// Wall-clock date and time from `YYYY-MM-DDTHH:MM[:SS[.fff]]` or RFC 3339,
/// cut to whole minutes. Any offset is dropped, not converted.
pub fn parse_iso(value: &str) -> Result<NaiveDateTime, BookingError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BookingError::invalid("all fields are required"));
    }
    let parsed = match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => dt.naive_local(),
        Err(_) => value
            .parse::<NaiveDateTime>()
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
            .map_err(|_| BookingError::invalid(format!("invalid date-time '{value}'")))?,
    };
    parsed
        .with_second(0)
        .and_then(|dt| dt.with_nanosecond(0))
        .ok_or_else(|| BookingError::invalid(format!("invalid date-time '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::directory::MemoryDirectory;
    use crate::notify::NotifyHub;
    use chrono::{NaiveDate, NaiveTime};
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("campus_booking_test_service");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(h, mi, 0).unwrap())
    }

    async fn service(name: &str) -> (BookingService, Arc<MemoryDirectory>, Identity, Identity) {
        let directory = Arc::new(MemoryDirectory::new());
        let student = User {
            id: Ulid::new(),
            display_name: "Sam Student".into(),
            email: "sam@college.edu".into(),
            role: Role::Student,
            department_id: 1,
            department: "Computer Science".into(),
        };
        let hod = User {
            id: Ulid::new(),
            display_name: "Hal Head".into(),
            email: "hal@college.edu".into(),
            role: Role::Hod,
            department_id: 1,
            department: "Computer Science".into(),
        };
        let ids = (student.identity(), hod.identity());
        directory.insert_user(student);
        directory.insert_user(hod);

        let engine = Engine::new(test_wal_path(name), Arc::new(NotifyHub::new()), directory.clone())
            .unwrap()
            .with_clock(Arc::new(FixedClock(dt(2025, 6, 2, 9, 0))));
        engine.create_resource("Lab", ResourceKind::Lab, 30).await.unwrap();
        let service = BookingService::new(Arc::new(engine), directory.clone());
        (service, directory, ids.0, ids.1)
    }

    #[test]
    fn parses_iso_variants() {
        let expected = dt(2025, 6, 2, 10, 0);
        assert_eq!(parse_iso("2025-06-02T10:00").unwrap(), expected);
        assert_eq!(parse_iso("2025-06-02T10:00:00").unwrap(), expected);
        assert_eq!(parse_iso(" 2025-06-02T10:00:00.000 ").unwrap(), expected);
        assert_eq!(parse_iso("2025-06-02T10:00:00Z").unwrap(), expected);
        assert_eq!(parse_iso("2025-06-02T10:00:00+05:30").unwrap(), expected);
        assert_eq!(parse_iso("2025-06-02T10:00:45.250").unwrap(), expected);
        assert!(matches!(parse_iso("02/06/2025 10:00"), Err(BookingError::InvalidRequest(_))));
        assert!(matches!(parse_iso(""), Err(BookingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn create_returns_annotated_view() {
        let (svc, _, student, _) = service("create_view.wal").await;
        let view = svc
            .create_booking(
                student.user_id,
                "Lab",
                "2025-06-02T10:00:00",
                "2025-06-02T12:00:00",
                "Machine Learning Workshop",
                "Hands-on session",
            )
            .await
            .unwrap();
        assert_eq!(view.resource, "Lab");
        assert_eq!(view.status, BookingStatus::Pending);
        assert_eq!(view.start, dt(2025, 6, 2, 10, 0));
        assert_eq!(view.requester_name.as_deref(), Some("Sam Student"));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["requesterName"], "Sam Student");
    }

    #[tokio::test]
    async fn create_rejects_cross_date_range() {
        let (svc, _, student, _) = service("cross_date.wal").await;
        let r = svc
            .create_booking(
                student.user_id,
                "Lab",
                "2025-06-02T22:00",
                "2025-06-03T01:00",
                "Overnight",
                "Too long",
            )
            .await;
        assert!(matches!(r, Err(BookingError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn sub_minute_range_collapses_and_is_rejected() {
        let (svc, _, student, _) = service("sub_minute.wal").await;
        let r = svc
            .create_booking(
                student.user_id,
                "Lab",
                "2025-06-02T10:00:30",
                "2025-06-02T10:00:45",
                "Blink",
                "Fifteen seconds",
            )
            .await;
        assert!(matches!(r, Err(BookingError::InvalidRequest(_))));

        let view = svc
            .create_booking(
                student.user_id,
                "Lab",
                "2025-06-02T10:00:30",
                "2025-06-02T10:30:59",
                "Standup",
                "Short sync",
            )
            .await
            .unwrap();
        assert_eq!(view.start, dt(2025, 6, 2, 10, 0));
        assert_eq!(view.end, dt(2025, 6, 2, 10, 30));
    }

    #[tokio::test]
    async fn transition_parses_action_and_echoes_reason() {
        let (svc, _, student, hod) = service("transition.wal").await;
        let view = svc
            .create_booking(student.user_id, "Lab", "2025-06-03T10:00", "2025-06-03T11:00", "T", "P")
            .await
            .unwrap();

        let bad = svc.transition_booking(view.id, "archive", &hod, None).await;
        assert!(matches!(bad, Err(BookingError::InvalidRequest(_))));

        let outcome = svc
            .transition_booking(view.id, " Reject ", &hod, Some("Room under maintenance"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome {
                id: view.id,
                status: BookingStatus::Rejected,
                action: Action::Reject,
                reason: Some("Room under maintenance".into()),
            }
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["action"], "reject");

        let cancel = svc
            .transition_booking(view.id, "cancel", &student, Some("  "))
            .await
            .unwrap();
        assert_eq!(cancel.reason, None);
        assert_eq!(cancel.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn pending_list_requires_approver() {
        let (svc, _, student, hod) = service("pending_gate.wal").await;
        svc.create_booking(student.user_id, "Lab", "2025-06-03T10:00", "2025-06-03T11:00", "T", "P")
            .await
            .unwrap();

        let denied = svc.list_pending_bookings(&student, None).await;
        assert!(matches!(denied, Err(BookingError::Forbidden(_))));
        assert_eq!(svc.list_pending_bookings(&hod, Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn authenticate_with_session_token() {
        let (svc, directory, student, _) = service("auth.wal").await;
        let token = directory.open_session(student.user_id).unwrap();

        let who = svc.authenticate(&Credentials::Bearer(token.clone())).await.unwrap();
        assert_eq!(who, student);

        directory.close_session(&token);
        let gone = svc.authenticate(&Credentials::Bearer(token)).await;
        assert!(matches!(gone, Err(BookingError::Unauthenticated)));
        assert_eq!(svc.list_resources().len(), 1);
    }
}
