use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type ResourceId = Ulid;
pub type BookingId = Ulid;
pub type UserId = Ulid;
pub type DepartmentId = u32;

/// One scheduling domain: all active bookings under a key must be disjoint.
pub type DayKey = (ResourceId, NaiveDate);

/// Half-open time-of-day range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration(&self) -> chrono::TimeDelta {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Seminar,
    Auditorium,
    Lab,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Seminar => "seminar",
            ResourceKind::Auditorium => "auditorium",
            ResourceKind::Lab => "lab",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Conducted,
}

impl BookingStatus {
    /// Only pending and approved bookings reserve their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Approved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Conducted => "conducted",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status shown on the calendar. Derived from the date alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Pending,
    Conducted,
}

impl DisplayStatus {
    pub fn for_date(date: NaiveDate, today: NaiveDate) -> Self {
        if date < today {
            DisplayStatus::Conducted
        } else {
            DisplayStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Reject,
    Cancel,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Cancel => "cancel",
        }
    }

    /// Status a booking lands in once the action succeeds.
    pub fn target_status(&self) -> BookingStatus {
        match self {
            Action::Approve => BookingStatus::Approved,
            Action::Reject => BookingStatus::Rejected,
            Action::Cancel => BookingStatus::Cancelled,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Action::Approve),
            "reject" => Ok(Action::Reject),
            "cancel" => Ok(Action::Cancel),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Hod,
}

impl Role {
    pub fn can_approve(&self) -> bool {
        matches!(self, Role::Hod)
    }

    /// May cancel bookings it does not own.
    pub fn can_manage_any_booking(&self) -> bool {
        matches!(self, Role::Hod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Hod => "hod",
        }
    }
}

/// Who is acting, as established by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub department_id: DepartmentId,
    pub department: String,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub resource_id: ResourceId,
    pub title: String,
    pub purpose: String,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub status: BookingStatus,
    pub created_at: NaiveDateTime,
}

impl Booking {
    pub fn day_key(&self) -> DayKey {
        (self.resource_id, self.date)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.range.start)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.date.and_time(self.range.end)
    }
}

/// Input to a booking request, already split into date and times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub resource: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub title: String,
    pub purpose: String,
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// All bookings of one resource on one date, sorted by start time.
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub bookings: Vec<Booking>,
}

impl DaySchedule {
    pub fn new(resource_id: ResourceId, date: NaiveDate) -> Self {
        Self {
            resource_id,
            date,
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining sort order by start time.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.range.start <= booking.range.start);
        self.bookings.insert(pos, booking);
    }

    pub fn get(&self, id: &BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    /// Pending and approved bookings only.
    pub fn active_count(&self) -> usize {
        self.bookings.iter().filter(|b| b.is_active()).count()
    }

    pub fn set_status(&mut self, id: &BookingId, status: BookingStatus) -> bool {
        match self.bookings.iter_mut().find(|b| b.id == *id) {
            Some(b) => {
                b.status = status;
                true
            }
            None => false,
        }
    }

    /// Bookings whose range overlaps `query`, any status.
    /// Everything at or after the partition point starts at or after `query.end`.
    pub fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.range.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.range.end > query.start)
    }
}

/// The log record format. Flat, one variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated {
        id: ResourceId,
        name: String,
        kind: ResourceKind,
        capacity: u32,
    },
    BookingRequested {
        booking: Booking,
    },
    BookingStatusChanged {
        id: BookingId,
        resource_id: ResourceId,
        date: NaiveDate,
        status: BookingStatus,
    },
}

impl Event {
    pub fn resource_id(&self) -> ResourceId {
        match self {
            Event::ResourceCreated { id, .. } => *id,
            Event::BookingRequested { booking } => booking.resource_id,
            Event::BookingStatusChanged { resource_id, .. } => *resource_id,
        }
    }
}

// ── Read-side views ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub id: BookingId,
    pub title: String,
    pub resource: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub purpose: String,
    pub status: BookingStatus,
    pub requester_id: UserId,
    pub requester_name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: BookingId,
    pub title: String,
    pub resource: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub purpose: String,
    pub status: DisplayStatus,
    pub requester_id: UserId,
    pub requester_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub id: BookingId,
    pub status: BookingStatus,
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn booking_at(start: NaiveTime, end: NaiveTime) -> Booking {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            resource_id: Ulid::new(),
            title: "t".into(),
            purpose: "p".into(),
            date,
            range: TimeRange::new(start, end),
            status: BookingStatus::Pending,
            created_at: date.and_time(t(8, 0)),
        }
    }

    #[test]
    fn range_overlap_is_half_open() {
        let a = TimeRange::new(t(10, 0), t(12, 0));
        let b = TimeRange::new(t(11, 0), t(13, 0));
        let c = TimeRange::new(t(12, 0), t(13, 0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // abutting at 12:00
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn range_requires_start_before_end() {
        assert!(TimeRange::try_new(t(10, 0), t(10, 0)).is_none());
        assert!(TimeRange::try_new(t(11, 0), t(10, 0)).is_none());
        let r = TimeRange::try_new(t(9, 30), t(11, 0)).unwrap();
        assert_eq!(r.duration(), chrono::TimeDelta::minutes(90));
    }

    #[test]
    fn only_pending_and_approved_are_active() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Approved.is_active());
        assert!(!BookingStatus::Rejected.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(!BookingStatus::Conducted.is_active());
    }

    #[test]
    fn role_capabilities() {
        assert!(Role::Hod.can_approve());
        assert!(Role::Hod.can_manage_any_booking());
        assert!(!Role::Teacher.can_approve());
        assert!(!Role::Student.can_manage_any_booking());
    }

    #[test]
    fn action_parsing() {
        assert_eq!(" Approve ".parse::<Action>(), Ok(Action::Approve));
        assert_eq!("REJECT".parse::<Action>(), Ok(Action::Reject));
        assert_eq!("cancel".parse::<Action>(), Ok(Action::Cancel));
        assert!("delete".parse::<Action>().is_err());
        assert_eq!(Action::Cancel.target_status(), BookingStatus::Cancelled);
    }

    #[test]
    fn weekend_detection() {
        let sat = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        let sun = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        let mon = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert!(is_weekend(sat));
        assert!(is_weekend(sun));
        assert!(!is_weekend(mon));
    }

    #[test]
    fn display_status_depends_on_date_only() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 4).unwrap();
        let yesterday = today.pred_opt().unwrap();
        assert_eq!(DisplayStatus::for_date(yesterday, today), DisplayStatus::Conducted);
        assert_eq!(DisplayStatus::for_date(today, today), DisplayStatus::Pending);
    }

    #[test]
    fn schedule_keeps_start_order() {
        let mut day = DaySchedule::new(Ulid::new(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        day.insert_booking(booking_at(t(14, 0), t(15, 0)));
        day.insert_booking(booking_at(t(9, 0), t(10, 0)));
        day.insert_booking(booking_at(t(11, 0), t(12, 0)));
        let starts: Vec<_> = day.bookings.iter().map(|b| b.range.start).collect();
        assert_eq!(starts, vec![t(9, 0), t(11, 0), t(14, 0)]);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut day = DaySchedule::new(Ulid::new(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        day.insert_booking(booking_at(t(8, 0), t(9, 0)));
        let hit = booking_at(t(10, 0), t(12, 0));
        let hit_id = hit.id;
        day.insert_booking(hit);
        day.insert_booking(booking_at(t(13, 0), t(14, 0)));

        let found: Vec<_> = day
            .overlapping(&TimeRange::new(t(9, 0), t(13, 0)))
            .map(|b| b.id)
            .collect();
        assert_eq!(found, vec![hit_id]);
    }

    #[test]
    fn set_status_updates_in_place() {
        let mut day = DaySchedule::new(Ulid::new(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        let b = booking_at(t(8, 0), t(9, 0));
        let id = b.id;
        day.insert_booking(b);
        assert!(day.set_status(&id, BookingStatus::Approved));
        assert_eq!(day.get(&id).unwrap().status, BookingStatus::Approved);
        assert!(!day.set_status(&Ulid::new(), BookingStatus::Approved));
    }

    #[test]
    fn active_count_skips_closed_bookings() {
        let mut day = DaySchedule::new(Ulid::new(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        let cancelled = booking_at(t(8, 0), t(9, 0));
        let cancelled_id = cancelled.id;
        day.insert_booking(cancelled);
        day.insert_booking(booking_at(t(9, 0), t(10, 0)));
        day.set_status(&cancelled_id, BookingStatus::Cancelled);
        assert_eq!(day.active_count(), 1);
    }
}
