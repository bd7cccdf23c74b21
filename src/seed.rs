//! Demo catalog, users and bookings for a fresh installation. Every step
//! checks what already exists, so running it on every start is safe.

use chrono::{Days, NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::directory::MemoryDirectory;
use crate::engine::{BookingError, Engine};
use crate::model::*;

const DEPARTMENTS: [&str; 3] = ["Computer Science", "Electronics", "Mechanical"];

const RESOURCES: [(&str, ResourceKind, u32); 3] = [
    ("Seminar Hall", ResourceKind::Seminar, 100),
    ("Auditorium", ResourceKind::Auditorium, 500),
    ("Lab", ResourceKind::Lab, 30),
];

/// (id seed, email, display name, role)
const DEMO_USERS: [(u128, &str, &str, Role); 3] = [
    (1, "student@college.edu", "John Student", Role::Student),
    (2, "teacher@college.edu", "Dr. Jane Teacher", Role::Teacher),
    (3, "hod@college.edu", "Prof. Smith HOD", Role::Hod),
];

/// When a demo booking falls relative to the seeding day.
#[derive(Debug, Clone, Copy)]
enum Offset {
    Ahead(u64),
    Back(u64),
}

struct DemoBooking {
    owner: u128,
    resource: &'static str,
    title: &'static str,
    purpose: &'static str,
    offset: Offset,
    start: (u32, u32),
    end: (u32, u32),
}

const DEMO_BOOKINGS: [DemoBooking; 7] = [
    DemoBooking {
        owner: 1,
        resource: "Lab",
        title: "Machine Learning Workshop",
        purpose: "Hands-on workshop on neural networks and deep learning",
        offset: Offset::Ahead(6),
        start: (10, 0),
        end: (12, 0),
    },
    DemoBooking {
        owner: 1,
        resource: "Seminar Hall",
        title: "Project Presentation",
        purpose: "Final year project presentation and demonstration",
        offset: Offset::Ahead(7),
        start: (14, 0),
        end: (16, 0),
    },
    DemoBooking {
        owner: 1,
        resource: "Auditorium",
        title: "Project Demo Day",
        purpose: "Demonstrating final year projects to faculty and peers",
        offset: Offset::Ahead(9),
        start: (14, 0),
        end: (16, 0),
    },
    DemoBooking {
        owner: 2,
        resource: "Auditorium",
        title: "Faculty Development Session",
        purpose: "Training session on modern teaching methodologies",
        offset: Offset::Back(8),
        start: (14, 0),
        end: (16, 0),
    },
    DemoBooking {
        owner: 2,
        resource: "Seminar Hall",
        title: "Research Presentation",
        purpose: "Presenting research findings to department",
        offset: Offset::Ahead(3),
        start: (10, 0),
        end: (12, 0),
    },
    DemoBooking {
        owner: 3,
        resource: "Auditorium",
        title: "Department Annual Meeting",
        purpose: "Annual department meeting to discuss achievements and plans",
        offset: Offset::Back(5),
        start: (10, 0),
        end: (12, 0),
    },
    DemoBooking {
        owner: 3,
        resource: "Seminar Hall",
        title: "Industry Collaboration Workshop",
        purpose: "Workshop on industry-academia collaboration",
        offset: Offset::Ahead(10),
        start: (9, 0),
        end: (11, 0),
    },
];

/// What a bootstrap run added.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub departments: usize,
    pub users: usize,
    pub resources: usize,
    pub bookings: usize,
}

/// Stable id for a demo user, so bookings replayed from an earlier run still
/// point at the same person.
pub fn demo_user_id(n: u128) -> UserId {
    Ulid::from_parts(0, n)
}

/// `days` ahead of `from`, pushed forward to Monday if it lands on a weekend.
pub fn next_weekday(from: NaiveDate, days: u64) -> Option<NaiveDate> {
    let mut date = from.checked_add_days(Days::new(days))?;
    while is_weekend(date) {
        date = date.succ_opt()?;
    }
    Some(date)
}

/// `days` before `from`, pulled back to Friday if it lands on a weekend.
pub fn previous_weekday(from: NaiveDate, days: u64) -> Option<NaiveDate> {
    let mut date = from.checked_sub_days(Days::new(days))?;
    while is_weekend(date) {
        date = date.pred_opt()?;
    }
    Some(date)
}

pub async fn bootstrap(engine: &Engine, directory: &MemoryDirectory) -> Result<SeedSummary, BookingError> {
    let mut summary = SeedSummary::default();

    if directory.departments().is_empty() {
        for (i, name) in DEPARTMENTS.iter().enumerate() {
            directory.insert_department(Department {
                id: i as DepartmentId + 1,
                name: name.to_string(),
            });
            summary.departments += 1;
        }
    }

    for (n, email, name, role) in DEMO_USERS {
        let added = directory.insert_user(User {
            id: demo_user_id(n),
            display_name: name.to_string(),
            email: email.to_string(),
            role,
            department_id: 1,
            department: DEPARTMENTS[0].to_string(),
        });
        if added {
            summary.users += 1;
        }
    }

    if engine.list_resources().is_empty() {
        for (name, kind, capacity) in RESOURCES {
            engine.create_resource(name, kind, capacity).await?;
            summary.resources += 1;
        }
    }

    summary.bookings = seed_bookings(engine).await?;
    tracing::info!(
        departments = summary.departments,
        users = summary.users,
        resources = summary.resources,
        bookings = summary.bookings,
        "bootstrap complete"
    );
    Ok(summary)
}

async fn seed_bookings(engine: &Engine) -> Result<usize, BookingError> {
    for (n, ..) in DEMO_USERS {
        if !engine.list_mine(demo_user_id(n)).await?.is_empty() {
            tracing::debug!("demo bookings already present, skipping");
            return Ok(0);
        }
    }

    let now = engine.now();
    let today = now.date();
    let mut count = 0;
    for demo in &DEMO_BOOKINGS {
        let Some(resource) = engine.resource_by_name(demo.resource) else {
            tracing::debug!(resource = demo.resource, "demo resource missing, skipping booking");
            continue;
        };
        let (date, status) = match demo.offset {
            Offset::Ahead(days) => (next_weekday(today, days), BookingStatus::Pending),
            Offset::Back(days) => (previous_weekday(today, days), BookingStatus::Conducted),
        };
        let date = date.ok_or_else(|| BookingError::invalid("demo date out of range"))?;
        let start = time(demo.start)?;
        let end = time(demo.end)?;

        engine
            .import_booking(Booking {
                id: Ulid::new(),
                user_id: demo_user_id(demo.owner),
                resource_id: resource.id,
                title: demo.title.to_string(),
                purpose: demo.purpose.to_string(),
                date,
                range: TimeRange::new(start, end),
                status,
                created_at: now,
            })
            .await?;
        count += 1;
    }
    Ok(count)
}

fn time((hour, minute): (u32, u32)) -> Result<NaiveTime, BookingError> {
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| BookingError::invalid("bad demo time"))
}
