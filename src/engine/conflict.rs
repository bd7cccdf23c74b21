use chrono::{Datelike, NaiveDate, Weekday};

use crate::limits::*;
use crate::model::*;

use super::BookingError;

/// Field and calendar checks for a booking request. Returns the trimmed
/// request and its validated range.
pub(crate) fn validate_request(
    req: &NewBooking,
    today: NaiveDate,
) -> Result<(NewBooking, TimeRange), BookingError> {
    let resource = req.resource.trim();
    let title = req.title.trim();
    let purpose = req.purpose.trim();
    if resource.is_empty() || title.is_empty() || purpose.is_empty() {
        return Err(BookingError::invalid("all fields are required"));
    }
    if resource.len() > MAX_RESOURCE_NAME_LEN {
        return Err(BookingError::invalid("resource name too long"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(BookingError::invalid("title too long"));
    }
    if purpose.len() > MAX_PURPOSE_LEN {
        return Err(BookingError::invalid("purpose too long"));
    }
    let range = TimeRange::try_new(req.start, req.end)
        .ok_or_else(|| BookingError::invalid("end time must be after start time"))?;
    validate_date(req.date, today)?;

    let cleaned = NewBooking {
        resource: resource.to_string(),
        title: title.to_string(),
        purpose: purpose.to_string(),
        ..req.clone()
    };
    Ok((cleaned, range))
}

pub(crate) fn validate_date(date: NaiveDate, today: NaiveDate) -> Result<(), BookingError> {
    if date < today {
        return Err(BookingError::invalid("cannot book resources for past dates"));
    }
    match date.weekday() {
        Weekday::Sat => Err(BookingError::invalid("bookings are not allowed on Saturdays")),
        Weekday::Sun => Err(BookingError::invalid("bookings are not allowed on Sundays")),
        _ => Ok(()),
    }
}

/// First active booking in `day` overlapping `range`, skipping `exclude`.
pub(crate) fn find_conflict(
    day: &DaySchedule,
    range: &TimeRange,
    exclude: Option<BookingId>,
) -> Option<BookingId> {
    day.overlapping(range)
        .filter(|b| b.is_active())
        .find(|b| Some(b.id) != exclude)
        .map(|b| b.id)
}

pub(crate) fn check_no_conflict(
    day: &DaySchedule,
    range: &TimeRange,
    exclude: Option<BookingId>,
) -> Result<(), BookingError> {
    match find_conflict(day, range, exclude) {
        Some(existing) => {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL).increment(1);
            tracing::debug!(
                resource = %day.resource_id,
                date = %day.date,
                %existing,
                "slot conflict"
            );
            Err(BookingError::Conflict(existing))
        }
        None => Ok(()),
    }
}
