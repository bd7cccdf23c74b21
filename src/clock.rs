use chrono::{Local, NaiveDate, NaiveDateTime};

/// Source of "now" for date rules. Naive local time, no zones.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always reports the same instant.
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// 09:00 on the given date.
    pub fn at_date(date: NaiveDate) -> Self {
        Self(date.and_hms_opt(9, 0, 0).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
