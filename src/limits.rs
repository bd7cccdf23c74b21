pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_PURPOSE_LEN: usize = 2000;
pub const MAX_RESOURCE_NAME_LEN: usize = 128;

/// Active (pending or approved) bookings on one resource for one date.
pub const MAX_BOOKINGS_PER_DAY: usize = 512;
