//! Local time display for the execution listing.

use std::sync::OnceLock;

pub trait OffsetDateTimeExt {
    /// Converts to the local offset. The offset is looked up once and cached, so make the first call before any
    /// threads are spawned, see [`time::UtcOffset::current_local_offset`].
    fn to_local(self) -> time::Result<time::OffsetDateTime>;
}

type LocalOffset = Result<time::UtcOffset, time::error::IndeterminateOffset>;

pub fn local_offset() -> LocalOffset {
    static CACHE: OnceLock<LocalOffset> = OnceLock::new();
    *CACHE.get_or_init(time::UtcOffset::current_local_offset)
}

impl OffsetDateTimeExt for time::OffsetDateTime {
    fn to_local(self) -> time::Result<time::OffsetDateTime> {
        local_offset()
            .map(|offset| self.to_offset(offset))
            .map_err(time::Error::from)
    }
}

pub fn format_offset(value: time::UtcOffset) -> Result<String, time::error::Format> {
    let fd = time::macros::format_description!("[offset_hour sign:mandatory]:[offset_minute]");
    value.format(fd)
}

/// Formats as `2024-05-01 10:20:30` in the given offset.
pub fn format_date_time(value: time::OffsetDateTime) -> Result<String, time::error::Format> {
    let fd = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    value.format(fd)
}

/// Formats a duration as `1h 2m 3s`, omitting leading zero units.
pub fn format_duration(value: time::Duration) -> String {
    let total = value.whole_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m {seconds}s"),
        _ => format!("{hours}h {minutes}m {seconds}s"),
    }
}
