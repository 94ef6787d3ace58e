use time::OffsetDateTime;

use crate::models::DateTime;

pub fn current_time() -> DateTime {
    DateTime(OffsetDateTime::now_utc())
}

/// Trims a string, collapsing blank input to `None`.
pub fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
