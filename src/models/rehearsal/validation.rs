use std::collections::HashSet;

use crate::error::{CadenceError, CadenceResult};
use crate::models::rehearsal::{RecurringPattern, Rehearsal, Venue};

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// Checks every field constraint of a rehearsal before it is written,
/// reporting the first violation.
pub fn validate_rehearsal(rehearsal: &Rehearsal) -> CadenceResult<()> {
    if rehearsal.title.trim().is_empty() {
        return Err(CadenceError::validation(
            "title",
            "Please provide a title for the rehearsal",
        ));
    }
    if rehearsal.title.chars().count() > MAX_TITLE_LENGTH {
        return Err(CadenceError::validation(
            "title",
            format!("Title cannot be more than {} characters", MAX_TITLE_LENGTH),
        ));
    }
    if let Some(description) = &rehearsal.description {
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(CadenceError::validation(
                "description",
                format!(
                    "Description cannot be more than {} characters",
                    MAX_DESCRIPTION_LENGTH
                ),
            ));
        }
    }
    if rehearsal.end_time <= rehearsal.start_time {
        return Err(CadenceError::validation(
            "endTime",
            "End time must be after start time",
        ));
    }

    validate_venue(&rehearsal.venue)?;

    match &rehearsal.recurring_pattern {
        Some(pattern) => validate_pattern(pattern)?,
        None if rehearsal.is_recurring => {
            return Err(CadenceError::validation(
                "recurringPattern",
                "Recurring rehearsals need a recurring pattern",
            ))
        }
        None => {}
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = rehearsal
        .attendance
        .iter()
        .find(|record| !seen.insert(record.user_id))
    {
        return Err(CadenceError::validation(
            "attendance",
            format!("User {} appears more than once", duplicate.user_id),
        ));
    }

    Ok(())
}

fn validate_venue(venue: &Venue) -> CadenceResult<()> {
    if venue.name.trim().is_empty() {
        return Err(CadenceError::validation(
            "venue.name",
            "Please provide a venue name",
        ));
    }

    if let Some(coordinates) = &venue.coordinates {
        if !(-90.0..=90.0).contains(&coordinates.lat) {
            return Err(CadenceError::validation(
                "venue.coordinates.lat",
                "Latitude must be between -90 and 90",
            ));
        }
        if !(-180.0..=180.0).contains(&coordinates.lng) {
            return Err(CadenceError::validation(
                "venue.coordinates.lng",
                "Longitude must be between -180 and 180",
            ));
        }
    }

    Ok(())
}

fn validate_pattern(pattern: &RecurringPattern) -> CadenceResult<()> {
    if pattern.interval < 1 {
        return Err(CadenceError::validation(
            "recurringPattern.interval",
            "Interval must be at least 1",
        ));
    }
    if pattern.days_of_week.iter().any(|day| *day > 6) {
        return Err(CadenceError::validation(
            "recurringPattern.daysOfWeek",
            "Days of week must be between 0-6 (Sunday-Saturday)",
        ));
    }
    if pattern.count == Some(0) {
        return Err(CadenceError::validation(
            "recurringPattern.count",
            "Count must be at least 1",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::models::rehearsal::{Coordinates, Frequency};
    use crate::models::DateTime;
    use crate::tests::mock::mock_rehearsal;

    fn rejected_field(rehearsal: &Rehearsal) -> String {
        match validate_rehearsal(rehearsal) {
            Err(CadenceError::Validation { field, .. }) => field,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn mock_rehearsal_is_valid() {
        assert!(validate_rehearsal(&mock_rehearsal()).is_ok());
    }

    #[test]
    fn end_before_start_is_rejected_on_end_time() {
        let rehearsal = Rehearsal {
            start_time: DateTime(datetime!(2024-01-01 18:00 UTC)),
            end_time: DateTime(datetime!(2024-01-01 17:00 UTC)),
            ..mock_rehearsal()
        };

        assert_eq!(rejected_field(&rehearsal), "endTime");
    }

    #[test]
    fn end_equal_to_start_is_rejected() {
        let mut rehearsal = mock_rehearsal();
        rehearsal.end_time = rehearsal.start_time;

        assert_eq!(rejected_field(&rehearsal), "endTime");
    }

    #[test]
    fn titles_are_required_and_bounded() {
        let blank = Rehearsal {
            title: "   ".to_owned(),
            ..mock_rehearsal()
        };
        let long = Rehearsal {
            title: "x".repeat(MAX_TITLE_LENGTH + 1),
            ..mock_rehearsal()
        };
        let exact = Rehearsal {
            title: "x".repeat(MAX_TITLE_LENGTH),
            ..mock_rehearsal()
        };

        assert_eq!(rejected_field(&blank), "title");
        assert_eq!(rejected_field(&long), "title");
        assert!(validate_rehearsal(&exact).is_ok());
    }

    #[test]
    fn long_descriptions_are_rejected() {
        let rehearsal = Rehearsal {
            description: Some("x".repeat(MAX_DESCRIPTION_LENGTH + 1)),
            ..mock_rehearsal()
        };

        assert_eq!(rejected_field(&rehearsal), "description");
    }

    #[test]
    fn the_first_violation_is_reported() {
        let rehearsal = Rehearsal {
            title: String::new(),
            start_time: DateTime(datetime!(2024-01-01 18:00 UTC)),
            end_time: DateTime(datetime!(2024-01-01 17:00 UTC)),
            ..mock_rehearsal()
        };

        assert_eq!(rejected_field(&rehearsal), "title");
    }

    #[test]
    fn venues_need_a_name_and_sane_coordinates() {
        let mut unnamed = mock_rehearsal();
        unnamed.venue.name = " ".to_owned();
        let mut off_the_map = mock_rehearsal();
        off_the_map.venue.coordinates = Some(Coordinates { lat: 91.0, lng: 0.0 });
        let mut wrapped = mock_rehearsal();
        wrapped.venue.coordinates = Some(Coordinates { lat: 0.0, lng: -180.5 });

        assert_eq!(rejected_field(&unnamed), "venue.name");
        assert_eq!(rejected_field(&off_the_map), "venue.coordinates.lat");
        assert_eq!(rejected_field(&wrapped), "venue.coordinates.lng");
    }

    #[test]
    fn pattern_fields_are_checked() {
        let pattern = RecurringPattern {
            frequency: Frequency::Weekly,
            interval: 1,
            days_of_week: vec![1, 7],
            end_date: None,
            count: Some(3),
        };
        let bad_days = Rehearsal {
            is_recurring: true,
            recurring_pattern: Some(pattern.clone()),
            ..mock_rehearsal()
        };
        let bad_interval = Rehearsal {
            is_recurring: true,
            recurring_pattern: Some(RecurringPattern {
                interval: 0,
                days_of_week: vec![1],
                ..pattern.clone()
            }),
            ..mock_rehearsal()
        };
        let missing = Rehearsal {
            is_recurring: true,
            recurring_pattern: None,
            ..mock_rehearsal()
        };

        assert_eq!(rejected_field(&bad_days), "recurringPattern.daysOfWeek");
        assert_eq!(rejected_field(&bad_interval), "recurringPattern.interval");
        assert_eq!(rejected_field(&missing), "recurringPattern");
    }

    #[test]
    fn duplicate_attendance_is_rejected() {
        let mut rehearsal = mock_rehearsal();
        let member = Uuid::new_v4();
        rehearsal.initialize_attendance([member]);
        rehearsal.attendance.push(rehearsal.attendance[0].clone());

        assert_eq!(rejected_field(&rehearsal), "attendance");
    }
}
