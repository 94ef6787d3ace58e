use async_graphql::{ComplexObject, Context, Enum, ErrorExtensions, Result, SimpleObject};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::store;
use crate::error::{CadenceError, CadenceResult};
use crate::models::rehearsal::Rehearsal;
use crate::models::user::User;
use crate::models::DateTime;
use crate::util::{current_time, trimmed};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Confirmed,
    Declined,
    Pending,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Confirmed => "confirmed",
            AttendanceStatus::Declined => "declined",
            AttendanceStatus::Pending => "pending",
        }
    }
}

impl Default for AttendanceStatus {
    fn default() -> Self {
        AttendanceStatus::Pending
    }
}

/// A band member's response to a single rehearsal.
#[derive(Clone, Debug, PartialEq, SimpleObject, Serialize, Deserialize)]
#[graphql(complex)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    /// The ID of the member this record belongs to
    pub user_id: Uuid,
    /// Whether the member is coming
    #[serde(default)]
    pub status: AttendanceStatus,
    /// An optional note left with the response
    pub response: Option<String>,
    /// When the member last responded
    pub responded_at: Option<DateTime>,
}

#[ComplexObject]
impl Attendance {
    /// The member this record belongs to
    pub async fn user(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        store(ctx).user(self.user_id).await.map_err(|err| err.extend())
    }
}

impl Attendance {
    pub fn pending(user_id: Uuid) -> Self {
        Self {
            user_id,
            status: AttendanceStatus::Pending,
            response: None,
            responded_at: None,
        }
    }
}

/// Response totals for a rehearsal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, SimpleObject)]
pub struct AttendanceCounts {
    pub confirmed: u32,
    pub declined: u32,
    pub pending: u32,
    pub total: u32,
}

impl AttendanceCounts {
    pub fn tally(attendance: &[Attendance]) -> Self {
        attendance.iter().fold(
            Self {
                total: attendance.len() as u32,
                ..Self::default()
            },
            |mut counts, record| {
                match record.status {
                    AttendanceStatus::Confirmed => counts.confirmed += 1,
                    AttendanceStatus::Declined => counts.declined += 1,
                    AttendanceStatus::Pending => counts.pending += 1,
                }
                counts
            },
        )
    }
}

impl Rehearsal {
    /// Adds a pending record for each member that doesn't have one yet.
    ///
    /// Returns how many records were added.
    pub fn initialize_attendance(&mut self, member_ids: impl IntoIterator<Item = Uuid>) -> usize {
        let before = self.attendance.len();
        for member_id in member_ids {
            if !self.attendance.iter().any(|record| record.user_id == member_id) {
                self.attendance.push(Attendance::pending(member_id));
            }
        }

        self.attendance.len() - before
    }

    /// Records a member's RSVP, stamping it with the current time.
    pub fn record_response(
        &mut self,
        user_id: Uuid,
        status: AttendanceStatus,
        response: Option<String>,
    ) -> CadenceResult<&Attendance> {
        let record = self
            .attendance
            .iter_mut()
            .find(|record| record.user_id == user_id)
            .ok_or(CadenceError::UnknownMember(user_id))?;

        record.status = status;
        record.response = trimmed(response);
        record.responded_at = Some(current_time());

        Ok(record)
    }

    pub fn attendance_for(&self, user_id: Uuid) -> Option<&Attendance> {
        self.attendance.iter().find(|record| record.user_id == user_id)
    }

    pub fn summarize_attendance(&self) -> AttendanceCounts {
        AttendanceCounts::tally(&self.attendance)
    }
}
