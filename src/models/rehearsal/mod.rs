use async_graphql::{ComplexObject, Context, ErrorExtensions, InputObject, Result, SimpleObject};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::{store, Store};
use crate::error::{CadenceError, CadenceResult};
use crate::models::band::Band;
use crate::models::permissions::{can_modify, ensure_can_modify};
use crate::models::user::User;
use crate::models::DateTime;
use crate::util::{current_time, trimmed};

pub mod attendance;
pub mod recurrence;
pub mod validation;

pub use attendance::{Attendance, AttendanceCounts, AttendanceStatus};
pub use recurrence::{Frequency, Occurrence, RecurringPattern, MAX_OCCURRENCES};
pub use validation::validate_rehearsal;

#[derive(Clone, Copy, Debug, PartialEq, SimpleObject, InputObject, Serialize, Deserialize)]
#[graphql(input_name = "CoordinatesInput")]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Where a rehearsal takes place.
#[derive(Clone, Debug, PartialEq, SimpleObject, InputObject, Serialize, Deserialize)]
#[graphql(input_name = "VenueInput")]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    /// The name of the venue
    pub name: String,
    /// The street address, if known
    pub address: Option<String>,
    /// Where the venue is on a map
    pub coordinates: Option<Coordinates>,
}

#[derive(Clone, Debug, PartialEq, SimpleObject)]
#[graphql(complex)]
pub struct Rehearsal {
    /// The ID of the rehearsal
    pub id: Uuid,
    /// The band this rehearsal belongs to
    pub band_id: Uuid,
    /// The name of the rehearsal
    pub title: String,
    /// General information or details about this rehearsal
    pub description: Option<String>,
    /// When the rehearsal starts
    pub start_time: DateTime,
    /// When the rehearsal ends
    pub end_time: DateTime,
    /// Where the rehearsal will be held
    pub venue: Venue,
    /// Whether this rehearsal was created as part of a series
    pub is_recurring: bool,
    /// How the series repeats, for recurring rehearsals
    pub recurring_pattern: Option<RecurringPattern>,
    /// The IDs of the songs to run, in order
    pub songs: Vec<Uuid>,
    /// Free-form notes for the band
    pub notes: String,
    /// The ID of the member who scheduled the rehearsal
    pub created_by: Uuid,
    /// Each band member's response
    pub attendance: Vec<Attendance>,
    /// Whether the rehearsal was called off
    pub is_cancelled: bool,
    /// Why the rehearsal was called off
    pub cancel_reason: Option<String>,
    /// When members were last reminded about this rehearsal
    pub reminder_sent_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[ComplexObject]
impl Rehearsal {
    /// Response totals for this rehearsal
    pub async fn attendance_counts(&self) -> AttendanceCounts {
        self.summarize_attendance()
    }

    /// How long the rehearsal runs, in minutes
    pub async fn duration_minutes(&self) -> i64 {
        self.duration_in_minutes()
    }

    /// Whether the current user may edit or cancel this rehearsal
    pub async fn can_modify(&self, ctx: &Context<'_>) -> Result<bool> {
        match ctx.data_opt::<User>() {
            Some(user) => can_modify(user.id, self, &**store(ctx))
                .await
                .map_err(|err| err.extend()),
            None => Ok(false),
        }
    }

    /// The band this rehearsal belongs to
    pub async fn band(&self, ctx: &Context<'_>) -> Result<Option<Band>> {
        store(ctx)
            .band(self.band_id)
            .await
            .map_err(|err| err.extend())
    }
}

/// The fields a client sends to create or edit a rehearsal.
#[derive(Clone, Debug, InputObject)]
pub struct NewRehearsal {
    pub band_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime,
    pub end_time: DateTime,
    pub venue: Venue,
    #[graphql(default)]
    pub is_recurring: bool,
    pub recurring_pattern: Option<RecurringPattern>,
    #[graphql(default)]
    pub songs: Vec<Uuid>,
    pub notes: Option<String>,
}

impl Rehearsal {
    pub fn from_new(new_rehearsal: NewRehearsal, created_by: Uuid) -> Self {
        let now = current_time();

        Self {
            id: Uuid::new_v4(),
            band_id: new_rehearsal.band_id,
            title: new_rehearsal.title.trim().to_owned(),
            description: trimmed(new_rehearsal.description),
            start_time: new_rehearsal.start_time,
            end_time: new_rehearsal.end_time,
            venue: new_rehearsal.venue.trimmed(),
            is_recurring: new_rehearsal.is_recurring,
            recurring_pattern: new_rehearsal.recurring_pattern,
            songs: new_rehearsal.songs,
            notes: new_rehearsal.notes.unwrap_or_default(),
            created_by,
            attendance: Vec::new(),
            is_cancelled: false,
            cancel_reason: None,
            reminder_sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the editable fields, keeping identity, attendance and
    /// cancellation state.
    fn apply(&mut self, update: NewRehearsal) {
        if update.start_time != self.start_time {
            self.reminder_sent_at = None;
        }

        self.title = update.title.trim().to_owned();
        self.description = trimmed(update.description);
        self.start_time = update.start_time;
        self.end_time = update.end_time;
        self.venue = update.venue.trimmed();
        self.is_recurring = update.is_recurring;
        self.recurring_pattern = update.recurring_pattern;
        self.songs = update.songs;
        self.notes = update.notes.unwrap_or_default();
        self.updated_at = current_time();
    }

    pub fn duration_in_minutes(&self) -> i64 {
        (self.end_time.0 - self.start_time.0).whole_minutes()
    }

    /// The concrete times this rehearsal expands to: the whole series for a
    /// recurring rehearsal, otherwise just its own times.
    pub fn planned_occurrences(&self) -> CadenceResult<Vec<Occurrence>> {
        match (&self.recurring_pattern, self.is_recurring) {
            (Some(pattern), true) => pattern.occurrences(self.start_time, self.end_time),
            _ => Ok(vec![Occurrence {
                start_time: self.start_time,
                end_time: self.end_time,
            }]),
        }
    }

    pub async fn with_id(id: Uuid, store: &dyn Store) -> CadenceResult<Self> {
        store
            .rehearsal(id)
            .await?
            .ok_or_else(|| CadenceError::NotFound(format!("No rehearsal with id {}", id)))
    }

    pub async fn for_band(
        band_id: Uuid,
        requester: Uuid,
        store: &dyn Store,
    ) -> CadenceResult<Vec<Self>> {
        Band::with_id_for_member(band_id, requester, store).await?;
        store.rehearsals_for_band(band_id).await
    }

    /// Creates the rehearsal when `id` is empty and edits it otherwise.
    pub async fn save(
        id: Option<Uuid>,
        payload: NewRehearsal,
        requester: Uuid,
        store: &dyn Store,
    ) -> CadenceResult<Self> {
        match id {
            Some(id) => Self::update(id, payload, requester, store).await,
            None => Self::create(payload, requester, store).await,
        }
    }

    /// Schedules a rehearsal, or every rehearsal of a series, for the
    /// requester's band. Each scheduled rehearsal starts with a pending
    /// attendance record per band member.
    ///
    /// Returns the first rehearsal of the series.
    pub async fn create(
        new_rehearsal: NewRehearsal,
        requester: Uuid,
        store: &dyn Store,
    ) -> CadenceResult<Self> {
        let band = Band::with_id_for_member(new_rehearsal.band_id, requester, store).await?;
        let template = Self::from_new(new_rehearsal, requester);
        validate_rehearsal(&template)?;

        let member_ids = band.member_ids();
        let series = template
            .planned_occurrences()?
            .into_iter()
            .map(|occurrence| {
                let mut rehearsal = Self {
                    id: Uuid::new_v4(),
                    start_time: occurrence.start_time,
                    end_time: occurrence.end_time,
                    ..template.clone()
                };
                rehearsal.initialize_attendance(member_ids.iter().copied());
                validate_rehearsal(&rehearsal).map(|_| rehearsal)
            })
            .collect::<CadenceResult<Vec<_>>>()?;

        store.insert_rehearsals(&series).await?;
        info!(
            band = %band.id,
            created_by = %requester,
            count = series.len(),
            "scheduled rehearsals"
        );

        series
            .into_iter()
            .next()
            .ok_or_else(|| CadenceError::InvalidPattern("the series is empty".to_owned()))
    }

    /// Edits a single rehearsal. Other rehearsals of its series are left
    /// alone, as are the attendance records, which only change through RSVPs.
    pub async fn update(
        id: Uuid,
        update: NewRehearsal,
        requester: Uuid,
        store: &dyn Store,
    ) -> CadenceResult<Self> {
        let mut rehearsal = Self::with_id(id, store).await?;
        ensure_can_modify(requester, &rehearsal, store).await?;

        if update.band_id != rehearsal.band_id {
            return Err(CadenceError::validation(
                "bandId",
                "A rehearsal cannot be moved to another band",
            ));
        }

        rehearsal.apply(update);
        validate_rehearsal(&rehearsal)?;

        store.update_rehearsal(&rehearsal).await?;
        info!(rehearsal = %id, updated_by = %requester, "updated rehearsal");

        Self::with_id(id, store).await
    }

    /// Records the requester's response. Only the requester's attendance
    /// record is written back.
    pub async fn rsvp(
        id: Uuid,
        user_id: Uuid,
        status: AttendanceStatus,
        response: Option<String>,
        store: &dyn Store,
    ) -> CadenceResult<Self> {
        let mut rehearsal = Self::with_id(id, store).await?;
        if rehearsal.is_cancelled {
            return Err(CadenceError::validation(
                "isCancelled",
                "You cannot respond to a cancelled rehearsal",
            ));
        }

        let record = rehearsal.record_response(user_id, status, response)?.clone();
        store.update_attendance(id, &record).await?;

        Ok(rehearsal)
    }

    pub async fn cancel(
        id: Uuid,
        reason: Option<String>,
        requester: Uuid,
        store: &dyn Store,
    ) -> CadenceResult<Self> {
        let mut rehearsal = Self::with_id(id, store).await?;
        ensure_can_modify(requester, &rehearsal, store).await?;

        rehearsal.is_cancelled = true;
        rehearsal.cancel_reason = trimmed(reason);
        rehearsal.updated_at = current_time();

        store.update_rehearsal(&rehearsal).await?;
        info!(rehearsal = %id, cancelled_by = %requester, "cancelled rehearsal");

        Self::with_id(id, store).await
    }
}

impl Venue {
    fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_owned(),
            address: trimmed(self.address),
            coordinates: self.coordinates,
        }
    }
}
