use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db::{BandStore, RehearsalStore, UserStore};
use crate::error::{CadenceError, CadenceResult};
use crate::models::band::{Band, BandMember};
use crate::models::rehearsal::{Attendance, RecurringPattern, Rehearsal, Venue};
use crate::models::user::{Preferences, PreparedUser, User, UserCredentials};
use crate::models::DateTime;

const UNIQUE_VIOLATION: &str = "23505";

/// The Postgres-backed store. Embedded documents live in JSONB columns.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> CadenceResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[derive(FromRow)]
struct RehearsalRecord {
    id: Uuid,
    band_id: Uuid,
    title: String,
    description: Option<String>,
    start_time: DateTime,
    end_time: DateTime,
    venue: Json<Venue>,
    is_recurring: bool,
    recurring_pattern: Option<Json<RecurringPattern>>,
    songs: Vec<Uuid>,
    notes: String,
    created_by: Uuid,
    attendance: Json<Vec<Attendance>>,
    is_cancelled: bool,
    cancel_reason: Option<String>,
    reminder_sent_at: Option<DateTime>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl RehearsalRecord {
    fn to_domain(self) -> Rehearsal {
        Rehearsal {
            id: self.id,
            band_id: self.band_id,
            title: self.title,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            venue: self.venue.0,
            is_recurring: self.is_recurring,
            recurring_pattern: self.recurring_pattern.map(|pattern| pattern.0),
            songs: self.songs,
            notes: self.notes,
            created_by: self.created_by,
            attendance: self.attendance.0,
            is_cancelled: self.is_cancelled,
            cancel_reason: self.cancel_reason,
            reminder_sent_at: self.reminder_sent_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct BandRecord {
    id: Uuid,
    name: String,
    members: Json<Vec<BandMember>>,
    created_at: DateTime,
}

impl BandRecord {
    fn to_domain(self) -> Band {
        Band {
            id: self.id,
            name: self.name,
            members: self.members.0,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    instruments: Vec<String>,
    profile_image: String,
    preferences: Json<Preferences>,
    reset_password_token: Option<String>,
    reset_password_expire: Option<DateTime>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            phone: self.phone,
            instruments: self.instruments,
            profile_image: self.profile_image,
            preferences: self.preferences.0,
            reset_password_token: self.reset_password_token,
            reset_password_expire: self.reset_password_expire,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const REHEARSAL_COLUMNS: &str = "id, band_id, title, description, start_time, end_time, venue,
    is_recurring, recurring_pattern, songs, notes, created_by, attendance, is_cancelled,
    cancel_reason, reminder_sent_at, created_at, updated_at";

const USER_COLUMNS: &str = "id, email, name, phone, instruments, profile_image, preferences,
    reset_password_token, reset_password_expire, created_at, updated_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

fn rehearsal_not_found(id: Uuid, rows_affected: u64) -> CadenceResult<()> {
    if rows_affected == 0 {
        Err(CadenceError::NotFound(format!("rehearsal {}", id)))
    } else {
        Ok(())
    }
}

async fn insert_rehearsal(
    tx: &mut Transaction<'_, Postgres>,
    rehearsal: &Rehearsal,
) -> CadenceResult<()> {
    sqlx::query(
        "INSERT INTO rehearsals (id, band_id, title, description, start_time, end_time, venue,
             is_recurring, recurring_pattern, songs, notes, created_by, attendance,
             is_cancelled, cancel_reason, reminder_sent_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
    )
    .bind(rehearsal.id)
    .bind(rehearsal.band_id)
    .bind(&rehearsal.title)
    .bind(&rehearsal.description)
    .bind(rehearsal.start_time)
    .bind(rehearsal.end_time)
    .bind(Json(&rehearsal.venue))
    .bind(rehearsal.is_recurring)
    .bind(rehearsal.recurring_pattern.as_ref().map(Json))
    .bind(&rehearsal.songs)
    .bind(&rehearsal.notes)
    .bind(rehearsal.created_by)
    .bind(Json(&rehearsal.attendance))
    .bind(rehearsal.is_cancelled)
    .bind(&rehearsal.cancel_reason)
    .bind(rehearsal.reminder_sent_at)
    .bind(rehearsal.created_at)
    .bind(rehearsal.updated_at)
    .execute(&mut *tx)
    .await?;

    Ok(())
}

#[async_trait]
impl RehearsalStore for PgStore {
    async fn insert_rehearsals(&self, rehearsals: &[Rehearsal]) -> CadenceResult<()> {
        let mut tx = self.pool.begin().await?;
        for rehearsal in rehearsals {
            insert_rehearsal(&mut tx, rehearsal).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn rehearsal(&self, id: Uuid) -> CadenceResult<Option<Rehearsal>> {
        let record = sqlx::query_as::<_, RehearsalRecord>(&format!(
            "SELECT {} FROM rehearsals WHERE id = $1",
            REHEARSAL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(RehearsalRecord::to_domain))
    }

    async fn update_rehearsal(&self, rehearsal: &Rehearsal) -> CadenceResult<()> {
        let result = sqlx::query(
            "UPDATE rehearsals SET title = $2, description = $3, start_time = $4, end_time = $5,
                 venue = $6, is_recurring = $7, recurring_pattern = $8, songs = $9, notes = $10,
                 is_cancelled = $11, cancel_reason = $12, reminder_sent_at = $13, updated_at = $14
             WHERE id = $1",
        )
        .bind(rehearsal.id)
        .bind(&rehearsal.title)
        .bind(&rehearsal.description)
        .bind(rehearsal.start_time)
        .bind(rehearsal.end_time)
        .bind(Json(&rehearsal.venue))
        .bind(rehearsal.is_recurring)
        .bind(rehearsal.recurring_pattern.as_ref().map(Json))
        .bind(&rehearsal.songs)
        .bind(&rehearsal.notes)
        .bind(rehearsal.is_cancelled)
        .bind(&rehearsal.cancel_reason)
        .bind(rehearsal.reminder_sent_at)
        .bind(rehearsal.updated_at)
        .execute(&self.pool)
        .await?;

        rehearsal_not_found(rehearsal.id, result.rows_affected())
    }

    async fn update_attendance(
        &self,
        rehearsal_id: Uuid,
        record: &Attendance,
    ) -> CadenceResult<()> {
        let result = sqlx::query(
            "UPDATE rehearsals SET attendance = COALESCE(
                 (SELECT jsonb_agg(CASE WHEN elem->>'userId' = $2 THEN $3::jsonb ELSE elem END)
                  FROM jsonb_array_elements(attendance) elem),
                 '[]'::jsonb), updated_at = now()
             WHERE id = $1 AND attendance @> $4",
        )
        .bind(rehearsal_id)
        .bind(record.user_id.to_string())
        .bind(Json(record))
        .bind(Json(json!([{ "userId": record.user_id }])))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            match self.rehearsal(rehearsal_id).await? {
                Some(_) => Err(CadenceError::UnknownMember(record.user_id)),
                None => Err(CadenceError::NotFound(format!("rehearsal {}", rehearsal_id))),
            }
        } else {
            Ok(())
        }
    }

    async fn add_pending_attendance(
        &self,
        rehearsal_id: Uuid,
        user_id: Uuid,
    ) -> CadenceResult<bool> {
        let result = sqlx::query(
            "UPDATE rehearsals SET attendance = attendance || $2, updated_at = now()
             WHERE id = $1 AND NOT attendance @> $3",
        )
        .bind(rehearsal_id)
        .bind(Json(vec![Attendance::pending(user_id)]))
        .bind(Json(json!([{ "userId": user_id }])))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(true)
        } else if self.rehearsal(rehearsal_id).await?.is_some() {
            Ok(false)
        } else {
            Err(CadenceError::NotFound(format!("rehearsal {}", rehearsal_id)))
        }
    }

    async fn mark_reminder_sent(&self, rehearsal_id: Uuid, sent_at: DateTime) -> CadenceResult<()> {
        let result = sqlx::query("UPDATE rehearsals SET reminder_sent_at = $2 WHERE id = $1")
            .bind(rehearsal_id)
            .bind(sent_at)
            .execute(&self.pool)
            .await?;

        rehearsal_not_found(rehearsal_id, result.rows_affected())
    }

    async fn rehearsals_for_band(&self, band_id: Uuid) -> CadenceResult<Vec<Rehearsal>> {
        let records = sqlx::query_as::<_, RehearsalRecord>(&format!(
            "SELECT {} FROM rehearsals WHERE band_id = $1 ORDER BY start_time",
            REHEARSAL_COLUMNS
        ))
        .bind(band_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(RehearsalRecord::to_domain).collect())
    }

    async fn rehearsals_starting_between(
        &self,
        from: DateTime,
        to: DateTime,
    ) -> CadenceResult<Vec<Rehearsal>> {
        let records = sqlx::query_as::<_, RehearsalRecord>(&format!(
            "SELECT {} FROM rehearsals WHERE start_time >= $1 AND start_time < $2
             ORDER BY start_time",
            REHEARSAL_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(RehearsalRecord::to_domain).collect())
    }
}

#[async_trait]
impl BandStore for PgStore {
    async fn insert_band(&self, band: &Band) -> CadenceResult<()> {
        sqlx::query("INSERT INTO bands (id, name, members, created_at) VALUES ($1, $2, $3, $4)")
            .bind(band.id)
            .bind(&band.name)
            .bind(Json(&band.members))
            .bind(band.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn band(&self, id: Uuid) -> CadenceResult<Option<Band>> {
        let record = sqlx::query_as::<_, BandRecord>(
            "SELECT id, name, members, created_at FROM bands WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(BandRecord::to_domain))
    }

    async fn update_band_members(&self, band: &Band) -> CadenceResult<()> {
        let result = sqlx::query("UPDATE bands SET members = $2 WHERE id = $1")
            .bind(band.id)
            .bind(Json(&band.members))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            Err(CadenceError::NotFound(format!("band {}", band.id)))
        } else {
            Ok(())
        }
    }

    async fn bands_for_user(&self, user_id: Uuid) -> CadenceResult<Vec<Band>> {
        let records = sqlx::query_as::<_, BandRecord>(
            "SELECT id, name, members, created_at FROM bands WHERE members @> $1 ORDER BY name",
        )
        .bind(Json(json!([{ "userId": user_id }])))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(BandRecord::to_domain).collect())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, prepared: &PreparedUser) -> CadenceResult<()> {
        let user = &prepared.user;
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, phone, instruments, profile_image,
                 preferences, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&prepared.password_hash)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.instruments)
        .bind(&user.profile_image)
        .bind(Json(&user.preferences))
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                CadenceError::Conflict(format!("Another user already has the email {}", user.email))
            } else {
                err.into()
            }
        })?;

        Ok(())
    }

    async fn user(&self, id: Uuid) -> CadenceResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(UserRecord::to_domain))
    }

    async fn user_by_email(&self, email: &str) -> CadenceResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(UserRecord::to_domain))
    }

    async fn credentials(&self, email: &str) -> CadenceResult<Option<UserCredentials>> {
        let row: Option<(Uuid, String)> =
            sqlx::query_as("SELECT id, password_hash FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, password_hash)| UserCredentials { id, password_hash }))
    }

    async fn update_user(&self, user: &User) -> CadenceResult<()> {
        let result = sqlx::query(
            "UPDATE users SET name = $2, phone = $3, instruments = $4, profile_image = $5,
                 preferences = $6, updated_at = $7
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.instruments)
        .bind(&user.profile_image)
        .bind(Json(&user.preferences))
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Err(CadenceError::NotFound(format!("user {}", user.id)))
        } else {
            Ok(())
        }
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> CadenceResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
        expires: Option<DateTime>,
    ) -> CadenceResult<()> {
        sqlx::query(
            "UPDATE users SET reset_password_token = $2, reset_password_expire = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn user_by_reset_token(&self, token_hash: &str) -> CadenceResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE reset_password_token = $1",
            USER_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(UserRecord::to_domain))
    }
}
