//! Persistence for rehearsals, bands and users.
//!
//! The rest of the crate only talks to the traits in this module. Two
//! implementations exist: [`PgStore`](postgres::PgStore) for deployments and
//! [`MemoryStore`](memory::MemoryStore) for development and tests.

use std::sync::Arc;

use async_graphql::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CadenceResult;
use crate::models::band::Band;
use crate::models::rehearsal::{Attendance, Rehearsal};
use crate::models::user::{PreparedUser, User, UserCredentials};
use crate::models::DateTime;

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait RehearsalStore: Send + Sync {
    /// Inserts every rehearsal of a series, or none of them.
    async fn insert_rehearsals(&self, rehearsals: &[Rehearsal]) -> CadenceResult<()>;

    async fn rehearsal(&self, id: Uuid) -> CadenceResult<Option<Rehearsal>>;

    /// Writes the rehearsal's details. Attendance is left as stored; it only
    /// changes through [`update_attendance`](Self::update_attendance) and
    /// [`add_pending_attendance`](Self::add_pending_attendance).
    async fn update_rehearsal(&self, rehearsal: &Rehearsal) -> CadenceResult<()>;

    /// Replaces a single member's attendance record, leaving the others alone.
    async fn update_attendance(&self, rehearsal_id: Uuid, record: &Attendance)
        -> CadenceResult<()>;

    /// Appends a pending record for the user unless they already have one.
    /// Returns whether a record was added.
    async fn add_pending_attendance(&self, rehearsal_id: Uuid, user_id: Uuid)
        -> CadenceResult<bool>;

    async fn mark_reminder_sent(&self, rehearsal_id: Uuid, sent_at: DateTime)
        -> CadenceResult<()>;

    async fn rehearsals_for_band(&self, band_id: Uuid) -> CadenceResult<Vec<Rehearsal>>;

    /// Rehearsals with `from <= start_time < to`, ordered by start time.
    async fn rehearsals_starting_between(
        &self,
        from: DateTime,
        to: DateTime,
    ) -> CadenceResult<Vec<Rehearsal>>;
}

#[async_trait]
pub trait BandStore: Send + Sync {
    async fn insert_band(&self, band: &Band) -> CadenceResult<()>;

    async fn band(&self, id: Uuid) -> CadenceResult<Option<Band>>;

    async fn update_band_members(&self, band: &Band) -> CadenceResult<()>;

    async fn bands_for_user(&self, user_id: Uuid) -> CadenceResult<Vec<Band>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: &PreparedUser) -> CadenceResult<()>;

    async fn user(&self, id: Uuid) -> CadenceResult<Option<User>>;

    async fn user_by_email(&self, email: &str) -> CadenceResult<Option<User>>;

    /// The only read that returns a password hash.
    async fn credentials(&self, email: &str) -> CadenceResult<Option<UserCredentials>>;

    async fn update_user(&self, user: &User) -> CadenceResult<()>;

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> CadenceResult<()>;

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
        expires: Option<DateTime>,
    ) -> CadenceResult<()>;

    async fn user_by_reset_token(&self, token_hash: &str) -> CadenceResult<Option<User>>;
}

pub trait Store: RehearsalStore + BandStore + UserStore {}

impl<T> Store for T where T: RehearsalStore + BandStore + UserStore {}

pub type DynStore = Arc<dyn Store>;

pub fn store<'c>(ctx: &Context<'c>) -> &'c DynStore {
    ctx.data_unchecked::<DynStore>()
}
