use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::{BandStore, RehearsalStore, UserStore};
use crate::error::{CadenceError, CadenceResult};
use crate::models::band::Band;
use crate::models::rehearsal::{Attendance, Rehearsal};
use crate::models::user::{PreparedUser, User, UserCredentials};
use crate::models::DateTime;
use crate::util::current_time;

/// Keeps every document in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    rehearsals: RwLock<HashMap<Uuid, Rehearsal>>,
    bands: RwLock<HashMap<Uuid, Band>>,
    users: RwLock<HashMap<Uuid, StoredUser>>,
}

struct StoredUser {
    user: User,
    password_hash: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RehearsalStore for MemoryStore {
    async fn insert_rehearsals(&self, series: &[Rehearsal]) -> CadenceResult<()> {
        let mut rehearsals = self.rehearsals.write().await;
        if let Some(taken) = series
            .iter()
            .find(|rehearsal| rehearsals.contains_key(&rehearsal.id))
        {
            return Err(CadenceError::Conflict(format!(
                "rehearsal {} already exists",
                taken.id
            )));
        }

        for rehearsal in series {
            rehearsals.insert(rehearsal.id, rehearsal.clone());
        }

        Ok(())
    }

    async fn rehearsal(&self, id: Uuid) -> CadenceResult<Option<Rehearsal>> {
        Ok(self.rehearsals.read().await.get(&id).cloned())
    }

    async fn update_rehearsal(&self, rehearsal: &Rehearsal) -> CadenceResult<()> {
        let mut rehearsals = self.rehearsals.write().await;
        let existing = rehearsals
            .get_mut(&rehearsal.id)
            .ok_or_else(|| CadenceError::NotFound(format!("rehearsal {}", rehearsal.id)))?;
        let attendance = std::mem::take(&mut existing.attendance);
        *existing = Rehearsal {
            attendance,
            ..rehearsal.clone()
        };

        Ok(())
    }

    async fn update_attendance(
        &self,
        rehearsal_id: Uuid,
        record: &Attendance,
    ) -> CadenceResult<()> {
        let mut rehearsals = self.rehearsals.write().await;
        let rehearsal = rehearsals
            .get_mut(&rehearsal_id)
            .ok_or_else(|| CadenceError::NotFound(format!("rehearsal {}", rehearsal_id)))?;
        let existing = rehearsal
            .attendance
            .iter_mut()
            .find(|existing| existing.user_id == record.user_id)
            .ok_or(CadenceError::UnknownMember(record.user_id))?;
        *existing = record.clone();

        Ok(())
    }

    async fn add_pending_attendance(
        &self,
        rehearsal_id: Uuid,
        user_id: Uuid,
    ) -> CadenceResult<bool> {
        let mut rehearsals = self.rehearsals.write().await;
        let rehearsal = rehearsals
            .get_mut(&rehearsal_id)
            .ok_or_else(|| CadenceError::NotFound(format!("rehearsal {}", rehearsal_id)))?;

        if rehearsal.initialize_attendance([user_id]) == 0 {
            return Ok(false);
        }
        rehearsal.updated_at = current_time();

        Ok(true)
    }

    async fn mark_reminder_sent(&self, rehearsal_id: Uuid, sent_at: DateTime) -> CadenceResult<()> {
        let mut rehearsals = self.rehearsals.write().await;
        let rehearsal = rehearsals
            .get_mut(&rehearsal_id)
            .ok_or_else(|| CadenceError::NotFound(format!("rehearsal {}", rehearsal_id)))?;
        rehearsal.reminder_sent_at = Some(sent_at);

        Ok(())
    }

    async fn rehearsals_for_band(&self, band_id: Uuid) -> CadenceResult<Vec<Rehearsal>> {
        let mut rehearsals: Vec<Rehearsal> = self
            .rehearsals
            .read()
            .await
            .values()
            .filter(|rehearsal| rehearsal.band_id == band_id)
            .cloned()
            .collect();
        rehearsals.sort_by_key(|rehearsal| rehearsal.start_time);

        Ok(rehearsals)
    }

    async fn rehearsals_starting_between(
        &self,
        from: DateTime,
        to: DateTime,
    ) -> CadenceResult<Vec<Rehearsal>> {
        let mut rehearsals: Vec<Rehearsal> = self
            .rehearsals
            .read()
            .await
            .values()
            .filter(|rehearsal| rehearsal.start_time >= from && rehearsal.start_time < to)
            .cloned()
            .collect();
        rehearsals.sort_by_key(|rehearsal| rehearsal.start_time);

        Ok(rehearsals)
    }
}

#[async_trait]
impl BandStore for MemoryStore {
    async fn insert_band(&self, band: &Band) -> CadenceResult<()> {
        self.bands.write().await.insert(band.id, band.clone());

        Ok(())
    }

    async fn band(&self, id: Uuid) -> CadenceResult<Option<Band>> {
        Ok(self.bands.read().await.get(&id).cloned())
    }

    async fn update_band_members(&self, band: &Band) -> CadenceResult<()> {
        let mut bands = self.bands.write().await;
        let existing = bands
            .get_mut(&band.id)
            .ok_or_else(|| CadenceError::NotFound(format!("band {}", band.id)))?;
        existing.members = band.members.clone();

        Ok(())
    }

    async fn bands_for_user(&self, user_id: Uuid) -> CadenceResult<Vec<Band>> {
        let mut bands: Vec<Band> = self
            .bands
            .read()
            .await
            .values()
            .filter(|band| band.member(user_id).is_some())
            .cloned()
            .collect();
        bands.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(bands)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, prepared: &PreparedUser) -> CadenceResult<()> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|stored| stored.user.email == prepared.user.email)
        {
            return Err(CadenceError::Conflict(format!(
                "Another user already has the email {}",
                prepared.user.email
            )));
        }

        users.insert(
            prepared.user.id,
            StoredUser {
                user: prepared.user.clone(),
                password_hash: prepared.password_hash.clone(),
            },
        );

        Ok(())
    }

    async fn user(&self, id: Uuid) -> CadenceResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .get(&id)
            .map(|stored| stored.user.clone()))
    }

    async fn user_by_email(&self, email: &str) -> CadenceResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|stored| stored.user.email == email)
            .map(|stored| stored.user.clone()))
    }

    async fn credentials(&self, email: &str) -> CadenceResult<Option<UserCredentials>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|stored| stored.user.email == email)
            .map(|stored| UserCredentials {
                id: stored.user.id,
                password_hash: stored.password_hash.clone(),
            }))
    }

    async fn update_user(&self, user: &User) -> CadenceResult<()> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&user.id)
            .ok_or_else(|| CadenceError::NotFound(format!("user {}", user.id)))?;
        stored.user = user.clone();

        Ok(())
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> CadenceResult<()> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&user_id)
            .ok_or_else(|| CadenceError::NotFound(format!("user {}", user_id)))?;
        stored.password_hash = password_hash.to_owned();

        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
        expires: Option<DateTime>,
    ) -> CadenceResult<()> {
        let mut users = self.users.write().await;
        let stored = users
            .get_mut(&user_id)
            .ok_or_else(|| CadenceError::NotFound(format!("user {}", user_id)))?;
        stored.user.reset_password_token = token_hash.map(ToOwned::to_owned);
        stored.user.reset_password_expire = expires;

        Ok(())
    }

    async fn user_by_reset_token(&self, token_hash: &str) -> CadenceResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|stored| stored.user.reset_password_token.as_deref() == Some(token_hash))
            .map(|stored| stored.user.clone()))
    }
}
