use async_graphql::{ComplexObject, Context, Enum, ErrorExtensions, Result, SimpleObject};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::{store, BandStore, Store};
use crate::error::{CadenceError, CadenceResult};
use crate::models::rehearsal::Rehearsal;
use crate::models::user::User;
use crate::models::DateTime;
use crate::util::current_time;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandRole {
    Admin,
    Member,
}

#[derive(Clone, Debug, PartialEq, SimpleObject, Serialize, Deserialize)]
#[graphql(complex)]
#[serde(rename_all = "camelCase")]
pub struct BandMember {
    pub user_id: Uuid,
    pub role: BandRole,
}

#[ComplexObject]
impl BandMember {
    pub async fn user(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        store(ctx).user(self.user_id).await.map_err(|err| err.extend())
    }
}

#[derive(Clone, Debug, PartialEq, SimpleObject)]
#[graphql(complex)]
pub struct Band {
    /// The ID of the band
    pub id: Uuid,
    /// The name of the band
    pub name: String,
    /// Everyone in the band and what they may do
    pub members: Vec<BandMember>,
    pub created_at: DateTime,
}

#[ComplexObject]
impl Band {
    /// Every rehearsal scheduled for this band, in order
    pub async fn rehearsals(&self, ctx: &Context<'_>) -> Result<Vec<Rehearsal>> {
        store(ctx)
            .rehearsals_for_band(self.id)
            .await
            .map_err(|err| err.extend())
    }
}

impl Band {
    pub fn member(&self, user_id: Uuid) -> Option<&BandMember> {
        self.members.iter().find(|member| member.user_id == user_id)
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.member(user_id)
            .map(|member| member.role == BandRole::Admin)
            .unwrap_or(false)
    }

    pub fn member_ids(&self) -> Vec<Uuid> {
        self.members.iter().map(|member| member.user_id).collect()
    }

    pub async fn with_id<B>(id: Uuid, store: &B) -> CadenceResult<Self>
    where
        B: BandStore + ?Sized,
    {
        store
            .band(id)
            .await?
            .ok_or_else(|| CadenceError::NotFound(format!("No band with id {}", id)))
    }

    /// Loads a band, failing unless the user is one of its members.
    pub async fn with_id_for_member<B>(id: Uuid, user_id: Uuid, store: &B) -> CadenceResult<Self>
    where
        B: BandStore + ?Sized,
    {
        let band = Self::with_id(id, store).await?;
        if band.member(user_id).is_none() {
            return Err(CadenceError::Forbidden(format!(
                "You are not a member of {}",
                band.name
            )));
        }

        Ok(band)
    }

    pub async fn for_member(user_id: Uuid, store: &dyn Store) -> CadenceResult<Vec<Self>> {
        store.bands_for_user(user_id).await
    }

    /// Starts a new band with its creator as the only admin.
    pub async fn create(name: String, creator: Uuid, store: &dyn Store) -> CadenceResult<Self> {
        let name = name.trim().to_owned();
        if name.is_empty() {
            return Err(CadenceError::validation(
                "name",
                "Please provide a name for the band",
            ));
        }

        let band = Self {
            id: Uuid::new_v4(),
            name,
            members: vec![BandMember {
                user_id: creator,
                role: BandRole::Admin,
            }],
            created_at: current_time(),
        };
        store.insert_band(&band).await?;
        info!(band = %band.id, creator = %creator, "created band");

        Ok(band)
    }

    /// Adds a user to the band, or changes their role if they already belong
    /// to it. New members get a pending response on every upcoming rehearsal.
    pub async fn add_member(
        id: Uuid,
        user_id: Uuid,
        role: BandRole,
        requester: Uuid,
        store: &dyn Store,
    ) -> CadenceResult<Self> {
        let mut band = Self::with_id(id, store).await?;
        if !band.is_admin(requester) {
            return Err(CadenceError::Forbidden(
                "Only band admins can add members".to_owned(),
            ));
        }
        if store.user(user_id).await?.is_none() {
            return Err(CadenceError::NotFound(format!("No user with id {}", user_id)));
        }

        match band.members.iter_mut().find(|member| member.user_id == user_id) {
            Some(member) => member.role = role,
            None => band.members.push(BandMember { user_id, role }),
        }
        store.update_band_members(&band).await?;

        let now = current_time();
        let mut invited = 0;
        for rehearsal in store.rehearsals_for_band(id).await? {
            if rehearsal.start_time > now
                && !rehearsal.is_cancelled
                && store.add_pending_attendance(rehearsal.id, user_id).await?
            {
                invited += 1;
            }
        }
        info!(band = %id, member = %user_id, ?role, invited, "updated band membership");

        Ok(band)
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::rehearsal::AttendanceStatus;
    use crate::tests::mock::{mock_new_rehearsal, mock_user, register_mock_user};

    #[test]
    fn admins_are_members() {
        let admin = Uuid::new_v4();
        let band = Band {
            id: Uuid::new_v4(),
            name: "The Metronomes".to_owned(),
            members: vec![BandMember {
                user_id: admin,
                role: BandRole::Admin,
            }],
            created_at: current_time(),
        };

        assert!(band.is_admin(admin));
        assert!(band.member(admin).is_some());
        assert!(!band.is_admin(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn creators_run_their_bands() {
        let store = MemoryStore::new();
        let creator = Uuid::new_v4();

        let band = Band::create("  The Metronomes ".to_owned(), creator, &store)
            .await
            .unwrap();

        assert_eq!(band.name, "The Metronomes");
        assert!(band.is_admin(creator));
        assert_eq!(Band::for_member(creator, &store).await.unwrap(), vec![band]);
    }

    #[tokio::test]
    async fn new_members_are_invited_to_upcoming_rehearsals() {
        let store = MemoryStore::new();
        let admin = register_mock_user(&store, "admin@example.com").await;
        let drummer = register_mock_user(&store, "drums@example.com").await;
        let band = Band::create("The Metronomes".to_owned(), admin.id, &store)
            .await
            .unwrap();

        let upcoming_start = current_time().0 + Duration::days(3);
        let upcoming = Rehearsal::create(
            crate::models::rehearsal::NewRehearsal {
                start_time: DateTime(upcoming_start),
                end_time: DateTime(upcoming_start + Duration::hours(2)),
                ..mock_new_rehearsal(band.id)
            },
            admin.id,
            &store,
        )
        .await
        .unwrap();
        let past = Rehearsal::create(mock_new_rehearsal(band.id), admin.id, &store)
            .await
            .unwrap();
        Rehearsal::rsvp(upcoming.id, admin.id, AttendanceStatus::Declined, None, &store)
            .await
            .unwrap();

        let band = Band::add_member(band.id, drummer.id, BandRole::Member, admin.id, &store)
            .await
            .unwrap();
        assert_eq!(band.members.len(), 2);

        let upcoming = Rehearsal::with_id(upcoming.id, &store).await.unwrap();
        let past = Rehearsal::with_id(past.id, &store).await.unwrap();
        assert!(upcoming.attendance_for(drummer.id).is_some());
        assert_eq!(
            upcoming.attendance_for(admin.id).map(|record| record.status),
            Some(AttendanceStatus::Declined)
        );
        assert!(past.attendance_for(drummer.id).is_none());
    }

    #[tokio::test]
    async fn only_admins_add_members() {
        let store = MemoryStore::new();
        let admin = Uuid::new_v4();
        let band = Band::create("The Metronomes".to_owned(), admin, &store)
            .await
            .unwrap();
        let outsider = mock_user();

        let result =
            Band::add_member(band.id, outsider.id, BandRole::Admin, outsider.id, &store).await;

        assert!(matches!(result, Err(CadenceError::Forbidden(_))));
    }
}
