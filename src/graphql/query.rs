use async_graphql::{Context, ErrorExtensions, Object, Result};
use uuid::Uuid;

use crate::db::store;
use crate::graphql::current_user;
use crate::graphql::guards::LoggedIn;
use crate::models::band::Band;
use crate::models::rehearsal::{Occurrence, RecurringPattern, Rehearsal};
use crate::models::user::User;
use crate::models::DateTime;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The currently logged in user
    pub async fn user<'c>(&self, ctx: &'c Context<'c>) -> Option<User> {
        ctx.data_opt::<User>().cloned()
    }

    #[graphql(guard = "LoggedIn")]
    pub async fn rehearsal(&self, ctx: &Context<'_>, id: Uuid) -> Result<Rehearsal> {
        let store = &**store(ctx);
        let user = current_user(ctx)?;
        let rehearsal = Rehearsal::with_id(id, store)
            .await
            .map_err(|err| err.extend())?;
        Band::with_id_for_member(rehearsal.band_id, user.id, store)
            .await
            .map_err(|err| err.extend())?;

        Ok(rehearsal)
    }

    /// Every rehearsal of a band the user belongs to, in order
    #[graphql(guard = "LoggedIn")]
    pub async fn rehearsals(&self, ctx: &Context<'_>, band_id: Uuid) -> Result<Vec<Rehearsal>> {
        let user = current_user(ctx)?;
        Rehearsal::for_band(band_id, user.id, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    #[graphql(guard = "LoggedIn")]
    pub async fn band(&self, ctx: &Context<'_>, id: Uuid) -> Result<Band> {
        let user = current_user(ctx)?;
        Band::with_id_for_member(id, user.id, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    /// The bands the current user belongs to
    #[graphql(guard = "LoggedIn")]
    pub async fn my_bands(&self, ctx: &Context<'_>) -> Result<Vec<Band>> {
        let user = current_user(ctx)?;
        Band::for_member(user.id, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    /// The rehearsals a recurring pattern would schedule, without saving anything
    pub async fn preview_occurrences(
        &self,
        pattern: RecurringPattern,
        start_time: DateTime,
        end_time: DateTime,
    ) -> Result<Vec<Occurrence>> {
        pattern
            .occurrences(start_time, end_time)
            .map_err(|err| err.extend())
    }
}
