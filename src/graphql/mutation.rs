use async_graphql::{Context, ErrorExtensions, Object, Result};
use tracing::error;
use uuid::Uuid;

use crate::db::store;
use crate::email::reset_password::ResetPasswordEmail;
use crate::email::Mailer;
use crate::error::CadenceError;
use crate::graphql::guards::LoggedIn;
use crate::graphql::{current_user, SUCCESS_MESSAGE};
use crate::models::band::{Band, BandRole};
use crate::models::rehearsal::{AttendanceStatus, NewRehearsal, Rehearsal};
use crate::models::user::session::{PasswordReset, Session, TokenKeys};
use crate::models::user::{NewUser, ProfileUpdate, User};

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Creates an account and logs into it
    pub async fn register(&self, ctx: &Context<'_>, new_user: NewUser) -> Result<Session> {
        let keys: &TokenKeys = ctx.data_unchecked();
        let user = User::register(new_user, &**store(ctx))
            .await
            .map_err(|err| err.extend())?;

        Session::issue(user, keys).map_err(|err| err.extend())
    }

    /// Gets a pair of tokens on successful login
    pub async fn login(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
    ) -> Result<Session> {
        let keys: &TokenKeys = ctx.data_unchecked();
        let user = User::login(&email, &password, &**store(ctx))
            .await
            .map_err(|err| err.extend())?;

        Session::issue(user, keys).map_err(|err| err.extend())
    }

    /// Exchanges a refresh token for a new pair of tokens
    pub async fn refresh_token(&self, ctx: &Context<'_>, refresh_token: String) -> Result<Session> {
        let keys: &TokenKeys = ctx.data_unchecked();
        Session::refresh(&refresh_token, keys, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    /// Emails a password reset code to the given user
    pub async fn forgot_password(&self, ctx: &Context<'_>, email: String) -> Result<&'static str> {
        let store = &**store(ctx);
        let mailer: &Mailer = ctx.data_unchecked();
        let (user, token) = PasswordReset::generate(&email, store)
            .await
            .map_err(|err| err.extend())?;

        if let Err(err) = mailer.send(ResetPasswordEmail { user: &user, token: &token }).await {
            error!(user = %user.id, "failed to send password reset email: {:?}", err);
            PasswordReset::cancel(user.id, store)
                .await
                .map_err(|err| err.extend())?;

            return Err(CadenceError::Email("Email could not be sent".to_owned()).extend());
        }

        Ok(SUCCESS_MESSAGE)
    }

    /// Sets a new password with a code from a reset email and logs in
    pub async fn reset_password(
        &self,
        ctx: &Context<'_>,
        token: String,
        password: String,
    ) -> Result<Session> {
        let keys: &TokenKeys = ctx.data_unchecked();
        let user = PasswordReset::reset(&token, &password, &**store(ctx))
            .await
            .map_err(|err| err.extend())?;

        Session::issue(user, keys).map_err(|err| err.extend())
    }

    #[graphql(guard = "LoggedIn")]
    pub async fn update_profile(&self, ctx: &Context<'_>, update: ProfileUpdate) -> Result<User> {
        let user = current_user(ctx)?;
        User::update_profile(user.id, update, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    #[graphql(guard = "LoggedIn")]
    pub async fn change_password(
        &self,
        ctx: &Context<'_>,
        current_password: String,
        new_password: String,
    ) -> Result<&'static str> {
        let user = current_user(ctx)?;
        user.change_password(&current_password, &new_password, &**store(ctx))
            .await
            .map_err(|err| err.extend())?;

        Ok(SUCCESS_MESSAGE)
    }

    /// Starts a band with the current user as its admin
    #[graphql(guard = "LoggedIn")]
    pub async fn create_band(&self, ctx: &Context<'_>, name: String) -> Result<Band> {
        let user = current_user(ctx)?;
        Band::create(name, user.id, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    #[graphql(guard = "LoggedIn")]
    pub async fn add_band_member(
        &self,
        ctx: &Context<'_>,
        band_id: Uuid,
        user_id: Uuid,
        #[graphql(default_with = "BandRole::Member")] role: BandRole,
    ) -> Result<Band> {
        let user = current_user(ctx)?;
        Band::add_member(band_id, user_id, role, user.id, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    /// Creates a rehearsal, or a whole series for a recurring rehearsal, when
    /// no ID is given and edits the rehearsal with the ID otherwise
    #[graphql(guard = "LoggedIn")]
    pub async fn save_rehearsal(
        &self,
        ctx: &Context<'_>,
        id: Option<Uuid>,
        rehearsal: NewRehearsal,
    ) -> Result<Rehearsal> {
        let user = current_user(ctx)?;
        Rehearsal::save(id, rehearsal, user.id, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    /// Responds to a rehearsal for the current user
    #[graphql(guard = "LoggedIn")]
    pub async fn rsvp(
        &self,
        ctx: &Context<'_>,
        rehearsal_id: Uuid,
        status: AttendanceStatus,
        response: Option<String>,
    ) -> Result<Rehearsal> {
        let user = current_user(ctx)?;
        Rehearsal::rsvp(rehearsal_id, user.id, status, response, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }

    #[graphql(guard = "LoggedIn")]
    pub async fn cancel_rehearsal(
        &self,
        ctx: &Context<'_>,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<Rehearsal> {
        let user = current_user(ctx)?;
        Rehearsal::cancel(id, reason, user.id, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }
}
