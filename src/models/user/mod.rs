use async_graphql::{ComplexObject, Context, Enum, ErrorExtensions, InputObject, Result, SimpleObject};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{store, Store};
use crate::error::{CadenceError, CadenceResult};
use crate::models::band::Band;
use crate::models::DateTime;
use crate::util::{current_time, trimmed};

pub mod session;

pub const PASSWORD_HASH_COST: u32 = 10;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_NAME_LENGTH: usize = 50;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("email pattern compiles")
});

fn enabled() -> bool {
    true
}

/// Which notifications a member wants on one channel.
#[derive(Clone, Debug, PartialEq, Eq, SimpleObject, InputObject, Serialize, Deserialize)]
#[graphql(input_name = "ChannelPreferencesInput")]
#[serde(rename_all = "camelCase")]
pub struct ChannelPreferences {
    #[serde(default = "enabled")]
    pub rehearsal_reminders: bool,
    #[serde(default = "enabled")]
    pub rehearsal_changes: bool,
    #[serde(default = "enabled")]
    pub new_band_invites: bool,
}

impl Default for ChannelPreferences {
    fn default() -> Self {
        Self {
            rehearsal_reminders: true,
            rehearsal_changes: true,
            new_band_invites: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, SimpleObject, InputObject, Serialize, Deserialize)]
#[graphql(input_name = "NotificationPreferencesInput")]
pub struct NotificationPreferences {
    #[serde(default)]
    pub email: ChannelPreferences,
    #[serde(default)]
    pub push: ChannelPreferences,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
    Tentative,
}

impl Default for Availability {
    fn default() -> Self {
        Availability::Available
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, SimpleObject, InputObject, Serialize, Deserialize)]
#[graphql(input_name = "AvailabilityPreferencesInput")]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityPreferences {
    /// What to assume when the member hasn't said otherwise
    #[serde(default)]
    pub default_availability: Availability,
    /// The weekdays the member prefers to rehearse on (0 is Sunday)
    #[serde(default)]
    pub preferred_days: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, SimpleObject, InputObject, Serialize, Deserialize)]
#[graphql(input_name = "PreferencesInput")]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
    #[serde(default)]
    pub availability_preferences: AvailabilityPreferences,
}

#[derive(Clone, Debug, PartialEq, SimpleObject)]
#[graphql(complex)]
pub struct User {
    /// The ID of the user
    pub id: Uuid,
    /// The user's email, which must be unique
    pub email: String,
    /// The user's display name
    pub name: String,
    /// The user's phone number
    pub phone: Option<String>,
    /// The instruments the user plays
    pub instruments: Vec<String>,
    /// A link to a profile picture, or empty
    pub profile_image: String,
    pub preferences: Preferences,

    #[graphql(skip)]
    pub reset_password_token: Option<String>,
    #[graphql(skip)]
    pub reset_password_expire: Option<DateTime>,

    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[ComplexObject]
impl User {
    /// The bands this user belongs to
    pub async fn bands(&self, ctx: &Context<'_>) -> Result<Vec<Band>> {
        Band::for_member(self.id, &**store(ctx))
            .await
            .map_err(|err| err.extend())
    }
}

/// A user's ID and password hash, only read when checking a password.
#[derive(Clone, Debug)]
pub struct UserCredentials {
    pub id: Uuid,
    pub password_hash: String,
}

/// A user ready to be stored, with the password already hashed.
#[derive(Clone, Debug)]
pub struct PreparedUser {
    pub user: User,
    pub password_hash: String,
}

#[derive(InputObject)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    #[graphql(default)]
    pub instruments: Vec<String>,
}

impl NewUser {
    /// Normalizes and validates the fields, then hashes the password.
    pub fn prepare_for_write(self) -> CadenceResult<PreparedUser> {
        let email = normalize_email(&self.email)?;
        let name = validate_name(&self.name)?;
        validate_password(&self.password)?;
        let password_hash = bcrypt::hash(&self.password, PASSWORD_HASH_COST)?;
        let now = current_time();

        Ok(PreparedUser {
            user: User {
                id: Uuid::new_v4(),
                email,
                name,
                phone: trimmed(self.phone),
                instruments: clean_instruments(self.instruments),
                profile_image: String::new(),
                preferences: Preferences::default(),
                reset_password_token: None,
                reset_password_expire: None,
                created_at: now,
                updated_at: now,
            },
            password_hash,
        })
    }
}

#[derive(InputObject, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub instruments: Option<Vec<String>>,
    pub profile_image: Option<String>,
    pub preferences: Option<Preferences>,
}

pub fn normalize_email(email: &str) -> CadenceResult<String> {
    let email = email.trim().to_lowercase();
    if EMAIL_REGEX.is_match(&email) {
        Ok(email)
    } else {
        Err(CadenceError::validation(
            "email",
            "Please provide a valid email",
        ))
    }
}

fn validate_name(name: &str) -> CadenceResult<String> {
    let name = name.trim();
    if name.is_empty() {
        Err(CadenceError::validation("name", "Please provide a name"))
    } else if name.chars().count() > MAX_NAME_LENGTH {
        Err(CadenceError::validation(
            "name",
            format!("Name cannot be more than {} characters", MAX_NAME_LENGTH),
        ))
    } else {
        Ok(name.to_owned())
    }
}

pub fn validate_password(password: &str) -> CadenceResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        Err(CadenceError::validation(
            "password",
            format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ),
        ))
    } else {
        Ok(())
    }
}

fn validate_preferences(preferences: &Preferences) -> CadenceResult<()> {
    if preferences
        .availability_preferences
        .preferred_days
        .iter()
        .any(|day| *day > 6)
    {
        return Err(CadenceError::validation(
            "preferences.availabilityPreferences.preferredDays",
            "Days of week must be between 0-6 (Sunday-Saturday)",
        ));
    }

    Ok(())
}

fn clean_instruments(instruments: Vec<String>) -> Vec<String> {
    instruments
        .into_iter()
        .filter_map(|instrument| trimmed(Some(instrument)))
        .collect()
}

impl User {
    pub async fn with_id(id: Uuid, store: &dyn Store) -> CadenceResult<Self> {
        store
            .user(id)
            .await?
            .ok_or_else(|| CadenceError::NotFound(format!("No user with id {}", id)))
    }

    pub async fn register(new_user: NewUser, store: &dyn Store) -> CadenceResult<Self> {
        let prepared = new_user.prepare_for_write()?;
        store.insert_user(&prepared).await?;
        info!(user = %prepared.user.id, "registered user");

        Ok(prepared.user)
    }

    /// Checks a password, returning the user it belongs to.
    pub async fn login(email: &str, password: &str, store: &dyn Store) -> CadenceResult<Self> {
        let email = email.trim().to_lowercase();
        let credentials = store
            .credentials(&email)
            .await?
            .ok_or(CadenceError::InvalidCredentials)?;

        if !bcrypt::verify(password, &credentials.password_hash)? {
            warn!(user = %credentials.id, "rejected login");
            return Err(CadenceError::InvalidCredentials);
        }

        Self::with_id(credentials.id, store).await
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
        store: &dyn Store,
    ) -> CadenceResult<()> {
        let credentials = store
            .credentials(&self.email)
            .await?
            .ok_or_else(|| CadenceError::NotFound(format!("No user with id {}", self.id)))?;
        if !bcrypt::verify(current_password, &credentials.password_hash)? {
            return Err(CadenceError::validation(
                "currentPassword",
                "Current password is incorrect",
            ));
        }

        validate_password(new_password)?;
        let password_hash = bcrypt::hash(new_password, PASSWORD_HASH_COST)?;
        store.set_password_hash(self.id, &password_hash).await?;
        info!(user = %self.id, "changed password");

        Ok(())
    }

    pub async fn update_profile(
        id: Uuid,
        update: ProfileUpdate,
        store: &dyn Store,
    ) -> CadenceResult<Self> {
        let mut user = Self::with_id(id, store).await?;

        if let Some(name) = update.name {
            user.name = validate_name(&name)?;
        }
        if let Some(phone) = update.phone {
            user.phone = trimmed(Some(phone));
        }
        if let Some(instruments) = update.instruments {
            user.instruments = clean_instruments(instruments);
        }
        if let Some(profile_image) = update.profile_image {
            user.profile_image = profile_image.trim().to_owned();
        }
        if let Some(preferences) = update.preferences {
            validate_preferences(&preferences)?;
            user.preferences = preferences;
        }
        user.updated_at = current_time();

        store.update_user(&user).await?;

        Ok(user)
    }

    pub fn wants_rehearsal_reminders(&self) -> bool {
        self.preferences
            .notification_preferences
            .email
            .rehearsal_reminders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_owned(),
            password: "correct horse".to_owned(),
            name: " Ada ".to_owned(),
            phone: None,
            instruments: vec!["bass".to_owned(), "  ".to_owned()],
        }
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
        assert!(normalize_email("not an email").is_err());
        assert!(normalize_email("ada@localhost").is_err());
    }

    #[test]
    fn passwords_are_hashed_before_writing() {
        let prepared = new_user("ada@example.com").prepare_for_write().unwrap();

        assert_ne!(prepared.password_hash, "correct horse");
        assert!(bcrypt::verify("correct horse", &prepared.password_hash).unwrap());
        assert_eq!(prepared.user.name, "Ada");
        assert_eq!(prepared.user.instruments, vec!["bass".to_owned()]);
        assert!(prepared.user.wants_rehearsal_reminders());
    }

    #[test]
    fn short_passwords_are_rejected() {
        let result = NewUser {
            password: "short".to_owned(),
            ..new_user("ada@example.com")
        }
        .prepare_for_write();

        assert!(matches!(
            result,
            Err(CadenceError::Validation { ref field, .. }) if field == "password"
        ));
    }

    #[test]
    fn stored_preferences_fill_in_defaults() {
        let preferences: Preferences = serde_json::from_str(
            r#"{"notificationPreferences": {"email": {"rehearsalReminders": false}}}"#,
        )
        .unwrap();

        assert!(!preferences.notification_preferences.email.rehearsal_reminders);
        assert!(preferences.notification_preferences.email.rehearsal_changes);
        assert!(preferences.notification_preferences.push.new_band_invites);
        assert_eq!(
            preferences.availability_preferences.default_availability,
            Availability::Available
        );
    }

    #[tokio::test]
    async fn users_log_in_with_their_password() {
        let store = MemoryStore::new();
        let user = User::register(new_user("Ada@Example.com"), &store)
            .await
            .unwrap();

        let logged_in = User::login("ada@example.com", "correct horse", &store)
            .await
            .unwrap();
        assert_eq!(logged_in, user);

        let wrong = User::login("ada@example.com", "incorrect horse", &store).await;
        assert!(matches!(wrong, Err(CadenceError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn emails_are_unique() {
        let store = MemoryStore::new();
        User::register(new_user("ada@example.com"), &store)
            .await
            .unwrap();

        let result = User::register(new_user("ADA@example.com"), &store).await;

        assert!(matches!(result, Err(CadenceError::Conflict(_))));
    }

    #[tokio::test]
    async fn changing_passwords_requires_the_current_one() {
        let store = MemoryStore::new();
        let user = User::register(new_user("ada@example.com"), &store)
            .await
            .unwrap();

        assert!(user
            .change_password("wrong password", "a new password", &store)
            .await
            .is_err());
        user.change_password("correct horse", "a new password", &store)
            .await
            .unwrap();

        assert!(User::login("ada@example.com", "a new password", &store)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn profile_updates_leave_missing_fields_alone() {
        let store = MemoryStore::new();
        let user = User::register(new_user("ada@example.com"), &store)
            .await
            .unwrap();

        let updated = User::update_profile(
            user.id,
            ProfileUpdate {
                phone: Some(" 555-0100 ".to_owned()),
                ..ProfileUpdate::default()
            },
            &store,
        )
        .await
        .unwrap();

        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
        assert_eq!(updated.name, user.name);
        assert_eq!(User::with_id(user.id, &store).await.unwrap(), updated);
    }
}
