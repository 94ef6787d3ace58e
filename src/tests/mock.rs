use time::macros::datetime;
use time::Duration;
use uuid::Uuid;

use crate::db::Store;
use crate::models::band::{Band, BandMember, BandRole};
use crate::models::rehearsal::{NewRehearsal, Rehearsal, Venue};
use crate::models::user::session::TokenKeys;
use crate::models::user::{NewUser, Preferences, User};
use crate::models::DateTime;
use crate::util::current_time;

pub const MOCK_PASSWORD: &str = "correct horse";

pub fn mock_venue() -> Venue {
    Venue {
        name: String::from("The Garage"),
        address: Some(String::from("12 Elm Street")),
        coordinates: None,
    }
}

/// A Monday evening rehearsal, 18:00 to 20:00, with no attendance yet.
pub fn mock_rehearsal() -> Rehearsal {
    let now = current_time();

    Rehearsal {
        id: Uuid::new_v4(),
        band_id: Uuid::new_v4(),
        title: String::from("Full Run-through"),
        description: Some(String::from("Both sets, top to bottom")),
        start_time: DateTime(datetime!(2024-01-01 18:00 UTC)),
        end_time: DateTime(datetime!(2024-01-01 20:00 UTC)),
        venue: mock_venue(),
        is_recurring: false,
        recurring_pattern: None,
        songs: vec![],
        notes: String::new(),
        created_by: Uuid::new_v4(),
        attendance: vec![],
        is_cancelled: false,
        cancel_reason: None,
        reminder_sent_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// The payload for [`mock_rehearsal`], scheduled for the given band.
pub fn mock_new_rehearsal(band_id: Uuid) -> NewRehearsal {
    NewRehearsal {
        band_id,
        title: String::from("Full Run-through"),
        description: Some(String::from("Both sets, top to bottom")),
        start_time: DateTime(datetime!(2024-01-01 18:00 UTC)),
        end_time: DateTime(datetime!(2024-01-01 20:00 UTC)),
        venue: mock_venue(),
        is_recurring: false,
        recurring_pattern: None,
        songs: vec![],
        notes: None,
    }
}

pub fn mock_band() -> Band {
    Band {
        id: Uuid::new_v4(),
        name: String::from("The Metronomes"),
        members: vec![BandMember {
            user_id: Uuid::new_v4(),
            role: BandRole::Admin,
        }],
        created_at: current_time(),
    }
}

/// A user that exists only in memory, not in any store.
pub fn mock_user() -> User {
    let now = current_time();

    User {
        id: Uuid::new_v4(),
        email: String::from("mock@example.com"),
        name: String::from("Mock Member"),
        phone: None,
        instruments: vec![String::from("drums")],
        profile_image: String::new(),
        preferences: Preferences::default(),
        reset_password_token: None,
        reset_password_expire: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn register_mock_user(store: &dyn Store, email: &str) -> User {
    User::register(
        NewUser {
            email: email.to_owned(),
            password: MOCK_PASSWORD.to_owned(),
            name: String::from("Mock Member"),
            phone: None,
            instruments: vec![],
        },
        store,
    )
    .await
    .unwrap()
}

pub fn mock_token_keys() -> TokenKeys {
    TokenKeys {
        access_secret: String::from("access secret"),
        access_ttl: Duration::hours(1),
        refresh_secret: String::from("refresh secret"),
        refresh_ttl: Duration::days(30),
    }
}
