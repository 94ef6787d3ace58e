use std::sync::Arc;

use async_graphql::Request;
use serde_json::Value;
use time::Duration;

use cadence::db::memory::MemoryStore;
use cadence::db::DynStore;
use cadence::email::Mailer;
use cadence::graphql::{build_schema, CadenceSchema};
use cadence::models::user::session::TokenKeys;
use cadence::models::user::User;

fn token_keys() -> TokenKeys {
    TokenKeys {
        access_secret: "access".to_owned(),
        access_ttl: Duration::hours(1),
        refresh_secret: "refresh".to_owned(),
        refresh_ttl: Duration::days(30),
    }
}

struct TestApp {
    schema: CadenceSchema,
    store: DynStore,
    keys: TokenKeys,
}

impl TestApp {
    fn new() -> Self {
        let store: DynStore = Arc::new(MemoryStore::new());
        let keys = token_keys();

        Self {
            schema: build_schema(store.clone(), keys.clone(), Mailer::Log),
            store,
            keys,
        }
    }

    async fn execute(&self, query: &str, user: Option<&User>) -> (Value, Vec<Value>) {
        let mut request = Request::new(query);
        if let Some(user) = user {
            request = request.data(user.clone());
        }

        let response = self.schema.execute(request).await;
        let errors = response
            .errors
            .iter()
            .map(|error| serde_json::to_value(error).unwrap())
            .collect();

        (response.data.into_json().unwrap(), errors)
    }

    /// Registers through the API and resolves the returned access token.
    async fn register(&self, email: &str) -> User {
        let (data, errors) = self
            .execute(
                &format!(
                    r#"mutation {{
                        register(newUser: {{ email: "{}", password: "long enough", name: "Player" }}) {{
                            token
                            refreshToken
                            user {{ email }}
                        }}
                    }}"#,
                    email
                ),
                None,
            )
            .await;
        assert!(errors.is_empty(), "{:?}", errors);

        let token = data["register"]["token"].as_str().unwrap();
        User::with_token(token, &self.keys, &*self.store)
            .await
            .unwrap()
    }

    async fn create_band(&self, admin: &User) -> String {
        let (data, errors) = self
            .execute(
                r#"mutation { createBand(name: "The Metronomes") { id } }"#,
                Some(admin),
            )
            .await;
        assert!(errors.is_empty(), "{:?}", errors);

        data["createBand"]["id"].as_str().unwrap().to_owned()
    }
}

const WEEKLY_SERIES: &str = r#"
    startTime: "2024-01-01T18:00:00Z"
    endTime: "2024-01-01T20:00:00Z"
    venue: { name: "The Garage" }
    isRecurring: true
    recurringPattern: { frequency: WEEKLY, interval: 1, daysOfWeek: [2], count: 4 }
"#;

#[tokio::test]
async fn scheduling_and_responding_to_a_series() {
    let app = TestApp::new();
    let admin = app.register("admin@example.com").await;
    let player = app.register("player@example.com").await;
    let band_id = app.create_band(&admin).await;

    let (_, errors) = app
        .execute(
            &format!(
                r#"mutation {{ addBandMember(bandId: "{}", userId: "{}") {{ id }} }}"#,
                band_id, player.id
            ),
            Some(&admin),
        )
        .await;
    assert!(errors.is_empty(), "{:?}", errors);

    let (data, errors) = app
        .execute(
            &format!(
                r#"mutation {{
                    saveRehearsal(rehearsal: {{ bandId: "{}", title: "Tuesdays" {} }}) {{
                        id
                        startTime
                        durationMinutes
                        attendanceCounts {{ pending total }}
                    }}
                }}"#,
                band_id, WEEKLY_SERIES
            ),
            Some(&admin),
        )
        .await;
    assert!(errors.is_empty(), "{:?}", errors);
    let first = &data["saveRehearsal"];
    assert_eq!(first["startTime"], "2024-01-02T18:00:00Z");
    assert_eq!(first["durationMinutes"], 120);
    assert_eq!(first["attendanceCounts"]["pending"], 2);
    let rehearsal_id = first["id"].as_str().unwrap().to_owned();

    let (data, errors) = app
        .execute(
            &format!(
                r#"mutation {{
                    rsvp(rehearsalId: "{}", status: CONFIRMED, response: "see you") {{
                        attendanceCounts {{ confirmed declined pending total }}
                        canModify
                    }}
                }}"#,
                rehearsal_id
            ),
            Some(&player),
        )
        .await;
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(
        data["rsvp"]["attendanceCounts"],
        serde_json::json!({ "confirmed": 1, "declined": 0, "pending": 1, "total": 2 })
    );
    assert_eq!(data["rsvp"]["canModify"], false);

    let (data, errors) = app
        .execute(
            &format!(r#"{{ rehearsals(bandId: "{}") {{ startTime }} }}"#, band_id),
            Some(&player),
        )
        .await;
    assert!(errors.is_empty(), "{:?}", errors);
    let starts: Vec<&str> = data["rehearsals"]
        .as_array()
        .unwrap()
        .iter()
        .map(|rehearsal| rehearsal["startTime"].as_str().unwrap())
        .collect();
    assert_eq!(
        starts,
        vec![
            "2024-01-02T18:00:00Z",
            "2024-01-09T18:00:00Z",
            "2024-01-16T18:00:00Z",
            "2024-01-23T18:00:00Z",
        ]
    );
}

#[tokio::test]
async fn validation_failures_name_the_field() {
    let app = TestApp::new();
    let admin = app.register("admin@example.com").await;
    let band_id = app.create_band(&admin).await;

    let (_, errors) = app
        .execute(
            &format!(
                r#"mutation {{
                    saveRehearsal(rehearsal: {{
                        bandId: "{}"
                        title: "Backwards"
                        startTime: "2024-01-01T18:00:00Z"
                        endTime: "2024-01-01T17:00:00Z"
                        venue: {{ name: "The Garage" }}
                    }}) {{ id }}
                }}"#,
                band_id
            ),
            Some(&admin),
        )
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["extensions"]["code"], "VALIDATION_ERROR");
    assert_eq!(errors[0]["extensions"]["field"], "endTime");
}

#[tokio::test]
async fn scheduling_requires_a_login() {
    let app = TestApp::new();

    let (_, errors) = app
        .execute(r#"mutation { createBand(name: "Nobody's Band") { id } }"#, None)
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["extensions"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn outsiders_cannot_see_band_rehearsals() {
    let app = TestApp::new();
    let admin = app.register("admin@example.com").await;
    let outsider = app.register("outsider@example.com").await;
    let band_id = app.create_band(&admin).await;

    let (_, errors) = app
        .execute(
            &format!(r#"{{ rehearsals(bandId: "{}") {{ id }} }}"#, band_id),
            Some(&outsider),
        )
        .await;

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["extensions"]["code"], "AUTHORIZATION_ERROR");
}

#[tokio::test]
async fn login_and_refresh() {
    let app = TestApp::new();
    app.register("admin@example.com").await;

    let (data, errors) = app
        .execute(
            r#"mutation { login(email: "ADMIN@example.com", password: "long enough") { refreshToken } }"#,
            None,
        )
        .await;
    assert!(errors.is_empty(), "{:?}", errors);
    let refresh_token = data["login"]["refreshToken"].as_str().unwrap();

    let (data, errors) = app
        .execute(
            &format!(
                r#"mutation {{ refreshToken(refreshToken: "{}") {{ user {{ email }} }} }}"#,
                refresh_token
            ),
            None,
        )
        .await;
    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(data["refreshToken"]["user"]["email"], "admin@example.com");

    let (_, errors) = app
        .execute(
            r#"mutation { login(email: "admin@example.com", password: "wrong password") { token } }"#,
            None,
        )
        .await;
    assert_eq!(errors[0]["extensions"]["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn previews_need_no_login() {
    let app = TestApp::new();

    let (data, errors) = app
        .execute(
            r#"{
                previewOccurrences(
                    pattern: { frequency: DAILY, interval: 2, daysOfWeek: [], count: 3 }
                    startTime: "2024-01-01T18:00:00Z"
                    endTime: "2024-01-01T19:00:00Z"
                ) { startTime }
            }"#,
            None,
        )
        .await;

    assert!(errors.is_empty(), "{:?}", errors);
    assert_eq!(data["previewOccurrences"].as_array().unwrap().len(), 3);
    assert_eq!(data["previewOccurrences"][2]["startTime"], "2024-01-05T18:00:00Z");
}
