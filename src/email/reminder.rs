use askama::Template;
use time::macros::format_description;
use time::Duration;
use tracing::{error, info, warn};

use crate::db::Store;
use crate::email::{Email, Mailer, Recipient};
use crate::error::{CadenceError, CadenceResult};
use crate::models::rehearsal::Rehearsal;
use crate::models::user::User;
use crate::models::DateTime;

pub fn reminder_window() -> Duration {
    Duration::hours(48)
}

#[derive(Template)]
#[template(path = "rehearsal-reminder.html")]
pub struct RehearsalReminderEmail<'a> {
    pub user: &'a User,
    pub rehearsal: &'a Rehearsal,
    pub band_name: &'a str,
    pub starts_at: String,
    pub ends_at: String,
    pub status: &'static str,
}

impl<'a> RehearsalReminderEmail<'a> {
    pub fn new(user: &'a User, rehearsal: &'a Rehearsal, band_name: &'a str) -> CadenceResult<Self> {
        let format = format_description!(
            "[weekday], [month repr:long] [day padding:none] at [hour repr:12 padding:none]:[minute] [period] UTC"
        );
        let format_time = |time: DateTime| {
            time.0
                .format(format)
                .map_err(|err| CadenceError::Email(format!("Failed to format time: {}", err)))
        };

        Ok(Self {
            user,
            rehearsal,
            band_name,
            starts_at: format_time(rehearsal.start_time)?,
            ends_at: format_time(rehearsal.end_time)?,
            status: rehearsal
                .attendance_for(user.id)
                .map(|record| record.status.as_str())
                .unwrap_or("pending"),
        })
    }
}

impl<'a> Email for RehearsalReminderEmail<'a> {
    fn subject(&self) -> String {
        format!("{} is in 48 Hours", self.rehearsal.title)
    }

    fn recipient(&self) -> Recipient<'_> {
        Recipient {
            name: &self.user.name,
            email: &self.user.email,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub rehearsals: usize,
    pub emails_sent: usize,
}

/// Emails every member of each band with a rehearsal in the next 48 hours
/// that hasn't been reminded about yet, then marks those rehearsals as
/// reminded. Failed deliveries are logged and skipped.
pub async fn send_rehearsal_reminders(
    store: &dyn Store,
    mailer: &Mailer,
    now: DateTime,
) -> CadenceResult<ReminderReport> {
    let window_end = DateTime(now.0 + reminder_window());
    let rehearsals = store.rehearsals_starting_between(now, window_end).await?;
    let mut report = ReminderReport::default();

    for rehearsal in rehearsals
        .into_iter()
        .filter(|rehearsal| !rehearsal.is_cancelled && rehearsal.reminder_sent_at.is_none())
    {
        let band = match store.band(rehearsal.band_id).await? {
            Some(band) => band,
            None => {
                warn!(rehearsal = %rehearsal.id, "skipping reminder for rehearsal without a band");
                continue;
            }
        };

        for member_id in band.member_ids() {
            let user = match store.user(member_id).await? {
                Some(user) if user.wants_rehearsal_reminders() => user,
                _ => continue,
            };

            let email = RehearsalReminderEmail::new(&user, &rehearsal, &band.name)?;
            match mailer.send(email).await {
                Ok(()) => report.emails_sent += 1,
                Err(err) => error!(
                    rehearsal = %rehearsal.id,
                    user = %user.id,
                    "failed to send rehearsal reminder: {:?}",
                    err
                ),
            }
        }

        store.mark_reminder_sent(rehearsal.id, now).await?;
        report.rehearsals += 1;
    }

    info!(
        rehearsals = report.rehearsals,
        emails = report.emails_sent,
        "sent rehearsal reminders"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::band::{Band, BandRole};
    use crate::models::rehearsal::NewRehearsal;
    use crate::models::user::{Preferences, ProfileUpdate};
    use crate::tests::mock::{mock_new_rehearsal, register_mock_user};
    use crate::util::current_time;

    #[tokio::test]
    async fn members_are_reminded_once() {
        let store = MemoryStore::new();
        let admin = register_mock_user(&store, "admin@example.com").await;
        let quiet = register_mock_user(&store, "quiet@example.com").await;
        let mut preferences = Preferences::default();
        preferences.notification_preferences.email.rehearsal_reminders = false;
        User::update_profile(
            quiet.id,
            ProfileUpdate {
                preferences: Some(preferences),
                ..ProfileUpdate::default()
            },
            &store,
        )
        .await
        .unwrap();

        let band = Band::create("The Metronomes".to_owned(), admin.id, &store)
            .await
            .unwrap();
        Band::add_member(band.id, quiet.id, BandRole::Member, admin.id, &store)
            .await
            .unwrap();

        let now = current_time();
        let soon = now.0 + Duration::hours(20);
        let later = now.0 + Duration::days(5);
        let schedule = |start: time::OffsetDateTime| NewRehearsal {
            start_time: DateTime(start),
            end_time: DateTime(start + Duration::hours(2)),
            ..mock_new_rehearsal(band.id)
        };
        let upcoming = Rehearsal::create(schedule(soon), admin.id, &store)
            .await
            .unwrap();
        Rehearsal::create(schedule(later), admin.id, &store)
            .await
            .unwrap();

        let report = send_rehearsal_reminders(&store, &Mailer::Log, now)
            .await
            .unwrap();
        assert_eq!(
            report,
            ReminderReport {
                rehearsals: 1,
                emails_sent: 1
            }
        );
        let reminded = Rehearsal::with_id(upcoming.id, &store).await.unwrap();
        assert_eq!(reminded.reminder_sent_at, Some(now));

        let again = send_rehearsal_reminders(&store, &Mailer::Log, now)
            .await
            .unwrap();
        assert_eq!(again, ReminderReport::default());
    }

    #[tokio::test]
    async fn cancelled_rehearsals_are_skipped() {
        let store = MemoryStore::new();
        let admin = register_mock_user(&store, "admin@example.com").await;
        let band = Band::create("The Metronomes".to_owned(), admin.id, &store)
            .await
            .unwrap();
        let now = current_time();
        let start = now.0 + Duration::hours(3);
        let rehearsal = Rehearsal::create(
            NewRehearsal {
                start_time: DateTime(start),
                end_time: DateTime(start + Duration::hours(1)),
                ..mock_new_rehearsal(band.id)
            },
            admin.id,
            &store,
        )
        .await
        .unwrap();
        Rehearsal::cancel(rehearsal.id, None, admin.id, &store)
            .await
            .unwrap();

        let report = send_rehearsal_reminders(&store, &Mailer::Log, now)
            .await
            .unwrap();

        assert_eq!(report, ReminderReport::default());
    }
}
