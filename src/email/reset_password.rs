use askama::Template;

use crate::email::{Email, Recipient};
use crate::models::user::User;

#[derive(Template)]
#[template(path = "reset-password.html")]
pub struct ResetPasswordEmail<'a> {
    pub user: &'a User,
    pub token: &'a str,
}

impl<'a> Email for ResetPasswordEmail<'a> {
    fn subject(&self) -> String {
        "Reset Your Cadence Password".to_owned()
    }

    fn recipient(&self) -> Recipient<'_> {
        Recipient {
            name: &self.user.name,
            email: &self.user.email,
        }
    }
}
