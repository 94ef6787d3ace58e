//! Signed login tokens and password resets.
//!
//! A token is `base64url(claims).signature`, where the signature is the hex
//! HMAC-SHA256 of the encoded claims, keyed with the secret for that kind of
//! token. Access and refresh tokens use different secrets, so one can never
//! stand in for the other.

use async_graphql::SimpleObject;
use rand::Rng;
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Store;
use crate::error::{CadenceError, CadenceResult};
use crate::models::user::{validate_password, User, PASSWORD_HASH_COST};
use crate::models::DateTime;
use crate::util::current_time;

pub const RESET_TOKEN_BYTES: usize = 20;

pub fn reset_token_lifetime() -> Duration {
    Duration::minutes(10)
}

#[derive(Clone, Debug)]
pub struct TokenKeys {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_secret: String,
    pub refresh_ttl: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: Uuid,
    /// Unix timestamp after which the token is rejected
    pub exp: i64,
    pub kind: TokenKind,
}

impl TokenKeys {
    fn secret(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn sign(&self, user_id: Uuid, kind: TokenKind, now: DateTime) -> CadenceResult<String> {
        let claims = Claims {
            id: user_id,
            exp: (now.0 + self.ttl(kind)).unix_timestamp(),
            kind,
        };
        let json = serde_json::to_vec(&claims)
            .map_err(|_| CadenceError::InvalidToken("claims could not be encoded"))?;
        let payload = base64::encode_config(json, base64::URL_SAFE_NO_PAD);
        let signature = signature(&payload, self.secret(kind))?;

        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify(&self, token: &str, kind: TokenKind, now: DateTime) -> CadenceResult<Claims> {
        let (payload, given) = token
            .split_once('.')
            .ok_or(CadenceError::InvalidToken("token is malformed"))?;
        if !constant_time_eq(given, &signature(payload, self.secret(kind))?) {
            return Err(CadenceError::InvalidToken("token signature is invalid"));
        }

        let json = base64::decode_config(payload, base64::URL_SAFE_NO_PAD)
            .map_err(|_| CadenceError::InvalidToken("token is malformed"))?;
        let claims: Claims = serde_json::from_slice(&json)
            .map_err(|_| CadenceError::InvalidToken("token is malformed"))?;

        if claims.kind != kind {
            Err(CadenceError::InvalidToken("token is the wrong kind"))
        } else if claims.exp <= now.0.unix_timestamp() {
            Err(CadenceError::InvalidToken("token has expired"))
        } else {
            Ok(claims)
        }
    }
}

type HmacSha256 = Hmac<Sha256>;

fn signature(payload: &str, secret: &str) -> CadenceResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| CadenceError::InvalidToken("signing key is unusable"))?;
    mac.update(payload.as_bytes());

    Ok(format!("{:x}", mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |diff, (x, y)| diff | (x ^ y))
            == 0
}

/// What a successful login hands back to the client.
#[derive(SimpleObject)]
pub struct Session {
    /// Sent as `Authorization: Bearer <token>` on later requests
    pub token: String,
    /// Exchanged for a fresh session once the token expires
    pub refresh_token: String,
    pub user: User,
}

impl Session {
    pub fn issue(user: User, keys: &TokenKeys) -> CadenceResult<Self> {
        let now = current_time();

        Ok(Self {
            token: keys.sign(user.id, TokenKind::Access, now)?,
            refresh_token: keys.sign(user.id, TokenKind::Refresh, now)?,
            user,
        })
    }

    pub async fn refresh(
        refresh_token: &str,
        keys: &TokenKeys,
        store: &dyn Store,
    ) -> CadenceResult<Self> {
        let claims = keys.verify(refresh_token, TokenKind::Refresh, current_time())?;
        let user = store
            .user(claims.id)
            .await?
            .ok_or(CadenceError::Unauthenticated)?;

        Self::issue(user, keys)
    }
}

impl User {
    /// Resolves the user behind an access token.
    pub async fn with_token(token: &str, keys: &TokenKeys, store: &dyn Store) -> CadenceResult<Self> {
        let claims = keys
            .verify(token, TokenKind::Access, current_time())
            .map_err(|err| {
                warn!("rejected access token: {}", err);
                err
            })?;

        store
            .user(claims.id)
            .await?
            .ok_or(CadenceError::Unauthenticated)
    }
}

pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn generate_reset_token() -> String {
    let bytes: [u8; RESET_TOKEN_BYTES] = rand::thread_rng().gen();
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

pub struct PasswordReset;

impl PasswordReset {
    /// Stores the hash of a fresh reset token for the user with the given
    /// email, returning the user and the raw token to send them.
    pub async fn generate(email: &str, store: &dyn Store) -> CadenceResult<(User, String)> {
        let email = email.trim().to_lowercase();
        let user = store
            .user_by_email(&email)
            .await?
            .ok_or_else(|| CadenceError::NotFound("There is no user with that email".to_owned()))?;

        let token = generate_reset_token();
        let expires = DateTime(current_time().0 + reset_token_lifetime());
        store
            .set_reset_token(user.id, Some(&hash_token(&token)), Some(expires))
            .await?;
        info!(user = %user.id, "generated password reset token");

        Ok((user, token))
    }

    pub async fn cancel(user_id: Uuid, store: &dyn Store) -> CadenceResult<()> {
        store.set_reset_token(user_id, None, None).await
    }

    /// Sets a new password if the token is known and unexpired. The token
    /// can only be used once.
    pub async fn reset(token: &str, new_password: &str, store: &dyn Store) -> CadenceResult<User> {
        let user = store
            .user_by_reset_token(&hash_token(token))
            .await?
            .filter(|user| {
                user.reset_password_expire
                    .map_or(false, |expires| expires > current_time())
            })
            .ok_or(CadenceError::InvalidToken("reset token is invalid or has expired"))?;

        validate_password(new_password)?;
        let password_hash = bcrypt::hash(new_password, PASSWORD_HASH_COST)?;
        store.set_password_hash(user.id, &password_hash).await?;
        Self::cancel(user.id, store).await?;
        info!(user = %user.id, "reset password");

        Ok(user)
    }
}
