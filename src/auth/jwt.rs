use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::users::{Role, User};

/// JWT payload carried by every identity assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // user ID
    pub username: String, // login name at issue time
    pub role: Role,       // authorization role
    pub iat: usize,       // issued at (unix timestamp)
    pub exp: usize,       // expires at (unix timestamp)
    pub iss: String,      // issuer
    pub aud: String,      // audience
}

/// Single verification failure. Malformed, forged and expired tokens are
/// indistinguishable to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid token")]
pub struct InvalidToken;

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64) * 60),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> anyhow::Result<String> {
        self.issue_at(user, OffsetDateTime::now_utc())
    }

    /// Signs a token as if issued at `now`.
    pub fn issue_at(&self, user: &User, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user.id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, InvalidToken> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(reason = ?e.kind(), "jwt rejected");
            InvalidToken
        })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn keys_with(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        let mut cfg = AppConfig::for_tests().jwt;
        cfg.secret = secret.into();
        cfg.issuer = issuer.into();
        cfg.audience = audience.into();
        JwtKeys::new(&cfg)
    }

    fn make_keys() -> JwtKeys {
        keys_with("dev-secret", "test-issuer", "test-aud")
    }

    fn alice() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            role: Role::User,
            profile_image: None,
            created_at: OffsetDateTime::now_utc(),
            last_login: None,
        }
    }

    #[test]
    fn sign_and_verify_token() {
        let keys = make_keys();
        let user = alice();
        let token = keys.issue(&user).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn expired_token_is_plain_invalid() {
        let keys = make_keys();
        let two_days_ago = OffsetDateTime::now_utc() - TimeDuration::days(2);
        let token = keys.issue_at(&alice(), two_days_ago).expect("sign");
        assert_eq!(keys.verify(&token), Err(InvalidToken));
    }

    #[test]
    fn token_expired_seconds_ago_is_invalid() {
        let keys = make_keys();
        let issued = OffsetDateTime::now_utc()
            - TimeDuration::seconds(keys.ttl().as_secs() as i64)
            - TimeDuration::seconds(30);
        let token = keys.issue_at(&alice(), issued).expect("sign");
        assert_eq!(keys.verify(&token), Err(InvalidToken));
    }

    #[test]
    fn wrong_signature_is_plain_invalid() {
        let token = keys_with("other-secret", "test-issuer", "test-aud")
            .issue(&alice())
            .expect("sign");
        assert_eq!(make_keys().verify(&token), Err(InvalidToken));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let bad_keys = keys_with("dev-secret", "bad-iss", "bad-aud");
        let token = bad_keys.issue(&alice()).expect("sign");
        assert_eq!(make_keys().verify(&token), Err(InvalidToken));
    }

    #[test]
    fn garbage_is_plain_invalid() {
        assert_eq!(make_keys().verify("not.a.jwt"), Err(InvalidToken));
        assert_eq!(make_keys().verify(""), Err(InvalidToken));
    }
}
