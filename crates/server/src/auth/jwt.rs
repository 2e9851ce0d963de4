use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub exp: i64,
}

/// Identity tokens are issued by the account service; this is used by
/// tooling and tests.
pub fn create_token(user_id: i64, secret: &str, expire_hours: i64) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        user_id,
        exp: (Utc::now() + Duration::hours(expire_hours)).timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// Account id carried by a valid, unexpired token.
pub fn verify_token(token: &str, secret: &str) -> Option<i64> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .ok()
        .map(|data| data.claims.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = create_token(17, "secret", 1).unwrap();
        assert_eq!(verify_token(&token, "secret"), Some(17));
    }

    #[test]
    fn test_wrong_secret_or_expired() {
        let token = create_token(17, "secret", 1).unwrap();
        assert_eq!(verify_token(&token, "other"), None);

        let expired = create_token(17, "secret", -2).unwrap();
        assert_eq!(verify_token(&expired, "secret"), None);
        assert_eq!(verify_token("garbage", "secret"), None);
    }
}
