use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wager_server_domain::{
    ServiceError, ServiceResult,
    jwt::JwtService,
    user::UserId,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    exp: usize,
    iat: usize,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// HS256 bearer tokens carrying the user id as subject.
pub struct JwtServiceImpl {
    keys: Keys,
}

impl JwtServiceImpl {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            keys: Keys::new(secret),
        }
    }

    /// A per-process secret, so tokens do not survive a restart.
    pub fn with_random_secret() -> Self {
        log::warn!("No JWT secret configured, generating a random one");
        let secret: [u8; 64] = rand::random();
        Self::new(&secret)
    }
}

impl JwtService for JwtServiceImpl {
    fn generate_token(&self, user_id: UserId, ttl: TimeDelta) -> ServiceResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp().max(0) as usize,
            iat: now.timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.keys.encoding)
            .map_err(|e| ServiceError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn validate_token(&self, token: &str) -> ServiceResult<UserId> {
        let data = decode::<Claims>(token, &self.keys.decoding, &Validation::default())
            .or_else(|_| ServiceError::unauthorized("Invalid token"))?;
        Uuid::parse_str(&data.claims.sub).or_else(|_| ServiceError::unauthorized("Invalid token"))
    }
}
