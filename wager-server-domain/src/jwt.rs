use std::sync::Arc;

use chrono::TimeDelta;

use crate::{ServiceResult, user::UserId};

pub type ArcJwtService = Arc<Box<dyn JwtService + Send + Sync + 'static>>;

pub trait JwtService {
    fn generate_token(&self, user_id: UserId, ttl: TimeDelta) -> ServiceResult<String>;
    fn validate_token(&self, token: &str) -> ServiceResult<UserId>;
}

#[cfg(test)]
pub(crate) mod mock {
    use uuid::Uuid;

    use super::*;
    use crate::ServiceError;

    /// Issues `token:<user id>` strings.
    pub struct MockJwtService;

    impl MockJwtService {
        pub fn arc() -> ArcJwtService {
            Arc::new(Box::new(MockJwtService))
        }
    }

    impl JwtService for MockJwtService {
        fn generate_token(&self, user_id: UserId, _ttl: TimeDelta) -> ServiceResult<String> {
            Ok(format!("token:{}", user_id))
        }

        fn validate_token(&self, token: &str) -> ServiceResult<UserId> {
            token
                .strip_prefix("token:")
                .and_then(|id| Uuid::parse_str(id).ok())
                .ok_or_else(|| ServiceError::Unauthorized("Invalid token".to_string()))
        }
    }
}
