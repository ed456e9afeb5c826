use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, TimeDelta, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use wager_core::Achievement;

use crate::{
    ServiceError, ServiceResult,
    jwt::ArcJwtService,
    util::{Paginated, Pagination, hash_password, validate_username, verify_password},
};

pub type UserId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => ServiceError::field("role", "Invalid role"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for UserStatus {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            _ => ServiceError::bad_request("Invalid status"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub balance: f64,
    pub telegram_id: Option<i64>,
    pub achievements: Vec<Achievement>,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, username: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            password_hash,
            role,
            status: UserStatus::Active,
            balance: 0.0,
            telegram_id: None,
            achievements: Vec::new(),
            last_active: now,
            created_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Field-wise update, `None` leaves the stored value untouched.
#[derive(Clone, Debug, Default)]
pub struct UserUpdate {
    pub status: Option<UserStatus>,
    pub last_active: Option<DateTime<Utc>>,
    pub telegram_id: Option<i64>,
    pub achievements: Option<Vec<Achievement>>,
}

impl UserUpdate {
    pub fn apply(&self, user: &mut User) {
        if let Some(status) = self.status {
            user.status = status;
        }
        if let Some(last_active) = self.last_active {
            user.last_active = last_active;
        }
        if let Some(telegram_id) = self.telegram_id {
            user.telegram_id = Some(telegram_id);
        }
        if let Some(achievements) = &self.achievements {
            user.achievements = achievements.clone();
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub status: Option<UserStatus>,
    /// Case-insensitive substring of username or email.
    pub search: Option<String>,
    pub pagination: Pagination,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if self.status.is_some_and(|s| s != user.status) {
            return false;
        }
        match &self.search {
            Some(search) if !search.is_empty() => {
                let search = search.to_lowercase();
                user.username.to_lowercase().contains(&search)
                    || user.email.to_lowercase().contains(&search)
            }
            _ => true,
        }
    }
}

pub type ArcUserRepository = Arc<Box<dyn UserRepository + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait UserRepository {
    async fn get_user(&self, id: UserId) -> ServiceResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> ServiceResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> ServiceResult<Option<User>>;
    async fn get_user_by_telegram_id(&self, telegram_id: i64) -> ServiceResult<Option<User>>;
    /// Fails with `Conflict` when the email, username or telegram id is taken.
    async fn create_user(&self, user: &User) -> ServiceResult<()>;
    async fn update_user(&self, id: UserId, update: &UserUpdate) -> ServiceResult<()>;
    /// Writes `new` only if the stored balance still equals `expected`.
    async fn compare_and_set_balance(
        &self,
        id: UserId,
        expected: f64,
        new: f64,
    ) -> ServiceResult<bool>;
    /// Most recently created first.
    async fn get_users(&self, filter: &UserFilter) -> ServiceResult<Paginated<User>>;
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct Registration {
    #[validate(email(message = "Invalid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub user: User,
}

pub type ArcUserService = Arc<Box<dyn UserService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait UserService {
    async fn register(&self, registration: Registration) -> ServiceResult<Session>;
    async fn login(&self, email: &str, password: &str) -> ServiceResult<Session>;
    async fn fetch_user(&self, id: UserId) -> ServiceResult<User>;
    async fn authenticate(&self, token: &str) -> ServiceResult<User>;
    async fn get_users(&self, filter: UserFilter) -> ServiceResult<Paginated<User>>;
    async fn set_status(&self, id: UserId, status: UserStatus) -> ServiceResult<User>;
}

pub struct UserServiceImpl {
    user_repository: ArcUserRepository,
    jwt_service: ArcJwtService,
    token_ttl: TimeDelta,
}

impl UserServiceImpl {
    pub fn new(
        user_repository: ArcUserRepository,
        jwt_service: ArcJwtService,
        token_ttl: TimeDelta,
    ) -> Self {
        Self {
            user_repository,
            jwt_service,
            token_ttl,
        }
    }

    fn session(&self, user: User) -> ServiceResult<Session> {
        let token = self.jwt_service.generate_token(user.id, self.token_ttl)?;
        Ok(Session { token, user })
    }
}

#[async_trait::async_trait]
impl UserService for UserServiceImpl {
    async fn register(&self, registration: Registration) -> ServiceResult<Session> {
        let registration = Registration {
            email: registration.email.trim().to_lowercase(),
            username: registration.username.trim().to_string(),
            ..registration
        };
        registration.validate()?;

        if self
            .user_repository
            .get_user_by_email(&registration.email)
            .await?
            .is_some()
        {
            return ServiceError::conflict("Email already registered");
        }
        if self
            .user_repository
            .get_user_by_username(&registration.username)
            .await?
            .is_some()
        {
            return ServiceError::conflict("Username already taken");
        }

        let password_hash = hash_password(&registration.password)?;
        let user = User::new(
            registration.email,
            registration.username,
            password_hash,
            registration.role.unwrap_or(Role::User),
        );
        self.user_repository.create_user(&user).await?;
        info!("Registered user {} ({})", user.username, user.id);
        self.session(user)
    }

    async fn login(&self, email: &str, password: &str) -> ServiceResult<Session> {
        let email = email.trim().to_lowercase();
        let Some(mut user) = self.user_repository.get_user_by_email(&email).await? else {
            return ServiceError::unauthorized("Invalid credentials");
        };
        if !verify_password(password, &user.password_hash) {
            return ServiceError::unauthorized("Invalid credentials");
        }

        let update = UserUpdate {
            last_active: Some(Utc::now()),
            ..Default::default()
        };
        self.user_repository.update_user(user.id, &update).await?;
        update.apply(&mut user);
        self.session(user)
    }

    async fn fetch_user(&self, id: UserId) -> ServiceResult<User> {
        match self.user_repository.get_user(id).await? {
            Some(user) => Ok(user),
            None => ServiceError::not_found("User not found"),
        }
    }

    async fn authenticate(&self, token: &str) -> ServiceResult<User> {
        let user_id = self.jwt_service.validate_token(token)?;
        match self.user_repository.get_user(user_id).await? {
            Some(user) => Ok(user),
            None => ServiceError::unauthorized("User not found"),
        }
    }

    async fn get_users(&self, filter: UserFilter) -> ServiceResult<Paginated<User>> {
        self.user_repository.get_users(&filter).await
    }

    async fn set_status(&self, id: UserId, status: UserStatus) -> ServiceResult<User> {
        let mut user = self.fetch_user(id).await?;
        let update = UserUpdate {
            status: Some(status),
            ..Default::default()
        };
        self.user_repository.update_user(id, &update).await?;
        update.apply(&mut user);
        info!("User {} status set to {}", user.id, status.as_str());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{jwt::mock::MockJwtService, memory::InMemoryUserRepository};

    fn service() -> (UserServiceImpl, ArcUserRepository) {
        let repo: ArcUserRepository = Arc::new(Box::new(InMemoryUserRepository::new()));
        let service = UserServiceImpl::new(repo.clone(), MockJwtService::arc(), TimeDelta::hours(24));
        (service, repo)
    }

    fn registration(email: &str, username: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: "secret123".to_string(),
            username: username.to_string(),
            role: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (service, _) = service();
        let session = service
            .register(registration("Alice@Example.com", "alice"))
            .await
            .unwrap();
        assert_eq!(session.user.email, "alice@example.com");
        assert_eq!(session.user.role, Role::User);
        assert_eq!(session.user.balance, 0.0);
        assert_eq!(session.token, format!("token:{}", session.user.id));

        let login = service.login("alice@example.com", "secret123").await.unwrap();
        assert_eq!(login.user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_creates_nothing() {
        let (service, repo) = service();
        service
            .register(registration("alice@example.com", "alice"))
            .await
            .unwrap();
        let err = service
            .register(registration("alice@example.com", "alice2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(msg) if msg == "Email already registered"));
        assert!(repo.get_user_by_username("alice2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let (service, _) = service();
        service
            .register(registration("alice@example.com", "alice"))
            .await
            .unwrap();
        let err = service
            .register(registration("other@example.com", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(msg) if msg == "Username already taken"));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (service, _) = service();
        let mut bad = registration("nope", "a");
        bad.password = "123".to_string();
        let err = service.register(bad).await.unwrap_err();
        let ServiceError::Validation(violations) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password", "username"]);
    }

    #[tokio::test]
    async fn test_register_normalizes_email() {
        let (service, _) = service();
        let session = service
            .register(registration("  Bob@Example.com ", "bob"))
            .await
            .unwrap();
        assert_eq!(session.user.email, "bob@example.com");

        let err = service
            .register(registration("  not-an-email ", "carol"))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ServiceError::Validation(v) if v.len() == 1 && v[0].field == "email")
        );
    }

    #[tokio::test]
    async fn test_register_honours_admin_role() {
        let (service, _) = service();
        let mut admin = registration("root@example.com", "root");
        admin.role = Some(Role::Admin);
        let session = service.register(admin).await.unwrap();
        assert!(session.user.is_admin());
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let (service, _) = service();
        service
            .register(registration("alice@example.com", "alice"))
            .await
            .unwrap();
        for (email, password) in [("alice@example.com", "wrong!!"), ("bob@example.com", "secret123")]
        {
            let err = service.login(email, password).await.unwrap_err();
            assert!(matches!(err, ServiceError::Unauthorized(msg) if msg == "Invalid credentials"));
        }
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (service, _) = service();
        let session = service
            .register(registration("alice@example.com", "alice"))
            .await
            .unwrap();
        let user = service.authenticate(&session.token).await.unwrap();
        assert_eq!(user.id, session.user.id);

        assert!(matches!(
            service.authenticate("garbage").await,
            Err(ServiceError::Unauthorized(_))
        ));
        let unknown = format!("token:{}", Uuid::new_v4());
        assert!(matches!(
            service.authenticate(&unknown).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_set_status_and_filter() {
        let (service, _) = service();
        let alice = service
            .register(registration("alice@example.com", "alice"))
            .await
            .unwrap()
            .user;
        service
            .register(registration("bob@example.com", "bob"))
            .await
            .unwrap();

        let suspended = service
            .set_status(alice.id, UserStatus::Suspended)
            .await
            .unwrap();
        assert_eq!(suspended.status, UserStatus::Suspended);

        let page = service
            .get_users(UserFilter {
                status: Some(UserStatus::Suspended),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, alice.id);

        let page = service
            .get_users(UserFilter {
                search: Some("BOB@".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].username, "bob");
    }
}
