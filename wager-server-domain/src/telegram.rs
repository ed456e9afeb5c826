use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use log::info;
use serde::Deserialize;
use sha2::Sha256;

use crate::{
    ServiceError, ServiceResult,
    jwt::ArcJwtService,
    user::{ArcUserRepository, Role, Session, User, UserId, UserUpdate},
    util::{USERNAME_MAX_LEN, generate_password, hash_password, validate_username},
};

type HmacSha256 = Hmac<Sha256>;

/// Key of the outer HMAC deriving the secret from the bot token.
const WEB_APP_KEY: &[u8] = b"WebAppData";

pub const TELEGRAM_EMAIL_DOMAIN: &str = "telegram.local";

const MAX_USERNAME_ATTEMPTS: u32 = 100;

#[derive(Clone, Debug)]
pub struct TelegramSettings {
    /// Without a bot token init data is trusted as is.
    pub bot_token: Option<String>,
    pub token_ttl: TimeDelta,
    pub max_auth_age: TimeDelta,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            token_ttl: TimeDelta::days(30),
            max_auth_age: TimeDelta::hours(24),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Deserialize)]
struct JsonInitData {
    user: TelegramUser,
}

/// Extracts the Telegram user from WebApp init data.
///
/// With a bot token configured only signed query strings are accepted: the `hash`
/// field must be the HMAC-SHA256 of the remaining fields, sorted by key and joined
/// as `key=value` lines, keyed with `HMAC-SHA256("WebAppData", bot_token)`, and
/// `auth_date` must not be older than `max_auth_age`.
pub fn parse_init_data(
    init_data: &str,
    settings: &TelegramSettings,
    now: DateTime<Utc>,
) -> ServiceResult<TelegramUser> {
    let init_data = init_data.trim();
    if init_data.is_empty() {
        return ServiceError::bad_request("Invalid Telegram initialization data");
    }

    let Some(bot_token) = settings.bot_token.as_deref() else {
        if init_data.starts_with('{') {
            let parsed: JsonInitData = serde_json::from_str(init_data).map_err(|_| {
                ServiceError::BadRequest("Failed to parse Telegram initialization data".into())
            })?;
            return Ok(parsed.user);
        }
        return user_from_fields(&parse_fields(init_data));
    };

    let fields = parse_fields(init_data);
    verify_signature(&fields, bot_token)?;
    check_auth_date(&fields, now, settings.max_auth_age)?;
    user_from_fields(&fields)
}

fn parse_fields(init_data: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect()
}

fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn data_check_string(fields: &[(String, String)]) -> String {
    let mut lines: Vec<&(String, String)> = fields.iter().filter(|(k, _)| k != "hash").collect();
    lines.sort_by(|a, b| a.0.cmp(&b.0));
    lines
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn signing_mac(bot_token: &str) -> ServiceResult<HmacSha256> {
    let mut secret = HmacSha256::new_from_slice(WEB_APP_KEY)
        .map_err(|e| ServiceError::Internal(e.to_string()))?;
    secret.update(bot_token.as_bytes());
    let secret_key = secret.finalize().into_bytes();
    HmacSha256::new_from_slice(&secret_key).map_err(|e| ServiceError::Internal(e.to_string()))
}

fn verify_signature(fields: &[(String, String)], bot_token: &str) -> ServiceResult<()> {
    let Some(hash) = field(fields, "hash") else {
        return ServiceError::bad_request("Missing Telegram signature");
    };
    let signature = hex::decode(hash)
        .map_err(|_| ServiceError::BadRequest("Invalid Telegram signature".into()))?;

    let mut mac = signing_mac(bot_token)?;
    mac.update(data_check_string(fields).as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| ServiceError::BadRequest("Invalid Telegram signature".into()))
}

fn check_auth_date(
    fields: &[(String, String)],
    now: DateTime<Utc>,
    max_age: TimeDelta,
) -> ServiceResult<()> {
    let auth_date = field(fields, "auth_date")
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    match auth_date {
        Some(auth_date) if now - auth_date <= max_age => Ok(()),
        Some(_) => ServiceError::bad_request("Telegram data expired"),
        None => ServiceError::bad_request("Missing Telegram auth date"),
    }
}

fn user_from_fields(fields: &[(String, String)]) -> ServiceResult<TelegramUser> {
    let Some(user) = field(fields, "user") else {
        return ServiceError::bad_request("Missing Telegram user");
    };
    serde_json::from_str(user)
        .map_err(|_| ServiceError::BadRequest("Failed to parse Telegram user".into()))
}

fn base_username(telegram_user: &TelegramUser) -> String {
    let raw = telegram_user
        .username
        .as_deref()
        .or(telegram_user.first_name.as_deref())
        .unwrap_or_default();
    let mut name: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        name = format!("tg{}", name);
    }
    // leave room for a numeric suffix
    name.truncate(USERNAME_MAX_LEN - 6);
    if validate_username(&name).is_err() {
        return format!("tg{}", telegram_user.id);
    }
    name
}

#[derive(Clone, Debug)]
pub struct TelegramLogin {
    pub session: Session,
    pub is_new_user: bool,
}

pub type ArcTelegramService = Arc<Box<dyn TelegramService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait TelegramService {
    /// Logs in the user bound to the Telegram identity, creating one on first sight.
    async fn login(&self, init_data: &str) -> ServiceResult<TelegramLogin>;
    async fn link(&self, user_id: UserId, init_data: &str) -> ServiceResult<Session>;
}

pub struct TelegramServiceImpl {
    user_repository: ArcUserRepository,
    jwt_service: ArcJwtService,
    settings: TelegramSettings,
}

impl TelegramServiceImpl {
    pub fn new(
        user_repository: ArcUserRepository,
        jwt_service: ArcJwtService,
        settings: TelegramSettings,
    ) -> Self {
        Self {
            user_repository,
            jwt_service,
            settings,
        }
    }

    fn session(&self, user: User) -> ServiceResult<Session> {
        let token = self
            .jwt_service
            .generate_token(user.id, self.settings.token_ttl)?;
        Ok(Session { token, user })
    }

    async fn unique_username(&self, telegram_user: &TelegramUser) -> ServiceResult<String> {
        let base = base_username(telegram_user);
        for attempt in 0..MAX_USERNAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, attempt)
            };
            if self
                .user_repository
                .get_user_by_username(&candidate)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        ServiceError::internal(format!("No free username for {}", base))
    }
}

#[async_trait::async_trait]
impl TelegramService for TelegramServiceImpl {
    async fn login(&self, init_data: &str) -> ServiceResult<TelegramLogin> {
        let telegram_user = parse_init_data(init_data, &self.settings, Utc::now())?;

        if let Some(mut user) = self
            .user_repository
            .get_user_by_telegram_id(telegram_user.id)
            .await?
        {
            let update = UserUpdate {
                last_active: Some(Utc::now()),
                ..Default::default()
            };
            self.user_repository.update_user(user.id, &update).await?;
            update.apply(&mut user);
            return Ok(TelegramLogin {
                session: self.session(user)?,
                is_new_user: false,
            });
        }

        let username = self.unique_username(&telegram_user).await?;
        let password_hash = hash_password(&generate_password()?)?;
        let mut user = User::new(
            format!("{}@{}", telegram_user.id, TELEGRAM_EMAIL_DOMAIN),
            username,
            password_hash,
            Role::User,
        );
        user.telegram_id = Some(telegram_user.id);
        self.user_repository.create_user(&user).await?;
        info!(
            "Created user {} for Telegram identity {}",
            user.username, telegram_user.id
        );

        Ok(TelegramLogin {
            session: self.session(user)?,
            is_new_user: true,
        })
    }

    async fn link(&self, user_id: UserId, init_data: &str) -> ServiceResult<Session> {
        let telegram_user = parse_init_data(init_data, &self.settings, Utc::now())?;
        let Some(mut user) = self.user_repository.get_user(user_id).await? else {
            return ServiceError::not_found("User not found");
        };

        if let Some(bound) = self
            .user_repository
            .get_user_by_telegram_id(telegram_user.id)
            .await?
            && bound.id != user.id
        {
            return Err(ServiceError::IdentityAlreadyLinked);
        }

        let update = UserUpdate {
            telegram_id: Some(telegram_user.id),
            ..Default::default()
        };
        self.user_repository.update_user(user.id, &update).await?;
        update.apply(&mut user);
        info!("Linked Telegram identity {} to user {}", telegram_user.id, user.id);
        self.session(user)
    }
}

#[cfg(test)]
mod tests {
    use url::form_urlencoded;

    use super::*;
    use crate::{jwt::mock::MockJwtService, memory::InMemoryUserRepository, user::UserRepository};

    const BOT_TOKEN: &str = "123456:TEST-TOKEN";

    fn service(bot_token: Option<&str>) -> (TelegramServiceImpl, ArcUserRepository) {
        let repo: ArcUserRepository = Arc::new(Box::new(InMemoryUserRepository::new()));
        let settings = TelegramSettings {
            bot_token: bot_token.map(str::to_string),
            ..Default::default()
        };
        (
            TelegramServiceImpl::new(repo.clone(), MockJwtService::arc(), settings),
            repo,
        )
    }

    fn json_init_data(id: i64, username: &str) -> String {
        format!(r#"{{"user":{{"id":{},"username":"{}"}}}}"#, id, username)
    }

    fn signed_init_data(id: i64, auth_date: i64) -> String {
        let user = format!(r#"{{"id":{},"first_name":"Ann"}}"#, id);
        let fields = vec![
            ("auth_date".to_string(), auth_date.to_string()),
            ("query_id".to_string(), "AAF".to_string()),
            ("user".to_string(), user),
        ];
        let mut mac = signing_mac(BOT_TOKEN).unwrap();
        mac.update(data_check_string(&fields).as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &fields {
            serializer.append_pair(k, v);
        }
        serializer.append_pair("hash", &hash);
        serializer.finish()
    }

    #[tokio::test]
    async fn test_login_creates_user_once() {
        let (service, _) = service(None);
        let first = service.login(&json_init_data(42, "ann")).await.unwrap();
        assert!(first.is_new_user);
        let user = &first.session.user;
        assert_eq!(user.username, "ann");
        assert_eq!(user.email, "42@telegram.local");
        assert_eq!(user.telegram_id, Some(42));

        let second = service.login(&json_init_data(42, "ann")).await.unwrap();
        assert!(!second.is_new_user);
        assert_eq!(second.session.user.id, user.id);
    }

    #[tokio::test]
    async fn test_login_makes_username_unique() {
        let (service, repo) = service(None);
        let taken = User::new(
            "ann@example.com".into(),
            "ann".into(),
            "hash".into(),
            Role::User,
        );
        repo.create_user(&taken).await.unwrap();

        let login = service.login(&json_init_data(7, "ann")).await.unwrap();
        assert_eq!(login.session.user.username, "ann_1");

        let login = service.login(&json_init_data(8, "!!")).await.unwrap();
        assert_eq!(login.session.user.username, "tg8");
    }

    #[tokio::test]
    async fn test_signed_init_data() {
        let (service, _) = service(Some(BOT_TOKEN));
        let init_data = signed_init_data(99, Utc::now().timestamp());
        let login = service.login(&init_data).await.unwrap();
        assert_eq!(login.session.user.username, "Ann");
        assert_eq!(login.session.user.telegram_id, Some(99));
    }

    #[tokio::test]
    async fn test_rejects_tampered_and_unsigned_data() {
        let (service, _) = service(Some(BOT_TOKEN));
        let tampered = signed_init_data(99, Utc::now().timestamp()).replace("99", "100");
        assert!(matches!(
            service.login(&tampered).await,
            Err(ServiceError::BadRequest(msg)) if msg == "Invalid Telegram signature"
        ));
        assert!(matches!(
            service.login(&json_init_data(1, "ann")).await,
            Err(ServiceError::BadRequest(msg)) if msg == "Missing Telegram signature"
        ));
        assert!(matches!(
            service.login("").await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_expired_data() {
        let (service, _) = service(Some(BOT_TOKEN));
        let stale = signed_init_data(99, (Utc::now() - TimeDelta::days(2)).timestamp());
        let err = service.login(&stale).await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(msg) if msg == "Telegram data expired"));
    }

    #[tokio::test]
    async fn test_link() {
        let (service, repo) = service(None);
        let alice = User::new(
            "alice@example.com".into(),
            "alice".into(),
            "hash".into(),
            Role::User,
        );
        repo.create_user(&alice).await.unwrap();

        let session = service.link(alice.id, &json_init_data(5, "al")).await.unwrap();
        assert_eq!(session.user.telegram_id, Some(5));
        // linking again to the same account is fine
        service.link(alice.id, &json_init_data(5, "al")).await.unwrap();

        let login = service.login(&json_init_data(5, "al")).await.unwrap();
        assert_eq!(login.session.user.id, alice.id);
        assert!(!login.is_new_user);

        let bob = User::new("bob@example.com".into(), "bob".into(), "hash".into(), Role::User);
        repo.create_user(&bob).await.unwrap();
        let err = service.link(bob.id, &json_init_data(5, "al")).await.unwrap_err();
        assert!(matches!(err, ServiceError::IdentityAlreadyLinked));
    }
}
