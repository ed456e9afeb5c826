use passwords::PasswordGenerator;
use rustrict::CensorStr;
use validator::ValidationError;

use crate::{ServiceError, ServiceResult};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let rule = |code: &'static str, message: &'static str| {
        Err(ValidationError::new(code).with_message(message.into()))
    };
    if username.len() < USERNAME_MIN_LEN || username.len() > USERNAME_MAX_LEN {
        return rule("length", "Username must be between 3 and 32 characters");
    }
    if username
        .chars()
        .next()
        .is_none_or(|c| !c.is_ascii_alphabetic())
    {
        return rule("start", "Username must start with a letter");
    }
    if username
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && c != '_')
    {
        return rule("charset", "Username must be alphanumeric");
    }
    if username.is_inappropriate() {
        return rule("content", "Username contains inappropriate content");
    }
    Ok(())
}

pub fn generate_password() -> ServiceResult<String> {
    PasswordGenerator::new()
        .length(24)
        .numbers(true)
        .lowercase_letters(true)
        .uppercase_letters(true)
        .spaces(false)
        .symbols(false)
        .strict(true)
        .generate_one()
        .map_err(|e| ServiceError::Internal(format!("Failed to generate password: {}", e)))
}

pub fn hash_password(password: &str) -> ServiceResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ServiceError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }

    /// Cuts the page out of an already filtered and ordered result set.
    pub fn apply<T>(&self, items: Vec<T>) -> Paginated<T> {
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(self.offset())
            .take(self.limit as usize)
            .collect();
        Paginated {
            items,
            total,
            pagination: *self,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None, 20)
    }
}

#[derive(Clone, Debug)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn pages(&self) -> u64 {
        self.total.div_ceil(self.pagination.limit as u64)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            pagination: self.pagination,
        }
    }
}
