mod auth;
mod error;
mod http;
mod jwt;

pub use error::ApiError;
pub use http::{ApiSettings, ApiState, router, run};
pub use jwt::JwtServiceImpl;
