use axum::{
    RequestPartsExt,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use wager_server_domain::{ServiceError, user::User};

use crate::{ApiError, http::ApiState};

/// The user behind the bearer token.
pub struct Auth(pub User);

impl FromRequestParts<ApiState> for Auth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Err(ServiceError::Unauthorized("No token provided".to_string()).into());
        }
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ServiceError::Unauthorized("Invalid token".to_string()))?;

        let user = state.app.user_service.authenticate(bearer.token()).await?;
        Ok(Auth(user))
    }
}

/// An authenticated user with the admin role.
pub struct AdminAuth(pub User);

impl FromRequestParts<ApiState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ServiceError::Forbidden("Admin access required".to_string()).into());
        }
        Ok(AdminAuth(user))
    }
}
