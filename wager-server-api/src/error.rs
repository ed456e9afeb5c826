use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use wager_server_domain::ServiceError;

use crate::http::ApiState;

/// Wraps a `ServiceError` so it can be turned into an HTTP response.
#[derive(Debug, Clone)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        ApiError(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::BadRequest(_) | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict(_) | ServiceError::IdentityAlreadyLinked => StatusCode::CONFLICT,
            ServiceError::InsufficientBalance
            | ServiceError::AccountSuspended
            | ServiceError::InvalidBetAmount { .. }
            | ServiceError::GameInactive => StatusCode::BAD_REQUEST,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self, with_detail: bool) -> Value {
        let mut body = match &self.0 {
            ServiceError::Validation(violations) => json!({ "errors": violations }),
            // internals stay in the log
            ServiceError::Internal(_) => json!({ "error": "Internal server error" }),
            other => json!({ "error": other.message() }),
        };
        if with_detail {
            body["detail"] = Value::String(format!("{:?}", self.0));
        }
        body
    }

    fn render(&self, with_detail: bool) -> Response {
        let mut response = (self.status(), Json(self.body(with_detail))).into_response();
        response.extensions_mut().insert(self.clone());
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ServiceError::Internal(msg) = &self.0 {
            log::error!("Internal error: {}", msg);
        }
        self.render(false)
    }
}

/// Re-renders error responses with a `detail` field when running in development mode.
pub async fn attach_error_detail(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !state.settings.development {
        return response;
    }
    match response.extensions().get::<ApiError>() {
        Some(error) => error.render(true),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use wager_server_domain::FieldViolation;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (ServiceError::IdentityAlreadyLinked, StatusCode::CONFLICT),
            (ServiceError::InsufficientBalance, StatusCode::BAD_REQUEST),
            (ServiceError::AccountSuspended, StatusCode::BAD_REQUEST),
            (ServiceError::GameInactive, StatusCode::BAD_REQUEST),
            (
                ServiceError::InvalidBetAmount { min: 1.0, max: 2.0 },
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }

    #[test]
    fn test_bodies() {
        let body = ApiError(ServiceError::InsufficientBalance).body(false);
        assert_eq!(body, json!({ "error": "Insufficient balance" }));

        let body = ApiError(ServiceError::Validation(vec![FieldViolation {
            field: "email".to_string(),
            message: "Invalid email".to_string(),
        }]))
        .body(false);
        assert_eq!(
            body,
            json!({ "errors": [{ "field": "email", "message": "Invalid email" }] })
        );

        let body = ApiError(ServiceError::Internal("db down".into())).body(true);
        assert_eq!(body["error"], "Internal server error");
        assert!(body["detail"].as_str().unwrap().contains("db down"));
    }
}
