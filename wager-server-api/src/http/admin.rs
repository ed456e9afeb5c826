use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use wager_server_domain::{
    FieldViolation, ServiceError,
    ledger::{MIN_TRANSACTION_AMOUNT, TransactionKind},
    user::{UserFilter, UserId, UserStatus},
    util::Pagination,
};

use crate::{
    ApiError,
    auth::AdminAuth,
    http::{
        ApiState,
        extract::{Params, Payload},
        json::{JsonPagination, JsonTransaction, JsonUser},
        transactions::{JsonTransactionPage, JsonTransactionQuery},
    },
};

const DEFAULT_LIMIT: u32 = 10;

#[derive(Deserialize)]
pub struct JsonUserQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct JsonUserPage {
    pub users: Vec<JsonUser>,
    pub pagination: JsonPagination,
}

#[derive(Deserialize)]
pub struct JsonStatus {
    pub status: String,
}

#[derive(Serialize)]
pub struct JsonUserBody {
    pub user: JsonUser,
}

#[derive(Deserialize, Validate)]
pub struct JsonBalanceOperation {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(range(min = MIN_TRANSACTION_AMOUNT, message = "Amount must be at least 0.01"))]
    pub amount: f64,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
}

#[derive(Serialize)]
pub struct JsonBalanceResult {
    pub user: JsonUser,
    pub transaction: JsonTransaction,
}

fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    Uuid::parse_str(id).map_err(|_| ServiceError::NotFound("User not found".to_string()).into())
}

pub async fn list_users(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Params(query): Params<JsonUserQuery>,
) -> Result<Json<JsonUserPage>, ApiError> {
    let filter = UserFilter {
        status: query
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<UserStatus>)
            .transpose()?,
        search: query.search.filter(|s| !s.trim().is_empty()),
        pagination: Pagination::new(query.page, query.limit, DEFAULT_LIMIT),
    };
    let page = state.app.user_service.get_users(filter).await?;
    let pagination = JsonPagination::from(&page);
    Ok(Json(JsonUserPage {
        users: page.items.into_iter().map(JsonUser::from).collect(),
        pagination,
    }))
}

pub async fn set_status(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Payload(payload): Payload<JsonStatus>,
) -> Result<Json<JsonUserBody>, ApiError> {
    let status: UserStatus = payload.status.parse()?;
    let user = state
        .app
        .user_service
        .set_status(parse_user_id(&id)?, status)
        .await?;
    Ok(Json(JsonUserBody { user: user.into() }))
}

pub async fn balance_operation(
    AdminAuth(admin): AdminAuth,
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Payload(operation): Payload<JsonBalanceOperation>,
) -> Result<Json<JsonBalanceResult>, ApiError> {
    operation.validate().map_err(ServiceError::from)?;
    let kind: TransactionKind = operation
        .kind
        .parse()
        .ok()
        .filter(TransactionKind::is_admin)
        .ok_or_else(|| {
            ServiceError::Validation(vec![FieldViolation {
                field: "type".to_string(),
                message: "Type must be credit or debit".to_string(),
            }])
        })?;
    let user_id = parse_user_id(&id)?;
    // unknown users must not leave a failed record behind
    state.app.user_service.fetch_user(user_id).await?;

    let transaction = state
        .app
        .ledger_service
        .create_admin_transaction(user_id, kind, operation.amount, operation.description.trim())
        .await?;
    let user = state.app.user_service.fetch_user(user_id).await?;
    log::info!(
        "Admin {} applied {} of {} to user {}",
        admin.username,
        kind.as_str(),
        operation.amount,
        user.username
    );
    Ok(Json(JsonBalanceResult {
        user: user.into(),
        transaction: transaction.into(),
    }))
}

pub async fn user_transactions(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Params(query): Params<JsonTransactionQuery>,
) -> Result<Json<JsonTransactionPage>, ApiError> {
    let user_id = parse_user_id(&id)?;
    let filter = query.into_filter(Some(user_id), DEFAULT_LIMIT)?;
    let page = state.app.ledger_service.get_transactions(filter).await?;
    let pagination = JsonPagination::from(&page);
    Ok(Json(JsonTransactionPage {
        transactions: page.items.into_iter().map(JsonTransaction::from).collect(),
        pagination,
    }))
}
