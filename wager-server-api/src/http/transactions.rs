use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use wager_server_domain::{
    ServiceError, ServiceResult,
    ledger::{DateRange, KindStatistics, TransactionFilter, TransactionKind, TransactionStatus},
    user::UserId,
    util::Pagination,
};

use crate::{
    ApiError,
    auth::{AdminAuth, Auth},
    http::{
        ApiState,
        extract::{Params, Payload, parse_date},
        json::{JsonPagination, JsonTransaction},
    },
};

const DEFAULT_LIMIT: u32 = 20;

#[derive(Deserialize)]
pub struct JsonNewTransaction {
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub metadata: Option<Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JsonTransactionQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl JsonTransactionQuery {
    pub fn into_filter(
        self,
        user_id: Option<UserId>,
        default_limit: u32,
    ) -> ServiceResult<TransactionFilter> {
        Ok(TransactionFilter {
            user_id,
            kind: self
                .kind
                .as_deref()
                .map(str::parse::<TransactionKind>)
                .transpose()?,
            status: self
                .status
                .as_deref()
                .map(str::parse::<TransactionStatus>)
                .transpose()?,
            range: DateRange {
                from: parse_date("startDate", self.start_date.as_deref(), false)?,
                to: parse_date("endDate", self.end_date.as_deref(), true)?,
            },
            pagination: Pagination::new(self.page, self.limit, default_limit),
        })
    }
}

#[derive(Serialize)]
pub struct JsonTransactionPage {
    pub transactions: Vec<JsonTransaction>,
    pub pagination: JsonPagination,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSuccessRate {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub rate: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonTransactionStatistics {
    pub transaction_stats: Vec<KindStatistics>,
    pub success_rates: Vec<JsonSuccessRate>,
}

#[derive(Deserialize)]
pub struct JsonStatusUpdate {
    pub status: String,
    pub error: Option<String>,
}

pub async fn create(
    Auth(user): Auth,
    State(state): State<ApiState>,
    Payload(payload): Payload<JsonNewTransaction>,
) -> Result<(StatusCode, Json<JsonTransaction>), ApiError> {
    let kind: TransactionKind = payload.kind.parse()?;
    let transaction = state
        .app
        .ledger_service
        .create_user_transaction(user.id, kind, payload.amount, payload.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(transaction.into())))
}

pub async fn list_own(
    Auth(user): Auth,
    State(state): State<ApiState>,
    Params(query): Params<JsonTransactionQuery>,
) -> Result<Json<JsonTransactionPage>, ApiError> {
    let filter = query.into_filter(Some(user.id), DEFAULT_LIMIT)?;
    page(&state, filter).await
}

pub async fn list_all(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Params(query): Params<JsonTransactionQuery>,
) -> Result<Json<JsonTransactionPage>, ApiError> {
    let filter = query.into_filter(None, DEFAULT_LIMIT)?;
    page(&state, filter).await
}

async fn page(
    state: &ApiState,
    filter: TransactionFilter,
) -> Result<Json<JsonTransactionPage>, ApiError> {
    let page = state.app.ledger_service.get_transactions(filter).await?;
    let pagination = JsonPagination::from(&page);
    Ok(Json(JsonTransactionPage {
        transactions: page.items.into_iter().map(JsonTransaction::from).collect(),
        pagination,
    }))
}

pub async fn statistics(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Params(query): Params<JsonRangeQuery>,
) -> Result<Json<JsonTransactionStatistics>, ApiError> {
    let range = DateRange {
        from: parse_date("startDate", query.start_date.as_deref(), false)?,
        to: parse_date("endDate", query.end_date.as_deref(), true)?,
    };
    let stats = state.app.ledger_service.get_statistics(range).await?;
    let success_rates = stats
        .iter()
        .map(|s| JsonSuccessRate {
            kind: s.kind.as_str(),
            rate: s.success_rate,
        })
        .collect();
    Ok(Json(JsonTransactionStatistics {
        transaction_stats: stats,
        success_rates,
    }))
}

pub async fn update_status(
    AdminAuth(_): AdminAuth,
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Payload(update): Payload<JsonStatusUpdate>,
) -> Result<Json<JsonTransaction>, ApiError> {
    let status: TransactionStatus = update.status.parse()?;
    let id = Uuid::parse_str(&id)
        .map_err(|_| ServiceError::NotFound("Transaction not found".to_string()))?;
    let transaction = state
        .app
        .ledger_service
        .set_status(id, status, update.error)
        .await?;
    Ok(Json(transaction.into()))
}
