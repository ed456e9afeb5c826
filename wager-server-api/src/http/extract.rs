use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use wager_server_domain::{ServiceError, ServiceResult};

use crate::ApiError;

/// `Json` with rejections rendered as API errors.
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))?;
        Ok(Payload(value))
    }
}

/// `Query` with rejections rendered as API errors.
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))?;
        Ok(Params(value))
    }
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates.
/// A plain date used as an upper bound covers the whole day.
pub fn parse_date(
    field: &str,
    value: Option<&str>,
    end_of_day: bool,
) -> ServiceResult<Option<DateTime<Utc>>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(instant.with_timezone(&Utc)));
    }
    let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") else {
        return ServiceError::field(field, "Invalid date");
    };
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };
    Ok(time.map(|time| date.and_time(time).and_utc()))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("from", None, false).unwrap(), None);
        assert_eq!(parse_date("from", Some(" "), false).unwrap(), None);

        let start = parse_date("from", Some("2024-03-05"), false).unwrap().unwrap();
        assert_eq!((start.day(), start.hour()), (5, 0));
        let end = parse_date("to", Some("2024-03-05"), true).unwrap().unwrap();
        assert_eq!((end.day(), end.hour(), end.minute()), (5, 23, 59));

        let exact = parse_date("from", Some("2024-03-05T10:00:00+02:00"), false)
            .unwrap()
            .unwrap();
        assert_eq!(exact.hour(), 8);

        assert!(matches!(
            parse_date("from", Some("yesterday"), false),
            Err(ServiceError::Validation(_))
        ));
    }
}
