//! The response envelope and error mapping.
//!
//! Every payload is wrapped as
//! `{ success, data | error, meta: { requestId, timestamp, queryTime? } }`,
//! and every response carries an `X-Response-Time` header (added by the
//! router middleware).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use anima_core::errors::AnimaError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "queryTime", skip_serializing_if = "Option::is_none")]
    pub query_time_ms: Option<u64>,
}

impl Meta {
    fn new(query_time_ms: Option<u64>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            query_time_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// The wire envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Meta,
}

/// A successful response with a chosen status code.
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    success_timed(status, data, None)
}

/// A successful response that reports its query time in `meta`.
pub fn success_timed<T: Serialize>(
    status: StatusCode,
    data: T,
    query_time_ms: Option<u64>,
) -> Response {
    let envelope = Envelope {
        success: true,
        data: Some(data),
        error: None,
        meta: Meta::new(query_time_ms),
    };
    (status, Json(envelope)).into_response()
}

/// Engine error → enveloped HTTP error. Handlers return
/// `Result<Response, ApiError>` and use `?` freely.
pub struct ApiError(pub AnimaError);

impl From<AnimaError> for ApiError {
    fn from(e: AnimaError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: self.0.code(),
                message: self.0.to_string(),
                details: None,
            }),
            meta: Meta::new(None),
        };
        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let envelope = Envelope {
            success: true,
            data: Some(serde_json::json!({"x": 1})),
            error: None,
            meta: Meta::new(Some(12)),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["x"], 1);
        assert!(json["meta"]["requestId"].is_string());
        assert_eq!(json["meta"]["queryTime"], 12);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn error_envelope_shape() {
        let envelope: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: "VALIDATION_ERROR",
                message: "bad input".to_string(),
                details: None,
            }),
            meta: Meta::new(None),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert!(json["meta"].get("queryTime").is_none());
    }
}
