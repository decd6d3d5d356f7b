//! Error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::relay::RelayError;

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_)
            | RelayError::SigningError(_)
            | RelayError::BroadcastRejected { .. } => StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::AlreadyFinalizing(_) | RelayError::NonceConflict(_) => StatusCode::CONFLICT,
            RelayError::Expired(_) => StatusCode::GONE,
            RelayError::AmbiguousBroadcastFailure(_) => StatusCode::BAD_GATEWAY,
            RelayError::UpstreamUnavailable(_) | RelayError::GasPriceTooHigh { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = self.kind(), message = %self, "Request failed upstream");
        }

        let body = Json(json!({
            "success": false,
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::RejectionKind;

    #[test]
    fn test_status_mapping() {
        assert_eq!(RelayError::Expired("t".into()).status_code(), StatusCode::GONE);
        assert_eq!(
            RelayError::BroadcastRejected {
                kind: RejectionKind::Underpriced,
                message: "transaction underpriced".into(),
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::AmbiguousBroadcastFailure("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            RelayError::AlreadyFinalizing("t".into()).into_response().status(),
            StatusCode::CONFLICT
        );
    }
}
