//! Errors from request handling outside the session lifecycle: registration
//! input, session ids in paths and storage failures.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rejected input. The message is shown to the client.
    #[error("{0}")]
    Invalid(String),
    #[error("Session not found")]
    UnknownSession,
    #[error("Email is already registered")]
    EmailTaken,
    #[error("Internal server error")]
    Storage(#[from] StoreError),
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::UnknownSession => StatusCode::NOT_FOUND,
            Self::EmailTaken => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Storage(e) = &self {
            tracing::error!(error = %e, "Request failed in storage");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Parse a session id taken from the path.
pub fn parse_session_id(raw: &str) -> Result<uuid::Uuid, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::invalid("Session id cannot be empty"));
    }
    uuid::Uuid::try_parse(raw).map_err(|_| ApiError::invalid("Invalid session id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::UnknownSession.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::EmailTaken.status(), StatusCode::CONFLICT);

        let storage = ApiError::from(StoreError::Database(sqlx::Error::PoolClosed));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(storage.to_string(), "Internal server error");
    }

    #[test]
    fn test_parse_session_id() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_session_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_session_id(""), Err(ApiError::Invalid(_))));
        assert!(matches!(parse_session_id("not-a-uuid"), Err(ApiError::Invalid(_))));
        assert!(matches!(
            parse_session_id(&format!("{}0", id)),
            Err(ApiError::Invalid(_))
        ));
    }
}
