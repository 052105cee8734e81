use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by the relay's HTTP operations.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Upstream model server unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Upstream model server error: {0}")]
    Upstream(String),

    #[error("Failed to fetch document: {0}")]
    Fetch(String),

    #[error("Failed to extract document text: {0}")]
    Extraction(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidInput(_) | RelayError::Unavailable(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            RelayError::InvalidInput(msg) | RelayError::Unavailable(msg) => ErrorBody {
                error: msg.clone(),
                details: None,
            },
            RelayError::UpstreamUnreachable(details) | RelayError::Upstream(details) => ErrorBody {
                error: "Failed to get a response from the model".into(),
                details: Some(details.clone()),
            },
            RelayError::Fetch(details) => ErrorBody {
                error: "Failed to fetch document".into(),
                details: Some(details.clone()),
            },
            RelayError::Extraction(details) => ErrorBody {
                error: "Failed to extract document text".into(),
                details: Some(details.clone()),
            },
        }
    }

    /// Classifies a transport error from the model server.
    pub fn from_upstream(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            RelayError::UpstreamUnreachable(err.to_string())
        } else {
            RelayError::Upstream(err.to_string())
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(RelayError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(RelayError::Unavailable("x".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn server_errors_carry_details() {
        let err = RelayError::Fetch("404 Not Found".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["error"], "Failed to fetch document");
        assert_eq!(body["details"], "404 Not Found");
    }

    #[test]
    fn invalid_input_has_no_details_field() {
        let body = serde_json::to_value(RelayError::InvalidInput("Model and prompt are required".into()).body()).unwrap();
        assert_eq!(body["error"], "Model and prompt are required");
        assert!(body.get("details").is_none());
    }
}
