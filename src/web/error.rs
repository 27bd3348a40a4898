use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::analysis::CompareError;
use crate::db::StoreError;
use crate::plan::PlanError;
use crate::search::QueryError;

/// Everything a handler can fail with, rendered as a JSON error body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("plan '{plan_id}' could not be decomposed: {source}")]
    Plan {
        plan_id: String,
        #[source]
        source: PlanError,
    },

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub code: String,
    pub message: String,
}

fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::CollectionNotFound(_) | StoreError::RecordNotFound { .. } => {
            (StatusCode::NOT_FOUND, "NOT_FOUND")
        }
        StoreError::InvalidCollectionName(_) => (StatusCode::BAD_REQUEST, "INVALID_COLLECTION"),
        StoreError::UnsupportedBackend(_)
        | StoreError::Database(_)
        | StoreError::Pool(_)
        | StoreError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
    }
}

impl ApiError {
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Store(err) | ApiError::Compare(CompareError::Store(err)) => store_status(err),
            ApiError::Query(QueryError::InvalidPagination { .. }) => {
                (StatusCode::BAD_REQUEST, "INVALID_PAGINATION")
            }
            ApiError::Query(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_FILTER"),
            ApiError::Plan { .. } | ApiError::Compare(CompareError::Decomposition { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PLAN_DECOMPOSITION_FAILED")
            }
            ApiError::Compare(CompareError::InsufficientPlans { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_PLANS")
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!("{} {}: {}", status.as_u16(), code, message);
        } else {
            warn!("{} {}: {}", status.as_u16(), code, message);
        }

        let body = ErrorResponse {
            error: true,
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("background task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = ApiError::from(StoreError::RecordNotFound {
            collection: "c".to_string(),
            id: "x".to_string(),
        });
        assert_eq!(not_found.status().0, StatusCode::NOT_FOUND);

        let wrapped = ApiError::from(CompareError::Store(StoreError::CollectionNotFound("c".to_string())));
        assert_eq!(wrapped.status().0, StatusCode::NOT_FOUND);

        let range = ApiError::from(QueryError::InvalidFilterRange { min: 2.0, max: 1.0 });
        assert_eq!(range.status(), (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_FILTER"));

        let plan = ApiError::Plan {
            plan_id: "p".to_string(),
            source: PlanError::MissingPlan,
        };
        assert_eq!(plan.status().0, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(plan.to_string().contains("'p'"));
    }
}
