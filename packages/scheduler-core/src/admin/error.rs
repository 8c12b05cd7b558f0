//! Maps [`AdminError`] onto HTTP status codes and a uniform JSON body (§6).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{AdminError, DbError};

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Validation(_) => StatusCode::BAD_REQUEST,
            AdminError::NotFound { .. } => StatusCode::NOT_FOUND,
            AdminError::Duplicate { .. } => StatusCode::CONFLICT,
            AdminError::Storage(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            AdminError::Storage(e) if is_fk_violation(e) => StatusCode::BAD_REQUEST,
            AdminError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdminError::Db(DbError::Storage(e)) if is_unique_violation(e) => StatusCode::CONFLICT,
            AdminError::Db(DbError::Storage(e)) if is_fk_violation(e) => StatusCode::BAD_REQUEST,
            AdminError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "admin request failed");
        }

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

fn is_fk_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23503")
}
