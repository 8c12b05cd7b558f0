//! `/jobs` routes (§6): execution inspection and manual retry.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::db::with_transaction;
use crate::error::AdminError;
use crate::model::{Execution, ExecutionStatus};
use crate::store::execution_store::{self, ExecutionFilter};

use super::dto::{ListJobsQuery, PagedResponse};
use super::state::AppState;

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<PagedResponse<Execution>>, AdminError> {
    let db_name = state.db.name().to_string();
    let (page_no, size) = (query.page.page, query.page.size);
    let filter = ExecutionFilter {
        cron_id: query.cron_id,
        status: query.status,
        from_date: query.from_date,
        to_date: query.to_date,
    };

    let page = with_transaction(state.db.clone(), true, || async {
        execution_store::list_paged(&db_name, page_no, size, &filter).await
    })
    .await?;

    Ok(Json(PagedResponse {
        items: page.items,
        page: page_no,
        size,
        total: page.total,
    }))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Execution>, AdminError> {
    let db_name = state.db.name().to_string();
    let execution = with_transaction(state.db.clone(), true, || async {
        execution_store::find_by_id(&db_name, id).await
    })
    .await?;

    execution.map(Json).ok_or(AdminError::NotFound { entity: "job", id: id.to_string() })
}

/// Valid only when the current status is FAILED or TIMEOUT (§6, §8 property 9).
pub async fn retry_job(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Execution>, AdminError> {
    let db_name = state.db.name().to_string();

    let current = with_transaction(state.db.clone(), true, || async {
        execution_store::find_by_id(&db_name, id).await
    })
    .await?;
    let Some(current) = current else {
        return Err(AdminError::NotFound { entity: "job", id: id.to_string() });
    };

    if !matches!(current.status, ExecutionStatus::Failed | ExecutionStatus::Timeout) {
        return Err(AdminError::Validation(format!(
            "job {id} is {:?}, retry is only valid from FAILED or TIMEOUT",
            current.status
        )));
    }

    let db_name = state.db.name().to_string();
    let retried = with_transaction(state.db.clone(), false, || async {
        execution_store::retry_manual(&db_name, id).await
    })
    .await?;

    retried.map(Json).ok_or(AdminError::NotFound { entity: "job", id: id.to_string() })
}

pub async fn delete_job(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, AdminError> {
    let db_name = state.db.name().to_string();
    let deleted = with_transaction(state.db.clone(), false, || async {
        execution_store::delete(&db_name, id).await
    })
    .await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AdminError::NotFound { entity: "job", id: id.to_string() })
    }
}
