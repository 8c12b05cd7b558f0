//! `/crons` routes (§6): CRUD over cron definitions.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::cron::expression::validate_min_interval;
use crate::db::with_transaction;
use crate::error::AdminError;
use crate::model::CronDefinition;
use crate::store::cron_store;

use super::dto::{CronRequest, ListCronsQuery, PagedResponse};
use super::state::AppState;

const MIN_CRON_INTERVAL_SECONDS: u64 = 60;

pub async fn list_crons(
    State(state): State<AppState>,
    Query(query): Query<ListCronsQuery>,
) -> Result<Json<PagedResponse<CronDefinition>>, AdminError> {
    let db_name = state.db.name().to_string();
    let is_enabled = query.is_enabled;
    let (page_no, size) = (query.page.page, query.page.size);
    let page = with_transaction(state.db.clone(), true, || async {
        cron_store::list_paged(&db_name, page_no, size, is_enabled).await
    })
    .await?;

    Ok(Json(PagedResponse {
        items: page.items,
        page: query.page.page,
        size: query.page.size,
        total: page.total,
    }))
}

pub async fn get_cron(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CronDefinition>, AdminError> {
    let db_name = state.db.name().to_string();
    let def = with_transaction(state.db.clone(), true, || async {
        cron_store::find_by_id(&db_name, id).await
    })
    .await?;
    def.map(Json)
        .ok_or(AdminError::NotFound { entity: "cron", id: id.to_string() })
}

pub async fn create_cron(
    State(state): State<AppState>,
    Json(req): Json<CronRequest>,
) -> Result<(StatusCode, Json<CronDefinition>), AdminError> {
    validate_request(&state, &req)?;

    let def = req.into_definition(0);
    let db_name = state.db.name().to_string();
    let name = def.name.clone();

    let existing = with_transaction(state.db.clone(), true, || async {
        cron_store::find_by_name(&db_name, &name).await
    })
    .await?;
    if existing.is_some() {
        return Err(AdminError::Duplicate { entity: "cron", name });
    }

    // A racing create between the check above and this insert still lands
    // on the `UNIQUE(name)` constraint; `admin::error` maps that storage
    // error onto 409 as a backstop.
    let created = with_transaction(state.db.clone(), false, || async {
        cron_store::create(&db_name, &def).await
    })
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_cron(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CronRequest>,
) -> Result<Json<CronDefinition>, AdminError> {
    validate_request(&state, &req)?;

    let def = req.into_definition(id);
    let db_name = state.db.name().to_string();

    let updated = with_transaction(state.db.clone(), false, || async {
        cron_store::update(&db_name, id, &def).await
    })
    .await?;

    updated.map(Json).ok_or(AdminError::NotFound { entity: "cron", id: id.to_string() })
}

pub async fn delete_cron(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, AdminError> {
    let db_name = state.db.name().to_string();
    let deleted = with_transaction(state.db.clone(), false, || async {
        cron_store::delete(&db_name, id).await
    })
    .await?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AdminError::NotFound { entity: "cron", id: id.to_string() })
    }
}

pub async fn toggle_cron(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CronDefinition>, AdminError> {
    let db_name = state.db.name().to_string();
    let toggled = with_transaction(state.db.clone(), false, || async {
        cron_store::toggle_enabled(&db_name, id).await
    })
    .await?;

    toggled.map(Json).ok_or(AdminError::NotFound { entity: "cron", id: id.to_string() })
}

fn validate_request(state: &AppState, req: &CronRequest) -> Result<(), AdminError> {
    validate_min_interval(&req.cron_expression, MIN_CRON_INTERVAL_SECONDS)
        .map_err(|e| AdminError::Validation(e.to_string()))?;

    if !(0..=10).contains(&req.max_retry) {
        return Err(AdminError::Validation("max_retry must be between 0 and 10".to_string()));
    }
    if !(60..=86400).contains(&req.timeout_seconds) {
        return Err(AdminError::Validation(
            "timeout_seconds must be between 60 and 86400".to_string(),
        ));
    }
    if !state.handlers.contains(&req.handler_name) {
        return Err(AdminError::Validation(format!(
            "no handler registered under name '{}'",
            req.handler_name
        )));
    }
    Ok(())
}
