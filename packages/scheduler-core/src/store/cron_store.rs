//! CRUD over `cron_definitions`, shared by the admin API and the cron
//! dispatcher's load step.

use sqlx::Row;

use crate::db::context;
use crate::error::DbError;
use crate::model::CronDefinition;
use crate::pg_args;

fn from_row(row: sqlx::postgres::PgRow) -> Result<CronDefinition, DbError> {
    sqlx::FromRow::from_row(&row).map_err(DbError::Storage)
}

/// All enabled definitions, for the dispatcher's load-every-poll step (§4.4.1).
pub async fn list_enabled(db_name: &str) -> Result<Vec<CronDefinition>, DbError> {
    let rows = context::fetch_all(
        db_name,
        "SELECT * FROM cron_definitions WHERE is_enabled = true ORDER BY id",
        pg_args![],
    )
    .await?;
    rows.into_iter().map(from_row).collect()
}

pub struct CronPage {
    pub items: Vec<CronDefinition>,
    pub total: i64,
}

/// Paged listing for `GET /crons`, optionally filtered by `is_enabled`.
pub async fn list_paged(
    db_name: &str,
    page: i64,
    size: i64,
    is_enabled: Option<bool>,
) -> Result<CronPage, DbError> {
    let offset = (page.max(1) - 1) * size;

    let (rows, total_row) = match is_enabled {
        Some(enabled) => {
            let rows = context::fetch_all(
                db_name,
                "SELECT * FROM cron_definitions WHERE is_enabled = $1 \
                 ORDER BY id LIMIT $2 OFFSET $3",
                pg_args![enabled, size, offset],
            )
            .await?;
            let total_row = context::fetch_optional(
                db_name,
                "SELECT count(*) AS count FROM cron_definitions WHERE is_enabled = $1",
                pg_args![enabled],
            )
            .await?;
            (rows, total_row)
        }
        None => {
            let rows = context::fetch_all(
                db_name,
                "SELECT * FROM cron_definitions ORDER BY id LIMIT $1 OFFSET $2",
                pg_args![size, offset],
            )
            .await?;
            let total_row = context::fetch_optional(
                db_name,
                "SELECT count(*) AS count FROM cron_definitions",
                pg_args![],
            )
            .await?;
            (rows, total_row)
        }
    };

    let total: i64 = total_row.map(|r| r.try_get("count")).transpose()?.unwrap_or(0);
    let items = rows.into_iter().map(from_row).collect::<Result<_, _>>()?;
    Ok(CronPage { items, total })
}

pub async fn find_by_id(db_name: &str, id: i64) -> Result<Option<CronDefinition>, DbError> {
    let row = context::fetch_optional(
        db_name,
        "SELECT * FROM cron_definitions WHERE id = $1",
        pg_args![id],
    )
    .await?;
    row.map(from_row).transpose()
}

pub async fn find_by_name(db_name: &str, name: &str) -> Result<Option<CronDefinition>, DbError> {
    let row = context::fetch_optional(
        db_name,
        "SELECT * FROM cron_definitions WHERE name = $1",
        pg_args![name],
    )
    .await?;
    row.map(from_row).transpose()
}

/// Looks up a definition by its `handler_name` column (§4.5 step 2 of the
/// queue dispatcher), as opposed to [`find_by_name`] which matches the
/// unique display `name`. Ambiguity (two definitions sharing a
/// `handler_name`) resolves to whichever row the store returns first; the
/// admin API does not enforce uniqueness on this column.
pub async fn find_by_handler_name(db_name: &str, handler_name: &str) -> Result<Option<CronDefinition>, DbError> {
    let row = context::fetch_optional(
        db_name,
        "SELECT * FROM cron_definitions WHERE handler_name = $1 ORDER BY id LIMIT 1",
        pg_args![handler_name],
    )
    .await?;
    row.map(from_row).transpose()
}

/// Inserts `def` and returns the stored row (with its assigned `id` and
/// server-assigned timestamps). Callers check for a pre-existing name via
/// [`find_by_name`] first; the admin route maps the unique-violation this
/// raises into a 409 as a backstop against a racing create.
pub async fn create(db_name: &str, def: &CronDefinition) -> Result<CronDefinition, DbError> {
    let row = context::fetch_optional(
        db_name,
        "INSERT INTO cron_definitions \
         (name, description, cron_expression, handler_name, handler_params, \
          is_enabled, allow_overlap, max_retry, timeout_seconds, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now()) \
         RETURNING *",
        pg_args![
            def.name,
            def.description,
            def.cron_expression,
            def.handler_name,
            def.handler_params,
            def.is_enabled,
            def.allow_overlap,
            def.max_retry,
            def.timeout_seconds,
        ],
    )
    .await?;
    from_row(row.expect("INSERT ... RETURNING always yields a row"))
}

/// Replaces every mutable field of the definition named by `id`.
pub async fn update(db_name: &str, id: i64, def: &CronDefinition) -> Result<Option<CronDefinition>, DbError> {
    let row = context::fetch_optional(
        db_name,
        "UPDATE cron_definitions SET \
         name = $1, description = $2, cron_expression = $3, handler_name = $4, \
         handler_params = $5, is_enabled = $6, allow_overlap = $7, max_retry = $8, \
         timeout_seconds = $9, updated_at = now() \
         WHERE id = $10 RETURNING *",
        pg_args![
            def.name,
            def.description,
            def.cron_expression,
            def.handler_name,
            def.handler_params,
            def.is_enabled,
            def.allow_overlap,
            def.max_retry,
            def.timeout_seconds,
            id,
        ],
    )
    .await?;
    row.map(from_row).transpose()
}

/// Flips `is_enabled` and returns the updated row.
pub async fn toggle_enabled(db_name: &str, id: i64) -> Result<Option<CronDefinition>, DbError> {
    let row = context::fetch_optional(
        db_name,
        "UPDATE cron_definitions SET is_enabled = NOT is_enabled, updated_at = now() \
         WHERE id = $1 RETURNING *",
        pg_args![id],
    )
    .await?;
    row.map(from_row).transpose()
}

/// Deletes the definition. Execution rows referencing it are left in place
/// (§9's resolved open question) — the foreign key carries no cascade, so
/// this fails with a referential-integrity error if executions still
/// reference `id`, which the admin route surfaces as a 400.
pub async fn delete(db_name: &str, id: i64) -> Result<bool, DbError> {
    let affected = context::execute(
        db_name,
        "DELETE FROM cron_definitions WHERE id = $1",
        pg_args![id],
    )
    .await?;
    Ok(affected > 0)
}
