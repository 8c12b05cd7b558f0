use scheduler_core::db::with_transaction;
use scheduler_core::model::CronDefinition;
use scheduler_core::store::cron_store;

use super::TestHarness;

/// Inserts a cron definition with sensible test defaults, overridden by `f`,
/// and returns the stored row (with its assigned id).
pub async fn create_cron(
    ctx: &TestHarness,
    name: &str,
    f: impl FnOnce(CronDefinition) -> CronDefinition,
) -> CronDefinition {
    let def = f(CronDefinition::builder()
        .name(name.to_string())
        .cron_expression("* * * * *".to_string())
        .handler_name("sample".to_string())
        .build());

    with_transaction(ctx.db.clone(), false, || async {
        cron_store::create(ctx.db.name(), &def).await
    })
    .await
    .expect("failed to insert test cron definition")
}
