#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aliasdb_store::{
    Alias, AliasDbConfig, AliasError, AliasId, AliasResult, AliasStore, ManualClock, Target,
    Timestamp,
};
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement, Value};
use tempfile::TempDir;

pub const HOUR: Duration = Duration::from_secs(3_600);
pub const DAY: Duration = Duration::from_secs(86_400);

/// Fixed reference instant used as "D" across the scenarios.
pub fn d() -> Timestamp {
    Timestamp::from_secs(1_750_000_000)
}

pub fn target(value: &str) -> Target {
    Target::new(value).expect("target")
}

pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub store: AliasStore,
    /// Separate connection to the same file for fixtures and row counts.
    pub db: DatabaseConnection,
}

pub async fn harness(now: Timestamp) -> AliasResult<Harness> {
    harness_with(now, |_| {}).await
}

pub async fn harness_with(
    now: Timestamp,
    tweak: impl FnOnce(&mut AliasDbConfig),
) -> AliasResult<Harness> {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("aliases.sqlite");
    let mut config = AliasDbConfig::default_sqlite(db_path.to_string_lossy());
    tweak(&mut config);
    let clock = Arc::new(ManualClock::new(now));
    let store = AliasStore::connect_with_clock(&config, dir.path(), clock.clone()).await?;
    let db = open_raw(&config, dir.path()).await?;
    Ok(Harness {
        dir,
        clock,
        store,
        db,
    })
}

/// Opens the sqlite file behind `config` without going through the store.
pub async fn open_raw(config: &AliasDbConfig, base: &Path) -> AliasResult<DatabaseConnection> {
    let url = config.connection_url(base)?;
    Database::connect(url).await.map_err(AliasError::from)
}

/// Writes a row straight into the table, as a legacy import would. Used to
/// build fixtures the validated path refuses.
pub async fn seed_row(
    db: &DatabaseConnection,
    alias: &str,
    target_value: &str,
    start: Timestamp,
    end: Option<Timestamp>,
) -> AliasResult<Alias> {
    let id = AliasId::new();
    let values: [Value; 5] = [
        id.0.to_uuid_string().into(),
        alias.to_string().into(),
        target_value.to_string().into(),
        start.as_micros().into(),
        end.map(Timestamp::as_micros).into(),
    ];
    let stmt = Statement::from_sql_and_values(
        DatabaseBackend::Sqlite,
        "INSERT INTO alias_records (id, alias, target, starts_at, ends_at) VALUES (?, ?, ?, ?, ?)",
        values,
    );
    db.execute_raw(stmt).await.map_err(AliasError::from)?;
    Ok(Alias {
        id,
        alias: alias.to_string(),
        target: target(target_value),
        start,
        end,
    })
}

pub async fn count_rows(db: &DatabaseConnection) -> AliasResult<i64> {
    let row = db
        .query_one_raw(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM alias_records",
        ))
        .await
        .map_err(AliasError::from)?
        .ok_or_else(|| AliasError::storage("count returned no row"))?;
    row.try_get("", "n").map_err(AliasError::from)
}
