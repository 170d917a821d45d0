use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use sea_orm::sea_query;
use sea_orm::sea_query::{
    Expr, ExprTrait, MysqlQueryBuilder, OnConflict, Order, PostgresQueryBuilder, Query,
    QueryStatementWriter, SelectStatement, SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, IsolationLevel, QueryResult, Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use crate::AliasDbConfig;
use crate::db::{AliasRecords, AliasWriteLocks};
use crate::migration::Migrator;
use aliasdb_core::{
    Alias, AliasError, AliasId, AliasQueryApi, AliasRange, AliasReplaceApi, AliasResult,
    AliasWriteApi, Clock, CreateAliasInput, Id, Interval, RangeFilter, ReplaceAliasInput,
    SystemClock, Target, Timestamp,
};

#[derive(Clone)]
pub struct AliasStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    clock: Arc<dyn Clock>,
    failpoints: HashSet<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct BackendCapabilities {
    pub serializable_isolation: bool,
}

impl AliasStore {
    pub async fn connect(config: &AliasDbConfig, base_dir: &Path) -> AliasResult<Self> {
        Self::connect_with_clock(config, base_dir, Arc::new(SystemClock)).await
    }

    pub async fn connect_with_clock(
        config: &AliasDbConfig,
        base_dir: &Path,
        clock: Arc<dyn Clock>,
    ) -> AliasResult<Self> {
        let url = config.connection_url(base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(AliasError::from)?;
        let backend = conn.get_database_backend();
        let failpoints = config
            .failpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();
        let store = Self {
            conn,
            backend,
            clock,
            failpoints,
        };
        Migrator::up(&store.conn, None)
            .await
            .map_err(AliasError::from)?;
        info!(
            "aliasdb: connected backend={} failpoints={}",
            store.backend_name(),
            store.failpoints.len()
        );
        Ok(store)
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            DatabaseBackend::Postgres => "postgres",
            DatabaseBackend::MySql => "mysql",
            _ => "sqlite",
        }
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        match self.backend {
            DatabaseBackend::Postgres | DatabaseBackend::MySql => BackendCapabilities {
                serializable_isolation: true,
            },
            _ => BackendCapabilities {
                serializable_isolation: false,
            },
        }
    }

    fn maybe_failpoint(&self, key: &str) -> AliasResult<()> {
        if self.failpoints.contains(key) {
            warn!("aliasdb: failpoint {key} aborting transaction");
            Err(AliasError::storage(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    async fn begin_write(&self, aliases: &[&str]) -> AliasResult<DatabaseTransaction> {
        let tx = if self.capabilities().serializable_isolation {
            self.conn
                .begin_with_config(Some(IsolationLevel::Serializable), None)
                .await?
        } else {
            self.conn.begin().await?
        };
        // Lock rows are taken in sorted order.
        let mut keys = aliases.to_vec();
        keys.sort_unstable();
        keys.dedup();
        for key in keys {
            let lock = Query::insert()
                .into_table(AliasWriteLocks::Table)
                .columns([AliasWriteLocks::Alias, AliasWriteLocks::Version])
                .values_panic([key.into(), 1i64.into()])
                .on_conflict(
                    OnConflict::column(AliasWriteLocks::Alias)
                        .value(
                            AliasWriteLocks::Version,
                            Expr::col((AliasWriteLocks::Table, AliasWriteLocks::Version)).add(1),
                        )
                        .to_owned(),
                )
                .to_owned();
            exec(&tx, &lock).await?;
        }
        Ok(tx)
    }

    async fn insert_record(
        &self,
        tx: &DatabaseTransaction,
        alias: &str,
        target: &Target,
        start: Timestamp,
        end: Option<Timestamp>,
    ) -> AliasResult<Alias> {
        if alias.is_empty() {
            return Err(AliasError::invalid("alias must not be empty"));
        }
        let interval = Interval::new(start, end)?;
        // Same (alias, target) first, then the alias against any target.
        if self
            .reaching_row_exists(tx, alias, Some(target), interval.start)
            .await?
        {
            warn!("aliasdb: rejected '{alias}' -> '{target}': overlapping interval");
            return Err(AliasError::overlapping(alias, target.as_str()));
        }
        if self
            .reaching_row_exists(tx, alias, None, interval.start)
            .await?
        {
            warn!("aliasdb: rejected '{alias}' -> '{target}': alias bound to another target");
            return Err(AliasError::target_conflict(alias, target.as_str()));
        }

        let record = Alias {
            id: AliasId::new(),
            alias: alias.to_string(),
            target: target.clone(),
            start: interval.start,
            end: interval.end,
        };
        let insert = Query::insert()
            .into_table(AliasRecords::Table)
            .columns([
                AliasRecords::Id,
                AliasRecords::Alias,
                AliasRecords::Target,
                AliasRecords::StartsAt,
                AliasRecords::EndsAt,
            ])
            .values_panic([
                id_value(self.backend, record.id.0).into(),
                record.alias.clone().into(),
                record.target.as_str().into(),
                record.start.as_micros().into(),
                record.end.map(Timestamp::as_micros).into(),
            ])
            .to_owned();
        exec(tx, &insert).await?;
        Ok(record)
    }

    async fn reaching_row_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        alias: &str,
        target: Option<&Target>,
        start: Timestamp,
    ) -> AliasResult<bool> {
        let mut select = Query::select()
            .from(AliasRecords::Table)
            .column(AliasRecords::Id)
            .and_where(Expr::col(AliasRecords::Alias).eq(alias))
            .and_where(
                Expr::col(AliasRecords::EndsAt)
                    .is_null()
                    .or(Expr::col(AliasRecords::EndsAt).gte(start.as_micros())),
            )
            .limit(1)
            .to_owned();
        if let Some(target) = target {
            select.and_where(Expr::col(AliasRecords::Target).eq(target.as_str()));
        }
        Ok(query_one(conn, &select).await?.is_some())
    }

    async fn fetch_alias<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: AliasId,
    ) -> AliasResult<Option<Alias>> {
        let select = record_select()
            .and_where(Expr::col(AliasRecords::Id).eq(id_value(self.backend, id.0)))
            .limit(1)
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_alias(&row))
            .transpose()
    }

    async fn close_interval(
        &self,
        tx: &DatabaseTransaction,
        id: AliasId,
        end: Timestamp,
    ) -> AliasResult<()> {
        let update = Query::update()
            .table(AliasRecords::Table)
            .values([(AliasRecords::EndsAt, end.as_micros().into())])
            .and_where(Expr::col(AliasRecords::Id).eq(id_value(self.backend, id.0)))
            .to_owned();
        exec(tx, &update).await
    }
}

#[async_trait]
impl AliasWriteApi for AliasStore {
    async fn create_alias(&self, input: CreateAliasInput) -> AliasResult<Alias> {
        let tx = self.begin_write(&[input.alias.as_str()]).await?;
        let record = self
            .insert_record(&tx, &input.alias, &input.target, input.start, input.end)
            .await?;
        self.maybe_failpoint("after_create_insert")?;
        tx.commit().await?;
        debug!("aliasdb: created {record}");
        Ok(record)
    }
}

#[async_trait]
impl AliasQueryApi for AliasStore {
    async fn get_aliases(&self, target: &Target, range: AliasRange) -> AliasResult<Vec<Alias>> {
        let filter = range.filter();
        let now = self.clock.now();
        debug!("aliasdb: get_aliases target={target} filter={filter:?}");
        let select = aliases_select(target, filter, now);
        let rows = query_all(&self.conn, &select).await?;
        rows.iter().map(read_alias).collect()
    }

    async fn get_alias(&self, id: AliasId) -> AliasResult<Option<Alias>> {
        self.fetch_alias(&self.conn, id).await
    }

    async fn resolve_alias(&self, alias: &str, at: Timestamp) -> AliasResult<Option<Alias>> {
        let select = record_select()
            .and_where(Expr::col(AliasRecords::Alias).eq(alias))
            .and_where(Expr::col(AliasRecords::StartsAt).lte(at.as_micros()))
            .and_where(
                Expr::col(AliasRecords::EndsAt)
                    .is_null()
                    .or(Expr::col(AliasRecords::EndsAt).gt(at.as_micros())),
            )
            .order_by(AliasRecords::StartsAt, Order::Desc)
            .limit(1)
            .to_owned();
        query_one(&self.conn, &select)
            .await?
            .map(|row| read_alias(&row))
            .transpose()
    }
}

#[async_trait]
impl AliasReplaceApi for AliasStore {
    async fn replace_alias(&self, input: ReplaceAliasInput) -> AliasResult<Alias> {
        let ReplaceAliasInput {
            record,
            replace_at,
            new_alias,
        } = input;
        let now = self.clock.now();
        if !record.is_active(now) {
            warn!("aliasdb: replace of inactive {record}");
            return Err(AliasError::not_active(record.id));
        }

        let tx = self
            .begin_write(&[record.alias.as_str(), new_alias.as_str()])
            .await?;
        // The caller's copy may be stale; decide on the locked row.
        let current = self
            .fetch_alias(&tx, record.id)
            .await?
            .ok_or_else(|| AliasError::not_found(format!("alias {}", record.id)))?;
        if current.alias != record.alias {
            return Err(AliasError::invalid(format!(
                "alias {} is stored as '{}', not '{}'",
                current.id, current.alias, record.alias
            )));
        }
        if !current.is_active(now) {
            warn!("aliasdb: replace of {current} lost to a concurrent close");
            return Err(AliasError::not_active(current.id));
        }
        Interval::new(current.start, Some(replace_at))?;
        if let Some(end) = current.end
            && replace_at > end
        {
            return Err(AliasError::invalid(format!(
                "replace_at {replace_at} is after the end {end} of alias {}",
                current.id
            )));
        }

        self.close_interval(&tx, current.id, replace_at).await?;
        self.maybe_failpoint("after_close_interval")?;
        let successor = self
            .insert_record(&tx, &new_alias, &current.target, replace_at, None)
            .await?;
        self.maybe_failpoint("after_replacement_insert")?;
        tx.commit().await?;
        debug!("aliasdb: replaced {current} with {successor} at {replace_at}");
        Ok(successor)
    }
}

fn record_select() -> SelectStatement {
    Query::select()
        .from(AliasRecords::Table)
        .columns([
            AliasRecords::Id,
            AliasRecords::Alias,
            AliasRecords::Target,
            AliasRecords::StartsAt,
            AliasRecords::EndsAt,
        ])
        .to_owned()
}

fn aliases_select(target: &Target, filter: RangeFilter, now: Timestamp) -> SelectStatement {
    let mut select = record_select()
        .and_where(Expr::col(AliasRecords::Target).eq(target.as_str()))
        .to_owned();
    let active_now = Expr::col(AliasRecords::EndsAt)
        .gte(now.as_micros())
        .or(Expr::col(AliasRecords::EndsAt).is_null());
    match filter {
        RangeFilter::Within { from, to } => {
            select
                .and_where(Expr::col(AliasRecords::StartsAt).gte(from.as_micros()))
                .and_where(Expr::col(AliasRecords::EndsAt).lte(to.as_micros()));
        }
        RangeFilter::ActiveNow => {
            select.and_where(active_now);
        }
        RangeFilter::ActiveStartingFrom { from } => {
            select
                .and_where(Expr::col(AliasRecords::StartsAt).gte(from.as_micros()))
                .and_where(active_now);
        }
        RangeFilter::EndingBy { to } => {
            select.and_where(Expr::col(AliasRecords::EndsAt).lte(to.as_micros()));
        }
    }
    select
}

fn read_alias(row: &QueryResult) -> AliasResult<Alias> {
    let id = read_id(row, AliasRecords::Id)?;
    let alias: String = row.try_get("", &col_name(AliasRecords::Alias))?;
    let target: String = row.try_get("", &col_name(AliasRecords::Target))?;
    let target = Target::new(target).map_err(|err| AliasError::storage(err.to_string()))?;
    let start: i64 = row.try_get("", &col_name(AliasRecords::StartsAt))?;
    let end: Option<i64> = row.try_get("", &col_name(AliasRecords::EndsAt))?;
    Ok(Alias {
        id: AliasId(id),
        alias,
        target,
        start: Timestamp(start),
        end: end.map(Timestamp),
    })
}

fn id_value(backend: DatabaseBackend, id: Id) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => SeaValue::Uuid(Some(Uuid::from_bytes(id.as_bytes()))),
        DatabaseBackend::MySql => SeaValue::Bytes(Some(id.as_vec())),
        _ => SeaValue::String(Some(id.to_uuid_string())),
    }
}

fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> AliasResult<Id> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<String>("", &name) {
        return Id::parse(&value);
    }
    if let Ok(value) = row.try_get::<Uuid>("", &name) {
        return Ok(Id::from_bytes(*value.as_bytes()));
    }
    if let Ok(value) = row.try_get::<Vec<u8>>("", &name) {
        return Id::from_slice(&value).ok_or_else(|| AliasError::storage("invalid id length"));
    }
    Err(AliasError::storage("unsupported id format"))
}

fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> AliasResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    conn.execute_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> AliasResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> AliasResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one_raw(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}

#[cfg(test)]
mod query_tests {
    use super::*;

    fn sql_for(filter: RangeFilter) -> String {
        let target = Target::new("t1").expect("target");
        aliases_select(&target, filter, Timestamp(500)).to_string(SqliteQueryBuilder)
    }

    #[test]
    fn bounded_lookup_filters_on_start_and_end_only() {
        let sql = sql_for(RangeFilter::Within {
            from: Timestamp(100),
            to: Timestamp(900),
        });
        assert!(sql.contains(r#""target" = 't1'"#), "{sql}");
        assert!(sql.contains(r#""starts_at" >= 100"#), "{sql}");
        assert!(sql.contains(r#""ends_at" <= 900"#), "{sql}");
        assert!(!sql.contains("IS NULL"), "{sql}");
        assert!(!sql.contains("500"), "{sql}");
    }

    #[test]
    fn unbounded_lookup_keeps_rows_active_now() {
        let sql = sql_for(RangeFilter::ActiveNow);
        assert!(sql.contains(r#""ends_at" >= 500"#), "{sql}");
        assert!(sql.contains(r#""ends_at" IS NULL"#), "{sql}");
        assert!(!sql.contains("starts_at\" >="), "{sql}");
    }

    #[test]
    fn from_only_lookup_mixes_start_bound_with_activity() {
        let sql = sql_for(RangeFilter::ActiveStartingFrom {
            from: Timestamp(100),
        });
        assert!(sql.contains(r#""starts_at" >= 100"#), "{sql}");
        assert!(sql.contains(r#""ends_at" >= 500"#), "{sql}");
        assert!(sql.contains(r#""ends_at" IS NULL"#), "{sql}");
    }

    #[test]
    fn to_only_lookup_bounds_end_without_activity() {
        let sql = sql_for(RangeFilter::EndingBy { to: Timestamp(900) });
        assert!(sql.contains(r#""ends_at" <= 900"#), "{sql}");
        assert!(!sql.contains("IS NULL"), "{sql}");
        assert!(!sql.contains("starts_at\" >="), "{sql}");
    }
}
