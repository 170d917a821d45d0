use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::{AliasRecords, AliasWriteLocks};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(AliasRecords::Table)
                    .if_not_exists()
                    .col(id_col(backend, AliasRecords::Id, false))
                    .col(alias_col(backend, AliasRecords::Alias))
                    .col(
                        ColumnDef::new(AliasRecords::Target)
                            .string_len(24)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AliasRecords::StartsAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AliasRecords::EndsAt).big_integer().null())
                    .primary_key(
                        Index::create()
                            .name("pk_alias_records")
                            .col(AliasRecords::Id),
                    )
                    .check(
                        Expr::col(AliasRecords::EndsAt).is_null().or(
                            Expr::col(AliasRecords::EndsAt).gt(Expr::col(AliasRecords::StartsAt)),
                        ),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AliasWriteLocks::Table)
                    .if_not_exists()
                    .col(alias_col(backend, AliasWriteLocks::Alias))
                    .col(
                        ColumnDef::new(AliasWriteLocks::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_alias_write_locks")
                            .col(AliasWriteLocks::Alias),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            ("idx_alias_records_alias", AliasRecords::Alias),
            ("idx_alias_records_target", AliasRecords::Target),
            ("idx_alias_records_starts_at", AliasRecords::StartsAt),
            ("idx_alias_records_ends_at", AliasRecords::EndsAt),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(AliasRecords::Table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_alias_records_alias_target")
                    .table(AliasRecords::Table)
                    .col(AliasRecords::Alias)
                    .col(AliasRecords::Target)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(AliasWriteLocks::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(AliasRecords::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

fn id_col(backend: DatabaseBackend, col: impl Iden, nullable: bool) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Postgres => {
            col_def.uuid();
        }
        DatabaseBackend::MySql => {
            col_def.binary_len(16);
        }
        _ => {
            col_def.string_len(36);
        }
    }
    if nullable {
        col_def.null();
    } else {
        col_def.not_null();
    }
    col_def.to_owned()
}

// MySQL cannot index an unbounded TEXT column without a prefix length.
fn alias_col(backend: DatabaseBackend, col: impl Iden) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::MySql => {
            col_def.string_len(255);
        }
        _ => {
            col_def.text();
        }
    }
    col_def.not_null();
    col_def.to_owned()
}
