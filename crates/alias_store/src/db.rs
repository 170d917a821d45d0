use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum AliasRecords {
    Table,
    Id,
    Alias,
    Target,
    StartsAt,
    EndsAt,
}

#[derive(Iden, Clone, Copy)]
pub enum AliasWriteLocks {
    Table,
    Alias,
    Version,
}
