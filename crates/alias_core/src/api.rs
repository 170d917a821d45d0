use async_trait::async_trait;

use crate::{
    Alias, AliasId, AliasRange, AliasResult, CreateAliasInput, ReplaceAliasInput, Target,
    Timestamp,
};

#[async_trait]
pub trait AliasWriteApi {
    /// Persists a new record after the interval and overlap checks pass.
    async fn create_alias(&self, input: CreateAliasInput) -> AliasResult<Alias>;
}

#[async_trait]
pub trait AliasQueryApi {
    /// Records for `target` filtered by [`AliasRange::filter`]. Order is unspecified.
    async fn get_aliases(&self, target: &Target, range: AliasRange) -> AliasResult<Vec<Alias>>;

    async fn get_alias(&self, id: AliasId) -> AliasResult<Option<Alias>>;

    /// The record binding `alias` at instant `at`, if any.
    async fn resolve_alias(&self, alias: &str, at: Timestamp) -> AliasResult<Option<Alias>>;
}

#[async_trait]
pub trait AliasReplaceApi {
    /// Closes `input.record` at `replace_at` and opens `new_alias` for the same
    /// target from that instant, in one transaction.
    async fn replace_alias(&self, input: ReplaceAliasInput) -> AliasResult<Alias>;
}
