use std::path::{Path, PathBuf};

use crate::{AliasDbConfig, AliasResult, AliasStore};

const DEFAULT_DB_NAME: &str = "aliases.sqlite";

pub fn load_or_init_config(base: &Path) -> AliasResult<AliasDbConfig> {
    let default_sqlite = base.join(DEFAULT_DB_NAME);
    AliasDbConfig::load_or_init(base, &default_sqlite)
}

pub async fn open_store(base: &Path) -> AliasResult<AliasStore> {
    let config = load_or_init_config(base)?;
    AliasStore::connect(&config, base).await
}

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}
