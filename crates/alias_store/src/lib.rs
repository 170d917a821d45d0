pub mod config;
pub mod datastore;
mod db;
pub mod migration;
pub mod store;

pub use aliasdb_core::*;
pub use config::{AliasDbConfig, DatabaseConfig, PoolConfig};
pub use datastore::{default_sqlite_path, load_or_init_config, open_store};
pub use store::{AliasStore, BackendCapabilities};
