pub mod alias;
pub mod api;
pub mod error;
pub mod ids;
pub mod time;

pub use alias::*;
pub use api::*;
pub use error::{AliasError, AliasResult};
pub use ids::*;
pub use time::*;
