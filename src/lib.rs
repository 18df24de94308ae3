pub mod bits;
pub mod chvec;
pub mod config;
pub mod error;
pub mod hash;
pub mod page;
pub mod query;
pub mod reln;
pub mod tuple;

pub use config::RelnConfig;
pub use error::{Error, Result};
pub use query::Query;
pub use reln::Relation;
pub use tuple::{Pattern, Tuple};
