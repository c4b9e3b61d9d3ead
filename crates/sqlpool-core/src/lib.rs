//! sqlpool core - contracts shared by the pool and its database drivers
//!
//! This crate defines everything the pool needs from the outside world:
//!
//! - `Driver` / `RawConnection` - the database client collaborator
//! - `Statement`, `format`, `escape` - the SQL formatting collaborator
//! - `Value`, `Row`, `QueryResult` - query results
//! - `PoolError` - the error type surfaced to pool callers

mod driver;
mod error;
mod statement;
mod types;

pub use driver::*;
pub use error::*;
pub use statement::*;
pub use types::*;
