//! pgfmt - printf-style PostgreSQL queries over a single blocking connection
//!
//! Templates use `%` directives instead of hand-numbered placeholders.
//! Values are bound as binary parameters, and a few trusted fragments can be
//! spliced in as text.
//!
//! # Example
//! ```ignore
//! use pgfmt::{args, Arg, Connection, ConnectionConfig};
//!
//! let conn = Connection::postgres(ConnectionConfig::new("gateway", "gw"))?;
//!
//! // INSERT INTO netblocks (gw_id, netblock, state) VALUES($1, $2, $3)
//! match conn.execute_command(
//!     "INSERT INTO netblocks (gw_id, netblock, state) VALUES(%u, %b, %S)",
//!     &args![1u32, Arg::block("192.0.2.0/24"), "idle"],
//! ) {
//!     Err(e) if e.is_duplicate_key() => {}
//!     other => {
//!         other?;
//!     }
//! }
//!
//! let result = conn.execute(
//!     "SELECT gw_id, netblock, state FROM netblocks ORDER BY %s",
//!     &args![Arg::raw("netblock DESC")],
//! )?;
//! for row in 0..result.row_count() {
//!     let gw_id = result.field_u32(row, "gw_id")?;
//!     let state = result.field_enum_text(row, "state")?;
//! }
//! result.finish();
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod schema;
pub mod template;
pub mod traits;
pub mod types;

mod connection;
mod notice;
mod result;

// Re-export main types for convenient access
pub use config::{ConnectionConfig, RetryPolicy};
pub use connection::Connection;
pub use error::{CompileError, PgFmtError, Result};
pub use notice::NoticeFilter;
pub use result::QueryResult;
pub use schema::{Schema, SchemaObject};
pub use traits::{DatabaseDriver, DriverSession};
pub use types::{oid, Arg, ColumnDesc, Reply, ReplyStatus, TrustedSql};

pub use tokio_util::sync::CancellationToken;
