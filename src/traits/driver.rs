use crate::error::Result;
use crate::notice::NoticeFilter;
use crate::template::Param;
use crate::types::Reply;

/// Trait for database driver implementations.
/// Drivers are responsible for:
/// - Opening sessions from a connection string
/// - Putting pre-encoded parameters on the wire with their type and format
/// - Returning replies with binary cells and column type OIDs
pub trait DatabaseDriver: Send + Sync {
    /// Open a new session. `notices` receives server notices for as long as
    /// the session lives.
    fn connect(&self, conninfo: &str, notices: NoticeFilter) -> Result<Box<dyn DriverSession>>;
}

/// One live connection to the server. Dropping it disconnects.
pub trait DriverSession: Send {
    /// Execute one statement with `$N` placeholders, requesting binary results.
    ///
    /// Server-side failures come back as a [`Reply`] carrying the error status.
    /// `Err(PgFmtError::Transport)` means no reply was produced at all.
    ///
    /// [`PgFmtError::Transport`]: crate::PgFmtError::Transport
    fn execute(&mut self, sql: &str, params: &[Param<'_>]) -> Result<Reply>;
}
