use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::ConnectionConfig;
use crate::drivers::TokioPostgresDriver;
use crate::error::{PgFmtError, Result};
use crate::notice::NoticeFilter;
use crate::traits::{DatabaseDriver, DriverSession};

/// Everything guarded by the connection lock.
pub(crate) struct ConnState {
    pub(crate) session: Option<Box<dyn DriverSession>>,
    /// SQL of the query in flight
    pub(crate) scratch: String,
    /// Set while a `QueryResult` is outstanding
    pub(crate) in_flight: bool,
}

/// A single long-lived database connection.
///
/// Queries on one `Connection` are fully serialized: a [`QueryResult`] holds
/// the connection lock until it is finished or dropped, and other threads
/// calling [`execute`](Connection::execute) block until then. Starting a new
/// query on the same thread while a result is still open fails with
/// [`PgFmtError::ProtocolViolation`].
///
/// Creating a connection does no network I/O. The session is opened on the
/// first query and reopened after the server goes away.
///
/// # Example
/// ```ignore
/// let conn = Connection::postgres(ConnectionConfig::new("gateway", "gw"))?;
/// let result = conn.execute("SELECT name FROM gateways WHERE gw_id = %u", &args![7u32])?;
/// for row in 0..result.row_count() {
///     println!("{}", result.field_string(row, "name")?);
/// }
/// result.finish();
/// ```
///
/// [`QueryResult`]: crate::QueryResult
pub struct Connection {
    driver: Arc<dyn DatabaseDriver>,
    pub(crate) config: ConnectionConfig,
    conninfo: Option<String>,
    notices: NoticeFilter,
    keep_trying: AtomicBool,
    shutdown: CancellationToken,
    state: ReentrantMutex<RefCell<ConnState>>,
}

impl Connection {
    /// Create a connection that talks through a custom driver.
    /// Useful for testing or using alternative database drivers.
    pub fn new(config: ConnectionConfig, driver: Arc<dyn DatabaseDriver>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            driver,
            conninfo: config.conninfo(),
            notices: NoticeFilter::new(config.notices),
            keep_trying: AtomicBool::new(config.keep_trying),
            shutdown: CancellationToken::new(),
            state: ReentrantMutex::new(RefCell::new(ConnState {
                session: None,
                scratch: String::with_capacity(config.query_capacity),
                in_flight: false,
            })),
            config,
        })
    }

    /// Create a connection backed by `tokio-postgres`.
    pub fn postgres(config: ConnectionConfig) -> Result<Self> {
        let driver = TokioPostgresDriver::new()?;
        Self::new(config, Arc::new(driver))
    }

    /// Stop indefinite reconnect loops once `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn dbname(&self) -> Option<&str> {
        self.config.dbname.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.config.user.as_deref()
    }

    /// Show or hide plain `NOTICE` messages from the server.
    /// Returns the previous setting.
    pub fn set_notices(&self, notices: bool) -> bool {
        self.notices.set_enabled(notices)
    }

    /// Retry connecting without limit instead of giving up after
    /// `retry.max_attempts`. Returns the previous setting.
    pub fn set_keep_trying(&self, keep_trying: bool) -> bool {
        self.keep_trying.swap(keep_trying, Ordering::Relaxed)
    }

    pub fn keep_trying(&self) -> bool {
        self.keep_trying.load(Ordering::Relaxed)
    }

    /// Blocks while another thread has a query in flight.
    pub fn is_connected(&self) -> bool {
        let guard = self.lock();
        let connected = guard.borrow().session.is_some();
        connected
    }

    /// Drop the current session, if any, and connect again.
    pub fn reconnect(&self) -> Result<()> {
        let guard = self.lock();
        let mut state = guard.borrow_mut();
        if state.in_flight {
            return Err(PgFmtError::ProtocolViolation {
                open: state.scratch.clone(),
                template: "<reconnect>".to_string(),
            });
        }
        state.session = None;
        state.session = Some(self.open_session()?);
        Ok(())
    }

    /// Disconnect and release the connection.
    pub fn close(self) {
        debug!("Closing connection to {:?}", self.conninfo);
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<ConnState>> {
        self.state.lock()
    }

    /// Open a session, applying the retry policy. Runs with the lock held.
    pub(crate) fn open_session(&self) -> Result<Box<dyn DriverSession>> {
        let Some(conninfo) = self.conninfo.as_deref() else {
            error!("No connection information available, thus can't connect");
            return Err(PgFmtError::ConnectionFailed(
                "no connection information available".to_string(),
            ));
        };

        let policy = &self.config.retry;
        if self.keep_trying() {
            debug!("Connecting (keep trying)");
        } else {
            debug!("Connecting (max tries = {})", policy.max_attempts);
        }

        let mut attempt = 0u32;
        let mut last_error = String::new();
        loop {
            attempt += 1;
            debug!("Connecting to: {}", conninfo);
            match self.driver.connect(conninfo, self.notices.clone()) {
                Ok(session) => {
                    debug!("Connecting to: {} - done", conninfo);
                    return Ok(session);
                }
                Err(e) => {
                    error!("Connection to database ({}) failed: {}", conninfo, e);
                    last_error = e.to_string();
                }
            }

            let keep_trying = self.keep_trying();
            if !keep_trying && attempt >= policy.max_attempts {
                break;
            }
            if self.shutdown.is_cancelled() {
                debug!("Stop running");
                break;
            }

            warn!(
                "Connection attempt failed, trying again (attempt {}/{}{})",
                attempt,
                policy.max_attempts,
                if keep_trying { " [keeptrying]" } else { "" }
            );
            thread::sleep(policy.backoff(attempt));
        }

        Err(PgFmtError::ConnectionFailed(format!(
            "{conninfo}: gave up after {attempt} attempt(s): {last_error}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::drivers::InMemoryTestDriver;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            retry: RetryPolicy::immediate(3),
            ..ConnectionConfig::new("db", "me")
        }
    }

    #[test]
    fn test_new_does_not_connect() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let conn = Connection::new(config(), driver.clone()).unwrap();

        assert!(!conn.is_connected());
        assert_eq!(driver.connect_attempts(), 0);
        assert_eq!(conn.dbname(), Some("db"));
        assert_eq!(conn.user(), Some("me"));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let bad = ConnectionConfig {
            query_capacity: 0,
            ..config()
        };
        assert!(matches!(
            Connection::new(bad, driver),
            Err(PgFmtError::Config(_))
        ));
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let driver = Arc::new(InMemoryTestDriver::new().with_default_connect_failure("refused"));
        let conn = Connection::new(config(), driver.clone()).unwrap();

        let err = conn.reconnect().unwrap_err();
        assert!(matches!(err, PgFmtError::ConnectionFailed(_)));
        assert_eq!(driver.connect_attempts(), 3);
        assert_eq!(driver.last_conninfo().as_deref(), Some("dbname=db user=me"));
    }

    #[test]
    fn test_recovers_within_max_attempts() {
        let driver = Arc::new(
            InMemoryTestDriver::new()
                .with_connect_failure("refused")
                .with_connect_failure("refused"),
        );
        let conn = Connection::new(config(), driver.clone()).unwrap();

        conn.reconnect().unwrap();
        assert!(conn.is_connected());
        assert_eq!(driver.connect_attempts(), 3);
    }

    #[test]
    fn test_keep_trying_stops_on_shutdown() {
        let driver = Arc::new(InMemoryTestDriver::new().with_default_connect_failure("refused"));
        let token = CancellationToken::new();
        token.cancel();
        let conn = Connection::new(config(), driver.clone())
            .unwrap()
            .with_shutdown(token);
        assert!(!conn.set_keep_trying(true));

        assert!(conn.reconnect().is_err());
        assert_eq!(driver.connect_attempts(), 1);
    }

    #[test]
    fn test_keep_trying_goes_past_max_attempts() {
        let mut driver = InMemoryTestDriver::new();
        for _ in 0..5 {
            driver = driver.with_connect_failure("refused");
        }
        let driver = Arc::new(driver);
        let conn = Connection::new(config(), driver.clone()).unwrap();
        conn.set_keep_trying(true);

        conn.reconnect().unwrap();
        assert_eq!(driver.connect_attempts(), 6);
        assert!(conn.set_keep_trying(false));
    }

    #[test]
    fn test_missing_conninfo_fails_fast() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let conn = Connection::new(
            ConnectionConfig {
                retry: RetryPolicy::immediate(3),
                ..ConnectionConfig::default()
            },
            driver.clone(),
        )
        .unwrap();

        assert!(matches!(
            conn.reconnect(),
            Err(PgFmtError::ConnectionFailed(_))
        ));
        assert_eq!(driver.connect_attempts(), 0);
    }

    #[test]
    fn test_set_notices_reaches_session_filter() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let conn = Connection::new(config(), driver.clone()).unwrap();
        conn.reconnect().unwrap();

        let filter = driver.last_notice_filter().unwrap();
        assert!(filter.accepts("NOTICE"));
        assert!(conn.set_notices(false));
        assert!(!filter.accepts("NOTICE"));
    }
}
