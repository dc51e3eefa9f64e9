use std::panic::Location;

use tracing::{error, warn};

use crate::connection::{ConnState, Connection};
use crate::error::{PgFmtError, Result, UNIQUE_VIOLATION};
use crate::result::QueryResult;
use crate::template::{compile, CompiledQuery, Param};
use crate::types::{Arg, Reply, ReplyStatus};

/// Sends per query, counting the resend after a dropped connection.
pub const MAX_SEND_ATTEMPTS: u32 = 2;

impl Connection {
    /// Compile `template` with `args` and run it.
    ///
    /// On success the returned [`QueryResult`] keeps the connection locked
    /// until it is finished or dropped. Errors release the lock before
    /// returning and carry the compiled SQL and server diagnostics.
    ///
    /// A transport failure, or a fatal error without SQLSTATE, drops the
    /// session and resends once on a fresh one. Every other failure is
    /// returned as is: [`PgFmtError::DuplicateKey`] for unique violations,
    /// [`PgFmtError::QueryFailed`] otherwise.
    #[track_caller]
    pub fn execute<'c>(&'c self, template: &str, args: &[Arg<'_>]) -> Result<QueryResult<'c>> {
        let caller = Location::caller();
        let guard = self.lock();

        {
            let state = guard.borrow();
            if state.in_flight {
                error!(%caller, "Query still open: {}", state.scratch);
                error!(%caller, "New query: {}", template);
                return Err(PgFmtError::ProtocolViolation {
                    open: state.scratch.clone(),
                    template: template.to_string(),
                });
            }
        }

        let CompiledQuery { sql, params } =
            match compile(template, args, self.config.query_capacity) {
                Ok(compiled) => compiled,
                Err(e) => {
                    error!(%caller, "String setup failed for {}: {}", template, e);
                    return Err(e.into());
                }
            };

        let mut state = guard.borrow_mut();
        state.scratch = sql;

        match self.send(&mut state, &params, caller) {
            Ok(reply) => {
                state.in_flight = true;
                let sql = state.scratch.clone();
                drop(state);
                Ok(QueryResult::new(guard, sql, reply))
            }
            Err(e) => {
                state.scratch.clear();
                Err(e)
            }
        }
    }

    /// Execute and immediately finish, for statements whose rows are not
    /// needed. Returns the number of rows in the reply.
    #[track_caller]
    pub fn execute_command(&self, template: &str, args: &[Arg<'_>]) -> Result<u64> {
        let result = self.execute(template, args)?;
        let rows = result.row_count() as u64;
        result.finish();
        Ok(rows)
    }

    fn send(
        &self,
        state: &mut ConnState,
        params: &[Param<'_>],
        caller: &'static Location<'static>,
    ) -> Result<Reply> {
        let mut last_failure = String::new();

        for attempt in 1..=MAX_SEND_ATTEMPTS {
            let mut session = match state.session.take() {
                Some(session) => session,
                None => self.open_session().inspect_err(|_| {
                    error!(%caller, "No connection");
                })?,
            };

            // Sessions not put back into `state` are dropped, which disconnects.
            let reply = match session.execute(&state.scratch, params) {
                Ok(reply) => reply,
                Err(e) => {
                    error!(%caller, attempt, "Query({}) - no result: {}", state.scratch, e);
                    last_failure = e.to_string();
                    continue;
                }
            };

            if reply.status.is_ok() {
                state.session = Some(session);
                return Ok(reply);
            }

            if reply.code.as_deref() == Some(UNIQUE_VIOLATION) {
                state.session = Some(session);
                warn!(%caller, "Query({}) failed: duplicate key :: {}", state.scratch, reply.message);
                return Err(PgFmtError::DuplicateKey {
                    sql: state.scratch.clone(),
                    message: reply.message,
                });
            }

            if reply.status == ReplyStatus::FatalError && reply.code.is_none() {
                warn!(%caller, attempt, "Query({}) failed, disconnecting", state.scratch);
                last_failure = reply.message;
                continue;
            }

            state.session = Some(session);
            error!(
                %caller,
                "Query({}) failed: {:?}/{} :: {}",
                state.scratch,
                reply.status,
                reply.code.as_deref().unwrap_or("<no SQLState>"),
                reply.message
            );
            return Err(PgFmtError::QueryFailed {
                sql: state.scratch.clone(),
                code: reply.code,
                message: reply.message,
            });
        }

        Err(PgFmtError::QueryFailed {
            sql: state.scratch.clone(),
            code: None,
            message: last_failure,
        })
    }
}
