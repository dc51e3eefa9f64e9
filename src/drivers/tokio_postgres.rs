use std::error::Error;
use std::sync::Arc;

use bytes::BytesMut;
use futures_util::{stream, StreamExt};
use tokio::runtime::{Builder, Runtime};
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{AsyncMessage, Client, NoTls, Statement};
use tracing::warn;

use crate::error::{PgFmtError, Result};
use crate::notice::NoticeFilter;
use crate::template::{Param, ParamFormat};
use crate::traits::{DatabaseDriver, DriverSession};
use crate::types::{ColumnDesc, Reply, ReplyStatus};

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Calls block the current thread; the protocol runs on a private
/// current-thread runtime.
pub struct TokioPostgresDriver {
    runtime: Arc<Runtime>,
}

impl TokioPostgresDriver {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PgFmtError::ConnectionFailed(format!("cannot start runtime: {e}")))?;
        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl DatabaseDriver for TokioPostgresDriver {
    fn connect(&self, conninfo: &str, notices: NoticeFilter) -> Result<Box<dyn DriverSession>> {
        let (client, mut connection) = self
            .runtime
            .block_on(tokio_postgres::connect(conninfo, NoTls))
            .map_err(|e| PgFmtError::ConnectionFailed(e.to_string()))?;

        // Drive the connection and route server notices through the filter
        self.runtime.spawn(async move {
            let mut messages = Box::pin(stream::poll_fn(move |cx| connection.poll_message(cx)));
            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notice(notice)) => {
                        notices.emit(notice.severity(), notice.message())
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("PostgreSQL connection error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::new(TokioPostgresSession {
            runtime: Arc::clone(&self.runtime),
            client,
        }))
    }
}

struct TokioPostgresSession {
    runtime: Arc<Runtime>,
    client: Client,
}

impl TokioPostgresSession {
    async fn run(&self, sql: &str, params: &[Param<'_>]) -> std::result::Result<Reply, tokio_postgres::Error> {
        let types: Vec<Type> = params.iter().map(param_type).collect();
        let statement: Statement = self.client.prepare_typed(sql, &types).await?;

        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        let rows = self.client.query(&statement, &param_refs).await?;

        if statement.columns().is_empty() {
            return Ok(Reply::command_ok());
        }

        let columns = statement
            .columns()
            .iter()
            .map(|c| ColumnDesc::new(c.name(), c.type_().oid()))
            .collect();

        let mut result_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                let cell: RawCell = row.try_get(i)?;
                cells.push(cell.0);
            }
            result_rows.push(cells);
        }

        Ok(Reply::tuples(columns, result_rows))
    }
}

impl DriverSession for TokioPostgresSession {
    fn execute(&mut self, sql: &str, params: &[Param<'_>]) -> Result<Reply> {
        if self.client.is_closed() {
            return Err(PgFmtError::Transport("connection closed".to_string()));
        }

        let runtime = Arc::clone(&self.runtime);
        match runtime.block_on(self.run(sql, params)) {
            Ok(reply) => Ok(reply),
            Err(e) => match e.as_db_error() {
                Some(db) => Ok(Reply::error(
                    ReplyStatus::FatalError,
                    Some(db.code().code()),
                    db.message(),
                )),
                None if e.is_closed() || is_io_failure(e.source()) => {
                    Err(PgFmtError::Transport(e.to_string()))
                }
                // Client-side failures, e.g. a parameter count mismatch
                None => Ok(Reply::error(
                    ReplyStatus::NonfatalError,
                    None,
                    e.to_string(),
                )),
            },
        }
    }
}

/// True when the failure came from the socket rather than the statement.
fn is_io_failure(source: Option<&(dyn Error + 'static)>) -> bool {
    let mut source = source;
    while let Some(e) = source {
        if e.is::<std::io::Error>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn param_type(param: &Param<'_>) -> Type {
    Type::from_oid(param.kind().type_oid()).unwrap_or(Type::UNKNOWN)
}

/// Sends the pre-encoded bytes untouched, in the format chosen by the encoder.
impl ToSql for Param<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        out.extend_from_slice(self.value());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> tokio_postgres::types::Format {
        match self.format() {
            ParamFormat::Binary => tokio_postgres::types::Format::Binary,
            ParamFormat::Text => tokio_postgres::types::Format::Text,
        }
    }

    to_sql_checked!();
}

/// A cell's binary representation, whatever its type.
struct RawCell(Option<Vec<u8>>);

impl<'a> FromSql<'a> for RawCell {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawCell(Some(raw.to_vec())))
    }

    fn from_sql_null(_ty: &Type) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawCell(None))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
