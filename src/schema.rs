//! Dropping and recreating a fixed set of types and tables.

use tracing::{error, info};

use crate::connection::Connection;
use crate::error::Result;
use crate::types::Arg;

/// A named database object and the statement that creates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject<'a> {
    pub name: &'a str,
    /// Run as a template, so a literal `%` must not appear in it
    pub create_sql: &'a str,
}

impl<'a> SchemaObject<'a> {
    pub fn new(name: &'a str, create_sql: &'a str) -> Self {
        Self { name, create_sql }
    }
}

/// Types and tables owned by an application.
///
/// Object names are spliced into `DROP` statements verbatim and must be
/// trusted identifiers.
#[derive(Debug, Clone, Default)]
pub struct Schema<'a> {
    pub types: Vec<SchemaObject<'a>>,
    pub tables: Vec<SchemaObject<'a>>,
}

impl<'a> Schema<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, name: &'a str, create_sql: &'a str) -> Self {
        self.types.push(SchemaObject::new(name, create_sql));
        self
    }

    pub fn with_table(mut self, name: &'a str, create_sql: &'a str) -> Self {
        self.tables.push(SchemaObject::new(name, create_sql));
        self
    }

    /// Drop every table, then every type, then create the types followed by
    /// the tables. Stops at the first failing statement. All existing data in
    /// these tables is lost.
    pub fn recreate(&self, conn: &Connection) -> Result<()> {
        for table in &self.tables {
            conn.execute_command("DROP TABLE IF EXISTS %s CASCADE", &[Arg::raw(table.name)])
                .inspect_err(|_| error!("Failure in dropping table '{}'", table.name))?;
        }

        for ty in &self.types {
            conn.execute_command("DROP TYPE IF EXISTS %s CASCADE", &[Arg::raw(ty.name)])
                .inspect_err(|_| error!("Failure in dropping type '{}'", ty.name))?;
        }

        for ty in &self.types {
            conn.execute_command(ty.create_sql, &[])
                .inspect_err(|_| error!("Could not create type '{}'", ty.name))?;
        }

        for table in &self.tables {
            conn.execute_command(table.create_sql, &[])
                .inspect_err(|_| error!("Could not create table '{}'", table.name))?;
        }

        info!("Database tables are now ready for use");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ConnectionConfig, RetryPolicy};
    use crate::drivers::InMemoryTestDriver;
    use crate::types::{Reply, ReplyStatus};
    use crate::PgFmtError;

    fn schema() -> Schema<'static> {
        Schema::new()
            .with_type(
                "nb_state",
                "CREATE TYPE nb_state AS ENUM ('idle', 'busy')",
            )
            .with_table("gateways", "CREATE TABLE gateways (gw_id INTEGER PRIMARY KEY)")
            .with_table(
                "netblocks",
                "CREATE TABLE netblocks (gw_id INTEGER, netblock CIDR, state nb_state)",
            )
    }

    fn connection(driver: Arc<InMemoryTestDriver>) -> Connection {
        let config = ConnectionConfig {
            retry: RetryPolicy::immediate(1),
            ..ConnectionConfig::new("db", "me")
        };
        Connection::new(config, driver).unwrap()
    }

    #[test]
    fn test_recreate_statement_order() {
        let driver = Arc::new(InMemoryTestDriver::new());
        let conn = connection(driver.clone());

        schema().recreate(&conn).unwrap();

        let sql: Vec<String> = driver
            .recorded_queries()
            .into_iter()
            .map(|q| q.sql)
            .collect();
        assert_eq!(
            sql,
            vec![
                "DROP TABLE IF EXISTS gateways CASCADE",
                "DROP TABLE IF EXISTS netblocks CASCADE",
                "DROP TYPE IF EXISTS nb_state CASCADE",
                "CREATE TYPE nb_state AS ENUM ('idle', 'busy')",
                "CREATE TABLE gateways (gw_id INTEGER PRIMARY KEY)",
                "CREATE TABLE netblocks (gw_id INTEGER, netblock CIDR, state nb_state)",
            ]
        );
    }

    #[test]
    fn test_recreate_stops_at_first_failure() {
        let driver = Arc::new(
            InMemoryTestDriver::new()
                .with_response(Reply::command_ok())
                .with_response(Reply::error(
                    ReplyStatus::FatalError,
                    Some("42501"),
                    "must be owner of table netblocks",
                )),
        );
        let conn = connection(driver.clone());

        let err = schema().recreate(&conn).unwrap_err();
        assert!(matches!(err, PgFmtError::QueryFailed { .. }));
        driver.assert_query_count(2);
    }
}
