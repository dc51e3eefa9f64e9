//! Driver implementations: `tokio-postgres` for real servers and a scripted
//! in-memory driver for tests.

mod tokio_postgres;

pub use self::in_memory_test::{InMemoryTestDriver, InMemoryTestResponseBuilder, RecordedQuery};
pub use self::tokio_postgres::TokioPostgresDriver;
