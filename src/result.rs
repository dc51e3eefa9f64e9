use std::cell::RefCell;
use std::panic::Location;

use parking_lot::ReentrantMutexGuard;
use tracing::error;

use crate::connection::ConnState;
use crate::error::{PgFmtError, Result};
use crate::types::oid::{self, Oid};
use crate::types::{ColumnDesc, Reply, ReplyStatus};

/// Reply to a successful query, with typed accessors.
///
/// Holds the connection lock. Call [`finish`](QueryResult::finish) (or drop
/// it) before running the next query on the same connection.
pub struct QueryResult<'c> {
    guard: ReentrantMutexGuard<'c, RefCell<ConnState>>,
    sql: String,
    reply: Reply,
}

impl<'c> QueryResult<'c> {
    pub(crate) fn new(
        guard: ReentrantMutexGuard<'c, RefCell<ConnState>>,
        sql: String,
        reply: Reply,
    ) -> Self {
        Self { guard, sql, reply }
    }

    /// Release the result and the connection.
    pub fn finish(self) {
        drop(self);
    }

    pub fn status(&self) -> ReplyStatus {
        self.reply.status
    }

    /// The SQL that produced this result.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn row_count(&self) -> usize {
        self.reply.row_count()
    }

    pub fn column_count(&self) -> usize {
        self.reply.columns.len()
    }

    pub fn columns(&self) -> &[ColumnDesc] {
        &self.reply.columns
    }

    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.reply.column_index(field)
    }

    pub fn is_null(&self, row: usize, column: usize) -> Result<bool> {
        self.reply
            .cell(row, column)
            .map(|cell| cell.is_none())
            .ok_or_else(|| out_of_range(row, column, "a cell"))
    }

    /// Text of a `text` or `varchar` column.
    pub fn get_string(&self, row: usize, column: usize) -> Result<&str> {
        const EXPECTED: &str = "a string";
        let (type_oid, bytes) = self.cell(row, column, EXPECTED)?;
        match type_oid {
            oid::TEXT | oid::VARCHAR => utf8(bytes, column, EXPECTED),
            other => Err(wrong_type(column, EXPECTED, other)),
        }
    }

    /// Text of any column. Meant for enum columns, whose binary form is the
    /// label itself.
    pub fn get_enum_text(&self, row: usize, column: usize) -> Result<&str> {
        const EXPECTED: &str = "enum text";
        let (_, bytes) = self.cell(row, column, EXPECTED)?;
        utf8(bytes, column, EXPECTED)
    }

    /// An `int4`, or the low 32 bits of an `int8`.
    pub fn get_u32(&self, row: usize, column: usize) -> Result<u32> {
        const EXPECTED: &str = "a number";
        let (type_oid, bytes) = self.cell(row, column, EXPECTED)?;
        match type_oid {
            oid::INT4 => Ok(u32::from_be_bytes(fixed(bytes, column, EXPECTED)?)),
            oid::INT8 => Ok(u64::from_be_bytes(fixed(bytes, column, EXPECTED)?) as u32),
            other => Err(wrong_type(column, EXPECTED, other)),
        }
    }

    /// An `int8`, or an `int4` widened with zero high bits.
    pub fn get_u64(&self, row: usize, column: usize) -> Result<u64> {
        const EXPECTED: &str = "a number";
        let (type_oid, bytes) = self.cell(row, column, EXPECTED)?;
        match type_oid {
            oid::INT4 => Ok(u32::from_be_bytes(fixed(bytes, column, EXPECTED)?).into()),
            oid::INT8 => Ok(u64::from_be_bytes(fixed(bytes, column, EXPECTED)?)),
            other => Err(wrong_type(column, EXPECTED, other)),
        }
    }

    pub fn get_bool(&self, row: usize, column: usize) -> Result<bool> {
        const EXPECTED: &str = "a boolean";
        let (type_oid, bytes) = self.cell(row, column, EXPECTED)?;
        match type_oid {
            oid::BOOL => {
                let [b] = fixed::<1>(bytes, column, EXPECTED)?;
                Ok(b != 0)
            }
            other => Err(wrong_type(column, EXPECTED, other)),
        }
    }

    /// Column index of `field`, or [`PgFmtError::FieldMissing`] naming the caller.
    #[track_caller]
    pub fn field_index(&self, field: &str) -> Result<usize> {
        match self.reply.column_index(field) {
            Some(column) => Ok(column),
            None => {
                let caller = Location::caller();
                error!(%caller, "{} field missing, check the SQL", field);
                Err(PgFmtError::FieldMissing {
                    field: field.to_string(),
                    caller,
                })
            }
        }
    }

    #[track_caller]
    pub fn field_string(&self, row: usize, field: &str) -> Result<&str> {
        let column = self.field_index(field)?;
        self.get_string(row, column).map_err(|e| by_field(e, field))
    }

    #[track_caller]
    pub fn field_enum_text(&self, row: usize, field: &str) -> Result<&str> {
        let column = self.field_index(field)?;
        self.get_enum_text(row, column).map_err(|e| by_field(e, field))
    }

    #[track_caller]
    pub fn field_u32(&self, row: usize, field: &str) -> Result<u32> {
        let column = self.field_index(field)?;
        self.get_u32(row, column).map_err(|e| by_field(e, field))
    }

    #[track_caller]
    pub fn field_u64(&self, row: usize, field: &str) -> Result<u64> {
        let column = self.field_index(field)?;
        self.get_u64(row, column).map_err(|e| by_field(e, field))
    }

    #[track_caller]
    pub fn field_bool(&self, row: usize, field: &str) -> Result<bool> {
        let column = self.field_index(field)?;
        self.get_bool(row, column).map_err(|e| by_field(e, field))
    }

    fn cell(&self, row: usize, column: usize, expected: &'static str) -> Result<(Oid, &[u8])> {
        let type_oid = self
            .reply
            .column_type(column)
            .ok_or_else(|| out_of_range(row, column, expected))?;
        match self.reply.cell(row, column) {
            Some(Some(bytes)) => Ok((type_oid, bytes)),
            Some(None) => Err(decode_error(column, expected, "value is NULL".to_string())),
            None => Err(out_of_range(row, column, expected)),
        }
    }
}

impl Drop for QueryResult<'_> {
    fn drop(&mut self) {
        let mut state = self.guard.borrow_mut();
        state.scratch.clear();
        state.in_flight = false;
    }
}

fn decode_error(column: usize, expected: &'static str, reason: String) -> PgFmtError {
    PgFmtError::Decode {
        column: format!("column {column}"),
        expected,
        reason,
    }
}

fn wrong_type(column: usize, expected: &'static str, actual: Oid) -> PgFmtError {
    decode_error(column, expected, format!("column type has oid {actual}"))
}

fn out_of_range(row: usize, column: usize, expected: &'static str) -> PgFmtError {
    decode_error(
        column,
        expected,
        format!("row {row} column {column} out of range"),
    )
}

fn utf8<'a>(bytes: &'a [u8], column: usize, expected: &'static str) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| decode_error(column, expected, e.to_string()))
}

fn fixed<const N: usize>(bytes: &[u8], column: usize, expected: &'static str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        decode_error(
            column,
            expected,
            format!("{} bytes where {} were expected", bytes.len(), N),
        )
    })
}

fn by_field(err: PgFmtError, field: &str) -> PgFmtError {
    match err {
        PgFmtError::Decode {
            expected, reason, ..
        } => {
            error!("{} field is not {}: {}", field, expected, reason);
            PgFmtError::Decode {
                column: format!("{field} field"),
                expected,
                reason,
            }
        }
        other => other,
    }
}
