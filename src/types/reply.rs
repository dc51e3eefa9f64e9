/// PostgreSQL type OIDs the crate binds or decodes.
/// Values from `catalog/pg_type.h`, which is not meant for clients.
pub mod oid {
    pub type Oid = u32;

    pub const BOOL: Oid = 16;
    pub const INT8: Oid = 20;
    pub const INT4: Oid = 23;
    pub const TEXT: Oid = 25;
    pub const CIDR: Oid = 650;
    pub const INET: Oid = 869;
    pub const VARCHAR: Oid = 1043;
}

use std::borrow::Cow;

use oid::Oid;

/// Outcome of one statement as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Statement returning no rows completed.
    CommandOk,
    /// Statement returning rows completed.
    TuplesOk,
    NonfatalError,
    FatalError,
}

impl ReplyStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, ReplyStatus::CommandOk | ReplyStatus::TuplesOk)
    }
}

/// Name and type of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    pub name: String,
    pub type_oid: Oid,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            type_oid,
        }
    }
}

/// Driver-agnostic reply to one executed statement.
/// Cells hold the binary wire representation; `None` is SQL NULL.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: ReplyStatus,
    /// SQLSTATE, when the server sent one
    pub code: Option<String>,
    pub message: String,
    pub columns: Vec<ColumnDesc>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
}

impl Reply {
    pub fn command_ok() -> Self {
        Self {
            status: ReplyStatus::CommandOk,
            code: None,
            message: String::new(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn tuples(columns: Vec<ColumnDesc>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        Self {
            status: ReplyStatus::TuplesOk,
            code: None,
            message: String::new(),
            columns,
            rows,
        }
    }

    /// A failed statement. `code` is the SQLSTATE, if any.
    pub fn error(status: ReplyStatus, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            message: message.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Index of the first column with the given name.
    ///
    /// Names follow SQL identifier rules: unquoted parts are folded to lower
    /// case, double-quoted parts are kept as written (`""` for a literal
    /// quote). `"ID"` with quotes finds a column named `ID`, plain `ID`
    /// finds `id`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        if name.is_empty() {
            return None;
        }
        let name = fold_field_name(name);
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_type(&self, column: usize) -> Option<Oid> {
        self.columns.get(column).map(|c| c.type_oid)
    }

    /// Raw bytes of a cell. Outer `None` when out of range, inner `None` for NULL.
    pub fn cell(&self, row: usize, column: usize) -> Option<Option<&[u8]>> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|c| c.as_deref())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn fold_field_name(name: &str) -> Cow<'_, str> {
    if !name.bytes().any(|b| b == b'"' || b.is_ascii_uppercase()) {
        return Cow::Borrowed(name);
    }

    let mut folded = String::with_capacity(name.len());
    let mut quoted = false;
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                folded.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if quoted => folded.push(c),
            c => folded.push(c.to_ascii_lowercase()),
        }
    }
    Cow::Owned(folded)
}
