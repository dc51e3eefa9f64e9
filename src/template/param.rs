use std::borrow::Cow;

use crate::types::oid::{self, Oid};
use crate::types::Arg;

/// Semantic type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int32,
    Int64,
    Text,
    /// `inet`, sent as text and cast by the server
    Address,
    /// `cidr`, sent as text and cast by the server
    Block,
}

impl ParamKind {
    pub fn type_oid(self) -> Oid {
        match self {
            ParamKind::Int32 => oid::INT4,
            ParamKind::Int64 => oid::INT8,
            ParamKind::Text => oid::TEXT,
            ParamKind::Address => oid::INET,
            ParamKind::Block => oid::CIDR,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamKind::Int32 => "u32",
            ParamKind::Int64 => "u64",
            ParamKind::Text => "text",
            ParamKind::Address => "address",
            ParamKind::Block => "block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamFormat {
    Text,
    Binary,
}

/// A parameter ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param<'a> {
    kind: ParamKind,
    format: ParamFormat,
    value: Cow<'a, [u8]>,
}

impl<'a> Param<'a> {
    pub fn int32(value: u32) -> Self {
        Self {
            kind: ParamKind::Int32,
            format: ParamFormat::Binary,
            value: Cow::Owned(value.to_be_bytes().to_vec()),
        }
    }

    pub fn int64(value: u64) -> Self {
        Self {
            kind: ParamKind::Int64,
            format: ParamFormat::Binary,
            value: Cow::Owned(value.to_be_bytes().to_vec()),
        }
    }

    /// Text-format parameter of the given kind; no byte order conversion.
    pub fn text(kind: ParamKind, value: &'a str) -> Self {
        Self {
            kind,
            format: ParamFormat::Text,
            value: Cow::Borrowed(value.as_bytes()),
        }
    }

    /// Encodes `arg` as a parameter of `kind`.
    /// Returns `None` if the argument cannot be bound as that kind.
    pub fn encode(kind: ParamKind, arg: &'a Arg<'_>) -> Option<Self> {
        match (kind, arg) {
            (ParamKind::Int32, Arg::U32(v)) => Some(Self::int32(*v)),
            (ParamKind::Int64, Arg::U64(v)) => Some(Self::int64(*v)),
            (ParamKind::Text, Arg::Text(s))
            | (ParamKind::Address, Arg::Address(s))
            | (ParamKind::Block, Arg::Block(s)) => Some(Self::text(kind, s)),
            _ => None,
        }
    }

    /// Copy of this parameter that owns its bytes.
    pub fn into_owned(self) -> Param<'static> {
        Param {
            kind: self.kind,
            format: self.format,
            value: Cow::Owned(self.value.into_owned()),
        }
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn format(&self) -> ParamFormat {
        self.format
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Length announced on the wire: the integer width for binary parameters,
    /// zero for text ones, which are sent NUL-terminated.
    pub fn wire_len(&self) -> usize {
        match self.format {
            ParamFormat::Binary => self.value.len(),
            ParamFormat::Text => 0,
        }
    }
}
