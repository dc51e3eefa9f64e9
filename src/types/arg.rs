use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Text that may be spliced into SQL verbatim by `%s` and `%t`.
///
/// Nothing is escaped. Only wrap values that never come from user input,
/// such as table names, sort columns or enum type names fixed in code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedSql<'a>(Cow<'a, str>);

impl<'a> TrustedSql<'a> {
    pub fn new(text: impl Into<Cow<'a, str>>) -> Self {
        TrustedSql(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrustedSql<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One argument consumed by a template directive.
/// The variant must match the directive it lines up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg<'a> {
    /// `%u`
    U32(u32),
    /// `%U`
    U64(u64),
    /// `%S`
    Text(Cow<'a, str>),
    /// `%a`, an address with optional prefix length such as `192.0.2.1/32`
    Address(Cow<'a, str>),
    /// `%b`, a CIDR block such as `2001:db8::/32`
    Block(Cow<'a, str>),
    /// `%s`
    Raw(TrustedSql<'a>),
    /// `%t`
    Quoted(TrustedSql<'a>),
}

impl<'a> Arg<'a> {
    pub fn address(text: impl Into<Cow<'a, str>>) -> Self {
        Arg::Address(text.into())
    }

    pub fn block(text: impl Into<Cow<'a, str>>) -> Self {
        Arg::Block(text.into())
    }

    pub fn raw(text: impl Into<Cow<'a, str>>) -> Self {
        Arg::Raw(TrustedSql::new(text))
    }

    pub fn quoted(text: impl Into<Cow<'a, str>>) -> Self {
        Arg::Quoted(TrustedSql::new(text))
    }

    /// Short name used in compile errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Arg::U32(_) => "u32",
            Arg::U64(_) => "u64",
            Arg::Text(_) => "text",
            Arg::Address(_) => "address",
            Arg::Block(_) => "block",
            Arg::Raw(_) => "raw sql",
            Arg::Quoted(_) => "quoted sql",
        }
    }
}

impl From<u16> for Arg<'_> {
    fn from(value: u16) -> Self {
        Arg::U32(value.into())
    }
}

impl From<u32> for Arg<'_> {
    fn from(value: u32) -> Self {
        Arg::U32(value)
    }
}

impl From<u64> for Arg<'_> {
    fn from(value: u64) -> Self {
        Arg::U64(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Arg::Text(Cow::Borrowed(value))
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(value: &'a String) -> Self {
        Arg::Text(Cow::Borrowed(value.as_str()))
    }
}

impl From<String> for Arg<'_> {
    fn from(value: String) -> Self {
        Arg::Text(Cow::Owned(value))
    }
}

impl From<IpAddr> for Arg<'_> {
    fn from(value: IpAddr) -> Self {
        Arg::Address(Cow::Owned(value.to_string()))
    }
}

impl From<Ipv4Addr> for Arg<'_> {
    fn from(value: Ipv4Addr) -> Self {
        IpAddr::V4(value).into()
    }
}

impl From<Ipv6Addr> for Arg<'_> {
    fn from(value: Ipv6Addr) -> Self {
        IpAddr::V6(value).into()
    }
}

impl<'a> From<TrustedSql<'a>> for Arg<'a> {
    fn from(value: TrustedSql<'a>) -> Self {
        Arg::Raw(value)
    }
}

/// Builds an array of [`Arg`] from anything convertible into one.
///
/// ```
/// use pgfmt::{args, Arg};
///
/// let args = args![7u32, "alice", Arg::block("192.0.2.0/24")];
/// assert_eq!(args[0], Arg::U32(7));
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        [$($crate::Arg::from($arg)),*]
    };
}
