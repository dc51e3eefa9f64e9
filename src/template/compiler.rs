use smallvec::SmallVec;

use crate::error::CompileError;
use crate::template::param::{Param, ParamKind};
use crate::types::Arg;

/// Maximum number of bound parameters in one statement.
pub const MAX_PARAMS: usize = 16;

/// Default size of the per-connection query buffer, in bytes.
pub const DEFAULT_QUERY_CAPACITY: usize = 8192;

pub type Params<'a> = SmallVec<[Param<'a>; MAX_PARAMS]>;

/// SQL with `$N` placeholders and the parameters they refer to, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery<'a> {
    pub sql: String,
    pub params: Params<'a>,
}

/// Compiles a printf-like template into positional SQL.
///
/// Directives:
///
/// | | argument | |
/// |---|---|---|
/// | `%u` | [`Arg::U32`] | `$N`, int4, binary |
/// | `%U` | [`Arg::U64`] | `$N`, int8, binary |
/// | `%S` | [`Arg::Text`] | `$N`, text |
/// | `%a` | [`Arg::Address`] | `$N`, inet, sent as text |
/// | `%b` | [`Arg::Block`] | `$N`, cidr, sent as text |
/// | `%s` | [`Arg::Raw`] | copied into the SQL as is |
/// | `%t` | [`Arg::Quoted`] | copied into the SQL between single quotes |
///
/// The SQL must stay shorter than `capacity` bytes and bind at most
/// [`MAX_PARAMS`] parameters. Every argument must be consumed, and the SQL
/// must not be blank.
///
/// ```
/// use pgfmt::args;
/// use pgfmt::template::{compile, DEFAULT_QUERY_CAPACITY};
///
/// let args = args![7u32, "alice"];
/// let q = compile("SELECT id FROM t WHERE gw=%u AND name=%S", &args, DEFAULT_QUERY_CAPACITY)?;
/// assert_eq!(q.sql, "SELECT id FROM t WHERE gw=$1 AND name=$2");
/// assert_eq!(q.params.len(), 2);
/// # Ok::<(), pgfmt::CompileError>(())
/// ```
pub fn compile<'a>(
    template: &str,
    args: &'a [Arg<'_>],
    capacity: usize,
) -> Result<CompiledQuery<'a>, CompileError> {
    let mut out = Output::new(template.len(), capacity);
    let mut params = Params::new();
    let mut args = args.iter();
    let mut chars = template.char_indices();

    while let Some((position, c)) = chars.next() {
        if c != '%' {
            out.push_char(c)?;
            continue;
        }

        let Some((_, directive)) = chars.next() else {
            return Err(CompileError::TruncatedDirective);
        };

        match directive {
            'u' | 'U' | 'S' | 'a' | 'b' => {
                let kind = bound_kind(directive);
                if params.len() >= MAX_PARAMS {
                    return Err(CompileError::TooManyParams { max: MAX_PARAMS });
                }
                let arg = args
                    .next()
                    .ok_or(CompileError::MissingArgument { directive, position })?;
                let param =
                    Param::encode(kind, arg).ok_or_else(|| CompileError::ArgumentMismatch {
                        directive,
                        position,
                        expected: kind.name(),
                        actual: arg.kind_name(),
                    })?;
                params.push(param);
                out.push_str(&format!("${}", params.len()))?;
            }
            's' | 't' => {
                let arg = args
                    .next()
                    .ok_or(CompileError::MissingArgument { directive, position })?;
                match (directive, arg) {
                    ('s', Arg::Raw(text)) => out.push_str(text.as_str())?,
                    ('t', Arg::Quoted(text)) => {
                        out.push_char('\'')?;
                        out.push_str(text.as_str())?;
                        out.push_char('\'')?;
                    }
                    _ => {
                        return Err(CompileError::ArgumentMismatch {
                            directive,
                            position,
                            expected: if directive == 's' {
                                "raw sql"
                            } else {
                                "quoted sql"
                            },
                            actual: arg.kind_name(),
                        })
                    }
                }
            }
            _ => return Err(CompileError::UnknownDirective { directive, position }),
        }
    }

    let count = args.len();
    if count > 0 {
        return Err(CompileError::UnusedArguments { count });
    }

    if out.sql.trim().is_empty() {
        return Err(CompileError::EmptyQuery);
    }

    Ok(CompiledQuery {
        sql: out.sql,
        params,
    })
}

fn bound_kind(directive: char) -> ParamKind {
    match directive {
        'u' => ParamKind::Int32,
        'U' => ParamKind::Int64,
        'a' => ParamKind::Address,
        'b' => ParamKind::Block,
        _ => ParamKind::Text,
    }
}

/// Output text bounded like a fixed C buffer: one byte is kept for the
/// terminator, so the text is at most `capacity - 1` bytes.
struct Output {
    sql: String,
    capacity: usize,
}

impl Output {
    fn new(hint: usize, capacity: usize) -> Self {
        Self {
            sql: String::with_capacity(hint.min(capacity)),
            capacity,
        }
    }

    fn push_char(&mut self, c: char) -> Result<(), CompileError> {
        self.reserve(c.len_utf8())?;
        self.sql.push(c);
        Ok(())
    }

    fn push_str(&mut self, s: &str) -> Result<(), CompileError> {
        self.reserve(s.len())?;
        self.sql.push_str(s);
        Ok(())
    }

    fn reserve(&self, extra: usize) -> Result<(), CompileError> {
        if self.sql.len() + extra >= self.capacity {
            return Err(CompileError::QueryTooLong {
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::template::param::ParamFormat;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn compile_default<'a>(
        template: &str,
        args: &'a [Arg<'_>],
    ) -> Result<CompiledQuery<'a>, CompileError> {
        compile(template, args, DEFAULT_QUERY_CAPACITY)
    }

    #[test]
    fn test_gateway_lookup() {
        let args = args![7u32, "alice"];
        let q = compile_default("SELECT id FROM t WHERE gw=%u AND name=%S", &args).unwrap();

        assert_eq!(q.sql, "SELECT id FROM t WHERE gw=$1 AND name=$2");
        assert_eq!(q.params.len(), 2);
        assert_eq!(q.params[0].kind(), ParamKind::Int32);
        assert_eq!(q.params[0].format(), ParamFormat::Binary);
        assert_eq!(q.params[0].value(), &[0, 0, 0, 7]);
        assert_eq!(q.params[1].kind(), ParamKind::Text);
        assert_eq!(q.params[1].format(), ParamFormat::Text);
        assert_eq!(q.params[1].value(), b"alice");
    }

    #[test]
    fn test_insert_with_address() {
        let args = args![1u32, Arg::address("192.0.2.0/24"), "idle"];
        let q = compile_default(
            "INSERT INTO netblocks (gw_id, netblock, state) VALUES(%u, %a, %S)",
            &args,
        )
        .unwrap();

        assert_eq!(
            q.sql,
            "INSERT INTO netblocks (gw_id, netblock, state) VALUES($1, $2, $3)"
        );
        let kinds: Vec<_> = q.params.iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            vec![ParamKind::Int32, ParamKind::Address, ParamKind::Text]
        );
    }

    #[test]
    fn test_inline_directives_bind_nothing() {
        let args = args![Arg::quoted("idle"), Arg::raw("netblock"), Arg::raw("DESC")];
        let q = compile_default(
            "SELECT gw_id FROM netblocks WHERE state = %t ORDER BY %s %s",
            &args,
        )
        .unwrap();

        assert_eq!(
            q.sql,
            "SELECT gw_id FROM netblocks WHERE state = 'idle' ORDER BY netblock DESC"
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn test_placeholders_skip_inline_directives() {
        let args = args![Arg::raw("nb"), 5u64, Arg::block("10.0.0.0/8")];
        let q = compile_default("UPDATE %s SET id=%U WHERE b=%b", &args).unwrap();

        assert_eq!(q.sql, "UPDATE nb SET id=$1 WHERE b=$2");
        assert_eq!(q.params[1].kind(), ParamKind::Block);
    }

    #[test]
    fn test_sixteen_params_fit() {
        let template = "%u,".repeat(MAX_PARAMS);
        let args: Vec<Arg> = (0..MAX_PARAMS as u32).map(Arg::from).collect();
        let q = compile_default(&template, &args).unwrap();

        assert_eq!(q.params.len(), MAX_PARAMS);
        assert!(q.sql.ends_with("$16,"));
        for (i, p) in q.params.iter().enumerate() {
            assert_eq!(p.value(), &(i as u32).to_be_bytes());
        }
    }

    #[test]
    fn test_seventeenth_param_rejected() {
        let template = "%u,".repeat(MAX_PARAMS + 1);
        let args: Vec<Arg> = (0..=MAX_PARAMS as u32).map(Arg::from).collect();
        assert_eq!(
            compile_default(&template, &args).unwrap_err(),
            CompileError::TooManyParams { max: MAX_PARAMS }
        );
    }

    #[test]
    fn test_buffer_bound() {
        // 9 bytes of text needs a 10 byte buffer
        assert!(compile("SELECT 1;", &[], 10).is_ok());
        assert_eq!(
            compile("SELECT 1;", &[], 9).unwrap_err(),
            CompileError::QueryTooLong { capacity: 9 }
        );

        let args = args![Arg::raw("a_rather_long_table_name")];
        assert_eq!(
            compile("SELECT * FROM %s", &args, 20).unwrap_err(),
            CompileError::QueryTooLong { capacity: 20 }
        );
    }

    #[test]
    fn test_placeholder_counts_against_buffer() {
        let args = args![1u32];
        assert!(compile("x=%u", &args, 5).is_ok());
        assert!(compile("x=%u", &args, 4).is_err());
    }

    #[rstest]
    #[case("SELECT %x", CompileError::UnknownDirective { directive: 'x', position: 7 })]
    #[case("SELECT 100%%", CompileError::UnknownDirective { directive: '%', position: 10 })]
    #[case("SELECT %", CompileError::TruncatedDirective)]
    #[case("SELECT %u", CompileError::MissingArgument { directive: 'u', position: 7 })]
    fn test_malformed_templates(#[case] template: &str, #[case] expected: CompileError) {
        assert_eq!(compile_default(template, &[]).unwrap_err(), expected);
    }

    #[rstest]
    #[case("%u", Arg::U64(1), "u32", "u64")]
    #[case("%U", Arg::U32(1), "u64", "u32")]
    #[case("%S", Arg::address("::1"), "text", "address")]
    #[case("%a", Arg::block("::/0"), "address", "block")]
    #[case("%s", Arg::from("name"), "raw sql", "text")]
    #[case("%t", Arg::raw("name"), "quoted sql", "raw sql")]
    fn test_argument_mismatch(
        #[case] template: &str,
        #[case] arg: Arg<'static>,
        #[case] expected: &'static str,
        #[case] actual: &'static str,
    ) {
        let args = [arg];
        match compile_default(template, &args).unwrap_err() {
            CompileError::ArgumentMismatch {
                expected: e,
                actual: a,
                position: 0,
                ..
            } => {
                assert_eq!(e, expected);
                assert_eq!(a, actual);
            }
            other => panic!("Expected ArgumentMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_unused_arguments() {
        let args = args![1u32, 2u32];
        assert_eq!(
            compile_default("SELECT %u", &args).unwrap_err(),
            CompileError::UnusedArguments { count: 1 }
        );
    }

    #[rstest]
    #[case("", vec![])]
    #[case("  \n", vec![])]
    #[case("%s", vec![Arg::raw("")])]
    #[case(" %s ", vec![Arg::raw(" ")])]
    fn test_blank_sql_is_rejected(#[case] template: &str, #[case] args: Vec<Arg<'static>>) {
        assert_eq!(
            compile_default(template, &args).unwrap_err(),
            CompileError::EmptyQuery
        );
    }

    #[test]
    fn test_non_ascii_literal_text_is_copied() {
        let args = args!["é"];
        let q = compile_default("SELECT 'ü', %S", &args).unwrap();
        assert_eq!(q.sql, "SELECT 'ü', $1");
    }
}
