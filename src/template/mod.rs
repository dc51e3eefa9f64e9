//! Template compilation: printf-like directives to `$N` SQL plus wire parameters.

mod compiler;
mod param;

pub use compiler::{compile, CompiledQuery, Params, DEFAULT_QUERY_CAPACITY, MAX_PARAMS};
pub use param::{Param, ParamFormat, ParamKind};
