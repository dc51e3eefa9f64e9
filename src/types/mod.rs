mod arg;
mod reply;

pub use arg::{Arg, TrustedSql};
pub use reply::{oid, ColumnDesc, Reply, ReplyStatus};
