//! procfs parsing and the process table source.

pub mod parser;
mod source;

pub use parser::{
    CpuStat, GlobalStat, ParseError, ProcIo, ProcStat, ProcStatus, UserResolver, parse_global_stat,
    parse_passwd,
};
pub use source::{CLK_TCK, CollectError, ProcIter, ProcSource};
