// query/mod.rs - 整形指令
//! 列 / 过滤 / 关联指令的解析与应用

mod parser;
pub mod columns;
pub mod filter;
pub mod relations;
pub mod types;

pub use columns::*;
pub use filter::*;
pub use parser::*;
pub use relations::*;
pub use types::*;
