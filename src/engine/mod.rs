// engine/mod.rs - 请求处理
//! 解析整形请求并在存储上执行

pub mod builder;
pub mod core;

pub use self::builder::*;
pub use self::core::*;
