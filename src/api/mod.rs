// api/mod.rs - 请求与响应类型
//! 整形请求的提取与响应序列化

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;
