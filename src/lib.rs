//! hookcatch：请求捕获服务
//!
//! 接收任意 HTTP 请求并记录为结构化日志，支持查看最新记录、全部记录和清空日志。

pub mod capture;
pub mod common;
pub mod model;
