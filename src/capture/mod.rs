//! 请求捕获模块
//!
//! 捕获任意入站请求，保存在有界内存缓冲和仅追加的日志文件中，并提供查询和清空接口

pub mod codec;
pub mod durable_log;
pub mod error;
pub mod model;
pub mod recent;
pub mod service;
mod handlers;
mod router;
mod types;

pub use durable_log::DurableLog;
pub use error::{CaptureError, ClearError, CodecError, LogError};
pub use model::{CaptureRequest, Entry};
pub use recent::RecentBuffer;
pub use router::create_capture_router;
pub use service::{CaptureService, CaptureStats};
