//! 捕获子系统错误类型

use std::io;

use thiserror::Error;

use super::model::Entry;

/// 单条记录编解码错误
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("序列化记录失败: {0}")]
    Encode(#[source] serde_json::Error),

    /// 记录格式损坏，读取方应跳过该行继续
    #[error("记录已损坏: {reason}")]
    CorruptRecord { reason: String },
}

impl CodecError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            reason: reason.into(),
        }
    }
}

/// 持久化日志错误
#[derive(Debug, Error)]
pub enum LogError {
    #[error("编码记录失败: {0}")]
    Encode(#[from] CodecError),

    /// 磁盘已满、无权限、目录不存在等
    #[error("写入日志文件失败: {0}")]
    Write(#[source] io::Error),

    #[error("读取日志文件失败: {0}")]
    Read(#[source] io::Error),

    #[error("截断日志文件失败: {0}")]
    Clear(#[source] io::Error),
}

/// 捕获失败：内存缓冲已写入，但持久化失败
///
/// `entry` 仍可通过 `latest()` / `recent_snapshot()` 看到
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("请求 {} 已进入内存缓冲，但持久化失败: {source}", .entry.id)]
    Persist {
        entry: Box<Entry>,
        #[source]
        source: LogError,
    },
}

impl CaptureError {
    /// 已进入内存缓冲的记录
    pub fn entry(&self) -> &Entry {
        match self {
            Self::Persist { entry, .. } => entry,
        }
    }
}

/// 清空失败
#[derive(Debug, Error)]
pub enum ClearError {
    /// 内存缓冲已清空，但日志文件仍保留旧记录
    #[error("内存缓冲已清空，但日志文件未能截断: {source}")]
    Storage {
        #[source]
        source: LogError,
    },
}
