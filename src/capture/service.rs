//! 捕获服务（公开 API）
//!
//! 协调内存缓冲、持久化日志和实时订阅者：
//! 1. 分配时间戳和 ID，构造 Entry
//! 2. 写入 RecentBuffer（不会失败）
//! 3. 追加到 DurableLog（可能失败，失败时记录仍留在内存中）
//! 4. 两者都成功后广播给订阅者
//!
//! 捕获与清空在同一把锁下串行执行，清空因此是一个原子切换点。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::durable_log::DurableLog;
use super::error::{CaptureError, ClearError, LogError};
use super::model::{CaptureRequest, Entry};
use super::recent::RecentBuffer;

/// 订阅通道容量，订阅者落后超过此数量时丢弃旧记录
const SUBSCRIBER_CHANNEL_SIZE: usize = 256;

/// 服务状态统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub buffered: usize,
    pub capacity: usize,
    pub subscribers: usize,
    pub log_path: PathBuf,
    pub log_size_bytes: u64,
}

pub struct CaptureService {
    buffer: RecentBuffer,
    log: DurableLog,
    /// 捕获/清空的串行化点，保存上一次分配的时间戳
    sequencer: Mutex<Option<DateTime<Utc>>>,
    subscribers: broadcast::Sender<Entry>,
}

impl CaptureService {
    pub fn new(log_path: impl Into<PathBuf>, buffer_capacity: usize) -> Self {
        Self::with_parts(
            RecentBuffer::new(buffer_capacity),
            DurableLog::open(log_path),
        )
    }

    pub fn with_parts(buffer: RecentBuffer, log: DurableLog) -> Self {
        let (subscribers, _) = broadcast::channel(SUBSCRIBER_CHANNEL_SIZE);
        Self {
            buffer,
            log,
            sequencer: Mutex::new(None),
            subscribers,
        }
    }

    /// 从持久化日志恢复内存缓冲（启动时调用）
    ///
    /// 载入最新的 `capacity` 条记录，并以最后一条记录的时间作为时间戳下限。
    /// 返回载入的条数
    pub fn restore(&self) -> Result<usize, LogError> {
        let mut last = self.sequencer.lock();

        let history = self.log.read_tail(self.buffer.capacity())?;

        self.buffer.clear();
        for entry in history {
            *last = (*last).max(Some(entry.timestamp));
            self.buffer.push(entry);
        }

        let restored = self.buffer.len();
        tracing::info!(restored, path = %self.log.path().display(), "已从日志恢复最近记录");
        Ok(restored)
    }

    /// 捕获一次请求
    ///
    /// 持久化失败时返回 `CaptureError::Persist`，但记录已经可以通过
    /// `latest()` / `recent_snapshot()` 读到
    pub fn capture(&self, request: CaptureRequest) -> Result<Entry, CaptureError> {
        let mut last = self.sequencer.lock();

        // 时钟回拨时沿用上一次的时间戳，保证追加顺序上时间不减
        let now = Utc::now();
        let timestamp = match *last {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        *last = Some(timestamp);

        let entry = Entry::new(Uuid::new_v4().to_string(), timestamp, request);
        self.buffer.push(entry.clone());

        if let Err(source) = self.log.append(&entry) {
            tracing::error!(
                id = %entry.id,
                method = %entry.method,
                path = %entry.path,
                "持久化捕获记录失败: {}",
                source
            );
            return Err(CaptureError::Persist {
                entry: Box::new(entry),
                source,
            });
        }

        // 没有订阅者时 send 返回错误，直接忽略
        let _ = self.subscribers.send(entry.clone());

        tracing::debug!(
            id = %entry.id,
            method = %entry.method,
            path = %entry.path,
            params = entry.body_or_query.len(),
            "已捕获请求"
        );
        Ok(entry)
    }

    /// 最近一条记录
    pub fn latest(&self) -> Option<Entry> {
        self.buffer.latest()
    }

    /// 全部历史（来自持久化日志）
    pub fn all(&self) -> Result<Vec<Entry>, LogError> {
        self.log.read_all()
    }

    /// 内存中最近的记录（按时间顺序）
    pub fn recent_snapshot(&self) -> Vec<Entry> {
        self.buffer.snapshot()
    }

    /// 原始日志内容
    pub fn download(&self) -> Result<Vec<u8>, LogError> {
        self.log.read_raw()
    }

    /// 清空内存缓冲和持久化日志
    ///
    /// 日志截断失败时内存缓冲已经清空，返回 `ClearError::Storage`
    pub fn clear(&self) -> Result<(), ClearError> {
        let _cutover = self.sequencer.lock();

        let dropped = self.buffer.len();
        self.buffer.clear();

        if let Err(source) = self.log.clear() {
            tracing::error!(
                path = %self.log.path().display(),
                "内存缓冲已清空，但日志文件截断失败: {}",
                source
            );
            return Err(ClearError::Storage { source });
        }

        tracing::info!(dropped, path = %self.log.path().display(), "捕获记录已清空");
        Ok(())
    }

    /// 订阅新捕获的记录
    ///
    /// 只会收到订阅之后、且两个存储都写入成功的记录
    pub fn subscribe(&self) -> broadcast::Receiver<Entry> {
        self.subscribers.subscribe()
    }

    /// 以 Stream 形式订阅新捕获的记录
    ///
    /// 不借用服务本身，服务释放后 Stream 结束
    pub fn subscribe_stream(&self) -> impl Stream<Item = Entry> + Send + use<> {
        entry_stream(self.subscribers.subscribe())
    }

    /// 内存缓冲容量
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            buffered: self.buffer.len(),
            capacity: self.buffer.capacity(),
            subscribers: self.subscribers.receiver_count(),
            log_path: self.log.path().to_path_buf(),
            log_size_bytes: self.log.size_bytes(),
        }
    }
}

/// 将订阅转换为 Stream
///
/// 订阅者落后时跳过丢失的记录继续读取，服务关闭后结束
fn entry_stream(receiver: broadcast::Receiver<Entry>) -> impl Stream<Item = Entry> {
    futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(entry) => return Some((entry, receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "订阅者处理过慢，已跳过部分记录");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}
