//! 持久化日志
//!
//! 仅追加的 JSON Lines 文件，是全部捕获记录的权威来源：
//! - 每次追加写入完整一行并 `sync_data` 后才返回
//! - 读取时逐行解码，跳过损坏的行
//! - 清空即截断为零长度
//! - 所有操作由同一把互斥锁串行化，追加与清空竞争时不会产生半条记录

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::codec;
use super::error::{CodecError, LogError};
use super::model::Entry;

pub struct DurableLog {
    path: PathBuf,
    /// 串行化追加、读取与清空
    lock: Mutex<()>,
}

impl DurableLog {
    /// 创建日志（不访问文件系统）
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录，落盘后返回
    pub fn append(&self, entry: &Entry) -> Result<(), LogError> {
        let record = codec::encode(entry)?;

        let _guard = self.lock.lock();
        // 每次按路径打开：文件被删除或替换后，记录写入当前路径上的文件
        let mut file = open_for_append(&self.path).map_err(LogError::Write)?;
        file.write_all(record.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(LogError::Write)
    }

    /// 按追加顺序读取全部记录
    ///
    /// 文件不存在时返回空列表；单行损坏只跳过该行
    pub fn read_all(&self) -> Result<Vec<Entry>, LogError> {
        let mut entries = Vec::new();
        self.scan(|entry| entries.push(entry))?;
        Ok(entries)
    }

    /// 读取最新的 `limit` 条记录（按追加顺序）
    ///
    /// 逐行解码，内存中最多保留 `limit` 条
    pub fn read_tail(&self, limit: usize) -> Result<Vec<Entry>, LogError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut tail = VecDeque::with_capacity(limit.min(1024));
        self.scan(|entry| {
            if tail.len() == limit {
                tail.pop_front();
            }
            tail.push_back(entry);
        })?;
        Ok(tail.into())
    }

    /// 从头逐行解码，把每条完好的记录交给 `visit`
    fn scan(&self, mut visit: impl FnMut(Entry)) -> Result<(), LogError> {
        let _guard = self.lock.lock();

        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(LogError::Read(e)),
        };

        let mut loaded = 0usize;
        let mut skipped = 0usize;
        for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = line.map_err(LogError::Read)?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let decoded = std::str::from_utf8(&line)
                .map_err(|e| CodecError::corrupt(e.to_string()))
                .and_then(codec::decode);
            match decoded {
                Ok(entry) => {
                    loaded += 1;
                    visit(entry);
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        "跳过损坏的日志记录: {}",
                        e
                    );
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(
                path = %self.path.display(),
                skipped,
                loaded,
                "读取日志时跳过了损坏的记录"
            );
        }
        Ok(())
    }

    /// 读取原始文件内容（用于下载）
    pub fn read_raw(&self) -> Result<Vec<u8>, LogError> {
        let _guard = self.lock.lock();
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(LogError::Read(e)),
        }
    }

    /// 当前文件大小（字节），文件不存在时为 0
    pub fn size_bytes(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// 截断为空文件
    pub fn clear(&self) -> Result<(), LogError> {
        let _guard = self.lock.lock();

        let file = match OpenOptions::new().write(true).truncate(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(LogError::Clear(e)),
        };
        file.sync_all().map_err(LogError::Clear)
    }
}

/// 以追加模式打开日志文件
///
/// 若文件末尾缺少换行（上次写入中断），先补一个换行，避免新记录接在残片后面
fn open_for_append(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)?;

    let len = file.metadata()?.len();
    if len > 0 {
        file.seek(SeekFrom::Start(len - 1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            tracing::warn!(path = %path.display(), "日志文件末尾存在不完整的记录");
            file.write_all(b"\n")?;
        }
    }
    Ok(file)
}
