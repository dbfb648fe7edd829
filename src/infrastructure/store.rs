//! 持久化键值存储
//!
//! 计时器、违规计数、各题代码快照都只依赖 `KeyValueStore`，
//! 不关心背后是内存、JSON 文件还是别的介质。

use crate::error::{AppError, AppResult, StorageError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// 键值存储能力
///
/// 同一个键"最后写入者胜出"，不提供任何锁语义。
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// 会话持久化键
///
/// 所有键都由 (test_id, student_id) 派生，不同考生互不干扰。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    prefix: String,
}

impl StorageKeys {
    pub fn new(test_id: i64, student_id: i64) -> Self {
        Self {
            prefix: format!("test-{}-student-{}", test_id, student_id),
        }
    }

    /// 计时器剩余秒数 + 写入时间
    pub fn timer(&self) -> String {
        format!("{}-timer", self.prefix)
    }

    /// 违规计数
    pub fn violations(&self) -> String {
        format!("{}-violations", self.prefix)
    }

    /// 第 `index` 题的代码快照
    pub fn question(&self, index: usize) -> String {
        format!("{}-q{}", self.prefix, index)
    }

    /// 交卷成功后需要清理的全部键
    pub fn session_keys(&self, question_count: usize) -> Vec<String> {
        let mut keys = vec![self.timer(), self.violations()];
        keys.extend((0..question_count).map(|i| self.question(i)));
        keys
    }
}

/// 内存存储（测试和无盘环境使用）
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// JSON 文件存储
///
/// 整个存储是一个 JSON 对象，每次写入都会整体落盘（先写临时文件再 rename）。
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// 打开存储文件
    ///
    /// 文件不存在时从空存储开始；文件内容损坏时同样从空存储开始，
    /// 避免因为本地状态问题阻塞考生进入考试。
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, String>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("⚠️ 存储文件已损坏，将重新开始 ({}): {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(AppError::Storage(StorageError::ReadFailed {
                    path: path.display().to_string(),
                    source: Box::new(e),
                }))
            }
        };

        debug!("打开存储文件 {}，共 {} 个键", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) -> AppResult<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)
            .map_err(|e| AppError::storage_write_failed(tmp.display().to_string(), e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| AppError::storage_write_failed(self.path.display().to_string(), e))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
