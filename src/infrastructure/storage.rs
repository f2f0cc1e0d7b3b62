//! 键值存储端口 - 基础设施层
//!
//! 会话存储只依赖 [`KeyValueStore`] 接口：
//! - [`MemoryStore`]：进程内存实现，测试使用
//! - [`FileStore`]：每个键对应目录下的一个文件

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;

/// 持久化键值存储
pub trait KeyValueStore: Send + Sync {
    /// 读取键；不存在时返回 `None`
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 写入键
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// 删除键；键不存在不算错误
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// 内存键值存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// 文件键值存储
///
/// 目录结构：
/// ```text
/// storage_dir/
/// ├── churn_sessions_v1
/// └── churn_active_session_id
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// 创建文件存储，目录不存在时自动创建
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StorageError::WriteFailed {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::ReadFailed {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        debug!("写入存储键 {} ({} 字节)", key, value.len());
        // 先写临时文件再重命名，避免中途失败留下半个文件
        let tmp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, self.path(key)))
            .map_err(|source| StorageError::WriteFailed {
                key: key.to_string(),
                source,
            })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::RemoveFailed {
                key: key.to_string(),
                source,
            }),
        }
    }
}
