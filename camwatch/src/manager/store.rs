use crate::camera::Status;
use crate::error::Result;
use camwatch_core::source::{CameraIdentity, CameraSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// 持久化的相机记录，每个 identity 一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub identity: CameraIdentity,
    pub name: String,
    pub status: Status,
    pub source: CameraSource,
}

/// 相机记录的存储
///
/// `save` 由 Device Manager 的 actor 任务按顺序调用，只更新内存，不能阻塞；
/// `flush` 可能做磁盘 I/O，由 actor 放到阻塞线程池执行，多次变更可以合并成一次写入。
pub trait CameraStore: Send + Sync {
    fn load(&self) -> Result<Vec<CameraRecord>>;

    /// 插入或覆盖
    fn save(&self, record: &CameraRecord) -> Result<()>;

    /// 把已保存的记录写到持久介质
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

type Rows = BTreeMap<CameraIdentity, CameraRecord>;

fn lock(rows: &Mutex<Rows>) -> MutexGuard<'_, Rows> {
    rows.lock().unwrap_or_else(PoisonError::into_inner)
}

/// JSON 文件存储：整个文件是 identity -> 记录 的对象，写入时先写临时文件再 rename
pub struct JsonFileStore {
    path: PathBuf,
    rows: Mutex<Rows>,
    dirty: AtomicBool,
    // 串行化文件写入
    writing: Mutex<()>,
}

impl JsonFileStore {
    /// 打开存储文件，不存在时视为空
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let rows = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Rows::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Rows::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), rows = rows.len(), "camera store opened");

        Ok(Self {
            path,
            rows: Mutex::new(rows),
            dirty: AtomicBool::new(false),
            writing: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, rows: &Rows) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(rows)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CameraStore for JsonFileStore {
    fn load(&self) -> Result<Vec<CameraRecord>> {
        Ok(lock(&self.rows).values().cloned().collect())
    }

    fn save(&self, record: &CameraRecord) -> Result<()> {
        lock(&self.rows).insert(record.identity.clone(), record.clone());
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let _writing = self.writing.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        // 拷贝之后到来的 save 会重新置脏，由下一次 flush 写入
        let rows = lock(&self.rows).clone();
        if let Err(e) = self.write_file(&rows) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        debug!(path = %self.path.display(), rows = rows.len(), "camera store flushed");
        Ok(())
    }
}

impl fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .finish()
    }
}

/// 内存存储 (测试或不需要持久化时)
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Rows>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &CameraIdentity) -> Option<CameraRecord> {
        lock(&self.rows).get(identity).cloned()
    }
}

impl CameraStore for MemoryStore {
    fn load(&self) -> Result<Vec<CameraRecord>> {
        Ok(lock(&self.rows).values().cloned().collect())
    }

    fn save(&self, record: &CameraRecord) -> Result<()> {
        lock(&self.rows).insert(record.identity.clone(), record.clone());
        Ok(())
    }
}
