//! 原子文件写入与读取
//!
//! 先写入 `<file>.tmp` 并 fsync，再 rename 覆盖目标文件。读取只看目标文件，
//! 写到一半的临时文件永远不会被当作记录加载。

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// 目标文件对应的临时文件路径
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// 原子写入
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source| StoreError::Io { path: p, source }
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
    }

    let tmp = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(io_err(&tmp))?;
        file.write_all(bytes).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
    }

    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

/// 读取 JSON 记录，文件不存在时返回 `None`
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/data/state.json")),
            PathBuf::from("/data/state.json.tmp")
        );
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("record.json");

        write_atomic(&path, br#"{"value": 42}"#).unwrap();
        let value: Option<serde_json::Value> = read_json(&path).unwrap();
        assert_eq!(value.unwrap()["value"], 42);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<serde_json::Value> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_leftover_temp_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        write_atomic(&path, br#"{"value": 1}"#).unwrap();

        // 模拟写临时文件后、rename 前崩溃
        fs::write(temp_path(&path), br#"{"value": 2, "trunc"#).unwrap();

        let value: Option<serde_json::Value> = read_json(&path).unwrap();
        assert_eq!(value.unwrap()["value"], 1);

        // 下一次写入覆盖残留的临时文件
        write_atomic(&path, br#"{"value": 3}"#).unwrap();
        let value: Option<serde_json::Value> = read_json(&path).unwrap();
        assert_eq!(value.unwrap()["value"], 3);
    }
}
