use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 單次執行的暫存目錄
///
/// 離開作用域時刪除整個目錄（成功、錯誤、panic 皆然），
/// 除非設定保留中間檔案。
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    keep: bool,
}

impl ScratchDir {
    pub fn create(parent: Option<&Path>, keep: bool) -> io::Result<Self> {
        let parent = parent.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let path = parent.join(format!("preview_{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;
        // concat 清單中的相對路徑以清單所在目錄為基準，一律使用絕對路徑
        let path = fs::canonicalize(&path)?;
        debug!("建立暫存目錄: {}", path.display());
        Ok(Self { path, keep })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.keep {
            info!("保留暫存目錄: {}", self.path.display());
            return;
        }
        if self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!("無法清理暫存目錄 {}: {}", self.path.display(), e);
            } else {
                debug!("已清理暫存目錄: {}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchDir::create(Some(parent.path()), false).unwrap();
            fs::write(scratch.join("clip_000.mp4"), b"data").unwrap();
            assert!(scratch.path().exists());
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_dir_kept_when_requested() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchDir::create(Some(parent.path()), true).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(path.exists());
    }

    #[test]
    fn test_scratch_dir_removed_on_error_path() {
        fn failing_stage(scratch: &ScratchDir) -> io::Result<()> {
            fs::write(scratch.join("partial.mp4"), b"x")?;
            Err(io::Error::other("stage failed"))
        }

        let parent = tempfile::tempdir().unwrap();
        let mut seen = None;
        let result = (|| {
            let scratch = ScratchDir::create(Some(parent.path()), false)?;
            seen = Some(scratch.path().to_path_buf());
            failing_stage(&scratch)
        })();

        assert!(result.is_err());
        assert!(!seen.unwrap().exists());
    }

    #[test]
    fn test_scratch_dirs_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let a = ScratchDir::create(Some(parent.path()), false).unwrap();
        let b = ScratchDir::create(Some(parent.path()), false).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
