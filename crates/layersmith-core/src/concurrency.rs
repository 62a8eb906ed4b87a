use crate::CoreError;
use fs2::FileExt;
use layersmith_runtime::Cancellation;
use layersmith_schema::RuntimeFamily;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LOCK_DIR: &str = ".layersmith-locks";

/// Advisory lock serializing builds of one runtime family, which share
/// host package caches.
pub struct FamilyLock {
    lock_file: File,
}

impl FamilyLock {
    pub fn lock_path(temp_root: &Path, family: RuntimeFamily) -> PathBuf {
        temp_root.join(LOCK_DIR).join(format!("{family}.lock"))
    }

    /// Block until the lock is ours. Contention is logged once so a build
    /// waiting on another one does not look hung.
    pub fn acquire(temp_root: &Path, family: RuntimeFamily) -> Result<Self, CoreError> {
        if let Some(lock) = Self::try_acquire(temp_root, family)? {
            return Ok(lock);
        }
        info!("waiting for {family} cache lock held by another build");
        let file = open_lock_file(&Self::lock_path(temp_root, family))?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Lock(format!("{family} cache lock: {e}")))?;
        debug!("acquired {family} cache lock");
        Ok(Self { lock_file: file })
    }

    /// `None` when another holder has the lock.
    pub fn try_acquire(temp_root: &Path, family: RuntimeFamily) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(&Self::lock_path(temp_root, family))?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => Ok(None),
            Err(e) => Err(CoreError::Lock(format!("{family} cache lock: {e}"))),
        }
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl Drop for FamilyLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Route Ctrl-C to `cancellation`. A second Ctrl-C exits immediately.
pub fn install_signal_handler(cancellation: &Cancellation) {
    let cancellation = cancellation.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if cancellation.is_cancelled() {
            std::process::exit(1);
        }
        cancellation.cancel();
        eprintln!("\ncancellation requested, cleaning up current build...");
    }) {
        debug!("signal handler not installed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = FamilyLock::acquire(dir.path(), RuntimeFamily::Python).unwrap();
            assert!(FamilyLock::lock_path(dir.path(), RuntimeFamily::Python).exists());
        }
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let _lock = FamilyLock::acquire(dir.path(), RuntimeFamily::Python).unwrap();
        let result = FamilyLock::try_acquire(dir.path(), RuntimeFamily::Python).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn acquire_waits_for_contended_lock() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _lock = FamilyLock::acquire(&root, RuntimeFamily::Python).unwrap();
            held_tx.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(300));
        });
        held_rx.recv().unwrap();

        let start = std::time::Instant::now();
        let _lock = FamilyLock::acquire(dir.path(), RuntimeFamily::Python).unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(200));
        holder.join().unwrap();
    }

    #[test]
    fn families_lock_independently() {
        let dir = tempfile::tempdir().unwrap();
        let _python = FamilyLock::acquire(dir.path(), RuntimeFamily::Python).unwrap();
        let node = FamilyLock::try_acquire(dir.path(), RuntimeFamily::Node).unwrap();
        assert!(node.is_some());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = FamilyLock::acquire(dir.path(), RuntimeFamily::Node).unwrap();
        }
        let lock2 = FamilyLock::try_acquire(dir.path(), RuntimeFamily::Node).unwrap();
        assert!(lock2.is_some());
    }
}
