//! Per-invocation scratch directory for intermediate artifacts.
//!
//! Temporary C files, instrumented binaries, and profile files live in a
//! unique directory that is removed when the invocation ends, on every
//! exit path, unless retention was requested.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static INVOCATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Owns the scratch directory; dropping it removes everything inside.
#[derive(Debug)]
pub struct ScratchSpace {
    root: PathBuf,
    keep: bool,
}

impl ScratchSpace {
    /// Create a unique scratch directory under the system temp dir.
    pub fn create(keep: bool) -> std::io::Result<Self> {
        let unique = INVOCATION_COUNTER.fetch_add(1, Ordering::SeqCst);
        let root = std::env::temp_dir().join(format!(
            "cscriptc-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&root)?;
        Ok(Self { root, keep })
    }

    /// Path for a named artifact inside the scratch directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keep(&self) -> bool {
        self.keep
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.root);
        }
    }
}
