//! Cache key derivation from source-tree content
//!
//! A cache key is a pure function of tree content plus build configuration:
//! byte-identical trees with the same architecture and image version always
//! produce the same key. Timestamps and permissions never enter the hash, so
//! keys are stable across checkouts and CI runners.

use crate::error::{KilnError, KilnResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Directory names never included in the content hash. `target` and
/// `artifacts` are build outputs of previous runs; hashing them would make
/// the key depend on its own history.
const EXCLUDED_DIRS: &[&str] = &[".git", "target", "artifacts"];

/// Deterministic identifier for (source tree, architecture, image version)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hex: String,
}

impl CacheKey {
    /// Full 64-char hex digest
    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// First 12 hex chars, used in logs and reports
    pub fn short(&self) -> &str {
        &self.hex[..12]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Derive the cache key for a source tree and build configuration.
///
/// Walks the tree in sorted order and hashes each entry's relative path and
/// contents (length-framed), then folds in the architecture and optimizer
/// image version. No side effects; fails with [`KilnError::Hashing`] if any
/// part of the tree is unreadable.
pub fn derive(source_root: &Path, arch: &str, image_version: &str) -> KilnResult<CacheKey> {
    fs::metadata(source_root).map_err(|e| KilnError::Hashing {
        path: source_root.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut entries = 0usize;

    let walker = WalkDir::new(source_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| EXCLUDED_DIRS.contains(&name)))
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source_root.to_path_buf());
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("walk error"));
            KilnError::Hashing { path, source }
        })?;

        if entry.depth() == 0 {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(source_root)
            .expect("walked entries live under the root");
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);

        let file_type = entry.file_type();
        if file_type.is_file() {
            let contents = fs::read(entry.path()).map_err(|e| KilnError::Hashing {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
            hasher.update((contents.len() as u64).to_le_bytes());
            hasher.update(&contents);
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|e| KilnError::Hashing {
                path: entry.path().to_path_buf(),
                source: e,
            })?;
            hasher.update(link.to_string_lossy().as_bytes());
        }
        entries += 1;
    }

    hasher.update(b"\0arch=");
    hasher.update(arch.as_bytes());
    hasher.update(b"\0image=");
    hasher.update(image_version.as_bytes());

    let key = CacheKey {
        hex: hex::encode(hasher.finalize()),
    };
    debug!("Derived cache key {} over {} entries", key, entries);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, contents) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, contents).unwrap();
        }
        dir
    }

    #[test]
    fn derive_is_deterministic() {
        let dir = tree_with(&[("src/lib.rs", "pub fn f() {}"), ("Cargo.toml", "[package]")]);

        let a = derive(dir.path(), "x86_64", "0.3.0").unwrap();
        let b = derive(dir.path(), "x86_64", "0.3.0").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.short().len(), 12);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn content_change_changes_key() {
        let dir = tree_with(&[("main.rs", "fn main() {}")]);
        let before = derive(dir.path(), "x86_64", "0.3.0").unwrap();

        fs::write(dir.path().join("main.rs"), "fn main() { panic!() }").unwrap();
        let after = derive(dir.path(), "x86_64", "0.3.0").unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn rename_changes_key() {
        let a = tree_with(&[("one.rs", "x")]);
        let b = tree_with(&[("two.rs", "x")]);

        assert_ne!(
            derive(a.path(), "x86_64", "0.3.0").unwrap(),
            derive(b.path(), "x86_64", "0.3.0").unwrap()
        );
    }

    #[test]
    fn arch_and_version_enter_the_key() {
        let dir = tree_with(&[("main.rs", "fn main() {}")]);

        let x86 = derive(dir.path(), "x86_64", "0.3.0").unwrap();
        let arm = derive(dir.path(), "arm64", "0.3.0").unwrap();
        let newer = derive(dir.path(), "x86_64", "0.4.0").unwrap();

        assert_ne!(x86, arm);
        assert_ne!(x86, newer);
    }

    #[test]
    fn mtime_does_not_enter_the_key() {
        let dir = tree_with(&[("main.rs", "fn main() {}")]);
        let before = derive(dir.path(), "x86_64", "0.3.0").unwrap();

        // Rewriting identical bytes bumps mtime but not content.
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        let after = derive(dir.path(), "x86_64", "0.3.0").unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn build_outputs_are_excluded() {
        let dir = tree_with(&[("main.rs", "fn main() {}")]);
        let before = derive(dir.path(), "x86_64", "0.3.0").unwrap();

        fs::create_dir_all(dir.path().join("target/release")).unwrap();
        fs::write(dir.path().join("target/release/out.bin"), "junk").unwrap();
        fs::create_dir_all(dir.path().join("artifacts")).unwrap();
        fs::write(dir.path().join("artifacts/old.wasm"), "junk").unwrap();
        let after = derive(dir.path(), "x86_64", "0.3.0").unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn unreadable_root_fails_with_hashing_error() {
        let err = derive(Path::new("/nonexistent/kiln-src"), "x86_64", "0.3.0").unwrap_err();
        assert!(matches!(err, KilnError::Hashing { .. }));
        assert_eq!(err.component(), "cache-key");
    }
}
