//! # Asset Sources
//!
//! Template background art and remote photos arrive as raw bytes from a
//! `ByteSource`. Keeping the fetch behind a trait keeps the render pipeline
//! free of I/O policy: production wires a directory (or an HTTP client),
//! tests wire an in-memory map, and the compositor decides which failure
//! taxonomy a fetch error belongs to.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Fetch raw bytes behind a key (an asset name or a URL path).
pub trait ByteSource {
    /// Returns the bytes, or a human-readable reason they are unavailable.
    fn fetch(&self, key: &str) -> Result<Vec<u8>, String>;
}

/// Directory-backed source: `key` resolves relative to a root directory.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirSource { root: root.into() }
    }
}

impl ByteSource for DirSource {
    fn fetch(&self, key: &str) -> Result<Vec<u8>, String> {
        // Strip any leading separator so absolute-looking keys stay inside
        // the root.
        let relative = key.trim_start_matches('/');
        let path = self.root.join(relative);
        fs::read(&path).map_err(|e| format!("{}: {}", path.display(), e))
    }
}

/// In-memory source for tests and embedded assets.
#[derive(Default)]
pub struct MemorySource {
    entries: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, bytes: Vec<u8>) {
        self.entries.insert(key.to_string(), bytes);
    }

    pub fn with(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.insert(key, bytes);
        self
    }
}

impl ByteSource for MemorySource {
    fn fetch(&self, key: &str) -> Result<Vec<u8>, String> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| format!("no asset named '{}'", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_roundtrip() {
        let source = MemorySource::new().with("idcard.png", vec![1, 2, 3]);
        assert_eq!(source.fetch("idcard.png").unwrap(), vec![1, 2, 3]);
        assert!(source.fetch("missing.png").is_err());
    }

    #[test]
    fn test_dir_source_missing_file_reports_path() {
        let source = DirSource::new("/nonexistent-root");
        let err = source.fetch("idcard.png").unwrap_err();
        assert!(err.contains("idcard.png"));
    }
}
