use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Get the path to the unitefs binary for testing.
#[allow(dead_code)]
pub fn get_unitefs_path() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("unitefs").to_path_buf()
}

/// Two source directories matching the walkthrough used across the tests:
/// A holds `a.txt` and `shared.txt`, B holds `b.txt` and its own `shared.txt`.
#[allow(dead_code)]
pub struct TwoSources {
    pub a: TempDir,
    pub b: TempDir,
}

#[allow(dead_code)]
impl TwoSources {
    pub fn new() -> Self {
        let a = tempfile::tempdir().expect("Failed to create source A");
        let b = tempfile::tempdir().expect("Failed to create source B");

        write_file(a.path(), "a.txt", "hello");
        write_file(a.path(), "shared.txt", "AAA");
        write_file(b.path(), "b.txt", "bee");
        write_file(b.path(), "shared.txt", "BBB");

        TwoSources { a, b }
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        vec![self.a.path().to_path_buf(), self.b.path().to_path_buf()]
    }
}

impl Default for TwoSources {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `contents` to `root/relative`, creating parent directories.
#[allow(dead_code)]
pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, contents).expect("Failed to write fixture file");
}
