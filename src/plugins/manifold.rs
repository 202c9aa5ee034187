//! Folder-level manifold: file count, byte total and newest mtime per tracked
//! root folder. A cheap stand-in for per-file hashing.
//!
//! The walk skips dot-entries and the configured ignore set at every depth.
//! A file that vanishes or cannot be stat'ed mid-walk is dropped from the
//! totals; it never fails the whole calculation.

use crate::core::checkpoint::{FolderManifold, Manifold};
use crate::core::config::ManifoldConfig;
use crate::core::store::Store;
use crate::core::time;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ManifoldCalculator {
    root: PathBuf,
    tracked_folders: Vec<String>,
    ignored_names: HashSet<String>,
}

impl ManifoldCalculator {
    pub fn new(root: &Path, config: &ManifoldConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            tracked_folders: config.tracked_folders.clone(),
            ignored_names: config.ignored_names.iter().cloned().collect(),
        }
    }

    pub fn from_store(store: &Store) -> Self {
        Self::new(&store.root, &store.config.manifold)
    }

    pub fn tracked_folders(&self) -> &[String] {
        &self.tracked_folders
    }

    pub fn calculate_manifold(&self) -> Manifold {
        self.tracked_folders
            .iter()
            .map(|folder| {
                let path = self.root.join(folder);
                let stats = if path.is_dir() {
                    Some(self.folder_stats(&path))
                } else {
                    None
                };
                (folder.clone(), stats)
            })
            .collect()
    }

    pub fn folder_stats(&self, folder: &Path) -> FolderManifold {
        let mut file_count = 0u64;
        let mut total_bytes = 0u64;
        let mut last_modified = DateTime::<Utc>::default();

        let walker = WalkDir::new(folder)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_ignored(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry during manifold walk");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                debug!(path = %entry.path().display(), "file vanished before stat");
                continue;
            };

            file_count += 1;
            total_bytes += meta.len();
            if let Ok(modified) = meta.modified() {
                let modified = time::from_system_time(modified);
                if modified > last_modified {
                    last_modified = modified;
                }
            }
        }

        FolderManifold {
            file_count,
            total_bytes,
            last_modified,
        }
    }

    fn is_ignored(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        name.starts_with('.') || self.ignored_names.contains(&*name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn calculator(root: &Path) -> ManifoldCalculator {
        ManifoldCalculator::new(
            root,
            &ManifoldConfig {
                tracked_folders: vec!["src".into(), "docs".into(), "notes.md".into()],
                ignored_names: vec!["node_modules".into(), "dist".into()],
            },
        )
    }

    #[test]
    fn counts_visible_files_recursively() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::create_dir_all(src.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(src.join(".cache")).unwrap();
        fs::write(src.join("a.ts"), "abc").unwrap();
        fs::write(src.join("sub/b.ts"), "hello").unwrap();
        fs::write(src.join(".env"), "SECRET=1").unwrap();
        fs::write(src.join("node_modules/pkg/index.js"), "module").unwrap();
        fs::write(src.join(".cache/blob"), "zzzz").unwrap();
        fs::write(tmp.path().join("notes.md"), "not a folder").unwrap();

        let manifold = calculator(tmp.path()).calculate_manifold();
        let stats = manifold["src"].as_ref().expect("src exists");
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 8);
        assert!(stats.last_modified > DateTime::<Utc>::default());

        assert_eq!(manifold["docs"], None);
        assert_eq!(manifold["notes.md"], None);
        assert_eq!(manifold.len(), 3);
    }

    #[test]
    fn empty_folder_has_epoch_mtime() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        let manifold = calculator(tmp.path()).calculate_manifold();
        let docs = manifold["docs"].as_ref().unwrap();
        assert_eq!(docs.file_count, 0);
        assert_eq!(docs.total_bytes, 0);
        assert_eq!(docs.last_modified, DateTime::<Utc>::default());
    }

    #[test]
    fn hidden_tracked_root_is_still_walked() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(".agent/checkpoints")).unwrap();
        fs::write(tmp.path().join(".agent/checkpoints/latest.yaml"), "x: 1\n").unwrap();
        let calc = ManifoldCalculator::new(
            tmp.path(),
            &ManifoldConfig {
                tracked_folders: vec![".agent".into()],
                ignored_names: vec![],
            },
        );
        let manifold = calc.calculate_manifold();
        assert_eq!(manifold[".agent"].as_ref().unwrap().file_count, 1);
    }
}
