use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{Result, UniteError};
use crate::union::convert::node_from_metadata;
use crate::union::inode_manager::InodeAllocator;
use crate::union::types::Tree;

/// Options that shape how a source directory is walked.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Patterns matched against paths relative to the subtree root.
    exclude: Vec<glob::Pattern>,
    /// Stat through symlinks (and descend into linked directories) instead of
    /// recording the links themselves.
    follow_symlinks: bool,
}

impl BuildOptions {
    pub fn new(exclude: &[String], follow_symlinks: bool) -> Result<Self> {
        let exclude = exclude
            .iter()
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| {
                    UniteError::Config(format!("Invalid exclude glob pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<glob::Pattern>>>()?;

        Ok(BuildOptions {
            exclude,
            follow_symlinks,
        })
    }

    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    /// Check whether a path below the subtree root is left out of the union.
    pub fn is_excluded(&self, relative_path: &Path) -> bool {
        self.exclude.iter().any(|p| p.matches_path(relative_path))
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            exclude: Vec::new(),
            follow_symlinks: true,
        }
    }
}

/// Walks one real directory and turns it into a [`Tree`].
///
/// Every node gets its inode from the shared allocator, so trees built by the
/// same builder can be merged without renumbering.
pub struct SubtreeBuilder<'a> {
    inodes: &'a InodeAllocator,
    options: &'a BuildOptions,
}

impl<'a> SubtreeBuilder<'a> {
    pub fn new(inodes: &'a InodeAllocator, options: &'a BuildOptions) -> Self {
        SubtreeBuilder { inodes, options }
    }

    /// Build the tree rooted at `root`.
    ///
    /// An unreadable root fails the build. Entries below it that cannot be
    /// read (broken symlinks, permission errors, symlink loops) are logged and
    /// skipped together with anything beneath them.
    pub fn build(&self, root: &Path) -> Result<Tree> {
        let build_error = |source: io::Error| UniteError::Build {
            path: root.to_path_buf(),
            source,
        };

        let root_meta = fs::metadata(root).map_err(build_error)?;
        if !root_meta.is_dir() {
            return Err(build_error(io::Error::from_raw_os_error(libc::ENOTDIR)));
        }

        let root_name = root.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        let root_node =
            node_from_metadata(&root_meta, self.inodes.next(), root_name, root.to_path_buf());
        let mut tree = Tree::new(root_node);

        // parents[d] is the directory at depth d on the path currently being walked
        let mut parents: Vec<u64> = vec![tree.root_inode()];
        let mut skipped = 0usize;

        let mut entries = WalkDir::new(root)
            .min_depth(1)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let excluded = entry
                    .path()
                    .strip_prefix(root)
                    .is_ok_and(|rel| self.options.is_excluded(rel));
                if excluded {
                    tracing::debug!("excluding {}", entry.path().display());
                }
                !excluded
            });

        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        "Skipping unreadable entry {}: {}",
                        e.path().unwrap_or(root).display(),
                        e
                    );
                    continue;
                }
            };

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping {}: {}", entry.path().display(), e);
                    if entry.file_type().is_dir() {
                        entries.skip_current_dir();
                    }
                    continue;
                }
            };

            let depth = entry.depth();
            if parents.len() < depth {
                // Parent directory was skipped; nothing to attach to.
                continue;
            }
            parents.truncate(depth);
            let parent = parents[depth - 1];

            let node = node_from_metadata(
                &meta,
                self.inodes.next(),
                entry.file_name().to_os_string(),
                entry.path().to_path_buf(),
            );
            let ino = node.inode;
            let is_dir = node.is_dir();
            tree.add(node)?;
            tree.attach_child(parent, ino)?;

            if is_dir {
                parents.push(ino);
            }
        }

        tracing::debug!(
            "built subtree {} with {} nodes ({} skipped)",
            root.display(),
            tree.len(),
            skipped
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::ffi::OsStr;
    use std::os::unix::fs::symlink;

    fn names(tree: &Tree, ino: u64) -> Vec<String> {
        tree.children(ino)
            .map(|n| n.name.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_build_walks_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("zeta.txt"), "z").unwrap();
        fs::write(dir.path().join("alpha.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("mid")).unwrap();
        fs::write(dir.path().join("mid/inner.txt"), "inner").unwrap();

        let inodes = InodeAllocator::new();
        let options = BuildOptions::default();
        let tree = SubtreeBuilder::new(&inodes, &options)
            .build(dir.path())
            .unwrap();

        assert_eq!(names(&tree, tree.root_inode()), ["alpha.txt", "mid", "zeta.txt"]);

        let mid = tree.lookup(tree.root_inode(), OsStr::new("mid")).unwrap();
        assert!(mid.is_dir());
        let inner = tree.lookup(mid.inode, OsStr::new("inner.txt")).unwrap();
        assert_eq!(inner.size, 5);
        assert_eq!(inner.real_path.as_deref(), Some(dir.path().join("mid/inner.txt").as_path()));
    }

    #[test]
    fn test_build_assigns_unique_inodes() {
        let dir = tempfile::tempdir().unwrap();
        for d in ["a", "b", "c"] {
            fs::create_dir(dir.path().join(d)).unwrap();
            for f in ["1", "2"] {
                fs::write(dir.path().join(d).join(f), f).unwrap();
            }
        }

        let inodes = InodeAllocator::new();
        let options = BuildOptions::default();
        let tree = SubtreeBuilder::new(&inodes, &options)
            .build(dir.path())
            .unwrap();

        let reachable = tree.reachable();
        let unique: HashSet<_> = reachable.iter().copied().collect();
        assert_eq!(reachable.len(), 10);
        assert_eq!(unique.len(), reachable.len());
    }

    #[test]
    fn test_missing_root_is_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let inodes = InodeAllocator::new();
        let options = BuildOptions::default();

        let err = SubtreeBuilder::new(&inodes, &options)
            .build(&dir.path().join("does-not-exist"))
            .unwrap_err();
        assert!(matches!(err, UniteError::Build { .. }));
    }

    #[test]
    fn test_file_root_is_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let inodes = InodeAllocator::new();
        let options = BuildOptions::default();

        let err = SubtreeBuilder::new(&inodes, &options).build(&file).unwrap_err();
        assert!(matches!(err, UniteError::Build { .. }));
    }

    #[test]
    fn test_broken_symlink_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ok.txt"), "fine").unwrap();
        symlink(dir.path().join("nowhere"), dir.path().join("dangling")).unwrap();

        let inodes = InodeAllocator::new();
        let options = BuildOptions::default();
        let tree = SubtreeBuilder::new(&inodes, &options)
            .build(dir.path())
            .unwrap();

        assert_eq!(names(&tree, tree.root_inode()), ["ok.txt"]);
    }

    #[test]
    fn test_symlinks_recorded_when_not_following() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target.txt"), "t").unwrap();
        symlink("target.txt", dir.path().join("link")).unwrap();

        let inodes = InodeAllocator::new();
        let options = BuildOptions::new(&[], false).unwrap();
        let tree = SubtreeBuilder::new(&inodes, &options)
            .build(dir.path())
            .unwrap();

        let link = tree.lookup(tree.root_inode(), OsStr::new("link")).unwrap();
        assert_eq!(link.file_type(), fuser::FileType::Symlink);
    }

    #[test]
    fn test_exclude_patterns_prune_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join(".git/objects/blob"), "b").unwrap();
        fs::write(dir.path().join("keep.rs"), "k").unwrap();
        fs::write(dir.path().join("scratch.swp"), "s").unwrap();

        let inodes = InodeAllocator::new();
        let options =
            BuildOptions::new(&[".git".to_string(), "*.swp".to_string()], true).unwrap();
        let tree = SubtreeBuilder::new(&inodes, &options)
            .build(dir.path())
            .unwrap();

        assert_eq!(names(&tree, tree.root_inode()), ["keep.rs"]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_invalid_exclude_pattern_is_config_error() {
        let err = BuildOptions::new(&["[".to_string()], true).unwrap_err();
        assert!(matches!(err, UniteError::Config(_)));
    }
}
