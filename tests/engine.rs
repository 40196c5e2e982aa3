//! End-to-end tests for the gitvault engine
//!
//! Everything here drives the public API against the in-memory object
//! store; materialization lands in real temporary directories. The
//! scenarios mirror how the toolkit is actually used: expand a snapshot,
//! write it somewhere, search history for a path, extract the matches.

use gitvault::{
    BlobKind, Materializer, MemoryStore, ObjectId, ObjectKind, PathMatcher, SearchOptions,
    Searcher, TreeEntry, TreeWalker, WalkCache,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One file to place in a synthetic tree.
#[derive(Debug, Clone)]
struct FileSpec {
    path: PathBuf,
    content: Vec<u8>,
    mode: u32,
    symlink: bool,
}

impl FileSpec {
    fn file(path: &str, content: &str, mode: u32) -> Self {
        FileSpec {
            path: PathBuf::from(path),
            content: content.as_bytes().to_vec(),
            mode,
            symlink: false,
        }
    }

    fn symlink(path: &str, target: &str) -> Self {
        FileSpec {
            path: PathBuf::from(path),
            content: target.as_bytes().to_vec(),
            mode: 0,
            symlink: true,
        }
    }
}

/// Assembles nested tree objects in a [`MemoryStore`] from flat file
/// specs, handing out sequential synthetic object ids.
#[derive(Default)]
struct TreeBuilder {
    store: MemoryStore,
    next_id: u64,
}

impl TreeBuilder {
    fn new() -> Self {
        TreeBuilder::default()
    }

    fn fresh_id(&mut self) -> ObjectId {
        self.next_id += 1;
        ObjectId::parse(&format!("{:040x}", self.next_id)).unwrap()
    }

    /// Build the tree graph for `files` and return the root tree id.
    fn tree(&mut self, files: &[FileSpec]) -> ObjectId {
        let items: Vec<(PathBuf, FileSpec)> = files
            .iter()
            .map(|f| (f.path.clone(), f.clone()))
            .collect();
        self.build_dir(items)
    }

    fn build_dir(&mut self, items: Vec<(PathBuf, FileSpec)>) -> ObjectId {
        let mut leaves: Vec<(String, FileSpec)> = Vec::new();
        let mut subdirs: BTreeMap<String, Vec<(PathBuf, FileSpec)>> = BTreeMap::new();

        for (path, spec) in items {
            let mut components = path.components();
            let first = components
                .next()
                .expect("file spec paths are never empty")
                .as_os_str()
                .to_string_lossy()
                .into_owned();
            let rest: PathBuf = components.collect();
            if rest.as_os_str().is_empty() {
                leaves.push((first, spec));
            } else {
                subdirs.entry(first).or_default().push((rest, spec));
            }
        }

        let mut entries: Vec<TreeEntry> = Vec::new();
        for (name, spec) in leaves {
            let blob_id = self.fresh_id();
            self.store.add_blob(blob_id.clone(), spec.content.clone());
            let mode = if spec.symlink {
                0o120000
            } else {
                0o100000 | spec.mode
            };
            entries.push(TreeEntry {
                name,
                mode,
                kind: ObjectKind::Blob,
                target: blob_id,
            });
        }
        for (name, children) in subdirs {
            let subtree = self.build_dir(children);
            entries.push(TreeEntry {
                name,
                mode: 0o40000,
                kind: ObjectKind::Tree,
                target: subtree,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let tree_id = self.fresh_id();
        self.store.add_tree(tree_id.clone(), entries);
        tree_id
    }
}

/// Recursively collect every regular file and symlink under `root`.
fn walk_disk(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let file_type = entry.file_type().unwrap();
            if file_type.is_dir() {
                pending.push(entry.path());
            } else {
                found.push(entry.path().strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    found.sort();
    found
}

#[test]
fn test_expand_materialize_round_trip() -> anyhow::Result<()> {
    let mut builder = TreeBuilder::new();
    let specs = vec![
        FileSpec::file("README.md", "# notes\n", 0o644),
        FileSpec::file("bin/run.sh", "#!/bin/sh\necho hi\n", 0o755),
        FileSpec::file("docs/deep/nested/guide.txt", "read me", 0o644),
        FileSpec::file("docs/empty.txt", "", 0o600),
    ];
    let root = builder.tree(&specs);
    let store = builder.store;

    let walker = TreeWalker::new(&store);
    let blobs = walker.expand(&root)?;
    assert_eq!(blobs.len(), specs.len());

    let dest = TempDir::new()?;
    let report = Materializer::with_umask(&store, 0).materialize(&blobs, dest.path())?;
    assert!(report.is_clean());
    assert_eq!(report.files_written, specs.len());

    for spec in &specs {
        let on_disk = dest.path().join(&spec.path);
        assert_eq!(fs::read(&on_disk)?, spec.content, "{:?}", spec.path);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&on_disk)?.permissions().mode() & 0o777;
            assert_eq!(mode, spec.mode, "{:?}", spec.path);
        }
    }
    // Nothing extra appeared.
    assert_eq!(walk_disk(dest.path()).len(), specs.len());
    Ok(())
}

#[test]
fn test_shared_subtrees_expand_once_across_commits() {
    // Two snapshots of the same home directory that share a large
    // unchanged subtree, the common case in backup history.
    let mut builder = TreeBuilder::new();
    let shared = builder.tree(&[
        FileSpec::file("photos/2019/a.jpg", "jpeg-a", 0o644),
        FileSpec::file("photos/2019/b.jpg", "jpeg-b", 0o644),
    ]);
    let changed_v1 = builder.fresh_id();
    builder.store.add_blob(changed_v1.clone(), "draft one");
    let changed_v2 = builder.fresh_id();
    builder.store.add_blob(changed_v2.clone(), "draft two");

    let commit = |builder: &mut TreeBuilder, draft: &ObjectId| {
        let id = builder.fresh_id();
        let entries = vec![
            TreeEntry {
                name: "archive".to_string(),
                mode: 0o40000,
                kind: ObjectKind::Tree,
                target: shared.clone(),
            },
            TreeEntry {
                name: "draft.txt".to_string(),
                mode: 0o100644,
                kind: ObjectKind::Blob,
                target: draft.clone(),
            },
        ];
        builder.store.add_tree(id.clone(), entries);
        id
    };
    let commit_a = commit(&mut builder, &changed_v1);
    let commit_b = commit(&mut builder, &changed_v2);
    let store = builder.store;

    let cache = WalkCache::new();
    let walker = TreeWalker::with_cache(&store, cache);
    let blobs_a = walker.expand(&commit_a).unwrap();
    let blobs_b = walker.expand(&commit_b).unwrap();

    // Both occurrences are identical up to the path prefix.
    let shared_a: Vec<_> = blobs_a.iter().filter(|b| b.path.starts_with("archive")).collect();
    let shared_b: Vec<_> = blobs_b.iter().filter(|b| b.path.starts_with("archive")).collect();
    assert_eq!(shared_a, shared_b);

    // The shared subtree was listed exactly once for both expansions.
    assert_eq!(store.list_tree_calls(&shared), 1);
}

#[cfg(unix)]
#[test]
fn test_symlink_fidelity() {
    let mut builder = TreeBuilder::new();
    let root = builder.tree(&[
        FileSpec::symlink("current", "releases/v2"),
        // Trailing newline in the blob must survive into the link target.
        FileSpec::symlink("weird", "target-with-newline\n"),
    ]);
    let store = builder.store;

    let walker = TreeWalker::new(&store);
    let blobs = walker.expand(&root).unwrap();
    assert!(blobs.iter().all(|b| b.kind == BlobKind::Symlink));

    let dest = TempDir::new().unwrap();
    let report = Materializer::with_umask(&store, 0o022)
        .materialize(&blobs, dest.path())
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.symlinks_created, 2);

    assert_eq!(
        fs::read_link(dest.path().join("current")).unwrap(),
        PathBuf::from("releases/v2")
    );
    assert_eq!(
        fs::read_link(dest.path().join("weird")).unwrap(),
        PathBuf::from("target-with-newline\n")
    );
}

#[cfg(unix)]
#[test]
fn test_permission_masking() {
    use std::os::unix::fs::PermissionsExt;

    let mut builder = TreeBuilder::new();
    let root = builder.tree(&[FileSpec::file("wide-open", "anything", 0o777)]);
    let store = builder.store;

    let blobs = TreeWalker::new(&store).expand(&root).unwrap();
    let dest = TempDir::new().unwrap();
    Materializer::with_umask(&store, 0o022)
        .materialize(&blobs, dest.path())
        .unwrap();

    let mode = fs::metadata(dest.path().join("wide-open"))
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o755);
}

#[test]
fn test_rematerialization_is_idempotent() {
    let mut builder = TreeBuilder::new();
    let root = builder.tree(&[
        FileSpec::file("a/one.txt", "one", 0o644),
        FileSpec::file("a/b/two.txt", "two", 0o640),
    ]);
    let store = builder.store;

    let blobs = TreeWalker::new(&store).expand(&root).unwrap();
    let dest = TempDir::new().unwrap();
    let materializer = Materializer::with_umask(&store, 0o022);

    let first = materializer.materialize(&blobs, dest.path()).unwrap();
    let second = materializer.materialize(&blobs, dest.path()).unwrap();
    assert!(first.is_clean());
    assert!(second.is_clean());
    assert_eq!(second.files_written, first.files_written);

    assert_eq!(walk_disk(dest.path()), vec![
        PathBuf::from("a/b/two.txt"),
        PathBuf::from("a/one.txt"),
    ]);
    assert_eq!(fs::read_to_string(dest.path().join("a/one.txt")).unwrap(), "one");
}

#[test]
fn test_pattern_matches_full_relative_path() {
    let mut builder = TreeBuilder::new();
    let root = builder.tree(&[
        FileSpec::file("a/b/file.txt", "1", 0o644),
        FileSpec::file("a/other.txt", "2", 0o644),
        FileSpec::file("z/file.txt", "3", 0o644),
    ]);
    let store = builder.store;

    let blobs = TreeWalker::new(&store).expand(&root).unwrap();
    let matcher = PathMatcher::new(r"file\.txt$").unwrap();
    let mut matched: Vec<_> = matcher
        .filter(blobs.into_iter())
        .map(|b| b.path)
        .collect();
    matched.sort();

    assert_eq!(
        matched,
        vec![PathBuf::from("a/b/file.txt"), PathBuf::from("z/file.txt")]
    );
}

#[test]
fn test_search_extracts_matches_per_commit() -> anyhow::Result<()> {
    let mut builder = TreeBuilder::new();
    let head = builder.tree(&[
        FileSpec::file("notes/thesis.tex", "v2", 0o644),
        FileSpec::file("notes/scratch.txt", "junk", 0o644),
    ]);
    let old = builder.tree(&[FileSpec::file("old-layout/thesis.tex", "v1", 0o644)]);
    let mut store = builder.store;
    store.add_ref("refs/heads/master", head.clone());
    store.add_history(head.as_str(), vec![old.clone()]);

    let dest = TempDir::new()?;
    let searcher = Searcher::new(&store, PathMatcher::new(r"thesis\.tex$")?);
    let outcome = searcher.run(&SearchOptions {
        all_history: true,
        extract_to: Some(dest.path().to_path_buf()),
        ..Default::default()
    })?;

    assert_eq!(outcome.matches.len(), 2);
    assert_eq!(outcome.roots_scanned, 2);

    // Each match landed under its commit's own subdirectory, preserving
    // the relative path.
    assert_eq!(
        fs::read_to_string(dest.path().join(head.as_str()).join("notes/thesis.tex"))?,
        "v2"
    );
    assert_eq!(
        fs::read_to_string(dest.path().join(old.as_str()).join("old-layout/thesis.tex"))?,
        "v1"
    );
    Ok(())
}

#[test]
fn test_concurrent_expansion_is_consistent() {
    let mut builder = TreeBuilder::new();
    let specs: Vec<FileSpec> = (0..20)
        .map(|i| FileSpec::file(&format!("dir{}/f{}.txt", i % 4, i), "x", 0o644))
        .collect();
    let root = builder.tree(&specs);
    let store = builder.store;

    let walker = TreeWalker::new(&store);
    let reference = walker.expand(&root).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| walker.expand(&root).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), reference);
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Materializing the output of `expand` reproduces every file
    /// byte-for-byte, for arbitrary nesting.
    #[test]
    fn prop_expand_materialize_round_trip(
        raw_files in proptest::collection::vec(
            (
                proptest::collection::vec("d[a-c]{1,2}", 0..4),
                "f[0-9]{1,2}\\.txt",
                proptest::collection::vec(any::<u8>(), 0..256),
            ),
            1..16,
        )
    ) {
        // Deduplicate by full path; later specs win.
        let mut by_path: BTreeMap<PathBuf, Vec<u8>> = BTreeMap::new();
        for (dirs, leaf, content) in raw_files {
            let mut path = PathBuf::new();
            for d in dirs {
                path.push(d);
            }
            path.push(leaf);
            by_path.insert(path, content);
        }
        let specs: Vec<FileSpec> = by_path
            .into_iter()
            .map(|(path, content)| FileSpec {
                path,
                content,
                mode: 0o644,
                symlink: false,
            })
            .collect();

        let mut builder = TreeBuilder::new();
        let root = builder.tree(&specs);
        let store = builder.store;

        let blobs = TreeWalker::new(&store).expand(&root).unwrap();
        prop_assert_eq!(blobs.len(), specs.len());

        let dest = TempDir::new().unwrap();
        let report = Materializer::with_umask(&store, 0o022)
            .materialize(&blobs, dest.path())
            .unwrap();
        prop_assert!(report.is_clean());

        for spec in &specs {
            prop_assert_eq!(&fs::read(dest.path().join(&spec.path)).unwrap(), &spec.content);
        }
        prop_assert_eq!(walk_disk(dest.path()).len(), specs.len());
    }
}
