// dartle: A Programmable Task-Based Build Tool
//
// SPDX-FileCopyrightText: 2026 The Dartle Authors
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use super::{FileCollection, normalize_path};

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"x").unwrap();
}

/// src/a.rs  src/b.txt  src/.hidden  src/sub/c.rs  src/target/d.rs
fn fixture() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    touch(&root.join("src/a.rs"));
    touch(&root.join("src/b.txt"));
    touch(&root.join("src/.hidden"));
    touch(&root.join("src/sub/c.rs"));
    touch(&root.join("src/target/d.rs"));
    tmp
}

fn names(root: &Path, paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/")
        })
        .collect()
}

#[test]
fn test_empty_collection() {
    let empty = FileCollection::empty();
    assert!(empty.is_empty());
    assert!(empty.resolve_entries().unwrap().is_empty());
    assert!(!empty.includes(Path::new("anything"), false));
}

#[test]
fn test_files_resolve_declared_paths_even_when_missing() {
    let collection = FileCollection::files(["missing.txt", "also-missing.txt"]);
    let files = collection.resolve_files().unwrap();
    assert_eq!(
        files,
        vec![PathBuf::from("also-missing.txt"), PathBuf::from("missing.txt")]
    );
    assert!(collection.includes(Path::new("missing.txt"), false));
    assert!(!collection.includes(Path::new("missing.txt"), true));
}

#[test]
fn test_files_dedupes_and_normalizes() {
    let collection = FileCollection::files(["./a.txt", "a.txt"]);
    assert_eq!(collection.resolve_files().unwrap(), vec![PathBuf::from("a.txt")]);
}

#[test]
fn test_dir_recursive_resolution() {
    let tmp = fixture();
    let src = tmp.path().join("src");
    let collection = FileCollection::dir(&src);

    let files = names(&src, &collection.resolve_files().unwrap());
    assert_eq!(files, vec!["a.rs", "b.txt", "sub/c.rs", "target/d.rs"]);

    let dirs = collection.resolve_directories().unwrap();
    assert!(dirs.contains(&normalize_path(&src)));
    assert!(dirs.contains(&normalize_path(&src.join("sub"))));
}

#[test]
fn test_dir_non_recursive_sees_only_direct_children() {
    let tmp = fixture();
    let src = tmp.path().join("src");
    let collection = FileCollection::dir(&src).with_recurse(false);

    let files = names(&src, &collection.resolve_files().unwrap());
    assert_eq!(files, vec!["a.rs", "b.txt"]);

    // Only the root directory is an entity of a flat collection.
    assert_eq!(
        collection.resolve_directories().unwrap(),
        vec![normalize_path(&src)]
    );
}

#[test]
fn test_dir_extension_filter() {
    let tmp = fixture();
    let src = tmp.path().join("src");
    let collection = FileCollection::dir(&src).with_extensions(["rs"]);
    let files = names(&src, &collection.resolve_files().unwrap());
    assert_eq!(files, vec!["a.rs", "sub/c.rs", "target/d.rs"]);

    // A leading dot on the extension is accepted too.
    let dotted = FileCollection::dir(&src).with_extensions([".rs"]);
    assert_eq!(
        dotted.resolve_files().unwrap(),
        collection.resolve_files().unwrap()
    );
}

#[test]
fn test_dir_exclusions_stop_descent() {
    let tmp = fixture();
    let src = tmp.path().join("src");
    let collection = FileCollection::dir(&src).with_exclusions(["target"]);
    let files = names(&src, &collection.resolve_files().unwrap());
    assert_eq!(files, vec!["a.rs", "b.txt", "sub/c.rs"]);
    assert!(!collection.includes(&src.join("target/d.rs"), false));
}

#[test]
fn test_hidden_files_skipped_by_default() {
    let tmp = fixture();
    let src = tmp.path().join("src");

    let without = FileCollection::dir(&src);
    assert!(!names(&src, &without.resolve_files().unwrap()).contains(&".hidden".to_string()));

    let with = FileCollection::dir(&src).with_hidden(true);
    assert!(names(&src, &with.resolve_files().unwrap()).contains(&".hidden".to_string()));
}

#[test]
fn test_missing_root_resolves_to_declared_root_only() {
    let collection = FileCollection::dir("no/such/dir");
    let entries = collection.resolve_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_dir);
    assert_eq!(entries[0].path, PathBuf::from("no/such/dir"));
}

#[test]
fn test_includes_respects_recursion_depth() {
    let collection = FileCollection::dir("root").with_recurse(false);
    assert!(collection.includes(Path::new("root/file.txt"), false));
    assert!(!collection.includes(Path::new("root/sub/file.txt"), false));

    let recursive = FileCollection::dir("root");
    assert!(recursive.includes(Path::new("root/sub/file.txt"), false));
    assert!(recursive.includes(Path::new("root/sub"), true));
}

#[test]
fn test_includes_respects_filters() {
    let collection = FileCollection::dir("root")
        .with_extensions(["rs"])
        .with_exclusions(["vendor"]);
    assert!(collection.includes(Path::new("root/main.rs"), false));
    assert!(!collection.includes(Path::new("root/readme.md"), false));
    assert!(!collection.includes(Path::new("root/vendor/lib.rs"), false));
    assert!(!collection.includes(Path::new("root/.git/config.rs"), false));
    assert!(!collection.includes(Path::new("elsewhere/main.rs"), false));
}

#[test]
fn test_intersection_dir_with_file_under_tree() {
    let tmp = fixture();
    let src = tmp.path().join("src");
    let dir = FileCollection::dir(&src);
    let file = FileCollection::file(src.join("sub/c.rs"));

    let common = dir.intersection(&file).unwrap();
    assert_eq!(common.len(), 1);
    assert!(common.contains(&normalize_path(&src.join("sub/c.rs"))));

    // Symmetric.
    assert_eq!(file.intersection(&dir).unwrap(), common);
}

#[test]
fn test_intersection_declared_file_need_not_exist() {
    let dir = FileCollection::dir("out");
    let file = FileCollection::file("out/report.txt");
    let common = file.intersection(&dir).unwrap();
    assert!(common.contains(Path::new("out/report.txt")));
}

#[test]
fn test_intersection_unrelated_branches_is_empty() {
    let tmp = fixture();
    let a = FileCollection::dir(tmp.path().join("src/sub"));
    let b = FileCollection::dir(tmp.path().join("src/target"));
    assert!(a.intersection(&b).unwrap().is_empty());
}

#[test]
fn test_intersection_respects_filters() {
    let tmp = fixture();
    let src = tmp.path().join("src");
    let only_rs = FileCollection::dir(&src).with_recurse(false).with_extensions(["rs"]);
    let only_txt = FileCollection::dir(&src).with_recurse(false).with_extensions(["txt"]);
    assert!(only_rs.intersection(&only_txt).unwrap().is_empty());
}

#[test]
fn test_plus_builds_unions() {
    let tmp = fixture();
    let src = tmp.path().join("src");
    let union = FileCollection::file(src.join("a.rs")).plus(FileCollection::file(src.join("b.txt")));
    let files = names(&src, &union.resolve_files().unwrap());
    assert_eq!(files, vec!["a.rs", "b.txt"]);

    assert!(matches!(
        FileCollection::empty().plus(FileCollection::file("x")),
        FileCollection::Files(_)
    ));
}

#[test]
fn test_normalize_path() {
    assert_eq!(normalize_path(Path::new("a/./b/")), PathBuf::from("a/b"));
    assert_eq!(normalize_path(Path::new(".")), PathBuf::from("."));
}
