use std::path::Path;

use mc_warden::sandbox::path_safety::{resolve_entry, resolve_within};
use mc_warden::AppError;

fn canonical_root(temp: &tempfile::TempDir) -> std::path::PathBuf {
    temp.path().canonicalize().expect("canonicalize root")
}

#[test]
fn allows_path_inside_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);

    let resolved = resolve_within(&root, "world/level.dat").expect("path valid");

    assert!(resolved.starts_with(&root));
    assert!(resolved.ends_with(Path::new("world/level.dat")));
}

#[test]
fn leading_slash_is_root_relative() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);

    let resolved = resolve_within(&root, "/server.properties").expect("path valid");

    assert_eq!(resolved, root.join("server.properties"));
}

#[test]
fn rejects_traversal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);

    let result = resolve_within(&root, "../secret.txt");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn rejects_deep_traversal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);

    let result = resolve_within(&root, "world/../../secret.txt");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn parent_segments_inside_root_are_allowed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);

    let resolved = resolve_within(&root, "world/../plugins/config.yml").expect("path valid");

    assert_eq!(resolved, root.join("plugins/config.yml"));
}

#[test]
fn dot_segments_are_dropped() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);

    let resolved = resolve_within(&root, "./world/./region").expect("path valid");

    assert_eq!(resolved, root.join("world/region"));
}

#[cfg(unix)]
#[test]
fn rejects_symlink_escaping_root() {
    let outside = tempfile::tempdir().expect("outside");
    std::fs::write(outside.path().join("passwd"), "x").expect("write outside");

    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);
    std::os::unix::fs::symlink(outside.path(), root.join("escape")).expect("symlink");

    let result = resolve_within(&root, "escape/passwd");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[cfg(unix)]
#[test]
fn allows_symlink_within_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);
    std::fs::create_dir(root.join("world")).expect("mkdir");
    std::os::unix::fs::symlink(root.join("world"), root.join("alias")).expect("symlink");

    let resolved = resolve_within(&root, "alias").expect("path valid");

    assert_eq!(resolved, root.join("world"));
}

#[cfg(unix)]
#[test]
fn missing_file_under_escaping_link_is_rejected() {
    let outside = tempfile::tempdir().expect("outside");
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);
    std::os::unix::fs::symlink(outside.path(), root.join("plugins")).expect("symlink");

    let result = resolve_within(&root, "plugins/new/file.yml");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[cfg(unix)]
#[test]
fn missing_file_under_inner_link_resolves_through_it() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);
    std::fs::create_dir(root.join("world")).expect("mkdir");
    std::os::unix::fs::symlink(root.join("world"), root.join("alias")).expect("symlink");

    let resolved = resolve_within(&root, "alias/new.dat").expect("path valid");

    assert_eq!(resolved, root.join("world/new.dat"));
}

#[cfg(unix)]
#[test]
fn entry_resolution_keeps_final_link() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = canonical_root(&temp);
    std::fs::create_dir(root.join("world")).expect("mkdir");
    std::os::unix::fs::symlink(root.join("world"), root.join("alias")).expect("symlink");

    let resolved = resolve_entry(&root, "alias").expect("path valid");

    assert_eq!(resolved, root.join("alias"));
}
