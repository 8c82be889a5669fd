//! Kerberos plugin directory discovery
//!
//! Looks through each `LD_LIBRARY_PATH` entry first (installed layout, then
//! a source-tree layout next to it), then under the install prefix reported
//! by `krb5-config --prefix`. Among the candidates the shortest path that
//! actually holds a shared object wins.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Search the library path entries and the install prefix
pub fn find_plugin_dir(ld_library_path: Option<&str>, prefix: Option<&Path>) -> Option<PathBuf> {
    let from_ld_path = ld_library_path.into_iter().flat_map(|raw| raw.split(':')).find_map(|entry| {
        let entry = Path::new(entry);
        if entry.as_os_str().is_empty() || !entry.exists() {
            return None;
        }
        decide(installed_candidates(entry)).or_else(|| decide(source_tree_candidates(entry)))
    });

    from_ld_path
        .or_else(|| {
            let prefix = prefix?;
            decide(installed_candidates(&prefix.join("lib64")))
                .or_else(|| decide(installed_candidates(&prefix.join("lib"))))
        })
        .map(|dir| normalize(&dir))
}

/// Directories below `root` whose path ends in `krb5/plugins`
fn installed_candidates(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir() && entry.path().ends_with("krb5/plugins"))
        .map(|entry| entry.into_path())
        .collect()
}

/// Directories named `plugins` anywhere under the parent of `root`
fn source_tree_candidates(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root.join(".."))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir() && entry.file_name() == OsStr::new("plugins"))
        .map(|entry| entry.into_path())
        .collect()
}

fn decide(mut candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.sort_by_key(|path| path.as_os_str().len());
    candidates.into_iter().find(|dir| contains_shared_object(dir))
}

fn contains_shared_object(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| entry.file_type().is_file() && entry.path().extension() == Some(OsStr::new("so")))
}

/// Lexically resolve `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
